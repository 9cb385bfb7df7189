//! Fold partitioning: spatial clustering, blocking, the random baseline, and buffering.
//!
//! A [`Partitioner`] produces one raw label per observation. [`plan_folds`]
//! validates and canonicalizes those labels, then derives each fold's test,
//! training, and buffered index sets.

pub mod blocks;
pub mod buffer;
pub mod kmeans;
pub mod random;

pub use blocks::BlockPartitioner;
pub use kmeans::KMeansPartitioner;
pub use random::RandomPartitioner;

use crate::config::{PartitionConfig, PartitionMethod};
use crate::data::{Coordinate, Dataset};
use crate::error::CvError;
use crate::reproducibility::fingerprint_labels;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

/// Assigns observations to folds from their coordinates.
pub trait Partitioner: Send + Sync {
    fn name(&self) -> &'static str;

    /// Return one label in `[0, k)` per coordinate. Labels need not be
    /// canonical and folds may be checked for emptiness by the caller.
    fn assign(
        &self,
        coords: &[Coordinate],
        k: usize,
        rng: &mut StdRng,
    ) -> Result<Vec<usize>, CvError>;
}

/// Build the partitioner selected by `config.method`.
pub fn partitioner_for(config: &PartitionConfig) -> Box<dyn Partitioner> {
    match config.method {
        PartitionMethod::Kmeans => Box::new(KMeansPartitioner::new(config.max_iterations)),
        PartitionMethod::Blocks => Box::new(BlockPartitioner::new(config.blocks_per_axis)),
        PartitionMethod::Random => Box::new(RandomPartitioner),
    }
}

/// Mapping from each observation to its fold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoldAssignment {
    k: usize,
    ids: Vec<String>,
    labels: Vec<usize>,
}

impl FoldAssignment {
    pub fn k(&self) -> usize {
        self.k
    }

    /// Fold of each observation, in dataset order.
    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    pub fn fold_of(&self, id: &str) -> Option<usize> {
        self.ids
            .iter()
            .position(|i| i == id)
            .map(|pos| self.labels[pos])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.ids
            .iter()
            .map(String::as_str)
            .zip(self.labels.iter().copied())
    }

    pub fn fold_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.k];
        for &l in &self.labels {
            sizes[l] += 1;
        }
        sizes
    }
}

/// Index sets of a single fold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fold {
    pub index: usize,
    /// Held-out observations.
    pub test: Vec<usize>,
    /// Observations the model is fit on.
    pub train: Vec<usize>,
    /// Observations outside the fold dropped because they fall inside the buffer.
    pub buffered: Vec<usize>,
}

/// Fold assignment plus the derived per-fold index sets for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FoldPlan {
    pub method: String,
    pub seed: u64,
    pub buffer_distance: Option<f64>,
    pub assignment: FoldAssignment,
    pub folds: Vec<Fold>,
}

impl FoldPlan {
    pub fn k(&self) -> usize {
        self.assignment.k
    }

    /// SHA-256 of the canonical labels; equal plans have equal fingerprints.
    pub fn fingerprint(&self) -> String {
        fingerprint_labels(self.assignment.k, &self.assignment.labels)
    }
}

/// Number of distinct coordinate locations (exact equality).
pub fn distinct_locations(coords: &[Coordinate]) -> usize {
    let mut sorted: Vec<Coordinate> = coords.to_vec();
    sorted.sort_by(|a, b| a.x.total_cmp(&b.x).then(a.y.total_cmp(&b.y)));
    sorted.dedup_by(|a, b| a.x == b.x && a.y == b.y);
    sorted.len()
}

/// Relabel folds in order of first appearance so that equivalent
/// partitions compare equal.
pub fn canonicalize(labels: &[usize], k: usize) -> Vec<usize> {
    let mut mapping = vec![usize::MAX; k];
    let mut next = 0;
    labels
        .iter()
        .map(|&l| {
            if mapping[l] == usize::MAX {
                mapping[l] = next;
                next += 1;
            }
            mapping[l]
        })
        .collect()
}

/// Partition `dataset` into `config.folds` folds with the given partitioner and seed.
pub fn plan_folds(
    dataset: &Dataset,
    partitioner: &dyn Partitioner,
    config: &PartitionConfig,
    seed: u64,
) -> Result<FoldPlan, CvError> {
    config.validate()?;
    let k = config.folds;

    if dataset.is_empty() {
        return Err(CvError::insufficient_data("dataset has no observations"));
    }
    let coords = dataset.coordinates();
    if let Some(bad) = coords.iter().position(|c| !c.is_finite()) {
        return Err(CvError::configuration(format!(
            "observation '{}' has a non-finite coordinate",
            dataset.observations()[bad].id
        )));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let raw = partitioner.assign(&coords, k, &mut rng)?;
    if raw.len() != coords.len() {
        return Err(CvError::partition(format!(
            "{} returned {} labels for {} observations",
            partitioner.name(),
            raw.len(),
            coords.len()
        )));
    }
    if let Some(&bad) = raw.iter().find(|&&l| l >= k) {
        return Err(CvError::partition(format!(
            "{} produced fold label {bad} outside [0, {k})",
            partitioner.name()
        )));
    }

    let labels = canonicalize(&raw, k);
    let mut test_sets: Vec<Vec<usize>> = vec![Vec::new(); k];
    for (i, &l) in labels.iter().enumerate() {
        test_sets[l].push(i);
    }
    if let Some(empty) = test_sets.iter().position(Vec::is_empty) {
        return Err(CvError::partition(format!(
            "{} left fold {empty} of {k} empty",
            partitioner.name()
        )));
    }

    let buffer_distance = config.effective_buffer();
    let mut folds = Vec::with_capacity(k);
    for (index, test) in test_sets.into_iter().enumerate() {
        let (train, buffered) = buffer::split_training(&coords, &labels, index, buffer_distance);
        if train.is_empty() {
            return Err(CvError::insufficient_data(format!(
                "fold {index} has no training observations after applying a buffer of {}",
                buffer_distance.unwrap_or(0.0)
            )));
        }
        folds.push(Fold {
            index,
            test,
            train,
            buffered,
        });
    }

    let assignment = FoldAssignment {
        k,
        ids: dataset.observations().iter().map(|o| o.id.clone()).collect(),
        labels,
    };

    tracing::debug!(
        method = partitioner.name(),
        k,
        seed,
        sizes = ?assignment.fold_sizes(),
        buffered = folds.iter().map(|f| f.buffered.len()).sum::<usize>(),
        "Planned folds"
    );

    Ok(FoldPlan {
        method: partitioner.name().to_string(),
        seed,
        buffer_distance,
        assignment,
        folds,
    })
}
