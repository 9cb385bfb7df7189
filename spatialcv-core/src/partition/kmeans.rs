//! k-means clustering over coordinates (k-means++ seeding, Lloyd iterations).

use super::{Partitioner, distinct_locations};
use crate::data::Coordinate;
use crate::error::CvError;
use rand::Rng;
use rand::rngs::StdRng;

/// Groups observations into `k` geographically compact clusters, one per fold.
///
/// `k` is checked against the number of distinct coordinates, not against
/// how many visually separate groups the points form: three tight clumps of
/// jittered points still accept `k = 5`, and some clump is then split.
#[derive(Debug, Clone)]
pub struct KMeansPartitioner {
    pub max_iterations: usize,
}

impl KMeansPartitioner {
    pub fn new(max_iterations: usize) -> Self {
        Self { max_iterations }
    }
}

impl Default for KMeansPartitioner {
    fn default() -> Self {
        Self::new(100)
    }
}

impl Partitioner for KMeansPartitioner {
    fn name(&self) -> &'static str {
        "kmeans"
    }

    fn assign(
        &self,
        coords: &[Coordinate],
        k: usize,
        rng: &mut StdRng,
    ) -> Result<Vec<usize>, CvError> {
        let distinct = distinct_locations(coords);
        if k > distinct {
            return Err(CvError::configuration(format!(
                "k = {k} exceeds the {distinct} distinct spatial locations available"
            )));
        }

        let mut centroids = seed_centroids(coords, k, rng);
        let mut labels = nearest_labels(coords, &centroids);

        for iteration in 0..self.max_iterations {
            fill_empty_clusters(coords, &mut labels, &mut centroids);
            centroids = recompute_centroids(coords, &labels, &centroids);
            let next = nearest_labels(coords, &centroids);
            if next == labels {
                tracing::trace!(iteration, "k-means converged");
                break;
            }
            labels = next;
        }
        fill_empty_clusters(coords, &mut labels, &mut centroids);

        Ok(labels)
    }
}

/// k-means++: first centre uniform, each further centre drawn with
/// probability proportional to its squared distance from the nearest centre.
fn seed_centroids(coords: &[Coordinate], k: usize, rng: &mut StdRng) -> Vec<Coordinate> {
    let mut centroids = Vec::with_capacity(k);
    centroids.push(coords[rng.gen_range(0..coords.len())]);

    let mut d2: Vec<f64> = coords
        .iter()
        .map(|c| c.distance_squared(&centroids[0]))
        .collect();

    while centroids.len() < k {
        let total: f64 = d2.iter().sum();
        let chosen = if total > 0.0 && total.is_finite() {
            let target = rng.gen_range(0.0..total);
            let mut acc = 0.0;
            let mut pick = None;
            for (i, &w) in d2.iter().enumerate() {
                acc += w;
                if w > 0.0 && acc > target {
                    pick = Some(i);
                    break;
                }
            }
            // Rounding can leave `acc` just short of `target`.
            pick.or_else(|| d2.iter().rposition(|&w| w > 0.0))
        } else {
            d2.iter().position(|&w| w > 0.0)
        };

        // k <= distinct locations, so some point is away from every centre.
        let Some(i) = chosen else { break };
        let centre = coords[i];
        centroids.push(centre);
        for (j, c) in coords.iter().enumerate() {
            d2[j] = d2[j].min(c.distance_squared(&centre));
        }
    }
    centroids
}

/// Label of the nearest centroid for each point; ties go to the lower index.
fn nearest_labels(coords: &[Coordinate], centroids: &[Coordinate]) -> Vec<usize> {
    coords
        .iter()
        .map(|c| {
            let mut best = 0;
            let mut best_d = f64::INFINITY;
            for (j, centre) in centroids.iter().enumerate() {
                let d = c.distance_squared(centre);
                if d < best_d {
                    best_d = d;
                    best = j;
                }
            }
            best
        })
        .collect()
}

fn recompute_centroids(
    coords: &[Coordinate],
    labels: &[usize],
    previous: &[Coordinate],
) -> Vec<Coordinate> {
    let k = previous.len();
    let mut sums = vec![(0.0, 0.0, 0usize); k];
    for (c, &l) in coords.iter().zip(labels) {
        sums[l].0 += c.x;
        sums[l].1 += c.y;
        sums[l].2 += 1;
    }
    sums.iter()
        .zip(previous)
        .map(|(&(sx, sy, n), prev)| {
            if n == 0 {
                *prev
            } else {
                Coordinate::new(sx / n as f64, sy / n as f64)
            }
        })
        .collect()
}

/// Re-seed each empty cluster with the point farthest from its own centroid,
/// taken from a cluster that can spare it.
fn fill_empty_clusters(
    coords: &[Coordinate],
    labels: &mut [usize],
    centroids: &mut [Coordinate],
) {
    let k = centroids.len();
    let mut sizes = vec![0usize; k];
    for &l in labels.iter() {
        sizes[l] += 1;
    }

    for empty in 0..k {
        if sizes[empty] > 0 {
            continue;
        }
        let donor = (0..coords.len())
            .filter(|&i| sizes[labels[i]] > 1)
            .max_by(|&a, &b| {
                let da = coords[a].distance_squared(&centroids[labels[a]]);
                let db = coords[b].distance_squared(&centroids[labels[b]]);
                da.total_cmp(&db)
            });
        let Some(i) = donor else { return };
        sizes[labels[i]] -= 1;
        labels[i] = empty;
        sizes[empty] = 1;
        centroids[empty] = coords[i];
    }
}
