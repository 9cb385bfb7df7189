//! Systematic spatial blocking: a regular grid over the bounding box whose
//! non-empty cells are dealt out to folds.

use super::Partitioner;
use crate::data::Coordinate;
use crate::error::CvError;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub struct BlockPartitioner {
    /// Cells per axis; `ceil(sqrt(2k))` when unset.
    pub blocks_per_axis: Option<usize>,
}

impl BlockPartitioner {
    pub fn new(blocks_per_axis: Option<usize>) -> Self {
        Self { blocks_per_axis }
    }

    fn cells_per_axis(&self, k: usize) -> usize {
        self.blocks_per_axis
            .unwrap_or_else(|| ((2 * k) as f64).sqrt().ceil() as usize)
            .max(1)
    }
}

#[derive(Debug, Clone, Copy)]
struct Extent {
    min_x: f64,
    min_y: f64,
    width: f64,
    height: f64,
}

impl Extent {
    fn of(coords: &[Coordinate]) -> Self {
        let (mut min_x, mut min_y) = (f64::INFINITY, f64::INFINITY);
        let (mut max_x, mut max_y) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
        for c in coords {
            min_x = min_x.min(c.x);
            min_y = min_y.min(c.y);
            max_x = max_x.max(c.x);
            max_y = max_y.max(c.y);
        }
        Self {
            min_x,
            min_y,
            width: max_x - min_x,
            height: max_y - min_y,
        }
    }

    fn cell(&self, c: &Coordinate, n: usize) -> (usize, usize) {
        let axis = |v: f64, min: f64, span: f64| {
            if span <= 0.0 {
                0
            } else {
                (((v - min) / span * n as f64).floor() as usize).min(n - 1)
            }
        };
        (
            axis(c.x, self.min_x, self.width),
            axis(c.y, self.min_y, self.height),
        )
    }
}

impl Partitioner for BlockPartitioner {
    fn name(&self) -> &'static str {
        "blocks"
    }

    fn assign(
        &self,
        coords: &[Coordinate],
        k: usize,
        rng: &mut StdRng,
    ) -> Result<Vec<usize>, CvError> {
        let n = self.cells_per_axis(k);
        let extent = Extent::of(coords);

        let mut cells: BTreeMap<(usize, usize), Vec<usize>> = BTreeMap::new();
        for (i, c) in coords.iter().enumerate() {
            cells.entry(extent.cell(c, n)).or_default().push(i);
        }
        if cells.len() < k {
            return Err(CvError::configuration(format!(
                "k = {k} exceeds the {} non-empty spatial blocks of a {n}x{n} grid",
                cells.len()
            )));
        }

        let mut blocks: Vec<Vec<usize>> = cells.into_values().collect();
        blocks.shuffle(rng);

        // Each block goes to the currently smallest fold, so the first k
        // blocks seed k distinct folds.
        let mut fold_sizes = vec![0usize; k];
        let mut labels = vec![0; coords.len()];
        for block in &blocks {
            let fold = (0..k).min_by_key(|&f| fold_sizes[f]).unwrap_or(0);
            fold_sizes[fold] += block.len();
            for &i in block {
                labels[i] = fold;
            }
        }
        Ok(labels)
    }
}
