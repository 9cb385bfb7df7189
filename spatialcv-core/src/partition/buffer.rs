//! Spatial buffering between a fold's test points and its training points.

use crate::data::Coordinate;
use std::collections::HashMap;

/// Uniform grid over a point set with square cells of side `cell`. Any point
/// closer than `cell` to a query lies in the query's cell or one of its eight
/// neighbours.
struct GridIndex {
    cell: f64,
    cells: HashMap<(i64, i64), Vec<usize>>,
}

impl GridIndex {
    fn new(coords: &[Coordinate], members: impl Iterator<Item = usize>, cell: f64) -> Self {
        let mut cells: HashMap<(i64, i64), Vec<usize>> = HashMap::new();
        for i in members {
            cells.entry(Self::key(&coords[i], cell)).or_default().push(i);
        }
        Self { cell, cells }
    }

    fn key(c: &Coordinate, cell: f64) -> (i64, i64) {
        ((c.x / cell).floor() as i64, (c.y / cell).floor() as i64)
    }

    /// Whether any indexed point lies strictly closer than `radius` to `query`.
    fn any_within(&self, coords: &[Coordinate], query: &Coordinate, radius: f64) -> bool {
        let (cx, cy) = Self::key(query, self.cell);
        for dx in -1..=1_i64 {
            for dy in -1..=1_i64 {
                let Some(bucket) = self
                    .cells
                    .get(&(cx.saturating_add(dx), cy.saturating_add(dy)))
                else {
                    continue;
                };
                if bucket.iter().any(|&t| coords[t].distance(query) < radius) {
                    return true;
                }
            }
        }
        false
    }
}

/// Split the observations outside `fold` into training and buffered sets.
///
/// Without a buffer every observation outside the fold trains. With a buffer
/// `d`, an observation is dropped when it lies at distance `< d` from any of
/// the fold's test observations.
pub fn split_training(
    coords: &[Coordinate],
    labels: &[usize],
    fold: usize,
    buffer: Option<f64>,
) -> (Vec<usize>, Vec<usize>) {
    let outside = (0..labels.len()).filter(|&i| labels[i] != fold);

    let Some(d) = buffer.filter(|d| *d > 0.0) else {
        return (outside.collect(), Vec::new());
    };

    let index = GridIndex::new(
        coords,
        (0..labels.len()).filter(|&i| labels[i] == fold),
        d,
    );

    let mut train = Vec::new();
    let mut buffered = Vec::new();
    for i in outside {
        if index.any_within(coords, &coords[i], d) {
            buffered.push(i);
        } else {
            train.push(i);
        }
    }
    (train, buffered)
}
