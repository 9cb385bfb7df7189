//! Conventional cross-validation folds that ignore location. Serves as the
//! baseline that spatial partitioning is compared against.

use super::Partitioner;
use crate::data::Coordinate;
use crate::error::CvError;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

#[derive(Debug, Clone, Copy, Default)]
pub struct RandomPartitioner;

impl Partitioner for RandomPartitioner {
    fn name(&self) -> &'static str {
        "random"
    }

    fn assign(
        &self,
        coords: &[Coordinate],
        k: usize,
        rng: &mut StdRng,
    ) -> Result<Vec<usize>, CvError> {
        if k > coords.len() {
            return Err(CvError::configuration(format!(
                "k = {k} exceeds the {} observations available",
                coords.len()
            )));
        }
        let mut order: Vec<usize> = (0..coords.len()).collect();
        order.shuffle(rng);

        let mut labels = vec![0; coords.len()];
        for (pos, &i) in order.iter().enumerate() {
            labels[i] = pos % k;
        }
        Ok(labels)
    }
}
