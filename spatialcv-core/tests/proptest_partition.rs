//! Property-based tests for fold partitioning using proptest.

use proptest::prelude::*;

use spatialcv_core::config::{PartitionConfig, PartitionMethod};
use spatialcv_core::data::{Coordinate, Dataset, Observation, Response};
use spatialcv_core::partition::{distinct_locations, partitioner_for, plan_folds};

fn dataset_from(points: &[(f64, f64)]) -> Dataset {
    let observations = points
        .iter()
        .enumerate()
        .map(|(i, &(x, y))| {
            Observation::new(
                format!("obs-{i}"),
                Coordinate::new(x, y),
                vec![],
                Response::Continuous(x + y),
            )
        })
        .collect();
    Dataset::new(vec![], observations).unwrap()
}

fn config(method: PartitionMethod, folds: usize, buffer: Option<f64>) -> PartitionConfig {
    PartitionConfig {
        method,
        folds,
        buffer_distance: buffer,
        ..PartitionConfig::default()
    }
}

fn method_strategy() -> impl Strategy<Value = PartitionMethod> {
    prop_oneof![
        Just(PartitionMethod::Kmeans),
        Just(PartitionMethod::Blocks),
        Just(PartitionMethod::Random),
    ]
}

fn points_strategy() -> impl Strategy<Value = Vec<(f64, f64)>> {
    prop::collection::vec((0.0f64..100.0, 0.0f64..100.0), 20..120)
}

// --- Assignment properties ---

proptest! {
    #[test]
    fn every_observation_in_exactly_one_fold(
        points in points_strategy(),
        method in method_strategy(),
        k in 2usize..6,
        seed in any::<u64>(),
    ) {
        let ds = dataset_from(&points);
        let cfg = config(method, k, None);
        // Block grids can legitimately have too few occupied cells.
        if let Ok(plan) = plan_folds(&ds, partitioner_for(&cfg).as_ref(), &cfg, seed) {
            let labels = plan.assignment.labels();
            prop_assert_eq!(labels.len(), ds.len());
            prop_assert!(labels.iter().all(|&l| l < k));

            let mut seen = vec![0usize; ds.len()];
            for fold in &plan.folds {
                prop_assert!(!fold.test.is_empty());
                for &i in &fold.test {
                    seen[i] += 1;
                    prop_assert_eq!(labels[i], fold.index);
                }
            }
            prop_assert!(seen.iter().all(|&c| c == 1));
        }
    }

    #[test]
    fn train_and_test_are_disjoint_and_cover(
        points in points_strategy(),
        method in method_strategy(),
        k in 2usize..6,
        seed in any::<u64>(),
    ) {
        let ds = dataset_from(&points);
        let cfg = config(method, k, None);
        if let Ok(plan) = plan_folds(&ds, partitioner_for(&cfg).as_ref(), &cfg, seed) {
            for fold in &plan.folds {
                prop_assert!(fold.buffered.is_empty());
                prop_assert!(fold.train.iter().all(|i| !fold.test.contains(i)));
                prop_assert_eq!(fold.train.len() + fold.test.len(), ds.len());
            }
        }
    }

    #[test]
    fn buffer_keeps_training_at_least_d_away(
        points in points_strategy(),
        k in 2usize..5,
        d in 0.5f64..15.0,
        seed in any::<u64>(),
    ) {
        let ds = dataset_from(&points);
        let coords = ds.coordinates();
        let cfg = config(PartitionMethod::Kmeans, k, Some(d));
        if let Ok(plan) = plan_folds(&ds, partitioner_for(&cfg).as_ref(), &cfg, seed) {
            for fold in &plan.folds {
                for &t in &fold.train {
                    for &s in &fold.test {
                        prop_assert!(coords[t].distance(&coords[s]) >= d);
                    }
                }
                prop_assert_eq!(
                    fold.train.len() + fold.test.len() + fold.buffered.len(),
                    ds.len()
                );
            }
        }
    }

    #[test]
    fn same_seed_same_assignment(
        points in points_strategy(),
        method in method_strategy(),
        seed in any::<u64>(),
    ) {
        let ds = dataset_from(&points);
        let cfg = config(method, 3, None);
        let partitioner = partitioner_for(&cfg);
        let first = plan_folds(&ds, partitioner.as_ref(), &cfg, seed);
        let second = plan_folds(&ds, partitioner.as_ref(), &cfg, seed);
        match (first, second) {
            (Ok(a), Ok(b)) => {
                prop_assert_eq!(a.assignment, b.assignment);
                prop_assert_eq!(a.folds, b.folds);
            }
            (Err(_), Err(_)) => {}
            _ => prop_assert!(false, "same seed gave different outcomes"),
        }
    }

    #[test]
    fn kmeans_rejects_more_folds_than_locations(
        locations in prop::collection::vec((0.0f64..50.0, 0.0f64..50.0), 2..4),
        copies in 2usize..6,
        seed in any::<u64>(),
    ) {
        let points: Vec<(f64, f64)> = locations
            .iter()
            .flat_map(|p| std::iter::repeat_n(*p, copies))
            .collect();
        let ds = dataset_from(&points);
        let distinct = distinct_locations(&ds.coordinates());
        let cfg = config(PartitionMethod::Kmeans, distinct + 1, None);
        let result = plan_folds(&ds, partitioner_for(&cfg).as_ref(), &cfg, seed);
        prop_assert!(matches!(
            result,
            Err(spatialcv_core::CvError::Configuration(_))
        ));
    }
}
