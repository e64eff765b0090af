// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! One-shot sizing of contiguous partitions for the static mode.
//!
//! Partitions are filled greedily from the front of the batch while their
//! summed kind stays below `mean_per_participant + z * stddev`. The last
//! partition takes whatever is left, so the sizes always cover the batch
//! exactly. This is an approximation, not an optimal split.

use crate::error::ConfigError;
use crate::task_record::TaskKind;
use std::ops::Range;

/// Default Z constant of the partition window
pub const Z_SCORE: f64 = 0.067;

#[derive(Debug, Clone, PartialEq)]
pub struct PartitionPlan {
    /// Number of consecutive tasks per participant, in rank order
    pub sizes: Vec<usize>,
    pub mean_per_participant: f64,
    /// Population standard deviation of the kinds over the batch
    pub stddev: f64,
    pub upper_bound: f64,
}

impl PartitionPlan {
    /// Index range of each partition within the batch
    pub fn ranges(&self) -> Vec<Range<usize>> {
        let mut start = 0;
        self.sizes
            .iter()
            .map(|&size| {
                let range = start..start + size;
                start += size;
                range
            })
            .collect()
    }

    pub fn total(&self) -> usize {
        self.sizes.iter().sum()
    }
}

pub fn partition_sizes(
    kinds: &[TaskKind],
    participants: usize,
    z: f64,
) -> Result<PartitionPlan, ConfigError> {
    if kinds.is_empty() {
        return Err(ConfigError::EmptyBatch);
    }
    if participants == 0 {
        return Err(ConfigError::NoParticipants);
    }

    let weights: Vec<f64> = kinds.iter().map(|k| f64::from(k.value())).collect();
    let batch_len = weights.len();
    let sum: f64 = weights.iter().sum();
    let mean = sum / batch_len as f64;
    let mean_per_participant = sum / participants as f64;
    let variance = weights.iter().map(|w| (w - mean).powi(2)).sum::<f64>() / batch_len as f64;
    let stddev = variance.sqrt();
    let upper_bound = mean_per_participant + z * stddev;

    let mut sizes = Vec::with_capacity(participants);
    let mut start = 0;
    for _ in 0..participants - 1 {
        let mut running = 0.0;
        let mut end = start;
        while end < batch_len && running + weights[end] < upper_bound {
            running += weights[end];
            end += 1;
        }
        sizes.push(end - start);
        start = end;
    }
    sizes.push(batch_len - start);

    Ok(PartitionPlan {
        sizes,
        mean_per_participant,
        stddev,
        upper_bound,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task_queue::TaskQueue;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn kinds(values: &[u8]) -> Vec<TaskKind> {
        values.iter().map(|&v| TaskKind::new(v).unwrap()).collect()
    }

    #[test]
    fn test_window_and_greedy_split() {
        let plan = partition_sizes(&kinds(&[4, 0, 4, 0, 2, 2]), 2, Z_SCORE).unwrap();

        assert_eq!(plan.mean_per_participant, 6.0);
        assert!((plan.stddev - (16.0f64 / 6.0).sqrt()).abs() < 1e-9);
        assert_eq!(plan.sizes, vec![2, 4]);
        assert_eq!(plan.ranges(), vec![0..2, 2..6]);
    }

    #[test]
    fn test_uniform_batch_leaves_remainder_to_last() {
        let plan = partition_sizes(&kinds(&[1, 1, 1, 1, 1, 1]), 3, Z_SCORE).unwrap();

        assert_eq!(plan.stddev, 0.0);
        assert_eq!(plan.upper_bound, 2.0);
        assert_eq!(plan.sizes, vec![1, 1, 4]);
    }

    #[test]
    fn test_all_zero_kinds_go_to_last_partition() {
        let plan = partition_sizes(&kinds(&[0, 0, 0]), 2, Z_SCORE).unwrap();

        assert_eq!(plan.sizes, vec![0, 3]);
    }

    #[test]
    fn test_single_participant_takes_everything() {
        let plan = partition_sizes(&kinds(&[3, 4, 2]), 1, Z_SCORE).unwrap();

        assert_eq!(plan.sizes, vec![3]);
    }

    #[test]
    fn test_sizes_cover_random_batches_exactly() {
        for seed in 0..25u64 {
            let mut rng = StdRng::seed_from_u64(seed);
            let batch_size = 1 + (seed as usize * 37) % 300;
            let queue = TaskQueue::generate(batch_size, &mut rng).unwrap();
            for participants in [1, 2, 3, 7, 16, 400] {
                let plan = partition_sizes(&queue.kinds(), participants, Z_SCORE).unwrap();

                assert_eq!(plan.sizes.len(), participants);
                assert_eq!(plan.total(), batch_size);
                assert_eq!(plan.ranges().last().unwrap().end, batch_size);
            }
        }
    }

    #[test]
    fn test_rejects_degenerate_input() {
        assert!(matches!(
            partition_sizes(&[], 2, Z_SCORE),
            Err(ConfigError::EmptyBatch)
        ));
        assert!(matches!(
            partition_sizes(&kinds(&[1]), 0, Z_SCORE),
            Err(ConfigError::NoParticipants)
        ));
    }
}
