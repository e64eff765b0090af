// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use crate::task_queue::TaskQueue;
use crate::task_record::{TaskKind, TaskRecord};
use std::time::Duration;

/// Number of tasks and their summed compute time
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WorkStats {
    pub count: usize,
    pub total: Duration,
}

impl WorkStats {
    pub fn add(&mut self, duration: Duration) {
        self.count += 1;
        self.total += duration;
    }

    pub fn average(&self) -> Duration {
        match u32::try_from(self.count) {
            Ok(0) => Duration::ZERO,
            Ok(count) => self.total / count,
            Err(_) => self.total.div_f64(self.count as f64),
        }
    }
}

/// Final state of a dynamic run, produced by the master
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Every task of the batch in id order, with its measured duration
    pub records: Vec<TaskRecord>,
    pub per_kind: Vec<WorkStats>,
    /// Indexed by rank
    pub per_participant: Vec<WorkStats>,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn from_queue(queue: &TaskQueue, participants: usize, elapsed: Duration) -> Self {
        let mut per_kind = vec![WorkStats::default(); TaskKind::COUNT];
        let mut per_participant = vec![WorkStats::default(); participants];

        for record in queue.records() {
            let Some(duration) = record.duration else {
                continue;
            };
            per_kind[record.kind.index()].add(duration);
            if let Some(stats) = queue
                .completed_by(record.id)
                .and_then(|rank| per_participant.get_mut(rank))
            {
                stats.add(duration);
            }
        }

        Self {
            records: queue.records().to_vec(),
            per_kind,
            per_participant,
            elapsed,
        }
    }

    pub fn completed(&self) -> usize {
        self.records.iter().filter(|r| r.is_completed()).count()
    }
}
