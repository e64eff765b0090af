// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! The unit of work exchanged between the master and its workers.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Dense rank of a participant within the group.
pub type ParticipantId = usize;

/// Stable index of a task within its batch.
pub type TaskId = u32;

/// Rank of the participant that owns the task queue.
pub const MASTER: ParticipantId = 0;

/// Reserved id carried by a record that means "no more work".
pub const SHUTDOWN_ID: TaskId = TaskId::MAX;

/// Category selecting the duration distribution of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8")]
pub struct TaskKind(u8);

impl TaskKind {
    /// Number of distinct kinds.
    pub const COUNT: usize = 5;

    /// Base delay and jitter span, in microseconds, for each kind.
    const DELAYS_US: [(u64, u64); Self::COUNT] = [
        (100_000, 2_900_000),
        (2_000_000, 3_000_000),
        (1_000_000, 5_000_000),
        (5_000_000, 2_500_000),
        (7_000_000, 2_000_000),
    ];

    pub fn new(value: u8) -> Option<Self> {
        ((value as usize) < Self::COUNT).then_some(Self(value))
    }

    pub fn random(rng: &mut impl Rng) -> Self {
        Self(rng.random_range(0..Self::COUNT as u8))
    }

    pub fn value(self) -> u8 {
        self.0
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Draws the unscaled compute delay for this kind.
    pub fn delay(self, rng: &mut impl Rng) -> Duration {
        let (base, jitter) = Self::DELAYS_US[self.index()];
        Duration::from_micros(base + rng.random_range(0..jitter))
    }
}

impl TryFrom<u8> for TaskKind {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value).ok_or_else(|| {
            format!("task kind {} is outside 0..{}", value, Self::COUNT)
        })
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A task and, once computed, its result.
///
/// `id` is either an index into the batch or [`SHUTDOWN_ID`]. `duration` is
/// `None` until the task is computed, and is written exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: TaskId,
    pub kind: TaskKind,
    pub duration: Option<Duration>,
}

impl TaskRecord {
    pub fn new(id: TaskId, kind: TaskKind) -> Self {
        Self {
            id,
            kind,
            duration: None,
        }
    }

    /// The sentinel record sent once to each participant at shutdown.
    pub fn shutdown() -> Self {
        Self {
            id: SHUTDOWN_ID,
            kind: TaskKind(0),
            duration: None,
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.id == SHUTDOWN_ID
    }

    /// True when the id addresses a slot of a batch of `batch_len` tasks.
    pub fn is_live(&self, batch_len: usize) -> bool {
        (self.id as usize) < batch_len
    }

    pub fn is_completed(&self) -> bool {
        self.duration.is_some()
    }

    /// Stores the measured compute time. Later calls keep the first value.
    pub fn complete(&mut self, duration: Duration) {
        if self.duration.is_none() {
            self.duration = Some(duration);
        }
    }
}

impl fmt::Display for TaskRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.duration.map(|d| d.as_secs_f64()).unwrap_or(0.0);
        write!(f, "({}, {}, {:.3})", self.id, self.kind, secs)
    }
}
