// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use crate::task_record::TaskKind;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::thread;
use std::time::{Duration, Instant};

/// Black-box compute step: blocks for a kind-dependent time and reports how
/// long it actually took.
pub trait TaskExecutor: Send {
    fn execute(&mut self, kind: TaskKind) -> Duration;
}

impl<T: TaskExecutor + ?Sized> TaskExecutor for Box<T> {
    fn execute(&mut self, kind: TaskKind) -> Duration {
        (**self).execute(kind)
    }
}

/// Simulates work by sleeping for the kind's randomized delay
pub struct SleepExecutor {
    rng: StdRng,
    time_scale: f64,
}

impl SleepExecutor {
    pub fn new(seed: u64, time_scale: f64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            time_scale,
        }
    }

    /// Delay the next call would sleep for, after scaling
    fn next_delay(&mut self, kind: TaskKind) -> Duration {
        kind.delay(&mut self.rng).mul_f64(self.time_scale)
    }
}

impl TaskExecutor for SleepExecutor {
    fn execute(&mut self, kind: TaskKind) -> Duration {
        let delay = self.next_delay(kind);
        let begin = Instant::now();
        thread::sleep(delay);
        begin.elapsed()
    }
}
