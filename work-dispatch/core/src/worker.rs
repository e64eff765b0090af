// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use crate::error::DispatchError;
use crate::message_channel::MessageChannel;
use crate::reporter::Reporter;
use crate::task_executor::TaskExecutor;
use crate::task_record::{ParticipantId, TaskRecord, MASTER};
use std::time::Duration;
use tracing::{debug, info};

/// What a worker did before it was shut down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerSummary {
    pub rank: ParticipantId,
    pub tasks_completed: usize,
    pub busy: Duration,
}

/// Receive/compute/return loop run by every non-master participant.
///
/// The worker only sends in reply to a received task, so it never has more
/// than one task outstanding.
pub struct WorkerLoop<C, E, R>
where
    C: MessageChannel,
    E: TaskExecutor,
    R: Reporter,
{
    channel: C,
    executor: E,
    reporter: R,
    batch_size: usize,
}

impl<C, E, R> WorkerLoop<C, E, R>
where
    C: MessageChannel,
    E: TaskExecutor,
    R: Reporter,
{
    pub fn new(channel: C, executor: E, reporter: R, batch_size: usize) -> Self {
        Self {
            channel,
            executor,
            reporter,
            batch_size,
        }
    }

    pub fn rank(&self) -> ParticipantId {
        self.channel.rank()
    }

    pub fn run(mut self) -> Result<WorkerSummary, DispatchError> {
        let rank = self.channel.rank();
        let mut summary = WorkerSummary {
            rank,
            tasks_completed: 0,
            busy: Duration::ZERO,
        };

        let mut task = self.receive()?;
        while let Some(mut record) = task {
            self.reporter.task_started(rank, &record);
            let elapsed = self.executor.execute(record.kind);
            record.complete(elapsed);
            summary.tasks_completed += 1;
            summary.busy += elapsed;

            debug!(rank, task = record.id, ?elapsed, "returning task");
            self.channel.send(MASTER, &record)?;
            task = self.receive()?;
        }

        info!(
            rank,
            tasks = summary.tasks_completed,
            "worker received shutdown"
        );
        Ok(summary)
    }

    /// Next live task from the master, or `None` on the shutdown sentinel.
    fn receive(&mut self) -> Result<Option<TaskRecord>, DispatchError> {
        let record = self.channel.recv_from(MASTER)?;
        if record.is_shutdown() {
            return Ok(None);
        }
        if !record.is_live(self.batch_size) {
            return Err(DispatchError::ProtocolViolation {
                from: MASTER,
                id: record.id,
            });
        }
        Ok(Some(record))
    }
}
