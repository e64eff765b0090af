// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use crate::error::{ConfigError, DispatchError, TransportError};
use crate::message_channel::MessageChannel;
use crate::report::RunReport;
use crate::reporter::Reporter;
use crate::task_executor::TaskExecutor;
use crate::task_queue::TaskQueue;
use crate::task_record::{ParticipantId, TaskRecord, MASTER};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Owner of the task queue: seeds every participant, re-feeds workers as
/// their results come back and drives the two-phase shutdown.
///
/// Flow of a run:
/// - `seed` hands one task to each participant in rank order; anyone beyond
///   the batch gets the shutdown sentinel right away
/// - while work remains the master alternates its own compute step with a
///   non-blocking `drain`
/// - once the queue is exhausted it blocks in `drain` until every
///   participant has been shut down
pub struct MasterDispatcher<C, E, R>
where
    C: MessageChannel,
    E: TaskExecutor,
    R: Reporter,
{
    channel: C,
    executor: E,
    reporter: R,
    queue: TaskQueue,
    participants: usize,
    master_computes: bool,
    local: Option<TaskRecord>,
    finished: Vec<bool>,
    finished_count: usize,
    started: Instant,
}

impl<C, E, R> MasterDispatcher<C, E, R>
where
    C: MessageChannel,
    E: TaskExecutor,
    R: Reporter,
{
    pub fn new(
        channel: C,
        executor: E,
        reporter: R,
        queue: TaskQueue,
        master_computes: bool,
    ) -> Result<Self, DispatchError> {
        let participants = channel.size();
        if participants == 0 {
            return Err(ConfigError::NoParticipants.into());
        }
        if !master_computes && participants < 2 {
            return Err(ConfigError::NoComputeParticipants { participants }.into());
        }

        Ok(Self {
            channel,
            executor,
            reporter,
            queue,
            participants,
            master_computes,
            local: None,
            finished: vec![false; participants],
            finished_count: 0,
            started: Instant::now(),
        })
    }

    pub fn queue(&self) -> &TaskQueue {
        &self.queue
    }

    pub fn participants(&self) -> usize {
        self.participants
    }

    pub fn finished_count(&self) -> usize {
        self.finished_count
    }

    pub fn is_finished(&self, participant: ParticipantId) -> bool {
        self.finished.get(participant).copied().unwrap_or(false)
    }

    /// Task the master is holding for its own compute step
    pub fn local_task(&self) -> Option<&TaskRecord> {
        self.local.as_ref()
    }

    /// Deal the initial tasks round-robin in rank order.
    pub fn seed(&mut self) -> Result<(), DispatchError> {
        self.started = Instant::now();
        self.reporter.batch_generated(MASTER, self.queue.records());
        info!(
            batch = self.queue.len(),
            participants = self.participants,
            master_computes = self.master_computes,
            "seeding participants"
        );

        for rank in 0..self.participants {
            if rank == MASTER {
                if self.master_computes {
                    self.local = self.queue.assign_next(MASTER);
                }
                continue;
            }
            match self.queue.assign_next(rank) {
                Some(record) => {
                    debug!(to = rank, task = record.id, "seeding task");
                    self.channel.send(rank, &record)?;
                }
                None => self.shut_down(rank)?,
            }
        }
        Ok(())
    }

    /// Consume completed tasks from workers.
    ///
    /// Non-blocking mode handles whatever is waiting right now and returns.
    /// Blocking mode waits for exactly one completion. Returns how many
    /// participants were shut down during the call.
    pub fn drain(&mut self, blocking: bool) -> Result<usize, DispatchError> {
        let mut shutdowns = 0;
        if blocking {
            let (from, record) = self.channel.recv_any()?;
            shutdowns += self.handle_completion(from, record)?;
        } else {
            while self.channel.probe()? {
                let (from, record) = self.channel.recv_any()?;
                shutdowns += self.handle_completion(from, record)?;
            }
        }
        Ok(shutdowns)
    }

    /// One master-as-worker cycle: compute the held task, serve waiting
    /// workers, store the local result and take the next task if any.
    ///
    /// Returns whether the master picked up another task.
    pub fn work_local(&mut self) -> Result<bool, DispatchError> {
        let Some(mut record) = self.local.take() else {
            return Ok(false);
        };

        self.reporter.task_started(MASTER, &record);
        let elapsed = self.executor.execute(record.kind);
        record.complete(elapsed);

        self.drain(false)?;

        self.queue.record_completion(MASTER, record)?;
        self.local = self.queue.assign_next(MASTER);
        Ok(self.local.is_some())
    }

    /// Shutdown bookkeeping: marks `participant` as terminated. Each
    /// participant passes through here exactly once.
    pub fn finish_participant(&mut self, participant: ParticipantId) -> Result<(), DispatchError> {
        let size = self.participants;
        let finished = self.finished.get_mut(participant).ok_or(
            TransportError::UnknownParticipant {
                target: participant,
                size,
            },
        )?;
        if *finished {
            return Err(DispatchError::DuplicateShutdown(participant));
        }
        *finished = true;
        self.finished_count += 1;

        self.reporter.participant_finished(participant);
        info!(
            participant,
            finished = self.finished_count,
            total = self.participants,
            "participant finished"
        );
        Ok(())
    }

    pub fn run(&mut self) -> Result<RunReport, DispatchError> {
        self.seed()?;

        if self.master_computes {
            while self.work_local()? {}
        }
        self.finish_participant(MASTER)?;

        while self.finished_count < self.participants {
            self.reporter
                .shutdown_progress(MASTER, self.finished_count, self.participants);
            self.drain(true)?;
        }
        self.reporter
            .shutdown_progress(MASTER, self.finished_count, self.participants);

        if !self.queue.is_fully_completed() {
            warn!("run ended with tasks that were never recorded");
        }

        let report = self.report();
        self.reporter.batch_completed(MASTER, &report.records);
        self.reporter.run_summary(&report);
        info!(elapsed = ?report.elapsed, "dispatch complete");
        Ok(report)
    }

    pub fn report(&self) -> RunReport {
        RunReport::from_queue(&self.queue, self.participants, self.started.elapsed())
    }

    fn handle_completion(
        &mut self,
        from: ParticipantId,
        record: TaskRecord,
    ) -> Result<usize, DispatchError> {
        if record.is_shutdown() {
            return Err(DispatchError::UnexpectedShutdown { from });
        }
        if from == MASTER || from >= self.participants || self.is_finished(from) {
            return Err(DispatchError::ProtocolViolation {
                from,
                id: record.id,
            });
        }

        debug!(from, task = record.id, duration = ?record.duration, "completion received");
        self.queue.record_completion(from, record)?;

        match self.queue.assign_next(from) {
            Some(next) => {
                debug!(to = from, task = next.id, "assigning task");
                self.channel.send(from, &next)?;
                Ok(0)
            }
            None => {
                self.shut_down(from)?;
                Ok(1)
            }
        }
    }

    /// Send the sentinel to a worker and record its shutdown.
    fn shut_down(&mut self, participant: ParticipantId) -> Result<(), DispatchError> {
        if self.is_finished(participant) {
            return Err(DispatchError::DuplicateShutdown(participant));
        }
        self.channel.send(participant, &TaskRecord::shutdown())?;
        self.finish_participant(participant)
    }
}
