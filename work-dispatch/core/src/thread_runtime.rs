// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Runs one participant per OS thread over any [`MessageChannel`].

use crate::config::DispatchConfig;
use crate::error::{DispatchError, TransportError};
use crate::master::MasterDispatcher;
use crate::message_channel::MessageChannel;
use crate::partition::{partition_sizes, PartitionPlan};
use crate::report::RunReport;
use crate::reporter::Reporter;
use crate::task_executor::TaskExecutor;
use crate::task_queue::TaskQueue;
use crate::task_record::{ParticipantId, MASTER};
use crate::worker::{WorkerLoop, WorkerSummary};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc;
use std::thread;
use tracing::{error, info};

/// What a single participant returned
#[derive(Debug)]
pub enum ParticipantOutcome {
    Master(RunReport),
    Worker(WorkerSummary),
}

#[derive(Debug)]
pub struct ClusterOutcome {
    pub report: RunReport,
    /// Worker summaries in rank order
    pub workers: Vec<WorkerSummary>,
}

/// Play the role that matches the channel's rank. The master generates the
/// batch from its seed; workers only need the batch size to validate ids.
pub fn run_participant<C, E, R>(
    channel: C,
    executor: E,
    reporter: R,
    config: &DispatchConfig,
) -> Result<ParticipantOutcome, DispatchError>
where
    C: MessageChannel,
    E: TaskExecutor,
    R: Reporter,
{
    if channel.rank() == MASTER {
        let mut rng = StdRng::seed_from_u64(config.seed_for(MASTER));
        let queue = TaskQueue::generate(config.batch_size, &mut rng)?;
        let mut master =
            MasterDispatcher::new(channel, executor, reporter, queue, config.master_computes)?;
        Ok(ParticipantOutcome::Master(master.run()?))
    } else {
        let worker = WorkerLoop::new(channel, executor, reporter, config.batch_size);
        Ok(ParticipantOutcome::Worker(worker.run()?))
    }
}

/// Static mode: generate the batch the master would generate and size its
/// contiguous partitions. Nothing is distributed or computed.
pub fn run_static<R: Reporter>(
    config: &DispatchConfig,
    reporter: &mut R,
) -> Result<PartitionPlan, DispatchError> {
    config.validate()?;
    let mut rng = StdRng::seed_from_u64(config.seed_for(MASTER));
    let queue = TaskQueue::generate(config.batch_size, &mut rng)?;
    reporter.batch_generated(MASTER, queue.records());

    let plan = partition_sizes(&queue.kinds(), config.participants, config.z_score)?;
    info!(sizes = ?plan.sizes, upper_bound = plan.upper_bound, "partition plan ready");
    reporter.partition_plan(&plan);
    Ok(plan)
}

/// Spawn a thread per channel and wait for every participant to finish.
///
/// The transports unblock the peers of a participant that stops early, so
/// every thread ends. When several participants fail, the error that caused
/// the others is returned.
pub fn run_cluster<C, E, R, FE, FR>(
    channels: Vec<C>,
    config: &DispatchConfig,
    mut make_executor: FE,
    mut make_reporter: FR,
) -> Result<ClusterOutcome, DispatchError>
where
    C: MessageChannel + 'static,
    E: TaskExecutor + 'static,
    R: Reporter + 'static,
    FE: FnMut(ParticipantId) -> E,
    FR: FnMut(ParticipantId) -> R,
{
    config.validate()?;
    let participants = channels.len();
    let (done_tx, done_rx) = mpsc::channel();
    let mut handles = Vec::with_capacity(participants);

    for channel in channels {
        let rank = channel.rank();
        let executor = make_executor(rank);
        let reporter = make_reporter(rank);
        let config = config.clone();
        let done_tx = done_tx.clone();

        let handle = thread::Builder::new()
            .name(format!("participant-{}", rank))
            .spawn(move || {
                let result = catch_unwind(AssertUnwindSafe(|| {
                    run_participant(channel, executor, reporter, &config)
                }));
                let _ = done_tx.send((rank, result));
            })
            .map_err(TransportError::from)?;
        handles.push(handle);
    }
    drop(done_tx);

    let mut report = None;
    let mut workers = Vec::with_capacity(participants.saturating_sub(1));
    let mut failures = Vec::new();
    for (rank, result) in done_rx.iter().take(participants) {
        match result {
            Ok(Ok(ParticipantOutcome::Master(run))) => report = Some(run),
            Ok(Ok(ParticipantOutcome::Worker(summary))) => workers.push(summary),
            Ok(Err(e)) => {
                error!(rank, error = %e, "participant failed");
                failures.push(e);
            }
            Err(_) => {
                error!(rank, "participant panicked");
                failures.push(DispatchError::ParticipantPanicked(rank));
            }
        }
    }

    for handle in handles {
        let _ = handle.join();
    }
    info!(participants, "all participants joined");

    if let Some(failure) = root_failure(failures) {
        return Err(failure);
    }
    workers.sort_by_key(|summary| summary.rank);
    let report = report.ok_or(DispatchError::MissingReport)?;
    Ok(ClusterOutcome { report, workers })
}

/// Picks the first failure that is not merely a peer reacting to another
/// participant going away.
fn root_failure(mut failures: Vec<DispatchError>) -> Option<DispatchError> {
    if failures.is_empty() {
        return None;
    }
    let index = failures
        .iter()
        .position(|failure| !is_knock_on(failure))
        .unwrap_or(0);
    Some(failures.swap_remove(index))
}

fn is_knock_on(failure: &DispatchError) -> bool {
    matches!(
        failure,
        DispatchError::UnexpectedShutdown { .. }
            | DispatchError::Transport(TransportError::Disconnected(_))
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::in_memory_channel::InMemoryNetwork;
    use crate::reporter::SilentReporter;
    use crate::task_record::TaskKind;
    use std::time::Duration;

    struct InstantExecutor;

    impl TaskExecutor for InstantExecutor {
        fn execute(&mut self, _kind: TaskKind) -> Duration {
            Duration::from_micros(1)
        }
    }

    fn seeded(batch_size: usize, participants: usize) -> DispatchConfig {
        DispatchConfig {
            batch_size,
            participants,
            seed: Some(11),
            ..DispatchConfig::default()
        }
    }

    #[test]
    fn test_static_plan_covers_batch() {
        let config = seeded(40, 4);

        let plan = run_static(&config, &mut SilentReporter).unwrap();

        assert_eq!(plan.sizes.len(), 4);
        assert_eq!(plan.total(), 40);
    }

    #[test]
    fn test_static_plan_rejects_empty_batch() {
        let config = seeded(0, 4);

        let result = run_static(&config, &mut SilentReporter);

        assert!(matches!(
            result,
            Err(DispatchError::Config(crate::error::ConfigError::EmptyBatch))
        ));
    }

    #[test]
    fn test_root_failure_prefers_cause_over_knock_on() {
        let failures = vec![
            DispatchError::UnexpectedShutdown { from: 2 },
            DispatchError::Transport(TransportError::Disconnected(1)),
            DispatchError::ParticipantPanicked(2),
        ];

        let root = root_failure(failures);

        assert!(matches!(root, Some(DispatchError::ParticipantPanicked(2))));
        assert!(root_failure(Vec::new()).is_none());
    }

    #[test]
    fn test_single_participant_runs_as_master() {
        let config = seeded(3, 1);
        let mut channels = InMemoryNetwork::new(1).channels();
        let channel = channels.remove(0);

        let outcome = run_participant(channel, InstantExecutor, SilentReporter, &config).unwrap();

        match outcome {
            ParticipantOutcome::Master(report) => assert_eq!(report.completed(), 3),
            ParticipantOutcome::Worker(_) => panic!("rank 0 must run the master"),
        }
    }
}
