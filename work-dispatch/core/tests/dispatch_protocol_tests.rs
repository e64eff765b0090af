use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use work_dispatch_core::error::{ConfigError, DispatchError};
use work_dispatch_core::in_memory_channel::{InMemoryChannel, InMemoryNetwork};
use work_dispatch_core::master::MasterDispatcher;
use work_dispatch_core::message_channel::MessageChannel;
use work_dispatch_core::reporter::{Reporter, SilentReporter};
use work_dispatch_core::task_executor::TaskExecutor;
use work_dispatch_core::task_queue::{SlotState, TaskQueue};
use work_dispatch_core::task_record::{TaskKind, TaskRecord, MASTER};

/// Returns a kind-dependent duration without sleeping
struct InstantExecutor;

impl TaskExecutor for InstantExecutor {
    fn execute(&mut self, kind: TaskKind) -> Duration {
        Duration::from_millis(kind.value() as u64 + 1)
    }
}

#[derive(Clone, Default)]
struct RecordingReporter {
    events: Arc<Mutex<Vec<String>>>,
}

impl RecordingReporter {
    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

impl Reporter for RecordingReporter {
    fn participant_finished(&mut self, participant: usize) {
        self.events
            .lock()
            .unwrap()
            .push(format!("finished {}", participant));
    }

    fn shutdown_progress(&mut self, rank: usize, finished: usize, total: usize) {
        self.events
            .lock()
            .unwrap()
            .push(format!("[{}] progress {}/{}", rank, finished, total));
    }
}

fn queue(values: &[u8]) -> TaskQueue {
    let kinds = values.iter().map(|v| TaskKind::new(*v).unwrap()).collect();
    TaskQueue::from_kinds(kinds).unwrap()
}

fn master_on(
    network: &InMemoryNetwork,
    values: &[u8],
    master_computes: bool,
) -> MasterDispatcher<InMemoryChannel, InstantExecutor, SilentReporter> {
    MasterDispatcher::new(
        network.channel(MASTER),
        InstantExecutor,
        SilentReporter,
        queue(values),
        master_computes,
    )
    .unwrap()
}

/// Worker side of one exchange: take a task and hand it back completed.
/// Returns `None` on the shutdown sentinel.
fn serve_one(worker: &mut InMemoryChannel) -> Option<TaskRecord> {
    let mut record = worker.recv_from(MASTER).unwrap();
    if record.is_shutdown() {
        return None;
    }
    record.complete(Duration::from_millis(5));
    worker.send(MASTER, &record).unwrap();
    Some(record)
}

#[test]
fn test_two_participants_share_four_tasks() {
    // Arrange
    let network = InMemoryNetwork::new(2);
    let mut worker = network.channel(1);
    let mut master = master_on(&network, &[0, 1, 2, 3], true);

    // Act: seeding
    master.seed().unwrap();

    // Assert
    assert_eq!(master.local_task().map(|t| t.id), Some(0));
    assert_eq!(network.pending(1), 1);

    // Act: worker returns task 1 while the master computes task 0
    assert_eq!(serve_one(&mut worker).map(|t| t.id), Some(1));
    assert!(master.work_local().unwrap());

    // Assert
    assert_eq!(master.queue().completed_by(0), Some(MASTER));
    assert_eq!(master.queue().completed_by(1), Some(1));
    assert_eq!(master.queue().slot(2), Some(SlotState::Assigned { owner: 1 }));
    assert_eq!(master.local_task().map(|t| t.id), Some(3));

    // Act: worker returns task 2 while the master computes task 3
    assert_eq!(serve_one(&mut worker).map(|t| t.id), Some(2));
    assert!(!master.work_local().unwrap());

    // Assert: the worker has been shut down, the master not yet
    assert_eq!(master.finished_count(), 1);
    assert!(master.is_finished(1));
    assert!(!master.is_finished(MASTER));

    master.finish_participant(MASTER).unwrap();
    assert_eq!(master.finished_count(), 2);
    assert_eq!(serve_one(&mut worker), None);

    let queue = master.queue();
    assert!(queue.is_fully_completed());
    assert_eq!(queue.completed_by(2), Some(1));
    assert_eq!(queue.completed_by(3), Some(MASTER));
    assert!(queue.records().iter().all(|r| r.duration.is_some()));
    assert_eq!(queue.records()[3].duration, Some(Duration::from_millis(4)));
}

#[test]
fn test_excess_participants_are_shut_down_at_seed() {
    // Arrange
    let network = InMemoryNetwork::new(5);
    let mut workers: Vec<_> = (1..5).map(|rank| network.channel(rank)).collect();
    let mut master = master_on(&network, &[2, 4], true);

    // Act
    master.seed().unwrap();

    // Assert
    assert_eq!(master.finished_count(), 3);
    for worker in workers.iter_mut().skip(1) {
        assert!(worker.recv_from(MASTER).unwrap().is_shutdown());
    }

    assert_eq!(serve_one(&mut workers[0]).map(|t| t.id), Some(1));
    assert!(!master.work_local().unwrap());
    assert_eq!(master.finished_count(), 4);

    master.finish_participant(MASTER).unwrap();
    assert_eq!(master.finished_count(), 5);
    assert!(master.queue().is_fully_completed());
}

#[test]
fn test_dispatch_only_master_never_computes() {
    // Arrange
    let network = InMemoryNetwork::new(2);
    let mut worker = network.channel(1);
    let mut master = master_on(&network, &[0, 0, 0], false);

    // Act
    master.seed().unwrap();
    let mut shutdowns = Vec::new();
    while serve_one(&mut worker).is_some() {
        shutdowns.push(master.drain(true).unwrap());
    }

    // Assert
    assert!(master.local_task().is_none());
    assert_eq!(shutdowns, vec![0, 0, 1]);
    assert!((0..3).all(|id| master.queue().completed_by(id) == Some(1)));
}

#[test]
fn test_out_of_range_completion_is_a_protocol_violation() {
    // Arrange
    let network = InMemoryNetwork::new(2);
    let mut worker = network.channel(1);
    let mut master = master_on(&network, &[0, 1], true);
    master.seed().unwrap();

    // Act
    worker
        .send(MASTER, &TaskRecord::new(99, TaskKind::new(1).unwrap()))
        .unwrap();
    let result = master.drain(true);

    // Assert
    assert!(matches!(
        result,
        Err(DispatchError::ProtocolViolation { from: 1, id: 99 })
    ));
}

#[test]
fn test_returned_sentinel_is_rejected() {
    // Arrange
    let network = InMemoryNetwork::new(2);
    let mut worker = network.channel(1);
    let mut master = master_on(&network, &[0, 1], true);
    master.seed().unwrap();

    // Act
    worker.send(MASTER, &TaskRecord::shutdown()).unwrap();
    let result = master.drain(false);

    // Assert
    assert!(matches!(
        result,
        Err(DispatchError::UnexpectedShutdown { from: 1 })
    ));
}

#[test]
fn test_completion_for_unheld_task_is_discarded_and_worker_refed() {
    // Arrange
    let network = InMemoryNetwork::new(2);
    let mut worker = network.channel(1);
    let mut master = master_on(&network, &[0, 1, 2], true);
    master.seed().unwrap();
    assert_eq!(worker.recv_from(MASTER).unwrap().id, 1);

    // Act: report task 2, which was never handed out
    let mut forged = TaskRecord::new(2, TaskKind::new(2).unwrap());
    forged.complete(Duration::from_secs(1));
    worker.send(MASTER, &forged).unwrap();
    let shutdowns = master.drain(true).unwrap();

    // Assert
    assert_eq!(shutdowns, 0);
    assert_eq!(worker.recv_from(MASTER).unwrap().id, 2);
    assert_eq!(master.queue().records()[2].duration, None);
    assert_eq!(master.queue().slot(1), Some(SlotState::Assigned { owner: 1 }));
}

#[test]
fn test_participant_cannot_be_finished_twice() {
    // Arrange
    let network = InMemoryNetwork::new(2);
    let mut master = master_on(&network, &[0], true);

    // Act
    master.finish_participant(MASTER).unwrap();
    let result = master.finish_participant(MASTER);

    // Assert
    assert!(matches!(result, Err(DispatchError::DuplicateShutdown(0))));
    assert_eq!(master.finished_count(), 1);
}

#[test]
fn test_dispatch_only_master_requires_a_worker() {
    let network = InMemoryNetwork::new(1);

    let result = MasterDispatcher::new(
        network.channel(MASTER),
        InstantExecutor,
        SilentReporter,
        queue(&[0]),
        false,
    );

    assert!(matches!(
        result,
        Err(DispatchError::Config(ConfigError::NoComputeParticipants {
            participants: 1
        }))
    ));
}

#[test]
fn test_lone_master_computes_whole_batch() {
    // Arrange
    let network = InMemoryNetwork::new(1);
    let reporter = RecordingReporter::default();
    let mut master = MasterDispatcher::new(
        network.channel(MASTER),
        InstantExecutor,
        reporter.clone(),
        queue(&[0, 1, 2, 3, 4]),
        true,
    )
    .unwrap();

    // Act
    let report = master.run().unwrap();

    // Assert
    assert_eq!(report.completed(), 5);
    assert_eq!(report.per_participant[0].count, 5);
    assert_eq!(report.per_kind.iter().map(|s| s.count).sum::<usize>(), 5);
    assert_eq!(reporter.events(), vec!["finished 0", "[0] progress 1/1"]);
}

/// Replays one fixed interleaving on a seeded B=6, P=3 batch and returns the
/// final records with the participant that computed each.
fn scripted_run(seed: u64) -> (Vec<TaskRecord>, Vec<Option<usize>>) {
    let network = InMemoryNetwork::new(3);
    let mut workers = vec![network.channel(1), network.channel(2)];
    let batch = TaskQueue::generate(6, &mut StdRng::seed_from_u64(seed)).unwrap();
    let mut master = MasterDispatcher::new(
        network.channel(MASTER),
        InstantExecutor,
        SilentReporter,
        batch,
        true,
    )
    .unwrap();

    master.seed().unwrap();
    let mut active = vec![true; workers.len()];
    loop {
        for (worker, active) in workers.iter_mut().zip(active.iter_mut()) {
            if *active && serve_one(worker).is_none() {
                *active = false;
            }
        }
        if !master.work_local().unwrap() {
            break;
        }
    }
    master.finish_participant(MASTER).unwrap();
    assert_eq!(master.finished_count(), 3);
    for worker in workers.iter_mut() {
        assert_eq!(serve_one(worker), None);
    }

    let queue = master.queue();
    let owners = (0..6).map(|id| queue.completed_by(id)).collect();
    (queue.records().to_vec(), owners)
}

#[test]
fn test_fixed_trace_is_reproducible() {
    // Act
    let (first_records, first_owners) = scripted_run(42);
    let (second_records, second_owners) = scripted_run(42);

    // Assert
    assert_eq!(first_records, second_records);
    assert_eq!(first_owners, second_owners);
    assert_eq!(
        first_owners,
        vec![Some(0), Some(1), Some(2), Some(1), Some(2), Some(0)]
    );
    assert!(first_records.iter().all(|r| r.is_completed()));
}
