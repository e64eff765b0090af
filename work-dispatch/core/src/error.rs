// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use crate::task_record::{ParticipantId, TaskId};
use thiserror::Error;

/// Failures of the messaging layer. None of these are recoverable by the
/// dispatcher; they abort the participant that observed them.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("participant {0} is disconnected")]
    Disconnected(ParticipantId),

    #[error("participant {target} is outside the group of {size}")]
    UnknownParticipant { target: ParticipantId, size: usize },

    #[error("socket i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("frame codec failed: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Invalid run parameters, detected before any message is sent.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("batch must contain at least one task")]
    EmptyBatch,

    #[error("at least one participant is required")]
    NoParticipants,

    #[error("a dispatch-only master needs at least one worker, got {participants} participant(s)")]
    NoComputeParticipants { participants: usize },

    #[error("time scale must lie within 0..=1000, got {0}")]
    InvalidTimeScale(f64),

    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Errors that abort a dispatch run.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("participant {from} sent task id {id}, which is neither live nor the shutdown sentinel")]
    ProtocolViolation { from: ParticipantId, id: TaskId },

    #[error("participant {from} sent a shutdown record back to the master")]
    UnexpectedShutdown { from: ParticipantId },

    #[error("participant {0} was already shut down")]
    DuplicateShutdown(ParticipantId),

    #[error("participant {0} panicked")]
    ParticipantPanicked(ParticipantId),

    #[error("master finished without producing a run report")]
    MissingReport,

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
