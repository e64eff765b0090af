// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use crate::error::TransportError;
use crate::task_record::{ParticipantId, TaskRecord};

/// Point-to-point messaging between the participants of one run.
///
/// Delivery must be reliable and ordered per sender. Different implementations
/// back this with in-process mailboxes, sockets, etc.
pub trait MessageChannel: Send {
    /// Rank of the participant owning this endpoint
    fn rank(&self) -> ParticipantId;

    /// Number of participants in the group
    fn size(&self) -> usize;

    /// Send a record to a specific participant
    fn send(&mut self, to: ParticipantId, record: &TaskRecord) -> Result<(), TransportError>;

    /// Block until a record from `from` arrives
    fn recv_from(&mut self, from: ParticipantId) -> Result<TaskRecord, TransportError>;

    /// Block until a record from any participant arrives
    fn recv_any(&mut self) -> Result<(ParticipantId, TaskRecord), TransportError>;

    /// Report whether a record is deliverable right now, without consuming it
    fn probe(&mut self) -> Result<bool, TransportError>;
}

/// Rejects ranks outside a group of `size` participants
pub fn check_target(to: ParticipantId, size: usize) -> Result<(), TransportError> {
    if to >= size {
        return Err(TransportError::UnknownParticipant { target: to, size });
    }
    Ok(())
}
