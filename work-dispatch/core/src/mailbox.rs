// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Ordered inbox of one participant, shared by every transport.

use crate::error::TransportError;
use crate::task_record::{ParticipantId, TaskRecord};
use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

pub struct Mailbox {
    owner: ParticipantId,
    inner: Mutex<MailboxState>,
    available: Condvar,
}

struct MailboxState {
    queue: VecDeque<(ParticipantId, TaskRecord)>,
    closed: bool,
}

impl Mailbox {
    pub fn new(owner: ParticipantId) -> Self {
        Self {
            owner,
            inner: Mutex::new(MailboxState {
                queue: VecDeque::new(),
                closed: false,
            }),
            available: Condvar::new(),
        }
    }

    pub fn owner(&self) -> ParticipantId {
        self.owner
    }

    fn lock(&self) -> MutexGuard<'_, MailboxState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue a record; fails once the mailbox is closed.
    pub fn push(&self, from: ParticipantId, record: TaskRecord) -> Result<(), TransportError> {
        let mut guard = self.lock();
        if guard.closed {
            return Err(TransportError::Disconnected(self.owner));
        }
        guard.queue.push_back((from, record));
        self.available.notify_all();
        Ok(())
    }

    /// Block until any record is queued. Pending records are still handed
    /// out after `close`.
    pub fn take_any(&self) -> Result<(ParticipantId, TaskRecord), TransportError> {
        let mut guard = self.lock();
        loop {
            if let Some(message) = guard.queue.pop_front() {
                return Ok(message);
            }
            if guard.closed {
                return Err(TransportError::Disconnected(self.owner));
            }
            guard = self
                .available
                .wait(guard)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Block until a record from `from` is queued. Records from other
    /// senders stay in place, so each sender's order is preserved.
    pub fn take_from(&self, from: ParticipantId) -> Result<TaskRecord, TransportError> {
        let mut guard = self.lock();
        loop {
            if let Some(pos) = guard.queue.iter().position(|(sender, _)| *sender == from) {
                if let Some((_, record)) = guard.queue.remove(pos) {
                    return Ok(record);
                }
            }
            if guard.closed {
                return Err(TransportError::Disconnected(self.owner));
            }
            guard = self
                .available
                .wait(guard)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    pub fn has_pending(&self) -> bool {
        !self.lock().queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reject further pushes and wake every blocked receiver.
    pub fn close(&self) {
        let mut guard = self.lock();
        guard.closed = true;
        self.available.notify_all();
    }
}
