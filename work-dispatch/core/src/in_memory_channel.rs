// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use crate::error::TransportError;
use crate::mailbox::Mailbox;
use crate::message_channel::{check_target, MessageChannel};
use crate::task_record::{ParticipantId, TaskRecord, MASTER};
use std::sync::Arc;

/// In-process group of mailboxes, one per participant.
#[derive(Clone)]
pub struct InMemoryNetwork {
    mailboxes: Arc<Vec<Arc<Mailbox>>>,
}

impl InMemoryNetwork {
    pub fn new(size: usize) -> Self {
        let mailboxes = (0..size).map(|rank| Arc::new(Mailbox::new(rank))).collect();
        Self {
            mailboxes: Arc::new(mailboxes),
        }
    }

    pub fn size(&self) -> usize {
        self.mailboxes.len()
    }

    pub fn channel(&self, rank: ParticipantId) -> InMemoryChannel {
        InMemoryChannel {
            rank,
            network: self.clone(),
            released: false,
        }
    }

    /// One endpoint per rank, in rank order
    pub fn channels(&self) -> Vec<InMemoryChannel> {
        (0..self.size()).map(|rank| self.channel(rank)).collect()
    }

    /// Records waiting in the mailbox of `rank`
    pub fn pending(&self, rank: ParticipantId) -> usize {
        self.mailboxes.get(rank).map(|m| m.len()).unwrap_or(0)
    }

    fn mailbox(&self, rank: ParticipantId) -> Result<&Mailbox, TransportError> {
        check_target(rank, self.size())?;
        Ok(&self.mailboxes[rank])
    }
}

/// Endpoint of one participant on an [`InMemoryNetwork`].
///
/// Dropping the endpoint closes its mailbox, so later sends to a departed
/// participant fail instead of queueing forever. A worker dropped before it
/// received the shutdown sentinel leaves a sentinel in the master's mailbox,
/// which the master rejects. Dropping the master endpoint tears the whole
/// group down: records already queued can still be drained, after which
/// every blocked receive fails.
pub struct InMemoryChannel {
    rank: ParticipantId,
    network: InMemoryNetwork,
    /// Set once the master's shutdown sentinel has been received
    released: bool,
}

impl InMemoryChannel {
    fn observe(&mut self, from: ParticipantId, record: &TaskRecord) {
        if from == MASTER && record.is_shutdown() {
            self.released = true;
        }
    }
}

impl MessageChannel for InMemoryChannel {
    fn rank(&self) -> ParticipantId {
        self.rank
    }

    fn size(&self) -> usize {
        self.network.size()
    }

    fn send(&mut self, to: ParticipantId, record: &TaskRecord) -> Result<(), TransportError> {
        self.network.mailbox(to)?.push(self.rank, *record)
    }

    fn recv_from(&mut self, from: ParticipantId) -> Result<TaskRecord, TransportError> {
        check_target(from, self.size())?;
        let record = self.network.mailbox(self.rank)?.take_from(from)?;
        self.observe(from, &record);
        Ok(record)
    }

    fn recv_any(&mut self) -> Result<(ParticipantId, TaskRecord), TransportError> {
        let (from, record) = self.network.mailbox(self.rank)?.take_any()?;
        self.observe(from, &record);
        Ok((from, record))
    }

    fn probe(&mut self) -> Result<bool, TransportError> {
        Ok(self.network.mailbox(self.rank)?.has_pending())
    }
}

impl Drop for InMemoryChannel {
    fn drop(&mut self) {
        if self.rank == MASTER {
            self.network.mailboxes.iter().for_each(|mailbox| mailbox.close());
            return;
        }
        if !self.released {
            let _ = self.send(MASTER, &TaskRecord::shutdown());
        }
        if let Ok(mailbox) = self.network.mailbox(self.rank) {
            mailbox.close();
        }
    }
}
