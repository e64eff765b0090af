// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! The batch arena owned by the master, addressed by task id.

use crate::error::{ConfigError, DispatchError};
use crate::task_record::{ParticipantId, TaskId, TaskKind, TaskRecord};
use rand::Rng;
use tracing::warn;

/// Ownership state of one slot of the batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Unassigned,
    Assigned { owner: ParticipantId },
    Completed { by: ParticipantId },
}

/// Outcome of folding a returned record back into the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Recorded,
    /// The sender did not hold that task; the queue was left untouched
    Discarded,
}

pub struct TaskQueue {
    records: Vec<TaskRecord>,
    slots: Vec<SlotState>,
    head: usize,
}

impl TaskQueue {
    /// Generates `batch_size` tasks with sequential ids and random kinds.
    pub fn generate(batch_size: usize, rng: &mut impl Rng) -> Result<Self, ConfigError> {
        let kinds = (0..batch_size).map(|_| TaskKind::random(rng)).collect();
        Self::from_kinds(kinds)
    }

    pub fn from_kinds(kinds: Vec<TaskKind>) -> Result<Self, ConfigError> {
        if kinds.is_empty() {
            return Err(ConfigError::EmptyBatch);
        }
        let records: Vec<TaskRecord> = kinds
            .into_iter()
            .enumerate()
            .map(|(id, kind)| TaskRecord::new(id as TaskId, kind))
            .collect();
        let slots = vec![SlotState::Unassigned; records.len()];
        Ok(Self {
            records,
            slots,
            head: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Index of the next never-assigned record.
    pub fn head(&self) -> usize {
        self.head
    }

    pub fn has_work(&self) -> bool {
        self.head < self.records.len()
    }

    pub fn records(&self) -> &[TaskRecord] {
        &self.records
    }

    pub fn kinds(&self) -> Vec<TaskKind> {
        self.records.iter().map(|r| r.kind).collect()
    }

    pub fn slot(&self, id: TaskId) -> Option<SlotState> {
        self.slots.get(id as usize).copied()
    }

    /// Participant that computed the task, if it has been completed.
    pub fn completed_by(&self, id: TaskId) -> Option<ParticipantId> {
        match self.slot(id)? {
            SlotState::Completed { by } => Some(by),
            _ => None,
        }
    }

    pub fn is_fully_completed(&self) -> bool {
        self.slots
            .iter()
            .all(|slot| matches!(slot, SlotState::Completed { .. }))
    }

    /// Hands the record at the cursor to `owner` and advances the cursor.
    pub fn assign_next(&mut self, owner: ParticipantId) -> Option<TaskRecord> {
        if !self.has_work() {
            return None;
        }
        let index = self.head;
        self.head += 1;
        self.slots[index] = SlotState::Assigned { owner };
        Some(self.records[index])
    }

    /// Stores a returned record at its id slot.
    ///
    /// Ids outside the batch are a protocol violation. A record for a slot
    /// that `from` does not currently hold is discarded.
    pub fn record_completion(
        &mut self,
        from: ParticipantId,
        record: TaskRecord,
    ) -> Result<Completion, DispatchError> {
        if !record.is_live(self.records.len()) {
            return Err(DispatchError::ProtocolViolation {
                from,
                id: record.id,
            });
        }

        let index = record.id as usize;
        match self.slots[index] {
            SlotState::Assigned { owner } if owner == from => {
                self.records[index] = record;
                self.slots[index] = SlotState::Completed { by: from };
                Ok(Completion::Recorded)
            }
            state => {
                warn!(
                    from,
                    task = record.id,
                    ?state,
                    "discarding completion for a task the sender does not hold"
                );
                Ok(Completion::Discarded)
            }
        }
    }
}
