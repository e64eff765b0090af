// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Wire format: a `u32` big-endian length followed by a JSON envelope.

use serde::{Deserialize, Serialize};
use std::io::{ErrorKind, Read, Write};
use work_dispatch_core::error::TransportError;
use work_dispatch_core::task_record::{ParticipantId, TaskRecord};

/// Frames larger than this are treated as a corrupt stream
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// One record tagged with its sender
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub from: ParticipantId,
    pub record: TaskRecord,
}

pub fn write_frame<W: Write>(writer: &mut W, envelope: &Envelope) -> Result<(), TransportError> {
    let payload = serde_json::to_vec(envelope)?;
    let len = payload.len() as u32;
    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(&payload)?;
    writer.flush()?;
    Ok(())
}

/// Reads the next frame. Returns `None` when the stream ends cleanly on a
/// frame boundary.
pub fn read_frame<R: Read>(reader: &mut R) -> Result<Option<Envelope>, TransportError> {
    let mut len_bytes = [0u8; 4];
    match reader.read_exact(&mut len_bytes) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_be_bytes(len_bytes) as usize;
    if len > MAX_FRAME_LEN {
        return Err(std::io::Error::new(
            ErrorKind::InvalidData,
            format!("frame of {} bytes exceeds {}", len, MAX_FRAME_LEN),
        )
        .into());
    }
    let mut buffer = vec![0u8; len];
    reader.read_exact(&mut buffer)?;
    Ok(Some(serde_json::from_slice(&buffer)?))
}
