// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use crate::frame::{read_frame, write_frame, Envelope};
use std::collections::{HashMap, HashSet};
use std::io::{self, ErrorKind};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{debug, warn};
use work_dispatch_core::error::TransportError;
use work_dispatch_core::mailbox::Mailbox;
use work_dispatch_core::message_channel::{check_target, MessageChannel};
use work_dispatch_core::task_record::{ParticipantId, TaskRecord, MASTER};

/// Binds one loopback listener per participant and returns the endpoints in
/// rank order. Every endpoint knows the address of every peer.
pub fn bind_group(size: usize) -> Result<Vec<SocketChannel>, TransportError> {
    let listeners = (0..size)
        .map(|_| TcpListener::bind(("127.0.0.1", 0)))
        .collect::<io::Result<Vec<_>>>()?;
    let peers = Arc::new(
        listeners
            .iter()
            .map(|listener| listener.local_addr())
            .collect::<io::Result<Vec<_>>>()?,
    );

    listeners
        .into_iter()
        .enumerate()
        .map(|(rank, listener)| SocketChannel::start(rank, listener, Arc::clone(&peers)))
        .collect()
}

/// TCP endpoint of one participant.
///
/// Incoming connections are drained by reader threads into a local
/// [`Mailbox`]. Outgoing streams are opened on first use and kept, one per
/// peer, so records from one sender arrive in the order they were sent.
/// When the master's stream ends the mailbox is closed, mirroring the
/// in-memory group teardown. A master dropped early first sends the sentinel
/// to every worker not yet shut down, so each one has a master stream to
/// observe. A worker dropped before its sentinel sends one to the master,
/// which rejects it and aborts.
pub struct SocketChannel {
    rank: ParticipantId,
    peers: Arc<Vec<SocketAddr>>,
    mailbox: Arc<Mailbox>,
    outgoing: HashMap<ParticipantId, TcpStream>,
    stopped: Arc<AtomicBool>,
    /// Master: workers that were sent the sentinel. Worker: holds `MASTER`
    /// once the sentinel arrived.
    released: HashSet<ParticipantId>,
}

impl SocketChannel {
    fn start(
        rank: ParticipantId,
        listener: TcpListener,
        peers: Arc<Vec<SocketAddr>>,
    ) -> Result<Self, TransportError> {
        let mailbox = Arc::new(Mailbox::new(rank));
        let stopped = Arc::new(AtomicBool::new(false));

        let accept_mailbox = Arc::clone(&mailbox);
        let accept_stopped = Arc::clone(&stopped);
        thread::Builder::new()
            .name(format!("accept-{}", rank))
            .spawn(move || accept_loop(listener, accept_mailbox, accept_stopped))?;

        Ok(Self {
            rank,
            peers,
            mailbox,
            outgoing: HashMap::new(),
            stopped,
            released: HashSet::new(),
        })
    }

    fn observe(&mut self, from: ParticipantId, record: &TaskRecord) {
        if from == MASTER && record.is_shutdown() {
            self.released.insert(MASTER);
        }
    }

    /// Best-effort notices sent on drop so no peer waits on this endpoint
    fn notify_departure(&mut self) {
        let shutdown = TaskRecord::shutdown();
        if self.rank == MASTER {
            for rank in 1..self.peers.len() {
                if !self.released.contains(&rank) {
                    let _ = self.send(rank, &shutdown);
                }
            }
        } else if !self.released.contains(&MASTER) {
            let _ = self.send(MASTER, &shutdown);
        }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.peers[self.rank]
    }

    fn stream_to(&mut self, to: ParticipantId) -> Result<&mut TcpStream, TransportError> {
        check_target(to, self.peers.len())?;
        if !self.outgoing.contains_key(&to) {
            let stream =
                TcpStream::connect(self.peers[to]).map_err(|e| peer_error(to, e))?;
            stream.set_nodelay(true)?;
            debug!(from = self.rank, to, "opened outgoing stream");
            self.outgoing.insert(to, stream);
        }
        self.outgoing
            .get_mut(&to)
            .ok_or(TransportError::Disconnected(to))
    }
}

impl MessageChannel for SocketChannel {
    fn rank(&self) -> ParticipantId {
        self.rank
    }

    fn size(&self) -> usize {
        self.peers.len()
    }

    fn send(&mut self, to: ParticipantId, record: &TaskRecord) -> Result<(), TransportError> {
        let envelope = Envelope {
            from: self.rank,
            record: *record,
        };
        let stream = self.stream_to(to)?;
        let result = write_frame(stream, &envelope);
        if result.is_err() {
            self.outgoing.remove(&to);
        } else if self.rank == MASTER && record.is_shutdown() {
            self.released.insert(to);
        }
        result.map_err(|e| match e {
            TransportError::Io(io) => peer_error(to, io),
            other => other,
        })
    }

    fn recv_from(&mut self, from: ParticipantId) -> Result<TaskRecord, TransportError> {
        check_target(from, self.size())?;
        let record = self.mailbox.take_from(from)?;
        self.observe(from, &record);
        Ok(record)
    }

    fn recv_any(&mut self) -> Result<(ParticipantId, TaskRecord), TransportError> {
        let (from, record) = self.mailbox.take_any()?;
        self.observe(from, &record);
        Ok((from, record))
    }

    fn probe(&mut self) -> Result<bool, TransportError> {
        Ok(self.mailbox.has_pending())
    }
}

impl Drop for SocketChannel {
    fn drop(&mut self) {
        self.notify_departure();
        for stream in self.outgoing.values() {
            let _ = stream.shutdown(Shutdown::Write);
        }
        self.mailbox.close();
        self.stopped.store(true, Ordering::SeqCst);
        // Wake the acceptor so it can observe the stop flag
        let _ = TcpStream::connect(self.local_addr());
    }
}

fn peer_error(to: ParticipantId, error: io::Error) -> TransportError {
    match error.kind() {
        ErrorKind::ConnectionRefused
        | ErrorKind::ConnectionReset
        | ErrorKind::ConnectionAborted
        | ErrorKind::BrokenPipe => TransportError::Disconnected(to),
        _ => TransportError::Io(error),
    }
}

fn accept_loop(listener: TcpListener, mailbox: Arc<Mailbox>, stopped: Arc<AtomicBool>) {
    for stream in listener.incoming() {
        if stopped.load(Ordering::SeqCst) {
            break;
        }
        match stream {
            Ok(stream) => {
                let mailbox = Arc::clone(&mailbox);
                let spawned = thread::Builder::new()
                    .name(format!("reader-{}", mailbox.owner()))
                    .spawn(move || read_loop(stream, mailbox));
                if let Err(e) = spawned {
                    warn!(error = %e, "failed to spawn reader thread");
                }
            }
            Err(e) => warn!(error = %e, "accept failed"),
        }
    }
}

fn read_loop(mut stream: TcpStream, mailbox: Arc<Mailbox>) {
    let mut peer = None;
    loop {
        match read_frame(&mut stream) {
            Ok(Some(envelope)) => {
                peer = Some(envelope.from);
                if mailbox.push(envelope.from, envelope.record).is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!(owner = mailbox.owner(), ?peer, error = %e, "dropping connection");
                break;
            }
        }
    }

    if peer == Some(MASTER) && mailbox.owner() != MASTER {
        debug!(owner = mailbox.owner(), "master stream ended");
        mailbox.close();
    }
}
