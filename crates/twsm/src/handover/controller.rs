// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Handover controller.
//!
//! ```text
//! Idle -> Vetoing -> Marshalling -> AwaitingTransport -> Unmarshalling
//!      -> Committing -> Completed
//! ```
//!
//! `Aborted` is reachable from every other state. After `Completed` or
//! `Aborted` the controller reports `Idle` and keeps the [`Outcome`].
//!
//! The sending device runs veto, marshal, commit(false), complete; the
//! receiving device runs veto, unmarshal, commit(true), complete. Both use
//! the same adapter order, which defines the client ids on the wire.

use super::framing::{Chunk, RecordParser, RecordWriter};
use super::{HandoverInterface, HandoverState, Outcome, Progress};
use crate::bdaddr::BdAddr;
use crate::config::{
    CorruptStreamPolicy, HandoverConfig, RuntimeConfig, MAX_CLIENTS, RECORD_HEADER_LEN,
};
use crate::error::{Error, Result};
use crate::transport::{SharedStreamMap, StreamMap};
use std::sync::Arc;
use std::time::Instant;

/// Per-client receive state.
#[derive(Debug, Clone, Copy, Default)]
struct ClientRx {
    started: bool,
    finished: bool,
}

/// State of the current attempt.
#[derive(Debug)]
struct Attempt {
    peer: BdAddr,
    config: Arc<HandoverConfig>,
    deadline: Instant,
    /// Next client to marshal.
    tx_client: usize,
    parser: Option<RecordParser>,
    rx: Vec<ClientRx>,
    stream_done: bool,
    new_role: bool,
}

/// Drives the registered adapters through one handover at a time.
pub struct HandoverController {
    clients: Vec<Box<dyn HandoverInterface>>,
    config: RuntimeConfig,
    stream_map: SharedStreamMap,
    state: HandoverState,
    attempt: Option<Attempt>,
    outcome: Option<Outcome>,
}

impl HandoverController {
    pub fn new(config: RuntimeConfig) -> Self {
        Self {
            clients: Vec::new(),
            config,
            stream_map: StreamMap::shared(),
            state: HandoverState::Idle,
            attempt: None,
            outcome: None,
        }
    }

    /// Controller with a fixed configuration.
    pub fn with_config(config: HandoverConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(RuntimeConfig::new(config)))
    }

    /// Stream map whose commit window this controller opens. Adapters bind
    /// their handles through it.
    pub fn stream_map(&self) -> SharedStreamMap {
        Arc::clone(&self.stream_map)
    }

    /// Live configuration; a new attempt snapshots it at veto.
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Append an adapter. Its position is its client id on the wire.
    pub fn register(&mut self, adapter: Box<dyn HandoverInterface>) -> Result<u8> {
        if self.state != HandoverState::Idle {
            return Err(Error::InvalidState {
                operation: "register",
                state: self.state,
            });
        }
        if self.clients.len() >= MAX_CLIENTS {
            return Err(Error::TooManyClients);
        }
        let id = self.clients.len() as u8;
        log::debug!("[handover] client {} = {}", id, adapter.name());
        self.clients.push(adapter);
        Ok(id)
    }

    pub fn client_names(&self) -> Vec<&'static str> {
        self.clients.iter().map(|c| c.name()).collect()
    }

    pub fn state(&self) -> HandoverState {
        self.state
    }

    /// Outcome of the last finished attempt.
    pub fn last_outcome(&self) -> Option<Outcome> {
        self.outcome
    }

    /// Peer of the attempt in progress.
    pub fn peer(&self) -> Option<BdAddr> {
        self.attempt.as_ref().map(|a| a.peer)
    }

    fn expect_state(&self, operation: &'static str, allowed: &[HandoverState]) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(Error::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    fn enter(&mut self, state: HandoverState) {
        if self.state != state {
            log::info!("[handover] {} -> {}", self.state, state);
            self.state = state;
        }
    }

    fn finish(&mut self, outcome: Outcome) {
        self.enter(match outcome {
            Outcome::Completed => HandoverState::Completed,
            _ => HandoverState::Aborted,
        });
        self.attempt = None;
        self.outcome = Some(outcome);
        self.enter(HandoverState::Idle);
    }

    /// Ask every adapter whether the handover may start. Returns `true`
    /// when some adapter vetoed; the controller is then back to `Idle`
    /// with no adapter touched further.
    pub fn veto(&mut self, peer: BdAddr, now: Instant) -> Result<bool> {
        self.expect_state("veto", &[HandoverState::Idle])?;
        self.enter(HandoverState::Vetoing);

        if let Some(client) = self.clients.iter().find(|c| c.veto()) {
            log::warn!("[handover] vetoed by {}", client.name());
            self.enter(HandoverState::Idle);
            self.outcome = Some(Outcome::Vetoed);
            return Ok(true);
        }

        let config = self.config.get();
        log::debug!(
            "[handover] veto passed for {} (format={}, timeout={:?})",
            peer,
            config.wire_format,
            config.transfer_timeout
        );
        for client in self.clients.iter_mut() {
            client.begin(&config);
        }
        self.attempt = Some(Attempt {
            peer,
            deadline: now + config.transfer_timeout,
            config,
            tx_client: 0,
            parser: None,
            rx: vec![ClientRx::default(); self.clients.len()],
            stream_done: false,
            new_role: false,
        });
        Ok(false)
    }

    /// Fill `buf` with the next part of the stream. `done` once the END tag
    /// has been written; the controller then awaits transport.
    pub fn marshal(&mut self, buf: &mut [u8]) -> Result<Progress> {
        self.expect_state("marshal", &[HandoverState::Vetoing, HandoverState::Marshalling])?;
        let result = self.marshal_records(buf);
        if let Err(e) = &result {
            log::error!("[handover] marshal failed: {}", e);
            if !matches!(e, Error::BufferTooSmall { .. }) {
                self.abort_all();
            }
        }
        result
    }

    fn marshal_records(&mut self, buf: &mut [u8]) -> Result<Progress> {
        let attempt = self.attempt.as_mut().ok_or(Error::InvalidState {
            operation: "marshal",
            state: self.state,
        })?;
        if attempt.tx_client < self.clients.len() && buf.len() <= RECORD_HEADER_LEN {
            return Err(Error::BufferTooSmall {
                needed: RECORD_HEADER_LEN + 1,
                available: buf.len(),
            });
        }
        if self.state == HandoverState::Vetoing {
            log::info!("[handover] {} -> {}", self.state, HandoverState::Marshalling);
            self.state = HandoverState::Marshalling;
        }

        let peer = attempt.peer;
        let mut writer = RecordWriter::new(buf, attempt.config.max_record_len);
        while attempt.tx_client < self.clients.len() {
            if !writer.has_room_for_record() {
                return Ok(Progress::partial(writer.written()));
            }
            let id = attempt.tx_client;
            let client = &mut self.clients[id];
            let progress = writer.record(id as u8, |dest| client.marshal(&peer, dest))?;
            log::debug!(
                "[handover] {} wrote {} bytes{}",
                client.name(),
                progress.bytes,
                if progress.done { ", done" } else { "" }
            );
            if progress.done {
                attempt.tx_client += 1;
            } else if progress.bytes == 0 {
                return Err(Error::profile(client.name(), "marshal made no progress"));
            }
        }

        if !writer.end() {
            return Ok(Progress::partial(writer.written()));
        }
        log::info!("[handover] {} -> {}", self.state, HandoverState::AwaitingTransport);
        self.state = HandoverState::AwaitingTransport;
        Ok(Progress::done(writer.written()))
    }

    /// Consume the next slice of the stream. `done` once END was parsed.
    pub fn unmarshal(&mut self, bytes: &[u8]) -> Result<Progress> {
        self.expect_state(
            "unmarshal",
            &[
                HandoverState::Vetoing,
                HandoverState::AwaitingTransport,
                HandoverState::Unmarshalling,
            ],
        )?;
        self.enter(HandoverState::Unmarshalling);
        match self.unmarshal_records(bytes) {
            Ok(progress) => Ok(progress),
            Err(e) => Err(self.fail_stream(e)),
        }
    }

    fn unmarshal_records(&mut self, bytes: &[u8]) -> Result<Progress> {
        let clients = self.clients.len();
        let attempt = self.attempt.as_mut().ok_or(Error::InvalidState {
            operation: "unmarshal",
            state: HandoverState::Unmarshalling,
        })?;
        if attempt.stream_done && !bytes.is_empty() {
            return Err(Error::CorruptStream(format!("{} bytes after END", bytes.len())));
        }
        let peer = attempt.peer;
        let parser = attempt.parser.get_or_insert_with(|| RecordParser::new(clients));

        let mut input = bytes;
        while let Some(chunk) = parser.next(&mut input)? {
            match chunk {
                Chunk::Data {
                    client: id,
                    data,
                    record_end,
                } => {
                    let slot = usize::from(id);
                    let client = &mut self.clients[slot];
                    if attempt.rx[slot].finished {
                        return Err(Error::CorruptStream(format!(
                            "record for finished client {}",
                            client.name()
                        )));
                    }
                    // Clients send in registration order, one object each.
                    let earlier_open =
                        attempt.rx[..slot].iter().any(|rx| rx.started && !rx.finished);
                    let later_started = attempt.rx[slot + 1..].iter().any(|rx| rx.started);
                    if earlier_open || later_started {
                        return Err(Error::CorruptStream(format!(
                            "record for {} out of order",
                            client.name()
                        )));
                    }
                    if data.is_empty() {
                        continue;
                    }
                    let progress = client.unmarshal(&peer, data)?;
                    attempt.rx[slot].started = true;
                    if progress.done {
                        attempt.rx[slot].finished = true;
                        if progress.bytes != data.len() || !record_end {
                            return Err(Error::CorruptStream(format!(
                                "{} finished without consuming its record",
                                client.name()
                            )));
                        }
                        log::debug!("[handover] {} unmarshalled", client.name());
                    } else if progress.bytes != data.len() {
                        return Err(Error::CorruptStream(format!(
                            "{} consumed {} of {} bytes",
                            client.name(),
                            progress.bytes,
                            data.len()
                        )));
                    }
                }
                Chunk::End => {
                    if let Some(slot) = attempt.rx.iter().position(|rx| rx.started && !rx.finished) {
                        return Err(Error::CorruptStream(format!(
                            "END while {} is mid-object",
                            self.clients[slot].name()
                        )));
                    }
                    if !input.is_empty() {
                        return Err(Error::CorruptStream(format!(
                            "{} bytes after END",
                            input.len()
                        )));
                    }
                    attempt.stream_done = true;
                    log::info!("[handover] stream complete");
                }
            }
        }
        Ok(Progress {
            bytes: bytes.len(),
            done: attempt.stream_done,
        })
    }

    /// Abort the attempt for a failed stream, or panic when so configured.
    fn fail_stream(&mut self, e: Error) -> Error {
        let policy = self
            .attempt
            .as_ref()
            .map(|a| a.config.corrupt_stream)
            .unwrap_or_default();
        let e = match e {
            Error::Marshal(m) if m.is_corruption() => Error::CorruptStream(m.to_string()),
            other => other,
        };
        if e.is_corruption() {
            log::error!("[handover] corrupt stream: {}", e);
            if policy == CorruptStreamPolicy::Panic {
                panic!("corrupt handover stream: {}", e);
            }
        } else {
            log::error!("[handover] unmarshal failed: {}", e);
        }
        self.abort_all();
        e
    }

    /// Commit every adapter in order.
    ///
    /// `new_role` (receiving device) requires the whole stream to have been
    /// unmarshalled; otherwise [`Error::CommitNotReady`] is returned and no
    /// adapter is called. If an adapter fails, every adapter is aborted.
    pub fn commit(&mut self, new_role: bool) -> Result<()> {
        if new_role {
            match self.state {
                HandoverState::Unmarshalling if self.stream_done() => {}
                HandoverState::Vetoing
                | HandoverState::AwaitingTransport
                | HandoverState::Unmarshalling => return Err(Error::CommitNotReady),
                state => {
                    return Err(Error::InvalidState {
                        operation: "commit",
                        state,
                    })
                }
            }
        } else {
            self.expect_state("commit", &[HandoverState::AwaitingTransport])?;
        }

        let peer = match self.attempt.as_mut() {
            Some(attempt) => {
                attempt.new_role = new_role;
                attempt.peer
            }
            None => return Err(Error::CommitNotReady),
        };
        self.enter(HandoverState::Committing);

        self.stream_map.write().open_commit_window();
        let mut failure = None;
        for client in self.clients.iter_mut() {
            if let Err(e) = client.commit(&peer, new_role) {
                log::error!("[handover] commit failed in {}: {}", client.name(), e);
                failure = Some(Error::CommitFailed {
                    client: client.name(),
                    reason: e.to_string(),
                });
                break;
            }
        }
        match failure {
            Some(e) => {
                self.abort_with_open_window();
                Err(e)
            }
            None => {
                self.stream_map.write().close_commit_window();
                Ok(())
            }
        }
    }

    fn stream_done(&self) -> bool {
        self.attempt.as_ref().is_some_and(|a| a.stream_done)
    }

    /// Let every adapter drop its transient state.
    pub fn complete(&mut self) -> Result<Outcome> {
        self.expect_state("complete", &[HandoverState::Committing])?;
        let new_role = self.attempt.as_ref().is_some_and(|a| a.new_role);
        for client in self.clients.iter_mut() {
            client.complete(new_role);
        }
        self.finish(Outcome::Completed);
        log::info!("[handover] completed (new_role={})", new_role);
        Ok(Outcome::Completed)
    }

    /// Abort the attempt in progress. False when idle.
    pub fn abort(&mut self) -> bool {
        if self.state == HandoverState::Idle {
            return false;
        }
        self.abort_all();
        true
    }

    /// Abort once the transfer deadline has passed.
    pub fn poll(&mut self, now: Instant) -> Result<()> {
        if !self.state.is_transferring() {
            return Ok(());
        }
        let expired = self.attempt.as_ref().is_some_and(|a| now >= a.deadline);
        if !expired {
            return Ok(());
        }
        log::warn!("[handover] timed out while {}", self.state);
        self.abort_all();
        Err(Error::Timeout)
    }

    /// The byte channel to the peer failed: abort and report it.
    pub fn transport_failed(&mut self, reason: &str) -> Error {
        log::warn!("[handover] transport failed while {}: {}", self.state, reason);
        if self.state != HandoverState::Idle {
            self.abort_all();
        }
        Error::TransportFailed(reason.to_string())
    }

    fn abort_all(&mut self) {
        self.stream_map.write().open_commit_window();
        self.abort_with_open_window();
    }

    fn abort_with_open_window(&mut self) {
        for client in self.clients.iter_mut() {
            client.abort();
        }
        self.stream_map.write().close_commit_window();
        log::warn!("[handover] aborted while {}", self.state);
        self.finish(Outcome::Aborted);
    }
}

impl Default for HandoverController {
    fn default() -> Self {
        Self::new(RuntimeConfig::default())
    }
}

impl std::fmt::Debug for HandoverController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandoverController")
            .field("clients", &self.client_names())
            .field("state", &self.state)
            .field("outcome", &self.outcome)
            .finish()
    }
}
