// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Role handover protocol.
//!
//! The [`HandoverController`] drives every registered [`HandoverInterface`]
//! through veto, marshal, unmarshal, commit and complete (or abort). Each
//! adapter owns one profile; the controller only knows the six operations
//! and multiplexes the adapters over one byte channel with
//! [`framing`] records.

mod controller;
pub mod framing;
mod snapshot;

pub use controller::HandoverController;
pub use framing::{Chunk, RecordParser, RecordWriter};
pub use snapshot::{CommitJournal, InboundSnapshot, OutboundSnapshot};

use crate::bdaddr::BdAddr;
use crate::config::HandoverConfig;
use crate::error::Result;
use std::fmt;
use std::sync::Arc;

/// Bytes moved by one marshal or unmarshal call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Progress {
    /// Bytes written to (or consumed from) the buffer.
    pub bytes: usize,
    /// The adapter has nothing more to write (or has rebuilt its object).
    pub done: bool,
}

impl Progress {
    pub const fn partial(bytes: usize) -> Self {
        Self { bytes, done: false }
    }

    pub const fn done(bytes: usize) -> Self {
        Self { bytes, done: true }
    }

    /// Nothing to transfer for this peer.
    pub const fn nothing() -> Self {
        Self::done(0)
    }
}

/// Contract between the controller and one profile.
///
/// Operations are called in protocol order and never concurrently. An
/// adapter keeps whatever it needs between calls (the snapshot being
/// written or rebuilt) and drops it on `complete` or `abort`.
pub trait HandoverInterface: Send {
    /// Short name used in logs and errors.
    fn name(&self) -> &'static str;

    /// True blocks the handover for this cycle.
    fn veto(&self) -> bool;

    /// The attempt passed veto. Everything the adapter writes or reads for
    /// it uses `config`, whatever the live configuration changes to.
    fn begin(&mut self, _config: &Arc<HandoverConfig>) {}

    /// Write the connection state for `peer` into `buf`. Called again with
    /// a fresh buffer until `done`. No connection means zero bytes, done.
    fn marshal(&mut self, peer: &BdAddr, buf: &mut [u8]) -> Result<Progress>;

    /// Consume marshalled state. Called with further slices until `done`.
    fn unmarshal(&mut self, peer: &BdAddr, buf: &[u8]) -> Result<Progress>;

    /// Take (`new_role`) or give away the connection. On `Err` the adapter
    /// has already undone its own partial effects.
    fn commit(&mut self, peer: &BdAddr, new_role: bool) -> Result<()>;

    /// Drop transient state once every adapter committed.
    fn complete(&mut self, new_role: bool);

    /// Drop transient state and restore everything the attempt changed.
    fn abort(&mut self);
}

/// Controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HandoverState {
    #[default]
    Idle,
    Vetoing,
    Marshalling,
    AwaitingTransport,
    Unmarshalling,
    Committing,
    Completed,
    Aborted,
}

impl HandoverState {
    /// Deadline applies in these states.
    pub fn is_transferring(&self) -> bool {
        matches!(
            self,
            Self::Vetoing | Self::Marshalling | Self::AwaitingTransport | Self::Unmarshalling
        )
    }
}

impl fmt::Display for HandoverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Vetoing => "vetoing",
            Self::Marshalling => "marshalling",
            Self::AwaitingTransport => "awaiting transport",
            Self::Unmarshalling => "unmarshalling",
            Self::Committing => "committing",
            Self::Completed => "completed",
            Self::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// How the last attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Aborted,
    Vetoed,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Aborted => write!(f, "aborted"),
            Self::Vetoed => write!(f, "vetoed"),
        }
    }
}
