// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Boundary to the stream transport (L2CAP and RFCOMM sinks).
//!
//! The handover only needs four things from the transport: the wire id of
//! a local sink, the local sink for a wire id on a given link, message
//! routing and the link handover policy. [`StreamTransport`] is that
//! contract; [`SimTransport`] is an in-memory implementation.

pub mod sim;
mod stream_map;

pub use sim::{SimSnapshot, SimStream, SimTransport};
pub use stream_map::{SharedStreamMap, StreamMap};

use crate::bdaddr::BdAddr;
use crate::marshal::{LocalHandle, WireId, WireIdResolver};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// Transport a wire identifier belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChannelKind {
    L2cap,
    Rfcomm,
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::L2cap => write!(f, "l2cap"),
            Self::Rfcomm => write!(f, "rfcomm"),
        }
    }
}

/// Task that receives the messages of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u16);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task:{}", self.0)
    }
}

/// How a stream behaves when the link role moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HandoverPolicy {
    /// Stream may be handed over with data in flight.
    Allow,
    /// Stream may be handed over once its buffers are empty.
    AllowWithoutData,
    /// Stream blocks handover.
    #[default]
    Disallow,
}

/// Errors reported by the transport boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// No stream with this local handle.
    UnknownSink(LocalHandle),
    /// No stream on the link carries this wire id.
    Unresolved { kind: ChannelKind, wire_id: WireId },
    /// Transport refused the policy change.
    PolicyRejected(LocalHandle),
    /// Stream map written outside the commit window.
    WindowClosed,
    /// Wire id already bound to another handle.
    DuplicateWireId { kind: ChannelKind, wire_id: WireId },
    /// Handle already bound to a wire id.
    HandleInUse(LocalHandle),
    /// Handle has no binding.
    NotBound(LocalHandle),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownSink(h) => write!(f, "unknown sink {}", h),
            Self::Unresolved { kind, wire_id } => {
                write!(f, "no {} stream for wire id {}", kind, wire_id)
            }
            Self::PolicyRejected(h) => write!(f, "policy change rejected for {}", h),
            Self::WindowClosed => write!(f, "stream map is read-only outside the commit window"),
            Self::DuplicateWireId { kind, wire_id } => {
                write!(f, "{} wire id {} already bound", kind, wire_id)
            }
            Self::HandleInUse(h) => write!(f, "handle {} already bound", h),
            Self::NotBound(h) => write!(f, "handle {} is not bound", h),
        }
    }
}

impl std::error::Error for TransportError {}

/// Stream transport contract used by the profile adapters.
pub trait StreamTransport: Send {
    /// Wire id of a local sink, `None` if the sink is unknown.
    fn wire_id(&self, sink: LocalHandle) -> Option<WireId>;

    /// Local sink carrying `wire_id` on the link to `peer`.
    fn resolve(&self, peer: &BdAddr, kind: ChannelKind, wire_id: WireId) -> Option<LocalHandle>;

    /// Route the sink's messages to `task` (or nowhere). Returns the
    /// previous route.
    fn route(&mut self, sink: LocalHandle, task: Option<TaskId>) -> Result<Option<TaskId>, TransportError>;

    /// Set the handover policy. Returns the previous policy.
    fn set_policy(
        &mut self,
        sink: LocalHandle,
        policy: HandoverPolicy,
    ) -> Result<HandoverPolicy, TransportError>;
}

/// Transport shared between the adapters of one device.
pub type SharedTransport = Arc<Mutex<dyn StreamTransport>>;

/// Wrap a transport for sharing.
pub fn shared<T: StreamTransport + 'static>(transport: T) -> SharedTransport {
    Arc::new(Mutex::new(transport))
}

/// [`WireIdResolver`] backed by a (locked) transport.
pub struct TransportResolver<'a> {
    transport: &'a dyn StreamTransport,
}

impl<'a> TransportResolver<'a> {
    pub fn new(transport: &'a dyn StreamTransport) -> Self {
        Self { transport }
    }
}

impl WireIdResolver for TransportResolver<'_> {
    fn wire_id(&self, handle: LocalHandle) -> Option<WireId> {
        self.transport.wire_id(handle)
    }
}
