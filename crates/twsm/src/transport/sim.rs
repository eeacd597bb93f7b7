// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! In-memory stream transport.
//!
//! Each simulated device numbers its local handles from its own base, so
//! the same channel has different handles on the two devices while its wire
//! id is shared, as on a real pair.

use super::{ChannelKind, HandoverPolicy, StreamTransport, TaskId, TransportError};
use crate::bdaddr::BdAddr;
use crate::marshal::{LocalHandle, WireId};

/// One open stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimStream {
    pub handle: LocalHandle,
    pub peer: BdAddr,
    pub kind: ChannelKind,
    pub wire_id: WireId,
    pub route: Option<TaskId>,
    pub policy: HandoverPolicy,
}

/// Comparable capture of every stream, for before/after checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimSnapshot {
    pub streams: Vec<SimStream>,
}

#[derive(Debug)]
pub struct SimTransport {
    next_handle: u32,
    streams: Vec<SimStream>,
    reject_policy: bool,
}

impl SimTransport {
    /// New transport whose handles start at `handle_base`.
    pub fn new(handle_base: u32) -> Self {
        Self {
            next_handle: handle_base,
            streams: Vec::new(),
            reject_policy: false,
        }
    }

    /// Open a stream to `peer` and return its local handle.
    pub fn open_stream(&mut self, peer: BdAddr, kind: ChannelKind, wire_id: WireId) -> LocalHandle {
        let handle = LocalHandle::new(self.next_handle);
        self.next_handle += 1;
        self.streams.push(SimStream {
            handle,
            peer,
            kind,
            wire_id,
            route: None,
            policy: HandoverPolicy::default(),
        });
        log::debug!("[sim] open {} {} {} -> {}", peer, kind, wire_id, handle);
        handle
    }

    pub fn close_stream(&mut self, handle: LocalHandle) -> bool {
        let before = self.streams.len();
        self.streams.retain(|s| s.handle != handle);
        before != self.streams.len()
    }

    pub fn stream(&self, handle: LocalHandle) -> Option<&SimStream> {
        self.streams.iter().find(|s| s.handle == handle)
    }

    pub fn streams(&self) -> &[SimStream] {
        &self.streams
    }

    /// Make every subsequent policy change fail.
    pub fn reject_policy_changes(&mut self, reject: bool) {
        self.reject_policy = reject;
    }

    pub fn snapshot(&self) -> SimSnapshot {
        SimSnapshot {
            streams: self.streams.clone(),
        }
    }

    fn stream_mut(&mut self, handle: LocalHandle) -> Result<&mut SimStream, TransportError> {
        self.streams
            .iter_mut()
            .find(|s| s.handle == handle)
            .ok_or(TransportError::UnknownSink(handle))
    }
}

impl StreamTransport for SimTransport {
    fn wire_id(&self, sink: LocalHandle) -> Option<WireId> {
        self.stream(sink).map(|s| s.wire_id)
    }

    fn resolve(&self, peer: &BdAddr, kind: ChannelKind, wire_id: WireId) -> Option<LocalHandle> {
        self.streams
            .iter()
            .find(|s| s.peer == *peer && s.kind == kind && s.wire_id == wire_id)
            .map(|s| s.handle)
    }

    fn route(&mut self, sink: LocalHandle, task: Option<TaskId>) -> Result<Option<TaskId>, TransportError> {
        let stream = self.stream_mut(sink)?;
        Ok(std::mem::replace(&mut stream.route, task))
    }

    fn set_policy(
        &mut self,
        sink: LocalHandle,
        policy: HandoverPolicy,
    ) -> Result<HandoverPolicy, TransportError> {
        if self.reject_policy {
            return Err(TransportError::PolicyRejected(sink));
        }
        let stream = self.stream_mut(sink)?;
        Ok(std::mem::replace(&mut stream.policy, policy))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PEER: BdAddr = BdAddr::new([0x00, 0x02, 0x5b, 0x00, 0xa1, 0x07]);

    #[test]
    fn test_handles_start_at_base() {
        let mut sim = SimTransport::new(0x200);
        let a = sim.open_stream(PEER, ChannelKind::L2cap, WireId::new(0x40));
        let b = sim.open_stream(PEER, ChannelKind::Rfcomm, WireId::new(3));
        assert_eq!(a, LocalHandle::new(0x200));
        assert_eq!(b, LocalHandle::new(0x201));
    }

    #[test]
    fn test_resolve_matches_peer_and_kind() {
        let mut sim = SimTransport::new(1);
        let sink = sim.open_stream(PEER, ChannelKind::L2cap, WireId::new(0x40));
        assert_eq!(sim.resolve(&PEER, ChannelKind::L2cap, WireId::new(0x40)), Some(sink));
        assert_eq!(sim.resolve(&PEER, ChannelKind::Rfcomm, WireId::new(0x40)), None);
        assert_eq!(
            sim.resolve(&BdAddr::ZERO, ChannelKind::L2cap, WireId::new(0x40)),
            None
        );
    }

    #[test]
    fn test_route_and_policy_return_previous() {
        let mut sim = SimTransport::new(1);
        let sink = sim.open_stream(PEER, ChannelKind::L2cap, WireId::new(0x40));
        assert_eq!(sim.route(sink, Some(TaskId(4))), Ok(None));
        assert_eq!(sim.route(sink, None), Ok(Some(TaskId(4))));
        assert_eq!(
            sim.set_policy(sink, HandoverPolicy::Allow),
            Ok(HandoverPolicy::Disallow)
        );
        assert_eq!(
            sim.route(LocalHandle::new(99), None),
            Err(TransportError::UnknownSink(LocalHandle::new(99)))
        );
    }

    #[test]
    fn test_policy_rejection() {
        let mut sim = SimTransport::new(1);
        let sink = sim.open_stream(PEER, ChannelKind::L2cap, WireId::new(0x40));
        let before = sim.snapshot();
        sim.reject_policy_changes(true);
        assert!(sim.set_policy(sink, HandoverPolicy::Allow).is_err());
        assert_eq!(sim.snapshot(), before);
    }

    #[test]
    fn test_close_stream() {
        let mut sim = SimTransport::new(1);
        let sink = sim.open_stream(PEER, ChannelKind::L2cap, WireId::new(0x40));
        assert!(sim.close_stream(sink));
        assert!(!sim.close_stream(sink));
        assert_eq!(sim.wire_id(sink), None);
    }
}
