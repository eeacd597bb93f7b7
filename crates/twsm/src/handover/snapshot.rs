// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Transient per-attempt state kept by the profile adapters.
//!
//! - [`OutboundSnapshot`]: root built from live state, written over as many
//!   marshal calls as the buffers require
//! - [`InboundSnapshot`]: object being rebuilt on the receiving device
//! - [`CommitJournal`]: every effect of a commit, undone in reverse on abort

use super::Progress;
use crate::bdaddr::BdAddr;
use crate::error::Result;
use crate::marshal::{
    LocalHandle, Marshaller, TypeId, TypeRegistry, Unmarshaller, Value, WireFormat, WireId,
    WireIdResolver,
};
use crate::transport::{ChannelKind, HandoverPolicy, StreamMap, StreamTransport, TaskId};

/// Snapshot being written on the sending device.
#[derive(Debug)]
pub struct OutboundSnapshot {
    root: Value,
    root_type: TypeId,
    marshaller: Marshaller<'static>,
}

impl OutboundSnapshot {
    pub fn new(
        registry: &'static TypeRegistry,
        format: WireFormat,
        root: Value,
        root_type: TypeId,
    ) -> Self {
        Self {
            root,
            root_type,
            marshaller: Marshaller::begin(registry).with_format(format),
        }
    }

    pub fn root(&self) -> &Value {
        &self.root
    }

    pub fn root_type(&self) -> TypeId {
        self.root_type
    }

    pub fn is_complete(&self) -> bool {
        self.marshaller.is_complete()
    }

    pub fn total_written(&self) -> usize {
        self.marshaller.total_produced()
    }

    /// Continue writing into `buf`.
    pub fn write(&mut self, buf: &mut [u8], resolver: &dyn WireIdResolver) -> Result<Progress> {
        let done = self
            .marshaller
            .marshal_with_resolver(buf, &self.root, self.root_type, resolver)?;
        Ok(Progress {
            bytes: self.marshaller.produced(),
            done,
        })
    }
}

/// Object being rebuilt on the receiving device.
#[derive(Debug)]
pub struct InboundSnapshot {
    peer: BdAddr,
    unmarshaller: Unmarshaller<'static>,
    object: Option<Value>,
}

impl InboundSnapshot {
    pub fn new(
        registry: &'static TypeRegistry,
        format: WireFormat,
        root_type: TypeId,
        peer: BdAddr,
    ) -> Self {
        Self {
            peer,
            unmarshaller: Unmarshaller::begin(registry, root_type).with_format(format),
            object: None,
        }
    }

    pub fn peer(&self) -> &BdAddr {
        &self.peer
    }

    pub fn is_complete(&self) -> bool {
        self.object.is_some()
    }

    /// Feed the next slice of the stream.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Progress> {
        match self.unmarshaller.feed(bytes)? {
            Some((value, _)) => {
                self.object = Some(value);
                Ok(Progress::done(self.unmarshaller.consumed()))
            }
            None => Ok(Progress::partial(self.unmarshaller.consumed())),
        }
    }

    pub fn object(&self) -> Option<&Value> {
        self.object.as_ref()
    }

    /// Take the rebuilt object, leaving the snapshot empty.
    pub fn take_object(&mut self) -> Option<Value> {
        self.object.take()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Undo {
    Route {
        sink: LocalHandle,
        previous: Option<TaskId>,
    },
    Policy {
        sink: LocalHandle,
        previous: HandoverPolicy,
    },
    Binding(LocalHandle),
    /// Binding left by an earlier attempt and displaced by this one.
    Unbound {
        sink: LocalHandle,
        kind: ChannelKind,
        wire_id: WireId,
    },
}

/// Record of a commit's effects.
///
/// Transport and stream-map changes go through the journal so that
/// [`rollback`](Self::rollback) can revert them. Slot contents of type `S`
/// are saved by the adapter and handed back on rollback for it to restore.
#[derive(Debug)]
pub struct CommitJournal<S = ()> {
    entries: Vec<Undo>,
    slots: Vec<(usize, S)>,
}

impl<S> Default for CommitJournal<S> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            slots: Vec::new(),
        }
    }
}

impl<S> CommitJournal<S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.slots.is_empty()
    }

    /// Route `sink` to `task`, remembering the previous route.
    pub fn route(
        &mut self,
        transport: &mut dyn StreamTransport,
        sink: LocalHandle,
        task: Option<TaskId>,
    ) -> Result<()> {
        let previous = transport.route(sink, task)?;
        self.entries.push(Undo::Route { sink, previous });
        Ok(())
    }

    /// Set the handover policy of `sink`, remembering the previous one.
    pub fn set_policy(
        &mut self,
        transport: &mut dyn StreamTransport,
        sink: LocalHandle,
        policy: HandoverPolicy,
    ) -> Result<()> {
        let previous = transport.set_policy(sink, policy)?;
        self.entries.push(Undo::Policy { sink, previous });
        Ok(())
    }

    /// Bind `sink` to its wire id in the stream map.
    ///
    /// Bindings of `sink` or of the wire id that an earlier attempt left
    /// behind are dropped first and restored on rollback.
    pub fn bind(
        &mut self,
        map: &mut StreamMap,
        sink: LocalHandle,
        kind: ChannelKind,
        wire_id: WireId,
    ) -> Result<()> {
        let stale = [Some(sink), map.handle(kind, wire_id)];
        for handle in stale.into_iter().flatten() {
            if map.wire_id(handle).is_none() {
                continue;
            }
            let (old_kind, old_wire_id) = map.unbind(handle)?;
            log::debug!(
                "[handover] dropping stale binding {} -> {} {}",
                handle,
                old_kind,
                old_wire_id
            );
            self.entries.push(Undo::Unbound {
                sink: handle,
                kind: old_kind,
                wire_id: old_wire_id,
            });
        }
        map.bind(sink, kind, wire_id)?;
        self.entries.push(Undo::Binding(sink));
        Ok(())
    }

    /// Remember what table slot `index` held before the commit wrote it.
    pub fn save_slot(&mut self, index: usize, previous: S) {
        self.slots.push((index, previous));
    }

    /// Forget every recorded effect: the commit stands.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.slots.clear();
    }

    /// Undo every transport and stream-map effect, newest first, and
    /// return the saved slots (newest first) for the caller to restore.
    ///
    /// Undo failures are logged; the remaining entries are still undone.
    pub fn rollback(
        &mut self,
        transport: &mut dyn StreamTransport,
        map: &mut StreamMap,
    ) -> Vec<(usize, S)> {
        for undo in self.entries.drain(..).rev() {
            let result = match undo {
                Undo::Route { sink, previous } => transport.route(sink, previous).map(|_| ()),
                Undo::Policy { sink, previous } => {
                    transport.set_policy(sink, previous).map(|_| ())
                }
                Undo::Binding(sink) => map.unbind(sink).map(|_| ()),
                Undo::Unbound {
                    sink,
                    kind,
                    wire_id,
                } => map.bind(sink, kind, wire_id),
            };
            if let Err(e) = result {
                log::error!("[handover] rollback of {:?} failed: {}", undo, e);
            }
        }
        let mut slots: Vec<(usize, S)> = self.slots.drain(..).collect();
        slots.reverse();
        slots
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marshal::common::{UINT16, UINT8};
    use crate::marshal::{common, MemberDescriptor, TypeDescriptor};
    use crate::transport::SimTransport;
    use crate::type_table;

    static PAIR: [MemberDescriptor; 2] = [
        MemberDescriptor::new("a", UINT8),
        MemberDescriptor::new("b", UINT16),
    ];
    static TYPES: &[TypeDescriptor] = &type_table![TypeDescriptor::structure("pair", &PAIR)];
    static REGISTRY: TypeRegistry = TypeRegistry::new("pair", TYPES);
    const PAIR_TYPE: TypeId = common::COMMON_TYPE_COUNT;

    const PEER: BdAddr = BdAddr::new([0, 0x02, 0x5b, 1, 2, 3]);

    fn no_handles(_: LocalHandle) -> Option<WireId> {
        None
    }

    #[test]
    fn test_outbound_then_inbound() {
        let root = Value::Struct(vec![Value::U8(9), Value::U16(0x0102)]);
        let mut out = OutboundSnapshot::new(&REGISTRY, WireFormat::Implicit, root.clone(), PAIR_TYPE);
        let mut wire = Vec::new();
        let mut buf = [0u8; 2];
        loop {
            let p = out.write(&mut buf, &no_handles).unwrap();
            wire.extend_from_slice(&buf[..p.bytes]);
            if p.done {
                break;
            }
        }
        assert_eq!(wire, vec![9, 2, 1]);
        assert_eq!(out.total_written(), 3);

        let mut inbound = InboundSnapshot::new(&REGISTRY, WireFormat::Implicit, PAIR_TYPE, PEER);
        assert_eq!(inbound.feed(&wire[..1]).unwrap(), Progress::partial(1));
        assert_eq!(inbound.feed(&wire[1..]).unwrap(), Progress::done(2));
        assert_eq!(inbound.take_object(), Some(root));
        assert!(!inbound.is_complete());
    }

    #[test]
    fn test_rollback_restores_transport() {
        let mut sim = SimTransport::new(0x10);
        let sink = sim.open_stream(PEER, ChannelKind::L2cap, WireId::new(0x41));
        let before = sim.snapshot();
        let mut map = StreamMap::new();
        map.open_commit_window();

        let mut journal: CommitJournal<&'static str> = CommitJournal::new();
        journal.route(&mut sim, sink, Some(TaskId(1))).unwrap();
        journal
            .set_policy(&mut sim, sink, HandoverPolicy::AllowWithoutData)
            .unwrap();
        journal.bind(&mut map, sink, ChannelKind::L2cap, WireId::new(0x41)).unwrap();
        journal.save_slot(0, "first");
        journal.save_slot(1, "second");
        assert_ne!(sim.snapshot(), before);

        let slots = journal.rollback(&mut sim, &mut map);
        assert_eq!(slots, vec![(1, "second"), (0, "first")]);
        assert_eq!(sim.snapshot(), before);
        assert!(map.is_empty());
        assert!(journal.is_empty());
    }

    #[test]
    fn test_bind_replaces_earlier_binding() {
        let mut map = StreamMap::new();
        map.open_commit_window();
        map.bind(LocalHandle::new(1), ChannelKind::L2cap, WireId::new(0x40)).unwrap();
        map.bind(LocalHandle::new(2), ChannelKind::L2cap, WireId::new(0x41)).unwrap();
        let mut sim = SimTransport::new(0x10);

        // handle 1 moves to 0x41, which handle 2 held
        let mut journal: CommitJournal = CommitJournal::new();
        journal.bind(&mut map, LocalHandle::new(1), ChannelKind::L2cap, WireId::new(0x41)).unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map.handle(ChannelKind::L2cap, WireId::new(0x41)), Some(LocalHandle::new(1)));
        assert_eq!(map.handle(ChannelKind::L2cap, WireId::new(0x40)), None);

        journal.rollback(&mut sim, &mut map);
        assert_eq!(map.len(), 2);
        assert_eq!(map.handle(ChannelKind::L2cap, WireId::new(0x40)), Some(LocalHandle::new(1)));
        assert_eq!(map.handle(ChannelKind::L2cap, WireId::new(0x41)), Some(LocalHandle::new(2)));

        // the same binding again is a no-op change
        journal.bind(&mut map, LocalHandle::new(2), ChannelKind::L2cap, WireId::new(0x41)).unwrap();
        assert_eq!(map.len(), 2);
        journal.clear();
        assert_eq!(map.handle(ChannelKind::L2cap, WireId::new(0x41)), Some(LocalHandle::new(2)));
    }

    #[test]
    fn test_failed_step_is_not_recorded() {
        let mut sim = SimTransport::new(0x10);
        let mut map = StreamMap::new();
        let mut journal: CommitJournal = CommitJournal::new();
        assert!(journal.route(&mut sim, LocalHandle::new(1), None).is_err());
        assert!(journal
            .bind(&mut map, LocalHandle::new(1), ChannelKind::L2cap, WireId::new(1))
            .is_err());
        assert!(journal.is_empty());
    }
}
