// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! A2DP handover adapter.

use super::marshal_desc::{A2dpMarshalData, A2DP_MARSHAL_DATA, REGISTRY};
use super::{
    DataBlocks, MediaConnection, RemoteDevice, SharedA2dp, SignallingConnection, A2DP_TASK,
};
use crate::bdaddr::BdAddr;
use crate::config::HandoverConfig;
use crate::error::{Error, Result};
use crate::handover::{HandoverInterface, OutboundSnapshot, Progress};
use crate::marshal::{HandleRef, MarshalObject, WireFormat};
use crate::profiles::{stitch_sink, veto_logged, DeviceContext, Exchange};
use crate::transport::{ChannelKind, HandoverPolicy, StreamMap, StreamTransport, TransportResolver};
use std::sync::Arc;

const NAME: &str = "a2dp";

/// Table slot contents before the commit wrote them.
type SavedSlot = (Option<RemoteDevice>, Option<DataBlocks>);

pub struct A2dpHandover {
    profile: SharedA2dp,
    ctx: DeviceContext,
    exchange: Exchange<A2dpMarshalData, SavedSlot>,
}

impl A2dpHandover {
    pub fn new(profile: SharedA2dp, ctx: DeviceContext) -> Self {
        Self {
            profile,
            ctx,
            exchange: Exchange::new(),
        }
    }

    /// Snapshot of the live connection to `peer`, if there is one.
    fn snapshot_for(&self, peer: &BdAddr, format: WireFormat) -> Option<OutboundSnapshot> {
        let profile = self.profile.lock();
        let slot = profile.device_slot(peer)?;
        let root = A2dpMarshalData {
            remote_conn: profile.remote_conn[slot].clone(),
            data_blocks: profile.data_blocks[slot].clone(),
        };
        Some(OutboundSnapshot::new(&REGISTRY, format, root.to_value(), A2DP_MARSHAL_DATA))
    }

    fn apply(
        &mut self,
        peer: &BdAddr,
        data: A2dpMarshalData,
        transport: &mut dyn StreamTransport,
        map: &mut StreamMap,
    ) -> Result<()> {
        let journal = &mut self.exchange.journal;
        let mut profile = self.profile.lock();
        let slot = profile
            .slot_for(peer)
            .ok_or_else(|| Error::profile(NAME, "no free device slot"))?;
        journal.save_slot(
            slot,
            (profile.remote_conn[slot].clone(), profile.data_blocks[slot].clone()),
        );

        let mut device = data
            .remote_conn
            .ok_or_else(|| Error::profile(NAME, "snapshot without a connection"))?;
        device.addr = *peer;
        device.flags.device_id = slot as u8;

        if let SignallingConnection::Active(active) = &mut device.signal.connection {
            let sink = stitch_sink(
                NAME,
                journal,
                transport,
                map,
                peer,
                ChannelKind::L2cap,
                active.sink,
                A2DP_TASK,
                HandoverPolicy::AllowWithoutData,
            )?;
            active.sink = HandleRef::Local(sink);
        }

        for media in device.media.iter_mut() {
            if !media.status.connection_state.has_live_sink() {
                continue;
            }
            let Some(received) = media.sink() else {
                continue;
            };
            let sink = stitch_sink(
                NAME,
                journal,
                transport,
                map,
                peer,
                ChannelKind::L2cap,
                received,
                A2DP_TASK,
                HandoverPolicy::Allow,
            )?;
            if let MediaConnection::Active(active) = &mut media.connection {
                active.sink = HandleRef::Local(sink);
            }
        }

        profile.remote_conn[slot] = Some(device);
        profile.data_blocks[slot] = data.data_blocks;
        log::debug!("[a2dp] {} live in slot {}", peer, slot);
        Ok(())
    }

    fn rollback(&mut self, transport: &mut dyn StreamTransport, map: &mut StreamMap) {
        let slots = self.exchange.journal.rollback(transport, map);
        let mut profile = self.profile.lock();
        for (slot, (device, blocks)) in slots {
            profile.remote_conn[slot] = device;
            profile.data_blocks[slot] = blocks;
        }
    }
}

impl HandoverInterface for A2dpHandover {
    fn name(&self) -> &'static str {
        NAME
    }

    fn veto(&self) -> bool {
        veto_logged(NAME, self.profile.lock().veto_reason())
    }

    fn begin(&mut self, config: &Arc<HandoverConfig>) {
        self.exchange.begin(config);
    }

    fn marshal(&mut self, peer: &BdAddr, buf: &mut [u8]) -> Result<Progress> {
        if self.exchange.outbound.is_none() {
            let format = self.exchange.wire_format(&self.ctx.config);
            self.exchange.outbound = self.snapshot_for(peer, format);
        }
        let Some(outbound) = self.exchange.outbound.as_mut() else {
            return Ok(Progress::nothing());
        };
        let transport = self.ctx.transport.lock();
        outbound.write(buf, &TransportResolver::new(&*transport))
    }

    fn unmarshal(&mut self, peer: &BdAddr, buf: &[u8]) -> Result<Progress> {
        self.exchange.feed(&self.ctx.config, &REGISTRY, A2DP_MARSHAL_DATA, peer, buf, |value| {
            Ok(A2dpMarshalData::from_value(value)?)
        })
    }

    fn commit(&mut self, peer: &BdAddr, new_role: bool) -> Result<()> {
        if !new_role {
            return Ok(());
        }
        let Some(data) = self.exchange.take_received(NAME)? else {
            return Ok(());
        };
        let ctx = self.ctx.clone();
        ctx.with_links(|transport, map| {
            let result = self.apply(peer, data, transport, map);
            if let Err(e) = &result {
                log::warn!("[a2dp] commit for {} failed: {}", peer, e);
                self.rollback(transport, map);
            }
            result
        })
    }

    fn complete(&mut self, _new_role: bool) {
        self.exchange.journal.clear();
        self.exchange.reset();
    }

    fn abort(&mut self) {
        if !self.exchange.journal.is_empty() {
            let ctx = self.ctx.clone();
            ctx.with_links(|transport, map| self.rollback(transport, map));
            log::info!("[a2dp] commit rolled back");
        }
        self.exchange.reset();
    }
}
