// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! AVRCP handover adapter.

use super::marshal_desc::{AvrcpAvbp, AVRCP_AVBP, REGISTRY};
use super::{AvrcpConnection, SharedAvrcp, AVBP_TASK, AVRCP_TASK, MAX_AVRCP_CONNECTIONS};
use crate::bdaddr::BdAddr;
use crate::config::HandoverConfig;
use crate::error::{Error, Result};
use crate::handover::{HandoverInterface, OutboundSnapshot, Progress};
use crate::marshal::{HandleRef, MarshalObject, TypeId, Value, WireFormat};
use crate::profiles::{stitch_sink, veto_logged, DeviceContext, Exchange};
use crate::transport::{ChannelKind, HandoverPolicy, StreamMap, StreamTransport, TransportResolver};
use std::sync::Arc;

const NAME: &str = "avrcp";

pub struct AvrcpHandover {
    profile: SharedAvrcp,
    ctx: DeviceContext,
    /// Saves the list position written by the commit and what it held.
    exchange: Exchange<AvrcpConnection, Option<AvrcpConnection>>,
}

impl AvrcpHandover {
    pub fn new(profile: SharedAvrcp, ctx: DeviceContext) -> Self {
        Self {
            profile,
            ctx,
            exchange: Exchange::new(),
        }
    }

    fn snapshot_for(&self, peer: &BdAddr, format: WireFormat) -> Option<OutboundSnapshot> {
        let profile = self.profile.lock();
        let connection = profile.connection(peer)?;
        let root_type = profile.root_type();
        let root = if root_type == AVRCP_AVBP {
            AvrcpAvbp(connection.clone()).to_value()
        } else {
            connection.to_value()
        };
        Some(OutboundSnapshot::new(&REGISTRY, format, root, root_type))
    }

    fn decode(root_type: TypeId, value: Value) -> Result<AvrcpConnection> {
        if root_type == AVRCP_AVBP {
            Ok(AvrcpAvbp::from_value(value)?.0)
        } else {
            Ok(AvrcpConnection::from_value(value)?)
        }
    }

    fn apply(
        &mut self,
        peer: &BdAddr,
        mut connection: AvrcpConnection,
        transport: &mut dyn StreamTransport,
        map: &mut StreamMap,
    ) -> Result<()> {
        let journal = &mut self.exchange.journal;
        let mut profile = self.profile.lock();
        let existing = profile.position(peer);
        if existing.is_none() && profile.connections.len() >= MAX_AVRCP_CONNECTIONS {
            return Err(Error::profile(NAME, "connection list full"));
        }

        connection.addr = *peer;
        let sink = stitch_sink(
            NAME,
            journal,
            transport,
            map,
            peer,
            ChannelKind::L2cap,
            connection.sink,
            AVRCP_TASK,
            HandoverPolicy::AllowWithoutData,
        )?;
        connection.sink = HandleRef::Local(sink);

        if let Some(browsing) = connection.browsing.as_mut() {
            let sink = stitch_sink(
                NAME,
                journal,
                transport,
                map,
                peer,
                ChannelKind::L2cap,
                browsing.sink,
                AVBP_TASK,
                HandoverPolicy::AllowWithoutData,
            )?;
            browsing.sink = HandleRef::Local(sink);
        }

        match existing {
            Some(index) => {
                let previous = std::mem::replace(&mut profile.connections[index], connection);
                journal.save_slot(index, Some(previous));
            }
            None => {
                profile.connections.push(connection);
                journal.save_slot(profile.connections.len() - 1, None);
            }
        }
        log::debug!("[avrcp] {} added to the connection list", peer);
        Ok(())
    }

    fn rollback(&mut self, transport: &mut dyn StreamTransport, map: &mut StreamMap) {
        let slots = self.exchange.journal.rollback(transport, map);
        let mut profile = self.profile.lock();
        for (index, previous) in slots {
            match previous {
                Some(connection) => profile.connections[index] = connection,
                None => {
                    profile.connections.remove(index);
                }
            }
        }
    }
}

impl HandoverInterface for AvrcpHandover {
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
        let root_type = self.profile.lock().root_type();
        self.exchange.feed(&self.ctx.config, &REGISTRY, root_type, peer, buf, |value| {
            Self::decode(root_type, value)
        })
    }

    fn commit(&mut self, peer: &BdAddr, new_role: bool) -> Result<()> {
        if !new_role {
            return Ok(());
        }
        let Some(connection) = self.exchange.take_received(NAME)? else {
            return Ok(());
        };
        let ctx = self.ctx.clone();
        ctx.with_links(|transport, map| {
            let result = self.apply(peer, connection, transport, map);
            if let Err(e) = &result {
                log::warn!("[avrcp] commit for {} failed: {}", peer, e);
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
            log::info!("[avrcp] commit rolled back");
        }
        self.exchange.reset();
    }
}
