// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! HFP handover adapter.

use super::marshal_desc::{HfpMarshalledObj, HFP_MARSHALLED_OBJ, REGISTRY};
use super::{HfpLink, HfpService, SharedHfp, TaskFlags, HFP_TASK};
use crate::bdaddr::BdAddr;
use crate::config::HandoverConfig;
use crate::error::{Error, Result};
use crate::handover::{HandoverInterface, OutboundSnapshot, Progress};
use crate::marshal::{HandleRef, LocalHandle, MarshalObject, WireFormat, WireId};
use crate::profiles::{stitch_sink, veto_logged, DeviceContext, Exchange};
use crate::transport::{ChannelKind, HandoverPolicy, StreamMap, StreamTransport};
use std::sync::Arc;

const NAME: &str = "hfp";

pub struct HfpHandover {
    profile: SharedHfp,
    ctx: DeviceContext,
    /// Service records at snapshot time, for resolving the link's service.
    services: Vec<HfpService>,
    exchange: Exchange<HfpMarshalledObj, (HfpLink, TaskFlags)>,
}

impl HfpHandover {
    pub fn new(profile: SharedHfp, ctx: DeviceContext) -> Self {
        Self {
            profile,
            ctx,
            services: Vec::new(),
            exchange: Exchange::new(),
        }
    }

    fn reset(&mut self) {
        self.services.clear();
        self.exchange.reset();
    }

    fn snapshot_for(&mut self, peer: &BdAddr, format: WireFormat) -> Option<OutboundSnapshot> {
        let (link, flags, services) = {
            let profile = self.profile.lock();
            let link = profile.link(peer)?.clone();
            (link, profile.flags, profile.services.clone())
        };
        let channel = link
            .sink
            .local()
            .and_then(|sink| self.ctx.transport.lock().wire_id(sink))
            .and_then(|id| u8::try_from(id.raw()).ok())
            .filter(|channel| *channel != 0)?;
        let root = HfpMarshalledObj {
            channel,
            link: Some(link),
            flags,
        };
        self.services = services;
        Some(OutboundSnapshot::new(&REGISTRY, format, root.to_value(), HFP_MARSHALLED_OBJ))
    }

    fn apply(
        &mut self,
        peer: &BdAddr,
        obj: HfpMarshalledObj,
        transport: &mut dyn StreamTransport,
        map: &mut StreamMap,
    ) -> Result<()> {
        let journal = &mut self.exchange.journal;
        let mut profile = self.profile.lock();
        let slot = profile
            .link_slot(peer)
            .or_else(|| profile.idle_slot())
            .ok_or_else(|| Error::profile(NAME, "no idle link"))?;
        journal.save_slot(slot, (profile.links[slot].clone(), profile.flags));

        let mut link = obj
            .link
            .ok_or_else(|| Error::profile(NAME, "snapshot without a link"))?;
        link.addr = *peer;
        let sink = stitch_sink(
            NAME,
            journal,
            transport,
            map,
            peer,
            ChannelKind::Rfcomm,
            HandleRef::Wire(WireId::new(u16::from(obj.channel))),
            HFP_TASK,
            HandoverPolicy::AllowWithoutData,
        )?;
        link.sink = HandleRef::Local(sink);
        link.service = match link.service.wire() {
            Some(channel) => {
                let service = u8::try_from(channel.raw())
                    .ok()
                    .and_then(|ch| profile.service_for_channel(ch));
                if service.is_none() {
                    log::warn!("[hfp] no local service on server channel {}", channel);
                }
                service.map_or(HandleRef::Unset, HandleRef::Local)
            }
            None => HandleRef::Unset,
        };

        profile.links[slot] = link;
        profile.flags = obj.flags;
        log::debug!("[hfp] {} live in link slot {}", peer, slot);
        Ok(())
    }

    fn rollback(&mut self, transport: &mut dyn StreamTransport, map: &mut StreamMap) {
        let slots = self.exchange.journal.rollback(transport, map);
        let mut profile = self.profile.lock();
        for (slot, (link, flags)) in slots {
            profile.links[slot] = link;
            profile.flags = flags;
        }
    }
}

impl HandoverInterface for HfpHandover {
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
        let services = &self.services;
        let transport = self.ctx.transport.lock();
        let resolver = |handle: LocalHandle| -> Option<WireId> {
            services
                .iter()
                .find(|s| s.handle == handle)
                .map(|s| WireId::new(u16::from(s.server_channel)))
                .or_else(|| transport.wire_id(handle))
        };
        outbound.write(buf, &resolver)
    }

    fn unmarshal(&mut self, peer: &BdAddr, buf: &[u8]) -> Result<Progress> {
        self.exchange.feed(&self.ctx.config, &REGISTRY, HFP_MARSHALLED_OBJ, peer, buf, |value| {
            Ok(HfpMarshalledObj::from_value(value)?)
        })
    }

    fn commit(&mut self, peer: &BdAddr, new_role: bool) -> Result<()> {
        if !new_role {
            return Ok(());
        }
        let Some(obj) = self.exchange.take_received(NAME)? else {
            return Ok(());
        };
        let ctx = self.ctx.clone();
        ctx.with_links(|transport, map| {
            let result = self.apply(peer, obj, transport, map);
            if let Err(e) = &result {
                log::warn!("[hfp] commit for {} failed: {}", peer, e);
                self.rollback(transport, map);
            }
            result
        })
    }

    fn complete(&mut self, _new_role: bool) {
        self.exchange.journal.clear();
        self.reset();
    }

    fn abort(&mut self) {
        if !self.exchange.journal.is_empty() {
            let ctx = self.ctx.clone();
            ctx.with_links(|transport, map| self.rollback(transport, map));
            log::info!("[hfp] commit rolled back");
        }
        self.reset();
    }
}
