// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! HFP link table.
//!
//! Links live in fixed slots; an idle slot is free. A link refers to the
//! local service record it connected through, which the snapshot carries
//! as the record's RFCOMM server channel.

mod handover;
pub mod marshal_desc;

pub use handover::HfpHandover;
pub use marshal_desc::{HfpMarshalledObj, REGISTRY};

use crate::bdaddr::BdAddr;
use crate::marshal::{HandleRef, LocalHandle};
use crate::transport::TaskId;
use parking_lot::Mutex;
use std::sync::Arc;

pub const MAX_LINKS: usize = 2;
pub const NUM_INDICATORS: usize = 7;

/// Task receiving RFCOMM messages.
pub const HFP_TASK: TaskId = TaskId(0x04f0);

wire_enum! {
    /// Service level connection state.
    #[derive(Default)]
    pub enum SlcState: "hfp_slc_state" {
        #[default]
        Disabled = 0,
        Idle = 1,
        Searching = 2,
        Connecting = 3,
        Connected = 4,
    }
}

impl SlcState {
    pub fn is_active(self) -> bool {
        !matches!(self, Self::Disabled | Self::Idle)
    }
}

wire_enum! {
    #[derive(Default)]
    pub enum LinkPriority: "hfp_link_priority" {
        #[default]
        Unassigned = 0,
        Primary = 1,
        Secondary = 2,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TaskFlags {
    pub hf_supported_features: u16,
    pub codec_negotiation: bool,
    pub wbs_codecs: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LinkFlags {
    pub slc_state: SlcState,
    pub priority: LinkPriority,
    pub at_cmd_resp_pending: bool,
    pub in_band_ring: bool,
    pub ag_profile_version: u16,
}

/// Positions of the AG indicators in its `+CIND` list.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IndicatorIndexes {
    pub indicator_idxs: [u8; NUM_INDICATORS],
    /// Indexes of vendor indicators past the standard set.
    pub extra_indicator_idxs: Option<Vec<u8>>,
    pub num_indicators: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AudioParams {
    pub bandwidth: u32,
    pub max_latency: u16,
    pub voice_settings: u16,
    pub retx_effort: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HfpLink {
    /// Peer of an active link. Not transferred.
    pub addr: BdAddr,
    /// RFCOMM sink. Not transferred: the snapshot root carries its channel.
    pub sink: HandleRef,
    /// Service record the link connected through.
    pub service: HandleRef,
    pub flags: LinkFlags,
    pub ag_supported_features: u16,
    pub ag_supported_indicators: IndicatorIndexes,
    pub ag_supported_hf_indicators: u16,
    pub audio_params: AudioParams,
    pub audio_packet_type: u16,
    pub audio_packet_type_to_try: u16,
    pub ag_codec_modes: u16,
    pub qce_codec_mode_id: u16,
}

impl HfpLink {
    pub fn is_idle(&self) -> bool {
        !self.flags.slc_state.is_active()
    }
}

/// Local service record registered with RFCOMM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HfpService {
    pub handle: LocalHandle,
    pub server_channel: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HfpProfile {
    pub initialised: bool,
    pub pending_messages: usize,
    pub flags: TaskFlags,
    pub links: [HfpLink; MAX_LINKS],
    pub services: Vec<HfpService>,
}

pub type SharedHfp = Arc<Mutex<HfpProfile>>;

impl HfpProfile {
    pub fn new(services: Vec<HfpService>) -> Self {
        Self {
            initialised: true,
            services,
            ..Self::default()
        }
    }

    pub fn shared(self) -> SharedHfp {
        Arc::new(Mutex::new(self))
    }

    /// Slot of the active link to `addr`.
    pub fn link_slot(&self, addr: &BdAddr) -> Option<usize> {
        self.links
            .iter()
            .position(|l| !l.is_idle() && l.addr == *addr)
    }

    pub fn link(&self, addr: &BdAddr) -> Option<&HfpLink> {
        self.link_slot(addr).map(|i| &self.links[i])
    }

    pub fn idle_slot(&self) -> Option<usize> {
        self.links.iter().position(HfpLink::is_idle)
    }

    pub fn server_channel(&self, service: LocalHandle) -> Option<u8> {
        self.services
            .iter()
            .find(|s| s.handle == service)
            .map(|s| s.server_channel)
    }

    pub fn service_for_channel(&self, server_channel: u8) -> Option<LocalHandle> {
        self.services
            .iter()
            .find(|s| s.server_channel == server_channel)
            .map(|s| s.handle)
    }

    pub fn veto_reason(&self) -> Option<&'static str> {
        if !self.initialised {
            return Some("not initialised");
        }
        if self.links.iter().any(|l| l.flags.priority == LinkPriority::Secondary) {
            return Some("secondary link connected");
        }
        if self
            .links
            .iter()
            .any(|l| l.flags.priority == LinkPriority::Primary && l.flags.at_cmd_resp_pending)
        {
            return Some("AT command response pending");
        }
        if self.pending_messages > 0 {
            return Some("messages pending");
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PEER: BdAddr = BdAddr::new([0x00, 0x02, 0x5b, 0x0f, 0x0f, 0x01]);

    fn connected(addr: BdAddr, priority: LinkPriority) -> HfpLink {
        HfpLink {
            addr,
            flags: LinkFlags {
                slc_state: SlcState::Connected,
                priority,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_link_slots() {
        let mut profile = HfpProfile::new(Vec::new());
        assert_eq!(profile.idle_slot(), Some(0));
        assert!(profile.link(&PEER).is_none());

        profile.links[0] = connected(PEER, LinkPriority::Primary);
        assert_eq!(profile.link_slot(&PEER), Some(0));
        assert_eq!(profile.idle_slot(), Some(1));

        profile.links[0].flags.slc_state = SlcState::Idle;
        assert!(profile.link(&PEER).is_none());
    }

    #[test]
    fn test_service_lookup() {
        let profile = HfpProfile::new(vec![
            HfpService {
                handle: LocalHandle::new(0x10),
                server_channel: 3,
            },
            HfpService {
                handle: LocalHandle::new(0x11),
                server_channel: 5,
            },
        ]);
        assert_eq!(profile.server_channel(LocalHandle::new(0x11)), Some(5));
        assert_eq!(profile.service_for_channel(3), Some(LocalHandle::new(0x10)));
        assert_eq!(profile.service_for_channel(9), None);
    }

    #[test]
    fn test_veto_reasons() {
        let mut profile = HfpProfile::default();
        assert_eq!(profile.veto_reason(), Some("not initialised"));
        profile.initialised = true;

        profile.links[0] = connected(PEER, LinkPriority::Primary);
        assert_eq!(profile.veto_reason(), None);

        profile.links[0].flags.at_cmd_resp_pending = true;
        assert_eq!(profile.veto_reason(), Some("AT command response pending"));

        profile.links[1] = connected(BdAddr::new([2; 6]), LinkPriority::Secondary);
        assert_eq!(profile.veto_reason(), Some("secondary link connected"));
    }
}
