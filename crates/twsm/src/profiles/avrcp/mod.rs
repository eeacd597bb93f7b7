// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! AVRCP connection list.
//!
//! A connection carries its control channel and, when the device supports
//! browsing, a browsing channel. The snapshot root depends on that
//! capability, which both devices of a pair share.

mod handover;
pub mod marshal_desc;

pub use handover::AvrcpHandover;
pub use marshal_desc::{AvrcpAvbp, REGISTRY};

use crate::bdaddr::BdAddr;
use crate::marshal::{HandleRef, TypeId};
use crate::transport::TaskId;
use parking_lot::Mutex;
use std::sync::Arc;

pub const MAX_AVRCP_CONNECTIONS: usize = 2;

/// Task receiving control channel messages.
pub const AVRCP_TASK: TaskId = TaskId(0x0a7c);
/// Task receiving browsing channel messages.
pub const AVBP_TASK: TaskId = TaskId(0x0a7b);

/// Target category bits.
pub const CATEGORY_1: u8 = 0x01;
pub const CATEGORY_2: u8 = 0x02;
pub const CATEGORY_3: u8 = 0x04;
pub const CATEGORY_4: u8 = 0x08;

wire_enum! {
    #[derive(Default)]
    pub enum DeviceRole: "avrcp_device_role" {
        #[default]
        Unset = 0,
        Controller = 1,
        Target = 2,
        ControllerAndTarget = 3,
    }
}

wire_enum! {
    #[derive(Default)]
    pub enum AvrcpState: "avrcp_state" {
        #[default]
        Disconnected = 0,
        Connecting = 1,
        Connected = 2,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BrowsingChannel {
    pub sink: HandleRef,
    pub mtu: u16,
    pub uid_counter: u16,
}

/// One AVRCP peer.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AvrcpConnection {
    /// List key; not transferred.
    pub addr: BdAddr,
    pub sink: HandleRef,
    pub state: AvrcpState,
    pub connection_incoming: bool,
    pub remote_features: u16,
    pub remote_version: u16,
    pub l2cap_mtu: u16,
    pub volume: u8,
    /// Bitmask of notifications the peer registered for.
    pub registered_events: u16,
    pub browsing: Option<BrowsingChannel>,
}

impl AvrcpConnection {
    pub fn new(addr: BdAddr) -> Self {
        Self {
            addr,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AvrcpProfile {
    pub role: DeviceRole,
    pub browsing_enabled: bool,
    /// Supported target categories, `CATEGORY_*` bits.
    pub target_categories: u8,
    pub pending_messages: usize,
    pub connections: Vec<AvrcpConnection>,
}

pub type SharedAvrcp = Arc<Mutex<AvrcpProfile>>;

impl AvrcpProfile {
    pub fn new(role: DeviceRole) -> Self {
        Self {
            role,
            ..Self::default()
        }
    }

    pub fn with_browsing(mut self, enabled: bool) -> Self {
        self.browsing_enabled = enabled;
        self
    }

    pub fn with_target_categories(mut self, categories: u8) -> Self {
        self.target_categories = categories;
        self
    }

    pub fn shared(self) -> SharedAvrcp {
        Arc::new(Mutex::new(self))
    }

    /// Browsing is enabled outright or implied by a target category.
    pub fn browsing_supported(&self) -> bool {
        self.browsing_enabled || self.target_categories & (CATEGORY_1 | CATEGORY_3) != 0
    }

    /// Snapshot root type for this device.
    pub fn root_type(&self) -> TypeId {
        if self.browsing_supported() {
            marshal_desc::AVRCP_AVBP
        } else {
            marshal_desc::AVRCP_CONNECTION
        }
    }

    pub fn position(&self, addr: &BdAddr) -> Option<usize> {
        self.connections.iter().position(|c| c.addr == *addr)
    }

    pub fn connection(&self, addr: &BdAddr) -> Option<&AvrcpConnection> {
        self.position(addr).map(|i| &self.connections[i])
    }

    pub fn veto_reason(&self) -> Option<&'static str> {
        if self.role == DeviceRole::Unset {
            return Some("device role unset");
        }
        if self.pending_messages > 0 {
            return Some("messages pending");
        }
        if self.connections.iter().any(|c| c.state == AvrcpState::Connecting) {
            return Some("connection in progress");
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_browsing_from_categories() {
        let profile = AvrcpProfile::new(DeviceRole::Target);
        assert!(!profile.browsing_supported());
        assert_eq!(profile.root_type(), marshal_desc::AVRCP_CONNECTION);

        let profile = profile.with_target_categories(CATEGORY_2 | CATEGORY_4);
        assert!(!profile.browsing_supported());

        let profile = profile.with_target_categories(CATEGORY_3);
        assert!(profile.browsing_supported());
        assert_eq!(profile.root_type(), marshal_desc::AVRCP_AVBP);

        let profile = AvrcpProfile::new(DeviceRole::Controller).with_browsing(true);
        assert!(profile.browsing_supported());
    }

    #[test]
    fn test_veto_reasons() {
        let mut profile = AvrcpProfile::default();
        assert_eq!(profile.veto_reason(), Some("device role unset"));

        profile.role = DeviceRole::ControllerAndTarget;
        assert_eq!(profile.veto_reason(), None);

        let mut conn = AvrcpConnection::new(BdAddr::new([1; 6]));
        conn.state = AvrcpState::Connecting;
        profile.connections.push(conn);
        assert_eq!(profile.veto_reason(), Some("connection in progress"));

        profile.pending_messages = 2;
        assert_eq!(profile.veto_reason(), Some("messages pending"));
    }
}
