// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! AVRCP snapshot types.

use super::{AvrcpConnection, BrowsingChannel};
use crate::marshal::common::{BOOL, COMMON_TYPE_COUNT, L2CAP_SINK, UINT16, UINT8};
use crate::marshal::{MarshalError, MarshalObject, MemberDescriptor as M, TypeDescriptor, TypeRegistry, Value};
use crate::type_table;

crate::type_ids! { COMMON_TYPE_COUNT;
    /// Root without browsing: the control connection alone.
    AVRCP_CONNECTION,
    BROWSING_CHANNEL,
    /// Root with browsing: control and browsing connections.
    AVRCP_AVBP,
}

static AVRCP_CONNECTION_MEMBERS: [M; 8] = [
    M::new("sink", L2CAP_SINK),
    M::new("state", UINT8),
    M::new("connection_incoming", BOOL),
    M::new("remote_features", UINT16),
    M::new("remote_version", UINT16),
    M::new("l2cap_mtu", UINT16),
    M::new("volume", UINT8),
    M::new("registered_events", UINT16),
];

static BROWSING_CHANNEL_MEMBERS: [M; 3] = [
    M::new("sink", L2CAP_SINK),
    M::new("mtu", UINT16),
    M::new("uid_counter", UINT16),
];

static AVRCP_AVBP_MEMBERS: [M; 2] = [
    M::new("avrcp", AVRCP_CONNECTION),
    M::new("avbp", BROWSING_CHANNEL),
];

static TYPES: &[TypeDescriptor] = &type_table![
    TypeDescriptor::structure("avrcp", &AVRCP_CONNECTION_MEMBERS),
    TypeDescriptor::structure("avbp", &BROWSING_CHANNEL_MEMBERS),
    TypeDescriptor::structure("avrcp_avbp_init", &AVRCP_AVBP_MEMBERS),
];

pub static REGISTRY: TypeRegistry = TypeRegistry::new("avrcp", TYPES);

// Control connection only; browsing travels in [`AvrcpAvbp`].
marshal_struct! {
    AvrcpConnection: "avrcp" {
        sink,
        state,
        connection_incoming,
        remote_features,
        remote_version,
        l2cap_mtu,
        volume,
        registered_events,
    } local { addr, browsing }
}

marshal_struct! {
    BrowsingChannel: "avbp" { sink, mtu, uid_counter }
}

/// Control connection with its browsing channel.
///
/// A connection without browsing is sent with an unset browsing sink and
/// received back as `browsing: None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvrcpAvbp(pub AvrcpConnection);

impl MarshalObject for AvrcpAvbp {
    fn to_value(&self) -> Value {
        let browsing = self.0.browsing.unwrap_or_default();
        Value::Struct(vec![self.0.to_value(), browsing.to_value()])
    }

    fn from_value(value: Value) -> Result<Self, MarshalError> {
        let mut f = value.into_fields("avrcp_avbp_init", 2)?;
        let mut connection: AvrcpConnection = f.take()?;
        let browsing: BrowsingChannel = f.take()?;
        connection.browsing = (!browsing.sink.is_unset()).then_some(browsing);
        Ok(Self(connection))
    }
}
