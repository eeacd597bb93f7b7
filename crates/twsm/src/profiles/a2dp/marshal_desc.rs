// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! A2DP snapshot types.

use super::{
    ConnectionSetup, ConnectionState, DataBlocks, DeviceFlags, MediaActive, MediaChannel,
    MediaConnection, MediaStatus, RemoteDevice, SepInfo, SignallingActive, SignallingChannel,
    SignallingConnection, SignallingStatus, MAX_MEDIA_CHANNELS,
};
use crate::marshal::common::{BOOL, COMMON_TYPE_COUNT, L2CAP_SINK, UINT16, UINT8};
use crate::marshal::{
    pointer_to, MarshalError, MarshalObject, MemberDescriptor as M, TypeDescriptor, TypeRegistry,
    Value,
};
use crate::type_table;

crate::type_ids! { COMMON_TYPE_COUNT;
    SEP_INFO,
    CONNECTION_SETUP,
    SIGNALLING_STATUS,
    SIGNALLING_ACTIVE,
    SIGNALLING_CONNECTION,
    SIGNALLING_CHANNEL,
    MEDIA_STATUS,
    MEDIA_ACTIVE,
    MEDIA_CONNECTION,
    MEDIA_CHANNEL,
    DEVICE_FLAGS,
    REMOTE_DEVICE,
    DATA_BLOCK_HEADER,
    /// Root object: the peer's connection and its data blocks.
    A2DP_MARSHAL_DATA,
}

static SEP_INFO_MEMBERS: [M; 4] = [
    M::new("seid", UINT8),
    M::new("media_type", UINT8),
    M::new("codec", UINT8),
    M::new("in_use", BOOL),
];

static CONNECTION_SETUP_MEMBERS: [M; 3] = [
    M::new("inbound", BOOL),
    M::new("attempts", UINT8),
    M::new("identifier", UINT8),
];

static SIGNALLING_STATUS_MEMBERS: [M; 4] = [
    M::new("connection_state", UINT8),
    M::new("stream_state", UINT8),
    M::new("pending_issued_transaction", BOOL),
    M::new("pending_received_transaction", BOOL),
];

static SIGNALLING_ACTIVE_MEMBERS: [M; 4] = [
    M::new("sink", L2CAP_SINK),
    M::new("mtu", UINT16),
    M::new("received_packet_length", UINT16),
    M::dynamic_pointer("received_packet", UINT8),
];

static SIGNALLING_CONNECTION_ARMS: [M; 2] = [
    M::new("setup", CONNECTION_SETUP),
    M::new("active", SIGNALLING_ACTIVE),
];

static SIGNALLING_CHANNEL_MEMBERS: [M; 2] = [
    M::new("status", SIGNALLING_STATUS),
    M::new("connection", SIGNALLING_CONNECTION),
];

static MEDIA_STATUS_MEMBERS: [M; 2] = [M::new("connection_state", UINT8), M::new("seid", UINT8)];

static MEDIA_ACTIVE_MEMBERS: [M; 2] = [M::new("sink", L2CAP_SINK), M::new("mtu", UINT16)];

static MEDIA_CONNECTION_ARMS: [M; 2] = [
    M::new("setup", CONNECTION_SETUP),
    M::new("active", MEDIA_ACTIVE),
];

static MEDIA_CHANNEL_MEMBERS: [M; 2] = [
    M::new("status", MEDIA_STATUS),
    M::new("connection", MEDIA_CONNECTION),
];

static DEVICE_FLAGS_MEMBERS: [M; 3] = [
    M::new("device_id", UINT8),
    M::new("local_initiated", BOOL),
    M::new("profile_version", UINT16),
];

static REMOTE_DEVICE_MEMBERS: [M; 7] = [
    M::new("flags", DEVICE_FLAGS),
    M::new("remote_sep", SEP_INFO),
    M::new("local_sep", SEP_INFO),
    M::new("reconfig_caps_size", UINT16),
    M::dynamic_pointer("reconfig_caps", UINT8),
    M::new("signal_conn", SIGNALLING_CHANNEL),
    M::array("media_conn", MEDIA_CHANNEL, MAX_MEDIA_CHANNELS),
];

static DATA_BLOCK_HEADER_MEMBERS: [M; 2] = [
    M::new("size_blocks_padded", UINT16),
    M::dynamic_array("block", UINT8),
];

static A2DP_MARSHAL_DATA_MEMBERS: [M; 2] = [
    M::pointer("remote_conn", REMOTE_DEVICE),
    M::pointer("data_blocks", DATA_BLOCK_HEADER).shared(),
];

/// Arm of a channel's connection union, from the leading status struct.
fn connection_arm(type_name: &'static str, prefix: &[Value]) -> Result<usize, MarshalError> {
    let state = prefix
        .first()
        .and_then(|status| status.member(0))
        .and_then(Value::as_u8)
        .ok_or(MarshalError::Shape {
            type_name,
            expected: "a status struct before the connection",
        })?;
    ConnectionState::try_from(state)
        .ok()
        .and_then(ConnectionState::arm)
        .ok_or(MarshalError::NoActiveArm {
            type_name,
            discriminant: u32::from(state),
        })
}

fn signalling_arm(prefix: &[Value]) -> Result<usize, MarshalError> {
    connection_arm("a2dp_signalling_channel", prefix)
}

fn media_arm(prefix: &[Value]) -> Result<usize, MarshalError> {
    connection_arm("a2dp_media_channel", prefix)
}

fn u16_at(type_name: &'static str, prefix: &[Value], index: usize) -> Result<usize, MarshalError> {
    prefix
        .get(index)
        .and_then(Value::as_u16)
        .map(usize::from)
        .ok_or(MarshalError::Shape {
            type_name,
            expected: "a uint16 element count",
        })
}

fn received_packet_len(prefix: &[Value]) -> Result<usize, MarshalError> {
    u16_at("a2dp_signalling_connection_active", prefix, 2)
}

fn reconfig_caps_len(prefix: &[Value]) -> Result<usize, MarshalError> {
    u16_at("a2dp_remote_device", prefix, 3)
}

fn data_block_len(prefix: &[Value]) -> Result<usize, MarshalError> {
    let size = u16_at("a2dp_data_block_header", prefix, 0)?;
    Ok(DataBlocks::storage_len(size as u16))
}

static TYPES: &[TypeDescriptor] = &type_table![
    TypeDescriptor::structure("a2dp_sep_info", &SEP_INFO_MEMBERS),
    TypeDescriptor::structure("a2dp_connection_setup", &CONNECTION_SETUP_MEMBERS),
    TypeDescriptor::structure("a2dp_signalling_channel_status", &SIGNALLING_STATUS_MEMBERS),
    TypeDescriptor::with_dynamic_array(
        "a2dp_signalling_connection_active",
        &SIGNALLING_ACTIVE_MEMBERS,
        received_packet_len
    ),
    TypeDescriptor::union("a2dp_signalling_connection", &SIGNALLING_CONNECTION_ARMS),
    TypeDescriptor::with_union(
        "a2dp_signalling_channel",
        &SIGNALLING_CHANNEL_MEMBERS,
        signalling_arm
    ),
    TypeDescriptor::structure("a2dp_media_channel_status", &MEDIA_STATUS_MEMBERS),
    TypeDescriptor::structure("a2dp_media_connection_active", &MEDIA_ACTIVE_MEMBERS),
    TypeDescriptor::union("a2dp_media_connection", &MEDIA_CONNECTION_ARMS),
    TypeDescriptor::with_union("a2dp_media_channel", &MEDIA_CHANNEL_MEMBERS, media_arm),
    TypeDescriptor::structure("a2dp_remote_device_flags", &DEVICE_FLAGS_MEMBERS),
    TypeDescriptor::with_dynamic_array(
        "a2dp_remote_device",
        &REMOTE_DEVICE_MEMBERS,
        reconfig_caps_len
    ),
    TypeDescriptor::with_dynamic_array(
        "a2dp_data_block_header",
        &DATA_BLOCK_HEADER_MEMBERS,
        data_block_len
    ),
    TypeDescriptor::structure("a2dp_marshal_data", &A2DP_MARSHAL_DATA_MEMBERS),
];

pub static REGISTRY: TypeRegistry = TypeRegistry::new("a2dp", TYPES);

/// Root of the A2DP snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct A2dpMarshalData {
    pub remote_conn: Option<RemoteDevice>,
    pub data_blocks: Option<DataBlocks>,
}

impl MarshalObject for A2dpMarshalData {
    fn to_value(&self) -> Value {
        Value::Struct(vec![
            pointer_to(self.remote_conn.as_ref()),
            pointer_to(self.data_blocks.as_ref()),
        ])
    }

    fn from_value(value: Value) -> Result<Self, MarshalError> {
        let mut f = value.into_fields("a2dp_marshal_data", 2)?;
        Ok(Self {
            remote_conn: f.pointer()?,
            data_blocks: f.pointer()?,
        })
    }
}

marshal_struct! {
    SepInfo: "a2dp_sep_info" { seid, media_type, codec, in_use }
}

marshal_struct! {
    ConnectionSetup: "a2dp_connection_setup" { inbound, attempts, identifier }
}

marshal_struct! {
    SignallingStatus: "a2dp_signalling_channel_status" {
        connection_state,
        stream_state,
        pending_issued_transaction,
        pending_received_transaction,
    }
}

impl MarshalObject for SignallingActive {
    fn to_value(&self) -> Value {
        let length = self.received_packet.as_ref().map_or(0, Vec::len);
        Value::Struct(vec![
            self.sink.into(),
            self.mtu.into(),
            Value::U16(length as u16),
            Value::pointer(self.received_packet.as_deref().map(Value::bytes)),
        ])
    }

    fn from_value(value: Value) -> Result<Self, MarshalError> {
        let mut f = value.into_fields("a2dp_signalling_connection_active", 4)?;
        let sink = f.take()?;
        let mtu = f.take()?;
        let _length: u16 = f.take()?;
        Ok(Self {
            sink,
            mtu,
            received_packet: f.pointer_array()?,
        })
    }
}

impl MarshalObject for SignallingChannel {
    fn to_value(&self) -> Value {
        let connection = match &self.connection {
            SignallingConnection::Setup(setup) => Value::union(0, setup.to_value()),
            SignallingConnection::Active(active) => Value::union(1, active.to_value()),
        };
        Value::Struct(vec![self.status.to_value(), connection])
    }

    fn from_value(value: Value) -> Result<Self, MarshalError> {
        let mut f = value.into_fields("a2dp_signalling_channel", 2)?;
        let status = f.take()?;
        let connection = match f.union()? {
            (0, v) => SignallingConnection::Setup(ConnectionSetup::from_value(v)?),
            (1, v) => SignallingConnection::Active(SignallingActive::from_value(v)?),
            (arm, _) => {
                return Err(MarshalError::NoActiveArm {
                    type_name: "a2dp_signalling_connection",
                    discriminant: arm as u32,
                })
            }
        };
        Ok(Self { status, connection })
    }
}

marshal_struct! {
    MediaStatus: "a2dp_media_channel_status" { connection_state, seid }
}

marshal_struct! {
    MediaActive: "a2dp_media_connection_active" { sink, mtu }
}

impl MarshalObject for MediaChannel {
    fn to_value(&self) -> Value {
        let connection = match &self.connection {
            MediaConnection::Setup(setup) => Value::union(0, setup.to_value()),
            MediaConnection::Active(active) => Value::union(1, active.to_value()),
        };
        Value::Struct(vec![self.status.to_value(), connection])
    }

    fn from_value(value: Value) -> Result<Self, MarshalError> {
        let mut f = value.into_fields("a2dp_media_channel", 2)?;
        let status = f.take()?;
        let connection = match f.union()? {
            (0, v) => MediaConnection::Setup(ConnectionSetup::from_value(v)?),
            (1, v) => MediaConnection::Active(MediaActive::from_value(v)?),
            (arm, _) => {
                return Err(MarshalError::NoActiveArm {
                    type_name: "a2dp_media_connection",
                    discriminant: arm as u32,
                })
            }
        };
        Ok(Self { status, connection })
    }
}

marshal_struct! {
    DeviceFlags: "a2dp_remote_device_flags" { device_id, local_initiated, profile_version }
}

impl MarshalObject for RemoteDevice {
    fn to_value(&self) -> Value {
        let caps_len = self.reconfig_caps.as_ref().map_or(0, Vec::len);
        Value::Struct(vec![
            self.flags.to_value(),
            self.remote_sep.to_value(),
            self.local_sep.to_value(),
            Value::U16(caps_len as u16),
            Value::pointer(self.reconfig_caps.as_deref().map(Value::bytes)),
            self.signal.to_value(),
            Value::Array(self.media.iter().map(MarshalObject::to_value).collect()),
        ])
    }

    fn from_value(value: Value) -> Result<Self, MarshalError> {
        let mut f = value.into_fields("a2dp_remote_device", 7)?;
        let flags = f.take()?;
        let remote_sep = f.take()?;
        let local_sep = f.take()?;
        let _caps_len: u16 = f.take()?;
        let reconfig_caps = f.pointer_array()?;
        let signal = f.take()?;
        let media: Vec<MediaChannel> = f.array()?;
        let media = <[MediaChannel; MAX_MEDIA_CHANNELS]>::try_from(media).map_err(|_| {
            MarshalError::Shape {
                type_name: "a2dp_remote_device",
                expected: "two media channels",
            }
        })?;
        Ok(Self {
            addr: Default::default(),
            flags,
            remote_sep,
            local_sep,
            reconfig_caps,
            signal,
            media,
        })
    }
}

impl MarshalObject for DataBlocks {
    fn to_value(&self) -> Value {
        Value::Struct(vec![self.size_blocks_padded.into(), Value::bytes(&self.block)])
    }

    fn from_value(value: Value) -> Result<Self, MarshalError> {
        let mut f = value.into_fields("a2dp_data_block_header", 2)?;
        Ok(Self {
            size_blocks_padded: f.take()?,
            block: f.array()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marshal::{HandleRef, LocalHandle, Marshaller, Unmarshaller, WireId, WireFormat};
    use crate::profiles::a2dp::{StreamState, DATA_BLOCK_INFO_SIZE, MAX_DATA_BLOCKS};

    fn resolver(h: LocalHandle) -> Option<WireId> {
        Some(WireId::new(h.raw() as u16))
    }

    fn connected_device() -> RemoteDevice {
        let mut device = RemoteDevice::default();
        device.flags.device_id = 1;
        device.reconfig_caps = Some(vec![0x07, 0x06, 0x00]);
        device.signal = SignallingChannel {
            status: SignallingStatus {
                connection_state: ConnectionState::Connected,
                stream_state: StreamState::Streaming,
                ..Default::default()
            },
            connection: SignallingConnection::Active(SignallingActive {
                sink: HandleRef::Local(LocalHandle::new(0x40)),
                mtu: 672,
                received_packet: Some(vec![0xaa, 0xbb]),
            }),
        };
        device.media[0] = MediaChannel {
            status: MediaStatus {
                connection_state: ConnectionState::Connected,
                seid: 1,
            },
            connection: MediaConnection::Active(MediaActive {
                sink: HandleRef::Local(LocalHandle::new(0x41)),
                mtu: 895,
            }),
        };
        device
    }

    fn transfer(root: &A2dpMarshalData, format: WireFormat) -> A2dpMarshalData {
        let mut m = Marshaller::begin(&REGISTRY).with_format(format);
        let mut buf = vec![0u8; 512];
        let done = m
            .marshal_with_resolver(&mut buf, &root.to_value(), A2DP_MARSHAL_DATA, &resolver)
            .expect("marshal");
        assert!(done);
        let n = m.produced();

        let mut u = Unmarshaller::begin(&REGISTRY, A2DP_MARSHAL_DATA).with_format(format);
        let (value, ty) = u.feed(&buf[..n]).expect("unmarshal").expect("complete");
        assert_eq!(ty, A2DP_MARSHAL_DATA);
        assert_eq!(u.consumed(), n);
        A2dpMarshalData::from_value(value).expect("typed")
    }

    #[test]
    fn test_registry_validates() {
        REGISTRY.validate().expect("a2dp registry");
        assert_eq!(REGISTRY.index_of("a2dp_marshal_data"), Some(A2DP_MARSHAL_DATA));
    }

    #[test]
    fn test_sinks_travel_as_channel_ids() {
        let root = A2dpMarshalData {
            remote_conn: Some(connected_device()),
            data_blocks: Some(DataBlocks::new(16)),
        };
        for format in [WireFormat::Implicit, WireFormat::Tagged] {
            let received = transfer(&root, format);
            let device = received.remote_conn.expect("device");
            match &device.signal.connection {
                SignallingConnection::Active(active) => {
                    assert_eq!(active.sink, HandleRef::Wire(WireId::new(0x40)));
                    assert_eq!(active.received_packet.as_deref(), Some(&[0xaa, 0xbb][..]));
                }
                other => panic!("unexpected {:?}", other),
            }
            assert_eq!(device.media[0].sink(), Some(HandleRef::Wire(WireId::new(0x41))));
            assert_eq!(device.media[1], MediaChannel::default());
            assert_eq!(device.reconfig_caps.as_deref(), Some(&[0x07, 0x06, 0x00][..]));
            let blocks = received.data_blocks.expect("blocks");
            assert_eq!(blocks.block.len(), 16 + DATA_BLOCK_INFO_SIZE * MAX_DATA_BLOCKS);
        }
    }

    #[test]
    fn test_transitional_state_has_no_arm() {
        let mut device = connected_device();
        device.media[1].status.connection_state = ConnectionState::Connecting;
        let root = A2dpMarshalData {
            remote_conn: Some(device),
            data_blocks: None,
        };
        let mut m = Marshaller::begin(&REGISTRY);
        let mut buf = [0u8; 256];
        let err = m
            .marshal_with_resolver(&mut buf, &root.to_value(), A2DP_MARSHAL_DATA, &resolver)
            .unwrap_err();
        assert!(matches!(err, MarshalError::NoActiveArm { discriminant: 1, .. }));
    }

    #[test]
    fn test_unknown_state_octet_rejected() {
        let mut value = MediaStatus::default().to_value();
        if let Value::Struct(members) = &mut value {
            members[0] = Value::U8(0x7f);
        }
        assert!(matches!(
            MediaStatus::from_value(value),
            Err(MarshalError::InvalidLeaf { .. })
        ));
    }
}
