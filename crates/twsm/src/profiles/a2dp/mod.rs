// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! A2DP connection table.
//!
//! Each remote device owns one signalling channel and up to
//! [`MAX_MEDIA_CHANNELS`] media channels. A channel carries either its
//! setup context (while idle) or its live sink (once connected); the
//! snapshot selects the union arm from the channel's connection state.

mod handover;
pub mod marshal_desc;

pub use handover::A2dpHandover;
pub use marshal_desc::{A2dpMarshalData, REGISTRY};

use crate::bdaddr::BdAddr;
use crate::marshal::HandleRef;
use crate::transport::TaskId;
use parking_lot::Mutex;
use std::sync::Arc;

pub const MAX_REMOTE_DEVICES: usize = 2;
pub const MAX_MEDIA_CHANNELS: usize = 2;
pub const MAX_DATA_BLOCKS: usize = 8;
/// Per-block bookkeeping appended after the padded block storage.
pub const DATA_BLOCK_INFO_SIZE: usize = 4;

/// Task receiving signalling and media stream messages.
pub const A2DP_TASK: TaskId = TaskId(0x0a2d);

wire_enum! {
    /// L2CAP channel lifecycle.
    #[derive(Default)]
    pub enum ConnectionState: "a2dp_connection_state" {
        #[default]
        Idle = 0,
        Connecting = 1,
        Crossover = 2,
        Connected = 3,
        Disconnecting = 4,
        DisconnectPending = 5,
    }
}

impl ConnectionState {
    /// Union arm carried by a channel in this state.
    pub fn arm(self) -> Option<usize> {
        match self {
            Self::Idle => Some(0),
            Self::Connected => Some(1),
            _ => None,
        }
    }

    /// Media channel still holds a usable sink.
    pub fn has_live_sink(self) -> bool {
        matches!(self, Self::Connected | Self::Disconnecting | Self::DisconnectPending)
    }
}

wire_enum! {
    /// AVDTP stream endpoint state.
    #[derive(Default)]
    pub enum StreamState: "a2dp_stream_state" {
        #[default]
        Idle = 0,
        Discovering = 1,
        Configuring = 2,
        Configured = 3,
        LocalOpening = 4,
        RemoteOpening = 5,
        Open = 6,
        Starting = 7,
        Streaming = 8,
        Suspending = 9,
        Closing = 10,
        Reconfiguring = 11,
        Aborting = 12,
    }
}

impl StreamState {
    /// No AVDTP procedure is running.
    pub fn is_stable(self) -> bool {
        matches!(self, Self::Idle | Self::Configured | Self::Open | Self::Streaming)
    }
}

/// Stream endpoint descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SepInfo {
    pub seid: u8,
    pub media_type: u8,
    pub codec: u8,
    pub in_use: bool,
}

/// Context of a channel that is not connected yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnectionSetup {
    pub inbound: bool,
    pub attempts: u8,
    pub identifier: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SignallingStatus {
    pub connection_state: ConnectionState,
    pub stream_state: StreamState,
    pub pending_issued_transaction: bool,
    pub pending_received_transaction: bool,
}

/// Live signalling channel.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SignallingActive {
    pub sink: HandleRef,
    pub mtu: u16,
    /// Fragment of a signalling packet still being reassembled.
    pub received_packet: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignallingConnection {
    Setup(ConnectionSetup),
    Active(SignallingActive),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignallingChannel {
    pub status: SignallingStatus,
    pub connection: SignallingConnection,
}

impl Default for SignallingChannel {
    fn default() -> Self {
        Self {
            status: SignallingStatus::default(),
            connection: SignallingConnection::Setup(ConnectionSetup::default()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MediaStatus {
    pub connection_state: ConnectionState,
    pub seid: u8,
}

/// Live media channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MediaActive {
    pub sink: HandleRef,
    pub mtu: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaConnection {
    Setup(ConnectionSetup),
    Active(MediaActive),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaChannel {
    pub status: MediaStatus,
    pub connection: MediaConnection,
}

impl Default for MediaChannel {
    fn default() -> Self {
        Self {
            status: MediaStatus::default(),
            connection: MediaConnection::Setup(ConnectionSetup::default()),
        }
    }
}

impl MediaChannel {
    /// Sink of a connected channel, if it has one.
    pub fn sink(&self) -> Option<HandleRef> {
        match self.connection {
            MediaConnection::Active(active) if !active.sink.is_unset() => Some(active.sink),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceFlags {
    pub device_id: u8,
    pub local_initiated: bool,
    pub profile_version: u16,
}

/// One connected A2DP peer.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RemoteDevice {
    /// Key of the table entry. Not transferred: the receiver keys by peer.
    pub addr: BdAddr,
    pub flags: DeviceFlags,
    pub remote_sep: SepInfo,
    pub local_sep: SepInfo,
    /// Capabilities of a reconfiguration in progress.
    pub reconfig_caps: Option<Vec<u8>>,
    pub signal: SignallingChannel,
    pub media: [MediaChannel; MAX_MEDIA_CHANNELS],
}

impl RemoteDevice {
    pub fn new(addr: BdAddr) -> Self {
        Self {
            addr,
            ..Self::default()
        }
    }

    /// Why this device cannot be handed over right now.
    pub fn busy_reason(&self) -> Option<&'static str> {
        let status = &self.signal.status;
        if !matches!(status.connection_state, ConnectionState::Idle | ConnectionState::Connected) {
            return Some("signalling channel changing state");
        }
        if !status.stream_state.is_stable() {
            return Some("stream procedure in progress");
        }
        if status.pending_issued_transaction || status.pending_received_transaction {
            return Some("signalling transaction pending");
        }
        if self
            .media
            .iter()
            .any(|m| m.status.connection_state.arm().is_none())
        {
            return Some("media channel changing state");
        }
        None
    }
}

/// Codec data blocks shared by the streams of one device.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DataBlocks {
    pub size_blocks_padded: u16,
    /// `size_blocks_padded` bytes of blocks, then per-block info.
    pub block: Vec<u8>,
}

impl DataBlocks {
    pub fn new(size_blocks_padded: u16) -> Self {
        Self {
            size_blocks_padded,
            block: vec![0; Self::storage_len(size_blocks_padded)],
        }
    }

    /// Bytes of storage behind a header of this size.
    pub fn storage_len(size_blocks_padded: u16) -> usize {
        usize::from(size_blocks_padded) + DATA_BLOCK_INFO_SIZE * MAX_DATA_BLOCKS
    }
}

/// A2DP profile state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct A2dpProfile {
    pub initialised: bool,
    /// Messages queued to the application and not yet delivered.
    pub pending_messages: usize,
    pub remote_conn: [Option<RemoteDevice>; MAX_REMOTE_DEVICES],
    pub data_blocks: [Option<DataBlocks>; MAX_REMOTE_DEVICES],
}

pub type SharedA2dp = Arc<Mutex<A2dpProfile>>;

impl A2dpProfile {
    pub fn new() -> Self {
        Self {
            initialised: true,
            ..Self::default()
        }
    }

    pub fn shared(self) -> SharedA2dp {
        Arc::new(Mutex::new(self))
    }

    /// Slot of the device connected to `addr`.
    pub fn device_slot(&self, addr: &BdAddr) -> Option<usize> {
        self.remote_conn
            .iter()
            .position(|d| d.as_ref().is_some_and(|d| d.addr == *addr))
    }

    pub fn device(&self, addr: &BdAddr) -> Option<&RemoteDevice> {
        self.device_slot(addr).and_then(|i| self.remote_conn[i].as_ref())
    }

    /// Slot for `addr`: its existing entry or the first free one.
    pub fn slot_for(&self, addr: &BdAddr) -> Option<usize> {
        self.device_slot(addr)
            .or_else(|| self.remote_conn.iter().position(Option::is_none))
    }

    /// Insert `device` into a free slot.
    pub fn add_device(&mut self, device: RemoteDevice) -> Option<usize> {
        let slot = self.slot_for(&device.addr)?;
        self.remote_conn[slot] = Some(device);
        Some(slot)
    }

    /// Why the profile blocks a handover, if it does.
    pub fn veto_reason(&self) -> Option<&'static str> {
        if !self.initialised {
            return Some("not initialised");
        }
        if self.pending_messages > 0 {
            return Some("messages pending");
        }
        self.remote_conn
            .iter()
            .flatten()
            .find_map(RemoteDevice::busy_reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PEER: BdAddr = BdAddr::new([0x00, 0x02, 0x5b, 0xa2, 0xd0, 0x01]);

    #[test]
    fn test_arm_follows_connection_state() {
        assert_eq!(ConnectionState::Idle.arm(), Some(0));
        assert_eq!(ConnectionState::Connected.arm(), Some(1));
        assert_eq!(ConnectionState::Connecting.arm(), None);
        assert_eq!(ConnectionState::try_from(9).ok(), None);
        assert_eq!(ConnectionState::try_from(3).ok(), Some(ConnectionState::Connected));
    }

    #[test]
    fn test_slots() {
        let mut profile = A2dpProfile::new();
        assert_eq!(profile.slot_for(&PEER), Some(0));
        profile.add_device(RemoteDevice::new(BdAddr::new([1; 6])));
        assert_eq!(profile.slot_for(&PEER), Some(1));
        assert_eq!(profile.add_device(RemoteDevice::new(PEER)), Some(1));
        assert_eq!(profile.device_slot(&PEER), Some(1));
        assert_eq!(profile.slot_for(&BdAddr::new([9; 6])), None);
    }

    #[test]
    fn test_veto_reasons() {
        let mut profile = A2dpProfile::default();
        assert_eq!(profile.veto_reason(), Some("not initialised"));

        profile.initialised = true;
        assert_eq!(profile.veto_reason(), None);

        profile.pending_messages = 1;
        assert_eq!(profile.veto_reason(), Some("messages pending"));
        profile.pending_messages = 0;

        let mut device = RemoteDevice::new(PEER);
        device.signal.status.pending_received_transaction = true;
        profile.add_device(device);
        assert_eq!(profile.veto_reason(), Some("signalling transaction pending"));

        let device = profile.remote_conn[0].as_mut().unwrap();
        device.signal.status.pending_received_transaction = false;
        device.signal.status.stream_state = StreamState::Starting;
        assert_eq!(profile.veto_reason(), Some("stream procedure in progress"));

        let device = profile.remote_conn[0].as_mut().unwrap();
        device.signal.status.stream_state = StreamState::Streaming;
        device.media[1].status.connection_state = ConnectionState::Disconnecting;
        assert_eq!(profile.veto_reason(), Some("media channel changing state"));
    }

    #[test]
    fn test_data_block_storage() {
        let blocks = DataBlocks::new(64);
        assert_eq!(blocks.block.len(), 64 + DATA_BLOCK_INFO_SIZE * MAX_DATA_BLOCKS);
    }
}
