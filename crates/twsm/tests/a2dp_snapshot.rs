// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::uninlined_format_args)] // Test/bench code readability over pedantic
#![allow(clippy::cast_possible_truncation)] // Test parameters
#![allow(clippy::missing_panics_doc)] // Tests/examples panic on failure

//! A2DP snapshot with one connected and one idle media channel, delivered
//! in three unequal pieces.

use twsm::config::RuntimeConfig;
use twsm::handover::HandoverInterface;
use twsm::marshal::{HandleRef, MarshalObject, Marshaller, Unmarshaller, WireFormat, WireId};
use twsm::profiles::a2dp::marshal_desc::A2DP_MARSHAL_DATA;
use twsm::profiles::a2dp::{
    A2dpHandover, A2dpMarshalData, A2dpProfile, ConnectionSetup, ConnectionState, MediaActive,
    MediaChannel, MediaConnection, MediaStatus, RemoteDevice, SignallingActive, SignallingChannel,
    SignallingConnection, SignallingStatus, StreamState, REGISTRY,
};
use twsm::profiles::DeviceContext;
use twsm::transport::{self, ChannelKind, SimTransport, StreamMap, TransportResolver};
use twsm::BdAddr;

const PEER: BdAddr = BdAddr::new([0x00, 0x1b, 0xdc, 0x07, 0x32, 0x9e]);

fn live_device(sim: &mut SimTransport) -> RemoteDevice {
    let signal = sim.open_stream(PEER, ChannelKind::L2cap, WireId::new(0x0040));
    let media = sim.open_stream(PEER, ChannelKind::L2cap, WireId::new(0x0047));
    let mut device = RemoteDevice::new(PEER);
    device.signal = SignallingChannel {
        status: SignallingStatus {
            connection_state: ConnectionState::Connected,
            stream_state: StreamState::Open,
            ..Default::default()
        },
        connection: SignallingConnection::Active(SignallingActive {
            sink: HandleRef::Local(signal),
            mtu: 48,
            received_packet: None,
        }),
    };
    device.media[0] = MediaChannel {
        status: MediaStatus {
            connection_state: ConnectionState::Connected,
            seid: 2,
        },
        connection: MediaConnection::Active(MediaActive {
            sink: HandleRef::Local(media),
            mtu: 672,
        }),
    };
    device
}

fn thirds(n: usize) -> [usize; 3] {
    [n / 3, n / 3, n - 2 * (n / 3)]
}

#[test]
fn test_three_piece_reception() {
    for format in [WireFormat::Implicit, WireFormat::Tagged] {
        let mut sim = SimTransport::new(0x100);
        let root = A2dpMarshalData {
            remote_conn: Some(live_device(&mut sim)),
            data_blocks: None,
        };

        let mut marshaller = Marshaller::begin(&REGISTRY).with_format(format);
        let mut buf = vec![0u8; 256];
        let resolver = TransportResolver::new(&sim);
        assert!(marshaller
            .marshal_with_resolver(&mut buf, &root.to_value(), A2DP_MARSHAL_DATA, &resolver)
            .unwrap());
        let n = marshaller.produced();

        let mut unmarshaller = Unmarshaller::begin(&REGISTRY, A2DP_MARSHAL_DATA).with_format(format);
        let mut offset = 0;
        let mut result = None;
        for (i, len) in thirds(n).into_iter().enumerate() {
            let piece = &buf[offset..offset + len];
            offset += len;
            result = unmarshaller.feed(piece).unwrap();
            assert_eq!(result.is_some(), i == 2, "{} piece {}", format, i);
        }
        let (value, _) = result.expect("complete after the third piece");
        let received = A2dpMarshalData::from_value(value).unwrap();
        let device = received.remote_conn.expect("device");

        assert_eq!(device.media[0].sink(), Some(HandleRef::Wire(WireId::new(0x0047))));
        assert_eq!(device.media[1].status.connection_state, ConnectionState::Idle);
        assert_eq!(
            device.media[1].connection,
            MediaConnection::Setup(ConnectionSetup::default())
        );
        assert!(received.data_blocks.is_none());
    }
}

#[test]
fn test_adapter_reports_progress_per_piece() {
    let mut sim = SimTransport::new(0x100);
    let sender_profile = A2dpProfile::new().shared();
    sender_profile.lock().add_device(live_device(&mut sim));
    let sender_sim = transport::shared(sim);
    let config = RuntimeConfig::default();
    let mut sender = A2dpHandover::new(
        sender_profile,
        DeviceContext::new(sender_sim, StreamMap::shared(), config.clone()),
    );
    let mut receiver = A2dpHandover::new(
        A2dpProfile::new().shared(),
        DeviceContext::new(transport::shared(SimTransport::new(0x900)), StreamMap::shared(), config),
    );

    let mut buf = [0u8; 256];
    let p = sender.marshal(&PEER, &mut buf).unwrap();
    assert!(p.done);

    let mut offset = 0;
    for (i, len) in thirds(p.bytes).into_iter().enumerate() {
        let progress = receiver.unmarshal(&PEER, &buf[offset..offset + len]).unwrap();
        offset += len;
        assert_eq!(progress.bytes, len);
        assert_eq!(progress.done, i == 2);
    }
}
