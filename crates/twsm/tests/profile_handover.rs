// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::uninlined_format_args)] // Test/bench code readability over pedantic
#![allow(clippy::cast_possible_truncation)] // Test parameters
#![allow(clippy::unreadable_literal)] // Large test constants
#![allow(clippy::doc_markdown)] // Test documentation
#![allow(clippy::missing_panics_doc)] // Tests/examples panic on failure
#![allow(clippy::items_after_statements)] // Test helpers
#![allow(clippy::too_many_lines)] // Example/test code
#![allow(clippy::similar_names)] // Test variable naming

//! End-to-end handover of A2DP, AVRCP and HFP state between two simulated
//! devices.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use twsm::config::{CorruptStreamPolicy, HandoverConfig};
use twsm::handover::{HandoverController, HandoverState, Outcome};
use twsm::marshal::{HandleRef, LocalHandle, WireFormat, WireId};
use twsm::profiles::a2dp::{
    A2dpProfile, ConnectionState, DataBlocks, MediaActive, MediaChannel, MediaConnection,
    MediaStatus, RemoteDevice, SignallingActive, SignallingChannel, SignallingConnection,
    SignallingStatus, StreamState, A2DP_TASK,
};
use twsm::profiles::avrcp::{
    AvrcpConnection, AvrcpProfile, AvrcpState, BrowsingChannel, DeviceRole, AVBP_TASK, AVRCP_TASK,
};
use twsm::profiles::hfp::{
    HfpLink, HfpProfile, HfpService, LinkFlags, LinkPriority, SlcState, HFP_TASK,
};
use twsm::profiles::ProfileTables;
use twsm::transport::{ChannelKind, HandoverPolicy, SharedTransport, SimSnapshot, SimTransport};
use twsm::{BdAddr, Error};

const PEER: BdAddr = BdAddr::new([0x00, 0x02, 0x5b, 0x00, 0xea, 0x01]);

const SIGNAL_CID: u16 = 0x40;
const MEDIA_CID: u16 = 0x41;
const AVRCP_CID: u16 = 0x45;
const AVBP_CID: u16 = 0x46;
const HFP_CHANNEL: u16 = 12;
const HFP_SERVICE_CHANNEL: u8 = 3;

struct Device {
    sim: Arc<Mutex<SimTransport>>,
    tables: ProfileTables,
    controller: HandoverController,
}

/// Captured state compared across an aborted attempt.
#[derive(Debug, PartialEq)]
struct Capture {
    streams: SimSnapshot,
    a2dp: A2dpProfile,
    avrcp: AvrcpProfile,
    hfp: HfpProfile,
    bindings: usize,
}

impl Device {
    fn new(handle_base: u32, config: HandoverConfig) -> Self {
        let sim = Arc::new(Mutex::new(SimTransport::new(handle_base)));
        let services = vec![
            HfpService {
                handle: LocalHandle::new(handle_base + 0x80),
                server_channel: 2,
            },
            HfpService {
                handle: LocalHandle::new(handle_base + 0x81),
                server_channel: HFP_SERVICE_CHANNEL,
            },
        ];
        let tables = ProfileTables {
            a2dp: A2dpProfile::new().shared(),
            avrcp: AvrcpProfile::new(DeviceRole::ControllerAndTarget)
                .with_browsing(true)
                .shared(),
            hfp: HfpProfile::new(services).shared(),
        };
        let mut controller = HandoverController::with_config(config).expect("valid config");
        let transport: SharedTransport = sim.clone();
        tables
            .register(&mut controller, transport)
            .expect("three adapters");
        Self {
            sim,
            tables,
            controller,
        }
    }

    /// Open the baseband channels shared with the phone.
    fn open_links(&self, with_rfcomm: bool) -> Vec<LocalHandle> {
        let mut sim = self.sim.lock();
        let mut handles: Vec<LocalHandle> = [SIGNAL_CID, MEDIA_CID, AVRCP_CID, AVBP_CID]
            .iter()
            .map(|cid| sim.open_stream(PEER, ChannelKind::L2cap, WireId::new(*cid)))
            .collect();
        if with_rfcomm {
            handles.push(sim.open_stream(PEER, ChannelKind::Rfcomm, WireId::new(HFP_CHANNEL)));
        }
        handles
    }

    /// Populate live profile state over the channels from `open_links`.
    fn connect(&self) {
        let handles = self.open_links(true);
        let (signal, media, avrcp, avbp, rfcomm) =
            (handles[0], handles[1], handles[2], handles[3], handles[4]);

        let mut device = RemoteDevice::new(PEER);
        device.flags.profile_version = 0x0103;
        device.reconfig_caps = Some(vec![0x01, 0x00]);
        device.signal = SignallingChannel {
            status: SignallingStatus {
                connection_state: ConnectionState::Connected,
                stream_state: StreamState::Streaming,
                ..Default::default()
            },
            connection: SignallingConnection::Active(SignallingActive {
                sink: HandleRef::Local(signal),
                mtu: 672,
                received_packet: Some(vec![0x10, 0x02, 0x04]),
            }),
        };
        device.media[0] = MediaChannel {
            status: MediaStatus {
                connection_state: ConnectionState::Connected,
                seid: 1,
            },
            connection: MediaConnection::Active(MediaActive {
                sink: HandleRef::Local(media),
                mtu: 895,
            }),
        };
        {
            let mut a2dp = self.tables.a2dp.lock();
            let slot = a2dp.add_device(device).expect("free slot");
            a2dp.data_blocks[slot] = Some(DataBlocks::new(48));
        }

        let mut conn = AvrcpConnection::new(PEER);
        conn.sink = HandleRef::Local(avrcp);
        conn.state = AvrcpState::Connected;
        conn.remote_features = 0x00c1;
        conn.volume = 0x55;
        conn.browsing = Some(BrowsingChannel {
            sink: HandleRef::Local(avbp),
            mtu: 1000,
            uid_counter: 3,
        });
        self.tables.avrcp.lock().connections.push(conn);

        let mut hfp = self.tables.hfp.lock();
        let service = hfp
            .service_for_channel(HFP_SERVICE_CHANNEL)
            .expect("service record");
        hfp.flags.hf_supported_features = 0x02ff;
        hfp.links[0] = HfpLink {
            addr: PEER,
            sink: HandleRef::Local(rfcomm),
            service: HandleRef::Local(service),
            flags: LinkFlags {
                slc_state: SlcState::Connected,
                priority: LinkPriority::Primary,
                ..Default::default()
            },
            ag_supported_features: 0x0fff,
            ag_codec_modes: 0x0003,
            ..Default::default()
        };
    }

    fn capture(&self) -> Capture {
        Capture {
            streams: self.sim.lock().snapshot(),
            a2dp: self.tables.a2dp.lock().clone(),
            avrcp: self.tables.avrcp.lock().clone(),
            hfp: self.tables.hfp.lock().clone(),
            bindings: self.controller.stream_map().read().len(),
        }
    }
}

fn pair(config: HandoverConfig) -> (Device, Device) {
    let primary = Device::new(0x100, config.clone());
    let secondary = Device::new(0x900, config);
    primary.connect();
    (primary, secondary)
}

/// Marshal the whole stream on `primary` with buffers of `chunk` bytes.
fn marshal_all(primary: &mut Device, chunk: usize) -> Vec<u8> {
    let mut stream = Vec::new();
    loop {
        let mut buf = vec![0u8; chunk];
        let p = primary.controller.marshal(&mut buf).expect("marshal");
        stream.extend_from_slice(&buf[..p.bytes]);
        if p.done {
            return stream;
        }
    }
}

fn start(primary: &mut Device, secondary: &mut Device) {
    let now = Instant::now();
    assert!(!primary.controller.veto(PEER, now).unwrap());
    assert!(!secondary.controller.veto(PEER, now).unwrap());
}

fn feed(secondary: &mut Device, stream: &[u8], splits: &[usize]) -> twsm::Result<bool> {
    let mut offset = 0;
    let mut done = false;
    for len in splits.iter().copied().chain(std::iter::once(stream.len())) {
        let end = (offset + len).min(stream.len());
        if end == offset {
            continue;
        }
        done = secondary.controller.unmarshal(&stream[offset..end])?.done;
        offset = end;
    }
    Ok(done)
}

fn finish(primary: &mut Device, secondary: &mut Device) {
    primary.controller.commit(false).expect("old role commit");
    secondary.controller.commit(true).expect("new role commit");
    assert_eq!(primary.controller.complete().unwrap(), Outcome::Completed);
    assert_eq!(secondary.controller.complete().unwrap(), Outcome::Completed);
}

fn assert_secondary_live(secondary: &Device) {
    let sim = secondary.sim.lock();
    let by_wire = |kind, id| {
        sim.streams()
            .iter()
            .find(|s| s.kind == kind && s.wire_id == WireId::new(id))
            .cloned()
            .expect("stream")
    };
    let signal = by_wire(ChannelKind::L2cap, SIGNAL_CID);
    let media = by_wire(ChannelKind::L2cap, MEDIA_CID);
    let avrcp = by_wire(ChannelKind::L2cap, AVRCP_CID);
    let avbp = by_wire(ChannelKind::L2cap, AVBP_CID);
    let rfcomm = by_wire(ChannelKind::Rfcomm, HFP_CHANNEL);

    assert_eq!((signal.route, signal.policy), (Some(A2DP_TASK), HandoverPolicy::AllowWithoutData));
    assert_eq!((media.route, media.policy), (Some(A2DP_TASK), HandoverPolicy::Allow));
    assert_eq!((avrcp.route, avrcp.policy), (Some(AVRCP_TASK), HandoverPolicy::AllowWithoutData));
    assert_eq!((avbp.route, avbp.policy), (Some(AVBP_TASK), HandoverPolicy::AllowWithoutData));
    assert_eq!((rfcomm.route, rfcomm.policy), (Some(HFP_TASK), HandoverPolicy::AllowWithoutData));

    let a2dp = secondary.tables.a2dp.lock();
    let device = a2dp.device(&PEER).expect("a2dp device");
    assert_eq!(device.media[0].sink(), Some(HandleRef::Local(media.handle)));
    assert_eq!(device.media[1], MediaChannel::default());
    assert_eq!(device.reconfig_caps.as_deref(), Some(&[0x01, 0x00][..]));

    let avrcp_table = secondary.tables.avrcp.lock();
    let conn = avrcp_table.connection(&PEER).expect("avrcp connection");
    assert_eq!(conn.volume, 0x55);
    assert_eq!(conn.browsing.map(|b| b.sink), Some(HandleRef::Local(avbp.handle)));

    let hfp = secondary.tables.hfp.lock();
    let link = hfp.link(&PEER).expect("hfp link");
    assert_eq!(link.sink, HandleRef::Local(rfcomm.handle));
    assert_eq!(
        link.service,
        HandleRef::Local(hfp.service_for_channel(HFP_SERVICE_CHANNEL).unwrap())
    );
    assert_eq!(hfp.flags.hf_supported_features, 0x02ff);

    assert_eq!(secondary.controller.stream_map().read().len(), 5);
}

#[test]
fn test_full_handover_across_chunkings() {
    for format in [WireFormat::Implicit, WireFormat::Tagged] {
        for chunk in [4usize, 5, 7, 16, 64, 4096] {
            let config = HandoverConfig::default().with_wire_format(format);
            let (mut primary, mut secondary) = pair(config);
            secondary.open_links(true);
            start(&mut primary, &mut secondary);

            let stream = marshal_all(&mut primary, chunk);
            assert_eq!(stream.last(), Some(&0xff));

            let splits = vec![chunk; stream.len() / chunk + 1];
            assert!(feed(&mut secondary, &stream, &splits).unwrap(), "{} {}", format, chunk);
            finish(&mut primary, &mut secondary);
            assert_secondary_live(&secondary);
            assert_eq!(primary.controller.state(), HandoverState::Idle);
        }
    }
}

#[test]
fn test_random_delivery_chunking() {
    let mut rng = fastrand::Rng::with_seed(0x7e5);
    for _ in 0..16 {
        let (mut primary, mut secondary) = pair(HandoverConfig::default());
        secondary.open_links(true);
        start(&mut primary, &mut secondary);
        let stream = marshal_all(&mut primary, 4096);

        let mut splits = Vec::new();
        let mut total = 0;
        while total < stream.len() {
            let n = rng.usize(1..=9);
            splits.push(n);
            total += n;
        }
        assert!(feed(&mut secondary, &stream, &splits).unwrap());
        finish(&mut primary, &mut secondary);
        assert_secondary_live(&secondary);
    }
}

/// One complete handover from `from` to `to` with 16-byte buffers.
fn hand_over(from: &mut Device, to: &mut Device) {
    start(from, to);
    let stream = marshal_all(from, 16);
    assert!(feed(to, &stream, &[16; 64]).unwrap());
    finish(from, to);
}

#[test]
fn test_repeated_handovers_in_both_directions() {
    let (mut a, mut b) = pair(HandoverConfig::default());
    b.open_links(true);

    hand_over(&mut a, &mut b);
    assert_secondary_live(&b);
    hand_over(&mut b, &mut a);
    assert_secondary_live(&a);
    hand_over(&mut a, &mut b);
    assert_secondary_live(&b);

    for device in [&a, &b] {
        assert_eq!(device.controller.last_outcome(), Some(Outcome::Completed));
        let hfp = device.tables.hfp.lock();
        assert_eq!(hfp.link_slot(&PEER), Some(0));
        assert!(hfp.links[1..].iter().all(HfpLink::is_idle));
    }
}

#[test]
fn test_repeated_handover_rollback_keeps_earlier_bindings() {
    let (mut a, mut b) = pair(HandoverConfig::default());
    b.open_links(true);
    hand_over(&mut a, &mut b);
    let before = b.capture();
    assert_eq!(before.bindings, 5);

    start(&mut a, &mut b);
    let stream = marshal_all(&mut a, 4096);
    assert!(feed(&mut b, &stream, &[]).unwrap());
    b.sim.lock().reject_policy_changes(true);
    assert!(matches!(b.controller.commit(true), Err(Error::CommitFailed { .. })));
    b.sim.lock().reject_policy_changes(false);

    assert_eq!(b.controller.last_outcome(), Some(Outcome::Aborted));
    assert_eq!(b.capture(), before);
}

#[test]
fn test_config_change_mid_attempt_keeps_both_sides_aligned() {
    let (mut reference, _) = pair(HandoverConfig::default());
    let (mut scratch, _) = pair(HandoverConfig::default());
    start(&mut reference, &mut scratch);
    let implicit = marshal_all(&mut reference, 4096);

    let (mut primary, mut secondary) = pair(HandoverConfig::default());
    secondary.open_links(true);
    start(&mut primary, &mut secondary);
    let tagged = HandoverConfig::default().with_wire_format(WireFormat::Tagged);
    primary.controller.config().set(tagged.clone()).unwrap();
    secondary.controller.config().set(tagged).unwrap();

    let stream = marshal_all(&mut primary, 16);
    assert_eq!(stream, implicit);
    assert!(feed(&mut secondary, &stream, &[7; 64]).unwrap());
    finish(&mut primary, &mut secondary);
    assert_secondary_live(&secondary);
}

#[test]
fn test_veto_on_pending_transaction_stops_marshal() {
    let (mut primary, _secondary) = pair(HandoverConfig::default());
    primary.tables.a2dp.lock().remote_conn[0]
        .as_mut()
        .unwrap()
        .signal
        .status
        .pending_issued_transaction = true;

    let now = Instant::now();
    assert!(primary.controller.veto(PEER, now).unwrap());
    assert!(primary.controller.veto(PEER, now).unwrap());
    assert_eq!(primary.controller.last_outcome(), Some(Outcome::Vetoed));
    let mut buf = [0u8; 64];
    assert!(matches!(
        primary.controller.marshal(&mut buf),
        Err(Error::InvalidState { .. })
    ));
}

#[test]
fn test_commit_before_end_is_refused() {
    let (mut primary, mut secondary) = pair(HandoverConfig::default());
    secondary.open_links(true);
    let before = secondary.capture();
    start(&mut primary, &mut secondary);
    let stream = marshal_all(&mut primary, 64);

    secondary.controller.unmarshal(&stream[..stream.len() / 2]).unwrap();
    assert!(matches!(secondary.controller.commit(true), Err(Error::CommitNotReady)));
    assert_eq!(secondary.capture(), before);

    secondary.controller.unmarshal(&stream[stream.len() / 2..]).unwrap();
    secondary.controller.commit(true).unwrap();
}

#[test]
fn test_hfp_commit_failure_restores_everything() {
    let (mut primary, mut secondary) = pair(HandoverConfig::default());
    // No RFCOMM channel on the secondary: HFP cannot resolve its sink after
    // A2DP and AVRCP have committed.
    secondary.open_links(false);
    let before = secondary.capture();
    start(&mut primary, &mut secondary);
    let stream = marshal_all(&mut primary, 128);
    assert!(feed(&mut secondary, &stream, &[]).unwrap());

    match secondary.controller.commit(true) {
        Err(Error::CommitFailed { client, .. }) => assert_eq!(client, "hfp"),
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(secondary.controller.state(), HandoverState::Idle);
    assert_eq!(secondary.controller.last_outcome(), Some(Outcome::Aborted));
    assert_eq!(secondary.capture(), before);
    assert!(!secondary.controller.stream_map().read().is_window_open());

    // The primary still owns the connections and can abort cleanly.
    let primary_before = primary.capture();
    assert!(primary.controller.abort());
    assert_eq!(primary.capture(), primary_before);
}

#[test]
fn test_timeout_while_awaiting_transport() {
    let config = HandoverConfig::default().with_transfer_timeout(Duration::from_millis(500));
    let (mut primary, _secondary) = pair(config);
    let t0 = Instant::now();
    assert!(!primary.controller.veto(PEER, t0).unwrap());
    marshal_all(&mut primary, 64);
    assert_eq!(primary.controller.state(), HandoverState::AwaitingTransport);

    primary.controller.poll(t0 + Duration::from_millis(499)).unwrap();
    assert!(matches!(
        primary.controller.poll(t0 + Duration::from_millis(500)),
        Err(Error::Timeout)
    ));
    assert_eq!(primary.controller.last_outcome(), Some(Outcome::Aborted));
}

#[test]
fn test_corrupted_state_octet_aborts_receiver() {
    let config = HandoverConfig::default().with_corrupt_stream(CorruptStreamPolicy::Abort);
    let (mut primary, mut secondary) = pair(config);
    secondary.open_links(true);
    let before = secondary.capture();
    start(&mut primary, &mut secondary);
    let mut stream = marshal_all(&mut primary, 4096);

    // A2DP record: header (3), remote_conn presence (1), flags (4),
    // sep infos (8), caps size (2), caps presence (1), caps (2), then the
    // signalling connection state.
    let state_offset = 3 + 1 + 4 + 8 + 2 + 1 + 2;
    assert_eq!(stream[state_offset], ConnectionState::Connected as u8);
    stream[state_offset] = 0x7f;

    let err = feed(&mut secondary, &stream, &[]).unwrap_err();
    assert!(err.is_corruption(), "{}", err);
    assert_eq!(secondary.controller.last_outcome(), Some(Outcome::Aborted));
    assert_eq!(secondary.capture(), before);
}

#[test]
#[should_panic(expected = "corrupt handover stream")]
fn test_corruption_panics_by_default() {
    let (mut primary, mut secondary) = pair(HandoverConfig::default());
    start(&mut primary, &mut secondary);
    let mut stream = marshal_all(&mut primary, 4096);
    stream[0] = 0x09;
    let _ = feed(&mut secondary, &stream, &[]);
}
