// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! One simulated earbud: transport, profile tables and controller.

use anyhow::{Context, Result};
use parking_lot::Mutex;
use std::sync::Arc;
use twsm::config::HandoverConfig;
use twsm::handover::HandoverController;
use twsm::marshal::{HandleRef, LocalHandle, WireId};
use twsm::profiles::a2dp::{
    A2dpProfile, ConnectionState, DataBlocks, MediaActive, MediaChannel, MediaConnection,
    MediaStatus, RemoteDevice, SignallingActive, SignallingChannel, SignallingConnection,
    SignallingStatus, StreamState,
};
use twsm::profiles::avrcp::{AvrcpConnection, AvrcpProfile, AvrcpState, BrowsingChannel, DeviceRole};
use twsm::profiles::hfp::{HfpLink, HfpProfile, HfpService, LinkFlags, LinkPriority, SlcState};
use twsm::profiles::ProfileTables;
use twsm::transport::{ChannelKind, SharedTransport, SimTransport};
use twsm::BdAddr;

pub const SIGNAL_CID: u16 = 0x40;
pub const MEDIA_CID: u16 = 0x41;
pub const AVRCP_CID: u16 = 0x45;
pub const AVBP_CID: u16 = 0x46;
pub const HFP_CHANNEL: u16 = 12;
pub const HFP_SERVICE_CHANNEL: u8 = 3;

pub struct Device {
    pub name: &'static str,
    pub sim: Arc<Mutex<SimTransport>>,
    pub tables: ProfileTables,
    pub controller: HandoverController,
}

impl Device {
    pub fn new(name: &'static str, handle_base: u32, config: HandoverConfig) -> Result<Self> {
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
        let mut controller = HandoverController::with_config(config)
            .with_context(|| format!("{}: invalid handover configuration", name))?;
        let transport: SharedTransport = sim.clone();
        tables
            .register(&mut controller, transport)
            .with_context(|| format!("{}: registering profile adapters", name))?;
        Ok(Self {
            name,
            sim,
            tables,
            controller,
        })
    }

    /// Open the baseband channels shared with the phone. Without
    /// `with_rfcomm` the HFP channel is missing and its commit fails.
    pub fn open_links(&self, peer: BdAddr, with_rfcomm: bool) -> Vec<LocalHandle> {
        let mut sim = self.sim.lock();
        let mut handles: Vec<LocalHandle> = [SIGNAL_CID, MEDIA_CID, AVRCP_CID, AVBP_CID]
            .iter()
            .map(|cid| sim.open_stream(peer, ChannelKind::L2cap, WireId::new(*cid)))
            .collect();
        if with_rfcomm {
            handles.push(sim.open_stream(peer, ChannelKind::Rfcomm, WireId::new(HFP_CHANNEL)));
        }
        handles
    }

    /// Streaming music, remote control with browsing and a connected
    /// hands-free link, all to `peer`.
    pub fn connect(&self, peer: BdAddr) -> Result<()> {
        let handles = self.open_links(peer, true);
        let (signal, media, avrcp, avbp, rfcomm) =
            (handles[0], handles[1], handles[2], handles[3], handles[4]);

        let mut device = RemoteDevice::new(peer);
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
                received_packet: None,
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
            let slot = a2dp
                .add_device(device)
                .context("no free A2DP device slot")?;
            a2dp.data_blocks[slot] = Some(DataBlocks::new(48));
        }

        let mut conn = AvrcpConnection::new(peer);
        conn.sink = HandleRef::Local(avrcp);
        conn.state = AvrcpState::Connected;
        conn.remote_features = 0x00c1;
        conn.volume = 0x40;
        conn.browsing = Some(BrowsingChannel {
            sink: HandleRef::Local(avbp),
            mtu: 1000,
            uid_counter: 1,
        });
        self.tables.avrcp.lock().connections.push(conn);

        let mut hfp = self.tables.hfp.lock();
        let service = hfp
            .service_for_channel(HFP_SERVICE_CHANNEL)
            .context("no HFP service record")?;
        hfp.flags.hf_supported_features = 0x02ff;
        hfp.links[0] = HfpLink {
            addr: peer,
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
        Ok(())
    }

    /// Print every stream the simulator knows with its routing.
    pub fn print_streams(&self) {
        println!("{} streams:", self.name);
        for s in self.sim.lock().streams() {
            let route = s.route.map_or_else(|| "-".to_string(), |t| t.to_string());
            println!(
                "  {:>6} {} wire {:>#6x} -> route {:<8} policy {:?}",
                s.kind,
                s.handle.raw(),
                s.wire_id.raw(),
                route,
                s.policy
            );
        }
    }
}
