// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # twsm - Bluetooth profile role handover
//!
//! Moves the live state of A2DP, AVRCP and HFP connections from one device
//! of a primary/secondary pair to the other without dropping the link.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::time::Instant;
//! use twsm::handover::HandoverController;
//! use twsm::BdAddr;
//!
//! let mut controller = HandoverController::default();
//! let peer: BdAddr = "00:02:5b:12:34:56".parse().unwrap();
//!
//! assert!(!controller.veto(peer, Instant::now()).unwrap());
//! let mut buf = [0u8; 64];
//! let progress = controller.marshal(&mut buf).unwrap();
//! assert!(progress.done);
//! assert_eq!(&buf[..progress.bytes], &[0xff]); // no adapters: END only
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +---------------------------------------------------------------------+
//! |                         Profile Adapters                            |
//! |        A2DP | AVRCP | HFP  (veto, snapshot, commit stitching)       |
//! +---------------------------------------------------------------------+
//! |                        Handover Controller                          |
//! |   veto -> marshal -> transport -> unmarshal -> commit -> complete   |
//! +---------------------------------------------------------------------+
//! |                        Marshalling Engine                           |
//! |   Type registries | Marshaller | Unmarshaller (resumable)           |
//! +---------------------------------------------------------------------+
//! |                        Transport Boundary                           |
//! |   wire id <-> local sink | routing | handover policy                |
//! +---------------------------------------------------------------------+
//! ```
//!
//! ## Modules Overview
//!
//! - [`marshal`] - schema-driven marshaller and unmarshaller
//! - [`handover`] - controller and the adapter interface
//! - [`profiles`] - A2DP, AVRCP and HFP adapters
//! - [`transport`] - stream transport contract and simulator
//! - [`config`] - constants and run-time configuration

/// Bluetooth device address.
pub mod bdaddr;
/// Stream layout constants and run-time handover configuration.
pub mod config;
/// Handover error type.
pub mod error;
/// Handover controller, adapter interface and stream framing.
pub mod handover;
/// Global logger with console and file outputs.
#[cfg(feature = "logging")]
pub mod logging;
/// Type registries, marshaller and unmarshaller.
pub mod marshal;
/// Profile state tables and their handover adapters.
pub mod profiles;
/// Stream transport boundary.
pub mod transport;

pub use bdaddr::BdAddr;
pub use error::{Error, Result};

/// Crate version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
