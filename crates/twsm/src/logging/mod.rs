// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Log backend for binaries embedding the handover.
//!
//! Library code logs through the `log` facade with `[component]` prefixes.
//! This module (feature `logging`) installs a global backend that forwards
//! those records to a console or file [`Output`].
//!
//! ```ignore
//! use std::sync::Arc;
//! use twsm::logging::{init_logger, ConsoleOutput, LogLevel};
//!
//! init_logger(Arc::new(ConsoleOutput::new(LogLevel::Debug)), LogLevel::Debug);
//! log::info!("[sim] handover started");
//! ```

pub mod logger;
mod output;

pub use logger::{flush_logger, init_logger};
pub use output::{ConsoleOutput, FileOutput, LogLevel, Output};
