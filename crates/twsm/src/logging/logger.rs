// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Global logger instance, installed as the `log` backend.

use super::output::{LogLevel, Output};
use std::io;
use std::sync::{Arc, OnceLock};

static LOGGER: OnceLock<GlobalLogger> = OnceLock::new();

/// Active output and level filter.
struct GlobalLogger {
    output: Arc<dyn Output>,
    level_filter: LogLevel,
}

impl log::Log for GlobalLogger {
    fn enabled(&self, metadata: &log::Metadata<'_>) -> bool {
        LogLevel::from(metadata.level()) >= self.level_filter
    }

    fn log(&self, record: &log::Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        // output errors are dropped
        let _ = self
            .output
            .write(LogLevel::from(record.level()), &record.args().to_string());
    }

    fn flush(&self) {
        let _ = self.output.flush();
    }
}

/// Install the global logger. Only the first call takes effect; returns
/// whether this call installed it.
pub fn init_logger(output: Arc<dyn Output>, level: LogLevel) -> bool {
    let mut installed = false;
    let logger = LOGGER.get_or_init(|| {
        installed = true;
        GlobalLogger {
            output,
            level_filter: level,
        }
    });
    if installed {
        if log::set_logger(logger).is_err() {
            return false;
        }
        log::set_max_level(level.to_level_filter());
    }
    installed
}

/// Flush the global logger's output. No-op before `init_logger`.
pub fn flush_logger() -> io::Result<()> {
    match LOGGER.get() {
        Some(logger) => logger.output.flush(),
        None => Ok(()),
    }
}
