// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Handover configuration.
//!
//! # Architecture
//!
//! - **Level 1 (Static)**: stream layout constants shared by both devices
//! - **Level 2 (Dynamic)**: [`HandoverConfig`], built from defaults, the
//!   environment and (feature `yaml-config`) YAML documents, and published
//!   through [`RuntimeConfig`]
//!
//! # Example YAML
//!
//! ```yaml
//! handover:
//!   wire_format: tagged
//!   transfer_timeout_ms: 5000
//!   corrupt_stream: panic
//!   max_record_len: 512
//! ```

use crate::error::{Error, Result};
use crate::marshal::WireFormat;
use arc_swap::ArcSwap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

// =======================================================================
// Stream layout (must match on both devices)
// =======================================================================

/// Terminates the multiplexed handover stream.
pub const END_TAG: u8 = 0xFF;

/// Record header: client id (1) + data length (2, little-endian).
pub const RECORD_HEADER_LEN: usize = 3;

/// Client ids run from 0 to `END_TAG - 1`.
pub const MAX_CLIENTS: usize = END_TAG as usize;

/// Largest data length a record header can carry.
pub const MAX_RECORD_LEN: usize = u16::MAX as usize;

// =======================================================================
// Defaults
// =======================================================================

/// Deadline for the transfer, armed once veto passes.
pub const DEFAULT_TRANSFER_TIMEOUT_MS: u64 = 8_000;

// =======================================================================
// Environment overrides
// =======================================================================

pub const ENV_WIRE_FORMAT: &str = "TWSM_WIRE_FORMAT";
pub const ENV_TRANSFER_TIMEOUT_MS: &str = "TWSM_TRANSFER_TIMEOUT_MS";
pub const ENV_CORRUPT_STREAM: &str = "TWSM_CORRUPT_STREAM";
pub const ENV_MAX_RECORD_LEN: &str = "TWSM_MAX_RECORD_LEN";

/// Reaction to a stream that fails validation on the receiving device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(
    feature = "yaml-config",
    derive(serde::Deserialize, serde::Serialize),
    serde(rename_all = "snake_case")
)]
pub enum CorruptStreamPolicy {
    /// Panic: the registries are out of sync and the stream cannot be
    /// resynchronised.
    #[default]
    Panic,
    /// Abort the attempt instead; the role stays where it was.
    Abort,
}

impl fmt::Display for CorruptStreamPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Abort => write!(f, "abort"),
            Self::Panic => write!(f, "panic"),
        }
    }
}

impl FromStr for CorruptStreamPolicy {
    type Err = String;

    fn from_str(s: &str) -> core::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "abort" => Ok(Self::Abort),
            "panic" => Ok(Self::Panic),
            other => Err(format!("unknown corrupt stream policy '{}'", other)),
        }
    }
}

/// Settings of one handover controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandoverConfig {
    pub wire_format: WireFormat,
    pub transfer_timeout: Duration,
    pub corrupt_stream: CorruptStreamPolicy,
    /// Largest record the sender emits; longer client data is split.
    pub max_record_len: usize,
}

impl Default for HandoverConfig {
    fn default() -> Self {
        Self {
            wire_format: WireFormat::Implicit,
            transfer_timeout: Duration::from_millis(DEFAULT_TRANSFER_TIMEOUT_MS),
            corrupt_stream: CorruptStreamPolicy::Panic,
            max_record_len: MAX_RECORD_LEN,
        }
    }
}

impl HandoverConfig {
    pub fn with_wire_format(mut self, format: WireFormat) -> Self {
        self.wire_format = format;
        self
    }

    pub fn with_transfer_timeout(mut self, timeout: Duration) -> Self {
        self.transfer_timeout = timeout;
        self
    }

    pub fn with_corrupt_stream(mut self, policy: CorruptStreamPolicy) -> Self {
        self.corrupt_stream = policy;
        self
    }

    pub fn with_max_record_len(mut self, len: usize) -> Self {
        self.max_record_len = len;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.transfer_timeout.is_zero() {
            return Err(Error::Config("transfer_timeout must be non-zero".into()));
        }
        if self.max_record_len == 0 || self.max_record_len > MAX_RECORD_LEN {
            return Err(Error::Config(format!(
                "max_record_len must be within 1..={}, got {}",
                MAX_RECORD_LEN, self.max_record_len
            )));
        }
        Ok(())
    }

    /// Defaults with `TWSM_*` environment overrides applied.
    pub fn from_env() -> Result<Self> {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from a key lookup (`TWSM_*` names).
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup(ENV_WIRE_FORMAT) {
            self.wire_format = v.trim().parse().map_err(Error::Config)?;
        }
        if let Some(v) = lookup(ENV_TRANSFER_TIMEOUT_MS) {
            let ms: u64 = v
                .trim()
                .parse()
                .map_err(|e| Error::Config(format!("{}: {}", ENV_TRANSFER_TIMEOUT_MS, e)))?;
            self.transfer_timeout = Duration::from_millis(ms);
        }
        if let Some(v) = lookup(ENV_CORRUPT_STREAM) {
            self.corrupt_stream = v.trim().parse().map_err(Error::Config)?;
        }
        if let Some(v) = lookup(ENV_MAX_RECORD_LEN) {
            self.max_record_len = v
                .trim()
                .parse()
                .map_err(|e| Error::Config(format!("{}: {}", ENV_MAX_RECORD_LEN, e)))?;
        }
        self.validate()?;
        Ok(self)
    }
}

#[cfg(feature = "yaml-config")]
mod yaml {
    use super::*;
    use serde::Deserialize;
    use std::fs;
    use std::path::Path;

    /// Root YAML document.
    #[derive(Debug, Deserialize, Default)]
    struct YamlDocument {
        #[serde(default)]
        handover: YamlHandover,
    }

    #[derive(Debug, Deserialize, Default)]
    #[serde(default, deny_unknown_fields)]
    struct YamlHandover {
        wire_format: Option<WireFormat>,
        transfer_timeout_ms: Option<u64>,
        corrupt_stream: Option<CorruptStreamPolicy>,
        max_record_len: Option<usize>,
    }

    impl HandoverConfig {
        /// Defaults overlaid with a YAML document.
        pub fn from_yaml_str(content: &str) -> Result<Self> {
            let doc: YamlDocument = serde_yaml::from_str(content)
                .map_err(|e| Error::Config(format!("Failed to parse YAML: {}", e)))?;
            let h = doc.handover;
            let mut config = Self::default();
            if let Some(format) = h.wire_format {
                config.wire_format = format;
            }
            if let Some(ms) = h.transfer_timeout_ms {
                config.transfer_timeout = Duration::from_millis(ms);
            }
            if let Some(policy) = h.corrupt_stream {
                config.corrupt_stream = policy;
            }
            if let Some(len) = h.max_record_len {
                config.max_record_len = len;
            }
            config.validate()?;
            Ok(config)
        }

        pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
            let content = fs::read_to_string(path)?;
            Self::from_yaml_str(&content)
        }
    }
}

// =======================================================================
// Runtime Configuration
// =======================================================================

/// Published configuration, swapped atomically.
///
/// Each attempt takes a snapshot when it starts, so a change made mid-way
/// applies from the next attempt on.
#[derive(Clone)]
pub struct RuntimeConfig {
    current: Arc<ArcSwap<HandoverConfig>>,
}

impl RuntimeConfig {
    pub fn new(config: HandoverConfig) -> Self {
        Self {
            current: Arc::new(ArcSwap::from_pointee(config)),
        }
    }

    /// Current configuration.
    pub fn get(&self) -> Arc<HandoverConfig> {
        self.current.load_full()
    }

    /// Replace the configuration after validating it.
    pub fn set(&self, config: HandoverConfig) -> Result<()> {
        config.validate()?;
        log::info!(
            "[config] wire_format={} timeout={:?} corrupt_stream={}",
            config.wire_format,
            config.transfer_timeout,
            config.corrupt_stream
        );
        self.current.store(Arc::new(config));
        Ok(())
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::new(HandoverConfig::default())
    }
}

impl fmt::Debug for RuntimeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RuntimeConfig").field(&*self.get()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = HandoverConfig::default();
        assert_eq!(config.wire_format, WireFormat::Implicit);
        assert_eq!(config.transfer_timeout, Duration::from_secs(8));
        assert_eq!(config.corrupt_stream, CorruptStreamPolicy::Panic);
        assert_eq!(config.max_record_len, 65535);
        assert!(config.validate().is_ok());
        assert_eq!(MAX_CLIENTS, 255);
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_WIRE_FORMAT, "Tagged"),
            (ENV_TRANSFER_TIMEOUT_MS, " 1500 "),
            (ENV_CORRUPT_STREAM, "abort"),
            (ENV_MAX_RECORD_LEN, "64"),
        ]
        .into_iter()
        .collect();
        let config = HandoverConfig::default()
            .with_overrides(|k| env.get(k).map(|v| v.to_string()))
            .expect("valid overrides");
        assert_eq!(config.wire_format, WireFormat::Tagged);
        assert_eq!(config.transfer_timeout, Duration::from_millis(1500));
        assert_eq!(config.corrupt_stream, CorruptStreamPolicy::Abort);
        assert_eq!(config.max_record_len, 64);
    }

    #[test]
    fn test_bad_overrides() {
        let bad = |key: &'static str, value: &'static str| {
            HandoverConfig::default().with_overrides(move |k| (k == key).then(|| value.to_string()))
        };
        assert!(matches!(bad(ENV_WIRE_FORMAT, "json"), Err(Error::Config(_))));
        assert!(matches!(bad(ENV_TRANSFER_TIMEOUT_MS, "soon"), Err(Error::Config(_))));
        assert!(matches!(bad(ENV_TRANSFER_TIMEOUT_MS, "0"), Err(Error::Config(_))));
        assert!(matches!(bad(ENV_MAX_RECORD_LEN, "70000"), Err(Error::Config(_))));
    }

    #[cfg(feature = "yaml-config")]
    #[test]
    fn test_yaml_document() {
        let config = HandoverConfig::from_yaml_str(
            "handover:\n  wire_format: tagged\n  transfer_timeout_ms: 250\n",
        )
        .expect("valid yaml");
        assert_eq!(config.wire_format, WireFormat::Tagged);
        assert_eq!(config.transfer_timeout, Duration::from_millis(250));
        assert_eq!(config.corrupt_stream, CorruptStreamPolicy::Panic);

        assert!(HandoverConfig::from_yaml_str("handover:\n  colour: blue\n").is_err());
        assert!(HandoverConfig::from_yaml_str("handover:\n  max_record_len: 0\n").is_err());
    }

    #[cfg(feature = "yaml-config")]
    #[test]
    fn test_yaml_file() {
        use std::io::Write;
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "handover:\n  corrupt_stream: abort\n  max_record_len: 32").unwrap();
        let config = HandoverConfig::from_yaml_file(file.path()).expect("load yaml");
        assert_eq!(config.corrupt_stream, CorruptStreamPolicy::Abort);
        assert_eq!(config.max_record_len, 32);

        assert!(matches!(
            HandoverConfig::from_yaml_file("/nonexistent/twsm.yaml"),
            Err(Error::IoError(_))
        ));
    }

    #[test]
    fn test_runtime_config_swap() {
        let runtime = RuntimeConfig::default();
        let before = runtime.get();
        runtime
            .set(HandoverConfig::default().with_wire_format(WireFormat::Tagged))
            .unwrap();
        assert_eq!(before.wire_format, WireFormat::Implicit);
        assert_eq!(runtime.get().wire_format, WireFormat::Tagged);
        assert!(runtime
            .set(HandoverConfig::default().with_max_record_len(0))
            .is_err());
        assert_eq!(runtime.get().wire_format, WireFormat::Tagged);
    }
}
