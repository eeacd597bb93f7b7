// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Handover error type.

use crate::handover::HandoverState;
use crate::marshal::MarshalError;
use crate::transport::TransportError;

/// Errors reported by the controller and the profile adapters.
#[derive(Debug)]
pub enum Error {
    // ========================================================================
    // Stream Errors
    // ========================================================================
    /// Marshal engine failure (descriptor, shape or corrupt stream).
    Marshal(MarshalError),
    /// Framing violated between devices (unknown client, bytes after END...).
    CorruptStream(String),
    /// Destination buffer cannot hold a record header and one byte.
    BufferTooSmall { needed: usize, available: usize },

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Operation not allowed in the current controller state.
    InvalidState {
        operation: &'static str,
        state: HandoverState,
    },
    /// Commit requested before every adapter finished unmarshalling.
    CommitNotReady,
    /// An adapter could not re-home its resources.
    CommitFailed { client: &'static str, reason: String },
    /// More adapters than client ids.
    TooManyClients,
    /// Transfer deadline expired.
    Timeout,
    /// Byte channel to the peer failed.
    TransportFailed(String),

    // ========================================================================
    // Adapter Errors
    // ========================================================================
    /// Transport boundary refused an operation.
    Transport(TransportError),
    /// Profile-specific failure.
    Profile {
        profile: &'static str,
        reason: String,
    },

    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Invalid configuration value or document.
    Config(String),
    /// I/O error while reading configuration.
    IoError(std::io::Error),
}

impl Error {
    /// True when the received stream cannot be trusted any more.
    pub fn is_corruption(&self) -> bool {
        match self {
            Error::Marshal(e) => e.is_corruption(),
            Error::CorruptStream(_) => true,
            _ => false,
        }
    }

    pub(crate) fn profile(profile: &'static str, reason: impl Into<String>) -> Self {
        Error::Profile {
            profile,
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Marshal(e) => write!(f, "Marshal error: {}", e),
            Error::CorruptStream(msg) => write!(f, "Corrupt handover stream: {}", msg),
            Error::BufferTooSmall { needed, available } => write!(
                f,
                "Buffer too small: {} bytes needed, {} available",
                needed, available
            ),
            Error::InvalidState { operation, state } => {
                write!(f, "Invalid state: {} not allowed while {}", operation, state)
            }
            Error::CommitNotReady => write!(f, "Commit before unmarshal completed"),
            Error::CommitFailed { client, reason } => {
                write!(f, "Commit failed in {}: {}", client, reason)
            }
            Error::TooManyClients => write!(f, "Too many handover clients"),
            Error::Timeout => write!(f, "Handover timed out"),
            Error::TransportFailed(msg) => write!(f, "Transport failed: {}", msg),
            Error::Transport(e) => write!(f, "Transport error: {}", e),
            Error::Profile { profile, reason } => write!(f, "{}: {}", profile, reason),
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
            Error::IoError(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Marshal(e) => Some(e),
            Error::Transport(e) => Some(e),
            Error::IoError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<MarshalError> for Error {
    fn from(e: MarshalError) -> Self {
        Error::Marshal(e)
    }
}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Error::Transport(e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::IoError(e)
    }
}

/// Result type for handover operations.
pub type Result<T> = core::result::Result<T, Error>;
