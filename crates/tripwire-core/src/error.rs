//! Unified error types for the tripwire core library.
//!
//! This module provides a unified error type [`TripwireError`] that covers
//! all failure modes across the node. Each module also has its own specific
//! error type (`HardwareError`, `TransportError`, `CommandError`,
//! `ConfigError`) for internal use.
//!
//! # Design Principles
//!
//! - **Specific variants**: Each error variant captures exactly one failure
//!   mode
//! - **Bounded fatality**: Exactly one condition (exhausted hardware bind
//!   retries) is allowed to take the node down; everything else is absorbed
//!   at the boundary where it occurs
//! - **Context preservation**: Wrapped errors keep their original context

use thiserror::Error;

use crate::command::CommandError;
use crate::config::ConfigError;
use crate::hardware::HardwareError;
use crate::transport::TransportError;

/// The unified error type for all tripwire operations.
#[derive(Debug, Error)]
pub enum TripwireError {
    // =========================================================================
    // HARDWARE ERRORS
    // =========================================================================
    /// A single hardware trigger operation failed; retried or absorbed by
    /// the lifecycle manager.
    #[error("hardware trigger error: {0}")]
    Hardware(#[from] HardwareError),

    /// Every bind attempt failed. The node cannot sense; the caller decides
    /// to terminate.
    #[error("failed to bind hardware trigger after {attempts} attempts: {source}")]
    BindExhausted {
        /// Total bind attempts made, retries included.
        attempts: u32,
        /// The error from the final attempt.
        #[source]
        source: HardwareError,
    },

    // =========================================================================
    // TRANSPORT ERRORS
    // =========================================================================
    /// The outbound channel rejected a message.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    // =========================================================================
    // CONTROL PROTOCOL ERRORS
    // =========================================================================
    /// An inbound control payload was rejected.
    #[error("control message rejected: {0}")]
    Command(#[from] CommandError),

    // =========================================================================
    // CONFIGURATION ERRORS
    // =========================================================================
    /// Configuration could not be loaded, saved, or validated.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// A specialized [`Result`] type for tripwire operations.
pub type Result<T> = std::result::Result<T, TripwireError>;

impl TripwireError {
    /// Returns `true` if the node cannot continue sensing and must
    /// terminate.
    #[inline]
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::BindExhausted { .. })
    }

    /// Returns `true` if this error involves the hardware trigger.
    #[inline]
    #[must_use]
    pub const fn is_hardware_error(&self) -> bool {
        matches!(self, Self::Hardware(_) | Self::BindExhausted { .. })
    }

    /// Returns `true` if this error is related to configuration.
    #[inline]
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Returns `true` if the node can keep running after this error.
    #[inline]
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        !self.is_fatal()
    }
}

// =============================================================================
// TESTS
// =============================================================================
