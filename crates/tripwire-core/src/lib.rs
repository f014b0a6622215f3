//! # tripwire-core
//!
//! Core business logic for the tripwire noise sentry node.
//!
//! This crate provides:
//! - Trigger accumulation with decaying validation (the alarm decision)
//! - Hardware trigger lifecycle with bounded rebind retries
//! - The colon-delimited control protocol and its dispatcher
//! - Periodic heartbeat emission
//! - Configuration management (broker, sensor pin, initial tuning)
//!
//! ## Architecture
//!
//! The crate is organized into the following modules:
//!
//! - [`validator`] - Decaying-counter validation of raw triggers
//! - [`lifecycle`] - Binding the hardware trigger to the validator
//! - [`command`] - Control message grammar and dispatch
//! - [`heartbeat`] - Periodic liveness signal
//! - [`transport`] - Outbound message seam ([`EventSink`])
//! - [`hardware`] - Hardware trigger seam ([`TriggerSource`])
//! - [`tunables`] - Runtime-tunable parameter set
//! - [`config`] - Configuration loading, saving, and validation
//! - [`error`] - Unified error types for the crate

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![warn(missing_docs)]

pub mod command;
pub mod config;
pub mod error;
#[cfg(feature = "gpio")]
pub mod gpio;
pub mod hardware;
pub mod heartbeat;
pub mod lifecycle;
pub mod transport;
pub mod tunables;
pub mod validator;

// Re-export primary types for convenience
pub use command::{Command, CommandDispatcher, CommandError};
pub use config::{BrokerConfig, ConfigError, NodeConfig, SensorConfig};
pub use error::{Result, TripwireError};
#[cfg(feature = "gpio")]
pub use gpio::GpioTrigger;
#[cfg(any(feature = "mock-hardware", not(feature = "gpio")))]
pub use hardware::SimulatedTrigger;
pub use hardware::{Edge, HardwareError, TriggerCallback, TriggerSource};
pub use heartbeat::{HeartbeatEmitter, HEARTBEAT_INTERVAL};
pub use lifecycle::InterruptLifecycle;
pub use transport::{EventSink, Outbound, RecordingSink, TransportError, NODE_PREFIX};
pub use tunables::{SharedTunables, Tunables};
pub use validator::{DebounceValidator, ValidatorSnapshot};
