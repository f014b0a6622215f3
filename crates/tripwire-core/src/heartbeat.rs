//! Periodic liveness signal.
//!
//! Publishes `pi:*` at a fixed cadence for as long as the process-wide alive
//! flag holds. The emitter shares nothing mutable with the rest of the node
//! beyond that flag; a failed publish is logged and the next interval simply
//! tries again.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::transport::{EventSink, Outbound};

/// Cadence of the `pi:*` liveness message.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Publishes a heartbeat every [`HEARTBEAT_INTERVAL`] while `alive` holds.
pub struct HeartbeatEmitter {
    sink: Arc<dyn EventSink>,
    alive: Arc<AtomicBool>,
}

impl HeartbeatEmitter {
    /// Create an emitter gated on `alive`.
    #[must_use]
    pub fn new(sink: Arc<dyn EventSink>, alive: Arc<AtomicBool>) -> Self {
        Self { sink, alive }
    }

    /// Spawn the heartbeat task. After `alive` clears, the loop ends within
    /// one interval.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run(HEARTBEAT_INTERVAL))
    }

    async fn run(self, interval: Duration) {
        loop {
            tokio::time::sleep(interval).await;
            if !self.alive.load(Ordering::Acquire) {
                break;
            }
            if let Err(error) = self.sink.publish(&Outbound::Heartbeat) {
                warn!(%error, "heartbeat publish failed");
            }
        }
        debug!("heartbeat loop stopped");
    }
}
