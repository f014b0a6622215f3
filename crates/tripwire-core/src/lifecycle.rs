//! Hardware trigger lifecycle.
//!
//! Binds the trigger source to the validator's `increment`, retries failed
//! binds a bounded number of times, and performs the full unbind/rebind
//! dance that a bounce-interval change requires (the hardware debounce
//! parameter cannot change while the line is bound).
//!
//! Ordering matters on the way down: the callback is unbound first, so no
//! new triggers arrive, and the validator's deterministic `stop` has
//! returned before the driver is reset or rebound; nothing is touching
//! validator state while the line changes.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::error::TripwireError;
use crate::hardware::{Edge, TriggerSource};
use crate::transport::{EventSink, Outbound};
use crate::tunables::SharedTunables;
use crate::validator::DebounceValidator;

/// Additional bind attempts after the first failure.
const BIND_RETRIES: u32 = 5;
/// Pause between bind attempts.
const BIND_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Owns the bound/unbound state of the hardware trigger.
///
/// Lifecycle operations are not reentrant; the command dispatcher is the
/// single caller and serializes them.
pub struct InterruptLifecycle<S: TriggerSource> {
    source: S,
    validator: Arc<DebounceValidator>,
    tunables: SharedTunables,
    sink: Arc<dyn EventSink>,
    pin: u8,
    bound: bool,
}

impl<S: TriggerSource> InterruptLifecycle<S> {
    /// Create an unbound lifecycle manager for `pin`.
    pub fn new(
        source: S,
        validator: Arc<DebounceValidator>,
        tunables: SharedTunables,
        sink: Arc<dyn EventSink>,
        pin: u8,
    ) -> Self {
        Self {
            source,
            validator,
            tunables,
            sink,
            pin,
            bound: false,
        }
    }

    /// Whether the hardware callback is currently attached.
    #[must_use]
    pub const fn is_bound(&self) -> bool {
        self.bound
    }

    /// Bind the trigger and start the validator.
    ///
    /// Bind failures are retried up to five more times with a one-second
    /// pause between attempts. The dispatcher guards against calling this
    /// while already bound; it is not re-checked here.
    ///
    /// # Errors
    ///
    /// Returns [`TripwireError::BindExhausted`] when every attempt failed;
    /// the node cannot sense and the caller decides to terminate.
    pub async fn enable(&mut self) -> Result<(), TripwireError> {
        let debounce = Duration::from_millis(self.tunables.lock().bounce_interval_ms);

        let mut attempts = 0u32;
        loop {
            attempts += 1;
            let validator = Arc::clone(&self.validator);
            let on_trigger = Box::new(move || validator.increment());

            match self.source.bind(self.pin, Edge::Falling, debounce, on_trigger) {
                Ok(()) => break,
                Err(source) if attempts <= BIND_RETRIES => {
                    warn!(attempt = attempts, error = %source, "failed to bind hardware trigger, retrying");
                    tokio::time::sleep(BIND_RETRY_DELAY).await;
                }
                Err(source) => {
                    error!(attempts, error = %source, "giving up on hardware trigger");
                    return Err(TripwireError::BindExhausted { attempts, source });
                }
            }
        }

        self.validator.start().await;
        self.tunables.lock().sensing_enabled = true;
        self.bound = true;
        info!(
            pin = self.pin,
            bounce_ms = debounce.as_millis() as u64,
            "sensing enabled"
        );
        Ok(())
    }

    /// Unbind the trigger and halt the validator. Idempotent: disabling an
    /// unbound lifecycle only resets the validator.
    pub async fn disable(&mut self) {
        if self.bound {
            if let Err(error) = self.source.unbind() {
                warn!(%error, "failed to unbind hardware trigger");
            }
        }
        self.validator.stop().await;
        self.bound = false;
        self.tunables.lock().sensing_enabled = false;
        info!("sensing disabled");
    }

    /// Rebind under the current bounce interval: disable, reset the driver,
    /// enable, then echo the effective interval to the controller.
    ///
    /// # Errors
    ///
    /// Returns [`TripwireError::BindExhausted`] if the rebind exhausts its
    /// retries, exactly as [`enable`](Self::enable) does.
    pub async fn reconfigure(&mut self) -> Result<(), TripwireError> {
        self.disable().await;
        if let Err(error) = self.source.cleanup() {
            warn!(%error, "hardware cleanup failed");
        }
        self.enable().await?;

        let bounce_ms = self.tunables.lock().bounce_interval_ms;
        if let Err(error) = self.sink.publish(&Outbound::BounceInterval(bounce_ms)) {
            warn!(%error, "failed to publish bounce interval echo");
        }
        info!(bounce_ms, "trigger rebound with new bounce interval");
        Ok(())
    }

    /// Shutdown path: unbind, halt, release the driver. Each step is
    /// best-effort so a failure in one never leaks the rest.
    pub async fn teardown(&mut self) {
        self.disable().await;
        if let Err(error) = self.source.cleanup() {
            warn!(%error, "hardware cleanup failed during teardown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::SimulatedTrigger;
    use crate::transport::RecordingSink;
    use crate::tunables::Tunables;

    struct Rig {
        trigger: SimulatedTrigger,
        sink: Arc<RecordingSink>,
        tunables: SharedTunables,
        lifecycle: InterruptLifecycle<SimulatedTrigger>,
    }

    fn rig(threshold: u8, bounce_ms: u64) -> Rig {
        let trigger = SimulatedTrigger::new();
        let sink = Arc::new(RecordingSink::new());
        let sink_dyn: Arc<dyn EventSink> = Arc::clone(&sink) as Arc<dyn EventSink>;
        let tunables = SharedTunables::new(Tunables::new(threshold, bounce_ms));
        let validator = Arc::new(DebounceValidator::new(tunables.clone(), Arc::clone(&sink_dyn)));
        let lifecycle =
            InterruptLifecycle::new(trigger.clone(), validator, tunables.clone(), sink_dyn, 16);
        Rig {
            trigger,
            sink,
            tunables,
            lifecycle,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_enable_binds_and_marks_sensing() {
        let mut rig = rig(3, 300);
        rig.lifecycle.enable().await.unwrap();

        assert!(rig.lifecycle.is_bound());
        assert!(rig.trigger.is_bound());
        assert!(rig.tunables.snapshot().sensing_enabled);
        assert_eq!(rig.trigger.bind_attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_enable_retries_transient_failures() {
        let mut rig = rig(3, 300);
        rig.trigger.fail_next_binds(2);

        rig.lifecycle.enable().await.unwrap();
        assert!(rig.lifecycle.is_bound());
        assert_eq!(rig.trigger.bind_attempts(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_enable_exhaustion_is_fatal_after_six_attempts() {
        let mut rig = rig(3, 300);
        rig.trigger.fail_next_binds(6);

        let started = tokio::time::Instant::now();
        let error = rig.lifecycle.enable().await.unwrap_err();

        assert!(error.is_fatal());
        assert!(matches!(error, TripwireError::BindExhausted { attempts: 6, .. }));
        assert_eq!(rig.trigger.bind_attempts(), 6);
        // Five 1s pauses between the six attempts.
        assert_eq!(started.elapsed(), Duration::from_secs(5));
        assert!(!rig.lifecycle.is_bound());
        assert!(!rig.tunables.snapshot().sensing_enabled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disable_unbinds_and_clears_sensing() {
        let mut rig = rig(3, 300);
        rig.lifecycle.enable().await.unwrap();

        rig.lifecycle.disable().await;
        assert!(!rig.lifecycle.is_bound());
        assert!(!rig.trigger.is_bound());
        assert!(!rig.tunables.snapshot().sensing_enabled);
        assert_eq!(rig.trigger.unbind_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disable_when_unbound_skips_hardware() {
        let mut rig = rig(3, 300);
        rig.lifecycle.disable().await;
        assert_eq!(rig.trigger.unbind_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bound_trigger_feeds_validator() {
        let mut rig = rig(1, 300);
        rig.lifecycle.enable().await.unwrap();

        rig.trigger.fire();
        rig.trigger.fire();
        assert_eq!(rig.sink.count_of("pi:u:a"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconfigure_rebinds_and_echoes() {
        let mut rig = rig(3, 300);
        rig.lifecycle.enable().await.unwrap();

        rig.tunables.lock().bounce_interval_ms = 350;
        rig.lifecycle.reconfigure().await.unwrap();

        assert!(rig.lifecycle.is_bound());
        assert_eq!(rig.trigger.bind_attempts(), 2);
        assert_eq!(rig.trigger.cleanup_count(), 1);
        assert_eq!(rig.sink.count_of("pi:b:350"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_releases_everything() {
        let mut rig = rig(3, 300);
        rig.lifecycle.enable().await.unwrap();

        rig.lifecycle.teardown().await;
        assert!(!rig.trigger.is_bound());
        assert_eq!(rig.trigger.cleanup_count(), 1);
    }
}
