//! Trigger accumulation and decay.
//!
//! Raw edges from the detector arrive in irregular bursts. The validator
//! accumulates them into a `stage` counter and forgets a partial
//! accumulation after `max_count` quiet ticks, so a slow trickle of
//! unrelated noise never crosses the alarm threshold while a genuine burst
//! does.
//!
//! ```text
//!  Idle ──start()──► Running ──stop()──► Idle
//! ```
//!
//! The tick loop and [`increment`](DebounceValidator::increment) run from
//! different execution contexts (the tick task and the hardware callback
//! thread); both serialize on the counter mutex, so a trigger landing in the
//! same instant as a decay never loses either mutation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::transport::{EventSink, Outbound};
use crate::tunables::SharedTunables;

/// Tick delay added on top of the bounce interval at first start.
const DEFAULT_EXTRA_DELAY: Duration = Duration::from_millis(500);
/// Quiet ticks tolerated before a partial accumulation is forgotten.
const DEFAULT_DECAY_TICKS: u32 = 5;
/// Floor for the extra tick delay once lowered.
const MIN_EXTRA_DELAY: Duration = Duration::from_millis(150);
/// How much one sensitivity step moves the extra delay.
const SENSITIVITY_STEP: Duration = Duration::from_millis(100);

/// Counters owned by the validator. `count` stays in `[0, max_count]`;
/// `stage` only grows via `increment` and only resets on an alarm or a
/// bottomed-out `count`.
struct CounterState {
    stage: u32,
    count: u32,
    max_count: u32,
    extra_delay: Duration,
}

/// Live view of the validator's counters, for diagnostics and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidatorSnapshot {
    /// Triggers accumulated since the last reset.
    pub stage: u32,
    /// Ticks remaining before the accumulation is forgotten.
    pub count: u32,
    /// Size of the inactivity window, in ticks.
    pub max_count: u32,
}

/// A running tick loop: the halt flag it polls and its task handle.
struct TickLoop {
    halt: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// Converts a stream of discrete trigger events into alarm decisions,
/// decaying accumulated state when events stop arriving.
pub struct DebounceValidator {
    counters: Arc<Mutex<CounterState>>,
    tunables: SharedTunables,
    sink: Arc<dyn EventSink>,
    tick_loop: Mutex<Option<TickLoop>>,
}

impl DebounceValidator {
    /// Create an idle validator with the default decay window.
    #[must_use]
    pub fn new(tunables: SharedTunables, sink: Arc<dyn EventSink>) -> Self {
        Self {
            counters: Arc::new(Mutex::new(CounterState {
                stage: 0,
                count: DEFAULT_DECAY_TICKS,
                max_count: DEFAULT_DECAY_TICKS,
                extra_delay: DEFAULT_EXTRA_DELAY,
            })),
            tunables,
            sink,
            tick_loop: Mutex::new(None),
        }
    }

    /// Current effective tick period: bounce interval plus the extra delay.
    #[must_use]
    pub fn period(&self) -> Duration {
        let bounce = Duration::from_millis(self.tunables.lock().bounce_interval_ms);
        bounce + self.lock_counters().extra_delay
    }

    /// Current effective tick period in seconds, as echoed to the controller.
    #[must_use]
    pub fn sensitivity(&self) -> f64 {
        self.period().as_secs_f64()
    }

    /// Current trigger threshold.
    #[must_use]
    pub fn frequency(&self) -> u8 {
        self.tunables.lock().trigger_threshold
    }

    /// Copy of the current counters.
    #[must_use]
    pub fn snapshot(&self) -> ValidatorSnapshot {
        let counters = self.lock_counters();
        ValidatorSnapshot {
            stage: counters.stage,
            count: counters.count,
            max_count: counters.max_count,
        }
    }

    /// Start the periodic tick loop.
    ///
    /// The period is computed fresh on every call, so a sensitivity or
    /// bounce-interval change applies here and not mid-flight. Starting a
    /// running validator restarts it. Callers serialize `start`/`stop`
    /// through the lifecycle manager.
    pub async fn start(&self) {
        self.stop().await;

        let period = self.period();
        let halt = Arc::new(AtomicBool::new(false));
        let counters = Arc::clone(&self.counters);
        let observed = Arc::clone(&halt);

        debug!(period_ms = u64::try_from(period.as_millis()).unwrap_or(u64::MAX), "tick loop started");
        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(period).await;
                if observed.load(Ordering::Acquire) {
                    break;
                }
                let mut state = counters.lock().unwrap_or_else(PoisonError::into_inner);
                if state.count > 0 {
                    state.count -= 1;
                }
                if state.count == 0 {
                    state.count = state.max_count;
                    if state.stage > 0 {
                        debug!(stage = state.stage, "quiet window elapsed, accumulation forgotten");
                    }
                    state.stage = 0;
                }
            }
        });

        *self.lock_tick_loop() = Some(TickLoop { halt, handle });
    }

    /// Stop the tick loop cooperatively and reset the counters.
    ///
    /// Waits until the loop has observed the halt flag (bounded by one tick
    /// period), so callers may unbind hardware immediately afterwards knowing
    /// nothing is still touching the counters. Counters reset even when no
    /// loop was running.
    pub async fn stop(&self) {
        let running = self.lock_tick_loop().take();
        if let Some(TickLoop { halt, handle }) = running {
            halt.store(true, Ordering::Release);
            if let Err(error) = handle.await {
                warn!(%error, "tick loop ended abnormally");
            }
        }

        let mut state = self.lock_counters();
        state.count = state.max_count;
        state.stage = 0;
    }

    /// Record one accepted trigger.
    ///
    /// Refreshes the inactivity window and, when the accumulation exceeds
    /// the threshold, publishes the alarm exactly once and resets the stage.
    /// Safe to call from the hardware callback thread concurrently with the
    /// tick loop.
    pub fn increment(&self) {
        let threshold = u32::from(self.tunables.lock().trigger_threshold);

        let fired = {
            let mut state = self.lock_counters();
            state.stage += 1;
            debug!(stage = state.stage, threshold, "trigger accepted");
            let fired = state.stage > threshold;
            if fired {
                state.stage = 0;
            }
            state.count = state.max_count;
            fired
        };

        if fired {
            if let Err(error) = self.sink.publish(&Outbound::Alarm) {
                warn!(%error, "failed to publish alarm");
            }
        }
    }

    /// Retune the decay behavior.
    ///
    /// A positive direction slows the tick and widens the window (more
    /// accumulation tolerated); anything else tightens both, floored at
    /// 150 ms extra delay and a one-tick window. The window change applies
    /// immediately; the new cadence applies at the next [`start`](Self::start).
    pub fn change_sensitivity(&self, direction: i32) {
        let mut state = self.lock_counters();
        if direction > 0 {
            state.extra_delay += SENSITIVITY_STEP;
            state.max_count += 1;
        } else {
            state.extra_delay = state
                .extra_delay
                .saturating_sub(SENSITIVITY_STEP)
                .max(MIN_EXTRA_DELAY);
            state.max_count = state.max_count.saturating_sub(1).max(1);
        }
        debug!(
            extra_delay_ms = u64::try_from(state.extra_delay.as_millis()).unwrap_or(u64::MAX),
            max_count = state.max_count,
            "sensitivity changed"
        );
    }

    fn lock_counters(&self) -> MutexGuard<'_, CounterState> {
        self.counters.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_tick_loop(&self) -> MutexGuard<'_, Option<TickLoop>> {
        self.tick_loop.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
