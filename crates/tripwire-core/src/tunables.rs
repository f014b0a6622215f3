//! Runtime-tunable sensing parameters.
//!
//! One small parameter set is shared by the validator (reads the threshold),
//! the lifecycle manager (reads the bounce interval), and the command
//! dispatcher, the single writer. Access goes through [`SharedTunables`],
//! a mutex the interrupt thread can also take, so the guard is never held
//! across an `.await`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Lowest accepted trigger threshold.
pub const MIN_TRIGGER_THRESHOLD: u8 = 1;
/// Highest accepted trigger threshold.
pub const MAX_TRIGGER_THRESHOLD: u8 = 10;
/// Lowest accepted hardware bounce interval.
pub const MIN_BOUNCE_INTERVAL_MS: u64 = 100;

/// The process-wide tunable parameter set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tunables {
    /// Stage increments within the active window required to raise an alarm.
    pub trigger_threshold: u8,
    /// Minimum hardware-level spacing between accepted raw triggers.
    pub bounce_interval_ms: u64,
    /// Whether the hardware trigger is currently bound.
    pub sensing_enabled: bool,
}

impl Tunables {
    /// Initial parameters; sensing starts disabled until the lifecycle
    /// manager binds the trigger.
    #[must_use]
    pub const fn new(trigger_threshold: u8, bounce_interval_ms: u64) -> Self {
        Self {
            trigger_threshold,
            bounce_interval_ms,
            sensing_enabled: false,
        }
    }

    /// Step the trigger threshold per the `f` command: a positive direction
    /// increments below the ceiling, anything else decrements above the
    /// floor; out-of-range steps leave the value unchanged.
    ///
    /// Returns the effective threshold.
    pub fn adjust_threshold(&mut self, direction: i32) -> u8 {
        if direction > 0 {
            if self.trigger_threshold < MAX_TRIGGER_THRESHOLD {
                self.trigger_threshold += 1;
            }
        } else if self.trigger_threshold > MIN_TRIGGER_THRESHOLD {
            self.trigger_threshold -= 1;
        }
        self.trigger_threshold
    }

    /// Step the bounce interval by `steps * 10` ms per the `b` command,
    /// clamped to [`MIN_BOUNCE_INTERVAL_MS`].
    ///
    /// At or below the floor a non-positive step is a no-op and returns
    /// `None`; above the floor a zero step counts as a decrement. The
    /// asymmetry is part of the wire protocol as deployed controllers
    /// expect it.
    pub fn adjust_bounce_interval(&mut self, steps: i32) -> Option<u64> {
        if self.bounce_interval_ms <= MIN_BOUNCE_INTERVAL_MS && steps <= 0 {
            return None;
        }
        let steps = if steps == 0 { -1 } else { steps };
        let next = (self.bounce_interval_ms as i64 + i64::from(steps) * 10)
            .max(MIN_BOUNCE_INTERVAL_MS as i64) as u64;
        self.bounce_interval_ms = next;
        Some(next)
    }
}

/// Shared handle to the tunable set.
///
/// The command dispatcher is the only writer; everyone else reads.
#[derive(Clone, Debug)]
pub struct SharedTunables {
    inner: Arc<Mutex<Tunables>>,
}

impl SharedTunables {
    /// Wrap an initial parameter set.
    #[must_use]
    pub fn new(tunables: Tunables) -> Self {
        Self {
            inner: Arc::new(Mutex::new(tunables)),
        }
    }

    /// Take the parameter lock. A poisoned lock still holds a valid
    /// parameter set, so the guard is recovered rather than propagated.
    #[must_use]
    pub fn lock(&self) -> MutexGuard<'_, Tunables> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the current parameters.
    #[must_use]
    pub fn snapshot(&self) -> Tunables {
        self.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_steps_within_bounds() {
        let mut tunables = Tunables::new(3, 300);
        assert_eq!(tunables.adjust_threshold(1), 4);
        assert_eq!(tunables.adjust_threshold(-1), 3);
        assert_eq!(tunables.adjust_threshold(0), 2);
    }

    #[test]
    fn test_threshold_clamps_at_ceiling() {
        let mut tunables = Tunables::new(10, 300);
        assert_eq!(tunables.adjust_threshold(1), 10);
    }

    #[test]
    fn test_threshold_clamps_at_floor() {
        let mut tunables = Tunables::new(1, 300);
        assert_eq!(tunables.adjust_threshold(-1), 1);
    }

    #[test]
    fn test_bounce_step_scales_by_ten() {
        let mut tunables = Tunables::new(3, 100);
        assert_eq!(tunables.adjust_bounce_interval(5), Some(150));
        assert_eq!(tunables.bounce_interval_ms, 150);
    }

    #[test]
    fn test_bounce_zero_decrements_above_floor() {
        let mut tunables = Tunables::new(3, 300);
        assert_eq!(tunables.adjust_bounce_interval(0), Some(290));
    }

    #[test]
    fn test_bounce_noop_at_floor() {
        let mut tunables = Tunables::new(3, 100);
        assert_eq!(tunables.adjust_bounce_interval(0), None);
        assert_eq!(tunables.adjust_bounce_interval(-3), None);
        assert_eq!(tunables.bounce_interval_ms, 100);
    }

    #[test]
    fn test_bounce_clamps_large_decrement() {
        let mut tunables = Tunables::new(3, 130);
        assert_eq!(tunables.adjust_bounce_interval(-50), Some(100));
    }

    #[test]
    fn test_shared_handle_sees_writes() {
        let shared = SharedTunables::new(Tunables::new(3, 300));
        shared.lock().trigger_threshold = 7;
        assert_eq!(shared.snapshot().trigger_threshold, 7);
    }
}
