//! Hardware trigger seam.
//!
//! The node talks to the noise detector only through the narrow
//! [`TriggerSource`] contract: bind a callback to an edge on a pin, unbind
//! it, release the driver. The Raspberry Pi adapter lives in [`crate::gpio`]
//! behind the `gpio` feature; tests and off-Pi builds use
//! [`SimulatedTrigger`].
//!
//! Implementations own the debounce contract: two edges closer together than
//! the configured bounce interval must reach the callback at most once.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

#[cfg(any(test, feature = "mock-hardware", not(feature = "gpio")))]
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Callback invoked from the trigger source's own execution context whenever
/// an accepted edge fires.
pub type TriggerCallback = Box<dyn FnMut() + Send + 'static>;

/// Which signal edge wakes the callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    /// Low-to-high transition.
    Rising,
    /// High-to-low transition.
    Falling,
    /// Either transition.
    Both,
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rising => write!(f, "rising"),
            Self::Falling => write!(f, "falling"),
            Self::Both => write!(f, "both"),
        }
    }
}

/// Errors from trigger source operations.
#[derive(Debug, Error)]
pub enum HardwareError {
    /// A callback is already attached to the trigger line.
    #[error("trigger line is already bound")]
    AlreadyBound,

    /// No callback is attached to the trigger line.
    #[error("trigger line is not bound")]
    NotBound,

    /// The underlying GPIO driver rejected the operation.
    #[error("GPIO driver error: {0}")]
    Driver(String),
}

/// The contract between the node and its physical trigger source.
///
/// A single bind attempt may fail transiently (driver busy, pin contended);
/// retry policy belongs to the caller, not the source.
pub trait TriggerSource: Send {
    /// Attach `on_trigger` to `pin`, firing on `edge`, with raw edges closer
    /// together than `debounce` suppressed before they reach the callback.
    ///
    /// # Errors
    ///
    /// Returns an error if a callback is already attached or the driver
    /// rejects the registration.
    fn bind(
        &mut self,
        pin: u8,
        edge: Edge,
        debounce: Duration,
        on_trigger: TriggerCallback,
    ) -> Result<(), HardwareError>;

    /// Detach the callback. Detaching an absent callback is harmless, the
    /// way the kernel driver treats removing an absent handler.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver fails to release the line.
    fn unbind(&mut self) -> Result<(), HardwareError>;

    /// Release the underlying driver so a subsequent bind starts clean.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver cannot be released.
    fn cleanup(&mut self) -> Result<(), HardwareError>;
}

/// In-process trigger source for tests and off-Pi development.
///
/// Clones share state, so a test can keep a handle for [`fire`](Self::fire)
/// while the lifecycle manager owns the bound instance.
#[cfg(any(test, feature = "mock-hardware", not(feature = "gpio")))]
#[derive(Clone, Default)]
pub struct SimulatedTrigger {
    inner: Arc<Mutex<SimState>>,
}

#[cfg(any(test, feature = "mock-hardware", not(feature = "gpio")))]
#[derive(Default)]
struct SimState {
    callback: Option<TriggerCallback>,
    bound_pin: Option<u8>,
    bind_attempts: u32,
    failures_remaining: u32,
    unbinds: u32,
    cleanups: u32,
}

#[cfg(any(test, feature = "mock-hardware", not(feature = "gpio")))]
impl SimulatedTrigger {
    /// Create an unbound simulated trigger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` bind attempts fail with a driver error.
    pub fn fail_next_binds(&self, n: u32) {
        self.state().failures_remaining = n;
    }

    /// Deliver one raw edge. Returns whether a callback was attached to
    /// receive it.
    pub fn fire(&self) -> bool {
        let mut state = self.state();
        match state.callback.as_mut() {
            Some(callback) => {
                callback();
                true
            }
            None => false,
        }
    }

    /// Whether a callback is currently attached.
    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.state().bound_pin.is_some()
    }

    /// Total bind attempts observed, including failed ones.
    #[must_use]
    pub fn bind_attempts(&self) -> u32 {
        self.state().bind_attempts
    }

    /// Total unbind calls observed.
    #[must_use]
    pub fn unbind_count(&self) -> u32 {
        self.state().unbinds
    }

    /// Total cleanup calls observed.
    #[must_use]
    pub fn cleanup_count(&self) -> u32 {
        self.state().cleanups
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(any(test, feature = "mock-hardware", not(feature = "gpio")))]
impl TriggerSource for SimulatedTrigger {
    fn bind(
        &mut self,
        pin: u8,
        _edge: Edge,
        _debounce: Duration,
        on_trigger: TriggerCallback,
    ) -> Result<(), HardwareError> {
        let mut state = self.state();
        state.bind_attempts += 1;
        if state.failures_remaining > 0 {
            state.failures_remaining -= 1;
            return Err(HardwareError::Driver("simulated bind failure".into()));
        }
        if state.bound_pin.is_some() {
            return Err(HardwareError::AlreadyBound);
        }
        state.bound_pin = Some(pin);
        state.callback = Some(on_trigger);
        Ok(())
    }

    fn unbind(&mut self) -> Result<(), HardwareError> {
        let mut state = self.state();
        state.unbinds += 1;
        state.bound_pin = None;
        state.callback = None;
        Ok(())
    }

    fn cleanup(&mut self) -> Result<(), HardwareError> {
        let mut state = self.state();
        state.cleanups += 1;
        state.bound_pin = None;
        state.callback = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_fire_reaches_bound_callback() {
        let trigger = SimulatedTrigger::new();
        let hits = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&hits);

        let mut bound = trigger.clone();
        bound
            .bind(
                16,
                Edge::Falling,
                Duration::from_millis(300),
                Box::new(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();

        assert!(trigger.fire());
        assert!(trigger.fire());
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_fire_without_binding_is_dropped() {
        let trigger = SimulatedTrigger::new();
        assert!(!trigger.fire());
    }

    #[test]
    fn test_unbind_detaches_callback() {
        let trigger = SimulatedTrigger::new();
        let mut bound = trigger.clone();
        bound
            .bind(16, Edge::Falling, Duration::from_millis(300), Box::new(|| {}))
            .unwrap();
        assert!(trigger.is_bound());

        bound.unbind().unwrap();
        assert!(!trigger.is_bound());
        assert!(!trigger.fire());
    }

    #[test]
    fn test_double_bind_is_rejected() {
        let mut trigger = SimulatedTrigger::new();
        trigger
            .bind(16, Edge::Falling, Duration::from_millis(300), Box::new(|| {}))
            .unwrap();
        let second = trigger.bind(16, Edge::Falling, Duration::from_millis(300), Box::new(|| {}));
        assert!(matches!(second, Err(HardwareError::AlreadyBound)));
    }

    #[test]
    fn test_injected_failures_count_down() {
        let mut trigger = SimulatedTrigger::new();
        trigger.fail_next_binds(2);

        for _ in 0..2 {
            let result = trigger.bind(16, Edge::Falling, Duration::from_millis(300), Box::new(|| {}));
            assert!(matches!(result, Err(HardwareError::Driver(_))));
        }

        trigger
            .bind(16, Edge::Falling, Duration::from_millis(300), Box::new(|| {}))
            .unwrap();
        assert_eq!(trigger.bind_attempts(), 3);
    }

    #[test]
    fn test_unbind_when_not_bound_is_harmless() {
        let mut trigger = SimulatedTrigger::new();
        assert!(trigger.unbind().is_ok());
        assert_eq!(trigger.unbind_count(), 1);
    }
}
