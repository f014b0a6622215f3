//! Raspberry Pi trigger adapter.
//!
//! Binds the detector's digital output through rppal's async interrupt
//! facility: falling edge, internal pull-down, the detector pulling the line
//! low on noise. The kernel reports every edge; spacing closer together than
//! the configured bounce interval is dropped here, before the callback sees
//! it, which is the debounce contract [`TriggerSource`] promises.

use std::time::{Duration, Instant};

use rppal::gpio::{Gpio, InputPin, Level, Trigger};

use crate::hardware::{Edge, HardwareError, TriggerCallback, TriggerSource};

impl From<Edge> for Trigger {
    fn from(edge: Edge) -> Self {
        match edge {
            Edge::Rising => Self::RisingEdge,
            Edge::Falling => Self::FallingEdge,
            Edge::Both => Self::Both,
        }
    }
}

fn driver_error(error: &rppal::gpio::Error) -> HardwareError {
    HardwareError::Driver(error.to_string())
}

/// Hardware trigger over the Pi's GPIO header.
pub struct GpioTrigger {
    gpio: Option<Gpio>,
    pin: Option<InputPin>,
}

impl GpioTrigger {
    /// Open the GPIO driver.
    ///
    /// # Errors
    ///
    /// Returns an error when the driver is unavailable (not a Pi, missing
    /// permissions on `/dev/gpiomem`).
    pub fn new() -> Result<Self, HardwareError> {
        let gpio = Gpio::new().map_err(|e| driver_error(&e))?;
        Ok(Self {
            gpio: Some(gpio),
            pin: None,
        })
    }

    fn driver(&mut self) -> Result<&Gpio, HardwareError> {
        if self.gpio.is_none() {
            // Reopened after a cleanup released the previous instance.
            self.gpio = Some(Gpio::new().map_err(|e| driver_error(&e))?);
        }
        self.gpio
            .as_ref()
            .ok_or_else(|| HardwareError::Driver("GPIO driver unavailable".into()))
    }
}

impl TriggerSource for GpioTrigger {
    fn bind(
        &mut self,
        pin: u8,
        edge: Edge,
        debounce: Duration,
        mut on_trigger: TriggerCallback,
    ) -> Result<(), HardwareError> {
        if self.pin.is_some() {
            return Err(HardwareError::AlreadyBound);
        }

        let driver = self.driver()?;
        let mut input = driver
            .get(pin)
            .map_err(|e| driver_error(&e))?
            .into_input_pulldown();

        let mut last_accepted: Option<Instant> = None;
        input
            .set_async_interrupt(edge.into(), move |_level: Level| {
                let now = Instant::now();
                if last_accepted.is_some_and(|at| now.duration_since(at) < debounce) {
                    return; // still inside the bounce window
                }
                last_accepted = Some(now);
                on_trigger();
            })
            .map_err(|e| driver_error(&e))?;

        self.pin = Some(input);
        Ok(())
    }

    fn unbind(&mut self) -> Result<(), HardwareError> {
        match self.pin.take() {
            Some(mut input) => {
                input.clear_async_interrupt().map_err(|e| driver_error(&e))?;
                Ok(())
            }
            // Removing an absent handler is harmless, as with the kernel
            // driver itself.
            None => Ok(()),
        }
    }

    fn cleanup(&mut self) -> Result<(), HardwareError> {
        self.pin = None;
        self.gpio = None; // next bind reopens the driver
        Ok(())
    }
}
