//! # tripwire-node
//!
//! Daemon binary for the tripwire noise sentry.
//!
//! Wires the core pipeline to the outside world: loads configuration, opens
//! the MQTT transport, binds the hardware trigger, then dispatches control
//! messages until a shutdown signal or a fatal hardware failure.
//!
//! ## Running
//!
//! ```bash
//! # Development (simulated trigger source)
//! cargo run --package tripwire-node
//!
//! # Production (on Raspberry Pi)
//! cargo build --release --features gpio
//! TRIPWIRE_ENV=production ./tripwire-node
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

mod logging;
mod mqtt;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{error, info, warn};

use tripwire_core::command::CommandDispatcher;
use tripwire_core::config::NodeConfig;
use tripwire_core::heartbeat::HeartbeatEmitter;
use tripwire_core::lifecycle::InterruptLifecycle;
use tripwire_core::transport::{EventSink, Outbound};
use tripwire_core::tunables::SharedTunables;
use tripwire_core::validator::DebounceValidator;

#[cfg(feature = "gpio")]
use tripwire_core::gpio::GpioTrigger;
#[cfg(not(feature = "gpio"))]
use tripwire_core::hardware::SimulatedTrigger;

#[cfg(feature = "gpio")]
type Trigger = GpioTrigger;
#[cfg(not(feature = "gpio"))]
type Trigger = SimulatedTrigger;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init()?;

    info!("starting tripwire-node");

    let config_path = NodeConfig::default_path()?;
    let config = NodeConfig::load(&config_path)?;
    config.validate()?;
    if !config_path.exists() {
        if let Err(error) = config.save(&config_path) {
            warn!(%error, "could not write default configuration file");
        }
    }
    info!(
        broker = %config.broker.host,
        port = config.broker.port,
        control_topic = %config.broker.control_topic,
        message_topic = %config.broker.message_topic,
        pin = config.sensor.pin,
        "configuration loaded"
    );

    let (sink, mut control_rx, _pump) = mqtt::connect(&config.broker);
    let sink: Arc<dyn EventSink> = Arc::new(sink);

    let alive = Arc::new(AtomicBool::new(true));
    let tunables = SharedTunables::new(config.tunables());
    let validator = Arc::new(DebounceValidator::new(tunables.clone(), Arc::clone(&sink)));
    let lifecycle = InterruptLifecycle::new(
        trigger_source()?,
        Arc::clone(&validator),
        tunables.clone(),
        Arc::clone(&sink),
        config.sensor.pin,
    );
    let mut dispatcher = CommandDispatcher::new(tunables, validator, lifecycle, Arc::clone(&sink));

    let outcome = match dispatcher.enable_sensing().await {
        Ok(()) => {
            let _heartbeat = HeartbeatEmitter::new(Arc::clone(&sink), Arc::clone(&alive)).spawn();
            info!("ready to receive control messages");
            run(&mut dispatcher, &mut control_rx).await
        }
        Err(error) => Err(error),
    };

    // Teardown keeps going through failures so nothing stays bound.
    alive.store(false, Ordering::Release);
    if let Err(ref error) = outcome {
        error!(%error, "terminating after fatal error");
    }
    if let Err(error) = sink.publish(&Outbound::Shutdown) {
        warn!(%error, "failed to announce shutdown");
    }
    dispatcher.shutdown().await;

    info!("tripwire-node stopped");
    outcome.map_err(anyhow::Error::from)
}

/// Dispatch control messages until the channel closes or a shutdown signal
/// arrives. Only a fatal rebind exhaustion breaks the loop with an error.
async fn run(
    dispatcher: &mut CommandDispatcher<Trigger>,
    control_rx: &mut mqtt::ControlReceiver,
) -> tripwire_core::Result<()> {
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            message = control_rx.recv() => match message {
                Some(raw) => dispatcher.handle(&raw).await?,
                None => {
                    warn!("control channel closed");
                    return Ok(());
                }
            },
            result = &mut shutdown => {
                if let Err(error) = result {
                    warn!(%error, "failed to listen for shutdown signal");
                }
                info!("shutdown signal received");
                return Ok(());
            }
        }
    }
}

#[cfg(feature = "gpio")]
fn trigger_source() -> anyhow::Result<Trigger> {
    Ok(GpioTrigger::new()?)
}

#[cfg(not(feature = "gpio"))]
fn trigger_source() -> anyhow::Result<Trigger> {
    warn!("built without the gpio feature, using a simulated trigger source");
    Ok(SimulatedTrigger::new())
}
