//! Cyberdeck Peripheral Controller
//!
//! Drives the OLED spectrum animation and the screen-tilt servo, both of which
//! sit behind one I2C multiplexer, from a single scheduler. A rotary encoder
//! moves the servo; its events arrive through a bounded queue sampled on a
//! separate task.

mod animation;
mod cli;
mod console;
#[cfg(target_os = "linux")]
mod hardware;

use std::future::Future;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use deck_input::{run_encoder_task, EncoderPins, EncoderSource, EventQueue};
use deck_mux::{
    ChannelSelect, Controller, ControllerSettings, ControllerStats, DeckConfig, DisplayAdapter,
    JsonPositionStore, MultiplexerManager, ServoAdapter,
};
use deck_sim::{SimEncoderPins, SimRig};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cli::Args;
use console::GestureScript;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "cyberdeck=info,deck_mux=info,deck_input=info,deck_sim=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = match Args::parse(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{}\n\n{}", e, cli::USAGE);
            return ExitCode::from(2);
        }
    };
    if args.help {
        println!("{}", cli::USAGE);
        return ExitCode::SUCCESS;
    }

    match run(args).await {
        Ok(stats) => {
            info!(
                "Cyberdeck controller exited cleanly ({} cycles)",
                stats.cycles
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<ControllerStats> {
    let path = cli::config_path(&args);
    let config = DeckConfig::load(&path)
        .with_context(|| format!("invalid configuration {}", path.display()))?;
    info!("Starting cyberdeck controller (config {})", path.display());

    if args.simulate {
        return run_simulated(config).await;
    }
    run_hardware(config).await
}

async fn run_simulated(config: DeckConfig) -> Result<ControllerStats> {
    info!("Using simulated multiplexer, display, servo and encoder");
    let rig = SimRig::new(&config);
    let (pins, encoder) = SimEncoderPins::new();
    let script = GestureScript::new(encoder, config.encoder);

    let stop = async move {
        tokio::select! {
            _ = shutdown_signal() => {}
            _ = console::drive_from_stdin(script) => {}
        }
    };
    run_deck(&config, rig.bus, rig.display, rig.servo, pins, stop).await
}

#[cfg(target_os = "linux")]
async fn run_hardware(config: DeckConfig) -> Result<ControllerStats> {
    use deck_mux::{BusLock, I2cChannelSelect};
    use hardware::{open_bus, open_encoder_pins, OledDisplay, Pca9685Servo};

    let bus = &config.bus;
    let lock = BusLock::new();
    let select = I2cChannelSelect::new(open_bus(&bus.device)?, bus.mux_address)
        .with_settle_time(config.select_settle())
        .with_bus_lock(lock.clone());
    let display = OledDisplay::open(&bus.device, bus.display.address, lock.clone())?;
    let servo = Pca9685Servo::open(&bus.device, bus.servo, lock)?;
    let pins = open_encoder_pins(&config.gpio_chip, &config.encoder.pins)?;

    run_deck(&config, select, display, servo, pins, shutdown_signal()).await
}

#[cfg(not(target_os = "linux"))]
async fn run_hardware(_config: DeckConfig) -> Result<ControllerStats> {
    anyhow::bail!("hardware access needs Linux I2C and GPIO character devices; use --simulate")
}

/// Wire the controller and encoder task, then run until `stop` resolves
async fn run_deck<B, D, S, E>(
    config: &DeckConfig,
    select: B,
    display: D,
    servo: S,
    pins: E,
    stop: impl Future<Output = ()> + Send + 'static,
) -> Result<ControllerStats>
where
    B: ChannelSelect,
    D: DisplayAdapter,
    S: ServoAdapter,
    E: EncoderPins + 'static,
{
    let queue = Arc::new(EventQueue::new(config.queue_capacity)?);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let source = EncoderSource::new(pins, &config.encoder, Arc::clone(&queue), Instant::now())
        .context("encoder setup failed")?;
    let encoder_task = tokio::spawn(run_encoder_task(
        source,
        config.encoder.sample_period(),
        shutdown_rx.clone(),
    ));

    let mux = MultiplexerManager::new(select, config.transaction_timeout());
    let store = JsonPositionStore::new(&config.state_file);
    let mut controller = Controller::new(
        mux,
        display,
        servo,
        store,
        queue,
        ControllerSettings::from(config),
    );

    if let Err(e) = controller.start().await {
        let _ = shutdown_tx.send(true);
        if let Err(join) = encoder_task.await {
            warn!("Encoder task ended abnormally: {}", join);
        }
        return Err(e).context("hardware initialisation failed");
    }

    tokio::spawn(async move {
        stop.await;
        info!("Shutdown requested");
        let _ = shutdown_tx.send(true);
    });

    controller.run(shutdown_rx).await;
    if let Err(e) = encoder_task.await {
        warn!("Encoder task ended abnormally: {}", e);
    }
    Ok(controller.shutdown().await)
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
                return;
            }
            Err(e) => warn!("Cannot listen for SIGTERM: {}", e),
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Cannot listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}
