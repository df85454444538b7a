//! Unified display/servo controller
//!
//! A single scheduler drives both bus consumers. Each cycle it renders one
//! display frame, drains the encoder queue, and pushes the resulting servo
//! angle, always through the [`MultiplexerManager`] so the two devices never
//! see each other's channel selection.

use std::sync::Arc;
use std::time::Duration;

use deck_input::{EncoderEvent, EventQueue};
use tokio::sync::watch;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::adapter::{DisplayAdapter, ServoAdapter};
use crate::bus::ChannelSelect;
use crate::config::{DeckConfig, DeviceSlot};
use crate::error::{InitError, MuxError};
use crate::manager::MultiplexerManager;
use crate::mode::{ControlMode, ModeTable};
use crate::persist::PositionStore;
use crate::state::ServoPosition;

const DISPLAY: &str = "display";
const SERVO: &str = "servo controller";

/// Counters reported at shutdown
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControllerStats {
    /// Cycles run
    pub cycles: u64,
    /// Frames pushed to the display
    pub frames_rendered: u64,
    /// Frames skipped after a failed retry
    pub renders_skipped: u64,
    /// Angles pushed to the servo
    pub applies: u64,
    /// Servo applies skipped after a failed retry
    pub applies_skipped: u64,
    /// Encoder events interpreted
    pub events_handled: u64,
    /// Encoder events lost to queue overflow
    pub events_dropped: u64,
}

/// Wiring the controller needs from the configuration
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    /// Bus device, for error messages
    pub bus_device: String,
    /// Multiplexer address, for error messages
    pub mux_address: u8,
    /// Display location
    pub display: DeviceSlot,
    /// Servo controller location
    pub servo: DeviceSlot,
    /// Angle a single click returns to and the fallback start angle
    pub center_angle: f32,
    /// Mode at startup
    pub default_mode: ControlMode,
    /// Mode table
    pub modes: ModeTable,
    /// Hardware limits
    pub limits: crate::mode::AngleRange,
    /// Cycle period
    pub frame_period: Duration,
}

impl From<&DeckConfig> for ControllerSettings {
    fn from(config: &DeckConfig) -> Self {
        Self {
            bus_device: config.bus.device.clone(),
            mux_address: config.bus.mux_address,
            display: config.bus.display,
            servo: config.bus.servo.slot(),
            center_angle: config.center_angle,
            default_mode: config.default_mode,
            modes: config.modes.clone(),
            limits: config.limits,
            frame_period: config.frame_period(),
        }
    }
}

/// Scheduler owning the multiplexer, both device adapters and the position
pub struct Controller<B, D, S, P> {
    mux: MultiplexerManager<B>,
    display: D,
    servo: S,
    store: P,
    queue: Arc<EventQueue>,
    settings: ControllerSettings,
    position: ServoPosition,
    /// An angle change has not reached the servo yet
    pending_apply: bool,
    stats: ControllerStats,
}

impl<B, D, S, P> Controller<B, D, S, P>
where
    B: ChannelSelect,
    D: DisplayAdapter,
    S: ServoAdapter,
    P: PositionStore,
{
    /// Assemble a controller; nothing touches the bus until [`start`](Self::start)
    pub fn new(
        mux: MultiplexerManager<B>,
        display: D,
        servo: S,
        store: P,
        queue: Arc<EventQueue>,
        settings: ControllerSettings,
    ) -> Self {
        let position = ServoPosition::new(
            settings.center_angle,
            settings.default_mode,
            settings.modes.clone(),
            settings.limits,
        );
        Self {
            mux,
            display,
            servo,
            store,
            queue,
            settings,
            position,
            pending_apply: false,
            stats: ControllerStats::default(),
        }
    }

    /// Ping the bus, initialise both devices and restore the saved position
    pub async fn start(&mut self) -> Result<(), InitError> {
        self.mux
            .ping()
            .await
            .map_err(|source| InitError::MuxNotFound {
                bus: self.settings.bus_device.clone(),
                address: self.settings.mux_address,
                source,
            })?;
        self.mux.invalidate().await;
        info!(
            "Multiplexer found at {:#04x} on {}",
            self.settings.mux_address, self.settings.bus_device
        );

        let display_slot = self.settings.display;
        self.mux
            .with_channel(display_slot.channel, || self.display.init())
            .await
            .map_err(|source| InitError::DeviceNotFound {
                device: DISPLAY,
                address: display_slot.address,
                channel: display_slot.channel,
                source,
            })?;
        info!(
            "Display ready at {:#04x} on channel {}",
            display_slot.address, display_slot.channel
        );

        let servo_slot = self.settings.servo;
        self.mux
            .with_channel(servo_slot.channel, || self.servo.init())
            .await
            .map_err(|source| InitError::DeviceNotFound {
                device: SERVO,
                address: servo_slot.address,
                channel: servo_slot.channel,
                source,
            })?;
        info!(
            "Servo controller ready at {:#04x} on channel {}",
            servo_slot.address, servo_slot.channel
        );

        let restored = match self.store.load_position().await {
            Ok(Some(angle)) => angle,
            Ok(None) => {
                info!("No saved position, starting at center");
                self.settings.center_angle
            }
            Err(e) => {
                warn!("Failed to load saved position, starting at center: {}", e);
                self.settings.center_angle
            }
        };
        self.position.set_angle(restored);
        self.pending_apply = true;
        self.apply_pending().await;

        info!(
            "Controller started in {} mode at {:.1}°",
            self.position.mode(),
            self.position.angle()
        );
        Ok(())
    }

    /// Run one scheduler cycle
    ///
    /// Bus failures never escape: a transient failure is retried once, then
    /// the step is skipped and logged.
    pub async fn run_cycle(&mut self, delta: Duration) {
        self.stats.cycles += 1;

        self.render_frame(delta).await;

        for event in self.queue.drain_all() {
            self.handle_event(event).await;
        }

        if self.pending_apply {
            self.apply_pending().await;
        }
    }

    /// Run cycles at the configured rate until `shutdown` flips to true
    ///
    /// A cycle in progress when shutdown is signalled runs to completion.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.settings.frame_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last = Instant::now();

        info!(
            "Scheduler running at {:?} per cycle",
            self.settings.frame_period
        );

        while !*shutdown.borrow() {
            tokio::select! {
                _ = ticker.tick() => {
                    let now = Instant::now();
                    let delta = now - last;
                    last = now;
                    self.run_cycle(delta).await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("Scheduler stopped after {} cycles", self.stats.cycles);
    }

    /// Save the position and blank the display, both best effort
    pub async fn shutdown(&mut self) -> ControllerStats {
        let angle = self.position.angle();
        match self.store.save_position(angle).await {
            Ok(()) => info!("Saved position {:.1}°", angle),
            Err(e) => error!("Failed to save position on shutdown: {}", e),
        }

        let channel = self.settings.display.channel;
        if let Err(e) = self
            .mux
            .with_channel(channel, || self.display.clear())
            .await
        {
            warn!("Failed to clear display on shutdown: {}", e);
        }

        self.stats.events_dropped = self.queue.dropped();
        let stats = self.stats;
        info!(
            "Shutdown: {} cycles, {} frames ({} skipped), {} servo applies ({} skipped), {} events ({} dropped)",
            stats.cycles,
            stats.frames_rendered,
            stats.renders_skipped,
            stats.applies,
            stats.applies_skipped,
            stats.events_handled,
            stats.events_dropped
        );
        stats
    }

    async fn render_frame(&mut self, delta: Duration) {
        let channel = self.settings.display.channel;
        let mut result = self
            .mux
            .with_channel(channel, || self.display.render_next_frame(delta))
            .await;

        if matches!(&result, Err(e) if e.is_transient()) {
            debug!("Cycle {}: retrying render", self.stats.cycles);
            result = self
                .mux
                .with_channel(channel, || self.display.render_next_frame(delta))
                .await;
        }

        match result {
            Ok(()) => self.stats.frames_rendered += 1,
            Err(e) => {
                self.stats.renders_skipped += 1;
                self.log_skip("render", &e);
            }
        }
    }

    async fn apply_pending(&mut self) {
        let channel = self.settings.servo.channel;
        let angle = self.position.angle();
        let mut result = self
            .mux
            .with_channel(channel, || self.servo.apply_angle(angle))
            .await;

        if matches!(&result, Err(e) if e.is_transient()) {
            debug!("Cycle {}: retrying servo apply", self.stats.cycles);
            result = self
                .mux
                .with_channel(channel, || self.servo.apply_angle(angle))
                .await;
        }

        match result {
            Ok(()) => {
                self.pending_apply = false;
                self.stats.applies += 1;
                debug!("Servo at {:.1}°", angle);
            }
            Err(e) => {
                self.stats.applies_skipped += 1;
                self.log_skip("servo apply", &e);
            }
        }
    }

    fn log_skip(&self, step: &str, e: &MuxError) {
        warn!(
            "Cycle {}: {} skipped ({}): {}",
            self.stats.cycles,
            step,
            e.kind(),
            e
        );
    }

    async fn handle_event(&mut self, event: EncoderEvent) {
        self.stats.events_handled += 1;
        match event {
            EncoderEvent::RotateCw(_) | EncoderEvent::RotateCcw(_) => {
                let ticks = event.signed_ticks().unwrap_or(0);
                if self.position.rotate(ticks) {
                    self.pending_apply = true;
                }
                debug!("Rotate {} -> {:.1}°", ticks, self.position.angle());
            }
            EncoderEvent::DoubleClick => {
                if self.position.cycle_mode() {
                    self.pending_apply = true;
                }
                info!(
                    "Mode changed to {} at {:.1}°",
                    self.position.mode(),
                    self.position.angle()
                );
            }
            EncoderEvent::SingleClick => {
                if self.position.set_angle(self.settings.center_angle) {
                    self.pending_apply = true;
                }
                debug!("Centered at {:.1}°", self.position.angle());
            }
            EncoderEvent::LongPress => {
                let angle = self.position.angle();
                match self.store.save_position(angle).await {
                    Ok(()) => info!("Saved position {:.1}°", angle),
                    Err(e) => warn!("Failed to save position: {}", e),
                }
            }
        }
    }

    /// Current target angle
    pub fn angle(&self) -> f32 {
        self.position.angle()
    }

    /// Active control mode
    pub fn mode(&self) -> ControlMode {
        self.position.mode()
    }

    /// Whether an angle change is still waiting to reach the servo
    pub fn has_pending_apply(&self) -> bool {
        self.pending_apply
    }

    /// Counters so far
    pub fn stats(&self) -> ControllerStats {
        ControllerStats {
            events_dropped: self.queue.dropped(),
            ..self.stats
        }
    }

    /// The multiplexer manager, for diagnostics
    pub fn mux(&self) -> &MultiplexerManager<B> {
        &self.mux
    }

    /// Encoder event queue feeding this controller
    pub fn queue(&self) -> &Arc<EventQueue> {
        &self.queue
    }
}
