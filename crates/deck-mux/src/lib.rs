//! Cyberdeck Bus Arbitration and Controller
//!
//! The OLED display and the tilt servo's PWM controller hang off different
//! downstream channels of one I2C multiplexer. This crate makes sure only one
//! of them is addressed at a time and drives both from a single scheduler.
//!
//! # Architecture
//!
//! - [`MultiplexerManager`] owns the channel-select primitive and is the only
//!   code that ever writes it
//! - [`DisplayAdapter`] and [`ServoAdapter`] are the device seams; the
//!   manager only calls them with their channel selected
//! - [`Controller`] renders frames, interprets encoder events and applies the
//!   servo angle on a fixed cadence
//! - [`DeckConfig`] and [`PositionStore`] cover configuration and the saved
//!   position
//!
//! # Example
//!
//! ```rust,ignore
//! use deck_mux::{ChannelId, MultiplexerManager, DEFAULT_TRANSACTION_TIMEOUT};
//!
//! let mux = MultiplexerManager::new(bus, DEFAULT_TRANSACTION_TIMEOUT);
//! let display = ChannelId::new(0)?;
//! mux.with_channel(display, || oled.render_next_frame(delta)).await?;
//! ```

pub mod adapter;
pub mod bus;
pub mod channel;
pub mod config;
pub mod controller;
pub mod error;
pub mod manager;
pub mod mode;
pub mod persist;
pub mod state;

pub use adapter::{DisplayAdapter, ServoAdapter};
pub use bus::{BusLock, BusTicket, ChannelSelect, I2cChannelSelect};
pub use channel::{ChannelId, MUX_CHANNELS};
pub use config::{BusConfig, DeckConfig, DeviceSlot, ServoConfig};
pub use controller::{Controller, ControllerSettings, ControllerStats};
pub use error::{BusError, ConfigError, DriverError, InitError, MuxError, PersistError};
pub use manager::{MultiplexerManager, DEFAULT_TRANSACTION_TIMEOUT};
pub use mode::{AngleRange, ControlMode, ModeSettings, ModeTable};
pub use persist::{JsonPositionStore, MemoryPositionStore, PositionStore};
pub use state::{ServoPosition, HARDWARE_MAX_ANGLE, HARDWARE_MIN_ANGLE};
