//! Cyberdeck Hardware Simulation
//!
//! Stand-ins for the multiplexer, OLED display, servo controller and encoder
//! lines, so the controller can be exercised without a board attached.
//!
//! - [`SimBus`] implements the multiplexer select register and records every
//!   select write
//! - [`SimDisplay`] and [`SimServo`] only answer while the bus is routed to
//!   their own channel
//! - [`SimEncoderPins`] replays scripted encoder samples
//!
//! Every simulated part comes with a cloneable handle for failure injection
//! and inspection.
//!
//! # Example
//!
//! ```rust
//! use deck_mux::DeckConfig;
//! use deck_sim::SimRig;
//!
//! let rig = SimRig::new(&DeckConfig::default());
//! assert_eq!(rig.bus_handle.select_count(), 0);
//! ```

pub mod bus;
pub mod device;
pub mod encoder;

pub use bus::{SimBus, SimBusHandle};
pub use device::{SimDeviceHandle, SimDisplay, SimDisplayHandle, SimServo, SimServoHandle};
pub use encoder::{SimEncoderHandle, SimEncoderPins};

use deck_mux::DeckConfig;

/// A simulated bus with both devices wired where `config` expects them
pub struct SimRig {
    /// Multiplexer select primitive
    pub bus: SimBus,
    /// Multiplexer inspection handle
    pub bus_handle: SimBusHandle,
    /// Display adapter
    pub display: SimDisplay,
    /// Display inspection handle
    pub display_handle: SimDisplayHandle,
    /// Servo adapter
    pub servo: SimServo,
    /// Servo inspection handle
    pub servo_handle: SimServoHandle,
}

impl SimRig {
    /// Build a rig matching the bus section of `config`
    pub fn new(config: &DeckConfig) -> Self {
        let (bus, bus_handle) = SimBus::new(config.bus.mux_address);
        let (display, display_handle) = SimDisplay::new(config.bus.display.channel, bus_handle.clone());
        let (servo, servo_handle) = SimServo::new(config.bus.servo.channel, bus_handle.clone());
        Self {
            bus,
            bus_handle,
            display,
            display_handle,
            servo,
            servo_handle,
        }
    }
}
