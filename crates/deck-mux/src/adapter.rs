//! Device adapter interfaces
//!
//! The controller only ever calls these from inside
//! [`MultiplexerManager::with_channel`](crate::MultiplexerManager::with_channel)
//! for the device's own channel, so implementations may assume the bus is
//! routed to them for the duration of each call.

use std::future::Future;
use std::time::Duration;

use crate::error::DriverError;

/// OLED display driver plus whatever animation it shows
pub trait DisplayAdapter: Send {
    /// Bring the panel up and blank it
    fn init(&mut self) -> impl Future<Output = Result<(), DriverError>> + Send;

    /// Advance the animation by `delta` and push one frame to the panel
    fn render_next_frame(
        &mut self,
        delta: Duration,
    ) -> impl Future<Output = Result<(), DriverError>> + Send;

    /// Blank the panel
    fn clear(&mut self) -> impl Future<Output = Result<(), DriverError>> + Send;
}

/// PWM controller driving the tilt servo
pub trait ServoAdapter: Send {
    /// Configure the PWM controller
    fn init(&mut self) -> impl Future<Output = Result<(), DriverError>> + Send;

    /// Move the servo to `angle` degrees
    fn apply_angle(&mut self, angle: f32) -> impl Future<Output = Result<(), DriverError>> + Send;
}
