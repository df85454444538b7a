//! Linux hardware backends
//!
//! Every device gets its own handle onto the same I2C character device, and
//! all of them share the multiplexer's [`BusLock`]. A device job holds that
//! lock for its whole blocking run, so a select issued after the manager gave
//! up on a stalled transfer waits for it, and a job still queued when the bus
//! is re-routed is dropped. Only the
//! [`MultiplexerManager`](deck_mux::MultiplexerManager) changes routing.
//!
//! The drivers are blocking, so every transfer runs on the blocking thread
//! pool. That keeps the scheduler responsive and lets the manager's
//! transaction timeout fire on a stalled bus.

mod display;
mod encoder;
mod servo;

use std::sync::{Arc, Mutex};

use deck_mux::{BusLock, DriverError, InitError};
use linux_embedded_hal::I2cdev;

pub use display::OledDisplay;
pub use encoder::open_encoder_pins;
pub use servo::Pca9685Servo;

/// Open a handle onto the I2C bus at `path`
pub fn open_bus(path: &str) -> Result<I2cdev, InitError> {
    I2cdev::new(path).map_err(|e| InitError::Open {
        path: path.to_string(),
        reason: e.to_string(),
    })
}

/// Run `f` against the device state on the blocking pool, holding the bus
async fn run_blocking<S, T, F>(
    lock: &BusLock,
    state: &Arc<Mutex<S>>,
    device: &'static str,
    f: F,
) -> Result<T, DriverError>
where
    S: Send + 'static,
    T: Send + 'static,
    F: FnOnce(&mut S) -> Result<T, DriverError> + Send + 'static,
{
    let ticket = lock.ticket();
    let lock = lock.clone();
    let state = Arc::clone(state);
    tokio::task::spawn_blocking(move || {
        lock.exclusive(ticket, || {
            let mut guard = state
                .lock()
                .map_err(|_| DriverError::transfer(device, "driver state poisoned"))?;
            f(&mut guard)
        })
        .unwrap_or(Err(DriverError::Superseded { device }))
    })
    .await
    .map_err(|e| DriverError::transfer(device, e))?
}
