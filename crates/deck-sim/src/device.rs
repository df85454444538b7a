//! Simulated display and servo controller
//!
//! Both devices sit on a fixed multiplexer channel and refuse any transfer
//! while the [`SimBus`](crate::SimBus) is routed elsewhere, the way a real
//! device behind the mux would simply not be there. Routing violations are
//! counted so tests can assert they never happen.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use deck_mux::{ChannelId, DisplayAdapter, DriverError, ServoAdapter};
use tracing::{debug, trace};

use crate::bus::SimBusHandle;

#[derive(Debug, Default)]
struct DeviceState {
    present: bool,
    initialized: bool,
    fail_next: usize,
    delay: Option<Duration>,
    misrouted: usize,
    transfers: usize,
}

/// Common behaviour of a device behind the simulated mux
#[derive(Debug, Clone)]
struct SimDevice {
    name: &'static str,
    channel: ChannelId,
    bus: SimBusHandle,
    state: Arc<Mutex<DeviceState>>,
}

impl SimDevice {
    fn new(name: &'static str, channel: ChannelId, bus: SimBusHandle) -> Self {
        Self {
            name,
            channel,
            bus,
            state: Arc::new(Mutex::new(DeviceState {
                present: true,
                ..Default::default()
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, DeviceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run one transfer; `init` transfers are allowed before initialisation
    async fn transfer(&self, init: bool) -> Result<(), DriverError> {
        let delay = self.lock().delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let routed = self.bus.routed_channel();
        let mut state = self.lock();
        if routed != Some(self.channel) {
            state.misrouted += 1;
            return Err(DriverError::transfer(
                self.name,
                format!("not routed (mux on {:?})", routed),
            ));
        }
        if !state.present {
            return Err(DriverError::transfer(self.name, "no acknowledge"));
        }
        if !init && !state.initialized {
            return Err(DriverError::NotInitialized { device: self.name });
        }
        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Err(DriverError::transfer(self.name, "injected failure"));
        }
        if init {
            state.initialized = true;
        }
        state.transfers += 1;
        Ok(())
    }

    fn handle(&self) -> SimDeviceHandle {
        SimDeviceHandle {
            state: Arc::clone(&self.state),
        }
    }
}

/// Test-side control of a simulated device
#[derive(Debug, Clone)]
pub struct SimDeviceHandle {
    state: Arc<Mutex<DeviceState>>,
}

impl SimDeviceHandle {
    fn lock(&self) -> MutexGuard<'_, DeviceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make the next `count` transfers fail
    pub fn fail_next(&self, count: usize) {
        self.lock().fail_next = count;
    }

    /// Delay every transfer, to exercise transaction timeouts
    pub fn set_delay(&self, delay: Option<Duration>) {
        self.lock().delay = delay;
    }

    /// Whether the device acknowledges at all
    pub fn set_present(&self, present: bool) {
        self.lock().present = present;
    }

    /// Transfers attempted while the mux was routed to another channel
    pub fn misrouted(&self) -> usize {
        self.lock().misrouted
    }

    /// Successful transfers
    pub fn transfers(&self) -> usize {
        self.lock().transfers
    }

    /// Whether init has succeeded
    pub fn is_initialized(&self) -> bool {
        self.lock().initialized
    }
}

#[derive(Debug, Default)]
struct DisplayLog {
    frames: u64,
    elapsed: Duration,
    clears: u64,
}

/// Simulated OLED display
#[derive(Debug)]
pub struct SimDisplay {
    device: SimDevice,
    log: Arc<Mutex<DisplayLog>>,
}

/// Test-side view of a [`SimDisplay`]
#[derive(Debug, Clone)]
pub struct SimDisplayHandle {
    device: SimDeviceHandle,
    log: Arc<Mutex<DisplayLog>>,
}

impl SimDisplay {
    /// Display on `channel` of the simulated mux
    pub fn new(channel: ChannelId, bus: SimBusHandle) -> (Self, SimDisplayHandle) {
        let device = SimDevice::new("display", channel, bus);
        let log = Arc::new(Mutex::new(DisplayLog::default()));
        let handle = SimDisplayHandle {
            device: device.handle(),
            log: Arc::clone(&log),
        };
        (Self { device, log }, handle)
    }

    fn log(&self) -> MutexGuard<'_, DisplayLog> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SimDisplayHandle {
    fn log(&self) -> MutexGuard<'_, DisplayLog> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Device-level controls
    pub fn device(&self) -> &SimDeviceHandle {
        &self.device
    }

    /// Frames pushed so far
    pub fn frames(&self) -> u64 {
        self.log().frames
    }

    /// Animation time accumulated from frame deltas
    pub fn elapsed(&self) -> Duration {
        self.log().elapsed
    }

    /// Number of clears
    pub fn clears(&self) -> u64 {
        self.log().clears
    }
}

impl DisplayAdapter for SimDisplay {
    async fn init(&mut self) -> Result<(), DriverError> {
        self.device.transfer(true).await?;
        debug!("Simulated display initialised on channel {}", self.device.channel);
        Ok(())
    }

    async fn render_next_frame(&mut self, delta: Duration) -> Result<(), DriverError> {
        self.device.transfer(false).await?;
        let mut log = self.log();
        log.frames += 1;
        log.elapsed += delta;
        trace!("Simulated frame {}", log.frames);
        Ok(())
    }

    async fn clear(&mut self) -> Result<(), DriverError> {
        self.device.transfer(false).await?;
        self.log().clears += 1;
        Ok(())
    }
}

/// Simulated PCA9685 driving the tilt servo
#[derive(Debug)]
pub struct SimServo {
    device: SimDevice,
    angles: Arc<Mutex<Vec<f32>>>,
}

/// Test-side view of a [`SimServo`]
#[derive(Debug, Clone)]
pub struct SimServoHandle {
    device: SimDeviceHandle,
    angles: Arc<Mutex<Vec<f32>>>,
}

impl SimServo {
    /// Servo controller on `channel` of the simulated mux
    pub fn new(channel: ChannelId, bus: SimBusHandle) -> (Self, SimServoHandle) {
        let device = SimDevice::new("servo controller", channel, bus);
        let angles = Arc::new(Mutex::new(Vec::new()));
        let handle = SimServoHandle {
            device: device.handle(),
            angles: Arc::clone(&angles),
        };
        (Self { device, angles }, handle)
    }
}

impl SimServoHandle {
    fn angles(&self) -> MutexGuard<'_, Vec<f32>> {
        self.angles.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Device-level controls
    pub fn device(&self) -> &SimDeviceHandle {
        &self.device
    }

    /// Every angle the servo was moved to, in order
    pub fn applied(&self) -> Vec<f32> {
        self.angles().clone()
    }

    /// Most recent angle, if any
    pub fn last_angle(&self) -> Option<f32> {
        self.angles().last().copied()
    }
}

impl ServoAdapter for SimServo {
    async fn init(&mut self) -> Result<(), DriverError> {
        self.device.transfer(true).await?;
        debug!("Simulated servo controller initialised on channel {}", self.device.channel);
        Ok(())
    }

    async fn apply_angle(&mut self, angle: f32) -> Result<(), DriverError> {
        self.device.transfer(false).await?;
        self.angles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(angle);
        debug!("Simulated servo moved to {:.1}°", angle);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::SimBus;
    use deck_mux::ChannelSelect;

    fn ch(index: u8) -> ChannelId {
        ChannelId::new(index).unwrap()
    }

    #[tokio::test]
    async fn test_refuses_when_not_routed() {
        let (mut bus, bus_handle) = SimBus::new(0x70);
        let (mut servo, servo_handle) = SimServo::new(ch(1), bus_handle);

        assert!(servo.init().await.is_err());
        assert_eq!(servo_handle.device().misrouted(), 1);

        bus.select(ch(1)).await.unwrap();
        servo.init().await.unwrap();
        servo.apply_angle(150.0).await.unwrap();
        assert_eq!(servo_handle.applied(), vec![150.0]);
    }

    #[tokio::test]
    async fn test_render_requires_init() {
        let (mut bus, bus_handle) = SimBus::new(0x70);
        let (mut display, _handle) = SimDisplay::new(ch(0), bus_handle);
        bus.select(ch(0)).await.unwrap();

        assert_eq!(
            display.render_next_frame(Duration::from_millis(50)).await,
            Err(DriverError::NotInitialized { device: "display" })
        );
    }

    #[tokio::test]
    async fn test_frames_accumulate_time() {
        let (mut bus, bus_handle) = SimBus::new(0x70);
        let (mut display, handle) = SimDisplay::new(ch(0), bus_handle);
        bus.select(ch(0)).await.unwrap();
        display.init().await.unwrap();

        display.render_next_frame(Duration::from_millis(50)).await.unwrap();
        display.render_next_frame(Duration::from_millis(60)).await.unwrap();
        assert_eq!(handle.frames(), 2);
        assert_eq!(handle.elapsed(), Duration::from_millis(110));
    }

    #[tokio::test]
    async fn test_injected_failure_is_consumed() {
        let (mut bus, bus_handle) = SimBus::new(0x70);
        let (mut servo, handle) = SimServo::new(ch(1), bus_handle);
        bus.select(ch(1)).await.unwrap();
        servo.init().await.unwrap();

        handle.device().fail_next(1);
        assert!(servo.apply_angle(10.0).await.is_err());
        servo.apply_angle(20.0).await.unwrap();
        assert_eq!(handle.applied(), vec![20.0]);
    }
}
