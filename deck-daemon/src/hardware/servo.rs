//! PCA9685 PWM controller driving the tilt servo

use std::sync::{Arc, Mutex};
use std::time::Duration;

use deck_mux::{BusLock, DriverError, InitError, ServoAdapter, ServoConfig, HARDWARE_MAX_ANGLE};
use embedded_hal::i2c::I2c;
use linux_embedded_hal::I2cdev;

use super::{open_bus, run_blocking};

const DEVICE: &str = "servo controller";

// Register map
const MODE1: u8 = 0x00;
const PRESCALE: u8 = 0xFE;
const LED0_ON_L: u8 = 0x06;

// MODE1 bits
const MODE1_SLEEP: u8 = 0x10;
const MODE1_AUTO_INCREMENT: u8 = 0x20;
const MODE1_RESTART: u8 = 0x80;

/// Internal oscillator frequency
const OSCILLATOR_HZ: f32 = 25_000_000.0;
/// PWM counter resolution
const PWM_STEPS: f32 = 4096.0;

/// Prescale register value for a PWM frequency, `None` if unreachable
pub fn prescale_for(pwm_hz: u16) -> Option<u8> {
    if !ServoConfig::PWM_HZ_RANGE.contains(&pwm_hz) {
        return None;
    }
    // 253 at the low end of the range, 3 at the high end
    let prescale = (OSCILLATOR_HZ / (PWM_STEPS * f32::from(pwm_hz))).round() - 1.0;
    Some(prescale as u8)
}

/// Off-count for `angle` degrees given the pulse range and frequency
pub fn off_count_for(angle: f32, config: &ServoConfig) -> u16 {
    let fraction = (angle / HARDWARE_MAX_ANGLE).clamp(0.0, 1.0);
    let min = f32::from(config.min_pulse_us);
    let max = f32::from(config.max_pulse_us);
    let pulse_us = min + fraction * (max - min);
    let period_us = 1_000_000.0 / f32::from(config.pwm_hz);
    let count = (pulse_us / period_us * PWM_STEPS).round();
    count.clamp(0.0, PWM_STEPS - 1.0) as u16
}

struct Pca9685State<I> {
    bus: I,
    initialized: bool,
}

/// Servo on one output of a PCA9685
pub struct Pca9685Servo<I = I2cdev> {
    state: Arc<Mutex<Pca9685State<I>>>,
    config: ServoConfig,
    lock: BusLock,
}

impl Pca9685Servo<I2cdev> {
    /// Open the bus; no traffic is sent until [`ServoAdapter::init`]
    pub fn open(bus: &str, config: ServoConfig, lock: BusLock) -> Result<Self, InitError> {
        Ok(Self::new(open_bus(bus)?, config, lock))
    }
}

impl<I> Pca9685Servo<I>
where
    I: I2c + Send + 'static,
{
    /// Drive the PCA9685 described by `config` over `bus`
    pub fn new(bus: I, config: ServoConfig, lock: BusLock) -> Self {
        Self {
            state: Arc::new(Mutex::new(Pca9685State {
                bus,
                initialized: false,
            })),
            config,
            lock,
        }
    }
}

fn write<I: I2c>(bus: &mut I, address: u8, bytes: &[u8]) -> Result<(), DriverError> {
    bus.write(address, bytes)
        .map_err(|e| DriverError::transfer(DEVICE, e))
}

impl<I> ServoAdapter for Pca9685Servo<I>
where
    I: I2c + Send + 'static,
{
    async fn init(&mut self) -> Result<(), DriverError> {
        let address = self.config.address;
        let prescale = prescale_for(self.config.pwm_hz).ok_or_else(|| {
            DriverError::transfer(
                DEVICE,
                format_args!("PWM frequency {}Hz is out of range", self.config.pwm_hz),
            )
        })?;
        run_blocking(&self.lock, &self.state, DEVICE, move |s| {
            // Prescale can only be written while the oscillator sleeps
            write(&mut s.bus, address, &[MODE1, MODE1_SLEEP])?;
            write(&mut s.bus, address, &[PRESCALE, prescale])?;
            write(&mut s.bus, address, &[MODE1, MODE1_AUTO_INCREMENT])?;
            std::thread::sleep(Duration::from_micros(500));
            write(
                &mut s.bus,
                address,
                &[MODE1, MODE1_RESTART | MODE1_AUTO_INCREMENT],
            )?;
            s.initialized = true;
            Ok(())
        })
        .await
    }

    async fn apply_angle(&mut self, angle: f32) -> Result<(), DriverError> {
        let address = self.config.address;
        let register = LED0_ON_L + 4 * self.config.output;
        let off = off_count_for(angle, &self.config).to_le_bytes();
        run_blocking(&self.lock, &self.state, DEVICE, move |s| {
            if !s.initialized {
                return Err(DriverError::NotInitialized { device: DEVICE });
            }
            write(&mut s.bus, address, &[register, 0, 0, off[0], off[1]])
        })
        .await
    }
}
