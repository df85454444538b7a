//! SSD1306 OLED showing the spectrum animation

use std::sync::{Arc, Mutex};
use std::time::Duration;

use deck_mux::{BusLock, DisplayAdapter, DriverError, InitError};
use embedded_graphics::prelude::Size;
use linux_embedded_hal::I2cdev;
use ssd1306::{mode::BufferedGraphicsMode, prelude::*, I2CDisplayInterface, Ssd1306};

use super::{open_bus, run_blocking};
use crate::animation::SpectrumAnimation;

const DEVICE: &str = "display";

type Panel = Ssd1306<I2CInterface<I2cdev>, DisplaySize128x64, BufferedGraphicsMode<DisplaySize128x64>>;

struct OledState {
    panel: Panel,
    animation: SpectrumAnimation,
    initialized: bool,
}

/// 128x64 SSD1306 panel over Linux I2C
pub struct OledDisplay {
    state: Arc<Mutex<OledState>>,
    lock: BusLock,
}

impl OledDisplay {
    /// Open the bus; no traffic is sent until [`DisplayAdapter::init`]
    pub fn open(bus: &str, address: u8, lock: BusLock) -> Result<Self, InitError> {
        let interface = I2CDisplayInterface::new_custom_address(open_bus(bus)?, address);
        let panel = Ssd1306::new(interface, DisplaySize128x64, DisplayRotation::Rotate0)
            .into_buffered_graphics_mode();
        Ok(Self {
            state: Arc::new(Mutex::new(OledState {
                panel,
                animation: SpectrumAnimation::new(Size::new(128, 64)),
                initialized: false,
            })),
            lock,
        })
    }
}

impl DisplayAdapter for OledDisplay {
    async fn init(&mut self) -> Result<(), DriverError> {
        run_blocking(&self.lock, &self.state, DEVICE, |s| {
            s.panel.init().map_err(|e| DriverError::transfer(DEVICE, e))?;
            s.panel.clear_buffer();
            s.panel.flush().map_err(|e| DriverError::transfer(DEVICE, e))?;
            s.initialized = true;
            Ok(())
        })
        .await
    }

    async fn render_next_frame(&mut self, delta: Duration) -> Result<(), DriverError> {
        run_blocking(&self.lock, &self.state, DEVICE, move |s| {
            if !s.initialized {
                return Err(DriverError::NotInitialized { device: DEVICE });
            }
            s.animation.advance(delta);
            s.panel.clear_buffer();
            s.animation
                .draw(&mut s.panel)
                .map_err(|e| DriverError::transfer(DEVICE, e))?;
            s.panel.flush().map_err(|e| DriverError::transfer(DEVICE, e))
        })
        .await
    }

    async fn clear(&mut self) -> Result<(), DriverError> {
        run_blocking(&self.lock, &self.state, DEVICE, |s| {
            if !s.initialized {
                return Err(DriverError::NotInitialized { device: DEVICE });
            }
            s.panel.clear_buffer();
            s.panel.flush().map_err(|e| DriverError::transfer(DEVICE, e))
        })
        .await
    }
}
