//! Encoder lines through the GPIO character device

use deck_input::{EncoderPinConfig, GpioEncoderPins};
use deck_mux::InitError;
use linux_embedded_hal::gpio_cdev::{Chip, LineRequestFlags};
use linux_embedded_hal::CdevPin;

/// Encoder backed by three requested input lines
pub type CdevEncoderPins = GpioEncoderPins<CdevPin, CdevPin, CdevPin>;

/// Request the encoder lines from `chip`
pub fn open_encoder_pins(chip: &str, config: &EncoderPinConfig) -> Result<CdevEncoderPins, InitError> {
    let open_error = |reason: String| InitError::Open {
        path: chip.to_string(),
        reason,
    };

    let mut gpio = Chip::new(chip).map_err(|e| open_error(e.to_string()))?;
    let mut input = |offset: u32, consumer: &str| -> Result<CdevPin, InitError> {
        let handle = gpio
            .get_line(offset)
            .and_then(|line| line.request(LineRequestFlags::INPUT, 0, consumer))
            .map_err(|e| open_error(format!("line {}: {}", offset, e)))?;
        CdevPin::new(handle).map_err(|e| open_error(format!("line {}: {}", offset, e)))
    };

    let clk = input(config.clk, "cyberdeck-clk")?;
    let dt = input(config.dt, "cyberdeck-dt")?;
    let sw = input(config.sw, "cyberdeck-sw")?;
    Ok(GpioEncoderPins::new(clk, dt, sw, config.button_active_low))
}
