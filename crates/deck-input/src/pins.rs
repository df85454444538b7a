//! Encoder input lines

use embedded_hal::digital::InputPin;
use serde::{Deserialize, Serialize};

use crate::error::InputError;

/// One sample of the three encoder lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PinLevels {
    /// Phase A (CLK) line level
    pub a: bool,
    /// Phase B (DT) line level
    pub b: bool,
    /// Whether the shaft button is pressed (already corrected for polarity)
    pub button: bool,
}

/// Source of encoder line samples
pub trait EncoderPins: Send {
    /// Read all three lines once
    fn sample(&mut self) -> Result<PinLevels, InputError>;
}

/// GPIO line assignment for the encoder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderPinConfig {
    /// Phase A (CLK) line offset
    pub clk: u32,
    /// Phase B (DT) line offset
    pub dt: u32,
    /// Shaft switch line offset
    pub sw: u32,
    /// Switch pulls the line low when pressed
    pub button_active_low: bool,
}

impl Default for EncoderPinConfig {
    fn default() -> Self {
        Self {
            clk: 17,
            dt: 27,
            sw: 22,
            button_active_low: true,
        }
    }
}

/// Encoder lines backed by `embedded-hal` input pins
pub struct GpioEncoderPins<A, B, S> {
    clk: A,
    dt: B,
    sw: S,
    button_active_low: bool,
}

impl<A, B, S> GpioEncoderPins<A, B, S>
where
    A: InputPin,
    B: InputPin,
    S: InputPin,
{
    /// Wrap the three input pins
    pub fn new(clk: A, dt: B, sw: S, button_active_low: bool) -> Self {
        Self {
            clk,
            dt,
            sw,
            button_active_low,
        }
    }
}

fn read<P: InputPin>(pin: &mut P, name: &'static str) -> Result<bool, InputError> {
    pin.is_high().map_err(|e| InputError::PinRead {
        pin: name,
        reason: format!("{:?}", e),
    })
}

impl<A, B, S> EncoderPins for GpioEncoderPins<A, B, S>
where
    A: InputPin + Send,
    B: InputPin + Send,
    S: InputPin + Send,
{
    fn sample(&mut self) -> Result<PinLevels, InputError> {
        let a = read(&mut self.clk, "clk")?;
        let b = read(&mut self.dt, "dt")?;
        let sw = read(&mut self.sw, "sw")?;
        Ok(PinLevels {
            a,
            b,
            button: sw != self.button_active_low,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal::digital::{ErrorKind, ErrorType};

    struct FixedPin(Result<bool, ErrorKind>);

    impl ErrorType for FixedPin {
        type Error = ErrorKind;
    }

    impl InputPin for FixedPin {
        fn is_high(&mut self) -> Result<bool, Self::Error> {
            self.0
        }

        fn is_low(&mut self) -> Result<bool, Self::Error> {
            self.0.map(|high| !high)
        }
    }

    #[test]
    fn test_active_low_button() {
        let mut pins = GpioEncoderPins::new(
            FixedPin(Ok(true)),
            FixedPin(Ok(false)),
            FixedPin(Ok(false)),
            true,
        );
        assert_eq!(
            pins.sample().unwrap(),
            PinLevels {
                a: true,
                b: false,
                button: true
            }
        );
    }

    #[test]
    fn test_active_high_button() {
        let mut pins = GpioEncoderPins::new(
            FixedPin(Ok(true)),
            FixedPin(Ok(true)),
            FixedPin(Ok(false)),
            false,
        );
        assert!(!pins.sample().unwrap().button);
    }

    #[test]
    fn test_read_error_names_pin() {
        let mut pins = GpioEncoderPins::new(
            FixedPin(Ok(true)),
            FixedPin(Err(ErrorKind::Other)),
            FixedPin(Ok(true)),
            true,
        );
        match pins.sample() {
            Err(InputError::PinRead { pin, .. }) => assert_eq!(pin, "dt"),
            other => panic!("Expected PinRead error, got {:?}", other),
        }
    }
}
