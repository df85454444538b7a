//! Controller configuration
//!
//! Loaded once at startup from a JSON file and never written back. Every
//! field has a default so a partial file only needs the values it changes.

use std::collections::HashSet;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::time::Duration;

use deck_input::EncoderSettings;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::channel::ChannelId;
use crate::error::ConfigError;
use crate::mode::{AngleRange, ControlMode, ModeTable};

/// Where a device sits behind the multiplexer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSlot {
    /// Multiplexer channel
    pub channel: ChannelId,
    /// 7-bit device address on that channel
    pub address: u8,
}

/// PCA9685 servo output settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServoConfig {
    /// Multiplexer channel
    pub channel: ChannelId,
    /// 7-bit PCA9685 address
    pub address: u8,
    /// PWM output driving the servo (0-15)
    pub output: u8,
    /// Pulse width at the lowest hardware angle (µs)
    pub min_pulse_us: u16,
    /// Pulse width at the highest hardware angle (µs)
    pub max_pulse_us: u16,
    /// PWM frequency (Hz)
    pub pwm_hz: u16,
}

impl Default for ServoConfig {
    fn default() -> Self {
        Self {
            channel: ChannelId::new_unchecked(1),
            address: 0x40,
            output: 0,
            min_pulse_us: 500,
            max_pulse_us: 2500,
            pwm_hz: 50,
        }
    }
}

impl ServoConfig {
    /// PWM frequencies the PCA9685 prescaler can produce (Hz)
    pub const PWM_HZ_RANGE: RangeInclusive<u16> = 24..=1526;

    /// Channel and address pair
    pub fn slot(&self) -> DeviceSlot {
        DeviceSlot {
            channel: self.channel,
            address: self.address,
        }
    }
}

/// Bus wiring
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// I2C character device
    pub device: String,
    /// Multiplexer address
    pub mux_address: u8,
    /// Pause after a channel switch before the next transfer (µs)
    pub select_settle_us: u64,
    /// OLED display location
    pub display: DeviceSlot,
    /// Servo controller location and output
    pub servo: ServoConfig,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            device: "/dev/i2c-1".to_string(),
            mux_address: 0x70,
            select_settle_us: 2000,
            display: DeviceSlot {
                channel: ChannelId::new_unchecked(0),
                address: 0x3C,
            },
            servo: ServoConfig::default(),
        }
    }
}

/// Complete controller configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeckConfig {
    /// Bus wiring
    pub bus: BusConfig,
    /// GPIO character device the encoder is wired to
    pub gpio_chip: String,
    /// Hardware angle limits
    pub limits: AngleRange,
    /// Angle a single click returns to
    pub center_angle: f32,
    /// Mode at startup
    pub default_mode: ControlMode,
    /// Per-mode sensitivity and window
    pub modes: ModeTable,
    /// Display refresh rate
    pub fps: u32,
    /// Bound on any single bus transaction (ms)
    pub transaction_timeout_ms: u64,
    /// Encoder event queue size
    pub queue_capacity: usize,
    /// Encoder wiring and timings
    pub encoder: EncoderSettings,
    /// Where the last position is saved
    pub state_file: PathBuf,
}

impl Default for DeckConfig {
    fn default() -> Self {
        Self {
            bus: BusConfig::default(),
            gpio_chip: "/dev/gpiochip0".to_string(),
            limits: AngleRange::HARDWARE,
            center_angle: 145.0,
            default_mode: ControlMode::Direct,
            modes: ModeTable::default(),
            fps: 20,
            transaction_timeout_ms: 100,
            queue_capacity: deck_input::DEFAULT_QUEUE_CAPACITY,
            encoder: EncoderSettings::default(),
            state_file: PathBuf::from("/var/lib/cyberdeck/position.json"),
        }
    }
}

impl DeckConfig {
    /// Load and validate the file at `path`
    ///
    /// A missing file yields the defaults. A file that exists but cannot be
    /// read, parsed or validated is an error.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config = match std::fs::read_to_string(path) {
            Ok(text) => Self::from_json(&text).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No config at {}, using defaults", path.display());
                Self::default()
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse without validating
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Check every cross-field invariant
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.limits.check("limits")?;
        self.modes.validate()?;

        if self.modes.get(self.default_mode).is_none() {
            return Err(ConfigError::invalid(
                "default_mode",
                format!("{} has no entry in modes", self.default_mode),
            ));
        }
        if !self.center_angle.is_finite() || !self.limits.contains(self.center_angle) {
            return Err(ConfigError::invalid(
                "center_angle",
                format!(
                    "{} is outside limits [{}, {}]",
                    self.center_angle, self.limits.min, self.limits.max
                ),
            ));
        }

        if self.bus.display.channel == self.bus.servo.channel {
            return Err(ConfigError::invalid(
                "bus.servo.channel",
                format!("display and servo both on channel {}", self.bus.display.channel),
            ));
        }
        let mut addresses = HashSet::new();
        for (field, address) in [
            ("bus.mux_address", self.bus.mux_address),
            ("bus.display.address", self.bus.display.address),
            ("bus.servo.address", self.bus.servo.address),
        ] {
            if address > 0x7F {
                return Err(ConfigError::invalid(
                    field,
                    format!("{:#04x} is not a 7-bit address", address),
                ));
            }
            if !addresses.insert(address) {
                return Err(ConfigError::invalid(
                    field,
                    format!("{:#04x} is used by another device", address),
                ));
            }
        }

        let servo = &self.bus.servo;
        if servo.output > 15 {
            return Err(ConfigError::invalid(
                "bus.servo.output",
                format!("{} is out of range 0..16", servo.output),
            ));
        }
        if servo.min_pulse_us >= servo.max_pulse_us {
            return Err(ConfigError::invalid(
                "bus.servo.min_pulse_us",
                "must be below max_pulse_us",
            ));
        }
        if !ServoConfig::PWM_HZ_RANGE.contains(&servo.pwm_hz) {
            return Err(ConfigError::invalid(
                "bus.servo.pwm_hz",
                format!(
                    "{} is outside {}..={}",
                    servo.pwm_hz,
                    ServoConfig::PWM_HZ_RANGE.start(),
                    ServoConfig::PWM_HZ_RANGE.end()
                ),
            ));
        }

        if self.fps == 0 {
            return Err(ConfigError::invalid("fps", "must be non-zero"));
        }
        if self.transaction_timeout_ms == 0 {
            return Err(ConfigError::invalid(
                "transaction_timeout_ms",
                "must be non-zero",
            ));
        }
        if self.select_settle() >= self.transaction_timeout() {
            return Err(ConfigError::invalid(
                "bus.select_settle_us",
                "must be shorter than the transaction timeout",
            ));
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::invalid("queue_capacity", "must be non-zero"));
        }
        if !matches!(self.encoder.steps_per_detent, 1 | 2 | 4) {
            return Err(ConfigError::invalid(
                "encoder.steps_per_detent",
                format!("{} is not 1, 2 or 4", self.encoder.steps_per_detent),
            ));
        }
        if self.encoder.sample_period_us == 0 {
            return Err(ConfigError::invalid(
                "encoder.sample_period_us",
                "must be non-zero",
            ));
        }
        Ok(())
    }

    /// Cycle period derived from `fps`
    pub fn frame_period(&self) -> Duration {
        Duration::from_secs(1) / self.fps.max(1)
    }

    /// Transaction timeout as a duration
    pub fn transaction_timeout(&self) -> Duration {
        Duration::from_millis(self.transaction_timeout_ms)
    }

    /// Post-select settle time as a duration
    pub fn select_settle(&self) -> Duration {
        Duration::from_micros(self.bus.select_settle_us)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = DeckConfig::default();
        config.validate().unwrap();
        assert_eq!(config.center_angle, 145.0);
        assert_eq!(config.bus.display.address, 0x3C);
        assert_eq!(config.bus.servo.channel.index(), 1);
        assert_eq!(config.frame_period(), Duration::from_millis(50));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = DeckConfig::from_json(r#"{"center_angle": 120.0, "fps": 10}"#).unwrap();
        assert_eq!(config.center_angle, 120.0);
        assert_eq!(config.fps, 10);
        assert_eq!(config.bus, BusConfig::default());
        config.validate().unwrap();
    }

    #[test]
    fn test_channel_out_of_range_fails_parse() {
        let json = r#"{"bus": {"display": {"channel": 8, "address": 60}}}"#;
        assert!(DeckConfig::from_json(json).is_err());
    }

    #[test]
    fn test_same_channel_rejected() {
        let mut config = DeckConfig::default();
        config.bus.servo.channel = config.bus.display.channel;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "bus.servo.channel", .. })
        ));
    }

    #[test]
    fn test_center_outside_limits_rejected() {
        let mut config = DeckConfig::default();
        config.limits = AngleRange::new(90.0, 180.0).unwrap();
        config.center_angle = 200.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "center_angle", .. })
        ));
    }

    #[test]
    fn test_zero_values_rejected() {
        let mut config = DeckConfig::default();
        config.queue_capacity = 0;
        assert!(config.validate().is_err());

        let mut config = DeckConfig::default();
        config.fps = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_pwm_frequency_outside_prescaler_range_rejected() {
        for pwm_hz in [0, 23, 1527, 5000] {
            let mut config = DeckConfig::default();
            config.bus.servo.pwm_hz = pwm_hz;
            assert!(matches!(
                config.validate(),
                Err(ConfigError::Invalid { field: "bus.servo.pwm_hz", .. })
            ));
        }

        let mut config = DeckConfig::default();
        config.bus.servo.pwm_hz = 1526;
        config.validate().unwrap();
    }

    #[test]
    fn test_default_mode_must_be_configured() {
        let mut config = DeckConfig::default();
        config.modes = ModeTable::from_iter([(
            ControlMode::Fine,
            crate::mode::ModeSettings::unbounded(1.0),
        )]);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "default_mode", .. })
        ));
    }

    #[test]
    fn test_mode_with_half_window_rejected() {
        let json = r#"{"default_mode": "range", "modes": {"range": {"sensitivity": 10.0, "min_angle": 90.0}}}"#;
        let config = DeckConfig::from_json(json).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "modes.bounds", .. })
        ));
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let path = std::env::temp_dir().join("cyberdeck-config-test-does-not-exist.json");
        let config = DeckConfig::load(&path).unwrap();
        assert_eq!(config, DeckConfig::default());
    }

    #[test]
    fn test_malformed_file_is_error() {
        let path = std::env::temp_dir().join(format!("cyberdeck-config-{}.json", std::process::id()));
        std::fs::write(&path, "{ not json").unwrap();
        let result = DeckConfig::load(&path);
        std::fs::remove_file(&path).ok();
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }
}
