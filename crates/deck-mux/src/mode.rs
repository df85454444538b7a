//! Control modes
//!
//! Each mode is a row in a [`ModeTable`]: how many degrees one detent moves
//! the servo, and optionally a narrower angle window. Double clicking steps
//! through the configured modes in order.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::state::{HARDWARE_MAX_ANGLE, HARDWARE_MIN_ANGLE};

/// How encoder rotation maps to servo movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlMode {
    /// Coarse steps over the full range
    Direct,
    /// Small steps for precise adjustment
    Fine,
    /// Coarse steps inside a restricted window
    #[serde(rename = "range")]
    RangeLimited,
}

impl fmt::Display for ControlMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ControlMode::Direct => "direct",
            ControlMode::Fine => "fine",
            ControlMode::RangeLimited => "range",
        };
        f.write_str(name)
    }
}

/// Inclusive angle window in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AngleRange {
    /// Lower bound
    #[serde(rename = "min_angle")]
    pub min: f32,
    /// Upper bound
    #[serde(rename = "max_angle")]
    pub max: f32,
}

impl AngleRange {
    /// Full mechanical range of the servo
    pub const HARDWARE: AngleRange = AngleRange {
        min: HARDWARE_MIN_ANGLE,
        max: HARDWARE_MAX_ANGLE,
    };

    /// Build a range, checking it is finite, ordered and inside the hardware range
    pub fn new(min: f32, max: f32) -> Result<Self, ConfigError> {
        let range = Self { min, max };
        range.check("limits")?;
        Ok(range)
    }

    pub(crate) fn check(&self, field: &'static str) -> Result<(), ConfigError> {
        if !self.min.is_finite() || !self.max.is_finite() {
            return Err(ConfigError::invalid(field, "bounds must be finite"));
        }
        if self.min > self.max {
            return Err(ConfigError::invalid(
                field,
                format!("min {} is above max {}", self.min, self.max),
            ));
        }
        if self.min < HARDWARE_MIN_ANGLE || self.max > HARDWARE_MAX_ANGLE {
            return Err(ConfigError::invalid(
                field,
                format!(
                    "[{}, {}] is outside [{}, {}]",
                    self.min, self.max, HARDWARE_MIN_ANGLE, HARDWARE_MAX_ANGLE
                ),
            ));
        }
        Ok(())
    }

    /// Clamp `angle` into the window
    pub fn clamp(&self, angle: f32) -> f32 {
        angle.clamp(self.min, self.max)
    }

    /// Whether `angle` lies inside the window
    pub fn contains(&self, angle: f32) -> bool {
        angle >= self.min && angle <= self.max
    }
}

/// Per-mode behaviour
///
/// The window is given as `min_angle` / `max_angle`; both or neither must be
/// present.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModeSettings {
    /// Degrees per detent
    pub sensitivity: f32,
    /// Lower edge of the window
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_angle: Option<f32>,
    /// Upper edge of the window
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_angle: Option<f32>,
}

impl ModeSettings {
    /// Settings without a window
    pub fn unbounded(sensitivity: f32) -> Self {
        Self {
            sensitivity,
            min_angle: None,
            max_angle: None,
        }
    }

    /// Settings with a window
    pub fn bounded(sensitivity: f32, bounds: AngleRange) -> Self {
        Self {
            sensitivity,
            min_angle: Some(bounds.min),
            max_angle: Some(bounds.max),
        }
    }

    /// Window the angle is held inside while this mode is active
    pub fn bounds(&self) -> Option<AngleRange> {
        match (self.min_angle, self.max_angle) {
            (Some(min), Some(max)) => Some(AngleRange { min, max }),
            _ => None,
        }
    }

    fn check(&self) -> Result<(), ConfigError> {
        if !self.sensitivity.is_finite() || self.sensitivity <= 0.0 {
            return Err(ConfigError::invalid(
                "modes.sensitivity",
                format!("{} must be a finite positive number", self.sensitivity),
            ));
        }
        match (self.min_angle, self.max_angle) {
            (Some(min), Some(max)) => AngleRange { min, max }.check("modes.bounds"),
            (None, None) => Ok(()),
            (Some(_), None) => Err(ConfigError::invalid(
                "modes.bounds",
                "min_angle given without max_angle",
            )),
            (None, Some(_)) => Err(ConfigError::invalid(
                "modes.bounds",
                "max_angle given without min_angle",
            )),
        }
    }
}

/// Mode lookup table, iterated in [`ControlMode`] order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModeTable(BTreeMap<ControlMode, ModeSettings>);

impl Default for ModeTable {
    fn default() -> Self {
        Self::from_iter([
            (ControlMode::Direct, ModeSettings::unbounded(10.0)),
            (ControlMode::Fine, ModeSettings::unbounded(2.0)),
            (
                ControlMode::RangeLimited,
                ModeSettings::bounded(10.0, AngleRange { min: 90.0, max: 180.0 }),
            ),
        ])
    }
}

impl FromIterator<(ControlMode, ModeSettings)> for ModeTable {
    fn from_iter<T: IntoIterator<Item = (ControlMode, ModeSettings)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl ModeTable {
    /// Settings for `mode`, if configured
    pub fn get(&self, mode: ControlMode) -> Option<&ModeSettings> {
        self.0.get(&mode)
    }

    /// Insert or replace the settings for `mode`
    pub fn set(&mut self, mode: ControlMode, settings: ModeSettings) {
        self.0.insert(mode, settings);
    }

    /// Configured modes in cycle order
    pub fn modes(&self) -> impl Iterator<Item = ControlMode> + '_ {
        self.0.keys().copied()
    }

    /// Mode that follows `mode`, wrapping around
    ///
    /// Modes missing from the table are skipped. Returns `mode` itself if it
    /// is the only configured one.
    pub fn next_after(&self, mode: ControlMode) -> ControlMode {
        self.0
            .range((std::ops::Bound::Excluded(mode), std::ops::Bound::Unbounded))
            .next()
            .or_else(|| self.0.iter().next())
            .map(|(m, _)| *m)
            .unwrap_or(mode)
    }

    /// Check every row
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.0.is_empty() {
            return Err(ConfigError::invalid("modes", "at least one mode is required"));
        }
        self.0.values().try_for_each(ModeSettings::check)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_cycle_order() {
        let table = ModeTable::default();
        assert_eq!(table.next_after(ControlMode::Direct), ControlMode::Fine);
        assert_eq!(table.next_after(ControlMode::Fine), ControlMode::RangeLimited);
        assert_eq!(table.next_after(ControlMode::RangeLimited), ControlMode::Direct);
    }

    #[test]
    fn test_cycle_skips_unconfigured_modes() {
        let table = ModeTable::from_iter([
            (ControlMode::Direct, ModeSettings::unbounded(5.0)),
            (
                ControlMode::RangeLimited,
                ModeSettings::bounded(5.0, AngleRange { min: 90.0, max: 180.0 }),
            ),
        ]);
        assert_eq!(table.next_after(ControlMode::Direct), ControlMode::RangeLimited);
        assert_eq!(table.next_after(ControlMode::Fine), ControlMode::RangeLimited);
        assert_eq!(table.next_after(ControlMode::RangeLimited), ControlMode::Direct);
    }

    #[test]
    fn test_single_mode_cycles_to_itself() {
        let table = ModeTable::from_iter([(ControlMode::Fine, ModeSettings::unbounded(1.0))]);
        assert_eq!(table.next_after(ControlMode::Fine), ControlMode::Fine);
    }

    #[test]
    fn test_json_shape() {
        let json = r#"{
            "direct": {"sensitivity": 10.0},
            "fine": {"sensitivity": 2.0},
            "range": {"sensitivity": 10.0, "min_angle": 90.0, "max_angle": 180.0}
        }"#;
        let table: ModeTable = serde_json::from_str(json).unwrap();
        assert_eq!(table, ModeTable::default());
    }

    #[test]
    fn test_rejects_bad_rows() {
        let zero = ModeTable::from_iter([(ControlMode::Direct, ModeSettings::unbounded(0.0))]);
        assert!(zero.validate().is_err());

        let nan = ModeTable::from_iter([(ControlMode::Fine, ModeSettings::unbounded(f32::NAN))]);
        assert!(nan.validate().is_err());

        let inverted = ModeTable::from_iter([(
            ControlMode::RangeLimited,
            ModeSettings::bounded(1.0, AngleRange { min: 180.0, max: 90.0 }),
        )]);
        assert!(inverted.validate().is_err());

        let outside = ModeTable::from_iter([(
            ControlMode::RangeLimited,
            ModeSettings::bounded(1.0, AngleRange { min: 0.0, max: 300.0 }),
        )]);
        assert!(outside.validate().is_err());

        assert!(ModeTable::from_iter([]).validate().is_err());
    }

    #[test]
    fn test_half_window_rejected() {
        let json = r#"{"range": {"sensitivity": 10.0, "min_angle": 90.0}}"#;
        let table: ModeTable = serde_json::from_str(json).unwrap();
        assert_eq!(table.get(ControlMode::RangeLimited).unwrap().bounds(), None);
        assert!(matches!(
            table.validate(),
            Err(ConfigError::Invalid { field: "modes.bounds", .. })
        ));

        let json = r#"{"range": {"sensitivity": 10.0, "max_angle": 180.0}}"#;
        let table: ModeTable = serde_json::from_str(json).unwrap();
        assert!(matches!(
            table.validate(),
            Err(ConfigError::Invalid { field: "modes.bounds", .. })
        ));
    }

    #[test]
    fn test_unknown_mode_key_rejected() {
        let json = r#"{"range": {"sensitivity": 10.0, "min_angel": 90.0, "max_angle": 180.0}}"#;
        assert!(serde_json::from_str::<ModeTable>(json).is_err());
    }

    #[test]
    fn test_range_clamp() {
        let range = AngleRange::new(90.0, 180.0).unwrap();
        assert_eq!(range.clamp(45.0), 90.0);
        assert_eq!(range.clamp(200.0), 180.0);
        assert_eq!(range.clamp(120.0), 120.0);
        assert!(range.contains(90.0));
        assert!(!range.contains(180.5));
    }
}
