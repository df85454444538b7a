//! Servo position and control state

use crate::mode::{AngleRange, ControlMode, ModeSettings, ModeTable};

/// Lowest angle the servo can physically reach
pub const HARDWARE_MIN_ANGLE: f32 = 0.0;
/// Highest angle the servo can physically reach
pub const HARDWARE_MAX_ANGLE: f32 = 270.0;

/// Target angle plus the mode that governs how it moves
///
/// The angle is always inside the configured limits and, when the active mode
/// has one, inside that mode's window.
#[derive(Debug, Clone, PartialEq)]
pub struct ServoPosition {
    angle: f32,
    mode: ControlMode,
    modes: ModeTable,
    limits: AngleRange,
}

impl ServoPosition {
    /// Start at `angle` (clamped) in `mode`
    ///
    /// `mode` must be present in `modes`; configuration validation guarantees
    /// that for the daemon.
    pub fn new(angle: f32, mode: ControlMode, modes: ModeTable, limits: AngleRange) -> Self {
        let mut position = Self {
            angle: limits.min,
            mode,
            modes,
            limits,
        };
        position.angle = position.clamp(angle);
        position
    }

    /// Current angle in degrees
    pub fn angle(&self) -> f32 {
        self.angle
    }

    /// Active mode
    pub fn mode(&self) -> ControlMode {
        self.mode
    }

    /// Configured hardware limits
    pub fn limits(&self) -> AngleRange {
        self.limits
    }

    fn settings(&self) -> Option<&ModeSettings> {
        self.modes.get(self.mode)
    }

    /// Clamp to the active mode's window first, then to the limits
    pub fn clamp(&self, angle: f32) -> f32 {
        let angle = if angle.is_finite() { angle } else { self.angle };
        let windowed = match self.settings().and_then(ModeSettings::bounds) {
            Some(bounds) => bounds.clamp(angle),
            None => angle,
        };
        self.limits.clamp(windowed)
    }

    /// Move to `angle`, clamped. Returns whether the angle changed.
    pub fn set_angle(&mut self, angle: f32) -> bool {
        let next = self.clamp(angle);
        let changed = next != self.angle;
        self.angle = next;
        changed
    }

    /// Move by `ticks` detents at the active mode's sensitivity
    pub fn rotate(&mut self, ticks: i64) -> bool {
        let sensitivity = self.settings().map(|s| s.sensitivity).unwrap_or(0.0);
        self.set_angle(self.angle + ticks as f32 * sensitivity)
    }

    /// Switch to the next configured mode and pull the angle into its window
    pub fn cycle_mode(&mut self) -> bool {
        self.mode = self.modes.next_after(self.mode);
        self.set_angle(self.angle)
    }
}
