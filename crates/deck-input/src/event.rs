//! Encoder events handed from the sampling task to the controller

/// Direction of a detected rotation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Clockwise
    Clockwise,
    /// Counter-clockwise
    CounterClockwise,
}

impl Direction {
    /// Sign applied to angle deltas (+1 for clockwise)
    pub fn sign(&self) -> f32 {
        match self {
            Self::Clockwise => 1.0,
            Self::CounterClockwise => -1.0,
        }
    }
}

/// A discrete input event decoded from the rotary encoder
///
/// Events are immutable once created and are consumed exactly once by the
/// controller, in the order they were detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderEvent {
    /// Clockwise rotation by the given number of detents
    RotateCw(u32),
    /// Counter-clockwise rotation by the given number of detents
    RotateCcw(u32),
    /// Single short press
    SingleClick,
    /// Two short presses within the double-click window
    DoubleClick,
    /// Button held past the long-press threshold
    LongPress,
}

impl EncoderEvent {
    /// Build a rotation event from a direction and tick count
    pub fn rotation(direction: Direction, ticks: u32) -> Self {
        match direction {
            Direction::Clockwise => Self::RotateCw(ticks),
            Direction::CounterClockwise => Self::RotateCcw(ticks),
        }
    }

    /// Signed tick count for rotation events, `None` for button events
    pub fn signed_ticks(&self) -> Option<i64> {
        match self {
            Self::RotateCw(t) => Some(i64::from(*t)),
            Self::RotateCcw(t) => Some(-i64::from(*t)),
            _ => None,
        }
    }

    /// Check if this is a button gesture
    pub fn is_button(&self) -> bool {
        matches!(
            self,
            Self::SingleClick | Self::DoubleClick | Self::LongPress
        )
    }

    /// Short name for logging
    pub fn name(&self) -> &'static str {
        match self {
            Self::RotateCw(_) => "rotate-cw",
            Self::RotateCcw(_) => "rotate-ccw",
            Self::SingleClick => "single-click",
            Self::DoubleClick => "double-click",
            Self::LongPress => "long-press",
        }
    }
}
