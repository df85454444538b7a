//! Error types for encoder input

use thiserror::Error;

/// Errors that can occur while setting up or sampling the encoder
#[derive(Debug, Error)]
pub enum InputError {
    /// Event queue created without room for any event
    #[error("event queue capacity must be at least 1")]
    ZeroCapacity,

    /// Detent size outside the supported range
    #[error("steps per detent must be 1, 2 or 4, got {0}")]
    InvalidStepsPerDetent(u8),

    /// Reading an input line failed
    #[error("failed to read {pin} pin: {reason}")]
    PinRead {
        /// Which encoder line failed
        pin: &'static str,
        /// Error reported by the pin driver
        reason: String,
    },
}
