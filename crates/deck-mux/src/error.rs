//! Error types for the multiplexer and controller

use std::path::PathBuf;

use thiserror::Error;

use crate::channel::ChannelId;

/// Failure of a raw bus transaction
///
/// Always treated as transient at run time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    /// Addressed device did not acknowledge
    #[error("no acknowledge from device at {address:#04x}")]
    Nack {
        /// 7-bit device address
        address: u8,
    },

    /// Transaction did not complete in time
    #[error("bus transaction on channel {channel} timed out after {timeout_ms}ms")]
    Timeout {
        /// Channel being selected
        channel: ChannelId,
        /// Configured timeout
        timeout_ms: u64,
    },

    /// A later select re-routed the bus before this job reached it
    #[error("bus was re-routed before the transfer started")]
    Superseded,

    /// Any other bus-level failure
    #[error("bus I/O error: {0}")]
    Io(String),
}

/// Failure reported by a display or servo adapter
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DriverError {
    /// Device used before initialisation
    #[error("{device} is not initialised")]
    NotInitialized {
        /// Device name
        device: &'static str,
    },

    /// Transfer dropped because the bus was re-routed after it was issued
    #[error("{device} transfer dropped: bus was re-routed")]
    Superseded {
        /// Device name
        device: &'static str,
    },

    /// Transfer to the device failed
    #[error("{device} transfer failed: {reason}")]
    Transfer {
        /// Device name
        device: &'static str,
        /// Underlying error
        reason: String,
    },
}

impl DriverError {
    /// Wrap any debuggable driver error as a transfer failure
    pub fn transfer(device: &'static str, reason: impl std::fmt::Debug) -> Self {
        Self::Transfer {
            device,
            reason: format!("{:?}", reason),
        }
    }
}

/// Errors returned by [`MultiplexerManager::with_channel`](crate::MultiplexerManager::with_channel)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MuxError {
    /// The channel-select write failed
    #[error("channel select failed: {0}")]
    Bus(#[from] BusError),

    /// The operation run on the selected channel failed
    #[error("transaction on channel {channel} failed: {source}")]
    Driver {
        /// Channel that was selected
        channel: ChannelId,
        /// Adapter error
        source: DriverError,
    },

    /// The operation run on the selected channel did not finish in time
    #[error("transaction on channel {channel} timed out after {timeout_ms}ms")]
    Timeout {
        /// Channel that was selected
        channel: ChannelId,
        /// Configured timeout
        timeout_ms: u64,
    },
}

impl MuxError {
    /// Whether retrying the same transaction could succeed
    pub fn is_transient(&self) -> bool {
        !matches!(
            self,
            MuxError::Driver {
                source: DriverError::NotInitialized { .. },
                ..
            }
        )
    }

    /// Short error kind for log lines
    pub fn kind(&self) -> &'static str {
        match self {
            MuxError::Bus(BusError::Nack { .. }) => "nack",
            MuxError::Bus(BusError::Timeout { .. }) => "select-timeout",
            MuxError::Bus(BusError::Superseded) => "superseded",
            MuxError::Bus(BusError::Io(_)) => "bus-io",
            MuxError::Driver { .. } => "driver",
            MuxError::Timeout { .. } => "transaction-timeout",
        }
    }
}

/// Fatal startup failures
#[derive(Debug, Error)]
pub enum InitError {
    /// Multiplexer did not answer at its address
    #[error("multiplexer not found at {address:#04x} on {bus}: {source}")]
    MuxNotFound {
        /// Bus device path
        bus: String,
        /// Expected multiplexer address
        address: u8,
        /// Ping failure
        source: BusError,
    },

    /// A device behind the multiplexer could not be initialised
    #[error("{device} not found at {address:#04x} on multiplexer channel {channel}: {source}")]
    DeviceNotFound {
        /// Device name
        device: &'static str,
        /// Expected device address
        address: u8,
        /// Multiplexer channel it should be on
        channel: ChannelId,
        /// Initialisation failure
        source: MuxError,
    },

    /// Opening a bus or GPIO device node failed
    #[error("failed to open {path}: {reason}")]
    Open {
        /// Device node path
        path: String,
        /// Underlying error
        reason: String,
    },

    /// Encoder input setup failed
    #[error("encoder setup failed: {0}")]
    Input(#[from] deck_input::InputError),
}

/// Invalid or unreadable configuration
///
/// Configuration values are never clamped to a guessed default; any invalid
/// field is reported and startup stops.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file exists but could not be read
    #[error("failed to read {}: {source}", path.display())]
    Read {
        /// Config file path
        path: PathBuf,
        /// I/O failure
        source: std::io::Error,
    },

    /// The config file is not valid JSON for the expected schema
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        /// Config file path
        path: PathBuf,
        /// Parse failure
        source: serde_json::Error,
    },

    /// A field has an unusable value
    #[error("invalid {field}: {reason}")]
    Invalid {
        /// Dotted field name
        field: &'static str,
        /// What is wrong with it
        reason: String,
    },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Failure reading or writing the saved position
#[derive(Debug, Error)]
pub enum PersistError {
    /// File I/O failed
    #[error("position file I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// File contents are not a valid position record
    #[error("position file is malformed: {0}")]
    Format(#[from] serde_json::Error),

    /// Stored angle is not a finite number
    #[error("stored angle {0} is not finite")]
    NonFinite(f32),
}
