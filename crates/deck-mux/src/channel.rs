//! Multiplexer channel identifiers

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Number of downstream channels on a TCA9548A-style multiplexer
pub const MUX_CHANNELS: u8 = 8;

/// A downstream channel of the I2C multiplexer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct ChannelId(u8);

impl ChannelId {
    /// Create a channel id, rejecting channels the multiplexer does not have
    pub fn new(index: u8) -> Result<Self, ConfigError> {
        if index >= MUX_CHANNELS {
            return Err(ConfigError::invalid(
                "channel",
                format!("{} is out of range 0..{}", index, MUX_CHANNELS),
            ));
        }
        Ok(Self(index))
    }

    /// For compile-time defaults known to be below [`MUX_CHANNELS`]
    pub(crate) const fn new_unchecked(index: u8) -> Self {
        Self(index % MUX_CHANNELS)
    }

    /// Channel index
    pub fn index(&self) -> u8 {
        self.0
    }

    /// Value written to the control register to enable only this channel
    pub fn select_mask(&self) -> u8 {
        1 << self.0
    }
}

impl TryFrom<u8> for ChannelId {
    type Error = ConfigError;

    fn try_from(index: u8) -> Result<Self, Self::Error> {
        Self::new(index)
    }
}

impl From<ChannelId> for u8 {
    fn from(channel: ChannelId) -> Self {
        channel.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_mask() {
        assert_eq!(ChannelId::new(0).unwrap().select_mask(), 0b0000_0001);
        assert_eq!(ChannelId::new(1).unwrap().select_mask(), 0b0000_0010);
        assert_eq!(ChannelId::new(7).unwrap().select_mask(), 0b1000_0000);
    }

    #[test]
    fn test_out_of_range() {
        assert!(ChannelId::new(8).is_err());
    }

    #[test]
    fn test_deserialize_rejects_bad_channel() {
        assert_eq!(
            serde_json::from_str::<ChannelId>("3").unwrap(),
            ChannelId::new(3).unwrap()
        );
        assert!(serde_json::from_str::<ChannelId>("9").is_err());
    }
}
