use crate::range_table::{InputRange, InvalidRange, RangeScale};

/// Channel indices share the low byte of an `slist` entry.
pub const MAX_CHANNELS: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelConfigError {
    #[error("Channel {channel} out of bounds, {channel_count} channel(s) configured")]
    InvalidChannel { channel: usize, channel_count: usize },

    #[error(transparent)]
    InvalidRange(#[from] InvalidRange),

    #[error("Invalid channel count {0}, must be between 1 and 256")]
    InvalidChannelCount(usize),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelConfig {
    index: usize,
    range: InputRange,
    scale: RangeScale,
}

impl ChannelConfig {
    fn new(index: usize) -> Self {
        let range = InputRange::default();
        Self {
            index,
            range,
            scale: range.scale(),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn range(&self) -> InputRange {
        self.range
    }

    /// Scale factors derived from the range, never set directly.
    pub fn scale(&self) -> RangeScale {
        self.scale
    }
}

/// Per-channel range configuration of one session.
///
/// Channels are dense: entry `i` always describes channel `i`. A new table
/// starts every channel on [`InputRange::Bipolar10V`].
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelTable {
    channels: Vec<ChannelConfig>,
}

impl ChannelTable {
    pub fn new(channel_count: usize) -> Result<Self, ChannelConfigError> {
        if channel_count == 0 || channel_count > MAX_CHANNELS {
            return Err(ChannelConfigError::InvalidChannelCount(channel_count));
        }

        Ok(Self {
            channels: (0..channel_count).map(ChannelConfig::new).collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Replace the whole table with `channel_count` default channels.
    pub fn set_channel_count(&mut self, channel_count: usize) -> Result<(), ChannelConfigError> {
        *self = Self::new(channel_count)?;
        log::debug!("Configured {channel_count} channel(s)");
        Ok(())
    }

    /// Set the range of one channel. Rejected requests leave the table untouched.
    pub fn set_range(&mut self, channel: usize, code: u8) -> Result<(), ChannelConfigError> {
        let channel_count = self.len();
        let range = InputRange::from_code(code)?;
        let config = self
            .channels
            .get_mut(channel)
            .ok_or(ChannelConfigError::InvalidChannel {
                channel,
                channel_count,
            })?;

        config.range = range;
        config.scale = range.scale();
        log::debug!("Channel {channel} set to {}", range.as_str());
        Ok(())
    }

    pub fn get(&self, channel: usize) -> Option<&ChannelConfig> {
        self.channels.get(channel)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChannelConfig> {
        self.channels.iter()
    }

    /// Bytes one sample frame occupies on the wire.
    pub fn frame_size(&self) -> usize {
        2 * self.len()
    }
}

impl Default for ChannelTable {
    fn default() -> Self {
        Self {
            channels: vec![ChannelConfig::new(0)],
        }
    }
}
