use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OptionsError {
    #[error("Response buffer capacity must not be zero")]
    EmptyResponseBuffer,

    #[error("Stream buffer holds {capacity} bytes but one sample frame needs {frame_size}")]
    StreamBufferTooSmall { capacity: usize, frame_size: usize },
}

/// Timing and buffer settings of one session.
///
/// Timeouts of `None` block until the device answers and are never the
/// default. A bounded timeout is never shorter than 1 ms on the wire. The delays are device settling times.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// Bound on each command write and its reply read.
    pub command_timeout: Option<Duration>,
    /// Bound on each streaming sample read.
    pub stream_timeout: Option<Duration>,
    /// Pause between writing a command and reading its reply.
    pub response_delay: Duration,
    /// Pause between the last `slist` entry and `start`.
    pub scan_list_settle: Duration,
    pub response_capacity: usize,
    pub stream_capacity: usize,
}

impl SessionOptions {
    pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(1);
    pub const DEFAULT_STREAM_TIMEOUT: Duration = Duration::from_secs(2);
    pub const DEFAULT_RESPONSE_DELAY: Duration = Duration::from_millis(100);
    pub const DEFAULT_SCAN_LIST_SETTLE: Duration = Duration::from_millis(500);
    pub const DEFAULT_RESPONSE_CAPACITY: usize = 64 * 1024;
    pub const DEFAULT_STREAM_CAPACITY: usize = 1024 * 1024;

    pub fn new() -> Self {
        Self {
            command_timeout: Some(Self::DEFAULT_COMMAND_TIMEOUT),
            stream_timeout: Some(Self::DEFAULT_STREAM_TIMEOUT),
            response_delay: Self::DEFAULT_RESPONSE_DELAY,
            scan_list_settle: Self::DEFAULT_SCAN_LIST_SETTLE,
            response_capacity: Self::DEFAULT_RESPONSE_CAPACITY,
            stream_capacity: Self::DEFAULT_STREAM_CAPACITY,
        }
    }

    #[must_use]
    pub fn command_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.command_timeout = timeout;
        self
    }

    #[must_use]
    pub fn stream_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.stream_timeout = timeout;
        self
    }

    #[must_use]
    pub fn response_delay(mut self, delay: Duration) -> Self {
        self.response_delay = delay;
        self
    }

    #[must_use]
    pub fn scan_list_settle(mut self, delay: Duration) -> Self {
        self.scan_list_settle = delay;
        self
    }

    #[must_use]
    pub fn response_capacity(mut self, capacity: usize) -> Self {
        self.response_capacity = capacity;
        self
    }

    #[must_use]
    pub fn stream_capacity(mut self, capacity: usize) -> Self {
        self.stream_capacity = capacity;
        self
    }

    /// No settling delays, for scripted transports and fast devices.
    #[must_use]
    pub fn without_delays(self) -> Self {
        self.response_delay(Duration::ZERO)
            .scan_list_settle(Duration::ZERO)
    }

    pub fn validate(&self, frame_size: usize) -> Result<(), OptionsError> {
        if self.response_capacity == 0 {
            return Err(OptionsError::EmptyResponseBuffer);
        }
        if self.stream_capacity < frame_size {
            return Err(OptionsError::StreamBufferTooSmall {
                capacity: self.stream_capacity,
                frame_size,
            });
        }
        Ok(())
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_bounded() {
        let options = SessionOptions::default();
        assert_eq!(options.command_timeout, Some(Duration::from_secs(1)));
        assert_eq!(options.stream_timeout, Some(Duration::from_secs(2)));
        assert!(options.validate(16).is_ok());
    }

    #[test]
    fn test_builder() {
        let options = SessionOptions::new()
            .command_timeout(None)
            .stream_capacity(8)
            .without_delays();

        assert_eq!(options.command_timeout, None);
        assert_eq!(options.response_delay, Duration::ZERO);
        assert_eq!(options.scan_list_settle, Duration::ZERO);
        assert_eq!(options.stream_capacity, 8);
    }

    #[test]
    fn test_validate() {
        assert_eq!(
            SessionOptions::new().response_capacity(0).validate(2),
            Err(OptionsError::EmptyResponseBuffer)
        );
        assert_eq!(
            SessionOptions::new().stream_capacity(4).validate(6),
            Err(OptionsError::StreamBufferTooSmall {
                capacity: 4,
                frame_size: 6
            })
        );
        assert!(SessionOptions::new().stream_capacity(6).validate(6).is_ok());
    }
}
