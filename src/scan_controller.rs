use crate::channel_config::{ChannelConfigError, ChannelTable};
use crate::message_codec::{self, CodecError, Command, CommandFrame, ExchangeError};
use crate::sample_decoder::{self, DecodeError, Sample, SampleBatch};
use crate::session_options::{OptionsError, SessionOptions};
use crate::usb_transport::{
    DeviceId, RusbTransport, TransportError, UsbHandle, UsbTransport, ENDPOINT_IN, INTERFACE,
};
use std::fmt;
use std::thread;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Uninitialized,
    Initialized,
    Running,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Initialized => "initialized",
            Self::Running => "running",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScanError {
    #[error("Device unavailable: {0}")]
    TransportUnavailable(#[source] TransportError),

    #[error(transparent)]
    Exchange(#[from] ExchangeError),

    #[error("Reading samples failed: {0}")]
    ReadFailed(#[source] TransportError),

    #[error("Cannot {operation} while the session is {state}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },

    #[error(transparent)]
    Config(#[from] ChannelConfigError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Underrun(#[from] DecodeError),

    #[error(transparent)]
    Options(#[from] OptionsError),

    #[error("Cannot release interface: {0}")]
    ReleaseFailed(#[source] TransportError),

    #[error("Device reset failed: {0}")]
    ResetFailed(#[source] TransportError),
}

/// Session with one DI-2108-P.
///
/// Drives the device through `Uninitialized -> Initialized -> Running` and
/// back. Every operation checks the current state first and answers
/// [`ScanError::InvalidState`] without touching the device when it does not
/// apply. Dropping an open controller stops the scan and releases the device.
pub struct ScanController<T: UsbTransport> {
    transport: T,
    device: DeviceId,
    options: SessionOptions,
    channels: ChannelTable,
    handle: Option<T::Handle>,
    state: SessionState,
    device_info: Option<String>,
    reply_buffer: Vec<u8>,
    stream_buffer: Vec<u8>,
}

impl ScanController<RusbTransport> {
    /// Open the DI-2108-P through libusb and initialize a session.
    pub fn connect(channel_count: usize) -> Result<Self, ScanError> {
        let transport = RusbTransport::new().map_err(ScanError::TransportUnavailable)?;
        let mut controller = Self::new(transport, DeviceId::DI_2108_P, channel_count)?;
        controller.initialize()?;
        Ok(controller)
    }
}

impl<T: UsbTransport> ScanController<T> {
    pub fn new(transport: T, device: DeviceId, channel_count: usize) -> Result<Self, ScanError> {
        Self::with_options(transport, device, channel_count, SessionOptions::default())
    }

    pub fn with_options(
        transport: T,
        device: DeviceId,
        channel_count: usize,
        options: SessionOptions,
    ) -> Result<Self, ScanError> {
        let channels = ChannelTable::new(channel_count)?;
        options.validate(channels.frame_size())?;

        Ok(Self {
            transport,
            device,
            options,
            channels,
            handle: None,
            state: SessionState::Uninitialized,
            device_info: None,
            reply_buffer: Vec::new(),
            stream_buffer: Vec::new(),
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_initialized(&self) -> bool {
        self.state != SessionState::Uninitialized
    }

    pub fn is_running(&self) -> bool {
        self.state == SessionState::Running
    }

    pub fn device(&self) -> DeviceId {
        self.device
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn channels(&self) -> &ChannelTable {
        &self.channels
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Reply to the `info 0` query sent while initializing.
    pub fn device_info(&self) -> Option<&str> {
        self.device_info.as_deref()
    }

    fn require(
        &self,
        operation: &'static str,
        allowed: &[SessionState],
    ) -> Result<(), ScanError> {
        if allowed.contains(&self.state) {
            return Ok(());
        }
        log::warn!("Cannot {operation} while the session is {}", self.state);
        Err(ScanError::InvalidState {
            operation,
            state: self.state,
        })
    }

    /// Replace the channel table with `channel_count` channels on the default range.
    pub fn set_channel_count(&mut self, channel_count: usize) -> Result<(), ScanError> {
        self.require(
            "change the channel count",
            &[SessionState::Uninitialized, SessionState::Initialized],
        )?;
        self.channels.set_channel_count(channel_count)?;
        Ok(())
    }

    /// Set the range code (0-4) of one channel.
    pub fn set_range(&mut self, channel: usize, code: u8) -> Result<(), ScanError> {
        self.require(
            "change a channel range",
            &[SessionState::Uninitialized, SessionState::Initialized],
        )?;
        self.channels.set_range(channel, code)?;
        Ok(())
    }

    /// Open the device, claim its interface and check that it answers `info 0`.
    ///
    /// Any failure leaves the session uninitialized with the device closed.
    pub fn initialize(&mut self) -> Result<(), ScanError> {
        self.require("initialize", &[SessionState::Uninitialized])?;
        let _span = tracing::info_span!("initialize", device = %self.device).entered();

        let mut handle = self
            .transport
            .open(self.device)
            .map_err(ScanError::TransportUnavailable)?;

        match handle.detach_kernel_driver(INTERFACE) {
            Ok(true) => log::info!("Kernel driver detached from interface {INTERFACE}"),
            Ok(false) => {}
            Err(e) => log::warn!("Cannot detach kernel driver: {e}"),
        }

        handle
            .claim_interface(INTERFACE)
            .map_err(ScanError::TransportUnavailable)?;
        log::info!("Claimed interface {INTERFACE}");

        self.handle = Some(handle);
        self.reply_buffer = vec![0; self.options.response_capacity];

        match self.send_command(Command::Info) {
            Ok(info) => {
                let info = info.trim_end().to_string();
                log::info!("Device {} answered: {info}", self.device);
                self.device_info = Some(info);
                self.state = SessionState::Initialized;
                Ok(())
            }
            Err(e) => {
                log::error!("Device did not answer 'info 0': {e}");
                if let Err(release) = self.release_handle() {
                    log::debug!("Release after failed handshake: {release}");
                }
                self.end_session();
                Err(e)
            }
        }
    }

    /// Register every channel in the scan list and start sampling.
    ///
    /// The session only becomes running once `start` went through. A failure
    /// part way leaves it initialized.
    pub fn start_scan(&mut self) -> Result<(), ScanError> {
        self.require("start a scan", &[SessionState::Initialized])?;
        self.options.validate(self.channels.frame_size())?;
        let _span = tracing::info_span!("start_scan", channels = self.channels.len()).entered();

        self.send_command(Command::PacketSize)?;

        // Channel indices fit in a byte, the table never exceeds MAX_CHANNELS.
        let scan_list: Vec<Command> = self
            .channels
            .iter()
            .map(|channel| Command::scan_list(channel.index() as u8, channel.range()))
            .collect();
        for command in scan_list {
            self.send_command(command)?;
        }

        if !self.options.scan_list_settle.is_zero() {
            thread::sleep(self.options.scan_list_settle);
        }

        self.send_command(Command::Start)?;

        self.stream_buffer = vec![0; self.options.stream_capacity];
        self.state = SessionState::Running;
        log::info!("Scanning {} channel(s)", self.channels.len());
        Ok(())
    }

    /// Send `stop`. The session returns to initialized even if the device
    /// does not acknowledge; the failure is still returned.
    pub fn stop_scan(&mut self) -> Result<(), ScanError> {
        self.require("stop a scan", &[SessionState::Running])?;
        self.state = SessionState::Initialized;
        self.stream_buffer = Vec::new();

        match self.send_command(Command::Stop) {
            Ok(_) => {
                log::info!("Scan stopped");
                Ok(())
            }
            Err(e) => {
                log::warn!("Stop command failed: {e}");
                Err(e)
            }
        }
    }

    /// Reset the device. The session ends whatever the outcome.
    pub fn reset(&mut self) -> Result<(), ScanError> {
        self.require(
            "reset",
            &[SessionState::Initialized, SessionState::Running],
        )?;

        let result = self
            .handle
            .as_mut()
            .map_or(Ok(()), |handle| handle.reset().map_err(ScanError::ResetFailed));
        if let Err(e) = &result {
            log::error!("{e}");
        }

        self.handle = None;
        self.end_session();
        result
    }

    /// Stop a running scan, release the interface and close the device.
    ///
    /// Every step runs even if an earlier one failed; the first failure is
    /// returned and the session is closed regardless.
    pub fn shutdown(&mut self) -> Result<(), ScanError> {
        self.require(
            "shut down",
            &[SessionState::Initialized, SessionState::Running],
        )?;
        let _span = tracing::info_span!("shutdown", device = %self.device).entered();

        let mut first_error = None;
        if self.state == SessionState::Running {
            if let Err(e) = self.stop_scan() {
                first_error = Some(e);
            }
        }
        if let Err(e) = self.release_handle() {
            first_error.get_or_insert(e);
        }
        self.end_session();

        first_error.map_or(Ok(()), Err)
    }

    /// Send free-form command text and return the reply.
    pub fn send_message(&mut self, text: &str) -> Result<String, ScanError> {
        self.require(
            "send a message",
            &[SessionState::Initialized, SessionState::Running],
        )?;
        let frame = message_codec::encode_text(text)?;
        self.send_frame(&frame)
    }

    /// One streaming read, decoded into the first sample frame it holds.
    pub fn read_sample(&mut self) -> Result<Sample, ScanError> {
        let received = self.read_stream()?;
        Ok(sample_decoder::decode_sample(
            &self.stream_buffer[..received],
            &self.channels,
        )?)
    }

    /// One streaming read, decoded into every complete sample frame it holds.
    pub fn read_frames(&mut self) -> Result<Vec<Sample>, ScanError> {
        let received = self.read_stream()?;
        Ok(sample_decoder::decode_frames(
            &self.stream_buffer[..received],
            &self.channels,
        )?)
    }

    /// Collect the frames of `reads` consecutive streaming reads.
    pub fn read_batch(&mut self, reads: usize) -> Result<SampleBatch, ScanError> {
        let mut batch = SampleBatch::new(self.channels.len());
        for _ in 0..reads {
            batch.extend(self.read_frames()?);
        }
        log::debug!("Collected {} sample(s) over {reads} read(s)", batch.len());
        Ok(batch)
    }

    fn read_stream(&mut self) -> Result<usize, ScanError> {
        self.require("read samples", &[SessionState::Running])?;
        let handle = self.handle.as_mut().ok_or(ScanError::InvalidState {
            operation: "read samples",
            state: self.state,
        })?;

        let received = handle
            .read_bulk(ENDPOINT_IN, &mut self.stream_buffer, self.options.stream_timeout)
            .map_err(|e| {
                log::error!("Sample read failed: {e}");
                ScanError::ReadFailed(e)
            })?;
        Ok(received.min(self.stream_buffer.len()))
    }

    fn send_command(&mut self, command: Command) -> Result<String, ScanError> {
        let frame = command.encode()?;
        self.send_frame(&frame)
    }

    fn send_frame(&mut self, frame: &CommandFrame) -> Result<String, ScanError> {
        let handle = self.handle.as_mut().ok_or(ScanError::InvalidState {
            operation: "send a command",
            state: self.state,
        })?;

        let reply = message_codec::send_and_receive(
            handle,
            frame,
            &mut self.reply_buffer,
            self.options.command_timeout,
            self.options.response_delay,
        )?;

        if !message_codec::is_echo(&reply, frame.text()) {
            log::debug!("Reply does not echo '{}'", frame.text());
        }
        Ok(reply)
    }

    fn release_handle(&mut self) -> Result<(), ScanError> {
        let Some(mut handle) = self.handle.take() else {
            return Ok(());
        };

        match handle.release_interface(INTERFACE) {
            Ok(()) => {
                log::info!("Released interface {INTERFACE}");
                Ok(())
            }
            Err(e) => {
                log::error!("Cannot release interface: {e}");
                Err(ScanError::ReleaseFailed(e))
            }
        }
    }

    fn end_session(&mut self) {
        self.state = SessionState::Uninitialized;
        self.device_info = None;
        self.reply_buffer = Vec::new();
        self.stream_buffer = Vec::new();
    }
}

impl<T: UsbTransport> Drop for ScanController<T> {
    fn drop(&mut self) {
        if self.is_initialized() {
            if let Err(e) = self.shutdown() {
                log::warn!("Cleanup of {} failed: {e}", self.device);
            }
        }
    }
}
