//! ASCII command framing for the DI-2108-P.
//!
//! Commands are space-separated tokens terminated by a carriage return and
//! sent in a fixed 50 byte frame. Bytes after the terminator are padding.

use crate::range_table::{InputRange, InvalidRange};
use crate::usb_transport::{TransportError, UsbHandle, ENDPOINT_IN, ENDPOINT_OUT};
use std::fmt;
use std::thread;
use std::time::Duration;

/// Width of every command frame written to the device.
pub const FRAME_WIDTH: usize = 50;

const TERMINATOR: u8 = b'\r';

/// Argument of `ps`; selects the 16 byte packet size.
pub const PACKET_SIZE_ARG: u16 = 0;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("Command '{0}' contains non-ASCII characters")]
    NonAscii(String),

    #[error("Command '{0}' contains a terminator or control character")]
    ControlCharacter(String),

    #[error("Packed scan list value {value:#06x} is invalid: {source}")]
    InvalidPackedValue {
        value: u16,
        #[source]
        source: InvalidRange,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WriteFailure {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("only {written} of {expected} bytes accepted")]
    Short { written: usize, expected: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExchangeError {
    #[error("Writing '{command}' failed: {source}")]
    WriteFailed {
        command: String,
        #[source]
        source: WriteFailure,
    },

    #[error("Reading the reply to '{command}' failed: {source}")]
    ReadFailed {
        command: String,
        #[source]
        source: TransportError,
    },
}

/// The subset of the device protocol the driver speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// `info 0`, liveness and identification.
    Info,
    /// `ps 0`
    PacketSize,
    /// `slist <offset> <packed>`, one scan list entry.
    ScanList { offset: u16, packed: u16 },
    /// `start 0`
    Start,
    /// `stop 0`
    Stop,
}

impl Command {
    /// Scan list entry registering `channel` at its own offset.
    pub fn scan_list(channel: u8, range: InputRange) -> Self {
        Self::ScanList {
            offset: u16::from(channel),
            packed: pack_scan_entry(channel, range),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::PacketSize => "ps",
            Self::ScanList { .. } => "slist",
            Self::Start => "start",
            Self::Stop => "stop",
        }
    }

    pub fn args(self) -> Vec<u16> {
        match self {
            Self::PacketSize => vec![PACKET_SIZE_ARG],
            Self::ScanList { offset, packed } => vec![offset, packed],
            Self::Info | Self::Start | Self::Stop => vec![0],
        }
    }

    pub fn encode(self) -> Result<CommandFrame, CodecError> {
        encode_command(self.name(), &self.args())
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())?;
        for arg in self.args() {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// One fixed-width command frame, zero padded after the terminator.
#[derive(Clone, PartialEq, Eq)]
pub struct CommandFrame {
    bytes: [u8; FRAME_WIDTH],
    text_len: usize,
}

impl CommandFrame {
    pub fn as_bytes(&self) -> &[u8; FRAME_WIDTH] {
        &self.bytes
    }

    /// The command text without terminator or padding.
    pub fn text(&self) -> &str {
        std::str::from_utf8(&self.bytes[..self.text_len]).unwrap_or_default()
    }
}

impl fmt::Debug for CommandFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CommandFrame").field(&self.text()).finish()
    }
}

/// Render `name` and its numeric arguments as one command frame.
pub fn encode_command<A: fmt::Display>(name: &str, args: &[A]) -> Result<CommandFrame, CodecError> {
    let mut text = name.to_string();
    for arg in args {
        text.push(' ');
        text.push_str(&arg.to_string());
    }
    encode_text(&text)
}

/// Frame free-form command text. Text longer than a frame is truncated so the
/// terminator always fits.
pub fn encode_text(text: &str) -> Result<CommandFrame, CodecError> {
    if !text.is_ascii() {
        return Err(CodecError::NonAscii(text.to_string()));
    }
    if text.bytes().any(|b| b.is_ascii_control()) {
        return Err(CodecError::ControlCharacter(text.escape_default().to_string()));
    }

    let mut text_len = text.len();
    if text_len >= FRAME_WIDTH {
        log::warn!("Command '{text}' exceeds {} bytes, truncating", FRAME_WIDTH - 1);
        text_len = FRAME_WIDTH - 1;
    }

    let mut bytes = [0u8; FRAME_WIDTH];
    bytes[..text_len].copy_from_slice(&text.as_bytes()[..text_len]);
    bytes[text_len] = TERMINATOR;

    Ok(CommandFrame { bytes, text_len })
}

/// Text of a reply, up to the first NUL or the end of the received bytes.
pub fn decode_response(raw: &[u8]) -> String {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

/// Whether `reply` starts with the echo of `command`, as the device answers
/// most commands.
pub fn is_echo(reply: &str, command: &str) -> bool {
    reply.trim_start().starts_with(command)
}

/// Channel index in the low byte, range code in the high byte.
pub fn pack_scan_entry(channel: u8, range: InputRange) -> u16 {
    u16::from(channel) + (u16::from(range.code()) << 8)
}

pub fn unpack_scan_entry(value: u16) -> Result<(u8, InputRange), CodecError> {
    let [channel, code] = value.to_le_bytes();
    let range = InputRange::from_code(code)
        .map_err(|source| CodecError::InvalidPackedValue { value, source })?;
    Ok((channel, range))
}

/// Write one frame and, only once the whole frame is accepted, read the reply.
///
/// `delay` is the device settling time between the two transfers. The reply
/// is read into `reply_buffer` and decoded up to the received length.
pub fn send_and_receive<H: UsbHandle>(
    handle: &mut H,
    frame: &CommandFrame,
    reply_buffer: &mut [u8],
    timeout: Option<Duration>,
    delay: Duration,
) -> Result<String, ExchangeError> {
    let command = frame.text();
    log::debug!("Sending '{command}'");

    let written = handle
        .write_bulk(ENDPOINT_OUT, frame.as_bytes(), timeout)
        .map_err(|e| ExchangeError::WriteFailed {
            command: command.to_string(),
            source: e.into(),
        })?;

    if written != FRAME_WIDTH {
        log::error!("Write error: '{command}' was cut short");
        return Err(ExchangeError::WriteFailed {
            command: command.to_string(),
            source: WriteFailure::Short {
                written,
                expected: FRAME_WIDTH,
            },
        });
    }

    if !delay.is_zero() {
        thread::sleep(delay);
    }

    let received = handle
        .read_bulk(ENDPOINT_IN, reply_buffer, timeout)
        .map_err(|source| ExchangeError::ReadFailed {
            command: command.to_string(),
            source,
        })?;

    let reply = decode_response(&reply_buffer[..received.min(reply_buffer.len())]);
    log::debug!("Reply to '{command}' ({received} bytes): {reply:?}");
    Ok(reply)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Handle that answers every transfer from fixed outcomes and counts reads.
    struct FixedHandle {
        write: Result<usize, TransportError>,
        reply: &'static [u8],
        reads: usize,
    }

    impl UsbHandle for FixedHandle {
        fn detach_kernel_driver(&mut self, _interface: u8) -> Result<bool, TransportError> {
            Ok(false)
        }

        fn claim_interface(&mut self, _interface: u8) -> Result<(), TransportError> {
            Ok(())
        }

        fn release_interface(&mut self, _interface: u8) -> Result<(), TransportError> {
            Ok(())
        }

        fn write_bulk(
            &mut self,
            _endpoint: u8,
            _data: &[u8],
            _timeout: Option<Duration>,
        ) -> Result<usize, TransportError> {
            self.write.clone()
        }

        fn read_bulk(
            &mut self,
            _endpoint: u8,
            buffer: &mut [u8],
            _timeout: Option<Duration>,
        ) -> Result<usize, TransportError> {
            self.reads += 1;
            buffer[..self.reply.len()].copy_from_slice(self.reply);
            Ok(self.reply.len())
        }

        fn reset(&mut self) -> Result<(), TransportError> {
            Ok(())
        }
    }

    fn exchange(handle: &mut FixedHandle) -> Result<String, ExchangeError> {
        let frame = Command::Stop.encode().unwrap();
        let mut reply_buffer = [0u8; 64];
        send_and_receive(handle, &frame, &mut reply_buffer, None, Duration::ZERO)
    }

    #[test]
    fn test_exchange_reads_reply() {
        let mut handle = FixedHandle {
            write: Ok(FRAME_WIDTH),
            reply: b"stop 0\r\0",
            reads: 0,
        };
        assert_eq!(exchange(&mut handle), Ok("stop 0\r".to_string()));
        assert_eq!(handle.reads, 1);
    }

    #[test]
    fn test_failed_write_skips_read() {
        let mut handle = FixedHandle {
            write: Err(TransportError::Usb(rusb::Error::Pipe)),
            reply: b"stop 0\r",
            reads: 0,
        };
        assert_eq!(
            exchange(&mut handle),
            Err(ExchangeError::WriteFailed {
                command: "stop 0".to_string(),
                source: WriteFailure::Transport(TransportError::Usb(rusb::Error::Pipe)),
            })
        );
        assert_eq!(handle.reads, 0);
    }

    #[test]
    fn test_short_write_skips_read() {
        let mut handle = FixedHandle {
            write: Ok(10),
            reply: b"stop 0\r",
            reads: 0,
        };
        assert_eq!(
            exchange(&mut handle),
            Err(ExchangeError::WriteFailed {
                command: "stop 0".to_string(),
                source: WriteFailure::Short {
                    written: 10,
                    expected: FRAME_WIDTH
                },
            })
        );
        assert_eq!(handle.reads, 0);
    }

    #[test]
    fn test_encode_start() {
        let frame = Command::Start.encode().unwrap();
        assert_eq!(frame.text(), "start 0");
        assert_eq!(&frame.as_bytes()[..8], b"start 0\r");
        assert!(frame.as_bytes()[8..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_command_text() {
        assert_eq!(Command::Info.to_string(), "info 0");
        assert_eq!(Command::PacketSize.to_string(), "ps 0");
        assert_eq!(Command::Stop.to_string(), "stop 0");
        assert_eq!(
            Command::scan_list(2, InputRange::Unipolar10V).to_string(),
            "slist 2 770"
        );
    }

    #[test]
    fn test_scan_list_frame() {
        let command = Command::scan_list(3, InputRange::Bipolar2V5);
        assert_eq!(
            command,
            Command::ScanList {
                offset: 3,
                packed: 515
            }
        );

        let frame = command.encode().unwrap();
        assert!(frame.text().starts_with("slist 3 515"));
        assert_eq!(frame.as_bytes()[11], b'\r');
    }

    #[test]
    fn test_encode_command_matches_display() {
        for command in [
            Command::Info,
            Command::PacketSize,
            Command::scan_list(7, InputRange::Unipolar5V),
            Command::Start,
            Command::Stop,
        ] {
            assert_eq!(command.encode().unwrap().text(), command.to_string());
        }
    }

    #[test]
    fn test_encode_text_truncates() {
        let long = "x".repeat(80);
        let frame = encode_text(&long).unwrap();
        assert_eq!(frame.text().len(), FRAME_WIDTH - 1);
        assert_eq!(frame.as_bytes()[FRAME_WIDTH - 1], b'\r');
    }

    #[test]
    fn test_encode_text_rejects() {
        assert!(matches!(encode_text("info ü"), Err(CodecError::NonAscii(_))));
        assert!(matches!(
            encode_text("stop 0\rstart 0"),
            Err(CodecError::ControlCharacter(_))
        ));
    }

    #[test]
    fn test_decode_response() {
        assert_eq!(decode_response(b"info 0 DATAQ\r\0garbage"), "info 0 DATAQ\r");
        assert_eq!(decode_response(b"stop 0"), "stop 0");
        assert_eq!(decode_response(b""), "");
        assert_eq!(decode_response(b"\0info"), "");
    }

    #[test]
    fn test_is_echo() {
        assert!(is_echo("info 0 DATAQ\r", "info 0"));
        assert!(!is_echo("stop 0", "start 0"));
    }

    #[test]
    fn test_pack_unpack_all_entries() {
        for channel in 0..=u8::MAX {
            for range in InputRange::ALL {
                let packed = pack_scan_entry(channel, range);
                assert_eq!(
                    u32::from(packed),
                    u32::from(channel) + (u32::from(range.code()) << 8)
                );
                assert_eq!(unpack_scan_entry(packed), Ok((channel, range)));
            }
        }
    }

    #[test]
    fn test_unpack_invalid_range() {
        assert_eq!(
            unpack_scan_entry(0x0501),
            Err(CodecError::InvalidPackedValue {
                value: 0x0501,
                source: InvalidRange(5)
            })
        );
    }
}
