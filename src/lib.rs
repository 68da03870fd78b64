//! # DI-2108 RS
//!
//! A Rust driver for the DATAQ DI-2108-P high speed data acquisition device.
//!
//! The device is reached over a USB bulk link. The host configures per-channel
//! voltage ranges, drives a small ASCII command protocol to start and stop
//! continuous sampling, and decodes the binary sample stream into calibrated
//! voltages.
//!
//! ## Features
//!
//! - **Session state machine**: `initialize`, `start_scan`, `stop_scan`, `reset` and
//!   `shutdown` with explicit state checks and best-effort cleanup
//! - **Range configuration**: five input ranges per channel with derived scale factors
//! - **Command framing**: fixed-width ASCII frames and packed scan list entries
//! - **Sample decoding**: little-endian 16 bit counts to volts, with underrun detection
//! - **`DataFrame` output**: uses `polars` to collect sample batches
//! - **Pluggable transport**: libusb through `rusb`, or any [`UsbTransport`]
//!
//! ## Examples
//!
//! ### Scanning two channels
//!
//! ```rust,no_run
//! use di2108_rs::ScanController;
//!
//! let mut daq = ScanController::connect(2)?;
//! println!("Connected: {}", daq.device_info().unwrap_or("?"));
//!
//! // Channel 1 on the 0-10 V range
//! daq.set_range(1, 3)?;
//!
//! daq.start_scan()?;
//! let sample = daq.read_sample()?;
//! println!("ch0 = {:.3} V, ch1 = {:.3} V", sample.voltages()[0], sample.voltages()[1]);
//! daq.stop_scan()?;
//! daq.shutdown()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ### Decoding without a device
//!
//! ```rust
//! use di2108_rs::{decode_sample, ChannelTable};
//!
//! let mut channels = ChannelTable::new(2)?;
//! channels.set_range(1, 3)?;
//!
//! let sample = decode_sample(&[0x00, 0x40, 0x00, 0x20], &channels)?;
//! assert_eq!(sample.voltages(), &[5.0, 6.25]);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ### Command frames
//!
//! ```rust
//! use di2108_rs::{Command, InputRange};
//!
//! let frame = Command::scan_list(3, InputRange::Bipolar2V5).encode()?;
//! assert_eq!(frame.text(), "slist 3 515");
//! assert_eq!(frame.as_bytes().len(), 50);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod channel_config;
pub mod message_codec;
pub mod range_table;
pub mod sample_decoder;
pub mod scan_controller;
pub mod session_options;
pub mod usb_transport;

// Re-export the main types for convenience
pub use range_table::{resolve, InputRange, InvalidRange, OffsetPolicy, RangeScale};

pub use channel_config::{ChannelConfig, ChannelConfigError, ChannelTable, MAX_CHANNELS};

pub use message_codec::{
    decode_response, encode_command, encode_text, pack_scan_entry, unpack_scan_entry, CodecError,
    Command, CommandFrame, ExchangeError, WriteFailure, FRAME_WIDTH,
};

pub use sample_decoder::{decode_frames, decode_sample, DecodeError, Sample, SampleBatch};

pub use session_options::{OptionsError, SessionOptions};

pub use usb_transport::{
    DeviceId, RusbHandle, RusbTransport, TransportError, UsbHandle, UsbTransport,
};

pub use scan_controller::{ScanController, ScanError, SessionState};
