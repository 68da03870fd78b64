use rusb::UsbContext;
use std::fmt;
use std::time::Duration;

/// Interface carrying the command and sample endpoints.
pub const INTERFACE: u8 = 0;
/// Bulk endpoint for command frames.
pub const ENDPOINT_OUT: u8 = 1 | rusb::constants::LIBUSB_ENDPOINT_OUT;
/// Bulk endpoint for replies and streamed samples.
pub const ENDPOINT_IN: u8 = 1 | rusb::constants::LIBUSB_ENDPOINT_IN;

/// USB identity used to locate a device among all attached devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceId {
    pub vendor_id: u16,
    pub product_id: u16,
}

impl DeviceId {
    /// DATAQ DI-2108-P (`lsusb` shows 0683:2109).
    pub const DI_2108_P: Self = Self::new(0x0683, 0x2109);

    pub const fn new(vendor_id: u16, product_id: u16) -> Self {
        Self {
            vendor_id,
            product_id,
        }
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}:{:04x}", self.vendor_id, self.product_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("USB error: {0}")]
    Usb(#[from] rusb::Error),

    #[error("No device {0} found. Please connect the device")]
    DeviceNotFound(DeviceId),
}

/// Opens device handles. Dropping the transport ends the USB session.
pub trait UsbTransport {
    type Handle: UsbHandle;

    fn open(&mut self, device: DeviceId) -> Result<Self::Handle, TransportError>;
}

/// One opened device. Dropping the handle closes it.
///
/// A timeout of `None` blocks until the transfer completes.
pub trait UsbHandle {
    /// Detach a kernel driver bound to `interface`, returning whether one was active.
    fn detach_kernel_driver(&mut self, interface: u8) -> Result<bool, TransportError>;

    fn claim_interface(&mut self, interface: u8) -> Result<(), TransportError>;

    fn release_interface(&mut self, interface: u8) -> Result<(), TransportError>;

    /// Returns the number of bytes the device accepted.
    fn write_bulk(
        &mut self,
        endpoint: u8,
        data: &[u8],
        timeout: Option<Duration>,
    ) -> Result<usize, TransportError>;

    /// Returns the number of bytes placed at the start of `buffer`.
    fn read_bulk(
        &mut self,
        endpoint: u8,
        buffer: &mut [u8],
        timeout: Option<Duration>,
    ) -> Result<usize, TransportError>;

    fn reset(&mut self) -> Result<(), TransportError>;
}

/// libusb treats a zero timeout as unlimited and counts in whole milliseconds,
/// so a bounded timeout is never passed below 1 ms.
const MIN_LIBUSB_TIMEOUT: Duration = Duration::from_millis(1);

fn libusb_timeout(timeout: Option<Duration>) -> Duration {
    timeout.map_or(Duration::ZERO, |timeout| timeout.max(MIN_LIBUSB_TIMEOUT))
}

/// [`UsbTransport`] backed by a private libusb context.
pub struct RusbTransport {
    context: rusb::Context,
}

impl RusbTransport {
    pub fn new() -> Result<Self, TransportError> {
        Self::with_log_level(rusb::LogLevel::Warning)
    }

    /// Create a context with libusb's own diagnostics at `level`.
    pub fn with_log_level(level: rusb::LogLevel) -> Result<Self, TransportError> {
        let mut context = rusb::Context::new()?;
        context.set_log_level(level);
        Ok(Self { context })
    }
}

impl UsbTransport for RusbTransport {
    type Handle = RusbHandle;

    fn open(&mut self, device: DeviceId) -> Result<RusbHandle, TransportError> {
        let devices = self.context.devices()?;
        log::debug!("{} USB devices in list", devices.len());

        let handle = self
            .context
            .open_device_with_vid_pid(device.vendor_id, device.product_id)
            .ok_or(TransportError::DeviceNotFound(device))?;
        log::info!("Opened device {device}");

        Ok(RusbHandle { handle })
    }
}

pub struct RusbHandle {
    handle: rusb::DeviceHandle<rusb::Context>,
}

impl UsbHandle for RusbHandle {
    fn detach_kernel_driver(&mut self, interface: u8) -> Result<bool, TransportError> {
        match self.handle.kernel_driver_active(interface) {
            Ok(true) => {
                log::debug!("Kernel driver active on interface {interface}");
                self.handle.detach_kernel_driver(interface)?;
                log::debug!("Kernel driver detached");
                Ok(true)
            }
            Ok(false) | Err(rusb::Error::NotSupported) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn claim_interface(&mut self, interface: u8) -> Result<(), TransportError> {
        self.handle.claim_interface(interface)?;
        Ok(())
    }

    fn release_interface(&mut self, interface: u8) -> Result<(), TransportError> {
        self.handle.release_interface(interface)?;
        Ok(())
    }

    fn write_bulk(
        &mut self,
        endpoint: u8,
        data: &[u8],
        timeout: Option<Duration>,
    ) -> Result<usize, TransportError> {
        Ok(self
            .handle
            .write_bulk(endpoint, data, libusb_timeout(timeout))?)
    }

    fn read_bulk(
        &mut self,
        endpoint: u8,
        buffer: &mut [u8],
        timeout: Option<Duration>,
    ) -> Result<usize, TransportError> {
        Ok(self
            .handle
            .read_bulk(endpoint, buffer, libusb_timeout(timeout))?)
    }

    fn reset(&mut self) -> Result<(), TransportError> {
        self.handle.reset()?;
        Ok(())
    }
}
