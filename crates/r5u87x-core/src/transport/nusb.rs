//! nusb-based USB transport implementation.

use nusb::transfer::{ControlIn, ControlOut, ControlType, Recipient, TransferError};
use nusb::{Device, MaybeFuture, list_devices};
use tracing::{debug, info, instrument};

use super::traits::{TransportError, UsbTransport};
use crate::device::{self, DeviceInfo};
use crate::protocol::constants::TRANSFER_TIMEOUT;

/// nusb-based USB transport.
pub struct NusbTransport {
    device: Device,
}

impl NusbTransport {
    /// Open the first camera on the bus that has a device table entry.
    #[instrument(level = "info")]
    pub fn open() -> Result<(Self, DeviceInfo), TransportError> {
        let devices = list_devices()
            .wait()
            .map_err(|e| TransportError::OpenFailed(e.to_string()))?;

        for device_info in devices {
            if let Some(info) = device::lookup(device_info.vendor_id(), device_info.product_id()) {
                return Ok((Self::open_device_info(device_info)?, info));
            }
        }

        Err(TransportError::DeviceNotFound)
    }

    fn open_device_info(device_info: nusb::DeviceInfo) -> Result<Self, TransportError> {
        info!(
            vendor_id = %format!("{:04x}", device_info.vendor_id()),
            product_id = %format!("{:04x}", device_info.product_id()),
            "Found camera"
        );

        let device = device_info
            .open()
            .wait()
            .map_err(|e| TransportError::OpenFailed(e.to_string()))?;

        Ok(Self { device })
    }
}

fn map_transfer_error(request: u8, e: TransferError) -> TransportError {
    match e {
        TransferError::Cancelled => TransportError::Timeout {
            timeout_ms: TRANSFER_TIMEOUT.as_millis() as u64,
        },
        TransferError::Disconnected => TransportError::Disconnected,
        other => TransportError::TransferFailed {
            request,
            message: other.to_string(),
        },
    }
}

impl UsbTransport for NusbTransport {
    #[instrument(skip(self), fields(request = %format!("0x{:02X}", request)))]
    fn control_in(
        &self,
        request: u8,
        value: u16,
        index: u16,
        length: u16,
    ) -> Result<Vec<u8>, TransportError> {
        let data = self
            .device
            .control_in(
                ControlIn {
                    control_type: ControlType::Vendor,
                    recipient: Recipient::Device,
                    request,
                    value,
                    index,
                    length,
                },
                TRANSFER_TIMEOUT,
            )
            .wait()
            .map_err(|e| map_transfer_error(request, e))?;

        debug!(bytes_read = data.len(), "Control IN complete");
        Ok(data)
    }

    #[instrument(skip(self, data), fields(request = %format!("0x{:02X}", request), len = data.len()))]
    fn control_out(
        &self,
        request: u8,
        value: u16,
        index: u16,
        data: &[u8],
    ) -> Result<usize, TransportError> {
        self.device
            .control_out(
                ControlOut {
                    control_type: ControlType::Vendor,
                    recipient: Recipient::Device,
                    request,
                    value,
                    index,
                    data,
                },
                TRANSFER_TIMEOUT,
            )
            .wait()
            .map_err(|e| map_transfer_error(request, e))?;

        debug!(bytes_written = data.len(), "Control OUT complete");
        Ok(data.len())
    }
}
