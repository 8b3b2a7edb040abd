//! USB Transport layer abstraction.
//!
//! Defines the `UsbTransport` trait for vendor control transfers,
//! allowing different implementations (nusb, mock, etc.).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("No supported camera found")]
    DeviceNotFound,

    #[error("Failed to open device: {0}")]
    OpenFailed(String),

    #[error("Control transfer 0x{request:02X} failed: {message}")]
    TransferFailed { request: u8, message: String },

    #[error("Device disconnected")]
    Disconnected,

    #[error("Timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

/// Abstract USB transport interface.
///
/// Every request is a vendor-type, device-recipient control transfer.
/// There is no retry at this layer; a failed or timed-out transfer is
/// reported as-is.
pub trait UsbTransport: Send + Sync {
    /// Device-to-host transfer of up to `length` bytes.
    fn control_in(
        &self,
        request: u8,
        value: u16,
        index: u16,
        length: u16,
    ) -> Result<Vec<u8>, TransportError>;

    /// Host-to-device transfer. Returns the number of bytes accepted.
    fn control_out(
        &self,
        request: u8,
        value: u16,
        index: u16,
        data: &[u8],
    ) -> Result<usize, TransportError>;
}
