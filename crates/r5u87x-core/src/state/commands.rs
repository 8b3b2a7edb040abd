//! Vendor commands used by the bring-up sequence.

use std::thread;
use std::time::Duration;

use tracing::{info, warn};

use crate::error::LoaderError;
use crate::protocol::constants::*;
use crate::transport::{TransportError, UsbTransport};

/// Read microcode presence. Anything but a 1-byte reply is a failure.
pub fn ucode_status<T: UsbTransport + ?Sized>(transport: &T) -> Result<bool, LoaderError> {
    let reply = transport
        .control_in(REQ_UCODE_STATUS, 0, 0, 1)
        .map_err(|e| LoaderError::StatusReadFailed(e.to_string()))?;
    if reply.len() != 1 {
        return Err(LoaderError::StatusReadFailed(format!(
            "expected 1 byte, got {}",
            reply.len()
        )));
    }

    let present = reply[0] == UCODE_STATUS_PRESENT;
    info!(
        "Camera reports {} microcode state",
        if present { "positive" } else { "negative" }
    );
    Ok(present)
}

/// Read the loaded microcode version (little-endian).
pub fn ucode_version<T: UsbTransport + ?Sized>(transport: &T) -> Result<u16, LoaderError> {
    let reply = transport
        .control_in(REQ_REG_READ, 0, UCODE_VERSION_INDEX, 2)
        .map_err(|e| LoaderError::VersionReadFailed(e.to_string()))?;
    if reply.len() != 2 {
        return Err(LoaderError::VersionReadFailed(format!(
            "expected 2 bytes, got {}",
            reply.len()
        )));
    }

    let version = u16::from_le_bytes([reply[0], reply[1]]);
    info!(version = %format!("0x{:04x}", version), "Camera reports microcode version");
    Ok(version)
}

/// Clear loaded microcode, then give the camera `settle` before the next command.
pub fn ucode_clear<T: UsbTransport + ?Sized>(
    transport: &T,
    settle: Duration,
) -> Result<(), LoaderError> {
    transport
        .control_out(REQ_UCODE_CLEAR, 0, 0, &[1])
        .map_err(LoaderError::ClearFailed)?;
    if !settle.is_zero() {
        thread::sleep(settle);
    }
    info!("Reset microcode");
    Ok(())
}

/// Enable uploaded microcode.
pub fn ucode_enable<T: UsbTransport + ?Sized>(transport: &T) -> Result<(), LoaderError> {
    let written = transport
        .control_out(REQ_UCODE_ENABLE, 0, 0, &[0])
        .map_err(|e| LoaderError::EnableFailed(e.to_string()))?;
    if written != 1 {
        return Err(LoaderError::EnableFailed(format!(
            "expected 1 byte written, got {}",
            written
        )));
    }
    info!("Enabled microcode");
    Ok(())
}

/// Apply image orientation. Each flag is a separate register write.
pub fn image_flip<T: UsbTransport + ?Sized>(
    transport: &T,
    hflip: bool,
    vflip: bool,
) -> Result<(), TransportError> {
    transport
        .control_out(REQ_REG_WRITE, hflip as u16, REG_HFLIP_EX, &[])
        .inspect_err(|e| warn!(error = %e, "Unable to set hflip to {}", hflip as u8))?;
    transport
        .control_out(REQ_REG_WRITE, vflip as u16, REG_VFLIP_EX, &[])
        .inspect_err(|e| warn!(error = %e, "Unable to set vflip to {}", vflip as u8))?;
    Ok(())
}
