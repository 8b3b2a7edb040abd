//! Protocol constants for the Ricoh R5U87x microcode interface.
//!
//! All requests are vendor-type, device-recipient control transfers.

use std::time::Duration;

// ============================================================================
// Device Identification
// ============================================================================

/// Ricoh Company Vendor ID
pub const RICOH_VENDOR_ID: u16 = 0x05CA;

// ============================================================================
// Vendor Requests
// ============================================================================

/// Write a microcode chunk to device memory (OUT, value = target address).
pub const REQ_UCODE_WRITE: u8 = 0xA0;

/// Enable the uploaded microcode (OUT, 1 byte).
pub const REQ_UCODE_ENABLE: u8 = 0xA1;

/// Write a sensor register (OUT, value = register value, index = register).
pub const REQ_REG_WRITE: u8 = 0xC2;

/// Read a sensor register block (IN, index = sub-index).
pub const REQ_REG_READ: u8 = 0xC3;

/// Read microcode presence (IN, 1 byte).
pub const REQ_UCODE_STATUS: u8 = 0xA4;

/// Clear loaded microcode (OUT, 1 byte).
pub const REQ_UCODE_CLEAR: u8 = 0xA6;

/// Sub-index of the microcode version within `REQ_REG_READ`.
pub const UCODE_VERSION_INDEX: u16 = 0x0E;

/// Extended vertical flip register.
pub const REG_VFLIP_EX: u16 = 0x30;

/// Extended horizontal flip register.
pub const REG_HFLIP_EX: u16 = 0x31;

// ============================================================================
// Status / Version Values
// ============================================================================

/// Status byte reported when microcode is loaded.
pub const UCODE_STATUS_PRESENT: u8 = 1;

/// Version reported by WDM-class cameras regardless of what is loaded.
pub const WDM_VERSION_SENTINEL: u16 = 0x0001;

// ============================================================================
// Framing
// ============================================================================

/// Firmware file chunk header: length (1) + address (2).
pub const CHUNK_HEADER_SIZE: usize = 3;

// ============================================================================
// Timing
// ============================================================================

/// Per control transfer timeout.
pub const TRANSFER_TIMEOUT: Duration = Duration::from_millis(1000);

/// Settle time after a successful clear.
pub const CLEAR_SETTLE_TIME: Duration = Duration::from_millis(200);
