//! Supported camera table and firmware path templating.

use std::path::PathBuf;

use crate::protocol::constants::RICOH_VENDOR_ID;

/// Static per-model loader parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceInfo {
    pub vendor_id: u16,
    pub product_id: u16,
    /// Microcode version the camera reports once the right ucode is enabled.
    pub ucode_version: u16,
    pub hflip: bool,
    pub vflip: bool,
}

impl DeviceInfo {
    const fn ricoh(product_id: u16, ucode_version: u16, flip: bool) -> Self {
        Self {
            vendor_id: RICOH_VENDOR_ID,
            product_id,
            ucode_version,
            hflip: flip,
            vflip: flip,
        }
    }
}

/// All supported (vendor, product) pairs, for bus enumeration.
///
/// 05ca:1812 does not need microcode and is deliberately absent. The two
/// 05ca:1870 variants cannot be told apart yet and are absent too.
pub const SUPPORTED_DEVICES: &[(u16, u16)] = &[
    (RICOH_VENDOR_ID, 0x1803),
    (RICOH_VENDOR_ID, 0x1810),
    (RICOH_VENDOR_ID, 0x1830),
    (RICOH_VENDOR_ID, 0x1832),
    (RICOH_VENDOR_ID, 0x1833),
    (RICOH_VENDOR_ID, 0x1834),
    (RICOH_VENDOR_ID, 0x1835),
    (RICOH_VENDOR_ID, 0x1836),
    (RICOH_VENDOR_ID, 0x1837),
    (RICOH_VENDOR_ID, 0x1839),
    (RICOH_VENDOR_ID, 0x183A),
    (RICOH_VENDOR_ID, 0x183B),
    (RICOH_VENDOR_ID, 0x183E),
    (RICOH_VENDOR_ID, 0x1841),
];

/// Look up loader parameters for a camera.
pub fn lookup(vendor_id: u16, product_id: u16) -> Option<DeviceInfo> {
    if vendor_id != RICOH_VENDOR_ID {
        return None;
    }
    let info = match product_id {
        // Unknown ucode version.
        0x1803 => DeviceInfo::ricoh(product_id, 0xFFFF, false),
        0x1810 => DeviceInfo::ricoh(product_id, 0x0115, false),
        0x1830 | 0x1832 | 0x1833 => DeviceInfo::ricoh(product_id, 0x0100, false),
        0x1834 => DeviceInfo::ricoh(product_id, 0x0111, false),
        0x1835 => DeviceInfo::ricoh(product_id, 0x0107, false),
        0x1836 => DeviceInfo::ricoh(product_id, 0x0115, false),
        // Uses a copy of the 1836 ucode, mounted upside down.
        0x1837 => DeviceInfo::ricoh(product_id, 0x0115, true),
        0x1839 => DeviceInfo::ricoh(product_id, 0x0030, false),
        0x183A => DeviceInfo::ricoh(product_id, 0x0111, false),
        0x183B => DeviceInfo::ricoh(product_id, 0x0131, false),
        0x183E => DeviceInfo::ricoh(product_id, 0x0100, false),
        0x1841 => DeviceInfo::ricoh(product_id, 0x0103, true),
        _ => return None,
    };
    Some(info)
}

/// Substitute `%vid%` and `%pid%` with lowercase 4-digit hex ids.
pub fn expand_template(template: &str, vendor_id: u16, product_id: u16) -> String {
    template
        .replace("%vid%", &format!("{:04x}", vendor_id))
        .replace("%pid%", &format!("{:04x}", product_id))
}

/// Resolve the firmware file for a camera: the primary template first, then
/// the optional fallback. Returns every candidate tried on failure.
pub fn resolve_firmware_path(
    template: &str,
    fallback: Option<&str>,
    vendor_id: u16,
    product_id: u16,
) -> Result<PathBuf, Vec<PathBuf>> {
    let candidates: Vec<PathBuf> = std::iter::once(template)
        .chain(fallback)
        .map(|t| PathBuf::from(expand_template(t, vendor_id, product_id)))
        .collect();

    match candidates.iter().find(|p| p.is_file()) {
        Some(path) => Ok(path.clone()),
        None => Err(candidates),
    }
}
