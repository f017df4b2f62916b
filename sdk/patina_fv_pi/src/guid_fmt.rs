//! Display adapter for [`efi::Guid`] in registry format.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use core::fmt;

use r_efi::efi;

/// Formats a GUID as `XXXXXXXX-XXXX-XXXX-XXXX-XXXXXXXXXXXX` for log output.
///
/// ```
/// use patina_fv_pi::GuidFmt;
/// use r_efi::efi;
///
/// let guid = efi::Guid::from_fields(0x8C8CE578, 0x8A3D, 0x4F1C, 0x99, 0x35, &[0x89, 0x61, 0x85, 0xC3, 0x2D, 0xD3]);
/// assert_eq!(format!("{}", GuidFmt(&guid)), "8C8CE578-8A3D-4F1C-9935-896185C32DD3");
/// ```
#[derive(Clone, Copy)]
pub struct GuidFmt<'a>(pub &'a efi::Guid);

impl fmt::Display for GuidFmt<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (time_low, time_mid, time_hi, clk_hi, clk_low, node) = self.0.as_fields();
        write!(f, "{time_low:08X}-{time_mid:04X}-{time_hi:04X}-{clk_hi:02X}{clk_low:02X}-")?;
        for byte in node {
            write!(f, "{byte:02X}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for GuidFmt<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn guid_fmt_matches_uuid_rendering() {
        let guid = efi::Guid::from_fields(0x1B45CC0A, 0x156A, 0x428A, 0xAF, 0x62, &[0x49, 0x86, 0x4D, 0xA0, 0xE6, 0xE6]);
        let uuid = Uuid::from_bytes_le(*guid.as_bytes());
        assert_eq!(format!("{}", GuidFmt(&guid)), uuid.to_string().to_uppercase());
    }
}
