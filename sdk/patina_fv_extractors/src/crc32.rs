//! Module for CRC32 GUID-defined sections.
//!
//! The section carries a 4-byte CRC32 of the wrapped data in its GUID specific header. The wrapped data is returned
//! as is; the check only influences the authentication status.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use alloc::vec::Vec;

use patina_fv_fs::{
    FirmwareFileSystemError,
    section::{DecodedSection, GuidedSectionDecoder, SectionRef},
};
use patina_fv_pi::{
    auth,
    fw_fs::{ffs::section::guid_defined_attributes, guid},
};

/// Provides extraction for CRC32 sections.
#[derive(Default, Clone, Copy)]
pub struct Crc32SectionExtractor;

impl GuidedSectionDecoder for Crc32SectionExtractor {
    fn decode(&self, section: &SectionRef<'_>) -> Result<DecodedSection, FirmwareFileSystemError> {
        let Some(guid_defined) = section.guid_defined() else {
            return Err(FirmwareFileSystemError::Unsupported);
        };
        if guid_defined.section_definition_guid != guid::CRC32_SECTION {
            return Err(FirmwareFileSystemError::Unsupported);
        }

        let crc_header = section.guid_specific_header();
        if crc_header.len() < 4 {
            Err(FirmwareFileSystemError::DataCorrupt)?;
        }
        let content = section.content();

        let authentication_status = if guid_defined.attributes & guid_defined_attributes::AUTH_STATUS_VALID != 0 {
            let expected = u32::from_le_bytes([crc_header[0], crc_header[1], crc_header[2], crc_header[3]]);
            if expected == crc32fast::hash(content) {
                auth::IMAGE_SIGNED
            } else {
                log::warn!("CRC32 mismatch in section at offset {:#x}.", section.offset());
                auth::IMAGE_SIGNED | auth::TEST_FAILED
            }
        } else {
            auth::NOT_TESTED
        };

        let mut data = Vec::new();
        data.try_reserve_exact(content.len()).map_err(|_| FirmwareFileSystemError::OutOfResources)?;
        data.extend_from_slice(content);
        Ok(DecodedSection { data, authentication_status })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use patina_fv_fs::test_support::{guid_defined_section, leaf_section};
    use patina_fv_pi::fw_fs::ffs::section::raw_type;

    fn crc_section(attributes: u16, corrupt: bool) -> Vec<u8> {
        let wrapped = leaf_section(raw_type::RAW, b"protected payload");
        let mut crc = crc32fast::hash(&wrapped);
        if corrupt {
            crc ^= 1;
        }
        guid_defined_section(guid::CRC32_SECTION, attributes, &crc.to_le_bytes(), &wrapped)
    }

    #[test]
    fn matching_crc_is_signed() {
        let bytes = crc_section(guid_defined_attributes::AUTH_STATUS_VALID, false);
        let section = SectionRef::new(&bytes, 0).unwrap();
        let decoded = Crc32SectionExtractor.decode(&section).unwrap();
        assert_eq!(decoded.data, section.content());
        assert_eq!(decoded.authentication_status, auth::IMAGE_SIGNED);
    }

    #[test]
    fn mismatching_crc_still_returns_data() {
        let bytes = crc_section(guid_defined_attributes::AUTH_STATUS_VALID, true);
        let section = SectionRef::new(&bytes, 0).unwrap();
        let decoded = Crc32SectionExtractor.decode(&section).unwrap();
        assert_eq!(decoded.data, section.content());
        assert_eq!(decoded.authentication_status, auth::IMAGE_SIGNED | auth::TEST_FAILED);
    }

    #[test]
    fn unchecked_crc_is_not_tested() {
        let bytes = crc_section(0, true);
        let section = SectionRef::new(&bytes, 0).unwrap();
        assert_eq!(Crc32SectionExtractor.decode(&section).unwrap().authentication_status, auth::NOT_TESTED);
    }

    #[test]
    fn other_sections_are_unsupported() {
        let bytes = guid_defined_section(guid::BROTLI_SECTION, 0, &[0; 4], &[]);
        let section = SectionRef::new(&bytes, 0).unwrap();
        assert_eq!(Crc32SectionExtractor.decode(&section).unwrap_err(), FirmwareFileSystemError::Unsupported);

        let bytes = leaf_section(raw_type::RAW, b"leaf");
        let section = SectionRef::new(&bytes, 0).unwrap();
        assert_eq!(Crc32SectionExtractor.decode(&section).unwrap_err(), FirmwareFileSystemError::Unsupported);
    }

    #[test]
    fn missing_crc_header_is_corrupt() {
        let bytes = guid_defined_section(guid::CRC32_SECTION, 0, &[0; 2], &[]);
        let section = SectionRef::new(&bytes, 0).unwrap();
        assert_eq!(Crc32SectionExtractor.decode(&section).unwrap_err(), FirmwareFileSystemError::DataCorrupt);
    }
}
