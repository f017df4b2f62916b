//! Module for LZMA GUID-defined sections.
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
use patina_fv_pi::fw_fs::guid;

/// Properties byte, dictionary size and unpacked size.
const LZMA_HEADER_LEN: usize = 13;

pub const LZMA_UNKNOWN_UNPACKED_SIZE_MAGIC_VALUE: u64 = 0xFFFF_FFFF_FFFF_FFFF;

/// Upper bound on the up-front reservation, as a multiple of the compressed length.
const MAX_RESERVE_RATIO: usize = 16;

/// Capacity to reserve before decoding a stream whose header claims `unpacked_size`.
fn reservation_hint(unpacked_size: u64, compressed_len: usize) -> usize {
    if unpacked_size == LZMA_UNKNOWN_UNPACKED_SIZE_MAGIC_VALUE {
        return 0;
    }
    let limit = compressed_len.saturating_mul(MAX_RESERVE_RATIO);
    usize::try_from(unpacked_size).map_or(limit, |size| size.min(limit))
}

/// Provides decompression for LZMA GUIDed sections.
#[derive(Default, Clone, Copy)]
pub struct LzmaSectionExtractor;

impl GuidedSectionDecoder for LzmaSectionExtractor {
    fn decode(&self, section: &SectionRef<'_>) -> Result<DecodedSection, FirmwareFileSystemError> {
        match section.guid_defined() {
            Some(guid_defined) if guid_defined.section_definition_guid == guid::LZMA_SECTION => (),
            _ => return Err(FirmwareFileSystemError::Unsupported),
        }

        let data = section.content();
        if data.len() < LZMA_HEADER_LEN {
            Err(FirmwareFileSystemError::DataCorrupt)?;
        }

        // Get unpacked size to pre-allocate vector, if available
        // See https://github.com/tukaani-project/xz/blob/dd4a1b259936880e04669b43e778828b60619860/doc/lzma-file-format.txt#L131
        let mut unpacked_size = [0u8; 8];
        unpacked_size.copy_from_slice(&data[5..13]);
        let unpacked_size = u64::from_le_bytes(unpacked_size);
        let mut decompressed = Vec::new();
        // The size is only a hint: the header is not trusted until the stream decodes.
        let _ = decompressed.try_reserve_exact(reservation_hint(unpacked_size, data.len()));

        let mut input = data;
        lzma_rs::lzma_decompress(&mut input, &mut decompressed).map_err(|err| {
            log::warn!("LZMA stream in section at offset {:#x} did not decode: {:?}.", section.offset(), err);
            FirmwareFileSystemError::DataCorrupt
        })?;

        Ok(DecodedSection { data: decompressed, authentication_status: 0 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use patina_fv_fs::test_support::{guid_defined_section, leaf_section, section_stream};
    use patina_fv_pi::fw_fs::ffs::section::{guid_defined_attributes, raw_type};

    fn compress(data: &[u8]) -> Vec<u8> {
        let mut compressed = Vec::new();
        lzma_rs::lzma_compress(&mut &data[..], &mut compressed).unwrap();
        compressed
    }

    #[test]
    fn compressed_stream_decodes() {
        let stream = section_stream(&[leaf_section(raw_type::PE32, &[0x4D; 300]), leaf_section(raw_type::RAW, b"tail")]);
        let bytes = guid_defined_section(
            guid::LZMA_SECTION,
            guid_defined_attributes::PROCESSING_REQUIRED,
            &[],
            &compress(&stream),
        );
        let section = SectionRef::new(&bytes, 0).unwrap();
        let decoded = LzmaSectionExtractor.decode(&section).unwrap();
        assert_eq!(decoded.data, stream);
    }

    #[test]
    fn garbage_is_corrupt() {
        let bytes = guid_defined_section(guid::LZMA_SECTION, 0, &[], &[0xE1; 32]);
        let section = SectionRef::new(&bytes, 0).unwrap();
        assert_eq!(LzmaSectionExtractor.decode(&section).unwrap_err(), FirmwareFileSystemError::DataCorrupt);

        let bytes = guid_defined_section(guid::LZMA_SECTION, 0, &[], &[0x5D; 4]);
        let section = SectionRef::new(&bytes, 0).unwrap();
        assert_eq!(LzmaSectionExtractor.decode(&section).unwrap_err(), FirmwareFileSystemError::DataCorrupt);
    }

    #[test]
    fn reservation_is_bounded_by_compressed_length() {
        assert_eq!(reservation_hint(300, 100), 300);
        assert_eq!(reservation_hint(0x1_0000_0000, 100), 100 * MAX_RESERVE_RATIO);
        assert_eq!(reservation_hint(LZMA_UNKNOWN_UNPACKED_SIZE_MAGIC_VALUE - 1, 64), 64 * MAX_RESERVE_RATIO);
        assert_eq!(reservation_hint(LZMA_UNKNOWN_UNPACKED_SIZE_MAGIC_VALUE, 64), 0);
    }

    #[test]
    fn other_guids_are_unsupported() {
        let bytes = guid_defined_section(guid::CRC32_SECTION, 0, &[0; 4], &[]);
        let section = SectionRef::new(&bytes, 0).unwrap();
        assert_eq!(LzmaSectionExtractor.decode(&section).unwrap_err(), FirmwareFileSystemError::Unsupported);
    }
}
