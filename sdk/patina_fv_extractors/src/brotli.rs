//! Module for Brotli GUID-defined sections.
//!
//! The wrapped data starts with the 64-bit decompressed size and the 64-bit scratch size the encoder recorded,
//! followed by the Brotli stream.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use alloc::{boxed::Box, vec, vec::Vec};
use alloc_no_stdlib::{self, SliceWrapper, SliceWrapperMut, define_index_ops_mut};
use brotli_decompressor::{BrotliDecompressStream, BrotliResult, BrotliState, HuffmanCode};
use patina_fv_fs::{
    FirmwareFileSystemError,
    section::{DecodedSection, GuidedSectionDecoder, SectionRef},
};
use patina_fv_pi::fw_fs::guid;

/// Size of the decompressed and scratch size fields ahead of the stream.
const SIZE_HEADER_LEN: usize = 16;

//Rebox and HeapAllocator exist to satisfy BrotliDecompress custom allocation requirements.
//They essentially wrap Box for heap allocations.
struct Rebox<T>(Box<[T]>);

impl<T> core::default::Default for Rebox<T> {
    fn default() -> Self {
        Rebox(Vec::new().into_boxed_slice())
    }
}
define_index_ops_mut!(T, Rebox<T>);

impl<T> alloc_no_stdlib::SliceWrapper<T> for Rebox<T> {
    fn slice(&self) -> &[T] {
        &self.0
    }
}

impl<T> alloc_no_stdlib::SliceWrapperMut<T> for Rebox<T> {
    fn slice_mut(&mut self) -> &mut [T] {
        &mut self.0
    }
}

struct HeapAllocator<T: Clone> {
    pub default_value: T,
}

impl<T: Clone> alloc_no_stdlib::Allocator<T> for HeapAllocator<T> {
    type AllocatedMemory = Rebox<T>;
    fn alloc_cell(self: &mut HeapAllocator<T>, len: usize) -> Rebox<T> {
        Rebox(vec![self.default_value.clone(); len].into_boxed_slice())
    }
    fn free_cell(self: &mut HeapAllocator<T>, _data: Rebox<T>) {}
}

/// Provides decompression for Brotli GUIDed sections.
#[derive(Default, Clone, Copy)]
pub struct BrotliSectionExtractor;

impl GuidedSectionDecoder for BrotliSectionExtractor {
    fn decode(&self, section: &SectionRef<'_>) -> Result<DecodedSection, FirmwareFileSystemError> {
        match section.guid_defined() {
            Some(guid_defined) if guid_defined.section_definition_guid == guid::BROTLI_SECTION => (),
            _ => return Err(FirmwareFileSystemError::Unsupported),
        }

        let data = section.content();
        if data.len() < SIZE_HEADER_LEN {
            Err(FirmwareFileSystemError::DataCorrupt)?;
        }
        let mut out_size = [0u8; 8];
        out_size.copy_from_slice(&data[0..8]);
        let out_size = usize::try_from(u64::from_le_bytes(out_size)).map_err(|_| FirmwareFileSystemError::DataCorrupt)?;

        let mut out_data = Vec::new();
        out_data.try_reserve_exact(out_size).map_err(|_| FirmwareFileSystemError::OutOfResources)?;
        out_data.resize(out_size, 0u8);

        let mut brotli_state = BrotliState::new(
            HeapAllocator::<u8> { default_value: 0 },
            HeapAllocator::<u32> { default_value: 0 },
            HeapAllocator::<HuffmanCode> { default_value: Default::default() },
        );
        let in_data = &data[SIZE_HEADER_LEN..];
        let mut out_data_size = 0;
        let result = BrotliDecompressStream(
            &mut in_data.len(),
            &mut 0,
            in_data,
            &mut out_data.len(),
            &mut 0,
            out_data.as_mut_slice(),
            &mut out_data_size,
            &mut brotli_state,
        );

        if !matches!(result, BrotliResult::ResultSuccess) || out_data_size != out_size {
            log::warn!("Brotli stream in section at offset {:#x} did not decode.", section.offset());
            Err(FirmwareFileSystemError::DataCorrupt)?;
        }
        Ok(DecodedSection { data: out_data, authentication_status: 0 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use patina_fv_fs::test_support::guid_defined_section;
    use patina_fv_pi::fw_fs::ffs::section::guid_defined_attributes;

    // Window bits 16, then one uncompressed meta-block of 5 bytes, then an empty last meta-block.
    const HELLO_STREAM: [u8; 9] = [0x40, 0x00, 0x10, b'h', b'e', b'l', b'l', b'o', 0x03];

    fn brotli_section(declared_size: u64, stream: &[u8]) -> Vec<u8> {
        let mut wrapped = declared_size.to_le_bytes().to_vec();
        wrapped.extend_from_slice(&0u64.to_le_bytes());
        wrapped.extend_from_slice(stream);
        guid_defined_section(guid::BROTLI_SECTION, guid_defined_attributes::PROCESSING_REQUIRED, &[], &wrapped)
    }

    #[test]
    fn uncompressed_meta_block_decodes() {
        let bytes = brotli_section(5, &HELLO_STREAM);
        let section = SectionRef::new(&bytes, 0).unwrap();
        let decoded = BrotliSectionExtractor.decode(&section).unwrap();
        assert_eq!(decoded.data, b"hello");
        assert_eq!(decoded.authentication_status, 0);
    }

    #[test]
    fn size_mismatch_is_corrupt() {
        let bytes = brotli_section(9, &HELLO_STREAM);
        let section = SectionRef::new(&bytes, 0).unwrap();
        assert_eq!(BrotliSectionExtractor.decode(&section).unwrap_err(), FirmwareFileSystemError::DataCorrupt);
    }

    #[test]
    fn truncated_header_is_corrupt() {
        let bytes = guid_defined_section(guid::BROTLI_SECTION, 0, &[], &[0; 12]);
        let section = SectionRef::new(&bytes, 0).unwrap();
        assert_eq!(BrotliSectionExtractor.decode(&section).unwrap_err(), FirmwareFileSystemError::DataCorrupt);
    }

    #[test]
    fn other_guids_are_unsupported() {
        let bytes = guid_defined_section(guid::LZMA_SECTION, 0, &[], &[0; 16]);
        let section = SectionRef::new(&bytes, 0).unwrap();
        assert_eq!(BrotliSectionExtractor.decode(&section).unwrap_err(), FirmwareFileSystemError::Unsupported);
    }
}
