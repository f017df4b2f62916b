//! Builders for synthetic volumes, files and sections, shared with the tests of dependent crates.
//!
//! Everything here produces well formed images with correct checksums; tests corrupt the bytes afterwards when they
//! need a broken image.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
extern crate std;

use alloc::{vec, vec::Vec};
use std::println;

use log::{Level, LevelFilter, Metadata, Record};
use patina_fv_pi::fw_fs::{
    ffs::{self, attributes, section},
    fv,
    fvb::attributes::raw::fvb2,
    guid,
};
use r_efi::efi;

use crate::codec::{FileState, sum8, sum16};

// Sample logger for log crate to dump stuff in tests
struct SimpleLogger;
impl log::Log for SimpleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= Level::Info
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            println!("{}", record.args());
        }
    }

    fn flush(&self) {}
}
static LOGGER: SimpleLogger = SimpleLogger;

pub fn set_logger() {
    let _ = log::set_logger(&LOGGER).map(|()| log::set_max_level(LevelFilter::Info));
}

/// A section with a 24-bit size header.
pub fn leaf_section(section_type: u8, payload: &[u8]) -> Vec<u8> {
    let size = (mem_size::<section::Header>() + payload.len()) as u32;
    let mut bytes = size.to_le_bytes()[..3].to_vec();
    bytes.push(section_type);
    bytes.extend_from_slice(payload);
    bytes
}

/// A section with the `0xFFFFFF` marker and a 32-bit size.
pub fn extended_leaf_section(section_type: u8, payload: &[u8]) -> Vec<u8> {
    let size = (mem_size::<section::header::CommonSectionHeaderExtended>() + payload.len()) as u32;
    let mut bytes = section::EXTENDED_SIZE_MARKER.to_vec();
    bytes.push(section_type);
    bytes.extend_from_slice(&size.to_le_bytes());
    bytes.extend_from_slice(payload);
    bytes
}

/// A GUID-defined section; `guid_header` lands between the fixed header and `wrapped`.
pub fn guid_defined_section(definition: efi::Guid, attributes: u16, guid_header: &[u8], wrapped: &[u8]) -> Vec<u8> {
    let data_offset = mem_size::<section::Header>() + mem_size::<section::header::GuidDefined>() + guid_header.len();
    let mut payload = definition.as_bytes().to_vec();
    payload.extend_from_slice(&(data_offset as u16).to_le_bytes());
    payload.extend_from_slice(&attributes.to_le_bytes());
    payload.extend_from_slice(guid_header);
    payload.extend_from_slice(wrapped);
    leaf_section(section::raw_type::encapsulated::GUID_DEFINED, &payload)
}

/// A compression section carrying `payload` as is.
pub fn compression_section(compression_type: u8, uncompressed_length: u32, payload: &[u8]) -> Vec<u8> {
    let mut bytes = uncompressed_length.to_le_bytes().to_vec();
    bytes.push(compression_type);
    bytes.extend_from_slice(payload);
    leaf_section(section::raw_type::encapsulated::COMPRESSION, &bytes)
}

/// Concatenates sections, padding each one to the section alignment.
pub fn section_stream(sections: &[Vec<u8>]) -> Vec<u8> {
    let mut stream = Vec::new();
    for section in sections {
        while stream.len() % ffs::SECTION_ALIGNMENT != 0 {
            stream.push(0);
        }
        stream.extend_from_slice(section);
    }
    stream
}

fn mem_size<T>() -> usize {
    core::mem::size_of::<T>()
}

/// Builds one FFS file.
#[derive(Debug, Clone)]
pub struct FileBuilder {
    name: efi::Guid,
    file_type: u8,
    attributes: u8,
    state: FileState,
    data_checksum: bool,
    large: bool,
    sections: Vec<Vec<u8>>,
}

impl FileBuilder {
    pub fn new(name: efi::Guid, file_type: u8) -> Self {
        Self {
            name,
            file_type,
            attributes: 0,
            state: FileState::Valid,
            data_checksum: false,
            large: false,
            sections: Vec::new(),
        }
    }

    pub fn section(mut self, section: Vec<u8>) -> Self {
        self.sections.push(section);
        self
    }

    /// Extra attribute bits; `LARGE_FILE` and `CHECKSUM` are driven by [`Self::large`] and
    /// [`Self::data_checksum`].
    pub fn attributes(mut self, attributes: u8) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn state(mut self, state: FileState) -> Self {
        self.state = state;
        self
    }

    /// Store a real data checksum instead of the fixed value.
    pub fn data_checksum(mut self, data_checksum: bool) -> Self {
        self.data_checksum = data_checksum;
        self
    }

    /// Use the 64-bit size header.
    pub fn large(mut self, large: bool) -> Self {
        self.large = large;
        self
    }

    pub fn build(&self, erase_polarity: bool) -> Vec<u8> {
        let content = section_stream(&self.sections);
        let header_len =
            if self.large { mem_size::<ffs::file::Header2>() } else { mem_size::<ffs::file::Header>() };
        let size = header_len + content.len();

        let mut file_attributes = self.attributes & !(attributes::raw::LARGE_FILE | attributes::raw::CHECKSUM);
        if self.large {
            file_attributes |= attributes::raw::LARGE_FILE;
        }
        if self.data_checksum {
            file_attributes |= attributes::raw::CHECKSUM;
        }

        let mut bytes = self.name.as_bytes().to_vec();
        bytes.push(0);
        bytes.push(if self.data_checksum { 0u8.wrapping_sub(sum8(&content)) } else { ffs::FIXED_CHECKSUM });
        bytes.push(self.file_type);
        bytes.push(file_attributes);
        if self.large {
            bytes.extend_from_slice(&[0, 0, 0]);
        } else {
            bytes.extend_from_slice(&(size as u32).to_le_bytes()[..3]);
        }
        bytes.push(self.state.to_state_byte(erase_polarity));
        if self.large {
            bytes.extend_from_slice(&(size as u64).to_le_bytes());
        }

        let state = bytes[ffs::file::STATE_OFFSET];
        let file_checksum = bytes[ffs::file::INTEGRITY_CHECK_FILE_OFFSET];
        let header_sum = sum8(&bytes).wrapping_sub(state).wrapping_sub(file_checksum);
        bytes[16] = 0u8.wrapping_sub(header_sum);

        bytes.extend_from_slice(&content);
        bytes
    }
}

/// Builds a firmware volume with one block map entry.
#[derive(Debug, Clone)]
pub struct VolumeBuilder {
    file_system: efi::Guid,
    erase_polarity: bool,
    attributes: u32,
    name: Option<efi::Guid>,
    files: Vec<FileBuilder>,
    free_space: usize,
}

impl Default for VolumeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl VolumeBuilder {
    /// An FFS2 volume with erase polarity 1.
    pub fn new() -> Self {
        Self {
            file_system: guid::FIRMWARE_FILE_SYSTEM2,
            erase_polarity: true,
            attributes: 0,
            name: None,
            files: Vec::new(),
            free_space: 64,
        }
    }

    pub fn file_system(mut self, file_system: efi::Guid) -> Self {
        self.file_system = file_system;
        self
    }

    pub fn erase_polarity(mut self, erase_polarity: bool) -> Self {
        self.erase_polarity = erase_polarity;
        self
    }

    /// `EFI_FVB_ATTRIBUTES_2`; the erase polarity bit is driven by [`Self::erase_polarity`].
    pub fn attributes(mut self, attributes: u32) -> Self {
        self.attributes = attributes;
        self
    }

    /// Adds an extended header naming the volume.
    pub fn name(mut self, name: efi::Guid) -> Self {
        self.name = Some(name);
        self
    }

    pub fn file(mut self, file: FileBuilder) -> Self {
        self.files.push(file);
        self
    }

    /// Erased bytes left after the last file.
    pub fn free_space(mut self, free_space: usize) -> Self {
        self.free_space = free_space;
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let erase_byte = if self.erase_polarity { 0xFF } else { 0x00 };
        let header_length = mem_size::<fv::Header>() + 2 * mem_size::<fv::BlockMapEntry>();

        let mut fv = vec![0u8; header_length];
        if let Some(name) = self.name {
            fv[52..54].copy_from_slice(&(header_length as u16).to_le_bytes());
            fv.extend_from_slice(name.as_bytes());
            fv.extend_from_slice(&(mem_size::<fv::ExtHeader>() as u32).to_le_bytes());
        }

        for file in &self.files {
            while fv.len() % ffs::FILE_ALIGNMENT != 0 {
                fv.push(erase_byte);
            }
            fv.extend_from_slice(&file.build(self.erase_polarity));
        }
        while fv.len() % ffs::FILE_ALIGNMENT != 0 {
            fv.push(erase_byte);
        }
        fv.resize(fv.len() + self.free_space, erase_byte);

        let mut attributes = self.attributes & !fvb2::ERASE_POLARITY;
        if self.erase_polarity {
            attributes |= fvb2::ERASE_POLARITY;
        }
        let fv_length = fv.len();
        fv[16..32].copy_from_slice(self.file_system.as_bytes());
        fv[32..40].copy_from_slice(&(fv_length as u64).to_le_bytes());
        fv[40..44].copy_from_slice(&fv::SIGNATURE.to_le_bytes());
        fv[44..48].copy_from_slice(&attributes.to_le_bytes());
        fv[48..50].copy_from_slice(&(header_length as u16).to_le_bytes());
        fv[55] = fv::FFS_REVISION;
        // one block covering the volume, then the terminator.
        fv[56..60].copy_from_slice(&1u32.to_le_bytes());
        fv[60..64].copy_from_slice(&(fv_length as u32).to_le_bytes());

        let checksum = sum16(&fv[..header_length]).map(|sum| 0u16.wrapping_sub(sum)).unwrap_or_default();
        fv[50..52].copy_from_slice(&checksum.to_le_bytes());
        fv
    }
}
