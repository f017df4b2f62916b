//! Firmware Volume (FV) header validation.
//!
//! [`VolumeRef`] is a zero-copy, read-only view over a firmware volume. Creating one validates the header: the
//! signature, the 16-bit header checksum, the declared lengths, the optional extended header and the block map, and
//! it never reads past the declared volume length. The result is summarized in a [`VolumeLayout`], which is all the
//! file directory scanner needs to walk the volume later without revalidating it.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use alloc::vec::Vec;
use core::{fmt, mem, ptr};

use patina_fv_pi::fw_fs::{
    ffs,
    fv::{self, BlockMapEntry},
    fvb::attributes::{self as fvb_attributes, raw::fvb2},
    guid,
};
use r_efi::efi;

use crate::{
    FirmwareFileSystemError,
    codec::{align_up, sum16},
    file::{FileFilter, FileScanner},
};

/// What the scanner needs to know about a validated volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeLayout {
    /// Declared length of the volume (`FvLength`).
    pub length: usize,
    /// Offset of the first file, 8-byte aligned.
    pub content_offset: usize,
    /// Erased bits read as 1.
    pub erase_polarity: bool,
    /// The file system allows `EFI_FFS_FILE_HEADER2` files.
    pub large_file_support: bool,
    /// `EFI_FVB_ATTRIBUTES_2` of the volume.
    pub attributes: u32,
    /// File system GUID from the header.
    pub file_system: efi::Guid,
    /// Volume name from the extended header.
    pub name: Option<efi::Guid>,
}

impl VolumeLayout {
    /// The byte used for erased flash in this volume.
    pub fn erase_byte(&self) -> u8 {
        if self.erase_polarity { 0xFF } else { 0x00 }
    }
}

/// Reads the fixed part of a volume header after checking only the signature.
///
/// Used to learn the format or alignment of an image before any reader is chosen for it.
pub fn peek_header(buffer: &[u8]) -> Result<fv::Header, FirmwareFileSystemError> {
    if buffer.len() < mem::size_of::<fv::Header>() {
        Err(FirmwareFileSystemError::InvalidHeader)?;
    }
    // Safety: buffer is large enough to contain the header.
    let fv_header = unsafe { ptr::read_unaligned(buffer.as_ptr() as *const fv::Header) };
    if fv_header.signature != fv::SIGNATURE {
        Err(FirmwareFileSystemError::InvalidHeader)?;
    }
    Ok(fv_header)
}

/// Zero-copy view over a validated Firmware Volume.
pub struct VolumeRef<'a> {
    data: &'a [u8],
    fv_header: fv::Header,
    ext_header: Option<fv::ExtHeader>,
    block_map: Vec<BlockMapEntry>,
    content_offset: usize,
}

impl<'a> VolumeRef<'a> {
    /// Validate `buffer` as a firmware volume.
    ///
    /// Checks, in order: signature, header length (large enough, even, inside the buffer), header checksum, revision,
    /// volume length (covers the header, fits the buffer), extended header bounds and the block map. The returned
    /// view is truncated to the declared volume length.
    ///
    /// The file system GUID is not checked here; that is up to the reader registered for the format.
    pub fn new(buffer: &'a [u8]) -> Result<Self, FirmwareFileSystemError> {
        let fv_header = peek_header(buffer)?;

        let header_length = fv_header.header_length as usize;
        if header_length < mem::size_of::<fv::Header>() {
            Err(FirmwareFileSystemError::InvalidHeader)?;
        }
        if header_length > buffer.len() {
            Err(FirmwareFileSystemError::InvalidHeader)?;
        }
        if header_length & 0x01 != 0 {
            Err(FirmwareFileSystemError::InvalidHeader)?;
        }

        let fv_length = usize::try_from(fv_header.fv_length).map_err(|_| FirmwareFileSystemError::InvalidHeader)?;
        if fv_length < header_length || fv_length > buffer.len() {
            Err(FirmwareFileSystemError::InvalidHeader)?;
        }
        let data = &buffer[..fv_length];

        if sum16(&data[..header_length])? != 0 {
            log::error!("Volume header checksum mismatch.");
            Err(FirmwareFileSystemError::InvalidHeader)?;
        }

        if fv_header.revision < fv::FFS_REVISION {
            Err(FirmwareFileSystemError::Unsupported)?;
        }

        let ext_header = match fv_header.ext_header_offset as usize {
            0 => None,
            ext_header_offset => {
                let ext_header_end = ext_header_offset
                    .checked_add(mem::size_of::<fv::ExtHeader>())
                    .ok_or(FirmwareFileSystemError::InvalidHeader)?;
                if ext_header_end > fv_length {
                    Err(FirmwareFileSystemError::InvalidHeader)?;
                }
                // Safety: the check above keeps the extended header inside `data`.
                let ext_header =
                    unsafe { ptr::read_unaligned(data[ext_header_offset..].as_ptr() as *const fv::ExtHeader) };
                let declared_end = ext_header_offset
                    .checked_add(ext_header.ext_header_size as usize)
                    .ok_or(FirmwareFileSystemError::InvalidHeader)?;
                if (ext_header.ext_header_size as usize) < mem::size_of::<fv::ExtHeader>() || declared_end > fv_length
                {
                    Err(FirmwareFileSystemError::InvalidHeader)?;
                }
                Some(ext_header)
            }
        };

        let block_map = Self::parse_block_map(&data[mem::size_of::<fv::Header>()..header_length])?;

        let content_offset = match &ext_header {
            Some(ext_header) => fv_header.ext_header_offset as usize + ext_header.ext_header_size as usize,
            None => header_length,
        };
        // Files are 8-byte aligned relative to the start of the volume.
        let content_offset = align_up(content_offset, ffs::FILE_ALIGNMENT)?;

        Ok(Self { data, fv_header, ext_header, block_map, content_offset })
    }

    fn parse_block_map(raw: &[u8]) -> Result<Vec<BlockMapEntry>, FirmwareFileSystemError> {
        if raw.len() % mem::size_of::<BlockMapEntry>() != 0 {
            Err(FirmwareFileSystemError::InvalidHeader)?;
        }
        let mut block_map = raw
            .chunks_exact(mem::size_of::<BlockMapEntry>())
            .map(|entry| BlockMapEntry {
                num_blocks: u32::from_le_bytes([entry[0], entry[1], entry[2], entry[3]]),
                length: u32::from_le_bytes([entry[4], entry[5], entry[6], entry[7]]),
            })
            .collect::<Vec<_>>();

        let terminator = BlockMapEntry { num_blocks: 0, length: 0 };
        if block_map.pop() != Some(terminator) {
            Err(FirmwareFileSystemError::InvalidBlockMap)?;
        }
        if block_map.is_empty() || block_map.iter().any(|entry| entry.num_blocks == 0 || entry.length == 0) {
            Err(FirmwareFileSystemError::InvalidBlockMap)?;
        }
        Ok(block_map)
    }

    /// Summary used by [`FileScanner`].
    pub fn layout(&self) -> VolumeLayout {
        VolumeLayout {
            length: self.data.len(),
            content_offset: self.content_offset,
            erase_polarity: self.erase_polarity(),
            large_file_support: self.supports_large_files(),
            attributes: self.fv_header.attributes,
            file_system: self.fv_header.file_system_guid,
            name: self.fv_name(),
        }
    }

    /// Erased bits read as 1.
    pub fn erase_polarity(&self) -> bool {
        self.fv_header.attributes & fvb2::ERASE_POLARITY != 0
    }

    /// Whether files may use the 64-bit size header.
    pub fn supports_large_files(&self) -> bool {
        self.fv_header.file_system_guid == guid::FIRMWARE_FILE_SYSTEM3
    }

    pub fn file_system_guid(&self) -> efi::Guid {
        self.fv_header.file_system_guid
    }

    pub fn fv_name(&self) -> Option<efi::Guid> {
        self.ext_header.map(|ext_header| ext_header.fv_name)
    }

    pub fn attributes(&self) -> u32 {
        self.fv_header.attributes
    }

    /// Alignment in bytes the volume asks to be placed at.
    pub fn alignment(&self) -> u64 {
        fvb_attributes::alignment(self.fv_header.attributes)
    }

    pub fn is_weakly_aligned(&self) -> bool {
        self.fv_header.attributes & fvb2::WEAK_ALIGNMENT != 0
    }

    pub fn revision(&self) -> u8 {
        self.fv_header.revision
    }

    /// Total volume size in bytes (`FvLength`).
    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn block_map(&self) -> &[BlockMapEntry] {
        &self.block_map
    }

    pub fn content_offset(&self) -> usize {
        self.content_offset
    }

    /// The volume bytes, truncated to the declared length.
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Iterate over the files of the volume, pad files excluded.
    pub fn files(&self) -> FileScanner<'a> {
        FileScanner::new(self.data, &self.layout(), FileFilter::All)
    }
}

impl fmt::Debug for VolumeRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VolumeRef")
            .field("data (bytes)", &self.data.len())
            .field("fv_header", &self.fv_header)
            .field("ext_header", &self.ext_header)
            .field("block_map", &self.block_map)
            .field("content_offset", &self.content_offset)
            .finish()
    }
}

impl<'a> TryFrom<&'a [u8]> for VolumeRef<'a> {
    type Error = FirmwareFileSystemError;

    fn try_from(value: &'a [u8]) -> Result<Self, Self::Error> {
        VolumeRef::new(value)
    }
}
