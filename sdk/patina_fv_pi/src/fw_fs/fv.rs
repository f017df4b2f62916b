//! Firmware Volume (FV) Definitions
//!
//! Based on the values defined in the UEFI Platform Initialization (PI) Specification V1.8A 3.2.1 Firmware Volume.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use r_efi::efi;

pub mod file;

/// Lowest header revision understood by the reader.
pub const FFS_REVISION: u8 = 2;

/// ASCII `_FVH`, read as a little endian `u32`.
pub const SIGNATURE: u32 = u32::from_le_bytes(*b"_FVH");

/// EFI_FIRMWARE_VOLUME_HEADER
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Header {
    /// Reserved for processor reset vectors.
    pub zero_vector: [u8; 16],
    /// Identifies the file system (FFS2, FFS3, ...) used in the volume.
    pub file_system_guid: efi::Guid,
    /// Length of the whole volume, header included.
    pub fv_length: u64,
    /// Must be [`SIGNATURE`].
    pub signature: u32,
    /// `EFI_FVB_ATTRIBUTES_2`, see [`super::fvb::attributes`].
    pub attributes: u32,
    /// Length of the header including the block map.
    pub header_length: u16,
    /// 16-bit checksum, the header sums to zero.
    pub checksum: u16,
    /// Offset of the [`ExtHeader`] from the start of the volume, zero if absent.
    pub ext_header_offset: u16,
    pub reserved: u8,
    pub revision: u8,
}

/// EFI_FV_BLOCK_MAP_ENTRY
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockMapEntry {
    pub num_blocks: u32,
    pub length: u32,
}

/// EFI_FIRMWARE_VOLUME_EXT_HEADER
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ExtHeader {
    /// Name of the volume.
    pub fv_name: efi::Guid,
    /// Size of the extended header including any entries that follow it.
    pub ext_header_size: u32,
}
