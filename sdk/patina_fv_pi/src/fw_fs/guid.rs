//! Well-known firmware storage GUIDs.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use r_efi::efi;

/// EFI_FIRMWARE_FILE_SYSTEM2_GUID: FFS without large file support.
pub const FIRMWARE_FILE_SYSTEM2: efi::Guid =
    efi::Guid::from_fields(0x8C8CE578, 0x8A3D, 0x4F1C, 0x99, 0x35, &[0x89, 0x61, 0x85, 0xC3, 0x2D, 0xD3]);

/// EFI_FIRMWARE_FILE_SYSTEM3_GUID: FFS with large file (`Header2`) support.
pub const FIRMWARE_FILE_SYSTEM3: efi::Guid =
    efi::Guid::from_fields(0x5473C07A, 0x3DCB, 0x4DCA, 0xBD, 0x6F, &[0x1E, 0x96, 0x89, 0xE7, 0x34, 0x9A]);

/// Name of the a-priori file listing modules to dispatch first.
pub const PEI_APRIORI_FILE_NAME: efi::Guid =
    efi::Guid::from_fields(0x1B45CC0A, 0x156A, 0x428A, 0xAF, 0x62, &[0x49, 0x86, 0x4D, 0xA0, 0xE6, 0xE6]);

/// GUID-defined section validated with a CRC32 stored in the GUID-specific header.
pub const CRC32_SECTION: efi::Guid =
    efi::Guid::from_fields(0xFC1BCDB0, 0x7D31, 0x49AA, 0x93, 0x6A, &[0xA4, 0x60, 0x0D, 0x9D, 0xD0, 0x83]);

/// GUID-defined section compressed with Brotli.
pub const BROTLI_SECTION: efi::Guid =
    efi::Guid::from_fields(0x3D532050, 0x5CDA, 0x4FD0, 0x87, 0x9E, &[0x0F, 0x7F, 0x63, 0x0D, 0x5A, 0xFB]);

/// GUID-defined section compressed with LZMA.
pub const LZMA_SECTION: efi::Guid =
    efi::Guid::from_fields(0xEE4E5898, 0x3914, 0x4259, 0x9D, 0x6E, &[0xDC, 0x7B, 0xD7, 0x94, 0x03, 0xCF]);

/// GUID-defined section compressed with the Tiano algorithm.
pub const TIANO_DECOMPRESS_SECTION: efi::Guid =
    efi::Guid::from_fields(0xA31280AD, 0x481E, 0x41B6, 0x95, 0xE8, &[0x12, 0x7F, 0x4C, 0x98, 0x47, 0x79]);
