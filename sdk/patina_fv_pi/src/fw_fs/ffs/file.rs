//! Firmware File System (FFS) File Definitions
//!
//! Based on the values defined in the UEFI Platform Initialization (PI) Specification V1.8A Section 3.2.3.1
//! EFI_FFS_FILE_HEADER.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use r_efi::efi;

pub type EfiFvFileType = u8;

pub mod raw {
    /// File state bits, as they read when the volume erase polarity is 0.
    pub mod state {
        pub const HEADER_CONSTRUCTION: u8 = 0x01;
        pub const HEADER_VALID: u8 = 0x02;
        pub const DATA_VALID: u8 = 0x04;
        pub const MARKED_FOR_UPDATE: u8 = 0x08;
        pub const DELETED: u8 = 0x10;
        pub const HEADER_INVALID: u8 = 0x20;
    }

    pub mod r#type {
        /// Wild card matching every file type except pad files.
        pub const ALL: u8 = 0x00;
        pub const RAW: u8 = 0x01;
        pub const FREEFORM: u8 = 0x02;
        pub const SECURITY_CORE: u8 = 0x03;
        pub const PEI_CORE: u8 = 0x04;
        pub const DXE_CORE: u8 = 0x05;
        pub const PEIM: u8 = 0x06;
        pub const DRIVER: u8 = 0x07;
        pub const COMBINED_PEIM_DRIVER: u8 = 0x08;
        pub const APPLICATION: u8 = 0x09;
        pub const MM: u8 = 0x0A;
        pub const FIRMWARE_VOLUME_IMAGE: u8 = 0x0B;
        pub const COMBINED_MM_DXE: u8 = 0x0C;
        pub const MM_CORE: u8 = 0x0D;
        pub const MM_STANDALONE: u8 = 0x0E;
        pub const MM_CORE_STANDALONE: u8 = 0x0F;
        pub const FFS_PAD: u8 = 0xF0;
    }
}

/// Firmware file type.
#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Type {
    Raw = raw::r#type::RAW,
    FreeForm = raw::r#type::FREEFORM,
    SecurityCore = raw::r#type::SECURITY_CORE,
    PeiCore = raw::r#type::PEI_CORE,
    DxeCore = raw::r#type::DXE_CORE,
    Peim = raw::r#type::PEIM,
    Driver = raw::r#type::DRIVER,
    CombinedPeimDriver = raw::r#type::COMBINED_PEIM_DRIVER,
    Application = raw::r#type::APPLICATION,
    Mm = raw::r#type::MM,
    FirmwareVolumeImage = raw::r#type::FIRMWARE_VOLUME_IMAGE,
    CombinedMmDxe = raw::r#type::COMBINED_MM_DXE,
    MmCore = raw::r#type::MM_CORE,
    MmStandalone = raw::r#type::MM_STANDALONE,
    MmCoreStandalone = raw::r#type::MM_CORE_STANDALONE,
    FfsPad = raw::r#type::FFS_PAD,
}

impl TryFrom<u8> for Type {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        use raw::r#type::*;
        Ok(match value {
            RAW => Type::Raw,
            FREEFORM => Type::FreeForm,
            SECURITY_CORE => Type::SecurityCore,
            PEI_CORE => Type::PeiCore,
            DXE_CORE => Type::DxeCore,
            PEIM => Type::Peim,
            DRIVER => Type::Driver,
            COMBINED_PEIM_DRIVER => Type::CombinedPeimDriver,
            APPLICATION => Type::Application,
            MM => Type::Mm,
            FIRMWARE_VOLUME_IMAGE => Type::FirmwareVolumeImage,
            COMBINED_MM_DXE => Type::CombinedMmDxe,
            MM_CORE => Type::MmCore,
            MM_STANDALONE => Type::MmStandalone,
            MM_CORE_STANDALONE => Type::MmCoreStandalone,
            FFS_PAD => Type::FfsPad,
            other => return Err(other),
        })
    }
}

/// EFI_FFS_FILE_HEADER
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub name: efi::Guid,
    /// Makes the 8-bit sum of the header (state and `integrity_check_file` excluded) zero.
    pub integrity_check_header: u8,
    /// Data checksum, or [`super::FIXED_CHECKSUM`].
    pub integrity_check_file: u8,
    pub file_type: u8,
    pub attributes: u8,
    /// 24-bit little endian size of the whole file, header included.
    pub size: [u8; 3],
    pub state: u8,
}

/// EFI_FFS_FILE_HEADER2
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header2 {
    pub header: Header,
    /// Size of the whole file when [`super::attributes::raw::LARGE_FILE`] is set.
    pub extended_size: u64,
}

/// Byte offset of [`Header::state`].
pub const STATE_OFFSET: usize = 23;
/// Byte offset of [`Header::integrity_check_file`].
pub const INTEGRITY_CHECK_FILE_OFFSET: usize = 17;
