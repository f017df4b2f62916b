//! Firmware File System (FFS) Section Definitions
//!
//! Based on the values defined in the UEFI Platform Initialization (PI) Specification V1.8A Section 3.2.4
//! Firmware File Section and 3.2.5 Firmware File Section Types.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use r_efi::efi;

pub type EfiSectionType = u8;

/// Section types, typically called `EFI_SECTION_*` in EDK II code.
pub mod raw_type {
    /// Wild card, matches every section type.
    pub const ALL: u8 = 0x00;
    pub mod encapsulated {
        pub const COMPRESSION: u8 = 0x01;
        pub const GUID_DEFINED: u8 = 0x02;
        pub const DISPOSABLE: u8 = 0x03;
    }
    pub const PE32: u8 = 0x10;
    pub const PIC: u8 = 0x11;
    pub const TE: u8 = 0x12;
    pub const DXE_DEPEX: u8 = 0x13;
    pub const VERSION: u8 = 0x14;
    pub const USER_INTERFACE: u8 = 0x15;
    pub const COMPATIBILITY16: u8 = 0x16;
    pub const FIRMWARE_VOLUME_IMAGE: u8 = 0x17;
    pub const FREEFORM_SUBTYPE_GUID: u8 = 0x18;
    pub const RAW: u8 = 0x19;
    pub const PEI_DEPEX: u8 = 0x1B;
    pub const MM_DEPEX: u8 = 0x1C;
}

/// Size field value announcing an extended (`EFI_COMMON_SECTION_HEADER2`) header.
pub const EXTENDED_SIZE_MARKER: [u8; 3] = [0xFF; 3];

/// EFI_COMMON_SECTION_HEADER
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Header {
    pub size: [u8; 3],
    pub section_type: u8,
}

pub mod header {
    use super::efi;

    /// EFI_COMMON_SECTION_HEADER2
    #[repr(C)]
    #[derive(Debug, Clone, Copy)]
    pub struct CommonSectionHeaderExtended {
        /// Always [`super::EXTENDED_SIZE_MARKER`].
        pub size: [u8; 3],
        pub section_type: u8,
        pub extended_size: u32,
    }

    /// EFI_COMPRESSION_SECTION (without the common header)
    #[repr(C, packed)]
    #[derive(Debug, Clone, Copy)]
    pub struct Compression {
        pub uncompressed_length: u32,
        pub compression_type: u8,
    }
    pub const NOT_COMPRESSED: u8 = 0x00;
    pub const STANDARD_COMPRESSION: u8 = 0x01;

    /// EFI_GUID_DEFINED_SECTION (without the common header)
    #[repr(C)]
    #[derive(Debug, Clone, Copy)]
    pub struct GuidDefined {
        pub section_definition_guid: efi::Guid,
        /// Offset of the wrapped data from the start of the section, common header included.
        pub data_offset: u16,
        pub attributes: u16,
    }

    /// EFI_VERSION_SECTION (without the common header)
    #[repr(C)]
    #[derive(Debug, Clone, Copy)]
    pub struct Version {
        pub build_number: u16,
    }

    /// EFI_FREEFORM_SUBTYPE_GUID_SECTION (without the common header)
    #[repr(C)]
    #[derive(Debug, Clone, Copy)]
    pub struct FreeformSubtypeGuid {
        pub sub_type_guid: efi::Guid,
    }
}

/// GUID-defined section attributes.
pub mod guid_defined_attributes {
    /// The wrapped data cannot be used without the matching decoder.
    pub const PROCESSING_REQUIRED: u16 = 0x0001;
    /// The encapsulation carries authentication information.
    pub const AUTH_STATUS_VALID: u16 = 0x0002;
}
