//! Firmware File System (FFS) File Attribute Definitions
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

pub type EfiFfsFileAttributes = u8;

pub mod raw {
    /// The header is an `EFI_FFS_FILE_HEADER2` with a 64-bit size.
    pub const LARGE_FILE: u8 = 0x01;
    /// Selects the upper half of the data alignment table.
    pub const DATA_ALIGNMENT_2: u8 = 0x02;
    pub const FIXED: u8 = 0x04;
    pub const DATA_ALIGNMENT: u8 = 0x38;
    /// `integrity_check_file` holds a checksum over the file data.
    pub const CHECKSUM: u8 = 0x40;
}
