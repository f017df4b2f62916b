//! Firmware Volume File Attributes
//!
//! `EFI_FV_FILE_ATTRIBUTES` as returned by the firmware volume protocol for a file, per PI Specification V1.8A
//! Volume 3 Section 3.4.1.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!

pub type EfiFvFileAttributes = u32;

pub mod raw {
    pub mod attribute {
        /// Log2 of the required file data alignment.
        pub const ALIGNMENT: u32 = 0x0000001F;
        pub const FIXED: u32 = 0x00000100;
        pub const MEMORY_MAPPED: u32 = 0x00000200;
    }
}
