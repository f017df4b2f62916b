//! Firmware File System (FFS) Definitions
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!

pub mod attributes;
pub mod file;
pub mod section;

/// Files start on 8-byte boundaries relative to the start of the volume.
pub const FILE_ALIGNMENT: usize = 8;
/// Sections start on 4-byte boundaries relative to the start of the section stream.
pub const SECTION_ALIGNMENT: usize = 4;
/// Data checksum value required when [`attributes::raw::CHECKSUM`] is clear.
pub const FIXED_CHECKSUM: u8 = 0xAA;
