//! Firmware Volume Block Attributes
//!
//! The subset of `EFI_FVB_ATTRIBUTES_2` (PI Specification V1.8A Volume 3 Section 3.2.1.1) that affects how a
//! volume is read.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!

pub type EfiFvbAttributes2 = u32;

pub mod raw {
    pub mod fvb2 {
        /// Erased flash reads as 1 when set, 0 otherwise.
        pub const ERASE_POLARITY: u32 = 0x00000800;
        /// Volume alignment field, encodes `log2(alignment)` in bits 16..=20.
        pub const ALIGNMENT: u32 = 0x001F0000;
        /// Bit position of [`ALIGNMENT`].
        pub const ALIGNMENT_SHIFT: u32 = 16;
        /// The volume tolerates being placed at any 8-byte boundary.
        pub const WEAK_ALIGNMENT: u32 = 0x80000000;
    }
}

/// Returns the alignment in bytes encoded in the attributes of a volume.
pub const fn alignment(attributes: EfiFvbAttributes2) -> u64 {
    1u64 << ((attributes & raw::fvb2::ALIGNMENT) >> raw::fvb2::ALIGNMENT_SHIFT)
}
