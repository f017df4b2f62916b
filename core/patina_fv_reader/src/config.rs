//! Firmware Volume Reader Configuration
//!
//! ## Configuration Example
//!
//! ```rust,ignore
//! let mut context = patina_fv_reader::FvContext::new(patina_fv_reader::config::FvConfig {
//!     max_volumes: 16,
//!     allow_large_files_in_ffs2: true,
//!     ..Default::default()
//! });
//! ```
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use patina_fv_pi::fw_fs::ffs::section::{EfiSectionType, raw_type};

/// Limits and compatibility switches for a [`crate::FvContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FvConfig {
    /// Capacity of the volume table.
    pub max_volumes: usize,
    /// Number of decoded encapsulations kept; the oldest is evicted first. Zero disables caching.
    pub section_cache_capacity: usize,
    /// Number of volumes kept waiting for a reader to register.
    pub max_unknown_formats: usize,
    /// Deepest volume-in-volume and encapsulation-in-encapsulation nesting followed.
    pub max_nesting_depth: usize,
    /// Section type holding the dependency expression of a volume image file.
    pub depex_section_type: EfiSectionType,
    /// Skip, instead of rejecting, 64-bit size files in FFS2 volumes.
    pub allow_large_files_in_ffs2: bool,
}

impl Default for FvConfig {
    fn default() -> Self {
        Self {
            max_volumes: 64,
            section_cache_capacity: 16,
            max_unknown_formats: 32,
            max_nesting_depth: 8,
            depex_section_type: raw_type::DXE_DEPEX,
            allow_large_files_in_ffs2: false,
        }
    }
}
