//! # GUID-defined Section Decoders
//!
//! This crate provides implementations of the `patina_fv_fs::section::GuidedSectionDecoder` trait for the
//! GUID-defined encapsulations commonly found in firmware volumes.
//!
//! ## Features
//!
//! Each decoder sits behind its own feature so a platform only compiles what it ships:
//! - `brotli`: [`BrotliSectionExtractor`] for `BROTLI_SECTION_GUID` sections.
//! - `crc32`: [`Crc32SectionExtractor`] to check CRC32 GUID-defined sections and return the wrapped payload.
//! - `lzma`: [`LzmaSectionExtractor`] for `LZMA_CUSTOM_DECOMPRESS_GUID` sections. Requires `std`.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
#![cfg_attr(not(feature = "std"), no_std)]
extern crate alloc;

use alloc::{rc::Rc, vec::Vec};

use patina_fv_fs::section::GuidedSectionDecoder;
use r_efi::efi;

#[cfg(feature = "brotli")]
mod brotli;
#[cfg(feature = "brotli")]
pub use brotli::BrotliSectionExtractor;

#[cfg(feature = "crc32")]
mod crc32;
#[cfg(feature = "crc32")]
pub use crc32::Crc32SectionExtractor;

#[cfg(feature = "lzma")]
mod lzma;
#[cfg(feature = "lzma")]
pub use lzma::LzmaSectionExtractor;

/// Every decoder compiled into this crate, paired with the definition GUID it handles.
pub fn default_decoders() -> Vec<(efi::Guid, Rc<dyn GuidedSectionDecoder>)> {
    #[allow(unused_mut)]
    let mut decoders: Vec<(efi::Guid, Rc<dyn GuidedSectionDecoder>)> = Vec::new();
    #[cfg(feature = "brotli")]
    decoders.push((patina_fv_pi::fw_fs::guid::BROTLI_SECTION, Rc::new(BrotliSectionExtractor)));
    #[cfg(feature = "crc32")]
    decoders.push((patina_fv_pi::fw_fs::guid::CRC32_SECTION, Rc::new(Crc32SectionExtractor)));
    #[cfg(feature = "lzma")]
    decoders.push((patina_fv_pi::fw_fs::guid::LZMA_SECTION, Rc::new(LzmaSectionExtractor)));
    decoders
}
