//! Firmware Volume Reader
//!
//! Registers firmware volumes, walks their file directories, extracts sections (opening compressed and GUID-defined
//! encapsulations on the way), and discovers volumes nested in volume image files.
//!
//! All state lives in an explicit [`FvContext`]. Volume formats are handled by [`reader::VolumeReader`]s registered
//! by file system GUID; a volume whose format has no reader yet is queued and replayed when one registers.
//! GUID-defined sections are decoded by `patina_fv_fs::section::GuidedSectionDecoder`s registered by definition
//! GUID, and the standard compression algorithm is supplied through [`decompress::SectionDecompressor`].
//!
//! ## Example
//!
//! ```rust,ignore
//! let mut context = FvContext::new(FvConfig::default());
//! context.install_default_readers();
//! for (guid, decoder) in patina_fv_extractors::default_decoders() {
//!     context.register_section_decoder(guid, decoder);
//! }
//! if let VolumeDisposition::Installed(volume) = context.install_volume(flash, 0)? {
//!     context.discover_nested_volumes();
//!     let file = context.find_file_by_name(volume, &DRIVER_GUID)?;
//!     let image = context.find_section(&file, raw_type::PE32, 0)?;
//! }
//! ```
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod config;
mod context;
pub mod decompress;
mod error;
mod extract;
pub mod nested;
pub mod reader;
mod registry;
mod section_cache;
mod unknown;
pub mod volume_table;

pub use config::FvConfig;
pub use context::{DispatchScan, ExtractedSection, FileHandle, FvContext, VolumeDisposition};
pub use error::FvError;
pub use registry::{FormatRegistry, RegistrationNotify};
pub use volume_table::{VolumeHandle, VolumeRecord};
