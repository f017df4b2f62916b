//! Decompression of `EFI_SECTION_COMPRESSION` sections.
//!
//! The standard compression algorithm of the PI specification is supplied by the platform through
//! [`SectionDecompressor`]; the reader itself only handles sections stored uncompressed.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use alloc::vec::Vec;

#[cfg(any(test, feature = "mockall"))]
use mockall::automock;
use patina_fv_fs::FirmwareFileSystemError;

/// Decompresses the payload of a compression section.
#[cfg_attr(any(test, feature = "mockall"), automock)]
pub trait SectionDecompressor {
    /// Decompress `source`, produced by the algorithm `compression_type`, into exactly `uncompressed_length` bytes.
    ///
    /// Return [`FirmwareFileSystemError::Unsupported`] for an algorithm the implementation does not know.
    fn decompress(
        &self,
        compression_type: u8,
        source: &[u8],
        uncompressed_length: usize,
    ) -> Result<Vec<u8>, FirmwareFileSystemError>;
}
