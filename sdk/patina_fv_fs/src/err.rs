//! Error types and conversions for the Firmware File System (FFS) crate.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use core::fmt;

use r_efi::efi;

/// Error definitions for Firmware File System parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirmwareFileSystemError {
    /// A volume, file or section header is malformed, fails its checksum or points outside its container.
    InvalidHeader,
    /// The block map of a volume is malformed.
    InvalidBlockMap,
    /// A file state byte does not decode to a known state.
    InvalidState,
    /// A data checksum or an encoded payload is wrong.
    DataCorrupt,
    /// A parameter provided to a function is invalid.
    InvalidParameter,
    /// The content uses a feature the container does not declare, or no decoder handles it.
    Unsupported,
    /// The requested item does not exist.
    NotFound,
    /// An allocation failed.
    OutOfResources,
}

impl fmt::Display for FirmwareFileSystemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            FirmwareFileSystemError::InvalidHeader => "invalid header",
            FirmwareFileSystemError::InvalidBlockMap => "invalid block map",
            FirmwareFileSystemError::InvalidState => "invalid file state",
            FirmwareFileSystemError::DataCorrupt => "data corrupt",
            FirmwareFileSystemError::InvalidParameter => "invalid parameter",
            FirmwareFileSystemError::Unsupported => "unsupported",
            FirmwareFileSystemError::NotFound => "not found",
            FirmwareFileSystemError::OutOfResources => "out of resources",
        };
        f.write_str(text)
    }
}

impl core::error::Error for FirmwareFileSystemError {}

impl From<FirmwareFileSystemError> for efi::Status {
    fn from(value: FirmwareFileSystemError) -> Self {
        match value {
            FirmwareFileSystemError::InvalidHeader
            | FirmwareFileSystemError::InvalidBlockMap
            | FirmwareFileSystemError::InvalidState
            | FirmwareFileSystemError::DataCorrupt => efi::Status::VOLUME_CORRUPTED,
            FirmwareFileSystemError::InvalidParameter => efi::Status::INVALID_PARAMETER,
            FirmwareFileSystemError::Unsupported => efi::Status::UNSUPPORTED,
            FirmwareFileSystemError::NotFound => efi::Status::NOT_FOUND,
            FirmwareFileSystemError::OutOfResources => efi::Status::OUT_OF_RESOURCES,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integrity_errors_report_volume_corrupted() {
        for err in [
            FirmwareFileSystemError::InvalidHeader,
            FirmwareFileSystemError::InvalidBlockMap,
            FirmwareFileSystemError::InvalidState,
            FirmwareFileSystemError::DataCorrupt,
        ] {
            assert_eq!(efi::Status::from(err), efi::Status::VOLUME_CORRUPTED);
        }
        assert_eq!(efi::Status::from(FirmwareFileSystemError::NotFound), efi::Status::NOT_FOUND);
        assert_eq!(efi::Status::from(FirmwareFileSystemError::Unsupported), efi::Status::UNSUPPORTED);
    }
}
