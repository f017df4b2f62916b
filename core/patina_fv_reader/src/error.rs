//! Error type for the firmware volume reader.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use core::fmt;

use patina_fv_fs::FirmwareFileSystemError;
use r_efi::efi;

/// Errors reported by [`crate::FvContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FvError {
    /// The requested volume, file or section does not exist. Routine during searches.
    NotFound,
    /// A header, signature, checksum or bound check failed. No partial result is returned.
    VolumeCorrupted,
    /// An allocation or a bounded table ran out of room. The caller may retry later.
    OutOfResources,
    /// The content combines features its container does not allow.
    Unsupported,
    /// A handle does not name a registered volume, or a parameter is out of range.
    InvalidParameter,
}

impl fmt::Display for FvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            FvError::NotFound => "not found",
            FvError::VolumeCorrupted => "volume corrupted",
            FvError::OutOfResources => "out of resources",
            FvError::Unsupported => "unsupported",
            FvError::InvalidParameter => "invalid parameter",
        };
        f.write_str(text)
    }
}

impl core::error::Error for FvError {}

impl From<FirmwareFileSystemError> for FvError {
    fn from(value: FirmwareFileSystemError) -> Self {
        match value {
            FirmwareFileSystemError::InvalidHeader
            | FirmwareFileSystemError::InvalidBlockMap
            | FirmwareFileSystemError::InvalidState
            | FirmwareFileSystemError::DataCorrupt => FvError::VolumeCorrupted,
            FirmwareFileSystemError::InvalidParameter => FvError::InvalidParameter,
            FirmwareFileSystemError::Unsupported => FvError::Unsupported,
            FirmwareFileSystemError::NotFound => FvError::NotFound,
            FirmwareFileSystemError::OutOfResources => FvError::OutOfResources,
        }
    }
}

impl From<FvError> for efi::Status {
    fn from(value: FvError) -> Self {
        match value {
            FvError::NotFound => efi::Status::NOT_FOUND,
            FvError::VolumeCorrupted => efi::Status::VOLUME_CORRUPTED,
            FvError::OutOfResources => efi::Status::OUT_OF_RESOURCES,
            FvError::Unsupported => efi::Status::UNSUPPORTED,
            FvError::InvalidParameter => efi::Status::INVALID_PARAMETER,
        }
    }
}
