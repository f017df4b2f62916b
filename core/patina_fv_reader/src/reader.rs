//! Volume readers.
//!
//! A [`VolumeReader`] validates volumes of one on-disk format and walks their file directory. The registry in
//! [`crate::FvContext`] maps format GUIDs to readers; [`FfsVolumeReader`] handles the two firmware file system
//! formats defined by the PI specification.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use patina_fv_fs::{
    file::{FileFilter, FileRef, FileScanner},
    volume::{VolumeLayout, VolumeRef},
};
use patina_fv_pi::{GuidFmt, fw_fs::guid};
use r_efi::efi;

use crate::FvError;

/// Reads volumes of one format.
pub trait VolumeReader {
    /// Validates the volume at the start of `buffer` and describes it.
    ///
    /// Must not read past the volume length declared by the header, and fails with
    /// [`FvError::VolumeCorrupted`] on any header, signature, checksum or bounds violation.
    fn validate(&self, buffer: &[u8]) -> Result<VolumeLayout, FvError>;

    /// Walks the files of a volume this reader validated.
    fn enumerate_files<'b>(&self, data: &'b [u8], layout: &VolumeLayout, filter: FileFilter) -> FileScanner<'b> {
        FileScanner::new(data, layout, filter)
    }

    /// Finds a file by name.
    fn find_by_name<'b>(
        &self,
        data: &'b [u8],
        layout: &VolumeLayout,
        name: &efi::Guid,
    ) -> Result<FileRef<'b>, FvError> {
        match self.enumerate_files(data, layout, FileFilter::Name(*name)).next() {
            Some(file) => Ok(file?),
            None => Err(FvError::NotFound),
        }
    }
}

/// Reader for FFS2 and FFS3 volumes.
#[derive(Debug, Clone, Copy)]
pub struct FfsVolumeReader {
    file_system: efi::Guid,
    allow_large_files_in_ffs2: bool,
}

impl FfsVolumeReader {
    /// A reader accepting volumes whose header names `file_system`.
    pub const fn new(file_system: efi::Guid) -> Self {
        Self { file_system, allow_large_files_in_ffs2: false }
    }

    pub const fn ffs2() -> Self {
        Self::new(guid::FIRMWARE_FILE_SYSTEM2)
    }

    pub const fn ffs3() -> Self {
        Self::new(guid::FIRMWARE_FILE_SYSTEM3)
    }

    /// Skip 64-bit size files found in a volume that does not allow them, instead of failing the scan.
    pub const fn allow_large_files_in_ffs2(mut self, allow: bool) -> Self {
        self.allow_large_files_in_ffs2 = allow;
        self
    }

    pub fn file_system(&self) -> efi::Guid {
        self.file_system
    }
}

impl VolumeReader for FfsVolumeReader {
    fn validate(&self, buffer: &[u8]) -> Result<VolumeLayout, FvError> {
        let volume = VolumeRef::new(buffer).map_err(|err| {
            log::error!("Volume failed validation: {}.", err);
            FvError::from(err)
        })?;
        if volume.file_system_guid() != self.file_system {
            log::error!(
                "Volume file system {} does not match reader format {}.",
                GuidFmt(&volume.file_system_guid()),
                GuidFmt(&self.file_system)
            );
            Err(FvError::Unsupported)?;
        }
        Ok(volume.layout())
    }

    fn enumerate_files<'b>(&self, data: &'b [u8], layout: &VolumeLayout, filter: FileFilter) -> FileScanner<'b> {
        FileScanner::new(data, layout, filter).allow_large_files_in_ffs2(self.allow_large_files_in_ffs2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use patina_fv_fs::test_support::{FileBuilder, VolumeBuilder, leaf_section, set_logger};
    use patina_fv_pi::fw_fs::ffs::{file::raw::r#type, section::raw_type};

    fn guid(n: u8) -> efi::Guid {
        efi::Guid::from_bytes(&[n; 16])
    }

    #[test]
    fn ffs2_reader_validates_and_finds_by_name() {
        set_logger();
        let fv = VolumeBuilder::new()
            .file(FileBuilder::new(guid(1), r#type::DRIVER).section(leaf_section(raw_type::RAW, b"one")))
            .file(FileBuilder::new(guid(2), r#type::APPLICATION).section(leaf_section(raw_type::RAW, b"two")))
            .build();
        let reader = FfsVolumeReader::ffs2();
        let layout = reader.validate(&fv).unwrap();
        let file = reader.find_by_name(&fv, &layout, &guid(2)).unwrap();
        assert_eq!(file.file_type_raw(), r#type::APPLICATION);
        assert_eq!(reader.find_by_name(&fv, &layout, &guid(3)).unwrap_err(), FvError::NotFound);
    }

    #[test]
    fn wrong_file_system_is_unsupported() {
        let fv = VolumeBuilder::new().file_system(guid::FIRMWARE_FILE_SYSTEM3).build();
        assert_eq!(FfsVolumeReader::ffs2().validate(&fv).unwrap_err(), FvError::Unsupported);
        assert!(FfsVolumeReader::ffs3().validate(&fv).is_ok());
    }

    #[test]
    fn corrupt_header_is_volume_corrupted() {
        let mut fv = VolumeBuilder::new().build();
        fv[50] ^= 0xFF;
        assert_eq!(FfsVolumeReader::ffs2().validate(&fv).unwrap_err(), FvError::VolumeCorrupted);
    }

    #[test]
    fn large_file_compatibility_switch() {
        let fv = VolumeBuilder::new()
            .file(FileBuilder::new(guid(1), r#type::DRIVER).large(true))
            .file(FileBuilder::new(guid(2), r#type::DRIVER))
            .build();
        let strict = FfsVolumeReader::ffs2();
        let layout = strict.validate(&fv).unwrap();
        assert_eq!(strict.find_by_name(&fv, &layout, &guid(2)).unwrap_err(), FvError::Unsupported);

        let lenient = FfsVolumeReader::ffs2().allow_large_files_in_ffs2(true);
        assert_eq!(lenient.find_by_name(&fv, &layout, &guid(2)).unwrap().name(), guid(2));
    }
}
