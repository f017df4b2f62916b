//! Firmware File System (FFS) file directory scanning.
//!
//! This module provides:
//! - `FileRef`: a zero-copy view over one file of a volume, created only after its header checksum, size and data
//!   checksum have been verified.
//! - `FileScanner`: the directory walk. It visits candidate offsets in ascending order, decodes the state byte of
//!   each header, skips incomplete, invalid and deleted files, and yields the live files that match a
//!   [`FileFilter`].
//!
//! Every step of the walk moves the offset forward by at least one header, so a degenerate size field ends the scan
//! with an error instead of looping.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use core::{fmt, mem, ptr};

use patina_fv_pi::{
    GuidFmt,
    fw_fs::{
        ffs::{self, attributes, file},
        fv,
        guid,
    },
};
use r_efi::efi;

use crate::{
    FirmwareFileSystemError,
    codec::{FileState, align_up, size24, sum8},
    section::SectionIterator,
    volume::VolumeLayout,
};

/// Data alignment (log2) selected by the three `DATA_ALIGNMENT` bits, per Table 3.3 of PI 1.8A Volume 3.
const DATA_ALIGNMENT_LOG2: [u32; 8] = [0, 4, 7, 9, 10, 12, 15, 16];

/// Zero-copy view over a live file.
#[derive(Clone)]
pub struct FileRef<'a> {
    data: &'a [u8],
    offset: usize,
    header: file::Header,
    state: FileState,
    content_offset: usize,
}

impl<'a> FileRef<'a> {
    /// Parse the file that starts `offset` bytes into `volume`.
    ///
    /// Verifies the header checksum (state and data checksum fields excluded), that the size covers the header and
    /// stays inside the volume, and the data checksum: a sum of zero over data and checksum when the `CHECKSUM`
    /// attribute is set, the fixed value `0xAA` otherwise.
    ///
    /// Errors
    /// - [`FirmwareFileSystemError::InvalidHeader`]: truncated header, bad size or header checksum.
    /// - [`FirmwareFileSystemError::InvalidState`]: the state is not [`FileState::Valid`] or
    ///   [`FileState::MarkedForUpdate`].
    /// - [`FirmwareFileSystemError::DataCorrupt`]: data checksum mismatch.
    pub fn new(volume: &'a [u8], offset: usize, erase_polarity: bool) -> Result<Self, FirmwareFileSystemError> {
        let buffer = volume.get(offset..).ok_or(FirmwareFileSystemError::InvalidHeader)?;
        let header = read_header(buffer)?;

        let state = FileState::from_state_byte(header.state, erase_polarity)
            .filter(|state| state.is_live())
            .ok_or(FirmwareFileSystemError::InvalidState)?;

        let (size, content_offset) = file_size(&header, buffer)?;
        if size < content_offset || size > buffer.len() {
            Err(FirmwareFileSystemError::InvalidHeader)?;
        }

        let header_sum =
            sum8(&buffer[..content_offset]).wrapping_sub(header.state).wrapping_sub(header.integrity_check_file);
        if header_sum != 0 {
            Err(FirmwareFileSystemError::InvalidHeader)?;
        }

        let content = &buffer[content_offset..size];
        if header.attributes & attributes::raw::CHECKSUM != 0 {
            if sum8(content).wrapping_add(header.integrity_check_file) != 0 {
                Err(FirmwareFileSystemError::DataCorrupt)?;
            }
        } else if header.integrity_check_file != ffs::FIXED_CHECKSUM {
            Err(FirmwareFileSystemError::DataCorrupt)?;
        }

        Ok(Self { data: &buffer[..size], offset, header, state, content_offset })
    }

    /// The file name GUID.
    pub fn name(&self) -> efi::Guid {
        self.header.name
    }

    /// The raw FFS file type byte.
    pub fn file_type_raw(&self) -> u8 {
        self.header.file_type
    }

    pub fn file_type(&self) -> Option<file::Type> {
        file::Type::try_from(self.header.file_type).ok()
    }

    /// The raw attributes byte from the FFS header.
    pub fn attributes_raw(&self) -> u8 {
        self.header.attributes
    }

    pub fn state(&self) -> FileState {
        self.state
    }

    /// Header uses the 64-bit size form.
    pub fn is_large_file(&self) -> bool {
        self.header.attributes & attributes::raw::LARGE_FILE != 0
    }

    /// Offset of the file from the start of the volume.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Size of header and content.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Size rounded up to the alignment of the next file.
    pub fn occupied_size(&self) -> Result<usize, FirmwareFileSystemError> {
        align_up(self.size(), ffs::FILE_ALIGNMENT)
    }

    pub fn content_offset(&self) -> usize {
        self.content_offset
    }

    /// The section stream of the file.
    pub fn content(&self) -> &'a [u8] {
        &self.data[self.content_offset..]
    }

    /// Header and content.
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Walk the sections of the file without descending into encapsulations.
    pub fn sections(&self) -> SectionIterator<'a> {
        SectionIterator::new(self.content())
    }

    /// Decode the file attributes into `EFI_FV_FILE_ATTRIBUTES`.
    pub fn fv_attributes(&self) -> fv::file::EfiFvFileAttributes {
        let raw_attributes = self.header.attributes;
        let index = ((raw_attributes & attributes::raw::DATA_ALIGNMENT) >> 3) as usize;
        let mut file_attributes = if raw_attributes & attributes::raw::DATA_ALIGNMENT_2 != 0 {
            17 + index as u32
        } else {
            DATA_ALIGNMENT_LOG2[index]
        };
        if raw_attributes & attributes::raw::FIXED != 0 {
            file_attributes |= fv::file::raw::attribute::FIXED;
        }
        file_attributes
    }
}

impl fmt::Debug for FileRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileRef")
            .field("name", &GuidFmt(&self.header.name))
            .field("file_type", &self.header.file_type)
            .field("attributes", &self.header.attributes)
            .field("state", &self.state)
            .field("offset", &self.offset)
            .field("size", &self.data.len())
            .finish()
    }
}

fn read_header(buffer: &[u8]) -> Result<file::Header, FirmwareFileSystemError> {
    if buffer.len() < mem::size_of::<file::Header>() {
        Err(FirmwareFileSystemError::InvalidHeader)?;
    }
    // Safety: buffer is large enough to contain the file header.
    Ok(unsafe { ptr::read_unaligned(buffer.as_ptr() as *const file::Header) })
}

/// Returns `(size, header length)` for the header at the start of `buffer`.
///
/// The 24-bit and 64-bit encodings are folded into one size here so nothing downstream needs to care which one the
/// file used.
fn file_size(header: &file::Header, buffer: &[u8]) -> Result<(usize, usize), FirmwareFileSystemError> {
    if header.attributes & attributes::raw::LARGE_FILE == 0 {
        return Ok((size24(header.size), mem::size_of::<file::Header>()));
    }
    if buffer.len() < mem::size_of::<file::Header2>() {
        Err(FirmwareFileSystemError::InvalidHeader)?;
    }
    // Safety: buffer is large enough to contain the extended file header.
    let header2 = unsafe { ptr::read_unaligned(buffer.as_ptr() as *const file::Header2) };
    let size = usize::try_from(header2.extended_size).map_err(|_| FirmwareFileSystemError::InvalidHeader)?;
    Ok((size, mem::size_of::<file::Header2>()))
}

/// Which files a [`FileScanner`] returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFilter {
    /// Every live file except pad files.
    All,
    /// Live files of one type. `Type(ALL)` behaves as [`FileFilter::All`]; pad files never match.
    Type(u8),
    /// The live file with this name.
    Name(efi::Guid),
    /// PEIMs, combined PEIM/driver files and volume images. The a-priori file is captured on the side, see
    /// [`FileScanner::apriori_file`].
    InternalDispatch,
}

impl FileFilter {
    pub fn matches(&self, file: &FileRef<'_>) -> bool {
        let file_type = file.file_type_raw();
        match self {
            FileFilter::Name(name) => file.name() == *name,
            FileFilter::All => file_type != file::raw::r#type::FFS_PAD,
            FileFilter::Type(wanted) => {
                file_type != file::raw::r#type::FFS_PAD
                    && (*wanted == file::raw::r#type::ALL || *wanted == file_type)
            }
            FileFilter::InternalDispatch => matches!(
                file_type,
                file::raw::r#type::PEIM
                    | file::raw::r#type::COMBINED_PEIM_DRIVER
                    | file::raw::r#type::FIRMWARE_VOLUME_IMAGE
            ),
        }
    }
}

/// Walks the file directory of a validated volume.
///
/// Yields `Ok(file)` for every live file matching the filter, in ascending offset order. An integrity failure is
/// yielded once as `Err` and ends the walk; reaching free space or the end of the volume ends it quietly.
pub struct FileScanner<'a> {
    data: &'a [u8],
    offset: usize,
    erase_polarity: bool,
    large_file_support: bool,
    allow_large_files_in_ffs2: bool,
    filter: FileFilter,
    apriori: Option<FileRef<'a>>,
    done: bool,
}

impl<'a> FileScanner<'a> {
    /// Scan `data`, a volume described by `layout`, from its first file.
    pub fn new(data: &'a [u8], layout: &VolumeLayout, filter: FileFilter) -> Self {
        let data = &data[..layout.length.min(data.len())];
        Self {
            data,
            offset: layout.content_offset,
            erase_polarity: layout.erase_polarity,
            large_file_support: layout.large_file_support,
            allow_large_files_in_ffs2: false,
            filter,
            apriori: None,
            done: false,
        }
    }

    /// Skip, rather than reject, 64-bit size files found in a volume whose file system does not allow them.
    pub fn allow_large_files_in_ffs2(mut self, allow: bool) -> Self {
        self.allow_large_files_in_ffs2 = allow;
        self
    }

    /// Continue the walk at `offset` instead of the first file, typically the end of a file returned earlier.
    pub fn resume_at(mut self, offset: usize) -> Self {
        self.offset = self.offset.max(offset);
        self
    }

    /// The a-priori file seen so far by an [`FileFilter::InternalDispatch`] walk.
    pub fn apriori_file(&self) -> Option<&FileRef<'a>> {
        self.apriori.as_ref()
    }

    /// Offset the next step of the walk will look at.
    pub fn offset(&self) -> usize {
        self.offset
    }

    fn erase_byte(&self) -> u8 {
        if self.erase_polarity { 0xFF } else { 0x00 }
    }

    fn scan(&mut self) -> Result<Option<FileRef<'a>>, FirmwareFileSystemError> {
        let header_size = mem::size_of::<file::Header>();
        while self.offset.checked_add(header_size).is_some_and(|end| end < self.data.len()) {
            let offset = self.offset;
            let header_bytes = &self.data[offset..offset + header_size];
            let header = read_header(header_bytes)?;
            let large = header.attributes & attributes::raw::LARGE_FILE != 0;

            let Some(state) = FileState::from_state_byte(header.state, self.erase_polarity) else {
                if header_bytes.iter().all(|byte| *byte == self.erase_byte()) {
                    // free space, no more files.
                    return Ok(None);
                }
                log::error!("Unrecognized file state {:#x} at volume offset {:#x}.", header.state, offset);
                Err(FirmwareFileSystemError::InvalidState)?
            };

            match state {
                FileState::UnderConstruction | FileState::Invalid => {
                    self.offset += if large { mem::size_of::<file::Header2>() } else { header_size };
                }
                FileState::Deleted => {
                    let (size, header_length) = file_size(&header, &self.data[offset..])?;
                    if size < header_length || size > self.data.len() - offset {
                        log::error!("Deleted file at volume offset {:#x} claims size {:#x}.", offset, size);
                        Err(FirmwareFileSystemError::InvalidHeader)?;
                    }
                    self.offset = align_up(offset + size, ffs::FILE_ALIGNMENT)?;
                }
                FileState::Valid | FileState::MarkedForUpdate => {
                    let file = FileRef::new(self.data, offset, self.erase_polarity).inspect_err(|err| {
                        log::error!("File at volume offset {:#x} failed integrity checks: {}.", offset, err);
                    })?;
                    self.offset = align_up(offset + file.size(), ffs::FILE_ALIGNMENT)?;

                    if file.is_large_file() && !self.large_file_support {
                        if self.allow_large_files_in_ffs2 {
                            log::warn!(
                                "Skipping large file {} in a volume without large file support.",
                                GuidFmt(&file.name())
                            );
                            continue;
                        }
                        log::error!("Large file {} in a volume without large file support.", GuidFmt(&file.name()));
                        Err(FirmwareFileSystemError::Unsupported)?;
                    }

                    if self.filter.matches(&file) {
                        return Ok(Some(file));
                    }
                    if self.filter == FileFilter::InternalDispatch
                        && file.file_type_raw() == file::raw::r#type::FREEFORM
                        && file.name() == guid::PEI_APRIORI_FILE_NAME
                    {
                        self.apriori = Some(file);
                    }
                }
            }
        }
        Ok(None)
    }
}

impl<'a> Iterator for FileScanner<'a> {
    type Item = Result<FileRef<'a>, FirmwareFileSystemError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.scan() {
            Ok(Some(file)) => Some(Ok(file)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}
