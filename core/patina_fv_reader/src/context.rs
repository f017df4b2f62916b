//! The firmware volume reader context.
//!
//! [`FvContext`] owns every piece of state the reader needs: the format registry, the volume table, the GUID-defined
//! section decoder registry, the section cache, the queue of volumes waiting for a reader, and the record of nested
//! volumes already extracted. It is created with [`FvContext::new`] and torn down with [`FvContext::teardown`];
//! nothing is global.
//!
//! Volumes are borrowed for `'a`, the life of the context, unless they were handed over with
//! [`FvContext::install_owned_volume`] or produced by a decoder.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use alloc::{boxed::Box, collections::BTreeSet, rc::Rc, string::String, vec::Vec};

use patina_fv_fs::{
    buffer::ByteView,
    codec::{FileState, align_up},
    file::{FileFilter, FileRef},
    section::{GuidedSectionDecoder, decode_ucs2},
    volume::peek_header,
};
use patina_fv_pi::{
    GuidFmt,
    auth::AuthenticationStatus,
    fw_fs::{
        ffs::{self, section::raw_type},
        fv::file::EfiFvFileAttributes,
        guid,
    },
};
use r_efi::efi;

use crate::{
    FvError,
    config::FvConfig,
    decompress::SectionDecompressor,
    nested::{DepexEvaluator, VolumeAnnouncer},
    reader::{FfsVolumeReader, VolumeReader},
    registry::{FormatRegistry, OrdGuid, RegistrationNotify},
    section_cache::SectionCache,
    unknown::{UnknownFormatQueue, UnknownFormatRecord},
    volume_table::{VolumeHandle, VolumeRecord, VolumeTable},
};

/// Outcome of handing a volume to [`FvContext::process_volume`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeDisposition {
    /// The volume was validated and registered, or already was.
    Installed(VolumeHandle),
    /// No reader is registered for the format yet; the volume is replayed when one registers.
    Queued,
}

/// A file found in a registered volume.
///
/// A handle is a description of where the file lives, never an owner of its bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHandle {
    volume: VolumeHandle,
    offset: usize,
    size: usize,
    content_offset: usize,
    name: efi::Guid,
    file_type: u8,
    attributes: u8,
    fv_attributes: EfiFvFileAttributes,
    state: FileState,
}

impl FileHandle {
    fn new(volume: VolumeHandle, file: &FileRef<'_>) -> Self {
        Self {
            volume,
            offset: file.offset(),
            size: file.size(),
            content_offset: file.content_offset(),
            name: file.name(),
            file_type: file.file_type_raw(),
            attributes: file.attributes_raw(),
            fv_attributes: file.fv_attributes(),
            state: file.state(),
        }
    }

    /// The volume holding the file.
    pub fn volume(&self) -> VolumeHandle {
        self.volume
    }

    /// Offset of the file header in the volume.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Size of the file, header included.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn name(&self) -> efi::Guid {
        self.name
    }

    pub fn file_type(&self) -> u8 {
        self.file_type
    }

    /// Raw `EFI_FFS_FILE_ATTRIBUTES`.
    pub fn attributes(&self) -> u8 {
        self.attributes
    }

    /// The attributes translated to `EFI_FV_FILE_ATTRIBUTES`.
    pub fn fv_attributes(&self) -> EfiFvFileAttributes {
        self.fv_attributes
    }

    pub fn state(&self) -> FileState {
        self.state
    }
}

/// Files returned by [`FvContext::internal_dispatch_scan`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchScan {
    /// PEIMs, combined PEIM/driver files and volume images in volume order.
    pub files: Vec<FileHandle>,
    /// The a-priori file, if the volume has one.
    pub apriori: Option<FileHandle>,
}

/// A section returned by [`FvContext::find_section`].
#[derive(Debug, Clone)]
pub struct ExtractedSection<'a> {
    pub(crate) data: ByteView<'a>,
    pub(crate) authentication_status: AuthenticationStatus,
}

impl<'a> ExtractedSection<'a> {
    /// The section bytes following the common header.
    pub fn data(&self) -> &[u8] {
        self.data.as_slice()
    }

    /// The bytes as a view, usable after the context is gone when they were decoded.
    pub fn view(&self) -> &ByteView<'a> {
        &self.data
    }

    pub fn into_view(self) -> ByteView<'a> {
        self.data
    }

    /// Authentication status of the volume OR'd with the status of every encapsulation the search went through.
    pub fn authentication_status(&self) -> AuthenticationStatus {
        self.authentication_status
    }
}

/// Reader state for a set of firmware volumes.
pub struct FvContext<'a> {
    pub(crate) config: FvConfig,
    pub(crate) readers: FormatRegistry<dyn VolumeReader>,
    pub(crate) decoders: FormatRegistry<dyn GuidedSectionDecoder>,
    pub(crate) volumes: VolumeTable<'a>,
    pub(crate) section_cache: SectionCache,
    pub(crate) unknown: UnknownFormatQueue<'a>,
    pub(crate) decompressor: Option<Box<dyn SectionDecompressor>>,
    pub(crate) depex_evaluator: Option<Box<dyn DepexEvaluator>>,
    pub(crate) announcer: Option<Box<dyn VolumeAnnouncer>>,
    pub(crate) nested_seen: BTreeSet<(VolumeHandle, OrdGuid)>,
}

impl Default for FvContext<'_> {
    fn default() -> Self {
        Self::new(FvConfig::default())
    }
}

impl<'a> FvContext<'a> {
    /// An empty context. No readers are registered; see [`Self::install_default_readers`].
    pub fn new(config: FvConfig) -> Self {
        Self {
            config,
            readers: FormatRegistry::new(),
            decoders: FormatRegistry::new(),
            volumes: VolumeTable::new(config.max_volumes),
            section_cache: SectionCache::new(config.section_cache_capacity),
            unknown: UnknownFormatQueue::new(config.max_unknown_formats),
            decompressor: None,
            depex_evaluator: None,
            announcer: None,
            nested_seen: BTreeSet::new(),
        }
    }

    pub fn config(&self) -> &FvConfig {
        &self.config
    }

    /// Registers the readers for FFS2 and FFS3 volumes.
    pub fn install_default_readers(&mut self) -> usize {
        let allow = self.config.allow_large_files_in_ffs2;
        let ffs2 = FfsVolumeReader::ffs2().allow_large_files_in_ffs2(allow);
        let ffs3 = FfsVolumeReader::ffs3();
        self.register_reader(guid::FIRMWARE_FILE_SYSTEM2, Rc::new(ffs2))
            + self.register_reader(guid::FIRMWARE_FILE_SYSTEM3, Rc::new(ffs3))
    }

    /// Registers `reader` for `format`, then processes every queued volume of that format, oldest first.
    ///
    /// Returns the number of queued volumes consumed. A queued volume that fails validation is logged and dropped.
    pub fn register_reader(&mut self, format: efi::Guid, reader: Rc<dyn VolumeReader>) -> usize {
        self.readers.register(format, reader);

        let pending = self.unknown.take_matching(&format);
        let consumed = pending.len();
        for record in pending {
            let address = record.data.address();
            if let Err(err) = self.process_volume_at(
                record.data,
                record.format,
                record.authentication_status,
                record.depth,
                record.parent,
            ) {
                log::error!("Queued volume at {:#x} failed to install: {}.", address, err);
            }
        }
        if consumed > 0 {
            log::info!("Processed {} queued volume(s) of format {}.", consumed, GuidFmt(&format));
        }
        consumed
    }

    pub fn lookup_reader(&self, format: &efi::Guid) -> Result<Rc<dyn VolumeReader>, FvError> {
        self.readers.lookup(format).ok_or(FvError::NotFound)
    }

    /// Runs `notify` once, when a reader for `format` is next registered.
    pub fn notify_on_register(&mut self, format: efi::Guid, notify: RegistrationNotify) {
        self.readers.notify_on_register(format, notify);
    }

    /// Registers a decoder for GUID-defined sections whose definition GUID is `definition`.
    pub fn register_section_decoder(&mut self, definition: efi::Guid, decoder: Rc<dyn GuidedSectionDecoder>) {
        self.decoders.register(definition, decoder);
    }

    pub fn set_decompressor(&mut self, decompressor: Box<dyn SectionDecompressor>) {
        self.decompressor = Some(decompressor);
    }

    pub fn set_depex_evaluator(&mut self, evaluator: Box<dyn DepexEvaluator>) {
        self.depex_evaluator = Some(evaluator);
    }

    pub fn set_volume_announcer(&mut self, announcer: Box<dyn VolumeAnnouncer>) {
        self.announcer = Some(announcer);
    }

    /// Validates `data` as a volume of `format` and registers it.
    ///
    /// A volume already registered at the same address returns its existing handle. When no reader is registered
    /// for `format` the volume is queued and [`VolumeDisposition::Queued`] returned.
    pub fn process_volume(
        &mut self,
        data: ByteView<'a>,
        format: efi::Guid,
        authentication_status: AuthenticationStatus,
    ) -> Result<VolumeDisposition, FvError> {
        self.process_volume_at(data, format, authentication_status, 0, None)
    }

    pub(crate) fn process_volume_at(
        &mut self,
        data: ByteView<'a>,
        format: efi::Guid,
        authentication_status: AuthenticationStatus,
        depth: usize,
        parent: Option<VolumeHandle>,
    ) -> Result<VolumeDisposition, FvError> {
        if let Some(handle) = self.volumes.find(data.address()) {
            log::debug!("Volume at {:#x} is already installed.", data.address());
            return Ok(VolumeDisposition::Installed(handle));
        }

        let Some(reader) = self.readers.lookup(&format) else {
            log::info!("No reader for volume format {}, deferring volume at {:#x}.", GuidFmt(&format), data.address());
            self.unknown.push(UnknownFormatRecord { format, data, authentication_status, depth, parent })?;
            return Ok(VolumeDisposition::Queued);
        };

        let layout = reader.validate(data.as_slice())?;
        let data = data.subview(0..layout.length)?;
        let address = data.address();
        let handle =
            self.volumes.push(VolumeRecord::new(format, data, authentication_status, reader, layout, depth, parent))?;
        log::info!(
            "Installed volume {} at {:#x} ({:#x} bytes, format {}).",
            handle.index(),
            address,
            layout.length,
            GuidFmt(&format)
        );
        Ok(VolumeDisposition::Installed(handle))
    }

    /// Installs a volume, taking the format from the file system GUID of its header.
    pub fn install_volume(
        &mut self,
        data: &'a [u8],
        authentication_status: AuthenticationStatus,
    ) -> Result<VolumeDisposition, FvError> {
        let header = peek_header(data)?;
        self.process_volume(ByteView::Borrowed(data), header.file_system_guid, authentication_status)
    }

    /// Installs a volume the context takes ownership of.
    pub fn install_owned_volume(
        &mut self,
        data: Vec<u8>,
        authentication_status: AuthenticationStatus,
    ) -> Result<VolumeDisposition, FvError> {
        let header = peek_header(&data)?;
        self.process_volume(ByteView::from(data), header.file_system_guid, authentication_status)
    }

    pub fn volume(&self, handle: VolumeHandle) -> Result<&VolumeRecord<'a>, FvError> {
        self.volumes.get(handle)
    }

    /// Handles of every registered volume, in registration order.
    pub fn volumes(&self) -> Vec<VolumeHandle> {
        self.volumes.handles().collect()
    }

    /// Number of volumes waiting for a reader.
    pub fn queued_volumes(&self) -> usize {
        self.unknown.len()
    }

    /// Every file of a volume, pad files excluded.
    ///
    /// An integrity failure anywhere in the directory fails the whole call.
    pub fn files(&self, volume: VolumeHandle) -> Result<Vec<FileHandle>, FvError> {
        let record = self.volumes.get(volume)?;
        record
            .reader()
            .enumerate_files(record.data(), record.layout(), FileFilter::All)
            .map(|file| file.map(|file| FileHandle::new(volume, &file)).map_err(FvError::from))
            .collect()
    }

    pub fn find_file_by_name(&self, volume: VolumeHandle, name: &efi::Guid) -> Result<FileHandle, FvError> {
        let record = self.volumes.get(volume)?;
        let file = record.reader().find_by_name(record.data(), record.layout(), name)?;
        Ok(FileHandle::new(volume, &file))
    }

    /// The first file of `file_type`. The `ALL` file type matches any type but pad files.
    pub fn find_file_by_type(&self, volume: VolumeHandle, file_type: u8) -> Result<FileHandle, FvError> {
        self.find_next_file(volume, FileFilter::Type(file_type), None)
    }

    /// The first file matching `filter` after `after`, or from the start of the volume.
    pub fn find_next_file(
        &self,
        volume: VolumeHandle,
        filter: FileFilter,
        after: Option<&FileHandle>,
    ) -> Result<FileHandle, FvError> {
        let record = self.volumes.get(volume)?;
        let mut scanner = record.reader().enumerate_files(record.data(), record.layout(), filter);
        if let Some(after) = after {
            if after.volume != volume {
                Err(FvError::InvalidParameter)?;
            }
            scanner = scanner.resume_at(align_up(after.offset + after.size, ffs::FILE_ALIGNMENT)?);
        }
        match scanner.next() {
            Some(file) => Ok(FileHandle::new(volume, &file?)),
            None => Err(FvError::NotFound),
        }
    }

    /// Files a PEI-style dispatcher considers, with the a-priori file captured on the side.
    pub fn internal_dispatch_scan(&self, volume: VolumeHandle) -> Result<DispatchScan, FvError> {
        let record = self.volumes.get(volume)?;
        let mut scanner = record.reader().enumerate_files(record.data(), record.layout(), FileFilter::InternalDispatch);
        let mut files = Vec::new();
        for file in scanner.by_ref() {
            files.push(FileHandle::new(volume, &file?));
        }
        let apriori = scanner.apriori_file().map(|file| FileHandle::new(volume, file));
        Ok(DispatchScan { files, apriori })
    }

    /// The bytes following the file header: the section stream for files that have one.
    pub fn file_data(&self, file: &FileHandle) -> Result<ByteView<'a>, FvError> {
        let record = self.volumes.get(file.volume)?;
        let end = file.offset.checked_add(file.size).ok_or(FvError::InvalidParameter)?;
        if end > record.len() || file.content_offset > file.size {
            Err(FvError::InvalidParameter)?;
        }
        Ok(record.view().subview(file.offset + file.content_offset..end)?)
    }

    /// Finds the `instance`th (zero-based) section of `section_type` in `file`.
    ///
    /// Compressed and GUID-defined sections are opened on the way, depth first, and their decoded content is cached.
    /// Returns the section bytes following the common header.
    pub fn find_section(
        &mut self,
        file: &FileHandle,
        section_type: u8,
        instance: usize,
    ) -> Result<ExtractedSection<'a>, FvError> {
        let stream = self.file_data(file)?;
        let volume_status = self.volumes.get(file.volume)?.authentication_status();
        let mut remaining = instance.checked_add(1).ok_or(FvError::InvalidParameter)?;
        let (data, authentication_status) = self.search_stream(&stream, section_type, &mut remaining, 0)?;
        Ok(ExtractedSection { data, authentication_status: authentication_status | volume_status })
    }

    /// The string of the first user interface section of `file`.
    pub fn user_interface_name(&mut self, file: &FileHandle) -> Result<String, FvError> {
        let section = self.find_section(file, raw_type::USER_INTERFACE, 0)?;
        Ok(decode_ucs2(section.data())?)
    }

    /// Build number and version string of the first version section of `file`.
    pub fn version(&mut self, file: &FileHandle) -> Result<(u16, String), FvError> {
        let section = self.find_section(file, raw_type::VERSION, 0)?;
        let data = section.data();
        if data.len() < 2 {
            Err(FvError::VolumeCorrupted)?;
        }
        let build_number = u16::from_le_bytes([data[0], data[1]]);
        Ok((build_number, decode_ucs2(&data[2..])?))
    }

    /// Releases every table the context owns.
    pub fn teardown(mut self) {
        log::info!(
            "Tearing down firmware volume context: {} volume(s), {} cached section(s), {} queued volume(s).",
            self.volumes.len(),
            self.section_cache.len(),
            self.unknown.len()
        );
        self.section_cache.clear();
        self.unknown.clear();
        self.nested_seen.clear();
        self.volumes.clear();
        self.readers.clear();
        self.decoders.clear();
    }
}
