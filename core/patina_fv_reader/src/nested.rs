//! Nested volume discovery.
//!
//! Volume image files (`EFI_FV_FILETYPE_FIRMWARE_VOLUME_IMAGE`) carry a complete volume in a
//! `EFI_SECTION_FIRMWARE_VOLUME_IMAGE` section, possibly inside compressed or GUID-defined encapsulations. Discovery
//! extracts that volume, copies it to a buffer honoring the alignment the volume asks for when needed, registers it
//! and scans it in turn.
//!
//! Each discovered volume is reported twice through [`VolumeAnnouncer`]: once as an event for whoever consumes
//! volumes now, once as a durable record for later boot phases.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use alloc::{rc::Rc, vec::Vec};

#[cfg(any(test, feature = "mockall"))]
use mockall::automock;
use patina_fv_fs::{
    buffer::{ByteView, SharedBuffer},
    file::FileFilter,
    volume::peek_header,
};
use patina_fv_pi::{
    GuidFmt,
    auth::AuthenticationStatus,
    fw_fs::{
        ffs::{file::raw::r#type, section::raw_type},
        fvb::attributes::{self as fvb_attributes, raw::fvb2},
    },
};
use r_efi::efi;

use crate::{
    FileHandle, FvContext, FvError, VolumeDisposition, registry::OrdGuid, volume_table::VolumeHandle,
};

/// Volumes are never placed on less than this boundary.
const MINIMUM_VOLUME_ALIGNMENT: usize = 8;

/// Evaluates the dependency expression of a volume image file.
#[cfg_attr(any(test, feature = "mockall"), automock)]
pub trait DepexEvaluator {
    /// Returns true when the volume may be processed now.
    fn evaluate(&self, expression: &[u8]) -> bool;
}

/// A volume found inside a volume image file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredVolume {
    /// File system GUID from the volume header.
    pub format: efi::Guid,
    pub base_address: usize,
    pub length: usize,
    pub authentication_status: AuthenticationStatus,
    /// Name of the volume holding the image file, if it has one.
    pub parent_volume: Option<efi::Guid>,
    /// Name of the image file.
    pub file_name: efi::Guid,
    /// Name of the discovered volume, if it has one.
    pub volume_name: Option<efi::Guid>,
    /// Whether a reader took the volume, or it waits for one.
    pub disposition: VolumeDisposition,
}

/// Publishes discovered volumes.
#[cfg_attr(any(test, feature = "mockall"), automock)]
pub trait VolumeAnnouncer {
    /// Signals that a volume is available now.
    fn announce(&self, volume: &DiscoveredVolume);
    /// Records the volume for boot phases that run after this one.
    fn record(&self, volume: &DiscoveredVolume);
}

impl<'a> FvContext<'a> {
    /// Discovers nested volumes in every registered volume, including the ones discovered along the way.
    ///
    /// Returns the number of volumes discovered by this call. A volume whose directory is corrupt is logged and
    /// skipped; the other volumes are still scanned.
    pub fn discover_nested_volumes(&mut self) -> usize {
        let mut discovered = 0;
        let mut index = 0;
        while let Some(handle) = self.volumes.handle_at(index) {
            match self.discover_nested_volumes_in(handle) {
                Ok(count) => discovered += count,
                Err(err) => log::error!("Nested volume discovery in volume {} failed: {}.", handle.index(), err),
            }
            index += 1;
        }
        discovered
    }

    /// Discovers nested volumes in the volume image files of `volume`, then in the volumes found there.
    ///
    /// An image file is handled once. An image whose dependency expression is not satisfied yet is left for a later
    /// call.
    pub fn discover_nested_volumes_in(&mut self, volume: VolumeHandle) -> Result<usize, FvError> {
        let mut images = Vec::new();
        let mut after = None;
        loop {
            match self.find_next_file(volume, FileFilter::Type(r#type::FIRMWARE_VOLUME_IMAGE), after.as_ref()) {
                Ok(file) => {
                    images.push(file);
                    after = Some(file);
                }
                Err(FvError::NotFound) => break,
                Err(err) => return Err(err),
            }
        }

        let mut discovered = 0;
        for file in images {
            if self.nested_seen.contains(&(volume, OrdGuid(file.name()))) {
                continue;
            }
            match self.extract_nested_volume(volume, &file) {
                Ok(count) => discovered += count,
                Err(err) => {
                    log::error!("Volume image file {} could not be processed: {}.", GuidFmt(&file.name()), err)
                }
            }
        }
        Ok(discovered)
    }

    fn extract_nested_volume(&mut self, volume: VolumeHandle, file: &FileHandle) -> Result<usize, FvError> {
        let (parent_depth, parent_volume) = {
            let record = self.volumes.get(volume)?;
            (record.depth(), record.name())
        };

        let image = match self.find_section(file, raw_type::FIRMWARE_VOLUME_IMAGE, 0) {
            Ok(image) => image,
            Err(err) => {
                log::warn!("No volume image section in file {}: {}.", GuidFmt(&file.name()), err);
                return Ok(0);
            }
        };

        if !self.depex_satisfied(file)? {
            log::info!("Dependencies of volume image file {} are not satisfied yet.", GuidFmt(&file.name()));
            return Ok(0);
        }

        let header = peek_header(image.data())?;
        let data = place_volume(image.view().clone(), header.attributes)?;

        if parent_depth + 1 > self.config.max_nesting_depth {
            log::warn!("Volume in file {} exceeds the nesting limit, ignoring it.", GuidFmt(&file.name()));
            self.nested_seen.insert((volume, OrdGuid(file.name())));
            return Ok(0);
        }

        let base_address = data.address();
        let disposition = match self.process_volume_at(
            data.clone(),
            header.file_system_guid,
            image.authentication_status(),
            parent_depth + 1,
            Some(volume),
        ) {
            Ok(disposition) => disposition,
            // left unmarked so a later discovery pass retries once space frees up.
            Err(err @ FvError::OutOfResources) => return Err(err),
            Err(err) => {
                self.nested_seen.insert((volume, OrdGuid(file.name())));
                Err(err)?
            }
        };
        self.nested_seen.insert((volume, OrdGuid(file.name())));
        let (length, volume_name) = match disposition {
            VolumeDisposition::Installed(child) => {
                let record = self.volumes.get(child)?;
                (record.len(), record.name())
            }
            VolumeDisposition::Queued => (data.len(), None),
        };

        let discovered = DiscoveredVolume {
            format: header.file_system_guid,
            base_address,
            length,
            authentication_status: image.authentication_status(),
            parent_volume,
            file_name: file.name(),
            volume_name,
            disposition,
        };
        log::info!(
            "Discovered volume at {:#x} ({:#x} bytes) in file {}.",
            discovered.base_address,
            discovered.length,
            GuidFmt(&discovered.file_name)
        );
        if let Some(announcer) = &self.announcer {
            announcer.announce(&discovered);
            announcer.record(&discovered);
        }

        let mut count = 1;
        if let VolumeDisposition::Installed(child) = disposition {
            match self.discover_nested_volumes_in(child) {
                Ok(nested) => count += nested,
                Err(err) => log::error!("Nested volume discovery in volume {} failed: {}.", child.index(), err),
            }
        }
        Ok(count)
    }

    fn depex_satisfied(&mut self, file: &FileHandle) -> Result<bool, FvError> {
        match self.find_section(file, self.config.depex_section_type, 0) {
            Ok(depex) => Ok(self.depex_evaluator.as_ref().map_or(true, |evaluator| evaluator.evaluate(depex.data()))),
            Err(FvError::NotFound) => Ok(true),
            Err(err) => Err(err),
        }
    }
}

/// Returns `data`, or an aligned copy of it when the volume header asks for an alignment `data` does not have.
fn place_volume(data: ByteView<'_>, attributes: u32) -> Result<ByteView<'_>, FvError> {
    if attributes & fvb2::WEAK_ALIGNMENT != 0 {
        return Ok(data);
    }
    let alignment = usize::try_from(fvb_attributes::alignment(attributes))
        .map_err(|_| FvError::Unsupported)?
        .max(MINIMUM_VOLUME_ALIGNMENT);
    if data.address() % alignment == 0 {
        return Ok(data);
    }
    log::info!("Copying volume at {:#x} to a {:#x}-byte aligned buffer.", data.address(), alignment);
    let copy = SharedBuffer::aligned_copy(data.as_slice(), alignment)?;
    Ok(ByteView::shared(Rc::new(copy)))
}

#[cfg(test)]
mod tests {
    use patina_fv_fs::test_support::{FileBuilder, VolumeBuilder, guid_defined_section, leaf_section, set_logger};
    use patina_fv_pi::auth;

    use super::*;
    use crate::config::FvConfig;

    fn guid(n: u8) -> efi::Guid {
        efi::Guid::from_bytes(&[n; 16])
    }

    fn volume_image_file(name: efi::Guid, volume: &[u8]) -> FileBuilder {
        FileBuilder::new(name, r#type::FIRMWARE_VOLUME_IMAGE).section(leaf_section(raw_type::FIRMWARE_VOLUME_IMAGE, volume))
    }

    fn installed<'a>(context: &mut FvContext<'a>, fv: &'a [u8]) -> VolumeHandle {
        match context.install_volume(fv, 0).unwrap() {
            VolumeDisposition::Installed(handle) => handle,
            VolumeDisposition::Queued => panic!("volume was queued"),
        }
    }

    #[test]
    fn nested_volume_is_discovered_and_announced_once() {
        set_logger();
        let inner = VolumeBuilder::new()
            .name(guid(0x10))
            .file(FileBuilder::new(guid(0x11), r#type::DRIVER).section(leaf_section(raw_type::PE32, b"inner driver")))
            .build();
        let outer = VolumeBuilder::new().name(guid(0x20)).file(volume_image_file(guid(0x21), &inner)).build();

        let mut context = FvContext::default();
        context.install_default_readers();
        let outer_handle = installed(&mut context, &outer);

        let mut announcer = MockVolumeAnnouncer::new();
        announcer
            .expect_announce()
            .withf(|volume| {
                volume.file_name == efi::Guid::from_bytes(&[0x21; 16])
                    && volume.parent_volume == Some(efi::Guid::from_bytes(&[0x20; 16]))
                    && volume.volume_name == Some(efi::Guid::from_bytes(&[0x10; 16]))
            })
            .times(1)
            .return_const(());
        announcer.expect_record().times(1).return_const(());
        context.set_volume_announcer(Box::new(announcer));

        assert_eq!(context.discover_nested_volumes(), 1);
        // the record of extracted images keeps a second pass quiet.
        assert_eq!(context.discover_nested_volumes(), 0);

        let handles = context.volumes();
        assert_eq!(handles.len(), 2);
        let child = context.volume(handles[1]).unwrap();
        assert_eq!(child.parent(), Some(outer_handle));
        assert_eq!(child.depth(), 1);

        let driver = context.find_file_by_name(handles[1], &guid(0x11)).unwrap();
        assert_eq!(context.find_section(&driver, raw_type::PE32, 0).unwrap().data(), b"inner driver");
    }

    #[test]
    fn misaligned_volume_is_copied_to_an_aligned_buffer() {
        // 4 KiB alignment, not weak.
        let inner = VolumeBuilder::new().attributes(0x000C_0000).build();
        let outer = VolumeBuilder::new().file(volume_image_file(guid(1), &inner)).build();

        let mut context = FvContext::default();
        context.install_default_readers();
        let outer_handle = installed(&mut context, &outer);
        assert_eq!(context.discover_nested_volumes_in(outer_handle).unwrap(), 1);

        let child = context.volume(context.volumes()[1]).unwrap();
        assert_eq!(child.base_address() % 0x1000, 0);
        assert!(child.view().owner().is_some());
        assert_eq!(child.data(), &inner[..]);
    }

    #[test]
    fn weakly_aligned_volume_is_used_in_place() {
        let inner = VolumeBuilder::new().attributes(0x8000_0000 | 0x000C_0000).build();
        let outer = VolumeBuilder::new().file(volume_image_file(guid(1), &inner)).build();

        let mut context = FvContext::default();
        context.install_default_readers();
        let outer_handle = installed(&mut context, &outer);
        context.discover_nested_volumes_in(outer_handle).unwrap();

        let outer_record = context.volume(outer_handle).unwrap();
        let outer_range = outer_record.base_address()..outer_record.base_address() + outer_record.len();
        let child = context.volume(context.volumes()[1]).unwrap();
        assert!(outer_range.contains(&child.base_address()));
    }

    #[test]
    fn unsatisfied_depex_defers_the_volume() {
        let inner = VolumeBuilder::new().build();
        let image = volume_image_file(guid(1), &inner).section(leaf_section(raw_type::DXE_DEPEX, &[0x06, 0x08]));
        let outer = VolumeBuilder::new().file(image).build();

        let mut context = FvContext::default();
        context.install_default_readers();
        installed(&mut context, &outer);

        let mut evaluator = MockDepexEvaluator::new();
        let mut evaluations = 0;
        evaluator.expect_evaluate().withf(|expression| expression == [0x06, 0x08]).times(2).returning(move |_| {
            evaluations += 1;
            evaluations > 1
        });
        context.set_depex_evaluator(Box::new(evaluator));

        assert_eq!(context.discover_nested_volumes(), 0);
        assert_eq!(context.volumes().len(), 1);
        assert_eq!(context.discover_nested_volumes(), 1);
        assert_eq!(context.volumes().len(), 2);
    }

    #[test]
    fn nested_volume_of_unknown_format_waits_for_its_reader() {
        let custom = guid(0xC5);
        let inner = VolumeBuilder::new().file_system(custom).build();
        let outer = VolumeBuilder::new().file(volume_image_file(guid(1), &inner)).build();

        let mut context = FvContext::default();
        context.install_default_readers();
        let outer_handle = installed(&mut context, &outer);

        let mut announcer = MockVolumeAnnouncer::new();
        announcer
            .expect_announce()
            .withf(|volume| volume.disposition == VolumeDisposition::Queued)
            .times(1)
            .return_const(());
        announcer.expect_record().times(1).return_const(());
        context.set_volume_announcer(Box::new(announcer));

        assert_eq!(context.discover_nested_volumes(), 1);
        assert_eq!(context.queued_volumes(), 1);

        assert_eq!(context.register_reader(custom, Rc::new(crate::reader::FfsVolumeReader::new(custom))), 1);
        let child = context.volume(context.volumes()[1]).unwrap();
        assert_eq!(child.parent(), Some(outer_handle));
        assert_eq!(child.format(), custom);
    }

    #[test]
    fn full_queue_leaves_the_image_for_a_later_pass() {
        let custom = guid(0xC5);
        let waiting = VolumeBuilder::new().file_system(custom).name(guid(0x30)).build();
        let inner = VolumeBuilder::new().file_system(custom).name(guid(0x31)).build();
        let outer = VolumeBuilder::new().file(volume_image_file(guid(1), &inner)).build();

        let mut context = FvContext::new(FvConfig { max_unknown_formats: 1, ..Default::default() });
        context.install_default_readers();
        assert_eq!(context.install_volume(&waiting, 0).unwrap(), VolumeDisposition::Queued);
        installed(&mut context, &outer);

        // the queue is full, so the nested volume cannot be parked.
        assert_eq!(context.discover_nested_volumes(), 0);
        assert_eq!(context.queued_volumes(), 1);

        assert_eq!(context.register_reader(custom, Rc::new(crate::reader::FfsVolumeReader::new(custom))), 1);
        assert_eq!(context.queued_volumes(), 0);

        assert_eq!(context.discover_nested_volumes(), 1);
        let names = context.volumes().iter().map(|handle| context.volume(*handle).unwrap().name()).collect::<Vec<_>>();
        assert!(names.contains(&Some(guid(0x31))));
        assert_eq!(context.discover_nested_volumes(), 0);
    }

    #[test]
    fn nested_volume_inherits_encapsulation_status() {
        let inner = VolumeBuilder::new().build();
        let wrapped = leaf_section(raw_type::FIRMWARE_VOLUME_IMAGE, &inner);
        let file = FileBuilder::new(guid(1), r#type::FIRMWARE_VOLUME_IMAGE).section(guid_defined_section(
            guid(0x99),
            patina_fv_pi::fw_fs::ffs::section::guid_defined_attributes::AUTH_STATUS_VALID,
            &[],
            &wrapped,
        ));
        let outer = VolumeBuilder::new().file(file).build();

        let mut context = FvContext::default();
        context.install_default_readers();
        installed(&mut context, &outer);
        assert_eq!(context.discover_nested_volumes(), 1);

        let child = context.volume(context.volumes()[1]).unwrap();
        assert_eq!(child.authentication_status(), auth::IMAGE_SIGNED | auth::NOT_TESTED);
    }

    #[test]
    fn nesting_depth_is_capped() {
        let mut image = VolumeBuilder::new().build();
        for n in 0..3u8 {
            image = VolumeBuilder::new().file(volume_image_file(guid(n + 1), &image)).build();
        }

        let mut context = FvContext::new(FvConfig { max_nesting_depth: 2, ..Default::default() });
        context.install_default_readers();
        installed(&mut context, &image);
        assert_eq!(context.discover_nested_volumes(), 2);
        assert_eq!(context.volumes().iter().map(|handle| context.volume(*handle).unwrap().depth()).collect::<Vec<_>>(), [0, 1, 2]);
    }

    #[test]
    fn corrupt_nested_volume_does_not_stop_the_outer_scan() {
        let mut broken = VolumeBuilder::new().build();
        broken[50] ^= 0xFF;
        let good = VolumeBuilder::new().build();
        let outer = VolumeBuilder::new()
            .file(volume_image_file(guid(1), &broken))
            .file(volume_image_file(guid(2), &good))
            .build();

        let mut context = FvContext::default();
        context.install_default_readers();
        installed(&mut context, &outer);
        assert_eq!(context.discover_nested_volumes(), 1);
        assert_eq!(context.volumes().len(), 2);
    }
}
