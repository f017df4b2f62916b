//! Table of registered volumes.
//!
//! Records are appended once a reader validated a volume and never removed while the context lives, so a
//! [`VolumeHandle`] stays valid for the life of the context.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use alloc::{rc::Rc, vec::Vec};
use core::fmt;

use patina_fv_fs::{buffer::ByteView, volume::VolumeLayout};
use patina_fv_pi::{GuidFmt, auth::AuthenticationStatus};
use r_efi::efi;

use crate::{FvError, reader::VolumeReader};

/// Identifies a volume registered with a [`crate::FvContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VolumeHandle(usize);

impl VolumeHandle {
    /// Position of the volume in registration order.
    pub fn index(&self) -> usize {
        self.0
    }
}

/// A validated volume.
pub struct VolumeRecord<'a> {
    format: efi::Guid,
    data: ByteView<'a>,
    authentication_status: AuthenticationStatus,
    reader: Rc<dyn VolumeReader>,
    layout: VolumeLayout,
    depth: usize,
    parent: Option<VolumeHandle>,
}

impl<'a> VolumeRecord<'a> {
    pub(crate) fn new(
        format: efi::Guid,
        data: ByteView<'a>,
        authentication_status: AuthenticationStatus,
        reader: Rc<dyn VolumeReader>,
        layout: VolumeLayout,
        depth: usize,
        parent: Option<VolumeHandle>,
    ) -> Self {
        Self { format, data, authentication_status, reader, layout, depth, parent }
    }

    /// Format GUID the volume was registered under.
    pub fn format(&self) -> efi::Guid {
        self.format
    }

    /// The volume bytes, truncated to the declared length.
    pub fn data(&self) -> &[u8] {
        self.data.as_slice()
    }

    pub fn view(&self) -> &ByteView<'a> {
        &self.data
    }

    pub fn base_address(&self) -> usize {
        self.data.address()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Authentication status the volume was installed with.
    pub fn authentication_status(&self) -> AuthenticationStatus {
        self.authentication_status
    }

    pub fn layout(&self) -> &VolumeLayout {
        &self.layout
    }

    /// Volume name from the extended header.
    pub fn name(&self) -> Option<efi::Guid> {
        self.layout.name
    }

    pub(crate) fn reader(&self) -> &Rc<dyn VolumeReader> {
        &self.reader
    }

    /// Number of volumes this one is nested in.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// The volume this one was extracted from.
    pub fn parent(&self) -> Option<VolumeHandle> {
        self.parent
    }
}

impl fmt::Debug for VolumeRecord<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VolumeRecord")
            .field("format", &GuidFmt(&self.format))
            .field("data", &self.data)
            .field("authentication_status", &self.authentication_status)
            .field("layout", &self.layout)
            .field("depth", &self.depth)
            .field("parent", &self.parent)
            .finish()
    }
}

/// Append-only, bounded list of [`VolumeRecord`]s.
pub(crate) struct VolumeTable<'a> {
    records: Vec<VolumeRecord<'a>>,
    capacity: usize,
}

impl<'a> VolumeTable<'a> {
    pub fn new(capacity: usize) -> Self {
        Self { records: Vec::new(), capacity }
    }

    /// Handle of the volume starting at `address`, if one is registered.
    pub fn find(&self, address: usize) -> Option<VolumeHandle> {
        self.records.iter().position(|record| record.base_address() == address).map(VolumeHandle)
    }

    pub fn push(&mut self, record: VolumeRecord<'a>) -> Result<VolumeHandle, FvError> {
        if self.records.len() >= self.capacity {
            log::warn!("Volume table is full ({} entries).", self.capacity);
            Err(FvError::OutOfResources)?;
        }
        self.records.try_reserve(1).map_err(|_| FvError::OutOfResources)?;
        self.records.push(record);
        Ok(VolumeHandle(self.records.len() - 1))
    }

    pub fn get(&self, handle: VolumeHandle) -> Result<&VolumeRecord<'a>, FvError> {
        self.records.get(handle.0).ok_or(FvError::InvalidParameter)
    }

    pub fn handle_at(&self, index: usize) -> Option<VolumeHandle> {
        (index < self.records.len()).then_some(VolumeHandle(index))
    }

    pub fn handles(&self) -> impl Iterator<Item = VolumeHandle> {
        (0..self.records.len()).map(VolumeHandle)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}
