//! Byte views shared between volumes, files, sections and decoded content.
//!
//! Volumes handed to the reader are usually borrowed flash images, while content produced by a decoder or copied to
//! honor an alignment requirement lives on the heap. [`ByteView`] covers both so callers receive the same type no
//! matter where the bytes came from, and slicing either one never copies.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use alloc::{boxed::Box, rc::Rc, vec::Vec};
use core::{fmt, ops::Deref, ops::Range};

use crate::FirmwareFileSystemError;

/// Heap storage whose start may be placed at a requested alignment.
pub struct SharedBuffer {
    storage: Box<[u8]>,
    offset: usize,
    len: usize,
}

impl SharedBuffer {
    /// Takes ownership of `data` without copying it.
    pub fn from_vec(data: Vec<u8>) -> Self {
        let len = data.len();
        Self { storage: data.into_boxed_slice(), offset: 0, len }
    }

    /// Copies `source` into a new allocation whose first byte is aligned to `alignment`.
    ///
    /// Fails with [`FirmwareFileSystemError::OutOfResources`] when the allocation fails and with
    /// [`FirmwareFileSystemError::InvalidParameter`] when `alignment` is not a power of two.
    pub fn aligned_copy(source: &[u8], alignment: usize) -> Result<Self, FirmwareFileSystemError> {
        if !alignment.is_power_of_two() {
            Err(FirmwareFileSystemError::InvalidParameter)?;
        }
        let total = source.len().checked_add(alignment - 1).ok_or(FirmwareFileSystemError::OutOfResources)?;
        let mut storage = Vec::new();
        storage.try_reserve_exact(total).map_err(|_| FirmwareFileSystemError::OutOfResources)?;
        storage.resize(total, 0u8);
        let mut storage = storage.into_boxed_slice();

        // The boxed slice does not move again, so the offset stays valid for the life of the buffer.
        let offset = storage.as_ptr().align_offset(alignment);
        if offset.checked_add(source.len()).map_or(true, |end| end > storage.len()) {
            Err(FirmwareFileSystemError::OutOfResources)?;
        }
        storage[offset..offset + source.len()].copy_from_slice(source);
        Ok(Self { storage, offset, len: source.len() })
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.storage[self.offset..self.offset + self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl fmt::Debug for SharedBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedBuffer")
            .field("address", &self.as_slice().as_ptr())
            .field("len", &self.len)
            .finish()
    }
}

/// A zero-copy view of either borrowed bytes or a range of a [`SharedBuffer`].
#[derive(Clone)]
pub enum ByteView<'a> {
    /// Bytes owned by the caller for at least `'a`.
    Borrowed(&'a [u8]),
    /// A range of a reference counted heap buffer.
    Shared { buffer: Rc<SharedBuffer>, range: Range<usize> },
}

impl<'a> ByteView<'a> {
    /// Views the whole of `buffer`.
    pub fn shared(buffer: Rc<SharedBuffer>) -> Self {
        let range = 0..buffer.len();
        ByteView::Shared { buffer, range }
    }

    pub fn as_slice(&self) -> &[u8] {
        match self {
            ByteView::Borrowed(data) => data,
            ByteView::Shared { buffer, range } => &buffer.as_slice()[range.clone()],
        }
    }

    /// Returns a view of `range`, relative to the start of this view.
    pub fn subview(&self, range: Range<usize>) -> Result<ByteView<'a>, FirmwareFileSystemError> {
        if range.start > range.end || range.end > self.as_slice().len() {
            Err(FirmwareFileSystemError::InvalidParameter)?;
        }
        Ok(match self {
            ByteView::Borrowed(data) => ByteView::Borrowed(&data[range]),
            ByteView::Shared { buffer, range: outer } => {
                ByteView::Shared { buffer: buffer.clone(), range: outer.start + range.start..outer.start + range.end }
            }
        })
    }

    /// The heap buffer backing this view, if any.
    pub fn owner(&self) -> Option<&Rc<SharedBuffer>> {
        match self {
            ByteView::Borrowed(_) => None,
            ByteView::Shared { buffer, .. } => Some(buffer),
        }
    }

    /// Address of the first byte of the view.
    pub fn address(&self) -> usize {
        self.as_slice().as_ptr() as usize
    }
}

impl Deref for ByteView<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl<'a> From<&'a [u8]> for ByteView<'a> {
    fn from(value: &'a [u8]) -> Self {
        ByteView::Borrowed(value)
    }
}

impl From<Vec<u8>> for ByteView<'_> {
    fn from(value: Vec<u8>) -> Self {
        ByteView::shared(Rc::new(SharedBuffer::from_vec(value)))
    }
}

impl fmt::Debug for ByteView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.owner().is_some() { "Shared" } else { "Borrowed" };
        f.debug_struct("ByteView")
            .field("kind", &kind)
            .field("address", &(self.address() as *const u8))
            .field("len", &self.len())
            .finish()
    }
}
