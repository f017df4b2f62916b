//! Firmware File System (FFS) section stream parsing.
//!
//! A file's content is a stream of 4-byte aligned sections. Each one starts with a common header holding a 24-bit
//! size (or `0xFFFFFF` followed by a 32-bit size) and a type byte, followed by a type specific header for the
//! encapsulation, version and freeform subtype sections.
//!
//! [`SectionIterator`] walks one level of the stream and yields [`SectionRef`] views without copying. Descending
//! into encapsulations needs a decoder and is left to the caller; GUID-defined decoders implement
//! [`GuidedSectionDecoder`].
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use alloc::{string::String, vec::Vec};
use core::{fmt, mem, ops::Range, ptr};

use patina_fv_pi::{
    GuidFmt,
    auth::AuthenticationStatus,
    fw_fs::ffs::{self, section},
};
use r_efi::efi;

use crate::{
    FirmwareFileSystemError,
    codec::{align_up, size24},
};

/// Parsed type specific header of a section.
#[derive(Debug, Clone, Copy)]
pub enum SectionHeader {
    /// Any section without a type specific header; holds the raw type.
    Standard(section::EfiSectionType),
    Compression(section::header::Compression),
    GuidDefined(section::header::GuidDefined),
    Version(section::header::Version),
    FreeformSubtypeGuid(section::header::FreeformSubtypeGuid),
}

impl SectionHeader {
    pub fn section_type_raw(&self) -> section::EfiSectionType {
        match self {
            SectionHeader::Standard(raw_type) => *raw_type,
            SectionHeader::Compression(_) => section::raw_type::encapsulated::COMPRESSION,
            SectionHeader::GuidDefined(_) => section::raw_type::encapsulated::GUID_DEFINED,
            SectionHeader::Version(_) => section::raw_type::VERSION,
            SectionHeader::FreeformSubtypeGuid(_) => section::raw_type::FREEFORM_SUBTYPE_GUID,
        }
    }

    /// Whether the section wraps a further section stream.
    pub fn is_encapsulation(&self) -> bool {
        matches!(self, SectionHeader::Compression(_) | SectionHeader::GuidDefined(_))
    }
}

/// Zero-copy view over one section.
#[derive(Clone)]
pub struct SectionRef<'a> {
    data: &'a [u8],
    offset: usize,
    header: SectionHeader,
    common_header_len: usize,
    content_offset: usize,
}

impl<'a> SectionRef<'a> {
    /// Parse the section at the start of `buffer`. `offset` is where `buffer` starts in the enclosing stream and is
    /// only recorded.
    ///
    /// Fails with [`FirmwareFileSystemError::InvalidHeader`] when a header is truncated, the size does not cover the
    /// headers, or the section runs past the end of `buffer`.
    pub fn new(buffer: &'a [u8], offset: usize) -> Result<Self, FirmwareFileSystemError> {
        if buffer.len() < mem::size_of::<section::Header>() {
            Err(FirmwareFileSystemError::InvalidHeader)?;
        }
        // Safety: buffer is large enough to contain the header.
        let common_header = unsafe { ptr::read_unaligned(buffer.as_ptr() as *const section::Header) };

        let (size, common_header_len) = if common_header.size == section::EXTENDED_SIZE_MARKER {
            let extended_len = mem::size_of::<section::header::CommonSectionHeaderExtended>();
            if buffer.len() < extended_len {
                Err(FirmwareFileSystemError::InvalidHeader)?;
            }
            // Safety: buffer is large enough to contain the extended header.
            let extended = unsafe {
                ptr::read_unaligned(buffer.as_ptr() as *const section::header::CommonSectionHeaderExtended)
            };
            (extended.extended_size as usize, extended_len)
        } else {
            (size24(common_header.size), mem::size_of::<section::Header>())
        };

        if size < common_header_len || size > buffer.len() {
            Err(FirmwareFileSystemError::InvalidHeader)?;
        }
        let data = &buffer[..size];

        let (header, content_offset) = match common_header.section_type {
            section::raw_type::encapsulated::COMPRESSION => {
                let compression = read_specific::<section::header::Compression>(data, common_header_len)?;
                (SectionHeader::Compression(compression), common_header_len + mem::size_of_val(&compression))
            }
            section::raw_type::encapsulated::GUID_DEFINED => {
                let guid_defined = read_specific::<section::header::GuidDefined>(data, common_header_len)?;
                let data_offset = guid_defined.data_offset as usize;
                if data_offset < common_header_len + mem::size_of_val(&guid_defined) || data_offset > size {
                    Err(FirmwareFileSystemError::InvalidHeader)?;
                }
                (SectionHeader::GuidDefined(guid_defined), data_offset)
            }
            section::raw_type::VERSION => {
                let version = read_specific::<section::header::Version>(data, common_header_len)?;
                (SectionHeader::Version(version), common_header_len + mem::size_of_val(&version))
            }
            section::raw_type::FREEFORM_SUBTYPE_GUID => {
                let freeform = read_specific::<section::header::FreeformSubtypeGuid>(data, common_header_len)?;
                (SectionHeader::FreeformSubtypeGuid(freeform), common_header_len + mem::size_of_val(&freeform))
            }
            raw_type => (SectionHeader::Standard(raw_type), common_header_len),
        };

        Ok(Self { data, offset, header, common_header_len, content_offset })
    }

    pub fn header(&self) -> &SectionHeader {
        &self.header
    }

    pub fn section_type(&self) -> section::EfiSectionType {
        self.header.section_type_raw()
    }

    /// Offset of the section in the enclosing stream.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Size of the section, headers included.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// The section bytes, headers included.
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Range of the section in the enclosing stream.
    pub fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.data.len()
    }

    /// Range of the bytes following the common header, relative to the section.
    pub fn payload_range(&self) -> Range<usize> {
        self.common_header_len..self.data.len()
    }

    /// The bytes following the common header. This is what a section search returns for a leaf section.
    pub fn payload(&self) -> &'a [u8] {
        &self.data[self.payload_range()]
    }

    /// Range of the bytes following every header, relative to the section.
    pub fn content_range(&self) -> Range<usize> {
        self.content_offset..self.data.len()
    }

    /// The bytes following every header: the wrapped stream of an encapsulation, the string of a version section.
    pub fn content(&self) -> &'a [u8] {
        &self.data[self.content_range()]
    }

    /// GUID-defined header, if this is a GUID-defined section.
    pub fn guid_defined(&self) -> Option<&section::header::GuidDefined> {
        match &self.header {
            SectionHeader::GuidDefined(guid_defined) => Some(guid_defined),
            _ => None,
        }
    }

    /// Bytes between the GUID-defined header and the wrapped data, owned by the decoder of the GUID.
    pub fn guid_specific_header(&self) -> &'a [u8] {
        match &self.header {
            SectionHeader::GuidDefined(guid_defined) => {
                &self.data[self.common_header_len + mem::size_of_val(guid_defined)..self.content_offset]
            }
            _ => &[],
        }
    }

    /// Compression header, if this is a compression section.
    pub fn compression(&self) -> Option<&section::header::Compression> {
        match &self.header {
            SectionHeader::Compression(compression) => Some(compression),
            _ => None,
        }
    }

    /// Walk the stream wrapped by a compression section stored uncompressed, or a GUID-defined section.
    ///
    /// The caller decides whether the wrapped bytes may be used as is.
    pub fn sub_sections(&self) -> SectionIterator<'a> {
        SectionIterator::new(self.content())
    }
}

impl fmt::Debug for SectionRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("SectionRef");
        debug.field("section_type", &self.section_type()).field("offset", &self.offset).field("size", &self.size());
        if let Some(guid_defined) = self.guid_defined() {
            debug.field("guid", &GuidFmt(&guid_defined.section_definition_guid));
        }
        debug.finish()
    }
}

fn read_specific<T: Copy>(section_data: &[u8], offset: usize) -> Result<T, FirmwareFileSystemError> {
    if section_data.len() < offset + mem::size_of::<T>() {
        Err(FirmwareFileSystemError::InvalidHeader)?;
    }
    // Safety: the check above keeps the read inside the section.
    Ok(unsafe { ptr::read_unaligned(section_data[offset..].as_ptr() as *const T) })
}

/// Walks one level of a section stream.
///
/// Yields sections in ascending offset order. A malformed size is yielded once as an error and ends the walk, since
/// there is no way to find the next section after it.
pub struct SectionIterator<'a> {
    data: &'a [u8],
    offset: usize,
    done: bool,
}

impl<'a> SectionIterator<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0, done: false }
    }

    fn step(&mut self) -> Result<Option<SectionRef<'a>>, FirmwareFileSystemError> {
        let offset = align_up(self.offset, ffs::SECTION_ALIGNMENT)?;
        if offset >= self.data.len() || self.data.len() - offset < mem::size_of::<section::Header>() {
            return Ok(None);
        }
        let section = SectionRef::new(&self.data[offset..], offset)?;
        self.offset = offset + section.size();
        Ok(Some(section))
    }
}

impl<'a> Iterator for SectionIterator<'a> {
    type Item = Result<SectionRef<'a>, FirmwareFileSystemError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.step() {
            Ok(Some(section)) => Some(Ok(section)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                log::error!("Malformed section at stream offset {:#x}: {}.", self.offset, err);
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

/// Decodes a NUL terminated UCS-2 string, as found in user interface and version sections.
///
/// Decoding stops at the first NUL or at the end of `bytes`. Unpaired surrogates and an odd length are
/// [`FirmwareFileSystemError::DataCorrupt`].
pub fn decode_ucs2(bytes: &[u8]) -> Result<String, FirmwareFileSystemError> {
    if bytes.len() % 2 != 0 {
        Err(FirmwareFileSystemError::DataCorrupt)?;
    }
    let units = bytes
        .chunks_exact(2)
        .map(|unit| u16::from_le_bytes([unit[0], unit[1]]))
        .take_while(|unit| *unit != 0)
        .collect::<Vec<_>>();
    char::decode_utf16(units).collect::<Result<String, _>>().map_err(|_| FirmwareFileSystemError::DataCorrupt)
}

/// Output of a GUID-defined section decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedSection {
    /// The decoded section stream.
    pub data: Vec<u8>,
    /// Authentication bits the decoder derived for the content.
    pub authentication_status: AuthenticationStatus,
}

/// Decodes GUID-defined sections for one or more definition GUIDs.
///
/// An implementation should return:
/// - `Ok(DecodedSection)` holding the decoded section stream when it handled the section.
/// - `Err(FirmwareFileSystemError::Unsupported)` when the section is not one it understands.
/// - Any other `Err(..)` when decoding failed.
pub trait GuidedSectionDecoder {
    fn decode(&self, section: &SectionRef<'_>) -> Result<DecodedSection, FirmwareFileSystemError>;
}

/// The definition GUID of a GUID-defined section.
pub fn definition_guid(section: &SectionRef<'_>) -> Option<efi::Guid> {
    section.guid_defined().map(|guid_defined| guid_defined.section_definition_guid)
}
