//! Section search and encapsulation decoding.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use alloc::rc::Rc;

use patina_fv_fs::{
    buffer::{ByteView, SharedBuffer},
    section::{DecodedSection, SectionHeader, SectionIterator, SectionRef},
};
use patina_fv_pi::{
    GuidFmt,
    auth::{self, AuthenticationStatus},
    fw_fs::ffs::section::{guid_defined_attributes, header, raw_type},
};

use crate::{
    FvContext, FvError,
    section_cache::{CachedSection, SectionIdentity},
};

/// `range`, relative to `section`, as a range of the enclosing stream.
fn stream_range(section: &SectionRef<'_>, range: core::ops::Range<usize>) -> core::ops::Range<usize> {
    section.offset() + range.start..section.offset() + range.end
}

impl<'a> FvContext<'a> {
    /// Depth-first search of `stream` for the section of `section_type` at which `remaining` reaches zero.
    pub(crate) fn search_stream(
        &mut self,
        stream: &ByteView<'a>,
        section_type: u8,
        remaining: &mut usize,
        depth: usize,
    ) -> Result<(ByteView<'a>, AuthenticationStatus), FvError> {
        for section in SectionIterator::new(stream.as_slice()) {
            let section = section.map_err(|_| FvError::NotFound)?;

            if section.section_type() == section_type {
                *remaining -= 1;
                if *remaining == 0 {
                    let payload = stream.subview(stream_range(&section, section.payload_range()))?;
                    return Ok((payload, 0));
                }
            }

            let inner = match section.section_type() {
                raw_type::encapsulated::DISPOSABLE => {
                    Some((stream.subview(stream_range(&section, section.content_range()))?, 0))
                }
                raw_type::encapsulated::COMPRESSION | raw_type::encapsulated::GUID_DEFINED => {
                    self.open_encapsulation(stream, &section, depth)?
                }
                _ => None,
            };

            if let Some((inner, encapsulation_status)) = inner {
                match self.search_stream(&inner, section_type, remaining, depth + 1) {
                    Ok((found, status)) => return Ok((found, status | encapsulation_status)),
                    Err(FvError::NotFound) => {}
                    Err(err) => return Err(err),
                }
            }
        }
        Err(FvError::NotFound)
    }

    /// The section stream wrapped by an encapsulation section, decoded if needed.
    ///
    /// `Ok(None)` means the encapsulation cannot be opened and the search moves on to its next sibling.
    fn open_encapsulation(
        &mut self,
        stream: &ByteView<'a>,
        section: &SectionRef<'_>,
        depth: usize,
    ) -> Result<Option<(ByteView<'a>, AuthenticationStatus)>, FvError> {
        if depth >= self.config.max_nesting_depth {
            log::warn!("Encapsulation at stream offset {:#x} exceeds the nesting limit, skipping.", section.offset());
            return Ok(None);
        }

        let identity = SectionIdentity::of(section.data());
        if let Some(cached) = self.section_cache.lookup(identity) {
            return Ok(Some((ByteView::shared(cached.decoded), cached.authentication_status)));
        }

        let content = || stream.subview(stream_range(section, section.content_range()));

        let decoded = match section.header() {
            SectionHeader::Compression(compression) => {
                let compression_type = compression.compression_type;
                let uncompressed_length = compression.uncompressed_length as usize;
                if compression_type == header::NOT_COMPRESSED {
                    return Ok(Some((content()?, 0)));
                }
                let Some(decompressor) = &self.decompressor else {
                    log::warn!("No decompressor for compression type {:#x}, skipping section.", compression_type);
                    return Ok(None);
                };
                match decompressor.decompress(compression_type, section.content(), uncompressed_length) {
                    Ok(data) if data.len() == uncompressed_length => DecodedSection { data, authentication_status: 0 },
                    Ok(data) => {
                        log::warn!(
                            "Decompressed {:#x} bytes where the section declares {:#x}, skipping section.",
                            data.len(),
                            uncompressed_length
                        );
                        return Ok(None);
                    }
                    Err(err) => {
                        log::warn!("Decompression failed: {}, skipping section.", err);
                        return Ok(None);
                    }
                }
            }
            SectionHeader::GuidDefined(guid_defined) => {
                let definition = guid_defined.section_definition_guid;
                let attributes = guid_defined.attributes;
                match self.decoders.lookup(&definition) {
                    Some(decoder) => match decoder.decode(section) {
                        Ok(decoded) => decoded,
                        Err(err) => {
                            log::warn!("Decoder for {} failed: {}, skipping section.", GuidFmt(&definition), err);
                            return Ok(None);
                        }
                    },
                    None if attributes & guid_defined_attributes::PROCESSING_REQUIRED == 0 => {
                        let status = if attributes & guid_defined_attributes::AUTH_STATUS_VALID != 0 {
                            auth::IMAGE_SIGNED | auth::NOT_TESTED
                        } else {
                            0
                        };
                        return Ok(Some((content()?, status)));
                    }
                    None => {
                        log::warn!("No decoder for GUID-defined section {}, skipping section.", GuidFmt(&definition));
                        return Ok(None);
                    }
                }
            }
            _ => return Ok(None),
        };

        let buffer = Rc::new(SharedBuffer::from_vec(decoded.data));
        self.section_cache.insert(
            identity,
            stream.owner().cloned(),
            CachedSection { decoded: buffer.clone(), authentication_status: decoded.authentication_status },
        );
        Ok(Some((ByteView::shared(buffer), decoded.authentication_status)))
    }
}

#[cfg(test)]
mod tests {
    use alloc::{vec, vec::Vec};
    use core::cell::Cell;

    use patina_fv_extractors::Crc32SectionExtractor;
    use patina_fv_fs::{
        FirmwareFileSystemError,
        section::GuidedSectionDecoder,
        test_support::{
            FileBuilder, VolumeBuilder, compression_section, guid_defined_section, leaf_section, section_stream,
            set_logger,
        },
    };
    use patina_fv_pi::fw_fs::{ffs::file::raw::r#type, guid};
    use r_efi::efi;

    use super::*;
    use crate::{
        FileHandle, VolumeDisposition, config::FvConfig, decompress::MockSectionDecompressor,
    };

    const XOR_GUID: efi::Guid =
        efi::Guid::from_fields(0x6D2F8A41, 0x0C7E, 0x4B93, 0xA1, 0x55, &[0x3E, 0x90, 0x2B, 0x7C, 0x14, 0xD8]);

    fn name(n: u8) -> efi::Guid {
        efi::Guid::from_bytes(&[n; 16])
    }

    /// Inverts every wrapped byte and counts how often it ran.
    struct XorDecoder {
        calls: Rc<Cell<usize>>,
    }

    impl GuidedSectionDecoder for XorDecoder {
        fn decode(&self, section: &SectionRef<'_>) -> Result<DecodedSection, FirmwareFileSystemError> {
            self.calls.set(self.calls.get() + 1);
            Ok(DecodedSection {
                data: section.content().iter().map(|byte| !byte).collect(),
                authentication_status: auth::IMAGE_SIGNED,
            })
        }
    }

    fn xor(bytes: &[u8]) -> Vec<u8> {
        bytes.iter().map(|byte| !byte).collect()
    }

    fn single_file_context<'a>(fv: &'a [u8], config: FvConfig) -> (FvContext<'a>, FileHandle) {
        let mut context = FvContext::new(config);
        context.install_default_readers();
        let VolumeDisposition::Installed(volume) = context.install_volume(fv, 0).unwrap() else {
            panic!("volume should install");
        };
        let file = context.find_file_by_name(volume, &name(1)).unwrap();
        (context, file)
    }

    #[test]
    fn decompression_runs_once_and_is_cached() {
        set_logger();
        let inner = section_stream(&[leaf_section(raw_type::PE32, b"driver image"), leaf_section(raw_type::RAW, b"r")]);
        let fv = VolumeBuilder::new()
            .file(
                FileBuilder::new(name(1), r#type::DRIVER)
                    .section(compression_section(header::STANDARD_COMPRESSION, inner.len() as u32, b"squashed")),
            )
            .build();
        let (mut context, file) = single_file_context(&fv, FvConfig::default());

        let mut decompressor = MockSectionDecompressor::new();
        let expanded = inner.clone();
        let expected_len = inner.len();
        decompressor
            .expect_decompress()
            .withf(move |compression_type, source, length| {
                *compression_type == header::STANDARD_COMPRESSION && source == b"squashed" && *length == expected_len
            })
            .times(1)
            .returning(move |_, _, _| Ok(expanded.clone()));
        context.set_decompressor(Box::new(decompressor));

        let first = context.find_section(&file, raw_type::PE32, 0).unwrap();
        let second = context.find_section(&file, raw_type::PE32, 0).unwrap();
        assert_eq!(first.data(), b"driver image");
        assert_eq!(first.data(), second.data());
        assert_eq!(first.authentication_status(), 0);
        // served from the same decoded buffer.
        assert_eq!(first.view().address(), second.view().address());
        assert_eq!(context.find_section(&file, raw_type::RAW, 0).unwrap().data(), b"r");
    }

    #[test]
    fn wrong_decompressed_length_skips_the_section() {
        let inner = leaf_section(raw_type::PE32, b"image");
        let fv = VolumeBuilder::new()
            .file(
                FileBuilder::new(name(1), r#type::DRIVER)
                    .section(compression_section(header::STANDARD_COMPRESSION, inner.len() as u32, b"z"))
                    .section(leaf_section(raw_type::PE32, b"fallback")),
            )
            .build();
        let (mut context, file) = single_file_context(&fv, FvConfig::default());

        let mut decompressor = MockSectionDecompressor::new();
        decompressor.expect_decompress().returning(|_, _, _| Ok(vec![0u8; 3]));
        context.set_decompressor(Box::new(decompressor));

        assert_eq!(context.find_section(&file, raw_type::PE32, 0).unwrap().data(), b"fallback");
    }

    #[test]
    fn decompression_failure_moves_on_to_the_next_sibling() {
        let fv = VolumeBuilder::new()
            .file(
                FileBuilder::new(name(1), r#type::DRIVER)
                    .section(compression_section(header::STANDARD_COMPRESSION, 64, b"garbage"))
                    .section(leaf_section(raw_type::RAW, b"sibling")),
            )
            .build();
        let (mut context, file) = single_file_context(&fv, FvConfig::default());

        let mut decompressor = MockSectionDecompressor::new();
        decompressor.expect_decompress().returning(|_, _, _| Err(FirmwareFileSystemError::DataCorrupt));
        context.set_decompressor(Box::new(decompressor));
        assert_eq!(context.find_section(&file, raw_type::RAW, 0).unwrap().data(), b"sibling");

        // without a decompressor the section is skipped the same way.
        let (mut context, file) = single_file_context(&fv, FvConfig::default());
        assert_eq!(context.find_section(&file, raw_type::RAW, 0).unwrap().data(), b"sibling");
    }

    #[test]
    fn uncompressed_compression_section_is_read_in_place() {
        let inner = leaf_section(raw_type::TE, b"tiny");
        let fv = VolumeBuilder::new()
            .file(
                FileBuilder::new(name(1), r#type::PEIM)
                    .section(compression_section(header::NOT_COMPRESSED, inner.len() as u32, &inner)),
            )
            .build();
        let (mut context, file) = single_file_context(&fv, FvConfig::default());
        let found = context.find_section(&file, raw_type::TE, 0).unwrap();
        assert_eq!(found.data(), b"tiny");
        assert!(found.view().owner().is_none());
    }

    #[test]
    fn guid_defined_passthrough_without_a_decoder() {
        let wrapped = leaf_section(raw_type::RAW, b"verbatim");
        let fv = VolumeBuilder::new()
            .file(
                FileBuilder::new(name(1), r#type::DRIVER)
                    .section(guid_defined_section(XOR_GUID, guid_defined_attributes::AUTH_STATUS_VALID, &[], &wrapped)),
            )
            .file(
                FileBuilder::new(name(2), r#type::DRIVER).section(guid_defined_section(XOR_GUID, 0, &[], &wrapped)),
            )
            .build();
        let (mut context, file) = single_file_context(&fv, FvConfig::default());

        let found = context.find_section(&file, raw_type::RAW, 0).unwrap();
        assert_eq!(found.data(), b"verbatim");
        assert_eq!(found.authentication_status(), auth::IMAGE_SIGNED | auth::NOT_TESTED);

        let unmarked = context.find_file_by_name(file.volume(), &name(2)).unwrap();
        let found = context.find_section(&unmarked, raw_type::RAW, 0).unwrap();
        assert_eq!(found.data(), b"verbatim");
        assert_eq!(found.authentication_status(), 0);
    }

    #[test]
    fn processing_required_without_a_decoder_is_not_found() {
        let wrapped = leaf_section(raw_type::RAW, b"sealed");
        let fv = VolumeBuilder::new()
            .file(FileBuilder::new(name(1), r#type::DRIVER).section(guid_defined_section(
                XOR_GUID,
                guid_defined_attributes::PROCESSING_REQUIRED,
                &[],
                &wrapped,
            )))
            .build();
        let (mut context, file) = single_file_context(&fv, FvConfig::default());
        assert_eq!(context.find_section(&file, raw_type::RAW, 0).unwrap_err(), FvError::NotFound);
    }

    #[test]
    fn registered_decoder_runs_once_per_section() {
        let wrapped = xor(&leaf_section(raw_type::PE32, b"decoded image"));
        let fv = VolumeBuilder::new()
            .file(FileBuilder::new(name(1), r#type::DRIVER).section(guid_defined_section(
                XOR_GUID,
                guid_defined_attributes::PROCESSING_REQUIRED,
                &[],
                &wrapped,
            )))
            .build();
        let (mut context, file) = single_file_context(&fv, FvConfig::default());
        let calls = Rc::new(Cell::new(0));
        context.register_section_decoder(XOR_GUID, Rc::new(XorDecoder { calls: calls.clone() }));

        for _ in 0..3 {
            let found = context.find_section(&file, raw_type::PE32, 0).unwrap();
            assert_eq!(found.data(), b"decoded image");
            assert_eq!(found.authentication_status(), auth::IMAGE_SIGNED);
        }
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn disabled_cache_decodes_every_time() {
        let wrapped = xor(&leaf_section(raw_type::PE32, b"again"));
        let fv = VolumeBuilder::new()
            .file(
                FileBuilder::new(name(1), r#type::DRIVER)
                    .section(guid_defined_section(XOR_GUID, guid_defined_attributes::PROCESSING_REQUIRED, &[], &wrapped)),
            )
            .build();
        let (mut context, file) =
            single_file_context(&fv, FvConfig { section_cache_capacity: 0, ..Default::default() });
        let calls = Rc::new(Cell::new(0));
        context.register_section_decoder(XOR_GUID, Rc::new(XorDecoder { calls: calls.clone() }));

        context.find_section(&file, raw_type::PE32, 0).unwrap();
        context.find_section(&file, raw_type::PE32, 0).unwrap();
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn instances_are_counted_across_encapsulations() {
        let nested = section_stream(&[leaf_section(raw_type::RAW, b"inner-0"), leaf_section(raw_type::RAW, b"inner-1")]);
        let fv = VolumeBuilder::new()
            .file(
                FileBuilder::new(name(1), r#type::DRIVER)
                    .section(leaf_section(raw_type::RAW, b"outer-0"))
                    .section(guid_defined_section(XOR_GUID, 0, &[], &nested))
                    .section(leaf_section(raw_type::RAW, b"outer-1")),
            )
            .build();
        let (mut context, file) = single_file_context(&fv, FvConfig::default());

        let found = (0..4).map(|instance| context.find_section(&file, raw_type::RAW, instance).unwrap().data().to_vec());
        let found = found.collect::<Vec<_>>();
        assert_eq!(found, [b"outer-0".to_vec(), b"inner-0".to_vec(), b"inner-1".to_vec(), b"outer-1".to_vec()]);
        assert_eq!(context.find_section(&file, raw_type::RAW, 4).unwrap_err(), FvError::NotFound);
    }

    #[test]
    fn disposable_sections_are_walked_into() {
        let inner = leaf_section(raw_type::PIC, b"pic");
        let fv = VolumeBuilder::new()
            .file(
                FileBuilder::new(name(1), r#type::DRIVER)
                    .section(leaf_section(raw_type::encapsulated::DISPOSABLE, &inner)),
            )
            .build();
        let (mut context, file) = single_file_context(&fv, FvConfig::default());
        assert_eq!(context.find_section(&file, raw_type::PIC, 0).unwrap().data(), b"pic");
    }

    #[test]
    fn nesting_limit_stops_the_descent() {
        let mut stream = leaf_section(raw_type::RAW, b"deep");
        for _ in 0..3 {
            stream = guid_defined_section(XOR_GUID, 0, &[], &stream);
        }
        let fv = VolumeBuilder::new().file(FileBuilder::new(name(1), r#type::DRIVER).section(stream)).build();

        let (mut context, file) = single_file_context(&fv, FvConfig { max_nesting_depth: 2, ..Default::default() });
        assert_eq!(context.find_section(&file, raw_type::RAW, 0).unwrap_err(), FvError::NotFound);

        let (mut context, file) = single_file_context(&fv, FvConfig { max_nesting_depth: 3, ..Default::default() });
        assert_eq!(context.find_section(&file, raw_type::RAW, 0).unwrap().data(), b"deep");
    }

    #[test]
    fn malformed_section_size_is_not_found() {
        // size field of one byte, smaller than the header.
        let mut bad = leaf_section(raw_type::RAW, b"bad");
        bad[0] = 1;
        let fv = VolumeBuilder::new().file(FileBuilder::new(name(1), r#type::DRIVER).section(bad)).build();
        let (mut context, file) = single_file_context(&fv, FvConfig::default());
        assert_eq!(context.find_section(&file, raw_type::RAW, 0).unwrap_err(), FvError::NotFound);
    }

    #[test]
    fn crc32_sections_are_verified() {
        let wrapped = leaf_section(raw_type::PE32, b"checked");
        let crc = crc32fast::hash(&wrapped);
        let fv = VolumeBuilder::new()
            .file(FileBuilder::new(name(1), r#type::DRIVER).section(guid_defined_section(
                guid::CRC32_SECTION,
                guid_defined_attributes::AUTH_STATUS_VALID | guid_defined_attributes::PROCESSING_REQUIRED,
                &crc.to_le_bytes(),
                &wrapped,
            )))
            .file(FileBuilder::new(name(2), r#type::DRIVER).section(guid_defined_section(
                guid::CRC32_SECTION,
                guid_defined_attributes::AUTH_STATUS_VALID | guid_defined_attributes::PROCESSING_REQUIRED,
                &(!crc).to_le_bytes(),
                &wrapped,
            )))
            .build();
        let (mut context, file) = single_file_context(&fv, FvConfig::default());
        context.register_section_decoder(guid::CRC32_SECTION, Rc::new(Crc32SectionExtractor));

        let found = context.find_section(&file, raw_type::PE32, 0).unwrap();
        assert_eq!(found.data(), b"checked");
        assert_eq!(found.authentication_status(), auth::IMAGE_SIGNED);

        let tampered = context.find_file_by_name(file.volume(), &name(2)).unwrap();
        let found = context.find_section(&tampered, raw_type::PE32, 0).unwrap();
        assert_eq!(found.data(), b"checked");
        assert_eq!(found.authentication_status(), auth::IMAGE_SIGNED | auth::TEST_FAILED);
    }
}
