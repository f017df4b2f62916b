//! Volumes waiting for a reader.
//!
//! A volume whose format has no registered reader is remembered here and replayed when a reader for that format is
//! registered.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use alloc::{collections::VecDeque, vec::Vec};

use patina_fv_fs::buffer::ByteView;
use patina_fv_pi::auth::AuthenticationStatus;
use r_efi::efi;

use crate::{FvError, volume_table::VolumeHandle};

#[derive(Debug, Clone)]
pub(crate) struct UnknownFormatRecord<'a> {
    pub format: efi::Guid,
    pub data: ByteView<'a>,
    pub authentication_status: AuthenticationStatus,
    pub depth: usize,
    pub parent: Option<VolumeHandle>,
}

pub(crate) struct UnknownFormatQueue<'a> {
    records: VecDeque<UnknownFormatRecord<'a>>,
    capacity: usize,
}

impl<'a> UnknownFormatQueue<'a> {
    pub fn new(capacity: usize) -> Self {
        Self { records: VecDeque::new(), capacity }
    }

    pub fn push(&mut self, record: UnknownFormatRecord<'a>) -> Result<(), FvError> {
        if self.records.len() >= self.capacity {
            log::warn!("Unknown format queue is full ({} entries).", self.capacity);
            Err(FvError::OutOfResources)?;
        }
        self.records.try_reserve(1).map_err(|_| FvError::OutOfResources)?;
        self.records.push_back(record);
        Ok(())
    }

    /// Removes and returns every record of `format`, oldest first.
    pub fn take_matching(&mut self, format: &efi::Guid) -> Vec<UnknownFormatRecord<'a>> {
        let mut matching = Vec::new();
        self.records.retain(|record| {
            if record.format == *format {
                matching.push(record.clone());
                false
            } else {
                true
            }
        });
        matching
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}
