//! Cache of decoded encapsulation sections.
//!
//! Decoding a compressed or GUID-defined section is expensive, and the same section is usually opened several times
//! while a driver is loaded (depex, then image, then UI name). The cache keys decoded content on the address and
//! length of the encapsulation section it came from.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use alloc::{collections::VecDeque, rc::Rc};

use patina_fv_fs::buffer::SharedBuffer;
use patina_fv_pi::auth::AuthenticationStatus;

/// Where an encapsulation section lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SectionIdentity {
    address: usize,
    length: usize,
}

impl SectionIdentity {
    pub fn of(section: &[u8]) -> Self {
        Self { address: section.as_ptr() as usize, length: section.len() }
    }
}

/// A cached decode.
#[derive(Debug, Clone)]
pub(crate) struct CachedSection {
    pub decoded: Rc<SharedBuffer>,
    pub authentication_status: AuthenticationStatus,
}

struct Entry {
    identity: SectionIdentity,
    // Keeps heap-backed sources alive so their address cannot be reused by another buffer while cached.
    _source_owner: Option<Rc<SharedBuffer>>,
    section: CachedSection,
}

/// Bounded cache with oldest-first eviction.
pub(crate) struct SectionCache {
    entries: VecDeque<Entry>,
    capacity: usize,
}

impl SectionCache {
    pub fn new(capacity: usize) -> Self {
        Self { entries: VecDeque::new(), capacity }
    }

    pub fn lookup(&self, identity: SectionIdentity) -> Option<CachedSection> {
        self.entries.iter().find(|entry| entry.identity == identity).map(|entry| entry.section.clone())
    }

    pub fn insert(&mut self, identity: SectionIdentity, source_owner: Option<Rc<SharedBuffer>>, section: CachedSection) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.iter().any(|entry| entry.identity == identity) {
            return;
        }
        while self.entries.len() >= self.capacity {
            if let Some(evicted) = self.entries.pop_front() {
                log::trace!(
                    "Evicting decoded section at {:#x} ({:#x} bytes) from the section cache.",
                    evicted.identity.address,
                    evicted.identity.length
                );
            }
        }
        self.entries.push_back(Entry { identity, _source_owner: source_owner, section });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
