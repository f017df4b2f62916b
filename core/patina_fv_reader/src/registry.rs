//! Registry of handlers keyed by a format GUID.
//!
//! Used for volume readers (keyed by file system GUID) and GUID-defined section decoders (keyed by section
//! definition GUID). Callers may subscribe to the registration of a GUID; each subscription fires once, synchronously,
//! when a handler for that GUID is registered after the subscription was made.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use alloc::{boxed::Box, collections::BTreeMap, rc::Rc, vec::Vec};
use core::cmp::Ordering;

use patina_fv_pi::GuidFmt;
use r_efi::efi;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub(crate) struct OrdGuid(pub efi::Guid);

impl PartialOrd for OrdGuid {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for OrdGuid {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.as_bytes().cmp(other.0.as_bytes())
    }
}

/// One-shot callback run when a handler registers for the GUID it was subscribed to.
pub type RegistrationNotify = Box<dyn FnOnce(&efi::Guid)>;

pub struct FormatRegistry<T: ?Sized> {
    entries: BTreeMap<OrdGuid, Rc<T>>,
    notifications: BTreeMap<OrdGuid, Vec<RegistrationNotify>>,
}

impl<T: ?Sized> Default for FormatRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> FormatRegistry<T> {
    pub fn new() -> Self {
        Self { entries: BTreeMap::new(), notifications: BTreeMap::new() }
    }

    /// Registers `handler` for `format`, firing and dropping any pending subscriptions for it.
    ///
    /// Returns the handler previously registered for `format`, which `handler` replaces.
    pub fn register(&mut self, format: efi::Guid, handler: Rc<T>) -> Option<Rc<T>> {
        let previous = self.entries.insert(OrdGuid(format), handler);
        if previous.is_some() {
            log::warn!("Replacing the handler registered for {}.", GuidFmt(&format));
        }
        if let Some(notifications) = self.notifications.remove(&OrdGuid(format)) {
            log::debug!("Firing {} registration notification(s) for {}.", notifications.len(), GuidFmt(&format));
            for notify in notifications {
                notify(&format);
            }
        }
        previous
    }

    /// The handler registered for `format`. `None` is expected control flow, not an error.
    pub fn lookup(&self, format: &efi::Guid) -> Option<Rc<T>> {
        self.entries.get(&OrdGuid(*format)).cloned()
    }

    /// Runs `notify` the next time a handler registers for `format`.
    pub fn notify_on_register(&mut self, format: efi::Guid, notify: RegistrationNotify) {
        self.notifications.entry(OrdGuid(format)).or_default().push(notify);
    }

    pub fn formats(&self) -> Vec<efi::Guid> {
        self.entries.keys().map(|key| key.0).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
        self.notifications.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;

    const FORMAT_A: efi::Guid =
        efi::Guid::from_fields(0x1F2D8B41, 0x6D1A, 0x4C39, 0xA1, 0x58, &[0x11, 0x22, 0x33, 0x44, 0x55, 0x66]);
    const FORMAT_B: efi::Guid =
        efi::Guid::from_fields(0x9C0E3E6A, 0x2F64, 0x4B0B, 0x8E, 0x31, &[0x66, 0x55, 0x44, 0x33, 0x22, 0x11]);

    #[test]
    fn lookup_finds_registered_handlers_only() {
        let mut registry = FormatRegistry::<u32>::new();
        assert!(registry.lookup(&FORMAT_A).is_none());
        assert!(registry.register(FORMAT_A, Rc::new(1)).is_none());
        assert_eq!(registry.lookup(&FORMAT_A).as_deref(), Some(&1));
        assert!(registry.lookup(&FORMAT_B).is_none());
        assert_eq!(registry.register(FORMAT_A, Rc::new(2)).as_deref(), Some(&1));
        assert_eq!(registry.lookup(&FORMAT_A).as_deref(), Some(&2));
        assert_eq!(registry.formats(), [FORMAT_A]);
    }

    #[test]
    fn notifications_fire_once_for_their_format() {
        let fired = Rc::new(Cell::new(0));
        let mut registry = FormatRegistry::<u32>::new();

        let counter = fired.clone();
        registry.notify_on_register(
            FORMAT_A,
            Box::new(move |guid| {
                assert_eq!(*guid, FORMAT_A);
                counter.set(counter.get() + 1);
            }),
        );

        registry.register(FORMAT_B, Rc::new(0));
        assert_eq!(fired.get(), 0);
        registry.register(FORMAT_A, Rc::new(0));
        assert_eq!(fired.get(), 1);
        registry.register(FORMAT_A, Rc::new(1));
        assert_eq!(fired.get(), 1);
    }

    #[test]
    fn guid_ordering_is_bytewise() {
        assert!(OrdGuid(efi::Guid::from_bytes(&[0; 16])) < OrdGuid(efi::Guid::from_bytes(&[1; 16])));
        assert_eq!(OrdGuid(FORMAT_A).cmp(&OrdGuid(FORMAT_A)), Ordering::Equal);
    }
}
