//! Support for reading the Firmware File System as described in the UEFI Platform
//! Initialization Specification.
//!
//! This crate validates firmware volume headers, walks the file directory of a volume with the integrity checks the
//! file system defines, and walks the section stream of a file. It never writes: every type here is a zero-copy view
//! over caller owned bytes, or a [`buffer::SharedBuffer`] holding bytes some decoder produced.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod buffer;
pub mod codec;
pub mod err;
pub mod file;
pub mod section;
pub mod volume;

#[cfg(any(test, feature = "test_support"))]
pub mod test_support;

pub use err::FirmwareFileSystemError;
