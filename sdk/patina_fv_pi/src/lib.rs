//! Platform Initialization (PI) definitions for firmware volumes.
//!
//! On-disk layouts and constants for firmware volumes (FV), firmware file system (FFS) files and sections, as
//! described in Volume 3 of the UEFI Platform Initialization Specification, together with the authentication status
//! bits propagated alongside extracted content.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
#![cfg_attr(not(test), no_std)]

pub mod auth;
pub mod fw_fs;
pub mod guid_fmt;

pub use guid_fmt::GuidFmt;
