//! Firmware Storage Definitions
//!
//! Based on the UEFI Platform Initialization (PI) Specification V1.8A Volume 3, Chapter 3 Firmware Storage Code
//! Definitions.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!

pub mod ffs;
pub mod fv;
pub mod fvb;
pub mod guid;
