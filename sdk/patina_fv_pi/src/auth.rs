//! Authentication Status Definitions
//!
//! Based on the `EFI_AUTH_STATUS_*` values in the UEFI Platform Initialization (PI) Specification V1.8A Volume 3
//! Section 3.2.5.7 (EFI_GUID_DEFINED_SECTION) and the GUIDed section extraction interfaces.
//!
//! The authentication status is bookkeeping only: it records what, if anything, vouched for a buffer. No
//! cryptographic verification happens here.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!

/// Authentication status bitmask type.
pub type AuthenticationStatus = u32;

/// The platform overrode the result of the authentication check.
pub const PLATFORM_OVERRIDE: AuthenticationStatus = 0x01;
/// The content was wrapped in a signed or integrity-protected encapsulation.
pub const IMAGE_SIGNED: AuthenticationStatus = 0x02;
/// The encapsulation was not checked.
pub const NOT_TESTED: AuthenticationStatus = 0x04;
/// The encapsulation was checked and the check failed.
pub const TEST_FAILED: AuthenticationStatus = 0x08;
/// Mask of all defined bits.
pub const ALL: AuthenticationStatus = 0x0F;
