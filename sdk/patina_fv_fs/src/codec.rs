//! Checksum and file state codec.
//!
//! Small pure helpers shared by the volume, file and section parsers: the 8- and 16-bit sums used by the FFS
//! integrity fields, alignment rounding, and decoding of the file state byte.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use patina_fv_pi::fw_fs::ffs::file::raw::state;

use crate::FirmwareFileSystemError;

/// State of a file in the directory.
///
/// The state byte accumulates bits as a file is written, so the highest set bit (after normalizing for the erase
/// polarity of the volume) tells how far the file got. Bits below the highest one carry no extra information.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    /// Only the header construction bit is set: the header is not complete.
    UnderConstruction,
    /// The header was marked invalid after being written.
    Invalid,
    /// Header and data are complete.
    Valid,
    /// A newer copy of the file is being written elsewhere; this copy remains usable.
    MarkedForUpdate,
    /// The file was deleted.
    Deleted,
}

impl FileState {
    /// Decodes a raw state byte.
    ///
    /// Returns `None` when the highest set bit does not name one of the five states, which includes a fully erased
    /// byte and a header that is valid but whose data was never committed.
    pub fn from_state_byte(raw: u8, erase_polarity: bool) -> Option<Self> {
        let normalized = if erase_polarity { !raw } else { raw };
        let highest_bit = 1u8 << normalized.checked_ilog2()?;
        match highest_bit {
            state::HEADER_CONSTRUCTION => Some(FileState::UnderConstruction),
            state::HEADER_INVALID => Some(FileState::Invalid),
            state::DATA_VALID => Some(FileState::Valid),
            state::MARKED_FOR_UPDATE => Some(FileState::MarkedForUpdate),
            state::DELETED => Some(FileState::Deleted),
            _ => None,
        }
    }

    /// Returns the raw state byte a file in this state carries in a volume with the given erase polarity.
    pub fn to_state_byte(self, erase_polarity: bool) -> u8 {
        let bits = match self {
            FileState::UnderConstruction => state::HEADER_CONSTRUCTION,
            FileState::Invalid => state::HEADER_CONSTRUCTION | state::HEADER_VALID | state::HEADER_INVALID,
            FileState::Valid => state::HEADER_CONSTRUCTION | state::HEADER_VALID | state::DATA_VALID,
            FileState::MarkedForUpdate => {
                state::HEADER_CONSTRUCTION | state::HEADER_VALID | state::DATA_VALID | state::MARKED_FOR_UPDATE
            }
            FileState::Deleted => {
                state::HEADER_CONSTRUCTION | state::HEADER_VALID | state::DATA_VALID | state::DELETED
            }
        };
        if erase_polarity { !bits } else { bits }
    }

    /// Whether a file in this state is returned by searches.
    pub fn is_live(self) -> bool {
        matches!(self, FileState::Valid | FileState::MarkedForUpdate)
    }
}

/// 8-bit wrapping sum of `data`.
pub fn sum8(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |sum, value| sum.wrapping_add(*value))
}

/// 16-bit wrapping sum of `data` read as little endian words.
///
/// Fails with [`FirmwareFileSystemError::InvalidHeader`] when `data` has an odd length.
pub fn sum16(data: &[u8]) -> Result<u16, FirmwareFileSystemError> {
    if data.len() % 2 != 0 {
        Err(FirmwareFileSystemError::InvalidHeader)?;
    }
    Ok(data.chunks_exact(2).fold(0u16, |sum, word| sum.wrapping_add(u16::from_le_bytes([word[0], word[1]]))))
}

/// Rounds `value` up to a multiple of `alignment`, which must be a power of two.
pub fn align_up(value: usize, alignment: usize) -> Result<usize, FirmwareFileSystemError> {
    if !alignment.is_power_of_two() {
        Err(FirmwareFileSystemError::InvalidParameter)?;
    }
    value.checked_add(alignment - 1).map(|v| v & !(alignment - 1)).ok_or(FirmwareFileSystemError::InvalidHeader)
}

/// Reads a 24-bit little endian size field.
pub fn size24(size: [u8; 3]) -> usize {
    u32::from_le_bytes([size[0], size[1], size[2], 0]) as usize
}
