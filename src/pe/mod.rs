//! PE header region parsing
//!
//! This module decodes the header region of a Windows PE file: the DOS stub
//! marker, the COFF file header, and the optional header with its
//! data-directory table. Nothing past the data directories is read.

mod coff;
mod optional;
mod reader;

pub use coff::{CoffFlag, CoffHeader, MachineType};
pub use optional::{DataDirectory, DllFlag, ImageMagic, OptionalHeader, Subsystem};
pub use reader::{ByteCursor, PointerWidth};

use log::debug;
use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Read, Seek};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur while decoding PE headers
#[derive(Error, Debug)]
pub enum PeError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("input ended before a required field could be read")]
    TruncatedInput,

    #[error("invalid DOS signature, expected \"MZ\"")]
    InvalidDosSignature,

    #[error("invalid PE signature, expected \"PE\\0\\0\"")]
    InvalidPeSignature,

    #[error("unrecognized machine type: 0x{0:04x}")]
    UnrecognizedMachineType(u16),

    #[error("unrecognized subsystem: {0}")]
    UnrecognizedSubsystem(u16),

    #[error("unrecognized optional header magic: 0x{0:04x}")]
    UnrecognizedMagic(u16),

    #[error("header declares {declared} data directories but only {available} bytes remain")]
    MalformedDataDirectoryCount { declared: u32, available: u64 },
}

/// Result type for PE header operations
pub type Result<T> = std::result::Result<T, PeError>;

/// File offset of the PE header pointer inside the DOS stub
const PE_OFFSET_FIELD: u64 = 0x3c;

/// The decoded header region of a PE file
#[derive(Debug, Clone)]
pub struct PeHeaders {
    /// COFF file header
    pub coff: CoffHeader,
    /// Optional header, including data directories
    pub optional: OptionalHeader,
}

impl PeHeaders {
    /// Decode the header region from a seekable byte stream.
    ///
    /// The cursor is owned by this call for its duration; it is
    /// repositioned to the start of the stream first, so the caller's
    /// initial position does not matter. Any validation or I/O failure
    /// aborts the decode; partial results are never returned.
    pub fn read_from<R: Read + Seek>(cursor: &mut ByteCursor<R>) -> Result<Self> {
        cursor.seek(0)?;
        let dos_signature = cursor.read_bytes::<2>()?;
        if &dos_signature != b"MZ" {
            return Err(PeError::InvalidDosSignature);
        }

        cursor.seek(PE_OFFSET_FIELD)?;
        let pe_offset = cursor.read_u32()?;
        debug!("PE header offset: 0x{:x}", pe_offset);

        cursor.seek(u64::from(pe_offset))?;
        let pe_signature = cursor.read_bytes::<4>()?;
        if &pe_signature != b"PE\0\0" {
            return Err(PeError::InvalidPeSignature);
        }

        let coff = CoffHeader::read_from(cursor)?;
        debug!(
            "COFF header: machine {}, {} sections",
            coff.machine, coff.number_of_sections
        );

        let optional = OptionalHeader::read_from(cursor)?;
        debug!(
            "optional header: {}, {} data directories",
            optional.magic,
            optional.data_directories.len()
        );

        Ok(Self { coff, optional })
    }

    /// Read and decode the header region of a PE file on disk.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let mut cursor = ByteCursor::new(BufReader::new(file));
        Self::read_from(&mut cursor)
    }
}

impl fmt::Display for PeHeaders {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.coff)?;
        write!(f, "{}", self.optional)
    }
}
