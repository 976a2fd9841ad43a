//! Cursor primitives for header decoding
//!
//! This module wraps a seekable byte stream and exposes the fixed-width
//! little-endian reads the header decoders are built from.

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{self, Read, Seek, SeekFrom};

use crate::pe::{PeError, Result};

/// Width of the pointer-sized optional-header fields.
///
/// Decided once from the image magic and threaded through the rest of the
/// optional-header decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerWidth {
    Bits32,
    Bits64,
}

/// Positioned reader over the raw bytes of a candidate PE file.
///
/// Owns the stream for the duration of a decode; every read advances the
/// cursor by exactly the field width.
pub struct ByteCursor<R> {
    inner: R,
}

impl<R: Read + Seek> ByteCursor<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Current absolute offset of the cursor.
    pub fn tell(&mut self) -> Result<u64> {
        Ok(self.inner.stream_position()?)
    }

    /// Reposition the cursor to an absolute offset.
    pub fn seek(&mut self, position: u64) -> Result<()> {
        self.inner.seek(SeekFrom::Start(position))?;
        Ok(())
    }

    /// Bytes between the cursor and the end of the stream. The cursor
    /// position is unchanged when this returns.
    pub fn remaining(&mut self) -> Result<u64> {
        let position = self.inner.stream_position()?;
        let end = self.inner.seek(SeekFrom::End(0))?;
        self.inner.seek(SeekFrom::Start(position))?;
        Ok(end.saturating_sub(position))
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        self.inner.read_u8().map_err(truncation)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        self.inner.read_u16::<LittleEndian>().map_err(truncation)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        self.inner.read_u32::<LittleEndian>().map_err(truncation)
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        self.inner.read_u64::<LittleEndian>().map_err(truncation)
    }

    /// Pointer-sized read: 32-bit images store these fields as `u32`,
    /// zero-extended here so callers always see a `u64`.
    pub fn read_uint(&mut self, width: PointerWidth) -> Result<u64> {
        match width {
            PointerWidth::Bits32 => Ok(u64::from(self.read_u32()?)),
            PointerWidth::Bits64 => self.read_u64(),
        }
    }

    /// Read exactly `N` raw bytes, for signature tags.
    pub fn read_bytes<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut buf = [0u8; N];
        self.inner.read_exact(&mut buf).map_err(truncation)?;
        Ok(buf)
    }
}

/// A short read means the stream ended inside a required field; everything
/// else stays an I/O error.
fn truncation(err: io::Error) -> PeError {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        PeError::TruncatedInput
    } else {
        PeError::Io(err)
    }
}
