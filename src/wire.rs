//! Length-prefixed binary framing for requests and responses.
//!
//! Three primitive shapes travel on the wire: a one-byte boolean (strictly 0
//! or 1), a four-byte little-endian unsigned integer, and a byte string
//! prefixed by its uint32 length. Lengths are authoritative; there are no
//! delimiters and no escaping, and a short read fails the whole decode with
//! no resynchronization.

use std::io::{Read, Write};

use thiserror::Error;

/// Errors produced by the wire codec. Callers wrap these with the artifact
/// context (input, cert, key) before reporting.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("unexpected end of stream")]
    UnexpectedEof,

    #[error("invalid boolean byte {0:#04x}")]
    InvalidBool(u8),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

fn map_eof(err: std::io::Error) -> WireError {
    if err.kind() == std::io::ErrorKind::UnexpectedEof {
        WireError::UnexpectedEof
    } else {
        WireError::Io(err)
    }
}

/// Reads wire primitives from a byte stream.
pub struct WireReader<R> {
    inner: R,
}

impl<R: Read> WireReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Reads a single byte and requires it to be exactly 0 or 1.
    pub fn read_bool(&mut self) -> Result<bool, WireError> {
        let mut buf = [0u8; 1];
        self.inner.read_exact(&mut buf).map_err(map_eof)?;
        match buf[0] {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(WireError::InvalidBool(other)),
        }
    }

    /// Reads a four-byte little-endian unsigned integer.
    pub fn read_uint(&mut self) -> Result<u32, WireError> {
        let mut buf = [0u8; 4];
        self.inner.read_exact(&mut buf).map_err(map_eof)?;
        Ok(u32::from_le_bytes(buf))
    }

    /// Reads a uint32 length followed by that many raw bytes.
    ///
    /// The bytes carry no terminator and are not required to be UTF-8 or
    /// NUL-free; the length stays authoritative end to end.
    pub fn read_string(&mut self) -> Result<Vec<u8>, WireError> {
        let len = self.read_uint()? as usize;
        let mut buf = vec![0u8; len];
        self.inner.read_exact(&mut buf).map_err(map_eof)?;
        Ok(buf)
    }
}

/// Writes wire primitives to a byte stream. Mirrors [`WireReader`].
pub struct WireWriter<W> {
    inner: W,
}

impl<W: Write> WireWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn write_bool(&mut self, value: bool) -> Result<(), WireError> {
        self.inner.write_all(&[value as u8])?;
        Ok(())
    }

    pub fn write_uint(&mut self, value: u32) -> Result<(), WireError> {
        self.inner.write_all(&value.to_le_bytes())?;
        Ok(())
    }

    /// Writes a uint32 length followed by the raw bytes.
    pub fn write_bytelen(&mut self, data: &[u8]) -> Result<(), WireError> {
        self.write_uint(data.len() as u32)?;
        self.inner.write_all(data)?;
        Ok(())
    }

    pub fn write_string(&mut self, value: &str) -> Result<(), WireError> {
        self.write_bytelen(value.as_bytes())
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}
