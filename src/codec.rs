//! Codec primitives shared by the transcoder and the message framing.
//!
//! Holds the crate error type, byte-order helpers for fixed-width values of any
//! width between 1 and 8 bytes (IPFIX reduced-length encoding), and the
//! variable-length prefix used by varfields and structured lists.

use byteorder::{BigEndian, ByteOrder, LittleEndian, WriteBytesExt};
use std::io::{Cursor, Write};

/// Byte order of a fixed-width value. Wire data is always big-endian; in-memory
/// record storage of endian elements uses the host order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endianness {
    Big,
    Little,
}

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Index {index} out of range (count {count})")]
    IndexOutOfRange { index: usize, count: usize },
    #[error("Invalid spec: {0}")]
    InvalidSpec(String),
    #[error("Template already registered with a session; it can no longer change")]
    AlreadyFinalized,
    #[error("Invalid template id: {0}")]
    InvalidTemplateId(u32),
    #[error("Template {0} not registered")]
    NotRegistered(u16),
    #[error("Not configured: {0}")]
    NotConfigured(String),
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),
    #[error("Key not found: {0}")]
    KeyNotFound(String),
    #[error("Type mismatch: {0}")]
    TypeMismatch(String),
    #[error("Record schema is frozen once a list has been initialized")]
    AlreadyFrozen,
    #[error("Unknown element: {0}")]
    UnknownElement(String),
    #[error("Not initialized: {0}")]
    NotInitialized(String),
    #[error("Record has no template")]
    NoTemplate,
    #[error("Record list must not be empty")]
    EmptyList,
    #[error("Invalid mode: {0}")]
    InvalidMode(String),
    #[error("End of stream")]
    EndOfStream,
    #[error("No data available yet")]
    WouldBlock,
    #[error("Malformed: {0}")]
    Malformed(String),
    #[error("Parse error: {0}")]
    Parse(String),
}

impl CodecError {
    /// True for errors after which the same call may succeed later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CodecError::WouldBlock)
    }
}

/// Length prefix value announcing the 3-byte long form (RFC 7011 section 7).
pub const VARLEN_LONG_MARKER: u8 = 255;

impl Endianness {
    pub const fn native() -> Self {
        if cfg!(target_endian = "big") {
            Endianness::Big
        } else {
            Endianness::Little
        }
    }

    /// Unsigned value stored in `buf` (1..=8 bytes).
    pub fn read_uint(self, buf: &[u8]) -> u64 {
        match buf.len() {
            0 => 0,
            1 => buf[0] as u64,
            n if n <= 8 => match self {
                Endianness::Big => BigEndian::read_uint(buf, n),
                Endianness::Little => LittleEndian::read_uint(buf, n),
            },
            _ => 0,
        }
    }

    /// Signed value stored in `buf`, sign-extended from its width.
    pub fn read_int(self, buf: &[u8]) -> i64 {
        match buf.len() {
            0 => 0,
            1 => buf[0] as i8 as i64,
            n if n <= 8 => match self {
                Endianness::Big => BigEndian::read_int(buf, n),
                Endianness::Little => LittleEndian::read_int(buf, n),
            },
            _ => 0,
        }
    }

    /// Store the low `buf.len()` bytes of `v`.
    pub fn write_uint(self, buf: &mut [u8], v: u64) {
        let n = buf.len();
        match n {
            0 => {}
            1 => buf[0] = v as u8,
            n if n < 8 => {
                let masked = v & ((1u64 << (n * 8)) - 1);
                match self {
                    Endianness::Big => BigEndian::write_uint(buf, masked, n),
                    Endianness::Little => LittleEndian::write_uint(buf, masked, n),
                }
            }
            _ => match self {
                Endianness::Big => BigEndian::write_u64(&mut buf[..8], v),
                Endianness::Little => LittleEndian::write_u64(&mut buf[..8], v),
            },
        }
    }

    pub fn read_f32(self, buf: &[u8]) -> f32 {
        match self {
            Endianness::Big => BigEndian::read_f32(buf),
            Endianness::Little => LittleEndian::read_f32(buf),
        }
    }

    pub fn read_f64(self, buf: &[u8]) -> f64 {
        match self {
            Endianness::Big => BigEndian::read_f64(buf),
            Endianness::Little => LittleEndian::read_f64(buf),
        }
    }

    pub fn write_f32(self, buf: &mut [u8], v: f32) {
        match self {
            Endianness::Big => BigEndian::write_f32(buf, v),
            Endianness::Little => LittleEndian::write_f32(buf, v),
        }
    }

    pub fn write_f64(self, buf: &mut [u8], v: f64) {
        match self {
            Endianness::Big => BigEndian::write_f64(buf, v),
            Endianness::Little => LittleEndian::write_f64(buf, v),
        }
    }
}

/// Borrow the next `n` bytes of the cursor and advance past them.
pub fn take<'a>(r: &mut Cursor<&'a [u8]>, n: usize) -> Result<&'a [u8], CodecError> {
    let buf: &'a [u8] = *r.get_ref();
    let start = r.position() as usize;
    let end = start
        .checked_add(n)
        .filter(|&e| e <= buf.len())
        .ok_or_else(|| {
            CodecError::Malformed(format!(
                "need {} bytes at offset {}, only {} left",
                n,
                start,
                buf.len().saturating_sub(start)
            ))
        })?;
    r.set_position(end as u64);
    Ok(&buf[start..end])
}

pub fn remaining(r: &Cursor<&[u8]>) -> usize {
    r.get_ref().len().saturating_sub(r.position() as usize)
}

pub fn read_u8(r: &mut Cursor<&[u8]>) -> Result<u8, CodecError> {
    Ok(take(r, 1)?[0])
}

pub fn read_u16(r: &mut Cursor<&[u8]>) -> Result<u16, CodecError> {
    Ok(BigEndian::read_u16(take(r, 2)?))
}

pub fn read_u32(r: &mut Cursor<&[u8]>) -> Result<u32, CodecError> {
    Ok(BigEndian::read_u32(take(r, 4)?))
}

/// Read a varlen prefix: one byte, or 255 followed by a big-endian u16.
pub fn read_varlen_prefix(r: &mut Cursor<&[u8]>) -> Result<usize, CodecError> {
    let first = read_u8(r)?;
    if first == VARLEN_LONG_MARKER {
        Ok(read_u16(r)? as usize)
    } else {
        Ok(first as usize)
    }
}

/// Write a varlen prefix in the shortest form that fits.
pub fn write_varlen_prefix(w: &mut Vec<u8>, len: usize) -> Result<(), CodecError> {
    if len < VARLEN_LONG_MARKER as usize {
        w.write_u8(len as u8)?;
    } else if len <= u16::MAX as usize {
        w.write_u8(VARLEN_LONG_MARKER)?;
        w.write_u16::<BigEndian>(len as u16)?;
    } else {
        return Err(CodecError::Malformed(format!(
            "variable-length field of {} bytes exceeds 65535",
            len
        )));
    }
    Ok(())
}

/// Write a varlen-prefixed payload.
pub fn write_varfield(w: &mut Vec<u8>, payload: &[u8]) -> Result<(), CodecError> {
    write_varlen_prefix(w, payload.len())?;
    w.write_all(payload)?;
    Ok(())
}

/// Patch a big-endian u16 at `at`, used to back-fill set and list lengths.
pub fn patch_u16(buf: &mut [u8], at: usize, v: u16) {
    BigEndian::write_u16(&mut buf[at..at + 2], v);
}
