//! External Data Representation (XDR) primitives, as specified in RFC 1014.
//!
//! Every ONC RPC message body on the wire is 4-byte aligned, big-endian
//! encoded data. This module provides the integer, string and opaque-array
//! codecs the procedure-specific argument/result builders in
//! [`crate::portmap`], [`crate::mount`] and [`crate::nfs`] are built from.
//!
//! The encode side always produces correctly aligned, correctly byte-ordered
//! output - unlike a naive byte-shuffling implementation, there is no
//! silently-wrong no-op path through these functions.

use std::io::Cursor;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::Error;

/// Appends a big-endian `u32` to `buf`.
pub(crate) fn encode_u32(buf: &mut Vec<u8>, v: u32) {
    buf.write_u32::<BigEndian>(v).expect("write to Vec never fails");
}

/// Appends a big-endian `u64` to `buf`.
pub(crate) fn encode_u64(buf: &mut Vec<u8>, v: u64) {
    buf.write_u64::<BigEndian>(v).expect("write to Vec never fails");
}

/// Appends an XDR opaque array (a 4-byte length prefix, the bytes, then zero
/// padding out to a multiple of 4 bytes) to `buf`.
pub(crate) fn encode_opaque(buf: &mut Vec<u8>, data: &[u8]) {
    encode_u32(buf, data.len() as u32);
    buf.extend_from_slice(data);
    buf.extend(std::iter::repeat(0).take(pad_len(data.len())));
}

/// Appends an XDR string (an opaque array of its UTF-8 bytes) to `buf`.
pub(crate) fn encode_string(buf: &mut Vec<u8>, s: &str) {
    encode_opaque(buf, s.as_bytes());
}

/// Returns the number of zero-padding bytes needed to round `len` up to a
/// multiple of 4.
fn pad_len(len: usize) -> usize {
    (4 - (len % 4)) % 4
}

/// Reads a big-endian `u32` from `c`, returning [`Error::XdrTruncated`] if
/// fewer than 4 bytes remain.
pub(crate) fn decode_u32(c: &mut Cursor<&[u8]>) -> Result<u32, Error> {
    require(c, 4)?;
    Ok(c.read_u32::<BigEndian>()?)
}

/// Reads a big-endian `u64` from `c`, returning [`Error::XdrTruncated`] if
/// fewer than 8 bytes remain.
pub(crate) fn decode_u64(c: &mut Cursor<&[u8]>) -> Result<u64, Error> {
    require(c, 8)?;
    Ok(c.read_u64::<BigEndian>()?)
}

/// Reads a length-prefixed, zero-padded opaque byte array from `c`, rejecting
/// any declared length greater than `max_len`.
pub(crate) fn decode_opaque<'a>(c: &mut Cursor<&'a [u8]>, max_len: usize) -> Result<&'a [u8], Error> {
    let len = decode_u32(c)? as usize;
    if len > max_len {
        return Err(Error::XdrOversize {
            got: len as u32,
            max: max_len,
        });
    }

    require(c, len)?;
    let data = crate::read_slice_bytes(c, len as u32)?;

    let skip = pad_len(len);
    require(c, skip)?;
    c.set_position(c.position() + skip as u64);

    Ok(data)
}

/// Advances `c` past `len` bytes without returning them, for fields callers
/// have no use for (e.g. optional attribute blobs).
pub(crate) fn skip(c: &mut Cursor<&[u8]>, len: usize) -> Result<(), Error> {
    require(c, len)?;
    c.set_position(c.position() + len as u64);
    Ok(())
}

/// Reads a length-prefixed opaque array from `c` and interprets it as a UTF-8
/// string.
pub(crate) fn decode_string(c: &mut Cursor<&[u8]>, max_len: usize) -> Result<String, Error> {
    let raw = decode_opaque(c, max_len)?;
    String::from_utf8(raw.to_vec()).map_err(|_| Error::XdrOversize {
        got: raw.len() as u32,
        max: max_len,
    })
}

fn require(c: &Cursor<&[u8]>, want: usize) -> Result<(), Error> {
    let remaining = c.get_ref().len().saturating_sub(c.position() as usize);
    if remaining < want {
        return Err(Error::XdrTruncated {
            wanted: want,
            available: remaining,
        });
    }
    Ok(())
}
