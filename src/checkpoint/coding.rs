//! Low-level encodings shared by the sorted-table and bundle formats:
//! varints, fixed-width little-endian integers and masked CRC32C.

use anyhow::{anyhow, bail, Result};
use bytes::{Buf, BufMut};

const MASK_DELTA: u32 = 0xa282_ead8;

/// Rotates and offsets a CRC so that checksums of data which itself
/// contains CRCs stay well distributed.
pub fn mask_crc(crc: u32) -> u32 {
    ((crc >> 15) | (crc << 17)).wrapping_add(MASK_DELTA)
}

#[cfg(test)]
fn unmask_crc(masked: u32) -> u32 {
    let rot = masked.wrapping_sub(MASK_DELTA);
    (rot >> 17) | (rot << 15)
}

/// Masked CRC32C over the concatenation of `parts`.
pub fn masked_crc32c(parts: &[&[u8]]) -> u32 {
    let crc = parts
        .iter()
        .fold(0u32, |crc, part| crc32c::crc32c_append(crc, part));
    mask_crc(crc)
}

pub fn put_varint(buf: &mut Vec<u8>, value: u64) {
    prost::encoding::encode_varint(value, buf);
}

/// Decodes a varint from the front of `buf`, advancing it.
pub fn get_varint(buf: &mut &[u8]) -> Result<u64> {
    prost::encoding::decode_varint(buf).map_err(|e| anyhow!("bad varint: {e}"))
}

pub fn get_varint32(buf: &mut &[u8]) -> Result<u32> {
    let v = get_varint(buf)?;
    u32::try_from(v).map_err(|_| anyhow!("varint {v} overflows u32"))
}

pub fn put_fixed32(buf: &mut Vec<u8>, value: u32) {
    buf.put_u32_le(value);
}

pub fn get_fixed32(buf: &mut &[u8]) -> Result<u32> {
    if buf.remaining() < 4 {
        bail!("truncated fixed32");
    }
    Ok(buf.get_u32_le())
}

pub fn put_fixed64(buf: &mut Vec<u8>, value: u64) {
    buf.put_u64_le(value);
}

pub fn get_fixed64(buf: &mut &[u8]) -> Result<u64> {
    if buf.remaining() < 8 {
        bail!("truncated fixed64");
    }
    Ok(buf.get_u64_le())
}

/// Takes `len` bytes from the front of `buf`.
pub fn get_bytes<'a>(buf: &mut &'a [u8], len: usize) -> Result<&'a [u8]> {
    if buf.len() < len {
        bail!("truncated field: need {len} bytes, have {}", buf.len());
    }
    let (head, tail) = buf.split_at(len);
    *buf = tail;
    Ok(head)
}
