//! Fixed-width little-endian integer codec.
//!
//! Every function works on a caller-sized slice at an explicit cursor and
//! returns the advanced cursor. Nothing here allocates; the engine sizes its
//! buffers and validates frame lengths before decoding.

#[inline]
pub fn encode_u8(buf: &mut [u8], pos: usize, value: u8) -> usize {
    buf[pos] = value;
    pos + 1
}

#[inline]
pub fn encode_u16(buf: &mut [u8], pos: usize, value: u16) -> usize {
    buf[pos..pos + 2].copy_from_slice(&value.to_le_bytes());
    pos + 2
}

#[inline]
pub fn encode_u32(buf: &mut [u8], pos: usize, value: u32) -> usize {
    buf[pos..pos + 4].copy_from_slice(&value.to_le_bytes());
    pos + 4
}

#[inline]
pub fn encode_u64(buf: &mut [u8], pos: usize, value: u64) -> usize {
    buf[pos..pos + 8].copy_from_slice(&value.to_le_bytes());
    pos + 8
}

#[inline]
pub fn decode_u8(buf: &[u8], pos: usize) -> (u8, usize) {
    (buf[pos], pos + 1)
}

#[inline]
pub fn decode_u16(buf: &[u8], pos: usize) -> (u16, usize) {
    let mut raw = [0u8; 2];
    raw.copy_from_slice(&buf[pos..pos + 2]);
    (u16::from_le_bytes(raw), pos + 2)
}

#[inline]
pub fn decode_u32(buf: &[u8], pos: usize) -> (u32, usize) {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&buf[pos..pos + 4]);
    (u32::from_le_bytes(raw), pos + 4)
}

#[inline]
pub fn decode_u64(buf: &[u8], pos: usize) -> (u64, usize) {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&buf[pos..pos + 8]);
    (u64::from_le_bytes(raw), pos + 8)
}
