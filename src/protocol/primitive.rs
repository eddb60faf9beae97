use crate::error::{Error, Result};
use zerocopy::FromBytes;
use zerocopy::byteorder::little_endian::{U16 as U16LE, U32 as U32LE, U64 as U64LE};

/// Marker byte of a NULL length-encoded value
pub const LENENC_NULL: u8 = 0xFB;

/// Decoded length-encoded integer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LenEnc {
    /// The `0xFB` marker (SQL NULL in a text row)
    Null,
    Int(u64),
}

/// Read 1-byte integer
pub fn read_int_1(data: &[u8]) -> Result<(u8, &[u8])> {
    match data.split_first() {
        Some((&value, rest)) => Ok((value, rest)),
        None => Err(Error::UnexpectedEof),
    }
}

/// Read 2-byte little-endian integer
pub fn read_int_2(data: &[u8]) -> Result<(u16, &[u8])> {
    let (value, rest) = U16LE::read_from_prefix(data).map_err(|_| Error::UnexpectedEof)?;
    Ok((value.get(), rest))
}

/// Read 3-byte little-endian integer
pub fn read_int_3(data: &[u8]) -> Result<(u32, &[u8])> {
    let (bytes, rest) = read_string_fix(data, 3)?;
    let &[low, mid, high] = bytes else {
        return Err(Error::UnexpectedEof);
    };
    Ok((u32::from_le_bytes([low, mid, high, 0]), rest))
}

/// Read 4-byte little-endian integer
pub fn read_int_4(data: &[u8]) -> Result<(u32, &[u8])> {
    let (value, rest) = U32LE::read_from_prefix(data).map_err(|_| Error::UnexpectedEof)?;
    Ok((value.get(), rest))
}

/// Read 8-byte little-endian integer
pub fn read_int_8(data: &[u8]) -> Result<(u64, &[u8])> {
    let (value, rest) = U64LE::read_from_prefix(data).map_err(|_| Error::UnexpectedEof)?;
    Ok((value.get(), rest))
}

/// Read a little-endian integer of `n_bytes` (1 to 4) bytes
pub fn read_int_fixed(data: &[u8], n_bytes: usize) -> Result<(u32, &[u8])> {
    match n_bytes {
        1 => read_int_1(data).map(|(v, rest)| (u32::from(v), rest)),
        2 => read_int_2(data).map(|(v, rest)| (u32::from(v), rest)),
        3 => read_int_3(data),
        4 => read_int_4(data),
        _ => Err(Error::InvalidPacket),
    }
}

/// Read length-encoded integer that may be the NULL marker
///
/// `0xFF` never starts a length-encoded integer and is rejected.
pub fn read_int_lenenc_nullable(data: &[u8]) -> Result<(LenEnc, &[u8])> {
    let (first, rest) = read_int_1(data)?;
    match first {
        LENENC_NULL => Ok((LenEnc::Null, rest)),
        0xFC => {
            let (val, rest) = read_int_2(rest)?;
            Ok((LenEnc::Int(u64::from(val)), rest))
        }
        0xFD => {
            let (val, rest) = read_int_3(rest)?;
            Ok((LenEnc::Int(u64::from(val)), rest))
        }
        0xFE => {
            let (val, rest) = read_int_8(rest)?;
            Ok((LenEnc::Int(val), rest))
        }
        0xFF => Err(Error::InvalidPacket),
        val => Ok((LenEnc::Int(u64::from(val)), rest)),
    }
}

/// Read length-encoded integer, where NULL is not allowed
pub fn read_int_lenenc(data: &[u8]) -> Result<(u64, &[u8])> {
    match read_int_lenenc_nullable(data)? {
        (LenEnc::Int(value), rest) => Ok((value, rest)),
        (LenEnc::Null, _) => Err(Error::InvalidPacket),
    }
}

/// Read fixed-length string
pub fn read_string_fix(data: &[u8], len: usize) -> Result<(&[u8], &[u8])> {
    data.split_at_checked(len).ok_or(Error::UnexpectedEof)
}

/// Read null-terminated string
pub fn read_string_null(data: &[u8]) -> Result<(&[u8], &[u8])> {
    let end = data
        .iter()
        .position(|&byte| byte == 0)
        .ok_or(Error::UnexpectedEof)?;
    Ok((&data[..end], &data[end + 1..]))
}

/// Read length-encoded string
pub fn read_string_lenenc(data: &[u8]) -> Result<(&[u8], &[u8])> {
    let (len, rest) = read_int_lenenc(data)?;
    let len = usize::try_from(len).map_err(|_| Error::UnexpectedEof)?;
    read_string_fix(rest, len)
}

/// Read length-encoded string that may be NULL
pub fn read_string_lenenc_nullable(data: &[u8]) -> Result<(Option<&[u8]>, &[u8])> {
    match read_int_lenenc_nullable(data)? {
        (LenEnc::Null, rest) => Ok((None, rest)),
        (LenEnc::Int(len), rest) => {
            let len = usize::try_from(len).map_err(|_| Error::UnexpectedEof)?;
            let (value, rest) = read_string_fix(rest, len)?;
            Ok((Some(value), rest))
        }
    }
}

/// Copy wire bytes into an owned string.
///
/// The session announces latin1, so bytes that are not UTF-8 are replaced
/// instead of failing the whole result set.
pub fn to_string_lossy(bytes: &[u8]) -> String {
    match simdutf8::basic::from_utf8(bytes) {
        Ok(s) => s.to_owned(),
        Err(_) => String::from_utf8_lossy(bytes).into_owned(),
    }
}

// ============================================================================
// Offset-based reads
// ============================================================================

/// Number of bytes consumed between `before` and `after`
fn consumed(before: &[u8], after: &[u8]) -> usize {
    before.len() - after.len()
}

/// Read a little-endian integer of `n_bytes` (1 to 4) at `offset`
pub fn read_fixed_int(buf: &[u8], offset: usize, n_bytes: usize) -> Result<u32> {
    let data = buf.get(offset..).ok_or(Error::UnexpectedEof)?;
    let (value, _rest) = read_int_fixed(data, n_bytes)?;
    Ok(value)
}

/// Read a length-encoded integer at `offset`, returning the value and the
/// number of bytes it occupies
pub fn read_length_encoded_int(buf: &[u8], offset: usize) -> Result<(LenEnc, usize)> {
    let data = buf.get(offset..).ok_or(Error::UnexpectedEof)?;
    let (value, rest) = read_int_lenenc_nullable(data)?;
    Ok((value, consumed(data, rest)))
}

/// Read a length-encoded string at `offset`, returning the string (`None` for
/// NULL) and the number of bytes it occupies including the length prefix
pub fn read_length_encoded_string(buf: &[u8], offset: usize) -> Result<(Option<String>, usize)> {
    let data = buf.get(offset..).ok_or(Error::UnexpectedEof)?;
    let (value, rest) = read_string_lenenc_nullable(data)?;
    Ok((value.map(to_string_lossy), consumed(data, rest)))
}

/// Write the low `n_bytes` (1 to 4) bytes of `value` at `offset`, little-endian
pub fn write_fixed_int(dest: &mut [u8], offset: usize, value: u32, n_bytes: usize) -> Result<()> {
    if !(1..=4).contains(&n_bytes) {
        return Err(Error::InvalidPacket);
    }
    let end = offset.checked_add(n_bytes).ok_or(Error::UnexpectedEof)?;
    let slot = dest.get_mut(offset..end).ok_or(Error::UnexpectedEof)?;
    slot.copy_from_slice(&value.to_le_bytes()[..n_bytes]);
    Ok(())
}

// ============================================================================
// Writers
// ============================================================================

/// Write 1-byte integer
pub fn write_int_1(out: &mut Vec<u8>, value: u8) {
    out.push(value);
}

/// Write 2-byte little-endian integer
pub fn write_int_2(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_le_bytes());
}

/// Write 3-byte little-endian integer
pub fn write_int_3(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes()[..3]);
}

/// Write 4-byte little-endian integer
pub fn write_int_4(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

/// Write 8-byte little-endian integer
pub fn write_int_8(out: &mut Vec<u8>, value: u64) {
    out.extend_from_slice(&value.to_le_bytes());
}

/// Write length-encoded integer
pub fn write_int_lenenc(out: &mut Vec<u8>, value: u64) {
    if value < 251 {
        out.push(value as u8);
    } else if value < (1 << 16) {
        out.push(0xfc);
        write_int_2(out, value as u16);
    } else if value < (1 << 24) {
        out.push(0xfd);
        write_int_3(out, value as u32);
    } else {
        out.push(0xfe);
        write_int_8(out, value);
    }
}

/// Write fixed-length bytes
pub fn write_bytes_fix(out: &mut Vec<u8>, data: &[u8]) {
    out.extend_from_slice(data);
}

/// Write null-terminated string
pub fn write_string_null(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(s.as_bytes());
    out.push(0);
}

/// Write length-encoded bytes
pub fn write_bytes_lenenc(out: &mut Vec<u8>, data: &[u8]) {
    write_int_lenenc(out, data.len() as u64);
    out.extend_from_slice(data);
}
