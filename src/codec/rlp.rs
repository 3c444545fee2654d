//! Length-prefixed item encoding.
//!
//! Headers are parsed as views into the caller's buffer; nothing is
//! copied until a field is materialized.

use ethers::types::U256;

use crate::error::DecodeError;
use crate::math;

const STRING_SHORT: u8 = 0x80;
const STRING_LONG: u8 = 0xb7;
const LIST_SHORT: u8 = 0xc0;
const LIST_LONG: u8 = 0xf7;
/// Payloads shorter than this use the single-byte header form.
const SHORT_PAYLOAD: usize = 56;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub list: bool,
    pub payload_len: usize,
    /// 0 for a single byte below 0x80 that is its own encoding
    pub header_len: usize,
}

/// One item split off a buffer.
#[derive(Debug, Clone, Copy)]
pub struct Item<'a> {
    pub list: bool,
    pub payload: &'a [u8],
    /// Header plus payload
    pub encoded: &'a [u8],
}

pub fn decode_header(buf: &[u8], context: &'static str) -> Result<Header, DecodeError> {
    let prefix = *buf.first().ok_or(DecodeError::Truncated {
        context,
        need: 1,
        have: 0,
    })?;
    let header = match prefix {
        0x00..=0x7f => Header {
            list: false,
            payload_len: 1,
            header_len: 0,
        },
        STRING_SHORT..=STRING_LONG => Header {
            list: false,
            payload_len: (prefix - STRING_SHORT) as usize,
            header_len: 1,
        },
        0xb8..=0xbf => long_header(buf, (prefix - STRING_LONG) as usize, false)?,
        LIST_SHORT..=LIST_LONG => Header {
            list: true,
            payload_len: (prefix - LIST_SHORT) as usize,
            header_len: 1,
        },
        _ => long_header(buf, (prefix - LIST_LONG) as usize, true)?,
    };
    Ok(header)
}

fn long_header(buf: &[u8], len_of_len: usize, list: bool) -> Result<Header, DecodeError> {
    let rest = &buf[1..];
    if rest.len() < len_of_len {
        return Err(DecodeError::LengthOfLength {
            len_of_len,
            remaining: rest.len(),
        });
    }
    if len_of_len > std::mem::size_of::<usize>() {
        return Err(DecodeError::LengthOverflow);
    }
    let payload_len = rest[..len_of_len]
        .iter()
        .fold(0usize, |acc, &b| (acc << 8) | b as usize);
    Ok(Header {
        list,
        payload_len,
        header_len: 1 + len_of_len,
    })
}

/// Splits the next item off the front of `buf`, advancing it.
pub fn next_item<'a>(buf: &mut &'a [u8], context: &'static str) -> Result<Item<'a>, DecodeError> {
    let data: &'a [u8] = *buf;
    let header = decode_header(data, context)?;
    let total = header
        .header_len
        .checked_add(header.payload_len)
        .ok_or(DecodeError::LengthOverflow)?;
    if data.len() < total {
        return Err(DecodeError::Truncated {
            context,
            need: total,
            have: data.len(),
        });
    }
    let encoded = &data[..total];
    let payload = if header.header_len == 0 {
        encoded
    } else {
        &encoded[header.header_len..]
    };
    *buf = &data[total..];
    Ok(Item {
        list: header.list,
        payload,
        encoded,
    })
}

/// Splits a top-level list into the encoded bytes of each element.
pub fn split_list(buf: &[u8]) -> Result<Vec<&[u8]>, DecodeError> {
    if buf.is_empty() {
        return Err(DecodeError::Empty);
    }
    let mut cursor = buf;
    let outer = next_item(&mut cursor, "list")?;
    if !outer.list {
        return Err(DecodeError::UnexpectedString);
    }
    if !cursor.is_empty() {
        return Err(DecodeError::TrailingBytes(cursor.len()));
    }
    let mut items = Vec::new();
    let mut inner = outer.payload;
    while !inner.is_empty() {
        items.push(next_item(&mut inner, "list element")?.encoded);
    }
    Ok(items)
}

// ---- encoding ----

#[inline]
fn be_len(v: usize) -> usize {
    ((usize::BITS - v.leading_zeros()) as usize + 7) / 8
}

#[inline]
pub fn header_len(payload_len: usize) -> usize {
    if payload_len < SHORT_PAYLOAD {
        1
    } else {
        1 + be_len(payload_len)
    }
}

pub fn write_header(out: &mut Vec<u8>, payload_len: usize, list: bool) {
    let (short, long) = if list {
        (LIST_SHORT, LIST_LONG)
    } else {
        (STRING_SHORT, STRING_LONG)
    };
    if payload_len < SHORT_PAYLOAD {
        out.push(short + payload_len as u8);
    } else {
        let n = be_len(payload_len);
        out.push(long + n as u8);
        out.extend_from_slice(&payload_len.to_be_bytes()[std::mem::size_of::<usize>() - n..]);
    }
}

/// Encoded size of a byte string.
#[inline]
pub fn bytes_len(bytes: &[u8]) -> usize {
    if bytes.len() == 1 && bytes[0] < STRING_SHORT {
        1
    } else {
        header_len(bytes.len()) + bytes.len()
    }
}

pub fn write_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    if bytes.len() == 1 && bytes[0] < STRING_SHORT {
        out.push(bytes[0]);
    } else {
        write_header(out, bytes.len(), false);
        out.extend_from_slice(bytes);
    }
}

#[inline]
pub fn u64_len(v: u64) -> usize {
    let n = 8 - (v.leading_zeros() / 8) as usize;
    bytes_len(&v.to_be_bytes()[8 - n..])
}

pub fn write_u64(out: &mut Vec<u8>, v: u64) {
    let n = 8 - (v.leading_zeros() / 8) as usize;
    write_bytes(out, &v.to_be_bytes()[8 - n..]);
}

#[inline]
pub fn amount_len(v: &U256) -> usize {
    let be = math::to_be_bytes(*v);
    bytes_len(&be[32 - math::byte_len(*v)..])
}

pub fn write_amount(out: &mut Vec<u8>, v: &U256) {
    let be = math::to_be_bytes(*v);
    write_bytes(out, &be[32 - math::byte_len(*v)..]);
}

/// Integers are encoded without leading zeros; zero is the empty string.
pub fn read_u64(payload: &[u8], field: &'static str) -> Result<u64, DecodeError> {
    if payload.len() > 8 {
        return Err(DecodeError::IntegerTooWide {
            field,
            len: payload.len(),
            max: 8,
        });
    }
    Ok(payload.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64))
}

pub fn read_amount(payload: &[u8], field: &'static str) -> Result<U256, DecodeError> {
    math::from_be_slice(payload).ok_or(DecodeError::IntegerTooWide {
        field,
        len: payload.len(),
        max: 32,
    })
}
