use std::collections::BTreeMap;

use bytes::Bytes;

use super::error::BencodeError;
use super::value::Value;

const MAX_DEPTH: usize = 64;

/// Decodes a bencode value from a byte slice.
///
/// The input must contain exactly one complete bencode value with no
/// trailing data; use [`decode_prefix`] when the value may be followed by
/// other bytes.
///
/// # Errors
///
/// Returns an error if:
/// - the input is empty or truncated ([`BencodeError::UnexpectedEof`])
/// - the input contains invalid bencode syntax
/// - a dictionary key is not a byte string or keys are not strictly
///   ascending ([`BencodeError::InvalidDictKey`])
/// - the nesting depth exceeds 64 levels ([`BencodeError::NestingTooDeep`])
/// - data remains after the value ([`BencodeError::TrailingData`])
///
/// # Examples
///
/// ```
/// use bitfetch::bencode::decode;
///
/// let int = decode(b"i-52e").unwrap();
/// assert_eq!(int.as_integer(), Some(-52));
///
/// let string = decode(b"5:hello").unwrap();
/// assert_eq!(string.as_str(), Some("hello"));
///
/// let list = decode(b"l5:helloi52ee").unwrap();
/// assert_eq!(list.as_list().unwrap().len(), 2);
/// ```
pub fn decode(data: &[u8]) -> Result<Value, BencodeError> {
    let (value, consumed) = decode_prefix(data)?;

    if consumed != data.len() {
        return Err(BencodeError::TrailingData);
    }

    Ok(value)
}

/// Decodes one bencode value from the front of a byte slice.
///
/// Returns the value together with the number of bytes it occupied, leaving
/// any trailing bytes to the caller. The metadata exchange relies on this to
/// split a payload into its bencoded header and the raw bytes that follow.
pub fn decode_prefix(data: &[u8]) -> Result<(Value, usize), BencodeError> {
    let mut pos = 0;
    let value = decode_value(data, &mut pos, 0)?;
    Ok((value, pos))
}

fn decode_value(data: &[u8], pos: &mut usize, depth: usize) -> Result<Value, BencodeError> {
    if depth > MAX_DEPTH {
        return Err(BencodeError::NestingTooDeep);
    }

    if *pos >= data.len() {
        return Err(BencodeError::UnexpectedEof);
    }

    match data[*pos] {
        b'i' => decode_integer(data, pos),
        b'l' => decode_list(data, pos, depth),
        b'd' => decode_dict(data, pos, depth),
        b'0'..=b'9' => decode_bytes(data, pos).map(Value::Bytes),
        c => Err(BencodeError::UnexpectedChar(c as char)),
    }
}

fn decode_integer(data: &[u8], pos: &mut usize) -> Result<Value, BencodeError> {
    *pos += 1;

    let start = *pos;
    while *pos < data.len() && data[*pos] != b'e' {
        *pos += 1;
    }

    if *pos >= data.len() {
        return Err(BencodeError::UnexpectedEof);
    }

    let int_str = std::str::from_utf8(&data[start..*pos])
        .map_err(|_| BencodeError::InvalidInteger("invalid utf8".into()))?;

    if int_str.is_empty() {
        return Err(BencodeError::InvalidInteger("empty".into()));
    }

    if int_str.starts_with("-0") || (int_str.starts_with('0') && int_str.len() > 1) {
        return Err(BencodeError::InvalidInteger("leading zeros".into()));
    }

    let value: i64 = int_str
        .parse()
        .map_err(|_| BencodeError::InvalidInteger(int_str.into()))?;

    *pos += 1;
    Ok(Value::Integer(value))
}

fn decode_bytes(data: &[u8], pos: &mut usize) -> Result<Bytes, BencodeError> {
    let start = *pos;
    while *pos < data.len() && data[*pos] != b':' {
        *pos += 1;
    }

    if *pos >= data.len() {
        return Err(BencodeError::UnexpectedEof);
    }

    let len_str =
        std::str::from_utf8(&data[start..*pos]).map_err(|_| BencodeError::InvalidStringLength)?;

    let len: usize = len_str
        .parse()
        .map_err(|_| BencodeError::InvalidStringLength)?;

    *pos += 1;

    if *pos + len > data.len() {
        return Err(BencodeError::UnexpectedEof);
    }

    let bytes = Bytes::copy_from_slice(&data[*pos..*pos + len]);
    *pos += len;

    Ok(bytes)
}

fn decode_list(data: &[u8], pos: &mut usize, depth: usize) -> Result<Value, BencodeError> {
    *pos += 1;
    let mut list = Vec::new();

    while *pos < data.len() && data[*pos] != b'e' {
        list.push(decode_value(data, pos, depth + 1)?);
    }

    if *pos >= data.len() {
        return Err(BencodeError::UnexpectedEof);
    }

    *pos += 1;
    Ok(Value::List(list))
}

fn decode_dict(data: &[u8], pos: &mut usize, depth: usize) -> Result<Value, BencodeError> {
    *pos += 1;
    let mut dict = BTreeMap::new();
    let mut last_key: Option<Bytes> = None;

    while *pos < data.len() && data[*pos] != b'e' {
        if !data[*pos].is_ascii_digit() {
            return Err(BencodeError::InvalidDictKey);
        }

        let key = decode_bytes(data, pos)?;

        // Strictly ascending keys make re-encoding byte-identical, which the
        // info-hash computation depends on.
        if let Some(ref prev) = last_key {
            if key <= *prev {
                return Err(BencodeError::InvalidDictKey);
            }
        }
        last_key = Some(key.clone());

        let value = decode_value(data, pos, depth + 1)?;
        dict.insert(key, value);
    }

    if *pos >= data.len() {
        return Err(BencodeError::UnexpectedEof);
    }

    *pos += 1;
    Ok(Value::Dict(dict))
}
