//! MsgPack reader and writer for the ROCm metadata. The writer always
//! emits the minimal encoding of every element: the smallest integer
//! family member that holds the value and minimum-length string, array
//! and map headers, so re-encoding a parsed document is byte-identical.

use std::io::Write;

use crate::error::BinaryError;
use crate::ToWriter;

#[derive(Debug, Clone, PartialEq)]
/// One MsgPack value
pub enum Value {
    /// nil
    Nil,
    /// true / false
    Bool(bool),
    /// Non-negative integer
    Uint(u64),
    /// Negative integer
    Int(i64),
    /// IEEE double
    Float(f64),
    /// UTF-8 string
    Str(String),
    /// Raw bytes
    Bin(Vec<u8>),
    /// Array of values
    Array(Vec<Value>),
    /// Key/value map in insertion order
    Map(Vec<(Value, Value)>),
}

impl Value {
    /// String payload, if this is a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Integer payload widened to u64, if in range
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::Uint(v) => Some(*v),
            Value::Int(v) if *v >= 0 => Some(*v as u64),
            _ => None,
        }
    }

    /// Map payload, if this is a map
    pub fn as_map(&self) -> Option<&[(Value, Value)]> {
        match self {
            Value::Map(entries) => Some(entries),
            _ => None,
        }
    }

    /// Array payload, if this is an array
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Value of a string key in a map
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map()?
            .iter()
            .find(|(k, _)| k.as_str() == Some(key))
            .map(|(_, v)| v)
    }
}

/// Parse one MsgPack value from the head of `bytes`, returning the value
/// and the number of consumed bytes
pub fn parse(bytes: &[u8]) -> Result<(Value, usize), BinaryError> {
    let mut at = 0;
    let value = parse_at(bytes, &mut at)?;
    Ok((value, at))
}

fn need(bytes: &[u8], at: usize, len: usize) -> Result<&[u8], BinaryError> {
    bytes.get(at..at + len).ok_or(BinaryError::MsgPack {
        what: "unexpected end of data",
    })
}

fn be_uint(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64)
}

fn parse_at(bytes: &[u8], at: &mut usize) -> Result<Value, BinaryError> {
    let code = *bytes.get(*at).ok_or(BinaryError::MsgPack {
        what: "unexpected end of data",
    })?;
    *at += 1;
    let value = match code {
        0x00..=0x7f => Value::Uint(code as u64),
        0xe0..=0xff => Value::Int(code as i8 as i64),
        0xc0 => Value::Nil,
        0xc2 => Value::Bool(false),
        0xc3 => Value::Bool(true),
        0xcc | 0xcd | 0xce | 0xcf => {
            let len = 1 << (code - 0xcc);
            let raw = need(bytes, *at, len)?;
            *at += len;
            Value::Uint(be_uint(raw))
        }
        0xd0 | 0xd1 | 0xd2 | 0xd3 => {
            let len = 1 << (code - 0xd0);
            let raw = need(bytes, *at, len)?;
            *at += len;
            let raw = be_uint(raw);
            let shift = 64 - 8 * len as u32;
            Value::Int(((raw << shift) as i64) >> shift)
        }
        0xca => {
            let raw = need(bytes, *at, 4)?;
            *at += 4;
            Value::Float(f32::from_bits(be_uint(raw) as u32) as f64)
        }
        0xcb => {
            let raw = need(bytes, *at, 8)?;
            *at += 8;
            Value::Float(f64::from_bits(be_uint(raw)))
        }
        0xa0..=0xbf => parse_str(bytes, at, (code & 0x1f) as usize)?,
        0xd9 | 0xda | 0xdb => {
            let lenlen = 1 << (code - 0xd9);
            let raw = need(bytes, *at, lenlen)?;
            *at += lenlen;
            parse_str(bytes, at, be_uint(raw) as usize)?
        }
        0xc4 | 0xc5 | 0xc6 => {
            let lenlen = 1 << (code - 0xc4);
            let raw = need(bytes, *at, lenlen)?;
            *at += lenlen;
            let len = be_uint(raw) as usize;
            let data = need(bytes, *at, len)?.to_vec();
            *at += len;
            Value::Bin(data)
        }
        0x90..=0x9f => parse_array(bytes, at, (code & 0xf) as usize)?,
        0xdc | 0xdd => {
            let lenlen = 2 << (code - 0xdc);
            let raw = need(bytes, *at, lenlen)?;
            *at += lenlen;
            parse_array(bytes, at, be_uint(raw) as usize)?
        }
        0x80..=0x8f => parse_map(bytes, at, (code & 0xf) as usize)?,
        0xde | 0xdf => {
            let lenlen = 2 << (code - 0xde);
            let raw = need(bytes, *at, lenlen)?;
            *at += lenlen;
            parse_map(bytes, at, be_uint(raw) as usize)?
        }
        _ => {
            return Err(BinaryError::MsgPack {
                what: "unknown type code",
            })
        }
    };
    Ok(value)
}

fn parse_str(bytes: &[u8], at: &mut usize, len: usize) -> Result<Value, BinaryError> {
    let raw = need(bytes, *at, len)?;
    *at += len;
    let text = std::str::from_utf8(raw).map_err(|_| BinaryError::MsgPack {
        what: "invalid UTF-8 in string",
    })?;
    Ok(Value::Str(text.to_string()))
}

fn parse_array(bytes: &[u8], at: &mut usize, len: usize) -> Result<Value, BinaryError> {
    let mut items = Vec::with_capacity(len.min(4096));
    for _ in 0..len {
        items.push(parse_at(bytes, at)?);
    }
    Ok(Value::Array(items))
}

fn parse_map(bytes: &[u8], at: &mut usize, len: usize) -> Result<Value, BinaryError> {
    let mut entries = Vec::with_capacity(len.min(4096));
    for _ in 0..len {
        let key = parse_at(bytes, at)?;
        let value = parse_at(bytes, at)?;
        entries.push((key, value));
    }
    Ok(Value::Map(entries))
}

/// Serialize a value with minimal encodings
pub fn write_value(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Nil => out.push(0xc0),
        Value::Bool(false) => out.push(0xc2),
        Value::Bool(true) => out.push(0xc3),
        Value::Uint(v) => write_uint(*v, out),
        Value::Int(v) => write_int(*v, out),
        Value::Float(v) => {
            out.push(0xcb);
            out.extend_from_slice(&v.to_bits().to_be_bytes());
        }
        Value::Str(s) => {
            let len = s.len();
            if len < 32 {
                out.push(0xa0 | len as u8);
            } else if len < 0x100 {
                out.push(0xd9);
                out.push(len as u8);
            } else if len < 0x10000 {
                out.push(0xda);
                out.extend_from_slice(&(len as u16).to_be_bytes());
            } else {
                out.push(0xdb);
                out.extend_from_slice(&(len as u32).to_be_bytes());
            }
            out.extend_from_slice(s.as_bytes());
        }
        Value::Bin(data) => {
            let len = data.len();
            if len < 0x100 {
                out.push(0xc4);
                out.push(len as u8);
            } else if len < 0x10000 {
                out.push(0xc5);
                out.extend_from_slice(&(len as u16).to_be_bytes());
            } else {
                out.push(0xc6);
                out.extend_from_slice(&(len as u32).to_be_bytes());
            }
            out.extend_from_slice(data);
        }
        Value::Array(items) => {
            let len = items.len();
            if len < 16 {
                out.push(0x90 | len as u8);
            } else if len < 0x10000 {
                out.push(0xdc);
                out.extend_from_slice(&(len as u16).to_be_bytes());
            } else {
                out.push(0xdd);
                out.extend_from_slice(&(len as u32).to_be_bytes());
            }
            for item in items {
                write_value(item, out);
            }
        }
        Value::Map(entries) => {
            let len = entries.len();
            if len < 16 {
                out.push(0x80 | len as u8);
            } else if len < 0x10000 {
                out.push(0xde);
                out.extend_from_slice(&(len as u16).to_be_bytes());
            } else {
                out.push(0xdf);
                out.extend_from_slice(&(len as u32).to_be_bytes());
            }
            for (key, value) in entries {
                write_value(key, out);
                write_value(value, out);
            }
        }
    }
}

fn write_uint(v: u64, out: &mut Vec<u8>) {
    if v < 0x80 {
        out.push(v as u8);
    } else if v < 0x100 {
        out.push(0xcc);
        out.push(v as u8);
    } else if v < 0x10000 {
        out.push(0xcd);
        out.extend_from_slice(&(v as u16).to_be_bytes());
    } else if v < 0x1_0000_0000 {
        out.push(0xce);
        out.extend_from_slice(&(v as u32).to_be_bytes());
    } else {
        out.push(0xcf);
        out.extend_from_slice(&v.to_be_bytes());
    }
}

fn write_int(v: i64, out: &mut Vec<u8>) {
    if v >= 0 {
        return write_uint(v as u64, out);
    }
    if v >= -32 {
        out.push(v as i8 as u8);
    } else if v >= i8::MIN as i64 {
        out.push(0xd0);
        out.push(v as i8 as u8);
    } else if v >= i16::MIN as i64 {
        out.push(0xd1);
        out.extend_from_slice(&(v as i16).to_be_bytes());
    } else if v >= i32::MIN as i64 {
        out.push(0xd2);
        out.extend_from_slice(&(v as i32).to_be_bytes());
    } else {
        out.push(0xd3);
        out.extend_from_slice(&v.to_be_bytes());
    }
}

impl<W> ToWriter<W> for Value
where
    W: Write,
{
    type Error = std::io::Error;

    fn to_writer(&self, writer: &mut W) -> Result<(), Self::Error> {
        let mut out = Vec::new();
        write_value(self, &mut out);
        writer.write_all(&out)
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod test {
    use super::*;

    fn roundtrip(value: &Value) -> Vec<u8> {
        let mut out = Vec::new();
        write_value(value, &mut out);
        let (parsed, used) = parse(&out).unwrap();
        assert_eq!(used, out.len());
        assert_eq!(&parsed, value);
        out
    }

    #[test]
    fn test_integer_minimality() {
        assert_eq!(roundtrip(&Value::Uint(0)), [0x00]);
        assert_eq!(roundtrip(&Value::Uint(127)), [0x7f]);
        assert_eq!(roundtrip(&Value::Uint(128)), [0xcc, 0x80]);
        assert_eq!(roundtrip(&Value::Uint(255)), [0xcc, 0xff]);
        assert_eq!(roundtrip(&Value::Uint(256)), [0xcd, 0x01, 0x00]);
        assert_eq!(roundtrip(&Value::Uint(0xffff)), [0xcd, 0xff, 0xff]);
        assert_eq!(
            roundtrip(&Value::Uint(0x10000)),
            [0xce, 0x00, 0x01, 0x00, 0x00]
        );
        assert_eq!(roundtrip(&Value::Int(-1)), [0xff]);
        assert_eq!(roundtrip(&Value::Int(-32)), [0xe0]);
        assert_eq!(roundtrip(&Value::Int(-33)), [0xd0, 0xdf]);
        assert_eq!(roundtrip(&Value::Int(-129)), [0xd1, 0xff, 0x7f]);
    }

    #[test]
    fn test_string_and_container_headers() {
        let short = Value::Str("ab".to_string());
        assert_eq!(roundtrip(&short), [0xa2, b'a', b'b']);
        let long = Value::Str("x".repeat(40));
        let bytes = roundtrip(&long);
        assert_eq!(&bytes[..2], &[0xd9, 40]);
        let array = Value::Array((0..17).map(Value::Uint).collect());
        let bytes = roundtrip(&array);
        assert_eq!(&bytes[..3], &[0xdc, 0, 17]);
        let map = Value::Map(vec![(
            Value::Str("k".to_string()),
            Value::Array(vec![Value::Nil, Value::Bool(true)]),
        )]);
        assert_eq!(roundtrip(&map), [0x81, 0xa1, b'k', 0x92, 0xc0, 0xc3]);
    }

    #[test]
    fn test_map_key_lookup() {
        let map = Value::Map(vec![
            (Value::Str(".name".to_string()), Value::Str("k0".to_string())),
            (Value::Str(".size".to_string()), Value::Uint(16)),
        ]);
        assert_eq!(map.get(".name").unwrap().as_str(), Some("k0"));
        assert_eq!(map.get(".size").unwrap().as_u64(), Some(16));
        assert!(map.get(".missing").is_none());
    }

    #[test]
    fn test_truncation_errors() {
        assert!(parse(&[0xcc]).is_err());
        assert!(parse(&[0xa5, b'a']).is_err());
        assert!(parse(&[0x91]).is_err());
        assert!(parse(&[0xc1]).is_err());
    }
}
