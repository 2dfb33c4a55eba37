//! Runtime values held by records and basic lists.
//!
//! Values set by callers are coerced to the datatype of the field they land in;
//! values read back always come in the canonical variant for that datatype.

use crate::codec::{CodecError, Endianness};
use crate::list::{BasicList, SubTemplateList, SubTemplateMultiList};
use crate::model::DataType;
use crate::record::Record;
use std::net::{Ipv4Addr, Ipv6Addr};

/// A single field value (scalar or structured list).
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    Bool(bool),
    Float(f32),
    Double(f64),
    Bytes(Vec<u8>),
    String(String),
    Mac([u8; 6]),
    Ipv4(Ipv4Addr),
    Ipv6(Ipv6Addr),
    /// Literal basicList items.
    List(Vec<Value>),
    BasicList(BasicList),
    SubTemplateList(SubTemplateList),
    SubTemplateMultiList(SubTemplateMultiList),
    /// Literal records for a subTemplateList or subTemplateMultiList field.
    Records(Vec<Record>),
}

impl Value {
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::U8(x) => Some(*x as u64),
            Value::U16(x) => Some(*x as u64),
            Value::U32(x) => Some(*x as u64),
            Value::U64(x) => Some(*x),
            Value::I8(x) if *x >= 0 => Some(*x as u64),
            Value::I16(x) if *x >= 0 => Some(*x as u64),
            Value::I32(x) if *x >= 0 => Some(*x as u64),
            Value::I64(x) if *x >= 0 => Some(*x as u64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::I8(x) => Some(*x as i64),
            Value::I16(x) => Some(*x as i64),
            Value::I32(x) => Some(*x as i64),
            Value::I64(x) => Some(*x),
            Value::U8(x) => Some(*x as i64),
            Value::U16(x) => Some(*x as i64),
            Value::U32(x) => Some(*x as i64),
            Value::U64(x) => i64::try_from(*x).ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(x) => Some(*x as f64),
            Value::Double(x) => Some(*x),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            Value::String(s) => Some(s.as_bytes()),
            _ => None,
        }
    }

    pub fn as_ipv4(&self) -> Option<Ipv4Addr> {
        match self {
            Value::Ipv4(a) => Some(*a),
            _ => None,
        }
    }

    pub fn as_ipv6(&self) -> Option<Ipv6Addr> {
        match self {
            Value::Ipv6(a) => Some(*a),
            _ => None,
        }
    }

    pub fn as_mac(&self) -> Option<[u8; 6]> {
        match self {
            Value::Mac(m) => Some(*m),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(v) => Some(v),
            Value::BasicList(bl) => Some(bl.items()),
            _ => None,
        }
    }

    pub fn as_basic_list(&self) -> Option<&BasicList> {
        match self {
            Value::BasicList(bl) => Some(bl),
            _ => None,
        }
    }

    pub fn as_sub_template_list(&self) -> Option<&SubTemplateList> {
        match self {
            Value::SubTemplateList(stl) => Some(stl),
            _ => None,
        }
    }

    pub fn as_sub_template_multi_list(&self) -> Option<&SubTemplateMultiList> {
        match self {
            Value::SubTemplateMultiList(stml) => Some(stml),
            _ => None,
        }
    }

    /// Default (all-zero) value of a field of `dt` stored in `len` bytes.
    pub fn zero(dt: DataType, len: u16) -> Value {
        match dt {
            DataType::OctetArray | DataType::BasicList
            | DataType::SubTemplateList | DataType::SubTemplateMultiList => Value::Bytes(Vec::new()),
            DataType::String => Value::String(String::new()),
            _ => Value::read_fixed(dt, &vec![0u8; len as usize], Endianness::Big),
        }
    }

    /// Decode a fixed-width field of `dt` from `buf` (any permitted reduced width).
    pub fn read_fixed(dt: DataType, buf: &[u8], order: Endianness) -> Value {
        match dt {
            DataType::Unsigned8 => Value::U8(order.read_uint(buf) as u8),
            DataType::Unsigned16 => Value::U16(order.read_uint(buf) as u16),
            DataType::Unsigned32 | DataType::DateTimeSeconds => {
                Value::U32(order.read_uint(buf) as u32)
            }
            DataType::Unsigned64
            | DataType::DateTimeMilliseconds
            | DataType::DateTimeMicroseconds
            | DataType::DateTimeNanoseconds => Value::U64(order.read_uint(buf)),
            DataType::Signed8 => Value::I8(order.read_int(buf) as i8),
            DataType::Signed16 => Value::I16(order.read_int(buf) as i16),
            DataType::Signed32 => Value::I32(order.read_int(buf) as i32),
            DataType::Signed64 => Value::I64(order.read_int(buf)),
            DataType::Float32 if buf.len() == 4 => Value::Float(order.read_f32(buf)),
            DataType::Float64 if buf.len() == 8 => Value::Double(order.read_f64(buf)),
            DataType::Float64 if buf.len() == 4 => Value::Double(order.read_f32(buf) as f64),
            DataType::Boolean => Value::Bool(buf.first() == Some(&1)),
            DataType::MacAddress if buf.len() == 6 => {
                let mut m = [0u8; 6];
                m.copy_from_slice(buf);
                Value::Mac(m)
            }
            DataType::Ipv4Address if buf.len() == 4 => {
                Value::Ipv4(Ipv4Addr::from(order.read_uint(buf) as u32))
            }
            DataType::Ipv6Address if buf.len() == 16 => {
                let mut a = [0u8; 16];
                a.copy_from_slice(buf);
                Value::Ipv6(Ipv6Addr::from(a))
            }
            DataType::String => Value::String(String::from_utf8_lossy(buf).into_owned()),
            _ => Value::Bytes(buf.to_vec()),
        }
    }

    /// Encode a canonical value into the fixed-width slot `buf`, truncating
    /// integers to the slot width.
    pub fn write_fixed(&self, dt: DataType, buf: &mut [u8], order: Endianness) -> Result<(), CodecError> {
        match (dt, self) {
            (dt, v) if dt.is_integral() => {
                let raw = match (v.as_u64(), v.as_i64()) {
                    (Some(u), _) => u,
                    (None, Some(i)) => i as u64,
                    _ => return Err(mismatch(dt, v)),
                };
                order.write_uint(buf, raw);
            }
            (DataType::Float32 | DataType::Float64, v) => {
                let f = v.as_f64().ok_or_else(|| mismatch(dt, v))?;
                match buf.len() {
                    4 => order.write_f32(buf, f as f32),
                    8 => order.write_f64(buf, f),
                    n => return Err(CodecError::InvalidSpec(format!("float of {} bytes", n))),
                }
            }
            (DataType::Boolean, Value::Bool(b)) => {
                buf.fill(0);
                if let Some(first) = buf.first_mut() {
                    *first = if *b { 1 } else { 2 };
                }
            }
            (DataType::MacAddress, Value::Mac(m)) => copy_padded(buf, m),
            (DataType::Ipv4Address, Value::Ipv4(a)) => order.write_uint(buf, u32::from(*a) as u64),
            (DataType::Ipv6Address, Value::Ipv6(a)) => copy_padded(buf, &a.octets()),
            (_, Value::Bytes(b)) => copy_padded(buf, b),
            (_, Value::String(s)) => copy_padded(buf, s.as_bytes()),
            (dt, v) => return Err(mismatch(dt, v)),
        }
        Ok(())
    }

    /// Coerce a caller-supplied scalar to the canonical variant for a field of
    /// `dt` stored in `len` bytes (`VARLEN` for varfields).
    pub fn coerce(self, dt: DataType, len: u16) -> Result<Value, CodecError> {
        let width = if len == crate::model::VARLEN { dt.natural_length() } else { len };
        match dt {
            DataType::Unsigned8 => Ok(Value::U8(unsigned(&self, dt, width.min(1))? as u8)),
            DataType::Unsigned16 => Ok(Value::U16(unsigned(&self, dt, width.min(2))? as u16)),
            DataType::Unsigned32 | DataType::DateTimeSeconds => {
                Ok(Value::U32(unsigned(&self, dt, width.min(4))? as u32))
            }
            DataType::Unsigned64
            | DataType::DateTimeMilliseconds
            | DataType::DateTimeMicroseconds
            | DataType::DateTimeNanoseconds => Ok(Value::U64(unsigned(&self, dt, width.min(8))?)),
            DataType::Signed8 => Ok(Value::I8(signed(&self, dt, width.min(1))? as i8)),
            DataType::Signed16 => Ok(Value::I16(signed(&self, dt, width.min(2))? as i16)),
            DataType::Signed32 => Ok(Value::I32(signed(&self, dt, width.min(4))? as i32)),
            DataType::Signed64 => Ok(Value::I64(signed(&self, dt, width.min(8))?)),
            DataType::Float32 => match self {
                Value::Float(f) => Ok(Value::Float(f)),
                Value::Double(d) => Ok(Value::Float(d as f32)),
                v => Err(mismatch(dt, &v)),
            },
            DataType::Float64 => match self {
                Value::Float(f) => Ok(Value::Double(f as f64)),
                Value::Double(d) => Ok(Value::Double(d)),
                v => Err(mismatch(dt, &v)),
            },
            DataType::Boolean => match self {
                Value::Bool(b) => Ok(Value::Bool(b)),
                v => match v.as_u64() {
                    Some(1) => Ok(Value::Bool(true)),
                    Some(0) | Some(2) => Ok(Value::Bool(false)),
                    _ => Err(mismatch(dt, &v)),
                },
            },
            DataType::MacAddress => match self {
                Value::Mac(m) => Ok(Value::Mac(m)),
                Value::Bytes(b) if b.len() == 6 => {
                    let mut m = [0u8; 6];
                    m.copy_from_slice(&b);
                    Ok(Value::Mac(m))
                }
                Value::String(s) => parse_mac(&s).map(Value::Mac).ok_or_else(|| {
                    CodecError::TypeMismatch(format!("{:?} is not a MAC address", s))
                }),
                v => Err(mismatch(dt, &v)),
            },
            DataType::Ipv4Address => match self {
                Value::Ipv4(a) => Ok(Value::Ipv4(a)),
                Value::String(s) => s.parse::<Ipv4Addr>().map(Value::Ipv4).map_err(|_| {
                    CodecError::TypeMismatch(format!("{:?} is not an IPv4 address", s))
                }),
                v => match v.as_u64().and_then(|u| u32::try_from(u).ok()) {
                    Some(u) => Ok(Value::Ipv4(Ipv4Addr::from(u))),
                    None => Err(mismatch(dt, &v)),
                },
            },
            DataType::Ipv6Address => match self {
                Value::Ipv6(a) => Ok(Value::Ipv6(a)),
                Value::String(s) => s.parse::<Ipv6Addr>().map(Value::Ipv6).map_err(|_| {
                    CodecError::TypeMismatch(format!("{:?} is not an IPv6 address", s))
                }),
                Value::Bytes(b) if b.len() == 16 => {
                    let mut a = [0u8; 16];
                    a.copy_from_slice(&b);
                    Ok(Value::Ipv6(Ipv6Addr::from(a)))
                }
                v => Err(mismatch(dt, &v)),
            },
            DataType::String => match self {
                Value::String(s) => Ok(Value::String(s)),
                Value::Bytes(b) => String::from_utf8(b)
                    .map(Value::String)
                    .map_err(|_| CodecError::TypeMismatch("string is not valid UTF-8".into())),
                v => Err(mismatch(dt, &v)),
            },
            DataType::OctetArray => match self {
                Value::Bytes(b) => Ok(Value::Bytes(b)),
                Value::String(s) => Ok(Value::Bytes(s.into_bytes())),
                v => Err(mismatch(dt, &v)),
            },
            DataType::BasicList | DataType::SubTemplateList | DataType::SubTemplateMultiList => {
                Err(mismatch(dt, &self))
            }
        }
    }

    /// Short variant name used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::U8(_) => "u8",
            Value::U16(_) => "u16",
            Value::U32(_) => "u32",
            Value::U64(_) => "u64",
            Value::I8(_) => "i8",
            Value::I16(_) => "i16",
            Value::I32(_) => "i32",
            Value::I64(_) => "i64",
            Value::Bool(_) => "bool",
            Value::Float(_) => "f32",
            Value::Double(_) => "f64",
            Value::Bytes(_) => "bytes",
            Value::String(_) => "string",
            Value::Mac(_) => "mac",
            Value::Ipv4(_) => "ipv4",
            Value::Ipv6(_) => "ipv6",
            Value::List(_) => "list",
            Value::BasicList(_) => "basicList",
            Value::SubTemplateList(_) => "subTemplateList",
            Value::SubTemplateMultiList(_) => "subTemplateMultiList",
            Value::Records(_) => "records",
        }
    }
}

fn mismatch(dt: DataType, v: &Value) -> CodecError {
    CodecError::TypeMismatch(format!("{} value for {} field", v.kind(), dt.name()))
}

fn unsigned(v: &Value, dt: DataType, width: u16) -> Result<u64, CodecError> {
    let u = v.as_u64().ok_or_else(|| mismatch(dt, v))?;
    if width < 8 && u >> (width * 8) != 0 {
        return Err(CodecError::TypeMismatch(format!(
            "{} does not fit in {} bytes",
            u, width
        )));
    }
    Ok(u)
}

fn signed(v: &Value, dt: DataType, width: u16) -> Result<i64, CodecError> {
    let i = v.as_i64().ok_or_else(|| mismatch(dt, v))?;
    if width < 8 {
        let bits = width * 8;
        let min = -(1i64 << (bits - 1));
        let max = (1i64 << (bits - 1)) - 1;
        if i < min || i > max {
            return Err(CodecError::TypeMismatch(format!(
                "{} does not fit in {} bytes",
                i, width
            )));
        }
    }
    Ok(i)
}

fn copy_padded(buf: &mut [u8], src: &[u8]) {
    let n = buf.len().min(src.len());
    buf[..n].copy_from_slice(&src[..n]);
    buf[n..].fill(0);
}

/// Parse `aa:bb:cc:dd:ee:ff` (or `-` separated) text.
pub fn parse_mac(s: &str) -> Option<[u8; 6]> {
    let mut out = [0u8; 6];
    let mut parts = s.split(|c| c == ':' || c == '-');
    for slot in out.iter_mut() {
        *slot = u8::from_str_radix(parts.next()?, 16).ok()?;
    }
    if parts.next().is_some() {
        return None;
    }
    Some(out)
}

pub fn format_mac(m: &[u8; 6]) -> String {
    m.iter().map(|b| format!("{:02x}", b)).collect::<Vec<_>>().join(":")
}

macro_rules! value_from {
    ($($t:ty => $variant:ident),+ $(,)?) => {
        $(impl From<$t> for Value {
            fn from(x: $t) -> Self {
                Value::$variant(x)
            }
        })+
    };
}

value_from!(
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    bool => Bool,
    f32 => Float,
    f64 => Double,
    Vec<u8> => Bytes,
    String => String,
    [u8; 6] => Mac,
    Ipv4Addr => Ipv4,
    Ipv6Addr => Ipv6,
    Vec<Value> => List,
    BasicList => BasicList,
    SubTemplateList => SubTemplateList,
    SubTemplateMultiList => SubTemplateMultiList,
    Vec<Record> => Records,
);

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<&[u8]> for Value {
    fn from(b: &[u8]) -> Self {
        Value::Bytes(b.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coerce_checks_reduced_width() {
        assert_eq!(
            Value::U32(70000).coerce(DataType::Unsigned64, 4).expect("fits"),
            Value::U64(70000)
        );
        assert!(Value::U64(1 << 40).coerce(DataType::Unsigned64, 4).is_err());
        assert!(Value::I32(-129).coerce(DataType::Signed16, 1).is_err());
        assert_eq!(Value::U8(7).coerce(DataType::Signed32, 4).expect("i32"), Value::I32(7));
    }

    #[test]
    fn coerce_addresses_from_text() {
        assert_eq!(
            Value::from("10.0.0.1").coerce(DataType::Ipv4Address, 4).expect("ip4"),
            Value::Ipv4(Ipv4Addr::new(10, 0, 0, 1))
        );
        assert_eq!(
            Value::from("00:11:22:aa:bb:cc").coerce(DataType::MacAddress, 6).expect("mac"),
            Value::Mac([0x00, 0x11, 0x22, 0xaa, 0xbb, 0xcc])
        );
        assert!(Value::from("nope").coerce(DataType::Ipv6Address, 16).is_err());
    }

    #[test]
    fn fixed_roundtrip_native_and_reduced() {
        let mut buf = [0u8; 3];
        Value::U64(0x01_0203)
            .write_fixed(DataType::Unsigned64, &mut buf, Endianness::Big)
            .expect("write");
        assert_eq!(buf, [1, 2, 3]);
        assert_eq!(
            Value::read_fixed(DataType::Unsigned64, &buf, Endianness::Big),
            Value::U64(0x01_0203)
        );

        let mut b = [0u8; 1];
        Value::Bool(false).write_fixed(DataType::Boolean, &mut b, Endianness::Big).expect("bool");
        assert_eq!(b, [2]);
    }

    #[test]
    fn mac_text() {
        assert_eq!(parse_mac("01-02-03-04-05-06"), Some([1, 2, 3, 4, 5, 6]));
        assert_eq!(parse_mac("01:02:03"), None);
        assert_eq!(format_mac(&[0xde, 0xad, 0xbe, 0xef, 0, 1]), "de:ad:be:ef:00:01");
    }
}
