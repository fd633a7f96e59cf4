/*
 * AVP format:
 *   0                   1                   2                   3
 *   0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
 *  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
 *  |                           AVP Code                            |
 *  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
 *  |  Flags       |                 AVP Length                     |
 *  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
 *  |                         Vendor ID (optional)                  |
 *  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
 *  |                             Data                              |
 *  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
 *  |                             Data             |    Padding     |
 *  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
 *
 * AVP Flags:
 *   0 1 2 3 4 5 6 7
 *  +-+-+-+-+-+-+-+-+  V(endor), M(andatory), P(rotected)
 *  |V M P r r r r r|  r(eserved)
 *  +-+-+-+-+-+-+-+-+
 *
 */

pub mod address;
pub mod float32;
pub mod float64;
pub mod grouped;
pub mod integer32;
pub mod integer64;
pub mod octetstring;
pub mod unsigned32;
pub mod unsigned64;

pub use self::address::Address;
pub use self::float32::Float32;
pub use self::float64::Float64;
pub use self::grouped::Grouped;
pub use self::integer32::Integer32;
pub use self::integer64::Integer64;
pub use self::octetstring::OctetString;
pub use self::unsigned32::Unsigned32;
pub use self::unsigned64::Unsigned64;

use crate::error::{Error, Result};
use std::io::Cursor;
use std::io::Read;
use std::io::Seek;
use std::io::SeekFrom;
use std::io::Write;
use std::net::Ipv4Addr;

pub mod flags {
    pub const V: u8 = 0x80;
    pub const M: u8 = 0x40;
    pub const P: u8 = 0x20;
    pub(crate) const RESERVED: u8 = 0x1F;
}

#[derive(Debug, Clone)]
pub struct Avp {
    code: u32,
    vendor_id: Option<u32>,
    flags: u8,
    value: AvpValue,
}

/// Tagged AVP payload, one case per wire type. Wire decoding stores the
/// raw bytes as `OctetString` and defers interpretation to the typed
/// accessors, so opaque AVPs can be forwarded unchanged.
#[derive(Debug, Clone)]
pub enum AvpValue {
    OctetString(OctetString),
    Integer32(Integer32),
    Integer64(Integer64),
    Unsigned32(Unsigned32),
    Unsigned64(Unsigned64),
    Float32(Float32),
    Float64(Float64),
    Address(Address),
    Grouped(Grouped),
}

impl AvpValue {
    pub fn length(&self) -> u32 {
        match self {
            AvpValue::OctetString(v) => v.length(),
            AvpValue::Integer32(v) => v.length(),
            AvpValue::Integer64(v) => v.length(),
            AvpValue::Unsigned32(v) => v.length(),
            AvpValue::Unsigned64(v) => v.length(),
            AvpValue::Float32(v) => v.length(),
            AvpValue::Float64(v) => v.length(),
            AvpValue::Address(v) => v.length(),
            AvpValue::Grouped(v) => v.length(),
        }
    }

    pub fn encode_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        match self {
            AvpValue::OctetString(v) => v.encode_to(writer),
            AvpValue::Integer32(v) => v.encode_to(writer),
            AvpValue::Integer64(v) => v.encode_to(writer),
            AvpValue::Unsigned32(v) => v.encode_to(writer),
            AvpValue::Unsigned64(v) => v.encode_to(writer),
            AvpValue::Float32(v) => v.encode_to(writer),
            AvpValue::Float64(v) => v.encode_to(writer),
            AvpValue::Address(v) => v.encode_to(writer),
            AvpValue::Grouped(v) => v.encode_to(writer),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            AvpValue::OctetString(_) => "OctetString",
            AvpValue::Integer32(_) => "Integer32",
            AvpValue::Integer64(_) => "Integer64",
            AvpValue::Unsigned32(_) => "Unsigned32",
            AvpValue::Unsigned64(_) => "Unsigned64",
            AvpValue::Float32(_) => "Float32",
            AvpValue::Float64(_) => "Float64",
            AvpValue::Address(_) => "Address",
            AvpValue::Grouped(_) => "Grouped",
        }
    }
}

impl From<OctetString> for AvpValue {
    fn from(v: OctetString) -> Self {
        AvpValue::OctetString(v)
    }
}

impl From<Integer32> for AvpValue {
    fn from(v: Integer32) -> Self {
        AvpValue::Integer32(v)
    }
}

impl From<Integer64> for AvpValue {
    fn from(v: Integer64) -> Self {
        AvpValue::Integer64(v)
    }
}

impl From<Unsigned32> for AvpValue {
    fn from(v: Unsigned32) -> Self {
        AvpValue::Unsigned32(v)
    }
}

impl From<Unsigned64> for AvpValue {
    fn from(v: Unsigned64) -> Self {
        AvpValue::Unsigned64(v)
    }
}

impl From<Float32> for AvpValue {
    fn from(v: Float32) -> Self {
        AvpValue::Float32(v)
    }
}

impl From<Float64> for AvpValue {
    fn from(v: Float64) -> Self {
        AvpValue::Float64(v)
    }
}

impl From<Address> for AvpValue {
    fn from(v: Address) -> Self {
        AvpValue::Address(v)
    }
}

impl From<Grouped> for AvpValue {
    fn from(v: Grouped) -> Self {
        AvpValue::Grouped(v)
    }
}

impl Avp {
    /// The V bit follows `vendor_id`; reserved bits in `flags` are
    /// discarded.
    pub fn new(code: u32, vendor_id: Option<u32>, flags: u8, value: AvpValue) -> Avp {
        Avp {
            code,
            vendor_id,
            flags: flags & (flags::M | flags::P),
            value,
        }
    }

    pub fn code(&self) -> u32 {
        self.code
    }

    pub fn vendor_id(&self) -> Option<u32> {
        self.vendor_id
    }

    pub fn flags(&self) -> u8 {
        if self.vendor_id.is_some() {
            self.flags | flags::V
        } else {
            self.flags
        }
    }

    pub fn is_mandatory(&self) -> bool {
        self.flags & flags::M != 0
    }

    pub fn is_protected(&self) -> bool {
        self.flags & flags::P != 0
    }

    pub fn value(&self) -> &AvpValue {
        &self.value
    }

    pub fn set_value(&mut self, value: AvpValue) {
        self.value = value;
    }

    pub fn with_value(mut self, value: AvpValue) -> Avp {
        self.value = value;
        self
    }

    fn header_length(&self) -> u32 {
        if self.vendor_id.is_some() {
            12
        } else {
            8
        }
    }

    /// On-wire length field: header plus payload, excluding pad.
    pub fn length(&self) -> u32 {
        self.header_length() + self.value.length()
    }

    pub fn padding(&self) -> u8 {
        pad_to_32_bits(self.value.length())
    }

    /// Total bytes on the wire, pad included.
    pub fn padded_length(&self) -> u32 {
        self.length() + self.padding() as u32
    }

    pub fn decode_from<R: Read + Seek>(reader: &mut R) -> Result<Avp> {
        let (avp, malformed) = Avp::decode_tagged(reader)?;
        if malformed {
            return Err(Error::MalformedAvp(avp.code));
        }
        Ok(avp)
    }

    /// Decodes one AVP, tolerating set reserved flag bits: the AVP is
    /// returned with its payload intact and the flag reports the
    /// violation, so callers inspecting foreign traffic can keep going.
    pub(crate) fn decode_tagged<R: Read + Seek>(reader: &mut R) -> Result<(Avp, bool)> {
        let mut b = [0; 8];
        reader.read_exact(&mut b)?;

        let code = u32::from_be_bytes([b[0], b[1], b[2], b[3]]);
        let flag_bits = b[4];
        let length = u32::from_be_bytes([0, b[5], b[6], b[7]]);
        let malformed = flag_bits & flags::RESERVED != 0;

        let vendor_id = if flag_bits & flags::V != 0 {
            let mut v = [0; 4];
            reader.read_exact(&mut v)?;
            Some(u32::from_be_bytes(v))
        } else {
            None
        };

        let header_length = if vendor_id.is_some() { 12 } else { 8 };
        if length < header_length {
            return Err(Error::MalformedAvp(code));
        }
        let value_length = (length - header_length) as usize;
        let value = OctetString::decode_from(reader, value_length)?;

        let padding = pad_to_32_bits(value_length as u32);
        if padding > 0 {
            reader.seek(SeekFrom::Current(padding as i64))?;
        }

        Ok((
            Avp {
                code,
                vendor_id,
                flags: flag_bits & (flags::M | flags::P),
                value: AvpValue::OctetString(value),
            },
            malformed,
        ))
    }

    pub fn encode_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.code.to_be_bytes())?;
        writer.write_all(&[self.flags()])?;
        writer.write_all(&self.length().to_be_bytes()[1..4])?;
        if let Some(vendor_id) = self.vendor_id {
            writer.write_all(&vendor_id.to_be_bytes())?;
        }
        self.value.encode_to(writer)?;
        for _ in 0..self.padding() {
            writer.write_all(&[0])?;
        }
        Ok(())
    }

    pub fn as_octet_string(&self) -> Result<&[u8]> {
        match &self.value {
            AvpValue::OctetString(v) => Ok(v.value()),
            other => Err(self.type_mismatch("OctetString", other)),
        }
    }

    pub fn as_integer32(&self) -> Result<i32> {
        match &self.value {
            AvpValue::Integer32(v) => Ok(v.value()),
            AvpValue::OctetString(raw) => {
                let b: [u8; 4] = raw
                    .value()
                    .try_into()
                    .map_err(|_| Error::MalformedAvp(self.code))?;
                Ok(i32::from_be_bytes(b))
            }
            other => Err(self.type_mismatch("Integer32", other)),
        }
    }

    pub fn as_unsigned32(&self) -> Result<u32> {
        match &self.value {
            AvpValue::Unsigned32(v) => Ok(v.value()),
            AvpValue::OctetString(raw) => {
                let b: [u8; 4] = raw
                    .value()
                    .try_into()
                    .map_err(|_| Error::MalformedAvp(self.code))?;
                Ok(u32::from_be_bytes(b))
            }
            other => Err(self.type_mismatch("Unsigned32", other)),
        }
    }

    pub fn as_integer64(&self) -> Result<i64> {
        match &self.value {
            AvpValue::Integer64(v) => Ok(v.value()),
            AvpValue::OctetString(raw) => {
                let b: [u8; 8] = raw
                    .value()
                    .try_into()
                    .map_err(|_| Error::MalformedAvp(self.code))?;
                Ok(i64::from_be_bytes(b))
            }
            other => Err(self.type_mismatch("Integer64", other)),
        }
    }

    pub fn as_unsigned64(&self) -> Result<u64> {
        match &self.value {
            AvpValue::Unsigned64(v) => Ok(v.value()),
            AvpValue::OctetString(raw) => {
                let b: [u8; 8] = raw
                    .value()
                    .try_into()
                    .map_err(|_| Error::MalformedAvp(self.code))?;
                Ok(u64::from_be_bytes(b))
            }
            other => Err(self.type_mismatch("Unsigned64", other)),
        }
    }

    pub fn as_float32(&self) -> Result<f32> {
        match &self.value {
            AvpValue::Float32(v) => Ok(v.value()),
            AvpValue::OctetString(raw) => {
                let b: [u8; 4] = raw
                    .value()
                    .try_into()
                    .map_err(|_| Error::MalformedAvp(self.code))?;
                Ok(f32::from_be_bytes(b))
            }
            other => Err(self.type_mismatch("Float32", other)),
        }
    }

    pub fn as_float64(&self) -> Result<f64> {
        match &self.value {
            AvpValue::Float64(v) => Ok(v.value()),
            AvpValue::OctetString(raw) => {
                let b: [u8; 8] = raw
                    .value()
                    .try_into()
                    .map_err(|_| Error::MalformedAvp(self.code))?;
                Ok(f64::from_be_bytes(b))
            }
            other => Err(self.type_mismatch("Float64", other)),
        }
    }

    pub fn as_address_v4(&self) -> Result<Ipv4Addr> {
        match &self.value {
            AvpValue::Address(v) => Ok(v.ipv4()),
            AvpValue::OctetString(raw) => {
                let mut cursor = Cursor::new(raw.value());
                Address::decode_from(&mut cursor, raw.value().len())
                    .map(|a| a.ipv4())
                    .map_err(|_| Error::MalformedAvp(self.code))
            }
            other => Err(self.type_mismatch("Address", other)),
        }
    }

    pub fn as_grouped(&self) -> Result<Grouped> {
        match &self.value {
            AvpValue::Grouped(v) => Ok(v.clone()),
            AvpValue::OctetString(raw) => {
                let mut cursor = Cursor::new(raw.value());
                Grouped::decode_from(&mut cursor, raw.value().len()).map_err(|e| match e {
                    Error::MalformedAvp(code) => Error::MalformedAvp(code),
                    _ => Error::MalformedAvp(self.code),
                })
            }
            other => Err(self.type_mismatch("Grouped", other)),
        }
    }

    /// Direct children matching `(code, vendor_id)`; empty unless the
    /// payload is (or parses as) a group.
    pub fn find_avps(&self, code: u32, vendor_id: Option<u32>) -> Vec<Avp> {
        match self.as_grouped() {
            Ok(group) => group
                .find_avps(code, vendor_id)
                .into_iter()
                .cloned()
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    pub fn first_avp(&self, code: u32, vendor_id: Option<u32>) -> Option<Avp> {
        self.as_grouped()
            .ok()
            .and_then(|g| g.first_avp(code, vendor_id).cloned())
    }

    /// Walks a path of `(code, vendor_id)` pairs into nested groups,
    /// decoding lazily along the way.
    pub fn first_avp_path(&self, path: &[(u32, Option<u32>)]) -> Option<Avp> {
        let (&(code, vendor_id), rest) = path.split_first()?;
        let child = self.first_avp(code, vendor_id)?;
        if rest.is_empty() {
            Some(child)
        } else {
            child.first_avp_path(rest)
        }
    }

    fn type_mismatch(&self, requested: &'static str, stored: &AvpValue) -> Error {
        Error::TypeMismatch {
            code: self.code,
            requested,
            stored: stored.type_name(),
        }
    }
}

fn pad_to_32_bits(length: u32) -> u8 {
    ((4 - (length & 0b11)) % 4) as u8
}

#[macro_export]
macro_rules! avp {
    ($code:expr, $vendor_id:expr, $flags:expr, $value:expr) => {
        $crate::avp::Avp::new($code, $vendor_id, $flags, $value.into())
    };
}
