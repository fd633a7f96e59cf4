use crate::error::{Error, Result};
use std::fmt;
use std::io::Read;
use std::io::Write;
use std::net::Ipv4Addr;

const FAMILY_IPV4: u16 = 1;

/// Address payload with the 2-byte address-family prefix of RFC 6733.
/// Only family 1 (IPv4) is supported.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Address(Value);

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    IPv4(Ipv4Addr),
}

impl Address {
    pub fn new(value: Value) -> Address {
        Address(value)
    }

    pub fn from_ipv4(addr: Ipv4Addr) -> Address {
        Address(Value::IPv4(addr))
    }

    pub fn value(&self) -> &Value {
        &self.0
    }

    pub fn ipv4(&self) -> Ipv4Addr {
        match self.0 {
            Value::IPv4(addr) => addr,
        }
    }

    pub fn decode_from<R: Read>(reader: &mut R, len: usize) -> Result<Address> {
        if len != 6 {
            return Err(Error::DecodeError(format!(
                "invalid address length {}",
                len
            )));
        }
        let mut b = [0; 6];
        reader.read_exact(&mut b)?;
        let family = u16::from_be_bytes([b[0], b[1]]);
        if family != FAMILY_IPV4 {
            return Err(Error::DecodeError(format!(
                "unsupported address family {}",
                family
            )));
        }
        Ok(Address(Value::IPv4(Ipv4Addr::new(b[2], b[3], b[4], b[5]))))
    }

    pub fn encode_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        match self.0 {
            Value::IPv4(addr) => {
                writer.write_all(&FAMILY_IPV4.to_be_bytes())?;
                writer.write_all(&addr.octets())?;
            }
        }
        Ok(())
    }

    pub fn length(&self) -> u32 {
        6
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Value::IPv4(addr) => write!(f, "{}", addr),
        }
    }
}
