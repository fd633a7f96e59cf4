use crate::avp::Avp;
use crate::error::{Error, Result};
use std::io::Read;
use std::io::Seek;
use std::io::Write;

/// An ordered sequence of child AVPs. Children obey the same encoding and
/// padding rules as top-level AVPs; the enclosing length field covers the
/// children but not their trailing pad.
#[derive(Debug, Clone)]
pub struct Grouped {
    avps: Vec<Avp>,
}

impl Grouped {
    pub fn new(avps: Vec<Avp>) -> Grouped {
        Grouped { avps }
    }

    pub fn avps(&self) -> &[Avp] {
        &self.avps
    }

    pub fn add(&mut self, avp: Avp) {
        self.avps.push(avp);
    }

    /// Direct children matching `(code, vendor_id)`, in insertion order.
    pub fn find_avps(&self, code: u32, vendor_id: Option<u32>) -> Vec<&Avp> {
        self.avps
            .iter()
            .filter(|a| a.code() == code && a.vendor_id() == vendor_id)
            .collect()
    }

    pub fn first_avp(&self, code: u32, vendor_id: Option<u32>) -> Option<&Avp> {
        self.avps
            .iter()
            .find(|a| a.code() == code && a.vendor_id() == vendor_id)
    }

    pub fn decode_from<R: Read + Seek>(reader: &mut R, len: usize) -> Result<Grouped> {
        let mut avps = Vec::new();
        let mut offset = 0;
        while offset < len {
            let avp = Avp::decode_from(reader)?;
            offset += avp.padded_length() as usize;
            avps.push(avp);
        }
        // make sure the children consumed exactly the enclosing length
        if offset != len {
            return Err(Error::DecodeError(
                "invalid grouped AVP, length mismatch".into(),
            ));
        }
        Ok(Grouped { avps })
    }

    pub fn encode_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        for avp in &self.avps {
            avp.encode_to(writer)?;
        }
        Ok(())
    }

    pub fn length(&self) -> u32 {
        self.avps.iter().map(|avp| avp.padded_length()).sum()
    }
}
