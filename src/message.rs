/*
 * Diameter Header.
 *
 * Raw packet format:
 *   0                   1                   2                   3
 *   0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
 *  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
 *  |    Version    |                 Message Length                |
 *  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
 *  | command flags |                  Command-Code                 |
 *  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
 *  |                         Application-ID                        |
 *  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
 *  |                      Hop-by-Hop Identifier                    |
 *  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
 *  |                      End-to-End Identifier                    |
 *  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
 *
 * Command Flags:
 *   0 1 2 3 4 5 6 7
 *  +-+-+-+-+-+-+-+-+  R(equest), P(roxiable), E(rror)
 *  |R P E T r r r r|  T(Potentially re-transmitted message), r(eserved)
 *  +-+-+-+-+-+-+-+-+
 *
 */

use crate::avp::Avp;
use crate::error::{Error, Result};
use num_derive::FromPrimitive;
use std::io::Read;
use std::io::Seek;
use std::io::Write;

pub mod flags {
    pub const REQUEST: u8 = 0x80;
    pub const PROXYABLE: u8 = 0x40;
    pub const ERROR: u8 = 0x20;
    pub const RETRANSMIT: u8 = 0x10;
}

pub const HEADER_LENGTH: u32 = 20;

/// Well-known command codes, for matching and display. The header itself
/// carries a raw 24-bit code so unknown application commands pass through
/// untouched.
#[derive(Debug, Clone, Copy, PartialEq, FromPrimitive)]
pub enum CommandCode {
    CapabilitiesExchange = 257,
    ReAuth = 258,
    AA = 265,
    Accounting = 271,
    CreditControl = 272,
    AbortSession = 274,
    SessionTerminate = 275,
    DeviceWatchdog = 280,
    DisconnectPeer = 282,
}

#[derive(Debug, Clone, Copy, PartialEq, FromPrimitive)]
pub enum ApplicationId {
    Common = 0,
    NASREQ = 1,
    Accounting = 3,
    CreditControl = 4,
}

#[derive(Debug, Clone)]
pub struct DiameterHeader {
    version: u8,
    length: u32,
    flags: u8,
    code: u32,
    application_id: u32,
    hop_by_hop_id: u32,
    end_to_end_id: u32,
}

#[derive(Debug, Clone)]
pub struct DiameterMessage {
    header: DiameterHeader,
    avps: Vec<Avp>,
    malformed: Vec<u32>,
}

impl DiameterHeader {
    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn length(&self) -> u32 {
        self.length
    }

    pub fn flags(&self) -> u8 {
        self.flags
    }

    pub fn code(&self) -> u32 {
        self.code
    }

    pub fn application_id(&self) -> u32 {
        self.application_id
    }

    pub fn hop_by_hop_id(&self) -> u32 {
        self.hop_by_hop_id
    }

    pub fn end_to_end_id(&self) -> u32 {
        self.end_to_end_id
    }

    pub fn decode_from<R: Read>(reader: &mut R) -> Result<DiameterHeader> {
        let mut b = [0; HEADER_LENGTH as usize];
        reader.read_exact(&mut b)?;

        let version = b[0];
        if version != 1 {
            return Err(Error::MalformedMessage(format!(
                "unsupported version {}",
                version
            )));
        }
        let length = u32::from_be_bytes([0, b[1], b[2], b[3]]);
        if length < HEADER_LENGTH {
            return Err(Error::MalformedMessage(format!(
                "length {} below header size",
                length
            )));
        }

        Ok(DiameterHeader {
            version,
            length,
            flags: b[4],
            code: u32::from_be_bytes([0, b[5], b[6], b[7]]),
            application_id: u32::from_be_bytes([b[8], b[9], b[10], b[11]]),
            hop_by_hop_id: u32::from_be_bytes([b[12], b[13], b[14], b[15]]),
            end_to_end_id: u32::from_be_bytes([b[16], b[17], b[18], b[19]]),
        })
    }

    pub fn encode_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&[self.version])?;
        writer.write_all(&self.length.to_be_bytes()[1..4])?;
        writer.write_all(&[self.flags])?;
        writer.write_all(&self.code.to_be_bytes()[1..4])?;
        writer.write_all(&self.application_id.to_be_bytes())?;
        writer.write_all(&self.hop_by_hop_id.to_be_bytes())?;
        writer.write_all(&self.end_to_end_id.to_be_bytes())?;
        Ok(())
    }
}

impl DiameterMessage {
    pub fn new(
        code: u32,
        application_id: u32,
        flags: u8,
        hop_by_hop_id: u32,
        end_to_end_id: u32,
    ) -> DiameterMessage {
        DiameterMessage {
            header: DiameterHeader {
                version: 1,
                length: HEADER_LENGTH,
                flags,
                code,
                application_id,
                hop_by_hop_id,
                end_to_end_id,
            },
            avps: Vec::new(),
            malformed: Vec::new(),
        }
    }

    pub fn code(&self) -> u32 {
        self.header.code
    }

    pub fn application_id(&self) -> u32 {
        self.header.application_id
    }

    pub fn flags(&self) -> u8 {
        self.header.flags
    }

    pub fn is_request(&self) -> bool {
        self.header.flags & flags::REQUEST != 0
    }

    pub fn is_proxiable(&self) -> bool {
        self.header.flags & flags::PROXYABLE != 0
    }

    pub fn is_error(&self) -> bool {
        self.header.flags & flags::ERROR != 0
    }

    pub fn set_error(&mut self, error: bool) {
        if error {
            self.header.flags |= flags::ERROR;
        } else {
            self.header.flags &= !flags::ERROR;
        }
    }

    pub fn hop_by_hop_id(&self) -> u32 {
        self.header.hop_by_hop_id
    }

    pub fn end_to_end_id(&self) -> u32 {
        self.header.end_to_end_id
    }

    /// Total on-wire length, header included.
    pub fn length(&self) -> u32 {
        self.header.length
    }

    pub fn header(&self) -> &DiameterHeader {
        &self.header
    }

    pub fn avps(&self) -> &[Avp] {
        &self.avps
    }

    /// Codes of AVPs that arrived with reserved flag bits set.
    pub fn malformed_avps(&self) -> &[u32] {
        &self.malformed
    }

    pub fn has_malformed_avps(&self) -> bool {
        !self.malformed.is_empty()
    }

    /// Appends an AVP; insertion order is transmission order.
    pub fn add_avp(&mut self, avp: Avp) {
        self.header.length += avp.padded_length();
        self.avps.push(avp);
    }

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

    /// Path walk into grouped AVPs; the first pair selects a direct child.
    pub fn first_avp_path(&self, path: &[(u32, Option<u32>)]) -> Option<Avp> {
        let (&(code, vendor_id), rest) = path.split_first()?;
        let first = self.first_avp(code, vendor_id)?;
        if rest.is_empty() {
            Some(first.clone())
        } else {
            first.first_avp_path(rest)
        }
    }

    pub fn decode_from<R: Read + Seek>(reader: &mut R) -> Result<DiameterMessage> {
        let header = DiameterHeader::decode_from(reader)?;

        let mut avps = Vec::new();
        let mut malformed = Vec::new();
        let mut offset = HEADER_LENGTH;
        while offset < header.length {
            let (avp, tagged) = Avp::decode_tagged(reader)?;
            offset += avp.padded_length();
            if offset > header.length {
                return Err(Error::MalformedMessage(format!(
                    "AVP {} overruns message boundary",
                    avp.code()
                )));
            }
            if tagged {
                malformed.push(avp.code());
            }
            avps.push(avp);
        }

        Ok(DiameterMessage {
            header,
            avps,
            malformed,
        })
    }

    pub fn encode_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        self.header.encode_to(writer)?;
        for avp in &self.avps {
            avp.encode_to(writer)?;
        }
        Ok(())
    }
}
