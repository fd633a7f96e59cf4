use crate::avp::{flags, Avp, Grouped, OctetString};
use crate::error::{Error, Result};
use crate::message::DiameterMessage;
use crate::stack::Stack;
use lazy_static::lazy_static;
use serde::Deserialize;
use serde_xml_rs::from_str;
use std::collections::HashMap;

/// Symbolic name registry loaded from XML. Immutable after load; lookups
/// return `Option` and never fail in the hot path.
#[derive(Debug, Default)]
pub struct Dictionary {
    commands: HashMap<String, CommandDef>,
    avps_by_name: HashMap<String, AvpDef>,
    avps_by_code: HashMap<(u32, u32), AvpDef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommandDef {
    pub application_id: u32,
    pub vendor_id: u32,
    pub code: u32,
}

#[derive(Debug, Clone, Default)]
pub struct AvpDef {
    pub name: String,
    pub code: u32,
    pub vendor_id: u32,
    pub mandatory: bool,
    pub protected: bool,
    enum_codes: HashMap<String, i32>,
    enum_names: HashMap<i32, String>,
}

impl AvpDef {
    pub fn enum_code(&self, name: &str) -> Option<i32> {
        self.enum_codes.get(name).copied()
    }

    pub fn enum_name(&self, code: i32) -> Option<&str> {
        self.enum_names.get(&code).map(|s| s.as_str())
    }
}

/// Containers the dictionary can search by symbolic name.
pub trait AvpContainer {
    fn child_avps(&self, code: u32, vendor_id: Option<u32>) -> Vec<Avp>;
    fn first_child(&self, code: u32, vendor_id: Option<u32>) -> Option<Avp>;
}

impl AvpContainer for DiameterMessage {
    fn child_avps(&self, code: u32, vendor_id: Option<u32>) -> Vec<Avp> {
        self.find_avps(code, vendor_id).into_iter().cloned().collect()
    }

    fn first_child(&self, code: u32, vendor_id: Option<u32>) -> Option<Avp> {
        self.first_avp(code, vendor_id).cloned()
    }
}

impl AvpContainer for Avp {
    fn child_avps(&self, code: u32, vendor_id: Option<u32>) -> Vec<Avp> {
        self.find_avps(code, vendor_id)
    }

    fn first_child(&self, code: u32, vendor_id: Option<u32>) -> Option<Avp> {
        self.first_avp(code, vendor_id)
    }
}

impl AvpContainer for Grouped {
    fn child_avps(&self, code: u32, vendor_id: Option<u32>) -> Vec<Avp> {
        self.find_avps(code, vendor_id).into_iter().cloned().collect()
    }

    fn first_child(&self, code: u32, vendor_id: Option<u32>) -> Option<Avp> {
        self.first_avp(code, vendor_id).cloned()
    }
}

pub(crate) fn vendor_opt(vendor_id: u32) -> Option<u32> {
    if vendor_id == 0 {
        None
    } else {
        Some(vendor_id)
    }
}

#[derive(Debug, Deserialize)]
struct XmlDictionary {
    #[serde(rename = "vendor", default)]
    vendors: Vec<XmlVendor>,
    #[serde(rename = "application", default)]
    applications: Vec<XmlApplication>,
    #[serde(rename = "avp", default)]
    avps: Vec<XmlAvp>,
}

#[derive(Debug, Deserialize)]
struct XmlVendor {
    #[serde(rename = "vendor-id")]
    vendor_id: String,
    code: String,
}

#[derive(Debug, Deserialize)]
struct XmlApplication {
    id: String,
    #[serde(rename = "command", default)]
    commands: Vec<XmlCommand>,
    #[serde(rename = "avp", default)]
    avps: Vec<XmlAvp>,
}

#[derive(Debug, Deserialize)]
struct XmlCommand {
    name: String,
    code: String,
    #[serde(rename = "vendor-id")]
    vendor_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct XmlAvp {
    name: String,
    code: String,
    #[serde(rename = "vendor-id")]
    vendor_id: Option<String>,
    mandatory: Option<String>,
    protected: Option<String>,
    #[serde(rename = "enum", default)]
    enums: Vec<XmlEnum>,
}

#[derive(Debug, Deserialize)]
struct XmlEnum {
    name: String,
    code: String,
}

impl Dictionary {
    /// Parses and merges the given XML documents, in order. Vendor
    /// definitions accumulate across documents.
    pub fn new(xmls: &[&str]) -> Result<Dictionary> {
        let mut dict = Dictionary::default();
        let mut vendors: HashMap<String, u32> = HashMap::new();
        for xml in xmls {
            dict.load_into(xml, &mut vendors)?;
        }
        Ok(dict)
    }

    fn load_into(&mut self, xml: &str, vendors: &mut HashMap<String, u32>) -> Result<()> {
        let doc: XmlDictionary = from_str(xml)
            .map_err(|e| Error::DictionaryError(format!("invalid dictionary XML: {}", e)))?;

        for vendor in &doc.vendors {
            let code = parse_number(&vendor.code, "vendor", &vendor.vendor_id)?;
            vendors.insert(vendor.vendor_id.clone(), code);
        }

        for application in &doc.applications {
            let application_id = parse_number(&application.id, "application", &application.id)?;
            for command in &application.commands {
                let def = CommandDef {
                    application_id,
                    vendor_id: resolve_vendor(vendors, &command.vendor_id, "command", &command.name)?,
                    code: parse_number(&command.code, "command", &command.name)?,
                };
                self.commands.insert(command.name.clone(), def);
            }
            for avp in &application.avps {
                self.add_avp_def(avp, vendors)?;
            }
        }

        for avp in &doc.avps {
            self.add_avp_def(avp, vendors)?;
        }

        Ok(())
    }

    fn add_avp_def(&mut self, avp: &XmlAvp, vendors: &HashMap<String, u32>) -> Result<()> {
        let mut def = AvpDef {
            name: avp.name.clone(),
            code: parse_number(&avp.code, "avp", &avp.name)?,
            vendor_id: resolve_vendor(vendors, &avp.vendor_id, "avp", &avp.name)?,
            mandatory: avp.mandatory.as_deref() == Some("must"),
            protected: avp.protected.as_deref() == Some("must"),
            enum_codes: HashMap::new(),
            enum_names: HashMap::new(),
        };
        for item in &avp.enums {
            let code = item
                .code
                .parse::<i32>()
                .map_err(|_| {
                    Error::DictionaryError(format!(
                        "avp {}: bad enum code {:?}",
                        avp.name, item.code
                    ))
                })?;
            def.enum_codes.insert(item.name.clone(), code);
            def.enum_names.insert(code, item.name.clone());
        }
        self.avps_by_code
            .insert((def.vendor_id, def.code), def.clone());
        self.avps_by_name.insert(def.name.clone(), def);
        Ok(())
    }

    pub fn command(&self, name: &str) -> Option<&CommandDef> {
        self.commands.get(name)
    }

    pub fn avp(&self, name: &str) -> Option<&AvpDef> {
        self.avps_by_name.get(name)
    }

    pub fn avp_by_code(&self, code: u32, vendor_id: u32) -> Option<&AvpDef> {
        self.avps_by_code.get(&(vendor_id, code))
    }

    pub fn avp_name(&self, code: u32, vendor_id: u32) -> Option<&str> {
        self.avp_by_code(code, vendor_id).map(|d| d.name.as_str())
    }

    /// `(code, vendor_id)` for the named AVP.
    pub fn avp_code(&self, name: &str) -> Option<(u32, u32)> {
        self.avp(name).map(|d| (d.code, d.vendor_id))
    }

    pub fn enum_code(&self, avp_name: &str, enum_name: &str) -> Option<i32> {
        self.avp(avp_name).and_then(|d| d.enum_code(enum_name))
    }

    pub fn enum_name(&self, avp_name: &str, code: i32) -> Option<&str> {
        self.avp(avp_name).and_then(|d| d.enum_name(code))
    }

    /// Prototype AVP with code, vendor and flag bits pre-populated and an
    /// empty payload for the caller to fill in.
    pub fn build_avp(&self, name: &str) -> Option<Avp> {
        let def = self.avp(name)?;
        let mut bits = 0;
        if def.mandatory {
            bits |= flags::M;
        }
        if def.protected {
            bits |= flags::P;
        }
        Some(Avp::new(
            def.code,
            vendor_opt(def.vendor_id),
            bits,
            OctetString::new(Vec::new()).into(),
        ))
    }

    pub fn is_command(&self, message: &DiameterMessage, name: &str) -> bool {
        match self.command(name) {
            Some(def) => {
                message.application_id() == def.application_id && message.code() == def.code
            }
            None => false,
        }
    }

    pub fn find_avp<C: AvpContainer>(&self, container: &C, name: &str) -> Vec<Avp> {
        match self.avp_code(name) {
            Some((code, vendor_id)) => container.child_avps(code, vendor_opt(vendor_id)),
            None => Vec::new(),
        }
    }

    /// Builds a request for the named command, `None` when the command is
    /// not in the dictionary.
    pub fn create_request(
        &self,
        stack: &mut Stack,
        name: &str,
        auth: bool,
        acct: bool,
    ) -> Option<DiameterMessage> {
        let def = self.command(name)?;
        Some(stack.create_request(def.application_id, def.code, auth, acct, None))
    }

    /// Walks `names` into grouped AVPs, one level per name.
    pub fn find_first<C: AvpContainer>(&self, container: &C, names: &[&str]) -> Option<Avp> {
        let (first, rest) = names.split_first()?;
        let (code, vendor_id) = self.avp_code(first)?;
        let mut current = container.first_child(code, vendor_opt(vendor_id))?;
        for name in rest {
            let (code, vendor_id) = self.avp_code(name)?;
            current = current.first_avp(code, vendor_opt(vendor_id))?;
        }
        Some(current)
    }
}

fn parse_number(text: &str, element: &str, name: &str) -> Result<u32> {
    text.parse::<u32>().map_err(|_| {
        Error::DictionaryError(format!("{} {}: bad number {:?}", element, name, text))
    })
}

fn resolve_vendor(
    vendors: &HashMap<String, u32>,
    reference: &Option<String>,
    element: &str,
    name: &str,
) -> Result<u32> {
    match reference {
        None => Ok(0),
        Some(vendor) => vendors.get(vendor).copied().ok_or_else(|| {
            Error::DictionaryError(format!(
                "{} {}: unknown vendor-id {:?}",
                element, name, vendor
            ))
        }),
    }
}

lazy_static! {
    pub static ref DEFAULT_DICT: Dictionary =
        Dictionary::new(&[&DEFAULT_DICT_XML]).unwrap();
    pub static ref DEFAULT_DICT_XML: &'static str = {
        let xml = r#"
<dictionary>
    <application id="0">
        <command name="Capabilities-Exchange" code="257"/>
        <command name="Device-Watchdog" code="280"/>
        <command name="Disconnect-Peer" code="282"/>
    </application>

    <avp name="Host-IP-Address" code="257" mandatory="must"/>
    <avp name="Auth-Application-Id" code="258" mandatory="must"/>
    <avp name="Acct-Application-Id" code="259" mandatory="must"/>
    <avp name="Vendor-Specific-Application-Id" code="260" mandatory="must"/>
    <avp name="Redirect-Host-Usage" code="261" mandatory="must">
        <enum name="DONT_CACHE" code="0"/>
        <enum name="ALL_SESSION" code="1"/>
        <enum name="ALL_REALM" code="2"/>
        <enum name="REALM_AND_APPLICATION" code="3"/>
        <enum name="ALL_APPLICATION" code="4"/>
        <enum name="ALL_HOST" code="5"/>
        <enum name="ALL_USER" code="6"/>
    </avp>
    <avp name="Session-Id" code="263" mandatory="must"/>
    <avp name="Origin-Host" code="264" mandatory="must"/>
    <avp name="Supported-Vendor-Id" code="265" mandatory="must"/>
    <avp name="Vendor-Id" code="266" mandatory="must"/>
    <avp name="Firmware-Revision" code="267" mandatory="may"/>
    <avp name="Result-Code" code="268" mandatory="must"/>
    <avp name="Product-Name" code="269" mandatory="may"/>
    <avp name="Disconnect-Cause" code="273" mandatory="must">
        <enum name="REBOOTING" code="0"/>
        <enum name="BUSY" code="1"/>
        <enum name="DO_NOT_WANT_TO_TALK_TO_YOU" code="2"/>
    </avp>
    <avp name="Origin-State-Id" code="278" mandatory="must"/>
    <avp name="Error-Message" code="281" mandatory="may"/>
    <avp name="Route-Record" code="282" mandatory="must"/>
    <avp name="Origin-Realm" code="296" mandatory="must"/>
</dictionary>
    "#;
        xml
    };
}
