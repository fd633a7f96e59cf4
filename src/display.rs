use crate::avp::{Avp, AvpValue};
use crate::dictionary::DEFAULT_DICT;
use crate::message::{ApplicationId, CommandCode, DiameterHeader, DiameterMessage};
use num_traits::FromPrimitive;
use std::fmt;

impl fmt::Display for DiameterMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.header())?;
        writeln!(
            f,
            "  {:<40} {:>8} {:>5}  {} {} {}  {:<12}  {}",
            "AVP", "Vendor", "Code", "V", "M", "P", "Type", "Value"
        )?;
        for avp in self.avps() {
            fmt_avp(f, avp, 0)?;
        }
        Ok(())
    }
}

impl fmt::Display for DiameterHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let command = match CommandCode::from_u32(self.code()) {
            Some(c) => format!("{:?}({})", c, self.code()),
            None => format!("Command-{}", self.code()),
        };
        let application = match ApplicationId::from_u32(self.application_id()) {
            Some(a) => format!("{:?}({})", a, self.application_id()),
            None => format!("Application-{}", self.application_id()),
        };

        let flags = self.flags();
        write!(
            f,
            "{} {} {}{}{}{} {}, {}",
            command,
            application,
            if flags & crate::message::flags::REQUEST != 0 {
                "Request"
            } else {
                "Answer"
            },
            if flags & crate::message::flags::PROXYABLE != 0 {
                " Proxyable"
            } else {
                ""
            },
            if flags & crate::message::flags::ERROR != 0 {
                " Error"
            } else {
                ""
            },
            if flags & crate::message::flags::RETRANSMIT != 0 {
                " Retransmit"
            } else {
                ""
            },
            self.hop_by_hop_id(),
            self.end_to_end_id(),
        )
    }
}

impl fmt::Display for Avp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_avp(f, self, 0)
    }
}

impl fmt::Display for AvpValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AvpValue::OctetString(v) => v.fmt(f),
            AvpValue::Integer32(v) => v.fmt(f),
            AvpValue::Integer64(v) => v.fmt(f),
            AvpValue::Unsigned32(v) => v.fmt(f),
            AvpValue::Unsigned64(v) => v.fmt(f),
            AvpValue::Float32(v) => v.fmt(f),
            AvpValue::Float64(v) => v.fmt(f),
            AvpValue::Address(v) => v.fmt(f),
            AvpValue::Grouped(_) => write!(f, ""),
        }
    }
}

fn fmt_avp(f: &mut fmt::Formatter<'_>, avp: &Avp, depth: usize) -> fmt::Result {
    let name = DEFAULT_DICT
        .avp_name(avp.code(), avp.vendor_id().unwrap_or(0))
        .unwrap_or("Unknown");
    let name = format!("{}{}", "  ".repeat(depth), name);
    let vendor_id = match avp.vendor_id() {
        Some(v) => v.to_string(),
        None => "".to_string(),
    };

    writeln!(
        f,
        "  {:<40} {:>8} {:>5}  {} {} {}  {:<12}  {}",
        name,
        vendor_id,
        avp.code(),
        bool_unicode(avp.vendor_id().is_some()),
        bool_unicode(avp.is_mandatory()),
        bool_unicode(avp.is_protected()),
        avp.value().type_name(),
        avp.value(),
    )?;

    if let AvpValue::Grouped(group) = avp.value() {
        for child in group.avps() {
            fmt_avp(f, child, depth + 1)?;
        }
    }
    Ok(())
}

fn bool_unicode(v: bool) -> &'static str {
    if v {
        "✓"
    } else {
        "✗"
    }
}

#[cfg(test)]
mod tests {
    use crate::avp;
    use crate::avp::flags::M;
    use crate::avp::{Grouped, Integer32, OctetString, Unsigned32};
    use crate::message::{flags, DiameterMessage};

    #[test]
    fn test_display_message() {
        let mut message = DiameterMessage::new(257, 0, flags::REQUEST, 0x1234, 0x5678);
        message.add_avp(avp!(264, None, M, OctetString::new(b"host.example.com".to_vec())));
        message.add_avp(avp!(296, None, M, OctetString::new(b"example.com".to_vec())));
        message.add_avp(avp!(268, None, M, Unsigned32::new(2001)));
        message.add_avp(avp!(
            260,
            None,
            M,
            Grouped::new(vec![avp!(266, None, M, Integer32::new(10415))])
        ));

        let rendered = message.to_string();
        assert!(rendered.contains("CapabilitiesExchange(257)"));
        assert!(rendered.contains("Origin-Host"));
        assert!(rendered.contains("Vendor-Id"));
        assert!(rendered.contains("2001"));
    }
}
