pub mod element;
pub mod message;

use crate::soap::element::Element;
use crate::soap::message::SamlMessage;
use anyhow::{anyhow, Result};

pub const SOAP11_NAMESPACE: &str = "http://schemas.xmlsoap.org/soap/envelope/";
pub const SOAP12_NAMESPACE: &str = "http://www.w3.org/2003/05/soap-envelope";

/// A parsed SOAP envelope.
pub struct SoapEnvelope {
    root: Element,
}

impl SoapEnvelope {
    pub fn parse(content: &[u8]) -> Result<SoapEnvelope> {
        let xml = std::str::from_utf8(content)?;
        let root = Element::parse(xml)?;

        let is_envelope = root.is("Envelope", Some(SOAP11_NAMESPACE))
            || root.is("Envelope", Some(SOAP12_NAMESPACE));
        if !is_envelope {
            return Err(anyhow!(
                "expected a SOAP envelope but got <{}>",
                root.name()
            ));
        }

        Ok(SoapEnvelope { root })
    }

    fn section(&self, local_name: &str) -> Option<&Element> {
        self.root
            .children()
            .find(|child| child.local_name() == local_name && child.namespace() == self.root.namespace())
    }

    pub fn header_blocks(&self) -> impl Iterator<Item = &Element> {
        self.section("Header").into_iter().flat_map(|header| header.children())
    }

    /// Finds a header block by local name, and by namespace unless `namespace` is `None`.
    pub fn header_block(&self, local_name: &str, namespace: Option<&str>) -> Option<&Element> {
        self.header_blocks()
            .find(|block| block.is(local_name, namespace))
    }

    pub fn first_body_element(&self) -> Option<&Element> {
        self.section("Body")?.first_child_element()
    }

    pub fn body_message(&self) -> Option<SamlMessage> {
        self.first_body_element().and_then(SamlMessage::from_element)
    }
}
