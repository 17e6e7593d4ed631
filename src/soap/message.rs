use crate::soap::element::Element;
use crate::soap::{SOAP11_NAMESPACE, SOAP12_NAMESPACE};

pub const SAML_PROTOCOL_NAMESPACE: &str = "urn:oasis:names:tc:SAML:2.0:protocol";
pub const SAML_ASSERTION_NAMESPACE: &str = "urn:oasis:names:tc:SAML:2.0:assertion";

/// The protocol objects a SOAP body can carry during an ECP handshake.
#[derive(Debug, Clone)]
pub enum SamlMessage {
    AuthnRequest(AuthnRequest),
    Response(SamlResponse),
    Fault(SoapFault),
}

impl SamlMessage {
    /// Converts a body element into a protocol object, or `None` for anything else.
    pub fn from_element(element: &Element) -> Option<SamlMessage> {
        if element.is("AuthnRequest", Some(SAML_PROTOCOL_NAMESPACE)) {
            Some(SamlMessage::AuthnRequest(AuthnRequest::new(element.clone())))
        } else if element.is("Response", Some(SAML_PROTOCOL_NAMESPACE)) {
            Some(SamlMessage::Response(SamlResponse::new(element.clone())))
        } else if element.is("Fault", Some(SOAP11_NAMESPACE))
            || element.is("Fault", Some(SOAP12_NAMESPACE))
        {
            Some(SamlMessage::Fault(SoapFault::new(element)))
        } else {
            None
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SamlMessage::AuthnRequest(_) => "AuthnRequest",
            SamlMessage::Response(_) => "Response",
            SamlMessage::Fault(_) => "Fault",
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuthnRequest {
    element: Element,
}

impl AuthnRequest {
    fn new(element: Element) -> AuthnRequest {
        AuthnRequest { element }
    }

    pub fn id(&self) -> Option<&str> {
        self.element.attribute("ID")
    }

    pub fn assertion_consumer_service_url(&self) -> Option<&str> {
        self.element.attribute("AssertionConsumerServiceURL")
    }

    pub fn issuer(&self) -> Option<String> {
        self.element
            .child("Issuer", Some(SAML_ASSERTION_NAMESPACE))
            .map(|issuer| issuer.text().trim().to_string())
    }

    pub fn to_xml_string(&self) -> String {
        self.element.to_xml_string()
    }
}

#[derive(Debug, Clone)]
pub struct SamlResponse {
    element: Element,
}

impl SamlResponse {
    fn new(element: Element) -> SamlResponse {
        SamlResponse { element }
    }

    pub fn id(&self) -> Option<&str> {
        self.element.attribute("ID")
    }

    pub fn in_response_to(&self) -> Option<&str> {
        self.element.attribute("InResponseTo")
    }

    /// The top-level `StatusCode` value, e.g. `urn:oasis:names:tc:SAML:2.0:status:Success`.
    pub fn status_code(&self) -> Option<&str> {
        self.element
            .child("Status", Some(SAML_PROTOCOL_NAMESPACE))?
            .child("StatusCode", Some(SAML_PROTOCOL_NAMESPACE))?
            .attribute("Value")
    }

    pub fn to_xml_string(&self) -> String {
        self.element.to_xml_string()
    }
}

/// A SOAP 1.1 or 1.2 fault, reduced to its code and human readable reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoapFault {
    pub code: String,
    pub reason: String,
}

impl SoapFault {
    fn new(element: &Element) -> SoapFault {
        let code = element
            .child("faultcode", None)
            .map(|code| code.text())
            .or_else(|| {
                element
                    .child("Code", None)
                    .and_then(|code| code.child("Value", None))
                    .map(|value| value.text())
            })
            .unwrap_or_default();
        let reason = element
            .child("faultstring", None)
            .map(|reason| reason.text())
            .or_else(|| {
                element
                    .child("Reason", None)
                    .and_then(|reason| reason.child("Text", None))
                    .map(|text| text.text())
            })
            .unwrap_or_default();

        SoapFault {
            code: code.trim().to_string(),
            reason: reason.trim().to_string(),
        }
    }
}
