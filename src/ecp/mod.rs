//! SAML 2.0 Enhanced Client or Proxy (ECP) support over the PAOS binding.
//!
//! The [`advertiser::CapabilityAdvertiser`] tells a service provider that the client speaks
//! PAOS, and the [`orchestrator::EcpOrchestrator`] completes the handshake once the service
//! provider answers with a PAOS request. [`relay::EcpRelay`] wires both to one HTTP client.

pub mod advertiser;
pub mod context;
pub mod credentials;
pub mod error;
pub mod idp;
pub mod orchestrator;
pub mod relay;
pub mod templates;

use quick_xml::escape::escape;

pub const PAOS_MEDIA_TYPE: &str = "application/vnd.paos+xml";
pub const PAOS_NAMESPACE: &str = "urn:liberty:paos:2003-08";
pub const ECP_NAMESPACE: &str = "urn:oasis:names:tc:SAML:2.0:profiles:SSO:ecp";
pub const ECP_SIGNED_AUTHN_REQUESTS: &str =
    "urn:oasis:names:tc:SAML:2.0:profiles:SSO:ecp:2.0:WantAuthnRequestsSigned";

/// `SOAPAction` of the SAML SOAP binding.
pub const SOAP_ACTION: &str = "http://www.oasis-open.org/committees/security";
pub const SOAP_CONTENT_TYPE: &str = "text/xml";

/// Value of the `PAOS` request header.
pub const PAOS_HEADER_VALUE: &str = concat!(
    "ver=\"urn:liberty:paos:2003-08\"; ",
    "\"urn:oasis:names:tc:SAML:2.0:profiles:SSO:ecp\",",
    "\"urn:oasis:names:tc:SAML:2.0:profiles:SSO:ecp:2.0:WantAuthnRequestsSigned\""
);

/// The PAOS `Response` header block that correlates a reply with the service provider's request.
pub fn paos_response_header(message_id: &str) -> String {
    format!(
        "<paos:Response xmlns:paos=\"{}\" xmlns:soap=\"{}\" soap:actor=\"http://schemas.xmlsoap.org/soap/actor/next\" soap:mustUnderstand=\"1\" refToMessageID=\"{}\"/>",
        PAOS_NAMESPACE,
        crate::soap::SOAP11_NAMESPACE,
        escape(message_id)
    )
}
