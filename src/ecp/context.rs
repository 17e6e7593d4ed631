use crate::ecp::error::EcpError;
use crate::ecp::idp::IdpEntry;
use crate::ecp::{ECP_NAMESPACE, PAOS_NAMESPACE};
use crate::soap::element::Element;
use crate::soap::message::SamlMessage;
use crate::soap::SoapEnvelope;
use std::fmt;
use url::Url;

/// Steps of a handshake, in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    PassthroughCheck,
    ParseSpRequest,
    SelectIdp,
    BuildToken,
    ValidateAuthnBody,
    SendToIdp,
    ParseIdpResponse,
    SendToSp,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::PassthroughCheck => "passthrough check",
            Stage::ParseSpRequest => "parsing the service provider request",
            Stage::SelectIdp => "identity provider selection",
            Stage::BuildToken => "building the credential token",
            Stage::ValidateAuthnBody => "validating the authentication request",
            Stage::SendToIdp => "sending to the identity provider",
            Stage::ParseIdpResponse => "parsing the identity provider response",
            Stage::SendToSp => "sending to the service provider",
            Stage::Done => "done",
        };
        f.write_str(name)
    }
}

/// State of one handshake. Created per call and dropped when the call returns.
pub struct HandshakeContext {
    pub authorization_header: Option<String>,
    pub relay_state: Option<Element>,
    /// The consumer URL exactly as the service provider sent it.
    pub response_consumer_url: String,
    pub consumer_endpoint: Url,
    pub message_id: Option<String>,
    pub selected_idp: IdpEntry,
    pub credential_token: Option<String>,
}

/// What the service provider's PAOS request carries.
pub struct SpRequest {
    pub relay_state: Option<Element>,
    pub idp_entries: Vec<IdpEntry>,
    pub response_consumer_url: String,
    pub consumer_endpoint: Url,
    pub message_id: Option<String>,
    pub body: Option<SamlMessage>,
}

impl SpRequest {
    pub fn parse(content: &[u8]) -> Result<SpRequest, EcpError> {
        let envelope = SoapEnvelope::parse(content)
            .map_err(|e| EcpError::MalformedEcpRequest(format!("unreadable PAOS request: {}", e)))?;

        let relay_state = envelope.header_block("RelayState", None).cloned();

        let ecp_request = envelope
            .header_block("Request", Some(ECP_NAMESPACE))
            .ok_or_else(|| EcpError::MalformedEcpRequest(String::from("missing ECP Request header")))?;
        let idp_entries = IdpEntry::from_ecp_request(ecp_request);

        let paos_request = envelope
            .header_block("Request", Some(PAOS_NAMESPACE))
            .ok_or_else(|| EcpError::MalformedEcpRequest(String::from("missing PAOS Request header")))?;
        let response_consumer_url = paos_request
            .attribute("responseConsumerURL")
            .ok_or_else(|| {
                EcpError::MalformedEcpRequest(String::from(
                    "PAOS Request header has no responseConsumerURL",
                ))
            })?
            .to_string();
        let consumer_endpoint = Url::parse(&response_consumer_url).map_err(|e| {
            EcpError::MalformedEcpRequest(format!(
                "invalid responseConsumerURL {}: {}",
                response_consumer_url, e
            ))
        })?;
        let message_id = paos_request.attribute("messageID").map(String::from);

        Ok(SpRequest {
            relay_state,
            idp_entries,
            response_consumer_url,
            consumer_endpoint,
            message_id,
            body: envelope.body_message(),
        })
    }
}

/// What the identity provider's SOAP response carries.
pub struct IdpReply {
    pub assertion_consumer_service_url: String,
    pub relay_state: Option<Element>,
    pub body: Option<SamlMessage>,
}

impl IdpReply {
    pub fn parse(content: &[u8]) -> Result<IdpReply, EcpError> {
        let envelope = SoapEnvelope::parse(content)
            .map_err(|e| EcpError::MalformedIdpResponse(e.to_string()))?;
        let body = envelope.body_message();

        let Some(ecp_response) = envelope.header_block("Response", Some(ECP_NAMESPACE)) else {
            // an identity provider that refuses the login answers with a bare fault
            if let Some(SamlMessage::Fault(_)) = &body {
                return Err(unexpected_body("Response", body.as_ref()));
            }
            return Err(EcpError::MalformedIdpResponse(String::from(
                "missing ECP Response header",
            )));
        };

        let assertion_consumer_service_url = ecp_response
            .attribute("AssertionConsumerServiceURL")
            .ok_or_else(|| {
                EcpError::MalformedIdpResponse(String::from(
                    "ECP Response header has no AssertionConsumerServiceURL",
                ))
            })?
            .to_string();

        Ok(IdpReply {
            assertion_consumer_service_url,
            relay_state: envelope.header_block("RelayState", None).cloned(),
            body,
        })
    }
}

pub fn unexpected_body(expected: &'static str, found: Option<&SamlMessage>) -> EcpError {
    let found = match found {
        None => String::from("no recognised protocol object"),
        Some(SamlMessage::Fault(fault)) => format!("Fault ({}: {})", fault.code, fault.reason),
        Some(message) => message.kind().to_string(),
    };

    EcpError::UnexpectedBodyType { expected, found }
}
