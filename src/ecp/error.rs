use reqwest::StatusCode;
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Why an ECP handshake could not be completed.
#[derive(Debug, Error)]
pub enum EcpError {
    #[error("malformed ECP request from the service provider: {0}")]
    MalformedEcpRequest(String),

    #[error("no identity provider available in the ECP request")]
    NoIdpAvailable,

    #[error("unexpected SOAP body: expected {expected}, found {found}")]
    UnexpectedBodyType {
        expected: &'static str,
        found: String,
    },

    #[error("identity provider at {location} is unreachable")]
    IdpUnreachable {
        location: String,
        #[source]
        source: BoxError,
    },

    #[error("malformed response from the identity provider: {0}")]
    MalformedIdpResponse(String),

    #[error("identity provider addressed the assertion to {received}, expected {expected}")]
    ResponseConsumerMismatch { expected: String, received: String },

    #[error("service provider rejected the assertion{}", rejection_status(.status))]
    SpRejectedAssertion {
        status: Option<StatusCode>,
        #[source]
        source: Option<BoxError>,
    },
}

fn rejection_status(status: &Option<StatusCode>) -> String {
    status
        .map(|status| format!(" with status {}", status))
        .unwrap_or_default()
}

impl EcpError {
    /// Every handshake failure means the caller did not get access to the resource.
    pub fn is_access_denied(&self) -> bool {
        match self {
            EcpError::MalformedEcpRequest(_)
            | EcpError::NoIdpAvailable
            | EcpError::UnexpectedBodyType { .. }
            | EcpError::IdpUnreachable { .. }
            | EcpError::MalformedIdpResponse(_)
            | EcpError::ResponseConsumerMismatch { .. }
            | EcpError::SpRejectedAssertion { .. } => true,
        }
    }
}
