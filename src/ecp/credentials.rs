use crate::ecp::templates::TemplateRenderer;
use anyhow::Result;
use base64::{engine::general_purpose::STANDARD, Engine};
use flate2::read::DeflateDecoder;
use log::warn;
use std::io::Read;

/// The caller identity carried by an HTTP `Authorization` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    Basic { username: String, password: String },
    /// A SAML token, already inflated and decoded.
    Saml(String),
}

impl Credential {
    /// Interprets an `Authorization` value.
    ///
    /// Unsupported schemes and undecodable values yield `None`; the handshake then continues
    /// without a WS-Security header.
    pub fn from_authorization(value: &str) -> Option<Credential> {
        if let Some(encoded) = strip_scheme(value, "Basic ") {
            return match decode_basic(encoded) {
                Ok(credential) => credential,
                Err(e) => {
                    warn!("ignoring undecodable Basic authorization: {}", e);
                    None
                }
            };
        }

        if let Some(encoded) = strip_scheme(value, "SAML ") {
            return match decode_saml(encoded) {
                Ok(token) => Some(Credential::Saml(token)),
                Err(e) => {
                    warn!("ignoring undecodable SAML authorization: {}", e);
                    None
                }
            };
        }

        None
    }

    /// The token that goes inside the WS-Security header.
    pub fn render(&self, templates: &TemplateRenderer) -> String {
        match self {
            Credential::Basic { username, password } => templates.username_token(username, password),
            Credential::Saml(token) => token.clone(),
        }
    }
}

/// Derives the WS-Security token for an optional `Authorization` header.
pub fn credential_token(authorization: Option<&str>, templates: &TemplateRenderer) -> Option<String> {
    authorization
        .and_then(Credential::from_authorization)
        .map(|credential| credential.render(templates))
}

fn strip_scheme<'a>(value: &'a str, scheme: &str) -> Option<&'a str> {
    value
        .get(..scheme.len())
        .filter(|prefix| prefix.eq_ignore_ascii_case(scheme))
        .map(|_| &value[scheme.len()..])
}

fn decode_basic(encoded: &str) -> Result<Option<Credential>> {
    let decoded = String::from_utf8(STANDARD.decode(encoded.trim())?)?;

    Ok(decoded
        .split_once(':')
        .map(|(username, password)| Credential::Basic {
            username: username.to_string(),
            password: password.to_string(),
        }))
}

fn decode_saml(encoded: &str) -> Result<String> {
    let compressed = STANDARD.decode(encoded.trim())?;
    let mut decoder = DeflateDecoder::new(&compressed[..]);
    let mut token = String::new();
    decoder.read_to_string(&mut token)?;

    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::DeflateEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn basic(credentials: &str) -> String {
        format!("Basic {}", STANDARD.encode(credentials))
    }

    #[test]
    fn test_basic_token_contains_credentials_once() {
        let templates = TemplateRenderer::new();
        let token = credential_token(Some(&basic("alice:s3cr3t")), &templates).unwrap();
        let header = templates.security(&token);

        assert_eq!(header.matches("alice").count(), 1);
        assert_eq!(header.matches("s3cr3t").count(), 1);
        assert!(header.contains("<wsse:Username>alice</wsse:Username>"));
        assert!(header.contains(">s3cr3t</wsse:Password>"));
    }

    #[test]
    fn test_basic_with_trailing_colon_has_empty_password() {
        assert_eq!(
            Credential::from_authorization(&basic("alice:")),
            Some(Credential::Basic {
                username: String::from("alice"),
                password: String::new(),
            })
        );

        let token = credential_token(Some(&basic("alice:")), &TemplateRenderer::new()).unwrap();
        assert!(token.contains("PasswordText\"></wsse:Password>"));
    }

    #[test]
    fn test_basic_password_may_contain_colons() {
        assert_eq!(
            Credential::from_authorization(&basic("alice:a:b")),
            Some(Credential::Basic {
                username: String::from("alice"),
                password: String::from("a:b"),
            })
        );
    }

    #[test]
    fn test_basic_scheme_is_case_insensitive() {
        let value = format!("bAsIc {}", STANDARD.encode("bob:pw"));
        assert!(matches!(
            Credential::from_authorization(&value),
            Some(Credential::Basic { .. })
        ));
    }

    #[test]
    fn test_basic_without_colon_yields_nothing() {
        assert_eq!(Credential::from_authorization(&basic("alice")), None);
        assert_eq!(Credential::from_authorization("Basic !!!not-base64"), None);
    }

    #[test]
    fn test_saml_token_is_inflated() {
        let assertion = r#"<saml:Assertion xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="_a"/>"#;
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(assertion.as_bytes()).unwrap();
        let encoded = STANDARD.encode(encoder.finish().unwrap());

        let value = format!("saml {}", encoded);
        assert_eq!(
            Credential::from_authorization(&value),
            Some(Credential::Saml(assertion.to_string()))
        );
        assert_eq!(
            credential_token(Some(&value), &TemplateRenderer::new()).as_deref(),
            Some(assertion)
        );
    }

    #[test]
    fn test_other_schemes_yield_nothing() {
        assert_eq!(Credential::from_authorization("Bearer abc"), None);
        assert_eq!(Credential::from_authorization("Bas"), None);
        assert_eq!(credential_token(None, &TemplateRenderer::new()), None);
    }
}
