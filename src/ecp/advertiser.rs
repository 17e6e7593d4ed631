use crate::ecp::{PAOS_HEADER_VALUE, PAOS_MEDIA_TYPE};
use anyhow::Result;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT};

pub const PAOS: HeaderName = HeaderName::from_static("paos");

/// Marks outgoing requests as coming from a PAOS capable ECP client.
#[derive(Debug, Clone, Copy)]
pub struct CapabilityAdvertiser {
    enabled: bool,
}

impl Default for CapabilityAdvertiser {
    fn default() -> Self {
        CapabilityAdvertiser::new(true)
    }
}

impl CapabilityAdvertiser {
    pub fn new(enabled: bool) -> CapabilityAdvertiser {
        CapabilityAdvertiser { enabled }
    }

    /// Prepends the PAOS media type to `Accept` and sets the `PAOS` header.
    ///
    /// Applying it twice leaves the headers as they were after the first call.
    pub fn advertise(&self, headers: &mut HeaderMap) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        let existing: Vec<&[u8]> = headers
            .get_all(ACCEPT)
            .iter()
            .map(|value| value.as_bytes())
            .collect();

        let advertised = existing
            .iter()
            .any(|value| String::from_utf8_lossy(value).contains(PAOS_MEDIA_TYPE));

        if !advertised {
            let mut accept = Vec::from(PAOS_MEDIA_TYPE.as_bytes());
            accept.extend_from_slice(b", ");
            if existing.is_empty() {
                accept.extend_from_slice(b"*/*");
            } else {
                accept.extend_from_slice(&existing.join(&b", "[..]));
            }

            headers.insert(ACCEPT, HeaderValue::from_bytes(&accept)?);
        }

        headers.insert(PAOS, HeaderValue::from_static(PAOS_HEADER_VALUE));

        Ok(())
    }
}
