use crate::soap::element::Element;
use crate::soap::message::SAML_PROTOCOL_NAMESPACE;
use log::warn;
use url::Url;

/// An identity provider offered by the service provider's `IDPList`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdpEntry {
    pub provider_id: String,
    pub name: Option<String>,
    pub location: Url,
}

impl IdpEntry {
    /// Reads the `IDPList` carried by an ECP `Request` header block.
    ///
    /// Entries without a usable `Loc` cannot be contacted and are skipped.
    pub fn from_ecp_request(ecp_request: &Element) -> Vec<IdpEntry> {
        let Some(idp_list) = ecp_request.child("IDPList", Some(SAML_PROTOCOL_NAMESPACE)) else {
            return vec![];
        };

        idp_list
            .children()
            .filter(|child| child.is("IDPEntry", Some(SAML_PROTOCOL_NAMESPACE)))
            .filter_map(|entry| {
                let provider_id = entry.attribute("ProviderID").unwrap_or_default().to_string();
                let location = match entry.attribute("Loc").map(Url::parse) {
                    Some(Ok(location)) => location,
                    Some(Err(e)) => {
                        warn!("skipping identity provider {}: invalid Loc: {}", provider_id, e);
                        return None;
                    }
                    None => {
                        warn!("skipping identity provider {}: no Loc", provider_id);
                        return None;
                    }
                };

                Some(IdpEntry {
                    provider_id,
                    name: entry.attribute("Name").map(String::from),
                    location,
                })
            })
            .collect()
    }
}

/// Chooses which identity provider receives the authentication request.
pub trait IdpSelector: Send + Sync {
    fn select<'a>(&self, entries: &'a [IdpEntry]) -> Option<&'a IdpEntry>;
}

/// Picks the first entry of the list.
#[derive(Debug, Default, Clone, Copy)]
pub struct FirstIdp;

impl IdpSelector for FirstIdp {
    fn select<'a>(&self, entries: &'a [IdpEntry]) -> Option<&'a IdpEntry> {
        entries.first()
    }
}
