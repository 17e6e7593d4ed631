use anyhow::{anyhow, Result};
use reqwest::header::{HeaderMap, CONTENT_TYPE};
use reqwest::StatusCode;
use url::Url;

/// A fully received HTTP response.
///
/// The body can be taken out exactly once.
#[derive(Debug, Clone)]
pub struct HttpResponseWrapper {
    status: StatusCode,
    headers: HeaderMap,
    content: Option<Vec<u8>>,
    url: Option<Url>,
}

impl HttpResponseWrapper {
    pub fn new(status: StatusCode, headers: HeaderMap, content: Vec<u8>) -> HttpResponseWrapper {
        HttpResponseWrapper {
            status,
            headers,
            content: Some(content),
            url: None,
        }
    }

    /// Buffers a reqwest response.
    pub async fn from_response(response: reqwest::Response) -> Result<HttpResponseWrapper> {
        let status = response.status();
        let headers = response.headers().clone();
        let url = response.url().clone();
        let content = response.bytes().await?.to_vec();

        Ok(HttpResponseWrapper {
            status,
            headers,
            content: Some(content),
            url: Some(url),
        })
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The URL the response was received from, when it came off the network.
    pub fn url(&self) -> Option<&Url> {
        self.url.as_ref()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
    }

    pub fn take_content(&mut self) -> Result<Vec<u8>> {
        self.content
            .take()
            .ok_or_else(|| anyhow!("response content was already consumed"))
    }

    /// Replaces status, headers and body with those of `other`.
    pub fn replace_with(&mut self, other: HttpResponseWrapper) {
        self.status = other.status;
        self.headers = other.headers;
        self.content = other.content;
        if other.url.is_some() {
            self.url = other.url;
        }
    }
}
