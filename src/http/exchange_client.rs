use crate::http::redirect::{merge_cookies, RetryDirective};
use crate::http::response::HttpResponseWrapper;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use log::debug;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, COOKIE};
use reqwest::{redirect, Client, Method};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// A request that can be replayed: the body is buffered before the first send.
#[derive(Debug, Clone)]
pub struct ExchangeRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
    pub follow_redirects: bool,
}

impl ExchangeRequest {
    pub fn new(method: Method, url: Url) -> ExchangeRequest {
        ExchangeRequest {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
            follow_redirects: true,
        }
    }

    pub fn post(url: Url, content_type: &'static str, body: Vec<u8>) -> ExchangeRequest {
        let mut request = ExchangeRequest::new(Method::POST, url);
        request
            .headers
            .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        request.body = Some(body);
        request
    }

    /// The request to issue next, after a hook asked for a retry.
    pub fn retry(self, directive: RetryDirective) -> ExchangeRequest {
        ExchangeRequest {
            method: self.method,
            url: directive.url,
            headers: directive.headers,
            body: directive.body,
            follow_redirects: self.follow_redirects,
        }
    }
}

/// Decides what to do with a non-2xx response.
pub trait ResponseHook: Send + Sync {
    fn on_unsuccessful(
        &self,
        request: &ExchangeRequest,
        response: &HttpResponseWrapper,
    ) -> Option<RetryDirective>;
}

#[async_trait]
pub trait HttpExchange: Send + Sync {
    /// Sends `request`, consulting `hook` whenever the response is not a success.
    async fn execute(
        &self,
        request: ExchangeRequest,
        hook: Option<&dyn ResponseHook>,
    ) -> Result<HttpResponseWrapper>;
}

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub timeout: Option<Duration>,
    pub max_redirects: usize,
    pub cookie_store: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        ClientOptions {
            timeout: Some(Duration::from_secs(30)),
            max_redirects: 10,
            cookie_store: true,
        }
    }
}

pub struct ExchangeClient {
    http_client: Client,
    cookie_jar: Option<Arc<Jar>>,
    max_redirects: usize,
}

impl ExchangeClient {
    pub fn new(options: &ClientOptions) -> Result<ExchangeClient> {
        // redirects are replayed by the hooks, never by reqwest itself
        let mut builder = Client::builder().redirect(redirect::Policy::none());
        if let Some(timeout) = options.timeout {
            builder = builder.timeout(timeout);
        }
        let cookie_jar = options.cookie_store.then(|| Arc::new(Jar::default()));
        if let Some(cookie_jar) = &cookie_jar {
            builder = builder.cookie_provider(cookie_jar.clone());
        }

        Ok(ExchangeClient {
            http_client: builder.build()?,
            cookie_jar,
            max_redirects: options.max_redirects,
        })
    }

    /// Headers to send for `request`.
    ///
    /// reqwest leaves the cookie store out of requests that carry their own `Cookie` header, so
    /// stored cookies are joined in here. Pairs set on the request win over stored ones.
    fn outgoing_headers(&self, request: &ExchangeRequest) -> HeaderMap {
        let mut headers = request.headers.clone();

        let stored = self
            .cookie_jar
            .as_ref()
            .and_then(|cookie_jar| cookie_jar.cookies(&request.url));
        if let (Some(stored), Some(explicit)) = (stored, request.headers.get(COOKIE)) {
            if let Some(cookie) = merge_cookies(&stored, explicit) {
                headers.insert(COOKIE, cookie);
            }
        }

        headers
    }

    async fn send(&self, request: &ExchangeRequest) -> Result<HttpResponseWrapper> {
        let mut builder = self
            .http_client
            .request(request.method.clone(), request.url.clone())
            .headers(self.outgoing_headers(request));
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await?;
        debug!(
            "{} {} answered {}",
            request.method,
            request.url,
            response.status()
        );

        HttpResponseWrapper::from_response(response).await
    }
}

#[async_trait]
impl HttpExchange for ExchangeClient {
    async fn execute(
        &self,
        mut request: ExchangeRequest,
        hook: Option<&dyn ResponseHook>,
    ) -> Result<HttpResponseWrapper> {
        let mut retries = 0;

        loop {
            let response = self.send(&request).await?;
            if response.status().is_success() {
                return Ok(response);
            }

            let directive = match hook {
                Some(hook) => hook.on_unsuccessful(&request, &response),
                None => None,
            };

            match directive {
                None => return Ok(response),
                Some(_) if retries >= self.max_redirects => {
                    return Err(anyhow!(
                        "gave up on {} after {} redirects",
                        request.url,
                        self.max_redirects
                    ));
                }
                Some(directive) => {
                    retries += 1;
                    debug!("retrying {} at {}", request.method, directive.url);
                    request = request.retry(directive);
                }
            }
        }
    }
}
