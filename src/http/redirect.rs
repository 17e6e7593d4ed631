use crate::http::exchange_client::{ExchangeRequest, ResponseHook};
use crate::http::response::HttpResponseWrapper;
use log::{debug, warn};
use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, COOKIE,
    IF_MATCH, IF_MODIFIED_SINCE, IF_NONE_MATCH, IF_RANGE, IF_UNMODIFIED_SINCE, LOCATION,
    SET_COOKIE,
};
use reqwest::{Method, StatusCode};
use url::Url;

/// Methods replayed without a body.
const IDEMPOTENT_METHODS: [Method; 3] = [Method::GET, Method::HEAD, Method::CONNECT];

const CONDITIONAL_HEADERS: [HeaderName; 5] = [
    IF_MATCH,
    IF_NONE_MATCH,
    IF_MODIFIED_SINCE,
    IF_UNMODIFIED_SINCE,
    IF_RANGE,
];

const REDIRECT_STATUSES: [StatusCode; 5] = [
    StatusCode::MOVED_PERMANENTLY,
    StatusCode::FOUND,
    StatusCode::SEE_OTHER,
    StatusCode::TEMPORARY_REDIRECT,
    StatusCode::PERMANENT_REDIRECT,
];

/// How to reissue a request after a redirect.
#[derive(Debug, Clone)]
pub struct RetryDirective {
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
}

/// Decides whether `response` redirects `request`, and if so how the request is rewritten.
pub fn decide_redirect(
    request: &ExchangeRequest,
    response: &HttpResponseWrapper,
) -> Option<RetryDirective> {
    if !request.follow_redirects || !REDIRECT_STATUSES.contains(&response.status()) {
        return None;
    }

    let location = response.headers().get(LOCATION)?.to_str().ok()?;
    let url = match request.url.join(location) {
        Ok(url) => url,
        Err(e) => {
            warn!("not following redirect to {}: {}", location, e);
            return None;
        }
    };

    let mut headers = request.headers.clone();
    headers.remove(AUTHORIZATION);
    for header in CONDITIONAL_HEADERS.iter() {
        headers.remove(header);
    }
    headers.remove(CONTENT_LENGTH);

    if let Some(cookie) = first_cookie(response.headers()) {
        let cookie = match headers.get(COOKIE) {
            Some(existing) => merge_cookies(existing, &cookie).unwrap_or(cookie),
            None => cookie,
        };
        headers.insert(COOKIE, cookie);
    }

    let body = if IDEMPOTENT_METHODS.contains(&request.method) {
        headers.remove(CONTENT_TYPE);
        None
    } else {
        request.body.clone()
    };

    debug!(
        "{} redirected from {} to {}",
        response.status(),
        request.url,
        url
    );

    Some(RetryDirective { url, headers, body })
}

/// The cookie pair of the first `Set-Cookie` header, without its attributes.
fn first_cookie(headers: &HeaderMap) -> Option<HeaderValue> {
    let set_cookie = headers.get(SET_COOKIE)?.to_str().ok()?;
    let pair = set_cookie.split(';').next().unwrap_or(set_cookie).trim();

    HeaderValue::from_str(pair).ok()
}

/// Appends the pairs of `additions` to a `Cookie` value.
///
/// A pair in `additions` replaces an existing pair with the same cookie name.
pub fn merge_cookies(existing: &HeaderValue, additions: &HeaderValue) -> Option<HeaderValue> {
    let additions: Vec<&str> = cookie_pairs(additions.to_str().ok()?).collect();
    let mut pairs: Vec<&str> = cookie_pairs(existing.to_str().ok()?)
        .filter(|pair| {
            !additions
                .iter()
                .any(|added| cookie_name(added) == cookie_name(pair))
        })
        .collect();
    pairs.extend(additions);

    HeaderValue::from_str(&pairs.join("; ")).ok()
}

fn cookie_pairs(value: &str) -> impl Iterator<Item = &str> {
    value.split(';').map(str::trim).filter(|pair| !pair.is_empty())
}

fn cookie_name(pair: &str) -> &str {
    pair.split_once('=').map_or(pair, |(name, _)| name).trim()
}

/// Follows redirects on behalf of an [`ExchangeRequest`].
#[derive(Debug, Default, Clone, Copy)]
pub struct RedirectPolicy;

impl ResponseHook for RedirectPolicy {
    fn on_unsuccessful(
        &self,
        request: &ExchangeRequest,
        response: &HttpResponseWrapper,
    ) -> Option<RetryDirective> {
        decide_redirect(request, response)
    }
}
