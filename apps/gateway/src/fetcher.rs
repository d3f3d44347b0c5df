//! Outbound requests to origins and downstream tiers

use axum::body::Bytes;
use edge_veil_common::{
    Result, VeilError,
    constants::{BROWSER_ACCEPT_LANGUAGE, BROWSER_USER_AGENT, MAX_REDIRECTS},
    filter_request_headers,
};
use http::{HeaderMap, HeaderValue, Method, header};
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::config::{HeaderMode, RedirectMode};

/// The outbound call to a target
#[derive(Debug)]
pub struct TargetRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

/// Whether the inbound body is forwarded for this method
pub fn carries_body(method: &Method) -> bool {
    *method == Method::POST || *method == Method::PUT
}

/// Build the header set sent to the origin for `target`
pub fn build_outbound_headers(inbound: &HeaderMap, target: &Url, mode: HeaderMode) -> HeaderMap {
    let mut headers = match mode {
        HeaderMode::Passthrough => {
            let mut headers = filter_request_headers(inbound);
            if headers.contains_key(header::ORIGIN)
                && let Ok(origin) = HeaderValue::from_str(&target.origin().ascii_serialization())
            {
                headers.insert(header::ORIGIN, origin);
            }
            headers
        }
        HeaderMode::Browser => browser_headers(inbound),
    };

    if let Ok(referer) = HeaderValue::from_str(target.as_str()) {
        headers.insert(header::REFERER, referer);
    }

    headers
}

fn browser_headers(inbound: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::USER_AGENT,
        HeaderValue::from_static(BROWSER_USER_AGENT),
    );
    headers.insert(
        header::ACCEPT,
        inbound
            .get(header::ACCEPT)
            .cloned()
            .unwrap_or_else(|| HeaderValue::from_static("*/*")),
    );
    headers.insert(
        header::ACCEPT_LANGUAGE,
        inbound
            .get(header::ACCEPT_LANGUAGE)
            .cloned()
            .unwrap_or_else(|| HeaderValue::from_static(BROWSER_ACCEPT_LANGUAGE)),
    );

    for name in [header::COOKIE, header::CONTENT_TYPE] {
        for value in inbound.get_all(&name) {
            headers.append(name.clone(), value.clone());
        }
    }

    headers
}

/// HTTP client for one tier
///
/// Holds a single pooled client; redirect policy is fixed at construction.
#[derive(Debug, Clone)]
pub struct OriginFetcher {
    client: reqwest::Client,
    response_timeout: Duration,
}

impl OriginFetcher {
    pub fn new(
        redirect_mode: RedirectMode,
        connect_timeout: Duration,
        response_timeout: Duration,
    ) -> Result<Self> {
        let redirect = match redirect_mode {
            RedirectMode::Follow => reqwest::redirect::Policy::limited(MAX_REDIRECTS),
            RedirectMode::Intercept => reqwest::redirect::Policy::none(),
        };

        let client = reqwest::Client::builder()
            .redirect(redirect)
            .connect_timeout(connect_timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| VeilError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            response_timeout,
        })
    }

    /// Send the request and wait for response headers
    ///
    /// The body is not read here, so streams stay unbuffered and are not
    /// subject to the response timeout.
    pub async fn forward(&self, request: TargetRequest) -> Result<reqwest::Response> {
        debug!("Fetching {} {}", request.method, request.url);

        let mut builder = self
            .client
            .request(request.method, request.url)
            .headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        match tokio::time::timeout(self.response_timeout, builder.send()).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => Err(VeilError::UpstreamFetch(e.without_url().to_string())),
            Err(_) => Err(VeilError::UpstreamFetch(format!(
                "no response within {}s",
                self.response_timeout.as_secs()
            ))),
        }
    }
}
