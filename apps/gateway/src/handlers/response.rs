//! Turning origin and downstream responses into proxy responses
//!
//! Markup is buffered (up to a limit) and rewritten; everything else is
//! streamed through untouched. Every response leaves with
//! `Access-Control-Allow-Origin: *`.

use axum::{
    body::{Body, Bytes},
    response::{IntoResponse, Response},
};
use edge_veil_common::{Result, VeilError, strip_hop_by_hop};
use futures_util::{StreamExt, stream};
use http::{HeaderMap, HeaderValue, StatusCode, header};
use tracing::{debug, info, warn};

use crate::config::RedirectMode;
use crate::content_rewrite::{ContentKind, ProxyLinks, RewriteContext, rewrite_response_content};

/// Response headers dropped once a body has been rewritten
const REWRITE_STRIPPED_HEADERS: &[&str] = &[
    "content-security-policy",
    "content-security-policy-report-only",
    "x-frame-options",
    "content-length",
];

/// Body of a [`ProxyResponse`]
pub enum ProxyBody {
    Empty,
    Text(String),
    Bytes(Bytes),
    Stream(Body),
}

impl std::fmt::Debug for ProxyBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProxyBody::Empty => f.write_str("Empty"),
            ProxyBody::Text(text) => write!(f, "Text({} bytes)", text.len()),
            ProxyBody::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
            ProxyBody::Stream(_) => f.write_str("Stream"),
        }
    }
}

/// What is returned to the caller
#[derive(Debug)]
pub struct ProxyResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: ProxyBody,
}

impl ProxyResponse {
    /// Redirect to `location` with no body
    pub fn redirect(status: StatusCode, location: &str) -> Result<Self> {
        let location = HeaderValue::from_str(location)
            .map_err(|e| VeilError::InternalError(format!("invalid Location header: {}", e)))?;

        let mut headers = HeaderMap::new();
        headers.insert(header::LOCATION, location);

        Ok(Self {
            status,
            headers,
            body: ProxyBody::Empty,
        })
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
    }
}

impl IntoResponse for ProxyResponse {
    fn into_response(self) -> Response {
        let body = match self.body {
            ProxyBody::Empty => Body::empty(),
            ProxyBody::Text(text) => Body::from(text),
            ProxyBody::Bytes(bytes) => Body::from(bytes),
            ProxyBody::Stream(body) => body,
        };

        let mut response = Response::new(body);
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response.headers_mut().insert(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        );
        response
    }
}

/// Per-tier settings for shaping origin responses
#[derive(Debug, Clone, Copy)]
pub struct ResponseShaping<'a> {
    pub links: &'a ProxyLinks,
    pub redirect_mode: RedirectMode,
    pub max_rewrite_bytes: usize,
}

/// Status a redirect is answered with in intercept mode
///
/// 301/302/303 become 302; 307/308 keep their status so the method and body
/// are preserved. Other statuses are not intercepted.
pub fn intercepted_status(status: StatusCode) -> Option<StatusCode> {
    match status.as_u16() {
        301..=303 => Some(StatusCode::FOUND),
        307 | 308 => Some(status),
        _ => None,
    }
}

/// Build the response for a directly fetched origin
pub async fn shape_origin_response(
    response: reqwest::Response,
    shaping: ResponseShaping<'_>,
) -> Result<ProxyResponse> {
    let status = response.status();
    let base = response.url().clone();
    let mut headers = response.headers().clone();
    strip_hop_by_hop(&mut headers);

    let ctx = RewriteContext::new(base, shaping.links.clone());

    if shaping.redirect_mode == RedirectMode::Intercept
        && let Some(redirect) = intercept_redirect(status, &headers, &ctx)?
    {
        return Ok(redirect);
    }

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let kind = ContentKind::from_content_type(content_type.as_deref());

    if !kind.is_rewritable() {
        debug!("Streaming {:?} body through", kind);
        return Ok(ProxyResponse {
            status,
            headers,
            body: ProxyBody::Stream(Body::from_stream(response.bytes_stream())),
        });
    }

    let limit = shaping.max_rewrite_bytes;
    if response
        .content_length()
        .is_some_and(|len| len > limit as u64)
    {
        warn!("Markup body exceeds {} bytes; passing through", limit);
        return Ok(ProxyResponse {
            status,
            headers,
            body: ProxyBody::Stream(Body::from_stream(response.bytes_stream())),
        });
    }

    let body = match collect_limited(response, limit).await? {
        Collected::Complete(bytes) => match String::from_utf8(bytes) {
            Ok(text) => {
                let content_type = content_type.unwrap_or_default();
                let (rewritten, _) = rewrite_response_content(&text, &content_type, &ctx);
                for name in REWRITE_STRIPPED_HEADERS {
                    headers.remove(*name);
                }
                ProxyBody::Text(rewritten)
            }
            Err(e) => {
                warn!("Markup body is not UTF-8; passing through");
                ProxyBody::Bytes(Bytes::from(e.into_bytes()))
            }
        },
        Collected::Overflow(body) => {
            warn!("Markup body exceeds {} bytes; passing through", limit);
            ProxyBody::Stream(body)
        }
    };

    Ok(ProxyResponse {
        status,
        headers,
        body,
    })
}

/// Build the response for a downstream tier's answer
///
/// The downstream tier already rewrote the body; only connection headers
/// are dropped.
pub fn relay_response(response: reqwest::Response) -> ProxyResponse {
    let status = response.status();
    let mut headers = response.headers().clone();
    strip_hop_by_hop(&mut headers);

    ProxyResponse {
        status,
        headers,
        body: ProxyBody::Stream(Body::from_stream(response.bytes_stream())),
    }
}

fn intercept_redirect(
    status: StatusCode,
    headers: &HeaderMap,
    ctx: &RewriteContext,
) -> Result<Option<ProxyResponse>> {
    let Some(new_status) = intercepted_status(status) else {
        return Ok(None);
    };
    let Some(location) = headers
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
    else {
        return Ok(None);
    };
    let Some(link) = ctx.proxy_link(location) else {
        if ctx
            .base
            .join(location)
            .is_ok_and(|url| ctx.links.is_proxied(&url))
        {
            return Ok(None);
        }
        warn!("Origin redirect Location cannot be proxied; refusing to relay it");
        return Err(VeilError::UpstreamFetch(
            "origin redirected to a location that cannot be proxied".to_string(),
        ));
    };

    info!("Intercepted {} redirect, answering {}", status, new_status);

    let mut redirect = ProxyResponse::redirect(new_status, &link)?;
    for cookie in headers.get_all(header::SET_COOKIE) {
        redirect
            .headers
            .append(header::SET_COOKIE, cookie.clone());
    }
    Ok(Some(redirect))
}

enum Collected {
    Complete(Vec<u8>),
    /// The limit was hit; the body replays what was read followed by the rest
    Overflow(Body),
}

async fn collect_limited(response: reqwest::Response, limit: usize) -> Result<Collected> {
    let mut chunks = Box::pin(response.bytes_stream());
    let mut buffer: Vec<u8> = Vec::new();

    while let Some(chunk) = chunks.next().await {
        let chunk = chunk.map_err(|e| VeilError::UpstreamFetch(e.without_url().to_string()))?;

        if buffer.len() + chunk.len() > limit {
            let head = stream::iter([
                Ok::<Bytes, reqwest::Error>(Bytes::from(buffer)),
                Ok(chunk),
            ]);
            return Ok(Collected::Overflow(Body::from_stream(head.chain(chunks))));
        }

        buffer.extend_from_slice(&chunk);
    }

    Ok(Collected::Complete(buffer))
}
