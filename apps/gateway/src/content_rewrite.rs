//! Content rewriting for proxied documents
//!
//! Every link a browser would follow out of an HTML or CSS document is turned
//! into `<public-origin>/?url=<token>` so the next request comes back through
//! this proxy. Links are resolved against the document URL first, so relative
//! references keep their meaning.
//!
//! For example, with a document at `https://example.com/a.html` served
//! through `https://proxy.example`, `href="/b.html"` becomes
//! `href="https://proxy.example/?url=aHR0cHM6Ly9leGFtcGxlLmNvbS9iLmh0bWw"`.
//!
//! Rewriting is idempotent: links that already point at the proxy (or at any
//! other configured proxied origin) are left alone.

mod html;
mod rules;

use edge_veil_common::{Result, VeilError, proxy_link};
use tracing::{debug, warn};
use url::Url;

pub use html::rewrite_html;
pub use rules::{BareUrlRule, CssUrlRule, RewriteRule, UrlAttributeRule, rewrite_css};

/// How a response body is treated, by declared content type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Html,
    Css,
    /// Event streams and other `*stream*` types, never buffered
    Stream,
    /// Other text formats, passed through unchanged
    Text,
    /// Binary or undeclared bodies
    Opaque,
}

impl ContentKind {
    pub fn from_content_type(content_type: Option<&str>) -> Self {
        let Some(content_type) = content_type else {
            return ContentKind::Opaque;
        };

        let mime = content_type
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase();

        match mime.as_str() {
            "text/html" | "application/xhtml+xml" => ContentKind::Html,
            "text/css" => ContentKind::Css,
            m if m.contains("stream") => ContentKind::Stream,
            m if m.starts_with("text/") => ContentKind::Text,
            _ => ContentKind::Opaque,
        }
    }

    pub fn is_rewritable(self) -> bool {
        matches!(self, ContentKind::Html | ContentKind::Css)
    }
}

/// Check if content type should be rewritten
pub fn should_rewrite_content(content_type: &str) -> bool {
    ContentKind::from_content_type(Some(content_type)).is_rewritable()
}

/// Builds proxy links for one tier
#[derive(Debug, Clone)]
pub struct ProxyLinks {
    origin: String,
    proxied: Vec<String>,
    credential: Option<String>,
}

impl ProxyLinks {
    pub fn new(public_origin: &Url) -> Self {
        Self {
            origin: public_origin.origin().ascii_serialization(),
            proxied: Vec::new(),
            credential: None,
        }
    }

    /// Treat links to these origins as already proxied
    pub fn with_proxied_origins<'a>(mut self, origins: impl IntoIterator<Item = &'a Url>) -> Self {
        self.proxied
            .extend(origins.into_iter().map(|u| u.origin().ascii_serialization()));
        self
    }

    /// Append `pw=<code>` to every link built from here on
    pub fn with_credential(mut self, code: Option<String>) -> Self {
        self.credential = code;
        self
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Proxy link for an absolute target URL
    pub fn link_for(&self, absolute: &str) -> String {
        proxy_link(&self.origin, absolute, self.credential.as_deref())
    }

    /// Whether `url` already points at this proxy or a sibling tier
    pub fn is_proxied(&self, url: &Url) -> bool {
        let origin = url.origin().ascii_serialization();
        origin == self.origin || self.proxied.contains(&origin)
    }
}

/// State for rewriting one document
#[derive(Debug, Clone)]
pub struct RewriteContext {
    /// URL relative references resolve against
    pub base: Url,
    pub links: ProxyLinks,
}

/// Reference prefixes that are never followed through the proxy
const SKIPPED_PREFIXES: &[&str] = &["javascript:", "data:", "mailto:", "#"];

impl RewriteContext {
    pub fn new(base: Url, links: ProxyLinks) -> Self {
        Self { base, links }
    }

    /// Resolve a raw reference into the absolute URL it points at
    ///
    /// `Ok(None)` means the reference is not something to proxy: an empty or
    /// skipped value, a non-http scheme or a link that is already proxied.
    pub fn resolve(&self, raw: &str) -> Result<Option<Url>> {
        let candidate = raw.trim();
        if candidate.is_empty() || is_skipped(candidate) {
            return Ok(None);
        }

        let candidate = candidate.replace("&amp;", "&");
        let resolved = self
            .base
            .join(&candidate)
            .map_err(|e| VeilError::Rewrite(format!("{}: {}", e, truncate(&candidate))))?;

        if !matches!(resolved.scheme(), "http" | "https") || self.links.is_proxied(&resolved) {
            return Ok(None);
        }

        Ok(Some(resolved))
    }

    /// Proxy link for a raw reference, or `None` to leave it untouched
    ///
    /// Failures are logged and treated as "leave untouched".
    pub fn proxy_link(&self, raw: &str) -> Option<String> {
        match self.resolve(raw) {
            Ok(Some(url)) => Some(self.links.link_for(url.as_str())),
            Ok(None) => None,
            Err(e) => {
                warn!("Leaving reference unchanged: {}", e);
                None
            }
        }
    }
}

fn is_skipped(candidate: &str) -> bool {
    SKIPPED_PREFIXES.iter().any(|prefix| {
        candidate
            .get(..prefix.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
    })
}

fn truncate(value: &str) -> &str {
    match value.char_indices().nth(64) {
        Some((idx, _)) => &value[..idx],
        None => value,
    }
}

/// Main entry point for content rewriting
///
/// Returns the new body and whether anything changed. Non-markup content
/// types come back untouched.
pub fn rewrite_response_content(
    body: &str,
    content_type: &str,
    ctx: &RewriteContext,
) -> (String, bool) {
    let rewritten = match ContentKind::from_content_type(Some(content_type)) {
        ContentKind::Html => rewrite_html(body, ctx),
        ContentKind::Css => rewrite_css(body, ctx).into_owned(),
        _ => return (body.to_string(), false),
    };

    let was_rewritten = rewritten != body;
    if was_rewritten {
        debug!(
            "Rewrote {} content: {} bytes -> {} bytes",
            content_type,
            body.len(),
            rewritten.len()
        );
    }

    (rewritten, was_rewritten)
}
