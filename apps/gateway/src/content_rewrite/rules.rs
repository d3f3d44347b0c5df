//! Link rewriting rules
//!
//! Each rule recognises one way a document can carry a link and swaps the
//! link for its proxy form, leaving everything else byte-for-byte intact.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::borrow::Cow;

use super::RewriteContext;

/// A link-rewriting rule
pub trait RewriteRule {
    /// Rewrite every link this rule recognises in `input`
    fn apply<'a>(&self, input: &'a str, ctx: &RewriteContext) -> Cow<'a, str>;
}

/// Rewrites the value of a URL-bearing attribute
///
/// The whole input is one attribute value.
#[derive(Debug, Clone, Copy, Default)]
pub struct UrlAttributeRule;

impl UrlAttributeRule {
    pub const ATTRIBUTES: &'static [&'static str] = &[
        "src",
        "href",
        "action",
        "formaction",
        "poster",
        "data-src",
        "xlink:href",
    ];

    pub fn matches(&self, attribute: &str) -> bool {
        Self::ATTRIBUTES
            .iter()
            .any(|name| name.eq_ignore_ascii_case(attribute))
    }
}

impl RewriteRule for UrlAttributeRule {
    fn apply<'a>(&self, value: &'a str, ctx: &RewriteContext) -> Cow<'a, str> {
        match ctx.proxy_link(value) {
            Some(link) => Cow::Owned(link),
            None => Cow::Borrowed(value),
        }
    }
}

static BARE_URL_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"https?://[^\s'"<>)]+"#).expect("Invalid regex"));

/// Rewrites absolute `http(s)://` URLs appearing anywhere in text
#[derive(Debug, Clone, Copy, Default)]
pub struct BareUrlRule;

impl RewriteRule for BareUrlRule {
    fn apply<'a>(&self, text: &'a str, ctx: &RewriteContext) -> Cow<'a, str> {
        BARE_URL_REGEX.replace_all(text, |caps: &Captures| {
            ctx.proxy_link(&caps[0])
                .unwrap_or_else(|| caps[0].to_string())
        })
    }
}

/// Rewrites `url(...)` references and `@import "..."` strings in CSS
#[derive(Debug, Clone, Copy, Default)]
pub struct CssUrlRule;

#[derive(Debug, Clone, Copy)]
enum CssReference {
    /// Position right after `url(`
    Url(usize),
    /// Position right after `@import`
    Import(usize),
}

impl RewriteRule for CssUrlRule {
    fn apply<'a>(&self, css: &'a str, ctx: &RewriteContext) -> Cow<'a, str> {
        let mut out = String::new();
        let mut cursor = 0;
        let mut pos = 0;

        while let Some(reference) = next_reference(css, pos) {
            let span = match reference {
                CssReference::Url(after) => url_value_span(css, after),
                CssReference::Import(after) => import_value_span(css, after),
            };

            let Some((start, end)) = span else {
                pos = match reference {
                    CssReference::Url(after) | CssReference::Import(after) => after,
                };
                continue;
            };

            if let Some(link) = ctx.proxy_link(&css[start..end]) {
                out.push_str(&css[cursor..start]);
                out.push_str(&link);
                cursor = end;
            }
            pos = end;
        }

        if cursor == 0 {
            return Cow::Borrowed(css);
        }
        out.push_str(&css[cursor..]);
        Cow::Owned(out)
    }
}

/// Rewrite a stylesheet
pub fn rewrite_css<'a>(css: &'a str, ctx: &RewriteContext) -> Cow<'a, str> {
    CssUrlRule.apply(css, ctx)
}

/// Case-insensitive search for an ASCII needle starting at byte `from`
pub(super) fn find_ascii_ci(haystack: &str, from: usize, needle: &str) -> Option<usize> {
    let h = haystack.as_bytes();
    let n = needle.as_bytes();
    if n.len() > h.len() {
        return None;
    }
    (from..=h.len() - n.len()).find(|&i| h[i..i + n.len()].eq_ignore_ascii_case(n))
}

fn next_reference(css: &str, from: usize) -> Option<CssReference> {
    let mut url_from = from;
    let url = loop {
        match find_ascii_ci(css, url_from, "url(") {
            // `myurl(` is some other function
            Some(i) if i > 0 && is_ident_byte(css.as_bytes()[i - 1]) => url_from = i + 1,
            other => break other,
        }
    };
    let import = find_ascii_ci(css, from, "@import");

    match (url, import) {
        (Some(u), Some(i)) if i < u => Some(CssReference::Import(i + "@import".len())),
        (Some(u), _) => Some(CssReference::Url(u + "url(".len())),
        (None, Some(i)) => Some(CssReference::Import(i + "@import".len())),
        (None, None) => None,
    }
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'-' || b == b'_'
}

fn skip_whitespace(bytes: &[u8], mut i: usize) -> usize {
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    i
}

/// Byte span of the reference inside `url(...)`, without quotes
fn url_value_span(css: &str, after_paren: usize) -> Option<(usize, usize)> {
    let bytes = css.as_bytes();
    let i = skip_whitespace(bytes, after_paren);

    match bytes.get(i)? {
        &quote @ (b'"' | b'\'') => quoted_span(css, i, quote),
        _ => {
            let close = i + css[i..].find(')')?;
            let mut end = close;
            while end > i && bytes[end - 1].is_ascii_whitespace() {
                end -= 1;
            }
            Some((i, end))
        }
    }
}

/// Byte span of the string in `@import "..."`; `@import url(...)` is left to the url scan
fn import_value_span(css: &str, after_keyword: usize) -> Option<(usize, usize)> {
    let bytes = css.as_bytes();
    let i = skip_whitespace(bytes, after_keyword);

    match bytes.get(i)? {
        &quote @ (b'"' | b'\'') => quoted_span(css, i, quote),
        _ => None,
    }
}

fn quoted_span(css: &str, open: usize, quote: u8) -> Option<(usize, usize)> {
    let start = open + 1;
    let end = start + css[start..].find(quote as char)?;
    Some((start, end))
}
