//! Single-pass HTML scanner
//!
//! Walks the document once, copying it to the output and handing each piece
//! to the rule that understands it: quoted URL attributes, `style` attributes
//! and `<style>` blocks, and bare URLs in text, scripts and other attribute
//! values. Comments and declarations are copied untouched. Malformed markup
//! is copied as-is from the point where it stops making sense.

use std::borrow::Cow;

use super::RewriteContext;
use super::rules::{BareUrlRule, CssUrlRule, RewriteRule, UrlAttributeRule, find_ascii_ci};

/// Elements whose content is raw text rather than markup
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

/// Rewrite every link in an HTML document
pub fn rewrite_html(html: &str, ctx: &RewriteContext) -> String {
    let mut scanner = HtmlScanner {
        src: html,
        out: String::with_capacity(html.len() + html.len() / 8),
        ctx: ctx.clone(),
    };
    scanner.run();
    scanner.out
}

struct HtmlScanner<'a> {
    src: &'a str,
    out: String,
    /// Owned so `<base href>` can move the resolution base
    ctx: RewriteContext,
}

impl HtmlScanner<'_> {
    fn run(&mut self) {
        let src = self.src;
        let bytes = src.as_bytes();
        let mut text_start = 0;
        let mut i = 0;

        while i < bytes.len() {
            if bytes[i] != b'<' {
                i += 1;
                continue;
            }

            let next = bytes.get(i + 1).copied();
            let end = if src[i..].starts_with("<!--") {
                self.flush_text(text_start, i);
                let end = src[i + 4..].find("-->").map_or(src.len(), |p| i + 4 + p + 3);
                self.out.push_str(&src[i..end]);
                end
            } else if matches!(next, Some(b'!' | b'?')) {
                self.flush_text(text_start, i);
                let end = src[i..].find('>').map_or(src.len(), |p| i + p + 1);
                self.out.push_str(&src[i..end]);
                end
            } else if next == Some(b'/') || next.is_some_and(|c| c.is_ascii_alphabetic()) {
                self.flush_text(text_start, i);
                self.tag(i)
            } else {
                // A literal `<` in text
                i += 1;
                continue;
            };

            i = end;
            text_start = end;
        }

        self.flush_text(text_start, bytes.len());
    }

    fn flush_text(&mut self, from: usize, to: usize) {
        if from < to {
            let text = &self.src[from..to];
            let rewritten = BareUrlRule.apply(text, &self.ctx);
            self.out.push_str(&rewritten);
        }
    }

    /// Copy one tag starting at `start`, rewriting attribute values
    ///
    /// Returns the position after the tag, or after the raw-text content of a
    /// `<script>` / `<style>` element.
    fn tag(&mut self, start: usize) -> usize {
        let src = self.src;
        let b = src.as_bytes();
        let len = b.len();

        let mut i = start + 1;
        let closing = b[i] == b'/';
        if closing {
            i += 1;
        }

        let name_start = i;
        while i < len && (b[i].is_ascii_alphanumeric() || matches!(b[i], b'-' | b':' | b'_')) {
            i += 1;
        }
        let name = src[name_start..i].to_ascii_lowercase();

        if closing {
            let end = src[i..].find('>').map_or(len, |p| i + p + 1);
            self.out.push_str(&src[start..end]);
            return end;
        }

        let mut cursor = start;
        loop {
            while i < len && b[i].is_ascii_whitespace() {
                i += 1;
            }
            if i >= len {
                break;
            }
            match b[i] {
                b'>' => {
                    i += 1;
                    break;
                }
                b'/' | b'=' => {
                    i += 1;
                    continue;
                }
                _ => {}
            }

            let attr_start = i;
            while i < len && !b[i].is_ascii_whitespace() && !matches!(b[i], b'=' | b'>' | b'/') {
                i += 1;
            }
            let attr = &src[attr_start..i];

            let mut j = i;
            while j < len && b[j].is_ascii_whitespace() {
                j += 1;
            }
            if j >= len || b[j] != b'=' {
                i = j;
                continue;
            }

            j += 1;
            while j < len && b[j].is_ascii_whitespace() {
                j += 1;
            }
            if j >= len {
                i = j;
                break;
            }

            let (value_start, value_end, quoted, after) = if matches!(b[j], b'"' | b'\'') {
                match src[j + 1..].find(b[j] as char) {
                    Some(p) => (j + 1, j + 1 + p, true, j + 1 + p + 1),
                    None => {
                        // Unterminated quote swallows the rest of the document
                        i = len;
                        break;
                    }
                }
            } else {
                let mut k = j;
                while k < len && !b[k].is_ascii_whitespace() && b[k] != b'>' {
                    k += 1;
                }
                (j, k, false, k)
            };

            let value = &src[value_start..value_end];
            if let Some(rewritten) = self.attribute(&name, attr, value, quoted) {
                self.out.push_str(&src[cursor..value_start]);
                self.out.push_str(&rewritten);
                cursor = value_end;
            }
            i = after;
        }

        self.out.push_str(&src[cursor..i]);

        if RAW_TEXT_ELEMENTS.contains(&name.as_str()) {
            return self.raw_text(&name, i);
        }
        i
    }

    /// New value for an attribute, or `None` to keep the original
    fn attribute(&mut self, tag: &str, attr: &str, value: &str, quoted: bool) -> Option<String> {
        let attr = attr.to_ascii_lowercase();
        if attr.starts_with("xmlns") {
            return None;
        }

        if tag == "base"
            && attr == "href"
            && let Ok(Some(base)) = self.ctx.resolve(value)
        {
            self.ctx.base = base;
        }

        let rewritten = if quoted && UrlAttributeRule.matches(&attr) {
            match UrlAttributeRule.apply(value, &self.ctx) {
                Cow::Borrowed(unchanged) => BareUrlRule.apply(unchanged, &self.ctx),
                owned => owned,
            }
        } else if quoted && attr == "style" {
            chain(value, &CssUrlRule, &BareUrlRule, &self.ctx)
        } else {
            BareUrlRule.apply(value, &self.ctx)
        };

        match rewritten {
            Cow::Owned(new) if new != value => Some(new),
            _ => None,
        }
    }

    /// Copy the content of a raw-text element starting at `from`
    fn raw_text(&mut self, tag: &str, from: usize) -> usize {
        let src = self.src;
        let close = find_ascii_ci(src, from, &format!("</{}", tag)).unwrap_or(src.len());
        let content = &src[from..close];

        let rewritten = if tag == "style" {
            chain(content, &CssUrlRule, &BareUrlRule, &self.ctx)
        } else {
            BareUrlRule.apply(content, &self.ctx)
        };
        self.out.push_str(&rewritten);
        close
    }
}

fn chain<'a>(
    input: &'a str,
    first: &dyn RewriteRule,
    second: &dyn RewriteRule,
    ctx: &RewriteContext,
) -> Cow<'a, str> {
    match first.apply(input, ctx) {
        Cow::Borrowed(unchanged) => second.apply(unchanged, ctx),
        Cow::Owned(changed) => Cow::Owned(second.apply(&changed, ctx).into_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::super::ProxyLinks;
    use super::*;
    use url::Url;

    const B: &str = "https://proxy.example/?url=aHR0cHM6Ly9leGFtcGxlLmNvbS9iLmh0bWw";
    const C: &str = "https://proxy.example/?url=aHR0cHM6Ly9leGFtcGxlLmNvbS9jLmh0bWw";

    fn ctx() -> RewriteContext {
        let origin = Url::parse("https://proxy.example").unwrap();
        RewriteContext::new(
            Url::parse("https://example.com/a.html").unwrap(),
            ProxyLinks::new(&origin),
        )
    }

    #[test]
    fn test_rewrite_html_href() {
        let html = r#"<a href="/b.html">b</a>"#;
        assert_eq!(rewrite_html(html, &ctx()), format!(r#"<a href="{B}">b</a>"#));
    }

    #[test]
    fn test_rewrite_html_preserves_quotes_and_case() {
        let html = r#"<IMG SRC='c.html' Alt="x"><form ACTION = "/b.html">"#;
        assert_eq!(
            rewrite_html(html, &ctx()),
            format!(r#"<IMG SRC='{C}' Alt="x"><form ACTION = "{B}">"#)
        );
    }

    #[test]
    fn test_rewrite_html_skips_special_schemes() {
        let html = r##"<a href="#top">t</a><a href="mailto:x@example.com">m</a><a href="javascript:void(0)">j</a><img src="data:image/png;base64,AAAA">"##;
        assert_eq!(rewrite_html(html, &ctx()), html);
    }

    #[test]
    fn test_rewrite_html_decodes_ampersands() {
        let html = r#"<a href="/q?a=1&amp;b=2">q</a>"#;
        let out = rewrite_html(html, &ctx());
        let token = edge_veil_common::encode_token("https://example.com/q?a=1&b=2");
        assert_eq!(
            out,
            format!(r#"<a href="https://proxy.example/?url={token}">q</a>"#)
        );
    }

    #[test]
    fn test_rewrite_html_base_href() {
        let html = r#"<head><base href="https://example.com/dir/"></head><a href="b.html">b</a>"#;
        let out = rewrite_html(html, &ctx());
        let token = edge_veil_common::encode_token("https://example.com/dir/b.html");
        assert!(out.contains(&format!(r#"<a href="https://proxy.example/?url={token}">"#)));
    }

    #[test]
    fn test_rewrite_html_leaves_comments_and_xmlns() {
        let html = r#"<!-- https://example.com/b.html --><svg xmlns="http://www.w3.org/2000/svg"><use xlink:href="/b.html"/></svg>"#;
        let out = rewrite_html(html, &ctx());
        assert_eq!(
            out,
            format!(
                r#"<!-- https://example.com/b.html --><svg xmlns="http://www.w3.org/2000/svg"><use xlink:href="{B}"/></svg>"#
            )
        );
    }

    #[test]
    fn test_rewrite_html_bare_urls_in_text_and_script() {
        let html = r#"<p>go to https://example.com/b.html</p><script>location = "https://example.com/c.html";</script>"#;
        assert_eq!(
            rewrite_html(html, &ctx()),
            format!(r#"<p>go to {B}</p><script>location = "{C}";</script>"#)
        );
    }

    #[test]
    fn test_rewrite_html_script_is_raw_text() {
        // A `<a href=` inside a script string is not markup
        let html = r#"<script>var s = '<a href="/b.html">';</script>"#;
        assert_eq!(rewrite_html(html, &ctx()), html);
    }

    #[test]
    fn test_rewrite_html_style_element_and_attribute() {
        let html = r#"<style>p{background:url("/b.html")}</style><div style="background:url(c.html)"></div>"#;
        assert_eq!(
            rewrite_html(html, &ctx()),
            format!(
                r#"<style>p{{background:url("{B}")}}</style><div style="background:url({C})"></div>"#
            )
        );
    }

    #[test]
    fn test_rewrite_html_meta_refresh() {
        let html = r#"<meta http-equiv="refresh" content="0; url=https://example.com/b.html">"#;
        assert_eq!(
            rewrite_html(html, &ctx()),
            format!(r#"<meta http-equiv="refresh" content="0; url={B}">"#)
        );
    }

    #[test]
    fn test_rewrite_html_with_credential_links() {
        let origin = Url::parse("https://proxy.example").unwrap();
        let links = ProxyLinks::new(&origin).with_credential(Some("fefdace1".to_string()));
        let ctx = RewriteContext::new(Url::parse("https://example.com/a.html").unwrap(), links);

        let out = rewrite_html(r#"<a href="/b.html">b</a>"#, &ctx);
        assert_eq!(out, format!(r#"<a href="{B}&pw=fefdace1">b</a>"#));
        assert_eq!(rewrite_html(&out, &ctx), out);
    }

    #[test]
    fn test_rewrite_html_malformed_input() {
        let ctx = ctx();
        let inputs = [
            "<a href=\"/b.html",
            "<a href=",
            "<a",
            "<",
            "a < b and c > d",
            "<!-- unterminated",
            "<script>never closed https://example.com/b.html",
            "<p>日本語 https://example.com/b.html テキスト</p>",
        ];

        for input in inputs {
            let out = rewrite_html(input, &ctx);
            assert!(!out.is_empty());
        }

        assert_eq!(rewrite_html("<a href=\"/b.html", &ctx), "<a href=\"/b.html");
        assert_eq!(rewrite_html("a < b and c > d", &ctx), "a < b and c > d");
        assert_eq!(
            rewrite_html("<p>日本語 https://example.com/b.html テキスト</p>", &ctx),
            format!("<p>日本語 {B} テキスト</p>")
        );
    }

    #[test]
    fn test_rewrite_html_unquoted_values() {
        // Unquoted URL attributes only get the absolute-URL rule
        let html = "<a href=https://example.com/b.html>b</a><a href=/c.html>c</a>";
        assert_eq!(
            rewrite_html(html, &ctx()),
            format!("<a href={B}>b</a><a href=/c.html>c</a>")
        );
    }
}
