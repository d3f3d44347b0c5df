//! Header policy shared by the proxy tiers
//!
//! Request headers pass a deny-list before they reach an origin; response
//! headers lose their hop-by-hop members before they reach the caller.

use http::{HeaderMap, HeaderName};

/// Connection-scoped headers that never cross a proxy hop
pub const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-connection",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Headers that identify the proxy infrastructure or the caller's network
pub const INFRA_HEADERS: &[&str] = &[
    "host",
    "forwarded",
    "via",
    "x-real-ip",
    "x-client-ip",
    "true-client-ip",
    "fastly-client-ip",
    "cdn-loop",
    "x-amz-cf-id",
];

/// Prefixes of CDN / forwarding header families
pub const INFRA_HEADER_PREFIXES: &[&str] = &["cf-", "x-forwarded-"];

/// Framing and encoding headers recomputed by the outbound client
pub const CLIENT_MANAGED_HEADERS: &[&str] = &["content-length", "accept-encoding"];

/// Check whether a header must never be forwarded to an origin
pub fn is_denied_request_header(name: &HeaderName) -> bool {
    let name = name.as_str();
    HOP_BY_HOP_HEADERS.contains(&name)
        || INFRA_HEADERS.contains(&name)
        || CLIENT_MANAGED_HEADERS.contains(&name)
        || INFRA_HEADER_PREFIXES.iter().any(|p| name.starts_with(p))
}

/// Copy inbound headers minus the deny-list
///
/// Multiple values of an allowed header are preserved.
pub fn filter_request_headers(inbound: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(inbound.len());

    for (name, value) in inbound.iter() {
        if !is_denied_request_header(name) {
            headers.append(name.clone(), value.clone());
        }
    }

    headers
}

/// Remove hop-by-hop headers from a response before relaying it
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP_HEADERS {
        headers.remove(*name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn test_filter_request_headers_empty() {
        let headers = HeaderMap::new();
        assert!(filter_request_headers(&headers).is_empty());
    }

    #[test]
    fn test_filter_drops_infra_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("host", "proxy.example".parse().unwrap());
        headers.insert("connection", "keep-alive".parse().unwrap());
        headers.insert("keep-alive", "timeout=5".parse().unwrap());
        headers.insert("transfer-encoding", "chunked".parse().unwrap());
        headers.insert("x-forwarded-for", "203.0.113.7".parse().unwrap());
        headers.insert("x-forwarded-proto", "https".parse().unwrap());
        headers.insert("x-real-ip", "203.0.113.7".parse().unwrap());
        headers.insert("cf-connecting-ip", "203.0.113.7".parse().unwrap());
        headers.insert("cf-ray", "8a1b2c3d4e5f-SYD".parse().unwrap());
        headers.insert("cf-ipcountry", "AU".parse().unwrap());
        headers.insert("cf-visitor", r#"{"scheme":"https"}"#.parse().unwrap());
        headers.insert("forwarded", "for=203.0.113.7".parse().unwrap());
        headers.insert("via", "1.1 proxy".parse().unwrap());
        headers.insert("content-length", "42".parse().unwrap());
        headers.insert("accept-encoding", "gzip, br".parse().unwrap());

        let filtered = filter_request_headers(&headers);
        assert!(filtered.is_empty(), "leaked: {:?}", filtered);
    }

    #[test]
    fn test_filter_keeps_browser_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("user-agent", "test-agent".parse().unwrap());
        headers.insert("accept", "text/html".parse().unwrap());
        headers.insert("accept-language", "en-AU".parse().unwrap());
        headers.insert("cookie", "session=abc".parse().unwrap());
        headers.append("cookie", "theme=dark".parse().unwrap());
        headers.insert("content-type", "application/x-www-form-urlencoded".parse().unwrap());
        headers.insert("x-forwarded-for", "203.0.113.7".parse().unwrap());

        let filtered = filter_request_headers(&headers);
        assert_eq!(filtered.len(), 6);
        assert_eq!(filtered.get("user-agent").unwrap(), "test-agent");
        assert_eq!(filtered.get_all("cookie").iter().count(), 2);
        assert!(filtered.get("x-forwarded-for").is_none());
    }

    #[test]
    fn test_is_denied_is_case_insensitive() {
        // HeaderName normalizes to lowercase on parse
        let name: HeaderName = "X-Forwarded-For".parse().unwrap();
        assert!(is_denied_request_header(&name));

        let name: HeaderName = "CF-Ray".parse().unwrap();
        assert!(is_denied_request_header(&name));

        let name: HeaderName = "Cookie".parse().unwrap();
        assert!(!is_denied_request_header(&name));
    }

    #[test]
    fn test_strip_hop_by_hop() {
        let mut headers = HeaderMap::new();
        headers.insert("connection", "close".parse().unwrap());
        headers.insert("transfer-encoding", "chunked".parse().unwrap());
        headers.insert("content-type", "text/html".parse().unwrap());
        headers.insert("set-cookie", HeaderValue::from_static("a=1"));
        headers.append("set-cookie", HeaderValue::from_static("b=2"));

        strip_hop_by_hop(&mut headers);

        assert!(headers.get("connection").is_none());
        assert!(headers.get("transfer-encoding").is_none());
        assert_eq!(headers.get("content-type").unwrap(), "text/html");
        assert_eq!(headers.get_all("set-cookie").iter().count(), 2);
    }
}
