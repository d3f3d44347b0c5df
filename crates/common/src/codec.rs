//! Target token codec
//!
//! A token is the URL-safe, unpadded base64 encoding of a target URL. It is
//! what travels in the `url` query parameter between the browser and every
//! proxy tier.

use base64::{
    Engine as _, alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
};
use std::fmt;
use url::{ParseError, Url};

use crate::constants::{CREDENTIAL_PARAM, TARGET_PARAM};
use crate::error::{Result, VeilError};
use crate::validation::validate_target_url;

/// URL-safe alphabet, no padding on encode, padding optional on decode
const TOKEN_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// A target URL in transit form
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EncodedToken(String);

impl EncodedToken {
    /// Encode a URL into its canonical token
    pub fn encode(url: &str) -> Self {
        Self(encode_token(url))
    }

    /// Decode this token back into a validated absolute URL
    pub fn decode(&self) -> Result<String> {
        decode_token(&self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for EncodedToken {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

impl AsRef<str> for EncodedToken {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EncodedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Encode a URL string into a token
pub fn encode_token(url: &str) -> String {
    TOKEN_ENGINE.encode(url.as_bytes())
}

/// Decode a token into an absolute `http(s)` URL string
///
/// Accepts standard or URL-safe alphabets, with or without padding. A space
/// is read as `+`, since that is what query-string parsing turns `+` into.
/// A decoded value without a scheme is assumed to be an `https` host.
pub fn decode_token(token: &str) -> Result<String> {
    let normalized: String = token
        .trim()
        .chars()
        .map(|c| match c {
            '+' | ' ' => '-',
            '/' => '_',
            other => other,
        })
        .collect();

    if normalized.is_empty() {
        return Err(VeilError::Decode("empty token".to_string()));
    }

    let bytes = TOKEN_ENGINE.decode(normalized.as_bytes())?;
    let decoded = String::from_utf8(bytes)
        .map_err(|_| VeilError::Decode("token is not valid UTF-8".to_string()))?;
    let decoded = decoded.trim();

    let candidate = match Url::parse(decoded) {
        Err(ParseError::RelativeUrlWithoutBase) => format!("https://{}", decoded),
        _ => decoded.to_string(),
    };

    validate_target_url(&candidate)?;
    Ok(candidate)
}

/// Proxy link for an absolute target URL
///
/// `<origin>/?url=<token>`, with `&pw=<code>` appended when a credential is
/// given. `origin` carries no trailing slash.
///
/// ```
/// use edge_veil_common::codec::proxy_link;
///
/// assert_eq!(
///     proxy_link("https://proxy.example", "https://a.io/", Some("fefdace1")),
///     "https://proxy.example/?url=aHR0cHM6Ly9hLmlvLw&pw=fefdace1"
/// );
/// ```
pub fn proxy_link(origin: &str, target: &str, credential: Option<&str>) -> String {
    let mut link = format!("{}/?{}={}", origin, TARGET_PARAM, encode_token(target));
    if let Some(code) = credential {
        link.push('&');
        link.push_str(CREDENTIAL_PARAM);
        link.push('=');
        link.push_str(code);
    }
    link
}
