/// Query parameter carrying the encoded target token
pub const TARGET_PARAM: &str = "url";

/// Query parameter carrying the time-window credential
pub const CREDENTIAL_PARAM: &str = "pw";

/// Number of hex characters in a time-window credential
pub const CREDENTIAL_LEN: usize = 8;

/// Timezone the hour buckets are computed in
pub const DEFAULT_TIMEZONE: &str = "Australia/Sydney";

/// chrono format of a time bucket key (hour granularity)
pub const TIME_BUCKET_FORMAT: &str = "%Y-%m-%dT%H";

/// Landing page used when a request carries no target
pub const DEFAULT_TARGET: &str = "https://www.google.com/";

/// Maximum length of a decoded target URL
pub const MAX_TARGET_URL_LENGTH: usize = 8192;

/// Maximum inbound request body forwarded to the origin (16 MiB)
pub const MAX_REQUEST_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Maximum markup body buffered for rewriting (16 MiB)
pub const MAX_REWRITE_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Timeout for establishing the upstream connection (10 seconds)
pub const UPSTREAM_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Timeout waiting for upstream response headers (30 seconds)
pub const UPSTREAM_RESPONSE_TIMEOUT_SECS: u64 = 30;

/// Redirect hops followed by a tier in follow mode
pub const MAX_REDIRECTS: usize = 10;

/// User-Agent sent in browser header mode
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36";

/// Accept-Language sent in browser header mode when the caller sent none
pub const BROWSER_ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";
