mod headers;
mod id;
mod time;

pub use headers::{
    CLIENT_MANAGED_HEADERS, HOP_BY_HOP_HEADERS, INFRA_HEADER_PREFIXES, INFRA_HEADERS,
    filter_request_headers, is_denied_request_header, strip_hop_by_hop,
};
pub use id::generate_request_id;
pub use time::{parse_timezone, seconds_until_rollover, time_bucket_key};
