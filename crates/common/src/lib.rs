//! Shared building blocks for the edge-veil proxy tiers
//!
//! This crate holds the pieces both the gateway and the operator CLI need:
//! the target token codec, the time-window credential, header policy and
//! input validation.

pub mod codec;
pub mod constants;
pub mod credential;
pub mod error;
pub mod utils;
pub mod validation;

// Re-export commonly used types for convenience
pub use codec::{EncodedToken, decode_token, encode_token, proxy_link};
pub use credential::{CredentialGate, TimeWindowCredential, expected_credential};
pub use error::{Result, VeilError};
pub use utils::{
    filter_request_headers, generate_request_id, parse_timezone, strip_hop_by_hop,
    time_bucket_key,
};
