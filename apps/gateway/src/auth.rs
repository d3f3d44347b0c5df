//! Authentication for gated tiers
//!
//! A gated tier accepts a request only when its `pw` query parameter equals
//! the time-window credential for the current hour bucket. Supplied values
//! are never logged.

use chrono::{DateTime, Utc};
use edge_veil_common::{Result, TimeWindowCredential, VeilError};
use tracing::{debug, warn};

use crate::config::AuthPolicy;

/// Authenticate a request against the tier's policy
///
/// Returns Ok(Some(credential)) if the tier is gated and the credential matched
/// Returns Ok(None) if the tier is open
/// Returns Err(VeilError::Auth) if the tier is gated and the credential is missing or wrong
pub fn authenticate_request(
    policy: &AuthPolicy,
    supplied: Option<&str>,
) -> Result<Option<TimeWindowCredential>> {
    authenticate_at(policy, supplied, Utc::now())
}

/// Same as [`authenticate_request`] with an explicit clock reading
pub fn authenticate_at(
    policy: &AuthPolicy,
    supplied: Option<&str>,
    now: DateTime<Utc>,
) -> Result<Option<TimeWindowCredential>> {
    match policy {
        AuthPolicy::Open => {
            debug!("Authentication not required");
            Ok(None)
        }
        AuthPolicy::TimeWindow { gate, .. } => {
            if supplied.is_none() {
                warn!("Rejected request without credential");
                return Err(VeilError::Auth);
            }

            if !gate.verify_at(supplied, now) {
                warn!("Rejected request with incorrect credential");
                return Err(VeilError::Auth);
            }

            Ok(Some(gate.expected_at(now)))
        }
    }
}
