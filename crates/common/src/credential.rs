//! Time-window credentials
//!
//! A credential is the first eight hex characters of
//! `SHA-256(bucket_key ++ secret)`, where the bucket key names the current
//! hour in a fixed timezone. Nothing is stored: both sides recompute it.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;
use subtle::ConstantTimeEq;
use tracing::debug;
use zeroize::Zeroizing;

use crate::constants::CREDENTIAL_LEN;
use crate::error::{Result, VeilError};
use crate::utils::time_bucket_key;
use crate::validation::is_well_formed_credential;

/// The credential expected for one hour bucket
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimeWindowCredential {
    pub bucket: String,
    pub code: String,
}

/// Derive the credential code for a bucket key
pub fn expected_credential(bucket_key: &str, secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bucket_key.as_bytes());
    hasher.update(secret.as_bytes());
    let digest = hex::encode(hasher.finalize());
    digest[..CREDENTIAL_LEN].to_string()
}

/// Compare a supplied code against the one expected for `bucket_key`
///
/// Missing, empty or malformed codes are rejected before hashing.
pub fn verify(supplied: Option<&str>, bucket_key: &str, secret: &str) -> bool {
    let Some(supplied) = supplied else {
        return false;
    };
    if !is_well_formed_credential(supplied) {
        return false;
    }

    let expected = expected_credential(bucket_key, secret);
    expected.as_bytes().ct_eq(supplied.as_bytes()).into()
}

/// Holds the secret and timezone of a gated tier
#[derive(Clone)]
pub struct CredentialGate {
    secret: Zeroizing<String>,
    timezone: Tz,
}

impl CredentialGate {
    pub fn new(secret: impl Into<String>, timezone: Tz) -> Result<Self> {
        let secret = Zeroizing::new(secret.into());
        if secret.is_empty() {
            return Err(VeilError::Config(
                "credential secret must not be empty".to_string(),
            ));
        }

        Ok(Self { secret, timezone })
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    pub fn bucket_at(&self, now: DateTime<Utc>) -> String {
        time_bucket_key(now, self.timezone)
    }

    pub fn expected_at(&self, now: DateTime<Utc>) -> TimeWindowCredential {
        let bucket = self.bucket_at(now);
        let code = expected_credential(&bucket, &self.secret);
        TimeWindowCredential { bucket, code }
    }

    /// Credential for the bucket the wall clock is in right now
    pub fn current(&self) -> TimeWindowCredential {
        self.expected_at(Utc::now())
    }

    pub fn verify_at(&self, supplied: Option<&str>, now: DateTime<Utc>) -> bool {
        let bucket = self.bucket_at(now);
        let ok = verify(supplied, &bucket, &self.secret);
        debug!(bucket = %bucket, accepted = ok, "Checked time-window credential");
        ok
    }

    pub fn verify(&self, supplied: Option<&str>) -> bool {
        self.verify_at(supplied, Utc::now())
    }
}

impl fmt::Debug for CredentialGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialGate")
            .field("secret", &"<redacted>")
            .field("timezone", &self.timezone)
            .finish()
    }
}
