use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

const TOKEN_SEED_PREFIX: &str = "cube";
const BUCKET_SECONDS: i64 = 60;

/// Decides whether an inbound credential may call a guarded handler.
pub trait AuthStrategy: Send + Sync {
    fn authorize(&self, token: &str, now: DateTime<Utc>) -> bool;
}

/// Accepts everything; used when `auth.mode` is `none`.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl AuthStrategy for AllowAll {
    fn authorize(&self, _token: &str, _now: DateTime<Utc>) -> bool {
        true
    }
}

/// Time-bucketed shared secret: the SHA-256 of `cube<minute>` for the current,
/// previous and next minute, plus an optional fixed bypass value.
///
/// This is a weak scheme with no replay protection. A token stays valid for
/// the whole three-minute window.
#[derive(Debug, Clone, Default)]
pub struct RotatingToken {
    bypass: Option<String>,
}

impl RotatingToken {
    pub fn new(bypass: Option<String>) -> Self {
        Self {
            bypass: bypass.filter(|v| !v.is_empty()),
        }
    }

    pub fn issue(&self, now: DateTime<Utc>) -> String {
        derive_token(minute_bucket(now))
    }

    pub fn validate(&self, token: &str) -> bool {
        self.authorize(token, Utc::now())
    }
}

impl AuthStrategy for RotatingToken {
    fn authorize(&self, token: &str, now: DateTime<Utc>) -> bool {
        if token.is_empty() {
            return false;
        }
        if self.bypass.as_deref() == Some(token) {
            return true;
        }
        let bucket = minute_bucket(now);
        [bucket, bucket - 1, bucket + 1]
            .into_iter()
            .any(|b| derive_token(b) == token)
    }
}

pub fn minute_bucket(now: DateTime<Utc>) -> i64 {
    now.timestamp().div_euclid(BUCKET_SECONDS)
}

pub fn derive_token(bucket: i64) -> String {
    sha256_hex(format!("{TOKEN_SEED_PREFIX}{bucket}").as_bytes())
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}
