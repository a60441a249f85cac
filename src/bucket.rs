//! Bucket and credential descriptors.
//!
//! Both are created once per scan and never mutated afterwards.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use tracing::debug;

use crate::http::HttpClient;

/// Header S3 returns on any bucket-level response, even a 403.
const BUCKET_REGION_HEADER: &str = "x-amz-bucket-region";

/// Characters left as-is when building an object URL. `/` is kept so
/// that "directory" keys keep their path shape.
const KEY_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// The bucket being examined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketDescriptor {
    /// Bucket name.
    pub name: String,
    /// AWS region the bucket lives in.
    pub region: String,
    /// Public endpoint of the bucket, without trailing slash.
    pub public_endpoint: String,
}

impl BucketDescriptor {
    /// Build a descriptor, expanding `{bucket}` in `endpoint_template`.
    pub fn new(name: &str, region: &str, endpoint_template: &str) -> Self {
        let public_endpoint = endpoint_template
            .replace("{bucket}", name)
            .trim_end_matches('/')
            .to_string();
        Self {
            name: name.to_string(),
            region: region.to_string(),
            public_endpoint,
        }
    }

    /// Public URL of an object in this bucket.
    pub fn object_url(&self, key: &str) -> String {
        format!(
            "{}/{}",
            self.public_endpoint,
            utf8_percent_encode(key, KEY_ENCODE_SET)
        )
    }
}

/// Explicit storage credentials supplied by the caller.
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialSet {
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl CredentialSet {
    /// Build a credential set when both halves are present and non-empty.
    pub fn from_parts(access_key_id: Option<&str>, secret_access_key: Option<&str>) -> Option<Self> {
        match (access_key_id, secret_access_key) {
            (Some(ak), Some(sk)) if !ak.is_empty() && !sk.is_empty() => Some(Self {
                access_key_id: ak.to_string(),
                secret_access_key: sk.to_string(),
            }),
            _ => None,
        }
    }
}

impl std::fmt::Debug for CredentialSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialSet")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .finish()
    }
}

/// Look up the region of a bucket with a `HEAD` on its public endpoint,
/// so the lookup never reads a listing.
///
/// Returns `None` when the endpoint is unreachable or the header is absent.
pub async fn resolve_region(http: &dyn HttpClient, public_endpoint: &str) -> Option<String> {
    let resp = match http.head(public_endpoint).await {
        Ok(resp) => resp,
        Err(e) => {
            debug!(endpoint = public_endpoint, error = %e, "Region lookup failed");
            return None;
        }
    };
    resp.headers
        .get(BUCKET_REGION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}
