//! Credential validation.
//!
//! A single signed `GetObject` for a key that can't exist tells valid
//! credentials apart from rejected ones: S3 answers `NoSuchKey` only after
//! the signature checked out.

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::cancellable;
use crate::bucket::BucketDescriptor;
use crate::errors::ProbeError;
use crate::storage::backend::StorageApi;

/// What the validation call revealed about the supplied credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialState {
    /// No credentials were configured.
    Unset,
    /// The key id is unknown or the signature was rejected.
    Invalid,
    /// The check failed for another reason; treated as unauthenticated.
    Unusable,
    /// The credentials authenticate against this endpoint.
    Valid,
}

impl CredentialState {
    pub fn is_valid(self) -> bool {
        self == CredentialState::Valid
    }
}

/// Random key that virtually cannot exist in the bucket.
fn probe_key() -> String {
    format!("{}.txt", uuid::Uuid::new_v4())
}

/// Check whether `storage` (signed with the caller's credentials) works
/// against `bucket`. Never retried.
pub async fn validate(
    storage: Option<&dyn StorageApi>,
    bucket: &BucketDescriptor,
    cancel: &CancellationToken,
) -> CredentialState {
    let Some(storage) = storage else {
        debug!(bucket = %bucket.name, "No credentials configured");
        return CredentialState::Unset;
    };

    let key = probe_key();
    match cancellable(cancel, storage.get_object(&bucket.name, &key)).await {
        Err(ProbeError::NotFound { .. }) => {
            info!(bucket = %bucket.name, "Credentials are valid");
            CredentialState::Valid
        }
        Ok(()) => {
            // The random key exists; the signature was still accepted.
            warn!(bucket = %bucket.name, key = %key, "Validation key unexpectedly exists");
            CredentialState::Valid
        }
        Err(ProbeError::InvalidCredentials { code }) => {
            error!(
                bucket = %bucket.name,
                code = %code,
                "AWS access keys are not valid; ignoring them and using unauthenticated techniques"
            );
            CredentialState::Invalid
        }
        Err(ProbeError::AccessDenied { .. }) => {
            // S3 hides NoSuchKey behind AccessDenied when the caller lacks
            // s3:ListBucket, so the signature may well have been accepted.
            warn!(
                bucket = %bucket.name,
                "Validation request was denied; the keys may be valid but lack s3:ListBucket on this bucket. Continuing unauthenticated"
            );
            CredentialState::Unusable
        }
        Err(e) => {
            warn!(
                bucket = %bucket.name,
                error = %e,
                "Could not validate credentials; continuing unauthenticated"
            );
            CredentialState::Unusable
        }
    }
}
