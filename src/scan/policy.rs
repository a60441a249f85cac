//! Public access block gate.

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::cancellable;
use crate::bucket::BucketDescriptor;
use crate::errors::ProbeError;
use crate::storage::backend::StorageApi;

/// Result of consulting the bucket's public access block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GateDecision {
    /// `IgnorePublicAcls` is on: no object can be public.
    Blocked,
    /// Configuration read and public ACLs are honoured.
    NotBlocked,
    /// Configuration couldn't be read; probing continues.
    Unknown,
}

/// Read the public access block of an owned bucket.
///
/// A permission error is reported as [`GateDecision::Unknown`], never as
/// blocked, so a restricted policy endpoint can't hide public objects.
pub async fn check_public_access_block(
    storage: &dyn StorageApi,
    bucket: &BucketDescriptor,
    cancel: &CancellationToken,
) -> GateDecision {
    match cancellable(cancel, storage.get_public_access_block(&bucket.name)).await {
        Ok(Some(config)) if config.ignore_public_acls => {
            info!(bucket = %bucket.name, "Bucket does not allow public objects; exiting");
            GateDecision::Blocked
        }
        Ok(_) => GateDecision::NotBlocked,
        Err(ProbeError::AccessDenied { .. }) => {
            warn!(bucket = %bucket.name, "Permission error reading public access block");
            GateDecision::Unknown
        }
        Err(e) => {
            warn!(bucket = %bucket.name, error = %e, "Failed to read public access block");
            GateDecision::Unknown
        }
    }
}
