//! Object listing.
//!
//! Keys come from the authenticated `ListObjectsV2` call when a client is
//! available, otherwise (or when that call yields nothing) from the
//! bucket's public XML index.  Getting any listing at all is itself a
//! finding: it proves the bucket enumerates its keys to outsiders.

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::cancellable;
use crate::bucket::BucketDescriptor;
use crate::errors::ProbeError;
use crate::http::HttpClient;
use crate::storage::backend::StorageApi;
use crate::xml::{parse_error_code, parse_list_bucket_keys};

/// Where a listing came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingSource {
    /// Signed `ListObjectsV2` call.
    Api,
    /// Anonymous GET on the bucket endpoint.
    Http,
}

/// Keys enumerated from a bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listing {
    pub source: ListingSource,
    pub keys: Vec<String>,
}

/// Per-source caps on the number of keys kept.
#[derive(Debug, Clone, Copy)]
pub struct ListLimits {
    /// Keys requested from the API in its single call.
    pub api: usize,
    /// Keys kept from the public index.
    pub http: usize,
}

impl Default for ListLimits {
    fn default() -> Self {
        Self {
            api: 1000,
            http: 999,
        }
    }
}

/// Produce the keys to examine, or `None` when the bucket doesn't expose
/// a listing to this session.
pub async fn list_keys(
    bucket: &BucketDescriptor,
    storage: Option<&dyn StorageApi>,
    http: &dyn HttpClient,
    limits: ListLimits,
    cancel: &CancellationToken,
) -> Option<Listing> {
    if let Some(storage) = storage {
        let keys = list_via_api(storage, bucket, limits.api, cancel).await;
        if !keys.is_empty() {
            info!(bucket = %bucket.name, count = keys.len(), "Listed objects via API");
            return Some(Listing {
                source: ListingSource::Api,
                keys,
            });
        }
    }

    if cancel.is_cancelled() {
        return None;
    }

    match list_via_http(http, bucket, limits.http, cancel).await {
        Ok(keys) => {
            info!(bucket = %bucket.name, count = keys.len(), "Listed objects via public endpoint");
            Some(Listing {
                source: ListingSource::Http,
                keys,
            })
        }
        Err(ProbeError::ListingUnavailable { status }) => {
            info!(
                bucket = %bucket.name,
                status,
                "Failed to retrieve any objects using the unauthenticated technique as bucket listing is disabled"
            );
            None
        }
        Err(e) => {
            warn!(bucket = %bucket.name, error = %e, "Public listing failed");
            None
        }
    }
}

/// One `ListObjectsV2` page; denial or failure yield an empty list.
async fn list_via_api(
    storage: &dyn StorageApi,
    bucket: &BucketDescriptor,
    limit: usize,
    cancel: &CancellationToken,
) -> Vec<String> {
    match cancellable(cancel, storage.list_objects(&bucket.name, limit)).await {
        Ok(mut keys) => {
            keys.truncate(limit);
            keys
        }
        Err(ProbeError::AccessDenied { .. }) => {
            warn!(
                bucket = %bucket.name,
                "Could not retrieve bucket objects using the authenticated technique due to insufficient permissions"
            );
            Vec::new()
        }
        Err(e) => {
            warn!(bucket = %bucket.name, error = %e, "Authenticated listing failed");
            Vec::new()
        }
    }
}

/// GET the bucket endpoint and read keys from its XML index.
async fn list_via_http(
    http: &dyn HttpClient,
    bucket: &BucketDescriptor,
    limit: usize,
    cancel: &CancellationToken,
) -> Result<Vec<String>, ProbeError> {
    let resp = cancellable(cancel, http.get(&bucket.public_endpoint)).await?;

    if !resp.status.is_success() {
        debug!(
            bucket = %bucket.name,
            status = resp.status.as_u16(),
            code = parse_error_code(&resp.body).as_deref().unwrap_or("-"),
            "Public listing refused"
        );
        return Err(ProbeError::ListingUnavailable {
            status: resp.status.as_u16(),
        });
    }

    parse_list_bucket_keys(&resp.body, limit)
}
