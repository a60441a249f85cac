//! Abstract storage API trait.
//!
//! The scanner only needs four read-only bucket operations.  Every
//! implementation must be safe to share between concurrent workers.

use std::future::Future;
use std::pin::Pin;

use crate::errors::ProbeError;

/// Well-known grantee URI for every anonymous requester.
pub const ALL_USERS_URI: &str = "http://acs.amazonaws.com/groups/global/AllUsers";

/// Well-known grantee URI for any signed-in AWS account.
pub const AUTHENTICATED_USERS_URI: &str =
    "http://acs.amazonaws.com/groups/global/AuthenticatedUsers";

/// A single ACL grant entry as returned by `GetObjectAcl`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grant {
    /// Group URI of the grantee, if the grantee is a group.
    pub grantee_uri: Option<String>,
    /// Permission string (`READ`, `WRITE`, `FULL_CONTROL`, ...).
    pub permission: String,
}

impl Grant {
    /// Whether this grant exposes the object to the public or to every
    /// authenticated AWS user.
    pub fn is_public_read(&self) -> bool {
        let public_group = matches!(
            self.grantee_uri.as_deref(),
            Some(ALL_USERS_URI | AUTHENTICATED_USERS_URI)
        );
        public_group && matches!(self.permission.as_str(), "READ" | "FULL_CONTROL")
    }
}

/// Bucket-level public access block settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublicAccessBlock {
    /// When set, every public ACL on the bucket and its objects is ignored.
    pub ignore_public_acls: bool,
}

/// Boxed future returned by every [`StorageApi`] operation.
pub type StorageFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ProbeError>> + Send + 'a>>;

/// Read-only S3 operations used by the scanner.
pub trait StorageApi: Send + Sync + 'static {
    /// List up to `max_keys` keys of `bucket` in a single call.
    fn list_objects<'a>(&'a self, bucket: &'a str, max_keys: usize)
        -> StorageFuture<'a, Vec<String>>;

    /// Fetch `key` from `bucket`. The body is discarded; only the outcome matters.
    fn get_object<'a>(&'a self, bucket: &'a str, key: &'a str) -> StorageFuture<'a, ()>;

    /// Fetch the ACL grants of `key`.
    fn get_object_acl<'a>(&'a self, bucket: &'a str, key: &'a str)
        -> StorageFuture<'a, Vec<Grant>>;

    /// Fetch the bucket's public access block. `None` when the bucket has
    /// no such configuration.
    fn get_public_access_block<'a>(
        &'a self,
        bucket: &'a str,
    ) -> StorageFuture<'a, Option<PublicAccessBlock>>;
}
