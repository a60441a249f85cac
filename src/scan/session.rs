//! Session state for one scan.
//!
//! Combines the credential check with the externally supplied ownership
//! fact.  The session is decided once, then handed by value to every
//! stage that needs to know which calls it may make.

use std::sync::Arc;

use serde::Serialize;
use tracing::warn;

use super::classifier::Strategy;
use super::credentials::CredentialState;
use crate::storage::backend::StorageApi;

/// What the scanner is allowed to do against the bucket.
#[derive(Clone)]
pub enum Session {
    /// No usable credentials; only public endpoints are probed.
    Anonymous,
    /// Valid credentials that don't own the bucket (or ownership unknown).
    Authenticated(Arc<dyn StorageApi>),
    /// Valid credentials that own the bucket.
    Owner(Arc<dyn StorageApi>),
}

/// Serializable label of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    Anonymous,
    Authenticated,
    Owner,
}

impl Session {
    /// Decide the session from the validation result. Invalid or unusable
    /// credentials are dropped for the rest of the scan.
    pub fn establish(
        state: CredentialState,
        storage: Option<Arc<dyn StorageApi>>,
        owned: bool,
    ) -> Self {
        match storage.filter(|_| state.is_valid()) {
            Some(storage) if owned => Session::Owner(storage),
            Some(storage) => Session::Authenticated(storage),
            None => {
                if owned {
                    warn!("Bucket marked as owned but credentials are unusable; ignoring ownership");
                }
                Session::Anonymous
            }
        }
    }

    pub fn kind(&self) -> SessionKind {
        match self {
            Session::Anonymous => SessionKind::Anonymous,
            Session::Authenticated(_) => SessionKind::Authenticated,
            Session::Owner(_) => SessionKind::Owner,
        }
    }

    /// Storage client usable in this session.
    pub fn storage(&self) -> Option<&Arc<dyn StorageApi>> {
        match self {
            Session::Anonymous => None,
            Session::Authenticated(storage) | Session::Owner(storage) => Some(storage),
        }
    }

    /// First classification strategy for this session.
    pub fn primary_strategy(&self) -> Strategy {
        match self {
            Session::Anonymous => Strategy::UnauthenticatedProbe,
            Session::Authenticated(_) => Strategy::AuthenticatedProbe,
            Session::Owner(_) => Strategy::Acl,
        }
    }
}
