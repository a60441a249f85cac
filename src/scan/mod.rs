//! Public object discovery.
//!
//! A scan walks a fixed pipeline: validate credentials, consult the
//! public access block (owned buckets only), list keys, then classify
//! which keys are publicly readable.  [`selector::Scanner`] drives the
//! pipeline and picks the probing strategy from the [`session::Session`].

pub mod classifier;
pub mod credentials;
pub mod lister;
pub mod policy;
pub mod queue;
pub mod selector;
pub mod session;

use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::errors::ProbeError;

pub use selector::{ScanOptions, ScanReport, Scanner};

/// Run `fut` unless `cancel` fires first.
pub(crate) async fn cancellable<T, F>(cancel: &CancellationToken, fut: F) -> Result<T, ProbeError>
where
    F: Future<Output = Result<T, ProbeError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ProbeError::Cancelled),
        res = fut => res,
    }
}
