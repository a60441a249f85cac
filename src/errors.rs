//! Probe error types.
//!
//! Every remote failure the engine can observe is folded into a
//! [`ProbeError`].  None of them are fatal: callers use the variant to
//! decide whether to stop a probing branch, move on to the next
//! strategy, or simply report that nothing was found.

use thiserror::Error;

/// Errors raised while talking to the storage API or the public endpoint.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The access key id is unknown or the signature did not match.
    #[error("The AWS Access Key Id or signature you provided is not valid: {code}")]
    InvalidCredentials { code: String },

    /// The caller is not permitted to perform the operation.
    #[error("Access Denied: {operation}")]
    AccessDenied { operation: String },

    /// The requested key or configuration does not exist.
    #[error("The resource you requested does not exist: {resource}")]
    NotFound { resource: String },

    /// The bucket does not expose a public listing.
    #[error("Bucket listing is not public (HTTP {status})")]
    ListingUnavailable { status: u16 },

    /// The scan was cancelled or hit its deadline.
    #[error("Operation cancelled")]
    Cancelled,

    /// Network, protocol or unexpected service failure.
    #[error("Transport error: {0}")]
    Transport(#[from] anyhow::Error),
}

impl ProbeError {
    /// Build a [`ProbeError`] from a service error code.
    ///
    /// Codes that don't carry a meaning for probing collapse into
    /// [`ProbeError::Transport`] with `message` as context.
    pub fn from_service_code(code: Option<&str>, operation: &str, message: String) -> Self {
        match code {
            Some("InvalidAccessKeyId" | "SignatureDoesNotMatch" | "InvalidToken") => {
                ProbeError::InvalidCredentials {
                    code: code.unwrap_or_default().to_string(),
                }
            }
            Some("AccessDenied" | "AllAccessDisabled" | "Forbidden") => ProbeError::AccessDenied {
                operation: operation.to_string(),
            },
            Some("NoSuchKey" | "NotFound" | "NoSuchPublicAccessBlockConfiguration") => {
                ProbeError::NotFound {
                    resource: operation.to_string(),
                }
            }
            _ => ProbeError::Transport(anyhow::anyhow!("{operation}: {message}")),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ProbeError::NotFound { .. })
    }
}
