//! Storage API access.
//!
//! The [`backend::StorageApi`] trait abstracts over the S3 operations the
//! scanner issues with credentials.  The production implementation lives
//! in [`aws`].

pub mod aws;
pub mod backend;
