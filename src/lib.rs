//! bucketprobe library: public object discovery for S3 buckets.
//!
//! This crate validates caller-supplied credentials, consults the bucket's
//! public access block, enumerates object keys and classifies which of
//! them are publicly readable.  Results flow to a pluggable
//! [`findings::FindingSink`].

pub mod bucket;
pub mod config;
pub mod errors;
pub mod findings;
pub mod http;
pub mod metrics;
pub mod scan;
pub mod storage;
pub mod xml;

#[cfg(test)]
pub(crate) mod testing;
