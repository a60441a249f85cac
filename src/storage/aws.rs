//! AWS S3 storage API client.
//!
//! Wraps the AWS SDK client with the four read-only operations the
//! scanner needs.  Credentials are always the explicit pair supplied by
//! the caller; the ambient AWS credential chain is never consulted, so an
//! unauthenticated scan can't accidentally run with someone else's keys.

use std::time::Duration;

use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::Client;
use tracing::{debug, info};

use super::backend::{Grant, PublicAccessBlock, StorageApi, StorageFuture};
use crate::bucket::CredentialSet;
use crate::errors::ProbeError;

/// Connection settings for [`AwsStorageClient`].
#[derive(Debug, Clone)]
pub struct AwsClientOptions {
    /// AWS region of the bucket.
    pub region: String,
    /// Custom S3-compatible endpoint (e.g. MinIO, LocalStack).
    pub endpoint_url: Option<String>,
    /// Force path-style URL addressing.
    pub use_path_style: bool,
    /// Per-operation timeout.
    pub operation_timeout: Duration,
}

/// Storage API backed by the AWS SDK.
pub struct AwsStorageClient {
    client: Client,
}

impl AwsStorageClient {
    /// Create a client signing every request with `credentials`.
    pub async fn new(credentials: &CredentialSet, options: &AwsClientOptions) -> Self {
        let creds = aws_sdk_s3::config::Credentials::new(
            &credentials.access_key_id,
            &credentials.secret_access_key,
            None, // session_token
            None, // expiry
            "bucketprobe-config",
        );

        let timeouts = aws_config::timeout::TimeoutConfig::builder()
            .operation_timeout(options.operation_timeout)
            .build();

        let mut config_loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(options.region.clone()))
            .credentials_provider(creds)
            .timeout_config(timeouts);

        if let Some(ref endpoint) = options.endpoint_url {
            config_loader = config_loader.endpoint_url(endpoint);
        }

        let sdk_config = config_loader.load().await;

        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(options.use_path_style)
            .build();

        info!(
            region = %options.region,
            access_key_id = %credentials.access_key_id,
            "AWS storage client initialized"
        );

        Self {
            client: Client::from_conf(s3_config),
        }
    }

    /// Map an AWS SDK error to a [`ProbeError`] using the service error code.
    fn map_sdk_error<E, R>(operation: &str, err: SdkError<E, R>) -> ProbeError
    where
        E: ProvideErrorMetadata + std::error::Error + 'static,
        R: std::fmt::Debug,
    {
        let code = err
            .as_service_error()
            .and_then(|e| e.code())
            .map(str::to_string);
        let message = DisplayErrorContext(&err).to_string();
        ProbeError::from_service_code(code.as_deref(), operation, message)
    }
}

impl StorageApi for AwsStorageClient {
    fn list_objects<'a>(
        &'a self,
        bucket: &'a str,
        max_keys: usize,
    ) -> StorageFuture<'a, Vec<String>> {
        Box::pin(async move {
            debug!(bucket, max_keys, "AWS list_objects_v2");

            let resp = self
                .client
                .list_objects_v2()
                .bucket(bucket)
                .max_keys(i32::try_from(max_keys).unwrap_or(i32::MAX))
                .send()
                .await
                .map_err(|e| Self::map_sdk_error("list_objects_v2", e))?;

            // One page only; the service caps a page at 1000 keys.
            Ok(resp
                .contents()
                .iter()
                .filter_map(|obj| obj.key().map(str::to_string))
                .take(max_keys)
                .collect())
        })
    }

    fn get_object<'a>(&'a self, bucket: &'a str, key: &'a str) -> StorageFuture<'a, ()> {
        Box::pin(async move {
            debug!(bucket, key, "AWS get_object");

            // The body stream is dropped unread.
            self.client
                .get_object()
                .bucket(bucket)
                .key(key)
                .send()
                .await
                .map_err(|e| Self::map_sdk_error("get_object", e))?;

            Ok(())
        })
    }

    fn get_object_acl<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
    ) -> StorageFuture<'a, Vec<Grant>> {
        Box::pin(async move {
            debug!(bucket, key, "AWS get_object_acl");

            let resp = self
                .client
                .get_object_acl()
                .bucket(bucket)
                .key(key)
                .send()
                .await
                .map_err(|e| Self::map_sdk_error("get_object_acl", e))?;

            Ok(resp
                .grants()
                .iter()
                .map(|g| Grant {
                    grantee_uri: g.grantee().and_then(|ge| ge.uri()).map(str::to_string),
                    permission: g
                        .permission()
                        .map(|p| p.as_str().to_string())
                        .unwrap_or_default(),
                })
                .collect())
        })
    }

    fn get_public_access_block<'a>(
        &'a self,
        bucket: &'a str,
    ) -> StorageFuture<'a, Option<PublicAccessBlock>> {
        Box::pin(async move {
            debug!(bucket, "AWS get_public_access_block");

            let result = self
                .client
                .get_public_access_block()
                .bucket(bucket)
                .send()
                .await
                .map_err(|e| Self::map_sdk_error("get_public_access_block", e));

            match result {
                Ok(resp) => Ok(resp.public_access_block_configuration().map(|c| {
                    PublicAccessBlock {
                        ignore_public_acls: c.ignore_public_acls().unwrap_or(false),
                    }
                })),
                // NoSuchPublicAccessBlockConfiguration: nothing is blocked.
                Err(e) if e.is_not_found() => Ok(None),
                Err(e) => Err(e),
            }
        })
    }
}
