//! S3-compatible storage backend.
//!
//! This module provides a storage backend implementation for S3-compatible
//! services including AWS S3, Backblaze B2, Tigris (Fly.io), MinIO, and others.
//!
//! # Credentials
//!
//! Credentials are provided explicitly via the configuration file.
//!
//! TODO: Support `credentials: "profile:name"` in config to use AWS SDK
//! credential providers (`~/.aws/credentials`) for actual AWS S3 buckets.

use crate::{
    ContentType, ObjectInfo, StorageBackend, WriteMode,
    backend::{ObjectInfoStream, join_url},
    error::{ErrorKind, Result},
    path::to_key,
    validate_path,
};
use async_stream::stream;
use async_trait::async_trait;
use aws_sdk_s3::{
    Client,
    config::{BehaviorVersion, Credentials, Region, retry::RetryConfig},
    error::DisplayErrorContext,
    primitives::{ByteStream, DateTime},
};
use exn::ResultExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Generous default for concurrent S3 requests.
const DEFAULT_CONCURRENT_REQUESTS: usize = 100;

/// HTTP status returned when `If-None-Match: *` finds an existing object.
const PRECONDITION_FAILED: u16 = 412;

/// S3-compatible storage backend.
///
/// Stores objects in an S3 bucket, optionally under a key prefix. All paths
/// are relative to the configured prefix (if any).
///
/// # Examples
///
/// ```no_run
/// use memefold_storage::backend::S3Backend;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = S3Backend::new(
///     "images",
///     "user-images",
///     None,
///     "us-west-004",
///     Some("https://s3.us-west-004.backblazeb2.com".to_string()),
///     Some("https://cdn.example.com/user-images".to_string()),
///     "access_key_id",
///     "secret_access_key",
/// ).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct S3Backend {
    name: String,
    client: Client,
    bucket: String,
    prefix: Option<String>,
    public_url: String,
    /// Rate limiter for concurrent S3 requests.
    rate_limiter: Arc<Semaphore>,
}

impl S3Backend {
    /// Create a new S3 storage backend.
    ///
    /// # Arguments
    /// * `name` - A name for this backend (used in logging)
    /// * `bucket` - S3 bucket name
    /// * `prefix` - Optional key prefix (acts as virtual directory)
    /// * `region` - AWS region or provider-specific region (e.g., "us-west-004" for Backblaze)
    /// * `endpoint` - Custom endpoint URL for S3-compatible services
    /// * `public_url` - Base URL objects are publicly served under; defaults
    ///   to the AWS virtual-hosted bucket URL
    /// * `key_id` - AWS/provider access key ID
    /// * `key_secret` - AWS/provider secret access key
    #[allow(clippy::too_many_arguments)]
    pub async fn new(
        name: impl Into<String>,
        bucket: impl Into<String>,
        prefix: Option<String>,
        region: impl Into<String>,
        endpoint: Option<impl Into<String>>,
        public_url: Option<String>,
        key_id: impl Into<String>,
        key_secret: impl Into<String>,
    ) -> Result<Self> {
        let prefix = prefix.map(validate_path).transpose()?.map(|p| to_key(&p));
        let name = name.into();
        let bucket = bucket.into();
        let region = region.into();
        let public_url = match public_url {
            Some(url) => url,
            None => format!("https://{bucket}.s3.{region}.amazonaws.com"),
        };
        let credentials = Credentials::new(key_id, key_secret, None, None, "memefold-config");
        let mut config_builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(Region::new(region))
            // Exponential backoff (1 initial + 3 retries)
            .retry_config(RetryConfig::standard().with_max_attempts(4))
            // Path-style addressing for S3-compatible services (Backblaze, MinIO, etc.)
            .force_path_style(true);
        if let Some(endpoint_url) = endpoint {
            config_builder = config_builder.endpoint_url(endpoint_url);
        }
        let client = Client::from_conf(config_builder.build());
        let rate_limiter = Arc::new(Semaphore::new(DEFAULT_CONCURRENT_REQUESTS));
        Ok(Self {
            name,
            client,
            bucket,
            prefix,
            public_url,
            rate_limiter,
        })
    }

    /// Construct the full S3 key from a relative path.
    fn full_key(&self, path: &Path) -> Result<String> {
        let key = to_key(&validate_path(path)?);
        Ok(match &self.prefix {
            Some(prefix) => format!("{}/{}", prefix.trim_end_matches('/'), key),
            None => key,
        })
    }

    /// Strip the configured prefix from an S3 key to get relative path.
    fn relative_path(&self, key: &str) -> Result<PathBuf> {
        let relative = match &self.prefix {
            Some(prefix) => {
                let prefix_normalized = prefix.trim_end_matches('/');
                key.strip_prefix(prefix_normalized).and_then(|s| s.strip_prefix('/')).unwrap_or(key)
            },
            None => key,
        };
        validate_path(relative)
    }

    /// Key prefix to list, ending in `/` so `user-1` doesn't match `user-10`.
    fn list_prefix(&self, prefix: Option<&Path>) -> Result<Option<String>> {
        Ok(match prefix {
            Some(prefix) => Some(format!("{}/", self.full_key(prefix)?)),
            None => self.prefix.as_ref().map(|p| format!("{}/", p.trim_end_matches('/'))),
        })
    }

    /// Acquire a rate limiter permit before making an S3 API call.
    async fn acquire_permit(&self) -> Result<OwnedSemaphorePermit> {
        self.rate_limiter
            .clone()
            .acquire_owned()
            .await
            .or_raise(|| ErrorKind::BackendError("S3 rate limiter closed".to_string()))
    }

    /// Convert AWS DateTime to OffsetDateTime.
    fn parse_datetime(dt: &DateTime) -> Result<OffsetDateTime> {
        OffsetDateTime::from_unix_timestamp_nanos(dt.as_nanos())
            .or_raise(|| ErrorKind::BackendError("S3 datetime out of range".to_string()))
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        let key = self.full_key(path)?;
        let _permit = self.acquire_permit().await?;
        match self.client.head_object().bucket(&self.bucket).key(&key).send().await {
            Ok(_) => Ok(true),
            Err(e) => match e.into_service_error() {
                e if e.is_not_found() => Ok(false),
                e => exn::bail!(Self::network(e)),
            },
        }
    }

    fn network(err: impl std::error::Error) -> ErrorKind {
        ErrorKind::Network(DisplayErrorContext(err).to_string())
    }
}

#[async_trait]
impl StorageBackend for S3Backend {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> ObjectInfoStream<'a> {
        let key_prefix = match self.list_prefix(prefix) {
            Ok(key_prefix) => key_prefix,
            Err(e) => return Box::pin(futures::stream::once(async { Err(e) })),
        };

        Box::pin(stream! {
            let mut pages = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .set_prefix(key_prefix)
                .into_paginator()
                .send();
            while let Some(page) = pages.next().await {
                let page = match page {
                    Ok(page) => page,
                    Err(e) => {
                        yield Err(exn::Exn::from(Self::network(e)));
                        break;
                    },
                };
                for object in page.contents() {
                    let Some(key) = object.key() else { continue };
                    // "Directory" placeholder objects created by some web consoles.
                    if key.ends_with('/') {
                        continue;
                    }
                    let path = match self.relative_path(key) {
                        Ok(path) => path,
                        Err(e) => { yield Err(e); continue; },
                    };
                    let modified = match object.last_modified().map(Self::parse_datetime).transpose() {
                        Ok(modified) => modified.unwrap_or(OffsetDateTime::UNIX_EPOCH),
                        Err(e) => { yield Err(e); continue; },
                    };
                    let size = object.size().unwrap_or_default().max(0) as u64;
                    yield Ok(ObjectInfo::new(path, size, modified));
                }
            }
        })
    }

    async fn upload(&self, path: &Path, data: &[u8], content_type: ContentType, mode: WriteMode) -> Result<()> {
        let key = self.full_key(path)?;
        let _permit = self.acquire_permit().await?;
        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .content_type(content_type.mime())
            .body(ByteStream::from(data.to_vec()));
        if mode == WriteMode::CreateNew {
            request = request.if_none_match("*");
        }
        if let Err(e) = request.send().await {
            if e.raw_response().map(|r| r.status().as_u16()) == Some(PRECONDITION_FAILED) {
                exn::bail!(ErrorKind::AlreadyExists(path.to_path_buf()));
            }
            exn::bail!(Self::network(e));
        }
        tracing::debug!(backend = %self.name, %key, size = data.len(), %content_type, "stored object");
        Ok(())
    }

    async fn public_url(&self, path: &Path) -> Result<String> {
        Ok(join_url(&self.public_url, &self.full_key(path)?))
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        // DeleteObject succeeds for missing keys; keep NotFound consistent
        // with the other backends.
        if !self.exists(path).await? {
            exn::bail!(ErrorKind::NotFound(path.to_path_buf()));
        }
        let key = self.full_key(path)?;
        let _permit = self.acquire_permit().await?;
        self.client.delete_object().bucket(&self.bucket).key(&key).send().await.map_err(Self::network)?;
        Ok(())
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    async fn backend(prefix: Option<&str>, public_url: Option<&str>) -> S3Backend {
        S3Backend::new(
            "test",
            "user-images",
            prefix.map(str::to_string),
            "eu-west-2",
            None::<String>,
            public_url.map(str::to_string),
            "key",
            "secret",
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_full_key() {
        let plain = backend(None, None).await;
        assert_eq!(plain.full_key(Path::new("user-1/meme.png")).unwrap(), "user-1/meme.png");
        let prefixed = backend(Some("memes/"), None).await;
        assert_eq!(prefixed.full_key(Path::new("user-1/meme.png")).unwrap(), "memes/user-1/meme.png");
        assert!(prefixed.full_key(Path::new("../escape")).is_err());
    }

    #[tokio::test]
    async fn test_relative_path() {
        let prefixed = backend(Some("memes"), None).await;
        assert_eq!(prefixed.relative_path("memes/user-1/meme.png").unwrap(), Path::new("user-1/meme.png"));
        let plain = backend(None, None).await;
        assert_eq!(plain.relative_path("user-1/meme.png").unwrap(), Path::new("user-1/meme.png"));
    }

    #[tokio::test]
    async fn test_list_prefix_matches_whole_components() {
        let prefixed = backend(Some("memes"), None).await;
        assert_eq!(prefixed.list_prefix(Some(Path::new("user-1"))).unwrap().as_deref(), Some("memes/user-1/"));
        assert_eq!(prefixed.list_prefix(None).unwrap().as_deref(), Some("memes/"));
        let plain = backend(None, None).await;
        assert_eq!(plain.list_prefix(None).unwrap(), None);
    }

    #[tokio::test]
    async fn test_public_url() {
        let default = backend(None, None).await;
        assert_eq!(
            default.public_url(Path::new("user-1/meme.png")).await.unwrap(),
            "https://user-images.s3.eu-west-2.amazonaws.com/user-1/meme.png"
        );
        let cdn = backend(Some("memes"), Some("https://cdn.example.com/")).await;
        assert_eq!(
            cdn.public_url(Path::new("user-1/meme.png")).await.unwrap(),
            "https://cdn.example.com/memes/user-1/meme.png"
        );
    }
}
