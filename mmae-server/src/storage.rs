//! S3-compatible object store for exported clips (Cloudflare R2 in
//! production).

use aws_sdk_s3::{
    Client,
    config::{BehaviorVersion, Credentials, Region},
    error::DisplayErrorContext,
    primitives::ByteStream,
};
use mmae_core::{ObjectStore, StorageError, storage::public_url};
use tokio::runtime::Handle;
use tracing::{info, instrument};

use crate::config::ResolvedStorage;

pub struct S3ObjectStore {
    client: Client,
    bucket: String,
    public_base: String,
    runtime: Handle,
}

impl S3ObjectStore {
    /// Must be called from within a tokio runtime; uploads are driven on
    /// that runtime from blocking worker threads.
    #[must_use]
    pub fn new(settings: &ResolvedStorage<'_>, runtime: Handle) -> Self {
        let credentials = Credentials::new(
            settings.access_key_id,
            settings.secret_access_key,
            None,
            None,
            "mmae-config",
        );
        let config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(settings.region.to_string()))
            .endpoint_url(settings.endpoint_url)
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        Self {
            client: Client::from_conf(config),
            bucket: settings.bucket_name.to_string(),
            public_base: settings.public_url.to_string(),
            runtime,
        }
    }
}

impl ObjectStore for S3ObjectStore {
    #[instrument(skip(self, bytes), fields(bucket = %self.bucket, size = bytes.len()))]
    fn put(&self, bytes: Vec<u8>, key: &str, content_type: &str) -> Result<String, StorageError> {
        if key.is_empty() || key.starts_with('/') {
            return Err(StorageError::InvalidKey(key.to_string()));
        }

        let request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(bytes))
            .send();
        self.runtime
            .block_on(request)
            .map_err(|error| StorageError::Upload {
                key: key.to_string(),
                message: DisplayErrorContext(&error).to_string(),
            })?;

        let url = public_url(&self.public_base, key);
        info!(%url, "object uploaded");
        Ok(url)
    }
}
