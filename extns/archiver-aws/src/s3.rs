//! [ObjectStore] backed by S3. One archive is one `PutObject`.

use archiver_core::store::{ArchiveObject, ObjectStore};
use aws_config::SdkConfig;
use aws_config::retry::RetryConfig;
use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;
use tracing::debug;

use crate::{Error, extract_aws_error};

#[derive(Clone, Debug)]
pub struct S3ObjectStore {
    client: Client,
}

impl S3ObjectStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Builds the client with SDK retries turned off, the archive writer retries whole puts on
    /// its own.
    pub fn from_sdk_config(sdk_config: &SdkConfig) -> Self {
        let config = aws_sdk_s3::config::Builder::from(sdk_config)
            .retry_config(RetryConfig::disabled())
            .build();
        Self::new(Client::from_conf(config))
    }
}

impl ObjectStore for S3ObjectStore {
    async fn put_object(&self, object: ArchiveObject) -> archiver_core::Result<()> {
        let size = object.body.len();

        self.client
            .put_object()
            .bucket(&object.bucket)
            .key(&object.key)
            .body(ByteStream::from(object.body))
            .content_type(object.content_type)
            .content_encoding(object.content_encoding)
            .set_metadata(Some(object.metadata))
            .send()
            .await
            .map_err(|e| {
                Error::S3(format!(
                    "Failed to put s3://{}/{}: {}",
                    object.bucket,
                    object.key,
                    extract_aws_error(&e)
                ))
            })?;

        debug!(bucket = %object.bucket, key = %object.key, size, "Object written to S3");
        Ok(())
    }
}
