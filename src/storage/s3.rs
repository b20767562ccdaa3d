//! AWS S3 implementation of the object storage gateway.
//!
//! The pipeline is synchronous end to end, so the gateway owns a
//! current-thread tokio runtime and blocks on each SDK call.

use std::collections::HashMap;
use std::io::{self, Read};
use std::path::Path;

use aws_config::BehaviorVersion;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tokio::runtime::Runtime;

use super::{ObjectStorage, StorageError, UploadOutcome, STATUS_OK};
use crate::job::TransferMetadata;

/// Object storage gateway backed by the AWS SDK.
pub struct S3Gateway {
    client: Client,
    runtime: Runtime,
}

impl S3Gateway {
    /// Build a gateway using the default credential/region chain.
    pub fn connect() -> Result<Self, StorageError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(StorageError::Io)?;

        let sdk_config =
            runtime.block_on(aws_config::defaults(BehaviorVersion::latest()).load());
        let client = Client::new(&sdk_config);

        Ok(Self { client, runtime })
    }

    /// Build a gateway from a pre-configured client (tests against
    /// S3-compatible endpoints).
    pub fn from_client(client: Client) -> Result<Self, StorageError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(StorageError::Io)?;
        Ok(Self { client, runtime })
    }

    fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: ByteStream,
        metadata: &TransferMetadata,
    ) -> Result<UploadOutcome, StorageError> {
        let meta: HashMap<String, String> = metadata
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        let request = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .set_metadata(Some(meta))
            .body(body);

        match self.runtime.block_on(request.send()) {
            Ok(_) => Ok(UploadOutcome {
                status_code: STATUS_OK,
            }),
            // The provider answered but rejected the object: surface the
            // status code and let the caller decide.
            Err(SdkError::ServiceError(context)) => Ok(UploadOutcome {
                status_code: context.raw().status().as_u16(),
            }),
            Err(err) => Err(StorageError::Transport(err.to_string())),
        }
    }
}

impl ObjectStorage for S3Gateway {
    fn bucket_exists(&self, bucket: &str) -> Result<bool, StorageError> {
        let request = self.client.head_bucket().bucket(bucket);

        match self.runtime.block_on(request.send()) {
            Ok(_) => Ok(true),
            Err(err) => {
                let service_err = err.into_service_error();
                if service_err.is_not_found() {
                    Ok(false)
                } else {
                    Err(StorageError::Transport(service_err.to_string()))
                }
            }
        }
    }

    fn upload_file(
        &self,
        bucket: &str,
        key: &str,
        source: &Path,
        metadata: &TransferMetadata,
    ) -> Result<UploadOutcome, StorageError> {
        let body = self
            .runtime
            .block_on(ByteStream::from_path(source))
            .map_err(|e| StorageError::Transport(e.to_string()))?;

        self.put_object(bucket, key, body, metadata)
    }

    fn upload_reader(
        &self,
        bucket: &str,
        key: &str,
        reader: Box<dyn Read + Send>,
        metadata: &TransferMetadata,
    ) -> Result<UploadOutcome, StorageError> {
        // Archives can run to many gigabytes, so the reader is spooled
        // to disk rather than memory. The spool file is removed on every
        // exit path when the guard drops.
        let spool = spool_to_temp(reader)?;
        let body = self
            .runtime
            .block_on(ByteStream::from_path(spool.path()))
            .map_err(|e| StorageError::Transport(e.to_string()))?;

        self.put_object(bucket, key, body, metadata)
    }
}

/// Drain a reader into a self-deleting temp file.
fn spool_to_temp(mut reader: Box<dyn Read + Send>) -> Result<tempfile::NamedTempFile, StorageError> {
    let mut spool = tempfile::NamedTempFile::new()?;
    io::copy(&mut reader, &mut spool)?;
    Ok(spool)
}
