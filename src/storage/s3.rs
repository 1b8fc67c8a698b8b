//! S3 object client
//!
//! Blocking `ObjectClient` over the AWS SDK. The engine is synchronous, so
//! the client owns a small tokio runtime and drives each request to
//! completion on it. Credentials and region come from the standard AWS
//! environment chain.

use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use bytes::Bytes;
use tokio::runtime::Runtime;

use crate::config::ObjectStoreConfig;
use crate::error::{PageKvError, Result};

use super::object::ObjectClient;

pub struct S3ObjectClient {
    runtime: Runtime,
    client: Client,
    bucket: String,
}

impl std::fmt::Debug for S3ObjectClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3ObjectClient")
            .field("bucket", &self.bucket)
            .finish()
    }
}

impl S3ObjectClient {
    /// Build a client from the ambient AWS configuration
    pub fn connect(config: &ObjectStoreConfig) -> Result<Self> {
        if config.bucket.is_empty() {
            return Err(PageKvError::Config("S3 bucket is not set".to_string()));
        }
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .map_err(|e| PageKvError::Config(format!("failed to start S3 runtime: {}", e)))?;

        let sdk_config =
            runtime.block_on(aws_config::load_defaults(aws_config::BehaviorVersion::latest()));
        if sdk_config.region().is_none() {
            return Err(PageKvError::Config("missing AWS region".to_string()));
        }

        let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config);
        if let Some(endpoint) = &config.endpoint {
            // MinIO and LocalStack want path-style addressing
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Ok(Self {
            runtime,
            client: Client::from_conf(builder.build()),
            bucket: config.bucket.clone(),
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

impl ObjectClient for S3ObjectClient {
    fn get(&self, key: &str) -> Result<Bytes> {
        self.runtime.block_on(async {
            let response = self
                .client
                .get_object()
                .bucket(&self.bucket)
                .key(key)
                .send()
                .await
                .map_err(|e| map_read_error(e, key))?;
            let data = response
                .body
                .collect()
                .await
                .map_err(|e| PageKvError::read(key, std::io::Error::other(e.to_string())))?;
            Ok(data.into_bytes())
        })
    }

    fn put(&self, key: &str, body: Bytes) -> Result<()> {
        self.runtime.block_on(async {
            self.client
                .put_object()
                .bucket(&self.bucket)
                .key(key)
                .body(ByteStream::from(body))
                .send()
                .await
                .map_err(|e| map_write_error(e, key))?;
            Ok(())
        })
    }

    fn put_if_absent(&self, key: &str, body: Bytes) -> Result<bool> {
        self.runtime.block_on(async {
            let result = self
                .client
                .put_object()
                .bucket(&self.bucket)
                .key(key)
                .body(ByteStream::from(body))
                .if_none_match("*")
                .send()
                .await;
            match result {
                Ok(_) => Ok(true),
                Err(e) if status_of(&e) == Some(412) => Ok(false),
                Err(e) => Err(map_write_error(e, key)),
            }
        })
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.runtime.block_on(async {
            self.client
                .delete_object()
                .bucket(&self.bucket)
                .key(key)
                .send()
                .await
                .map_err(|e| map_write_error(e, key))?;
            Ok(())
        })
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        self.runtime.block_on(async {
            let mut keys = Vec::new();
            let mut continuation_token = None;
            loop {
                let mut request = self
                    .client
                    .list_objects_v2()
                    .bucket(&self.bucket)
                    .prefix(prefix);
                if let Some(token) = continuation_token.take() {
                    request = request.continuation_token(token);
                }
                let response = request.send().await.map_err(|e| map_read_error(e, prefix))?;
                keys.extend(
                    response
                        .contents()
                        .iter()
                        .filter_map(|object| object.key().map(str::to_string)),
                );
                match response.next_continuation_token() {
                    Some(token) => continuation_token = Some(token.to_string()),
                    None => break,
                }
            }
            Ok(keys)
        })
    }
}

fn status_of<E>(err: &SdkError<E>) -> Option<u16> {
    match err {
        SdkError::ServiceError(service_err) => Some(service_err.raw().status().as_u16()),
        _ => None,
    }
}

fn map_read_error<E: std::fmt::Debug>(err: SdkError<E>, key: &str) -> PageKvError {
    if status_of(&err) == Some(404) {
        return PageKvError::not_exist(format!("object '{}'", key));
    }
    PageKvError::read(key, std::io::Error::other(format!("{:?}", err)))
}

fn map_write_error<E: std::fmt::Debug>(err: SdkError<E>, key: &str) -> PageKvError {
    PageKvError::write(key, std::io::Error::other(format!("{:?}", err)))
}
