use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::{config::Region, primitives::ByteStream, types::StorageClass, Client};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tracing::{debug, instrument};

use crate::config::EtlConfig;
use crate::store::{ListPage, ObjectHead, ObjectStore, ObjectSummary, PutObject};

/// Builds a client for the configured region, honouring a custom endpoint.
/// Credentials come from the default provider chain.
pub async fn make_s3_client(config: &EtlConfig) -> Client {
    let sdk_config = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(config.region.clone()))
        .load()
        .await;

    let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config)
        .force_path_style(config.force_path_style);
    if let Some(endpoint) = &config.endpoint {
        builder = builder.endpoint_url(endpoint);
    }

    Client::from_conf(builder.build())
}

#[derive(Clone)]
pub struct S3Store {
    client: Client,
}

impl S3Store {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    #[instrument(skip(self))]
    async fn get(&self, bucket: &str, key: &str) -> Result<Bytes> {
        let resp = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("Failed to get s3://{}/{}", bucket, key))?;

        let collected = resp
            .body
            .collect()
            .await
            .context("Failed to read S3 response body")?;
        Ok(collected.into_bytes())
    }

    #[instrument(skip(self, object), fields(size = object.body.len()))]
    async fn put(&self, bucket: &str, key: &str, object: PutObject) -> Result<()> {
        let mut request = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(object.body))
            .content_type(object.content_type)
            .storage_class(StorageClass::from(object.storage_class.as_str()));

        for (name, value) in object.metadata {
            request = request.metadata(name, value);
        }

        request
            .send()
            .await
            .with_context(|| format!("Failed to put s3://{}/{}", bucket, key))?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn head(&self, bucket: &str, key: &str) -> Result<ObjectHead> {
        let resp = self
            .client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("Failed to head s3://{}/{}", bucket, key))?;

        Ok(ObjectHead {
            content_length: resp.content_length().unwrap_or_default(),
            storage_class: resp.storage_class().map(|class| class.as_str().to_string()),
            e_tag: resp.e_tag().map(str::to_string),
            metadata: resp.metadata().cloned().unwrap_or_default(),
        })
    }

    #[instrument(skip(self))]
    async fn list(&self, bucket: &str, prefix: &str, token: Option<String>) -> Result<ListPage> {
        let resp = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .prefix(prefix)
            .set_continuation_token(token)
            .send()
            .await
            .with_context(|| format!("Failed to list s3://{}/{}", bucket, prefix))?;

        let objects = resp
            .contents()
            .iter()
            .filter_map(|obj| {
                let key = obj.key()?;
                let modified = obj.last_modified()?;
                let last_modified = DateTime::<Utc>::from_timestamp(modified.secs(), modified.subsec_nanos())?;
                Some(ObjectSummary {
                    key: key.to_string(),
                    last_modified,
                    size: obj.size().unwrap_or_default(),
                })
            })
            .collect::<Vec<_>>();

        let next_token = if resp.is_truncated().unwrap_or(false) {
            resp.next_continuation_token().map(str::to_string)
        } else {
            None
        };
        debug!(count = objects.len(), truncated = next_token.is_some(), "Listed objects");

        Ok(ListPage { objects, next_token })
    }

    #[instrument(skip(self))]
    async fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("Failed to delete s3://{}/{}", bucket, key))?;
        Ok(())
    }
}
