//! Locate → convert → publish → sweep.

use chrono::{DateTime, Utc};
use tracing::{error, info, instrument, warn};

use crate::config::{EtlConfig, LOCAL_SOURCE_TAG};
use crate::converter::convert;
use crate::error::Result;
use crate::locator::{locate, Source};
use crate::publisher::publish;
use crate::retention::{sweep, RetentionPolicy, SweepReport};
use crate::store::ObjectStore;

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub records: usize,
    pub origin: String,
    pub key: String,
    pub compression_ratio: f64,
    /// `None` when the sweep was disabled or failed.
    pub sweep: Option<SweepReport>,
}

impl RunSummary {
    pub fn console_url(&self, bucket: &str) -> String {
        format!(
            "https://s3.console.aws.amazon.com/s3/object/{}?prefix={}",
            bucket, self.key
        )
    }
}

/// Runs every stage in order. Locate, convert and publish failures abort the
/// run; a failed sweep is logged and the run still succeeds.
#[instrument(skip_all, fields(entity = %config.entity))]
pub async fn run(
    store: &dyn ObjectStore,
    config: &EtlConfig,
    source: &Source,
    now: DateTime<Utc>,
) -> Result<RunSummary> {
    config.validate()?;

    let data = locate(store, source).await?;

    let artifact = convert(&data.bytes).inspect_err(|e| error!(error = %e, "Conversion error"))?;

    let source_tag = config.source_tag.as_deref().unwrap_or(LOCAL_SOURCE_TAG);
    let publication = publish(store, config, &artifact, source_tag, now.naive_utc()).await?;

    let sweep_report = if config.sweep {
        let policy = RetentionPolicy {
            bucket: config.bucket.clone(),
            prefix: config.entity_prefix(),
            threshold_days: config.retention_days,
            paginate: config.paginate_listing,
        };
        match sweep(store, &policy, now).await {
            Ok(report) => Some(report),
            Err(e) => {
                warn!(error = %e, "Cleanup skipped for this run");
                None
            }
        }
    } else {
        None
    };

    let summary = RunSummary {
        records: artifact.records,
        origin: data.origin,
        key: publication.key,
        compression_ratio: artifact.compression_ratio(),
        sweep: sweep_report,
    };
    info!(
        records = summary.records,
        origin = %summary.origin,
        destination = %format!("s3://{}/{}", config.bucket, summary.key),
        "ETL completed"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EtlError;
    use crate::store::{ListPage, MemoryStore, ObjectHead, PutObject};
    use anyhow::anyhow;
    use async_trait::async_trait;
    use bytes::Bytes;

    /// Memory store whose listing always fails.
    struct BrokenListing(MemoryStore);

    #[async_trait]
    impl ObjectStore for BrokenListing {
        async fn get(&self, bucket: &str, key: &str) -> anyhow::Result<Bytes> {
            self.0.get(bucket, key).await
        }
        async fn put(&self, bucket: &str, key: &str, object: PutObject) -> anyhow::Result<()> {
            self.0.put(bucket, key, object).await
        }
        async fn head(&self, bucket: &str, key: &str) -> anyhow::Result<ObjectHead> {
            self.0.head(bucket, key).await
        }
        async fn list(&self, _: &str, _: &str, _: Option<String>) -> anyhow::Result<ListPage> {
            Err(anyhow!("AccessDenied"))
        }
        async fn delete(&self, bucket: &str, key: &str) -> anyhow::Result<()> {
            self.0.delete(bucket, key).await
        }
    }

    /// Memory store that rejects uploads, or only the read-back after one.
    struct BrokenPublish {
        inner: MemoryStore,
        fail_put: bool,
    }

    #[async_trait]
    impl ObjectStore for BrokenPublish {
        async fn get(&self, bucket: &str, key: &str) -> anyhow::Result<Bytes> {
            self.inner.get(bucket, key).await
        }
        async fn put(&self, bucket: &str, key: &str, object: PutObject) -> anyhow::Result<()> {
            if self.fail_put {
                return Err(anyhow!("SlowDown"));
            }
            self.inner.put(bucket, key, object).await
        }
        async fn head(&self, _: &str, _: &str) -> anyhow::Result<ObjectHead> {
            Err(anyhow!("Forbidden"))
        }
        async fn list(&self, bucket: &str, prefix: &str, token: Option<String>) -> anyhow::Result<ListPage> {
            self.inner.list(bucket, prefix, token).await
        }
        async fn delete(&self, bucket: &str, key: &str) -> anyhow::Result<()> {
            self.inner.delete(bucket, key).await
        }
    }

    fn remote_config() -> (EtlConfig, Source) {
        let config = EtlConfig::default();
        let source = Source::Remote {
            bucket: config.source_bucket.clone(),
            key: config.source_key.clone(),
        };
        (config, source)
    }

    #[tokio::test]
    async fn failed_sweep_keeps_run_successful() {
        let store = BrokenListing(MemoryStore::new());
        let (config, source) = remote_config();
        store.0.insert(&config.source_bucket, &config.source_key, "id\n1\n", Utc::now());

        let summary = run(&store, &config, &source, Utc::now()).await.unwrap();
        assert_eq!(summary.records, 1);
        assert!(summary.sweep.is_none());

        // Standalone runs keep the standalone tag even for a remote source.
        let stored = store.0.object(&config.bucket, &summary.key).unwrap();
        assert_eq!(stored.metadata["source"], "downloads");
    }

    async fn run_with_broken_publish(fail_put: bool) -> (EtlError, MemoryStore) {
        let store = BrokenPublish {
            inner: MemoryStore::new(),
            fail_put,
        };
        let (config, source) = remote_config();
        let now = Utc::now();
        store.inner.insert(&config.source_bucket, &config.source_key, "id\n1\n", now);
        store
            .inner
            .insert(&config.bucket, "raw/alumnos/stale.parquet", "x", now - chrono::Duration::days(30));

        let err = run(&store, &config, &source, now).await.unwrap_err();
        (err, store.inner)
    }

    #[tokio::test]
    async fn failed_upload_aborts_without_sweep() {
        let (err, store) = run_with_broken_publish(true).await;

        assert!(matches!(err, EtlError::PublishFailed { .. }));
        assert!(err.is_abort());
        assert!(store.deleted().is_empty());
        assert!(store.get("etl-aws-sanmiguel", "raw/alumnos/stale.parquet").await.is_ok());
    }

    #[tokio::test]
    async fn failed_read_back_aborts_without_sweep() {
        let (err, store) = run_with_broken_publish(false).await;

        match &err {
            EtlError::PublishFailed { key, reason } => {
                assert!(key.starts_with("raw/alumnos/year="));
                assert!(reason.contains("Forbidden"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.is_abort());
        assert!(store.deleted().is_empty());
    }

    #[tokio::test]
    async fn invalid_config_aborts_before_any_io() {
        let store = MemoryStore::new();
        let (mut config, source) = remote_config();
        config.bucket.clear();

        let err = run(&store, &config, &source, Utc::now()).await.unwrap_err();
        assert!(matches!(err, EtlError::Config(_)));
    }

    #[test]
    fn console_url_points_at_key() {
        let summary = RunSummary {
            records: 1,
            origin: "x".into(),
            key: "raw/alumnos/a.parquet".into(),
            compression_ratio: 0.0,
            sweep: None,
        };
        assert_eq!(
            summary.console_url("b"),
            "https://s3.console.aws.amazon.com/s3/object/b?prefix=raw/alumnos/a.parquet"
        );
    }
}
