//! Uploads the Parquet artifact under a date-partitioned key.

use chrono::{NaiveDateTime, Timelike};
use std::collections::BTreeMap;
use tracing::{error, info, instrument};

use crate::config::{EtlConfig, EXTENSION, TIME_FORMAT};
use crate::converter::{kb, Artifact, CODEC_NAME, FORMAT_NAME};
use crate::error::{EtlError, Result};
use crate::store::{ObjectHead, ObjectStore, PutObject};

pub const CONTENT_TYPE: &str = "application/octet-stream";
pub const STORAGE_CLASS: &str = "STANDARD";

/// Where the artifact landed and what the store reported back.
#[derive(Debug, Clone)]
pub struct Publication {
    pub key: String,
    pub head: ObjectHead,
}

/// `<root>/<entity>/year=YYYY/month=MM/day=DD/<entity>_YYYYMMDD_HHMMSS.parquet`
pub fn partitioned_key(config: &EtlConfig, now: NaiveDateTime) -> String {
    format!(
        "{}year={}/month={}/day={}/{}_{}{}",
        config.entity_prefix(),
        now.format("%Y"),
        now.format("%m"),
        now.format("%d"),
        config.entity,
        now.format(TIME_FORMAT),
        EXTENSION
    )
}

/// User metadata attached to every published object.
pub fn object_metadata(source_tag: &str, records: usize, now: NaiveDateTime) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("source".to_string(), source_tag.to_string()),
        ("records".to_string(), records.to_string()),
        ("ingestion_date".to_string(), iso_timestamp(now)),
        ("format".to_string(), FORMAT_NAME.to_string()),
        ("compression".to_string(), CODEC_NAME.to_string()),
    ])
}

/// ISO-8601 with microseconds; the fraction is left out when it is zero.
pub fn iso_timestamp(now: NaiveDateTime) -> String {
    if now.nanosecond() / 1_000 == 0 {
        now.format("%Y-%m-%dT%H:%M:%S").to_string()
    } else {
        now.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
    }
}

#[instrument(skip(store, config, artifact), fields(records = artifact.records))]
pub async fn publish(
    store: &dyn ObjectStore,
    config: &EtlConfig,
    artifact: &Artifact,
    source_tag: &str,
    now: NaiveDateTime,
) -> Result<Publication> {
    let key = partitioned_key(config, now);
    info!("Uploading to s3://{}/{}", config.bucket, key);

    let failed = |stage: &str, e: anyhow::Error| {
        error!(error = %format!("{e:#}"), "{} failed", stage);
        EtlError::PublishFailed {
            key: key.clone(),
            reason: format!("{e:#}"),
        }
    };

    let object = PutObject {
        body: artifact.bytes.clone(),
        content_type: CONTENT_TYPE.to_string(),
        storage_class: STORAGE_CLASS.to_string(),
        metadata: object_metadata(source_tag, artifact.records, now),
    };
    store
        .put(&config.bucket, &key, object)
        .await
        .map_err(|e| failed("Upload", e))?;
    info!("File uploaded");

    let head = store
        .head(&config.bucket, &key)
        .await
        .map_err(|e| failed("Verification", e))?;
    info!(
        size_kb = %format!("{:.2}", kb(head.content_length.max(0) as usize)),
        storage_class = head.storage_class.as_deref().unwrap_or(STORAGE_CLASS),
        etag = head.e_tag.as_deref().unwrap_or("-"),
        "Verified"
    );

    Ok(Publication { key, head })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::convert;
    use crate::store::MemoryStore;
    use chrono::NaiveDate;

    fn at(y: i32, m: u32, d: u32, hh: u32, mm: u32, ss: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(hh, mm, ss)
            .unwrap()
    }

    #[test]
    fn key_is_partitioned_by_day() {
        let key = partitioned_key(&EtlConfig::default(), at(2024, 3, 5, 7, 8, 9));
        assert_eq!(
            key,
            "raw/alumnos/year=2024/month=03/day=05/alumnos_20240305_070809.parquet"
        );
    }

    #[test]
    fn keys_differ_across_seconds() {
        let config = EtlConfig::default();
        assert_ne!(
            partitioned_key(&config, at(2024, 12, 31, 23, 59, 58)),
            partitioned_key(&config, at(2024, 12, 31, 23, 59, 59))
        );
    }

    #[test]
    fn metadata_carries_fixed_set() {
        let meta = object_metadata("downloads", 42, at(2024, 1, 2, 3, 4, 5));
        assert_eq!(meta["source"], "downloads");
        assert_eq!(meta["records"], "42");
        assert_eq!(meta["ingestion_date"], "2024-01-02T03:04:05");
        assert_eq!(meta["format"], "parquet");
        assert_eq!(meta["compression"], "snappy");
        assert_eq!(meta.len(), 5);
    }

    #[test]
    fn iso_timestamp_keeps_nonzero_microseconds() {
        let with_micros = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_micro_opt(3, 4, 5, 120)
            .unwrap();
        assert_eq!(iso_timestamp(with_micros), "2024-01-02T03:04:05.000120");
        assert_eq!(iso_timestamp(at(2024, 1, 2, 3, 4, 5)), "2024-01-02T03:04:05");
    }

    #[tokio::test]
    async fn publishes_and_reads_back() {
        let store = MemoryStore::new();
        let config = EtlConfig::default();
        let artifact = convert(b"id,name\n1,Ana\n2,Luis\n").unwrap();

        let publication = publish(&store, &config, &artifact, "downloads", at(2025, 6, 1, 12, 0, 0))
            .await
            .unwrap();

        assert_eq!(publication.head.content_length, artifact.size() as i64);
        assert_eq!(publication.head.metadata["records"], "2");
        let stored = store.object(&config.bucket, &publication.key).unwrap();
        assert_eq!(stored.content_type, "application/octet-stream");
        assert_eq!(stored.storage_class, "STANDARD");
    }
}
