// Configuration for the ETL run //

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{EtlError, Result};

pub const DEFAULT_BUCKET: &str = "etl-aws-sanmiguel";
pub const DEFAULT_REGION: &str = "us-east-2";
pub const DEFAULT_ENTITY: &str = "alumnos";
pub const DEFAULT_OUTPUT_ROOT: &str = "raw";
pub const DEFAULT_SOURCE_KEY: &str = "uploads/alumnos.csv";
pub const RETENTION_DAYS: i64 = 7;
pub const EXTENSION: &str = ".parquet";
pub const TIME_FORMAT: &str = "%Y%m%d_%H%M%S";

pub const LOCAL_SOURCE_TAG: &str = "downloads";
pub const REMOTE_SOURCE_TAG: &str = "lambda_etl";

/// Everything a run needs, handed to each stage explicitly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EtlConfig {
    /// Destination bucket.
    pub bucket: String,
    pub region: String,
    /// Custom endpoint for S3-compatible stores (MinIO, LocalStack).
    pub endpoint: Option<String>,
    pub force_path_style: bool,
    /// Dataset name used in the key prefix and file name.
    pub entity: String,
    /// First key segment, `raw` in `raw/<entity>/year=...`.
    pub output_root: String,
    pub source_bucket: String,
    pub source_key: String,
    pub local_source: PathBuf,
    /// Value of the `source` metadata entry. Falls back to the per-variant tag.
    pub source_tag: Option<String>,
    pub retention_days: i64,
    pub sweep: bool,
    /// Follow continuation tokens while listing for the sweep.
    pub paginate_listing: bool,
}

impl Default for EtlConfig {
    fn default() -> Self {
        Self {
            bucket: DEFAULT_BUCKET.to_string(),
            region: DEFAULT_REGION.to_string(),
            endpoint: None,
            force_path_style: false,
            entity: DEFAULT_ENTITY.to_string(),
            output_root: DEFAULT_OUTPUT_ROOT.to_string(),
            source_bucket: DEFAULT_BUCKET.to_string(),
            source_key: DEFAULT_SOURCE_KEY.to_string(),
            local_source: default_local_source(DEFAULT_ENTITY),
            source_tag: None,
            retention_days: RETENTION_DAYS,
            sweep: true,
            paginate_listing: false,
        }
    }
}

impl EtlConfig {
    /// `raw/<entity>/`, the prefix every published key and the sweep share.
    pub fn entity_prefix(&self) -> String {
        format!("{}/{}/", self.output_root.trim_end_matches('/'), self.entity)
    }

    pub fn validate(&self) -> Result<()> {
        if self.bucket.trim().is_empty() {
            return Err(EtlError::Config("bucket must not be empty".into()));
        }
        if self.source_bucket.trim().is_empty() {
            return Err(EtlError::Config("source bucket must not be empty".into()));
        }
        if self.entity.is_empty() || self.entity.contains('/') {
            return Err(EtlError::Config(format!(
                "entity must be a single non-empty path segment, got {:?}",
                self.entity
            )));
        }
        if self.retention_days < 0 {
            return Err(EtlError::Config(format!(
                "retention days must not be negative, got {}",
                self.retention_days
            )));
        }
        Ok(())
    }
}

/// `<download dir>/<entity>.csv`, falling back to `~/Downloads` and then the
/// working directory.
pub fn default_local_source(entity: &str) -> PathBuf {
    let dir = dirs::download_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join("Downloads")))
        .unwrap_or_else(|| PathBuf::from("."));
    dir.join(format!("{entity}.csv"))
}
