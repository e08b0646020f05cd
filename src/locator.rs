//! Finds the source dataset on disk or in object storage.

use bytes::Bytes;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{error, info, instrument};

use crate::converter::kb;
use crate::error::{EtlError, Result};
use crate::store::ObjectStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Local(PathBuf),
    Remote { bucket: String, key: String },
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Local(path) => write!(f, "{}", path.display()),
            Source::Remote { bucket, key } => write!(f, "s3://{}/{}", bucket, key),
        }
    }
}

/// Raw bytes of the located dataset.
#[derive(Debug, Clone)]
pub struct SourceData {
    pub origin: String,
    pub bytes: Bytes,
}

#[instrument(skip(store, source), fields(source = %source))]
pub async fn locate(store: &dyn ObjectStore, source: &Source) -> Result<SourceData> {
    match source {
        Source::Local(path) => locate_local(path).await,
        Source::Remote { bucket, key } => {
            info!("Downloading {} from object storage", key);
            let bytes = store.get(bucket, key).await.map_err(|e| {
                error!(error = %format!("{e:#}"), "Source object unavailable");
                EtlError::SourceNotFound {
                    origin: source.to_string(),
                    reason: format!("{e:#}"),
                }
            })?;
            info!(bytes = bytes.len(), "CSV downloaded");
            Ok(SourceData {
                origin: source.to_string(),
                bytes,
            })
        }
    }
}

async fn locate_local(path: &Path) -> Result<SourceData> {
    let origin = path.display().to_string();
    info!("Looking for file at {}", origin);

    let not_found = |reason: String| {
        error!(path = %origin, "File not found, check that it is in the download directory");
        EtlError::SourceNotFound {
            origin: origin.clone(),
            reason,
        }
    };

    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|e| not_found(e.to_string()))?;
    if !metadata.is_file() {
        return Err(not_found("not a regular file".into()));
    }
    info!(size_kb = %format!("{:.2}", kb(metadata.len() as usize)), "File found: {}", origin);

    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| not_found(e.to_string()))?;
    Ok(SourceData {
        origin,
        bytes: Bytes::from(bytes),
    })
}
