//! On-demand entry point: fetch the fixed source key, run the pipeline and
//! answer with a structured status/body result.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::config::{EtlConfig, REMOTE_SOURCE_TAG};
use crate::locator::Source;
use crate::pipeline::run;
use crate::publisher::iso_timestamp;
use crate::store::ObjectStore;

pub const SUCCESS_MESSAGE: &str = "ETL completed successfully";
pub const FAILURE_MESSAGE: &str = "ETL failed";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationResponse {
    pub status_code: u16,
    pub body: InvocationBody,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationBody {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub records_processed: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s3_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: String,
}

impl InvocationResponse {
    pub fn is_success(&self) -> bool {
        self.status_code == 200
    }
}

/// Handles one invocation. The event payload is only logged.
pub async fn handle(
    store: &dyn ObjectStore,
    config: &EtlConfig,
    event: &serde_json::Value,
    now: DateTime<Utc>,
) -> InvocationResponse {
    info!(timestamp = %iso_timestamp(now.naive_utc()), event = %event, "Starting ETL");

    let config = EtlConfig {
        source_tag: Some(
            config
                .source_tag
                .clone()
                .unwrap_or_else(|| REMOTE_SOURCE_TAG.to_string()),
        ),
        ..config.clone()
    };
    let source = Source::Remote {
        bucket: config.source_bucket.clone(),
        key: config.source_key.clone(),
    };

    match run(store, &config, &source, now).await {
        Ok(summary) => InvocationResponse {
            status_code: 200,
            body: InvocationBody {
                message: SUCCESS_MESSAGE.to_string(),
                records_processed: Some(summary.records),
                s3_key: Some(summary.key),
                error: None,
                timestamp: iso_timestamp(now.naive_utc()),
            },
        },
        Err(e) => {
            error!(error = %e, "ETL failed");
            InvocationResponse {
                status_code: 500,
                body: InvocationBody {
                    message: FAILURE_MESSAGE.to_string(),
                    records_processed: None,
                    s3_key: None,
                    error: Some(e.to_string()),
                    timestamp: iso_timestamp(Utc::now().naive_utc()),
                },
            }
        }
    }
}
