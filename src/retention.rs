//! Retention sweep over published objects.
//!
//! Age is the number of whole days in `now - last_modified`, both in UTC, so
//! an object is deleted only once it is at least `threshold + 1` full days old.
//! Listing reads a single page unless pagination is enabled.

use chrono::{DateTime, Utc};
use tracing::{info, instrument};

use crate::error::{EtlError, Result};
use crate::store::{ObjectStore, ObjectSummary};

#[derive(Debug, Clone)]
pub struct RetentionPolicy {
    pub bucket: String,
    pub prefix: String,
    pub threshold_days: i64,
    pub paginate: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SweepReport {
    pub scanned: usize,
    pub deleted: Vec<String>,
}

pub fn age_in_days(last_modified: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - last_modified).num_days()
}

pub fn is_expired(object: &ObjectSummary, threshold_days: i64, now: DateTime<Utc>) -> bool {
    age_in_days(object.last_modified, now) > threshold_days
}

/// Deletes every listed object older than the threshold, one at a time. The
/// first listing or deletion error stops the sweep.
#[instrument(skip(store, policy), fields(prefix = %policy.prefix))]
pub async fn sweep(store: &dyn ObjectStore, policy: &RetentionPolicy, now: DateTime<Utc>) -> Result<SweepReport> {
    info!("Cleaning up files older than {} days", policy.threshold_days);

    let mut report = SweepReport::default();
    let mut token = None;
    loop {
        let page = store
            .list(&policy.bucket, &policy.prefix, token.take())
            .await
            .map_err(|e| EtlError::RetentionFailed(format!("{e:#}")))?;
        report.scanned += page.objects.len();

        for object in page.objects.iter().filter(|o| is_expired(o, policy.threshold_days, now)) {
            store
                .delete(&policy.bucket, &object.key)
                .await
                .map_err(|e| EtlError::RetentionFailed(format!("{e:#}")))?;
            info!(age_days = age_in_days(object.last_modified, now), "Deleted {}", object.key);
            report.deleted.push(object.key.clone());
        }

        match page.next_token {
            Some(next) if policy.paginate => token = Some(next),
            _ => break,
        }
    }

    if report.scanned == 0 {
        info!("No files to clean up");
    } else if report.deleted.is_empty() {
        info!("No old files");
    } else {
        info!("Deleted {} file(s)", report.deleted.len());
    }
    Ok(report)
}
