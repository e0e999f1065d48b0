//! Report assembly: fetch, enrich, normalize, collect.
//!
//! Devices are processed one at a time in the order Graph returned them.
//! Each device produces exactly one row; a failed enrichment only degrades
//! that row's directory columns to sentinels.

use chrono::Duration;
use tracing::{debug, info};

use crate::batch::enrich_device;
use crate::client::GraphClient;
use crate::devices::{RawDeviceRecord, list_noncompliant_devices};
use crate::normalize::{EnrichedReportRow, Normalizer};

/// Options controlling enrichment and normalization.
#[derive(Debug, Clone)]
pub struct ReportOptions {
    /// Sentinel and terminated-user rules.
    pub normalizer: Normalizer,
    /// How far back a sibling's last sign-in may be to count as active.
    pub activity_window: Duration,
}

impl Default for ReportOptions {
    fn default() -> Self {
        ReportOptions {
            normalizer: Normalizer::default(),
            activity_window: Duration::days(crate::batch::DEFAULT_ACTIVITY_WINDOW_DAYS),
        }
    }
}

/// Fetches every reported device and turns each into a report row.
///
/// # Errors
///
/// Only the device listing can fail the report. Enrichment failures are
/// absorbed per device.
pub async fn build_report(
    client: &GraphClient,
    options: &ReportOptions,
) -> crate::error::Result<Vec<EnrichedReportRow>> {
    let records = list_noncompliant_devices(client).await?;
    info!(devices = records.len(), "enriching reported devices");
    Ok(assemble(client, &records, options).await)
}

/// Enriches and normalizes `records` sequentially, preserving their order.
pub async fn assemble(
    client: &GraphClient,
    records: &[RawDeviceRecord],
    options: &ReportOptions,
) -> Vec<EnrichedReportRow> {
    let mut rows = Vec::with_capacity(records.len());
    for (index, record) in records.iter().enumerate() {
        debug!(
            index,
            device = record.device_name.as_deref().unwrap_or(&record.id),
            "processing device"
        );
        let enrichment = enrich_device(client, record, options.activity_window).await;
        rows.push(options.normalizer.normalize(record, &enrichment));
    }
    info!(rows = rows.len(), "report assembled");
    rows
}
