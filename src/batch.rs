//! Per-device directory enrichment through the Graph `$batch` endpoint.
//!
//! For every reported device one `$batch` call bundles two GETs against the
//! owning user:
//!
//! - id `"1"`: `users/{upn}` projected to alias, job title and department.
//! - id `"2"`: `users/{upn}/ownedDevices` projected to the fields needed to
//!   pick out the user's other recently active Windows devices.
//!
//! Enrichment never fails the report. A failed batch call (or a device
//! without an owner) yields [`Enrichment::Unavailable`]; a failed
//! sub-request leaves only its half of the [`BatchResponseSet`] empty.
//!
//! Reference: <https://learn.microsoft.com/en-us/graph/json-batching>

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

use crate::client::GraphClient;
use crate::devices::RawDeviceRecord;
use crate::paging::ODataPage;

/// Sub-request id of the user profile lookup.
pub const PROFILE_REQUEST_ID: &str = "1";
/// Sub-request id of the owned-devices lookup.
pub const OWNED_DEVICES_REQUEST_ID: &str = "2";

/// `operatingSystem` value Entra ID records for Windows devices.
pub const WINDOWS_OS: &str = "Windows";

/// Default look-back for "recently active" sibling devices.
pub const DEFAULT_ACTIVITY_WINDOW_DAYS: i64 = 7;

// ── Request types ──────────────────────────────────────────────────────

/// Body of `POST $batch`.
#[derive(Debug, Serialize)]
pub struct BatchRequest {
    /// Sub-requests, resolved independently by Graph.
    pub requests: Vec<BatchSubRequest>,
}

/// One addressed sub-operation inside a batch.
#[derive(Debug, Serialize)]
pub struct BatchSubRequest {
    /// Correlates the sub-response with this request.
    pub id: String,
    /// HTTP verb; always `GET` here.
    pub method: String,
    /// URL relative to the Graph version root, without a leading slash.
    pub url: String,
}

/// Builds the two-part lookup for the user identified by `email`.
///
/// The UPN is percent-encoded as a path segment; guest accounts carry
/// `#EXT#`, which would otherwise end the path at the fragment marker.
pub fn build_batch_request(email: &str) -> BatchRequest {
    let user = urlencoding::encode(email);
    BatchRequest {
        requests: vec![
            BatchSubRequest {
                id: PROFILE_REQUEST_ID.to_string(),
                method: "GET".to_string(),
                url: format!(
                    "users/{user}?select=onPremisesSamAccountName,jobTitle,department"
                ),
            },
            BatchSubRequest {
                id: OWNED_DEVICES_REQUEST_ID.to_string(),
                method: "GET".to_string(),
                url: format!(
                    "users/{user}/ownedDevices?select=displayName,operatingSystem,\
                     isCompliant,accountEnabled,approximateLastSignInDateTime"
                ),
            },
        ],
    }
}

// ── Response types ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct BatchResponse {
    #[serde(default)]
    responses: Vec<BatchSubResponse>,
}

#[derive(Debug, Deserialize)]
struct BatchSubResponse {
    id: String,
    status: u16,
    #[serde(default)]
    body: Option<serde_json::Value>,
}

/// Directory attributes of the owning user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    /// On-premises `sAMAccountName`; absent for cloud-only accounts.
    #[serde(default)]
    pub on_premises_sam_account_name: Option<String>,
    /// Job title from the directory.
    #[serde(default)]
    pub job_title: Option<String>,
    /// Department from the directory.
    #[serde(default)]
    pub department: Option<String>,
}

/// An entry of the user's `ownedDevices` collection.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnedDevice {
    /// Device display name, compared against the reported device's name.
    #[serde(default)]
    pub display_name: Option<String>,
    /// OS family, e.g. `"Windows"` or `"iOS"`.
    #[serde(default)]
    pub operating_system: Option<String>,
    /// Compliance as last reported to Entra ID.
    #[serde(default)]
    pub is_compliant: Option<bool>,
    /// `false` for disabled device objects.
    #[serde(default)]
    pub account_enabled: Option<bool>,
    /// RFC 3339 timestamp of the last sign-in, accurate to about two weeks.
    #[serde(default)]
    pub approximate_last_sign_in_date_time: Option<String>,
}

/// A sibling device that passed the activity filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveSibling {
    /// Display name of the sibling device.
    pub name: String,
    /// `isCompliant`, with absent read as `false`.
    pub compliant: bool,
    /// Last sign-in timestamp as Graph returned it.
    pub last_sign_in: String,
}

impl ActiveSibling {
    /// `"Compliant"` or `"NotCompliant"`.
    pub fn compliance_label(&self) -> &'static str {
        if self.compliant {
            "Compliant"
        } else {
            "NotCompliant"
        }
    }
}

impl fmt::Display for ActiveSibling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}, {})",
            self.name,
            self.compliance_label(),
            self.last_sign_in
        )
    }
}

/// Parsed result of a successful batch call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchResponseSet {
    /// `None` when the profile sub-request failed or returned no body.
    pub profile: Option<UserProfile>,
    /// Qualifying siblings in the order Graph listed them.
    pub active_siblings: Vec<ActiveSibling>,
}

impl BatchResponseSet {
    /// Siblings joined with `"; "`, or `None` if there are none.
    pub fn other_active_devices(&self) -> Option<String> {
        if self.active_siblings.is_empty() {
            return None;
        }
        Some(
            self.active_siblings
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

/// Outcome of enriching one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Enrichment {
    /// The batch call succeeded; individual parts may still be empty.
    Resolved(BatchResponseSet),
    /// No directory data: the batch call failed or the device has no owner.
    Unavailable,
}

impl Enrichment {
    /// The owner's directory profile, if one was resolved.
    pub fn profile(&self) -> Option<&UserProfile> {
        match self {
            Enrichment::Resolved(set) => set.profile.as_ref(),
            Enrichment::Unavailable => None,
        }
    }

    /// The sibling summary, if any sibling qualified.
    pub fn other_active_devices(&self) -> Option<String> {
        match self {
            Enrichment::Resolved(set) => set.other_active_devices(),
            Enrichment::Unavailable => None,
        }
    }
}

// ── Sibling filter ─────────────────────────────────────────────────────

/// Picks the owned devices that count as "other active Windows devices".
///
/// An entry qualifies when its OS is exactly [`WINDOWS_OS`], its last
/// sign-in falls within `window` before `now`, its display name differs
/// from `current_device`, and its account is enabled. Entries missing any
/// of those fields, or with an unparseable timestamp, do not qualify.
/// A window reaching past the earliest representable time has no cutoff.
pub fn active_siblings(
    devices: &[OwnedDevice],
    current_device: Option<&str>,
    now: DateTime<Utc>,
    window: Duration,
) -> Vec<ActiveSibling> {
    let cutoff = now.checked_sub_signed(window);
    devices
        .iter()
        .filter_map(|device| {
            let name = device.display_name.as_deref()?;
            if device.operating_system.as_deref() != Some(WINDOWS_OS)
                || current_device == Some(name)
                || device.account_enabled != Some(true)
            {
                return None;
            }
            let raw_sign_in = device.approximate_last_sign_in_date_time.as_deref()?;
            let signed_in = DateTime::parse_from_rfc3339(raw_sign_in).ok()?;
            if cutoff.is_some_and(|cutoff| signed_in.with_timezone(&Utc) < cutoff) {
                return None;
            }
            Some(ActiveSibling {
                name: name.to_string(),
                compliant: device.is_compliant.unwrap_or(false),
                last_sign_in: raw_sign_in.to_string(),
            })
        })
        .collect()
}

// ── Enrichment ─────────────────────────────────────────────────────────

/// Enriches `record` relative to the current wall clock.
///
/// See [`enrich_device_at`].
pub async fn enrich_device(
    client: &GraphClient,
    record: &RawDeviceRecord,
    window: Duration,
) -> Enrichment {
    enrich_device_at(client, record, window, Utc::now()).await
}

/// Enriches `record` with its owner's profile and active sibling devices,
/// judging sibling activity against `now`.
///
/// Never fails: any error from the batch call is logged at `warn` and
/// reported as [`Enrichment::Unavailable`].
pub async fn enrich_device_at(
    client: &GraphClient,
    record: &RawDeviceRecord,
    window: Duration,
    now: DateTime<Utc>,
) -> Enrichment {
    let Some(email) = record.owner_email() else {
        debug!(device = %record.id, "no owning user, skipping enrichment");
        return Enrichment::Unavailable;
    };

    match fetch_batch(client, email).await {
        Ok(response) => Enrichment::Resolved(parse_batch_response(
            response,
            record.device_name.as_deref(),
            now,
            window,
        )),
        Err(e) => {
            warn!(
                device = record.device_name.as_deref().unwrap_or(&record.id),
                user = email,
                error = %e,
                "enrichment failed, continuing without directory data"
            );
            Enrichment::Unavailable
        }
    }
}

async fn fetch_batch(client: &GraphClient, email: &str) -> crate::error::Result<BatchResponse> {
    client.post("$batch", &build_batch_request(email)).await
}

/// Splits a batch response into its two parts, matching by id since Graph
/// may answer sub-requests in any order.
fn parse_batch_response(
    response: BatchResponse,
    current_device: Option<&str>,
    now: DateTime<Utc>,
    window: Duration,
) -> BatchResponseSet {
    let mut set = BatchResponseSet::default();
    for part in response.responses {
        if !(200..300).contains(&part.status) {
            debug!(id = %part.id, status = part.status, "batch sub-request failed");
            continue;
        }
        let Some(body) = part.body else { continue };
        match part.id.as_str() {
            PROFILE_REQUEST_ID => match serde_json::from_value::<UserProfile>(body) {
                Ok(profile) => set.profile = Some(profile),
                Err(e) => warn!(error = %e, "unreadable user profile in batch response"),
            },
            OWNED_DEVICES_REQUEST_ID => {
                match serde_json::from_value::<ODataPage<OwnedDevice>>(body) {
                    Ok(page) => {
                        set.active_siblings =
                            active_siblings(&page.value, current_device, now, window);
                    }
                    Err(e) => warn!(error = %e, "unreadable owned devices in batch response"),
                }
            }
            other => debug!(id = other, "ignoring unexpected batch sub-response"),
        }
    }
    set
}
