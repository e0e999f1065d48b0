//! Non-compliant Windows device listing from Intune.
//!
//! Queries `deviceManagement/managedDevices` for Windows devices whose
//! compliance state is `noncompliant`, `inGracePeriod` or `configManager`
//! (compliance reported through the Configuration Manager co-management
//! channel), projecting only the fields the report consumes.
//!
//! ## Permissions
//!
//! Requires `DeviceManagementManagedDevices.Read.All`.

use serde::Deserialize;

use crate::client::GraphClient;
use crate::paging::fetch_all;

/// Compliance states the report selects for.
pub const REPORTED_STATES: [&str; 3] = ["noncompliant", "inGracePeriod", "configManager"];

/// Fields requested from Graph, in the order they appear on [`RawDeviceRecord`].
pub const SELECTED_FIELDS: [&str; 9] = [
    "id",
    "deviceName",
    "osVersion",
    "userPrincipalName",
    "lastSyncDateTime",
    "complianceState",
    "deviceEnrollmentType",
    "configurationManagerClientHealthState",
    "configurationManagerClientEnabledFeatures",
];

/// Device compliance state as reported by Intune.
///
/// Unrecognized values are kept verbatim in `Other` so the report can
/// show them unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum ComplianceState {
    /// Fails at least one assigned compliance policy.
    Noncompliant,
    /// Non-compliant but still inside the policy's grace period.
    InGracePeriod,
    /// Compliance is evaluated by Configuration Manager, not Intune.
    ConfigManager,
    /// Any other state, kept as sent.
    Other(String),
}

impl From<String> for ComplianceState {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "noncompliant" => ComplianceState::Noncompliant,
            "inGracePeriod" => ComplianceState::InGracePeriod,
            "configManager" => ComplianceState::ConfigManager,
            _ => ComplianceState::Other(raw),
        }
    }
}

impl ComplianceState {
    /// The wire value.
    pub fn as_str(&self) -> &str {
        match self {
            ComplianceState::Noncompliant => "noncompliant",
            ComplianceState::InGracePeriod => "inGracePeriod",
            ComplianceState::ConfigManager => "configManager",
            ComplianceState::Other(raw) => raw,
        }
    }
}

/// `configurationManagerClientHealthState` sub-object.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigManagerHealth {
    /// Last time the ConfigMgr client synced. Graph reports
    /// `0001-01-01T00:00:00Z` for clients that never did.
    #[serde(default)]
    pub last_sync_date_time: Option<String>,
}

/// `configurationManagerClientEnabledFeatures` sub-object: which
/// co-management workloads have been moved to Intune.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigManagerFeatures {
    /// Whether the compliance workload is managed by Intune.
    #[serde(default)]
    pub compliance_policy: Option<bool>,
}

/// One managed device as returned by the compliance query.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawDeviceRecord {
    /// Intune managed device ID.
    pub id: String,

    /// Device host name.
    #[serde(default)]
    pub device_name: Option<String>,

    /// Full OS build string, e.g. `10.0.22631.3296`.
    #[serde(default)]
    pub os_version: Option<String>,

    /// UPN of the primary user; used as the owning-user email.
    #[serde(default)]
    pub user_principal_name: Option<String>,

    /// Last Intune check-in.
    #[serde(default)]
    pub last_sync_date_time: Option<String>,

    /// Compliance state selected by the query.
    #[serde(default)]
    pub compliance_state: Option<ComplianceState>,

    /// e.g. `windowsAzureADJoin`, `windowsCoManagement`.
    #[serde(default)]
    pub device_enrollment_type: Option<String>,

    /// ConfigMgr client health, present on co-managed devices.
    #[serde(default)]
    pub configuration_manager_client_health_state: Option<ConfigManagerHealth>,

    /// Co-management workload assignment.
    #[serde(default)]
    pub configuration_manager_client_enabled_features: Option<ConfigManagerFeatures>,
}

impl RawDeviceRecord {
    /// Owning-user email, with blank strings treated as absent.
    pub fn owner_email(&self) -> Option<&str> {
        self.user_principal_name
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// Builds the `$filter` expression selecting reported Windows devices.
pub fn compliance_filter() -> String {
    let states = REPORTED_STATES
        .iter()
        .map(|s| format!("complianceState eq '{s}'"))
        .collect::<Vec<_>>()
        .join(" or ");
    format!("operatingSystem eq 'Windows' and ({states})")
}

/// Relative path of the compliance query, including filter and projection.
pub fn compliance_query() -> String {
    format!(
        "deviceManagement/managedDevices?$filter={}&$select={}",
        compliance_filter(),
        SELECTED_FIELDS.join(",")
    )
}

/// Retrieves every Windows device in a reported compliance state.
///
/// An empty result is valid and means nothing needs reporting.
///
/// # Errors
///
/// Any page failure is returned unchanged from [`fetch_all`]; the report
/// cannot be produced without the full device list.
pub async fn list_noncompliant_devices(
    client: &GraphClient,
) -> crate::error::Result<Vec<RawDeviceRecord>> {
    fetch_all(client, &compliance_query()).await
}
