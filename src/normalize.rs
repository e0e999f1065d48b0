//! Resolution of raw device data plus enrichment into a report row.
//!
//! [`Normalizer::normalize`] is total: every combination of present and
//! absent upstream values resolves to a fully populated
//! [`EnrichedReportRow`]. Absent data becomes the `"N/A"` sentinel; users
//! whose UPN matches the terminated-account pattern get `"Terminated"`.
//!
//! Precedence for the four user columns (mail, alias, title, department):
//!
//! 1. UPN matches the terminated pattern → `Terminated`, `N/A`, `N/A`, `N/A`.
//! 2. UPN absent or blank → `N/A` for all four.
//! 3. Otherwise directory values, with the alias derived from the UPN when
//!    the directory has no on-premises account name.

use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

use crate::batch::Enrichment;
use crate::devices::{ComplianceState, RawDeviceRecord};

/// Placeholder for any value that could not be resolved.
pub const NOT_AVAILABLE: &str = "N/A";

/// Mail value reported for terminated users.
pub const TERMINATED: &str = "Terminated";

/// `deviceEnrollmentType` marker that flags a co-managed device. The
/// misspelling is intentional: it is the exact marker the report keys on.
pub const CO_MANAGEMENT_ENROLLMENT: &str = "windowsCoMnagement";

/// Terminated accounts are renamed with a `zz` prefix.
pub const DEFAULT_TERMINATED_PATTERN: &str = "(?i)^zz";

/// Captures the last dot-separated segment of an email's local part.
static ALIAS_SEGMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[^@]*\.)?([^.@]+)@").expect("alias pattern is a valid regex")
});

/// One row of the non-compliant device report.
///
/// Field order and serialized names are the column contract for exporters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnrichedReportRow {
    /// Intune device name.
    #[serde(rename = "DeviceName")]
    pub device_name: String,
    /// Owner UPN, `Terminated`, or `N/A`.
    #[serde(rename = "UserMail")]
    pub user_mail: String,
    /// On-premises account name, or one derived from the UPN.
    #[serde(rename = "UserAlias")]
    pub user_alias: String,
    /// Owner's job title.
    #[serde(rename = "UserJobTitle")]
    pub user_job_title: String,
    /// Owner's department.
    #[serde(rename = "UserDepartment")]
    pub user_department: String,
    /// OS build string.
    #[serde(rename = "OSVersion")]
    pub os_version: String,
    /// Last Intune sync.
    #[serde(rename = "IntuneLastCheckIn")]
    pub intune_last_check_in: String,
    /// Last ConfigMgr client sync, `N/A` for the zero date.
    #[serde(rename = "MeMCMLastCheckin")]
    pub memcm_last_check_in: String,
    /// Intune compliance state; `configManager` reads as `N/A`.
    #[serde(rename = "ComplianceStatus")]
    pub compliance_status: String,
    /// Enrollment type equals [`CO_MANAGEMENT_ENROLLMENT`].
    #[serde(rename = "IsCoManaged")]
    pub is_co_managed: bool,
    /// `true`, `false`, or `N/A`.
    #[serde(rename = "ComplianceWorkloadEnabled")]
    pub compliance_workload_enabled: String,
    /// Owner's other recently active Windows devices, `; `-joined.
    #[serde(rename = "OtherActiveDevices")]
    pub other_active_devices: String,
}

/// Column headers in export order.
pub const REPORT_COLUMNS: [&str; 12] = [
    "DeviceName",
    "UserMail",
    "UserAlias",
    "UserJobTitle",
    "UserDepartment",
    "OSVersion",
    "IntuneLastCheckIn",
    "MeMCMLastCheckin",
    "ComplianceStatus",
    "IsCoManaged",
    "ComplianceWorkloadEnabled",
    "OtherActiveDevices",
];

/// Derives an account alias from an email: the last dot-separated segment
/// of the local part, upper-cased (`jane.doe@contoso.com` → `DOE`).
pub fn alias_from_mail(mail: &str) -> Option<String> {
    ALIAS_SEGMENT
        .captures(mail)
        .and_then(|caps| caps.get(1))
        .map(|segment| segment.as_str().to_uppercase())
}

/// True for Graph's "never" timestamps (`0001-01-01T00:00:00Z`, the Unix
/// epoch, or anything before it).
fn is_zero_date(raw: &str) -> bool {
    chrono::DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.timestamp() <= 0)
        .unwrap_or(false)
}

fn or_na(value: Option<&str>) -> String {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(NOT_AVAILABLE)
        .to_string()
}

/// Resolved user columns.
struct UserColumns {
    mail: String,
    alias: String,
    job_title: String,
    department: String,
}

impl UserColumns {
    fn filled(mail: &str) -> Self {
        UserColumns {
            mail: mail.to_string(),
            alias: NOT_AVAILABLE.to_string(),
            job_title: NOT_AVAILABLE.to_string(),
            department: NOT_AVAILABLE.to_string(),
        }
    }
}

/// Applies the fallback rules that turn a raw record into a report row.
#[derive(Debug, Clone)]
pub struct Normalizer {
    terminated: Regex,
}

impl Default for Normalizer {
    fn default() -> Self {
        Normalizer {
            terminated: Regex::new(DEFAULT_TERMINATED_PATTERN)
                .expect("default terminated pattern is a valid regex"),
        }
    }
}

impl Normalizer {
    /// Builds a normalizer recognizing terminated users by `pattern`,
    /// matched against the owning user's UPN.
    ///
    /// # Errors
    ///
    /// `GraphError::Config` if `pattern` is not a valid regex.
    pub fn new(pattern: &str) -> crate::error::Result<Self> {
        let terminated = Regex::new(pattern).map_err(|e| {
            crate::error::GraphError::Config(format!("invalid terminated pattern: {e}"))
        })?;
        Ok(Normalizer { terminated })
    }

    /// True if `mail` matches the terminated-account pattern.
    pub fn is_terminated(&self, mail: &str) -> bool {
        self.terminated.is_match(mail)
    }

    fn user_columns(&self, record: &RawDeviceRecord, enrichment: &Enrichment) -> UserColumns {
        let owner = record.owner_email();
        if owner.is_some_and(|mail| self.is_terminated(mail)) {
            return UserColumns::filled(TERMINATED);
        }
        let Some(mail) = owner else {
            return UserColumns::filled(NOT_AVAILABLE);
        };

        let profile = enrichment.profile();
        let alias = profile
            .and_then(|p| p.on_premises_sam_account_name.as_deref())
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(str::to_string)
            .or_else(|| alias_from_mail(mail))
            .unwrap_or_else(|| NOT_AVAILABLE.to_string());

        UserColumns {
            mail: mail.to_string(),
            alias,
            job_title: or_na(profile.and_then(|p| p.job_title.as_deref())),
            department: or_na(profile.and_then(|p| p.department.as_deref())),
        }
    }

    /// Resolves one report row. Deterministic and side-effect free.
    pub fn normalize(
        &self,
        record: &RawDeviceRecord,
        enrichment: &Enrichment,
    ) -> EnrichedReportRow {
        let user = self.user_columns(record, enrichment);

        let compliance_status = match &record.compliance_state {
            Some(ComplianceState::ConfigManager) | None => NOT_AVAILABLE.to_string(),
            Some(state) => or_na(Some(state.as_str())),
        };

        let memcm_last_check_in = record
            .configuration_manager_client_health_state
            .as_ref()
            .and_then(|h| h.last_sync_date_time.as_deref())
            .filter(|ts| !is_zero_date(ts));

        let compliance_workload_enabled = record
            .configuration_manager_client_enabled_features
            .as_ref()
            .and_then(|f| f.compliance_policy)
            .map_or_else(|| NOT_AVAILABLE.to_string(), |enabled| enabled.to_string());

        EnrichedReportRow {
            device_name: or_na(record.device_name.as_deref()),
            user_mail: user.mail,
            user_alias: user.alias,
            user_job_title: user.job_title,
            user_department: user.department,
            os_version: or_na(record.os_version.as_deref()),
            intune_last_check_in: or_na(record.last_sync_date_time.as_deref()),
            memcm_last_check_in: or_na(memcm_last_check_in),
            compliance_status,
            is_co_managed: record.device_enrollment_type.as_deref()
                == Some(CO_MANAGEMENT_ENROLLMENT),
            compliance_workload_enabled,
            other_active_devices: or_na(enrichment.other_active_devices().as_deref()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::{ActiveSibling, BatchResponseSet, UserProfile};
    use crate::devices::{ConfigManagerFeatures, ConfigManagerHealth};

    fn record(upn: Option<&str>) -> RawDeviceRecord {
        RawDeviceRecord {
            id: "dev-1".to_string(),
            device_name: Some("LAPTOP-0042".to_string()),
            os_version: Some("10.0.22631.3296".to_string()),
            user_principal_name: upn.map(str::to_string),
            last_sync_date_time: Some("2024-03-18T07:12:44Z".to_string()),
            compliance_state: Some(ComplianceState::Noncompliant),
            device_enrollment_type: Some("windowsAzureADJoin".to_string()),
            configuration_manager_client_health_state: None,
            configuration_manager_client_enabled_features: None,
        }
    }

    fn normalize(record: &RawDeviceRecord, enrichment: &Enrichment) -> EnrichedReportRow {
        Normalizer::default().normalize(record, enrichment)
    }

    fn resolved_profile() -> Enrichment {
        Enrichment::Resolved(BatchResponseSet {
            profile: Some(UserProfile {
                on_premises_sam_account_name: Some("JDOE01".to_string()),
                job_title: Some("Engineer".to_string()),
                department: Some("Platform".to_string()),
            }),
            active_siblings: vec![ActiveSibling {
                name: "DESKTOP-7".to_string(),
                compliant: true,
                last_sign_in: "2024-03-19T08:00:00Z".to_string(),
            }],
        })
    }

    fn all_fields(row: &EnrichedReportRow) -> [&str; 11] {
        [
            row.device_name.as_str(),
            row.user_mail.as_str(),
            row.user_alias.as_str(),
            row.user_job_title.as_str(),
            row.user_department.as_str(),
            row.os_version.as_str(),
            row.intune_last_check_in.as_str(),
            row.memcm_last_check_in.as_str(),
            row.compliance_status.as_str(),
            row.compliance_workload_enabled.as_str(),
            row.other_active_devices.as_str(),
        ]
    }

    // ── User columns ─────────────────────────────────────────────────

    #[test]
    fn directory_values_are_used_when_present() {
        let row = normalize(&record(Some("jane.doe@contoso.com")), &resolved_profile());
        assert_eq!(row.user_mail, "jane.doe@contoso.com");
        assert_eq!(row.user_alias, "JDOE01");
        assert_eq!(row.user_job_title, "Engineer");
        assert_eq!(row.user_department, "Platform");
        assert_eq!(row.other_active_devices, "DESKTOP-7 (Compliant, 2024-03-19T08:00:00Z)");
    }

    #[test]
    fn alias_derives_from_mail_without_profile() {
        let row = normalize(&record(Some("jane.doe@co.com")), &Enrichment::Unavailable);
        assert_eq!(row.user_mail, "jane.doe@co.com");
        assert_eq!(row.user_alias, "DOE");
        assert_eq!(row.user_job_title, NOT_AVAILABLE);
        assert_eq!(row.user_department, NOT_AVAILABLE);
    }

    #[test]
    fn alias_derives_from_mail_when_profile_lacks_sam_account() {
        let enrichment = Enrichment::Resolved(BatchResponseSet {
            profile: Some(UserProfile {
                job_title: Some("Analyst".to_string()),
                ..UserProfile::default()
            }),
            active_siblings: Vec::new(),
        });
        let row = normalize(&record(Some("a.b.smith@co.com")), &enrichment);
        assert_eq!(row.user_alias, "SMITH");
        assert_eq!(row.user_job_title, "Analyst");
        assert_eq!(row.other_active_devices, NOT_AVAILABLE);
    }

    #[test]
    fn terminated_user_overrides_directory_data() {
        let row = normalize(&record(Some("zz.jane.doe@contoso.com")), &resolved_profile());
        assert_eq!(row.user_mail, "Terminated");
        assert_eq!(row.user_alias, "N/A");
        assert_eq!(row.user_job_title, "N/A");
        assert_eq!(row.user_department, "N/A");
    }

    #[test]
    fn custom_terminated_pattern_is_honoured() {
        let normalizer = Normalizer::new(r"^term_").unwrap();
        assert!(normalizer.is_terminated("term_jdoe@contoso.com"));
        assert!(!normalizer.is_terminated("zz.jdoe@contoso.com"));
    }

    #[test]
    fn invalid_terminated_pattern_is_config_error() {
        let err = Normalizer::new("(unclosed").unwrap_err();
        assert!(matches!(err, crate::error::GraphError::Config(_)));
    }

    #[test]
    fn missing_owner_fills_user_columns_with_na() {
        for upn in [None, Some(""), Some("   ")] {
            let row = normalize(&record(upn), &resolved_profile());
            assert_eq!(row.user_mail, NOT_AVAILABLE);
            assert_eq!(row.user_alias, NOT_AVAILABLE);
            assert_eq!(row.user_job_title, NOT_AVAILABLE);
            assert_eq!(row.user_department, NOT_AVAILABLE);
        }
    }

    #[test]
    fn terminated_check_precedes_missing_owner_check() {
        let match_all = Normalizer::new(".*").unwrap();
        let owned = match_all.normalize(&record(Some("jane.doe@contoso.com")), &resolved_profile());
        assert_eq!(owned.user_mail, TERMINATED);
        for upn in [None, Some("  ")] {
            let row = match_all.normalize(&record(upn), &resolved_profile());
            assert_eq!(row.user_mail, NOT_AVAILABLE, "absent owner is never terminated");
            assert_eq!(row.user_alias, NOT_AVAILABLE);
        }
    }

    #[test]
    fn alias_from_mail_takes_last_local_segment() {
        assert_eq!(alias_from_mail("jane.doe@co.com").as_deref(), Some("DOE"));
        assert_eq!(alias_from_mail("jdoe@co.com").as_deref(), Some("JDOE"));
        assert_eq!(alias_from_mail("x.y.z@sub.co.com").as_deref(), Some("Z"));
        assert_eq!(alias_from_mail("not-an-email"), None);
    }

    // ── Device columns ───────────────────────────────────────────────

    #[test]
    fn config_manager_state_normalizes_to_na() {
        let mut rec = record(Some("jane.doe@co.com"));
        rec.compliance_state = Some(ComplianceState::ConfigManager);
        let row = normalize(&rec, &Enrichment::Unavailable);
        assert_eq!(row.compliance_status, "N/A");

        rec.compliance_state = Some(ComplianceState::InGracePeriod);
        let row = normalize(&rec, &Enrichment::Unavailable);
        assert_eq!(row.compliance_status, "inGracePeriod");
    }

    #[test]
    fn co_management_requires_exact_marker() {
        let mut rec = record(Some("jane.doe@co.com"));
        rec.device_enrollment_type = Some("windowsCoMnagement".to_string());
        assert!(normalize(&rec, &Enrichment::Unavailable).is_co_managed);

        for other in [Some("windowsCoManagement"), Some("windowsAzureADJoin"), None] {
            rec.device_enrollment_type = other.map(str::to_string);
            assert!(!normalize(&rec, &Enrichment::Unavailable).is_co_managed);
        }
    }

    #[test]
    fn memcm_check_in_ignores_zero_date() {
        let mut rec = record(Some("jane.doe@co.com"));
        rec.configuration_manager_client_health_state = Some(ConfigManagerHealth {
            last_sync_date_time: Some("0001-01-01T00:00:00Z".to_string()),
        });
        let row = normalize(&rec, &Enrichment::Unavailable);
        assert_eq!(row.memcm_last_check_in, NOT_AVAILABLE);

        rec.configuration_manager_client_health_state = Some(ConfigManagerHealth {
            last_sync_date_time: Some("2024-03-17T22:01:00Z".to_string()),
        });
        let row = normalize(&rec, &Enrichment::Unavailable);
        assert_eq!(row.memcm_last_check_in, "2024-03-17T22:01:00Z");
    }

    #[test]
    fn compliance_workload_reflects_feature_flag() {
        let mut rec = record(Some("jane.doe@co.com"));
        let row = normalize(&rec, &Enrichment::Unavailable);
        assert_eq!(row.compliance_workload_enabled, NOT_AVAILABLE);

        rec.configuration_manager_client_enabled_features = Some(ConfigManagerFeatures {
            compliance_policy: Some(false),
            ..ConfigManagerFeatures::default()
        });
        let row = normalize(&rec, &Enrichment::Unavailable);
        assert_eq!(row.compliance_workload_enabled, "false");
    }

    // ── Totality ─────────────────────────────────────────────────────

    #[test]
    fn empty_record_resolves_every_field() {
        let rec: RawDeviceRecord = serde_json::from_str(r#"{"id": "bare"}"#).unwrap();
        let row = normalize(&rec, &Enrichment::Unavailable);
        for value in all_fields(&row) {
            assert_eq!(value, NOT_AVAILABLE);
        }
        assert!(!row.is_co_managed);
    }

    #[test]
    fn normalization_is_repeatable() {
        let normalizer = Normalizer::default();
        let rec = record(Some("jane.doe@contoso.com"));
        let first = normalizer.normalize(&rec, &resolved_profile());
        let second = normalizer.normalize(&rec, &resolved_profile());
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn serialized_row_follows_column_contract() {
        let row = normalize(&record(Some("jane.doe@co.com")), &Enrichment::Unavailable);
        let json = serde_json::to_value(&row).unwrap();
        let mut keys: Vec<&str> = json.as_object().unwrap().keys().map(String::as_str).collect();
        let mut expected = REPORT_COLUMNS.to_vec();
        keys.sort_unstable();
        expected.sort_unstable();
        assert_eq!(keys, expected);
    }
}
