//! Optional TOML configuration for the report binary.
//!
//! Every key is optional; command-line flags take precedence over file
//! values. The client secret is deliberately not read from the file.
//!
//! ```toml
//! tenant_id = "00000000-0000-0000-0000-000000000000"
//! client_id = "11111111-1111-1111-1111-111111111111"
//! graph_base_url = "https://graph.microsoft.com/beta/"
//! terminated_pattern = "(?i)^zz"
//! activity_window_days = 7
//! output = "NonCompliantDevices.csv"
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::batch::DEFAULT_ACTIVITY_WINDOW_DAYS;
use crate::client::BASE_URL;
use crate::error::GraphError;
use crate::normalize::{DEFAULT_TERMINATED_PATTERN, Normalizer};
use crate::report::ReportOptions;

/// Report file written when neither the file nor `--output` names one.
pub const DEFAULT_OUTPUT: &str = "NonCompliantDevices.csv";

/// Upper bound on `activity_window_days`. Ten years already reaches back
/// past any sign-in Entra ID still reports.
pub const MAX_ACTIVITY_WINDOW_DAYS: i64 = 3650;

/// Settings read from the config file, before CLI overrides.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReportConfig {
    /// Entra ID tenant the app registration lives in.
    pub tenant_id: Option<String>,
    /// Application (client) ID.
    pub client_id: Option<String>,
    /// Graph root, normally the beta endpoint.
    pub graph_base_url: String,
    /// Regex flagging terminated users by UPN.
    pub terminated_pattern: String,
    /// Sibling activity look-back, in days.
    pub activity_window_days: i64,
    /// CSV file to write.
    pub output: PathBuf,
}

impl Default for ReportConfig {
    fn default() -> Self {
        ReportConfig {
            tenant_id: None,
            client_id: None,
            graph_base_url: BASE_URL.to_string(),
            terminated_pattern: DEFAULT_TERMINATED_PATTERN.to_string(),
            activity_window_days: DEFAULT_ACTIVITY_WINDOW_DAYS,
            output: PathBuf::from(DEFAULT_OUTPUT),
        }
    }
}

impl ReportConfig {
    /// Reads and parses a config file.
    pub fn load(path: &Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
            .map_err(|e| GraphError::Config(format!("{}: {e}", path.display())))
    }

    /// Parses config text; missing keys take their defaults.
    pub fn from_toml_str(content: &str) -> crate::error::Result<Self> {
        toml::from_str(content).map_err(|e| GraphError::Config(e.to_string()))
    }

    /// Validates the tunables and turns them into report options.
    pub fn report_options(&self) -> crate::error::Result<ReportOptions> {
        let days = self.activity_window_days;
        if !(1..=MAX_ACTIVITY_WINDOW_DAYS).contains(&days) {
            return Err(GraphError::Config(format!(
                "activity_window_days must be between 1 and {MAX_ACTIVITY_WINDOW_DAYS}, got {days}"
            )));
        }
        let activity_window = chrono::Duration::try_days(days).ok_or_else(|| {
            GraphError::Config(format!("activity_window_days out of range: {days}"))
        })?;
        Ok(ReportOptions {
            normalizer: Normalizer::new(&self.terminated_pattern)?,
            activity_window,
        })
    }
}
