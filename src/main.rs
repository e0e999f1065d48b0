//! CLI entry point for the Intune non-compliant device report.
//!
//! Exit codes:
//! - 0: report written
//! - 1: runtime error (auth failure, device listing failed, export failed)
//! - 2: argument validation error (clap handles this automatically)

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use intune_compliance_report::auth::{GRAPH_SCOPE, TokenProvider};
use intune_compliance_report::client::GraphClient;
use intune_compliance_report::config::ReportConfig;
use intune_compliance_report::error::GraphError;
use intune_compliance_report::export::write_csv_file;
use intune_compliance_report::report::build_report;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// TOML file with tenant, app and report settings.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Entra ID tenant ID. Overrides `tenant_id` from the config file.
    #[arg(long)]
    tenant_id: Option<String>,

    /// Application (client) ID. Overrides `client_id` from the config file.
    #[arg(long)]
    client_id: Option<String>,

    /// Client secret. Prefer the GRAPH_CLIENT_SECRET environment variable
    /// so the secret stays out of process listings and shell history.
    #[arg(long, env = "GRAPH_CLIENT_SECRET", hide_env_values = true)]
    secret: String,

    /// CSV file to write.
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Regex matched against the owner's UPN to flag terminated users.
    #[arg(long)]
    terminated_pattern: Option<String>,

    /// Days a sibling device may go without sign-in and still count as active.
    #[arg(long)]
    window_days: Option<i64>,
}

impl Cli {
    /// Layers command-line overrides over the config file (or defaults).
    fn resolve(&self) -> Result<ReportConfig, GraphError> {
        let mut config = match &self.config {
            Some(path) => ReportConfig::load(path)?,
            None => ReportConfig::default(),
        };
        if let Some(tenant_id) = &self.tenant_id {
            config.tenant_id = Some(tenant_id.clone());
        }
        if let Some(client_id) = &self.client_id {
            config.client_id = Some(client_id.clone());
        }
        if let Some(output) = &self.output {
            config.output = output.clone();
        }
        if let Some(pattern) = &self.terminated_pattern {
            config.terminated_pattern = pattern.clone();
        }
        if let Some(days) = self.window_days {
            config.activity_window_days = days;
        }
        Ok(config)
    }
}

async fn run(cli: Cli) -> Result<(), GraphError> {
    let config = cli.resolve()?;
    let options = config.report_options()?;
    let tenant_id = config
        .tenant_id
        .as_deref()
        .ok_or_else(|| GraphError::Config("tenant_id is required".to_string()))?;
    let client_id = config
        .client_id
        .as_deref()
        .ok_or_else(|| GraphError::Config("client_id is required".to_string()))?;

    let tp = TokenProvider::new(tenant_id, client_id, &cli.secret, GRAPH_SCOPE);
    let client = GraphClient::with_base_url(tp, &config.graph_base_url)?;

    let rows = build_report(&client, &options).await?;
    write_csv_file(&config.output, &rows)?;
    info!(path = %config.output.display(), rows = rows.len(), "report exported");
    println!("{} devices written to {}", rows.len(), config.output.display());
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "report failed");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> Vec<&'static str> {
        vec![
            "compliance-report",
            "--tenant-id",
            "tid-456",
            "--client-id",
            "cid-789",
            "--secret",
            "s3cret",
        ]
    }

    #[test]
    fn minimal_args_parse() {
        let cli = Cli::try_parse_from(base_args()).expect("should parse minimal invocation");
        assert_eq!(cli.tenant_id.as_deref(), Some("tid-456"));
        assert_eq!(cli.client_id.as_deref(), Some("cid-789"));
        assert_eq!(cli.secret, "s3cret");
        assert!(cli.config.is_none());
    }

    #[test]
    fn flags_override_defaults() {
        let mut args = base_args();
        args.extend_from_slice(&[
            "-o",
            "/tmp/report.csv",
            "--terminated-pattern",
            "^term_",
            "--window-days",
            "30",
        ]);
        let config = Cli::try_parse_from(args).unwrap().resolve().unwrap();
        assert_eq!(config.tenant_id.as_deref(), Some("tid-456"));
        assert_eq!(config.output, PathBuf::from("/tmp/report.csv"));
        assert_eq!(config.terminated_pattern, "^term_");
        assert_eq!(config.activity_window_days, 30);
    }

    #[test]
    fn flags_take_precedence_over_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.toml");
        std::fs::write(&path, "tenant_id = \"from-file\"\nclient_id = \"file-app\"\n").unwrap();
        let mut args: Vec<&str> = base_args();
        args.extend_from_slice(&["--config", path.to_str().unwrap()]);
        let config = Cli::try_parse_from(args).unwrap().resolve().unwrap();
        assert_eq!(config.tenant_id.as_deref(), Some("tid-456"));
        assert_eq!(config.client_id.as_deref(), Some("cid-789"));
    }

    #[test]
    fn non_numeric_window_is_rejected() {
        let mut args = base_args();
        args.extend_from_slice(&["--window-days", "week"]);
        assert!(Cli::try_parse_from(args).is_err());
    }
}
