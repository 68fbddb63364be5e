use clap::builder::FalseyValueParser;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::fields::FieldId;
use crate::installer::InstallOptions;
use crate::resolver::{CliValues, RunMode};
use crate::tools::DEFAULT_RELEASE;

/// Upper bound for --timeout.
pub const MAX_TIMEOUT: Duration = Duration::from_secs(24 * 3600);

const USERNAME_NOTE: &str = "Note: sudo and some desktop sessions export USERNAME (e.g. USERNAME=root). \
A non-numeric USERNAME fails validation instead of prompting; pass --username or unset it.";

/// k8smon - install Grafana Kubernetes monitoring into a cluster
///
/// Each value below may also be given through the environment variable of
/// the same name (e.g. CLUSTER_NAME). Values not supplied are prompted for,
/// unless --non-interactive is set.
#[derive(Parser, Debug)]
#[command(name = "k8smon")]
#[command(about = "Install the grafana/k8s-monitoring Helm chart")]
#[command(after_help = USERNAME_NOTE)]
#[command(version)]
pub struct Cli {
    /// Kubernetes cluster name (lowercase letters, digits, inner dashes)
    #[arg(long)]
    pub cluster_name: Option<String>,

    /// Customer identifier
    #[arg(long)]
    pub customer_id: Option<String>,

    /// Cloud region [default: us-east-1]
    #[arg(long)]
    pub region: Option<String>,

    /// Project identifier
    #[arg(long)]
    pub project_id: Option<String>,

    /// Cloud platform [default: AWS]
    #[arg(long)]
    pub cloud_platform: Option<String>,

    /// Deployment stage [default: preprod]
    #[arg(long)]
    pub stage: Option<String>,

    /// Environment type [default: prod]
    #[arg(long)]
    pub env_type: Option<String>,

    /// Grafana Cloud metrics username (numeric)
    #[arg(long)]
    pub username: Option<String>,

    /// Grafana Cloud access token
    #[arg(long)]
    pub password: Option<String>,

    /// Never prompt: use flags, environment and defaults only
    #[arg(short = 'y', long, env = "NON_INTERACTIVE", value_parser = FalseyValueParser::new())]
    pub non_interactive: bool,

    /// Keep the values file after a successful install (it contains credentials)
    #[arg(long)]
    pub keep_values: bool,

    /// Helm release name
    #[arg(long, default_value = DEFAULT_RELEASE)]
    pub release: String,

    /// kubectl/helm context to use instead of the current one
    #[arg(long)]
    pub kube_context: Option<String>,

    /// Helm timeout, e.g. 600s or 10m (at most 24h)
    #[arg(long, default_value = "10m", value_parser = parse_duration)]
    pub timeout: Duration,

    /// Directory the values file is written to
    #[arg(long, default_value = ".")]
    pub output_dir: PathBuf,

    /// Pass --dry-run to helm
    #[arg(long)]
    pub dry_run: bool,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn mode(&self) -> RunMode {
        if self.non_interactive {
            RunMode::NonInteractive
        } else {
            RunMode::Interactive
        }
    }

    /// Field values given as flags, keyed by field.
    pub fn field_values(&self) -> CliValues {
        [
            (FieldId::ClusterName, &self.cluster_name),
            (FieldId::CustomerId, &self.customer_id),
            (FieldId::Region, &self.region),
            (FieldId::ProjectId, &self.project_id),
            (FieldId::CloudPlatform, &self.cloud_platform),
            (FieldId::Stage, &self.stage),
            (FieldId::EnvType, &self.env_type),
            (FieldId::Username, &self.username),
            (FieldId::Password, &self.password),
        ]
        .into_iter()
        .filter_map(|(id, value)| value.clone().map(|v| (id, v)))
        .collect()
    }

    pub fn install_options(&self) -> InstallOptions {
        InstallOptions {
            mode: self.mode(),
            keep_values: self.keep_values,
            release: self.release.clone(),
            kube_context: self.kube_context.clone(),
            helm_timeout: self.timeout,
            output_dir: self.output_dir.clone(),
            dry_run: self.dry_run,
        }
    }
}

/// Parse `<n>s`, `<n>m`, `<n>h` or a bare number of seconds, at most
/// [`MAX_TIMEOUT`].
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    let (digits, scale) = match s.char_indices().last() {
        Some((i, 's')) => (&s[..i], 1),
        Some((i, 'm')) => (&s[..i], 60),
        Some((i, 'h')) => (&s[..i], 3600),
        _ => (s, 1),
    };
    let n: u64 = digits
        .parse()
        .map_err(|_| format!("invalid duration '{}': expected e.g. 600s or 10m", s))?;
    if n == 0 {
        return Err("duration must be greater than zero".to_string());
    }
    let too_long = || {
        let limit = MAX_TIMEOUT.as_secs() / 3600;
        format!("duration '{}' exceeds the {}h limit", s, limit)
    };
    let secs = n.checked_mul(scale).ok_or_else(too_long)?;
    let duration = Duration::from_secs(secs);
    if duration > MAX_TIMEOUT {
        return Err(too_long());
    }
    Ok(duration)
}
