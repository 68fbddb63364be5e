//! Typed invocations of `kubectl` and `helm`.
//!
//! # Field to Flag Mapping (upgrade)
//!
//! | Rust Field     | CLI Flag            | Notes |
//! |----------------|---------------------|-------|
//! | `release`      | positional          | Helm release name |
//! | `chart`        | positional          | `grafana/k8s-monitoring` |
//! | `namespace`    | `--namespace`       | created if absent via `--create-namespace` |
//! | `values_file`  | `--values`          | path to the 0600 values file |
//! | `timeout`      | `--timeout`         | also enables `--atomic` rollback |
//! | `kube_context` | `--kube-context`    | optional |
//! | `dry_run`      | `--dry-run`         | optional |

use std::path::PathBuf;
use std::time::Duration;

use crate::tool_args::ToolArgs;

/// Helm repository name for the Grafana charts.
pub const GRAFANA_REPO_NAME: &str = "grafana";
/// Helm repository URL for the Grafana charts.
pub const GRAFANA_REPO_URL: &str = "https://grafana.github.io/helm-charts";
/// Chart reference installed by this tool.
pub const CHART: &str = "grafana/k8s-monitoring";
/// Namespace the chart is installed into.
pub const NAMESPACE: &str = "grafana-agent";
/// Default release name.
pub const DEFAULT_RELEASE: &str = "grafana-k8s-monitoring";
/// Default helm --timeout.
pub const DEFAULT_HELM_TIMEOUT: Duration = Duration::from_secs(600);

const KUBECTL_TIMEOUT: Duration = Duration::from_secs(30);
const REPO_TIMEOUT: Duration = Duration::from_secs(120);
/// Extra wall-clock time granted beyond helm's own --timeout.
const HELM_GRACE: Duration = Duration::from_secs(60);

fn push_context(args: &mut Vec<String>, flag: &str, context: &Option<String>) {
    if let Some(ctx) = context {
        args.push(flag.to_string());
        args.push(ctx.clone());
    }
}

/// `kubectl config current-context`
#[derive(Debug, Clone, Default)]
pub struct KubectlCurrentContextArgs;

impl ToolArgs for KubectlCurrentContextArgs {
    fn program(&self) -> &'static str {
        "kubectl"
    }

    fn to_cli_args(&self) -> Vec<String> {
        vec!["config".to_string(), "current-context".to_string()]
    }

    fn timeout(&self) -> Duration {
        KUBECTL_TIMEOUT
    }
}

/// `kubectl cluster-info --request-timeout=10s`
#[derive(Debug, Clone, Default)]
pub struct KubectlClusterInfoArgs {
    pub kube_context: Option<String>,
}

impl ToolArgs for KubectlClusterInfoArgs {
    fn program(&self) -> &'static str {
        "kubectl"
    }

    fn to_cli_args(&self) -> Vec<String> {
        let mut args = vec![
            "cluster-info".to_string(),
            "--request-timeout=10s".to_string(),
        ];
        push_context(&mut args, "--context", &self.kube_context);
        args
    }

    fn timeout(&self) -> Duration {
        KUBECTL_TIMEOUT
    }
}

/// `helm repo add <name> <url> --force-update`
#[derive(Debug, Clone)]
pub struct HelmRepoAddArgs {
    pub name: String,
    pub url: String,
}

impl Default for HelmRepoAddArgs {
    fn default() -> Self {
        Self {
            name: GRAFANA_REPO_NAME.to_string(),
            url: GRAFANA_REPO_URL.to_string(),
        }
    }
}

impl ToolArgs for HelmRepoAddArgs {
    fn program(&self) -> &'static str {
        "helm"
    }

    fn to_cli_args(&self) -> Vec<String> {
        vec![
            "repo".to_string(),
            "add".to_string(),
            self.name.clone(),
            self.url.clone(),
            "--force-update".to_string(),
        ]
    }

    fn timeout(&self) -> Duration {
        REPO_TIMEOUT
    }
}

/// `helm repo update <name>`
#[derive(Debug, Clone)]
pub struct HelmRepoUpdateArgs {
    pub name: String,
}

impl Default for HelmRepoUpdateArgs {
    fn default() -> Self {
        Self {
            name: GRAFANA_REPO_NAME.to_string(),
        }
    }
}

impl ToolArgs for HelmRepoUpdateArgs {
    fn program(&self) -> &'static str {
        "helm"
    }

    fn to_cli_args(&self) -> Vec<String> {
        vec!["repo".to_string(), "update".to_string(), self.name.clone()]
    }

    fn timeout(&self) -> Duration {
        REPO_TIMEOUT
    }
}

/// `helm upgrade --install` with atomic rollback.
#[derive(Debug, Clone)]
pub struct HelmUpgradeInstallArgs {
    pub release: String,
    pub chart: String,
    pub namespace: String,
    pub values_file: PathBuf,
    pub timeout: Duration,
    pub kube_context: Option<String>,
    pub dry_run: bool,
}

impl ToolArgs for HelmUpgradeInstallArgs {
    fn program(&self) -> &'static str {
        "helm"
    }

    fn to_cli_args(&self) -> Vec<String> {
        let mut args = vec![
            "upgrade".to_string(),
            "--install".to_string(),
            self.release.clone(),
            self.chart.clone(),
            "--namespace".to_string(),
            self.namespace.clone(),
            "--create-namespace".to_string(),
            "--values".to_string(),
            self.values_file.display().to_string(),
            "--atomic".to_string(),
            "--timeout".to_string(),
            format!("{}s", self.timeout.as_secs()),
        ];
        push_context(&mut args, "--kube-context", &self.kube_context);
        if self.dry_run {
            args.push("--dry-run".to_string());
        }
        args
    }

    fn timeout(&self) -> Duration {
        self.timeout.saturating_add(HELM_GRACE)
    }
}
