//! Summary display and the confirmation gate.
//!
//! Nothing is written and no tool that changes the cluster runs until the
//! operator has seen every resolved value and answered yes.

use std::path::PathBuf;
use tracing::info;

use crate::error::Result;
use crate::prompt::{confirm, Prompter};
use crate::resolver::{ConfigValues, RunMode};

/// Where the chart is about to be installed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallTarget {
    pub kube_context: String,
    pub namespace: String,
    pub release: String,
    pub values_file: PathBuf,
}

/// Lines of the pre-install summary. Sensitive values are masked.
pub fn summary_lines(values: &ConfigValues, target: &InstallTarget) -> Vec<String> {
    let width = values
        .iter()
        .map(|(id, _)| id.flag_name().len())
        .max()
        .unwrap_or(0)
        .max("kube-context".len());

    let mut lines = vec!["Configuration summary:".to_string()];
    for (id, value) in values.iter() {
        lines.push(format!(
            "  {:<width$}  {}  ({})",
            id.flag_name(),
            values.display_value(id),
            value.source
        ));
    }
    lines.push(String::new());
    for (label, value) in [
        ("kube-context", target.kube_context.clone()),
        ("namespace", target.namespace.clone()),
        ("release", target.release.clone()),
        ("values-file", target.values_file.display().to_string()),
    ] {
        lines.push(format!("  {:<width$}  {}", label, value));
    }
    lines
}

/// Show the summary and ask for approval.
///
/// Non-interactive runs are approved automatically. Returns `false` when the
/// operator declines.
pub fn confirmation_gate(
    prompter: &mut dyn Prompter,
    mode: RunMode,
    values: &ConfigValues,
    target: &InstallTarget,
) -> Result<bool> {
    for line in summary_lines(values, target) {
        prompter.message(&line)?;
    }

    match mode {
        RunMode::NonInteractive => {
            info!("Non-interactive mode: confirmation granted automatically");
            Ok(true)
        }
        RunMode::Interactive => {
            let question = format!(
                "Install {} into namespace {} on context {}?",
                target.release, target.namespace, target.kube_context
            );
            let approved = confirm(prompter, &question, false)?;
            if approved {
                info!("Installation confirmed by operator");
            } else {
                info!("Installation declined by operator");
            }
            Ok(approved)
        }
    }
}
