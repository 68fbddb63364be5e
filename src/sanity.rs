//! Pre-flight checks for the runtime environment
//!
//! Verifies that the external tools the installer delegates to are on
//! `PATH` before anything is collected or written. Cluster connectivity is
//! checked later through the tool runner, see `Installer`.

use std::path::PathBuf;
use tracing::{debug, info};

use crate::error::{InstallerError, Result};

/// Required runtime binaries
const REQUIRED_BINARIES: &[&str] = &[
    "kubectl", // Context and connectivity checks
    "helm",    // Chart installation
];

/// Optional binaries (used if present)
const OPTIONAL_BINARIES: &[&str] = &[
    "shred", // Secure deletion of the values file
];

/// Result of environment verification
#[derive(Debug)]
pub struct SanityCheckResult {
    pub missing_binaries: Vec<String>,
    pub missing_optional: Vec<String>,
}

impl SanityCheckResult {
    /// Returns true if all required binaries were found
    pub fn is_ok(&self) -> bool {
        self.missing_binaries.is_empty()
    }
}

/// Locate a binary on PATH
fn find_binary(name: &str) -> Option<PathBuf> {
    which::which(name).ok()
}

/// Check `required` and `optional` binaries
fn verify_binaries(required: &[&str], optional: &[&str]) -> SanityCheckResult {
    let missing = |names: &[&str]| -> Vec<String> {
        names
            .iter()
            .filter(|name| match find_binary(name) {
                Some(path) => {
                    debug!("Found {} at {:?}", name, path);
                    false
                }
                None => true,
            })
            .map(|name| (*name).to_string())
            .collect()
    };

    SanityCheckResult {
        missing_binaries: missing(required),
        missing_optional: missing(optional),
    }
}

/// Perform all checks and return the result
pub fn verify_environment() -> SanityCheckResult {
    verify_binaries(REQUIRED_BINARIES, OPTIONAL_BINARIES)
}

/// Installation hint for a missing binary
pub fn install_hint(binary: &str) -> &'static str {
    match binary {
        "kubectl" => "https://kubernetes.io/docs/tasks/tools/",
        "helm" => "https://helm.sh/docs/intro/install/",
        "shred" => "GNU coreutils",
        _ => "your package manager",
    }
}

/// Verify the environment, failing with `MissingDependency` if a required tool is absent.
pub fn run_preflight_checks() -> Result<()> {
    debug!("Running pre-flight checks...");

    let result = verify_environment();
    for binary in &result.missing_optional {
        info!(
            "Optional tool {} not found ({}); falling back to plain overwrite-and-delete",
            binary,
            install_hint(binary)
        );
    }

    if !result.is_ok() {
        for binary in &result.missing_binaries {
            eprintln!("   • {} (install: {})", binary, install_hint(binary));
        }
        return Err(InstallerError::MissingDependency(result.missing_binaries));
    }

    info!("Pre-flight checks passed");
    Ok(())
}
