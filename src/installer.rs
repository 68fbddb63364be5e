//! Installer module
//!
//! Drives one run end to end: connectivity check, value collection,
//! confirmation, rendering, `helm` invocation and cleanup of the values file.
//! Progress is tracked by a `RunContext`; the values file is owned by a
//! `SecretFile` so it is removed on every path out of `Installer::run`.

use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, error, info};

use crate::confirm::{confirmation_gate, InstallTarget};
use crate::error::{InstallerError, Result};
use crate::prompt::{confirm, Prompter};
use crate::fields::FieldId;
use crate::render::{render, values_file_name};
use crate::resolver::{CliValues, EnvSource, Resolver, RunMode};
use crate::run_state::{RunContext, RunStage};
use crate::secret_file::SecretFile;
use crate::tool_args::ToolArgs;
use crate::tool_runner::ToolRunner;
use crate::tools::{
    HelmRepoAddArgs, HelmRepoUpdateArgs, HelmUpgradeInstallArgs, KubectlClusterInfoArgs,
    KubectlCurrentContextArgs, CHART, DEFAULT_HELM_TIMEOUT, DEFAULT_RELEASE, NAMESPACE,
};

/// Options that shape a run but are not chart values.
#[derive(Debug, Clone)]
pub struct InstallOptions {
    pub mode: RunMode,
    /// Keep the values file after a successful install without asking
    pub keep_values: bool,
    pub release: String,
    pub kube_context: Option<String>,
    pub helm_timeout: Duration,
    pub output_dir: PathBuf,
    pub dry_run: bool,
}

impl Default for InstallOptions {
    fn default() -> Self {
        Self {
            mode: RunMode::Interactive,
            keep_values: false,
            release: DEFAULT_RELEASE.to_string(),
            kube_context: None,
            helm_timeout: DEFAULT_HELM_TIMEOUT,
            output_dir: PathBuf::from("."),
            dry_run: false,
        }
    }
}

/// How a run ended when it did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The chart was installed; `retained` is set if the values file was kept.
    Installed { retained: Option<PathBuf> },
    /// The operator declined at the confirmation gate. Nothing was changed.
    Declined,
}

/// Installer instance
pub struct Installer<'a> {
    options: InstallOptions,
    runner: &'a mut dyn ToolRunner,
    prompter: &'a mut dyn Prompter,
    ctx: RunContext,
    secret: Option<SecretFile>,
}

impl<'a> Installer<'a> {
    pub fn new(
        options: InstallOptions,
        runner: &'a mut dyn ToolRunner,
        prompter: &'a mut dyn Prompter,
    ) -> Self {
        Self {
            options,
            runner,
            prompter,
            ctx: RunContext::new(),
            secret: None,
        }
    }

    /// Run state, for inspection after `run` returns.
    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    /// Execute the run.
    ///
    /// On error the values file has already been removed when this returns.
    pub fn run(&mut self, cli: &CliValues, env: &dyn EnvSource) -> Result<RunOutcome> {
        match self.execute(cli, env) {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                debug!("{} failed: {}", self.ctx.current_stage(), e);
                self.ctx.fail();
                // Dropping the guard deletes the file
                self.secret = None;
                if let Err(t) = self.ctx.finish() {
                    error!("Run state error during cleanup: {}", t);
                }
                Err(e)
            }
        }
    }

    fn execute(&mut self, cli: &CliValues, env: &dyn EnvSource) -> Result<RunOutcome> {
        info!("Stage: {}", RunStage::Collecting);
        let kube_context = self.check_connectivity()?;
        let values = Resolver::new(cli, env, self.options.mode).resolve(&mut *self.prompter)?;

        self.ctx.transition_to(RunStage::Confirming)?;
        let target = InstallTarget {
            kube_context,
            namespace: NAMESPACE.to_string(),
            release: self.options.release.clone(),
            values_file: self
                .options
                .output_dir
                .join(values_file_name(values.get(FieldId::ClusterName))),
        };
        if !confirmation_gate(&mut *self.prompter, self.options.mode, &values, &target)? {
            self.ctx.cancel();
            self.ctx.finish()?;
            self.prompter.message("Installation cancelled; nothing was changed.")?;
            return Ok(RunOutcome::Declined);
        }
        self.ctx.confirm();

        self.ctx.transition_to(RunStage::Rendering)?;
        let document = render(&values)?;
        let secret = SecretFile::create(document.path_in(&self.options.output_dir), &document.contents)?;
        let values_file = secret.path().to_path_buf();
        self.secret = Some(secret);

        self.ctx.transition_to(RunStage::Installing)?;
        self.install(&values_file)?;

        self.ctx.transition_to(RunStage::CleaningUp)?;
        let retained = self.dispose_values_file()?;
        self.ctx.finish()?;

        self.prompter.message(&format!(
            "✓ {} installed into namespace {}",
            self.options.release, NAMESPACE
        ))?;
        Ok(RunOutcome::Installed { retained })
    }

    /// Verify `kubectl` can reach the cluster and return the context in use.
    fn check_connectivity(&mut self) -> Result<String> {
        let kube_context = match &self.options.kube_context {
            Some(ctx) => ctx.clone(),
            None => {
                let out = self
                    .runner
                    .run(&KubectlCurrentContextArgs)
                    .map_err(|e| InstallerError::connectivity(format!("{e:#}")))?;
                let ctx = out.stdout.trim().to_string();
                if !out.success || ctx.is_empty() {
                    return Err(InstallerError::connectivity(format!(
                        "no current kubectl context ({})",
                        out.failure_detail()
                    )));
                }
                ctx
            }
        };

        let args = KubectlClusterInfoArgs {
            kube_context: self.options.kube_context.clone(),
        };
        let out = self
            .runner
            .run(&args)
            .map_err(|e| InstallerError::connectivity(format!("{e:#}")))?;
        if !out.success {
            return Err(InstallerError::connectivity(format!(
                "context {}: {}",
                kube_context,
                out.failure_detail()
            )));
        }

        info!("Connected to cluster via context {}", kube_context);
        Ok(kube_context)
    }

    fn install(&mut self, values_file: &Path) -> Result<()> {
        self.run_step(&HelmRepoAddArgs::default())?;
        self.run_step(&HelmRepoUpdateArgs::default())?;
        let upgrade = HelmUpgradeInstallArgs {
            release: self.options.release.clone(),
            chart: CHART.to_string(),
            namespace: NAMESPACE.to_string(),
            values_file: values_file.to_path_buf(),
            timeout: self.options.helm_timeout,
            kube_context: self.options.kube_context.clone(),
            dry_run: self.options.dry_run,
        };
        self.run_step(&upgrade)
    }

    /// Run one helm step; any failure aborts the install.
    fn run_step(&mut self, args: &dyn ToolArgs) -> Result<()> {
        let label = args.describe();
        self.prompter.message(&format!("→ {}", label))?;
        let out = self
            .runner
            .run(args)
            .map_err(|e| InstallerError::install(format!("{}: {e:#}", label)))?;
        if !out.success {
            return Err(InstallerError::install(format!(
                "{}: {}",
                label,
                out.failure_detail()
            )));
        }
        Ok(())
    }

    /// Delete the values file unless the operator chooses to keep it.
    fn dispose_values_file(&mut self) -> Result<Option<PathBuf>> {
        let Some(secret) = self.secret.take() else {
            return Ok(None);
        };

        let keep = match self.options.mode {
            _ if self.options.keep_values => true,
            RunMode::NonInteractive => false,
            RunMode::Interactive => confirm(
                &mut *self.prompter,
                &format!(
                    "Keep {} (contains credentials)?",
                    secret.path().display()
                ),
                false,
            )?,
        };

        if keep {
            let path = secret.retain();
            self.prompter
                .message(&format!("Values file kept at {}", path.display()))?;
            Ok(Some(path))
        } else {
            drop(secret);
            info!("Values file removed");
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::HeadlessPrompter;
    use crate::tool_runner::ToolOutput;
    use std::collections::HashMap;

    #[derive(Default)]
    struct Recorder {
        calls: Vec<Vec<String>>,
        fail_program_arg: Option<&'static str>,
    }

    impl ToolRunner for Recorder {
        fn run(&mut self, args: &dyn ToolArgs) -> anyhow::Result<ToolOutput> {
            let mut argv = vec![args.program().to_string()];
            argv.extend(args.to_cli_args());
            let fail = self
                .fail_program_arg
                .is_some_and(|arg| argv.iter().any(|a| a == arg));
            self.calls.push(argv);
            if fail {
                return Ok(ToolOutput::failed(1, "boom"));
            }
            Ok(ToolOutput::ok("kind-dev\n"))
        }
    }

    fn cli() -> CliValues {
        [
            (FieldId::ClusterName, "demo-1"),
            (FieldId::CustomerId, "W111"),
            (FieldId::ProjectId, "p1"),
            (FieldId::Username, "12345"),
            (FieldId::Password, "tok"),
        ]
        .into_iter()
        .map(|(k, v)| (k, v.to_string()))
        .collect()
    }

    fn options(dir: &Path) -> InstallOptions {
        InstallOptions {
            mode: RunMode::NonInteractive,
            output_dir: dir.to_path_buf(),
            ..InstallOptions::default()
        }
    }

    #[test]
    fn test_connectivity_failure_stops_before_collection() {
        let dir = tempfile::tempdir().unwrap();
        let mut runner = Recorder {
            fail_program_arg: Some("cluster-info"),
            ..Recorder::default()
        };
        let mut prompter = HeadlessPrompter;
        let env: HashMap<String, String> = HashMap::new();
        let mut installer = Installer::new(options(dir.path()), &mut runner, &mut prompter);

        let err = installer.run(&cli(), &env).unwrap_err();
        assert!(matches!(err, InstallerError::Connectivity(_)));
        assert_eq!(installer.context().current_stage(), RunStage::Failed);
        assert_eq!(installer.context().failed_at(), Some(RunStage::Collecting));
    }

    #[test]
    fn test_explicit_context_skips_current_context_query() {
        let dir = tempfile::tempdir().unwrap();
        let mut runner = Recorder::default();
        let mut prompter = HeadlessPrompter;
        let env: HashMap<String, String> = HashMap::new();
        let opts = InstallOptions {
            kube_context: Some("prod-eks".to_string()),
            ..options(dir.path())
        };
        Installer::new(opts, &mut runner, &mut prompter)
            .run(&cli(), &env)
            .unwrap();

        assert!(!runner.calls.iter().any(|c| c.contains(&"current-context".to_string())));
        let upgrade = runner.calls.last().unwrap();
        assert!(upgrade.windows(2).any(|w| w == ["--kube-context", "prod-eks"]));
    }

    #[test]
    fn test_repo_failure_aborts_before_upgrade() {
        let dir = tempfile::tempdir().unwrap();
        let mut runner = Recorder {
            fail_program_arg: Some("update"),
            ..Recorder::default()
        };
        let mut prompter = HeadlessPrompter;
        let env: HashMap<String, String> = HashMap::new();
        let err = Installer::new(options(dir.path()), &mut runner, &mut prompter)
            .run(&cli(), &env)
            .unwrap_err();

        assert!(matches!(err, InstallerError::Install(_)));
        assert!(err.to_string().contains("boom"));
        assert!(!runner.calls.iter().any(|c| c.contains(&"upgrade".to_string())));
        assert!(!dir.path().join("values-demo-1.yaml").exists());
    }

    #[test]
    fn test_keep_values_retains_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut runner = Recorder::default();
        let mut prompter = HeadlessPrompter;
        let env: HashMap<String, String> = HashMap::new();
        let opts = InstallOptions {
            keep_values: true,
            ..options(dir.path())
        };
        let outcome = Installer::new(opts, &mut runner, &mut prompter)
            .run(&cli(), &env)
            .unwrap();

        let path = dir.path().join("values-demo-1.yaml");
        assert_eq!(
            outcome,
            RunOutcome::Installed {
                retained: Some(path.clone())
            }
        );
        assert!(path.exists());
    }

    #[test]
    fn test_successful_run_reaches_done() {
        let dir = tempfile::tempdir().unwrap();
        let mut runner = Recorder::default();
        let mut prompter = HeadlessPrompter;
        let env: HashMap<String, String> = HashMap::new();
        let mut installer = Installer::new(options(dir.path()), &mut runner, &mut prompter);
        let outcome = installer.run(&cli(), &env).unwrap();

        assert_eq!(outcome, RunOutcome::Installed { retained: None });
        let stages: Vec<RunStage> = installer
            .context()
            .stage_history()
            .iter()
            .map(|(s, _)| *s)
            .collect();
        assert_eq!(
            stages,
            vec![
                RunStage::Collecting,
                RunStage::Confirming,
                RunStage::Rendering,
                RunStage::Installing,
                RunStage::CleaningUp,
                RunStage::Done,
            ]
        );
    }
}
