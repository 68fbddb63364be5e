//! Tests for Installation Orchestration
//!
//! Drives `Installer::run` through the public API with a scripted prompter
//! and a recording tool runner.
//!
//! These tests verify:
//! - Value resolution order and fail-fast validation
//! - The confirmation gate
//! - Values file lifecycle (0600 during install, gone afterwards)
//! - helm invocation and failure handling

use k8smon::{
    CliValues, FieldId, InstallOptions, Installer, InstallerError, Prompter, RunMode, RunOutcome,
    RunStage, ToolArgs, ToolOutput, ToolRunner,
};
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

// =============================================================================
// Test doubles
// =============================================================================

/// Answers prompts from a queue and records everything shown.
#[derive(Default)]
struct ScriptedPrompter {
    answers: VecDeque<String>,
    prompts: Vec<String>,
    messages: Vec<String>,
}

impl ScriptedPrompter {
    fn new(answers: &[&str]) -> Self {
        Self {
            answers: answers.iter().map(|a| a.to_string()).collect(),
            ..Self::default()
        }
    }

    fn prompts_containing(&self, text: &str) -> usize {
        self.prompts.iter().filter(|p| p.contains(text)).count()
    }
}

impl Prompter for ScriptedPrompter {
    fn read_line(&mut self, prompt: &str) -> k8smon::Result<String> {
        self.prompts.push(prompt.to_string());
        self.answers
            .pop_front()
            .ok_or_else(|| InstallerError::terminal("end of input on terminal"))
    }

    fn read_secret(&mut self, prompt: &str) -> k8smon::Result<String> {
        self.read_line(prompt)
    }

    fn message(&mut self, text: &str) -> k8smon::Result<()> {
        self.messages.push(text.to_string());
        Ok(())
    }
}

/// What the upgrade step saw of the values file.
#[derive(Debug, Clone)]
struct ValuesSnapshot {
    path: PathBuf,
    mode: u32,
    contents: String,
}

/// Records every invocation; fails whichever one contains `fail_on`.
#[derive(Default)]
struct RecordingRunner {
    calls: Vec<Vec<String>>,
    fail_on: Option<&'static str>,
    snapshot: Option<ValuesSnapshot>,
}

impl RecordingRunner {
    fn failing_on(arg: &'static str) -> Self {
        Self {
            fail_on: Some(arg),
            ..Self::default()
        }
    }

    fn helm_calls(&self) -> Vec<&Vec<String>> {
        self.calls.iter().filter(|c| c[0] == "helm").collect()
    }

    fn upgrade_call(&self) -> Option<&Vec<String>> {
        self.calls
            .iter()
            .find(|c| c.get(1).map(String::as_str) == Some("upgrade"))
    }
}

impl ToolRunner for RecordingRunner {
    fn run(&mut self, args: &dyn ToolArgs) -> anyhow::Result<ToolOutput> {
        let mut argv = vec![args.program().to_string()];
        argv.extend(args.to_cli_args());

        if let Some(pos) = argv.iter().position(|a| a == "--values") {
            let path = PathBuf::from(&argv[pos + 1]);
            self.snapshot = Some(ValuesSnapshot {
                mode: fs::metadata(&path)?.mode() & 0o777,
                contents: fs::read_to_string(&path)?,
                path,
            });
        }

        let fail = self.fail_on.is_some_and(|f| argv.iter().any(|a| a == f));
        self.calls.push(argv);
        if fail {
            return Ok(ToolOutput::failed(1, "Error: UPGRADE FAILED: timed out waiting"));
        }
        Ok(ToolOutput::ok("kind-test\n"))
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn demo_cli() -> CliValues {
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

fn options(mode: RunMode, dir: &Path) -> InstallOptions {
    InstallOptions {
        mode,
        output_dir: dir.to_path_buf(),
        ..InstallOptions::default()
    }
}

fn no_env() -> HashMap<String, String> {
    HashMap::new()
}

fn dir_is_empty(dir: &Path) -> bool {
    fs::read_dir(dir).unwrap().next().is_none()
}

// =============================================================================
// Non-interactive runs
// =============================================================================

#[test]
fn test_non_interactive_demo_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let mut runner = RecordingRunner::default();
    let mut prompter = ScriptedPrompter::default();

    let outcome = Installer::new(
        options(RunMode::NonInteractive, dir.path()),
        &mut runner,
        &mut prompter,
    )
    .run(&demo_cli(), &no_env())
    .unwrap();

    assert_eq!(outcome, RunOutcome::Installed { retained: None });
    assert!(prompter.prompts.is_empty(), "non-interactive run must not prompt");

    let upgrade = runner.upgrade_call().expect("helm upgrade should run");
    assert!(upgrade.windows(2).any(|w| w == ["--namespace", "grafana-agent"]));
    assert!(upgrade.contains(&"grafana/k8s-monitoring".to_string()));

    let snapshot = runner.snapshot.clone().expect("values file passed to helm");
    assert_eq!(snapshot.path, dir.path().join("values-demo-1.yaml"));
    assert_eq!(snapshot.mode, 0o600);
    assert!(snapshot.contents.contains("\"us-east-1\""));
    assert!(snapshot.contents.contains("\"AWS\""));
    assert!(snapshot.contents.contains("\"preprod\""));
    assert!(snapshot.contents.contains("\"prod\""));

    assert!(!snapshot.path.exists(), "values file must be removed after the run");
    assert!(dir_is_empty(dir.path()));
}

#[test]
fn test_helm_steps_run_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let mut runner = RecordingRunner::default();
    let mut prompter = ScriptedPrompter::default();
    Installer::new(
        options(RunMode::NonInteractive, dir.path()),
        &mut runner,
        &mut prompter,
    )
    .run(&demo_cli(), &no_env())
    .unwrap();

    let steps: Vec<String> = runner
        .helm_calls()
        .iter()
        .map(|c| c[1..3].join(" "))
        .collect();
    assert_eq!(steps, vec!["repo add", "repo update", "upgrade --install"]);
}

#[test]
fn test_invalid_cli_value_fails_without_prompting() {
    let dir = tempfile::tempdir().unwrap();
    let mut cli = demo_cli();
    cli.insert(FieldId::ClusterName, "Demo_1".to_string());
    let mut runner = RecordingRunner::default();
    let mut prompter = ScriptedPrompter::new(&["should-not-be-read"]);

    let err = Installer::new(
        options(RunMode::Interactive, dir.path()),
        &mut runner,
        &mut prompter,
    )
    .run(&cli, &no_env())
    .unwrap_err();

    assert!(matches!(
        err,
        InstallerError::Validation {
            field: FieldId::ClusterName,
            ..
        }
    ));
    assert!(err.to_string().contains("command line"));
    assert!(prompter.prompts.is_empty());
    assert!(runner.helm_calls().is_empty());
    assert!(dir_is_empty(dir.path()));
}

#[test]
fn test_missing_required_value_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let mut cli = demo_cli();
    cli.remove(&FieldId::Password);
    let mut runner = RecordingRunner::default();
    let mut prompter = ScriptedPrompter::default();
    let mut installer = Installer::new(
        options(RunMode::NonInteractive, dir.path()),
        &mut runner,
        &mut prompter,
    );

    let err = installer.run(&cli, &no_env()).unwrap_err();
    assert!(matches!(err, InstallerError::MissingValue(FieldId::Password)));
    assert!(err.to_string().contains("PASSWORD"));
    assert_eq!(installer.context().current_stage(), RunStage::Failed);
    drop(installer);

    assert!(runner.helm_calls().is_empty());
    assert!(dir_is_empty(dir.path()));
}

#[test]
fn test_env_fills_missing_flags() {
    let dir = tempfile::tempdir().unwrap();
    let mut cli = demo_cli();
    cli.remove(&FieldId::Password);
    cli.remove(&FieldId::Region);
    let env: HashMap<String, String> = [
        ("PASSWORD".to_string(), "from-env".to_string()),
        ("REGION".to_string(), "eu-west-1".to_string()),
    ]
    .into();
    let mut runner = RecordingRunner::default();
    let mut prompter = ScriptedPrompter::default();

    Installer::new(
        options(RunMode::NonInteractive, dir.path()),
        &mut runner,
        &mut prompter,
    )
    .run(&cli, &env)
    .unwrap();

    let snapshot = runner.snapshot.unwrap();
    assert!(snapshot.contents.contains("\"from-env\""));
    assert!(snapshot.contents.contains("\"eu-west-1\""));
    assert!(prompter
        .messages
        .iter()
        .any(|m| m.contains("eu-west-1") && m.contains("environment")));
    assert!(!prompter.messages.iter().any(|m| m.contains("from-env")));
}

#[test]
fn test_install_failure_removes_values_file() {
    let dir = tempfile::tempdir().unwrap();
    let mut runner = RecordingRunner::failing_on("upgrade");
    let mut prompter = ScriptedPrompter::default();
    let mut installer = Installer::new(
        options(RunMode::NonInteractive, dir.path()),
        &mut runner,
        &mut prompter,
    );

    let err = installer.run(&demo_cli(), &no_env()).unwrap_err();
    assert!(matches!(err, InstallerError::Install(_)));
    assert!(err.to_string().contains("UPGRADE FAILED"));
    assert_eq!(installer.context().failed_at(), Some(RunStage::Installing));
    assert_eq!(installer.context().current_stage(), RunStage::Failed);
    drop(installer);

    let snapshot = runner.snapshot.unwrap();
    assert_eq!(snapshot.mode, 0o600);
    assert!(!snapshot.path.exists());
    assert!(dir_is_empty(dir.path()));
}

#[test]
fn test_keep_values_flag_retains_file() {
    let dir = tempfile::tempdir().unwrap();
    let mut runner = RecordingRunner::default();
    let mut prompter = ScriptedPrompter::default();
    let opts = InstallOptions {
        keep_values: true,
        ..options(RunMode::NonInteractive, dir.path())
    };

    let outcome = Installer::new(opts, &mut runner, &mut prompter)
        .run(&demo_cli(), &no_env())
        .unwrap();

    let kept = dir.path().join("values-demo-1.yaml");
    assert_eq!(
        outcome,
        RunOutcome::Installed {
            retained: Some(kept.clone())
        }
    );
    assert_eq!(fs::metadata(&kept).unwrap().mode() & 0o777, 0o600);
}

// =============================================================================
// Interactive runs
// =============================================================================

#[test]
fn test_interactive_reprompts_and_uses_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let mut runner = RecordingRunner::default();
    let mut prompter = ScriptedPrompter::new(&[
        "demo-1", // cluster name
        "W111",   // customer id
        "EU!",    // region, rejected
        "eu",     // region
        "p1",     // project id
        "",       // cloud platform -> default
        "",       // stage -> default
        "",       // env type -> default
        "12345",  // username
        "tok",    // password
        "y",      // proceed
        "",       // keep values file -> default no
    ]);

    let outcome = Installer::new(
        options(RunMode::Interactive, dir.path()),
        &mut runner,
        &mut prompter,
    )
    .run(&CliValues::new(), &no_env())
    .unwrap();

    assert_eq!(outcome, RunOutcome::Installed { retained: None });
    assert_eq!(prompter.prompts_containing("Region"), 2);
    assert!(prompter.messages.iter().any(|m| m.contains("Invalid region")));

    let contents = runner.snapshot.unwrap().contents;
    let parsed: serde_yaml::Value = serde_yaml::from_str(&contents).unwrap();
    let labels = &parsed["externalServices"]["prometheus"]["externalLabels"];
    assert_eq!(labels["region"].as_str(), Some("eu"));
    assert_eq!(labels["cloud_platform"].as_str(), Some("AWS"));
    assert_eq!(labels["stage"].as_str(), Some("preprod"));
    assert_eq!(labels["env_type"].as_str(), Some("prod"));
    assert!(dir_is_empty(dir.path()));
}

#[test]
fn test_interactive_only_prompts_for_missing_fields() {
    let dir = tempfile::tempdir().unwrap();
    let mut cli = demo_cli();
    cli.remove(&FieldId::Username);
    let mut runner = RecordingRunner::default();
    // region, cloud platform, stage, env type, username, proceed, keep
    let mut prompter = ScriptedPrompter::new(&["", "", "", "", "777", "yes", "n"]);

    Installer::new(
        options(RunMode::Interactive, dir.path()),
        &mut runner,
        &mut prompter,
    )
    .run(&cli, &no_env())
    .unwrap();

    assert_eq!(prompter.prompts_containing("Cluster name"), 0);
    assert_eq!(prompter.prompts_containing("username"), 1);
    assert!(runner.snapshot.unwrap().contents.contains("\"777\""));
}

#[test]
fn test_declining_changes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let mut runner = RecordingRunner::default();
    // defaults for the four optional fields, then decline
    let mut prompter = ScriptedPrompter::new(&["", "", "", "", "n"]);
    let mut installer = Installer::new(
        options(RunMode::Interactive, dir.path()),
        &mut runner,
        &mut prompter,
    );

    let outcome = installer.run(&demo_cli(), &no_env()).unwrap();
    assert_eq!(outcome, RunOutcome::Declined);
    assert_eq!(installer.context().current_stage(), RunStage::Done);
    assert!(!installer.context().is_confirmed());
    drop(installer);

    assert!(runner.helm_calls().is_empty());
    assert!(dir_is_empty(dir.path()));
}

#[test]
fn test_interactive_keep_values_answer() {
    let dir = tempfile::tempdir().unwrap();
    let mut runner = RecordingRunner::default();
    let mut prompter = ScriptedPrompter::new(&["", "", "", "", "y", "y"]);

    let outcome = Installer::new(
        options(RunMode::Interactive, dir.path()),
        &mut runner,
        &mut prompter,
    )
    .run(&demo_cli(), &no_env())
    .unwrap();

    let kept = dir.path().join("values-demo-1.yaml");
    assert_eq!(
        outcome,
        RunOutcome::Installed {
            retained: Some(kept.clone())
        }
    );
    assert!(kept.exists());
}

#[test]
fn test_end_of_input_fails_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let mut runner = RecordingRunner::default();
    let mut prompter = ScriptedPrompter::new(&["demo-1"]);

    let err = Installer::new(
        options(RunMode::Interactive, dir.path()),
        &mut runner,
        &mut prompter,
    )
    .run(&CliValues::new(), &no_env())
    .unwrap_err();

    assert!(matches!(err, InstallerError::Terminal(_)));
    assert!(dir_is_empty(dir.path()));
}

#[test]
fn test_password_never_shown() {
    let dir = tempfile::tempdir().unwrap();
    let mut cli = demo_cli();
    cli.insert(FieldId::Password, "glc_s3cr3t".to_string());
    let mut runner = RecordingRunner::default();
    let mut prompter = ScriptedPrompter::default();

    Installer::new(
        options(RunMode::NonInteractive, dir.path()),
        &mut runner,
        &mut prompter,
    )
    .run(&cli, &no_env())
    .unwrap();

    assert!(!prompter.messages.iter().any(|m| m.contains("glc_s3cr3t")));
    assert!(!runner.calls.iter().flatten().any(|a| a.contains("glc_s3cr3t")));
    assert!(runner.snapshot.unwrap().contents.contains("glc_s3cr3t"));
}
