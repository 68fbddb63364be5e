//! k8smon Library
//!
//! Core functionality of the Kubernetes monitoring installer: configuration
//! resolution, the confirmation gate, values rendering, secret file
//! lifecycle and typed `kubectl`/`helm` invocation.

pub mod cli;
pub mod confirm;
pub mod error;
pub mod fields;
pub mod installer;
pub mod process_guard;
pub mod prompt;
pub mod render;
pub mod resolver;
pub mod run_state;
pub mod sanity;
pub mod secret_file;
pub mod tool_args;
pub mod tool_runner;
pub mod tools;

// Re-export main types for convenience
pub use confirm::{confirmation_gate, summary_lines, InstallTarget};
pub use error::{InstallerError, Result};
pub use fields::{all_fields, ConfigField, FieldId};
pub use installer::{InstallOptions, Installer, RunOutcome};
pub use process_guard::{ChildRegistry, CommandProcessGroup};
pub use prompt::{confirm, HeadlessPrompter, Prompter, TtyPrompter};
pub use render::{render, render_template, values_file_name, RenderedDocument, VALUES_TEMPLATE};
pub use resolver::{
    CliValues, ConfigValue, ConfigValues, EnvSource, ProcessEnv, Resolver, RunMode, ValueSource,
    MASK,
};
pub use run_state::{RunContext, RunStage, RunTransitionError};
pub use secret_file::{SecretFile, SecretRegistry};
pub use tool_args::ToolArgs;
pub use tool_runner::{run_tool_safe, SystemToolRunner, ToolOutput, ToolRunner};
