//! Type-safe external tool argument contracts.
//!
//! Every invocation of `kubectl` or `helm` is described by a struct that
//! implements `ToolArgs`. The struct definition is the contract: the argv is
//! generated from typed fields, so flag names are fixed at compile time and
//! no call site assembles raw string vectors.

use std::time::Duration;

/// Trait for typed tool arguments.
///
/// # Contract
///
/// - `program()`: binary name resolved through `PATH` (e.g. "helm").
/// - `to_cli_args()`: argv after the program name, exactly as the tool expects it.
/// - `timeout()`: upper bound on how long the invocation may run.
///
/// # Invariants
///
/// - Arguments never contain credentials; secrets travel via the values file.
pub trait ToolArgs {
    fn program(&self) -> &'static str;

    fn to_cli_args(&self) -> Vec<String>;

    fn timeout(&self) -> Duration;

    /// Short label used in logs and error messages.
    fn describe(&self) -> String {
        format!("{} {}", self.program(), self.to_cli_args().join(" "))
    }
}
