//! Configuration resolution.
//!
//! Each field is resolved in priority order: CLI flag, environment variable,
//! interactive prompt (offering the default), and in non-interactive mode the
//! default. Values supplied by flag or environment are validated before any
//! prompt is shown, so a bad flag fails the run without asking anything.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use tracing::{debug, info};

use crate::error::{InstallerError, Result};
use crate::fields::{all_fields, ConfigField, FieldId};
use crate::prompt::Prompter;

/// Placeholder shown instead of sensitive values.
pub const MASK: &str = "********";

/// Where a resolved value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSource {
    Cli,
    Env,
    Interactive,
    Default,
}

impl fmt::Display for ValueSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ValueSource::Cli => "command line",
            ValueSource::Env => "environment",
            ValueSource::Interactive => "prompt",
            ValueSource::Default => "default",
        };
        write!(f, "{}", s)
    }
}

/// Operating mode of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Interactive,
    NonInteractive,
}

/// A resolved value together with its origin.
#[derive(Clone, PartialEq, Eq)]
pub struct ConfigValue {
    pub value: String,
    pub source: ValueSource,
}

/// The complete, validated set of values for one run.
///
/// Only constructed by `Resolver::resolve`, which guarantees every field is
/// present, non-empty and matches its pattern.
#[derive(Clone, PartialEq, Eq)]
pub struct ConfigValues {
    values: BTreeMap<FieldId, ConfigValue>,
}

impl ConfigValues {
    /// Raw value of a field.
    pub fn get(&self, id: FieldId) -> &str {
        // Construction guarantees every FieldId is present
        self.values
            .get(&id)
            .map(|v| v.value.as_str())
            .unwrap_or_default()
    }

    /// Origin of a field's value.
    pub fn source(&self, id: FieldId) -> Option<ValueSource> {
        self.values.get(&id).map(|v| v.source)
    }

    /// Value safe for display: sensitive fields are masked.
    pub fn display_value(&self, id: FieldId) -> &str {
        if id.definition().sensitive {
            MASK
        } else {
            self.get(id)
        }
    }

    /// Values in field declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (FieldId, &ConfigValue)> {
        self.values.iter().map(|(id, v)| (*id, v))
    }
}

impl fmt::Debug for ConfigValues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(
                self.values
                    .iter()
                    .map(|(id, v)| (id.flag_name(), (self.display_value(*id), v.source))),
            )
            .finish()
    }
}

/// Lookup of environment variables, injectable for tests.
pub trait EnvSource {
    fn var(&self, name: &str) -> Option<String>;
}

/// The real process environment.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

impl EnvSource for HashMap<String, String> {
    fn var(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

/// Values given on the command line, keyed by field.
pub type CliValues = BTreeMap<FieldId, String>;

/// Resolves every field from its sources.
pub struct Resolver<'a> {
    cli: &'a CliValues,
    env: &'a dyn EnvSource,
    mode: RunMode,
}

impl<'a> Resolver<'a> {
    pub fn new(cli: &'a CliValues, env: &'a dyn EnvSource, mode: RunMode) -> Self {
        Self { cli, env, mode }
    }

    /// Resolve all fields.
    ///
    /// # Errors
    ///
    /// - `Validation` if a flag or environment value fails its pattern
    /// - `MissingValue` in non-interactive mode when a field without default is absent
    /// - `Terminal` if interactive input cannot be read
    pub fn resolve(&self, prompter: &mut dyn Prompter) -> Result<ConfigValues> {
        let mut values = BTreeMap::new();

        // First pass: everything supplied up front, fail fast on bad input
        for field in all_fields() {
            if let Some(supplied) = self.supplied(field)? {
                values.insert(field.id, supplied);
            }
        }

        // Second pass: fill the gaps
        for field in all_fields() {
            if values.contains_key(&field.id) {
                continue;
            }
            let resolved = match self.mode {
                RunMode::NonInteractive => match field.default {
                    Some(default) => ConfigValue {
                        value: default.to_string(),
                        source: ValueSource::Default,
                    },
                    None => return Err(InstallerError::MissingValue(field.id)),
                },
                RunMode::Interactive => prompt_field(field, prompter)?,
            };
            values.insert(field.id, resolved);
        }

        let values = ConfigValues { values };
        for (id, v) in values.iter() {
            info!("{} = {} ({})", id, values.display_value(id), v.source);
        }
        Ok(values)
    }

    fn supplied(&self, field: &ConfigField) -> Result<Option<ConfigValue>> {
        let from_cli = self
            .cli
            .get(&field.id)
            .filter(|v| !v.is_empty())
            .map(|v| (v.clone(), ValueSource::Cli));
        let candidate = from_cli.or_else(|| {
            self.env
                .var(&field.id.env_var())
                .filter(|v| !v.is_empty())
                .map(|v| (v, ValueSource::Env))
        });

        let Some((value, source)) = candidate else {
            return Ok(None);
        };
        if !field.accepts(&value) {
            return Err(InstallerError::validation(
                field.id,
                source,
                format!("expected {}", field.hint),
            ));
        }
        debug!("{} supplied via {}", field.id, source);
        Ok(Some(ConfigValue { value, source }))
    }
}

/// Prompt until the operator enters a valid value.
fn prompt_field(field: &ConfigField, prompter: &mut dyn Prompter) -> Result<ConfigValue> {
    let prompt = match field.default {
        Some(default) => format!("{} [{}]: ", field.prompt, default),
        None => format!("{}: ", field.prompt),
    };

    loop {
        let raw = if field.sensitive {
            prompter.read_secret(&prompt)?
        } else {
            prompter.read_line(&prompt)?
        };
        let entered = raw.trim();

        if entered.is_empty() {
            if let Some(default) = field.default {
                return Ok(ConfigValue {
                    value: default.to_string(),
                    source: ValueSource::Default,
                });
            }
            prompter.message(&format!("  ✗ {} is required", field.prompt))?;
            continue;
        }

        if field.accepts(entered) {
            return Ok(ConfigValue {
                value: entered.to_string(),
                source: ValueSource::Interactive,
            });
        }
        prompter.message(&format!(
            "  ✗ Invalid {}: expected {}",
            field.id, field.hint
        ))?;
    }
}
