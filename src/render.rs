//! Values document rendering.
//!
//! The template is owned by the chart and treated as opaque text: the only
//! work done here is replacing each `{{ field_key }}` slot with the resolved
//! value as a double-quoted YAML scalar. Every field must have a slot and
//! every slot must name a field.

use regex::{Captures, Regex};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use strum::IntoEnumIterator;

use crate::error::{InstallerError, Result};
use crate::fields::FieldId;
use crate::resolver::ConfigValues;

/// Values template for the grafana/k8s-monitoring chart.
pub const VALUES_TEMPLATE: &str = include_str!("../templates/k8s-monitoring-values.yaml");

static SLOT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z0-9_]+)\s*\}\}")
        .unwrap_or_else(|e| panic!("INTERNAL ERROR: bad slot pattern: {e}"))
});

/// A rendered values document, not yet on disk.
#[derive(Clone, PartialEq, Eq)]
pub struct RenderedDocument {
    pub file_name: String,
    pub contents: String,
}

impl std::fmt::Debug for RenderedDocument {
    // contents hold the token
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderedDocument")
            .field("file_name", &self.file_name)
            .field("len", &self.contents.len())
            .finish()
    }
}

impl RenderedDocument {
    pub fn path_in(&self, dir: &Path) -> PathBuf {
        dir.join(&self.file_name)
    }
}

/// Name of the values file for a cluster.
pub fn values_file_name(cluster_name: &str) -> String {
    format!("values-{}.yaml", cluster_name)
}

/// Render the built-in template.
pub fn render(values: &ConfigValues) -> Result<RenderedDocument> {
    render_template(VALUES_TEMPLATE, values)
}

/// Render `template` with `values`.
///
/// # Errors
///
/// `Render` if a slot names an unknown field, a field has no slot, or the
/// result is not valid YAML.
pub fn render_template(template: &str, values: &ConfigValues) -> Result<RenderedDocument> {
    let mut unknown = BTreeSet::new();
    let mut used = BTreeSet::new();

    let contents = SLOT
        .replace_all(template, |caps: &Captures| {
            let key = &caps[1];
            match FieldId::iter().find(|id| id.template_key() == key) {
                Some(id) => {
                    used.insert(id);
                    yaml_quote(values.get(id))
                }
                None => {
                    unknown.insert(key.to_string());
                    caps[0].to_string()
                }
            }
        })
        .into_owned();

    if !unknown.is_empty() {
        let keys: Vec<String> = unknown.into_iter().collect();
        return Err(InstallerError::render(format!(
            "template references unknown fields: {}",
            keys.join(", ")
        )));
    }

    let missing: Vec<&str> = FieldId::iter()
        .filter(|id| !used.contains(id))
        .map(FieldId::flag_name)
        .collect();
    if !missing.is_empty() {
        return Err(InstallerError::render(format!(
            "template has no slot for: {}",
            missing.join(", ")
        )));
    }

    serde_yaml::from_str::<serde_yaml::Value>(&contents)
        .map_err(|e| InstallerError::render(format!("rendered document is not valid YAML: {e}")))?;

    Ok(RenderedDocument {
        file_name: values_file_name(values.get(FieldId::ClusterName)),
        contents,
    })
}

/// Double-quoted scalar. JSON string syntax is valid YAML once the
/// characters YAML does not allow unescaped are turned into `\u` escapes.
fn yaml_quote(value: &str) -> String {
    let json = serde_json::Value::String(value.to_string()).to_string();
    if json.chars().all(yaml_printable) {
        return json;
    }
    json.chars().fold(String::with_capacity(json.len()), |mut out, c| {
        if yaml_printable(c) {
            out.push(c);
        } else {
            out.push_str(&format!("\\u{:04X}", c as u32));
        }
        out
    })
}

/// Characters that may appear literally inside a quoted scalar on one line.
fn yaml_printable(c: char) -> bool {
    matches!(c,
        ' '..='~'
        | '\u{A0}'..='\u{2027}'
        | '\u{202A}'..='\u{D7FF}'
        | '\u{E000}'..='\u{FEFE}'
        | '\u{FF00}'..='\u{FFFD}'
        | '\u{10000}'..='\u{10FFFF}')
}
