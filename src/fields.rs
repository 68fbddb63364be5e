//! Static definitions of the values the installer collects.
//!
//! Each field is identified by a closed `FieldId` enum instead of a string,
//! so lookups, flags, environment variable names and template slots all
//! derive from one place.

use regex::Regex;
use std::sync::LazyLock;
use strum::{Display, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

/// Identifier of a configuration field.
///
/// `Display` yields the CLI flag name without leading dashes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(Display, EnumString, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "kebab-case")]
pub enum FieldId {
    ClusterName,
    CustomerId,
    Region,
    ProjectId,
    CloudPlatform,
    Stage,
    EnvType,
    Username,
    Password,
}

/// Immutable definition of one configuration input.
#[derive(Debug)]
pub struct ConfigField {
    pub id: FieldId,
    /// Text shown when prompting interactively
    pub prompt: &'static str,
    /// Value used when nothing else is supplied
    pub default: Option<&'static str>,
    /// Regular expression the whole value must match
    pub pattern: &'static str,
    /// Human-readable description of what the pattern accepts
    pub hint: &'static str,
    /// Never echoed, logged or displayed
    pub sensitive: bool,
}

impl ConfigField {
    /// Whether `value` fully matches this field's pattern.
    pub fn accepts(&self, value: &str) -> bool {
        compiled_pattern(self.id).is_match(value)
    }

    /// Whether the field must be supplied (has no default).
    pub fn is_required(&self) -> bool {
        self.default.is_none()
    }
}

static FIELDS: [ConfigField; 9] = [
    ConfigField {
        id: FieldId::ClusterName,
        prompt: "Cluster name",
        default: None,
        pattern: r"^[a-z0-9]([a-z0-9-]*[a-z0-9])?$",
        hint: "lowercase letters, digits and inner dashes",
        sensitive: false,
    },
    ConfigField {
        id: FieldId::CustomerId,
        prompt: "Customer ID",
        default: None,
        pattern: r"^[A-Za-z0-9_-]+$",
        hint: "letters, digits, '_' and '-'",
        sensitive: false,
    },
    ConfigField {
        id: FieldId::Region,
        prompt: "Region",
        default: Some("us-east-1"),
        pattern: r"^[a-z0-9-]+$",
        hint: "lowercase letters, digits and '-'",
        sensitive: false,
    },
    ConfigField {
        id: FieldId::ProjectId,
        prompt: "Project ID",
        default: None,
        pattern: r"^[A-Za-z0-9_-]+$",
        hint: "letters, digits, '_' and '-'",
        sensitive: false,
    },
    ConfigField {
        id: FieldId::CloudPlatform,
        prompt: "Cloud platform",
        default: Some("AWS"),
        pattern: r"^[A-Za-z0-9_-]+$",
        hint: "letters, digits, '_' and '-'",
        sensitive: false,
    },
    ConfigField {
        id: FieldId::Stage,
        prompt: "Stage",
        default: Some("preprod"),
        pattern: r"^[a-z0-9-]+$",
        hint: "lowercase letters, digits and '-'",
        sensitive: false,
    },
    ConfigField {
        id: FieldId::EnvType,
        prompt: "Environment type",
        default: Some("prod"),
        pattern: r"^[a-z0-9-]+$",
        hint: "lowercase letters, digits and '-'",
        sensitive: false,
    },
    ConfigField {
        id: FieldId::Username,
        prompt: "Grafana Cloud username (numeric instance ID)",
        default: None,
        pattern: r"^[0-9]+$",
        hint: "digits only",
        sensitive: false,
    },
    ConfigField {
        id: FieldId::Password,
        prompt: "Grafana Cloud access token",
        default: None,
        pattern: r"^\S+$",
        hint: "no whitespace",
        sensitive: true,
    },
];

static PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    FIELDS
        .iter()
        .map(|f| {
            Regex::new(f.pattern)
                .unwrap_or_else(|e| panic!("INTERNAL ERROR: bad pattern for {}: {e}", f.id))
        })
        .collect()
});

fn compiled_pattern(id: FieldId) -> &'static Regex {
    &PATTERNS[id.index()]
}

impl FieldId {
    /// Position of this field in declaration order.
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Static definition for this field.
    pub fn definition(self) -> &'static ConfigField {
        &FIELDS[self.index()]
    }

    /// CLI flag name without leading dashes, e.g. `cluster-name`.
    pub fn flag_name(self) -> &'static str {
        self.into()
    }

    /// Environment variable consulted when the flag is absent, e.g. `CLUSTER_NAME`.
    pub fn env_var(self) -> String {
        self.flag_name().replace('-', "_").to_uppercase()
    }

    /// Slot name in the values template, e.g. `cluster_name`.
    pub fn template_key(self) -> String {
        self.flag_name().replace('-', "_")
    }
}

/// All field definitions in declaration order.
pub fn all_fields() -> impl Iterator<Item = &'static ConfigField> {
    FieldId::iter().map(FieldId::definition)
}
