//! Path descriptors: the per-application output of the static analyzer.
//!
//! A descriptor names the target package and maps path ids to ordered
//! event chains. Each constraint in a chain carries the metadata needed to
//! synthesize one concrete environment event: the symbolic-program
//! reference, the variable translation table, and the string table.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{TriggerError, TriggerResult};

/// File name of the descriptor document inside an analysis directory.
pub const DESCRIPTOR_FILE: &str = "appInfo.json";

/// Supported constraint type tags.
///
/// The wire/document form is the lowercase tag. Tags outside this set stay
/// representable as raw strings on [`Constraint`] so a chain can report
/// them instead of failing to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConstraintKind {
    Location,
    Sms,
    Boot,
    Alarm,
    Time,
    Activity,
    Service,
}

impl ConstraintKind {
    /// Parses a type tag, returning `None` for unrecognized tags.
    #[must_use]
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "location" => Some(Self::Location),
            "sms" => Some(Self::Sms),
            "boot" => Some(Self::Boot),
            "alarm" => Some(Self::Alarm),
            "time" => Some(Self::Time),
            "activity" => Some(Self::Activity),
            "service" => Some(Self::Service),
            _ => None,
        }
    }

    /// The lowercase tag used in documents and trigger commands.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Location => "location",
            Self::Sms => "sms",
            Self::Boot => "boot",
            Self::Alarm => "alarm",
            Self::Time => "time",
            Self::Activity => "activity",
            Self::Service => "service",
        }
    }
}

/// One entry of a constraint's variable translation table.
///
/// Maps a symbolic variable declared by the constraint's program to the
/// semantic field key it feeds. Table order is payload field order, so the
/// table is an explicit list rather than a map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMapping {
    /// Symbolic variable name as declared in the program.
    pub var: String,

    /// Semantic field key (observation name or wire field name).
    pub field: String,
}

/// One environment event in a chain, with the symbolic conditions its
/// injected data must satisfy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Constraint {
    /// Raw type tag. See [`Constraint::kind`].
    #[serde(rename = "type")]
    pub tag: String,

    /// Reference to the symbolic-program resource, relative to the
    /// analysis directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraints_file: Option<String>,

    /// Ordered translation table (symbolic variable -> semantic field key).
    #[serde(default)]
    pub variables: Vec<FieldMapping>,

    /// Symbolic variables whose resolved value is a string id.
    #[serde(default)]
    pub strings: Vec<String>,

    /// String table: solver string id -> literal.
    #[serde(default)]
    pub string_map: HashMap<String, String>,

    /// Target component for activity/service constraints.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
}

impl Constraint {
    /// Creates a bare constraint with the given type tag.
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            constraints_file: None,
            variables: Vec::new(),
            strings: Vec::new(),
            string_map: HashMap::new(),
            component: None,
        }
    }

    /// The parsed type tag, or `None` for tags this core does not handle.
    #[must_use]
    pub fn kind(&self) -> Option<ConstraintKind> {
        ConstraintKind::parse(&self.tag)
    }

    /// Looks up the symbolic variable feeding a semantic field key.
    #[must_use]
    pub fn var_for_field(&self, field: &str) -> Option<&str> {
        self.variables
            .iter()
            .find(|m| m.field == field)
            .map(|m| m.var.as_str())
    }

    /// Looks up the semantic field key a symbolic variable feeds.
    #[must_use]
    pub fn field_for_var(&self, var: &str) -> Option<&str> {
        self.variables
            .iter()
            .find(|m| m.var == var)
            .map(|m| m.field.as_str())
    }

    /// Returns true if the variable's resolved value is a string id.
    #[must_use]
    pub fn is_string_backed(&self, var: &str) -> bool {
        self.strings.iter().any(|s| s == var)
    }

    /// Resolves a string id through the string table.
    #[must_use]
    pub fn lookup_string(&self, id: &str) -> Option<&str> {
        self.string_map.get(id).map(String::as_str)
    }
}

/// An ordered chain of constraints; constraints fire in listed order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallPath {
    /// The events required to reach this path, in firing order.
    pub event_chain: Vec<Constraint>,
}

/// Descriptor of one analyzed application.
///
/// Immutable once loaded; owned by the session for the duration of one
/// analysis session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathDescriptor {
    /// Android package name of the target application.
    pub package_name: String,

    /// Main activity, relative to the package (leading `.` allowed).
    pub main_activity: String,

    /// Candidate paths keyed by path id.
    #[serde(default)]
    pub call_paths: BTreeMap<String, CallPath>,
}

impl PathDescriptor {
    /// Loads the descriptor from an analysis directory containing
    /// [`DESCRIPTOR_FILE`].
    ///
    /// # Errors
    ///
    /// Returns `TriggerError::Descriptor` if the file is missing or does
    /// not parse.
    pub fn load(dir: &Path) -> TriggerResult<Self> {
        let file = dir.join(DESCRIPTOR_FILE);
        let raw = fs::read_to_string(&file).map_err(|e| {
            TriggerError::descriptor(format!("failed to read {}: {e}", file.display()))
        })?;
        Self::from_json(&raw)
    }

    /// Parses a descriptor from its JSON document form.
    ///
    /// # Errors
    ///
    /// Returns `TriggerError::Descriptor` on malformed JSON.
    pub fn from_json(raw: &str) -> TriggerResult<Self> {
        serde_json::from_str(raw)
            .map_err(|e| TriggerError::descriptor(format!("invalid descriptor JSON: {e}")))
    }

    /// The constraints of one path, in firing order.
    #[must_use]
    pub fn chain(&self, path_id: &str) -> Option<&[Constraint]> {
        self.call_paths
            .get(path_id)
            .map(|p| p.event_chain.as_slice())
    }

    /// Fully qualified component name (`package/component`).
    #[must_use]
    pub fn component_name(&self, component: &str) -> String {
        format!("{}/{}", self.package_name, component)
    }

    /// Fully qualified main activity name.
    #[must_use]
    pub fn main_activity_name(&self) -> String {
        self.component_name(&self.main_activity)
    }
}
