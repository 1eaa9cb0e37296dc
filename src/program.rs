//! Symbolic programs: structured solver input produced per constraint by
//! the static analyzer.
//!
//! A program declares its free variables and a list of assertions over
//! them. Assertions are a small expression AST ingested with serde and
//! lowered by the solver adapter; generated source text is never executed
//! in-process.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{TriggerError, TriggerResult};

/// Sort of a free variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sort {
    /// Mathematical integer.
    Int,
    /// Mathematical real.
    Real,
    /// Integer id indexing a constraint's string table.
    StringId,
}

/// A free variable declared by a program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreeVariable {
    /// Variable name, also the key into solver models.
    pub name: String,
    /// Declared sort.
    pub sort: Sort,
}

/// Arithmetic expression over free variables and literals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Expr {
    Var { name: String },
    Int { value: i64 },
    Real { value: f64 },
    Add { lhs: Box<Expr>, rhs: Box<Expr> },
    Sub { lhs: Box<Expr>, rhs: Box<Expr> },
    Mul { lhs: Box<Expr>, rhs: Box<Expr> },
    Div { lhs: Box<Expr>, rhs: Box<Expr> },
    Neg { operand: Box<Expr> },
}

impl Expr {
    /// Variable reference.
    #[must_use]
    pub fn var(name: impl Into<String>) -> Self {
        Self::Var { name: name.into() }
    }

    /// Integer literal.
    #[must_use]
    pub const fn int(value: i64) -> Self {
        Self::Int { value }
    }

    /// Real literal.
    #[must_use]
    pub const fn real(value: f64) -> Self {
        Self::Real { value }
    }

    /// Sum of two expressions.
    #[must_use]
    pub fn add(lhs: Self, rhs: Self) -> Self {
        Self::Add {
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    /// Product of two expressions.
    #[must_use]
    pub fn mul(lhs: Self, rhs: Self) -> Self {
        Self::Mul {
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }
}

/// Boolean assertion over expressions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Assertion {
    Eq { lhs: Expr, rhs: Expr },
    Ne { lhs: Expr, rhs: Expr },
    Lt { lhs: Expr, rhs: Expr },
    Le { lhs: Expr, rhs: Expr },
    Gt { lhs: Expr, rhs: Expr },
    Ge { lhs: Expr, rhs: Expr },
    And { clauses: Vec<Assertion> },
    Or { clauses: Vec<Assertion> },
    Not { operand: Box<Assertion> },
}

impl Assertion {
    /// Equality assertion.
    #[must_use]
    pub fn eq(lhs: Expr, rhs: Expr) -> Self {
        Self::Eq { lhs, rhs }
    }

    /// Greater-than assertion.
    #[must_use]
    pub fn gt(lhs: Expr, rhs: Expr) -> Self {
        Self::Gt { lhs, rhs }
    }
}

/// A symbolic path-condition program: declared free variables plus the
/// assertions they must satisfy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolicProgram {
    /// Declared free variables.
    #[serde(default)]
    pub variables: Vec<FreeVariable>,

    /// Assertions over the declared variables.
    #[serde(default)]
    pub assertions: Vec<Assertion>,

    /// Identity used in diagnostics; set from the source file on load.
    #[serde(skip)]
    source: Option<String>,
}

impl SymbolicProgram {
    /// A program with no variables and no assertions.
    #[must_use]
    pub fn empty() -> Self {
        Self::new(Vec::new(), Vec::new())
    }

    /// Builds a program from parts, e.g. for tests and derived checks.
    #[must_use]
    pub fn new(variables: Vec<FreeVariable>, assertions: Vec<Assertion>) -> Self {
        Self {
            variables,
            assertions,
            source: None,
        }
    }

    /// Loads a program document from disk.
    ///
    /// # Errors
    ///
    /// Returns `TriggerError::Descriptor` if the file is missing or does
    /// not parse.
    pub fn load(path: &Path) -> TriggerResult<Self> {
        let raw = fs::read_to_string(path).map_err(|e| {
            TriggerError::descriptor(format!("failed to read {}: {e}", path.display()))
        })?;
        let mut program = Self::from_json(&raw)?;
        program.source = Some(path.display().to_string());
        Ok(program)
    }

    /// Parses a program from its JSON document form.
    ///
    /// # Errors
    ///
    /// Returns `TriggerError::Descriptor` on malformed JSON.
    pub fn from_json(raw: &str) -> TriggerResult<Self> {
        serde_json::from_str(raw)
            .map_err(|e| TriggerError::descriptor(format!("invalid program JSON: {e}")))
    }

    /// Identity for diagnostics (the source path, if loaded from disk).
    #[must_use]
    pub fn identity(&self) -> &str {
        self.source.as_deref().unwrap_or("<inline>")
    }

    /// Overrides the diagnostic identity.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.source = Some(name.into());
        self
    }

    /// Returns true if the program declares a variable with this name.
    #[must_use]
    pub fn declares(&self, name: &str) -> bool {
        self.variables.iter().any(|v| v.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "variables": [
            { "name": "v1", "sort": "real" },
            { "name": "v2", "sort": "int" },
            { "name": "v3", "sort": "string_id" }
        ],
        "assertions": [
            {
                "kind": "gt",
                "lhs": { "kind": "var", "name": "v1" },
                "rhs": { "kind": "real", "value": 50.0 }
            },
            {
                "kind": "and",
                "clauses": [
                    {
                        "kind": "eq",
                        "lhs": { "kind": "var", "name": "v2" },
                        "rhs": { "kind": "int", "value": 3 }
                    },
                    {
                        "kind": "ge",
                        "lhs": {
                            "kind": "add",
                            "lhs": { "kind": "var", "name": "v1" },
                            "rhs": { "kind": "real", "value": 1.5 }
                        },
                        "rhs": { "kind": "int", "value": 0 }
                    }
                ]
            }
        ]
    }"#;

    #[test]
    fn test_program_parses() {
        let p = SymbolicProgram::from_json(SAMPLE).unwrap();
        assert_eq!(p.variables.len(), 3);
        assert_eq!(p.assertions.len(), 2);
        assert!(p.declares("v1"));
        assert!(!p.declares("v9"));
        assert_eq!(p.variables[2].sort, Sort::StringId);
    }

    #[test]
    fn test_identity_defaults_to_inline() {
        let p = SymbolicProgram::empty();
        assert_eq!(p.identity(), "<inline>");
        let named = p.named("framework.onLocationChanged");
        assert_eq!(named.identity(), "framework.onLocationChanged");
    }

    #[test]
    fn test_builder_helpers_match_document_form() {
        let built = Assertion::gt(Expr::var("v1"), Expr::real(50.0));
        let parsed = SymbolicProgram::from_json(SAMPLE).unwrap();
        assert_eq!(built, parsed.assertions[0]);
    }

    #[test]
    fn test_malformed_program_is_descriptor_error() {
        let err = SymbolicProgram::from_json("[]").unwrap_err();
        assert!(matches!(err, TriggerError::Descriptor { .. }));
    }
}
