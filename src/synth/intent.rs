//! Intent synthesis: solved action and extras to launch arguments.

use crate::path::Constraint;
use crate::solver::SolverModel;

use super::fields;
use super::ConcreteInput;

/// Renders intent launch arguments.
///
/// Walks the translation table in declared order. A string-backed value
/// with a string-table entry is double-quoted; any other resolved value
/// is emitted in its literal form. Unresolved variables are omitted.
#[must_use]
pub fn synthesize(model: &SolverModel, constraint: &Constraint) -> ConcreteInput {
    let mut input = ConcreteInput::new();

    for mapping in &constraint.variables {
        let field = mapping.field.as_str();
        if fields::is_observation_key(field) {
            continue;
        }

        let Some(rendered) = model.rendered(&mapping.var) else {
            continue;
        };

        let value = if constraint.is_string_backed(&mapping.var) {
            match constraint.lookup_string(&rendered) {
                Some(literal) => format!("\"{literal}\""),
                None => rendered,
            }
        } else {
            rendered
        };
        input.push(field, value);
    }

    input
}

#[cfg(test)]
mod tests {
    use crate::path::FieldMapping;
    use crate::solver::{ResolvedValue, SolverModel};

    use super::*;

    #[test]
    fn test_action_quoted_and_extras_literal() {
        let mut c = Constraint::new("intent");
        c.variables.push(FieldMapping {
            var: "v2".to_string(),
            field: "-a".to_string(),
        });
        c.variables.push(FieldMapping {
            var: "v6".to_string(),
            field: "--ei".to_string(),
        });
        c.strings = vec!["v2".to_string()];
        c.string_map
            .insert("4".to_string(), "android.intent.action.VIEW".to_string());

        let mut model = SolverModel::new();
        model.insert("v2", ResolvedValue::Int(4));
        model.insert("v6", ResolvedValue::Int(12));

        let input = synthesize(&model, &c);
        assert_eq!(
            input.render(' '),
            "-a \"android.intent.action.VIEW\" --ei 12"
        );
    }

    #[test]
    fn test_unmapped_string_id_falls_back_to_literal() {
        let mut c = Constraint::new("intent");
        c.variables.push(FieldMapping {
            var: "v2".to_string(),
            field: "-a".to_string(),
        });
        c.strings = vec!["v2".to_string()];

        let mut model = SolverModel::new();
        model.insert("v2", ResolvedValue::Int(9));

        let input = synthesize(&model, &c);
        assert_eq!(input.render(' '), "-a 9");
    }
}
