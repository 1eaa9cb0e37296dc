//! SMS synthesis: solved sender/body/timestamp fields to a trigger
//! payload.

use chrono::NaiveDate;

use crate::path::Constraint;
use crate::solver::SolverModel;

use super::fields;
use super::ConcreteInput;

/// Renders the SMS trigger payload.
///
/// Walks the translation table in declared order. String-backed values
/// are resolved through the string table and double-quoted; a
/// string-backed value whose id has no table entry is omitted, as is any
/// variable the model did not resolve. The reserved date-format variable,
/// when present and resolvable, overrides the `time` field with the epoch
/// milliseconds of the encoded date.
#[must_use]
pub fn synthesize(model: &SolverModel, constraint: &Constraint) -> ConcreteInput {
    let mut input = ConcreteInput::new();

    for mapping in &constraint.variables {
        let field = mapping.field.as_str();
        if fields::is_observation_key(field) || field == fields::DATE_FORMAT {
            continue;
        }

        let Some(rendered) = model.rendered(&mapping.var) else {
            continue;
        };

        if constraint.is_string_backed(&mapping.var) {
            if let Some(literal) = constraint.lookup_string(&rendered) {
                input.push(field, format!("\"{literal}\""));
            }
        } else {
            input.push(field, rendered);
        }
    }

    if let Some(millis) = resolve_date_override(model, constraint) {
        input.remove(fields::TIME);
        input.push(fields::TIME, millis.to_string());
    }

    input
}

fn resolve_date_override(model: &SolverModel, constraint: &Constraint) -> Option<i64> {
    let var = constraint.var_for_field(fields::DATE_FORMAT)?;
    let rendered = model.rendered(var)?;
    let encoded = constraint.lookup_string(&rendered)?;
    mmddyyyy_to_epoch_millis(encoded)
}

/// Converts an 8-digit `MMddyyyy` date to epoch milliseconds at midnight
/// UTC. Returns `None` for malformed input or impossible dates.
#[must_use]
pub fn mmddyyyy_to_epoch_millis(raw: &str) -> Option<i64> {
    if raw.len() != 8 || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let month: u32 = raw[0..2].parse().ok()?;
    let day: u32 = raw[2..4].parse().ok()?;
    let year: i32 = raw[4..8].parse().ok()?;

    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    Some(date.and_hms_opt(0, 0, 0)?.and_utc().timestamp_millis())
}

#[cfg(test)]
mod tests {
    use crate::path::FieldMapping;
    use crate::solver::ResolvedValue;

    use super::*;

    fn sms_constraint() -> Constraint {
        let mut c = Constraint::new("sms");
        for (var, field) in [
            ("v3", "senderNumber"),
            ("v5", "userData"),
            ("v7", fields::TIME),
        ] {
            c.variables.push(FieldMapping {
                var: var.to_string(),
                field: field.to_string(),
            });
        }
        c.strings = vec!["v3".to_string(), "v5".to_string()];
        c.string_map
            .insert("17".to_string(), "5551212".to_string());
        c.string_map
            .insert("23".to_string(), "activate now".to_string());
        c
    }

    fn model_with(values: &[(&str, ResolvedValue)]) -> SolverModel {
        let mut model = SolverModel::new();
        for (name, value) in values {
            model.insert(*name, value.clone());
        }
        model
    }

    #[test]
    fn test_date_conversion_reference_value() {
        // 2020-12-31T00:00:00Z
        assert_eq!(mmddyyyy_to_epoch_millis("12312020"), Some(1_609_372_800_000));
    }

    #[test]
    fn test_date_conversion_rejects_malformed_input() {
        assert_eq!(mmddyyyy_to_epoch_millis("1231202"), None);
        assert_eq!(mmddyyyy_to_epoch_millis("123120201"), None);
        assert_eq!(mmddyyyy_to_epoch_millis("1231202x"), None);
        assert_eq!(mmddyyyy_to_epoch_millis("13312020"), None);
        assert_eq!(mmddyyyy_to_epoch_millis("02302021"), None);
    }

    #[test]
    fn test_string_backed_fields_quoted_from_table() {
        let c = sms_constraint();
        let model = model_with(&[
            ("v3", ResolvedValue::Int(17)),
            ("v5", ResolvedValue::Int(23)),
            ("v7", ResolvedValue::Int(1_600_000_000_000)),
        ]);

        let input = synthesize(&model, &c);
        assert_eq!(
            input.render(':'),
            "senderNumber:\"5551212\" userData:\"activate now\" time:1600000000000"
        );
    }

    #[test]
    fn test_unmapped_string_id_is_omitted() {
        let c = sms_constraint();
        // v5 resolves to an id with no string-table entry.
        let model = model_with(&[
            ("v3", ResolvedValue::Int(17)),
            ("v5", ResolvedValue::Int(99)),
        ]);

        let input = synthesize(&model, &c);
        assert_eq!(input.render(':'), "senderNumber:\"5551212\"");
    }

    #[test]
    fn test_unresolved_variable_is_omitted() {
        let c = sms_constraint();
        let model = model_with(&[("v3", ResolvedValue::Int(17))]);

        let input = synthesize(&model, &c);
        assert_eq!(input.render(':'), "senderNumber:\"5551212\"");
    }

    #[test]
    fn test_date_format_overrides_time_field() {
        let mut c = sms_constraint();
        c.variables.push(FieldMapping {
            var: "v9".to_string(),
            field: fields::DATE_FORMAT.to_string(),
        });
        c.strings.push("v9".to_string());
        c.string_map
            .insert("31".to_string(), "12312020".to_string());

        let model = model_with(&[
            ("v7", ResolvedValue::Int(1_600_000_000_000)),
            ("v9", ResolvedValue::Int(31)),
        ]);

        let input = synthesize(&model, &c);
        let time_values: Vec<&str> = input
            .iter()
            .filter(|(n, _)| *n == fields::TIME)
            .map(|(_, v)| v)
            .collect();
        assert_eq!(time_values, vec!["1609372800000"]);
    }
}
