//! Location synthesis: previous fix plus solved displacement to an
//! injected coordinate pair.

use crate::error::{ConstraintError, TriggerResult};
use crate::path::Constraint;
use crate::program::{Assertion, Expr};
use crate::solver::SolverModel;

use super::fields;
use super::ConcreteInput;

/// Equatorial Earth radius, meters.
pub const EQUATORIAL_RADIUS_M: f64 = 6_378_137.0;

/// The previous fix observed from the remote location service.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PreviousFix {
    pub latitude: f64,
    pub longitude: f64,
}

/// Projects a scalar displacement onto both axes from the previous fix.
///
/// Returns `(latitude, longitude)` of the injected fix:
///
/// ```text
/// new_lat = prev_lat + (180/pi) * (delta / R)
/// new_lon = prev_lon + (180/pi) * (delta / R) / cos(radians(prev_lat))
/// ```
#[must_use]
pub fn project(prev: PreviousFix, displacement_m: f64) -> (f64, f64) {
    let angular = (180.0 / std::f64::consts::PI) * (displacement_m / EQUATORIAL_RADIUS_M);
    let latitude = prev.latitude + angular;
    let longitude = prev.longitude + angular / prev.latitude.to_radians().cos();
    (latitude, longitude)
}

/// Solver-side mirror of [`project`]: equality assertions tying the
/// injected-coordinate variables to the displacement variable, so path
/// conditions over the new coordinates constrain the displacement the
/// model picks.
///
/// Entries are produced only for coordinate variables the translation
/// table actually maps; with no displacement variable there is nothing to
/// tie and the list is empty.
#[must_use]
pub fn displacement_assertions(constraint: &Constraint, prev: PreviousFix) -> Vec<Assertion> {
    let Some(delta) = constraint.var_for_field(fields::DISPLACEMENT) else {
        return Vec::new();
    };

    let angular_per_meter = (180.0 / std::f64::consts::PI) / EQUATORIAL_RADIUS_M;
    let mut out = Vec::new();

    if let Some(lat_var) = constraint.var_for_field(fields::LATITUDE) {
        out.push(Assertion::eq(
            Expr::var(lat_var),
            Expr::add(
                Expr::real(prev.latitude),
                Expr::mul(Expr::real(angular_per_meter), Expr::var(delta)),
            ),
        ));
    }

    if let Some(lon_var) = constraint.var_for_field(fields::LONGITUDE) {
        let per_meter = angular_per_meter / prev.latitude.to_radians().cos();
        out.push(Assertion::eq(
            Expr::var(lon_var),
            Expr::add(
                Expr::real(prev.longitude),
                Expr::mul(Expr::real(per_meter), Expr::var(delta)),
            ),
        ));
    }

    out
}

/// Renders the location trigger payload.
///
/// The solved displacement drives the coordinate projection; every other
/// table entry is resolved from the model, with string-backed values
/// looked up and quoted. Variables the model does not resolve are
/// omitted.
///
/// # Errors
///
/// `ConstraintError::MissingMetadata` when the table maps no displacement
/// variable or the model did not resolve it.
pub fn synthesize(
    model: &SolverModel,
    constraint: &Constraint,
    prev: PreviousFix,
) -> TriggerResult<ConcreteInput> {
    let displacement = constraint
        .var_for_field(fields::DISPLACEMENT)
        .and_then(|var| model.numeric(var))
        .ok_or_else(|| ConstraintError::MissingMetadata {
            field: fields::DISPLACEMENT.to_string(),
        })?;

    let (latitude, longitude) = project(prev, displacement);

    let mut input = ConcreteInput::new();
    for mapping in &constraint.variables {
        let field = mapping.field.as_str();
        if fields::is_observation_key(field) || field == fields::DISPLACEMENT {
            continue;
        }

        match field {
            fields::LATITUDE => input.push(field, latitude.to_string()),
            fields::LONGITUDE => input.push(field, longitude.to_string()),
            _ => {
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
        }
    }

    Ok(input)
}
