//! Z3 adapter: lowers a symbolic program plus live observations into a
//! satisfiability check.
//!
//! Every solve call gets a fresh context and solver; nothing is shared
//! across constraints. Observed bindings are translated to symbolic
//! variable names through the constraint's translation table and asserted
//! as equalities; derived assertions (relations the caller needs the model
//! to respect, such as the geodesic displacement equation) are asserted
//! as-is.

use std::collections::HashMap;

use z3::ast::{Ast, Bool, Int, Real};
use z3::{Config, Context, SatResult, Solver};

use crate::error::{ConstraintError, TriggerResult};
use crate::path::Constraint;
use crate::program::{Assertion, Expr, Sort, SymbolicProgram};

use super::model::{ResolvedValue, SolverModel};

/// A literal observed on the live instance, bound into a solve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Observed {
    Int(i64),
    Real(f64),
}

impl Observed {
    /// Parses a wire field value; integers are preferred over reals.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        if let Ok(v) = raw.parse::<i64>() {
            return Some(Self::Int(v));
        }
        raw.parse::<f64>().ok().map(Self::Real)
    }
}

/// Binds observations to a program, appends derived assertions, and
/// checks satisfiability.
///
/// Bindings are `(semantic field key, literal)` pairs; keys with no entry
/// in the constraint's translation table, or translating to a variable
/// the program does not declare, are skipped: the analyzer routinely
/// reports more state than one program constrains.
///
/// # Errors
///
/// `ConstraintError::Unsatisfiable` when the combined assertions have no
/// model, `ConstraintError::Solver` for malformed programs or a solver
/// fault.
pub fn solve(
    program: &SymbolicProgram,
    constraint: &Constraint,
    bindings: &[(String, Observed)],
    derived: &[Assertion],
) -> TriggerResult<SolverModel> {
    let cfg = Config::new();
    let ctx = Context::new(&cfg);
    let solver = Solver::new(&ctx);

    let mut vars: HashMap<String, Num<'_>> = HashMap::new();
    for decl in &program.variables {
        let ast = match decl.sort {
            Sort::Int | Sort::StringId => Num::Int(Int::new_const(&ctx, decl.name.as_str())),
            Sort::Real => Num::Real(Real::new_const(&ctx, decl.name.as_str())),
        };
        vars.insert(decl.name.clone(), ast);
    }

    for assertion in &program.assertions {
        let lowered = lower_assertion(&ctx, &vars, assertion)
            .map_err(|e| malformed(program, &e))?;
        solver.assert(&lowered);
    }

    for (field, observed) in bindings {
        let Some(var) = constraint.var_for_field(field) else {
            continue;
        };
        let Some(ast) = vars.get(var) else {
            continue;
        };
        solver.assert(&bind_equality(&ctx, ast, *observed));
    }

    for assertion in derived {
        let lowered = lower_assertion(&ctx, &vars, assertion)
            .map_err(|e| malformed(program, &e))?;
        solver.assert(&lowered);
    }

    match solver.check() {
        SatResult::Sat => {
            let z3_model = solver.get_model().ok_or_else(|| {
                malformed(program, "satisfiable but no model produced")
            })?;
            extract_model(program, &z3_model, &vars)
        }
        SatResult::Unsat => Err(ConstraintError::Unsatisfiable {
            program: program.identity().to_string(),
        }
        .into()),
        SatResult::Unknown => Err(ConstraintError::Solver {
            message: format!("solver returned unknown for '{}'", program.identity()),
        }
        .into()),
    }
}

fn malformed(program: &SymbolicProgram, detail: &str) -> crate::error::TriggerError {
    ConstraintError::Solver {
        message: format!("program '{}': {detail}", program.identity()),
    }
    .into()
}

fn extract_model(
    program: &SymbolicProgram,
    z3_model: &z3::Model<'_>,
    vars: &HashMap<String, Num<'_>>,
) -> TriggerResult<SolverModel> {
    let mut model = SolverModel::new();

    for decl in &program.variables {
        let Some(ast) = vars.get(&decl.name) else {
            continue;
        };
        let value = match ast {
            Num::Int(i) => z3_model
                .eval(i, true)
                .and_then(|v| v.as_i64())
                .map(ResolvedValue::Int),
            Num::Real(r) => z3_model.eval(r, true).and_then(|v| v.as_real()).map(
                |(num, den)| {
                    if den == 1 {
                        ResolvedValue::Int(num)
                    } else {
                        ResolvedValue::Rational { num, den }
                    }
                },
            ),
        };

        match value {
            Some(v) => model.insert(decl.name.clone(), v),
            None => {
                return Err(malformed(
                    program,
                    &format!("could not evaluate model value for '{}'", decl.name),
                ))
            }
        }
    }

    Ok(model)
}

/// A lowered numeric term, still carrying its sort.
enum Num<'ctx> {
    Int(Int<'ctx>),
    Real(Real<'ctx>),
}

/// A sort-unified pair of operands.
enum Unified<'ctx> {
    Int(Int<'ctx>, Int<'ctx>),
    Real(Real<'ctx>, Real<'ctx>),
}

fn unify<'ctx>(a: Num<'ctx>, b: Num<'ctx>) -> Unified<'ctx> {
    match (a, b) {
        (Num::Int(a), Num::Int(b)) => Unified::Int(a, b),
        (a, b) => Unified::Real(to_real(a), to_real(b)),
    }
}

fn to_real(n: Num<'_>) -> Real<'_> {
    match n {
        Num::Int(i) => i.to_real(),
        Num::Real(r) => r,
    }
}

fn real_from_rational<'ctx>(ctx: &'ctx Context, num: i64, den: i64) -> Real<'ctx> {
    let numerator = Int::from_i64(ctx, num).to_real();
    if den == 1 {
        numerator
    } else {
        numerator / Int::from_i64(ctx, den).to_real()
    }
}

/// Rational form of a float literal: exact when a decimal scaling up to
/// 1e15 makes it integral, otherwise rounded at the largest power of ten
/// that still fits an i64.
fn f64_to_rational(value: f64) -> Option<(i64, i64)> {
    if !value.is_finite() {
        return None;
    }

    let mut scaled = value;
    let mut den: i64 = 1;
    for _ in 0..=15 {
        if scaled.fract() == 0.0 && scaled.abs() <= i64::MAX as f64 / 2.0 {
            return Some((scaled as i64, den));
        }
        scaled *= 10.0;
        den *= 10;
    }

    let mut den: i64 = 1_000_000_000_000_000;
    while den > 0 {
        let rounded = (value * den as f64).round();
        if rounded.abs() <= i64::MAX as f64 / 2.0 {
            return Some((rounded as i64, den));
        }
        den /= 10;
    }
    None
}

fn bind_equality<'ctx>(ctx: &'ctx Context, var: &Num<'ctx>, observed: Observed) -> Bool<'ctx> {
    match (var, observed) {
        (Num::Int(i), Observed::Int(v)) => i._eq(&Int::from_i64(ctx, v)),
        (Num::Int(i), Observed::Real(v)) => match f64_to_rational(v) {
            Some((num, den)) => i.to_real()._eq(&real_from_rational(ctx, num, den)),
            None => Bool::from_bool(ctx, false),
        },
        (Num::Real(r), Observed::Int(v)) => r._eq(&Int::from_i64(ctx, v).to_real()),
        (Num::Real(r), Observed::Real(v)) => match f64_to_rational(v) {
            Some((num, den)) => r._eq(&real_from_rational(ctx, num, den)),
            None => Bool::from_bool(ctx, false),
        },
    }
}

fn lower_expr<'ctx>(
    ctx: &'ctx Context,
    vars: &HashMap<String, Num<'ctx>>,
    expr: &Expr,
) -> Result<Num<'ctx>, String> {
    match expr {
        Expr::Var { name } => match vars.get(name) {
            Some(Num::Int(i)) => Ok(Num::Int(i.clone())),
            Some(Num::Real(r)) => Ok(Num::Real(r.clone())),
            None => Err(format!("reference to undeclared variable '{name}'")),
        },
        Expr::Int { value } => Ok(Num::Int(Int::from_i64(ctx, *value))),
        Expr::Real { value } => {
            let (num, den) = f64_to_rational(*value)
                .ok_or_else(|| format!("non-finite real literal {value}"))?;
            Ok(Num::Real(real_from_rational(ctx, num, den)))
        }
        Expr::Add { lhs, rhs } => {
            let (a, b) = (lower_expr(ctx, vars, lhs)?, lower_expr(ctx, vars, rhs)?);
            Ok(match unify(a, b) {
                Unified::Int(a, b) => Num::Int(a + b),
                Unified::Real(a, b) => Num::Real(a + b),
            })
        }
        Expr::Sub { lhs, rhs } => {
            let (a, b) = (lower_expr(ctx, vars, lhs)?, lower_expr(ctx, vars, rhs)?);
            Ok(match unify(a, b) {
                Unified::Int(a, b) => Num::Int(a - b),
                Unified::Real(a, b) => Num::Real(a - b),
            })
        }
        Expr::Mul { lhs, rhs } => {
            let (a, b) = (lower_expr(ctx, vars, lhs)?, lower_expr(ctx, vars, rhs)?);
            Ok(match unify(a, b) {
                Unified::Int(a, b) => Num::Int(a * b),
                Unified::Real(a, b) => Num::Real(a * b),
            })
        }
        Expr::Div { lhs, rhs } => {
            // Division is always rational.
            let a = to_real(lower_expr(ctx, vars, lhs)?);
            let b = to_real(lower_expr(ctx, vars, rhs)?);
            Ok(Num::Real(a / b))
        }
        Expr::Neg { operand } => {
            let inner = lower_expr(ctx, vars, operand)?;
            Ok(match inner {
                Num::Int(i) => Num::Int(Int::from_i64(ctx, 0) - i),
                Num::Real(r) => Num::Real(real_from_rational(ctx, 0, 1) - r),
            })
        }
    }
}

fn lower_assertion<'ctx>(
    ctx: &'ctx Context,
    vars: &HashMap<String, Num<'ctx>>,
    assertion: &Assertion,
) -> Result<Bool<'ctx>, String> {
    let compare = |lhs: &Expr,
                   rhs: &Expr,
                   int_cmp: fn(&Int<'ctx>, &Int<'ctx>) -> Bool<'ctx>,
                   real_cmp: fn(&Real<'ctx>, &Real<'ctx>) -> Bool<'ctx>|
     -> Result<Bool<'ctx>, String> {
        let (a, b) = (lower_expr(ctx, vars, lhs)?, lower_expr(ctx, vars, rhs)?);
        Ok(match unify(a, b) {
            Unified::Int(a, b) => int_cmp(&a, &b),
            Unified::Real(a, b) => real_cmp(&a, &b),
        })
    };

    match assertion {
        Assertion::Eq { lhs, rhs } => compare(lhs, rhs, |a, b| a._eq(b), |a, b| a._eq(b)),
        Assertion::Ne { lhs, rhs } => {
            Ok(compare(lhs, rhs, |a, b| a._eq(b), |a, b| a._eq(b))?.not())
        }
        Assertion::Lt { lhs, rhs } => compare(lhs, rhs, Int::lt, Real::lt),
        Assertion::Le { lhs, rhs } => compare(lhs, rhs, Int::le, Real::le),
        Assertion::Gt { lhs, rhs } => compare(lhs, rhs, Int::gt, Real::gt),
        Assertion::Ge { lhs, rhs } => compare(lhs, rhs, Int::ge, Real::ge),
        Assertion::And { clauses } => {
            let lowered = clauses
                .iter()
                .map(|c| lower_assertion(ctx, vars, c))
                .collect::<Result<Vec<_>, _>>()?;
            let refs: Vec<&Bool<'_>> = lowered.iter().collect();
            Ok(Bool::and(ctx, &refs))
        }
        Assertion::Or { clauses } => {
            let lowered = clauses
                .iter()
                .map(|c| lower_assertion(ctx, vars, c))
                .collect::<Result<Vec<_>, _>>()?;
            let refs: Vec<&Bool<'_>> = lowered.iter().collect();
            Ok(Bool::or(ctx, &refs))
        }
        Assertion::Not { operand } => Ok(lower_assertion(ctx, vars, operand)?.not()),
    }
}

#[cfg(test)]
mod tests {
    use crate::error::TriggerError;
    use crate::path::FieldMapping;
    use crate::program::FreeVariable;

    use super::*;

    fn program(variables: Vec<FreeVariable>, assertions: Vec<Assertion>) -> SymbolicProgram {
        SymbolicProgram::new(variables, assertions).named("test-program")
    }

    fn int_var(name: &str) -> FreeVariable {
        FreeVariable {
            name: name.to_string(),
            sort: Sort::Int,
        }
    }

    fn real_var(name: &str) -> FreeVariable {
        FreeVariable {
            name: name.to_string(),
            sort: Sort::Real,
        }
    }

    #[test]
    fn test_sat_program_resolves_pinned_variable() {
        let p = program(
            vec![int_var("x")],
            vec![Assertion::eq(Expr::var("x"), Expr::int(3))],
        );
        let c = Constraint::new("sms");

        let model = solve(&p, &c, &[], &[]).unwrap();
        assert_eq!(model.get("x"), Some(&ResolvedValue::Int(3)));
    }

    #[test]
    fn test_unconstrained_variable_resolves_via_completion() {
        let p = program(vec![int_var("x"), int_var("y")], vec![]);
        let c = Constraint::new("sms");

        let model = solve(&p, &c, &[], &[]).unwrap();
        assert_eq!(model.len(), 2);
        assert!(model.get("y").is_some());
    }

    #[test]
    fn test_unsat_program_is_typed_failure() {
        let p = program(
            vec![int_var("x")],
            vec![
                Assertion::gt(Expr::var("x"), Expr::int(2)),
                Assertion::Lt {
                    lhs: Expr::var("x"),
                    rhs: Expr::int(1),
                },
            ],
        );
        let c = Constraint::new("sms");

        let err = solve(&p, &c, &[], &[]).unwrap_err();
        let TriggerError::Constraint(ConstraintError::Unsatisfiable { program }) = err else {
            panic!("expected unsatisfiable, got {err:?}");
        };
        assert_eq!(program, "test-program");
    }

    #[test]
    fn test_bindings_translate_through_table() {
        let p = program(vec![int_var("t")], vec![]);
        let mut c = Constraint::new("sms");
        c.variables.push(FieldMapping {
            var: "t".to_string(),
            field: "time".to_string(),
        });

        let model = solve(&p, &c, &[("time".to_string(), Observed::Int(1700))], &[]).unwrap();
        assert_eq!(model.get("t"), Some(&ResolvedValue::Int(1700)));
    }

    #[test]
    fn test_unmapped_binding_is_skipped() {
        let p = program(vec![int_var("t")], vec![]);
        let c = Constraint::new("sms");

        // "time" has no table entry; the solve still succeeds.
        let model = solve(&p, &c, &[("time".to_string(), Observed::Int(1700))], &[]).unwrap();
        assert_eq!(model.len(), 1);
    }

    #[test]
    fn test_derived_assertions_constrain_the_model() {
        let p = program(vec![real_var("delta"), real_var("lat")], vec![]);
        let c = Constraint::new("location");

        let derived = vec![
            Assertion::eq(Expr::var("delta"), Expr::real(100.0)),
            Assertion::eq(
                Expr::var("lat"),
                Expr::add(Expr::real(37.0), Expr::var("delta")),
            ),
        ];
        let model = solve(&p, &c, &[], &derived).unwrap();
        assert_eq!(model.numeric("delta"), Some(100.0));
        assert_eq!(model.numeric("lat"), Some(137.0));
    }

    #[test]
    fn test_real_binding_against_real_variable() {
        let p = program(vec![real_var("lat")], vec![]);
        let mut c = Constraint::new("location");
        c.variables.push(FieldMapping {
            var: "lat".to_string(),
            field: "prevLatitude".to_string(),
        });

        let model = solve(
            &p,
            &c,
            &[("prevLatitude".to_string(), Observed::Real(37.5))],
            &[],
        )
        .unwrap();
        assert_eq!(model.numeric("lat"), Some(37.5));
    }

    #[test]
    fn test_undeclared_variable_in_assertion_is_solver_error() {
        let p = program(
            vec![int_var("x")],
            vec![Assertion::eq(Expr::var("nope"), Expr::int(1))],
        );
        let c = Constraint::new("sms");

        let err = solve(&p, &c, &[], &[]).unwrap_err();
        assert!(matches!(
            err,
            TriggerError::Constraint(ConstraintError::Solver { .. })
        ));
    }

    #[test]
    fn test_observed_parse_prefers_integers() {
        assert_eq!(Observed::parse("42"), Some(Observed::Int(42)));
        assert_eq!(Observed::parse("-7"), Some(Observed::Int(-7)));
        assert_eq!(Observed::parse("37.25"), Some(Observed::Real(37.25)));
        assert_eq!(Observed::parse("not-a-number"), None);
    }
}
