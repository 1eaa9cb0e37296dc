//! Constraint solving: symbolic programs in, satisfying assignments out.

mod adapter;
mod model;

pub use adapter::{solve, Observed};
pub use model::{ResolvedValue, SolverModel, DECIMAL_PRECISION};
