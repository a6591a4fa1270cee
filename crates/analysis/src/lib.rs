//! Abstract value analysis for Swarm specifications
//!
//! Two numerical domains (stripes of integer intervals, signs), one
//! generic evaluator, and a parallel chaos-automaton fixpoint that
//! over-approximates reachable variable values and certifies variables
//! that never change after initialization.

pub mod analyzer;
pub mod domain;
pub mod eval;
pub mod interval;
pub mod sign;
pub mod state;
pub mod stripes;

pub use analyzer::{value_analysis, ValueAnalysis, DEFAULT_BOUND};
pub use domain::{AbstractDomain, EvalError};
pub use eval::eval_expr;
pub use interval::Interval;
pub use sign::Sign;
pub use state::{AbstractState, BisectCache};
pub use stripes::Stripes;
