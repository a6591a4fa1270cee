//! The abstract-domain trait
//!
//! One generic expression evaluator serves both Stripes and Sign; this
//! trait is the seam between them. Fallible operations surface
//! `EvalError::Arithmetic`, which the analyzer treats as a bail-out for
//! the current iteration, never as a fatal error.

use std::fmt::{Debug, Display};
use std::hash::Hash;

use crate::sign::Sign;
use crate::stripes::Stripes;

/// Errors raised while evaluating an expression abstractly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvalError {
    /// The evaluator has no rule for this node shape.
    Unsupported(String),
    /// An operator produced an empty result (division by zero interval,
    /// empty nondeterministic range).
    Arithmetic(String),
}

impl Display for EvalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EvalError::Unsupported(what) => write!(f, "unsupported expression: {}", what),
            EvalError::Arithmetic(msg) => write!(f, "abstract arithmetic error: {}", msg),
        }
    }
}

impl std::error::Error for EvalError {}

/// Numerical abstract domain: lattice join, arithmetic, three-valued
/// ordering, and guard-directed bisection.
pub trait AbstractDomain:
    Clone + PartialEq + Eq + Hash + Debug + Display + Send + Sync + Sized + 'static
{
    /// Minimal abstraction of a finite value set.
    fn abstract_values(values: &[i64]) -> Self;
    /// Abstraction of the inclusive range `[lo, hi]`.
    fn abstract_range(lo: i64, hi: i64) -> Self;

    fn yes() -> Self;
    fn no() -> Self;
    fn maybe() -> Self;

    fn contains(&self, v: i64) -> bool;
    fn is_within(&self, other: &Self) -> bool;
    fn join(&self, other: &Self) -> Self;
    fn join_adjacent(&self) -> Self;
    /// Split into two halves; `None` on singletons (refinement stops).
    fn bisect(&self) -> Option<(Self, Self)>;

    fn add(&self, other: &Self) -> Self;
    fn sub(&self, other: &Self) -> Self;
    fn mul(&self, other: &Self) -> Self;
    fn div(&self, other: &Self) -> Result<Self, EvalError>;
    fn rem(&self, other: &Self) -> Result<Self, EvalError>;
    fn neg(&self) -> Self;
    fn abs(&self) -> Self;
    fn not_(&self) -> Self;
    fn min_(&self, other: &Self) -> Self;
    fn max_(&self, other: &Self) -> Self;
    fn and_(&self, other: &Self) -> Self;
    fn or_(&self, other: &Self) -> Self;
    fn equality(&self, other: &Self) -> Self;
    fn lt(&self, other: &Self) -> Self;
    fn gt(&self, other: &Self) -> Self;
    fn le(&self, other: &Self) -> Self;
    fn ge(&self, other: &Self) -> Self;
    /// Evaluate `[self .. other)`.
    fn range_nondet(&self, other: &Self) -> Result<Self, EvalError>;
}

fn arith(e: String) -> EvalError {
    EvalError::Arithmetic(e)
}

impl AbstractDomain for Stripes {
    fn abstract_values(values: &[i64]) -> Self {
        Stripes::abstract_values(values)
    }
    fn abstract_range(lo: i64, hi: i64) -> Self {
        Stripes::abstract_range(lo, hi)
    }
    fn yes() -> Self {
        Stripes::yes()
    }
    fn no() -> Self {
        Stripes::no()
    }
    fn maybe() -> Self {
        Stripes::maybe()
    }
    fn contains(&self, v: i64) -> bool {
        Stripes::contains(self, v)
    }
    fn is_within(&self, other: &Self) -> bool {
        Stripes::is_within(self, other)
    }
    fn join(&self, other: &Self) -> Self {
        Stripes::join(self, other)
    }
    fn join_adjacent(&self) -> Self {
        Stripes::join_adjacent(self)
    }
    fn bisect(&self) -> Option<(Self, Self)> {
        Stripes::bisect(self)
    }
    fn add(&self, other: &Self) -> Self {
        Stripes::add(self, other)
    }
    fn sub(&self, other: &Self) -> Self {
        Stripes::sub(self, other)
    }
    fn mul(&self, other: &Self) -> Self {
        Stripes::mul(self, other)
    }
    fn div(&self, other: &Self) -> Result<Self, EvalError> {
        Stripes::div(self, other).map_err(arith)
    }
    fn rem(&self, other: &Self) -> Result<Self, EvalError> {
        Stripes::rem(self, other).map_err(arith)
    }
    fn neg(&self) -> Self {
        Stripes::neg(self)
    }
    fn abs(&self) -> Self {
        Stripes::abs(self)
    }
    fn not_(&self) -> Self {
        Stripes::not_(self)
    }
    fn min_(&self, other: &Self) -> Self {
        Stripes::min_(self, other)
    }
    fn max_(&self, other: &Self) -> Self {
        Stripes::max_(self, other)
    }
    fn and_(&self, other: &Self) -> Self {
        Stripes::and_(self, other)
    }
    fn or_(&self, other: &Self) -> Self {
        Stripes::or_(self, other)
    }
    fn equality(&self, other: &Self) -> Self {
        Stripes::equality(self, other)
    }
    fn lt(&self, other: &Self) -> Self {
        Stripes::lt(self, other)
    }
    fn gt(&self, other: &Self) -> Self {
        Stripes::gt(self, other)
    }
    fn le(&self, other: &Self) -> Self {
        Stripes::le(self, other)
    }
    fn ge(&self, other: &Self) -> Self {
        Stripes::ge(self, other)
    }
    fn range_nondet(&self, other: &Self) -> Result<Self, EvalError> {
        Stripes::range_nondet(self, other).map_err(arith)
    }
}

impl AbstractDomain for Sign {
    fn abstract_values(values: &[i64]) -> Self {
        Sign::abstract_values(values)
    }
    fn abstract_range(lo: i64, hi: i64) -> Self {
        Sign::abstract_range(lo, hi)
    }
    fn yes() -> Self {
        Sign::yes()
    }
    fn no() -> Self {
        Sign::no()
    }
    fn maybe() -> Self {
        Sign::maybe()
    }
    fn contains(&self, v: i64) -> bool {
        Sign::contains(self, v)
    }
    fn is_within(&self, other: &Self) -> bool {
        Sign::is_within(self, other)
    }
    fn join(&self, other: &Self) -> Self {
        Sign::join(self, other)
    }
    fn join_adjacent(&self) -> Self {
        Sign::join_adjacent(self)
    }
    fn bisect(&self) -> Option<(Self, Self)> {
        Sign::bisect(self)
    }
    fn add(&self, other: &Self) -> Self {
        Sign::add(self, other)
    }
    fn sub(&self, other: &Self) -> Self {
        Sign::sub(self, other)
    }
    fn mul(&self, other: &Self) -> Self {
        Sign::mul(self, other)
    }
    fn div(&self, other: &Self) -> Result<Self, EvalError> {
        Sign::div(self, other).map_err(arith)
    }
    fn rem(&self, other: &Self) -> Result<Self, EvalError> {
        Sign::rem(self, other).map_err(arith)
    }
    fn neg(&self) -> Self {
        Sign::neg(self)
    }
    fn abs(&self) -> Self {
        Sign::abs(self)
    }
    fn not_(&self) -> Self {
        Sign::not_(self)
    }
    fn min_(&self, other: &Self) -> Self {
        Sign::min_(self, other)
    }
    fn max_(&self, other: &Self) -> Self {
        Sign::max_(self, other)
    }
    fn and_(&self, other: &Self) -> Self {
        Sign::and_(self, other)
    }
    fn or_(&self, other: &Self) -> Self {
        Sign::or_(self, other)
    }
    fn equality(&self, other: &Self) -> Self {
        Sign::equality(self, other)
    }
    fn lt(&self, other: &Self) -> Self {
        Sign::lt(self, other)
    }
    fn gt(&self, other: &Self) -> Self {
        Sign::gt(self, other)
    }
    fn le(&self, other: &Self) -> Self {
        Sign::le(self, other)
    }
    fn ge(&self, other: &Self) -> Self {
        Sign::ge(self, other)
    }
    fn range_nondet(&self, other: &Self) -> Result<Self, EvalError> {
        Sign::range_nondet(self, other).map_err(arith)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn truth_constants_roundtrip<D: AbstractDomain>() {
        assert!(D::yes().contains(1));
        assert!(!D::yes().contains(0));
        assert!(D::no().contains(0));
        assert!(D::maybe().contains(0) && D::maybe().contains(1));
        assert_eq!(D::yes().not_(), D::no());
        assert_eq!(D::no().not_(), D::yes());
    }

    #[test]
    fn test_truth_constants_both_domains() {
        truth_constants_roundtrip::<Stripes>();
        truth_constants_roundtrip::<Sign>();
    }

    #[test]
    fn test_generic_arithmetic() {
        fn square<D: AbstractDomain>(v: &D) -> D {
            v.mul(v)
        }
        assert_eq!(
            square(&Stripes::abstract_values(&[2])),
            Stripes::abstract_values(&[4])
        );
        assert_eq!(square(&Sign::NEG), Sign::POS);
    }
}
