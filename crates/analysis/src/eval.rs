//! Generic abstract expression evaluation
//!
//! Interprets a Swarm expression over an abstract state. One evaluator
//! serves every domain implementing `AbstractDomain`; quantified
//! sub-formulas are overapproximated to MAYBE.

use std::collections::BTreeMap;

use swarm_spec::ast::{BinOp, Builtin, CmpOp, Expr};
use swarm_spec::Info;

use crate::domain::{AbstractDomain, EvalError};
use crate::state::AbstractState;

/// Evaluate `expr` under `state`. Extern parameters are resolved through
/// `externs`; `info` supplies agent-id ranges for `pick` expressions.
pub fn eval_expr<D: AbstractDomain>(
    expr: &Expr,
    state: &AbstractState<D>,
    externs: &BTreeMap<String, D>,
    info: &Info,
) -> Result<D, EvalError> {
    let recurse = |e: &Expr| eval_expr(e, state, externs, info);
    match expr {
        Expr::Literal(v) => Ok(D::abstract_values(&[*v])),
        Expr::Ref { var, of: None } => {
            if let Some(v) = state.get(&var.name) {
                Ok(v.clone())
            } else if let Some(v) = externs.get(&var.name) {
                Ok(v.clone())
            } else {
                Err(EvalError::Unsupported(format!(
                    "unknown variable '{}'",
                    var.name
                )))
            }
        }
        Expr::Ref { var, of: Some(_) } => Err(EvalError::Unsupported(format!(
            "cross-agent reference '{}' outside property context",
            var.name
        ))),
        Expr::RefExt(name) => externs
            .get(name)
            .cloned()
            .ok_or_else(|| EvalError::Unsupported(format!("unknown extern '_{}'", name))),
        Expr::Label(l) => Err(EvalError::Unsupported(format!("label '{}'", l))),
        Expr::Neg(inner) => Ok(recurse(inner)?.neg()),
        Expr::Bin { op, operands } => {
            let mut vals = operands.iter().map(recurse);
            let first = vals
                .next()
                .ok_or_else(|| EvalError::Unsupported("empty operand list".into()))??;
            let mut acc = first;
            for v in vals {
                let v = v?;
                acc = match op {
                    BinOp::Add => acc.add(&v),
                    BinOp::Sub => acc.sub(&v),
                    BinOp::Mul => acc.mul(&v),
                    BinOp::Div => acc.div(&v)?,
                    BinOp::Mod => acc.rem(&v)?,
                    BinOp::And => acc.and_(&v),
                    BinOp::Or => acc.or_(&v),
                    BinOp::RangeNondet => acc.range_nondet(&v)?,
                };
            }
            Ok(acc)
        }
        Expr::Call { fun, operands } => {
            let vals: Result<Vec<D>, EvalError> = operands.iter().map(recurse).collect();
            let vals = vals?;
            let first = vals
                .first()
                .ok_or_else(|| EvalError::Unsupported("empty builtin call".into()))?;
            match fun {
                Builtin::Abs => Ok(first.abs()),
                Builtin::Not => Ok(first.not_()),
                Builtin::Min => Ok(vals[1..].iter().fold(first.clone(), |a, b| a.min_(b))),
                Builtin::Max => Ok(vals[1..].iter().fold(first.clone(), |a, b| a.max_(b))),
            }
        }
        Expr::Cmp { op, operands } => {
            let vals: Result<Vec<D>, EvalError> = operands.iter().map(recurse).collect();
            let vals = vals?;
            if vals.len() != 2 {
                return Err(EvalError::Unsupported(format!(
                    "comparison with {} operands",
                    vals.len()
                )));
            }
            let (a, b) = (&vals[0], &vals[1]);
            Ok(match op {
                CmpOp::Lt => a.lt(b),
                CmpOp::Gt => a.gt(b),
                CmpOp::Le => a.le(b),
                CmpOp::Ge => a.ge(b),
                CmpOp::Eq => a.equality(b),
                CmpOp::Ne => a.equality(b).not_(),
            })
        }
        Expr::If { cond, then, els } => {
            let c = recurse(cond)?;
            match (c.contains(1), c.contains(0)) {
                (true, true) => Ok(recurse(then)?.join(&recurse(els)?)),
                (true, false) => recurse(then),
                (false, true) => recurse(els),
                (false, false) => Err(EvalError::Arithmetic(format!(
                    "condition evaluates to neither 0 nor 1: {}",
                    cond
                ))),
            }
        }
        // Quantified sub-formulas are overapproximated.
        Expr::QFormula { .. } => Ok(D::maybe()),
        Expr::Pick { kind, .. } => match kind {
            Some(k) => {
                let (lo, hi) = info
                    .spawn
                    .range_of(k)
                    .map_err(EvalError::Unsupported)?;
                Ok(D::abstract_range(lo as i64, hi as i64 - 1))
            }
            None => state
                .get("id")
                .cloned()
                .ok_or_else(|| EvalError::Unsupported("no id field in state".into())),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stripes::Stripes;
    use swarm_spec::{parse_expr, parse_formula, Info};

    fn setup() -> (AbstractState<Stripes>, BTreeMap<String, Stripes>, Info) {
        let info = Info::parse("agent A 0,3\niface 0=x=0..2\n", &[]).unwrap();
        let mut state = AbstractState::new();
        state.set("x", Stripes::abstract_range(0, 2));
        state.set("id", Stripes::abstract_range(0, 2));
        let mut externs = BTreeMap::new();
        externs.insert("n".to_string(), Stripes::singleton(3));
        (state, externs, info)
    }

    #[test]
    fn test_eval_arithmetic() {
        let (state, externs, info) = setup();
        let e = parse_expr("x + 1").unwrap();
        let v = eval_expr(&e, &state, &externs, &info).unwrap();
        assert_eq!(v, Stripes::abstract_range(1, 3));
    }

    #[test]
    fn test_eval_extern() {
        let (state, externs, info) = setup();
        let e = parse_expr("_n * 2").unwrap();
        let v = eval_expr(&e, &state, &externs, &info).unwrap();
        assert_eq!(v, Stripes::singleton(6));
    }

    #[test]
    fn test_eval_comparison_maybe() {
        let (state, externs, info) = setup();
        let e = parse_formula("x < 2").unwrap();
        let v = eval_expr(&e, &state, &externs, &info).unwrap();
        assert_eq!(v, Stripes::maybe());
    }

    #[test]
    fn test_eval_if_joins_branches() {
        let (state, externs, info) = setup();
        let e = parse_expr("if x < 1 then 10 else 20").unwrap();
        let v = eval_expr(&e, &state, &externs, &info).unwrap();
        assert!(v.contains(10) && v.contains(20));
    }

    #[test]
    fn test_eval_quantified_is_maybe() {
        let (state, externs, info) = setup();
        let e = parse_formula("forall A a, x of a < 2").unwrap();
        let v = eval_expr(&e, &state, &externs, &info).unwrap();
        assert_eq!(v, Stripes::maybe());
    }

    #[test]
    fn test_eval_pick_ranges() {
        let (state, externs, info) = setup();
        let typed = parse_expr("pick 2 A").unwrap();
        assert_eq!(
            eval_expr(&typed, &state, &externs, &info).unwrap(),
            Stripes::abstract_range(0, 2)
        );
        let untyped = parse_expr("pick 1").unwrap();
        assert_eq!(
            eval_expr(&untyped, &state, &externs, &info).unwrap(),
            Stripes::abstract_range(0, 2)
        );
    }

    #[test]
    fn test_eval_unknown_variable_fails() {
        let (state, externs, info) = setup();
        let e = parse_expr("zig + 1").unwrap();
        assert!(matches!(
            eval_expr(&e, &state, &externs, &info),
            Err(EvalError::Unsupported(_))
        ));
    }
}
