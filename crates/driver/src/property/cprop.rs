//! C-embedded property and invariant emission
//!
//! The bounded-model-checking path inlines the rewritten property into
//! the emitted C program: an assertion per step for `always`, a monitor
//! flag for `eventually`/`finally`. Won't-change certificates from the
//! value analysis become a `__invariants()` function of assumptions,
//! invoked at every loop head.

use swarm_analysis::{Stripes, ValueAnalysis};
use swarm_spec::ast::{BinOp, Builtin, CmpOp, Expr, Modality};
use swarm_spec::{Info, Store};

use super::{rewrite_property, select_property, StateLabel};

/// Which BMC dialect the fragments target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BmcDialect {
    Cprover,
    Esbmc,
}

impl BmcDialect {
    pub fn assume(&self) -> &'static str {
        match self {
            BmcDialect::Cprover => "__CPROVER_assume",
            BmcDialect::Esbmc => "__ESBMC_assume",
        }
    }

    pub fn assert_(&self) -> &'static str {
        match self {
            BmcDialect::Cprover => "__CPROVER_assert",
            BmcDialect::Esbmc => "__ESBMC_assert",
        }
    }
}

fn cell(label: &StateLabel<'_>) -> String {
    match label.store() {
        Store::Iface => format!("I[{}][{}]", label.tid, label.index()),
        Store::Lstig => format!("Lvalue[{}][{}]", label.tid, label.index()),
        Store::Env => format!("E[{}]", label.index()),
    }
}

/// Render a quantifier-free formula in C syntax over the flat store
/// arrays.
pub fn c_expr(expr: &Expr, info: &Info) -> Result<String, String> {
    match expr {
        Expr::Literal(v) => Ok(v.to_string()),
        Expr::Label(l) => Ok(cell(&StateLabel::parse(l, info)?)),
        // A plain reference addresses the shared environment
        Expr::Ref { var, of: None } => {
            let decl = info.lookup_var(&var.name)?;
            if decl.store != Store::Env {
                return Err(format!(
                    "reference '{}' needs an 'of' qualifier in properties",
                    var.name
                ));
            }
            let off = match &var.offset {
                None => 0,
                Some(e) => match e.as_ref() {
                    Expr::Literal(k) => *k as usize,
                    other => {
                        return Err(format!("non-literal array offset: {}", other))
                    }
                },
            };
            Ok(format!("E[{}]", decl.index + off))
        }
        Expr::Neg(inner) => Ok(format!("(-{})", c_expr(inner, info)?)),
        Expr::Bin { op, operands } => {
            let parts: Result<Vec<String>, String> =
                operands.iter().map(|e| c_expr(e, info)).collect();
            let parts = parts?;
            let sym = match op {
                BinOp::Add => "+",
                BinOp::Sub => "-",
                BinOp::Mul => "*",
                BinOp::Div => "/",
                BinOp::Mod => "%",
                BinOp::And => "&&",
                BinOp::Or => "||",
                BinOp::RangeNondet => {
                    return Err("nondeterministic range in a property".to_string())
                }
            };
            Ok(format!("({})", parts.join(&format!(" {} ", sym))))
        }
        Expr::Cmp { op, operands } => {
            let parts: Result<Vec<String>, String> =
                operands.iter().map(|e| c_expr(e, info)).collect();
            let parts = parts?;
            let sym = match op {
                CmpOp::Lt => "<",
                CmpOp::Gt => ">",
                CmpOp::Le => "<=",
                CmpOp::Ge => ">=",
                CmpOp::Eq => "==",
                CmpOp::Ne => "!=",
            };
            Ok(format!("({})", parts.join(&format!(" {} ", sym))))
        }
        Expr::Call { fun, operands } => {
            let parts: Result<Vec<String>, String> =
                operands.iter().map(|e| c_expr(e, info)).collect();
            let parts = parts?;
            match fun {
                Builtin::Not => Ok(format!("(!{})", parts[0])),
                Builtin::Abs => Ok(format!("(({0}) < 0 ? -({0}) : ({0}))", parts[0])),
                Builtin::Min => Ok(parts
                    .iter()
                    .skip(1)
                    .fold(parts[0].clone(), |a, b| {
                        format!("(({0}) < ({1}) ? ({0}) : ({1}))", a, b)
                    })),
                Builtin::Max => Ok(parts
                    .iter()
                    .skip(1)
                    .fold(parts[0].clone(), |a, b| {
                        format!("(({0}) > ({1}) ? ({0}) : ({1}))", a, b)
                    })),
            }
        }
        Expr::If { cond, then, els } => Ok(format!(
            "(({}) ? ({}) : ({}))",
            c_expr(cond, info)?,
            c_expr(then, info)?,
            c_expr(els, info)?
        )),
        other => Err(format!("cannot render in C: {}", other)),
    }
}

/// The C fragments realizing one property.
#[derive(Debug, Clone, Default)]
pub struct PropertyFragment {
    /// Top-level declarations (monitor flags).
    pub globals: String,
    /// Statement inserted after every system step.
    pub per_step: String,
    /// Statement inserted once after the last step.
    pub final_check: String,
}

/// Build the assertion scaffold for the selected property.
pub fn embed_property(
    info: &Info,
    property: Option<&str>,
    dialect: BmcDialect,
) -> Result<PropertyFragment, String> {
    let text = select_property(info, property)?;
    let rp = rewrite_property(info, text)?;
    let pred = c_expr(&rp.formula, info)?;
    let description = text.replace('"', "'");
    match rp.modality {
        Modality::Always => Ok(PropertyFragment {
            globals: String::new(),
            per_step: format!("{}({}, \"{}\");", dialect.assert_(), pred, description),
            final_check: String::new(),
        }),
        Modality::Eventually | Modality::Finally => Ok(PropertyFragment {
            globals: "static _Bool __property_met = 0;".to_string(),
            per_step: format!("if ({}) __property_met = 1;", pred),
            final_check: format!(
                "{}(__property_met, \"{}\");",
                dialect.assert_(),
                description
            ),
        }),
        other => Err(format!(
            "modality '{}' is encoded by the emitter, not inlined",
            other.name()
        )),
    }
}

fn stripes_constraint(cell: &str, value: &Stripes) -> String {
    let parts: Vec<String> = value
        .intervals()
        .iter()
        .map(|iv| {
            if iv.is_singleton() {
                format!("{} == {}", cell, iv.min)
            } else {
                format!("({0} >= {1} && {0} <= {2})", cell, iv.min, iv.max)
            }
        })
        .collect();
    if parts.len() == 1 {
        parts.into_iter().next().unwrap()
    } else {
        format!("({})", parts.join(" || "))
    }
}

/// Emit `__invariants()`: one assumption per certified store cell,
/// bounding it to the value envelope the analysis computed. Invoked by
/// the emitted program at every loop head.
pub fn invariants_function(
    info: &Info,
    analysis: &ValueAnalysis<Stripes>,
    dialect: BmcDialect,
) -> String {
    let mut lines: Vec<String> = Vec::new();

    for (lo, hi, kind) in info.spawn.entries() {
        for (store, vars) in [(Store::Iface, &kind.iface), (Store::Lstig, &kind.lstig)] {
            for var in vars {
                if !analysis.wont_change.contains(&var.name) {
                    continue;
                }
                let Some(value) = analysis.state.get(&var.name) else {
                    continue;
                };
                let array = match store {
                    Store::Iface => "I",
                    Store::Lstig => "Lvalue",
                    Store::Env => unreachable!(),
                };
                for tid in *lo..*hi {
                    for off in 0..var.size {
                        let cell = format!("{}[{}][{}]", array, tid, var.index + off);
                        lines.push(format!(
                            "    {}({});",
                            dialect.assume(),
                            stripes_constraint(&cell, value)
                        ));
                    }
                }
            }
        }
    }
    for var in &info.env {
        if !analysis.wont_change.contains(&var.name) {
            continue;
        }
        let Some(value) = analysis.state.get(&var.name) else {
            continue;
        };
        for off in 0..var.size {
            let cell = format!("E[{}]", var.index + off);
            lines.push(format!(
                "    {}({});",
                dialect.assume(),
                stripes_constraint(&cell, value)
            ));
        }
    }

    format!("void __invariants(void)\n{{\n{}\n}}\n", lines.join("\n"))
}

/// Fill the BMC-specific holes of an emitted C program: the per-step and
/// final property assertions, and the `__invariants()` assumptions from
/// the value analysis. Holes the encoder did not emit are skipped, and a
/// failed value analysis degrades to no invariants.
pub fn inline_bmc_fragments(
    code: String,
    info: &Info,
    property: Option<&str>,
    dialect: BmcDialect,
) -> crate::errors::DriverResult<String> {
    use crate::template::{
        Template, HOLE_INVARIANTS, HOLE_PROPERTY_FINAL, HOLE_PROPERTY_GLOBALS, HOLE_PROPERTY_STEP,
    };

    let mut template = Template::new(code);
    if let Ok(fragment) = embed_property(info, property, dialect) {
        for (hole, content) in [
            (HOLE_PROPERTY_GLOBALS, &fragment.globals),
            (HOLE_PROPERTY_STEP, &fragment.per_step),
            (HOLE_PROPERTY_FINAL, &fragment.final_check),
        ] {
            if template.has_hole(hole) {
                template.fill(hole, content)?;
            }
        }
    }
    if template.has_hole(HOLE_INVARIANTS) {
        match swarm_analysis::value_analysis::<Stripes>(info, swarm_analysis::DEFAULT_BOUND) {
            Ok(analysis) => {
                template.fill(HOLE_INVARIANTS, &invariants_function(info, &analysis, dialect))?;
            }
            Err(e) => {
                tracing::debug!("no loop invariants, value analysis unavailable: {}", e);
            }
        }
    }
    Ok(template.into_text())
}

#[cfg(test)]
mod tests {
    use super::*;
    use swarm_analysis::{value_analysis, DEFAULT_BOUND};
    use swarm_spec::Info;

    fn info3() -> Info {
        Info::parse(
            "agent A 0,3\niface 0=x=0..2\nproperty always exists A a, x of a = 0\n",
            &[],
        )
        .unwrap()
    }

    #[test]
    fn test_c_expr_flat_addressing() {
        let info = info3();
        let rp = rewrite_property(&info, "always exists A a, x of a = 0").unwrap();
        let c = c_expr(&rp.formula, &info).unwrap();
        assert_eq!(c, "((I[0][0] == 0) || (I[1][0] == 0) || (I[2][0] == 0))");
    }

    #[test]
    fn test_embed_always() {
        let info = info3();
        let frag = embed_property(&info, None, BmcDialect::Cprover).unwrap();
        assert!(frag.per_step.starts_with("__CPROVER_assert("));
        assert!(frag.globals.is_empty());
        assert!(frag.final_check.is_empty());
    }

    #[test]
    fn test_embed_eventually_monitor() {
        let info = Info::parse(
            "agent A 0,2\niface 0=x=0..2\nproperty eventually exists A a, x of a = 1\n",
            &[],
        )
        .unwrap();
        let frag = embed_property(&info, None, BmcDialect::Esbmc).unwrap();
        assert!(frag.globals.contains("__property_met"));
        assert!(frag.per_step.starts_with("if ("));
        assert!(frag.final_check.starts_with("__ESBMC_assert(__property_met"));
    }

    #[test]
    fn test_invariants_from_certified_vars() {
        let info = Info::parse(
            "agent A 0,2\n\
             iface 0=x=0..2\n\
             process A Behavior = x <- 1 - x; Behavior\n",
            &[],
        )
        .unwrap();
        let va = value_analysis::<Stripes>(&info, DEFAULT_BOUND).unwrap();
        assert!(va.fixpoint);
        let inv = invariants_function(&info, &va, BmcDialect::Cprover);
        assert!(inv.starts_with("void __invariants(void)"));
        assert!(inv.contains("__CPROVER_assume((I[0][0] >= 0 && I[0][0] <= 1));"));
        assert!(inv.contains("I[1][0]"));
    }

    #[test]
    fn test_inline_bmc_fragments() {
        let info = Info::parse(
            "agent A 0,2\n\
             iface 0=x=0..2\n\
             process A Behavior = x <- 1 - x; Behavior\n\
             property always exists A a, x of a = 0\n",
            &[],
        )
        .unwrap();
        let code = "\
// ___property-globals___
// ___end property-globals___
void step(void) {
// ___property-step___
// ___end property-step___
}
// ___invariants___
void __invariants(void) { }
// ___end invariants___
";
        let out =
            inline_bmc_fragments(code.to_string(), &info, None, BmcDialect::Cprover).unwrap();
        assert!(out.contains("__CPROVER_assert("));
        assert!(out.contains("__CPROVER_assume((I[0][0] >= 0 && I[0][0] <= 1));"));
        assert!(!out.contains("void __invariants(void) { }"));
    }

    #[test]
    fn test_inline_bmc_fragments_without_holes_is_identity() {
        let info = Info::parse(
            "agent A 0,1\niface 0=x=0\nproperty always forall A a, x of a = 0\n",
            &[],
        )
        .unwrap();
        let code = "int main(void) { return 0; }\n".to_string();
        let out =
            inline_bmc_fragments(code.clone(), &info, None, BmcDialect::Cprover).unwrap();
        assert_eq!(out, code);
    }

    #[test]
    fn test_invariants_skip_uncertified() {
        let info = Info::parse(
            "agent A 0,1\n\
             iface 0=x=0\n\
             process A Behavior = x <- x + 1; Behavior\n",
            &[],
        )
        .unwrap();
        let va = value_analysis::<Stripes>(&info, DEFAULT_BOUND).unwrap();
        assert!(!va.fixpoint);
        let inv = invariants_function(&info, &va, BmcDialect::Cprover);
        assert!(!inv.contains("I[0][0]"));
    }
}
