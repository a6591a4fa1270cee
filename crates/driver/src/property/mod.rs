//! Property rewriting
//!
//! Quantifier elimination over finite agent populations, extern
//! substitution, and the specialization of cross-agent references into
//! per-agent state labels. The rewritten formula feeds either the MCL
//! emitter (process-algebraic backends) or the C emitter (bounded model
//! checking).

pub mod cprop;
pub mod mcl;

use swarm_spec::ast::{BinOp, Expr, Modality, Quant};
use swarm_spec::{parse_property, Info, Store, Variable};

/// A property after quantifier elimination and extern substitution.
/// `labels` holds every state label the elimination introduced, sorted by
/// (agent id, store index).
#[derive(Debug, Clone)]
pub struct RewrittenProperty {
    pub modality: Modality,
    pub formula: Expr,
    pub labels: Vec<String>,
}

/// Pick the property to verify: the named one when `--property` is given,
/// the first otherwise.
pub fn select_property<'a>(info: &'a Info, name: Option<&str>) -> Result<&'a str, String> {
    match name {
        None => info
            .properties
            .first()
            .map(|p| p.as_str())
            .ok_or_else(|| "No property to verify".to_string()),
        Some(n) => info
            .properties
            .iter()
            .find(|p| p.split_whitespace().nth(1) == Some(n) || p.contains(n))
            .map(|p| p.as_str())
            .ok_or_else(|| format!("Property '{}' not found", n)),
    }
}

/// Rewrite a property text into its quantifier-free form.
pub fn rewrite_property(info: &Info, text: &str) -> Result<RewrittenProperty, String> {
    let parsed = parse_property(text)?;
    let formula = eliminate_quantifiers(parsed.formula, info)?;
    let formula = replace_externs(formula, info);
    let mut labels: Vec<String> = formula
        .label_names()
        .into_iter()
        .map(|s| s.to_string())
        .collect();
    labels.sort();
    labels.dedup();
    labels.sort_by_key(|l| {
        StateLabel::parse(l, info)
            .map(|sl| (sl.tid, sl.var.index + sl.offset))
            .unwrap_or((usize::MAX, usize::MAX))
    });
    Ok(RewrittenProperty {
        modality: parsed.modality,
        formula,
        labels,
    })
}

/// Rewrite an `assume` formula text into its quantifier-free form.
pub fn rewrite_assume(info: &Info, text: &str) -> Result<Expr, String> {
    let parsed = swarm_spec::parse_formula(text)?;
    let formula = eliminate_quantifiers(parsed, info)?;
    Ok(replace_externs(formula, info))
}

/// Eliminate every quantifier, outside-in. A `forall` becomes the
/// conjunction and an `exists` the disjunction of one body copy per agent
/// id of the quantified kind; in each copy, `id of x` becomes the agent
/// id literal and any other `v of x` becomes the label `v_<tid>`.
pub fn eliminate_quantifiers(expr: Expr, info: &Info) -> Result<Expr, String> {
    match expr {
        Expr::QFormula { qvars, condition } => {
            eliminate_qvars(&qvars, *condition, info)
        }
        Expr::Bin { op, operands } => Ok(Expr::Bin {
            op,
            operands: operands
                .into_iter()
                .map(|e| eliminate_quantifiers(e, info))
                .collect::<Result<_, _>>()?,
        }),
        Expr::Call { fun, operands } => Ok(Expr::Call {
            fun,
            operands: operands
                .into_iter()
                .map(|e| eliminate_quantifiers(e, info))
                .collect::<Result<_, _>>()?,
        }),
        Expr::Cmp { op, operands } => Ok(Expr::Cmp {
            op,
            operands: operands
                .into_iter()
                .map(|e| eliminate_quantifiers(e, info))
                .collect::<Result<_, _>>()?,
        }),
        Expr::If { cond, then, els } => Ok(Expr::If {
            cond: Box::new(eliminate_quantifiers(*cond, info)?),
            then: Box::new(eliminate_quantifiers(*then, info)?),
            els: Box::new(eliminate_quantifiers(*els, info)?),
        }),
        Expr::Neg(inner) => Ok(Expr::Neg(Box::new(eliminate_quantifiers(*inner, info)?))),
        other => Ok(other),
    }
}

fn eliminate_qvars(
    qvars: &[swarm_spec::QVar],
    condition: Expr,
    info: &Info,
) -> Result<Expr, String> {
    let Some(q) = qvars.first() else {
        return eliminate_quantifiers(condition, info);
    };
    let tids = info.spawn.tids(&q.kind)?;
    let mut copies = Vec::with_capacity(tids.len());
    for tid in tids {
        let copy = substitute_agent(condition.clone(), &q.name, tid);
        copies.push(eliminate_qvars(&qvars[1..], copy, info)?);
    }
    let op = match q.quant {
        Quant::Forall => BinOp::And,
        Quant::Exists => BinOp::Or,
    };
    Ok(match copies.len() {
        1 => copies.pop().unwrap(),
        _ => Expr::Bin {
            op,
            operands: copies,
        },
    })
}

/// Replace `v of x` references bound to agent `tid`.
fn substitute_agent(expr: Expr, qvar: &str, tid: usize) -> Expr {
    match expr {
        Expr::Ref { var, of: Some(of) } if of == qvar => {
            if var.name == "id" {
                Expr::Literal(tid as i64)
            } else {
                Expr::Label(StateLabel::format(&var, tid))
            }
        }
        Expr::Ref { var, of } => Expr::Ref { var, of },
        Expr::Bin { op, operands } => Expr::Bin {
            op,
            operands: operands
                .into_iter()
                .map(|e| substitute_agent(e, qvar, tid))
                .collect(),
        },
        Expr::Call { fun, operands } => Expr::Call {
            fun,
            operands: operands
                .into_iter()
                .map(|e| substitute_agent(e, qvar, tid))
                .collect(),
        },
        Expr::Cmp { op, operands } => Expr::Cmp {
            op,
            operands: operands
                .into_iter()
                .map(|e| substitute_agent(e, qvar, tid))
                .collect(),
        },
        Expr::If { cond, then, els } => Expr::If {
            cond: Box::new(substitute_agent(*cond, qvar, tid)),
            then: Box::new(substitute_agent(*then, qvar, tid)),
            els: Box::new(substitute_agent(*els, qvar, tid)),
        },
        Expr::Neg(inner) => Expr::Neg(Box::new(substitute_agent(*inner, qvar, tid))),
        Expr::QFormula { qvars, condition } => Expr::QFormula {
            qvars,
            condition: Box::new(substitute_agent(*condition, qvar, tid)),
        },
        other => other,
    }
}

/// Replace extern references with their literal values.
pub fn replace_externs(expr: Expr, info: &Info) -> Expr {
    match expr {
        Expr::RefExt(name) => match info.externs.get(&name) {
            Some(v) => Expr::Literal(*v),
            None => Expr::RefExt(name),
        },
        Expr::Bin { op, operands } => Expr::Bin {
            op,
            operands: operands
                .into_iter()
                .map(|e| replace_externs(e, info))
                .collect(),
        },
        Expr::Call { fun, operands } => Expr::Call {
            fun,
            operands: operands
                .into_iter()
                .map(|e| replace_externs(e, info))
                .collect(),
        },
        Expr::Cmp { op, operands } => Expr::Cmp {
            op,
            operands: operands
                .into_iter()
                .map(|e| replace_externs(e, info))
                .collect(),
        },
        Expr::If { cond, then, els } => Expr::If {
            cond: Box::new(replace_externs(*cond, info)),
            then: Box::new(replace_externs(*then, info)),
            els: Box::new(replace_externs(*els, info)),
        },
        Expr::Neg(inner) => Expr::Neg(Box::new(replace_externs(*inner, info))),
        Expr::QFormula { qvars, condition } => Expr::QFormula {
            qvars,
            condition: Box::new(replace_externs(*condition, info)),
        },
        other => other,
    }
}

/// A parsed state label: variable, array offset, agent id.
#[derive(Debug, Clone)]
pub struct StateLabel<'a> {
    pub var: &'a Variable,
    pub offset: usize,
    pub tid: usize,
    pub text: String,
}

impl<'a> StateLabel<'a> {
    /// `x_2` for scalars, `x_1_2` for `x[1] of <agent 2>`.
    pub fn format(var: &swarm_spec::VarRef, tid: usize) -> String {
        match &var.offset {
            Some(off) => match off.as_ref() {
                Expr::Literal(k) => format!("{}_{}_{}", var.name, k, tid),
                other => format!("{}_{}_{}", var.name, other, tid),
            },
            None => format!("{}_{}", var.name, tid),
        }
    }

    /// Parse a label back into variable, offset, and agent id.
    pub fn parse(label: &str, info: &'a Info) -> Result<StateLabel<'a>, String> {
        let (head, tid) = label
            .rsplit_once('_')
            .ok_or_else(|| format!("Malformed state label '{}'", label))?;
        let tid: usize = tid
            .parse()
            .map_err(|e| format!("Bad agent id in label '{}': {}", label, e))?;
        if let Ok(var) = info.lookup_var(head) {
            return Ok(StateLabel {
                var,
                offset: 0,
                tid,
                text: label.to_string(),
            });
        }
        // Array cell: name_offset_tid
        let (name, offset) = head
            .rsplit_once('_')
            .ok_or_else(|| format!("Unknown variable in label '{}'", label))?;
        let offset: usize = offset
            .parse()
            .map_err(|e| format!("Bad offset in label '{}': {}", label, e))?;
        let var = info.lookup_var(name)?;
        Ok(StateLabel {
            var,
            offset,
            tid,
            text: label.to_string(),
        })
    }

    /// Flat index of the labelled cell in its store.
    pub fn index(&self) -> usize {
        self.var.index + self.offset
    }

    pub fn store(&self) -> Store {
        self.var.store
    }
}
