//! Modal-µ-calculus emission
//!
//! Turns a rewritten property into an MCL query for the process-algebraic
//! backends. The emitted formula quantifies over the observed state labels,
//! prefixes their initialization actions so vacuous passes are impossible,
//! and treats every action that cannot affect the predicate as an
//! "irrelevant" transition.

use swarm_spec::ast::{BinOp, CmpOp, Expr, Modality};
use swarm_spec::{Info, Store};

use super::{rewrite_property, select_property, StateLabel};

fn gate(store: Store) -> &'static str {
    match store {
        Store::Iface => "ATTR",
        Store::Lstig => "L",
        Store::Env => "E",
    }
}

fn boxed(s: &str) -> String {
    format!("[{}]", s)
}

fn diamond(s: &str) -> String {
    format!("<{}>", s)
}

/// Render the rewritten formula in MCL syntax.
pub fn pprint_mcl(expr: &Expr) -> String {
    match expr {
        Expr::Literal(v) => v.to_string(),
        Expr::Label(l) => l.clone(),
        Expr::Call { fun, operands } => {
            let args: Vec<String> = operands.iter().map(pprint_mcl).collect();
            format!("{}({})", fun.name(), args.join(", "))
        }
        Expr::Bin { op, operands } => {
            let sym = match op {
                BinOp::Mod => "mod",
                other => other.symbol(),
            };
            let parts: Vec<String> = operands.iter().map(pprint_mcl).collect();
            format!("({})", parts.join(&format!(" {} ", sym)))
        }
        Expr::Cmp { op, operands } => {
            let sym = match op {
                CmpOp::Ne => "<>",
                other => other.symbol(),
            };
            let parts: Vec<String> = operands.iter().map(pprint_mcl).collect();
            format!("({})", parts.join(&format!(" {} ", sym)))
        }
        Expr::Neg(inner) => format!("(-{})", pprint_mcl(inner)),
        Expr::If { cond, then, els } => format!(
            "(if {} then {} else {} end if)",
            pprint_mcl(cond),
            pprint_mcl(then),
            pprint_mcl(els)
        ),
        other => other.to_string(),
    }
}

fn sprint_predicate(params: &[String], body: &str) -> String {
    format!(
        "\nmacro Predicate({}) =\n    {}\nend_macro\n",
        params.join(", "),
        body
    )
}

/// The action pattern assigning one labelled cell, binding the written
/// value to `binds_to`.
fn sprint_assign(label: &str, info: &Info, binds_to: &str) -> String {
    let Ok(parsed) = StateLabel::parse(label, info) else {
        return String::new();
    };
    format!(
        "{{{} !{} !{} ?{}:Int ...}}",
        gate(parsed.store()),
        parsed.tid,
        parsed.index(),
        binds_to
    )
}

/// `(varnames, init patterns, nu/mu parameter list)` for the labels.
fn preprocess(
    params: &[String],
    prefix: &str,
    info: &Info,
) -> (Vec<String>, Vec<String>, Vec<String>) {
    let mut sorted: Vec<String> = params.to_vec();
    sorted.sort();
    let prefix = if prefix.is_empty() {
        String::new()
    } else {
        format!("{}_", prefix)
    };
    let varnames: Vec<String> = {
        let mut names: Vec<String> = sorted
            .iter()
            .filter_map(|p| StateLabel::parse(p, info).ok().map(|l| l.var.name.clone()))
            .collect();
        names.sort();
        names.dedup();
        names
    };
    let inits: Vec<String> = sorted
        .iter()
        .map(|p| sprint_assign(p, info, &format!("{}{}", prefix, p)))
        .collect();
    let nu_params: Vec<String> = sorted
        .iter()
        .map(|p| format!("{}:Int:={}{}", p, prefix, p))
        .collect();
    (varnames, inits, nu_params)
}

/// One fixpoint-recursion clause per observed label, rebinding that label
/// to the written value.
fn update_clauses(
    params: &[String],
    info: &Info,
    fun: &str,
    modal: fn(&str) -> String,
) -> Vec<String> {
    params
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let args: Vec<String> = params
                .iter()
                .enumerate()
                .map(|(j, q)| if i == j { "v".to_string() } else { q.clone() })
                .collect();
            format!(
                "({}{}({}))",
                modal(&sprint_assign(p, info, "v")),
                fun,
                args.join(", ")
            )
        })
        .collect()
}

/// A clause matching transitions that cannot affect the predicate: any
/// action on a gate the property never observes, or on an observed gate
/// but at an unobserved index.
fn sprint_irrelevant(
    varnames: &[String],
    info: &Info,
    fun: &str,
    modal: Option<fn(&str) -> String>,
    not_spurious: bool,
) -> Option<String> {
    let var_infos: Vec<&swarm_spec::Variable> = varnames
        .iter()
        .filter(|v| v.as_str() != "id")
        .filter_map(|v| info.lookup_var(v).ok())
        .collect();
    let mut labels: Vec<&str> = var_infos.iter().map(|v| gate(v.store)).collect();
    labels.sort();
    labels.dedup();
    if labels.is_empty() {
        return None;
    }

    let mut other_actions: Vec<String> = Vec::new();
    if not_spurious {
        other_actions.push("(not \"SPURIOUS\")".to_string());
    }
    other_actions.extend(labels.iter().map(|l| format!("(not {{{} ...}})", l)));
    let mut result = format!("({})", other_actions.join(" and "));

    for store in [Store::Iface, Store::Lstig, Store::Env] {
        let observed: Vec<&&swarm_spec::Variable> =
            var_infos.iter().filter(|v| v.store == store).collect();
        if observed.is_empty() {
            continue;
        }
        let filter: Vec<String> = observed
            .iter()
            .map(|v| format!("(x <> {})", v.index))
            .collect();
        result.push_str(&format!(
            " or {{{} ?any ?x:Nat ... where ({})}}",
            gate(store),
            filter.join(" and ")
        ));
    }

    let wrapped = match modal {
        Some(m) => m(&result),
        None => result,
    };
    Some(format!("({} {})", wrapped, fun))
}

/// `Reach` macro: a least fixpoint that can still reach the predicate.
fn sprint_reach(params: &[String], info: &Info) -> String {
    let (varnames, _, args) = preprocess(params, "args", info);
    let macro_params: Vec<String> = params.iter().map(|p| format!("args_{}", p)).collect();
    let irrelevant = sprint_irrelevant(
        &varnames,
        info,
        &format!("R({})", params.join(", ")),
        Some(diamond),
        true,
    )
    .unwrap_or_default();
    let updates = update_clauses(params, info, "R", diamond);

    format!(
        "\nmacro Reach({}) =\nmu R ({}) . (\n    Predicate({})\n    or\n    \
         ((<\"SPURIOUS\"> true) and ([not \"SPURIOUS\"] false))\n    or\n    {}\n    or\n    {})\nend_macro\n",
        macro_params.join(", "),
        args.join(", "),
        params.join(", "),
        irrelevant,
        updates.join("\n    or\n    ")
    )
}

/// Least-fixpoint scheme for `finally`/`eventually`.
fn sprint_finally(params: &[String], info: &Info) -> String {
    let (names, inits, args) = preprocess(params, "", info);
    let irrelevants = format!(
        "{}*",
        sprint_irrelevant(&names, info, "", None, false).unwrap_or_default()
    );
    let prefixed: Vec<String> = inits
        .iter()
        .flat_map(|i| [irrelevants.clone(), i.clone()])
        .collect();
    let irrelevant_rec = sprint_irrelevant(
        &names,
        info,
        &format!("R({})", params.join(", ")),
        Some(boxed),
        true,
    )
    .unwrap_or_default();
    let updates = update_clauses(params, info, "R", boxed);

    format!(
        "\n[{}]\nmu R ({}) . (\n    (Predicate({})\n    or\n    \
         ((<\"SPURIOUS\"> true) and ([not \"SPURIOUS\"] false)))\n    or\n    ({}\n    and\n    {}))\n",
        prefixed.join(" . "),
        args.join(", "),
        params.join(", "),
        irrelevant_rec,
        updates.join("\n    and\n    ")
    )
}

/// Greatest-fixpoint invariant scheme for `always` (and the `fairly`
/// variants, with `Reach` as the predicate).
fn sprint_invariant(
    params: &[String],
    info: &Info,
    name: &str,
    short_circuit: Option<&str>,
) -> String {
    let (names, inits, nu_params) = preprocess(params, "init", info);
    // Irrelevant initializations must be captured too, otherwise the
    // pass is vacuous.
    let irrelevants = format!(
        "{}*",
        sprint_irrelevant(&names, info, "", None, false).unwrap_or_default()
    );
    let prefixed: Vec<String> = inits
        .iter()
        .flat_map(|i| [irrelevants.clone(), i.clone()])
        .collect();
    let irrelevant_rec = sprint_irrelevant(
        &names,
        info,
        &format!("Inv({})", params.join(", ")),
        Some(boxed),
        true,
    )
    .unwrap_or_default();
    let updates = update_clauses(params, info, "Inv", boxed);

    let (sc_open, sc_close) = match short_circuit {
        Some(sc) => (format!("{}({}) or (", sc, params.join(", ")), ")".to_string()),
        None => (String::new(), String::new()),
    };

    format!(
        "\n[{}]\nnu Inv ({}) . (\n    {}({})\n    and\n    {}\n    {}\n    and\n    {}\n{})\n",
        prefixed.join(" . "),
        nu_params.join(", "),
        name,
        params.join(", "),
        sc_open,
        irrelevant_rec,
        updates.join("\n    and\n    "),
        sc_close
    )
}

/// Translate the selected property into a complete MCL query.
pub fn translate_property(info: &Info, property: Option<&str>) -> Result<String, String> {
    let text = select_property(info, property)?;
    let rp = rewrite_property(info, text)?;
    let params = rp.labels.clone();
    let body = pprint_mcl(&rp.formula);

    let mut result = sprint_predicate(&params, &body);
    match rp.modality {
        Modality::Always => result.push_str(&sprint_invariant(&params, info, "Predicate", None)),
        Modality::Eventually | Modality::Finally => {
            result.push_str(&sprint_finally(&params, info))
        }
        Modality::Fairly => {
            result.push_str(&sprint_reach(&params, info));
            result.push_str(&sprint_invariant(&params, info, "Reach", Some("Predicate")));
        }
        Modality::FairlyInf => {
            result.push_str(&sprint_reach(&params, info));
            result.push_str(&sprint_invariant(&params, info, "Reach", None));
        }
        Modality::Between => {
            return Err("Modality 'between' has no MCL scheme".to_string());
        }
    }
    Ok(result)
}
