//! Chaos-automaton value analysis
//!
//! Over-approximates the set of values every state variable can take at
//! any point of any execution. The transition system is the chaos
//! automaton of all reachable assignments and blocks: from any abstract
//! state, any of them may fire. Guarded statements are applied through
//! recursive state bisection until the guard decides; a second pass
//! certifies variables that provably never change after initialization.
//!
//! Every task handed to the worker pool is a pure
//! `(statement, state) -> Option<state>` function; results are coalesced
//! by commutative joins, so scheduling order never matters.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use rayon::prelude::*;
use tracing::debug;

use swarm_spec::ast::{Assign, AssignKind, BinOp, CompositionOp, Expr, Process};
use swarm_spec::{AgentKind, Info, ValueSet};

use crate::domain::{AbstractDomain, EvalError};
use crate::eval::eval_expr;
use crate::state::{AbstractState, BisectCache};

/// Default iteration bound for the chaos fixpoint.
pub const DEFAULT_BOUND: usize = 20;

const BISECT_CACHE_CAPACITY: usize = 256;

/// Analysis outcome.
#[derive(Debug, Clone)]
pub struct ValueAnalysis<D> {
    /// Variable-wise join of every visited state, normalized.
    pub state: AbstractState<D>,
    /// True when the frontier stabilized within the iteration bound.
    pub fixpoint: bool,
    /// Transitive variable dependencies (`x -> vars its value reads`).
    pub depends: BTreeMap<String, BTreeSet<String>>,
    /// Variables certified to never change after initialization.
    pub wont_change: BTreeSet<String>,
}

/// One transition of the chaos automaton.
#[derive(Debug, Clone)]
enum Stmt {
    Assign(Assign),
    Block(Vec<Assign>),
}

#[derive(Debug, Clone)]
struct Transition {
    stmt: Stmt,
    /// Conjunction of enclosing guard conditions, if any.
    guard: Option<Expr>,
}

/// Run the value analysis over every agent behavior in `info`.
///
/// Fails only when a behavior is missing or a process call cannot be
/// resolved; evaluation problems inside the fixpoint degrade to
/// `fixpoint = false` instead.
pub fn value_analysis<D: AbstractDomain>(
    info: &Info,
    bound: usize,
) -> Result<ValueAnalysis<D>, String> {
    let transitions = collect_transitions(info)?;
    let depends = dependency_analysis(&transitions);
    let externs: BTreeMap<String, D> = info
        .externs
        .iter()
        .map(|(k, v)| (k.clone(), D::abstract_values(&[*v])))
        .collect();
    let s0 = initial_state::<D>(info, &transitions)?;
    let cache = BisectCache::new(BISECT_CACHE_CAPACITY);

    let (s1, fixpoint) = chaos_loop(bound, &transitions, s0.clone(), info, &externs, &cache);
    let s1 = s1.normalized();

    let wont_change = if fixpoint {
        let mut all: BTreeSet<String> = depends.keys().cloned().collect();
        all.insert("id".to_string());
        all
    } else {
        // One lookahead round over the merged state: a variable is
        // certified when everything it depends on is certified and one
        // more application round leaves it unchanged.
        let (s2, _) = chaos_loop(1, &transitions, s1.clone(), info, &externs, &cache);
        let s2 = s2.normalized();
        let mut wont: BTreeSet<String> = BTreeSet::new();
        wont.insert("id".to_string());
        loop {
            let new_certified: BTreeSet<String> = depends
                .iter()
                .filter(|(v, deps)| {
                    deps.iter().all(|d| wont.contains(d) || d == *v)
                        && stable(&s2, &s1, v)
                })
                .map(|(v, _)| v.clone())
                .collect();
            if new_certified.is_subset(&wont) {
                break;
            }
            wont.extend(new_certified);
        }
        wont
    };

    Ok(ValueAnalysis {
        state: s1,
        fixpoint,
        depends,
        wont_change,
    })
}

fn stable<D: AbstractDomain>(after: &AbstractState<D>, before: &AbstractState<D>, var: &str) -> bool {
    match (after.get(var), before.get(var)) {
        (Some(a), Some(b)) => a.is_within(b),
        _ => false,
    }
}

// ---------------- collection ----------------

fn collect_transitions(info: &Info) -> Result<Vec<Transition>, String> {
    let mut out = Vec::new();
    for kind in info.spawn.kinds() {
        let behavior = info
            .lookup_process(kind, "Behavior")
            .ok_or_else(|| format!("Agent kind '{}' has no Behavior process", kind.name))?;
        let mut visited: HashSet<String> = HashSet::new();
        visited.insert("Behavior".to_string());
        visited.insert("Skip".to_string());
        collect_proc(behavior, &[], info, kind, &mut visited, &mut out)?;
    }
    Ok(out)
}

fn collect_proc(
    proc: &Process,
    guards: &[&Expr],
    info: &Info,
    kind: &AgentKind,
    visited: &mut HashSet<String>,
    out: &mut Vec<Transition>,
) -> Result<(), String> {
    match proc {
        Process::Skip => Ok(()),
        Process::Assign(a) => {
            out.push(Transition {
                stmt: Stmt::Assign(a.clone()),
                guard: combine_guards(guards),
            });
            Ok(())
        }
        Process::Block(assigns) => {
            out.push(Transition {
                stmt: Stmt::Block(assigns.clone()),
                guard: combine_guards(guards),
            });
            Ok(())
        }
        Process::Guarded { cond, body } => {
            let mut inner: Vec<&Expr> = guards.to_vec();
            inner.push(cond);
            collect_proc(body, &inner, info, kind, visited, out)
        }
        Process::Composition { op, operands } => match op {
            // A guard reaches only the first statement of a sequence.
            CompositionOp::Seq => {
                if let Some(first) = operands.first() {
                    collect_proc(first, guards, info, kind, visited, out)?;
                }
                for rest in operands.iter().skip(1) {
                    collect_proc(rest, &[], info, kind, visited, out)?;
                }
                Ok(())
            }
            _ => {
                for op in operands {
                    collect_proc(op, guards, info, kind, visited, out)?;
                }
                Ok(())
            }
        },
        Process::Call(name) => {
            if visited.insert(name.clone()) {
                let body = info
                    .lookup_process(kind, name)
                    .ok_or_else(|| format!("Unresolved process call '{}'", name))?;
                collect_proc(body, guards, info, kind, visited, out)?;
            }
            Ok(())
        }
    }
}

fn combine_guards(guards: &[&Expr]) -> Option<Expr> {
    match guards {
        [] => None,
        [g] => Some((*g).clone()),
        many => Some(Expr::Bin {
            op: BinOp::And,
            operands: many.iter().map(|g| (*g).clone()).collect(),
        }),
    }
}

// ---------------- dependencies ----------------

fn dependency_analysis(transitions: &[Transition]) -> BTreeMap<String, BTreeSet<String>> {
    let mut depends: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

    let mut record = |a: &Assign| {
        for (lhs, rhs) in a.lhs.iter().zip(a.rhs.iter()) {
            let entry = depends.entry(lhs.name.clone()).or_default();
            rhs_dep_names(rhs, entry);
        }
    };
    for t in transitions {
        match &t.stmt {
            Stmt::Assign(a) => record(a),
            Stmt::Block(assigns) => assigns.iter().for_each(&mut record),
        }
    }

    // Transitive closure
    loop {
        let snapshot = depends.clone();
        for deps in depends.values_mut() {
            let indirect: BTreeSet<String> = deps
                .iter()
                .flat_map(|d| snapshot.get(d).cloned().unwrap_or_default())
                .collect();
            deps.extend(indirect);
        }
        if depends == snapshot {
            break;
        }
    }

    // id never depends on anything
    depends.insert("id".to_string(), BTreeSet::new());
    depends
}

/// Collect referenced variable names, skipping `if` conditions (they do
/// not flow into the assigned value).
fn rhs_dep_names(expr: &Expr, out: &mut BTreeSet<String>) {
    match expr {
        Expr::Ref { var, .. } => {
            out.insert(var.name.clone());
            if let Some(off) = &var.offset {
                rhs_dep_names(off, out);
            }
        }
        Expr::If { then, els, .. } => {
            rhs_dep_names(then, out);
            rhs_dep_names(els, out);
        }
        Expr::Bin { operands, .. } | Expr::Call { operands, .. } | Expr::Cmp { operands, .. } => {
            for o in operands {
                rhs_dep_names(o, out);
            }
        }
        Expr::Neg(inner) => rhs_dep_names(inner, out),
        Expr::QFormula { condition, .. } => rhs_dep_names(condition, out),
        Expr::Pick { .. } | Expr::Literal(_) | Expr::RefExt(_) | Expr::Label(_) => {}
    }
}

// ---------------- initial state ----------------

fn abstract_of<D: AbstractDomain>(values: &ValueSet) -> Option<D> {
    match values {
        ValueSet::Range(lo, hi) if hi > lo => Some(D::abstract_range(*lo, *hi - 1)),
        ValueSet::Range(_, _) => None,
        ValueSet::List(vs) if !vs.is_empty() => Some(D::abstract_values(vs)),
        ValueSet::List(_) => None,
    }
}

fn initial_state<D: AbstractDomain>(
    info: &Info,
    transitions: &[Transition],
) -> Result<AbstractState<D>, String> {
    let mut s0: AbstractState<D> = AbstractState::new();

    let mut add = |state: &mut AbstractState<D>, var: &swarm_spec::Variable, tid: usize| {
        let values = var.values(tid)?;
        if let Some(abs) = abstract_of::<D>(&values) {
            let joined = match state.get(&var.name) {
                Some(prev) => prev.join(&abs),
                None => abs,
            };
            state.set(var.name.clone(), joined);
        }
        Ok::<(), String>(())
    };

    for (lo, hi, kind) in info.spawn.entries() {
        for var in kind.iface.iter().chain(kind.lstig.iter()) {
            for tid in *lo..*hi {
                add(&mut s0, var, tid)?;
            }
        }
    }
    for var in &info.env {
        add(&mut s0, var, 0)?;
    }

    // Block locals start at zero
    for t in transitions {
        if let Stmt::Block(assigns) = &t.stmt {
            for a in assigns {
                if a.kind == AssignKind::Local {
                    for lhs in &a.lhs {
                        if s0.get(&lhs.name).is_none() {
                            s0.set(lhs.name.clone(), D::no());
                        }
                    }
                }
            }
        }
    }

    let n = info.spawn.num_agents();
    if n == 0 {
        return Err("System spawns no agents".to_string());
    }
    s0.set("id", D::abstract_range(0, n as i64 - 1));
    Ok(s0)
}

// ---------------- chaos fixpoint ----------------

fn chaos_loop<D: AbstractDomain>(
    bound: usize,
    transitions: &[Transition],
    s0: AbstractState<D>,
    info: &Info,
    externs: &BTreeMap<String, D>,
    cache: &BisectCache<D>,
) -> (AbstractState<D>, bool) {
    let mut visited: HashSet<AbstractState<D>> = HashSet::new();
    let mut frontier: HashSet<AbstractState<D>> = HashSet::new();
    frontier.insert(s0.clone());
    let mut fixpoint = false;

    for iteration in 0..bound {
        let results: Vec<Result<Option<AbstractState<D>>, EvalError>> = transitions
            .par_iter()
            .flat_map(|t| {
                frontier
                    .par_iter()
                    .map(move |s| apply_transition(t, s, info, externs, cache))
            })
            .collect();

        let mut new_states: HashSet<AbstractState<D>> = HashSet::new();
        let mut bail = None;
        for r in results {
            match r {
                Ok(Some(s)) => {
                    new_states.insert(s);
                }
                Ok(None) => {}
                Err(e) => {
                    bail = Some(e);
                    break;
                }
            }
        }
        if let Some(e) = bail {
            debug!("value analysis bailed at iteration {}: {}", iteration, e);
            break;
        }

        if new_states.iter().all(|s| visited.contains(s)) {
            fixpoint = true;
            break;
        }
        visited.extend(frontier.drain());
        frontier = new_states;
    }

    visited.extend(frontier);
    let merged = visited
        .into_iter()
        .reduce(|a, b| a.merge(&b))
        .unwrap_or(s0);
    (merged, fixpoint)
}

fn apply_transition<D: AbstractDomain>(
    t: &Transition,
    s: &AbstractState<D>,
    info: &Info,
    externs: &BTreeMap<String, D>,
    cache: &BisectCache<D>,
) -> Result<Option<AbstractState<D>>, EvalError> {
    let guarded = match apply_guard(t.guard.as_ref(), s, info, externs, cache)? {
        Some(s) => s,
        // The guard never holds here; the statement cannot fire.
        None => return Ok(None),
    };
    match &t.stmt {
        Stmt::Assign(a) => apply_assign(a, &guarded, info, externs).map(Some),
        Stmt::Block(assigns) => {
            let mut cur = guarded;
            for a in assigns {
                cur = apply_assign(a, &cur, info, externs)?;
            }
            Ok(Some(cur))
        }
    }
}

/// Parallel multi-assignment: every rhs is evaluated against the pre-state.
fn apply_assign<D: AbstractDomain>(
    a: &Assign,
    s: &AbstractState<D>,
    info: &Info,
    externs: &BTreeMap<String, D>,
) -> Result<AbstractState<D>, EvalError> {
    let mut out = s.clone();
    for (lhs, rhs) in a.lhs.iter().zip(a.rhs.iter()) {
        out.set(lhs.name.clone(), eval_expr(rhs, s, externs, info)?);
    }
    Ok(out)
}

/// Restrict `s` to the sub-state where the guard always holds, bisecting
/// the guard's variables until every leaf decides. Returns the original
/// state when no refinement is possible (conservative) and `None` when
/// the guard can never hold.
fn apply_guard<D: AbstractDomain>(
    guard: Option<&Expr>,
    s: &AbstractState<D>,
    info: &Info,
    externs: &BTreeMap<String, D>,
    cache: &BisectCache<D>,
) -> Result<Option<AbstractState<D>>, EvalError> {
    let Some(g) = guard else {
        return Ok(Some(s.clone()));
    };
    let g_vars: Vec<String> = g
        .ref_names()
        .into_iter()
        .filter(|n| s.contains_var(n))
        .map(|n| n.to_string())
        .collect();
    refine(g, &g_vars, s, info, externs, cache)
}

fn refine<D: AbstractDomain>(
    g: &Expr,
    g_vars: &[String],
    s: &AbstractState<D>,
    info: &Info,
    externs: &BTreeMap<String, D>,
    cache: &BisectCache<D>,
) -> Result<Option<AbstractState<D>>, EvalError> {
    let verdict = eval_expr(g, s, externs, info)?;
    match (verdict.contains(1), verdict.contains(0)) {
        (true, false) => return Ok(Some(s.clone())),
        (false, _) => return Ok(None),
        (true, true) => {}
    }

    let mut halves: Vec<AbstractState<D>> = Vec::new();
    for var in g_vars {
        if let Some((lo, hi)) = cache.bisect_by(s, var) {
            halves.push(lo);
            halves.push(hi);
        }
    }
    if halves.is_empty() {
        // Nothing left to split on; keep the state as-is.
        return Ok(Some(s.clone()));
    }

    let recursed: Result<Vec<Option<AbstractState<D>>>, EvalError> = halves
        .par_iter()
        .map(|h| refine(g, g_vars, h, info, externs, cache))
        .collect();
    let kept: Vec<AbstractState<D>> = recursed?.into_iter().flatten().collect();
    match kept.into_iter().reduce(|a, b| a.merge(&b)) {
        Some(merged) => Ok(Some(merged)),
        None => Err(EvalError::Arithmetic(format!(
            "guard refinement reached an inconsistent state for {}",
            g
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sign::Sign;
    use crate::stripes::Stripes;
    use swarm_spec::Info;

    fn toggle_system() -> Info {
        Info::parse(
            "agent A 0,3\niface 0=x=0..2\nprocess A Behavior = x <- 1 - x; Behavior\n",
            &[],
        )
        .unwrap()
    }

    #[test]
    fn test_toggle_reaches_fixpoint() {
        let info = toggle_system();
        let va = value_analysis::<Stripes>(&info, DEFAULT_BOUND).unwrap();
        assert!(va.fixpoint);
        let x = va.state.get("x").unwrap();
        // initial 0..1 plus results of 1 - x
        assert!(x.contains(0) && x.contains(1));
        assert!(va.wont_change.contains("x"));
        assert!(va.wont_change.contains("id"));
    }

    #[test]
    fn test_dependencies_are_transitive() {
        let info = Info::parse(
            "agent A 0,2\n\
             iface 0=x=0; 1=y=0; 2=z=0\n\
             process A Behavior = x <- y; y <- z; Behavior\n",
            &[],
        )
        .unwrap();
        let va = value_analysis::<Stripes>(&info, DEFAULT_BOUND).unwrap();
        let x_deps = va.depends.get("x").unwrap();
        assert!(x_deps.contains("y"));
        assert!(x_deps.contains("z"));
        assert!(va.depends.get("id").unwrap().is_empty());
    }

    #[test]
    fn test_guarded_assignment_filters_states() {
        // x grows only while the guard x < 2 holds, so 0..=2 is the
        // reachable envelope even with a generous bound.
        let info = Info::parse(
            "agent A 0,1\n\
             iface 0=x=0\n\
             process A Behavior = x < 2 -> x <- x + 1; Behavior\n",
            &[],
        )
        .unwrap();
        let va = value_analysis::<Stripes>(&info, DEFAULT_BOUND).unwrap();
        let x = va.state.get("x").unwrap();
        assert!(x.contains(0) && x.contains(1) && x.contains(2));
        assert!(!x.contains(3));
    }

    #[test]
    fn test_unbounded_growth_is_not_certified() {
        let info = Info::parse(
            "agent A 0,1\n\
             iface 0=x=0; 1=steady=5\n\
             process A Behavior = x <- x + 1; Behavior\n",
            &[],
        )
        .unwrap();
        let va = value_analysis::<Stripes>(&info, DEFAULT_BOUND).unwrap();
        assert!(!va.fixpoint);
        assert!(!va.wont_change.contains("x"));
        assert!(va.wont_change.contains("id"));
    }

    #[test]
    fn test_block_locals_and_sequencing() {
        let info = Info::parse(
            "agent A 0,1\n\
             iface 0=x=1\n\
             process A Behavior = { t := x + 1; x <- t }; Behavior\n",
            &[],
        )
        .unwrap();
        let va = value_analysis::<Stripes>(&info, 3).unwrap();
        let x = va.state.get("x").unwrap();
        assert!(x.contains(1) && x.contains(2));
        // the local participates in the state
        assert!(va.state.get("t").is_some());
    }

    #[test]
    fn test_sign_domain_runs_too() {
        let info = toggle_system();
        let va = value_analysis::<Sign>(&info, 10).unwrap();
        let x = va.state.get("x").unwrap();
        assert!(x.contains(0) && x.contains(1));
    }

    #[test]
    fn test_missing_behavior_is_an_error() {
        let info = Info::parse("agent A 0,1\niface 0=x=0\n", &[]).unwrap();
        assert!(value_analysis::<Stripes>(&info, 5).is_err());
    }

    #[test]
    fn test_id_range() {
        let info = toggle_system();
        let va = value_analysis::<Stripes>(&info, 5).unwrap();
        assert_eq!(va.state.get("id").unwrap(), &Stripes::abstract_range(0, 2));
    }
}
