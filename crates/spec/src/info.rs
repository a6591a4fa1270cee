//! Structured information about a Swarm system
//!
//! The external encoder emits, on request, a textual bundle enumerating
//! agent kinds with their id ranges, store declarations, pick declarations,
//! behavior process definitions, properties, and assumptions. This module
//! deserializes that bundle and answers the lookups every other component
//! needs (variable by name, variable by store index, agent by id).

use std::collections::BTreeMap;

use crate::ast::Process;
use crate::parser::{self, eval_ground};

/// Placeholder value for `undef` initializers.
pub const UNDEF: i64 = -32767;

/// The three stores of a Swarm system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Store {
    Iface,
    Lstig,
    Env,
}

impl Store {
    /// One-letter tag used by the emitted program (`I`, `L`, `E`).
    pub fn letter(&self) -> &'static str {
        match self {
            Store::Iface => "I",
            Store::Lstig => "L",
            Store::Env => "E",
        }
    }

    /// Assignment arrow used when rendering traces.
    pub fn arrow(&self) -> &'static str {
        match self {
            Store::Iface => "<-",
            Store::Lstig => "<~",
            Store::Env => "<--",
        }
    }
}

/// A declared initializer.
#[derive(Debug, Clone, PartialEq)]
pub enum Init {
    /// Single expression, e.g. `0` or `id % 2`
    Literal(crate::ast::Expr),
    /// Half-open range `lo..hi`
    Range(crate::ast::Expr, crate::ast::Expr),
    /// Explicit value list `[v1, v2, ...]`
    Values(Vec<crate::ast::Expr>),
    Undef,
}

/// The set of feasible initial values for one variable and one agent id.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueSet {
    /// Half-open `[lo, hi)`
    Range(i64, i64),
    List(Vec<i64>),
}

impl ValueSet {
    pub fn len(&self) -> usize {
        match self {
            ValueSet::Range(lo, hi) => (hi - lo).max(0) as usize,
            ValueSet::List(vs) => vs.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, v: i64) -> bool {
        match self {
            ValueSet::Range(lo, hi) => *lo <= v && v < *hi,
            ValueSet::List(vs) => vs.contains(&v),
        }
    }

    /// The i-th feasible value; used for seeded random draws.
    pub fn nth(&self, i: usize) -> Option<i64> {
        match self {
            ValueSet::Range(lo, hi) => {
                let v = lo + i as i64;
                (v < *hi).then_some(v)
            }
            ValueSet::List(vs) => vs.get(i).copied(),
        }
    }

    pub fn iter(&self) -> Box<dyn Iterator<Item = i64> + '_> {
        match self {
            ValueSet::Range(lo, hi) => Box::new(*lo..*hi),
            ValueSet::List(vs) => Box::new(vs.iter().copied()),
        }
    }

    /// The single value, when deterministic.
    pub fn as_singleton(&self) -> Option<i64> {
        if self.len() == 1 { self.nth(0) } else { None }
    }
}

/// One variable declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub store: Store,
    pub name: String,
    /// Base index into the flat store array.
    pub index: usize,
    /// 1 for scalars, N for arrays.
    pub size: usize,
    pub init: Init,
}

impl Variable {
    pub fn is_array(&self) -> bool {
        self.size > 1
    }

    /// Highest flat index occupied by this variable.
    pub fn max_index(&self) -> usize {
        self.index + self.size - 1
    }

    /// Feasible initial values for the given agent id.
    pub fn values(&self, id: usize) -> Result<ValueSet, String> {
        let id = id as i64;
        match &self.init {
            Init::Literal(e) => Ok(ValueSet::List(vec![eval_ground(e, id)?])),
            Init::Range(lo, hi) => Ok(ValueSet::Range(eval_ground(lo, id)?, eval_ground(hi, id)?)),
            Init::Values(es) => {
                let vs: Result<Vec<i64>, String> =
                    es.iter().map(|e| eval_ground(e, id)).collect();
                Ok(ValueSet::List(vs?))
            }
            Init::Undef => Ok(ValueSet::List(vec![UNDEF])),
        }
    }

    fn parse_decl(text: &str, store: Store) -> Result<Variable, String> {
        // index=name=init  or  index=name[size]=init
        let mut parts = text.splitn(3, '=');
        let index = parts
            .next()
            .ok_or_else(|| format!("Malformed variable declaration '{}'", text))?
            .trim()
            .parse::<usize>()
            .map_err(|e| format!("Bad index in '{}': {}", text, e))?;
        let name_part = parts
            .next()
            .ok_or_else(|| format!("Missing name in '{}'", text))?
            .trim();
        let init_part = parts
            .next()
            .ok_or_else(|| format!("Missing initializer in '{}'", text))?
            .trim();

        let (name, size) = match name_part.split_once('[') {
            Some((n, rest)) => {
                let sz = rest
                    .trim_end_matches(']')
                    .parse::<usize>()
                    .map_err(|e| format!("Bad array size in '{}': {}", text, e))?;
                (n.to_string(), sz)
            }
            None => (name_part.to_string(), 1),
        };

        let init = parse_init(init_part)?;
        Ok(Variable {
            store,
            name,
            index,
            size,
            init,
        })
    }
}

fn parse_init(text: &str) -> Result<Init, String> {
    if text == "undef" {
        return Ok(Init::Undef);
    }
    if let Some(inner) = text.strip_prefix('[') {
        let inner = inner.strip_suffix(']').ok_or_else(|| {
            format!("Unterminated value list '{}'", text)
        })?;
        let exprs: Result<Vec<_>, String> = inner
            .split(',')
            .map(|p| parser::parse_expr(p.trim()))
            .collect();
        return Ok(Init::Values(exprs?));
    }
    if let Some((lo, hi)) = text.split_once("..") {
        return Ok(Init::Range(
            parser::parse_expr(lo.trim())?,
            parser::parse_expr(hi.trim())?,
        ));
    }
    Ok(Init::Literal(parser::parse_expr(text)?))
}

/// A pick declaration (`mate <- pick 2 Worker` declares pick `mate`).
#[derive(Debug, Clone, PartialEq)]
pub struct PickDecl {
    pub name: String,
    pub size: usize,
    pub kind: Option<String>,
}

/// One kind of agent: store declarations plus behavior processes.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentKind {
    pub name: String,
    pub iface: Vec<Variable>,
    pub lstig: Vec<Variable>,
    pub picks: Vec<PickDecl>,
    pub processes: Vec<(String, Process)>,
}

impl AgentKind {
    pub fn lookup_process(&self, name: &str) -> Option<&Process> {
        self.processes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, p)| p)
    }

    pub fn uses_pick(&self, name: &str) -> bool {
        self.picks.iter().any(|p| p.name == name)
    }
}

/// Maps agent ids to agent kinds. Entries are contiguous `[lo, hi)` ranges
/// in spawn order.
#[derive(Debug, Clone, Default)]
pub struct Spawn {
    entries: Vec<(usize, usize, AgentKind)>,
}

impl Spawn {
    pub fn push(&mut self, lo: usize, hi: usize, kind: AgentKind) {
        self.entries.push((lo, hi, kind));
    }

    pub fn num_agents(&self) -> usize {
        self.entries.iter().map(|(_, hi, _)| *hi).max().unwrap_or(0)
    }

    pub fn kinds(&self) -> impl Iterator<Item = &AgentKind> {
        self.entries.iter().map(|(_, _, k)| k)
    }

    pub fn entries(&self) -> &[(usize, usize, AgentKind)] {
        &self.entries
    }

    /// The kind of the agent with the given id.
    pub fn agent_at(&self, tid: usize) -> Result<&AgentKind, String> {
        self.entries
            .iter()
            .find(|(lo, hi, _)| *lo <= tid && tid < *hi)
            .map(|(_, _, k)| k)
            .ok_or_else(|| format!("No agent with id {}", tid))
    }

    /// Id range `[lo, hi)` for the given kind name.
    pub fn range_of(&self, kind: &str) -> Result<(usize, usize), String> {
        self.entries
            .iter()
            .find(|(_, _, k)| k.name == kind)
            .map(|(lo, hi, _)| (*lo, *hi))
            .ok_or_else(|| format!("Unknown agent kind '{}'", kind))
    }

    /// All ids of agents of the given kind.
    pub fn tids(&self, kind: &str) -> Result<std::ops::Range<usize>, String> {
        let (lo, hi) = self.range_of(kind)?;
        Ok(lo..hi)
    }
}

/// Immutable system information, parsed once from the encoder's bundle.
#[derive(Debug, Clone, Default)]
pub struct Info {
    pub spawn: Spawn,
    pub env: Vec<Variable>,
    /// Shared process definitions visible from every agent.
    pub system_processes: Vec<(String, Process)>,
    /// Property texts, modality first.
    pub properties: Vec<String>,
    /// Initial-state constraint texts.
    pub assumes: Vec<String>,
    /// Extern parameter values from the command line.
    pub externs: BTreeMap<String, i64>,
    /// The raw bundle text, kept for downstream tools.
    pub raw: String,
}

impl Info {
    /// Deserialize the encoder's info bundle. `externs` holds `key=value`
    /// assignments from the command line.
    pub fn parse(text: &str, externs: &[String]) -> Result<Info, String> {
        if text.trim().is_empty() {
            return Err("Empty info bundle".to_string());
        }
        let mut info = Info {
            raw: text.to_string(),
            ..Info::default()
        };
        for ext in externs {
            let (k, v) = ext
                .split_once('=')
                .ok_or_else(|| format!("Malformed extern '{}', expected key=value", ext))?;
            let v = v
                .trim()
                .parse::<i64>()
                .map_err(|e| format!("Bad extern value '{}': {}", ext, e))?;
            info.externs.insert(k.trim().to_string(), v);
        }

        let mut pending: Option<(usize, usize, AgentKind)> = None;
        for (ln, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let (tag, rest) = line.split_once(' ').unwrap_or((line, ""));
            let rest = rest.trim();
            let err_ctx = |msg: String| format!("info bundle line {}: {}", ln + 1, msg);
            match tag {
                "agent" => {
                    if let Some((lo, hi, kind)) = pending.take() {
                        info.spawn.push(lo, hi, kind);
                    }
                    let (name, range) = rest
                        .split_once(' ')
                        .ok_or_else(|| err_ctx(format!("malformed agent line '{}'", rest)))?;
                    let (lo, hi) = range
                        .split_once(',')
                        .ok_or_else(|| err_ctx(format!("malformed id range '{}'", range)))?;
                    let lo = lo.trim().parse::<usize>().map_err(|e| err_ctx(e.to_string()))?;
                    let hi = hi.trim().parse::<usize>().map_err(|e| err_ctx(e.to_string()))?;
                    pending = Some((
                        lo,
                        hi,
                        AgentKind {
                            name: name.trim().to_string(),
                            iface: Vec::new(),
                            lstig: Vec::new(),
                            picks: Vec::new(),
                            processes: Vec::new(),
                        },
                    ));
                }
                "iface" | "lstig" => {
                    let store = if tag == "iface" { Store::Iface } else { Store::Lstig };
                    let kind = pending
                        .as_mut()
                        .ok_or_else(|| err_ctx(format!("'{}' before any 'agent'", tag)))?;
                    for decl in rest.split(';').filter(|d| !d.trim().is_empty()) {
                        let v = Variable::parse_decl(decl.trim(), store)
                            .map_err(err_ctx)?;
                        if store == Store::Iface {
                            kind.2.iface.push(v);
                        } else {
                            kind.2.lstig.push(v);
                        }
                    }
                }
                "pick" => {
                    let kind = pending
                        .as_mut()
                        .ok_or_else(|| err_ctx("'pick' before any 'agent'".to_string()))?;
                    let mut parts = rest.split_whitespace();
                    let name = parts
                        .next()
                        .ok_or_else(|| err_ctx("missing pick name".to_string()))?;
                    let size = parts
                        .next()
                        .ok_or_else(|| err_ctx("missing pick size".to_string()))?
                        .parse::<usize>()
                        .map_err(|e| err_ctx(e.to_string()))?;
                    let pick_kind = parts.next().map(|s| s.to_string());
                    kind.2.picks.push(PickDecl {
                        name: name.to_string(),
                        size,
                        kind: pick_kind,
                    });
                }
                "environment" => {
                    for decl in rest.split(';').filter(|d| !d.trim().is_empty()) {
                        info.env
                            .push(Variable::parse_decl(decl.trim(), Store::Env).map_err(err_ctx)?);
                    }
                }
                "process" => {
                    let (scope, def) = rest
                        .split_once(' ')
                        .ok_or_else(|| err_ctx(format!("malformed process line '{}'", rest)))?;
                    let (name, body) = def
                        .split_once('=')
                        .ok_or_else(|| err_ctx(format!("malformed process def '{}'", def)))?;
                    let proc = parser::parse_process(body.trim()).map_err(err_ctx)?;
                    let entry = (name.trim().to_string(), proc);
                    if scope == "system" {
                        info.system_processes.push(entry);
                    } else {
                        let kind = pending.as_mut().filter(|(_, _, k)| k.name == scope);
                        match kind {
                            Some(k) => k.2.processes.push(entry),
                            None => {
                                return Err(err_ctx(format!(
                                    "process for undeclared agent kind '{}'",
                                    scope
                                )))
                            }
                        }
                    }
                }
                "property" => info.properties.push(rest.to_string()),
                "assume" => info.assumes.push(rest.to_string()),
                other => {
                    return Err(err_ctx(format!("unrecognized tag '{}'", other)));
                }
            }
        }
        if let Some((lo, hi, kind)) = pending.take() {
            info.spawn.push(lo, hi, kind);
        }
        Ok(info)
    }

    /// Interface variables across all agent kinds, deduplicated by name.
    pub fn iface_vars(&self) -> Vec<&Variable> {
        dedup_vars(self.spawn.kinds().flat_map(|k| k.iface.iter()))
    }

    /// Stigmergic variables across all agent kinds, deduplicated by name.
    pub fn lstig_vars(&self) -> Vec<&Variable> {
        dedup_vars(self.spawn.kinds().flat_map(|k| k.lstig.iter()))
    }

    pub fn has_stigmergy(&self) -> bool {
        self.spawn.kinds().any(|k| !k.lstig.is_empty())
    }

    /// Highest occupied interface index, or None when the store is empty.
    pub fn max_key_iface(&self) -> Option<usize> {
        self.iface_vars().iter().map(|v| v.max_index()).max()
    }

    /// Highest occupied stigmergy index, or None when the store is empty.
    pub fn max_key_lstig(&self) -> Option<usize> {
        self.lstig_vars().iter().map(|v| v.max_index()).max()
    }

    /// Find a variable by name, searching environment, then interface,
    /// then stigmergy.
    pub fn lookup_var(&self, name: &str) -> Result<&Variable, String> {
        self.env
            .iter()
            .find(|v| v.name == name)
            .or_else(|| {
                self.spawn
                    .kinds()
                    .flat_map(|k| k.iface.iter())
                    .find(|v| v.name == name)
            })
            .or_else(|| {
                self.spawn
                    .kinds()
                    .flat_map(|k| k.lstig.iter())
                    .find(|v| v.name == name)
            })
            .ok_or_else(|| format!("Unknown variable '{}'", name))
    }

    /// The variable covering flat index `key` of the given store
    /// (an array covers all indices in its span).
    pub fn var_at(&self, store: Store, key: usize) -> Option<&Variable> {
        let vars: Vec<&Variable> = match store {
            Store::Env => self.env.iter().collect(),
            Store::Iface => self.iface_vars(),
            Store::Lstig => self.lstig_vars(),
        };
        vars.into_iter()
            .find(|v| v.index <= key && key <= v.max_index())
    }

    /// `Worker 2`
    pub fn pprint_agent(&self, tid: usize) -> String {
        match self.spawn.agent_at(tid) {
            Ok(kind) => format!("{} {}", kind.name, tid),
            Err(_) => format!("agent {}", tid),
        }
    }

    /// `x` or `x[1]` for flat index `key`.
    pub fn pprint_var(&self, store: Store, key: usize) -> String {
        match self.var_at(store, key) {
            Some(v) if v.is_array() => format!("{}[{}]", v.name, key - v.index),
            Some(v) => v.name.clone(),
            None => format!("{}[{}]", store.letter(), key),
        }
    }

    /// `x <- 7` / `pos[1] <~ 3` / `token <-- 1`
    pub fn pprint_assign(&self, store: Store, key: usize, value: &str) -> String {
        format!("{} {} {}", self.pprint_var(store, key), store.arrow(), value)
    }

    /// Resolve a process name from an agent's scope, falling back to the
    /// system scope.
    pub fn lookup_process<'a>(&'a self, kind: &'a AgentKind, name: &str) -> Option<&'a Process> {
        kind.lookup_process(name)
            .or_else(|| {
                self.system_processes
                    .iter()
                    .find(|(n, _)| n == name)
                    .map(|(_, p)| p)
            })
    }
}

fn dedup_vars<'a>(vars: impl Iterator<Item = &'a Variable>) -> Vec<&'a Variable> {
    let mut seen = std::collections::HashSet::new();
    let mut out: Vec<&Variable> = Vec::new();
    for v in vars {
        if seen.insert((v.name.clone(), v.index)) {
            out.push(v);
        }
    }
    out.sort_by_key(|v| v.index);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) const BUNDLE: &str = "\
agent Worker 0,3
iface 0=x=0..2; 1=dir[2]=[0,1]
lstig 0=pos=undef
pick mate 2 Worker
process Worker Behavior = x <- 1 - x; Behavior
environment 0=token=0
property always forall Worker w, x of w < 2
assume forall Worker w, x of w >= 0
";

    #[test]
    fn test_parse_bundle() {
        let info = Info::parse(BUNDLE, &["n=3".to_string()]).unwrap();
        assert_eq!(info.spawn.num_agents(), 3);
        assert_eq!(info.spawn.range_of("Worker").unwrap(), (0, 3));
        assert_eq!(info.env.len(), 1);
        assert_eq!(info.properties.len(), 1);
        assert_eq!(info.assumes.len(), 1);
        assert_eq!(info.externs.get("n"), Some(&3));
        assert!(info.has_stigmergy());

        let worker = info.spawn.agent_at(1).unwrap();
        assert_eq!(worker.name, "Worker");
        assert_eq!(worker.iface.len(), 2);
        assert!(worker.uses_pick("mate"));
        assert!(worker.lookup_process("Behavior").is_some());
    }

    #[test]
    fn test_variable_values() {
        let info = Info::parse(BUNDLE, &[]).unwrap();
        let x = info.lookup_var("x").unwrap();
        assert_eq!(x.values(0).unwrap(), ValueSet::Range(0, 2));
        let dir = info.lookup_var("dir").unwrap();
        assert!(dir.is_array());
        assert_eq!(dir.size, 2);
        assert_eq!(dir.values(0).unwrap(), ValueSet::List(vec![0, 1]));
        let pos = info.lookup_var("pos").unwrap();
        assert_eq!(pos.values(2).unwrap(), ValueSet::List(vec![UNDEF]));
    }

    #[test]
    fn test_id_dependent_initializer() {
        let info = Info::parse("agent A 0,2\niface 0=side=id % 2\n", &[]).unwrap();
        let v = info.lookup_var("side").unwrap();
        assert_eq!(v.values(0).unwrap().as_singleton(), Some(0));
        assert_eq!(v.values(1).unwrap().as_singleton(), Some(1));
    }

    #[test]
    fn test_var_at_covers_arrays() {
        let info = Info::parse(BUNDLE, &[]).unwrap();
        assert_eq!(info.var_at(Store::Iface, 2).unwrap().name, "dir");
        assert_eq!(info.pprint_var(Store::Iface, 2), "dir[1]");
        assert_eq!(info.pprint_var(Store::Iface, 0), "x");
    }

    #[test]
    fn test_pprint_assign_arrows() {
        let info = Info::parse(BUNDLE, &[]).unwrap();
        assert_eq!(info.pprint_assign(Store::Iface, 0, "7"), "x <- 7");
        assert_eq!(info.pprint_assign(Store::Lstig, 0, "3"), "pos <~ 3");
        assert_eq!(info.pprint_assign(Store::Env, 0, "1"), "token <-- 1");
    }

    #[test]
    fn test_max_keys() {
        let info = Info::parse(BUNDLE, &[]).unwrap();
        assert_eq!(info.max_key_iface(), Some(2));
        assert_eq!(info.max_key_lstig(), Some(0));
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(Info::parse("", &[]).is_err());
        assert!(Info::parse("bogus line\n", &[]).is_err());
        assert!(Info::parse("iface 0=x=0\n", &[]).is_err());
    }
}
