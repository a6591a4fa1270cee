//! DIMACS variable mapping and SAT-level weak assumptions
//!
//! The BMC simulator path leaves the program symbolic and instead steers
//! the SAT solver: the CNF comment map is parsed to locate the
//! propositional variables realizing each store cell and scheduler slot,
//! and the concretizer's model is lowered to per-bit weak assumptions in
//! two's complement.
//!
//! The mangled-name rules (`name#version`, `[[<hex>]]` offsets,
//! `main::1::sched!0@1`) are CBMC-internal and live only in this module.

use std::collections::HashMap;

use crate::concretizer::ConcreteModel;
use swarm_spec::Info;

/// One propositional literal slot in the mapping: a CNF variable or a
/// constant already resolved by the front-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CnfLit {
    True,
    False,
    Var(u64),
}

fn to_cbmc_hex(n: usize) -> String {
    format!("{:X}", n)
}

/// The `c <name> <literals...>` comment map of a DIMACS dump.
#[derive(Debug)]
pub struct DimacsMapping {
    /// The `p cnf ...` header line.
    pub header: String,
    raw: HashMap<String, String>,
    parsed: HashMap<String, Vec<CnfLit>>,
}

impl DimacsMapping {
    pub fn parse(text: &str) -> DimacsMapping {
        let mut lines = text.lines();
        let header = lines.next().unwrap_or_default().trim().to_string();
        let mut raw = HashMap::new();
        for line in lines {
            if let Some(rest) = line.strip_prefix("c ") {
                if let Some((name, vars)) = rest.split_once(' ') {
                    raw.insert(name.to_string(), vars.to_string());
                }
            }
        }
        DimacsMapping {
            header,
            raw,
            parsed: HashMap::new(),
        }
    }

    fn lookup(&mut self, key: &str) -> Option<&Vec<CnfLit>> {
        if !self.parsed.contains_key(key) {
            let vars_str = self.raw.get(key)?;
            let lits: Vec<CnfLit> = vars_str
                .split_whitespace()
                .map(|tok| match tok {
                    "TRUE" => CnfLit::True,
                    "FALSE" => CnfLit::False,
                    other => CnfLit::Var(other.parse().unwrap_or(0)),
                })
                .collect();
            self.parsed.insert(key.to_string(), lits);
        }
        self.parsed.get(key)
    }

    /// The first version of array `name` that is fully initialized.
    fn find_array(&mut self, name: &str) -> Result<String, String> {
        let candidates: Vec<String> = self
            .raw
            .keys()
            .filter(|n| n.starts_with(name))
            .cloned()
            .collect();
        let mut initialized: Vec<(usize, String)> = Vec::new();
        for cand in candidates {
            let Some(lits) = self.lookup(&cand) else { continue };
            if lits.iter().any(|l| matches!(l, CnfLit::False)) {
                continue;
            }
            let version = cand
                .rsplit('#')
                .next()
                .and_then(|v| v.parse::<usize>().ok())
                .unwrap_or(usize::MAX);
            initialized.push((version, cand));
        }
        initialized
            .into_iter()
            .min()
            .map(|(_, name)| name)
            .ok_or_else(|| format!("no initialized version of '{}' in the DIMACS map", name))
    }

    /// The CNF literals realizing one element of a (possibly
    /// multi-dimensional) array variable.
    pub fn get_element(
        &mut self,
        name: &str,
        indexes: &[usize],
        dims: &[usize],
    ) -> Result<Vec<CnfLit>, String> {
        let offset_key: String = indexes
            .iter()
            .map(|i| format!("[[{}]]", to_cbmc_hex(*i)))
            .collect();
        // The easy way: a per-element entry
        let direct = format!("{}#2{}", name, offset_key);
        if let Some(lits) = self.lookup(&direct) {
            return Ok(lits.clone());
        }
        // The hard way: slice the flattened array
        let array_name = self.find_array(name)?;
        let lits = self
            .lookup(&array_name)
            .cloned()
            .ok_or_else(|| format!("'{}' vanished from the DIMACS map", array_name))?;
        if dims.is_empty() || dims.len() != indexes.len() {
            return Err(format!(
                "dimension mismatch for '{}': {} indexes, {} dims",
                name,
                indexes.len(),
                dims.len()
            ));
        }
        if indexes.iter().zip(dims).any(|(i, d)| i >= d) {
            return Err(format!("index out of bounds for '{}'", name));
        }
        let mut offset = indexes[indexes.len() - 1];
        for (x, idx) in indexes[..indexes.len() - 1].iter().enumerate() {
            offset += idx * dims[x + 1..].iter().product::<usize>();
        }
        let total: usize = dims.iter().product();
        if total == 0 || lits.len() % total != 0 {
            return Err(format!(
                "cannot infer bitwidth of '{}' ({} literals over {} cells)",
                name,
                lits.len(),
                total
            ));
        }
        let bw = lits.len() / total;
        let start = bw * offset;
        Ok(lits[start..start + bw].to_vec())
    }
}

/// LSB-first two's-complement bitvector of `num`.
pub fn to_bitvector(num: i64, width: usize) -> Vec<u8> {
    (0..width).map(|i| ((num >> i.min(63)) & 1) as u8).collect()
}

/// Lower the concretizer's model to per-bit weak assumptions over the
/// interface store and (with a free scheduler) the `sched` array.
pub fn weak_assumptions(
    model: &ConcreteModel,
    mapping: &mut DimacsMapping,
    info: &Info,
    steps: usize,
    fair: bool,
) -> Vec<(CnfLit, u8)> {
    let mut weaks: Vec<(CnfLit, u8)> = Vec::new();
    let iface_width = info.max_key_iface().map(|k| k + 1).unwrap_or(0);

    for (tid, cells) in model.iface.iter().enumerate() {
        for (idx, value) in cells {
            match mapping.get_element(
                "I",
                &[tid, *idx],
                &[info.spawn.num_agents(), iface_width],
            ) {
                Ok(lits) => {
                    let bits = to_bitvector(*value, lits.len());
                    weaks.extend(lits.into_iter().zip(bits));
                }
                Err(e) => {
                    tracing::debug!("concretization could not find I[{}][{}]: {}", tid, idx, e);
                }
            }
        }
    }

    if !fair {
        for (step, value) in model.sched.iter().enumerate() {
            match mapping.get_element("main::1::sched!0@1", &[step], &[steps]) {
                Ok(lits) => {
                    let bits = to_bitvector(*value, lits.len());
                    weaks.extend(lits.into_iter().zip(bits));
                }
                Err(e) => {
                    tracing::debug!("concretization could not find sched[{}]: {}", step, e);
                }
            }
        }
    }
    weaks
}

/// Shell wrapper invoking minisat with the weak assumptions and
/// nondeterministic search heuristics.
pub fn minisat_script(minisat: &str, weaks: &[(CnfLit, u8)]) -> String {
    let formatted: Vec<String> = weaks
        .iter()
        .filter_map(|(lit, bit)| match lit {
            CnfLit::Var(v) if *bit != 0 => Some(v.to_string()),
            CnfLit::Var(v) => Some(format!("-{}", v)),
            // Already resolved by the front-end
            _ => None,
        })
        .collect();
    format!(
        "#!/bin/bash\n\n\
         # Invokes the SAT solver with weak assumptions and nondet heuristics.\n\
         MINISAT=\"{}\"\n\
         WEAKS=\"{}\"\n\
         F=0.15\n\n\
         $MINISAT -model -rnd-freq=$F -no-elim -rnd-init -rnd-seed=$RANDOM -try-assume=\"$WEAKS\" $1\n",
        minisat,
        formatted.join(" ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const DUMP: &str = "\
p cnf 12 3
c I#2[[0]][[0]] 1 2 3 4
c main::1::sched!0@1#3 5 6 7 8 9 10 11 12
c other#1 TRUE FALSE
";

    #[test]
    fn test_parse_and_direct_lookup() {
        let mut m = DimacsMapping::parse(DUMP);
        assert_eq!(m.header, "p cnf 12 3");
        let lits = m.get_element("I", &[0, 0], &[1, 1]).unwrap();
        assert_eq!(
            lits,
            vec![CnfLit::Var(1), CnfLit::Var(2), CnfLit::Var(3), CnfLit::Var(4)]
        );
    }

    #[test]
    fn test_array_slicing_with_inferred_bitwidth() {
        let mut m = DimacsMapping::parse(DUMP);
        // 8 literals over 2 cells -> 4 bits per cell
        let lits = m.get_element("main::1::sched!0@1", &[1], &[2]).unwrap();
        assert_eq!(lits, vec![CnfLit::Var(9), CnfLit::Var(10), CnfLit::Var(11), CnfLit::Var(12)]);
    }

    #[test]
    fn test_partially_initialized_arrays_are_skipped() {
        let mut m = DimacsMapping::parse(DUMP);
        assert!(m.find_array("other").is_err());
    }

    #[test]
    fn test_to_bitvector_twos_complement() {
        assert_eq!(to_bitvector(5, 4), vec![1, 0, 1, 0]);
        assert_eq!(to_bitvector(-1, 4), vec![1, 1, 1, 1]);
        assert_eq!(to_bitvector(-2, 4), vec![0, 1, 1, 1]);
        // sign extension
        assert_eq!(to_bitvector(-2, 6), vec![0, 1, 1, 1, 1, 1]);
    }

    #[test]
    fn test_minisat_script_literal_signs() {
        let weaks = vec![
            (CnfLit::Var(3), 1),
            (CnfLit::Var(4), 0),
            (CnfLit::True, 1),
        ];
        let script = minisat_script("/usr/bin/minisat", &weaks);
        assert!(script.contains("WEAKS=\"3 -4\""));
        assert!(script.starts_with("#!/bin/bash"));
    }
}
