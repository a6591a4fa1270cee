//! Abstract states
//!
//! A state maps every declared variable (plus block locals and the
//! synthetic `id` field) to one abstract value. States are immutable
//! values: transformers return fresh states, so they can be shared freely
//! across worker threads.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use crate::domain::AbstractDomain;

/// A variable-indexed abstract state.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AbstractState<D> {
    vars: BTreeMap<String, D>,
}

impl<D: AbstractDomain> AbstractState<D> {
    pub fn new() -> Self {
        AbstractState {
            vars: BTreeMap::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&D> {
        self.vars.get(name)
    }

    pub fn contains_var(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: D) {
        self.vars.insert(name.into(), value);
    }

    /// A copy with one variable replaced.
    pub fn with(&self, name: &str, value: D) -> Self {
        let mut out = self.clone();
        out.vars.insert(name.to_string(), value);
        out
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.vars.keys().map(|k| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &D)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Variable-wise join of two states over the union of their fields.
    pub fn merge(&self, other: &Self) -> Self {
        let mut out = self.clone();
        for (name, value) in &other.vars {
            match out.vars.get(name) {
                Some(mine) => {
                    let joined = mine.join(value);
                    out.vars.insert(name.clone(), joined);
                }
                None => {
                    out.vars.insert(name.clone(), value.clone());
                }
            }
        }
        out
    }

    /// Variable-wise containment: every field of `self` lies within the
    /// corresponding field of `other`.
    pub fn is_within(&self, other: &Self) -> bool {
        self.vars.iter().all(|(name, value)| {
            other
                .vars
                .get(name)
                .map(|o| value.is_within(o))
                .unwrap_or(false)
        })
    }

    /// Normalize every field with `join_adjacent`.
    pub fn normalized(&self) -> Self {
        AbstractState {
            vars: self
                .vars
                .iter()
                .map(|(k, v)| (k.clone(), v.join_adjacent()))
                .collect(),
        }
    }

    /// Split the state on one variable. `None` when the variable is a
    /// singleton (or missing), which terminates recursive refinement.
    pub fn bisect_by(&self, var: &str) -> Option<(Self, Self)> {
        let (lo, hi) = self.vars.get(var)?.bisect()?;
        Some((self.with(var, lo), self.with(var, hi)))
    }
}

impl<D: AbstractDomain> Default for AbstractState<D> {
    fn default() -> Self {
        AbstractState::new()
    }
}

/// Bounded cache for bisection results, keyed by `(state, variable)`.
/// Guard refinement revisits the same split points many times; the cache
/// is cleared wholesale when it grows past its capacity.
pub struct BisectCache<D> {
    inner: Mutex<HashMap<(AbstractState<D>, String), Option<(AbstractState<D>, AbstractState<D>)>>>,
    capacity: usize,
}

impl<D: AbstractDomain> BisectCache<D> {
    pub fn new(capacity: usize) -> Self {
        BisectCache {
            inner: Mutex::new(HashMap::new()),
            capacity,
        }
    }

    pub fn bisect_by(
        &self,
        state: &AbstractState<D>,
        var: &str,
    ) -> Option<(AbstractState<D>, AbstractState<D>)> {
        let key = (state.clone(), var.to_string());
        {
            let cache = self.inner.lock().expect("bisect cache poisoned");
            if let Some(hit) = cache.get(&key) {
                return hit.clone();
            }
        }
        let result = state.bisect_by(var);
        let mut cache = self.inner.lock().expect("bisect cache poisoned");
        if cache.len() >= self.capacity {
            cache.clear();
        }
        cache.insert(key, result.clone());
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stripes::Stripes;

    fn state(pairs: &[(&str, Stripes)]) -> AbstractState<Stripes> {
        let mut s = AbstractState::new();
        for (n, v) in pairs {
            s.set(*n, v.clone());
        }
        s
    }

    #[test]
    fn test_merge_joins_fields() {
        let a = state(&[("x", Stripes::singleton(0))]);
        let b = state(&[("x", Stripes::singleton(3))]);
        let m = a.merge(&b);
        assert!(m.get("x").unwrap().contains(0));
        assert!(m.get("x").unwrap().contains(3));
    }

    #[test]
    fn test_is_within() {
        let small = state(&[("x", Stripes::singleton(1))]);
        let big = state(&[("x", Stripes::abstract_range(0, 5))]);
        assert!(small.is_within(&big));
        assert!(!big.is_within(&small));
    }

    #[test]
    fn test_bisect_by() {
        let s = state(&[("x", Stripes::abstract_range(0, 9))]);
        let (lo, hi) = s.bisect_by("x").unwrap();
        assert_eq!(lo.get("x").unwrap(), &Stripes::abstract_range(0, 4));
        assert_eq!(hi.get("x").unwrap(), &Stripes::abstract_range(5, 9));
        let singleton = state(&[("x", Stripes::singleton(2))]);
        assert!(singleton.bisect_by("x").is_none());
    }

    #[test]
    fn test_bisect_cache_consistent() {
        let cache = BisectCache::new(16);
        let s = state(&[("x", Stripes::abstract_range(0, 9))]);
        let first = cache.bisect_by(&s, "x");
        let second = cache.bisect_by(&s, "x");
        assert_eq!(first, second);
    }
}
