//! The stripes domain
//!
//! A stripes value is a finite set of intervals under two invariants: no
//! two intervals overlap, and no interval lies within another. They
//! resemble "donut" domains, except that multiple holes are allowed.
//! Values are immutable; every operator returns a fresh, re-pruned value.

use std::fmt;

use crate::interval::Interval;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Stripes {
    /// Sorted, pairwise disjoint intervals.
    stripes: Vec<Interval>,
}

impl Stripes {
    /// Normalize a raw interval collection: sort, merge overlapping pairs
    /// (which also eliminates subsets), and optionally coalesce adjacent
    /// intervals.
    fn prune(mut intervals: Vec<Interval>, coalesce_adjacent: bool) -> Stripes {
        debug_assert!(!intervals.is_empty(), "empty stripes");
        intervals.sort();
        let mut out: Vec<Interval> = Vec::with_capacity(intervals.len());
        for iv in intervals {
            match out.last_mut() {
                Some(last) if last.overlaps(&iv) || (coalesce_adjacent && last.adjacent(&iv)) => {
                    *last = last.join(&iv);
                }
                _ => out.push(iv),
            }
        }
        Stripes { stripes: out }
    }

    pub fn from_intervals(intervals: Vec<Interval>) -> Stripes {
        Stripes::prune(intervals, false)
    }

    /// The minimal stripes containing exactly the given values.
    pub fn abstract_values(values: &[i64]) -> Stripes {
        debug_assert!(!values.is_empty());
        Stripes::prune(
            values.iter().map(|v| Interval::singleton(*v)).collect(),
            true,
        )
    }

    pub fn singleton(v: i64) -> Stripes {
        Stripes {
            stripes: vec![Interval::singleton(v)],
        }
    }

    /// One interval covering the inclusive range `[lo, hi]`.
    pub fn abstract_range(lo: i64, hi: i64) -> Stripes {
        Stripes {
            stripes: vec![Interval::new(lo.min(hi), hi.max(lo))],
        }
    }

    pub fn yes() -> Stripes {
        Stripes::singleton(1)
    }

    pub fn no() -> Stripes {
        Stripes::singleton(0)
    }

    pub fn maybe() -> Stripes {
        Stripes::abstract_range(0, 1)
    }

    pub fn intervals(&self) -> &[Interval] {
        &self.stripes
    }

    pub fn extrema(&self) -> (i64, i64) {
        (
            self.stripes.first().map(|i| i.min).unwrap_or(0),
            self.stripes.last().map(|i| i.max).unwrap_or(0),
        )
    }

    pub fn contains(&self, v: i64) -> bool {
        self.stripes.iter().any(|i| i.contains(v))
    }

    /// The single integer this value denotes, if any.
    pub fn as_singleton(&self) -> Option<i64> {
        match self.stripes.as_slice() {
            [iv] if iv.is_singleton() => Some(iv.min),
            _ => None,
        }
    }

    pub fn join(&self, other: &Stripes) -> Stripes {
        let mut all = self.stripes.clone();
        all.extend_from_slice(&other.stripes);
        Stripes::prune(all, false)
    }

    /// Coalesce touching intervals (`[0,3] ∪ [4,7] = [0,7]`).
    pub fn join_adjacent(&self) -> Stripes {
        Stripes::prune(self.stripes.clone(), true)
    }

    pub fn is_within(&self, other: &Stripes) -> bool {
        if self == other {
            return true;
        }
        self.stripes
            .iter()
            .all(|x| other.stripes.iter().any(|y| x.is_within(y)))
    }

    fn combine<F>(&self, other: &Stripes, f: F) -> Stripes
    where
        F: Fn(&Interval, &Interval) -> Interval,
    {
        let mut out = Vec::with_capacity(self.stripes.len() * other.stripes.len());
        for a in &self.stripes {
            for b in &other.stripes {
                out.push(f(a, b));
            }
        }
        Stripes::prune(out, false)
    }

    fn try_combine<F>(&self, other: &Stripes, f: F) -> Result<Stripes, String>
    where
        F: Fn(&Interval, &Interval) -> Result<Interval, String>,
    {
        let mut out = Vec::with_capacity(self.stripes.len() * other.stripes.len());
        for a in &self.stripes {
            for b in &other.stripes {
                out.push(f(a, b)?);
            }
        }
        Ok(Stripes::prune(out, false))
    }

    pub fn add(&self, other: &Stripes) -> Stripes {
        self.combine(other, |a, b| a.add(b))
    }

    pub fn sub(&self, other: &Stripes) -> Stripes {
        self.combine(other, |a, b| a.sub(b))
    }

    pub fn mul(&self, other: &Stripes) -> Stripes {
        self.combine(other, |a, b| a.mul(b))
    }

    pub fn div(&self, other: &Stripes) -> Result<Stripes, String> {
        self.try_combine(other, |a, b| a.div(b))
    }

    pub fn rem(&self, other: &Stripes) -> Result<Stripes, String> {
        self.try_combine(other, |a, b| a.rem(b))
    }

    pub fn neg(&self) -> Stripes {
        Stripes::prune(self.stripes.iter().map(|i| i.neg()).collect(), false)
    }

    pub fn abs(&self) -> Stripes {
        Stripes::prune(self.stripes.iter().map(|i| i.abs()).collect(), false)
    }

    pub fn not_(&self) -> Stripes {
        Stripes::prune(self.stripes.iter().map(|i| i.not_()).collect(), false)
    }

    pub fn min_(&self, other: &Stripes) -> Stripes {
        self.combine(other, |a, b| a.min_(b))
    }

    pub fn max_(&self, other: &Stripes) -> Stripes {
        self.combine(other, |a, b| a.max_(b))
    }

    /// Three-valued equality (`YES`, `NO`, or `MAYBE`).
    pub fn equality(&self, other: &Stripes) -> Stripes {
        self.combine(other, |a, b| a.equality(b))
    }

    /// Three-valued strict order.
    pub fn lt(&self, other: &Stripes) -> Stripes {
        let (my_min, my_max) = self.extrema();
        let (other_min, other_max) = other.extrema();
        // Degenerate case: a single integer on either side admits an
        // exact answer more often.
        if my_min == my_max {
            if other_min == other_max {
                Stripes::singleton(i64::from(my_min < other_min))
            } else if my_min >= other_max {
                Stripes::no()
            } else if my_max < other_min {
                Stripes::yes()
            } else {
                Stripes::maybe()
            }
        } else if other_min == other_max {
            if my_min >= other_min {
                Stripes::no()
            } else if my_max < other_min {
                Stripes::yes()
            } else {
                Stripes::maybe()
            }
        } else if my_max < other_min {
            Stripes::yes()
        } else if my_min > other_max {
            Stripes::no()
        } else {
            Stripes::maybe()
        }
    }

    pub fn gt(&self, other: &Stripes) -> Stripes {
        other.lt(self)
    }

    pub fn ge(&self, other: &Stripes) -> Stripes {
        self.equality(other).or_(&self.gt(other))
    }

    pub fn le(&self, other: &Stripes) -> Stripes {
        self.equality(other).or_(&self.lt(other))
    }

    /// Three-valued conjunction over the 0/1 reading.
    pub fn and_(&self, other: &Stripes) -> Stripes {
        if self.contains(0) || other.contains(0) {
            if self.contains(1) && other.contains(1) {
                Stripes::maybe()
            } else {
                Stripes::no()
            }
        } else {
            Stripes::yes()
        }
    }

    /// Three-valued disjunction over the 0/1 reading.
    pub fn or_(&self, other: &Stripes) -> Stripes {
        let (my_min, my_max) = self.extrema();
        let (o_min, o_max) = other.extrema();
        if my_min == 0 && my_max == 0 && o_min == 0 && o_max == 0 {
            Stripes::no()
        } else if !self.contains(0) || !other.contains(0) {
            Stripes::yes()
        } else {
            Stripes::maybe()
        }
    }

    /// Evaluate `[self .. other)` flattened to stripes.
    pub fn range_nondet(&self, other: &Stripes) -> Result<Stripes, String> {
        let other_minus_1 = other.sub(&Stripes::yes());
        let mut out = Vec::new();
        for a in &self.stripes {
            for b in &other_minus_1.stripes {
                if b.max >= a.min {
                    out.push(Interval::new(a.min, b.max));
                }
            }
        }
        if out.is_empty() {
            return Err(format!("[{} .. {}] is an empty range", self, other));
        }
        Ok(Stripes::prune(out, false))
    }

    /// Split into two halves for guard-directed refinement. Returns `None`
    /// on a singleton integer, which terminates recursive bisection.
    pub fn bisect(&self) -> Option<(Stripes, Stripes)> {
        if self.stripes.len() > 1 {
            let mid = self.stripes.len() / 2;
            Some((
                Stripes {
                    stripes: self.stripes[..mid].to_vec(),
                },
                Stripes {
                    stripes: self.stripes[mid..].to_vec(),
                },
            ))
        } else {
            let iv = self.stripes[0];
            if iv.is_singleton() {
                None
            } else {
                let mid = crate::interval::floordiv(iv.min + iv.max, 2);
                Some((
                    Stripes {
                        stripes: vec![Interval::new(iv.min, mid)],
                    },
                    Stripes {
                        stripes: vec![Interval::new(mid + 1, iv.max)],
                    },
                ))
            }
        }
    }
}

impl fmt::Display for Stripes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.stripes.iter().map(|i| i.to_string()).collect();
        write!(f, "{{ {} }}", parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abstract_values_coalesces_singletons() {
        let s = Stripes::abstract_values(&[0, 1]);
        assert_eq!(s, Stripes::maybe());
        assert_eq!(s.intervals().len(), 1);
    }

    #[test]
    fn test_is_within_range() {
        for v in [3, 4, 7] {
            assert!(Stripes::singleton(v).is_within(&Stripes::abstract_range(3, 7)));
        }
        assert!(!Stripes::singleton(8).is_within(&Stripes::abstract_range(3, 7)));
        assert!(!Stripes::singleton(2).is_within(&Stripes::abstract_range(3, 7)));
    }

    #[test]
    fn test_add_sub_soundness() {
        let x = Stripes::abstract_range(0, 5);
        let y = Stripes::abstract_values(&[2, 9]);
        let back = x.add(&y).sub(&y);
        // (x + y) - y contains x (soundness, not exactness)
        assert!(x.is_within(&back.join_adjacent()));
    }

    #[test]
    fn test_order_cases() {
        assert_eq!(
            Stripes::abstract_range(4, 5).lt(&Stripes::singleton(6)),
            Stripes::yes()
        );
        assert_eq!(
            Stripes::abstract_range(4, 5).lt(&Stripes::singleton(5)),
            Stripes::maybe()
        );
        assert_eq!(
            Stripes::singleton(5).lt(&Stripes::abstract_range(4, 5)),
            Stripes::no()
        );
    }

    #[test]
    fn test_equality_cases() {
        assert_eq!(
            Stripes::singleton(2).equality(&Stripes::singleton(2)),
            Stripes::yes()
        );
        assert_eq!(
            Stripes::singleton(2).equality(&Stripes::singleton(3)),
            Stripes::no()
        );
        assert_eq!(
            Stripes::abstract_range(0, 4).equality(&Stripes::singleton(3)),
            Stripes::maybe()
        );
    }

    #[test]
    fn test_bisect_terminates_on_singleton() {
        assert!(Stripes::singleton(3).bisect().is_none());
    }

    #[test]
    fn test_bisect_halves_join_to_original() {
        let s = Stripes::abstract_range(0, 9);
        let (a, b) = s.bisect().unwrap();
        assert_eq!(a, Stripes::abstract_range(0, 4));
        assert_eq!(b, Stripes::abstract_range(5, 9));
        assert_eq!(a.join(&b).join_adjacent(), s);

        let multi = Stripes::from_intervals(vec![
            Interval::new(0, 1),
            Interval::new(5, 6),
            Interval::new(10, 11),
        ]);
        let (a, b) = multi.bisect().unwrap();
        assert_eq!(a.join(&b), multi);
    }

    #[test]
    fn test_join_adjacent() {
        let s = Stripes::from_intervals(vec![Interval::new(0, 3), Interval::new(4, 7)]);
        assert_eq!(s.intervals().len(), 2);
        assert_eq!(s.join_adjacent(), Stripes::abstract_range(0, 7));
    }

    #[test]
    fn test_range_nondet() {
        let lo = Stripes::singleton(0);
        let hi = Stripes::singleton(3);
        assert_eq!(lo.range_nondet(&hi).unwrap(), Stripes::abstract_range(0, 2));
    }

    #[test]
    fn test_and_or_truth_tables() {
        let yes = Stripes::yes();
        let no = Stripes::no();
        let maybe = Stripes::maybe();
        assert_eq!(yes.and_(&yes), Stripes::yes());
        assert_eq!(yes.and_(&no), Stripes::no());
        assert_eq!(yes.and_(&maybe), Stripes::maybe());
        assert_eq!(no.or_(&no), Stripes::no());
        assert_eq!(maybe.or_(&yes), Stripes::yes());
        assert_eq!(maybe.or_(&maybe), Stripes::maybe());
    }

    #[test]
    fn test_division_propagates_failure() {
        let x = Stripes::abstract_range(0, 5);
        assert!(x.div(&Stripes::singleton(0)).is_err());
        assert_eq!(
            x.div(&Stripes::singleton(2)).unwrap(),
            Stripes::abstract_range(0, 2)
        );
    }
}
