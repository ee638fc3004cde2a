//! Bidirectional many-to-many index
//!
//! Stores `(A, B)` tuples in two mirrored maps so lookups by either side are
//! cheap. Every mutation updates both maps together, and empty sets are
//! pruned, so the maps are always exact inverses of each other.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

#[derive(Debug, Clone)]
pub struct TupleIndex<A, B>
where
    A: Eq + Hash + Clone,
    B: Eq + Hash + Clone,
{
    forward: HashMap<A, HashSet<B>>,
    reverse: HashMap<B, HashSet<A>>,
}

impl<A, B> TupleIndex<A, B>
where
    A: Eq + Hash + Clone,
    B: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self {
            forward: HashMap::new(),
            reverse: HashMap::new(),
        }
    }

    /// Insert the tuple `(a, b)`; inserting an existing tuple is a no-op.
    pub fn add(&mut self, a: A, b: B) {
        self.forward.entry(a.clone()).or_default().insert(b.clone());
        self.reverse.entry(b).or_default().insert(a);
    }

    /// Remove the single tuple `(a, b)` if present.
    pub fn delete(&mut self, a: &A, b: &B) {
        if let Some(set) = self.forward.get_mut(a) {
            set.remove(b);
            if set.is_empty() {
                self.forward.remove(a);
            }
        }
        if let Some(set) = self.reverse.get_mut(b) {
            set.remove(a);
            if set.is_empty() {
                self.reverse.remove(b);
            }
        }
    }

    /// Remove every tuple whose first element is `a`.
    pub fn delete_first(&mut self, a: &A) {
        let Some(seconds) = self.forward.remove(a) else {
            return;
        };
        for b in seconds {
            if let Some(set) = self.reverse.get_mut(&b) {
                set.remove(a);
                if set.is_empty() {
                    self.reverse.remove(&b);
                }
            }
        }
    }

    /// Remove every tuple whose second element is `b`.
    pub fn delete_second(&mut self, b: &B) {
        let Some(firsts) = self.reverse.remove(b) else {
            return;
        };
        for a in firsts {
            if let Some(set) = self.forward.get_mut(&a) {
                set.remove(b);
                if set.is_empty() {
                    self.forward.remove(&a);
                }
            }
        }
    }

    pub fn get_by_first(&self, a: &A) -> Vec<B> {
        self.forward
            .get(a)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn get_by_second(&self, b: &B) -> Vec<A> {
        self.reverse
            .get(b)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Replace all tuples starting with `a` by `(a, v)` for each `v`.
    pub fn override_by_first<I>(&mut self, a: A, values: I)
    where
        I: IntoIterator<Item = B>,
    {
        self.delete_first(&a);
        for b in values {
            self.add(a.clone(), b);
        }
    }

    pub fn contains(&self, a: &A, b: &B) -> bool {
        self.forward.get(a).is_some_and(|set| set.contains(b))
    }

    /// Number of stored tuples
    pub fn len(&self) -> usize {
        self.forward.values().map(HashSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    #[cfg(test)]
    fn is_consistent(&self) -> bool {
        let forward_ok = self.forward.iter().all(|(a, bs)| {
            !bs.is_empty()
                && bs
                    .iter()
                    .all(|b| self.reverse.get(b).is_some_and(|s| s.contains(a)))
        });
        let reverse_ok = self.reverse.iter().all(|(b, as_)| {
            !as_.is_empty()
                && as_
                    .iter()
                    .all(|a| self.forward.get(a).is_some_and(|s| s.contains(b)))
        });
        forward_ok && reverse_ok
    }
}

impl<A, B> Default for TupleIndex<A, B>
where
    A: Eq + Hash + Clone,
    B: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sorted<T: Ord>(mut v: Vec<T>) -> Vec<T> {
        v.sort();
        v
    }

    #[test]
    fn add_is_visible_from_both_sides() {
        let mut index = TupleIndex::new();
        index.add("p1", "c1");
        index.add("p1", "c2");
        index.add("p2", "c1");

        assert_eq!(sorted(index.get_by_first(&"p1")), vec!["c1", "c2"]);
        assert_eq!(sorted(index.get_by_second(&"c1")), vec!["p1", "p2"]);
        assert_eq!(index.len(), 3);
        assert!(index.is_consistent());
    }

    #[test]
    fn delete_first_updates_reverse() {
        let mut index = TupleIndex::new();
        index.add("p1", "c1");
        index.add("p2", "c1");
        index.delete_first(&"p1");

        assert!(index.get_by_first(&"p1").is_empty());
        assert_eq!(index.get_by_second(&"c1"), vec!["p2"]);
        assert!(index.is_consistent());
    }

    #[test]
    fn delete_second_updates_forward() {
        let mut index = TupleIndex::new();
        index.add("p1", "c1");
        index.add("p1", "c2");
        index.delete_second(&"c1");

        assert_eq!(index.get_by_first(&"p1"), vec!["c2"]);
        assert!(index.get_by_second(&"c1").is_empty());
        assert!(index.is_consistent());
    }

    #[test]
    fn delete_single_tuple_prunes_empty_sets() {
        let mut index = TupleIndex::new();
        index.add("x", "m1");
        index.delete(&"x", &"m1");
        assert!(index.is_empty());
        assert!(index.get_by_second(&"m1").is_empty());
        assert!(index.is_consistent());
    }

    #[test]
    fn override_by_first_replaces_edges() {
        let mut index = TupleIndex::new();
        index.add("p1", "c");
        index.override_by_first("p1", ["d"]);

        assert_eq!(index.get_by_first(&"p1"), vec!["d"]);
        assert!(index.get_by_second(&"c").is_empty());
        assert_eq!(index.get_by_second(&"d"), vec!["p1"]);
        assert!(!index.contains(&"p1", &"c"));
        assert!(index.is_consistent());
    }
}
