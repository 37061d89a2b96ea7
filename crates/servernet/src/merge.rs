//! Keeps declared alias IP order stable across reads.
//!
//! The cloud reports alias IPs in no particular order. Merging the observed
//! list into the declared one avoids a reorder diff on every read while still
//! picking up additions and removals made out of band.

use std::collections::HashSet;
use std::hash::Hash;

/// Merge `observed` into the order of `declared`.
///
/// Entries of `declared` still present in `observed` keep their relative
/// order, followed by entries only present in `observed` in the order they
/// were observed. Entries missing from `observed` are dropped. Duplicates
/// collapse to their first occurrence.
pub fn merge_ordered<T>(declared: &[T], observed: &[T]) -> Vec<T>
where
    T: Eq + Hash + Clone,
{
    let present: HashSet<&T> = observed.iter().collect();
    let mut seen = HashSet::new();

    declared
        .iter()
        .filter(|v| present.contains(v))
        .chain(observed.iter())
        .filter(|v| seen.insert(*v))
        .cloned()
        .collect()
}

/// Whether both lists hold the same elements, ignoring order and duplicates.
pub fn same_members<T>(a: &[T], b: &[T]) -> bool
where
    T: Eq + Hash,
{
    a.iter().collect::<HashSet<_>>() == b.iter().collect::<HashSet<_>>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_declared_order_and_appends_new() {
        let merged = merge_ordered(&["a", "b", "c"], &["c", "d", "b"]);
        assert_eq!(merged, ["b", "c", "d"]);
    }

    #[test]
    fn empty_declared_takes_observed_order() {
        let merged = merge_ordered(&[], &["10.0.0.9", "10.0.0.5"]);
        assert_eq!(merged, ["10.0.0.9", "10.0.0.5"]);
    }

    #[test]
    fn empty_observed_drops_everything() {
        let merged: Vec<&str> = merge_ordered(&["a", "b"], &[]);
        assert!(merged.is_empty());
    }

    #[test]
    fn duplicates_collapse() {
        let merged = merge_ordered(&["b", "a", "b"], &["a", "b", "a"]);
        assert_eq!(merged, ["b", "a"]);
    }

    #[test]
    fn set_comparison() {
        assert!(same_members(&["a", "b"], &["b", "a"]));
        assert!(same_members(&["a", "a"], &["a"]));
        assert!(!same_members(&["a"], &["a", "b"]));
    }
}
