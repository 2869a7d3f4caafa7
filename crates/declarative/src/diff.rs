//! Key-based set operations over resource snapshots
//!
//! Every routine takes an explicit key-extraction function. Resources keep
//! their structural equality; what counts as "the same resource" is decided
//! per call site (a node's name, a model's destination path, a model's URL).

use std::collections::HashSet;
use std::hash::Hash;

/// Outcome of [`dedup_by_key`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dedup<T> {
    /// First occurrence of every key, in input order
    pub kept: Vec<T>,
    /// Later occurrences that were dropped, in input order
    pub dropped: Vec<T>,
}

/// Drop items whose key was already seen, keeping the first occurrence
pub fn dedup_by_key<T, K, F>(items: impl IntoIterator<Item = T>, key: F) -> Dedup<T>
where
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    let mut seen = HashSet::new();
    let mut kept = Vec::new();
    let mut dropped = Vec::new();

    for item in items {
        if seen.insert(key(&item)) {
            kept.push(item);
        } else {
            dropped.push(item);
        }
    }

    Dedup { kept, dropped }
}

/// Items of `left` whose key does not appear in `right`, in `left` order
pub fn difference_by<'a, T, K, F>(left: &'a [T], right: &[T], key: F) -> Vec<&'a T>
where
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    let exclude: HashSet<K> = right.iter().map(&key).collect();
    left.iter().filter(|item| !exclude.contains(&key(item))).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Entry {
        name: &'static str,
        rev: u32,
    }

    fn entry(name: &'static str, rev: u32) -> Entry {
        Entry { name, rev }
    }

    #[test]
    fn test_dedup_keeps_first_occurrence() {
        let items = vec![entry("a", 1), entry("b", 1), entry("a", 2)];
        let dedup = dedup_by_key(items, |e| e.name);

        assert_eq!(dedup.kept, vec![entry("a", 1), entry("b", 1)]);
        assert_eq!(dedup.dropped, vec![entry("a", 2)]);
    }

    #[test]
    fn test_difference_is_one_sided() {
        let desired = vec![entry("a", 1), entry("b", 1), entry("c", 1)];
        let achieved = vec![entry("b", 9), entry("c", 9), entry("d", 9)];

        let install = difference_by(&desired, &achieved, |e| e.name);
        let remove = difference_by(&achieved, &desired, |e| e.name);

        assert_eq!(install, vec![&entry("a", 1)]);
        assert_eq!(remove, vec![&entry("d", 9)]);
    }

    #[test]
    fn test_difference_of_identical_sets_is_empty() {
        let items = vec![entry("a", 1), entry("b", 2)];
        assert!(difference_by(&items, &items, |e| e.name).is_empty());
    }
}
