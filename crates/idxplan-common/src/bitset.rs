//! Growable id set

use serde::{Deserialize, Serialize};
use std::fmt;

/// Set of small non-negative integers (filter ids, column ids, ordinals).
///
/// Same shape as a fixed 64-bit bitset but grows on insert, so a filter
/// with more than 64 sub-expressions still fits.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdSet {
    words: Vec<u64>,
}

impl IdSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn singleton(bit: usize) -> Self {
        let mut set = Self::new();
        set.insert(bit);
        set
    }

    pub fn insert(&mut self, bit: usize) {
        let word = bit / 64;
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= 1u64 << (bit % 64);
    }

    pub fn remove(&mut self, bit: usize) {
        let word = bit / 64;
        if let Some(w) = self.words.get_mut(word) {
            *w &= !(1u64 << (bit % 64));
        }
    }

    pub fn contains(&self, bit: usize) -> bool {
        self.words
            .get(bit / 64)
            .is_some_and(|w| w & (1u64 << (bit % 64)) != 0)
    }

    pub fn union(&self, other: &Self) -> Self {
        let len = self.words.len().max(other.words.len());
        let words = (0..len)
            .map(|i| self.word(i) | other.word(i))
            .collect();
        Self { words }
    }

    pub fn intersection(&self, other: &Self) -> Self {
        let len = self.words.len().min(other.words.len());
        let words = (0..len).map(|i| self.word(i) & other.word(i)).collect();
        Self { words }
    }

    pub fn difference(&self, other: &Self) -> Self {
        let words = (0..self.words.len())
            .map(|i| self.word(i) & !other.word(i))
            .collect();
        Self { words }
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }

    pub fn len(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn is_subset_of(&self, other: &Self) -> bool {
        self.difference(other).is_empty()
    }

    /// Smallest member, if any
    pub fn first(&self) -> Option<usize> {
        self.iter().next()
    }

    /// Smallest member that is `>= from`
    pub fn next_from(&self, from: usize) -> Option<usize> {
        self.iter().find(|b| *b >= from)
    }

    /// Iterate members in ascending order
    pub fn iter(&self) -> IdSetIter<'_> {
        IdSetIter {
            words: &self.words,
            index: 0,
            current: self.words.first().copied().unwrap_or(0),
        }
    }

    fn word(&self, i: usize) -> u64 {
        self.words.get(i).copied().unwrap_or(0)
    }
}

impl PartialEq for IdSet {
    fn eq(&self, other: &Self) -> bool {
        let len = self.words.len().max(other.words.len());
        (0..len).all(|i| self.word(i) == other.word(i))
    }
}

impl Eq for IdSet {}

impl FromIterator<usize> for IdSet {
    fn from_iter<T: IntoIterator<Item = usize>>(iter: T) -> Self {
        let mut set = Self::new();
        for bit in iter {
            set.insert(bit);
        }
        set
    }
}

pub struct IdSetIter<'a> {
    words: &'a [u64],
    index: usize,
    current: u64,
}

impl Iterator for IdSetIter<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        loop {
            if self.current != 0 {
                let bit = self.current.trailing_zeros() as usize;
                self.current &= self.current - 1;
                return Some(self.index * 64 + bit);
            }
            self.index += 1;
            self.current = *self.words.get(self.index)?;
        }
    }
}

impl fmt::Display for IdSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        let mut first = true;
        for b in self.iter() {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{}", b)?;
            first = false;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_contains_grow() {
        let mut set = IdSet::new();
        set.insert(3);
        set.insert(130);
        assert!(set.contains(3));
        assert!(set.contains(130));
        assert!(!set.contains(64));
        assert_eq!(set.len(), 2);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![3, 130]);
    }

    #[test]
    fn test_set_algebra() {
        let a: IdSet = [1, 2, 70].into_iter().collect();
        let b: IdSet = [2, 3].into_iter().collect();
        assert_eq!(a.union(&b).iter().collect::<Vec<_>>(), vec![1, 2, 3, 70]);
        assert_eq!(a.intersection(&b).iter().collect::<Vec<_>>(), vec![2]);
        assert_eq!(a.difference(&b).iter().collect::<Vec<_>>(), vec![1, 70]);
        assert!(IdSet::singleton(2).is_subset_of(&a));
    }

    #[test]
    fn test_equality_ignores_trailing_words() {
        let mut a = IdSet::singleton(1);
        a.insert(100);
        a.remove(100);
        assert_eq!(a, IdSet::singleton(1));
        assert!(IdSet::new().is_empty());
        assert_eq!(a.next_from(2), None);
        assert_eq!(a.to_string(), "{1}");
    }
}
