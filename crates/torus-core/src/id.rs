//! Task identifiers and the [`TaskIdSet`] bitset.

use smallvec::SmallVec;
use std::fmt;

/// Identifies a registered task within one driver instance.
///
/// Task ids are allocated sequentially by the task registry at assembly
/// time and never reused. `TaskId(n)` corresponds to the n-th task
/// registered across all task lists owned by a driver, so the id doubles
/// as a bit position in a [`TaskIdSet`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u32);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for TaskId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// A set of task ids implemented as a dynamically-sized bitset.
///
/// Used both for a task's dependency set and for the per-stage completion
/// mask of a task list. Readiness of a task is a subset test of its
/// dependency set against the completion mask, so the cost of the check
/// scales with the dependency set's word count, not with the total number
/// of registered tasks.
#[derive(Clone, Debug, Default)]
pub struct TaskIdSet {
    bits: SmallVec<[u64; 2]>,
}

impl TaskIdSet {
    const BITS_PER_WORD: usize = 64;

    /// Create an empty set.
    pub fn empty() -> Self {
        Self {
            bits: SmallVec::new(),
        }
    }

    /// Insert a task id into the set.
    pub fn insert(&mut self, id: TaskId) {
        let word = id.0 as usize / Self::BITS_PER_WORD;
        let bit = id.0 as usize % Self::BITS_PER_WORD;
        if word >= self.bits.len() {
            self.bits.resize(word + 1, 0);
        }
        self.bits[word] |= 1u64 << bit;
    }

    /// Remove a task id from the set.
    pub fn remove(&mut self, id: TaskId) {
        let word = id.0 as usize / Self::BITS_PER_WORD;
        let bit = id.0 as usize % Self::BITS_PER_WORD;
        if word < self.bits.len() {
            self.bits[word] &= !(1u64 << bit);
        }
    }

    /// Check whether the set contains a task id.
    pub fn contains(&self, id: TaskId) -> bool {
        let word = id.0 as usize / Self::BITS_PER_WORD;
        let bit = id.0 as usize % Self::BITS_PER_WORD;
        word < self.bits.len() && (self.bits[word] & (1u64 << bit)) != 0
    }

    /// Return the union of two sets (`self | other`).
    pub fn union(&self, other: &Self) -> Self {
        let max_len = self.bits.len().max(other.bits.len());
        let mut bits = SmallVec::with_capacity(max_len);
        for i in 0..max_len {
            let a = self.bits.get(i).copied().unwrap_or(0);
            let b = other.bits.get(i).copied().unwrap_or(0);
            bits.push(a | b);
        }
        Self { bits }
    }

    /// Check whether `self` is a subset of `other`.
    pub fn is_subset(&self, other: &Self) -> bool {
        for i in 0..self.bits.len() {
            let b = other.bits.get(i).copied().unwrap_or(0);
            if self.bits[i] & !b != 0 {
                return false;
            }
        }
        true
    }

    /// Check whether every id in `self` is in `a | b` without allocating
    /// the union.
    pub fn is_subset_of_union(&self, a: &Self, b: &Self) -> bool {
        for i in 0..self.bits.len() {
            let u = a.bits.get(i).copied().unwrap_or(0) | b.bits.get(i).copied().unwrap_or(0);
            if self.bits[i] & !u != 0 {
                return false;
            }
        }
        true
    }

    /// Return the set difference (`self - other`).
    pub fn difference(&self, other: &Self) -> Self {
        let mut bits = SmallVec::with_capacity(self.bits.len());
        for i in 0..self.bits.len() {
            let b = other.bits.get(i).copied().unwrap_or(0);
            bits.push(self.bits[i] & !b);
        }
        while bits.last() == Some(&0) {
            bits.pop();
        }
        Self { bits }
    }

    /// Remove every id from the set.
    pub fn clear(&mut self) {
        self.bits.clear();
    }

    /// Returns `true` if the set contains no ids.
    pub fn is_empty(&self) -> bool {
        self.bits.iter().all(|&w| w == 0)
    }

    /// Returns the number of ids in the set.
    pub fn len(&self) -> usize {
        self.bits.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Iterate over the ids in the set, in ascending order.
    pub fn iter(&self) -> TaskIdSetIter<'_> {
        TaskIdSetIter {
            bits: &self.bits,
            word_idx: 0,
            bit_idx: 0,
        }
    }
}

impl PartialEq for TaskIdSet {
    fn eq(&self, other: &Self) -> bool {
        let max_len = self.bits.len().max(other.bits.len());
        for i in 0..max_len {
            let a = self.bits.get(i).copied().unwrap_or(0);
            let b = other.bits.get(i).copied().unwrap_or(0);
            if a != b {
                return false;
            }
        }
        true
    }
}

impl Eq for TaskIdSet {}

impl FromIterator<TaskId> for TaskIdSet {
    fn from_iter<I: IntoIterator<Item = TaskId>>(iter: I) -> Self {
        let mut set = Self::empty();
        for id in iter {
            set.insert(id);
        }
        set
    }
}

impl<'a> IntoIterator for &'a TaskIdSet {
    type Item = TaskId;
    type IntoIter = TaskIdSetIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over the ids in a [`TaskIdSet`], in ascending order.
pub struct TaskIdSetIter<'a> {
    bits: &'a [u64],
    word_idx: usize,
    bit_idx: usize,
}

impl Iterator for TaskIdSetIter<'_> {
    type Item = TaskId;

    fn next(&mut self) -> Option<TaskId> {
        while self.word_idx < self.bits.len() {
            let word = self.bits[self.word_idx];
            while self.bit_idx < TaskIdSet::BITS_PER_WORD {
                let bit = self.bit_idx;
                self.bit_idx += 1;
                if word & (1u64 << bit) != 0 {
                    let id = self.word_idx * TaskIdSet::BITS_PER_WORD + bit;
                    return Some(TaskId(id as u32));
                }
            }
            self.word_idx += 1;
            self.bit_idx = 0;
        }
        None
    }
}
