use std::collections::TryReserveError;

use thiserror::Error;

use crate::config::CacheConfig;

/// One slot of a set: metadata for at most one resident cache line.
///
/// `recency` is only meaningful under LRU, `installed_at` only under FIFO,
/// and `dirty` only under write-back; the unused fields simply stay at their
/// initial values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Way {
    pub tag: u64,
    pub valid: bool,
    pub dirty: bool,
    /// position in the set's LRU order; 0 = most recently used
    pub recency: usize,
    /// FIFO install stamp; `None` = never installed
    pub installed_at: Option<u64>,
}

impl Way {
    pub(crate) fn empty(recency: usize) -> Self {
        Self {
            tag: 0,
            valid: false,
            dirty: false,
            recency,
            installed_at: None,
        }
    }
}

#[derive(Error, Debug)]
#[error("failed to reserve cache table storage: {0}")]
pub struct TableAllocError(#[from] TryReserveError);

/// The owned per-way metadata store: `num_sets * associativity` ways in one
/// contiguous allocation, indexed by `set_index * associativity + way`.
///
/// Allocated once per run and mutated in place; a given tag is resident in at
/// most one valid way of its set at any time.
pub struct CacheTable {
    ways: Vec<Way>,
    num_sets: usize,
    associativity: usize,
}

impl CacheTable {
    pub fn new(config: &CacheConfig) -> Result<Self, TableAllocError> {
        let num_sets = config.num_sets();
        let associativity = config.associativity();
        let len = num_sets * associativity;
        let mut ways = Vec::new();
        ways.try_reserve_exact(len)?;
        // seed each set's recency with the identity permutation
        for i in 0..len {
            ways.push(Way::empty(i % associativity));
        }
        Ok(Self {
            ways,
            num_sets,
            associativity,
        })
    }

    pub fn num_sets(&self) -> usize {
        self.num_sets
    }

    pub fn associativity(&self) -> usize {
        self.associativity
    }

    pub fn set(&self, set_index: usize) -> &[Way] {
        let base = set_index * self.associativity;
        &self.ways[base..base + self.associativity]
    }

    pub(crate) fn set_mut(&mut self, set_index: usize) -> &mut [Way] {
        let base = set_index * self.associativity;
        &mut self.ways[base..base + self.associativity]
    }

    /// Every way of every set, in table order. The flush pass scans this.
    pub fn ways(&self) -> impl Iterator<Item = &Way> {
        self.ways.iter()
    }
}
