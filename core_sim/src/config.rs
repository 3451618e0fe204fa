use serde::Serialize;
use thiserror::Error;

use crate::{
    common::Addr,
    policy::{ReplacementPolicy, WritePolicy},
};

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error("associativity must be positive")]
    ZeroAssociativity,
    #[error("block size must be positive")]
    ZeroBlockSize,
    #[error(
        "cache size {cache_size} B does not split into a positive whole number \
         of {associativity}-way sets of {block_size} B blocks"
    )]
    UnevenGeometry {
        cache_size: usize,
        associativity: usize,
        block_size: usize,
    },
}

/// Cache geometry and policy selection, fixed for the whole run.
///
/// Constructed once, validated once. A zero or fractional derived set count is
/// rejected here so the table is never allocated with degenerate bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheConfig {
    cache_size: usize,
    associativity: usize,
    block_size: usize,
    num_sets: usize,
    replacement: ReplacementPolicy,
    write_policy: WritePolicy,
}

impl CacheConfig {
    pub fn new(
        cache_size: usize,
        associativity: usize,
        block_size: usize,
        replacement: ReplacementPolicy,
        write_policy: WritePolicy,
    ) -> Result<Self, ConfigError> {
        if associativity == 0 {
            return Err(ConfigError::ZeroAssociativity);
        }
        if block_size == 0 {
            return Err(ConfigError::ZeroBlockSize);
        }
        let set_bytes = block_size * associativity;
        if cache_size == 0 || cache_size % set_bytes != 0 {
            return Err(ConfigError::UnevenGeometry {
                cache_size,
                associativity,
                block_size,
            });
        }
        Ok(Self {
            cache_size,
            associativity,
            block_size,
            num_sets: cache_size / set_bytes,
            replacement,
            write_policy,
        })
    }

    pub fn cache_size(&self) -> usize {
        self.cache_size
    }
    pub fn associativity(&self) -> usize {
        self.associativity
    }
    pub fn block_size(&self) -> usize {
        self.block_size
    }
    pub fn num_sets(&self) -> usize {
        self.num_sets
    }
    pub fn replacement(&self) -> ReplacementPolicy {
        self.replacement
    }
    pub fn write_policy(&self) -> WritePolicy {
        self.write_policy
    }

    /// Splits a byte address into the set it maps to and the tag stored there.
    ///
    /// The whole block number serves as the tag; truncating division selects
    /// the containing block, so unaligned byte addresses are fine.
    pub fn placement(&self, addr: Addr) -> Placement {
        let block_number = addr.inner() / self.block_size as u64;
        Placement {
            set_index: (block_number % self.num_sets as u64) as usize,
            tag: block_number,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub set_index: usize,
    pub tag: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lru_wt(cache_size: usize, associativity: usize, block_size: usize) -> Result<CacheConfig, ConfigError> {
        CacheConfig::new(
            cache_size,
            associativity,
            block_size,
            ReplacementPolicy::Lru,
            WritePolicy::WriteThrough,
        )
    }

    #[test]
    fn test_derived_set_count() {
        let cfg = lru_wt(32768, 4, 64).unwrap();
        assert_eq!(cfg.num_sets(), 128);
        let cfg = lru_wt(64, 1, 64).unwrap();
        assert_eq!(cfg.num_sets(), 1);
    }

    #[test]
    fn test_rejects_degenerate_geometry() {
        assert_eq!(lru_wt(32768, 0, 64), Err(ConfigError::ZeroAssociativity));
        assert_eq!(lru_wt(32768, 4, 0), Err(ConfigError::ZeroBlockSize));
        // smaller than one set
        assert!(matches!(
            lru_wt(128, 4, 64),
            Err(ConfigError::UnevenGeometry { .. })
        ));
        // fractional set count
        assert!(matches!(
            lru_wt(1000, 4, 64),
            Err(ConfigError::UnevenGeometry { .. })
        ));
        assert!(matches!(
            lru_wt(0, 4, 64),
            Err(ConfigError::UnevenGeometry { .. })
        ));
    }

    #[test]
    fn test_placement() {
        let cfg = lru_wt(8192, 2, 64).unwrap();
        assert_eq!(cfg.num_sets(), 64);
        // block 0, unaligned byte within it
        let p = cfg.placement(Addr::new(17));
        assert_eq!(p, Placement { set_index: 0, tag: 0 });
        // one block past the last set wraps back to set 0
        let p = cfg.placement(Addr::new(64 * 64));
        assert_eq!(p, Placement { set_index: 0, tag: 64 });
        let p = cfg.placement(Addr::new(65 * 64 + 3));
        assert_eq!(p, Placement { set_index: 1, tag: 65 });
    }
}
