use std::fmt;

use num_enum::TryFromPrimitive;
use serde::Serialize;

use crate::cache::Way;

/// Victim selection discipline, chosen once at configuration time.
///
/// The trace-file CLI encodes these as `0` and `1`; `TryFromPrimitive` turns
/// an out-of-range selector into a construction-time error instead of a
/// silent fallthrough.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, Serialize)]
#[repr(u8)]
pub enum ReplacementPolicy {
    Lru = 0,
    Fifo = 1,
}

impl fmt::Display for ReplacementPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplacementPolicy::Lru => f.write_str("LRU"),
            ReplacementPolicy::Fifo => f.write_str("FIFO"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, Serialize)]
#[repr(u8)]
pub enum WritePolicy {
    WriteThrough = 0,
    WriteBack = 1,
}

impl WritePolicy {
    /// Returns `true` if the write policy is [`WriteBack`].
    ///
    /// [`WriteBack`]: WritePolicy::WriteBack
    #[must_use]
    pub fn is_write_back(&self) -> bool {
        matches!(self, Self::WriteBack)
    }
}

impl fmt::Display for WritePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WritePolicy::WriteThrough => f.write_str("write-through"),
            WritePolicy::WriteBack => f.write_str("write-back"),
        }
    }
}

impl ReplacementPolicy {
    /// A resident way was touched by a hit.
    pub(crate) fn on_hit(self, set: &mut [Way], way: usize) {
        match self {
            ReplacementPolicy::Lru => promote(set, way),
            // FIFO order is unaffected by hits
            ReplacementPolicy::Fifo => {}
        }
    }

    /// A block was just installed into `way`.
    ///
    /// `install_seq` is the run-wide install counter; only FIFO consumes it,
    /// exactly once per install.
    pub(crate) fn on_install(self, set: &mut [Way], way: usize, install_seq: &mut u64) {
        match self {
            ReplacementPolicy::Lru => promote(set, way),
            ReplacementPolicy::Fifo => {
                set[way].installed_at = Some(*install_seq);
                *install_seq += 1;
            }
        }
    }

    /// Picks the way to evict from a fully valid set.
    ///
    /// Ties go to the lowest way index under both disciplines.
    pub(crate) fn select_victim(self, set: &[Way]) -> usize {
        match self {
            ReplacementPolicy::Lru => {
                let mut victim = 0;
                for (way, w) in set.iter().enumerate().skip(1) {
                    if w.recency > set[victim].recency {
                        victim = way;
                    }
                }
                victim
            }
            ReplacementPolicy::Fifo => {
                let mut victim = 0;
                for (way, w) in set.iter().enumerate().skip(1) {
                    // None sorts before Some, so a way that somehow never got
                    // stamped is treated as the oldest resident
                    if w.installed_at < set[victim].installed_at {
                        victim = way;
                    }
                }
                victim
            }
        }
    }
}

/// Moves `way` to recency 0 (most recently used), demoting every way that was
/// ahead of it by one. Keeps `recency` a permutation of `0..set.len()`.
fn promote(set: &mut [Way], way: usize) {
    let old = set[way].recency;
    for w in set.iter_mut() {
        if w.recency < old {
            w.recency += 1;
        }
    }
    set[way].recency = 0;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh_set(associativity: usize) -> Vec<Way> {
        (0..associativity).map(Way::empty).collect()
    }

    #[test]
    fn test_lru_promote_keeps_permutation() {
        let mut set = fresh_set(4);
        promote(&mut set, 2);
        let mut seen: Vec<_> = set.iter().map(|w| w.recency).collect();
        assert_eq!(seen, vec![1, 2, 0, 3]);
        promote(&mut set, 3);
        seen = set.iter().map(|w| w.recency).collect();
        assert_eq!(seen, vec![2, 3, 1, 0]);
    }

    #[test]
    fn test_lru_victim_is_max_recency() {
        let mut set = fresh_set(3);
        // touch way 0 last: recencies become [0, 2, 1]
        promote(&mut set, 2);
        promote(&mut set, 0);
        assert_eq!(ReplacementPolicy::Lru.select_victim(&set), 1);
    }

    #[test]
    fn test_lru_victim_tie_breaks_low_way() {
        let set = fresh_set(1);
        assert_eq!(ReplacementPolicy::Lru.select_victim(&set), 0);
    }

    #[test]
    fn test_fifo_hit_is_noop() {
        let mut set = fresh_set(2);
        let mut seq = 0;
        ReplacementPolicy::Fifo.on_install(&mut set, 0, &mut seq);
        ReplacementPolicy::Fifo.on_install(&mut set, 1, &mut seq);
        ReplacementPolicy::Fifo.on_hit(&mut set, 0);
        assert_eq!(set[0].installed_at, Some(0));
        assert_eq!(set[1].installed_at, Some(1));
        assert_eq!(seq, 2);
    }

    #[test]
    fn test_fifo_victim_is_oldest_install() {
        let mut set = fresh_set(2);
        let mut seq = 0;
        ReplacementPolicy::Fifo.on_install(&mut set, 1, &mut seq);
        ReplacementPolicy::Fifo.on_install(&mut set, 0, &mut seq);
        assert_eq!(ReplacementPolicy::Fifo.select_victim(&set), 1);
    }

    #[test]
    fn test_policy_selectors_from_cli_integers() {
        assert_eq!(ReplacementPolicy::try_from(0u8), Ok(ReplacementPolicy::Lru));
        assert_eq!(ReplacementPolicy::try_from(1u8), Ok(ReplacementPolicy::Fifo));
        assert!(ReplacementPolicy::try_from(2u8).is_err());
        assert_eq!(WritePolicy::try_from(0u8), Ok(WritePolicy::WriteThrough));
        assert_eq!(WritePolicy::try_from(1u8), Ok(WritePolicy::WriteBack));
        assert!(WritePolicy::try_from(3u8).is_err());
    }
}
