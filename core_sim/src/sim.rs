use serde::Serialize;

use crate::{
    cache::{CacheTable, TableAllocError},
    common::Access,
    config::{CacheConfig, Placement},
    policy::WritePolicy,
};

#[cfg(feature = "stat")]
use crate::stat::{AddStats, Stats};

/// The four counters of the run plus the ratio derived from them. These are
/// the entire observable output of a simulation.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub memory_reads: u64,
    pub memory_writes: u64,
}

impl CacheStats {
    pub fn accesses(&self) -> u64 {
        self.hits + self.misses
    }

    /// `misses / (hits + misses)`, or 0.0 before any access has been made.
    pub fn miss_ratio(&self) -> f64 {
        let total = self.accesses();
        if total == 0 {
            0.0
        } else {
            self.misses as f64 / total as f64
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessOutcome {
    Hit,
    Miss,
}

/// What a single eviction did, for callers that want to observe it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Eviction {
    pub tag: u64,
    /// the victim was dirty under write-back, so its line went to memory
    pub wrote_back: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessResult {
    pub outcome: AccessOutcome,
    pub set_index: usize,
    pub way: usize,
    pub evicted: Option<Eviction>,
}

impl AccessResult {
    /// Returns `true` if the outcome is [`Hit`].
    ///
    /// [`Hit`]: AccessOutcome::Hit
    #[must_use]
    pub fn is_hit(&self) -> bool {
        matches!(self.outcome, AccessOutcome::Hit)
    }
}

/// The cache state machine: owns the table, the counters and the FIFO install
/// counter, so a run is a plain value and any number of simulations can live
/// side by side.
pub struct CacheSim {
    config: CacheConfig,
    table: CacheTable,
    stats: CacheStats,
    install_seq: u64,
    #[cfg(feature = "stat")]
    stat_builder: stat::RunStatBuilder,
}

impl CacheSim {
    pub fn new(config: CacheConfig) -> Result<Self, TableAllocError> {
        let table = CacheTable::new(&config)?;
        log::debug!(
            "cache table allocated: {} sets x {} ways of {} B blocks ({}, {})",
            config.num_sets(),
            config.associativity(),
            config.block_size(),
            config.replacement(),
            config.write_policy(),
        );
        Ok(Self {
            config,
            table,
            stats: CacheStats::default(),
            install_seq: 0,
            #[cfg(feature = "stat")]
            stat_builder: stat::RunStatBuilder::new(),
        })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn table(&self) -> &CacheTable {
        &self.table
    }

    /// Runs one `(operation, address)` record through the state machine and
    /// reports what happened.
    pub fn access(&mut self, access: Access) -> AccessResult {
        let Placement { set_index, tag } = self.config.placement(access.addr);
        let replacement = self.config.replacement();
        let write_policy = self.config.write_policy();
        let set = self.table.set_mut(set_index);

        if let Some(way) = set.iter().position(|w| w.valid && w.tag == tag) {
            self.stats.hits += 1;
            replacement.on_hit(set, way);
            if access.kind.is_write() {
                match write_policy {
                    // the write goes to memory now, on every write access
                    WritePolicy::WriteThrough => self.stats.memory_writes += 1,
                    WritePolicy::WriteBack => set[way].dirty = true,
                }
            }
            return AccessResult {
                outcome: AccessOutcome::Hit,
                set_index,
                way,
                evicted: None,
            };
        }

        self.stats.misses += 1;
        // a miss always fetches the block, reads and writes alike
        self.stats.memory_reads += 1;

        let (way, evicted) = match set.iter().position(|w| !w.valid) {
            Some(way) => (way, None),
            None => {
                let way = replacement.select_victim(set);
                let wrote_back = write_policy.is_write_back() && set[way].dirty;
                if wrote_back {
                    self.stats.memory_writes += 1;
                }
                (
                    way,
                    Some(Eviction {
                        tag: set[way].tag,
                        wrote_back,
                    }),
                )
            }
        };

        set[way].tag = tag;
        set[way].valid = true;
        set[way].dirty = access.kind.is_write() && write_policy.is_write_back();
        if access.kind.is_write() && !write_policy.is_write_back() {
            // the miss-install write itself propagates under write-through
            self.stats.memory_writes += 1;
        }
        replacement.on_install(set, way, &mut self.install_seq);

        AccessResult {
            outcome: AccessOutcome::Miss,
            set_index,
            way,
            evicted,
        }
    }

    /// End-of-trace pass: under write-back, every still-resident dirty line is
    /// written to memory. Only the counters change; valid and dirty bits are
    /// left as they are.
    pub fn flush(&mut self) {
        if self.config.write_policy().is_write_back() {
            let dirty = self.table.ways().filter(|w| w.valid && w.dirty).count() as u64;
            self.stats.memory_writes += dirty;
            log::debug!("flush pass wrote back {dirty} dirty lines");
        }
        #[cfg(feature = "stat")]
        self.stat_builder.stop_timer();
    }
}

impl CacheSim {
    #[cfg(feature = "stat")]
    pub fn collect_stat(&self) -> Stats {
        let mut ss = Stats::default();
        self.add_stats(&mut ss);
        ss
    }
}

#[cfg(feature = "stat")]
impl AddStats for CacheSim {
    fn add_stats(&self, buf: &mut Stats) {
        buf.push(Box::new(self.stat_builder.finish(self.config, self.stats)));
    }
}

#[cfg(feature = "stat")]
mod stat {
    use crate::stat::*;

    use super::*;
    use std::{fmt, time};

    pub struct RunStatBuilder {
        begin: time::Instant,
        elapsed: Option<time::Duration>,
    }

    impl RunStatBuilder {
        pub fn new() -> Self {
            Self {
                begin: time::Instant::now(),
                elapsed: None,
            }
        }
        pub fn stop_timer(&mut self) {
            self.elapsed = Some(time::Instant::now() - self.begin)
        }
        pub fn finish(&self, config: CacheConfig, stats: CacheStats) -> RunStat {
            RunStat {
                config,
                stats,
                elapsed: self.elapsed.unwrap_or_default(),
            }
        }
    }

    impl Default for RunStatBuilder {
        fn default() -> Self {
            Self::new()
        }
    }

    pub struct RunStat {
        config: CacheConfig,
        stats: CacheStats,
        elapsed: time::Duration,
    }

    impl Stat for RunStat {
        fn view(&self, _: usize) -> Box<dyn StatView + '_> {
            Box::new(self)
        }
    }

    impl StatView for &'_ RunStat {
        fn header(&self) -> &'static str {
            "cache simulation stat"
        }
        fn width(&self) -> usize {
            44
        }
    }

    impl fmt::Display for &'_ RunStat {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            let geometry = format!(
                "{} sets x {} ways x {} B",
                self.config.num_sets(),
                self.config.associativity(),
                self.config.block_size()
            );
            writeln!(f, "  geometry: {geometry:>30}")?;
            let policies = format!("{}, {}", self.config.replacement(), self.config.write_policy());
            writeln!(f, "  policies: {policies:>30}")?;
            let accesses = format!("#{}", self.stats.accesses());
            writeln!(f, "  accesses total: {accesses:>24}")?;
            let hm = format!("{} / {}", self.stats.hits, self.stats.misses);
            writeln!(f, "  hits / misses: {hm:>25}")?;
            let ratio = format!("{:.6}", self.stats.miss_ratio());
            writeln!(f, "  miss ratio: {ratio:>28}")?;
            let reads = format!("#{}", self.stats.memory_reads);
            writeln!(f, "  memory reads: {reads:>26}")?;
            let writes = format!("#{}", self.stats.memory_writes);
            writeln!(f, "  memory writes: {writes:>25}")?;
            let ms = format!("{} ms", self.elapsed.as_millis());
            writeln!(f, "  elapsed total: {ms:>25}")
        }
    }
}
