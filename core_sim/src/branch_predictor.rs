use std::collections::TryReserveError;

use serde::Serialize;
use thiserror::Error;

/// Widest usable PC index: keeps the pattern history table at 2^30 entries.
pub const MAX_PC_BITS: u32 = 30;

#[derive(Clone, Copy, PartialEq)]
enum SaturatingCounter {
    StronglyUntaken,
    WeaklyUntaken,
    WeaklyTaken,
    StronglyTaken,
}

impl SaturatingCounter {
    fn next(self) -> Self {
        match self {
            SaturatingCounter::StronglyUntaken => SaturatingCounter::WeaklyUntaken,
            SaturatingCounter::WeaklyUntaken => SaturatingCounter::WeaklyTaken,
            SaturatingCounter::WeaklyTaken => SaturatingCounter::StronglyTaken,
            SaturatingCounter::StronglyTaken => SaturatingCounter::StronglyTaken,
        }
    }

    fn prev(self) -> Self {
        match self {
            SaturatingCounter::StronglyUntaken => SaturatingCounter::StronglyUntaken,
            SaturatingCounter::WeaklyUntaken => SaturatingCounter::StronglyUntaken,
            SaturatingCounter::WeaklyTaken => SaturatingCounter::WeaklyUntaken,
            SaturatingCounter::StronglyTaken => SaturatingCounter::WeaklyTaken,
        }
    }

    fn predicts_taken(self) -> bool {
        self == SaturatingCounter::WeaklyTaken || self == SaturatingCounter::StronglyTaken
    }
}

#[derive(Error, Debug)]
pub enum PredictorError {
    #[error("pc index bits must be at most {MAX_PC_BITS}, got {0}")]
    PcBitsTooLarge(u32),
    #[error("history bits ({history_bits}) must not exceed pc index bits ({pc_bits})")]
    HistoryExceedsPcBits { pc_bits: u32, history_bits: u32 },
    #[error("failed to reserve pattern history table storage: {0}")]
    Alloc(#[from] TryReserveError),
}

/// A gshare branch predictor: a table of 2^`pc_bits` two-bit counters indexed
/// by the PC XORed with the global history register.
///
/// Independent of the cache engine; it consumes its own trace format.
pub struct GsharePredictor {
    pht: Vec<SaturatingCounter>,
    ghr: u32,
    pc_bits: u32,
    history_bits: u32,
}

impl GsharePredictor {
    pub fn new(pc_bits: u32, history_bits: u32) -> Result<Self, PredictorError> {
        if pc_bits > MAX_PC_BITS {
            return Err(PredictorError::PcBitsTooLarge(pc_bits));
        }
        if history_bits > pc_bits {
            return Err(PredictorError::HistoryExceedsPcBits {
                pc_bits,
                history_bits,
            });
        }
        let len = 1usize << pc_bits;
        let mut pht = Vec::new();
        pht.try_reserve_exact(len)?;
        pht.resize(len, SaturatingCounter::WeaklyTaken);
        Ok(Self {
            pht,
            ghr: 0,
            pc_bits,
            history_bits,
        })
    }

    pub fn pc_bits(&self) -> u32 {
        self.pc_bits
    }

    pub fn history_bits(&self) -> u32 {
        self.history_bits
    }

    /// PC bits `pc_bits+1 .. 2`, with the history register folded into the
    /// upper `history_bits` of the index.
    fn index(&self, pc: u64) -> usize {
        let pc_index = (pc >> 2) as u32 & ((1u32 << self.pc_bits) - 1);
        (pc_index ^ (self.ghr << (self.pc_bits - self.history_bits))) as usize
    }

    pub fn predict(&self, pc: u64) -> bool {
        self.pht[self.index(pc)].predicts_taken()
    }

    /// Trains the counter the branch indexed and shifts its outcome into the
    /// history register.
    pub fn update_state(&mut self, pc: u64, taken: bool) {
        let index = self.index(pc);
        self.pht[index] = if taken {
            self.pht[index].next()
        } else {
            self.pht[index].prev()
        };
        if self.history_bits > 0 {
            self.ghr = (self.ghr >> 1) | ((taken as u32) << (self.history_bits - 1));
        }
    }

    /// Predicts, then trains on the actual outcome. Returns whether the
    /// prediction was correct.
    pub fn observe(&mut self, pc: u64, taken: bool) -> bool {
        let correct = self.predict(pc) == taken;
        self.update_state(pc, taken);
        correct
    }
}

#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BranchStats {
    pub branches: u64,
    pub mispredictions: u64,
}

impl BranchStats {
    pub fn record(&mut self, correct: bool) {
        self.branches += 1;
        if !correct {
            self.mispredictions += 1;
        }
    }

    pub fn misprediction_rate(&self) -> f64 {
        if self.branches == 0 {
            0.0
        } else {
            self.mispredictions as f64 / self.branches as f64
        }
    }
}

/// One branch trace line: `<hexpc> <t|n>`. Lines that do not decode are
/// `None`; the predictor trace reader skips them rather than aborting.
pub fn parse_branch_record(line: &str) -> Option<(u64, bool)> {
    let mut tokens = line.split_whitespace();
    let pc = u64::from_str_radix(tokens.next()?, 16).ok()?;
    let outcome = tokens.next()?;
    Some((pc, outcome.starts_with('t')))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameter_validation() {
        assert!(matches!(
            GsharePredictor::new(31, 0),
            Err(PredictorError::PcBitsTooLarge(31))
        ));
        assert!(matches!(
            GsharePredictor::new(4, 5),
            Err(PredictorError::HistoryExceedsPcBits { .. })
        ));
        assert!(GsharePredictor::new(0, 0).is_ok());
        assert!(GsharePredictor::new(10, 10).is_ok());
    }

    #[test]
    fn test_fresh_predictor_is_weakly_taken() {
        let p = GsharePredictor::new(8, 4).unwrap();
        assert!(p.predict(0x4000_1000));
    }

    #[test]
    fn test_counters_saturate() {
        let mut p = GsharePredictor::new(4, 0).unwrap();
        for _ in 0..10 {
            p.update_state(0x40, false);
        }
        assert!(!p.predict(0x40));
        // one taken outcome is not enough to flip a saturated counter
        p.update_state(0x40, true);
        assert!(!p.predict(0x40));
        p.update_state(0x40, true);
        assert!(p.predict(0x40));
    }

    #[test]
    fn test_history_separates_same_pc() {
        let mut p = GsharePredictor::new(1, 1).unwrap();
        // with an all-zero history, drive index 0 to strongly untaken
        p.update_state(0, false);
        p.update_state(0, false);
        assert!(!p.predict(0));
        // a taken outcome flips the history bit, steering the same pc to the
        // other counter, which is still at its weakly-taken reset state
        p.update_state(0, true);
        assert!(p.predict(0));
    }

    #[test]
    fn test_observe_counts_against_actual_outcome() {
        let mut p = GsharePredictor::new(6, 2).unwrap();
        let mut stats = BranchStats::default();
        // weakly-taken start: first not-taken outcome is a misprediction
        stats.record(p.observe(0x80, false));
        stats.record(p.observe(0x80, false));
        assert_eq!(stats.branches, 2);
        assert_eq!(stats.mispredictions, 1);
    }

    #[test]
    fn test_misprediction_rate_of_empty_run_is_zero() {
        assert_eq!(BranchStats::default().misprediction_rate(), 0.0);
    }

    #[test]
    fn test_parse_branch_record() {
        assert_eq!(parse_branch_record("3fc4 t"), Some((0x3fc4, true)));
        assert_eq!(parse_branch_record("3fc4 n extra"), Some((0x3fc4, false)));
        assert_eq!(parse_branch_record("b7a2 taken"), Some((0xb7a2, true)));
        assert_eq!(parse_branch_record(""), None);
        assert_eq!(parse_branch_record("xyz t"), None);
        assert_eq!(parse_branch_record("3fc4"), None);
    }
}
