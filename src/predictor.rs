//! Per-L1 footprint predictor: learns which sectors of a block a future
//! access at the same (PC, block offset) is likely to touch. Queried
//! only on an L1 miss, trained only at L1 eviction — never augments an
//! already-allocated MSHR's sector bits (§9 Open Questions / redesign
//! flag: that would let MSHR bitmaps grow after allocation and break
//! P5).

use std::collections::HashMap;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::address::{Addr, SectorMask};
use crate::config::PredictorConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DefaultPolicy {
    AllSectors,
    NoPrediction,
}

#[derive(Debug, Clone)]
struct WayTable {
    tags: Vec<u64>,
    bitmaps: Vec<SectorMask>,
}

/// Learns `(PC, block-offset) -> predicted sector bitmap`. Queried and
/// trained only from L1 (§4.4).
pub struct SpatialPredictor {
    enabled: bool,
    sector_size: usize,
    ways: usize,
    pattern_table_size: usize,
    log_table_size: u32,
    untrained_policy: DefaultPolicy,

    /// `pattern_table_size == 0` selects the "infinite" mode: a plain
    /// map keyed by the full (PC, offset) mix, with no capacity limit.
    infinite: bool,
    infinite_table: HashMap<u64, SectorMask>,

    table: Vec<WayTable>,
    way_meta: Vec<usize>,
    rng: SmallRng,

    utilization_window: usize,
    rolling_util: Vec<u32>,
    rolling_util_idx: usize,
    rolling_average: f64,
}

impl SpatialPredictor {
    pub fn new(config: &PredictorConfig, sector_size: usize, seed: u64) -> Self {
        let infinite = config.enabled && config.pattern_table_size == 0;
        let pattern_table_size = if infinite { 0 } else { config.pattern_table_size };
        let ways = config.pattern_table_ways.max(1);
        let log_table_size = if pattern_table_size > 0 {
            pattern_table_size.trailing_zeros()
        } else {
            0
        };
        Self {
            enabled: config.enabled,
            sector_size: sector_size.max(1),
            ways,
            pattern_table_size,
            log_table_size,
            untrained_policy: if config.untrained_policy_no_prediction {
                DefaultPolicy::NoPrediction
            } else {
                DefaultPolicy::AllSectors
            },
            infinite,
            infinite_table: HashMap::new(),
            table: (0..ways).map(|_| WayTable {
                tags: vec![0; pattern_table_size],
                bitmaps: vec![0; pattern_table_size],
            }).collect(),
            way_meta: vec![0; pattern_table_size],
            rng: SmallRng::seed_from_u64(seed),
            utilization_window: config.utilization_window,
            rolling_util: vec![0; config.utilization_window],
            rolling_util_idx: 0,
            rolling_average: 0.0,
        }
    }

    fn all_sectors(&self) -> SectorMask {
        let s = (64 / self.sector_size).max(1);
        if s >= SectorMask::BITS as usize {
            SectorMask::MAX
        } else {
            (1u32 << s) - 1
        }
    }

    fn find_index(&self, inst_addr: Addr, load_addr: Addr) -> usize {
        let mixed = ((inst_addr >> 12) ^ inst_addr) ^ ((load_addr >> 3) & 0x7);
        (mixed as usize) & (self.pattern_table_size - 1)
    }

    fn find_tag(&self, inst_addr: Addr, load_addr: Addr) -> u64 {
        if self.infinite {
            return inst_addr ^ load_addr;
        }
        (((inst_addr >> 12) ^ inst_addr).wrapping_add((load_addr >> 3) & 0x7)) >> self.log_table_size
    }

    fn untrained_prediction(&self) -> SectorMask {
        if self.utilization_window > 0 && self.rolling_average >= 4.0 {
            return self.all_sectors();
        }
        match self.untrained_policy {
            DefaultPolicy::AllSectors => self.all_sectors(),
            DefaultPolicy::NoPrediction => 0,
        }
    }

    /// `predict(PC, addr) → sector_bitmap`. Returns the conservative
    /// default when the predictor is disabled or hasn't trained this
    /// entry yet.
    pub fn predict(&self, inst_addr: Addr, load_addr: Addr) -> SectorMask {
        if !self.enabled {
            return 0;
        }
        if self.infinite {
            return self
                .infinite_table
                .get(&self.find_tag(inst_addr, load_addr))
                .copied()
                .unwrap_or_else(|| self.untrained_prediction());
        }

        let index = self.find_index(inst_addr, load_addr);
        let tag = self.find_tag(inst_addr, load_addr);
        for way in &self.table {
            if way.tags[index] == tag && way.bitmaps[index] != 0 {
                return way.bitmaps[index];
            }
        }
        self.untrained_prediction()
    }

    /// Trains at L1-eviction time: records what was actually used.
    pub fn update(&mut self, inst_addr: Addr, load_addr: Addr, used_sectors: SectorMask) {
        if !self.enabled {
            return;
        }
        if self.utilization_window > 0 {
            self.update_rolling_average(used_sectors);
        }
        if self.infinite {
            self.infinite_table.insert(self.find_tag(inst_addr, load_addr), used_sectors);
            return;
        }

        let index = self.find_index(inst_addr, load_addr);
        let tag = self.find_tag(inst_addr, load_addr);

        let replacement_way = if self.ways > 1 {
            (self.way_meta[index] + self.rng.gen_range(0..self.ways - 1)) % self.ways
        } else {
            0
        };

        self.table[replacement_way].tags[index] = tag;
        self.table[replacement_way].bitmaps[index] = used_sectors;
        self.way_meta[index] = replacement_way;
    }

    /// Ring buffer of the last K updates' `popcount(used)` (§4.4
    /// "Utilization feedback"), maintained as an incremental average so
    /// `untrained_prediction` never rescans the window.
    fn update_rolling_average(&mut self, used_sectors: SectorMask) {
        let window = self.utilization_window as f64;
        let new_pop = used_sectors.count_ones();
        self.rolling_average -= self.rolling_util[self.rolling_util_idx] as f64 / window;
        self.rolling_average += new_pop as f64 / window;
        self.rolling_util[self.rolling_util_idx] = new_pop;
        self.rolling_util_idx = (self.rolling_util_idx + 1) % self.utilization_window;
        self.rolling_average = self.rolling_average.clamp(0.0, 8.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PredictorConfig;

    fn enabled_config(table_size: usize) -> PredictorConfig {
        PredictorConfig {
            enabled: true,
            pattern_table_size: table_size,
            pattern_table_ways: 4,
            utilization_window: 0,
            untrained_policy_no_prediction: true,
            lookahead: false,
            lookahead_size: 0,
        }
    }

    #[test]
    fn untrained_lookup_returns_zero_when_policy_says_no_prediction() {
        let sp = SpatialPredictor::new(&enabled_config(64), 8, 1);
        assert_eq!(sp.predict(0x1000, 0x4000), 0);
    }

    #[test]
    fn infinite_table_round_trips_a_prediction() {
        let mut cfg = enabled_config(0);
        cfg.untrained_policy_no_prediction = false;
        let mut sp = SpatialPredictor::new(&cfg, 8, 1);
        sp.update(0x2000, 0x8000, 0b0011);
        assert_eq!(sp.predict(0x2000, 0x8000), 0b0011);
    }

    #[test]
    fn predictor_learns_across_repeated_offset() {
        let mut sp = SpatialPredictor::new(&enabled_config(64), 8, 7);
        assert_eq!(sp.predict(0x2000, 0x8000), 0);
        sp.update(0x2000, 0x8000, 0b0011);
        assert_eq!(sp.predict(0x2000, 0x8000), 0b0011);
    }
}
