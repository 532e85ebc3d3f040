use super::mshr::MshrTable;
use super::set::CacheSet;
use crate::address::{Addr, Geometry, SectorMask};
use crate::request::CoreId;

pub type LevelId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelKind {
    L1,
    L2,
    L3,
}

/// Per-level event counters; part of the context object described in §9
/// (moved off process-wide statics so simulations can run independently
/// of one another).
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct LevelStats {
    pub accesses: u64,
    pub reads: u64,
    pub writes: u64,
    pub prefetches: u64,
    pub hits: u64,
    pub sector_hits: u64,
    pub mshr_sector_hits: u64,
    pub block_misses: u64,
    pub sector_misses: u64,
    pub mshr_unavailable: u64,
    pub set_cannot_evict: u64,
    pub evictions: u64,
    pub fetched_used_sectors: u64,
    pub fetched_unused_sectors: u64,
    pub notfetched_unused_sectors: u64,
}

/// One level of the hierarchy. Cross-level wiring (`higher`/`lower`) is
/// expressed as index lists into the [`crate::system::CacheSystem`]
/// arena rather than pointers, per the design notes: this sidesteps the
/// cyclic higher/lower reference graph entirely.
pub struct CacheLevel {
    pub name: String,
    pub kind: LevelKind,
    pub core_id: Option<CoreId>,

    pub geometry: Geometry,
    pub sets: Vec<CacheSet>,
    pub index_bits: u32,

    pub mshr: MshrTable,
    pub retry_list: Vec<crate::request::Request>,

    pub higher: Vec<LevelId>,
    pub lower: Option<LevelId>,

    pub latency: usize,
    pub sectoring_enabled: bool,

    pub stats: LevelStats,
}

impl CacheLevel {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        kind: LevelKind,
        core_id: Option<CoreId>,
        geometry: Geometry,
        num_sets: usize,
        ways: usize,
        mshr_entries: usize,
        latency: usize,
        sectoring_enabled: bool,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            core_id,
            geometry,
            sets: (0..num_sets).map(|_| CacheSet::new(ways)).collect(),
            index_bits: num_sets.trailing_zeros(),
            mshr: MshrTable::new(mshr_entries),
            retry_list: Vec::new(),
            higher: Vec::new(),
            lower: None,
            latency,
            sectoring_enabled,
            stats: LevelStats::default(),
        }
    }

    pub fn is_first_level(&self) -> bool {
        matches!(self.kind, LevelKind::L1)
    }

    pub fn is_last_level(&self) -> bool {
        self.lower.is_none()
    }

    fn offset_bits(&self) -> u32 {
        self.geometry.offset_bits()
    }

    pub fn set_index(&self, addr: Addr) -> usize {
        ((addr >> self.offset_bits()) as usize) & (self.sets.len() - 1)
    }

    /// Per-set tag: unique within a set, not across the whole cache.
    pub fn tag_of(&self, addr: Addr) -> Addr {
        addr >> (self.offset_bits() + self.index_bits)
    }

    /// The identity an MSHR tracks: unique across the whole cache (tag
    /// and index together, offset stripped). Spec §3: "index-relative
    /// block identity".
    pub fn block_num_of(&self, addr: Addr) -> Addr {
        addr >> self.offset_bits()
    }

    pub fn set(&self, addr: Addr) -> &CacheSet {
        &self.sets[self.set_index(addr)]
    }

    pub fn set_mut(&mut self, addr: Addr) -> &mut CacheSet {
        let idx = self.set_index(addr);
        &mut self.sets[idx]
    }

    pub fn check_invariants(&self) -> bool {
        self.sets.iter().all(CacheSet::check_invariants)
    }

    /// All-sectors mask, or `0` for an unsectored level (§4.2 step 1).
    pub fn demand_mask(&self, all: SectorMask) -> SectorMask {
        if self.sectoring_enabled {
            all
        } else {
            0
        }
    }
}
