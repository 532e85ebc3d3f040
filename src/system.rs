//! [`CacheSystem`]: the shared clock, the hit/wait lists, and the
//! algorithms that walk the [`CacheLevel`] arena (§4.2-§4.3). Caches are
//! addressed by [`LevelId`] rather than by reference, per the design
//! notes: the higher/lower relationship between levels is a cyclic
//! graph in the original source, modeled here as two index lists owned
//! by this arena instead of raw cross-pointers.

use std::collections::HashMap;

use crate::address::{Addr, SectorMask};
use crate::cache::level::{CacheLevel, LevelId};
use crate::config::{Config, DramFlavor};
use crate::dram::DramInterface;
use crate::predictor::SpatialPredictor;
use crate::request::{AccessKind, CoreId, Request};
use crate::window::InstructionWindow;

pub struct CacheSystem<D: DramInterface> {
    pub levels: Vec<CacheLevel>,
    pub predictors: HashMap<CoreId, SpatialPredictor>,
    pub windows: HashMap<CoreId, InstructionWindow>,
    pub dram: D,
    pub clk: u64,
    pub wait_list: Vec<(u64, Request)>,
    pub hit_list: Vec<(u64, Request)>,
    dram_flavor: DramFlavor,
    sector_size: usize,
}

impl<D: DramInterface> CacheSystem<D> {
    pub fn new(levels: Vec<CacheLevel>, dram: D, config: &Config) -> Self {
        Self {
            levels,
            predictors: HashMap::new(),
            windows: HashMap::new(),
            dram,
            clk: 0,
            wait_list: Vec::new(),
            hit_list: Vec::new(),
            dram_flavor: config.dram_flavor,
            sector_size: config.sector_size,
        }
    }

    pub fn set_predictor(&mut self, core_id: CoreId, predictor: SpatialPredictor) {
        self.predictors.insert(core_id, predictor);
    }

    pub fn set_window(&mut self, core_id: CoreId, window: InstructionWindow) {
        self.windows.insert(core_id, window);
    }

    fn dump_and_abort(&self, level: LevelId, addr: Addr, reason: &str) -> ! {
        let lvl = &self.levels[level];
        let tag = lvl.tag_of(addr);
        log::error!(
            "invariant violation at {} (addr=0x{addr:x}, tag=0x{tag:x}): {reason}",
            lvl.name
        );
        log::error!("  mshr table ({} entries):", lvl.mshr.len());
        for e in lvl.mshr.entries_for(lvl.block_num_of(addr)) {
            log::error!("    {e:?}");
        }
        if let Some(block) = lvl.set(addr).block(tag) {
            log::error!("  block: {block:?}");
        }
        for &hi in &lvl.higher {
            if let Some(block) = self.levels[hi].set(addr).block(self.levels[hi].tag_of(addr)) {
                log::error!("  higher level {}: {block:?}", self.levels[hi].name);
            }
        }
        panic!("core invariant violation in {}: {reason}", lvl.name);
    }

    // ---- sector bit derivation (§4.2 step 1) ------------------------------

    fn level_demand_sectors(&self, level: LevelId, req: &Request) -> SectorMask {
        let lvl = &self.levels[level];
        if !lvl.sectoring_enabled {
            return 0;
        }
        if matches!(self.dram_flavor, DramFlavor::PartialActivation) && req.kind == AccessKind::Write {
            return lvl.geometry.all_sectors();
        }
        req.sector_bits[level]
    }

    fn predict_if_l1(&mut self, level: LevelId, req: &Request) -> SectorMask {
        let lvl = &self.levels[level];
        if !lvl.is_first_level() {
            return 0;
        }
        let Some(core_id) = lvl.core_id else { return 0 };
        let Some(predictor) = self.predictors.get(&core_id) else {
            return 0;
        };
        predictor.predict(req.inst_addr, req.addr)
    }

    // ---- send (§4.2) -------------------------------------------------------

    /// Entry point for a new access at `level`. `false` means the caller
    /// must retry later (MSHR table full or the set has nothing
    /// evictable).
    pub fn send(&mut self, level: LevelId, req: Request) -> bool {
        let demand = self.level_demand_sectors(level, &req);
        lvl_stats_bump_access(&mut self.levels[level], req.kind);

        let tag = self.levels[level].tag_of(req.addr);
        let block_num = self.levels[level].block_num_of(req.addr);
        let is_valid = self.levels[level].set(req.addr).is_valid(tag);

        if is_valid {
            self.send_to_valid_block(level, req, tag, block_num, demand)
        } else {
            self.send_to_missing_block(level, req, tag, block_num, demand)
        }
    }

    fn send_to_valid_block(
        &mut self,
        level: LevelId,
        mut req: Request,
        tag: Addr,
        block_num: Addr,
        demand: SectorMask,
    ) -> bool {
        let sectors_valid = self.levels[level].set(req.addr).are_sectors_valid(tag, demand);
        if sectors_valid {
            if req.kind == AccessKind::Prefetch {
                self.levels[level].stats.hits += 1;
                return true;
            }
            let actual = req.actual_access_within(demand);
            self.levels[level].set_mut(req.addr).access(tag, actual, req.kind.is_write());
            self.levels[level].stats.hits += 1;
            self.complete_as_hit(level, req);
            return true;
        }

        // Sector miss on an already-valid block.
        if req.kind == AccessKind::Write {
            let actual = req.actual_access;
            self.levels[level].set_mut(req.addr).insert_sectors(tag, actual);
            self.levels[level].set_mut(req.addr).access(tag, actual, true);
            self.levels[level].stats.sector_hits += 1;
            self.complete_as_hit(level, req);
            return true;
        }

        debug_assert!(
            self.levels[level].sectoring_enabled,
            "sector miss on a valid block with sectoring disabled at this level"
        );
        self.resolve_via_mshr_or_allocate(level, &mut req, tag, block_num, demand, true)
    }

    fn send_to_missing_block(
        &mut self,
        level: LevelId,
        mut req: Request,
        tag: Addr,
        block_num: Addr,
        demand: SectorMask,
    ) -> bool {
        self.resolve_via_mshr_or_allocate(level, &mut req, tag, block_num, demand, false)
    }

    /// Shared tail of `send` for both the "block absent" and "block
    /// valid but sectors missing" cases: scan MSHRs for coverage (§4.2
    /// step 4), and if nothing covers it, allocate (§4.2 step 5).
    fn resolve_via_mshr_or_allocate(
        &mut self,
        level: LevelId,
        req: &mut Request,
        tag: Addr,
        block_num: Addr,
        demand: SectorMask,
        block_already_valid: bool,
    ) -> bool {
        let union_outstanding = self.levels[level].mshr.union_outstanding(block_num);
        let any_mshr_match = self.levels[level].mshr.any_match(block_num);
        let actual = req.actual_access;

        // Record this request's pledge against every MSHR naming this block,
        // regardless of whether it turns out fully covered (spec §3: waiters
        // "pledge" sectors they will use/dirty, applied at fill time).
        for e in self.levels[level].mshr.entries_for_mut(block_num) {
            e.dirty |= req.kind == AccessKind::Write;
            if req.kind == AccessKind::Write {
                e.will_be_dirty_sectors |= actual;
            }
            e.will_be_used_sectors |= actual;
        }

        if any_mshr_match && (demand & !union_outstanding) == 0 && demand != 0 {
            self.levels[level].stats.mshr_sector_hits += 1;
            if req.kind == AccessKind::Write {
                return true;
            }
            self.complete_as_hit(level, req.clone());
            return true;
        }

        let remaining = demand & !union_outstanding;

        if any_mshr_match && req.kind == AccessKind::Read {
            let filtered = self.levels[level].set(req.addr).find_missing_sectors(tag, remaining);
            if filtered == 0 {
                self.levels[level].stats.mshr_sector_hits += 1;
                self.complete_as_hit(level, req.clone());
                return true;
            }
            if self.levels[level].mshr.is_full() {
                self.levels[level].stats.mshr_unavailable += 1;
                return false;
            }
            let prediction = self.predict_if_l1(level, req);
            let ask = filtered | prediction;
            req.sector_bits[level + 1] = ask;
            self.levels[level].mshr.push(crate::cache::mshr::MshrEntry {
                tag: block_num,
                sector_bits: ask,
                dirty: false,
                will_be_used_sectors: 0,
                will_be_dirty_sectors: 0,
            });
            self.levels[level].stats.sector_misses += 1;
            return self.forward_or_queue(level, req.clone());
        }

        if any_mshr_match && req.kind == AccessKind::Write {
            // A write missed every MSHR's coverage but another MSHR is
            // already bringing this block in: install the sectors this
            // write touches locally and mark the covering MSHR dirty;
            // the fill still completes the rest.
            self.levels[level].set_mut(req.addr).insert_sectors(tag, actual);
            self.levels[level].set_mut(req.addr).access(tag, actual, true);
            for e in self.levels[level].mshr.entries_for_mut(block_num) {
                e.dirty = true;
            }
            self.levels[level].stats.mshr_sector_hits += 1;
            return true;
        }

        // No MSHR helps: allocate a new block (if one isn't already
        // present+busy) and a new MSHR entry.
        if !self.levels[level].set(req.addr).is_busy(tag) {
            if !block_already_valid {
                let victim_tag = self.levels[level].set(req.addr).find_victim();
                let victim_valid = self.levels[level].set(req.addr).is_valid(victim_tag);
                let victim_busy = self.levels[level].set(req.addr).is_busy(victim_tag);

                if !victim_valid && !victim_busy {
                    if self.levels[level].mshr.is_full() {
                        self.levels[level].stats.mshr_unavailable += 1;
                        return false;
                    }
                    self.levels[level].set_mut(req.addr).insert(victim_tag, tag, req.inst_addr, 0);
                    self.levels[level].set_mut(req.addr).make_busy(tag);
                } else {
                    let victim_addr = self.victim_addr(level, req.addr, victim_tag);
                    if self.evictable(level, victim_addr) && !self.levels[level].set(req.addr).is_busy(victim_tag) {
                        if self.levels[level].mshr.is_full() {
                            self.levels[level].stats.mshr_unavailable += 1;
                            return false;
                        }
                        self.evict(level, victim_addr);
                        self.levels[level].set_mut(req.addr).insert(victim_tag, tag, req.inst_addr, 0);
                        self.levels[level].set_mut(req.addr).make_busy(tag);
                    } else {
                        self.levels[level].stats.set_cannot_evict += 1;
                        return false;
                    }
                }
            } else if req.kind == AccessKind::Prefetch {
                return false;
            } else {
                self.dump_and_abort(level, req.addr, "block busy but no MSHR names it");
            }
        } else if req.kind == AccessKind::Prefetch {
            return false;
        }

        if self.levels[level].mshr.is_full() {
            self.levels[level].stats.mshr_unavailable += 1;
            return false;
        }

        let dirty = req.kind == AccessKind::Write;
        let prediction = self.predict_if_l1(level, req);
        let remaining_with_prediction = remaining | prediction;
        let will_be_dirty = if dirty { remaining_with_prediction & actual } else { 0 };

        self.levels[level].mshr.push(crate::cache::mshr::MshrEntry {
            tag: block_num,
            sector_bits: remaining_with_prediction,
            dirty,
            will_be_used_sectors: 0,
            will_be_dirty_sectors: will_be_dirty,
        });

        let missing = self.levels[level].set(req.addr).find_missing_sectors(tag, remaining_with_prediction);
        req.sector_bits[level + 1] = missing;

        match req.kind {
            AccessKind::Write => self.levels[level].stats.block_misses += 1,
            AccessKind::Read => self.levels[level].stats.block_misses += 1,
            AccessKind::Prefetch => {}
            AccessKind::Refresh => {}
        }

        self.forward_or_queue(level, req.clone())
    }

    fn victim_addr(&self, level: LevelId, addr: Addr, victim_tag: Addr) -> Addr {
        let lvl = &self.levels[level];
        let set_idx = lvl.set_index(addr) as Addr;
        (victim_tag << (lvl.geometry.offset_bits() + lvl.index_bits)) | (set_idx << lvl.geometry.offset_bits())
    }

    /// Forwards a miss to the level below (or queues it for DRAM
    /// dispatch if this is the last level). Per §4.2 step 5, whatever
    /// demand caused the miss is translated to a plain `READ` once it
    /// leaves this level — `PREFETCH` is the only kind preserved — since
    /// a write-miss only needs the block read up from below; the dirty
    /// write-back this store produces is emitted later, on eviction
    /// (§4.2.2 step 5), not here.
    fn forward_or_queue(&mut self, level: LevelId, mut req: Request) -> bool {
        if req.kind != AccessKind::Prefetch {
            req.kind = AccessKind::Read;
        }
        if let Some(lower) = self.levels[level].lower {
            let mut forwarded = req;
            forwarded.cache_hit = false;
            if !self.send(lower, forwarded.clone()) {
                self.levels[level].retry_list.push(forwarded);
            }
        } else {
            let ready = self.clk + self.levels[level].latency as u64;
            self.wait_list.push((ready, req));
        }
        true
    }

    fn complete_as_hit(&mut self, level: LevelId, mut req: Request) {
        req.cache_hit = true;
        req.hit_level = level;
        let ready = self.clk + self.levels[level].latency as u64;
        self.hit_list.push((ready, req));
    }

    // ---- callback (§4.2.1) --------------------------------------------------

    /// Fills `level` (and recursively every level above it) from a
    /// completion arriving from below. Recurses into higher levels
    /// first so L1 observes the fill before L2 clears its own MSHR.
    pub fn callback(&mut self, level: LevelId, mut req: Request) {
        if req.kind == AccessKind::Prefetch && level > 0 {
            req.sector_bits[level - 1] = req.sector_bits[level];
        }

        for hi in self.levels[level].higher.clone() {
            self.callback(hi, req.clone());
        }

        if req.cache_hit && req.hit_level <= level {
            return;
        }

        let tag = self.levels[level].tag_of(req.addr);
        let block_num = self.levels[level].block_num_of(req.addr);
        let arrived = req.sector_bits[level + 1];

        // A fill landing at L1 is exactly the event the retirement window
        // waits on (§4.5): wake every in-flight slot on this block for the
        // sectors that just arrived, independent of whether this level's
        // own MSHR has fully drained yet (a block can fill in several
        // partial waves, each one potentially satisfying a different
        // waiter). Hits are already woken from `fire_hit` via `hit_list`.
        if self.levels[level].is_first_level() && arrived != 0 {
            if let Some(window) = self.windows.get_mut(&req.core_id) {
                window.set_ready(req.addr, arrived);
            }
        }

        if !self.levels[level].mshr.any_match(block_num) {
            return;
        }

        let pledges: Vec<_> = self.levels[level]
            .mshr
            .entries_for(block_num)
            .map(|e| (e.sector_bits, e.dirty, e.will_be_used_sectors, e.will_be_dirty_sectors))
            .collect();

        let all_complete = self.levels[level].mshr.complete_fill(block_num, arrived);

        if all_complete {
            if !self.levels[level].set(req.addr).is_busy(tag) {
                self.dump_and_abort(level, req.addr, "MSHR completed fill on an idle block");
            }
            self.levels[level].set_mut(req.addr).make_idle(tag);
            self.levels[level].set_mut(req.addr).validate(tag);

            let mut newly_valid = arrived;
            let mut used = 0;
            let mut dirty_used = 0;
            let mut any_dirty = false;
            for (_, dirty, will_used, will_dirty) in &pledges {
                newly_valid |= will_used;
                used |= (req.actual_access_within(arrived)) | will_used;
                if *dirty {
                    any_dirty = true;
                    dirty_used |= will_dirty;
                }
            }

            self.levels[level].set_mut(req.addr).insert_sectors(tag, newly_valid);
            self.levels[level].set_mut(req.addr).access(tag, used, false);
            if any_dirty {
                self.levels[level].set_mut(req.addr).make_dirty(tag);
                self.levels[level].set_mut(req.addr).access(tag, dirty_used, true);
            }
        }
    }

    // ---- eviction (§4.2.2) ---------------------------------------------------

    pub fn evictable(&self, level: LevelId, addr: Addr) -> bool {
        let higher_ok = self.levels[level].higher.iter().all(|&hi| self.evictable(hi, addr));
        let tag = self.levels[level].tag_of(addr);
        higher_ok && self.levels[level].set(addr).can_evict(tag)
    }

    fn used_sectors(&self, level: LevelId, addr: Addr) -> SectorMask {
        let from_higher = self.levels[level]
            .higher
            .iter()
            .fold(0, |acc, &hi| acc | self.used_sectors(hi, addr));
        let tag = self.levels[level].tag_of(addr);
        self.levels[level].set(addr).sector_used(tag) | from_higher
    }

    fn dirty_sectors(&self, level: LevelId, addr: Addr) -> SectorMask {
        let from_higher = self.levels[level]
            .higher
            .iter()
            .fold(0, |acc, &hi| acc | self.dirty_sectors(hi, addr));
        let tag = self.levels[level].tag_of(addr);
        self.levels[level].set(addr).sector_dirty(tag) | from_higher
    }

    /// Invalidates `addr` at every higher level first, trains the L1
    /// predictor on the way back up, reflects state into the level
    /// below, then clears this level's own copy. Returns whether any
    /// holder (including this level) was dirty.
    fn evict_block(&mut self, level: LevelId, addr: Addr) -> bool {
        let mut dirty = false;
        for hi in self.levels[level].higher.clone() {
            dirty |= self.evict_block(hi, addr);
        }

        let tag = self.levels[level].tag_of(addr);
        if !self.levels[level].set(addr).is_valid(tag) {
            return dirty;
        }

        let used = self.used_sectors(level, addr);

        if self.levels[level].is_first_level() {
            if let Some(core_id) = self.levels[level].core_id {
                let inst_addr = self.levels[level].set(addr).inst_addr(tag);
                if let Some(p) = self.predictors.get_mut(&core_id) {
                    p.update(inst_addr, addr, used);
                }
            }
        }

        if !self.levels[level].set(addr).can_evict(tag) {
            log::warn!("attempted to evict a non-evictable block at {}", self.levels[level].name);
            return dirty;
        }

        let sector_valid = self.levels[level].set(addr).sector_valid(tag);
        self.levels[level].stats.fetched_used_sectors += (sector_valid & used).count_ones() as u64;
        self.levels[level].stats.fetched_unused_sectors += (sector_valid & !used).count_ones() as u64;
        let all_mask = self.levels[level].geometry.all_sectors();
        self.levels[level].stats.notfetched_unused_sectors += (!sector_valid & all_mask).count_ones() as u64;

        let is_dirty = self.levels[level].set(addr).is_dirty(tag);
        let sector_dirty = self.levels[level].set(addr).sector_dirty(tag);

        if let Some(lower) = self.levels[level].lower {
            self.update(lower, addr, is_dirty || dirty, sector_valid, used, sector_dirty);
        }

        dirty |= self.levels[level].set_mut(addr).evict(tag);
        dirty
    }

    /// Top-level eviction entry: evicts `addr` from `level` and every
    /// level above it, writing back to DRAM if this is the last level
    /// and the block was dirty.
    pub fn evict(&mut self, level: LevelId, addr: Addr) {
        self.levels[level].stats.evictions += 1;
        let dirty_sectors_before = self.dirty_sectors(level, addr);
        let dirty = self.evict_block(level, addr);

        if self.levels[level].is_last_level() && dirty {
            debug_assert!(
                dirty_sectors_before != 0 || !self.levels[level].sectoring_enabled,
                "writing back a dirty block with no dirty sectors"
            );
            let write_req = Request::writeback(addr, dirty_sectors_before);
            let ready = self.clk + self.levels[level].latency as u64;
            self.wait_list.push((ready, write_req));
        }
    }

    /// Reflection from a higher level's eviction (§4.2.3): absorbs the
    /// sectors/usage/dirty state into this level's copy, which must
    /// already be present (valid or busy).
    pub fn update(&mut self, level: LevelId, addr: Addr, dirty: bool, sector_bits: SectorMask, used: SectorMask, dirty_sectors: SectorMask) {
        let tag = self.levels[level].tag_of(addr);
        let present = self.levels[level].set(addr).is_valid(tag) || self.levels[level].set(addr).is_busy(tag);
        if !present {
            self.dump_and_abort(level, addr, "update() targets a non-existent block");
        }
        self.levels[level].set_mut(addr).insert_sectors(tag, sector_bits);
        self.levels[level].set_mut(addr).access(tag, used, false);
        if dirty {
            self.levels[level].set_mut(addr).make_dirty(tag);
            self.levels[level].set_mut(addr).access(tag, dirty_sectors, true);
        }
    }

    // ---- tick (§4.2.4, §4.3) --------------------------------------------------

    /// Advances the clock, drains ready hit/wait entries, retries
    /// deferred forwards, and advances the DRAM model.
    pub fn tick(&mut self) {
        self.clk += 1;

        for level in 0..self.levels.len() {
            if self.levels[level].is_last_level() {
                continue;
            }
            let pending = std::mem::take(&mut self.levels[level].retry_list);
            let mut still_pending = Vec::new();
            for req in pending {
                let lower = self.levels[level].lower.unwrap();
                if !self.send(lower, req.clone()) {
                    still_pending.push(req);
                }
            }
            self.levels[level].retry_list = still_pending;
        }

        let clk = self.clk;
        let pending_wait = std::mem::take(&mut self.wait_list);
        for (ready, req) in pending_wait {
            if ready > clk {
                self.wait_list.push((ready, req));
            } else if !self.dram.send_memory(&req) {
                self.wait_list.push((ready, req));
            }
        }

        let pending_hits = std::mem::take(&mut self.hit_list);
        for (ready, req) in pending_hits {
            if ready > clk {
                self.hit_list.push((ready, req));
            } else {
                self.fire_hit(req);
            }
        }

        let mut dram_completions = Vec::new();
        self.dram.tick(&mut |req| dram_completions.push(req));
        for req in dram_completions {
            if req.writeback {
                continue;
            }
            self.route_dram_completion(req);
        }
    }

    fn route_dram_completion(&mut self, req: Request) {
        // The LLC is whichever level has no lower neighbor; route the
        // callback through every last-level cache (ordinarily just L3).
        let last_levels: Vec<_> = (0..self.levels.len()).filter(|&l| self.levels[l].is_last_level()).collect();
        for l in last_levels {
            self.callback(l, req.clone());
        }
    }

    fn fire_hit(&mut self, req: Request) {
        if req.writeback {
            return;
        }
        if let Some(window) = self.windows.get_mut(&req.core_id) {
            window.set_ready(req.addr, req.actual_access);
        }
    }
}

fn lvl_stats_bump_access(lvl: &mut CacheLevel, kind: AccessKind) {
    lvl.stats.accesses += 1;
    match kind {
        AccessKind::Read => lvl.stats.reads += 1,
        AccessKind::Write => lvl.stats.writes += 1,
        AccessKind::Prefetch => lvl.stats.prefetches += 1,
        AccessKind::Refresh => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Geometry;
    use crate::cache::level::LevelKind;
    use crate::config::{CacheScope, DramFlavor, PredictorConfig};
    use crate::dram::FixedLatencyDram;

    /// Three-level hierarchy (one L1, shared L2, shared L3) over an 8 B
    /// sector / 64 B block geometry, small enough that MSHR/way exhaustion
    /// is easy to provoke in a handful of test accesses.
    fn build_system(mshrs: usize) -> CacheSystem<FixedLatencyDram> {
        let geom = Geometry::new(64, 8);
        let mut l1 = CacheLevel::new("L1", LevelKind::L1, Some(0), geom, 4, 2, mshrs, 4, true);
        let mut l2 = CacheLevel::new("L2", LevelKind::L2, None, geom, 4, 2, mshrs, 16, true);
        let l3 = CacheLevel::new("L3", LevelKind::L3, None, geom, 4, 2, mshrs, 47, true);

        l1.lower = Some(1);
        l2.higher.push(0);
        l2.lower = Some(2);

        let mut levels = vec![l1, l2, l3];
        levels[2].higher.push(1);

        let config = Config {
            sector_size: 8,
            dram_flavor: DramFlavor::Sectored,
            cache_scope: CacheScope::All,
            predictor: PredictorConfig::default(),
            dynamic_policy: false,
            prefetcher: false,
            num_cores: 1,
            l1: crate::config::CacheGeometry {
                size_bytes: 4 * 2 * 64,
                ways: 2,
                block_size: 64,
                mshr_entries: mshrs,
                latency: 4,
            },
            l2: crate::config::CacheGeometry {
                size_bytes: 4 * 2 * 64,
                ways: 2,
                block_size: 64,
                mshr_entries: mshrs,
                latency: 16,
            },
            l3: crate::config::CacheGeometry {
                size_bytes: 4 * 2 * 64,
                ways: 2,
                block_size: 64,
                mshr_entries: mshrs,
                latency: 47,
            },
            expected_limit_insts: None,
            warmup_insts: 0,
            early_exit: false,
        };

        let dram = FixedLatencyDram::new(100, 64);
        let mut system = CacheSystem::new(levels, dram, &config);
        system.set_window(0, InstructionWindow::new(32));
        system
    }

    fn run_until<D: DramInterface>(system: &mut CacheSystem<D>, cycles: u64) {
        for _ in 0..cycles {
            system.tick();
        }
    }

    /// Scenario A: a single-sector load misses everywhere and installs a
    /// block at L1 with only the demanded sector valid.
    #[test]
    fn scenario_a_single_sector_read_promoted_to_block_fill() {
        let mut system = build_system(16);
        system.set_window(0, InstructionWindow::new(32));
        system.windows.get_mut(&0).unwrap().push_memory(0x4000, 0b0000_0001);

        let req = Request::new(0x4000, AccessKind::Read, 8, 0x1000, 0, 0b0000_0001);
        assert!(system.send(0, req));

        run_until(&mut system, 200);

        let tag = system.levels[0].tag_of(0x4000);
        let block = system.levels[0].set(0x4000).block(tag).expect("block installed");
        assert!(block.valid);
        assert!(!block.busy);
        assert_eq!(block.sector_valid & 0b1, 0b1);
        assert_eq!(system.windows.get_mut(&0).unwrap().retire_ready(), 1);
    }

    /// Scenario B: a load to sector 0 followed by a store to sector 1 of
    /// the same block merge into the same outstanding MSHR; the MSHR picks
    /// up `dirty` and `will_be_dirty_sectors` from the store before the
    /// fill arrives, and the block comes back dirty with both sectors
    /// valid.
    #[test]
    fn scenario_b_write_merges_into_existing_mshr() {
        let mut system = build_system(16);
        let load = Request::new(0x4000, AccessKind::Read, 8, 0x1000, 0, 0b0000_0001);
        assert!(system.send(0, load));

        let store = Request::new(0x4008, AccessKind::Write, 8, 0x1004, 0, 0b0000_0010);
        assert!(system.send(0, store));

        let block_num = system.levels[0].block_num_of(0x4000);
        let mshr_dirty = system.levels[0].mshr.entries_for(block_num).any(|e| e.dirty);
        assert!(mshr_dirty, "the store's pledge should mark the covering MSHR dirty");

        run_until(&mut system, 200);

        let tag = system.levels[0].tag_of(0x4000);
        let block = system.levels[0].set(0x4000).block(tag).expect("block installed");
        assert!(block.valid);
        assert!(block.dirty);
        assert_eq!(block.sector_valid & 0b11, 0b11);
        assert_eq!(block.sector_dirty & 0b10, 0b10);
    }

    /// Scenario E: with only two L1 MSHRs, a third concurrent miss to a
    /// distinct block (in a distinct set, so the refusal is purely MSHR
    /// exhaustion rather than a way conflict) is refused until a fill
    /// frees one up.
    #[test]
    fn scenario_e_mshr_full_backpressure_then_retry_succeeds() {
        let mut system = build_system(2);
        assert!(system.send(0, Request::new(0x0000, AccessKind::Read, 8, 0x1000, 0, 0b1)));
        assert!(system.send(0, Request::new(0x0040, AccessKind::Read, 8, 0x1000, 0, 0b1)));
        assert!(!system.send(0, Request::new(0x0080, AccessKind::Read, 8, 0x1000, 0, 0b1)));
        assert_eq!(system.levels[0].stats.mshr_unavailable, 1);

        // Once the first two fills land and free their MSHRs, the retried
        // access to a fresh block succeeds.
        run_until(&mut system, 200);
        assert!(system.send(0, Request::new(0x0080, AccessKind::Read, 8, 0x1000, 0, 0b1)));
    }

    /// Scenario C (partial): after an L1 install, evicting from L3 must
    /// invalidate the L1 copy and route the used/dirty union down, with
    /// a dirty block producing an L3 write-back.
    #[test]
    fn scenario_c_inclusion_eviction_propagates_used_and_dirty() {
        let mut system = build_system(16);
        let store = Request::new(0x4000, AccessKind::Write, 8, 0x1000, 0, 0b0000_0001);
        assert!(system.send(0, store));
        run_until(&mut system, 200);

        let l1_tag = system.levels[0].tag_of(0x4000);
        assert!(system.levels[0].set(0x4000).is_valid(l1_tag));
        assert!(system.levels[0].set(0x4000).is_dirty(l1_tag));

        system.evict(2, 0x4000);

        assert!(!system.levels[0].set(0x4000).is_valid(l1_tag));
        let l3_tag = system.levels[2].tag_of(0x4000);
        assert!(!system.levels[2].set(0x4000).is_valid(l3_tag));

        let wrote_back = system.wait_list.iter().any(|(_, r)| r.writeback && r.kind == AccessKind::Write);
        assert!(wrote_back, "dirty eviction from the last level must write back to DRAM");
    }
}
