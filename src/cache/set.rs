use super::block::{Block, EMPTY_TAG};
use crate::address::{Addr, SectorMask};

/// One associative set: `ways` [`Block`]s plus pseudo-MRU replacement
/// state. Faithful to `ramulator::CacheSet` (sector-cache extension),
/// generalized from one-hot `u64` vectors to a `Vec<Block>` since Rust
/// gives us real per-way structs instead of the bit-trick vectors the
/// original leaned on.
#[derive(Debug, Clone)]
pub struct CacheSet {
    ways: Vec<Block>,
}

impl CacheSet {
    pub fn new(ways: usize) -> Self {
        Self {
            ways: vec![Block::default(); ways],
        }
    }

    pub fn ways(&self) -> usize {
        self.ways.len()
    }

    fn find_way(&self, tag: Addr) -> Option<usize> {
        self.ways.iter().position(|b| b.tag == tag)
    }

    pub fn is_valid(&self, tag: Addr) -> bool {
        self.find_way(tag).is_some_and(|i| self.ways[i].valid)
    }

    pub fn is_busy(&self, tag: Addr) -> bool {
        self.find_way(tag).is_some_and(|i| self.ways[i].busy)
    }

    pub fn is_dirty(&self, tag: Addr) -> bool {
        self.find_way(tag).is_some_and(|i| self.ways[i].dirty)
    }

    /// Pseudo-MRU victim: the lowest-index way whose MRU bit is clear.
    /// Never fails: [`Self::touch_mru`]'s wrap-on-saturation rule
    /// guarantees at least one way has a clear bit.
    pub fn find_victim(&self) -> Addr {
        self.ways
            .iter()
            .find(|w| !w.mru)
            .map(|w| w.tag)
            .expect("MRU bits should never be all set")
    }

    pub fn can_evict(&self, tag: Addr) -> bool {
        match self.find_way(tag) {
            None => true,
            Some(i) => !self.ways[i].busy,
        }
    }

    /// Clears valid/dirty/MRU/sector bitmaps for `tag`, returning whether
    /// it was dirty before the clear. No-op (returns `false`) if absent.
    pub fn evict(&mut self, tag: Addr) -> bool {
        let Some(i) = self.find_way(tag) else {
            return false;
        };
        let way = &mut self.ways[i];
        debug_assert!(!way.busy, "evicting a busy cache block");
        let was_dirty = way.dirty;
        way.valid = false;
        way.dirty = false;
        way.mru = false;
        way.sector_valid = 0;
        way.sector_used = 0;
        way.sector_dirty = 0;
        way.inst_addr = 0;
        was_dirty
    }

    fn touch_mru(&mut self, i: usize) {
        self.ways[i].mru = true;
        if self.ways.iter().all(|w| w.mru) {
            for (j, w) in self.ways.iter_mut().enumerate() {
                w.mru = j == i;
            }
        }
    }

    /// ORs `sectors` into `sector_used` (and `sector_dirty` on a write),
    /// then touches MRU. Asserts `sectors ⊆ sector_valid`.
    pub fn access(&mut self, tag: Addr, sectors: SectorMask, is_write: bool) {
        let i = self.find_way(tag).expect("accessing an invalid cache block");
        let way = &mut self.ways[i];
        debug_assert_eq!(
            sectors & !way.sector_valid,
            0,
            "accessing a sector that was never brought in"
        );
        way.sector_used |= sectors;
        if is_write {
            way.sector_dirty |= sectors;
            way.dirty = true;
        }
        debug_assert!(way.check_invariants());
        self.touch_mru(i);
    }

    /// Overwrites the way holding `old_tag` with `new_tag`'s identity,
    /// resetting sector state to `sectors` (used/dirty cleared). `old_tag`
    /// is [`EMPTY_TAG`] when installing into a never-filled way.
    pub fn insert(&mut self, old_tag: Addr, new_tag: Addr, inst_addr: Addr, sectors: SectorMask) {
        let i = self.find_way(old_tag).expect("insert on a tag this set does not hold");
        let way = &mut self.ways[i];
        way.tag = new_tag;
        way.sector_valid = sectors;
        way.sector_used = 0;
        way.sector_dirty = 0;
        way.dirty = false;
        way.inst_addr = inst_addr;
        self.touch_mru(i);
    }

    pub fn insert_sectors(&mut self, tag: Addr, bits: SectorMask) {
        let i = self.find_way(tag).expect("insert_sectors on unknown tag");
        self.ways[i].sector_valid |= bits;
    }

    pub fn are_sectors_valid(&self, tag: Addr, bits: SectorMask) -> bool {
        let i = self.find_way(tag).expect("are_sectors_valid on unknown tag");
        (bits & !self.ways[i].sector_valid) == 0
    }

    /// `bits \ sector_valid`. Per §9 Open Questions, an empty `bits`
    /// short-circuits to `0` rather than looking the tag up at all.
    pub fn find_missing_sectors(&self, tag: Addr, bits: SectorMask) -> SectorMask {
        if bits == 0 {
            return 0;
        }
        let i = self.find_way(tag).expect("find_missing_sectors on unknown tag");
        bits & !self.ways[i].sector_valid
    }

    pub fn make_busy(&mut self, tag: Addr) {
        let i = self.find_way(tag).expect("make_busy on unknown tag");
        self.ways[i].busy = true;
    }

    pub fn make_idle(&mut self, tag: Addr) {
        let i = self.find_way(tag).expect("make_idle on unknown tag");
        self.ways[i].busy = false;
    }

    pub fn make_dirty(&mut self, tag: Addr) {
        let i = self.find_way(tag).expect("make_dirty on unknown tag");
        self.ways[i].dirty = true;
    }

    pub fn validate(&mut self, tag: Addr) {
        let i = self.find_way(tag).expect("validate on unknown tag");
        self.ways[i].valid = true;
    }

    /// Forbidden while the block is busy.
    pub fn invalidate(&mut self, tag: Addr) {
        let i = self.find_way(tag).expect("invalidate on unknown tag");
        let way = &mut self.ways[i];
        debug_assert!(!way.busy, "invalidating a busy cache block");
        way.valid = false;
        way.sector_valid = 0;
        way.sector_used = 0;
        way.sector_dirty = 0;
    }

    pub fn sector_valid(&self, tag: Addr) -> SectorMask {
        self.find_way(tag).map(|i| self.ways[i].sector_valid).unwrap_or(0)
    }

    pub fn sector_used(&self, tag: Addr) -> SectorMask {
        self.find_way(tag).map(|i| self.ways[i].sector_used).unwrap_or(0)
    }

    pub fn sector_dirty(&self, tag: Addr) -> SectorMask {
        self.find_way(tag).map(|i| self.ways[i].sector_dirty).unwrap_or(0)
    }

    pub fn inst_addr(&self, tag: Addr) -> Addr {
        self.find_way(tag).map(|i| self.ways[i].inst_addr).unwrap_or(0)
    }

    pub fn block(&self, tag: Addr) -> Option<&Block> {
        self.find_way(tag).map(|i| &self.ways[i])
    }

    pub fn blocks(&self) -> &[Block] {
        &self.ways
    }

    /// P7: no two ways in a set share a tag (excluding the shared empty
    /// sentinel, which never-filled ways legitimately share).
    pub fn check_no_duplicate_tags(&self) -> bool {
        let mut seen = Vec::with_capacity(self.ways.len());
        for w in &self.ways {
            if w.tag == EMPTY_TAG {
                continue;
            }
            if seen.contains(&w.tag) {
                return false;
            }
            seen.push(w.tag);
        }
        true
    }

    pub fn check_invariants(&self) -> bool {
        self.ways.iter().all(Block::check_invariants) && self.check_no_duplicate_tags()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn victim_of_fresh_set_is_an_empty_way() {
        let set = CacheSet::new(4);
        assert_eq!(set.find_victim(), EMPTY_TAG);
    }

    #[test]
    fn mru_wraps_on_saturation() {
        let mut set = CacheSet::new(2);
        set.insert(EMPTY_TAG, 1, 0, 0);
        // way 1 is still empty and not MRU, so it remains the victim
        assert_eq!(set.find_victim(), EMPTY_TAG);
        set.insert(EMPTY_TAG, 2, 0, 0);
        // both ways are now MRU; saturation wraps to just the latest insert
        assert_eq!(set.find_victim(), 1);
    }

    #[test]
    fn insert_then_hit_updates_used_and_dirty() {
        let mut set = CacheSet::new(4);
        set.insert(EMPTY_TAG, 0x10, 0xAB, 0b0000_0001);
        assert!(!set.is_valid(0x10));
        set.validate(0x10);
        assert!(set.is_valid(0x10));
        set.access(0x10, 0b1, true);
        assert_eq!(set.sector_used(0x10), 0b1);
        assert_eq!(set.sector_dirty(0x10), 0b1);
        assert!(set.is_dirty(0x10));
    }

    #[test]
    fn find_missing_sectors_short_circuits_on_empty() {
        let mut set = CacheSet::new(1);
        set.insert(EMPTY_TAG, 0x10, 0, 0b0000_0001);
        assert_eq!(set.find_missing_sectors(0x10, 0), 0);
    }

    #[test]
    fn evict_clears_state_and_reports_prior_dirty() {
        let mut set = CacheSet::new(1);
        set.insert(EMPTY_TAG, 0x10, 0, 0b1111);
        set.validate(0x10);
        set.access(0x10, 0b1, true);
        assert!(set.evict(0x10));
        assert!(!set.is_valid(0x10));
        assert_eq!(set.sector_valid(0x10), 0);
    }

    #[test]
    fn no_two_ways_share_a_tag() {
        let mut set = CacheSet::new(2);
        set.insert(EMPTY_TAG, 5, 0, 0);
        assert!(set.check_no_duplicate_tags());
    }
}
