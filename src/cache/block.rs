use crate::address::{Addr, SectorMask};

/// Sentinel tag value for a way that has never been filled (§3: "`-1`/
/// sentinel when never filled").
pub const EMPTY_TAG: Addr = Addr::MAX;

/// One way of a [`super::set::CacheSet`].
#[derive(Debug, Clone)]
pub struct Block {
    pub tag: Addr,
    pub valid: bool,
    pub busy: bool,
    pub dirty: bool,
    pub sector_valid: SectorMask,
    pub sector_used: SectorMask,
    pub sector_dirty: SectorMask,
    pub inst_addr: Addr,
    pub mru: bool,
}

impl Default for Block {
    fn default() -> Self {
        Self {
            tag: EMPTY_TAG,
            valid: false,
            busy: false,
            dirty: false,
            sector_valid: 0,
            sector_used: 0,
            sector_dirty: 0,
            inst_addr: 0,
            mru: false,
        }
    }
}

impl Block {
    /// P1: `sector_dirty ⊆ sector_used ⊆ sector_valid`. P2: `dirty ⇔
    /// sector_dirty ≠ 0`.
    pub fn check_invariants(&self) -> bool {
        (self.sector_dirty & !self.sector_used) == 0
            && (self.sector_used & !self.sector_valid) == 0
            && (self.dirty == (self.sector_dirty != 0))
    }
}
