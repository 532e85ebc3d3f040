use crate::address::{Addr, SectorMask};

/// One outstanding fill. Multiple entries may share a `tag` — each
/// represents a distinct, non-overlapping subset of sectors still
/// outstanding from the level below (§3).
#[derive(Debug, Clone)]
pub struct MshrEntry {
    pub tag: Addr,
    pub sector_bits: SectorMask,
    pub dirty: bool,
    pub will_be_used_sectors: SectorMask,
    pub will_be_dirty_sectors: SectorMask,
}

/// Per-level table of in-flight fills. A flat `Vec` mirrors the
/// original's linear scan — MSHR tables are small (spec default: 16
/// entries) so there's no associative structure to win from indexing.
#[derive(Debug, Clone, Default)]
pub struct MshrTable {
    entries: Vec<MshrEntry>,
    capacity: usize,
}

impl MshrTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::new(),
            capacity,
        }
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries_for(&self, tag: Addr) -> impl Iterator<Item = &MshrEntry> {
        self.entries.iter().filter(move |e| e.tag == tag)
    }

    pub fn entries_for_mut(&mut self, tag: Addr) -> impl Iterator<Item = &mut MshrEntry> {
        self.entries.iter_mut().filter(move |e| e.tag == tag)
    }

    /// Union of `sector_bits` across every MSHR naming `tag`.
    pub fn union_outstanding(&self, tag: Addr) -> SectorMask {
        self.entries_for(tag).fold(0, |acc, e| acc | e.sector_bits)
    }

    pub fn any_match(&self, tag: Addr) -> bool {
        self.entries.iter().any(|e| e.tag == tag)
    }

    pub fn push(&mut self, entry: MshrEntry) {
        debug_assert!(!self.is_full(), "pushing into a full MSHR table");
        self.entries.push(entry);
    }

    /// Subtracts `arrived` from every entry naming `tag`; deletes
    /// entries whose `sector_bits` reaches zero (P5). Entries are
    /// removed in descending index order so indices stay valid as we go.
    /// Returns `true` iff at least one matching entry was found and no
    /// entry naming `tag` remains after the subtraction.
    pub fn complete_fill(&mut self, tag: Addr, arrived: SectorMask) -> bool {
        let mut any_match = false;
        let mut to_remove = Vec::new();
        for (i, e) in self.entries.iter_mut().enumerate() {
            if e.tag != tag {
                continue;
            }
            any_match = true;
            e.sector_bits &= !arrived;
            if e.sector_bits == 0 {
                to_remove.push(i);
            }
        }
        for &i in to_remove.iter().rev() {
            self.entries.remove(i);
        }
        any_match && !self.any_match(tag)
    }
}
