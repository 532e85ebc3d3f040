//! External collaborator, briefly specified (§4.5): a fixed-depth
//! circular retirement window per core. The cache hierarchy's only
//! contract with it is `set_ready`, invoked from a request's stored
//! hit/fill completion callback.

use crate::address::{Addr, SectorMask};

#[derive(Debug, Clone)]
struct Slot {
    /// `None` for a non-memory bubble, which is ready unconditionally.
    block_addr: Option<Addr>,
    residual: SectorMask,
    ready: bool,
}

/// Fixed-depth circular buffer of in-flight instructions for one core.
pub struct InstructionWindow {
    slots: Vec<Slot>,
    head: usize,
    len: usize,
}

impl InstructionWindow {
    pub fn new(depth: usize) -> Self {
        Self {
            slots: Vec::with_capacity(depth),
            head: 0,
            len: 0,
        }
    }

    pub fn depth(&self) -> usize {
        self.slots.capacity().max(self.slots.len())
    }

    pub fn is_full(&self) -> bool {
        self.len >= self.slots.capacity().max(1) && self.slots.len() == self.slots.capacity()
    }

    /// Pushes a memory instruction waiting on `residual` sectors of
    /// `block_addr`. A `residual` of zero is ready immediately (e.g. a
    /// write that needed no read allocation).
    pub fn push_memory(&mut self, block_addr: Addr, residual: SectorMask) {
        self.slots.push(Slot {
            block_addr: Some(block_addr),
            residual,
            ready: residual == 0,
        });
        self.len += 1;
    }

    /// Pushes a non-memory instruction: ready unconditionally.
    pub fn push_bubble(&mut self) {
        self.slots.push(Slot {
            block_addr: None,
            residual: 0,
            ready: true,
        });
        self.len += 1;
    }

    /// ANDs `~sector_bits` into the residual of every slot matching
    /// `block_addr`, flipping `ready` when the residual reaches zero.
    pub fn set_ready(&mut self, block_addr: Addr, sector_bits: SectorMask) {
        for slot in &mut self.slots {
            if slot.block_addr == Some(block_addr) {
                slot.residual &= !sector_bits;
                if slot.residual == 0 {
                    slot.ready = true;
                }
            }
        }
    }

    /// Retires instructions from the head of the window while they are
    /// ready, in order; stops at the first not-yet-ready slot.
    pub fn retire_ready(&mut self) -> usize {
        let mut retired = 0;
        while self.head < self.slots.len() && self.slots[self.head].ready {
            self.head += 1;
            self.len -= 1;
            retired += 1;
        }
        if self.head == self.slots.len() {
            self.slots.clear();
            self.head = 0;
        }
        retired
    }

    pub fn in_flight(&self) -> usize {
        self.len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_needing_no_allocation_retires_immediately() {
        let mut w = InstructionWindow::new(4);
        w.push_memory(0x1000, 0);
        assert_eq!(w.retire_ready(), 1);
    }

    #[test]
    fn residual_clears_and_retires_in_order() {
        let mut w = InstructionWindow::new(4);
        w.push_memory(0x1000, 0b11);
        w.push_bubble();
        assert_eq!(w.retire_ready(), 0);
        w.set_ready(0x1000, 0b11);
        assert_eq!(w.retire_ready(), 2);
    }
}
