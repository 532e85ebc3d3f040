//! The DRAM-timing controller is an external collaborator (§4.6): this
//! module only models the contract the cache hierarchy depends on —
//! accepting a [`Request`] tagged with the sectors to (partially)
//! activate, and eventually invoking the request's completion callback.
//! Row-buffer and `tFAW` timing correctness live outside this crate.

use crate::request::Request;

/// What the `CacheSystem` needs from a DRAM model: a non-blocking
/// `send_memory` that can refuse (back-pressure, mirroring `send`
/// elsewhere in the hierarchy) and a fixed in-order completion latency
/// per request used to schedule the callback.
pub trait DramInterface {
    /// Accepts `req` for dispatch. Returns `false` if the request must
    /// be retried on a later tick (the DRAM queue is full).
    fn send_memory(&mut self, req: &Request) -> bool;

    /// Advances the DRAM model's own clock by one cycle, completing any
    /// requests whose latency has elapsed and invoking `on_complete`
    /// for each (in issue order per the contract in §5).
    fn tick(&mut self, on_complete: &mut dyn FnMut(Request));
}

/// A fixed-latency DRAM stand-in: every request completes exactly
/// `latency` cycles after `send_memory` accepts it, honoring a finite
/// in-flight queue depth for back-pressure. Sufficient to drive the
/// scenarios in §8 without modeling row conflicts or `tFAW` budgets,
/// which the spec explicitly scopes out of this core.
pub struct FixedLatencyDram {
    latency: u64,
    queue_capacity: usize,
    clk: u64,
    in_flight: std::collections::VecDeque<(u64, Request)>,
}

impl FixedLatencyDram {
    pub fn new(latency: u64, queue_capacity: usize) -> Self {
        Self {
            latency,
            queue_capacity,
            clk: 0,
            in_flight: std::collections::VecDeque::new(),
        }
    }

    pub fn queue_depth(&self) -> usize {
        self.in_flight.len()
    }
}

impl DramInterface for FixedLatencyDram {
    fn send_memory(&mut self, req: &Request) -> bool {
        if self.in_flight.len() >= self.queue_capacity {
            return false;
        }
        self.in_flight.push_back((self.clk + self.latency, req.clone()));
        true
    }

    fn tick(&mut self, on_complete: &mut dyn FnMut(Request)) {
        self.clk += 1;
        while let Some((ready, _)) = self.in_flight.front() {
            if *ready > self.clk {
                break;
            }
            let (_, req) = self.in_flight.pop_front().unwrap();
            on_complete(req);
        }
    }
}
