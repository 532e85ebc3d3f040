//! Cycle-driven sector-cache memory hierarchy simulator: sector caches
//! (L1/L2/L3) coupled to a partially-activatable DRAM substrate, with
//! MSHRs, sector-granular validity/usage/dirty bitmaps, a spatial
//! footprint predictor, inclusion invariants, and a trace-driven front
//! end. DRAM timing, coherence, TLBs and ISA semantics live outside this
//! crate; see [`dram::DramInterface`] for the boundary.

pub mod address;
pub mod cache;
pub mod config;
pub mod dram;
pub mod error;
pub mod predictor;
pub mod request;
pub mod stats;
pub mod system;
pub mod testing;
pub mod trace;
pub mod window;

pub use address::{Addr, Geometry, SectorMask};
pub use config::Config;
pub use error::{Error, Result};
pub use request::Request;
pub use system::CacheSystem;
