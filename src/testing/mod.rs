//! Shared test scaffolding, mirroring the teacher's own
//! `testing::init_test` helper: a one-time `env_logger` + `color_eyre`
//! setup so `RUST_LOG=trace cargo test -- --nocapture` works the same
//! way across every test binary in the workspace.

use std::sync::Once;

static INIT: Once = Once::new();

pub fn init() {
    INIT.call_once(|| {
        color_eyre::install().ok();
        env_logger::builder().is_test(true).try_init().ok();
    });
}

/// Asserts every level in a freshly built hierarchy still satisfies its
/// per-block and per-set invariants (P1, P2, P7).
pub fn assert_all_levels_consistent(levels: &[crate::cache::level::CacheLevel]) {
    for level in levels {
        assert!(level.check_invariants(), "invariants broken in {}", level.name);
    }
}
