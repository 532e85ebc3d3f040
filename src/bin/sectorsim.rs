//! CLI driver: wires a [`Config`] and a trace file into a
//! [`CacheSystem`] and runs it cycle by cycle until the instruction
//! limit (or the trace itself, for traces that don't loop forever in
//! practice) is satisfied.

use std::fs::File;

use clap::Parser;

use sectorcache::address::Geometry;
use sectorcache::cache::level::{CacheLevel, LevelKind};
use sectorcache::dram::FixedLatencyDram;
use sectorcache::predictor::SpatialPredictor;
use sectorcache::request::Request;
use sectorcache::stats::{RunContext, RunStats};
use sectorcache::system::CacheSystem;
use sectorcache::trace::TraceReader;
use sectorcache::window::InstructionWindow;
use sectorcache::Config;

/// Trace-driven sector-cache hierarchy simulator.
#[derive(Parser, Debug)]
#[command(name = "sectorsim", version, about)]
struct Args {
    /// Path to a key=value configuration file; defaults baked in if omitted.
    #[arg(short, long)]
    config: Option<String>,

    /// Path to a trace file (see the trace format docs in `trace.rs`).
    #[arg(short, long)]
    trace: String,

    /// Number of cores driving this hierarchy (one trace file per core,
    /// round-robined when the instruction window has room).
    #[arg(long, default_value_t = 1)]
    cores: usize,

    /// In-flight instruction window depth per core.
    #[arg(long, default_value_t = 32)]
    window_depth: usize,

    /// Maximum cycles to simulate as a safety net against a config with
    /// no instruction limit and a trace that never stalls.
    #[arg(long, default_value_t = 100_000_000)]
    max_cycles: u64,

    /// Write final stats as JSON to this path instead of stdout.
    #[arg(long)]
    stats_out: Option<String>,
}

fn build_system(config: &Config) -> CacheSystem<FixedLatencyDram> {
    let sector_size = config.sector_size;
    let sectoring = config.sectoring_enabled();

    let l1_geom = Geometry::new(config.l1.block_size, sector_size);
    let l2_geom = Geometry::new(config.l2.block_size, sector_size);
    let l3_geom = Geometry::new(config.l3.block_size, sector_size);

    let l1_sectoring = sectoring;
    let l2_sectoring = sectoring && !matches!(config.cache_scope, sectorcache::config::CacheScope::L3Only);
    let l3_sectoring = sectoring;

    let mut levels = Vec::new();

    let mut l1_ids = Vec::new();
    for core in 0..config.num_cores {
        let l1 = CacheLevel::new(
            format!("L1-core{core}"),
            LevelKind::L1,
            Some(core),
            l1_geom,
            config.l1.sets(),
            config.l1.ways,
            config.l1.mshr_entries,
            config.l1.latency,
            l1_sectoring,
        );
        levels.push(l1);
        l1_ids.push(levels.len() - 1);
    }

    let l2 = CacheLevel::new(
        "L2",
        LevelKind::L2,
        None,
        l2_geom,
        config.l2.sets(),
        config.l2.ways,
        config.l2.mshr_entries,
        config.l2.latency,
        l2_sectoring,
    );
    levels.push(l2);
    let l2_id = levels.len() - 1;

    let l3 = CacheLevel::new(
        "L3",
        LevelKind::L3,
        None,
        l3_geom,
        config.l3.sets(),
        config.l3.ways,
        config.l3.mshr_entries,
        config.l3.latency,
        l3_sectoring,
    );
    levels.push(l3);
    let l3_id = levels.len() - 1;

    for &l1_id in &l1_ids {
        levels[l1_id].lower = Some(l2_id);
        levels[l2_id].higher.push(l1_id);
    }
    levels[l2_id].lower = Some(l3_id);
    levels[l3_id].higher.push(l2_id);

    let dram_latency = 100;
    let dram = FixedLatencyDram::new(dram_latency, config.l3.mshr_entries * 2);

    let mut system = CacheSystem::new(levels, dram, config);
    for core in 0..config.num_cores {
        system.set_predictor(core, SpatialPredictor::new(&config.predictor, sector_size, 0x9E37_79B9 + core as u64));
        system.set_window(core, InstructionWindow::new(32));
    }
    system
}

fn main() -> sectorcache::Result<()> {
    color_eyre::install().ok();
    env_logger::init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => {
            let mut c = Config::default();
            c.num_cores = args.cores;
            c
        }
    };

    let mut system = build_system(&config);
    let mut ctx = RunContext::new(config.warmup_insts, config.expected_limit_insts.unwrap_or(0), config.early_exit);

    let trace_file = File::open(&args.trace)?;
    let mut reader = TraceReader::new(trace_file, config.l1.block_size);
    let geom = Geometry::new(config.l1.block_size, config.sector_size);

    let core_id = 0;
    let l1_id = 0;

    // A split rejected by `send` (MSHR/eviction back-pressure) is held here
    // and retried before any new trace entry is read, so in-order retirement
    // never silently drops the access that caused the stall.
    let mut retry: Option<(Request, sectorcache::address::Addr, sectorcache::address::SectorMask)> = None;
    let mut queued_splits: std::collections::VecDeque<sectorcache::trace::TraceEntry> =
        std::collections::VecDeque::new();

    'outer: for _cycle in 0..args.max_cycles {
        while system.windows.get(&core_id).is_some_and(|w| !w.is_full()) {
            let (req, addr, demand) = if let Some(pending) = retry.take() {
                pending
            } else {
                if queued_splits.is_empty() {
                    let entry = reader.next_entry()?;
                    queued_splits.extend(entry.split(&geom));
                }
                let split = queued_splits.pop_front().unwrap();
                for _ in 0..split.bubbles {
                    system.windows.get_mut(&core_id).unwrap().push_bubble();
                }
                let demand = geom.demand_sectors(split.data_addr, split.size);
                let req = Request::new(split.data_addr, split.kind, split.size, split.inst_addr, core_id, demand);
                (req, split.data_addr, demand)
            };

            if system.send(l1_id, req.clone()) {
                system.windows.get_mut(&core_id).unwrap().push_memory(addr, demand);
            } else {
                // MSHR/eviction back-pressure: hold this exact access and
                // retry it first thing next cycle, after tick() has had a
                // chance to drain the level's own retry_list.
                retry = Some((req, addr, demand));
                break;
            }

            if ctx.reached_limit() {
                break 'outer;
            }
        }

        system.tick();
        let retired = system.windows.get_mut(&core_id).map(|w| w.retire_ready()).unwrap_or(0);
        ctx.retire_instructions(retired as u64);

        if ctx.reached_limit() {
            break;
        }
    }

    let mut stats = RunStats {
        levels: system.levels.iter().map(|l| (l.name.clone(), l.stats.clone())).collect(),
        dram_queue_depth: 0,
        cycles: system.clk,
        insts_retired: ctx.insts_retired(),
    };
    stats.dram_queue_depth = system.dram.queue_depth();

    let json = stats.to_json().expect("stats always serialize");
    match args.stats_out {
        Some(path) => std::fs::write(path, json)?,
        None => println!("{json}"),
    }

    Ok(())
}

