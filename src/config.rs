//! Flat `key=value` configuration, mirroring the text format used
//! throughout the ramulator-derived corpus this simulator descends from:
//! one assignment per line, `#` starts a line comment, unknown keys are
//! ignored so that trace-only or DRAM-only keys can share one file with
//! the keys this crate understands.

use std::collections::HashMap;
use std::path::Path;

use crate::error::{Error, Result};

/// Which levels have sectoring enabled, per the `cache` key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheScope {
    All,
    L1L2,
    L3Only,
}

/// DRAM-facing behavior. These are mutually-descriptive flavors of how
/// the level-3 cache phrases its requests to the DRAM interface; the
/// interface itself is an external collaborator (§4.6) and only the
/// sector-bits contract matters here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DramFlavor {
    /// `sectoredDRAM`: demand sector tracking end to end.
    Sectored,
    /// `partialActivationDRAM`: writes carry an all-sectors mask.
    PartialActivation,
    /// `DGMS`: sector-aware variant without a spatial predictor.
    Dgms,
    Half,
    FineGrained,
    BurstChop,
    /// No sector awareness: every request demands the whole block.
    None,
}

#[derive(Debug, Clone, Copy)]
pub struct PredictorConfig {
    pub enabled: bool,
    pub pattern_table_size: usize,
    pub pattern_table_ways: usize,
    pub utilization_window: usize,
    pub untrained_policy_no_prediction: bool,
    pub lookahead: bool,
    pub lookahead_size: usize,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            pattern_table_size: 64,
            pattern_table_ways: 4,
            utilization_window: 0,
            untrained_policy_no_prediction: false,
            lookahead: false,
            lookahead_size: 0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CacheGeometry {
    pub size_bytes: usize,
    pub ways: usize,
    pub block_size: usize,
    pub mshr_entries: usize,
    pub latency: usize,
}

impl CacheGeometry {
    pub fn sets(&self) -> usize {
        self.size_bytes / (self.ways * self.block_size)
    }

    pub fn validate(&self, level: &'static str) -> Result<()> {
        if !self.size_bytes.is_power_of_two() {
            return Err(Error::NotPowerOfTwo {
                key: level,
                value: self.size_bytes,
            });
        }
        if !self.block_size.is_power_of_two() {
            return Err(Error::NotPowerOfTwo {
                key: "block_size",
                value: self.block_size,
            });
        }
        if !self.ways.is_power_of_two() {
            return Err(Error::NotPowerOfTwo {
                key: "ways",
                value: self.ways,
            });
        }
        if self.size_bytes < self.block_size {
            return Err(Error::SizeSmallerThanBlock {
                key: level,
                value: self.size_bytes,
                block_size: self.block_size,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub sector_size: usize,
    pub dram_flavor: DramFlavor,
    pub cache_scope: CacheScope,
    pub predictor: PredictorConfig,
    pub dynamic_policy: bool,
    pub prefetcher: bool,
    pub num_cores: usize,

    pub l1: CacheGeometry,
    pub l2: CacheGeometry,
    pub l3: CacheGeometry,

    pub expected_limit_insts: Option<u64>,
    pub warmup_insts: u64,
    pub early_exit: bool,
}

impl Default for Config {
    fn default() -> Self {
        let slow = false;
        Self::geometries(1, slow, Config::default_sector_size(), Config::default_dram_flavor())
    }
}

impl Config {
    fn default_sector_size() -> usize {
        8
    }

    fn default_dram_flavor() -> DramFlavor {
        DramFlavor::None
    }

    fn geometries(num_cores: usize, slow: bool, sector_size: usize, dram_flavor: DramFlavor) -> Self {
        let (l1_lat, l2_lat, l3_lat) = if slow {
            (5, 5 + 13, 5 + 13 + 32)
        } else {
            (4, 4 + 12, 4 + 12 + 31)
        };
        Self {
            sector_size,
            dram_flavor,
            cache_scope: CacheScope::All,
            predictor: PredictorConfig::default(),
            dynamic_policy: false,
            prefetcher: false,
            num_cores,
            l1: CacheGeometry {
                size_bytes: 32 * 1024,
                ways: 8,
                block_size: 64,
                mshr_entries: 16,
                latency: l1_lat,
            },
            l2: CacheGeometry {
                size_bytes: 256 * 1024,
                ways: 8,
                block_size: 64,
                mshr_entries: 16,
                latency: l2_lat,
            },
            l3: CacheGeometry {
                size_bytes: 8 * 1024 * 1024,
                ways: 8,
                block_size: 64,
                mshr_entries: 16 * num_cores,
                latency: l3_lat,
            },
            expected_limit_insts: None,
            warmup_insts: 0,
            early_exit: false,
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::ConfigNotFound(path.to_path_buf())
            } else {
                Error::Io(e)
            }
        })?;
        Self::from_str(&text, num_cores_hint(&text))
    }

    pub fn from_str(text: &str, num_cores: usize) -> Result<Self> {
        let mut raw: HashMap<String, String> = HashMap::new();
        for (i, line) in text.lines().enumerate() {
            let line = line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                return Err(Error::ConfigParse {
                    line: i + 1,
                    text: line.to_string(),
                });
            };
            raw.insert(key.trim().to_string(), value.trim().to_string());
        }

        let get_bool = |k: &str, default: bool| -> bool {
            raw.get(k)
                .map(|v| matches!(v.as_str(), "on" | "yes" | "true" | "1"))
                .unwrap_or(default)
        };
        let get_usize = |k: &str, default: usize| -> Result<usize> {
            match raw.get(k) {
                Some(v) => v.parse().map_err(|_| Error::ConfigParse {
                    line: 0,
                    text: format!("{k}={v}"),
                }),
                None => Ok(default),
            }
        };

        let sector_size = get_usize("sector_size", Self::default_sector_size())?;

        let dram_flavor = if get_bool("sectoredDRAM", false) {
            DramFlavor::Sectored
        } else if get_bool("partialActivationDRAM", false) {
            DramFlavor::PartialActivation
        } else if get_bool("DGMS", false) {
            DramFlavor::Dgms
        } else if get_bool("halfDRAM", false) {
            DramFlavor::Half
        } else if get_bool("fineGrainedDRAM", false) {
            DramFlavor::FineGrained
        } else if get_bool("burstChopDRAM", false) {
            DramFlavor::BurstChop
        } else {
            Self::default_dram_flavor()
        };

        let cache_scope = match raw.get("cache").map(String::as_str) {
            None | Some("all") => CacheScope::All,
            Some("L1L2") => CacheScope::L1L2,
            Some("L3") => CacheScope::L3Only,
            Some(other) => return Err(Error::UnknownCacheScope(other.to_string())),
        };

        let slow = get_bool("slow_cache", false);
        let mut cfg = Self::geometries(num_cores.max(1), slow, sector_size, dram_flavor);
        cfg.cache_scope = cache_scope;
        cfg.dynamic_policy = get_bool("dynamic_policy", false);
        cfg.prefetcher = get_bool("prefetcher", false);

        cfg.predictor = PredictorConfig {
            enabled: get_bool("spatial_predictor", false),
            pattern_table_size: get_usize("pattern_table_size", PredictorConfig::default().pattern_table_size)?,
            pattern_table_ways: get_usize("pattern_table_ways", PredictorConfig::default().pattern_table_ways)?,
            utilization_window: get_usize("utilization_window", 0)?,
            untrained_policy_no_prediction: get_bool("untrained_policy_no_prediction", false),
            lookahead: get_bool("lookahead_predictor", false),
            lookahead_size: get_usize("lookahead_size", 0)?,
        };

        cfg.expected_limit_insts = raw
            .get("expected_limit_insts")
            .map(|v| v.parse())
            .transpose()
            .map_err(|_| Error::ConfigParse {
                line: 0,
                text: "expected_limit_insts".into(),
            })?;
        cfg.warmup_insts = get_usize("warmup_insts", 0)? as u64;
        cfg.early_exit = get_bool("early_exit", false);

        cfg.l1.validate("L1.size")?;
        cfg.l2.validate("L2.size")?;
        cfg.l3.validate("L3.size")?;

        Ok(cfg)
    }

    /// Sectors per block for this sector size (0 disables sectoring).
    pub fn sectors_per_block(&self, block_size: usize) -> usize {
        if self.sector_size == 0 {
            0
        } else {
            block_size / self.sector_size
        }
    }

    /// Whether sector-granular tracking is active at all (as opposed to
    /// every request demanding the whole block).
    pub fn sectoring_enabled(&self) -> bool {
        self.sector_size != 0 && !matches!(self.dram_flavor, DramFlavor::None)
    }
}

fn num_cores_hint(text: &str) -> usize {
    text.lines()
        .find_map(|l| {
            let l = l.split('#').next().unwrap_or("").trim();
            l.strip_prefix("num_cores=").or_else(|| l.strip_prefix("cores="))
        })
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(1)
}
