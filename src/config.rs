use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_QUERY_COUNT: u32 = 1024;
pub const DEFAULT_MAX_DEPTH: u32 = 64;
pub const DEFAULT_AVERAGING_WINDOW: usize = 60;
pub const DEFAULT_RECURSIVE_LEVELS_TRACKED: usize = 20;
pub const DEFAULT_MAX_ZONE_COUNT: u32 = 4096;

/// Largest per-frame query count; both banks must fit in one wgpu query set.
pub const MAX_QUERY_COUNT: u32 = wgpu::QUERY_SET_MAX_QUERIES / 2;

/// Profiler sizing knobs. Every field has a default, so partial JSON is fine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProfilerConfig {
    /// Timestamp queries available per frame (two per zone).
    pub max_query_count: u32,
    /// Deepest zone nesting accepted; entering at this depth fails.
    pub max_depth: u32,
    /// Samples in each running-average window.
    pub averaging_window: usize,
    /// Longest breadcrumb trail kept for a zone.
    pub recursive_levels_tracked: usize,
    /// Zones the tree may hold; new zones past this are skipped.
    pub max_zone_count: u32,
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            max_query_count: DEFAULT_MAX_QUERY_COUNT,
            max_depth: DEFAULT_MAX_DEPTH,
            averaging_window: DEFAULT_AVERAGING_WINDOW,
            recursive_levels_tracked: DEFAULT_RECURSIVE_LEVELS_TRACKED,
            max_zone_count: DEFAULT_MAX_ZONE_COUNT,
        }
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Option<T> {
    let raw = lookup(name)?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            log::warn!("ignoring {name}={raw:?}: not a valid number");
            None
        }
    }
}

impl ProfilerConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let cfg: ProfilerConfig =
            serde_json::from_str(json).map_err(|e| anyhow!("invalid profiler config: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Applies `GPUZONES_MAX_QUERIES`, `GPUZONES_MAX_DEPTH`, `GPUZONES_AVG_WINDOW`,
    /// `GPUZONES_BREADCRUMB_LEVELS` and `GPUZONES_MAX_ZONES` from the process
    /// environment.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|name| std::env::var(name).ok())
    }

    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(v) = parse_var(&lookup, "GPUZONES_MAX_QUERIES") {
            self.max_query_count = v;
        }
        if let Some(v) = parse_var(&lookup, "GPUZONES_MAX_DEPTH") {
            self.max_depth = v;
        }
        if let Some(v) = parse_var(&lookup, "GPUZONES_AVG_WINDOW") {
            self.averaging_window = v;
        }
        if let Some(v) = parse_var(&lookup, "GPUZONES_BREADCRUMB_LEVELS") {
            self.recursive_levels_tracked = v;
        }
        if let Some(v) = parse_var(&lookup, "GPUZONES_MAX_ZONES") {
            self.max_zone_count = v;
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_query_count < 2 || self.max_query_count % 2 != 0 {
            return Err(anyhow!(
                "max_query_count must be a non-zero even number, got {}",
                self.max_query_count
            ));
        }
        if self.max_query_count > MAX_QUERY_COUNT {
            return Err(anyhow!(
                "max_query_count {} exceeds the limit of {MAX_QUERY_COUNT}",
                self.max_query_count
            ));
        }
        if self.max_depth == 0 {
            return Err(anyhow!("max_depth must be at least 1"));
        }
        if self.averaging_window == 0 {
            return Err(anyhow!("averaging_window must be at least 1"));
        }
        if self.recursive_levels_tracked == 0 {
            return Err(anyhow!("recursive_levels_tracked must be at least 1"));
        }
        if self.max_zone_count == 0 {
            return Err(anyhow!("max_zone_count must be at least 1"));
        }
        Ok(())
    }

    /// Size of the device query pool: one bank per in-flight frame.
    pub fn query_pool_size(&self) -> u32 {
        self.max_query_count.saturating_mul(2)
    }
}
