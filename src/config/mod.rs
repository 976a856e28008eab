//! Run configuration
//!
//! One [`Config`] is constructed per run and passed by reference to every
//! component. The denylist, group priority table and ffprobe budgets that the
//! original workflow kept as process-wide state all live here.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::errors::{CuratorError, CuratorResult};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub probe: ProbeConfig,
    pub selection: SelectionConfig,
}

/// Budgets and knobs for the probing pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Worker-pool size: number of (channel, URL) probe tasks in flight.
    pub concurrency: usize,
    /// HEAD-check timeout, independent of the introspection budgets.
    pub reachability_timeout_secs: u64,
    /// Outer wall-clock bound on one ffprobe invocation.
    pub process_timeout_secs: u64,
    /// `-probesize`: bytes ffprobe may read while detecting the format.
    pub probe_size_bytes: u64,
    /// `-analyzeduration` in microseconds.
    pub analyze_duration_us: u64,
    /// `-timeout` / `-rw_timeout` / `-max_delay` in microseconds.
    pub io_timeout_us: u64,
    /// Seconds of stream body to read for the throughput sample.
    pub throughput_duration_secs: u64,
    /// Explicit ffprobe executable; falls back to `ffprobe` on PATH.
    pub ffprobe_path: Option<PathBuf>,
    /// Hosts short-circuited to unreachable without a network call
    /// (substring match against the URL).
    pub denylist: Vec<String>,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            concurrency: 5,
            reachability_timeout_secs: 5,
            process_timeout_secs: 20,
            probe_size_bytes: 2_000_000,
            analyze_duration_us: 5_000_000,
            io_timeout_us: 5_000_000,
            throughput_duration_secs: 15,
            ffprobe_path: None,
            denylist: vec!["iptv.catvod.com".to_string()],
        }
    }
}

/// Selection, dedup and ordering policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    /// Cap on surviving entries per identity key.
    pub max_per_identity: usize,
    /// Channel-name prefix whose trailing number sorts numerically
    /// (e.g. CCTV1, CCTV-10).
    pub family_prefix: String,
    /// Group titles whose channels are dropped wholesale before ranking.
    pub deleted_groups: Vec<String>,
    /// Group titles canonicalized to a merged label before ranking.
    pub group_renames: HashMap<String, String>,
    /// Group title -> rank; lower ranks first.
    pub group_priority: HashMap<String, u32>,
    /// Rank assigned to group titles absent from the table.
    pub unranked_priority: u32,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        let deleted_groups = ["更新时间", "体育赛事", "🏈体育赛事🏆️", "直播中国"]
            .into_iter()
            .map(String::from)
            .collect();

        let group_renames = [
            ("港澳台", "💓港澳台📶"),
            ("💓专享央视", "🌐央视频道"),
            ("💓专享卫视", "📡卫视频道"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let group_priority = [
            ("🌐央视频道", 1),
            ("📡卫视频道", 2),
            ("💓港澳台📶", 3),
            ("💓台湾台📶", 4),
            ("电影频道", 5),
            ("MTV", 6),
            ("专项源", 7),
            ("定制台", 8),
            ("儿童专享", 9),
            ("其他", 10),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        Self {
            max_per_identity: 6,
            family_prefix: "CCTV".to_string(),
            deleted_groups,
            group_renames,
            group_priority,
            unranked_priority: 10,
        }
    }
}

impl Config {
    /// Load from an optional TOML file; absent sections fall back to defaults.
    pub fn load(config_file: Option<&Path>) -> CuratorResult<Self> {
        match config_file {
            Some(path) => {
                let contents = std::fs::read_to_string(path)?;
                toml::from_str(&contents).map_err(|e| {
                    CuratorError::config(format!("{}: {e}", path.display()))
                })
            }
            None => Ok(Self::default()),
        }
    }
}
