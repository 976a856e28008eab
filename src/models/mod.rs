//! Core data model for playlist curation
//!
//! A [`Playlist`] is the single in-memory representation flowing through the
//! pipeline: built once by the parser, annotated in place by the probe
//! orchestrator, rewritten by the selection engine and serialized once by the
//! writer.

use serde::{Deserialize, Serialize};

/// Video resolution reported by a probe stage.
///
/// Ordering is lexicographic on `(width, height)`, which is what the ranking
/// engine compares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Stream start-up delay derived from the probed start time.
///
/// Values below 0.1s collapse to `Realtime`; values at or above one hour are
/// treated as overflowed/bogus timestamps and reported as `Unknown`, never as
/// a number.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum StreamDelay {
    Realtime,
    Seconds(f64),
    Unknown,
}

impl StreamDelay {
    /// Classify a raw start-time value in seconds.
    pub fn from_start_time(start_time: f64) -> Self {
        if start_time < 0.1 {
            StreamDelay::Realtime
        } else if start_time < 3600.0 {
            StreamDelay::Seconds(start_time)
        } else {
            StreamDelay::Unknown
        }
    }
}

impl std::fmt::Display for StreamDelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamDelay::Realtime => write!(f, "realtime"),
            StreamDelay::Seconds(s) => write!(f, "{:.1}s", s),
            StreamDelay::Unknown => write!(f, "unknown"),
        }
    }
}

/// Buffer health derived from the introspection tool's probe confidence score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BufferHealth {
    Good,
    Fair,
    Poor,
    Unknown,
}

impl BufferHealth {
    /// Map a 0-100 probe confidence score; absent or unparseable scores map to
    /// `Unknown`.
    pub fn from_probe_score(score: Option<f64>) -> Self {
        match score {
            Some(s) if s as i64 > 80 => BufferHealth::Good,
            Some(s) if s as i64 > 50 => BufferHealth::Fair,
            Some(_) => BufferHealth::Poor,
            None => BufferHealth::Unknown,
        }
    }
}

/// Result of the optional throughput sample against one URL.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThroughputSample {
    /// Average download speed in KB/s over the sample window.
    pub kbytes_per_sec: f64,
    pub bytes_sampled: u64,
    pub duration_secs: f64,
}

/// Everything the probe pipeline learned about a single URL.
///
/// "Absent", "zero" and "unknown-because-noisy" are distinct states here:
/// `bitrate_kbps` is `None` both when the tool reported nothing and when it
/// reported the `N/A`/`0` sentinels, while `delay` keeps its own `Unknown`
/// variant for out-of-range timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub reachable: bool,
    pub resolution: Option<Resolution>,
    pub bitrate_kbps: Option<i64>,
    pub delay: StreamDelay,
    pub buffer_health: BufferHealth,
    pub throughput: Option<ThroughputSample>,
}

impl ProbeResult {
    /// Placeholder for a URL the orchestrator never scheduled.
    pub fn skipped() -> Self {
        Self {
            reachable: false,
            resolution: None,
            bitrate_kbps: None,
            delay: StreamDelay::Unknown,
            buffer_health: BufferHealth::Unknown,
            throughput: None,
        }
    }

    /// The URL failed the reachability check (or its task failed outright).
    pub fn unreachable() -> Self {
        Self::skipped()
    }

    /// The URL answered but no probe stage produced a resolution.
    pub fn unknown_quality() -> Self {
        Self {
            reachable: true,
            ..Self::skipped()
        }
    }

    /// Keep predicate: a resolution was measured and the buffer health is
    /// `Good`. This is the minimum bar for a URL to survive selection.
    pub fn is_valid(&self) -> bool {
        self.reachable && self.resolution.is_some() && self.buffer_health == BufferHealth::Good
    }
}

impl Default for ProbeResult {
    fn default() -> Self {
        Self::skipped()
    }
}

/// One logical program entry, possibly backed by several candidate URLs.
///
/// `source_lines` holds the channel's original lines verbatim and in order;
/// `urls` holds the URL-shaped subset, and `probes` is index-aligned with
/// `urls` so probe tasks write into disjoint slots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    pub display_name: String,
    pub tvg_id: String,
    pub tvg_name: String,
    pub tvg_logo: String,
    pub group_title: String,
    /// `key="value"` attributes other than the four named ones, in source order.
    pub extra_attrs: Vec<(String, String)>,
    pub duration: i64,
    /// The original `#EXTINF:` line, verbatim.
    pub extinf_line: String,
    pub source_lines: Vec<String>,
    pub urls: Vec<String>,
    pub probes: Vec<ProbeResult>,
}

impl Channel {
    pub fn new() -> Self {
        Self {
            display_name: String::new(),
            tvg_id: String::new(),
            tvg_name: String::new(),
            tvg_logo: String::new(),
            group_title: String::new(),
            extra_attrs: Vec::new(),
            duration: -1,
            extinf_line: String::new(),
            source_lines: Vec::new(),
            urls: Vec::new(),
            probes: Vec::new(),
        }
    }

    /// Field used to group duplicate entries: `tvg-name` when present, else
    /// the display name.
    pub fn identity_key(&self) -> &str {
        if !self.tvg_name.is_empty() {
            &self.tvg_name
        } else {
            &self.display_name
        }
    }

    /// Best resolution across this channel's valid URLs, for ranking.
    pub fn best_resolution(&self) -> Option<Resolution> {
        self.probes
            .iter()
            .filter(|p| p.is_valid())
            .filter_map(|p| p.resolution)
            .max()
    }

    /// Best throughput sample across this channel's valid URLs.
    pub fn best_throughput(&self) -> Option<ThroughputSample> {
        self.probes
            .iter()
            .filter(|p| p.is_valid())
            .filter_map(|p| p.throughput)
            .max_by(|a, b| a.kbytes_per_sec.total_cmp(&b.kbytes_per_sec))
    }
}

impl Default for Channel {
    fn default() -> Self {
        Self::new()
    }
}

/// Line terminator convention of the source file, detected at parse time and
/// reused verbatim on write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LineEnding {
    #[default]
    Lf,
    CrLf,
}

impl LineEnding {
    pub fn as_str(&self) -> &'static str {
        match self {
            LineEnding::Lf => "\n",
            LineEnding::CrLf => "\r\n",
        }
    }
}

/// Parsed playlist: leading directives plus ordered channel records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Playlist {
    /// Lines before the first `#EXTINF:`, preserved verbatim.
    pub header_lines: Vec<String>,
    pub channels: Vec<Channel>,
    /// Dominant terminator of the source file.
    pub line_ending: LineEnding,
    /// Whether the source file ended with a terminator.
    pub trailing_newline: bool,
}

impl Playlist {
    pub fn total_urls(&self) -> usize {
        self.channels.iter().map(|c| c.urls.len()).sum()
    }
}

impl Default for Playlist {
    fn default() -> Self {
        Self {
            header_lines: Vec::new(),
            channels: Vec::new(),
            line_ending: LineEnding::Lf,
            trailing_newline: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_classification() {
        assert_eq!(StreamDelay::from_start_time(0.05), StreamDelay::Realtime);
        assert_eq!(
            StreamDelay::from_start_time(42.7),
            StreamDelay::Seconds(42.7)
        );
        assert_eq!(StreamDelay::from_start_time(5000.0), StreamDelay::Unknown);
        assert_eq!(StreamDelay::from_start_time(3600.0), StreamDelay::Unknown);
        assert_eq!(StreamDelay::from_start_time(-2.0), StreamDelay::Realtime);
    }

    #[test]
    fn delay_display_uses_one_decimal() {
        assert_eq!(StreamDelay::from_start_time(42.7).to_string(), "42.7s");
        assert_eq!(StreamDelay::from_start_time(0.05).to_string(), "realtime");
        assert_eq!(StreamDelay::from_start_time(5000.0).to_string(), "unknown");
        assert_eq!(StreamDelay::Seconds(1.25).to_string(), "1.2s");
    }

    #[test]
    fn buffer_health_thresholds() {
        assert_eq!(
            BufferHealth::from_probe_score(Some(100.0)),
            BufferHealth::Good
        );
        assert_eq!(
            BufferHealth::from_probe_score(Some(81.0)),
            BufferHealth::Good
        );
        assert_eq!(
            BufferHealth::from_probe_score(Some(80.0)),
            BufferHealth::Fair
        );
        assert_eq!(
            BufferHealth::from_probe_score(Some(51.0)),
            BufferHealth::Fair
        );
        assert_eq!(
            BufferHealth::from_probe_score(Some(50.0)),
            BufferHealth::Poor
        );
        assert_eq!(BufferHealth::from_probe_score(None), BufferHealth::Unknown);
    }

    #[test]
    fn resolution_orders_width_first() {
        let a = Resolution {
            width: 1280,
            height: 720,
        };
        let b = Resolution {
            width: 1920,
            height: 540,
        };
        assert!(b > a);
        assert_eq!(a.to_string(), "1280x720");
    }

    #[test]
    fn keep_predicate_requires_resolution_and_good_buffer() {
        let mut probe = ProbeResult::unknown_quality();
        assert!(!probe.is_valid());

        probe.resolution = Some(Resolution {
            width: 1920,
            height: 1080,
        });
        assert!(!probe.is_valid());

        probe.buffer_health = BufferHealth::Good;
        assert!(probe.is_valid());

        assert!(!ProbeResult::unreachable().is_valid());
    }
}
