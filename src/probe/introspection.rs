//! Stream quality introspection
//!
//! Produces a [`ProbeResult`] for one URL through an ordered fallback chain:
//!
//! 1. an HLS-manifest structural probe (no subprocess) for variant playlists;
//! 2. a compact CSV ffprobe report;
//! 3. a verbose JSON ffprobe report when the compact run printed nothing.
//!
//! The chain stops at the first stage that yields a resolution. A stream that
//! answers but defeats every stage is "reachable, unknown quality"; the
//! ranking engine decides its fate, never this module. Nothing here blocks
//! past its budget or lets an error escape to the orchestrator.

use futures::StreamExt;
use m3u8_rs::Playlist as HlsPlaylist;
use serde_json::Value;
use std::path::PathBuf;
use std::process::Output;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::ProbeConfig;
use crate::errors::{ProbeError, ProbeResultOr};
use crate::models::{BufferHealth, ProbeResult, Resolution, StreamDelay, ThroughputSample};

pub struct StreamIntrospectionProbe {
    client: reqwest::Client,
    config: ProbeConfig,
    /// Resolved once at startup; `None` means every introspection degrades to
    /// "reachable, unknown quality".
    ffprobe: Option<PathBuf>,
}

impl StreamIntrospectionProbe {
    /// Resolve the ffprobe executable (configured path, else `ffprobe` on
    /// PATH) and verify it once with `-version`.
    pub async fn new(client: reqwest::Client, config: ProbeConfig) -> Self {
        let ffprobe = Self::resolve_ffprobe(&config).await;
        Self {
            client,
            config,
            ffprobe,
        }
    }

    async fn resolve_ffprobe(config: &ProbeConfig) -> Option<PathBuf> {
        let candidate = config
            .ffprobe_path
            .clone()
            .unwrap_or_else(|| PathBuf::from("ffprobe"));

        let verify = Command::new(&candidate)
            .arg("-version")
            .kill_on_drop(true)
            .output();

        match tokio::time::timeout(Duration::from_secs(5), verify).await {
            Ok(Ok(output)) if output.status.success() => {
                debug!("Using introspection tool at {}", candidate.display());
                Some(candidate)
            }
            Ok(Ok(output)) => {
                warn!(
                    "{} -version exited with {}; introspection disabled",
                    candidate.display(),
                    output.status
                );
                None
            }
            Ok(Err(e)) => {
                warn!(
                    "Introspection tool not found at {}: {e}; quality probing degrades to reachability only",
                    candidate.display()
                );
                None
            }
            Err(_) => {
                warn!(
                    "{} -version timed out; introspection disabled",
                    candidate.display()
                );
                None
            }
        }
    }

    /// Probe one URL. Always returns a result; never an error.
    pub async fn probe(&self, url: &str) -> ProbeResult {
        if let Some(result) = self.manifest_probe(url).await {
            debug!("Manifest probe settled {url}: {:?}", result.resolution);
            return result;
        }

        let Some(ffprobe) = &self.ffprobe else {
            debug!("{}: no introspection tool, reporting unknown quality", url);
            return ProbeResult::unknown_quality();
        };

        let compact = match self.run_ffprobe(ffprobe, url, "csv=p=0").await {
            Ok(output) => output,
            Err(e) => {
                debug!("Compact probe failed {url}: {e}");
                return ProbeResult::unknown_quality();
            }
        };

        if let Some(stderr) = non_empty(&compact.stderr) {
            debug!("ffprobe stderr for {url}: {stderr}");
        }

        // The verbose retry only fires when the compact run printed nothing
        // at all; garbled-but-present output goes through the row fallbacks.
        if let Some(stdout) = non_empty(&compact.stdout) {
            return parse_compact_report(&stdout).unwrap_or_else(ProbeResult::unknown_quality);
        }

        debug!(
            "Compact probe printed nothing for {url} (exit {}), retrying with structured report",
            compact.status
        );
        let verbose = match self.run_ffprobe(ffprobe, url, "json").await {
            Ok(output) => output,
            Err(e) => {
                debug!("Verbose probe failed {url}: {e}");
                return ProbeResult::unknown_quality();
            }
        };

        non_empty(&verbose.stdout)
            .and_then(|stdout| serde_json::from_str::<Value>(&stdout).ok())
            .and_then(|data| parse_verbose_report(&data))
            .unwrap_or_else(ProbeResult::unknown_quality)
    }

    /// Stage 1: fetch and parse the stream manifest directly.
    ///
    /// Only a variant (master) playlist settles the chain: its best variant
    /// resolution is reported with assumed-good defaults, and a variant
    /// playlist without resolutions is an explicit "parsed, no resolution"
    /// result. A media playlist or a parse failure falls through to ffprobe.
    async fn manifest_probe(&self, url: &str) -> Option<ProbeResult> {
        let fetch = self.client.get(url).send();
        let timeout = Duration::from_secs(self.config.process_timeout_secs);
        let response = tokio::time::timeout(timeout, fetch).await.ok()?.ok()?;
        let body = tokio::time::timeout(timeout, response.bytes())
            .await
            .ok()?
            .ok()?;

        match m3u8_rs::parse_playlist_res(&body).ok()? {
            HlsPlaylist::MasterPlaylist(master) => {
                let best = master
                    .variants
                    .iter()
                    .filter_map(|v| v.resolution)
                    .max_by_key(|r| (r.width, r.height));

                Some(ProbeResult {
                    reachable: true,
                    resolution: best.map(|r| Resolution {
                        width: r.width as u32,
                        height: r.height as u32,
                    }),
                    bitrate_kbps: None,
                    // Assumed-good defaults for a successfully parsed
                    // manifest, not measurements.
                    delay: StreamDelay::Realtime,
                    buffer_health: BufferHealth::Good,
                    throughput: None,
                })
            }
            HlsPlaylist::MediaPlaylist(_) => None,
        }
    }

    async fn run_ffprobe(
        &self,
        ffprobe: &PathBuf,
        url: &str,
        output_format: &str,
    ) -> ProbeResultOr<Output> {
        let io_timeout = self.config.io_timeout_us.to_string();
        let probe_size = self.config.probe_size_bytes.to_string();
        let analyze_duration = self.config.analyze_duration_us.to_string();
        let mut cmd = Command::new(ffprobe);
        cmd.args([
            "-v",
            "warning",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height,bit_rate,avg_bit_rate,start_time,duration,codec_time_base",
            "-show_entries",
            "format=bit_rate,start_time,duration,probe_score",
            "-of",
            output_format,
            "-timeout",
            &io_timeout,
            "-reconnect",
            "1",
            "-reconnect_delay_max",
            "3",
            "-reconnect_at_eof",
            "1",
            "-probesize",
            &probe_size,
            "-analyzeduration",
            &analyze_duration,
            "-rw_timeout",
            &io_timeout,
            "-max_delay",
            &io_timeout,
            url,
        ])
        .stdin(std::process::Stdio::null())
        .kill_on_drop(true);

        let budget = Duration::from_secs(self.config.process_timeout_secs);
        match tokio::time::timeout(budget, cmd.output()).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ProbeError::tool_unavailable(ffprobe.display().to_string()))
            }
            Ok(Err(e)) => Err(ProbeError::Timeout {
                url: format!("{url}: {e}"),
                seconds: self.config.process_timeout_secs,
            }),
            Err(_) => Err(ProbeError::timeout(url, self.config.process_timeout_secs)),
        }
    }

    /// Optional throughput sample: stream the body for the configured window
    /// and report average KB/s. Any failure simply yields `None`.
    pub async fn sample_throughput(&self, url: &str) -> Option<ThroughputSample> {
        let window = Duration::from_secs(self.config.throughput_duration_secs);
        let connect_timeout = Duration::from_secs(15);

        let started = Instant::now();
        let response = tokio::time::timeout(connect_timeout, self.client.get(url).send())
            .await
            .ok()?
            .ok()?;

        let mut stream = response.bytes_stream();
        let mut bytes_sampled: u64 = 0;

        loop {
            let remaining = match window.checked_sub(started.elapsed()) {
                Some(d) if !d.is_zero() => d,
                _ => break,
            };
            match tokio::time::timeout(remaining, stream.next()).await {
                Ok(Some(Ok(chunk))) => bytes_sampled += chunk.len() as u64,
                Ok(Some(Err(e))) => {
                    debug!("Throughput sample aborted {url}: {e}");
                    break;
                }
                Ok(None) | Err(_) => break,
            }
        }

        let duration_secs = started.elapsed().as_secs_f64();
        if duration_secs <= 0.0 {
            return None;
        }

        Some(ThroughputSample {
            kbytes_per_sec: bytes_sampled as f64 / duration_secs / 1024.0,
            bytes_sampled,
            duration_secs,
        })
    }
}

fn non_empty(raw: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(raw).trim().to_string();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Bitrate fields use `N/A` and `0` as "not available" sentinels; both are
/// absent, not zero.
fn parse_bitrate(field: &str) -> Option<i64> {
    let trimmed = field.trim();
    if trimmed.is_empty() || trimmed == "N/A" || trimmed == "0" {
        return None;
    }
    trimmed.parse::<f64>().ok().map(|b| b as i64)
}

fn parse_start_time(field: &str) -> StreamDelay {
    let trimmed = field.trim();
    if trimmed.is_empty() || trimmed == "N/A" {
        return StreamDelay::Unknown;
    }
    match trimmed.parse::<f64>() {
        Ok(start_time) => StreamDelay::from_start_time(start_time),
        Err(_) => StreamDelay::Unknown,
    }
}

fn parse_probe_score(field: &str) -> BufferHealth {
    let trimmed = field.trim();
    if trimmed.is_empty() || trimmed == "N/A" {
        return BufferHealth::Unknown;
    }
    BufferHealth::from_probe_score(trimmed.parse::<f64>().ok())
}

fn is_numeric(field: &str) -> bool {
    !field.is_empty() && field.chars().all(|c| c.is_ascii_digit())
}

/// Parse the compact (CSV) report.
///
/// Row classification: a row with >= 5 comma-separated fields whose first two
/// are purely numeric is the stream row; otherwise a row with >= 4 fields is
/// the format row. With no qualifying stream row the first row stands in; with
/// no qualifying format row the last row does (when more than one exists).
/// Returns `Some` only if a resolution was extracted.
fn parse_compact_report(output: &str) -> Option<ProbeResult> {
    let rows: Vec<&str> = output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    if rows.is_empty() {
        return None;
    }

    let mut stream_fields: Option<Vec<&str>> = None;
    let mut format_fields: Option<Vec<&str>> = None;

    for row in &rows {
        let fields: Vec<&str> = row.split(',').map(str::trim).collect();
        if fields.len() >= 5 {
            if is_numeric(fields[0]) && is_numeric(fields[1]) {
                stream_fields = Some(fields);
            }
        } else if fields.len() >= 4 {
            format_fields = Some(fields);
        }
    }

    let stream_fields = stream_fields
        .unwrap_or_else(|| rows[0].split(',').map(str::trim).collect::<Vec<&str>>());
    let format_fields = format_fields.or_else(|| {
        if rows.len() > 1 {
            Some(rows[rows.len() - 1].split(',').map(str::trim).collect())
        } else {
            None
        }
    });

    if stream_fields.len() < 2 || !is_numeric(stream_fields[0]) || !is_numeric(stream_fields[1]) {
        return None;
    }
    let resolution = Resolution {
        width: stream_fields[0].parse().ok()?,
        height: stream_fields[1].parse().ok()?,
    };

    // Stream-level instantaneous bitrate wins over the container total.
    let stream_bitrate = stream_fields.get(4).and_then(|f| parse_bitrate(f));
    let format_bitrate = format_fields
        .as_ref()
        .and_then(|f| f.get(2))
        .and_then(|f| parse_bitrate(f));
    let bitrate_kbps = stream_bitrate.or(format_bitrate).map(|b| b / 1000);

    let delay = stream_fields
        .get(2)
        .map(|f| parse_start_time(f))
        .unwrap_or(StreamDelay::Unknown);

    let buffer_health = format_fields
        .as_ref()
        .and_then(|f| f.get(3))
        .map(|f| parse_probe_score(f))
        .unwrap_or(BufferHealth::Unknown);

    Some(ProbeResult {
        reachable: true,
        resolution: Some(resolution),
        bitrate_kbps,
        delay,
        buffer_health,
        throughput: None,
    })
}

/// ffprobe's JSON report mixes numbers and numeric strings across versions.
fn field_as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Parse the verbose (JSON) report.
///
/// Resolution comes from the first video stream reporting width and height;
/// bitrate from the first video stream with an instantaneous rate, else the
/// first with an average rate, else the container total. Returns `Some` only
/// if a resolution was extracted.
fn parse_verbose_report(data: &Value) -> Option<ProbeResult> {
    let empty = Vec::new();
    let streams = data["streams"].as_array().unwrap_or(&empty);
    let video_streams: Vec<&Value> = streams
        .iter()
        .filter(|s| s["codec_type"].as_str() == Some("video"))
        .collect();

    let with_resolution = video_streams
        .iter()
        .find(|s| s["width"].as_u64().is_some() && s["height"].as_u64().is_some())?;
    let resolution = Resolution {
        width: with_resolution["width"].as_u64()? as u32,
        height: with_resolution["height"].as_u64()? as u32,
    };

    let stream_bitrate = video_streams
        .iter()
        .filter_map(|s| field_as_string(&s["bit_rate"]))
        .find_map(|b| parse_bitrate(&b))
        .or_else(|| {
            video_streams
                .iter()
                .filter_map(|s| field_as_string(&s["avg_bit_rate"]))
                .find_map(|b| parse_bitrate(&b))
        });
    let format_bitrate =
        field_as_string(&data["format"]["bit_rate"]).and_then(|b| parse_bitrate(&b));
    let bitrate_kbps = stream_bitrate.or(format_bitrate).map(|b| b / 1000);

    let delay = video_streams
        .iter()
        .filter_map(|s| field_as_string(&s["start_time"]))
        .next()
        .or_else(|| field_as_string(&data["format"]["start_time"]))
        .map(|t| parse_start_time(&t))
        .unwrap_or(StreamDelay::Unknown);

    let buffer_health = field_as_string(&data["format"]["probe_score"])
        .map(|s| parse_probe_score(&s))
        .unwrap_or(BufferHealth::Unknown);

    Some(ProbeResult {
        reachable: true,
        resolution: Some(resolution),
        bitrate_kbps,
        delay,
        buffer_health,
        throughput: None,
    })
}
