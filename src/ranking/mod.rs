//! Selection, dedup and ranking
//!
//! Turns per-URL probe facts into the final playlist: category
//! deletion/canonicalization, the keep predicate, dedup-by-identity with a
//! per-identity cap, and the group-priority ordering with numeric sub-ordering
//! for numbered channel families.

use regex::Regex;
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::{debug, info};

use crate::config::SelectionConfig;
use crate::models::{Channel, Playlist};
use crate::playlist::is_stream_url;

pub struct SelectionRankingEngine<'a> {
    config: &'a SelectionConfig,
    group_title_regex: Regex,
    family_regex: Regex,
}

impl<'a> SelectionRankingEngine<'a> {
    pub fn new(config: &'a SelectionConfig) -> Self {
        let family_pattern = format!(
            r"(?i)^{}-?([0-9]+)",
            regex::escape(&config.family_prefix)
        );
        Self {
            config,
            group_title_regex: Regex::new(r#"group-title="[^"]*""#).unwrap(),
            family_regex: Regex::new(&family_pattern).unwrap(),
        }
    }

    /// Apply the full selection pipeline in place:
    /// category remap -> keep predicate -> dedup/cap -> final ordering.
    pub fn apply(&self, playlist: &mut Playlist) {
        let before = playlist.channels.len();

        self.remap_categories(playlist);
        self.trim_to_valid(playlist);
        self.dedup_and_cap(playlist);

        playlist
            .channels
            .sort_by(|a, b| self.order_key(a).cmp(&self.order_key(b)));

        info!(
            "Selection kept {} of {} channels",
            playlist.channels.len(),
            before
        );
    }

    /// Drop deleted categories wholesale and canonicalize renamed ones,
    /// patching the stored `#EXTINF` line so the output stays consistent.
    fn remap_categories(&self, playlist: &mut Playlist) {
        playlist
            .channels
            .retain(|c| !self.config.deleted_groups.contains(&c.group_title));

        for channel in &mut playlist.channels {
            let Some(new_title) = self.config.group_renames.get(&channel.group_title) else {
                continue;
            };
            debug!(
                "Remapping group {} -> {} for {}",
                channel.group_title, new_title, channel.display_name
            );
            let replacement = format!("group-title=\"{new_title}\"");
            channel.extinf_line = self
                .group_title_regex
                .replace(&channel.extinf_line, replacement.as_str())
                .into_owned();
            if let Some(line) = channel
                .source_lines
                .iter_mut()
                .find(|l| l.trim_start().starts_with("#EXTINF:"))
            {
                *line = self
                    .group_title_regex
                    .replace(line, replacement.as_str())
                    .into_owned();
            }
            channel.group_title = new_title.clone();
        }
    }

    /// Keep only URLs that passed the probe predicate; drop channels left
    /// with none. Non-URL lines always survive, in their original positions.
    fn trim_to_valid(&self, playlist: &mut Playlist) {
        for channel in &mut playlist.channels {
            let valid: Vec<bool> = channel.probes.iter().map(|p| p.is_valid()).collect();

            let mut url_idx = 0;
            channel.source_lines.retain(|line| {
                if is_stream_url(line) {
                    let keep = valid.get(url_idx).copied().unwrap_or(false);
                    url_idx += 1;
                    keep
                } else {
                    true
                }
            });

            let mut keep_iter = valid.iter();
            channel.urls.retain(|_| *keep_iter.next().unwrap_or(&false));
            let mut keep_iter = valid.iter();
            channel.probes.retain(|_| *keep_iter.next().unwrap_or(&false));
        }

        playlist.channels.retain(|c| !c.urls.is_empty());
    }

    /// Group by identity key and keep at most the configured cap per group,
    /// best-ranked first. Group encounter order is preserved.
    fn dedup_and_cap(&self, playlist: &mut Playlist) {
        let mut order: Vec<String> = Vec::new();
        let mut groups: HashMap<String, Vec<Channel>> = HashMap::new();

        for channel in playlist.channels.drain(..) {
            let key = channel.identity_key().to_string();
            if !groups.contains_key(&key) {
                order.push(key.clone());
            }
            groups.entry(key).or_default().push(channel);
        }

        for key in order {
            let Some(mut members) = groups.remove(&key) else {
                continue;
            };
            members.sort_by(|a, b| self.rank_cmp(a, b));
            if members.len() > self.config.max_per_identity {
                debug!(
                    "Capping {} entries for {} at {}",
                    members.len(),
                    key,
                    self.config.max_per_identity
                );
                members.truncate(self.config.max_per_identity);
            }
            playlist.channels.extend(members);
        }
    }

    fn priority(&self, channel: &Channel) -> u32 {
        self.config
            .group_priority
            .get(&channel.group_title)
            .copied()
            .unwrap_or(self.config.unranked_priority)
    }

    /// Speed component of the ranking key. Samples longer than 10 seconds
    /// contribute 0 instead of their real speed; intentional, pending
    /// product confirmation.
    fn ranking_speed(&self, channel: &Channel) -> f64 {
        match channel.best_throughput() {
            Some(sample) if sample.duration_secs > 10.0 => 0.0,
            Some(sample) => sample.kbytes_per_sec,
            None => 0.0,
        }
    }

    /// Best-first comparison: group priority, then resolution (descending,
    /// width before height), then download speed (descending). Stable sorts
    /// keep relative input order on full ties.
    fn rank_cmp(&self, a: &Channel, b: &Channel) -> Ordering {
        let resolution = |c: &Channel| {
            c.best_resolution()
                .map(|r| (r.width, r.height))
                .unwrap_or((0, 0))
        };
        self.priority(a)
            .cmp(&self.priority(b))
            .then_with(|| resolution(b).cmp(&resolution(a)))
            .then_with(|| self.ranking_speed(b).total_cmp(&self.ranking_speed(a)))
    }

    /// Final output ordering: priority bucket, then group title, with
    /// numbered-family channels first in their bucket and sorted by the
    /// extracted number rather than lexicographically.
    fn order_key(&self, channel: &Channel) -> (u32, String, u8, i64, String) {
        let name = channel.display_name.clone();
        match self.family_number(&channel.display_name) {
            Some(num) => (
                self.priority(channel),
                channel.group_title.clone(),
                0,
                num,
                name,
            ),
            None => (
                self.priority(channel),
                channel.group_title.clone(),
                1,
                0,
                name,
            ),
        }
    }

    fn family_number(&self, name: &str) -> Option<i64> {
        self.family_regex
            .captures(name)
            .and_then(|c| c[1].parse().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SelectionConfig;
    use crate::models::{BufferHealth, ProbeResult, Resolution, StreamDelay, ThroughputSample};

    fn valid_probe(width: u32, height: u32) -> ProbeResult {
        ProbeResult {
            reachable: true,
            resolution: Some(Resolution { width, height }),
            bitrate_kbps: Some(4000),
            delay: StreamDelay::Realtime,
            buffer_health: BufferHealth::Good,
            throughput: None,
        }
    }

    fn channel(name: &str, group: &str, probes: Vec<ProbeResult>) -> Channel {
        let extinf = format!(
            "#EXTINF:-1 tvg-name=\"{name}\" group-title=\"{group}\",{name}"
        );
        let mut source_lines = vec![extinf.clone()];
        let mut urls = Vec::new();
        for (i, _) in probes.iter().enumerate() {
            let url = format!("http://example.com/{name}/{i}.m3u8");
            source_lines.push(url.clone());
            urls.push(url);
        }
        Channel {
            display_name: name.to_string(),
            tvg_name: name.to_string(),
            group_title: group.to_string(),
            extinf_line: extinf,
            source_lines,
            urls,
            probes,
            ..Channel::new()
        }
    }

    fn playlist(channels: Vec<Channel>) -> Playlist {
        Playlist {
            header_lines: vec!["#EXTM3U".to_string()],
            channels,
            ..Playlist::default()
        }
    }

    #[test]
    fn invalid_urls_never_survive() {
        let config = SelectionConfig::default();
        let engine = SelectionRankingEngine::new(&config);

        let mut pl = playlist(vec![
            channel(
                "Mixed",
                "其他",
                vec![valid_probe(1920, 1080), ProbeResult::unknown_quality()],
            ),
            channel("AllBad", "其他", vec![ProbeResult::unreachable()]),
        ]);
        engine.apply(&mut pl);

        assert_eq!(pl.channels.len(), 1);
        let survivor = &pl.channels[0];
        assert_eq!(survivor.display_name, "Mixed");
        assert_eq!(survivor.urls.len(), 1);
        assert_eq!(survivor.urls[0], "http://example.com/Mixed/0.m3u8");
        // EXTINF line still present, bad URL line gone.
        assert_eq!(survivor.source_lines.len(), 2);
    }

    #[test]
    fn non_url_lines_keep_their_position() {
        let config = SelectionConfig::default();
        let engine = SelectionRankingEngine::new(&config);

        let mut ch = channel("C", "其他", vec![ProbeResult::unreachable(), valid_probe(1280, 720)]);
        ch.source_lines.insert(2, "# second source".to_string());
        let mut pl = playlist(vec![ch]);
        engine.apply(&mut pl);

        let survivor = &pl.channels[0];
        assert_eq!(
            survivor.source_lines,
            vec![
                survivor.extinf_line.clone(),
                "# second source".to_string(),
                "http://example.com/C/1.m3u8".to_string(),
            ]
        );
    }

    #[test]
    fn identity_cap_keeps_best_entries() {
        let config = SelectionConfig::default();
        let engine = SelectionRankingEngine::new(&config);

        let mut channels = Vec::new();
        for height in [360u32, 1080, 480, 720, 240, 2160, 144, 540] {
            channels.push(channel(
                "Dup",
                "其他",
                vec![valid_probe(height * 16 / 9, height)],
            ));
        }
        let mut pl = playlist(channels);
        engine.apply(&mut pl);

        assert_eq!(pl.channels.len(), 6);
        let heights: Vec<u32> = pl
            .channels
            .iter()
            .map(|c| c.best_resolution().unwrap().height)
            .collect();
        assert_eq!(heights, vec![2160, 1080, 720, 540, 480, 360]);
    }

    #[test]
    fn group_priority_dominates_resolution_and_speed() {
        let config = SelectionConfig::default();
        let engine = SelectionRankingEngine::new(&config);

        let mut pl = playlist(vec![
            channel("Sat", "📡卫视频道", vec![valid_probe(3840, 2160)]),
            channel("Cctv", "🌐央视频道", vec![valid_probe(640, 360)]),
        ]);
        engine.apply(&mut pl);

        assert_eq!(pl.channels[0].display_name, "Cctv");
        assert_eq!(pl.channels[1].display_name, "Sat");
    }

    #[test]
    fn numbered_family_sorts_numerically() {
        let config = SelectionConfig::default();
        let engine = SelectionRankingEngine::new(&config);

        let mut pl = playlist(vec![
            channel("CCTV3", "🌐央视频道", vec![valid_probe(1280, 720)]),
            channel("CCTV10", "🌐央视频道", vec![valid_probe(1280, 720)]),
            channel("CCTV1", "🌐央视频道", vec![valid_probe(1280, 720)]),
            channel("Zebra", "🌐央视频道", vec![valid_probe(1280, 720)]),
        ]);
        engine.apply(&mut pl);

        let names: Vec<&str> = pl.channels.iter().map(|c| c.display_name.as_str()).collect();
        assert_eq!(names, vec!["CCTV1", "CCTV3", "CCTV10", "Zebra"]);
    }

    #[test]
    fn deleted_groups_are_dropped_and_renames_patch_the_extinf_line() {
        let config = SelectionConfig::default();
        let engine = SelectionRankingEngine::new(&config);

        let mut pl = playlist(vec![
            channel("HK", "港澳台", vec![valid_probe(1920, 1080)]),
            channel("Sports", "体育赛事", vec![valid_probe(1920, 1080)]),
        ]);
        engine.apply(&mut pl);

        assert_eq!(pl.channels.len(), 1);
        let hk = &pl.channels[0];
        assert_eq!(hk.group_title, "💓港澳台📶");
        assert!(hk.extinf_line.contains("group-title=\"💓港澳台📶\""));
        assert!(hk.source_lines[0].contains("group-title=\"💓港澳台📶\""));
        assert!(!hk.extinf_line.contains("group-title=\"港澳台\""));
    }

    #[test]
    fn long_samples_rank_as_zero_speed() {
        let config = SelectionConfig::default();
        let engine = SelectionRankingEngine::new(&config);

        let fast_but_long = ThroughputSample {
            kbytes_per_sec: 900.0,
            bytes_sampled: 10_000_000,
            duration_secs: 12.0,
        };
        let slow_but_short = ThroughputSample {
            kbytes_per_sec: 100.0,
            bytes_sampled: 500_000,
            duration_secs: 5.0,
        };

        let mut a = channel("Speedy", "其他", vec![valid_probe(1280, 720)]);
        a.probes[0].throughput = Some(fast_but_long);
        let mut b = channel("Speedy", "其他", vec![valid_probe(1280, 720)]);
        b.probes[0].throughput = Some(slow_but_short);
        b.urls[0] = "http://example.com/Speedy/alt.m3u8".to_string();
        b.source_lines[1] = b.urls[0].clone();

        let mut pl = playlist(vec![a, b]);
        engine.apply(&mut pl);

        // Both share one identity; the short sample's real speed outranks the
        // long sample's zeroed one.
        assert_eq!(pl.channels.len(), 2);
        assert_eq!(
            pl.channels[0].urls[0],
            "http://example.com/Speedy/alt.m3u8"
        );
    }
}
