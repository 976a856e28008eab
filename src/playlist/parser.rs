//! Playlist parsing
//!
//! Decomposes raw playlist text into channel records while keeping every
//! original line verbatim: filtering decisions belong to the selection engine,
//! never to the parser. Tolerant of missing `#EXTM3U` headers, non-standard
//! attributes and GBK-encoded files.

use regex::Regex;
use std::path::Path;
use tracing::{debug, info};

use crate::errors::{CuratorError, CuratorResult};
use crate::models::{Channel, LineEnding, Playlist, ProbeResult};

/// Protocol allow-list for URL-shaped lines.
const URL_PREFIXES: &[&str] = &[
    "http://", "https://", "rtmp://", "rtsp://", "mms://", "udp://", "rtp://", "srt://",
];

/// Whether a playlist line is a candidate stream locator.
pub fn is_stream_url(line: &str) -> bool {
    let trimmed = line.trim();
    URL_PREFIXES.iter().any(|p| trimmed.starts_with(p))
}

/// Decode playlist bytes: UTF-8 first, then a GBK retry for files saved by
/// regional editors. Both failing is fatal.
pub fn decode_playlist(bytes: &[u8], path: &Path) -> CuratorResult<String> {
    if let Ok(text) = std::str::from_utf8(bytes) {
        return Ok(text.to_string());
    }

    debug!("{} is not UTF-8, retrying as GBK", path.display());
    let (decoded, _, had_errors) = encoding_rs::GBK.decode(bytes);
    if had_errors {
        Err(CuratorError::UnreadableFile {
            path: path.to_path_buf(),
        })
    } else {
        Ok(decoded.into_owned())
    }
}

/// Dominant line terminator of the file: CRLF wins when at least half the
/// newlines carry a carriage return.
fn detect_line_ending(content: &str) -> LineEnding {
    let total = content.matches('\n').count();
    let crlf = content.matches("\r\n").count();
    if total > 0 && crlf * 2 >= total {
        LineEnding::CrLf
    } else {
        LineEnding::Lf
    }
}

pub struct PlaylistParser {
    attr_regex: Regex,
    duration_regex: Regex,
}

impl PlaylistParser {
    pub fn new() -> Self {
        Self {
            attr_regex: Regex::new(r#"([A-Za-z0-9_-]+)="([^"]*)""#).unwrap(),
            duration_regex: Regex::new(r"^#EXTINF:(-?\d+)").unwrap(),
        }
    }

    /// Parse playlist text into a [`Playlist`].
    ///
    /// Lines before the first `#EXTINF:` accumulate as the header. A channel
    /// with zero URLs is still retained so the writer can round-trip it.
    pub fn parse(&self, content: &str) -> Playlist {
        let mut playlist = Playlist::default();
        playlist.line_ending = detect_line_ending(content);
        playlist.trailing_newline = content.is_empty() || content.ends_with('\n');
        let mut current: Option<Channel> = None;

        for line in content.lines() {
            let stripped = line.trim();

            if stripped.starts_with("#EXTINF:") {
                if let Some(channel) = current.take() {
                    playlist.channels.push(channel);
                }
                let mut channel = self.parse_extinf_line(stripped);
                channel.source_lines.push(line.to_string());
                current = Some(channel);
            } else if let Some(channel) = current.as_mut() {
                if is_stream_url(stripped) {
                    channel.urls.push(stripped.to_string());
                    channel.probes.push(ProbeResult::skipped());
                }
                channel.source_lines.push(line.to_string());
            } else {
                playlist.header_lines.push(line.to_string());
            }
        }

        if let Some(channel) = current.take() {
            playlist.channels.push(channel);
        }

        info!(
            "Parsed {} channels with {} candidate URLs",
            playlist.channels.len(),
            playlist.total_urls()
        );
        playlist
    }

    /// Parse one `#EXTINF:` metadata line.
    ///
    /// Every attribute is independently optional: a missing attribute is an
    /// empty string, never an error.
    fn parse_extinf_line(&self, line: &str) -> Channel {
        let mut channel = Channel::new();
        channel.extinf_line = line.to_string();

        if let Some(captures) = self.duration_regex.captures(line) {
            if let Ok(duration) = captures[1].parse() {
                channel.duration = duration;
            }
        }

        // Display name is everything after the last comma.
        if let Some(comma_pos) = line.rfind(',') {
            channel.display_name = line[comma_pos + 1..].trim().to_string();
        }

        for captures in self.attr_regex.captures_iter(line) {
            let key = &captures[1];
            let value = captures[2].to_string();
            match key {
                "tvg-id" => channel.tvg_id = value,
                "tvg-name" => channel.tvg_name = value,
                "tvg-logo" => channel.tvg_logo = value,
                "group-title" => channel.group_title = value,
                _ => channel.extra_attrs.push((key.to_string(), value)),
            }
        }

        channel
    }
}

impl Default for PlaylistParser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "#EXTM3U x-tvg-url=\"epg.xml\"\n\
#EXTINF:-1 tvg-id=\"cctv1\" tvg-name=\"CCTV1\" tvg-logo=\"http://logo/1.png\" group-title=\"🌐央视频道\" catchup=\"append\",CCTV1 综合\n\
http://example.com/cctv1/index.m3u8\n\
# backup source\n\
http://backup.example.com/cctv1.m3u8\n\
#EXTINF:-1,Bare Channel\n\
rtsp://example.com/bare\n\
#EXTINF:-1 group-title=\"其他\",No Sources\n";

    #[test]
    fn header_and_channel_split() {
        let playlist = PlaylistParser::new().parse(SAMPLE);
        assert_eq!(
            playlist.header_lines,
            vec!["#EXTM3U x-tvg-url=\"epg.xml\""]
        );
        assert_eq!(playlist.channels.len(), 3);
    }

    #[test]
    fn extinf_attributes_are_independently_optional() {
        let playlist = PlaylistParser::new().parse(SAMPLE);

        let cctv = &playlist.channels[0];
        assert_eq!(cctv.display_name, "CCTV1 综合");
        assert_eq!(cctv.tvg_id, "cctv1");
        assert_eq!(cctv.tvg_name, "CCTV1");
        assert_eq!(cctv.group_title, "🌐央视频道");
        assert_eq!(cctv.duration, -1);
        assert_eq!(
            cctv.extra_attrs,
            vec![("catchup".to_string(), "append".to_string())]
        );

        let bare = &playlist.channels[1];
        assert_eq!(bare.display_name, "Bare Channel");
        assert_eq!(bare.tvg_id, "");
        assert_eq!(bare.group_title, "");
    }

    #[test]
    fn url_count_matches_url_shaped_source_lines() {
        let playlist = PlaylistParser::new().parse(SAMPLE);
        for channel in &playlist.channels {
            let url_lines = channel
                .source_lines
                .iter()
                .filter(|l| is_stream_url(l))
                .count();
            assert_eq!(url_lines, channel.urls.len());
            assert_eq!(channel.probes.len(), channel.urls.len());
        }
    }

    #[test]
    fn comments_survive_in_position() {
        let playlist = PlaylistParser::new().parse(SAMPLE);
        assert_eq!(playlist.channels[0].source_lines[2], "# backup source");
    }

    #[test]
    fn zero_url_channel_is_retained() {
        let playlist = PlaylistParser::new().parse(SAMPLE);
        let empty = &playlist.channels[2];
        assert_eq!(empty.display_name, "No Sources");
        assert!(empty.urls.is_empty());
        assert_eq!(empty.source_lines.len(), 1);
    }

    #[test]
    fn non_http_protocols_recognized() {
        assert!(is_stream_url("rtmp://host/app/stream"));
        assert!(is_stream_url("udp://239.0.0.1:1234"));
        assert!(is_stream_url("srt://host:9000"));
        assert!(!is_stream_url("#EXTVLCOPT:network-caching=1000"));
        assert!(!is_stream_url("file:///tmp/local.ts"));
    }

    #[test]
    fn gbk_fallback_decode() {
        let (gbk_bytes, _, _) = encoding_rs::GBK.encode("#EXTINF:-1,央视一套\n");
        let text = decode_playlist(&gbk_bytes, Path::new("legacy.m3u")).unwrap();
        assert!(text.contains("央视一套"));
    }

    #[test]
    fn undecodable_bytes_are_fatal() {
        // 0x81 0x00 is invalid in both UTF-8 and GBK.
        let result = decode_playlist(&[0x81, 0x00, 0xff], Path::new("bad.m3u"));
        assert!(matches!(
            result,
            Err(CuratorError::UnreadableFile { .. })
        ));
    }
}
