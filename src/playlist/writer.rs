//! Playlist serialization
//!
//! Emits header directives verbatim, then each surviving channel's retained
//! lines in final ranking order.

use std::path::Path;
use tracing::info;

use crate::errors::CuratorResult;
use crate::models::Playlist;

pub struct PlaylistWriter;

impl PlaylistWriter {
    /// Render the playlist back to text, one line per entry, using the
    /// terminator convention recorded at parse time.
    pub fn render(playlist: &Playlist) -> String {
        let ending = playlist.line_ending.as_str();
        let mut output = String::new();

        for line in &playlist.header_lines {
            output.push_str(line);
            output.push_str(ending);
        }

        for channel in &playlist.channels {
            for line in &channel.source_lines {
                output.push_str(line);
                output.push_str(ending);
            }
        }

        if !playlist.trailing_newline && output.ends_with(ending) {
            output.truncate(output.len() - ending.len());
        }

        output
    }

    /// Render and save to the output path.
    pub fn write_file(playlist: &Playlist, path: &Path) -> CuratorResult<()> {
        let content = Self::render(playlist);
        std::fs::write(path, content)?;
        info!(
            "Wrote {} channels to {}",
            playlist.channels.len(),
            path.display()
        );
        Ok(())
    }
}
