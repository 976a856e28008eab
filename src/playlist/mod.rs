//! Playlist decomposition and reassembly.

pub mod parser;
pub mod writer;

pub use parser::{decode_playlist, is_stream_url, PlaylistParser};
pub use writer::PlaylistWriter;
