//! Centralized error handling for the playlist curator
//!
//! Fatal run-level conditions live in [`CuratorError`]; per-URL probe failures
//! live in [`ProbeError`] and are absorbed inside the probe layer rather than
//! propagated.

pub mod types;

pub use types::*;

/// Convenience type alias for Results using CuratorError
pub type CuratorResult<T> = Result<T, CuratorError>;

/// Convenience type alias for probe-layer Results
pub type ProbeResultOr<T> = Result<T, ProbeError>;
