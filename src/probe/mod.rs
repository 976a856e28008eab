//! Liveness and quality probing.

pub mod introspection;
pub mod orchestrator;
pub mod reachability;

pub use introspection::StreamIntrospectionProbe;
pub use orchestrator::ProbeOrchestrator;
pub use reachability::ReachabilityProbe;
