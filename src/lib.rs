pub mod config;
pub mod errors;
pub mod models;
pub mod playlist;
pub mod probe;
pub mod ranking;
