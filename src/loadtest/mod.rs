//! Load generation engine for the Buch REST API.
//!
//! Provides a typed TOML load profile, an HTTP client that tolerates
//! self-signed certificates, constant-throughput virtual users, error
//! classification, HdrHistogram-based metrics, and terminal/JSON reporting.

pub mod client;
pub mod config;
pub mod display;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod pacing;
pub mod report;
pub mod summary;
pub mod vu;
