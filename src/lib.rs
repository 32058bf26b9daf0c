//! # buch-lasttest
//!
//! Constant-throughput load generator for the Buch REST API.
//!
//! A fixed population of virtual users repeatedly picks one of three
//! weighted request templates (lookup by ID, title-substring search, ISBN
//! search) and issues one GET per literal value of that template, in order.
//! Each user is capped at a configurable number of iterations per second.
//!
//! ```no_run
//! use buch_lasttest::loadtest::config::LoadTestConfig;
//! use buch_lasttest::loadtest::engine::LoadTestEngine;
//!
//! # async fn example() -> Result<(), buch_lasttest::loadtest::error::LoadTestError> {
//! let engine = LoadTestEngine::new(
//!     LoadTestConfig::buch_profile(),
//!     "https://localhost:3000".to_string(),
//! );
//! let result = engine.run().await?;
//! println!("{} requests", result.snapshot.total_requests);
//! # Ok(())
//! # }
//! ```

pub mod loadtest;
