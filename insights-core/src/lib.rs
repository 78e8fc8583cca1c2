//! # insights-core
//!
//! Ranked, time-windowed activity insights for a collaboration workspace.
//!
//! This library provides:
//! - Time range resolution on the caller's local calendar
//! - Ranked, paginated top reactions, channels, threads and new team members
//! - Zero-filled per-channel post-count series
//! - A SQLite activity store implementing the data-source contract
//! - Configuration management and logging infrastructure
//!
//! ## Architecture
//!
//! A query flows through three steps:
//! - **Window:** a range token plus timezone becomes a start instant ([`window`])
//! - **Source:** an [`ActivitySource`] returns ranked rows and raw bucket counts
//! - **Shape:** rows are paginated ([`ranking`]) and series zero-filled ([`series`])
//!
//! ## Example
//!
//! ```rust,no_run
//! use insights_core::{Config, Database, InsightsEngine, Scope, TimeRange};
//!
//! let config = Config::load().expect("failed to load config");
//! let db = Database::open(&config.database_path()).expect("failed to open database");
//! db.migrate().expect("failed to run migrations");
//!
//! let engine = InsightsEngine::new(db);
//! let window = insights_core::window::resolve(TimeRange::Last7Days, chrono_tz::UTC, chrono::Utc::now());
//! let opts = window.query_options(0, 10).expect("valid paging");
//! let scope = Scope::team("team1").expect("valid team id");
//! let channels = engine.top_channels(&scope, &window, &opts).expect("query failed");
//! println!("{}", insights_core::transport::to_json(&channels).unwrap());
//! ```

// Re-export commonly used items at the crate root
pub use config::Config;
pub use db::Database;
pub use engine::{InsightsEngine, TopChannelList};
pub use error::{Error, ErrorKind, Result};
pub use series::{BucketCount, ChannelPostCountSeries};
pub use source::ActivitySource;
pub use timezone::UserTimezone;
pub use transport::ErrorResponse;
pub use types::*;
pub use window::{Granularity, ResolvedWindow, TimeRange};

// Public modules
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod logging;
pub mod ranking;
pub mod series;
pub mod source;
pub mod timezone;
pub mod transport;
pub mod types;
pub mod window;
