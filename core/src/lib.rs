//! Survey intake core
//!
//! Collects multi-step survey answers from clients that start out anonymous
//! and later associates them with a stable identity:
//! - Validates answers against an immutable option catalog
//! - Upserts one response record per session with partial-update semantics
//! - Links sessions to identities and merges several sessions into one record
//! - Aggregates population histograms over identified records
//!
//! Persistence is a pooled SQLite store; every multi-step mutation runs in a
//! single write transaction.

#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod analytics;
pub mod catalog;
pub mod config;
pub mod db;
pub mod errors;
pub mod merge;
pub mod model;
pub mod responses;
pub mod service;
pub mod sessions;
pub mod validate;

pub use analytics::{AnalyticsAggregator, AnalyticsReport};
pub use catalog::{ChoiceField, FREE_TEXT_PREFIX, OptionCatalog};
pub use config::{AnalyticsConfig, CountMode, IntakeConfig, StoreConfig};
pub use db::{RecordStore, SqliteStore, StoreCounts, StoreTx};
pub use errors::{ErrorKind, IntakeError, Result};
pub use merge::{MergeEngine, MergeReport};
pub use model::{Answers, Identity, ResponseRecord, Session, SessionId, SessionStatus};
pub use responses::ResponseManager;
pub use service::{HealthReport, IntakeService};
pub use sessions::SessionManager;
pub use validate::{ResponseValidator, ValidationError};

/// Intake core version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
