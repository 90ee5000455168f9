//! # snowflake-migrate
//!
//! Idempotent Snowflake-to-Snowflake migration driven by a JSON-lines mapping.
//!
//! This library provides the core functionality for:
//!
//! - **Database creation** with ownership and read-only grants
//! - **Schema and table copies** via create-table-as-select
//! - **Bounded concurrency** at database, schema and table level
//! - **Reruns** that skip targets already in place
//! - **Database merges** by zero-copy schema clones
//!
//! ## Example
//!
//! ```rust,no_run
//! use snowflake_migrate::{Config, MappingFile, Orchestrator};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load("config.yaml")?;
//!     let mapping = MappingFile::load("mapping.jsonl")?;
//!     let orchestrator = Orchestrator::new(config)?;
//!     for summary in orchestrator.migrate(&mapping).await {
//!         println!("{}: {} done, {} skipped", summary.phase, summary.counts.done, summary.counts.skipped);
//!     }
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod config;
pub mod error;
pub mod mapping;
pub mod oracle;
pub mod orchestrator;
pub mod outcome;
pub mod runner;
pub mod sql;
pub mod warehouse;
pub mod work;

// Re-exports for convenient access
pub use catalog::MergePlan;
pub use config::{Config, ConfigOverrides, MigrationConfig, TokenType, WarehouseConfig};
pub use error::{MigrateError, Result};
pub use mapping::{MappingFile, SchemaMapping, SchemaPath, TableMapping};
pub use orchestrator::{HealthCheckResult, Orchestrator, Scheduler, WorkerPool};
pub use outcome::{OutcomeCounts, OutcomeSummary, RunSummary, UnitOutcome};
pub use warehouse::{Connection, Connector, Row, SnowflakeConnector};
pub use work::{ExistenceCheck, WorkUnit};
