//! Migration orchestrator - main workflow coordinator.

pub mod pool;
mod scheduler;

pub use pool::WorkerPool;
pub use scheduler::Scheduler;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use crate::catalog::{self, MergePlan};
use crate::config::Config;
use crate::error::{MigrateError, Result};
use crate::mapping::MappingFile;
use crate::outcome::RunSummary;
use crate::sql;
use crate::warehouse::{Connection, Connector, SnowflakeConnector};
use crate::work::{self, WorkUnit};

/// Migration orchestrator.
pub struct Orchestrator {
    config: Config,
    connector: Arc<dyn Connector>,
}

/// Result of a health check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    /// Whether the warehouse answered.
    pub healthy: bool,

    /// Warehouse version reported by `CURRENT_VERSION()`.
    pub version: Option<String>,

    /// Round-trip latency in milliseconds.
    pub latency_ms: u64,

    /// Error message, if the check failed.
    pub error: Option<String>,
}

impl Orchestrator {
    /// Create an orchestrator talking to Snowflake.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let connector = SnowflakeConnector::new(&config.warehouse)?;
        Ok(Self::with_connector(config, Arc::new(connector)))
    }

    /// Create an orchestrator over any connector.
    pub fn with_connector(config: Config, connector: Arc<dyn Connector>) -> Self {
        Self { config, connector }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn mapping_in_scope(&self, mapping: &MappingFile) -> MappingFile {
        let excluded = &self.config.migration.exclude_databases;
        if !excluded.is_empty() {
            info!("Excluding databases: {}", excluded.join(", "));
        }
        mapping.clone().excluding(excluded)
    }

    /// Create every target database in the mapping (flat mode).
    pub async fn create_databases(&self, mapping: &MappingFile) -> RunSummary {
        let started_at = Utc::now();
        let units = work::database_units(&self.mapping_in_scope(mapping), &self.config.warehouse);
        info!("Phase: creating {} databases", units.len());

        let scheduler = Scheduler::new(
            self.connector.clone(),
            self.config.migration.get_database_workers(),
            1,
        );
        let summary = scheduler.run_flat(units).await;
        RunSummary::new("databases", started_at, &summary)
    }

    /// Create every target schema and copy its tables (nested mode).
    pub async fn create_tables(&self, mapping: &MappingFile) -> RunSummary {
        let started_at = Utc::now();
        let units = work::schema_units(&self.mapping_in_scope(mapping), &self.config.warehouse);
        info!("Phase: creating {} schemas", units.len());

        let scheduler = Scheduler::new(
            self.connector.clone(),
            self.config.migration.get_schema_workers(),
            self.config.migration.get_table_workers(),
        );
        let summary = scheduler.run_nested(units).await;
        RunSummary::new("tables", started_at, &summary)
    }

    /// Create databases, then schemas and tables.
    pub async fn migrate(&self, mapping: &MappingFile) -> Vec<RunSummary> {
        let databases = self.create_databases(mapping).await;
        if databases.counts.failed + databases.counts.error > 0 {
            warn!(
                "{} databases were not created; their schemas will report errors",
                databases.failed_units.len()
            );
        }
        let tables = self.create_tables(mapping).await;
        vec![databases, tables]
    }

    /// Build a mapping from a source database's `<DB>__<SCHEMA>` schemas.
    pub async fn generate_mapping(&self, source_database: &str) -> Result<MappingFile> {
        let conn = self.catalog_connection().await?;
        catalog::generate_mapping(
            conn.as_ref(),
            source_database,
            self.config.migration.get_delimiter(),
        )
        .await
    }

    /// Plan cloning every database's schemas into `output_database`.
    pub async fn plan_merge(&self, output_database: &str) -> Result<MergePlan> {
        let conn = self.catalog_connection().await?;
        catalog::plan_merge(
            conn.as_ref(),
            output_database,
            self.config.migration.get_delimiter(),
        )
        .await
    }

    /// Execute a merge plan: create the output database, then clone each
    /// source database's schemas (flat mode, one unit per source database).
    pub async fn apply_merge(&self, plan: &MergePlan) -> Result<RunSummary> {
        let started_at = Utc::now();
        let conn = self.catalog_connection().await?;
        conn.execute(&sql::create_database(&plan.output_database))
            .await?;

        let setup = sql::use_role(&self.config.warehouse.setup_role);
        let units: Vec<WorkUnit> = plan
            .units()
            .into_iter()
            .map(|unit| unit.with_session(vec![setup.clone()]))
            .collect();

        let scheduler = Scheduler::new(
            self.connector.clone(),
            self.config.migration.get_database_workers(),
            1,
        );
        let summary = scheduler.run_flat(units).await;
        Ok(RunSummary::new("merge", started_at, &summary))
    }

    /// Run `SELECT CURRENT_VERSION()` and report latency.
    pub async fn health_check(&self) -> HealthCheckResult {
        let start = Instant::now();
        let result = self.current_version().await;
        let latency_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(version) => HealthCheckResult {
                healthy: true,
                version,
                latency_ms,
                error: None,
            },
            Err(e) => HealthCheckResult {
                healthy: false,
                version: None,
                latency_ms,
                error: Some(e.to_string()),
            },
        }
    }

    async fn current_version(&self) -> Result<Option<String>> {
        let conn = self.connector.connect().await?;
        let rows = conn.execute(&sql::current_version()).await?;
        Ok(rows
            .first()
            .and_then(|row| row.get("current_version()"))
            .map(str::to_string))
    }

    async fn catalog_connection(&self) -> Result<Arc<dyn Connection>> {
        let conn = self.connector.connect().await?;
        conn.execute(&sql::use_role(&self.config.warehouse.setup_role))
            .await
            .map_err(|e| match e {
                MigrateError::Warehouse { statement, message } => MigrateError::warehouse(
                    statement,
                    format!("cannot assume setup role: {}", message),
                ),
                other => other,
            })?;
        Ok(conn)
    }
}
