//! Unit scheduling: flat and nested bounded concurrency.
//!
//! Flat mode runs each unit's statements in order on its own connection.
//! Nested mode creates the schema first, then runs the unit's independent
//! table statements through an inner pool sharing the unit's connection.
//! Both modes check existence before executing and map every unit to
//! exactly one [`UnitOutcome`].

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::pool::WorkerPool;
use crate::error::{MigrateError, Result};
use crate::oracle::{self, Presence};
use crate::outcome::{OutcomeSummary, UnitOutcome};
use crate::runner::{self, RunResult};
use crate::warehouse::{Connection, Connector};
use crate::work::WorkUnit;

/// Runs work units across bounded worker pools.
#[derive(Clone)]
pub struct Scheduler {
    connector: Arc<dyn Connector>,
    outer_width: usize,
    inner_width: usize,
}

impl Scheduler {
    /// `outer_width` bounds concurrent units; `inner_width` bounds concurrent
    /// table statements within one nested-mode unit.
    pub fn new(connector: Arc<dyn Connector>, outer_width: usize, inner_width: usize) -> Self {
        Self {
            connector,
            outer_width: outer_width.max(1),
            inner_width: inner_width.max(1),
        }
    }

    /// Run units with one sequential statement list each.
    pub async fn run_flat(&self, units: Vec<WorkUnit>) -> OutcomeSummary {
        self.run_all("flat", units, |connector, unit, _| async move {
            process_flat(connector, unit).await
        })
        .await
    }

    /// Run schema units, each fanning its table statements out to an inner pool.
    pub async fn run_nested(&self, units: Vec<WorkUnit>) -> OutcomeSummary {
        info!(
            "Nested scheduling: {} schema workers x {} table workers = {} concurrent statements",
            self.outer_width,
            self.inner_width,
            self.outer_width.saturating_mul(self.inner_width)
        );
        self.run_all("nested", units, |connector, unit, inner_width| async move {
            process_nested(connector, unit, inner_width).await
        })
        .await
    }

    async fn run_all<F, Fut>(&self, mode: &str, units: Vec<WorkUnit>, process: F) -> OutcomeSummary
    where
        F: Fn(Arc<dyn Connector>, WorkUnit, usize) -> Fut,
        Fut: std::future::Future<Output = Result<UnitOutcome>> + Send + 'static,
    {
        let total = units.len();
        let mut summary = OutcomeSummary::new();
        let mut pool = WorkerPool::new(format!("{} units", mode), self.outer_width);
        let mut seen = HashSet::new();

        info!("Scheduling {} units ({} mode, {} workers)", total, mode, pool.width());

        for unit in units {
            let id = unit.id.clone();
            if !seen.insert(id.clone()) {
                warn!("{}: duplicate unit id, not scheduled again", id);
                continue;
            }
            let task = process(self.connector.clone(), unit, self.inner_width);
            if let Err(e) = pool.submit(id.clone(), task).await {
                summary.record(&id, Err(e));
            }
        }

        for (id, result) in pool.drain().await {
            summary.record(&id, result.and_then(|r| r));
        }

        let counts = summary.counts();
        info!(
            "Processed {} units: {} done, {} skipped, {} failed, {} error",
            counts.total(),
            counts.done,
            counts.skipped,
            counts.failed,
            counts.error
        );
        summary
    }
}

/// Open a connection and run the unit's session statements on it.
async fn open_session(connector: &dyn Connector, unit: &WorkUnit) -> Result<Arc<dyn Connection>> {
    let conn = connector.connect().await?;
    for statement in &unit.session {
        conn.execute(statement).await?;
    }
    Ok(conn)
}

async fn presence(conn: &dyn Connection, unit: &WorkUnit) -> Result<Presence> {
    match &unit.existence_check {
        Some(check) => oracle::check(conn, check).await,
        None => Ok(Presence::Absent),
    }
}

async fn process_flat(connector: Arc<dyn Connector>, unit: WorkUnit) -> Result<UnitOutcome> {
    let conn = open_session(connector.as_ref(), &unit).await?;

    if presence(conn.as_ref(), &unit).await? == Presence::Complete {
        info!("{}: already exists, skipping", unit.id);
        return Ok(UnitOutcome::Skipped);
    }

    let outcome = match runner::run(conn.as_ref(), &unit.id, &unit.statements).await {
        RunResult::Done => UnitOutcome::Done,
        RunResult::Failed { .. } => UnitOutcome::Failed,
    };
    info!("{}: {}", unit.id, outcome);
    Ok(outcome)
}

async fn process_nested(
    connector: Arc<dyn Connector>,
    unit: WorkUnit,
    inner_width: usize,
) -> Result<UnitOutcome> {
    if unit.table_statements.is_empty() {
        info!("Source schema {} is empty, skipping", unit.id);
        return Ok(UnitOutcome::Skipped);
    }

    let conn = open_session(connector.as_ref(), &unit).await?;
    match presence(conn.as_ref(), &unit).await? {
        Presence::Complete => {
            info!(
                "Schema {} already contains all {} tables, skipping",
                unit.id,
                unit.table_statements.len()
            );
            return Ok(UnitOutcome::Skipped);
        }
        Presence::Absent => {
            info!("Creating schema {}", unit.id);
            if !runner::run(conn.as_ref(), &unit.id, &unit.statements).await.is_done() {
                return Ok(UnitOutcome::Failed);
            }
        }
        Presence::Partial { found, expected } => {
            info!(
                "Schema {} has {} of {} tables, resuming",
                unit.id, found, expected
            );
        }
    }

    let outcome = run_tables(conn, &unit.id, unit.table_statements, inner_width).await?;
    match outcome {
        UnitOutcome::Done => info!("All tables in schema {} created", unit.id),
        _ => error!("Error while creating tables in schema {}", unit.id),
    }
    Ok(outcome)
}

/// Execute independent table statements concurrently on one connection.
///
/// Every statement is attempted; the inner pool is drained before returning.
async fn run_tables(
    conn: Arc<dyn Connection>,
    unit_id: &str,
    statements: Vec<String>,
    width: usize,
) -> Result<UnitOutcome> {
    let total = statements.len();
    let mut pool = WorkerPool::new(format!("{} tables", unit_id), width);

    for (index, statement) in statements.into_iter().enumerate() {
        let conn = conn.clone();
        let unit = unit_id.to_string();
        pool.submit(format!("{}#{}", unit_id, index + 1), async move {
            match conn.execute(&statement).await {
                Ok(_) => true,
                Err(e) => {
                    error!("{}: error while executing {}: {}", unit, statement, e);
                    false
                }
            }
        })
        .await?;
    }

    let mut created = 0;
    let mut failed = 0;
    let mut crashed = Vec::new();
    for (task, result) in pool.drain().await {
        match result {
            Ok(true) => created += 1,
            Ok(false) => failed += 1,
            Err(e) => crashed.push(format!("{}: {}", task, e)),
        }
    }
    info!(
        "{}: {} of {} table statements succeeded",
        unit_id, created, total
    );

    if !crashed.is_empty() {
        return Err(MigrateError::pool(crashed.join("; "), unit_id.to_string()));
    }
    Ok(if failed == 0 {
        UnitOutcome::Done
    } else {
        UnitOutcome::Failed
    })
}
