//! Fail-fast sequential statement execution.

use tracing::{debug, error};

use crate::warehouse::Connection;

/// Result of running an ordered statement list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunResult {
    /// Every statement succeeded.
    Done,

    /// Statement `index` failed; later statements were not attempted.
    Failed {
        index: usize,
        statement: String,
        message: String,
    },
}

impl RunResult {
    pub fn is_done(&self) -> bool {
        matches!(self, RunResult::Done)
    }
}

/// Execute `statements` in order on `conn`, stopping at the first failure.
///
/// `unit` names the owning work unit in log output.
pub async fn run(conn: &dyn Connection, unit: &str, statements: &[String]) -> RunResult {
    for (index, statement) in statements.iter().enumerate() {
        debug!("{}: executing [{}/{}] {}", unit, index + 1, statements.len(), statement);
        if let Err(e) = conn.execute(statement).await {
            error!("{}: error while executing {}: {}", unit, statement, e);
            return RunResult::Failed {
                index,
                statement: statement.clone(),
                message: e.to_string(),
            };
        }
    }
    RunResult::Done
}
