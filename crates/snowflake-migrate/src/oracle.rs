//! Existence checks deciding whether a unit can be skipped.

use tracing::debug;

use crate::error::Result;
use crate::sql;
use crate::warehouse::{Connection, Row};
use crate::work::ExistenceCheck;

/// What the warehouse already holds for a unit's target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    /// Nothing exists yet.
    Absent,

    /// The schema exists but its table count differs from the plan.
    Partial { found: usize, expected: usize },

    /// The target is fully in place.
    Complete,
}

/// `LIKE` treats `_` and `%` as wildcards, so only an exact name counts.
fn any_named(rows: &[Row], name: &str) -> bool {
    rows.iter()
        .any(|row| row.get("name").is_some_and(|n| n.eq_ignore_ascii_case(name)))
}

/// Query the warehouse for the state of `check`'s target.
///
/// Query failures are returned as errors and never read as `Absent`.
/// Schema completeness compares table counts only, not table names.
pub async fn check(conn: &dyn Connection, check: &ExistenceCheck) -> Result<Presence> {
    match check {
        ExistenceCheck::Database(db) => {
            let rows = conn.execute(&sql::show_databases_like(db)).await?;
            Ok(if !any_named(&rows, db) {
                Presence::Absent
            } else {
                Presence::Complete
            })
        }
        ExistenceCheck::Schema {
            path,
            expected_tables,
        } => {
            let schemas = conn
                .execute(&sql::show_schemas_like(&path.database, &path.schema))
                .await?;
            if !any_named(&schemas, &path.schema) {
                return Ok(Presence::Absent);
            }

            let tables = conn.execute(&sql::show_tables_in(&path.to_string())).await?;
            debug!(
                "Schema {} holds {} of {} tables",
                path,
                tables.len(),
                expected_tables
            );
            Ok(if tables.len() == *expected_tables {
                Presence::Complete
            } else {
                Presence::Partial {
                    found: tables.len(),
                    expected: *expected_tables,
                }
            })
        }
    }
}
