//! Warehouse connection abstraction.
//!
//! - [`Connector`]: opens fresh connections (one per worker)
//! - [`Connection`]: executes a single SQL statement and returns its rows
//!
//! The scheduler only depends on these traits; [`SnowflakeConnector`] is the
//! production implementation.

mod snowflake;

#[cfg(test)]
pub(crate) mod fake;

pub use snowflake::{SnowflakeConnection, SnowflakeConnector};

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::Result;

/// One result row, keyed by lower-cased column name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    values: HashMap<String, Option<String>>,
}

impl Row {
    /// Build a row from column names and values.
    pub fn new<I, K>(columns: I) -> Self
    where
        I: IntoIterator<Item = (K, Option<String>)>,
        K: AsRef<str>,
    {
        let values = columns
            .into_iter()
            .map(|(k, v)| (k.as_ref().to_lowercase(), v))
            .collect();
        Self { values }
    }

    /// Column value; `None` when the column is missing or SQL NULL.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.values
            .get(&column.to_lowercase())
            .and_then(|v| v.as_deref())
    }
}

/// An open warehouse session.
///
/// Implementations must tolerate concurrent `execute` calls: the table
/// statements of one schema share a connection.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Execute one statement and return all result rows.
    async fn execute(&self, sql: &str) -> Result<Vec<Row>>;
}

/// Factory for warehouse connections.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a new connection with its own session context.
    async fn connect(&self) -> Result<Arc<dyn Connection>>;
}
