//! In-memory warehouse double for tests.
//!
//! Understands the handful of statement shapes the migration emits and keeps
//! databases, schemas and tables in memory. Every executed statement is
//! logged; statements containing a registered fragment fail.

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{Connection, Connector, Row};
use crate::error::{MigrateError, Result};

#[derive(Default)]
struct State {
    databases: BTreeSet<String>,
    /// "DB.SCHEMA" -> table names
    schemas: BTreeMap<String, BTreeSet<String>>,
    executed: Vec<String>,
    failing: Vec<String>,
    panicking: Vec<String>,
    delays: Vec<(String, Duration)>,
}

#[derive(Default)]
pub(crate) struct FakeWarehouse {
    state: Mutex<State>,
    connections: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    fail_connect: AtomicBool,
}

impl FakeWarehouse {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn with_database(self: &Arc<Self>, name: &str) -> Arc<Self> {
        self.state.lock().unwrap().databases.insert(name.to_uppercase());
        self.clone()
    }

    pub(crate) fn with_schema(self: &Arc<Self>, path: &str, tables: &[&str]) -> Arc<Self> {
        let path = path.to_uppercase();
        let mut state = self.state.lock().unwrap();
        if let Some((db, _)) = path.split_once('.') {
            state.databases.insert(db.to_string());
        }
        state
            .schemas
            .entry(path)
            .or_default()
            .extend(tables.iter().map(|t| t.to_uppercase()));
        drop(state);
        self.clone()
    }

    /// Fail every statement containing `fragment`.
    pub(crate) fn fail_on(self: &Arc<Self>, fragment: &str) -> Arc<Self> {
        self.state.lock().unwrap().failing.push(fragment.to_string());
        self.clone()
    }

    /// Panic while executing statements containing `fragment`.
    pub(crate) fn panic_on(self: &Arc<Self>, fragment: &str) -> Arc<Self> {
        self.state.lock().unwrap().panicking.push(fragment.to_string());
        self.clone()
    }

    /// Sleep before executing statements containing `fragment`.
    pub(crate) fn delay_on(self: &Arc<Self>, fragment: &str, delay: Duration) -> Arc<Self> {
        self.state
            .lock()
            .unwrap()
            .delays
            .push((fragment.to_string(), delay));
        self.clone()
    }

    pub(crate) fn fail_connections(self: &Arc<Self>) -> Arc<Self> {
        self.fail_connect.store(true, Ordering::SeqCst);
        self.clone()
    }

    pub(crate) fn executed(&self) -> Vec<String> {
        self.state.lock().unwrap().executed.clone()
    }

    pub(crate) fn executed_matching(&self, fragment: &str) -> usize {
        self.executed().iter().filter(|s| s.contains(fragment)).count()
    }

    pub(crate) fn has_database(&self, name: &str) -> bool {
        self.state.lock().unwrap().databases.contains(&name.to_uppercase())
    }

    pub(crate) fn tables_in(&self, path: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .schemas
            .get(&path.to_uppercase())
            .map(|t| t.len())
            .unwrap_or(0)
    }

    pub(crate) fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn run(&self, sql: &str) -> Result<Vec<Row>> {
        let (delay, panics) = {
            let mut state = self.state.lock().unwrap();
            state.executed.push(sql.to_string());
            let delay = state
                .delays
                .iter()
                .find(|(fragment, _)| sql.contains(fragment.as_str()))
                .map(|(_, d)| *d);
            (delay, state.panicking.iter().any(|f| sql.contains(f.as_str())))
        };
        if panics {
            panic!("driver crashed on {}", sql);
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let result = self.apply(sql);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn apply(&self, sql: &str) -> Result<Vec<Row>> {
        let mut state = self.state.lock().unwrap();
        if state.failing.iter().any(|f| sql.contains(f.as_str())) {
            return Err(MigrateError::warehouse(sql, "injected failure"));
        }

        let upper = sql.trim().trim_end_matches(';').to_uppercase();
        let tokens: Vec<&str> = upper.split_whitespace().collect();
        let name_row = |name: &str| Row::new([("name", Some(name.to_string()))]);

        match tokens.as_slice() {
            ["CREATE", "DATABASE", "IF", "NOT", "EXISTS", db, ..] => {
                state.databases.insert(db.to_string());
                Ok(Vec::new())
            }
            ["CREATE", "SCHEMA", "IF", "NOT", "EXISTS", path, ..] => {
                let db = path.split('.').next().unwrap_or_default().to_string();
                if !state.databases.contains(&db) {
                    return Err(MigrateError::warehouse(sql, format!("Database '{}' does not exist", db)));
                }
                state.schemas.entry(path.to_string()).or_default();
                Ok(Vec::new())
            }
            ["CREATE", "TABLE", "IF", "NOT", "EXISTS", path, ..] => {
                let (schema, table) = path
                    .rsplit_once('.')
                    .ok_or_else(|| MigrateError::warehouse(sql, "unqualified table"))?;
                match state.schemas.get_mut(schema) {
                    Some(tables) => {
                        tables.insert(table.to_string());
                        Ok(Vec::new())
                    }
                    None => Err(MigrateError::warehouse(sql, format!("Schema '{}' does not exist", schema))),
                }
            }
            ["SHOW", "DATABASES", "LIKE", pattern] => {
                let pattern = pattern.trim_matches('\'');
                Ok(state
                    .databases
                    .iter()
                    .filter(|d| like(pattern, d))
                    .map(|d| name_row(d))
                    .collect())
            }
            ["SHOW", "TERSE", "DATABASES"] => Ok(state
                .databases
                .iter()
                .map(|d| Row::new([("name", Some(d.clone())), ("kind", Some("STANDARD".into()))]))
                .collect()),
            ["SHOW", "SCHEMAS", "LIKE", pattern, "IN", "DATABASE", db] => {
                if !state.databases.contains(*db) {
                    return Err(MigrateError::warehouse(sql, format!("Database '{}' does not exist", db)));
                }
                let pattern = pattern.trim_matches('\'');
                let prefix = format!("{}.", db);
                Ok(state
                    .schemas
                    .keys()
                    .filter_map(|k| k.strip_prefix(&prefix))
                    .filter(|schema| like(pattern, schema))
                    .map(|schema| name_row(schema))
                    .collect())
            }
            ["SHOW", "SCHEMAS", "IN", "DATABASE", db] => {
                let prefix = format!("{}.", db);
                Ok(state
                    .schemas
                    .keys()
                    .filter_map(|k| k.strip_prefix(&prefix))
                    .map(|s| name_row(s))
                    .collect())
            }
            ["SHOW", "TABLES", "IN", "SCHEMA", path] => match state.schemas.get(*path) {
                Some(tables) => Ok(tables.iter().map(|t| name_row(t)).collect()),
                None => Err(MigrateError::warehouse(sql, format!("Schema '{}' does not exist", path))),
            },
            _ => Ok(Vec::new()),
        }
    }
}

/// `LIKE` matching: `_` is any one character, `%` any run. Inputs are upper-cased.
fn like(pattern: &str, value: &str) -> bool {
    fn matches(p: &[char], v: &[char]) -> bool {
        match p.split_first() {
            None => v.is_empty(),
            Some((&'%', rest)) => (0..=v.len()).any(|i| matches(rest, &v[i..])),
            Some((&'_', rest)) => !v.is_empty() && matches(rest, &v[1..]),
            Some((c, rest)) => v.first() == Some(c) && matches(rest, &v[1..]),
        }
    }
    let p: Vec<char> = pattern.chars().collect();
    let v: Vec<char> = value.chars().collect();
    matches(&p, &v)
}

pub(crate) struct FakeConnection {
    warehouse: Arc<FakeWarehouse>,
}

#[async_trait]
impl Connection for FakeConnection {
    async fn execute(&self, sql: &str) -> Result<Vec<Row>> {
        self.warehouse.run(sql).await
    }
}

#[async_trait]
impl Connector for Arc<FakeWarehouse> {
    async fn connect(&self) -> Result<Arc<dyn Connection>> {
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(MigrateError::warehouse("<connect>", "connection refused"));
        }
        self.connections.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FakeConnection {
            warehouse: self.clone(),
        }))
    }
}
