//! JSON-lines mapping file.
//!
//! Each line describes one source schema and the target schema its tables
//! are copied into:
//!
//! ```json
//! {"source_database": "SPIDER", "source_schema": "FOO__BAR",
//!  "target_database_name": "FOO", "target_schema": "FOO.BAR",
//!  "tables": [{"source_table": "SPIDER.FOO__BAR.T", "target_table": "FOO.BAR.T"}]}
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use tracing::warn;

use crate::error::{MigrateError, Result};

/// One source-to-target table pair, both fully qualified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMapping {
    pub source_table: String,
    pub target_table: String,
}

/// One mapping record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaMapping {
    pub source_database: String,
    pub source_schema: String,
    pub target_database_name: String,
    /// Fully qualified target schema (`DB.SCHEMA`).
    pub target_schema: String,
    #[serde(default)]
    pub tables: Vec<TableMapping>,
}

/// A `DB.SCHEMA` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SchemaPath {
    pub database: String,
    pub schema: String,
}

impl SchemaPath {
    /// Parse a fully qualified `DB.SCHEMA` name.
    pub fn parse(path: &str) -> Option<Self> {
        let (database, schema) = path.split_once('.')?;
        if database.is_empty() || schema.is_empty() || schema.contains('.') {
            return None;
        }
        Some(Self {
            database: database.to_string(),
            schema: schema.to_string(),
        })
    }
}

impl std::fmt::Display for SchemaPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.database, self.schema)
    }
}

/// Parsed mapping file, in file order.
#[derive(Debug, Clone, Default)]
pub struct MappingFile {
    pub records: Vec<SchemaMapping>,
}

impl MappingFile {
    /// Load a JSON-lines mapping file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse JSON lines; blank lines are ignored.
    pub fn parse(content: &str) -> Result<Self> {
        let mut records = Vec::new();
        for (idx, line) in content.lines().enumerate() {
            let line_no = idx + 1;
            if line.trim().is_empty() {
                continue;
            }
            let record: SchemaMapping = serde_json::from_str(line)
                .map_err(|e| MigrateError::mapping(line_no, e.to_string()))?;
            let target = SchemaPath::parse(&record.target_schema).ok_or_else(|| {
                MigrateError::mapping(
                    line_no,
                    format!(
                        "target_schema '{}' must be fully qualified as DB.SCHEMA",
                        record.target_schema
                    ),
                )
            })?;
            if target.database != record.target_database_name {
                return Err(MigrateError::mapping(
                    line_no,
                    format!(
                        "target_schema '{}' is not in target database '{}'",
                        record.target_schema, record.target_database_name
                    ),
                ));
            }
            records.push(record);
        }
        Ok(Self { records })
    }

    /// Drop records whose target database is excluded.
    pub fn excluding(mut self, databases: &[String]) -> Self {
        self.records
            .retain(|r| !databases.iter().any(|d| d == &r.target_database_name));
        self
    }

    /// Distinct target databases in first-seen order.
    pub fn target_databases(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for record in &self.records {
            if !seen.contains(&record.target_database_name) {
                seen.push(record.target_database_name.clone());
            }
        }
        seen
    }

    /// One record per target schema, in first-seen order.
    ///
    /// A later record for the same target schema replaces the earlier one.
    pub fn schemas(&self) -> Vec<&SchemaMapping> {
        let mut order: Vec<&str> = Vec::new();
        let mut latest: HashMap<&str, &SchemaMapping> = HashMap::new();
        for record in &self.records {
            let key = record.target_schema.as_str();
            if latest.insert(key, record).is_some() {
                warn!("Duplicate mapping for schema {}, keeping the last record", key);
            } else {
                order.push(key);
            }
        }
        order.into_iter().filter_map(|k| latest.get(k).copied()).collect()
    }

    /// Write records as JSON lines.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut file = std::io::BufWriter::new(std::fs::File::create(path)?);
        for record in &self.records {
            serde_json::to_writer(&mut file, record)?;
            file.write_all(b"\n")?;
        }
        file.flush()?;
        Ok(())
    }
}
