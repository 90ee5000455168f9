//! Work units: independently schedulable migration tasks.

use crate::config::WarehouseConfig;
use crate::mapping::{MappingFile, SchemaMapping, SchemaPath};
use crate::sql;

/// What the existence oracle inspects before a unit runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExistenceCheck {
    /// The database exists.
    Database(String),

    /// The schema exists and holds exactly `expected_tables` tables.
    Schema {
        path: SchemaPath,
        expected_tables: usize,
    },
}

/// One database or schema to migrate.
#[derive(Debug, Clone)]
pub struct WorkUnit {
    /// Database name or fully qualified schema name.
    pub id: String,

    /// Session setup executed before the existence check.
    pub session: Vec<String>,

    /// Statements executed strictly in order.
    pub statements: Vec<String>,

    /// Independent per-table statements (schema units only).
    pub table_statements: Vec<String>,

    pub existence_check: Option<ExistenceCheck>,
}

impl WorkUnit {
    /// Unit that runs `statements` in order with no existence check.
    pub fn sequential(id: impl Into<String>, statements: Vec<String>) -> Self {
        Self {
            id: id.into(),
            session: Vec::new(),
            statements,
            table_statements: Vec::new(),
            existence_check: None,
        }
    }

    /// Database creation unit: setup role, create, grants.
    pub fn database(db: &str, config: &WarehouseConfig) -> Self {
        Self {
            id: db.to_string(),
            session: vec![sql::use_role(&config.setup_role)],
            statements: sql::database_setup(db, config),
            table_statements: Vec::new(),
            existence_check: Some(ExistenceCheck::Database(db.to_string())),
        }
    }

    /// Schema unit: create the schema, then copy every mapped table.
    ///
    /// Returns `None` if the record's target schema is not `DB.SCHEMA`.
    pub fn schema(mapping: &SchemaMapping, config: &WarehouseConfig) -> Option<Self> {
        let path = SchemaPath::parse(&mapping.target_schema)?;
        let table_statements: Vec<String> = mapping
            .tables
            .iter()
            .map(|t| sql::create_table_as_select(&t.source_table, &t.target_table))
            .collect();
        Some(Self {
            id: mapping.target_schema.clone(),
            session: vec![sql::use_role(&config.admin_role)],
            statements: vec![sql::create_schema(&mapping.target_schema)],
            existence_check: Some(ExistenceCheck::Schema {
                path,
                expected_tables: table_statements.len(),
            }),
            table_statements,
        })
    }

    pub fn with_existence_check(mut self, check: ExistenceCheck) -> Self {
        self.existence_check = Some(check);
        self
    }

    pub fn with_session(mut self, session: Vec<String>) -> Self {
        self.session = session;
        self
    }
}

/// Database units, one per distinct target database.
pub fn database_units(mapping: &MappingFile, config: &WarehouseConfig) -> Vec<WorkUnit> {
    mapping
        .target_databases()
        .iter()
        .map(|db| WorkUnit::database(db, config))
        .collect()
}

/// Schema units, one per distinct target schema.
pub fn schema_units(mapping: &MappingFile, config: &WarehouseConfig) -> Vec<WorkUnit> {
    mapping
        .schemas()
        .into_iter()
        .filter_map(|record| WorkUnit::schema(record, config))
        .collect()
}
