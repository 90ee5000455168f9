//! SQL statement templates.
//!
//! Identifiers are emitted as given: names come from the mapping file or
//! from the warehouse's own metadata and are already valid unquoted
//! Snowflake identifiers.

use crate::config::WarehouseConfig;

/// Escape a value for use inside a single-quoted SQL literal.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "''"))
}

/// Switch the session role.
pub fn use_role(role: &str) -> String {
    format!("USE ROLE {}", role)
}

/// Create a database and grant it to the admin and readonly roles.
pub fn database_setup(db: &str, config: &WarehouseConfig) -> Vec<String> {
    let admin = &config.admin_role;
    let readonly = &config.readonly_role;
    vec![
        create_database(db),
        format!("GRANT OWNERSHIP ON DATABASE {} TO ROLE {}", db, admin),
        format!("GRANT ALL PRIVILEGES ON DATABASE {} TO ROLE {}", db, admin),
        format!("GRANT USAGE ON DATABASE {} TO ROLE {}", db, readonly),
        format!("GRANT USAGE ON ALL SCHEMAS IN DATABASE {} TO ROLE {}", db, readonly),
        format!("GRANT USAGE ON FUTURE SCHEMAS IN DATABASE {} TO ROLE {}", db, readonly),
        format!("GRANT SELECT ON ALL TABLES IN DATABASE {} TO ROLE {}", db, readonly),
        format!("GRANT SELECT ON FUTURE TABLES IN DATABASE {} TO ROLE {}", db, readonly),
    ]
}

pub fn create_database(db: &str) -> String {
    format!("CREATE DATABASE IF NOT EXISTS {}", db)
}

/// `schema_path` is fully qualified (`DB.SCHEMA`).
pub fn create_schema(schema_path: &str) -> String {
    format!("CREATE SCHEMA IF NOT EXISTS {}", schema_path)
}

/// Create-table-as-select copy of `source_table` into `target_table`.
pub fn create_table_as_select(source_table: &str, target_table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} AS SELECT * FROM {}",
        target_table, source_table
    )
}

/// Zero-copy clone of a schema.
pub fn clone_schema(target_path: &str, source_path: &str) -> String {
    format!(
        "CREATE SCHEMA IF NOT EXISTS {} CLONE {}",
        target_path, source_path
    )
}

pub fn show_databases_like(db: &str) -> String {
    format!("SHOW DATABASES LIKE {}", quote_literal(db))
}

pub fn show_terse_databases() -> String {
    "SHOW TERSE DATABASES".to_string()
}

pub fn show_schemas_like(db: &str, schema: &str) -> String {
    format!("SHOW SCHEMAS LIKE {} IN DATABASE {}", quote_literal(schema), db)
}

pub fn show_schemas_in(db: &str) -> String {
    format!("SHOW SCHEMAS IN DATABASE {}", db)
}

/// `schema_path` is fully qualified (`DB.SCHEMA`).
pub fn show_tables_in(schema_path: &str) -> String {
    format!("SHOW TABLES IN SCHEMA {}", schema_path)
}

pub fn current_version() -> String {
    "SELECT CURRENT_VERSION()".to_string()
}
