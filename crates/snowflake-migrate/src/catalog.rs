//! Warehouse catalog queries: mapping generation and merge planning.

use tracing::{debug, info, warn};

use crate::error::{MigrateError, Result};
use crate::mapping::{MappingFile, SchemaMapping, TableMapping};
use crate::sql;
use crate::warehouse::{Connection, Row};
use crate::work::WorkUnit;

/// Schema present in every database; never mapped or cloned.
pub const INFORMATION_SCHEMA: &str = "INFORMATION_SCHEMA";

/// Account-level shared database; never merged.
pub const SYSTEM_DATABASE: &str = "SNOWFLAKE";

const IMPORTED_KIND: &str = "IMPORTED DATABASE";

/// Database listed by `SHOW TERSE DATABASES`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseInfo {
    pub name: String,
    pub kind: String,
}

impl DatabaseInfo {
    pub fn is_imported(&self) -> bool {
        self.kind.eq_ignore_ascii_case(IMPORTED_KIND)
    }
}

fn names(rows: Vec<Row>, statement: &str) -> Result<Vec<String>> {
    rows.iter()
        .map(|row| {
            row.get("name")
                .map(str::to_string)
                .ok_or_else(|| MigrateError::warehouse(statement, "result row has no name column"))
        })
        .collect()
}

pub async fn list_databases(conn: &dyn Connection) -> Result<Vec<DatabaseInfo>> {
    let statement = sql::show_terse_databases();
    let rows = conn.execute(&statement).await?;
    rows.iter()
        .map(|row| -> Result<DatabaseInfo> {
            let name = row
                .get("name")
                .ok_or_else(|| MigrateError::warehouse(&statement, "result row has no name column"))?;
            Ok(DatabaseInfo {
                name: name.to_string(),
                kind: row.get("kind").unwrap_or_default().to_string(),
            })
        })
        .collect()
}

pub async fn list_schemas(conn: &dyn Connection, database: &str) -> Result<Vec<String>> {
    let statement = sql::show_schemas_in(database);
    let rows = conn.execute(&statement).await?;
    names(rows, &statement)
}

pub async fn list_tables(conn: &dyn Connection, schema_path: &str) -> Result<Vec<String>> {
    let statement = sql::show_tables_in(schema_path);
    let rows = conn.execute(&statement).await?;
    names(rows, &statement)
}

/// Build a mapping from a source database whose schemas are named
/// `<TARGETDB><delimiter><SCHEMA>`.
///
/// Schemas without the delimiter are skipped with a warning.
pub async fn generate_mapping(
    conn: &dyn Connection,
    source_database: &str,
    delimiter: &str,
) -> Result<MappingFile> {
    let mut records = Vec::new();

    for schema in list_schemas(conn, source_database).await? {
        let Some((target_db, target_schema)) = schema.split_once(delimiter) else {
            warn!(
                "Schema {}.{} has no '{}' delimiter, skipping",
                source_database, schema, delimiter
            );
            continue;
        };
        if target_db.is_empty() || target_schema.is_empty() {
            warn!("Schema {}.{} has an empty target part, skipping", source_database, schema);
            continue;
        }

        let source_path = format!("{}.{}", source_database, schema);
        let target_path = format!("{}.{}", target_db, target_schema);
        let tables = list_tables(conn, &source_path)
            .await?
            .into_iter()
            .map(|table| TableMapping {
                source_table: format!("{}.{}", source_path, table),
                target_table: format!("{}.{}", target_path, table),
            })
            .collect::<Vec<_>>();
        debug!("{} -> {} ({} tables)", source_path, target_path, tables.len());

        records.push(SchemaMapping {
            source_database: source_database.to_string(),
            source_schema: schema.clone(),
            target_database_name: target_db.to_string(),
            target_schema: target_path,
            tables,
        });
    }

    info!(
        "Generated {} mapping records from {}",
        records.len(),
        source_database
    );
    Ok(MappingFile { records })
}

/// Clone statements merging every database into one output database.
#[derive(Debug, Clone, Default)]
pub struct MergePlan {
    pub output_database: String,

    /// Clone statements grouped by source database.
    pub databases: Vec<(String, Vec<String>)>,

    /// Imported (shared) databases left out of the merge.
    pub skipped_imported: Vec<String>,
}

impl MergePlan {
    /// Every statement, output database creation first.
    pub fn statements(&self) -> Vec<String> {
        let mut all = vec![sql::create_database(&self.output_database)];
        for (_, statements) in &self.databases {
            all.extend(statements.iter().cloned());
        }
        all
    }

    /// One sequential unit per source database.
    pub fn units(&self) -> Vec<WorkUnit> {
        self.databases
            .iter()
            .map(|(db, statements)| WorkUnit::sequential(db.clone(), statements.clone()))
            .collect()
    }
}

/// Plan cloning every schema of every standard database into
/// `<output>.<DB><delimiter><SCHEMA>`.
///
/// Fails if any database or schema name already contains the delimiter.
pub async fn plan_merge(
    conn: &dyn Connection,
    output_database: &str,
    delimiter: &str,
) -> Result<MergePlan> {
    let mut plan = MergePlan {
        output_database: output_database.to_string(),
        ..Default::default()
    };

    for db in list_databases(conn).await? {
        if db.name.eq_ignore_ascii_case(SYSTEM_DATABASE)
            || db.name.eq_ignore_ascii_case(output_database)
        {
            continue;
        }
        if db.is_imported() {
            debug!("Skipping imported database {}", db.name);
            plan.skipped_imported.push(db.name);
            continue;
        }
        if db.name.contains(delimiter) {
            return Err(MigrateError::Config(format!(
                "Database name {} contains the delimiter '{}'",
                db.name, delimiter
            )));
        }

        let mut statements = Vec::new();
        for schema in list_schemas(conn, &db.name).await? {
            if schema.eq_ignore_ascii_case(INFORMATION_SCHEMA) {
                continue;
            }
            if schema.contains(delimiter) {
                return Err(MigrateError::Config(format!(
                    "Schema name {}.{} contains the delimiter '{}'",
                    db.name, schema, delimiter
                )));
            }
            statements.push(sql::clone_schema(
                &format!("{}.{}{}{}", output_database, db.name, delimiter, schema),
                &format!("{}.{}", db.name, schema),
            ));
        }
        plan.databases.push((db.name, statements));
    }

    info!(
        "Merge plan: {} databases into {}",
        plan.databases.len(),
        output_database
    );
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::warehouse::fake::FakeWarehouse;
    use crate::warehouse::Connector;

    #[tokio::test]
    async fn test_generate_mapping_splits_on_delimiter() {
        let fake = FakeWarehouse::new()
            .with_schema("SPIDER.FOO__A", &["T1", "T2"])
            .with_schema("SPIDER.BAR__B", &[])
            .with_schema("SPIDER.INFORMATION_SCHEMA", &["TABLES"]);
        let conn = fake.connect().await.unwrap();

        let mapping = generate_mapping(conn.as_ref(), "SPIDER", "__").await.unwrap();
        assert_eq!(mapping.records.len(), 2);

        let foo = mapping
            .records
            .iter()
            .find(|r| r.target_schema == "FOO.A")
            .unwrap();
        assert_eq!(foo.target_database_name, "FOO");
        assert_eq!(foo.source_schema, "FOO__A");
        assert_eq!(foo.tables.len(), 2);
        assert_eq!(foo.tables[0].source_table, "SPIDER.FOO__A.T1");
        assert_eq!(foo.tables[0].target_table, "FOO.A.T1");

        let bar = mapping
            .records
            .iter()
            .find(|r| r.target_schema == "BAR.B")
            .unwrap();
        assert!(bar.tables.is_empty());
    }

    #[tokio::test]
    async fn test_generated_mapping_round_trips_through_parser() {
        let fake = FakeWarehouse::new().with_schema("SPIDER.FOO__A", &["T1"]);
        let conn = fake.connect().await.unwrap();
        let mapping = generate_mapping(conn.as_ref(), "SPIDER", "__").await.unwrap();

        let file = tempfile::NamedTempFile::new().unwrap();
        mapping.save(file.path()).unwrap();
        let loaded = MappingFile::load(file.path()).unwrap();
        assert_eq!(loaded.records, mapping.records);
    }

    #[tokio::test]
    async fn test_plan_merge_clones_every_schema() {
        let fake = FakeWarehouse::new()
            .with_schema("FOO.A", &["T1"])
            .with_schema("FOO.INFORMATION_SCHEMA", &[])
            .with_schema("BAR.B", &[])
            .with_database("SNOWFLAKE")
            .with_database("MERGED");
        let conn = fake.connect().await.unwrap();

        let plan = plan_merge(conn.as_ref(), "MERGED", "__").await.unwrap();
        let dbs: Vec<&str> = plan.databases.iter().map(|(d, _)| d.as_str()).collect();
        assert_eq!(dbs, vec!["BAR", "FOO"]);

        let statements = plan.statements();
        assert_eq!(statements[0], "CREATE DATABASE IF NOT EXISTS MERGED");
        assert!(statements.iter().any(|s| s.contains("MERGED.FOO__A") && s.contains("CLONE FOO.A")));
        assert!(statements.iter().any(|s| s.contains("MERGED.BAR__B")));
        assert!(!statements.iter().any(|s| s.contains("INFORMATION_SCHEMA")));
        assert_eq!(plan.units().len(), 2);
    }

    #[tokio::test]
    async fn test_plan_merge_rejects_delimiter_in_names() {
        let fake = FakeWarehouse::new().with_schema("FOO.BAD__NAME", &[]);
        let conn = fake.connect().await.unwrap();

        let err = plan_merge(conn.as_ref(), "MERGED", "__").await.unwrap_err();
        assert!(err.to_string().contains("BAD__NAME"));
    }

    #[test]
    fn test_imported_kind() {
        let shared = DatabaseInfo {
            name: "SHARE".into(),
            kind: "IMPORTED DATABASE".into(),
        };
        assert!(shared.is_imported());
        let local = DatabaseInfo {
            name: "FOO".into(),
            kind: "STANDARD".into(),
        };
        assert!(!local.is_imported());
    }
}
