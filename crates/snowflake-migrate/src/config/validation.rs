//! Configuration validation.

use super::Config;
use crate::error::{MigrateError, Result};

/// Largest pool width a semaphore can hold.
pub const MAX_WORKERS: usize = tokio::sync::Semaphore::MAX_PERMITS;

/// Validate the configuration.
///
/// All missing warehouse fields are reported together, named by the
/// environment variable that supplies them.
pub fn validate(config: &Config) -> Result<()> {
    let wh = &config.warehouse;
    let required = [
        (&wh.account, "SNOWFLAKE_ACCOUNT"),
        (&wh.role, "SNOWFLAKE_ROLE"),
        (&wh.warehouse, "SNOWFLAKE_WAREHOUSE"),
        (&wh.admin_role, "SNOWFLAKE_ADMIN_ROLE"),
        (&wh.readonly_role, "SNOWFLAKE_READONLY_ROLE"),
        (&wh.user, "DESTINATION_USER"),
    ];

    let missing: Vec<&str> = required
        .iter()
        .filter(|(value, _)| value.trim().is_empty())
        .map(|(_, name)| *name)
        .collect();

    if !missing.is_empty() {
        return Err(MigrateError::Config(format!(
            "Missing required configuration: {}. \
             Set the environment variables, the config file, or the command line arguments.",
            missing.join(", ")
        )));
    }

    if wh.setup_role.trim().is_empty() {
        return Err(MigrateError::Config(
            "warehouse.setup_role cannot be empty".into(),
        ));
    }

    let migration = &config.migration;
    let widths = [
        (migration.database_workers, "migration.database_workers"),
        (migration.schema_workers, "migration.schema_workers"),
        (migration.table_workers, "migration.table_workers"),
    ];
    for (width, name) in widths {
        match width {
            Some(0) => {
                return Err(MigrateError::Config(format!("{} must be at least 1", name)));
            }
            Some(n) if n > MAX_WORKERS => {
                return Err(MigrateError::Config(format!(
                    "{} must be at most {} (got {})",
                    name, MAX_WORKERS, n
                )));
            }
            _ => {}
        }
    }
    if migration.get_delimiter().contains('.') {
        return Err(MigrateError::Config(
            "migration.delimiter cannot contain '.'".into(),
        ));
    }

    Ok(())
}
