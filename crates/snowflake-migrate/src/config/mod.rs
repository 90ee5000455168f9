//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use crate::error::Result;
use std::path::Path;

impl Config {
    /// Load configuration from a YAML file.
    ///
    /// The result is not validated; call [`Config::validate`] after applying
    /// overrides.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Apply explicit overrides (CLI flags or environment values).
    pub fn with_overrides(mut self, overrides: ConfigOverrides) -> Self {
        let wh = &mut self.warehouse;
        let replace = |field: &mut String, value: Option<String>| {
            if let Some(v) = value {
                *field = v;
            }
        };
        replace(&mut wh.account, overrides.account);
        replace(&mut wh.user, overrides.user);
        replace(&mut wh.role, overrides.role);
        replace(&mut wh.warehouse, overrides.warehouse);
        replace(&mut wh.admin_role, overrides.admin_role);
        replace(&mut wh.readonly_role, overrides.readonly_role);
        if overrides.password.is_some() {
            wh.password = overrides.password;
        }

        let migration = &mut self.migration;
        if overrides.database_workers.is_some() {
            migration.database_workers = overrides.database_workers;
        }
        if overrides.schema_workers.is_some() {
            migration.schema_workers = overrides.schema_workers;
        }
        if overrides.table_workers.is_some() {
            migration.table_workers = overrides.table_workers;
        }
        for db in overrides.exclude_databases {
            if !migration.exclude_databases.contains(&db) {
                migration.exclude_databases.push(db);
            }
        }
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }
}

impl WarehouseConfig {
    /// Base URL of the account's SQL API endpoint.
    pub fn base_url(&self) -> String {
        let host = self
            .host
            .clone()
            .unwrap_or_else(|| format!("{}.snowflakecomputing.com", self.account.to_lowercase()));
        format!("{}://{}:{}", self.protocol, host, self.port)
    }
}
