//! Configuration type definitions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Warehouse connection and role configuration.
    #[serde(default)]
    pub warehouse: WarehouseConfig,

    /// Migration behavior configuration.
    #[serde(default)]
    pub migration: MigrationConfig,
}

/// Snowflake connection and role configuration.
///
/// Required string fields left empty are reported by validation, so a
/// partially filled file can be completed from the environment or CLI.
#[derive(Clone, Serialize, Deserialize)]
pub struct WarehouseConfig {
    /// Account identifier (e.g. "xy12345.us-east-1").
    #[serde(default)]
    pub account: String,

    /// Login user.
    #[serde(default)]
    pub user: String,

    /// Password or programmatic access token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Default session role.
    #[serde(default)]
    pub role: String,

    /// Compute warehouse.
    #[serde(default)]
    pub warehouse: String,

    /// Role that owns migrated databases and creates schemas/tables.
    #[serde(default)]
    pub admin_role: String,

    /// Role granted read access on migrated databases.
    #[serde(default)]
    pub readonly_role: String,

    /// Role used to create databases and hand out ownership (default: "ACCOUNTADMIN").
    #[serde(default = "default_setup_role")]
    pub setup_role: String,

    /// Explicit host, overriding "<account>.snowflakecomputing.com".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    /// Protocol (default: "https").
    #[serde(default = "default_protocol")]
    pub protocol: String,

    /// Port (default: 443).
    #[serde(default = "default_port")]
    pub port: u16,

    /// How the password field is presented to the SQL API.
    #[serde(default)]
    pub token_type: TokenType,

    /// Per-request timeout in seconds (default: 600).
    #[serde(default = "default_statement_timeout")]
    pub statement_timeout_secs: u64,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            account: String::new(),
            user: String::new(),
            password: None,
            role: String::new(),
            warehouse: String::new(),
            admin_role: String::new(),
            readonly_role: String::new(),
            setup_role: default_setup_role(),
            host: None,
            protocol: default_protocol(),
            port: default_port(),
            token_type: TokenType::default(),
            statement_timeout_secs: default_statement_timeout(),
        }
    }
}

impl fmt::Debug for WarehouseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WarehouseConfig")
            .field("account", &self.account)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("role", &self.role)
            .field("warehouse", &self.warehouse)
            .field("admin_role", &self.admin_role)
            .field("readonly_role", &self.readonly_role)
            .field("setup_role", &self.setup_role)
            .field("host", &self.host)
            .field("protocol", &self.protocol)
            .field("port", &self.port)
            .field("token_type", &self.token_type)
            .field("statement_timeout_secs", &self.statement_timeout_secs)
            .finish()
    }
}

/// Authorization token type sent with SQL API requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    /// Programmatic access token used in place of a password.
    #[default]
    ProgrammaticAccessToken,

    /// OAuth access token.
    Oauth,

    /// Pre-signed key-pair JWT.
    KeypairJwt,
}

impl TokenType {
    /// Value of the `X-Snowflake-Authorization-Token-Type` header.
    pub fn header_value(&self) -> &'static str {
        match self {
            TokenType::ProgrammaticAccessToken => "PROGRAMMATIC_ACCESS_TOKEN",
            TokenType::Oauth => "OAUTH",
            TokenType::KeypairJwt => "KEYPAIR_JWT",
        }
    }
}

/// Migration behavior configuration.
/// Worker widths use Option<T> to distinguish "not set" from "explicitly set".
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MigrationConfig {
    /// Concurrent database units in flat mode (default: 8).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_workers: Option<usize>,

    /// Concurrent schema units in nested mode (default: 2).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_workers: Option<usize>,

    /// Concurrent table statements per schema in nested mode (default: 4).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_workers: Option<usize>,

    /// Target databases to leave out of the run.
    #[serde(default)]
    pub exclude_databases: Vec<String>,

    /// Separator between target database and schema in merged schema names.
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
}

impl MigrationConfig {
    pub fn get_database_workers(&self) -> usize {
        self.database_workers.unwrap_or(8)
    }

    pub fn get_schema_workers(&self) -> usize {
        self.schema_workers.unwrap_or(2)
    }

    pub fn get_table_workers(&self) -> usize {
        self.table_workers.unwrap_or(4)
    }

    /// Delimiter with the empty-string case falling back to the default.
    pub fn get_delimiter(&self) -> &str {
        if self.delimiter.is_empty() {
            DEFAULT_DELIMITER
        } else {
            &self.delimiter
        }
    }
}

/// Explicit overrides applied on top of a loaded configuration.
///
/// Every `Some` value replaces the corresponding configuration field.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub account: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub role: Option<String>,
    pub warehouse: Option<String>,
    pub admin_role: Option<String>,
    pub readonly_role: Option<String>,
    pub database_workers: Option<usize>,
    pub schema_workers: Option<usize>,
    pub table_workers: Option<usize>,
    pub exclude_databases: Vec<String>,
}

/// Default separator between database and schema in merged schema names.
pub const DEFAULT_DELIMITER: &str = "__";

// Default value functions for serde
fn default_setup_role() -> String {
    "ACCOUNTADMIN".to_string()
}

fn default_protocol() -> String {
    "https".to_string()
}

fn default_port() -> u16 {
    443
}

fn default_statement_timeout() -> u64 {
    600
}

fn default_delimiter() -> String {
    DEFAULT_DELIMITER.to_string()
}
