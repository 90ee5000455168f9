//! Snowflake SQL API connection.
//!
//! Statements are submitted to `/api/v2/statements`. Long-running statements
//! answer `202 Accepted` and are polled through their status URL until they
//! finish. The SQL API is stateless, so `USE ROLE/WAREHOUSE/DATABASE/SCHEMA`
//! statements are recorded locally and sent as context with every later
//! request on the same connection.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

use super::{Connection, Connector, Row};
use crate::config::WarehouseConfig;
use crate::error::{MigrateError, Result};

const STATEMENTS_PATH: &str = "/api/v2/statements";
const MAX_SUBMIT_ATTEMPTS: u32 = 5;
const INITIAL_POLL_DELAY: Duration = Duration::from_millis(250);
const MAX_POLL_DELAY: Duration = Duration::from_secs(5);

/// Opens [`SnowflakeConnection`]s sharing one HTTP client.
#[derive(Debug, Clone)]
pub struct SnowflakeConnector {
    client: reqwest::Client,
    config: Arc<WarehouseConfig>,
    token: Arc<str>,
}

impl SnowflakeConnector {
    /// Create a connector from validated configuration.
    ///
    /// The SQL API only accepts token authentication, so a missing password
    /// is a configuration error here.
    pub fn new(config: &WarehouseConfig) -> Result<Self> {
        let token = config.password.clone().ok_or_else(|| {
            MigrateError::Config(
                "SNOWFLAKE_PASSWORD (access token) is required for the Snowflake SQL API".into(),
            )
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.statement_timeout_secs + 30))
            .user_agent(concat!("snowflake-migrate/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            config: Arc::new(config.clone()),
            token: token.into(),
        })
    }
}

#[async_trait]
impl Connector for SnowflakeConnector {
    async fn connect(&self) -> Result<Arc<dyn Connection>> {
        Ok(Arc::new(SnowflakeConnection {
            client: self.client.clone(),
            base_url: self.config.base_url(),
            token: self.token.clone(),
            token_type: self.config.token_type.header_value(),
            timeout_secs: self.config.statement_timeout_secs,
            context: Mutex::new(SessionContext {
                role: Some(self.config.role.clone()),
                warehouse: Some(self.config.warehouse.clone()),
                database: None,
                schema: None,
            }),
        }))
    }
}

/// Session settings sent with each request.
#[derive(Debug, Clone, Default, PartialEq)]
struct SessionContext {
    role: Option<String>,
    warehouse: Option<String>,
    database: Option<String>,
    schema: Option<String>,
}

impl SessionContext {
    /// Apply a `USE ...` statement. Returns false if `sql` is not one.
    fn apply_use(&mut self, sql: &str) -> bool {
        let mut tokens = sql.trim().trim_end_matches(';').split_whitespace();
        if !tokens
            .next()
            .is_some_and(|t| t.eq_ignore_ascii_case("USE"))
        {
            return false;
        }
        let (kind, name) = match (tokens.next(), tokens.next()) {
            (Some(kind), Some(name)) => (kind.to_ascii_uppercase(), name.to_string()),
            (Some(name), None) => ("DATABASE".to_string(), name.to_string()),
            _ => return false,
        };
        match kind.as_str() {
            "ROLE" => self.role = Some(name),
            "WAREHOUSE" => self.warehouse = Some(name),
            "DATABASE" => {
                self.database = Some(name);
                self.schema = None;
            }
            "SCHEMA" => match name.split_once('.') {
                Some((db, schema)) => {
                    self.database = Some(db.to_string());
                    self.schema = Some(schema.to_string());
                }
                None => self.schema = Some(name),
            },
            _ => return false,
        }
        true
    }
}

/// A Snowflake session over the SQL API.
pub struct SnowflakeConnection {
    client: reqwest::Client,
    base_url: String,
    token: Arc<str>,
    token_type: &'static str,
    timeout_secs: u64,
    context: Mutex<SessionContext>,
}

#[derive(Debug, Serialize)]
struct StatementRequest<'a> {
    statement: &'a str,
    timeout: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warehouse: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    database: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    schema: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatementResponse {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    statement_handle: Option<String>,
    #[serde(default)]
    statement_status_url: Option<String>,
    #[serde(default)]
    result_set_meta_data: Option<ResultSetMetaData>,
    #[serde(default)]
    data: Vec<Vec<JsonValue>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResultSetMetaData {
    #[serde(default)]
    row_type: Vec<ColumnType>,
    #[serde(default)]
    partition_info: Vec<JsonValue>,
}

#[derive(Debug, Deserialize)]
struct ColumnType {
    name: String,
}

impl SnowflakeConnection {
    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .bearer_auth(&*self.token)
            .header("X-Snowflake-Authorization-Token-Type", self.token_type)
            .header("Accept", "application/json")
    }

    /// Submit a statement, retrying throttled requests with the same request id.
    async fn submit(&self, sql: &str) -> Result<(StatusCode, StatementResponse)> {
        let context = self
            .context
            .lock()
            .map_err(|_| MigrateError::warehouse(sql, "session context poisoned"))?
            .clone();
        let body = StatementRequest {
            statement: sql,
            timeout: self.timeout_secs,
            role: context.role,
            warehouse: context.warehouse,
            database: context.database,
            schema: context.schema,
        };
        let request_id = uuid::Uuid::new_v4().to_string();
        let url = format!("{}{}", self.base_url, STATEMENTS_PATH);

        let mut delay = INITIAL_POLL_DELAY;
        for attempt in 1..=MAX_SUBMIT_ATTEMPTS {
            let mut query = vec![("requestId", request_id.clone())];
            if attempt > 1 {
                query.push(("retry", "true".to_string()));
            }
            let response = self
                .authorized(self.client.post(&url))
                .query(&query)
                .json(&body)
                .send()
                .await?;

            let status = response.status();
            if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::SERVICE_UNAVAILABLE {
                warn!("SQL API throttled ({}), attempt {}/{}", status, attempt, MAX_SUBMIT_ATTEMPTS);
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(MAX_POLL_DELAY);
                continue;
            }
            return Ok((status, self.decode(sql, response).await?));
        }

        Err(MigrateError::warehouse(
            sql,
            format!("SQL API still throttled after {} attempts", MAX_SUBMIT_ATTEMPTS),
        ))
    }

    async fn decode(&self, sql: &str, response: reqwest::Response) -> Result<StatementResponse> {
        let status = response.status();
        let text = response.text().await?;
        if status.is_success() {
            return Ok(serde_json::from_str(&text)?);
        }
        let message = serde_json::from_str::<StatementResponse>(&text)
            .ok()
            .and_then(|r| r.message)
            .unwrap_or(text);
        Err(MigrateError::warehouse(
            sql,
            format!("{} ({})", message, status),
        ))
    }

    /// Poll the status URL until the statement leaves the running state.
    async fn wait_for(&self, sql: &str, mut response: StatementResponse) -> Result<StatementResponse> {
        let mut delay = INITIAL_POLL_DELAY;
        loop {
            let status_url = response.statement_status_url.clone().ok_or_else(|| {
                MigrateError::warehouse(sql, "statement accepted without a status URL")
            })?;
            tokio::time::sleep(delay).await;
            delay = (delay * 2).min(MAX_POLL_DELAY);

            let url = format!("{}{}", self.base_url, status_url);
            let reply = self.authorized(self.client.get(&url)).send().await?;
            let status = reply.status();
            response = self.decode(sql, reply).await?;
            if status != StatusCode::ACCEPTED {
                return Ok(response);
            }
            debug!("Statement {:?} still running", response.statement_handle);
        }
    }

    /// Fetch result partitions beyond the first one.
    async fn fetch_partitions(
        &self,
        sql: &str,
        handle: &str,
        partitions: usize,
    ) -> Result<Vec<Vec<JsonValue>>> {
        let mut data = Vec::new();
        for partition in 1..partitions {
            let url = format!("{}{}/{}", self.base_url, STATEMENTS_PATH, handle);
            let reply = self
                .authorized(self.client.get(&url))
                .query(&[("partition", partition.to_string())])
                .send()
                .await?;
            data.extend(self.decode(sql, reply).await?.data);
        }
        Ok(data)
    }
}

#[async_trait]
impl Connection for SnowflakeConnection {
    async fn execute(&self, sql: &str) -> Result<Vec<Row>> {
        {
            let mut context = self
                .context
                .lock()
                .map_err(|_| MigrateError::warehouse(sql, "session context poisoned"))?;
            if context.apply_use(sql) {
                debug!("Session context updated: {:?}", *context);
                return Ok(Vec::new());
            }
        }

        let (status, mut response) = self.submit(sql).await?;
        if status == StatusCode::ACCEPTED {
            response = self.wait_for(sql, response).await?;
        }

        let meta = response.result_set_meta_data.take();
        let columns: Vec<String> = meta
            .as_ref()
            .map(|m| m.row_type.iter().map(|c| c.name.clone()).collect())
            .unwrap_or_default();
        let partitions = meta.as_ref().map(|m| m.partition_info.len()).unwrap_or(1);

        let mut data = std::mem::take(&mut response.data);
        if partitions > 1 {
            if let Some(handle) = response.statement_handle.as_deref() {
                data.extend(self.fetch_partitions(sql, handle, partitions).await?);
            }
        }

        Ok(data
            .into_iter()
            .map(|values| {
                Row::new(columns.iter().zip(values).map(|(name, value)| {
                    let value = match value {
                        JsonValue::Null => None,
                        JsonValue::String(s) => Some(s),
                        other => Some(other.to_string()),
                    };
                    (name, value)
                }))
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_use_statements_update_context() {
        let mut context = SessionContext::default();
        assert!(context.apply_use("USE ROLE accountadmin;"));
        assert!(context.apply_use("use warehouse WH_MIGRATION"));
        assert!(context.apply_use("USE SCHEMA FOO.BAR"));
        assert_eq!(context.role.as_deref(), Some("accountadmin"));
        assert_eq!(context.warehouse.as_deref(), Some("WH_MIGRATION"));
        assert_eq!(context.database.as_deref(), Some("FOO"));
        assert_eq!(context.schema.as_deref(), Some("BAR"));

        assert!(context.apply_use("USE DATABASE BAZ"));
        assert_eq!(context.database.as_deref(), Some("BAZ"));
        assert_eq!(context.schema, None);
    }

    #[test]
    fn test_non_use_statements_are_passed_through() {
        let mut context = SessionContext::default();
        assert!(!context.apply_use("CREATE DATABASE IF NOT EXISTS FOO"));
        assert!(!context.apply_use("SHOW DATABASES LIKE 'USER'"));
        assert!(!context.apply_use("USE"));
        assert_eq!(context, SessionContext::default());
    }

    #[test]
    fn test_decode_result_set() {
        let body = r#"{
            "statementHandle": "01b2",
            "resultSetMetaData": {
                "numRows": 1,
                "rowType": [{"name": "name"}, {"name": "kind"}],
                "partitionInfo": [{"rowCount": 1}]
            },
            "data": [["FOO", null]]
        }"#;
        let response: StatementResponse = serde_json::from_str(body).unwrap();
        let meta = response.result_set_meta_data.unwrap();
        assert_eq!(meta.row_type.len(), 2);
        assert_eq!(meta.partition_info.len(), 1);
        assert_eq!(response.data[0][0], JsonValue::String("FOO".into()));
    }

    #[test]
    fn test_connector_requires_token() {
        let config = WarehouseConfig {
            account: "xy12345".into(),
            ..Default::default()
        };
        assert!(matches!(
            SnowflakeConnector::new(&config),
            Err(MigrateError::Config(_))
        ));
    }
}
