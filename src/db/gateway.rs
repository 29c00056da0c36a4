use crate::db::connection::{ConnectionConfig, Connector, DbSession, Dsn, SslMode};
use crate::db::diagnostics::{slow_queries_from_result, slow_query_sql, SlowQueryRecord};
use crate::db::query::ExecutionResult;
use crate::error::{AssistantError, Result};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{info, warn};

pub const DEFAULT_SLOW_QUERY_THRESHOLD_MS: f64 = 1000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayState {
    Disconnected,
    Connected,
}

/// Sole owner of the database connection.
///
/// The session sits behind an async mutex, so concurrent calls to
/// [`execute`](Self::execute) run one at a time on the single connection.
pub struct DatabaseGateway {
    dsn: String,
    ssl_mode: SslMode,
    slow_query_threshold_ms: f64,
    connector: Arc<dyn Connector>,
    session: Mutex<Option<Box<dyn DbSession>>>,
}

impl DatabaseGateway {
    pub fn new(dsn: impl Into<String>, connector: Arc<dyn Connector>) -> Self {
        Self {
            dsn: dsn.into(),
            ssl_mode: SslMode::default(),
            slow_query_threshold_ms: DEFAULT_SLOW_QUERY_THRESHOLD_MS,
            connector,
            session: Mutex::new(None),
        }
    }

    pub fn with_ssl_mode(mut self, ssl_mode: SslMode) -> Self {
        self.ssl_mode = ssl_mode;
        self
    }

    pub fn with_slow_query_threshold(mut self, threshold_ms: f64) -> Self {
        self.slow_query_threshold_ms = threshold_ms;
        self
    }

    pub fn dsn(&self) -> &str {
        &self.dsn
    }

    pub async fn state(&self) -> GatewayState {
        if self.session.lock().await.is_some() {
            GatewayState::Connected
        } else {
            GatewayState::Disconnected
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.state().await == GatewayState::Connected
    }

    /// Open the connection. The descriptor is validated before any network
    /// call; an already open session is closed first.
    pub async fn connect(&self, username: &str, password: &str) -> Result<()> {
        let dsn: Dsn = self.dsn.parse()?;
        let config = ConnectionConfig {
            dsn,
            user: username.to_string(),
            password: password.to_string(),
            ssl_mode: self.ssl_mode,
        };

        let mut session = self.session.lock().await;
        if let Some(mut previous) = session.take() {
            previous.close().await;
        }

        match self.connector.connect(&config).await {
            Ok(new_session) => {
                info!("Connected to {} as {}", config.dsn, config.user);
                *session = Some(new_session);
                Ok(())
            }
            Err(e) => {
                warn!("Connection to {} failed: {}", config.dsn, e);
                Err(e)
            }
        }
    }

    pub async fn execute(&self, sql: &str) -> Result<ExecutionResult> {
        let mut guard = self.session.lock().await;
        let session = guard.as_mut().ok_or(AssistantError::NotConnected)?;

        let sql = strip_terminator(sql);
        let start = Instant::now();
        let raw = session.run(sql).await?;
        let result = ExecutionResult::from_raw(raw, start.elapsed().as_millis());

        info!(
            "Executed statement: {} row(s) in {} ms",
            result.row_count, result.execution_time_ms
        );
        Ok(result)
    }

    /// Best-effort read of the slowest statements. Failures are logged and
    /// reported as an empty list.
    pub async fn slow_queries(&self) -> Vec<SlowQueryRecord> {
        let sql = slow_query_sql(self.slow_query_threshold_ms);
        match self.execute(&sql).await {
            Ok(result) => slow_queries_from_result(&result),
            Err(e) => {
                warn!("Performance data error: {}", e);
                Vec::new()
            }
        }
    }

    /// Release the connection. Safe to call when already disconnected.
    pub async fn close(&self) {
        if let Some(mut session) = self.session.lock().await.take() {
            session.close().await;
            info!("Disconnected from {}", self.dsn);
        }
    }
}

/// Drop one trailing `;` (and surrounding whitespace) from a statement.
fn strip_terminator(sql: &str) -> &str {
    let trimmed = sql.trim();
    trimmed.strip_suffix(';').map(str::trim_end).unwrap_or(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_only_one_terminator() {
        assert_eq!(strip_terminator("SELECT 1 FROM DUAL;"), "SELECT 1 FROM DUAL");
        assert_eq!(strip_terminator("  SELECT 1 ;  \n"), "SELECT 1");
        assert_eq!(strip_terminator("SELECT 1;;"), "SELECT 1;");
        assert_eq!(strip_terminator("SELECT 1"), "SELECT 1");
    }
}
