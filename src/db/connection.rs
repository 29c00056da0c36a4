use crate::db::query::{pg_type_to_string, pg_value_to_json, ColumnDef, RawResult};
use crate::error::{AssistantError, Result, VendorError};
use async_trait::async_trait;
use postgres_native_tls::MakeTlsConnector;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_postgres::Client;
use tracing::{debug, warn};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// A `host:port/service` descriptor. For PostgreSQL the service is the database name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dsn {
    pub host: String,
    pub port: u16,
    pub service: String,
}

impl FromStr for Dsn {
    type Err = AssistantError;

    fn from_str(s: &str) -> Result<Self> {
        let malformed = || AssistantError::MalformedDsn(s.to_string());
        let (host, port_service) = s.trim().split_once(':').ok_or_else(malformed)?;
        let (port, service) = port_service.split_once('/').ok_or_else(malformed)?;
        let port: u16 = port.trim().parse().map_err(|_| malformed())?;
        if host.trim().is_empty() || service.trim().is_empty() {
            return Err(malformed());
        }
        Ok(Dsn {
            host: host.trim().to_string(),
            port,
            service: service.trim().to_string(),
        })
    }
}

impl fmt::Display for Dsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.host, self.port, self.service)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SslMode {
    #[default]
    Prefer,
    Require,
    Disable,
}

impl FromStr for SslMode {
    type Err = AssistantError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "prefer" => Ok(SslMode::Prefer),
            "require" => Ok(SslMode::Require),
            "disable" => Ok(SslMode::Disable),
            other => Err(AssistantError::Config(format!(
                "Invalid ssl mode '{}'. Use 'disable', 'prefer' or 'require'.",
                other
            ))),
        }
    }
}

impl From<SslMode> for tokio_postgres::config::SslMode {
    fn from(mode: SslMode) -> Self {
        match mode {
            SslMode::Prefer => tokio_postgres::config::SslMode::Prefer,
            SslMode::Require => tokio_postgres::config::SslMode::Require,
            SslMode::Disable => tokio_postgres::config::SslMode::Disable,
        }
    }
}

#[derive(Clone)]
pub struct ConnectionConfig {
    pub dsn: Dsn,
    pub user: String,
    pub password: String,
    pub ssl_mode: SslMode,
}

// Password stays out of logs.
impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("dsn", &self.dsn)
            .field("user", &self.user)
            .field("ssl_mode", &self.ssl_mode)
            .finish_non_exhaustive()
    }
}

/// Opens sessions against a database backend.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, config: &ConnectionConfig) -> Result<Box<dyn DbSession>>;
}

/// One live connection. Implementations translate every driver failure into
/// [`AssistantError::Execution`] so no driver type crosses this boundary.
#[async_trait]
pub trait DbSession: Send {
    async fn run(&mut self, sql: &str) -> Result<RawResult>;

    /// Release the connection. Calling it more than once is a no-op.
    async fn close(&mut self);
}

/// Connects with `tokio-postgres`, using native TLS according to the ssl mode.
#[derive(Debug, Default, Clone)]
pub struct PostgresConnector;

#[async_trait]
impl Connector for PostgresConnector {
    async fn connect(&self, config: &ConnectionConfig) -> Result<Box<dyn DbSession>> {
        let mut pg_config = tokio_postgres::Config::new();
        pg_config
            .host(&config.dsn.host)
            .port(config.dsn.port)
            .dbname(&config.dsn.service)
            .user(&config.user)
            .password(&config.password)
            .ssl_mode(config.ssl_mode.into())
            .connect_timeout(CONNECT_TIMEOUT);

        let tls_connector = native_tls::TlsConnector::builder().build().map_err(|e| {
            AssistantError::Connection(VendorError::new("08001", format!("TLS setup failed: {}", e)))
        })?;

        let (client, connection) = pg_config
            .connect(MakeTlsConnector::new(tls_connector))
            .await
            .map_err(|e| {
                let vendor = VendorError::from_postgres(&e, "08001");
                if vendor.is_auth_failure() {
                    AssistantError::Authentication(vendor)
                } else {
                    AssistantError::Connection(vendor)
                }
            })?;

        // Spawn the connection handler
        let driver = tokio::spawn(async move {
            if let Err(e) = connection.await {
                warn!("PostgreSQL connection error: {}", e);
            }
        });

        Ok(Box::new(PgSession {
            client: Some(client),
            driver: Some(driver),
        }))
    }
}

struct PgSession {
    client: Option<Client>,
    driver: Option<JoinHandle<()>>,
}

#[async_trait]
impl DbSession for PgSession {
    async fn run(&mut self, sql: &str) -> Result<RawResult> {
        let to_domain = |e: tokio_postgres::Error| {
            AssistantError::Execution(VendorError::from_postgres(&e, "08006"))
        };
        let client = self.client.as_ref().ok_or(AssistantError::NotConnected)?;

        // The prepared statement is closed server-side when `stmt` drops,
        // including on the error path below.
        let stmt = client.prepare(sql).await.map_err(to_domain)?;
        let rows = client.query(&stmt, &[]).await.map_err(to_domain)?;

        if stmt.columns().is_empty() {
            debug!("Statement produced no column description");
            return Ok(RawResult {
                columns: None,
                rows: Vec::new(),
            });
        }

        let columns: Vec<ColumnDef> = stmt
            .columns()
            .iter()
            .map(|col| ColumnDef {
                name: col.name().to_string(),
                data_type: pg_type_to_string(col.type_()),
            })
            .collect();

        let mut result_rows = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut values = Vec::with_capacity(columns.len());
            for i in 0..columns.len() {
                values.push(pg_value_to_json(row, i));
            }
            result_rows.push(values);
        }

        Ok(RawResult {
            columns: Some(columns),
            rows: result_rows,
        })
    }

    async fn close(&mut self) {
        // Dropping the last client handle ends the connection future.
        drop(self.client.take());
        if let Some(driver) = self.driver.take() {
            if let Err(e) = driver.await {
                warn!("Connection task ended abnormally: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_host_port_service() {
        let dsn: Dsn = "db.internal:5432/sales".parse().unwrap();
        assert_eq!(dsn.host, "db.internal");
        assert_eq!(dsn.port, 5432);
        assert_eq!(dsn.service, "sales");
        assert_eq!(dsn.to_string(), "db.internal:5432/sales");
    }

    #[test]
    fn rejects_descriptor_without_separators() {
        for raw in ["localhost:5432", "localhost/sales", "localhost", "", "host/5432:sales"] {
            let err = raw.parse::<Dsn>().unwrap_err();
            assert!(matches!(err, AssistantError::MalformedDsn(_)), "{raw}");
        }
    }

    #[test]
    fn rejects_non_numeric_port_and_empty_parts() {
        assert!(matches!(
            "localhost:pg/sales".parse::<Dsn>(),
            Err(AssistantError::MalformedDsn(_))
        ));
        assert!(matches!(
            ":5432/sales".parse::<Dsn>(),
            Err(AssistantError::MalformedDsn(_))
        ));
        assert!(matches!(
            "localhost:5432/".parse::<Dsn>(),
            Err(AssistantError::MalformedDsn(_))
        ));
    }

    #[test]
    fn ssl_mode_parsing() {
        assert_eq!("REQUIRE".parse::<SslMode>().unwrap(), SslMode::Require);
        assert_eq!("disable".parse::<SslMode>().unwrap(), SslMode::Disable);
        assert!("verify-full".parse::<SslMode>().is_err());
    }

    #[test]
    fn debug_output_hides_password() {
        let config = ConnectionConfig {
            dsn: "localhost:5432/hr".parse().unwrap(),
            user: "hr".into(),
            password: "hunter2".into(),
            ssl_mode: SslMode::Disable,
        };
        assert!(!format!("{:?}", config).contains("hunter2"));
    }
}
