//! PostgreSQL connectivity: deadpool-managed tokio-postgres sessions.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use deadpool_postgres::{
    Config as DeadpoolConfig, ManagerConfig, Object, Pool, PoolConfig, RecyclingMethod, Runtime,
    SslMode as PoolSslMode, Timeouts,
};
use postgres_native_tls::MakeTlsConnector;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::NoTls;
use tracing::debug;

use super::connector::{Connector, Session};
use super::row::Row;
use crate::error::{GatewayError, Result};
use crate::sql::{SqlValue, Statement};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
const POOL_WAIT_MS: u64 = 15_000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PostgresConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub database: String,
    pub username: String,
    #[serde(skip_serializing, default)]
    pub password: String,
    #[serde(default)]
    pub ssl_mode: SslMode,
    /// Skip certificate verification. Ignored for `VerifyCa`/`VerifyFull`.
    #[serde(default)]
    pub accept_invalid_certs: bool,
    /// PEM bundle of extra trusted roots.
    #[serde(default)]
    pub ca_cert_path: Option<String>,
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

fn default_port() -> u16 {
    5432
}

fn default_pool_size() -> usize {
    8
}

/// SSL/TLS connection modes, matching libpq's `sslmode`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum SslMode {
    Disable,
    #[default]
    Prefer,
    Require,
    VerifyCa,
    VerifyFull,
}

impl PostgresConfig {
    pub fn display_string(&self) -> String {
        format!(
            "{}@{}:{}/{}",
            self.username, self.host, self.port, self.database
        )
    }
}

pub struct PostgresConnector {
    pool: Pool,
}

impl PostgresConnector {
    /// Build the pool. No connection is opened until the first `acquire`.
    pub fn new(config: &PostgresConfig) -> Result<Self> {
        if config.pool_size == 0 {
            return Err(GatewayError::Config(format!(
                "{}: pool_size must be at least 1",
                config.display_string()
            )));
        }

        let mut cfg = DeadpoolConfig::new();
        cfg.host = Some(config.host.clone());
        cfg.port = Some(config.port);
        cfg.dbname = Some(config.database.clone());
        cfg.user = Some(config.username.clone());
        cfg.password = Some(config.password.clone());
        cfg.connect_timeout = Some(CONNECT_TIMEOUT);
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Clean,
        });
        let mut pool_config = PoolConfig::new(config.pool_size);
        pool_config.timeouts = Timeouts::wait_millis(POOL_WAIT_MS);
        cfg.pool = Some(pool_config);

        let pool = match config.ssl_mode {
            SslMode::Disable => {
                cfg.ssl_mode = Some(PoolSslMode::Disable);
                cfg.create_pool(Some(Runtime::Tokio1), NoTls)
            }
            SslMode::Prefer => {
                cfg.ssl_mode = Some(PoolSslMode::Prefer);
                cfg.create_pool(Some(Runtime::Tokio1), build_tls_connector(config)?)
            }
            SslMode::Require | SslMode::VerifyCa | SslMode::VerifyFull => {
                cfg.ssl_mode = Some(PoolSslMode::Require);
                cfg.create_pool(Some(Runtime::Tokio1), build_tls_connector(config)?)
            }
        }
        .map_err(|e| GatewayError::Config(format!("{}: {}", config.display_string(), e)))?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl Connector for PostgresConnector {
    fn driver(&self) -> &'static str {
        "postgres"
    }

    async fn acquire(&self) -> Result<Box<dyn Session>> {
        let client = self
            .pool
            .get()
            .await
            .map_err(|e| GatewayError::Connection(e.to_string()))?;
        Ok(Box::new(PostgresSession {
            client: Some(client),
            in_transaction: false,
        }))
    }
}

struct PostgresSession {
    client: Option<Object>,
    in_transaction: bool,
}

impl PostgresSession {
    fn client(&self) -> Result<&Object> {
        self.client
            .as_ref()
            .ok_or_else(|| GatewayError::Connection("session already released".into()))
    }

    async fn prepare(&self, statement: &Statement) -> Result<(tokio_postgres::Statement, Params)> {
        let params = Params::bind(&statement.params);
        let prepared = self
            .client()?
            .prepare_typed_cached(&statement.sql, &params.types)
            .await
            .map_err(|e| classify(&e))?;
        Ok((prepared, params))
    }

    async fn batch(&mut self, sql: &str) -> Result<()> {
        self.client()?
            .batch_execute(sql)
            .await
            .map_err(|e| classify(&e))
    }
}

#[async_trait]
impl Session for PostgresSession {
    async fn query(&mut self, statement: &Statement) -> Result<Vec<Row>> {
        let (prepared, params) = self.prepare(statement).await?;
        let rows = self
            .client()?
            .query(&prepared, &params.refs())
            .await
            .map_err(|e| classify(&e))?;
        debug!(
            operation = statement.operation.name(),
            rows = rows.len(),
            "postgres query"
        );

        rows.iter()
            .map(|row| {
                let names: Vec<String> =
                    row.columns().iter().map(|c| c.name().to_string()).collect();
                let values = row
                    .columns()
                    .iter()
                    .enumerate()
                    .map(|(i, col)| extract_value(row, i, col.type_()))
                    .collect();
                Row::conform(&names, values, &statement.columns)
            })
            .collect()
    }

    async fn execute(&mut self, statement: &Statement) -> Result<u64> {
        let (prepared, params) = self.prepare(statement).await?;
        let affected = self
            .client()?
            .execute(&prepared, &params.refs())
            .await
            .map_err(|e| classify(&e))?;
        debug!(
            operation = statement.operation.name(),
            affected, "postgres execute"
        );
        Ok(affected)
    }

    async fn begin(&mut self) -> Result<()> {
        self.batch("BEGIN").await?;
        self.in_transaction = true;
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        self.batch("COMMIT").await?;
        self.in_transaction = false;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        let result = self.batch("ROLLBACK").await;
        self.in_transaction = false;
        result
    }
}

impl Drop for PostgresSession {
    fn drop(&mut self) {
        if self.in_transaction {
            if let Some(client) = self.client.take() {
                // Detach from the pool so the open transaction dies with the connection
                drop(Object::take(client));
            }
        }
    }
}

/// Bound parameters with the explicit types they are prepared with.
struct Params {
    types: Vec<Type>,
    values: Vec<Box<dyn ToSql + Sync + Send>>,
}

impl Params {
    fn bind(values: &[SqlValue]) -> Self {
        let mut types = Vec::with_capacity(values.len());
        let mut boxed: Vec<Box<dyn ToSql + Sync + Send>> = Vec::with_capacity(values.len());
        for value in values {
            let (ty, v): (Type, Box<dyn ToSql + Sync + Send>) = match value {
                // Only nullable text columns receive NULL
                SqlValue::Null => (Type::TEXT, Box::new(Option::<String>::None)),
                SqlValue::Bool(b) => (Type::BOOL, Box::new(*b)),
                SqlValue::Int(i) => (Type::INT8, Box::new(*i)),
                SqlValue::Float(f) => (Type::FLOAT8, Box::new(*f)),
                SqlValue::Text(s) => (Type::TEXT, Box::new(s.clone())),
                SqlValue::Date(d) => (Type::DATE, Box::new(*d)),
                SqlValue::Timestamp(ts) => (Type::TIMESTAMP, Box::new(*ts)),
            };
            types.push(ty);
            boxed.push(v);
        }
        Self {
            types,
            values: boxed,
        }
    }

    fn refs(&self) -> Vec<&(dyn ToSql + Sync)> {
        self.values
            .iter()
            .map(|v| v.as_ref() as &(dyn ToSql + Sync))
            .collect()
    }
}

fn extract_value(row: &tokio_postgres::Row, idx: usize, pg_type: &Type) -> SqlValue {
    match *pg_type {
        Type::BOOL => row
            .try_get::<_, Option<bool>>(idx)
            .ok()
            .flatten()
            .map(SqlValue::Bool)
            .unwrap_or(SqlValue::Null),
        Type::INT2 => row
            .try_get::<_, Option<i16>>(idx)
            .ok()
            .flatten()
            .map(|i| SqlValue::Int(i64::from(i)))
            .unwrap_or(SqlValue::Null),
        Type::INT4 => row
            .try_get::<_, Option<i32>>(idx)
            .ok()
            .flatten()
            .map(|i| SqlValue::Int(i64::from(i)))
            .unwrap_or(SqlValue::Null),
        Type::INT8 => row
            .try_get::<_, Option<i64>>(idx)
            .ok()
            .flatten()
            .map(SqlValue::Int)
            .unwrap_or(SqlValue::Null),
        Type::FLOAT4 => row
            .try_get::<_, Option<f32>>(idx)
            .ok()
            .flatten()
            .map(|f| SqlValue::Float(f64::from(f)))
            .unwrap_or(SqlValue::Null),
        Type::FLOAT8 => row
            .try_get::<_, Option<f64>>(idx)
            .ok()
            .flatten()
            .map(SqlValue::Float)
            .unwrap_or(SqlValue::Null),
        Type::NUMERIC => row
            .try_get::<_, Option<Decimal>>(idx)
            .ok()
            .flatten()
            .map(numeric_value)
            .unwrap_or(SqlValue::Null),
        Type::DATE => row
            .try_get::<_, Option<NaiveDate>>(idx)
            .ok()
            .flatten()
            .map(SqlValue::Date)
            .unwrap_or(SqlValue::Null),
        Type::TIME => row
            .try_get::<_, Option<NaiveTime>>(idx)
            .ok()
            .flatten()
            .map(|t| SqlValue::Text(t.to_string()))
            .unwrap_or(SqlValue::Null),
        Type::TIMESTAMP => row
            .try_get::<_, Option<NaiveDateTime>>(idx)
            .ok()
            .flatten()
            .map(SqlValue::Timestamp)
            .unwrap_or(SqlValue::Null),
        Type::TIMESTAMPTZ => row
            .try_get::<_, Option<DateTime<Utc>>>(idx)
            .ok()
            .flatten()
            .map(|ts| SqlValue::Timestamp(ts.naive_utc()))
            .unwrap_or(SqlValue::Null),
        _ => row
            .try_get::<_, Option<String>>(idx)
            .ok()
            .flatten()
            .map(SqlValue::Text)
            .unwrap_or(SqlValue::Null),
    }
}

/// NUMERIC as a float; values outside `Decimal`'s range have no cell value.
fn numeric_value(value: Decimal) -> SqlValue {
    value.to_f64().map(SqlValue::Float).unwrap_or(SqlValue::Null)
}

/// Build a TLS connector for the configured verification level.
fn build_tls_connector(config: &PostgresConfig) -> Result<MakeTlsConnector> {
    let strict = matches!(config.ssl_mode, SslMode::VerifyCa | SslMode::VerifyFull);
    let mut builder = native_tls::TlsConnector::builder();

    if config.accept_invalid_certs && !strict {
        builder.danger_accept_invalid_certs(true);
        builder.danger_accept_invalid_hostnames(true);
    } else {
        if config.ssl_mode == SslMode::VerifyCa {
            builder.danger_accept_invalid_hostnames(true);
        }
        if let Some(ca_path) = &config.ca_cert_path {
            let pem = std::fs::read(ca_path).map_err(|e| {
                GatewayError::Config(format!("failed to read CA certificate {}: {}", ca_path, e))
            })?;
            for block in pem_blocks(&pem)? {
                let cert = native_tls::Certificate::from_pem(block.as_bytes()).map_err(|e| {
                    GatewayError::Config(format!("invalid CA certificate in {}: {}", ca_path, e))
                })?;
                builder.add_root_certificate(cert);
            }
        }
    }

    let connector = builder
        .build()
        .map_err(|e| GatewayError::Config(format!("failed to build TLS connector: {}", e)))?;
    Ok(MakeTlsConnector::new(connector))
}

/// Split a PEM bundle into one string per certificate.
fn pem_blocks(pem_data: &[u8]) -> Result<Vec<String>> {
    let pem_str = std::str::from_utf8(pem_data)
        .map_err(|_| GatewayError::Config("CA certificate file is not valid UTF-8".into()))?;

    let mut blocks = Vec::new();
    let mut current = String::new();
    let mut in_cert = false;

    for line in pem_str.lines() {
        if line.contains("-----BEGIN CERTIFICATE-----") {
            in_cert = true;
            current.clear();
        }
        if in_cert {
            current.push_str(line.trim());
            current.push('\n');
        }
        if line.contains("-----END CERTIFICATE-----") && in_cert {
            in_cert = false;
            blocks.push(std::mem::take(&mut current));
        }
    }

    if blocks.is_empty() {
        return Err(GatewayError::Config(
            "no certificates found in PEM data".into(),
        ));
    }
    Ok(blocks)
}

/// Map a driver error onto the gateway taxonomy.
pub(crate) fn classify(err: &tokio_postgres::Error) -> GatewayError {
    match err.as_db_error() {
        Some(db) => classify_sqlstate(db.code().code(), db.message()),
        None => GatewayError::Connection(err.to_string()),
    }
}

fn classify_sqlstate(code: &str, message: &str) -> GatewayError {
    match code.get(..2) {
        // Class 23: Integrity Constraint Violation
        Some("23") => GatewayError::ConstraintViolation(message.to_string()),
        // Class 08: Connection Exception
        Some("08") => GatewayError::Connection(message.to_string()),
        _ => GatewayError::Query(format!("{} (SQLSTATE {})", message, code)),
    }
}
