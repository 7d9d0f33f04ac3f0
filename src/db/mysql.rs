//! MySQL connectivity over a mysql_async pool.

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, NaiveTime, Timelike};
use mysql_async::consts::ColumnType;
use mysql_async::prelude::Queryable;
use mysql_async::{Conn, Opts, OptsBuilder, Params, Pool, PoolConstraints, PoolOpts, Value};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::connector::{Connector, Session};
use super::row::Row;
use crate::error::{GatewayError, Result};
use crate::sql::{SqlValue, Statement};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MySqlConfig {
    /// `mysql://user@host:port/database`
    pub url: String,
    /// Overrides any password embedded in `url`.
    #[serde(skip_serializing, default)]
    pub password: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

fn default_pool_size() -> usize {
    8
}

pub struct MySqlConnector {
    pool: Pool,
}

impl MySqlConnector {
    pub fn new(config: &MySqlConfig) -> Result<Self> {
        let opts = Opts::from_url(&config.url)
            .map_err(|e| GatewayError::Config(format!("invalid MySQL url: {}", e)))?;
        let constraints = PoolConstraints::new(1, config.pool_size).ok_or_else(|| {
            GatewayError::Config(format!(
                "pool_size must be at least 1, got {}",
                config.pool_size
            ))
        })?;

        let mut builder =
            OptsBuilder::from_opts(opts).pool_opts(PoolOpts::default().with_constraints(constraints));
        if !config.password.is_empty() {
            builder = builder.pass(Some(config.password.clone()));
        }
        Ok(Self {
            pool: Pool::new(builder),
        })
    }
}

#[async_trait]
impl Connector for MySqlConnector {
    fn driver(&self) -> &'static str {
        "mysql"
    }

    async fn acquire(&self) -> Result<Box<dyn Session>> {
        let conn = self.pool.get_conn().await.map_err(|e| classify(&e))?;
        Ok(Box::new(MySqlSession {
            conn: Some(conn),
            in_transaction: false,
        }))
    }
}

struct MySqlSession {
    conn: Option<Conn>,
    in_transaction: bool,
}

impl MySqlSession {
    fn conn(&mut self) -> Result<&mut Conn> {
        self.conn
            .as_mut()
            .ok_or_else(|| GatewayError::Connection("session already released".into()))
    }

    async fn control(&mut self, sql: &str) -> Result<()> {
        self.conn()?
            .query_drop(sql)
            .await
            .map_err(|e| classify(&e))
    }
}

#[async_trait]
impl Session for MySqlSession {
    async fn query(&mut self, statement: &Statement) -> Result<Vec<Row>> {
        let params = bind_params(&statement.params);
        let rows: Vec<mysql_async::Row> = self
            .conn()?
            .exec(statement.sql.as_str(), params)
            .await
            .map_err(|e| classify(&e))?;
        debug!(
            operation = statement.operation.name(),
            rows = rows.len(),
            "mysql query"
        );

        rows.into_iter()
            .map(|mut row| {
                let columns = row.columns();
                let names: Vec<String> = columns.iter().map(|c| c.name_str().into_owned()).collect();
                let values = columns
                    .iter()
                    .enumerate()
                    .map(|(i, col)| {
                        let raw = row.take::<Value, _>(i).unwrap_or(Value::NULL);
                        from_mysql(raw, col.column_type())
                    })
                    .collect();
                Row::conform(&names, values, &statement.columns)
            })
            .collect()
    }

    async fn execute(&mut self, statement: &Statement) -> Result<u64> {
        let params = bind_params(&statement.params);
        let conn = self.conn()?;
        conn.exec_drop(statement.sql.as_str(), params)
            .await
            .map_err(|e| classify(&e))?;
        let affected = conn.affected_rows();
        debug!(
            operation = statement.operation.name(),
            affected, "mysql execute"
        );
        Ok(affected)
    }

    async fn begin(&mut self) -> Result<()> {
        self.control("START TRANSACTION").await?;
        self.in_transaction = true;
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        self.control("COMMIT").await?;
        self.in_transaction = false;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        let result = self.control("ROLLBACK").await;
        self.in_transaction = false;
        result
    }
}

impl Drop for MySqlSession {
    fn drop(&mut self) {
        if !self.in_transaction {
            return;
        }
        if let Some(conn) = self.conn.take() {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(async move {
                        if let Err(e) = conn.disconnect().await {
                            warn!(error = %e, "failed to close abandoned MySQL session");
                        }
                    });
                }
                Err(_) => warn!("MySQL session dropped mid-transaction outside a runtime"),
            }
        }
    }
}

fn bind_params(values: &[SqlValue]) -> Params {
    if values.is_empty() {
        return Params::Empty;
    }
    Params::Positional(values.iter().map(to_mysql).collect())
}

fn to_mysql(value: &SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::NULL,
        SqlValue::Bool(b) => Value::Int(i64::from(*b)),
        SqlValue::Int(i) => Value::Int(*i),
        SqlValue::Float(f) => Value::Double(*f),
        SqlValue::Text(s) => Value::Bytes(s.clone().into_bytes()),
        SqlValue::Date(d) => date_value(*d, NaiveTime::default()),
        SqlValue::Timestamp(ts) => date_value(ts.date(), ts.time()),
    }
}

fn date_value(date: NaiveDate, time: NaiveTime) -> Value {
    Value::Date(
        date.year() as u16,
        date.month() as u8,
        date.day() as u8,
        time.hour() as u8,
        time.minute() as u8,
        time.second() as u8,
        time.nanosecond() / 1_000,
    )
}

fn from_mysql(value: Value, column_type: ColumnType) -> SqlValue {
    match value {
        Value::NULL => SqlValue::Null,
        Value::Int(i) => SqlValue::Int(i),
        Value::UInt(u) => i64::try_from(u)
            .map(SqlValue::Int)
            .unwrap_or(SqlValue::Float(u as f64)),
        Value::Float(f) => SqlValue::Float(f64::from(f)),
        Value::Double(d) => SqlValue::Float(d),
        Value::Bytes(bytes) => {
            let text = String::from_utf8_lossy(&bytes).into_owned();
            match column_type {
                ColumnType::MYSQL_TYPE_DECIMAL | ColumnType::MYSQL_TYPE_NEWDECIMAL => text
                    .parse::<f64>()
                    .map(SqlValue::Float)
                    .unwrap_or(SqlValue::Text(text)),
                _ => SqlValue::Text(text),
            }
        }
        Value::Date(y, mo, d, h, mi, s, us) => {
            let date = NaiveDate::from_ymd_opt(i32::from(y), u32::from(mo), u32::from(d));
            match (column_type, date) {
                (ColumnType::MYSQL_TYPE_DATE | ColumnType::MYSQL_TYPE_NEWDATE, Some(date)) => {
                    SqlValue::Date(date)
                }
                (_, Some(date)) => date
                    .and_hms_micro_opt(u32::from(h), u32::from(mi), u32::from(s), us)
                    .map(SqlValue::Timestamp)
                    .unwrap_or(SqlValue::Date(date)),
                // Zero dates ('0000-00-00') have no calendar value
                (_, None) => SqlValue::Null,
            }
        }
        Value::Time(neg, days, h, mi, s, _) => {
            let hours = days * 24 + u32::from(h);
            let sign = if neg { "-" } else { "" };
            SqlValue::Text(format!("{}{:02}:{:02}:{:02}", sign, hours, mi, s))
        }
    }
}

/// Map a driver error onto the gateway taxonomy.
pub(crate) fn classify(err: &mysql_async::Error) -> GatewayError {
    match err {
        mysql_async::Error::Server(server) => classify_server_code(server.code, &server.message),
        mysql_async::Error::Io(_) | mysql_async::Error::Driver(_) => {
            GatewayError::Connection(err.to_string())
        }
        other => GatewayError::Query(other.to_string()),
    }
}

fn classify_server_code(code: u16, message: &str) -> GatewayError {
    match code {
        // duplicate key, NOT NULL, foreign key, missing default, data too long
        1022 | 1048 | 1062 | 1216 | 1217 | 1364 | 1406 | 1451 | 1452 => {
            GatewayError::ConstraintViolation(message.to_string())
        }
        _ => GatewayError::Query(format!("{} (error {})", message, code)),
    }
}
