//! Oracle connectivity through the `oracle` crate (ODPI-C).
//!
//! The driver is blocking, so every round trip runs on the blocking pool
//! with the connection moved in and handed back. Each session owns one
//! connection; dropping the session closes it, which rolls back anything
//! left uncommitted.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OracleConfig {
    pub username: String,
    #[serde(skip_serializing, default)]
    pub password: String,
    /// Easy Connect string or TNS alias, e.g. `//localhost:1521/XEPDB1`.
    pub connect_string: String,
}

impl OracleConfig {
    pub fn display_string(&self) -> String {
        format!("{}@{}", self.username, self.connect_string)
    }
}

#[cfg(feature = "oracle")]
pub use driver::OracleConnector;

#[cfg(feature = "oracle")]
mod driver {
    use async_trait::async_trait;
    use chrono::{NaiveDateTime, NaiveTime};
    use oracle::sql_type::{OracleType, ToSql};
    use oracle::Connection;
    use tracing::{debug, warn};

    use super::OracleConfig;
    use crate::db::connector::{Connector, Session};
    use crate::db::row::Row;
    use crate::error::{GatewayError, Result};
    use crate::sql::{SqlValue, Statement};

    pub struct OracleConnector {
        config: OracleConfig,
    }

    impl OracleConnector {
        /// Connections are opened per session on `acquire`.
        pub fn new(config: &OracleConfig) -> Result<Self> {
            if config.connect_string.trim().is_empty() {
                return Err(GatewayError::Config(format!(
                    "{}: connect_string is empty",
                    config.display_string()
                )));
            }
            Ok(Self {
                config: config.clone(),
            })
        }
    }

    #[async_trait]
    impl Connector for OracleConnector {
        fn driver(&self) -> &'static str {
            "oracle"
        }

        async fn acquire(&self) -> Result<Box<dyn Session>> {
            let config = self.config.clone();
            let conn = tokio::task::spawn_blocking(move || {
                Connection::connect(&config.username, &config.password, &config.connect_string)
            })
            .await
            .map_err(|e| GatewayError::Connection(e.to_string()))?
            .map_err(|e| classify(&e))?;
            Ok(Box::new(OracleSession {
                conn: Some(conn),
                in_transaction: false,
            }))
        }
    }

    struct OracleSession {
        conn: Option<Connection>,
        in_transaction: bool,
    }

    impl OracleSession {
        /// Run `work` on the blocking pool and put the connection back.
        async fn blocking<T, F>(&mut self, work: F) -> Result<T>
        where
            T: Send + 'static,
            F: FnOnce(&Connection) -> oracle::Result<T> + Send + 'static,
        {
            let conn = self
                .conn
                .take()
                .ok_or_else(|| GatewayError::Connection("session already released".into()))?;
            let (conn, result) = tokio::task::spawn_blocking(move || {
                let result = work(&conn);
                (conn, result)
            })
            .await
            .map_err(|e| GatewayError::Connection(e.to_string()))?;
            self.conn = Some(conn);
            result.map_err(|e| classify(&e))
        }
    }

    #[async_trait]
    impl Session for OracleSession {
        async fn query(&mut self, statement: &Statement) -> Result<Vec<Row>> {
            let sql = statement.sql.clone();
            let params = statement.params.clone();
            let (names, cells) = self
                .blocking(move |conn| {
                    let bound = bind_params(&params);
                    let refs: Vec<&dyn ToSql> = bound.iter().map(|b| b.as_ref() as &dyn ToSql).collect();
                    let rows = conn.query(&sql, &refs)?;
                    let columns: Vec<(String, OracleType)> = rows
                        .column_info()
                        .iter()
                        .map(|c| (c.name().to_string(), c.oracle_type().clone()))
                        .collect();
                    let mut cells = Vec::new();
                    for row in rows {
                        let row = row?;
                        let mut values = Vec::with_capacity(columns.len());
                        for (idx, (_, ty)) in columns.iter().enumerate() {
                            values.push(read_cell(&row, idx, ty)?);
                        }
                        cells.push(values);
                    }
                    let names = columns.into_iter().map(|(name, _)| name).collect::<Vec<_>>();
                    Ok((names, cells))
                })
                .await?;
            debug!(
                operation = statement.operation.name(),
                rows = cells.len(),
                "oracle query"
            );

            cells
                .into_iter()
                .map(|values| Row::conform(&names, values, &statement.columns))
                .collect()
        }

        async fn execute(&mut self, statement: &Statement) -> Result<u64> {
            let sql = statement.sql.clone();
            let params = statement.params.clone();
            let autocommit = !self.in_transaction;
            let affected = self
                .blocking(move |conn| {
                    let bound = bind_params(&params);
                    let refs: Vec<&dyn ToSql> = bound.iter().map(|b| b.as_ref() as &dyn ToSql).collect();
                    let affected = conn.execute(&sql, &refs)?.row_count()?;
                    if autocommit {
                        conn.commit()?;
                    }
                    Ok(affected)
                })
                .await?;
            debug!(
                operation = statement.operation.name(),
                affected, "oracle execute"
            );
            Ok(affected)
        }

        // Oracle opens a transaction implicitly with the first write.
        async fn begin(&mut self) -> Result<()> {
            self.in_transaction = true;
            Ok(())
        }

        async fn commit(&mut self) -> Result<()> {
            self.blocking(|conn| conn.commit()).await?;
            self.in_transaction = false;
            Ok(())
        }

        async fn rollback(&mut self) -> Result<()> {
            let result = self.blocking(|conn| conn.rollback()).await;
            self.in_transaction = false;
            result
        }
    }

    impl Drop for OracleSession {
        fn drop(&mut self) {
            let Some(conn) = self.conn.take() else {
                return;
            };
            if self.in_transaction {
                debug!("closing Oracle session with an open transaction");
            }
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn_blocking(move || {
                        if let Err(e) = conn.close() {
                            warn!(error = %e, "failed to close Oracle session");
                        }
                    });
                }
                Err(_) => drop(conn),
            }
        }
    }

    fn bind_params(values: &[SqlValue]) -> Vec<Box<dyn ToSql + Send>> {
        values
            .iter()
            .map(|value| -> Box<dyn ToSql + Send> {
                match value {
                    SqlValue::Null => Box::new(None::<String>),
                    SqlValue::Bool(b) => Box::new(i64::from(*b)),
                    SqlValue::Int(i) => Box::new(*i),
                    SqlValue::Float(f) => Box::new(*f),
                    SqlValue::Text(s) => Box::new(s.clone()),
                    SqlValue::Date(d) => Box::new(d.and_time(NaiveTime::default())),
                    SqlValue::Timestamp(ts) => Box::new(*ts),
                }
            })
            .collect()
    }

    fn read_cell(row: &oracle::Row, idx: usize, ty: &OracleType) -> oracle::Result<SqlValue> {
        let cell = match ty {
            OracleType::BinaryFloat | OracleType::BinaryDouble => row
                .get::<usize, Option<f64>>(idx)?
                .map(SqlValue::Float)
                .unwrap_or(SqlValue::Null),
            OracleType::Number(..) | OracleType::Float(..) | OracleType::Int64 => row
                .get::<usize, Option<String>>(idx)?
                .map(|text| number_cell(&text))
                .unwrap_or(SqlValue::Null),
            OracleType::Date => row
                .get::<usize, Option<NaiveDateTime>>(idx)?
                .map(date_cell)
                .unwrap_or(SqlValue::Null),
            OracleType::Timestamp(..) | OracleType::TimestampTZ(..) | OracleType::TimestampLTZ(..) => {
                row.get::<usize, Option<NaiveDateTime>>(idx)?
                    .map(SqlValue::Timestamp)
                    .unwrap_or(SqlValue::Null)
            }
            _ => row
                .get::<usize, Option<String>>(idx)?
                .map(SqlValue::Text)
                .unwrap_or(SqlValue::Null),
        };
        Ok(cell)
    }

    /// NUMBER arrives as text; integral values stay integers.
    fn number_cell(text: &str) -> SqlValue {
        let text = text.trim();
        if let Ok(i) = text.parse::<i64>() {
            return SqlValue::Int(i);
        }
        text.parse::<f64>()
            .map(SqlValue::Float)
            .unwrap_or_else(|_| SqlValue::Text(text.to_string()))
    }

    /// DATE always carries a time of day; midnight means a plain date.
    fn date_cell(value: NaiveDateTime) -> SqlValue {
        if value.time() == NaiveTime::default() {
            SqlValue::Date(value.date())
        } else {
            SqlValue::Timestamp(value)
        }
    }

    fn classify(err: &oracle::Error) -> GatewayError {
        match err {
            oracle::Error::OciError(db) => classify_ora_code(db.code(), &err.to_string()),
            // ODPI-C errors: missing client library, broken session handles
            oracle::Error::DpiError(_) => GatewayError::Connection(err.to_string()),
            _ => GatewayError::Query(err.to_string()),
        }
    }

    fn classify_ora_code(code: i32, message: &str) -> GatewayError {
        match code {
            // unique, NOT NULL, check, foreign key, value too large
            1 | 1400 | 1407 | 2290 | 2291 | 2292 | 12899 => {
                GatewayError::ConstraintViolation(message.to_string())
            }
            // invalid credentials, lost connection, TNS listener failures
            1017 | 3113 | 3114 | 3135 | 12170 | 12514 | 12541 | 12543 | 12545 => {
                GatewayError::Connection(message.to_string())
            }
            _ => GatewayError::Query(message.to_string()),
        }
    }

}
