//! SQL dialects spoken by the three stores.
//!
//! Every syntax fragment that differs between backends is produced here by
//! an exhaustive match, so adding a dialect fails to compile until each
//! fragment has an answer for it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::value::SqlValue;
use crate::error::GatewayError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Oracle,
    #[serde(rename = "mysql")]
    MySql,
    #[serde(alias = "postgresql")]
    Postgres,
}

/// How a dialect restricts the number of returned rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowLimit {
    /// Predicate on the synthetic `ROWNUM` pseudo-column.
    RownumPredicate,
    /// Trailing `LIMIT n` clause.
    LimitClause,
}

impl Dialect {
    pub const ALL: [Dialect; 3] = [Dialect::Oracle, Dialect::MySql, Dialect::Postgres];

    pub fn name(self) -> &'static str {
        match self {
            Dialect::Oracle => "oracle",
            Dialect::MySql => "mysql",
            Dialect::Postgres => "postgres",
        }
    }

    /// Placeholder for the 1-based parameter `index`.
    pub fn placeholder(self, index: usize) -> String {
        match self {
            Dialect::Oracle => format!(":{}", index),
            Dialect::MySql => "?".to_string(),
            Dialect::Postgres => format!("${}", index),
        }
    }

    pub fn row_limit(self) -> RowLimit {
        match self {
            Dialect::Oracle => RowLimit::RownumPredicate,
            Dialect::MySql | Dialect::Postgres => RowLimit::LimitClause,
        }
    }

    /// Name of the two-argument "first non-null" function.
    pub fn coalesce_fn(self) -> &'static str {
        match self {
            Dialect::Oracle => "NVL",
            Dialect::MySql => "IFNULL",
            Dialect::Postgres => "COALESCE",
        }
    }

    pub fn coalesce(self, expr: &str, default: &str) -> String {
        format!("{}({}, {})", self.coalesce_fn(), expr, default)
    }

    /// Boolean literal accepted by the dialect. Oracle stores flags as `NUMBER(1)`.
    pub fn bool_literal(self, value: bool) -> &'static str {
        match (self, value) {
            (Dialect::Oracle, true) => "1",
            (Dialect::Oracle, false) => "0",
            (Dialect::MySql | Dialect::Postgres, true) => "TRUE",
            (Dialect::MySql | Dialect::Postgres, false) => "FALSE",
        }
    }

    /// Normalise a value before binding it; only booleans differ today.
    pub fn bind_value(self, value: SqlValue) -> SqlValue {
        match (self, value) {
            (Dialect::Oracle, SqlValue::Bool(b)) => SqlValue::Int(i64::from(b)),
            (_, other) => other,
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Dialect {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "oracle" => Ok(Dialect::Oracle),
            "mysql" => Ok(Dialect::MySql),
            "postgres" | "postgresql" => Ok(Dialect::Postgres),
            other => Err(GatewayError::unsupported(
                format!("dialect '{}'", other),
                "no translator for this dialect",
            )),
        }
    }
}
