//! Single-backend operations, grouped by the store they mostly touch.

mod admin;
mod grades;
mod library;
mod students;

pub use library::{LoanReceipt, ReturnReceipt};

use serde::Serialize;
use serde_json::Value;

use crate::error::Result;
use crate::gateway::Fetched;
use crate::shape::{plain, shape_rows};

/// Rows of a backend-addressed read, with the SQL that produced them.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Listing {
    pub data: Vec<Value>,
    pub query: String,
}

/// At most one row of a backend-addressed read.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Single {
    pub data: Option<Value>,
    pub query: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EnrollmentCheck {
    pub enrolled: bool,
    pub data: Option<Value>,
    pub query: String,
    pub execution_time_ms: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EnrollmentStats {
    pub total_enrolled: i64,
    pub query: String,
}

impl Listing {
    fn from_fetched(fetched: Fetched) -> Result<Self> {
        let data = shape_rows(&fetched.rows, &plain(&fetched.statement.columns))?;
        Ok(Self {
            data,
            query: fetched.statement.sql,
        })
    }
}

impl Single {
    fn from_fetched(fetched: Fetched) -> Result<Self> {
        let listing = Listing::from_fetched(fetched)?;
        Ok(Self {
            data: listing.data.into_iter().next(),
            query: listing.query,
        })
    }
}
