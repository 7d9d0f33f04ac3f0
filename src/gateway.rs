//! The gateway service object shared by every request.
//!
//! Holds the backend selector, the business policy and the clock; all three
//! are fixed after construction, so a `Gateway` sits behind an `Arc` without
//! any locking.

use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::db::{Row, Session};
use crate::error::Result;
use crate::routing::{BackendHandle, BackendSelector, LogicalEntity};
use crate::sql::{translate, LogicalOperation, Statement};

/// Business thresholds and request defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Policy {
    #[serde(default = "default_loan_period_days")]
    pub loan_period_days: u32,
    #[serde(default = "default_required_credits")]
    pub required_credits: i64,
    #[serde(default = "default_passing_grade")]
    pub passing_grade: f64,
    /// Rows returned by the backend probe.
    #[serde(default = "default_limit")]
    pub probe_limit: u32,
    /// Rows returned by a name search.
    #[serde(default = "default_limit")]
    pub search_limit: u32,
}

fn default_loan_period_days() -> u32 {
    30
}

fn default_required_credits() -> i64 {
    180
}

fn default_passing_grade() -> f64 {
    10.0
}

fn default_limit() -> u32 {
    10
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            loan_period_days: default_loan_period_days(),
            required_credits: default_required_credits(),
            passing_grade: default_passing_grade(),
            probe_limit: default_limit(),
            search_limit: default_limit(),
        }
    }
}

/// Source of "today" for due dates and overdue checks.
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

/// A clock stuck on one day.
pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}

pub struct Gateway {
    selector: BackendSelector,
    policy: Policy,
    clock: Arc<dyn Clock>,
}

/// Rows of one read together with the statement that produced them.
#[derive(Debug)]
pub struct Fetched {
    pub statement: Statement,
    pub rows: Vec<Row>,
    pub elapsed: Duration,
}

impl Fetched {
    pub fn elapsed_ms(&self) -> f64 {
        (self.elapsed.as_secs_f64() * 100_000.0).round() / 100.0
    }
}

impl Gateway {
    pub fn new(selector: BackendSelector, policy: Policy) -> Self {
        Self {
            selector,
            policy,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn selector(&self) -> &BackendSelector {
        &self.selector
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    pub(crate) fn home(&self, entity: LogicalEntity) -> Result<&BackendHandle> {
        self.selector.resolve(entity)
    }

    pub(crate) fn named(&self, backend: &str) -> Result<&BackendHandle> {
        self.selector.by_name(backend)
    }

    /// Run one read on its own session.
    pub(crate) async fn read(
        &self,
        backend: &BackendHandle,
        op: LogicalOperation,
    ) -> Result<Fetched> {
        let start = Instant::now();
        let statement = translate(&op, backend.dialect)?;
        let mut session = backend.connector.acquire().await?;
        debug!(
            operation = op.name(),
            backend = %backend.name,
            sql = %statement.sql,
            "read"
        );
        let rows = session.query(&statement).await?;
        Ok(Fetched {
            statement,
            rows,
            elapsed: start.elapsed(),
        })
    }

    /// Read a single integer cell, treating "no row" and NULL as zero.
    pub(crate) async fn read_count(
        &self,
        entity: LogicalEntity,
        op: LogicalOperation,
    ) -> Result<i64> {
        let backend = self.home(entity)?;
        let fetched = self.read(backend, op).await?;
        let column = fetched.statement.columns[0];
        match fetched.rows.first() {
            Some(row) => Ok(row.get_i64(column)?.unwrap_or(0)),
            None => Ok(0),
        }
    }

    /// Open a transaction on a fresh session of `backend`.
    pub(crate) async fn begin<'a>(&self, backend: &'a BackendHandle) -> Result<Transaction<'a>> {
        let mut session = backend.connector.acquire().await?;
        session.begin().await?;
        Ok(Transaction { backend, session })
    }
}

/// One open transaction. Finish it with [`Transaction::finish`]; dropping it
/// unfinished leaves the rollback to the connector.
pub(crate) struct Transaction<'a> {
    backend: &'a BackendHandle,
    session: Box<dyn Session>,
}

impl<'a> Transaction<'a> {
    fn statement(&self, op: &LogicalOperation) -> Result<Statement> {
        let statement = translate(op, self.backend.dialect)?;
        debug!(
            operation = op.name(),
            backend = %self.backend.name,
            sql = %statement.sql,
            "transactional statement"
        );
        Ok(statement)
    }

    pub(crate) async fn query(&mut self, op: &LogicalOperation) -> Result<Vec<Row>> {
        let statement = self.statement(op)?;
        self.session.query(&statement).await
    }

    pub(crate) async fn execute(&mut self, op: &LogicalOperation) -> Result<u64> {
        let statement = self.statement(op)?;
        self.session.execute(&statement).await
    }

    /// Commit when `outcome` is `Ok`, roll back otherwise.
    pub(crate) async fn finish<T>(mut self, outcome: Result<T>) -> Result<T> {
        match outcome {
            Ok(value) => {
                self.session.commit().await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = self.session.rollback().await {
                    warn!(
                        backend = %self.backend.name,
                        error = %rollback_err,
                        "rollback failed"
                    );
                }
                warn!(backend = %self.backend.name, error = %err, "transaction rolled back");
                Err(err)
            }
        }
    }
}
