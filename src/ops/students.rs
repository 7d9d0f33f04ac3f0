use serde_json::{Map, Value};
use tracing::info;

use super::{EnrollmentCheck, EnrollmentStats, Listing, Single};
use crate::error::Result;
use crate::gateway::Gateway;
use crate::routing::LogicalEntity;
use crate::shape::{plain, shape_row};
use crate::sql::translate::ENROLLED_STATUS;
use crate::sql::LogicalOperation;

impl Gateway {
    /// Acquire and release one session on `backend`.
    pub async fn connect(&self, backend: &str) -> Result<&'static str> {
        let handle = self.named(backend)?;
        let session = handle.connector.acquire().await?;
        drop(session);
        info!(backend, driver = handle.connector.driver(), "connection check passed");
        Ok(handle.connector.driver())
    }

    /// First students of `backend`, up to the configured probe limit.
    pub async fn probe(&self, backend: &str) -> Result<Listing> {
        let handle = self.named(backend)?;
        let op = LogicalOperation::StudentProbe {
            limit: self.policy().probe_limit,
        };
        Listing::from_fetched(self.read(handle, op).await?)
    }

    pub async fn enrollment_check(&self, backend: &str, student_id: i64) -> Result<EnrollmentCheck> {
        let handle = self.named(backend)?;
        let fetched = self
            .read(handle, LogicalOperation::StudentEnrollment { student_id })
            .await?;
        let execution_time_ms = fetched.elapsed_ms();
        let single = Single::from_fetched(fetched)?;
        Ok(EnrollmentCheck {
            enrolled: single.data.is_some(),
            data: single.data,
            query: single.query,
            execution_time_ms,
        })
    }

    pub async fn student_details(&self, backend: &str, student_id: i64) -> Result<Single> {
        let handle = self.named(backend)?;
        Single::from_fetched(
            self.read(handle, LogicalOperation::StudentDetails { student_id })
                .await?,
        )
    }

    /// Students whose last name contains `name`, ignoring case.
    pub async fn search_students(&self, backend: &str, name: &str) -> Result<Listing> {
        let handle = self.named(backend)?;
        let op = LogicalOperation::StudentSearch {
            name: name.to_string(),
            limit: self.policy().search_limit,
        };
        Listing::from_fetched(self.read(handle, op).await?)
    }

    pub async fn enrollment_stats(&self, backend: &str) -> Result<EnrollmentStats> {
        let handle = self.named(backend)?;
        let op = LogicalOperation::EnrollmentCount {
            status: ENROLLED_STATUS.to_string(),
        };
        let fetched = self.read(handle, op).await?;
        let total_enrolled = match fetched.rows.first() {
            Some(row) => row.get_i64("total")?.unwrap_or(0),
            None => 0,
        };
        Ok(EnrollmentStats {
            total_enrolled,
            query: fetched.statement.sql,
        })
    }

    /// Contact profile from the enrollment store; `None` for unknown students.
    pub async fn student_profile(&self, student_id: i64) -> Result<Option<Map<String, Value>>> {
        let handle = self.home(LogicalEntity::Student)?;
        let fetched = self
            .read(handle, LogicalOperation::StudentProfile { student_id })
            .await?;
        fetched
            .rows
            .first()
            .map(|row| shape_row(row, &plain(&fetched.statement.columns)))
            .transpose()
    }

    pub async fn tuition_paid(&self, student_id: i64) -> Result<bool> {
        let paid = self
            .read_count(
                LogicalEntity::Payment,
                LogicalOperation::TuitionPayment { student_id },
            )
            .await?;
        Ok(paid > 0)
    }
}
