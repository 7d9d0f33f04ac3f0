use super::Listing;
use crate::error::Result;
use crate::gateway::Gateway;
use crate::routing::LogicalEntity;
use crate::sql::LogicalOperation;

impl Gateway {
    /// Grades of one student on `backend`, newest first.
    pub async fn student_grades(&self, backend: &str, student_id: i64) -> Result<Listing> {
        let handle = self.named(backend)?;
        Listing::from_fetched(
            self.read(handle, LogicalOperation::StudentGrades { student_id })
                .await?,
        )
    }

    /// Mean grade; `None` when the student has no grades.
    pub async fn student_gpa(&self, student_id: i64) -> Result<Option<f64>> {
        let handle = self.home(LogicalEntity::Grade)?;
        let fetched = self
            .read(handle, LogicalOperation::StudentGpa { student_id })
            .await?;
        match fetched.rows.first() {
            Some(row) => row.get_f64("moyenne_generale"),
            None => Ok(None),
        }
    }

    /// Credits of every subject passed at or above the passing grade.
    pub async fn validated_credits(&self, student_id: i64) -> Result<i64> {
        self.read_count(
            LogicalEntity::Grade,
            LogicalOperation::ValidatedCredits {
                student_id,
                passing_grade: self.policy().passing_grade,
            },
        )
        .await
    }
}
