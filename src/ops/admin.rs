use tracing::info;

use super::LoanReceipt;
use crate::error::{GatewayError, Result};
use crate::gateway::Gateway;
use crate::routing::LogicalEntity;
use crate::sql::{LogicalOperation, NewBook, NewGrade, NewStudent};

const MAX_GRADE: f64 = 20.0;

impl Gateway {
    pub async fn insert_student(&self, student: NewStudent) -> Result<()> {
        let id = student.id;
        self.insert(LogicalEntity::Student, LogicalOperation::InsertStudent(student))
            .await?;
        info!(student_id = id, "student inserted");
        Ok(())
    }

    /// Record a grade on the 0..=20 scale.
    pub async fn insert_grade(&self, grade: NewGrade) -> Result<()> {
        if !(0.0..=MAX_GRADE).contains(&grade.grade) {
            return Err(GatewayError::InvalidInput(format!(
                "grade {} is outside 0..={}",
                grade.grade, MAX_GRADE
            )));
        }
        let (student_id, subject_id) = (grade.student_id, grade.subject_id);
        self.insert(LogicalEntity::Grade, LogicalOperation::InsertGrade(grade))
            .await?;
        info!(student_id, subject_id, "grade inserted");
        Ok(())
    }

    pub async fn insert_book(&self, book: NewBook) -> Result<()> {
        let id = book.id;
        self.insert(LogicalEntity::Book, LogicalOperation::InsertBook(book))
            .await?;
        info!(book_id = id, "book inserted");
        Ok(())
    }

    /// Admin loan creation goes through the regular borrow workflow.
    pub async fn create_loan(&self, student_id: i64, book_id: i64) -> Result<LoanReceipt> {
        self.borrow_book(student_id, book_id).await
    }

    async fn insert(&self, entity: LogicalEntity, op: LogicalOperation) -> Result<u64> {
        let backend = self.home(entity)?;
        let mut tx = self.begin(backend).await?;
        let outcome = tx.execute(&op).await;
        tx.finish(outcome).await
    }

    /// Run several inserts on `entity`'s home store in one transaction.
    pub(crate) async fn insert_all(
        &self,
        entity: LogicalEntity,
        ops: Vec<LogicalOperation>,
    ) -> Result<u64> {
        let backend = self.home(entity)?;
        let mut tx = self.begin(backend).await?;
        let mut outcome = Ok(0);
        for op in &ops {
            match tx.execute(op).await {
                Ok(n) => outcome = outcome.map(|total| total + n),
                Err(err) => {
                    outcome = Err(err);
                    break;
                }
            }
        }
        tx.finish(outcome).await
    }
}
