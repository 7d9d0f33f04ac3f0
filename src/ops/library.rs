use chrono::{Days, NaiveDate};
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::error::{GatewayError, Result};
use crate::gateway::{Gateway, Transaction};
use crate::routing::LogicalEntity;
use crate::shape::{shape_rows, OutputColumn, Presentation};
use crate::sql::LogicalOperation;

const AVAILABLE_BOOK_FIELDS: &[OutputColumn] = &[
    OutputColumn::value("id_livre"),
    OutputColumn::value("titre"),
    OutputColumn::value("auteur"),
    OutputColumn::value("categorie"),
];

const ADMIN_BOOK_FIELDS: &[OutputColumn] = &[
    OutputColumn::value("id_livre"),
    OutputColumn::value("titre"),
    OutputColumn::value("auteur"),
    OutputColumn::value("categorie"),
    OutputColumn::with("disponible", Presentation::Flag),
];

const STUDENT_LOAN_FIELDS: &[OutputColumn] = &[
    OutputColumn::value("id_emprunt"),
    OutputColumn::value("titre"),
    OutputColumn::value("auteur"),
    OutputColumn::with("date_emprunt", Presentation::DayMonthYear),
    OutputColumn::with("date_retour_prevue", Presentation::DayMonthYear),
];

const ADMIN_LOAN_FIELDS: &[OutputColumn] = &[
    OutputColumn::value("id_emprunt"),
    OutputColumn::value("id_etudiant"),
    OutputColumn::value("id_livre"),
    OutputColumn::value("titre"),
    OutputColumn::value("auteur"),
    OutputColumn::with("date_emprunt", Presentation::IsoDate),
    OutputColumn::with("date_retour_prevue", Presentation::IsoDate),
    OutputColumn::with("date_retour", Presentation::IsoDate),
];

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LoanReceipt {
    pub student_id: i64,
    pub book_id: i64,
    pub borrowed_at: NaiveDate,
    pub due_at: NaiveDate,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ReturnReceipt {
    pub loan_id: i64,
    pub book_id: i64,
    pub returned_at: NaiveDate,
}

impl Gateway {
    pub async fn borrowed_books_count(&self, student_id: i64) -> Result<i64> {
        self.read_count(
            LogicalEntity::Loan,
            LogicalOperation::BorrowedBooksCount { student_id },
        )
        .await
    }

    /// Open loans past their due date as of today.
    pub async fn overdue_books_count(&self, student_id: i64) -> Result<i64> {
        self.read_count(
            LogicalEntity::Loan,
            LogicalOperation::OverdueLoansCount {
                student_id,
                today: self.today(),
            },
        )
        .await
    }

    pub async fn available_books(&self) -> Result<Vec<Value>> {
        self.library_listing(LogicalOperation::AvailableBooks, AVAILABLE_BOOK_FIELDS)
            .await
    }

    pub async fn all_books(&self) -> Result<Vec<Value>> {
        self.library_listing(LogicalOperation::AllBooks, ADMIN_BOOK_FIELDS)
            .await
    }

    pub async fn student_loans(&self, student_id: i64) -> Result<Vec<Value>> {
        self.library_listing(
            LogicalOperation::StudentCurrentLoans { student_id },
            STUDENT_LOAN_FIELDS,
        )
        .await
    }

    pub async fn all_loans(&self) -> Result<Vec<Value>> {
        self.library_listing(LogicalOperation::AllLoans, ADMIN_LOAN_FIELDS)
            .await
    }

    async fn library_listing(
        &self,
        op: LogicalOperation,
        fields: &[OutputColumn],
    ) -> Result<Vec<Value>> {
        let handle = self.home(LogicalEntity::Book)?;
        let fetched = self.read(handle, op).await?;
        shape_rows(&fetched.rows, fields)
    }

    /// Lend `book_id` to `student_id`.
    ///
    /// The availability check, the loan insert and the availability update
    /// run in one transaction with the book row locked, so two concurrent
    /// borrows of the same book cannot both succeed.
    pub async fn borrow_book(&self, student_id: i64, book_id: i64) -> Result<LoanReceipt> {
        let backend = self.home(LogicalEntity::Loan)?;
        let borrowed_at = self.today();
        let due_at = borrowed_at
            .checked_add_days(Days::new(u64::from(self.policy().loan_period_days)))
            .ok_or_else(|| GatewayError::InvalidInput("loan period overflows the calendar".into()))?;
        let receipt = LoanReceipt {
            student_id,
            book_id,
            borrowed_at,
            due_at,
        };

        let mut tx = self.begin(backend).await?;
        let outcome = borrow_steps(&mut tx, &receipt).await;
        let receipt = tx.finish(outcome.map(|_| receipt)).await?;
        info!(student_id, book_id, due_at = %receipt.due_at, "book borrowed");
        Ok(receipt)
    }

    /// Close the open loan `loan_id` and make its book available again.
    pub async fn return_book(&self, loan_id: i64) -> Result<ReturnReceipt> {
        let backend = self.home(LogicalEntity::Loan)?;
        let returned_at = self.today();

        let mut tx = self.begin(backend).await?;
        let outcome = return_steps(&mut tx, loan_id, returned_at).await;
        let receipt = tx.finish(outcome).await?;
        info!(loan_id, book_id = receipt.book_id, "book returned");
        Ok(receipt)
    }
}

async fn borrow_steps(tx: &mut Transaction<'_>, receipt: &LoanReceipt) -> Result<()> {
    let book_id = receipt.book_id;
    let rows = tx
        .query(&LogicalOperation::LockBookAvailability { book_id })
        .await?;
    let book = rows.first().ok_or(GatewayError::NotFound {
        entity: "book",
        id: book_id,
    })?;
    if !book.get_bool("disponible")?.unwrap_or(false) {
        return Err(GatewayError::ResourceUnavailable(
            "Book is not available".into(),
        ));
    }

    tx.execute(&LogicalOperation::InsertLoan {
        student_id: receipt.student_id,
        book_id,
        borrowed_at: receipt.borrowed_at,
        due_at: receipt.due_at,
    })
    .await?;
    tx.execute(&LogicalOperation::SetBookAvailability {
        book_id,
        available: false,
    })
    .await?;
    Ok(())
}

async fn return_steps(
    tx: &mut Transaction<'_>,
    loan_id: i64,
    returned_at: NaiveDate,
) -> Result<ReturnReceipt> {
    let not_open = GatewayError::NotFound {
        entity: "open loan",
        id: loan_id,
    };
    let rows = tx.query(&LogicalOperation::LockLoan { loan_id }).await?;
    let loan = rows.first().ok_or(GatewayError::NotFound {
        entity: "loan",
        id: loan_id,
    })?;
    if loan.get_date("date_retour")?.is_some() {
        return Err(not_open);
    }
    let book_id = loan
        .get_i64("id_livre")?
        .ok_or_else(|| GatewayError::MalformedRow("id_livre".into()))?;

    let closed = tx
        .execute(&LogicalOperation::CloseLoan {
            loan_id,
            returned_at,
        })
        .await?;
    if closed != 1 {
        return Err(not_open);
    }
    let released = tx
        .execute(&LogicalOperation::SetBookAvailability {
            book_id,
            available: true,
        })
        .await?;
    if released != 1 {
        return Err(GatewayError::NotFound {
            entity: "book",
            id: book_id,
        });
    }

    Ok(ReturnReceipt {
        loan_id,
        book_id,
        returned_at,
    })
}

#[cfg(test)]
mod tests {
    use crate::db::memory::date;
    use crate::error::GatewayError;
    use crate::gateway::tests::Harness;
    use crate::sql::OperationKind;
    use serde_json::json;

    #[tokio::test]
    async fn test_borrow_available_book() {
        let harness = Harness::new();
        let receipt = harness.gateway().borrow_book(1, 1).await.unwrap();
        assert_eq!(receipt.borrowed_at, date(2024, 3, 1));
        assert_eq!(receipt.due_at, date(2024, 3, 31));

        let state = harness.state.lock().unwrap();
        assert!(!state.books[0].available);
        let loan = state.loans.iter().find(|l| l.book_id == 1).unwrap();
        assert_eq!(loan.student_id, 1);
        assert_eq!(loan.returned_at, None);
    }

    #[tokio::test]
    async fn test_borrow_unavailable_book_writes_nothing() {
        let harness = Harness::new();
        let before = harness.state.lock().unwrap().clone();
        let err = harness.gateway().borrow_book(1, 2).await.unwrap_err();
        assert!(matches!(err, GatewayError::ResourceUnavailable(_)));
        assert_eq!(*harness.state.lock().unwrap(), before);
        assert!(!harness.library.executed().contains(&OperationKind::InsertLoan));
    }

    #[tokio::test]
    async fn test_borrow_missing_book() {
        let harness = Harness::new();
        let err = harness.gateway().borrow_book(1, 404).await.unwrap_err();
        assert_eq!(
            err,
            GatewayError::NotFound {
                entity: "book",
                id: 404
            }
        );
    }

    #[tokio::test]
    async fn test_borrow_rolls_back_when_availability_update_fails() {
        let mut harness = Harness::new();
        harness.library = harness
            .library
            .clone()
            .fail_on(OperationKind::SetBookAvailability);
        let before = harness.state.lock().unwrap().clone();
        let err = harness.gateway().borrow_book(1, 1).await.unwrap_err();
        assert_eq!(err.kind(), "query");
        assert_eq!(*harness.state.lock().unwrap(), before);
    }

    #[tokio::test]
    async fn test_second_borrow_of_same_book_fails() {
        let harness = Harness::new();
        let gateway = harness.gateway();
        gateway.borrow_book(1, 3).await.unwrap();
        let err = gateway.borrow_book(2, 3).await.unwrap_err();
        assert_eq!(err.kind(), "resource_unavailable");
        let open = harness
            .state
            .lock()
            .unwrap()
            .loans
            .iter()
            .filter(|l| l.book_id == 3 && l.returned_at.is_none())
            .count();
        assert_eq!(open, 1);
    }

    #[tokio::test]
    async fn test_return_open_loan() {
        let harness = Harness::new();
        let receipt = harness.gateway().return_book(1).await.unwrap();
        assert_eq!(receipt.book_id, 2);
        let state = harness.state.lock().unwrap();
        assert_eq!(state.loans[0].returned_at, Some(date(2024, 3, 1)));
        assert!(state.books[1].available);
    }

    #[tokio::test]
    async fn test_return_twice_is_not_found() {
        let harness = Harness::new();
        let gateway = harness.gateway();
        gateway.return_book(1).await.unwrap();
        // someone borrows the book again in between
        gateway.borrow_book(1, 2).await.unwrap();

        let err = gateway.return_book(1).await.unwrap_err();
        assert_eq!(err.kind(), "not_found");
        assert!(!harness.state.lock().unwrap().books[1].available);
    }

    #[tokio::test]
    async fn test_return_of_loan_on_deleted_book() {
        let harness = Harness::new();
        harness.state.lock().unwrap().books.retain(|b| b.id != 2);
        let err = harness.gateway().return_book(1).await.unwrap_err();
        assert_eq!(err.to_string(), "book 2 not found");
        // the loan stays open
        assert_eq!(harness.state.lock().unwrap().loans[0].returned_at, None);
    }

    #[tokio::test]
    async fn test_return_unknown_loan() {
        let harness = Harness::new();
        let err = harness.gateway().return_book(50).await.unwrap_err();
        assert_eq!(err.to_string(), "loan 50 not found");
    }

    #[tokio::test]
    async fn test_listings() {
        let harness = Harness::new();
        let gateway = harness.gateway();

        let available = gateway.available_books().await.unwrap();
        assert_eq!(available.len(), 2);
        assert_eq!(available[0]["titre"], json!("Architecture"));
        assert!(available[0].get("disponible").is_none());

        let all = gateway.all_books().await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[1]["disponible"], json!(false));

        let mine = gateway.student_loans(2).await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0]["date_emprunt"], json!("02/01/2024"));
        assert_eq!(mine[0]["date_retour_prevue"], json!("01/02/2024"));

        let loans = gateway.all_loans().await.unwrap();
        assert_eq!(loans[0]["date_emprunt"], json!("2024-01-02"));
        assert_eq!(loans[0]["date_retour"], json!(null));
    }

    #[tokio::test]
    async fn test_counts() {
        let harness = Harness::new();
        let gateway = harness.gateway();
        assert_eq!(gateway.borrowed_books_count(2).await.unwrap(), 1);
        assert_eq!(gateway.overdue_books_count(2).await.unwrap(), 1);
        assert_eq!(gateway.overdue_books_count(1).await.unwrap(), 0);
    }
}
