//! In-memory stand-in for the three stores, used by tests.
//!
//! The connector interprets the typed operation carried by each statement
//! against a shared [`University`] state. `begin` snapshots the state and
//! `rollback` (or dropping the session mid-transaction) restores it.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::{Arc, Mutex};

use super::connector::{Connector, Session};
use super::row::Row;
use crate::error::{GatewayError, Result};
use crate::sql::translate::ENROLLED_STATUS;
use crate::sql::{LogicalOperation, OperationKind, SqlValue, Statement};

#[derive(Debug, Clone, PartialEq)]
pub struct StudentRec {
    pub id: i64,
    pub last_name: String,
    pub first_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PaymentRec {
    pub student_id: i64,
    pub kind: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubjectRec {
    pub id: i64,
    pub name: String,
    pub credits: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GradeRec {
    pub student_id: i64,
    pub subject_id: i64,
    pub grade: f64,
    pub evaluated_on: NaiveDate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BookRec {
    pub id: i64,
    pub title: String,
    pub author: String,
    pub category: String,
    pub available: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoanRec {
    pub id: i64,
    pub student_id: i64,
    pub book_id: i64,
    pub borrowed_at: NaiveDate,
    pub due_at: NaiveDate,
    pub returned_at: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct University {
    pub students: Vec<StudentRec>,
    pub payments: Vec<PaymentRec>,
    pub subjects: Vec<SubjectRec>,
    pub grades: Vec<GradeRec>,
    pub books: Vec<BookRec>,
    pub loans: Vec<LoanRec>,
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid fixture date")
}

impl University {
    /// Two students, three subjects, three books and one open loan.
    ///
    /// Student 1 has paid tuition and validated 180 credits; student 2 has
    /// neither and holds an overdue loan (due 2024-02-01) on book 2.
    pub fn fixture() -> Self {
        let student = |id: i64, last: &str, first: &str| StudentRec {
            id,
            last_name: last.into(),
            first_name: first.into(),
            email: format!("{}.{}@univ.fr", first.to_lowercase(), last.to_lowercase()),
            phone: Some(format!("060000000{}", id)),
            address: None,
            status: ENROLLED_STATUS.into(),
        };
        let book = |id: i64, title: &str, available: bool| BookRec {
            id,
            title: title.into(),
            author: "Auteur".into(),
            category: "Informatique".into(),
            available,
        };
        Self {
            students: vec![student(1, "Dupont", "Jean"), student(2, "Martin", "Marie")],
            payments: vec![PaymentRec {
                student_id: 1,
                kind: "SCOLARITE".into(),
                status: "PAYE".into(),
            }],
            subjects: vec![
                SubjectRec {
                    id: 1,
                    name: "Algorithmique".into(),
                    credits: 90,
                },
                SubjectRec {
                    id: 2,
                    name: "Bases de donnees".into(),
                    credits: 90,
                },
                SubjectRec {
                    id: 3,
                    name: "Reseaux".into(),
                    credits: 6,
                },
            ],
            grades: vec![
                GradeRec {
                    student_id: 1,
                    subject_id: 1,
                    grade: 15.0,
                    evaluated_on: date(2024, 1, 10),
                },
                GradeRec {
                    student_id: 1,
                    subject_id: 2,
                    grade: 12.0,
                    evaluated_on: date(2024, 1, 20),
                },
                GradeRec {
                    student_id: 2,
                    subject_id: 3,
                    grade: 8.0,
                    evaluated_on: date(2024, 1, 15),
                },
            ],
            books: vec![
                book(1, "Structures de donnees", true),
                book(2, "Compilation", false),
                book(3, "Architecture", true),
            ],
            loans: vec![LoanRec {
                id: 1,
                student_id: 2,
                book_id: 2,
                borrowed_at: date(2024, 1, 2),
                due_at: date(2024, 2, 1),
                returned_at: None,
            }],
        }
    }
}

/// Shared handle onto one in-memory state plus failure injection knobs.
#[derive(Clone)]
pub struct MemoryConnector {
    state: Arc<Mutex<University>>,
    reachable: bool,
    fail_on: Option<OperationKind>,
    upper_case: bool,
    log: Arc<Mutex<Vec<OperationKind>>>,
}

impl MemoryConnector {
    pub fn new(state: Arc<Mutex<University>>) -> Self {
        Self {
            state,
            reachable: true,
            fail_on: None,
            upper_case: false,
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Every `acquire` fails with a connection error.
    pub fn unreachable(mut self) -> Self {
        self.reachable = false;
        self
    }

    /// Statements of `kind` fail with a query error.
    pub fn fail_on(mut self, kind: OperationKind) -> Self {
        self.fail_on = Some(kind);
        self
    }

    /// Report column names upper-cased and flags as 0/1, the way Oracle does.
    pub fn upper_case(mut self) -> Self {
        self.upper_case = true;
        self
    }

    /// Operations executed so far, in order.
    pub fn executed(&self) -> Vec<OperationKind> {
        self.log.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    fn driver(&self) -> &'static str {
        "memory"
    }

    async fn acquire(&self) -> Result<Box<dyn Session>> {
        if !self.reachable {
            return Err(GatewayError::Connection("connection refused".into()));
        }
        Ok(Box::new(MemorySession {
            connector: self.clone(),
            snapshot: None,
        }))
    }
}

struct MemorySession {
    connector: MemoryConnector,
    snapshot: Option<University>,
}

impl MemorySession {
    fn check(&self, statement: &Statement) -> Result<()> {
        self.connector.log.lock().unwrap().push(statement.kind());
        if self.connector.fail_on == Some(statement.kind()) {
            return Err(GatewayError::Query(format!(
                "injected failure in {}",
                statement.kind()
            )));
        }
        Ok(())
    }

    fn flag(&self, value: bool) -> SqlValue {
        if self.connector.upper_case {
            SqlValue::Int(i64::from(value))
        } else {
            SqlValue::Bool(value)
        }
    }

    fn row(&self, cells: Vec<(&str, SqlValue)>, statement: &Statement) -> Result<Row> {
        let names: Vec<String> = cells
            .iter()
            .map(|(name, _)| {
                if self.connector.upper_case {
                    name.to_uppercase()
                } else {
                    name.to_string()
                }
            })
            .collect();
        let values = cells.into_iter().map(|(_, v)| v).collect();
        Row::conform(&names, values, &statement.columns)
    }

    fn select(&self, statement: &Statement) -> Result<Vec<Vec<(&'static str, SqlValue)>>> {
        let db = self.connector.state.lock().unwrap();
        let text = |s: &str| SqlValue::Text(s.to_string());
        let opt = |s: &Option<String>| s.clone().map(SqlValue::Text).unwrap_or(SqlValue::Null);
        let count = |n: usize| vec![vec![(statement.columns[0], SqlValue::Int(n as i64))]];

        let rows = match &statement.operation {
            LogicalOperation::StudentProbe { limit } => db
                .students
                .iter()
                .take(*limit as usize)
                .map(|s| {
                    vec![
                        ("id_etudiant", SqlValue::Int(s.id)),
                        ("nom", text(&s.last_name)),
                        ("prenom", text(&s.first_name)),
                        ("email", text(&s.email)),
                        ("statut", text(&s.status)),
                    ]
                })
                .collect(),
            LogicalOperation::StudentEnrollment { student_id } => db
                .students
                .iter()
                .filter(|s| s.id == *student_id)
                .take(1)
                .map(|s| {
                    vec![
                        ("id_etudiant", SqlValue::Int(s.id)),
                        ("nom", text(&s.last_name)),
                        ("prenom", text(&s.first_name)),
                        ("statut", text(&s.status)),
                    ]
                })
                .collect(),
            LogicalOperation::StudentDetails { student_id }
            | LogicalOperation::StudentProfile { student_id } => db
                .students
                .iter()
                .filter(|s| s.id == *student_id)
                .map(|s| {
                    vec![
                        ("id_etudiant", SqlValue::Int(s.id)),
                        ("nom", text(&s.last_name)),
                        ("prenom", text(&s.first_name)),
                        ("email", text(&s.email)),
                        ("telephone", opt(&s.phone)),
                        ("adresse", opt(&s.address)),
                        ("statut", text(&s.status)),
                    ]
                })
                .collect(),
            LogicalOperation::StudentSearch { name, limit } => {
                let needle = name.to_uppercase();
                let mut found: Vec<&StudentRec> = db
                    .students
                    .iter()
                    .filter(|s| s.last_name.to_uppercase().contains(&needle))
                    .collect();
                found.sort_by(|a, b| a.last_name.cmp(&b.last_name));
                found
                    .into_iter()
                    .take(*limit as usize)
                    .map(|s| {
                        vec![
                            ("id_etudiant", SqlValue::Int(s.id)),
                            ("nom", text(&s.last_name)),
                            ("prenom", text(&s.first_name)),
                        ]
                    })
                    .collect()
            }
            LogicalOperation::EnrollmentCount { status } => {
                count(db.students.iter().filter(|s| &s.status == status).count())
            }
            LogicalOperation::TuitionPayment { student_id } => count(
                db.payments
                    .iter()
                    .filter(|p| {
                        p.student_id == *student_id && p.kind == "SCOLARITE" && p.status == "PAYE"
                    })
                    .count(),
            ),
            LogicalOperation::StudentGrades { student_id } => {
                let mut grades: Vec<&GradeRec> = db
                    .grades
                    .iter()
                    .filter(|g| g.student_id == *student_id)
                    .collect();
                grades.sort_by(|a, b| b.evaluated_on.cmp(&a.evaluated_on));
                grades
                    .into_iter()
                    .filter_map(|g| {
                        let subject = db.subjects.iter().find(|s| s.id == g.subject_id)?;
                        Some(vec![
                            ("nom_matiere", text(&subject.name)),
                            ("note", SqlValue::Float(g.grade)),
                            ("date_evaluation", SqlValue::Date(g.evaluated_on)),
                        ])
                    })
                    .collect()
            }
            LogicalOperation::StudentGpa { student_id } => {
                let grades: Vec<f64> = db
                    .grades
                    .iter()
                    .filter(|g| g.student_id == *student_id)
                    .map(|g| g.grade)
                    .collect();
                let avg = if grades.is_empty() {
                    SqlValue::Null
                } else {
                    SqlValue::Float(grades.iter().sum::<f64>() / grades.len() as f64)
                };
                vec![vec![("moyenne_generale", avg)]]
            }
            LogicalOperation::ValidatedCredits {
                student_id,
                passing_grade,
            } => {
                let total: i64 = db
                    .grades
                    .iter()
                    .filter(|g| g.student_id == *student_id && g.grade >= *passing_grade)
                    .filter_map(|g| db.subjects.iter().find(|s| s.id == g.subject_id))
                    .map(|s| s.credits)
                    .sum();
                vec![vec![("total_credits", SqlValue::Int(total))]]
            }
            LogicalOperation::BorrowedBooksCount { student_id } => count(
                db.loans
                    .iter()
                    .filter(|l| l.student_id == *student_id && l.returned_at.is_none())
                    .count(),
            ),
            LogicalOperation::OverdueLoansCount { student_id, today } => count(
                db.loans
                    .iter()
                    .filter(|l| {
                        l.student_id == *student_id && l.returned_at.is_none() && l.due_at < *today
                    })
                    .count(),
            ),
            LogicalOperation::AvailableBooks => {
                let mut books: Vec<&BookRec> = db.books.iter().filter(|b| b.available).collect();
                books.sort_by(|a, b| a.title.cmp(&b.title));
                books
                    .into_iter()
                    .map(|b| {
                        vec![
                            ("id_livre", SqlValue::Int(b.id)),
                            ("titre", text(&b.title)),
                            ("auteur", text(&b.author)),
                            ("categorie", text(&b.category)),
                        ]
                    })
                    .collect()
            }
            LogicalOperation::AllBooks => {
                let mut books: Vec<&BookRec> = db.books.iter().collect();
                books.sort_by_key(|b| b.id);
                books
                    .into_iter()
                    .map(|b| {
                        vec![
                            ("id_livre", SqlValue::Int(b.id)),
                            ("titre", text(&b.title)),
                            ("auteur", text(&b.author)),
                            ("categorie", text(&b.category)),
                            ("disponible", self.flag(b.available)),
                        ]
                    })
                    .collect()
            }
            LogicalOperation::StudentCurrentLoans { student_id } => {
                let mut loans: Vec<&LoanRec> = db
                    .loans
                    .iter()
                    .filter(|l| l.student_id == *student_id && l.returned_at.is_none())
                    .collect();
                loans.sort_by(|a, b| b.borrowed_at.cmp(&a.borrowed_at));
                loans
                    .into_iter()
                    .filter_map(|l| {
                        let book = db.books.iter().find(|b| b.id == l.book_id)?;
                        Some(vec![
                            ("id_emprunt", SqlValue::Int(l.id)),
                            ("titre", text(&book.title)),
                            ("auteur", text(&book.author)),
                            ("date_emprunt", SqlValue::Date(l.borrowed_at)),
                            ("date_retour_prevue", SqlValue::Date(l.due_at)),
                        ])
                    })
                    .collect()
            }
            LogicalOperation::AllLoans => {
                let mut loans: Vec<&LoanRec> = db.loans.iter().collect();
                loans.sort_by(|a, b| b.borrowed_at.cmp(&a.borrowed_at));
                loans
                    .into_iter()
                    .map(|l| {
                        let book = db.books.iter().find(|b| b.id == l.book_id);
                        vec![
                            ("id_emprunt", SqlValue::Int(l.id)),
                            ("id_etudiant", SqlValue::Int(l.student_id)),
                            ("id_livre", SqlValue::Int(l.book_id)),
                            (
                                "titre",
                                book.map(|b| text(&b.title)).unwrap_or(SqlValue::Null),
                            ),
                            (
                                "auteur",
                                book.map(|b| text(&b.author)).unwrap_or(SqlValue::Null),
                            ),
                            ("date_emprunt", SqlValue::Date(l.borrowed_at)),
                            ("date_retour_prevue", SqlValue::Date(l.due_at)),
                            ("date_retour", SqlValue::from(l.returned_at)),
                        ]
                    })
                    .collect()
            }
            LogicalOperation::LockBookAvailability { book_id } => db
                .books
                .iter()
                .filter(|b| b.id == *book_id)
                .map(|b| vec![("disponible", self.flag(b.available))])
                .collect(),
            LogicalOperation::LockLoan { loan_id } => db
                .loans
                .iter()
                .filter(|l| l.id == *loan_id)
                .map(|l| {
                    vec![
                        ("id_emprunt", SqlValue::Int(l.id)),
                        ("id_livre", SqlValue::Int(l.book_id)),
                        ("date_retour", SqlValue::from(l.returned_at)),
                    ]
                })
                .collect(),
            other => {
                return Err(GatewayError::Query(format!(
                    "{} does not return rows",
                    other.name()
                )))
            }
        };
        Ok(rows)
    }

    fn write(&self, statement: &Statement) -> Result<u64> {
        let mut db = self.connector.state.lock().unwrap();
        let duplicate = |what: &str, id: i64| {
            GatewayError::ConstraintViolation(format!("duplicate {} {}", what, id))
        };

        match &statement.operation {
            LogicalOperation::InsertStudent(s) => {
                if db.students.iter().any(|r| r.id == s.id) {
                    return Err(duplicate("student", s.id));
                }
                db.students.push(StudentRec {
                    id: s.id,
                    last_name: s.last_name.clone(),
                    first_name: s.first_name.clone(),
                    email: s.email.clone(),
                    phone: s.phone.clone(),
                    address: s.address.clone(),
                    status: ENROLLED_STATUS.into(),
                });
                Ok(1)
            }
            LogicalOperation::InsertGrade(g) => {
                if !db.subjects.iter().any(|s| s.id == g.subject_id) {
                    return Err(GatewayError::ConstraintViolation(format!(
                        "unknown subject {}",
                        g.subject_id
                    )));
                }
                db.grades.push(GradeRec {
                    student_id: g.student_id,
                    subject_id: g.subject_id,
                    grade: g.grade,
                    evaluated_on: g.evaluated_on,
                });
                Ok(1)
            }
            LogicalOperation::InsertBook(b) => {
                if db.books.iter().any(|r| r.id == b.id) {
                    return Err(duplicate("book", b.id));
                }
                db.books.push(BookRec {
                    id: b.id,
                    title: b.title.clone(),
                    author: b.author.clone(),
                    category: b.category.clone(),
                    available: true,
                });
                Ok(1)
            }
            LogicalOperation::InsertLoan {
                student_id,
                book_id,
                borrowed_at,
                due_at,
            } => {
                if !db.books.iter().any(|b| b.id == *book_id) {
                    return Err(GatewayError::ConstraintViolation(format!(
                        "unknown book {}",
                        book_id
                    )));
                }
                let id = db.loans.iter().map(|l| l.id).max().unwrap_or(0) + 1;
                db.loans.push(LoanRec {
                    id,
                    student_id: *student_id,
                    book_id: *book_id,
                    borrowed_at: *borrowed_at,
                    due_at: *due_at,
                    returned_at: None,
                });
                Ok(1)
            }
            LogicalOperation::CloseLoan {
                loan_id,
                returned_at,
            } => {
                let mut affected = 0;
                for loan in db
                    .loans
                    .iter_mut()
                    .filter(|l| l.id == *loan_id && l.returned_at.is_none())
                {
                    loan.returned_at = Some(*returned_at);
                    affected += 1;
                }
                Ok(affected)
            }
            LogicalOperation::SetBookAvailability { book_id, available } => {
                let mut affected = 0;
                for book in db.books.iter_mut().filter(|b| b.id == *book_id) {
                    book.available = *available;
                    affected += 1;
                }
                Ok(affected)
            }
            other => Err(GatewayError::Query(format!(
                "{} is not a write",
                other.name()
            ))),
        }
    }
}

#[async_trait]
impl Session for MemorySession {
    async fn query(&mut self, statement: &Statement) -> Result<Vec<Row>> {
        self.check(statement)?;
        self.select(statement)?
            .into_iter()
            .map(|cells| self.row(cells, statement))
            .collect()
    }

    async fn execute(&mut self, statement: &Statement) -> Result<u64> {
        self.check(statement)?;
        self.write(statement)
    }

    async fn begin(&mut self) -> Result<()> {
        self.snapshot = Some(self.connector.state.lock().unwrap().clone());
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        self.snapshot = None;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        if let Some(snapshot) = self.snapshot.take() {
            *self.connector.state.lock().unwrap() = snapshot;
        }
        Ok(())
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            if let Ok(mut state) = self.connector.state.lock() {
                *state = snapshot;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::{translate, Dialect};

    fn shared() -> Arc<Mutex<University>> {
        Arc::new(Mutex::new(University::fixture()))
    }

    #[tokio::test]
    async fn test_rows_conform_to_declared_columns() {
        let connector = MemoryConnector::new(shared()).upper_case();
        let mut session = connector.acquire().await.unwrap();
        let stmt = translate(&LogicalOperation::AllBooks, Dialect::Oracle).unwrap();
        let rows = session.query(&stmt).await.unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].columns(), stmt.columns.as_slice());
        assert_eq!(rows[1].get_bool("disponible").unwrap(), Some(false));
    }

    #[tokio::test]
    async fn test_rollback_restores_state() {
        let state = shared();
        let connector = MemoryConnector::new(state.clone());
        let mut session = connector.acquire().await.unwrap();
        session.begin().await.unwrap();
        let stmt = translate(
            &LogicalOperation::SetBookAvailability {
                book_id: 1,
                available: false,
            },
            Dialect::Postgres,
        )
        .unwrap();
        assert_eq!(session.execute(&stmt).await.unwrap(), 1);
        session.rollback().await.unwrap();
        assert!(state.lock().unwrap().books[0].available);
    }

    #[tokio::test]
    async fn test_drop_mid_transaction_discards_writes() {
        let state = shared();
        let connector = MemoryConnector::new(state.clone());
        {
            let mut session = connector.acquire().await.unwrap();
            session.begin().await.unwrap();
            let stmt = translate(
                &LogicalOperation::CloseLoan {
                    loan_id: 1,
                    returned_at: date(2024, 3, 1),
                },
                Dialect::Postgres,
            )
            .unwrap();
            session.execute(&stmt).await.unwrap();
        }
        assert_eq!(state.lock().unwrap().loans[0].returned_at, None);
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let connector = MemoryConnector::new(shared()).fail_on(OperationKind::AllBooks);
        let mut session = connector.acquire().await.unwrap();
        let stmt = translate(&LogicalOperation::AllBooks, Dialect::Postgres).unwrap();
        assert_eq!(session.query(&stmt).await.unwrap_err().kind(), "query");

        let down = MemoryConnector::new(shared()).unreachable();
        assert_eq!(down.acquire().await.err().map(|e| e.kind()), Some("connection"));
    }
}
