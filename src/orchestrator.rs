//! Requests that span the three stores.
//!
//! Every sub-query runs on its own session and its outcome is kept as a
//! [`SubQuery`]. A failed sub-query never fails the composite request; it
//! is reported next to the values that did resolve.

use chrono::NaiveDate;
use serde_json::{json, Map, Value};
use std::time::Instant;
use tracing::{info, warn};

use crate::error::Result;
use crate::gateway::Gateway;
use crate::routing::LogicalEntity;
use crate::sql::{LogicalOperation, NewBook, NewGrade, NewStudent};

/// The outcome of one sub-query, tagged with the backend that served it.
#[derive(Debug)]
pub struct SubQuery<T> {
    pub backend: String,
    pub result: Result<T>,
}

impl<T> SubQuery<T> {
    fn new(gateway: &Gateway, entity: LogicalEntity, result: Result<T>) -> Self {
        let backend = gateway
            .selector()
            .resolve(entity)
            .map(|handle| handle.name.clone())
            .unwrap_or_else(|_| entity.home().name().to_string());
        if let Err(err) = &result {
            warn!(backend = %backend, entity = %entity, error = %err, "sub-query failed");
        }
        Self { backend, result }
    }

    pub fn ok(&self) -> Option<&T> {
        self.result.as_ref().ok()
    }

    /// `backend: message` for a failed sub-query.
    pub fn error_message(&self) -> Option<String> {
        self.result
            .as_ref()
            .err()
            .map(|err| format!("{}: {}", self.backend, err))
    }
}

#[derive(Debug)]
pub struct Dashboard {
    pub student_id: i64,
    pub profile: SubQuery<Option<Map<String, Value>>>,
    pub gpa: SubQuery<Option<f64>>,
    pub borrowed_books: SubQuery<i64>,
}

impl Dashboard {
    /// The `data` object: each field, or its `<field>_error` on failure.
    /// An unknown student simply has no `profile` key.
    pub fn to_json(&self) -> Value {
        let mut data = Map::new();
        match &self.profile.result {
            Ok(Some(profile)) => {
                data.insert("profile".into(), Value::Object(profile.clone()));
            }
            Ok(None) => {}
            Err(_) => {
                data.insert("profile_error".into(), json!(self.profile.error_message()));
            }
        }
        match &self.gpa.result {
            Ok(gpa) => {
                data.insert("gpa".into(), json!(gpa));
            }
            Err(_) => {
                data.insert("gpa_error".into(), json!(self.gpa.error_message()));
            }
        }
        match &self.borrowed_books.result {
            Ok(count) => {
                data.insert("borrowed_books".into(), json!(count));
            }
            Err(_) => {
                data.insert(
                    "books_error".into(),
                    json!(self.borrowed_books.error_message()),
                );
            }
        }
        Value::Object(data)
    }
}

#[derive(Debug)]
pub struct GraduationReport {
    pub student_id: i64,
    pub required_credits: i64,
    pub tuition: SubQuery<bool>,
    pub credits: SubQuery<i64>,
    pub overdue: SubQuery<i64>,
}

impl GraduationReport {
    pub fn tuition_paid(&self) -> bool {
        self.tuition.ok().copied().unwrap_or(false)
    }

    pub fn total_credits(&self) -> i64 {
        self.credits.ok().copied().unwrap_or(0)
    }

    pub fn credits_validated(&self) -> bool {
        self.credits
            .ok()
            .map(|total| *total >= self.required_credits)
            .unwrap_or(false)
    }

    pub fn overdue_books_count(&self) -> i64 {
        self.overdue.ok().copied().unwrap_or(0)
    }

    pub fn no_overdue_books(&self) -> bool {
        self.overdue.ok().map(|count| *count == 0).unwrap_or(false)
    }

    pub fn eligible(&self) -> bool {
        self.tuition_paid() && self.credits_validated() && self.no_overdue_books()
    }

    pub fn to_json(&self) -> Value {
        let mut checks = Map::new();
        checks.insert("tuition_paid".into(), json!(self.tuition_paid()));
        if let Some(msg) = self.tuition.error_message() {
            checks.insert("tuition_error".into(), json!(msg));
        }
        checks.insert("credits_validated".into(), json!(self.credits_validated()));
        checks.insert("total_credits".into(), json!(self.total_credits()));
        if let Some(msg) = self.credits.error_message() {
            checks.insert("credits_error".into(), json!(msg));
        }
        checks.insert("no_overdue_books".into(), json!(self.no_overdue_books()));
        checks.insert(
            "overdue_books_count".into(),
            json!(self.overdue_books_count()),
        );
        if let Some(msg) = self.overdue.error_message() {
            checks.insert("overdue_error".into(), json!(msg));
        }
        checks.insert("eligible_for_graduation".into(), json!(self.eligible()));
        Value::Object(checks)
    }
}

#[derive(Debug)]
pub struct PopulateReport {
    pub execution_time_ms: f64,
    pub students: SubQuery<u64>,
    pub grades: SubQuery<u64>,
    pub books: SubQuery<u64>,
}

impl PopulateReport {
    pub fn to_json(&self) -> Value {
        let mut results = Map::new();
        for sub in [&self.students, &self.grades, &self.books] {
            let entry = match &sub.result {
                Ok(count) => json!({"status": "success", "count": count}),
                Err(err) => json!({"status": "error", "message": err.to_string()}),
            };
            results.insert(sub.backend.clone(), entry);
        }
        json!({
            "status": "success",
            "state": "completed",
            "execution_time": self.execution_time_ms,
            "results": results,
        })
    }
}

impl Gateway {
    /// Profile, GPA and borrowed-book count, fetched concurrently.
    pub async fn dashboard(&self, student_id: i64) -> Dashboard {
        let (profile, gpa, borrowed) = tokio::join!(
            self.student_profile(student_id),
            self.student_gpa(student_id),
            self.borrowed_books_count(student_id),
        );
        Dashboard {
            student_id,
            profile: SubQuery::new(self, LogicalEntity::Student, profile),
            gpa: SubQuery::new(self, LogicalEntity::Grade, gpa),
            borrowed_books: SubQuery::new(self, LogicalEntity::Loan, borrowed),
        }
    }

    /// The three graduation checks. A check whose store fails counts as
    /// not satisfied.
    pub async fn graduation(&self, student_id: i64) -> GraduationReport {
        let (tuition, credits, overdue) = tokio::join!(
            self.tuition_paid(student_id),
            self.validated_credits(student_id),
            self.overdue_books_count(student_id),
        );
        let report = GraduationReport {
            student_id,
            required_credits: self.policy().required_credits,
            tuition: SubQuery::new(self, LogicalEntity::Payment, tuition),
            credits: SubQuery::new(self, LogicalEntity::Grade, credits),
            overdue: SubQuery::new(self, LogicalEntity::Loan, overdue),
        };
        info!(
            student_id,
            eligible = report.eligible(),
            "graduation checked"
        );
        report
    }

    /// Load the demo students, grades and books, one transaction per store.
    pub async fn populate_sample(&self) -> PopulateReport {
        let start = Instant::now();
        let (students, grades, books) = tokio::join!(
            self.insert_all(LogicalEntity::Student, sample_students()),
            self.insert_all(LogicalEntity::Grade, sample_grades()),
            self.insert_all(LogicalEntity::Book, sample_books()),
        );
        let report = PopulateReport {
            execution_time_ms: (start.elapsed().as_secs_f64() * 100_000.0).round() / 100.0,
            students: SubQuery::new(self, LogicalEntity::Student, students),
            grades: SubQuery::new(self, LogicalEntity::Grade, grades),
            books: SubQuery::new(self, LogicalEntity::Book, books),
        };
        info!(elapsed_ms = report.execution_time_ms, "sample data populated");
        report
    }
}

fn sample_students() -> Vec<LogicalOperation> {
    [
        (1, "Dupont", "Jean", "0102030405", "123 Rue A"),
        (2, "Martin", "Marie", "0102030406", "456 Rue B"),
        (3, "Dubois", "Pierre", "0102030407", "789 Rue C"),
    ]
    .into_iter()
    .map(|(id, last, first, phone, address)| {
        LogicalOperation::InsertStudent(NewStudent {
            id,
            last_name: last.into(),
            first_name: first.into(),
            email: format!("{}.{}@univ.fr", first.to_lowercase(), last.to_lowercase()),
            phone: Some(phone.into()),
            address: Some(address.into()),
        })
    })
    .collect()
}

fn sample_grades() -> Vec<LogicalOperation> {
    [
        (1, 1, 15.5, (2024, 1, 15)),
        (1, 2, 14.0, (2024, 1, 20)),
        (2, 1, 16.5, (2024, 1, 15)),
        (3, 2, 13.5, (2024, 1, 20)),
    ]
    .into_iter()
    .filter_map(|(student_id, subject_id, grade, (y, m, d))| {
        let evaluated_on = NaiveDate::from_ymd_opt(y, m, d)?;
        Some(LogicalOperation::InsertGrade(NewGrade {
            student_id,
            subject_id,
            grade,
            evaluated_on,
        }))
    })
    .collect()
}

fn sample_books() -> Vec<LogicalOperation> {
    [
        (1, "Introduction à l'Informatique", "Alice Dupont", "Informatique"),
        (2, "Mathématiques Discrètes", "Bob Martin", "Mathématiques"),
        (3, "Bases de Données", "Claire Dubois", "Informatique"),
    ]
    .into_iter()
    .map(|(id, title, author, category)| {
        LogicalOperation::InsertBook(NewBook {
            id,
            title: title.into(),
            author: author.into(),
            category: category.into(),
        })
    })
    .collect()
}
