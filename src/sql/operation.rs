//! Logical data operations and their parameter schemas.
//!
//! Each variant is one statement the gateway knows how to issue; the fields
//! are its parameters. Values only ever reach SQL as bound parameters.

use chrono::NaiveDate;
use std::fmt;
use std::str::FromStr;

use crate::error::GatewayError;

#[derive(Debug, Clone, PartialEq)]
pub enum LogicalOperation {
    // --- enrollment store ---
    StudentProbe {
        limit: u32,
    },
    StudentEnrollment {
        student_id: i64,
    },
    StudentDetails {
        student_id: i64,
    },
    StudentSearch {
        name: String,
        limit: u32,
    },
    EnrollmentCount {
        status: String,
    },
    StudentProfile {
        student_id: i64,
    },
    TuitionPayment {
        student_id: i64,
    },
    InsertStudent(NewStudent),

    // --- grading store ---
    StudentGrades {
        student_id: i64,
    },
    StudentGpa {
        student_id: i64,
    },
    ValidatedCredits {
        student_id: i64,
        passing_grade: f64,
    },
    InsertGrade(NewGrade),

    // --- library store ---
    BorrowedBooksCount {
        student_id: i64,
    },
    OverdueLoansCount {
        student_id: i64,
        today: NaiveDate,
    },
    AvailableBooks,
    AllBooks,
    StudentCurrentLoans {
        student_id: i64,
    },
    AllLoans,
    LockBookAvailability {
        book_id: i64,
    },
    LockLoan {
        loan_id: i64,
    },
    InsertLoan {
        student_id: i64,
        book_id: i64,
        borrowed_at: NaiveDate,
        due_at: NaiveDate,
    },
    CloseLoan {
        loan_id: i64,
        returned_at: NaiveDate,
    },
    SetBookAvailability {
        book_id: i64,
        available: bool,
    },
    InsertBook(NewBook),
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewStudent {
    pub id: i64,
    pub last_name: String,
    pub first_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewGrade {
    pub student_id: i64,
    pub subject_id: i64,
    pub grade: f64,
    pub evaluated_on: NaiveDate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewBook {
    pub id: i64,
    pub title: String,
    pub author: String,
    pub category: String,
}

/// Fieldless mirror of [`LogicalOperation`], used for naming and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    StudentProbe,
    StudentEnrollment,
    StudentDetails,
    StudentSearch,
    EnrollmentCount,
    StudentProfile,
    TuitionPayment,
    InsertStudent,
    StudentGrades,
    StudentGpa,
    ValidatedCredits,
    InsertGrade,
    BorrowedBooksCount,
    OverdueLoansCount,
    AvailableBooks,
    AllBooks,
    StudentCurrentLoans,
    AllLoans,
    LockBookAvailability,
    LockLoan,
    InsertLoan,
    CloseLoan,
    SetBookAvailability,
    InsertBook,
}

impl OperationKind {
    pub const ALL: [OperationKind; 24] = [
        OperationKind::StudentProbe,
        OperationKind::StudentEnrollment,
        OperationKind::StudentDetails,
        OperationKind::StudentSearch,
        OperationKind::EnrollmentCount,
        OperationKind::StudentProfile,
        OperationKind::TuitionPayment,
        OperationKind::InsertStudent,
        OperationKind::StudentGrades,
        OperationKind::StudentGpa,
        OperationKind::ValidatedCredits,
        OperationKind::InsertGrade,
        OperationKind::BorrowedBooksCount,
        OperationKind::OverdueLoansCount,
        OperationKind::AvailableBooks,
        OperationKind::AllBooks,
        OperationKind::StudentCurrentLoans,
        OperationKind::AllLoans,
        OperationKind::LockBookAvailability,
        OperationKind::LockLoan,
        OperationKind::InsertLoan,
        OperationKind::CloseLoan,
        OperationKind::SetBookAvailability,
        OperationKind::InsertBook,
    ];

    pub fn name(self) -> &'static str {
        match self {
            OperationKind::StudentProbe => "student_probe",
            OperationKind::StudentEnrollment => "student_enrollment_check",
            OperationKind::StudentDetails => "student_details",
            OperationKind::StudentSearch => "student_search",
            OperationKind::EnrollmentCount => "enrollment_count",
            OperationKind::StudentProfile => "student_profile",
            OperationKind::TuitionPayment => "tuition_payment_check",
            OperationKind::InsertStudent => "student_insert",
            OperationKind::StudentGrades => "student_grades",
            OperationKind::StudentGpa => "student_gpa",
            OperationKind::ValidatedCredits => "validated_credits",
            OperationKind::InsertGrade => "grade_insert",
            OperationKind::BorrowedBooksCount => "borrowed_books_count",
            OperationKind::OverdueLoansCount => "overdue_loans_count",
            OperationKind::AvailableBooks => "available_books",
            OperationKind::AllBooks => "all_books",
            OperationKind::StudentCurrentLoans => "student_current_loans",
            OperationKind::AllLoans => "all_loans",
            OperationKind::LockBookAvailability => "book_availability_lock",
            OperationKind::LockLoan => "loan_lock",
            OperationKind::InsertLoan => "loan_insert",
            OperationKind::CloseLoan => "loan_close",
            OperationKind::SetBookAvailability => "book_availability_update",
            OperationKind::InsertBook => "book_insert",
        }
    }

    /// Whether the operation writes and therefore needs a transaction.
    pub fn is_mutation(self) -> bool {
        matches!(
            self,
            OperationKind::InsertStudent
                | OperationKind::InsertGrade
                | OperationKind::InsertLoan
                | OperationKind::CloseLoan
                | OperationKind::SetBookAvailability
                | OperationKind::InsertBook
        )
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for OperationKind {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OperationKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| GatewayError::unsupported(s, "unknown logical operation"))
    }
}

impl LogicalOperation {
    pub fn kind(&self) -> OperationKind {
        match self {
            LogicalOperation::StudentProbe { .. } => OperationKind::StudentProbe,
            LogicalOperation::StudentEnrollment { .. } => OperationKind::StudentEnrollment,
            LogicalOperation::StudentDetails { .. } => OperationKind::StudentDetails,
            LogicalOperation::StudentSearch { .. } => OperationKind::StudentSearch,
            LogicalOperation::EnrollmentCount { .. } => OperationKind::EnrollmentCount,
            LogicalOperation::StudentProfile { .. } => OperationKind::StudentProfile,
            LogicalOperation::TuitionPayment { .. } => OperationKind::TuitionPayment,
            LogicalOperation::InsertStudent(_) => OperationKind::InsertStudent,
            LogicalOperation::StudentGrades { .. } => OperationKind::StudentGrades,
            LogicalOperation::StudentGpa { .. } => OperationKind::StudentGpa,
            LogicalOperation::ValidatedCredits { .. } => OperationKind::ValidatedCredits,
            LogicalOperation::InsertGrade(_) => OperationKind::InsertGrade,
            LogicalOperation::BorrowedBooksCount { .. } => OperationKind::BorrowedBooksCount,
            LogicalOperation::OverdueLoansCount { .. } => OperationKind::OverdueLoansCount,
            LogicalOperation::AvailableBooks => OperationKind::AvailableBooks,
            LogicalOperation::AllBooks => OperationKind::AllBooks,
            LogicalOperation::StudentCurrentLoans { .. } => OperationKind::StudentCurrentLoans,
            LogicalOperation::AllLoans => OperationKind::AllLoans,
            LogicalOperation::LockBookAvailability { .. } => OperationKind::LockBookAvailability,
            LogicalOperation::LockLoan { .. } => OperationKind::LockLoan,
            LogicalOperation::InsertLoan { .. } => OperationKind::InsertLoan,
            LogicalOperation::CloseLoan { .. } => OperationKind::CloseLoan,
            LogicalOperation::SetBookAvailability { .. } => OperationKind::SetBookAvailability,
            LogicalOperation::InsertBook(_) => OperationKind::InsertBook,
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind().name()
    }
}
