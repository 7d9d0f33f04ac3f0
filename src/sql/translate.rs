//! Logical operation → dialect SQL translator.
//!
//! Pure and deterministic: the same operation and dialect always produce the
//! same statement. Values are never interpolated; the builder hands out the
//! dialect's placeholder for each value and records the value to bind.

use super::dialect::{Dialect, RowLimit};
use super::operation::{LogicalOperation, OperationKind};
use super::value::SqlValue;
use crate::error::{GatewayError, Result};

const STUDENTS: &str = "etudiants";
const PAYMENTS: &str = "paiements";
const GRADES: &str = "notes";
const SUBJECTS: &str = "matieres";
const BOOKS: &str = "livres";
const LOANS: &str = "emprunts";

/// Status code stored for enrolled students.
pub const ENROLLED_STATUS: &str = "INSCRIT";
const TUITION_PAYMENT_TYPE: &str = "SCOLARITE";
const PAID_STATUS: &str = "PAYE";
const LIKE_ESCAPE: char = '!';

/// A translated statement, ready to hand to a session.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub operation: LogicalOperation,
    pub dialect: Dialect,
    /// SQL text containing only placeholders for variable values.
    pub sql: String,
    /// Values to bind, in placeholder order.
    pub params: Vec<SqlValue>,
    /// Declared output columns. Empty for writes.
    pub columns: Vec<&'static str>,
}

impl Statement {
    pub fn kind(&self) -> OperationKind {
        self.operation.kind()
    }

    pub fn returns_rows(&self) -> bool {
        !self.columns.is_empty()
    }
}

/// Translate `op` into SQL for `dialect`.
pub fn translate(op: &LogicalOperation, dialect: Dialect) -> Result<Statement> {
    validate(op)?;

    let mut binder = Binder::new(dialect);
    let (sql, columns) = match op {
        LogicalOperation::StudentProbe { limit } => Select::table(STUDENTS)
            .column("id_etudiant")
            .column("nom")
            .column("prenom")
            .column("email")
            .column("statut")
            .limit(*limit)
            .render(&mut binder),
        LogicalOperation::StudentEnrollment { student_id } => {
            let filter = format!("id_etudiant = {}", binder.bind(*student_id));
            Select::table(STUDENTS)
                .column("id_etudiant")
                .column("nom")
                .column("prenom")
                .column("statut")
                .filter(filter)
                .limit(1)
                .render(&mut binder)
        }
        LogicalOperation::StudentDetails { student_id } => {
            let filter = format!("id_etudiant = {}", binder.bind(*student_id));
            Select::table(STUDENTS)
                .column("id_etudiant")
                .column("nom")
                .column("prenom")
                .column("email")
                .column("telephone")
                .column("adresse")
                .column("statut")
                .filter(filter)
                .render(&mut binder)
        }
        LogicalOperation::StudentSearch { name, limit } => {
            let filter = format!(
                "UPPER(nom) LIKE UPPER({}) ESCAPE '{}'",
                binder.bind(like_contains(name)),
                LIKE_ESCAPE
            );
            Select::table(STUDENTS)
                .column("id_etudiant")
                .column("nom")
                .column("prenom")
                .filter(filter)
                .order_by("nom")
                .limit(*limit)
                .render(&mut binder)
        }
        LogicalOperation::EnrollmentCount { status } => {
            let filter = format!("statut = {}", binder.bind(status.as_str()));
            Select::table(STUDENTS)
                .expr("COUNT(*)", "total")
                .filter(filter)
                .render(&mut binder)
        }
        LogicalOperation::StudentProfile { student_id } => {
            let filter = format!("id_etudiant = {}", binder.bind(*student_id));
            Select::table(STUDENTS)
                .column("id_etudiant")
                .column("nom")
                .column("prenom")
                .column("email")
                .column("telephone")
                .column("adresse")
                .filter(filter)
                .render(&mut binder)
        }
        LogicalOperation::TuitionPayment { student_id } => {
            let by_student = format!("id_etudiant = {}", binder.bind(*student_id));
            let by_type = format!("type_paiement = {}", binder.bind(TUITION_PAYMENT_TYPE));
            let by_status = format!("statut = {}", binder.bind(PAID_STATUS));
            Select::table(PAYMENTS)
                .expr("COUNT(*)", "frais_payes")
                .filter(by_student)
                .filter(by_type)
                .filter(by_status)
                .render(&mut binder)
        }
        LogicalOperation::InsertStudent(student) => insert(
            &mut binder,
            STUDENTS,
            &[
                ("id_etudiant", student.id.into()),
                ("nom", student.last_name.as_str().into()),
                ("prenom", student.first_name.as_str().into()),
                ("email", student.email.as_str().into()),
                ("telephone", student.phone.clone().into()),
                ("adresse", student.address.clone().into()),
                ("statut", ENROLLED_STATUS.into()),
            ],
        ),
        LogicalOperation::StudentGrades { student_id } => {
            let filter = format!("n.id_etudiant = {}", binder.bind(*student_id));
            Select::aliased(GRADES, "n")
                .join(format!(
                    "JOIN {} m ON n.id_matiere = m.id_matiere",
                    SUBJECTS
                ))
                .expr("m.nom_matiere", "nom_matiere")
                .expr("n.note", "note")
                .expr("n.date_evaluation", "date_evaluation")
                .filter(filter)
                .order_by("n.date_evaluation DESC")
                .render(&mut binder)
        }
        LogicalOperation::StudentGpa { student_id } => {
            let filter = format!("id_etudiant = {}", binder.bind(*student_id));
            Select::table(GRADES)
                .expr("AVG(note)", "moyenne_generale")
                .filter(filter)
                .render(&mut binder)
        }
        LogicalOperation::ValidatedCredits {
            student_id,
            passing_grade,
        } => {
            let by_student = format!("n.id_etudiant = {}", binder.bind(*student_id));
            let passed = format!("n.note >= {}", binder.bind(*passing_grade));
            Select::aliased(GRADES, "n")
                .join(format!(
                    "JOIN {} m ON n.id_matiere = m.id_matiere",
                    SUBJECTS
                ))
                .expr(&dialect.coalesce("SUM(m.credits)", "0"), "total_credits")
                .filter(by_student)
                .filter(passed)
                .render(&mut binder)
        }
        LogicalOperation::InsertGrade(grade) => insert(
            &mut binder,
            GRADES,
            &[
                ("id_etudiant", grade.student_id.into()),
                ("id_matiere", grade.subject_id.into()),
                ("note", grade.grade.into()),
                ("date_evaluation", grade.evaluated_on.into()),
            ],
        ),
        LogicalOperation::BorrowedBooksCount { student_id } => {
            let filter = format!("id_etudiant = {}", binder.bind(*student_id));
            Select::table(LOANS)
                .expr("COUNT(*)", "livres_empruntes")
                .filter(filter)
                .filter("date_retour IS NULL")
                .render(&mut binder)
        }
        LogicalOperation::OverdueLoansCount { student_id, today } => {
            let by_student = format!("id_etudiant = {}", binder.bind(*student_id));
            let late = format!("date_retour_prevue < {}", binder.bind(*today));
            Select::table(LOANS)
                .expr("COUNT(*)", "livres_en_retard")
                .filter(by_student)
                .filter("date_retour IS NULL")
                .filter(late)
                .render(&mut binder)
        }
        LogicalOperation::AvailableBooks => Select::table(BOOKS)
            .column("id_livre")
            .column("titre")
            .column("auteur")
            .column("categorie")
            .filter(format!("disponible = {}", dialect.bool_literal(true)))
            .order_by("titre")
            .render(&mut binder),
        LogicalOperation::AllBooks => Select::table(BOOKS)
            .column("id_livre")
            .column("titre")
            .column("auteur")
            .column("categorie")
            .column("disponible")
            .order_by("id_livre")
            .render(&mut binder),
        LogicalOperation::StudentCurrentLoans { student_id } => {
            let filter = format!("e.id_etudiant = {}", binder.bind(*student_id));
            Select::aliased(LOANS, "e")
                .join(format!("JOIN {} l ON e.id_livre = l.id_livre", BOOKS))
                .expr("e.id_emprunt", "id_emprunt")
                .expr("l.titre", "titre")
                .expr("l.auteur", "auteur")
                .expr("e.date_emprunt", "date_emprunt")
                .expr("e.date_retour_prevue", "date_retour_prevue")
                .filter(filter)
                .filter("e.date_retour IS NULL")
                .order_by("e.date_emprunt DESC")
                .render(&mut binder)
        }
        LogicalOperation::AllLoans => Select::aliased(LOANS, "e")
            .join(format!("LEFT JOIN {} l ON e.id_livre = l.id_livre", BOOKS))
            .expr("e.id_emprunt", "id_emprunt")
            .expr("e.id_etudiant", "id_etudiant")
            .expr("e.id_livre", "id_livre")
            .expr("l.titre", "titre")
            .expr("l.auteur", "auteur")
            .expr("e.date_emprunt", "date_emprunt")
            .expr("e.date_retour_prevue", "date_retour_prevue")
            .expr("e.date_retour", "date_retour")
            .order_by("e.date_emprunt DESC")
            .render(&mut binder),
        LogicalOperation::LockBookAvailability { book_id } => {
            let filter = format!("id_livre = {}", binder.bind(*book_id));
            Select::table(BOOKS)
                .column("disponible")
                .filter(filter)
                .for_update()
                .render(&mut binder)
        }
        LogicalOperation::LockLoan { loan_id } => {
            let filter = format!("id_emprunt = {}", binder.bind(*loan_id));
            Select::table(LOANS)
                .column("id_emprunt")
                .column("id_livre")
                .column("date_retour")
                .filter(filter)
                .for_update()
                .render(&mut binder)
        }
        LogicalOperation::InsertLoan {
            student_id,
            book_id,
            borrowed_at,
            due_at,
        } => insert(
            &mut binder,
            LOANS,
            &[
                ("id_etudiant", (*student_id).into()),
                ("id_livre", (*book_id).into()),
                ("date_emprunt", (*borrowed_at).into()),
                ("date_retour_prevue", (*due_at).into()),
            ],
        ),
        LogicalOperation::CloseLoan {
            loan_id,
            returned_at,
        } => {
            let set = format!("date_retour = {}", binder.bind(*returned_at));
            let filter = format!("id_emprunt = {}", binder.bind(*loan_id));
            (
                format!(
                    "UPDATE {} SET {} WHERE {} AND date_retour IS NULL",
                    LOANS, set, filter
                ),
                Vec::new(),
            )
        }
        LogicalOperation::SetBookAvailability { book_id, available } => {
            let set = format!("disponible = {}", binder.bind(*available));
            let filter = format!("id_livre = {}", binder.bind(*book_id));
            (
                format!("UPDATE {} SET {} WHERE {}", BOOKS, set, filter),
                Vec::new(),
            )
        }
        LogicalOperation::InsertBook(book) => insert(
            &mut binder,
            BOOKS,
            &[
                ("id_livre", book.id.into()),
                ("titre", book.title.as_str().into()),
                ("auteur", book.author.as_str().into()),
                ("categorie", book.category.as_str().into()),
                ("disponible", true.into()),
            ],
        ),
    };

    Ok(Statement {
        operation: op.clone(),
        dialect,
        sql,
        params: binder.into_params(),
        columns,
    })
}

fn validate(op: &LogicalOperation) -> Result<()> {
    match op {
        LogicalOperation::StudentProbe { limit } | LogicalOperation::StudentSearch { limit, .. }
            if *limit == 0 =>
        {
            return Err(GatewayError::InvalidInput(format!(
                "{}: row limit must be at least 1",
                op.name()
            )));
        }
        _ => {}
    }

    let texts: Vec<&str> = match op {
        LogicalOperation::StudentSearch { name, .. } => vec![name.as_str()],
        LogicalOperation::EnrollmentCount { status } => vec![status.as_str()],
        LogicalOperation::InsertStudent(s) => {
            let mut v = vec![s.last_name.as_str(), s.first_name.as_str(), s.email.as_str()];
            v.extend(s.phone.as_deref());
            v.extend(s.address.as_deref());
            v
        }
        LogicalOperation::InsertBook(b) => {
            vec![b.title.as_str(), b.author.as_str(), b.category.as_str()]
        }
        _ => Vec::new(),
    };
    if texts.iter().any(|t| t.contains('\0')) {
        return Err(GatewayError::InvalidInput(format!(
            "{}: text values must not contain NUL bytes",
            op.name()
        )));
    }
    Ok(())
}

/// `%value%` with LIKE wildcards in `value` escaped.
fn like_contains(value: &str) -> String {
    let mut pattern = String::with_capacity(value.len() + 2);
    pattern.push('%');
    for ch in value.chars() {
        if ch == '%' || ch == '_' || ch == LIKE_ESCAPE {
            pattern.push(LIKE_ESCAPE);
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}

struct Binder {
    dialect: Dialect,
    params: Vec<SqlValue>,
}

impl Binder {
    fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            params: Vec::new(),
        }
    }

    /// Record a value and return its placeholder. Call in textual order.
    fn bind(&mut self, value: impl Into<SqlValue>) -> String {
        let value = self.dialect.bind_value(value.into());
        self.params.push(value);
        self.dialect.placeholder(self.params.len())
    }

    fn into_params(self) -> Vec<SqlValue> {
        self.params
    }
}

fn insert(
    binder: &mut Binder,
    table: &str,
    values: &[(&str, SqlValue)],
) -> (String, Vec<&'static str>) {
    let columns: Vec<&str> = values.iter().map(|(c, _)| *c).collect();
    let placeholders: Vec<String> = values.iter().map(|(_, v)| binder.bind(v.clone())).collect();
    (
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table,
            columns.join(", "),
            placeholders.join(", ")
        ),
        Vec::new(),
    )
}

/// The SELECT shapes the catalogue needs. Filters are rendered with their
/// placeholders already bound, so they must be added in textual order.
struct Select {
    from: String,
    joins: Vec<String>,
    projections: Vec<String>,
    columns: Vec<&'static str>,
    filters: Vec<String>,
    order_by: Vec<&'static str>,
    limit: Option<u32>,
    for_update: bool,
}

impl Select {
    fn table(table: &str) -> Self {
        Self {
            from: table.to_string(),
            joins: Vec::new(),
            projections: Vec::new(),
            columns: Vec::new(),
            filters: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            for_update: false,
        }
    }

    fn aliased(table: &str, alias: &str) -> Self {
        // No AS: Oracle rejects it for table aliases
        Self::table(&format!("{} {}", table, alias))
    }

    fn column(mut self, name: &'static str) -> Self {
        self.projections.push(name.to_string());
        self.columns.push(name);
        self
    }

    fn expr(mut self, expr: &str, alias: &'static str) -> Self {
        let unqualified = expr.rsplit('.').next().unwrap_or(expr);
        if unqualified == alias {
            self.projections.push(expr.to_string());
        } else {
            self.projections.push(format!("{} AS {}", expr, alias));
        }
        self.columns.push(alias);
        self
    }

    fn join(mut self, clause: String) -> Self {
        self.joins.push(clause);
        self
    }

    fn filter(mut self, predicate: impl Into<String>) -> Self {
        self.filters.push(predicate.into());
        self
    }

    fn order_by(mut self, key: &'static str) -> Self {
        self.order_by.push(key);
        self
    }

    fn limit(mut self, n: u32) -> Self {
        self.limit = Some(n);
        self
    }

    fn for_update(mut self) -> Self {
        self.for_update = true;
        self
    }

    fn render(self, binder: &mut Binder) -> (String, Vec<&'static str>) {
        let dialect = binder.dialect;
        let mut filters = self.filters;
        let mut parts = Vec::new();
        let mut wrap_limit = None;

        parts.push(format!("SELECT {}", self.projections.join(", ")));
        parts.push(format!("FROM {}", self.from));
        parts.extend(self.joins);

        let mut trailing_limit = None;
        if let Some(n) = self.limit {
            match dialect.row_limit() {
                RowLimit::RownumPredicate if self.order_by.is_empty() => {
                    filters.push(format!("ROWNUM <= {}", binder.bind(i64::from(n))));
                }
                // ROWNUM is assigned before ORDER BY; limit the ordered set from outside
                RowLimit::RownumPredicate => wrap_limit = Some(n),
                RowLimit::LimitClause => trailing_limit = Some(n),
            }
        }

        if !filters.is_empty() {
            parts.push(format!("WHERE {}", filters.join(" AND ")));
        }
        if !self.order_by.is_empty() {
            parts.push(format!("ORDER BY {}", self.order_by.join(", ")));
        }
        if let Some(n) = trailing_limit {
            parts.push(format!("LIMIT {}", binder.bind(i64::from(n))));
        }
        if self.for_update {
            parts.push("FOR UPDATE".to_string());
        }

        let mut sql = parts.join(" ");
        if let Some(n) = wrap_limit {
            sql = format!(
                "SELECT * FROM ({}) WHERE ROWNUM <= {}",
                sql,
                binder.bind(i64::from(n))
            );
        }
        (sql, self.columns)
    }
}
