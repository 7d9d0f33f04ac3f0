//! Row → response object shaping.
//!
//! Output fields are listed explicitly per operation; nothing is inferred
//! from the driver's column metadata. Presentations only change how a value
//! is written, never the value itself.

use serde_json::{Map, Number, Value};

use crate::db::Row;
use crate::error::Result;
use crate::sql::SqlValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presentation {
    /// The cell as-is.
    Value,
    /// Dates as `dd/mm/YYYY`.
    DayMonthYear,
    /// Dates as `YYYY-mm-dd`, timestamps as `YYYY-mm-ddTHH:MM:SS`.
    IsoDate,
    /// 0/1 flags as JSON booleans.
    Flag,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputColumn {
    pub column: &'static str,
    pub field: &'static str,
    pub presentation: Presentation,
}

impl OutputColumn {
    pub const fn value(column: &'static str) -> Self {
        Self::with(column, Presentation::Value)
    }

    pub const fn with(column: &'static str, presentation: Presentation) -> Self {
        Self {
            column,
            field: column,
            presentation,
        }
    }

    pub const fn renamed(column: &'static str, field: &'static str) -> Self {
        Self {
            column,
            field,
            presentation: Presentation::Value,
        }
    }
}

/// Plain output columns, one per name.
pub fn plain(columns: &[&'static str]) -> Vec<OutputColumn> {
    columns.iter().copied().map(OutputColumn::value).collect()
}

pub fn shape_row(row: &Row, columns: &[OutputColumn]) -> Result<Map<String, Value>> {
    let mut obj = Map::new();
    for out in columns {
        let cell = row.get(out.column)?;
        obj.insert(out.field.to_string(), present(cell, out.presentation));
    }
    Ok(obj)
}

pub fn shape_rows(rows: &[Row], columns: &[OutputColumn]) -> Result<Vec<Value>> {
    rows.iter()
        .map(|row| shape_row(row, columns).map(Value::Object))
        .collect()
}

fn present(cell: &SqlValue, presentation: Presentation) -> Value {
    match (presentation, cell) {
        (_, SqlValue::Null) => Value::Null,
        (Presentation::DayMonthYear, SqlValue::Date(d)) => {
            Value::String(d.format("%d/%m/%Y").to_string())
        }
        (Presentation::DayMonthYear, SqlValue::Timestamp(ts)) => {
            Value::String(ts.format("%d/%m/%Y").to_string())
        }
        (Presentation::IsoDate, SqlValue::Date(d)) => {
            Value::String(d.format("%Y-%m-%d").to_string())
        }
        (Presentation::IsoDate, SqlValue::Timestamp(ts)) => {
            Value::String(ts.format("%Y-%m-%dT%H:%M:%S").to_string())
        }
        (Presentation::Flag, value) => value
            .as_bool()
            .map(Value::Bool)
            .unwrap_or_else(|| cell_to_json(value)),
        (_, value) => cell_to_json(value),
    }
}

pub fn cell_to_json(cell: &SqlValue) -> Value {
    match cell {
        SqlValue::Null => Value::Null,
        SqlValue::Bool(b) => Value::Bool(*b),
        SqlValue::Int(i) => Value::from(*i),
        SqlValue::Float(f) => Number::from_f64(*f).map(Value::Number).unwrap_or(Value::Null),
        SqlValue::Text(s) => Value::String(s.clone()),
        SqlValue::Date(d) => Value::String(d.to_string()),
        SqlValue::Timestamp(ts) => Value::String(ts.format("%Y-%m-%dT%H:%M:%S").to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn loan_row() -> Row {
        let names: Vec<String> = ["ID_EMPRUNT", "DATE_EMPRUNT", "DATE_RETOUR", "DISPONIBLE"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        Row::conform(
            &names,
            vec![
                SqlValue::Int(7),
                SqlValue::Date(NaiveDate::from_ymd_opt(2024, 3, 5).unwrap()),
                SqlValue::Null,
                SqlValue::Int(0),
            ],
            &["id_emprunt", "date_emprunt", "date_retour", "disponible"],
        )
        .unwrap()
    }

    #[test]
    fn test_day_month_year() {
        let obj = shape_row(
            &loan_row(),
            &[OutputColumn::with("date_emprunt", Presentation::DayMonthYear)],
        )
        .unwrap();
        assert_eq!(obj["date_emprunt"], Value::String("05/03/2024".into()));
    }

    #[test]
    fn test_iso_date_and_null() {
        let obj = shape_row(
            &loan_row(),
            &[
                OutputColumn::with("date_emprunt", Presentation::IsoDate),
                OutputColumn::with("date_retour", Presentation::IsoDate),
            ],
        )
        .unwrap();
        assert_eq!(obj["date_emprunt"], Value::String("2024-03-05".into()));
        assert_eq!(obj["date_retour"], Value::Null);
    }

    #[test]
    fn test_flag_and_rename() {
        let obj = shape_row(
            &loan_row(),
            &[
                OutputColumn::with("disponible", Presentation::Flag),
                OutputColumn::renamed("id_emprunt", "loan_id"),
            ],
        )
        .unwrap();
        assert_eq!(obj["disponible"], Value::Bool(false));
        assert_eq!(obj["loan_id"], Value::from(7));
        assert!(!obj.contains_key("id_emprunt"));
    }

    #[test]
    fn test_unknown_column_is_malformed() {
        let err = shape_row(&loan_row(), &plain(&["titre"])).unwrap_err();
        assert_eq!(err.kind(), "malformed_row");
    }

    #[test]
    fn test_cell_to_json() {
        assert_eq!(cell_to_json(&SqlValue::Float(12.5)), serde_json::json!(12.5));
        assert_eq!(cell_to_json(&SqlValue::Float(f64::NAN)), Value::Null);
        assert_eq!(cell_to_json(&SqlValue::Int(3)), serde_json::json!(3));
        assert_eq!(
            cell_to_json(&SqlValue::Text("Dupont".into())),
            serde_json::json!("Dupont")
        );
    }

    #[test]
    fn test_shape_rows_keeps_raw_values() {
        let rows = vec![loan_row(), loan_row()];
        let shaped = shape_rows(&rows, &plain(&["disponible", "id_emprunt"])).unwrap();
        assert_eq!(shaped.len(), 2);
        assert_eq!(shaped[0].as_object().unwrap().len(), 2);
        assert_eq!(shaped[0]["disponible"], serde_json::json!(0));
    }
}
