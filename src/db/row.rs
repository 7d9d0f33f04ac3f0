use chrono::NaiveDate;

use crate::error::{GatewayError, Result};
use crate::sql::SqlValue;

/// One result row, conformed to a statement's declared output columns.
///
/// Drivers hand back cells in whatever order and case the backend chose;
/// `conform` reorders them to the declared list so later stages can address
/// cells by their declared name.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Vec<&'static str>,
    values: Vec<SqlValue>,
}

impl Row {
    /// Match `names`/`values` from a driver against `declared`, ignoring case.
    pub fn conform(
        names: &[String],
        mut values: Vec<SqlValue>,
        declared: &[&'static str],
    ) -> Result<Self> {
        let mut conformed = Vec::with_capacity(declared.len());
        for column in declared {
            let idx = names
                .iter()
                .position(|n| n.eq_ignore_ascii_case(column))
                .ok_or_else(|| GatewayError::MalformedRow(column.to_string()))?;
            let value = values
                .get_mut(idx)
                .map(|v| std::mem::replace(v, SqlValue::Null))
                .ok_or_else(|| GatewayError::MalformedRow(column.to_string()))?;
            conformed.push(value);
        }
        Ok(Self {
            columns: declared.to_vec(),
            values: conformed,
        })
    }

    pub fn columns(&self) -> &[&'static str] {
        &self.columns
    }

    pub fn get(&self, column: &str) -> Result<&SqlValue> {
        self.columns
            .iter()
            .position(|c| *c == column)
            .map(|idx| &self.values[idx])
            .ok_or_else(|| GatewayError::MalformedRow(column.to_string()))
    }

    pub fn get_i64(&self, column: &str) -> Result<Option<i64>> {
        let value = self.get(column)?;
        if value.is_null() {
            return Ok(None);
        }
        value
            .as_i64()
            .map(Some)
            .ok_or_else(|| type_mismatch(column, "integer", value))
    }

    pub fn get_f64(&self, column: &str) -> Result<Option<f64>> {
        let value = self.get(column)?;
        if value.is_null() {
            return Ok(None);
        }
        value
            .as_f64()
            .map(Some)
            .ok_or_else(|| type_mismatch(column, "number", value))
    }

    pub fn get_bool(&self, column: &str) -> Result<Option<bool>> {
        let value = self.get(column)?;
        if value.is_null() {
            return Ok(None);
        }
        value
            .as_bool()
            .map(Some)
            .ok_or_else(|| type_mismatch(column, "boolean", value))
    }

    pub fn get_date(&self, column: &str) -> Result<Option<NaiveDate>> {
        let value = self.get(column)?;
        if value.is_null() {
            return Ok(None);
        }
        value
            .as_date()
            .map(Some)
            .ok_or_else(|| type_mismatch(column, "date", value))
    }
}

fn type_mismatch(column: &str, expected: &str, found: &SqlValue) -> GatewayError {
    GatewayError::Query(format!(
        "column '{}' holds {} where {} was expected",
        column,
        found.type_name(),
        expected
    ))
}
