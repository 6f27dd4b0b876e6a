//! Row predicates applied before grouping.
//!
//! Filtering never touches the source table; it produces a derived one.

use crate::error::{InsightsError, Result};
use crate::types::{Column, Record, Table};
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Predicate {
    /// Categorical equality.
    Equals { column: Column, value: String },
    /// Inclusive numeric range.
    Between { column: Column, min: f64, max: f64 },
}

impl Predicate {
    fn validate(&self, table: &Table) -> Result<()> {
        match self {
            Predicate::Equals { column, .. } => table.require_categorical(*column),
            Predicate::Between { column, min, max } => {
                table.require_numeric(*column)?;
                if min > max || min.is_nan() || max.is_nan() {
                    return Err(InsightsError::InvalidParameter(format!(
                        "empty range {}..={} on '{}'",
                        min, max, column
                    )));
                }
                Ok(())
            }
        }
    }

    /// Rows missing the predicate's column never match.
    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Predicate::Equals { column, value } => record.category(*column) == Some(value.as_str()),
            Predicate::Between { column, min, max } => record
                .number(*column)
                .map(|v| v >= *min && v <= *max)
                .unwrap_or(false),
        }
    }
}

/// Conjunction of predicates. An empty filter keeps every row.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RowFilter {
    predicates: Vec<Predicate>,
}

impl RowFilter {
    pub fn new() -> RowFilter {
        RowFilter::default()
    }

    pub fn equals(mut self, column: Column, value: impl Into<String>) -> RowFilter {
        self.predicates.push(Predicate::Equals {
            column,
            value: value.into(),
        });
        self
    }

    pub fn between(mut self, column: Column, min: f64, max: f64) -> RowFilter {
        self.predicates.push(Predicate::Between { column, min, max });
        self
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    /// Build the derived table of matching rows.
    pub fn apply(&self, table: &Table) -> Result<Table> {
        for p in &self.predicates {
            p.validate(table)?;
        }
        let records: Vec<Record> = table
            .records()
            .iter()
            .filter(|r| self.predicates.iter().all(|p| p.matches(r)))
            .cloned()
            .collect();
        debug!(
            "Filter kept {} of {} rows ({} predicates)",
            records.len(),
            table.len(),
            self.predicates.len()
        );
        Ok(Table::new(table.schema().clone(), records))
    }
}
