use crate::error::{InsightsError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use tabled::Tabled;

/// Attributes of an employee record that the dashboards know about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Column {
    Department,
    Gender,
    Region,
    Education,
    Age,
    IsPromoted,
    AvgTrainingScore,
    KpisMet,
    LengthOfService,
    AwardsWon,
}

impl Column {
    pub const ALL: [Column; 10] = [
        Column::Department,
        Column::Gender,
        Column::Region,
        Column::Education,
        Column::Age,
        Column::IsPromoted,
        Column::AvgTrainingScore,
        Column::KpisMet,
        Column::LengthOfService,
        Column::AwardsWon,
    ];

    /// Header of the column in the source file.
    pub fn header(self) -> &'static str {
        match self {
            Column::Department => "department",
            Column::Gender => "gender",
            Column::Region => "region",
            Column::Education => "education",
            Column::Age => "age",
            Column::IsPromoted => "is_promoted",
            Column::AvgTrainingScore => "avg_training_score",
            Column::KpisMet => "KPIs_met >80%",
            Column::LengthOfService => "length_of_service",
            Column::AwardsWon => "awards_won?",
        }
    }

    /// Identifier-safe name used in metric names and exports.
    pub fn name(self) -> &'static str {
        match self {
            Column::Department => "department",
            Column::Gender => "gender",
            Column::Region => "region",
            Column::Education => "education",
            Column::Age => "age",
            Column::IsPromoted => "is_promoted",
            Column::AvgTrainingScore => "avg_training_score",
            Column::KpisMet => "KPIs_met_over_80pct",
            Column::LengthOfService => "length_of_service",
            Column::AwardsWon => "awards_won",
        }
    }

    /// Resolve a free-form identifier: either the source header or the
    /// identifier-safe name, case-insensitively.
    pub fn from_name(name: &str) -> Result<Column> {
        let wanted = name.trim();
        Column::ALL
            .into_iter()
            .find(|c| c.header().eq_ignore_ascii_case(wanted) || c.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| InsightsError::InvalidParameter(format!("unknown column '{}'", name)))
    }

    pub fn is_categorical(self) -> bool {
        matches!(
            self,
            Column::Department | Column::Gender | Column::Region | Column::Education
        )
    }

    /// 0/1 outcome columns, the only ones a rate makes sense over.
    pub fn is_flag(self) -> bool {
        matches!(self, Column::IsPromoted | Column::KpisMet | Column::AwardsWon)
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Primitive type a column is coerced to at load time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Category,
    Int8,
    Int16,
    Bool,
}

impl ColumnType {
    pub fn is_numeric(self) -> bool {
        !matches!(self, ColumnType::Category)
    }

    /// Inclusive integer bounds for the integer types.
    pub fn bounds(self) -> Option<(i64, i64)> {
        match self {
            ColumnType::Int8 => Some((i8::MIN as i64, i8::MAX as i64)),
            ColumnType::Int16 => Some((i16::MIN as i64, i16::MAX as i64)),
            ColumnType::Bool => Some((0, 1)),
            ColumnType::Category => None,
        }
    }
}

/// Declared column subset with a type per column, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Schema {
    fields: Vec<(Column, ColumnType)>,
}

impl Schema {
    /// Build a schema, rejecting duplicates and types that do not fit the
    /// column (a categorical column declared numeric or the reverse).
    pub fn new(fields: &[(Column, ColumnType)]) -> Result<Schema> {
        let mut out: Vec<(Column, ColumnType)> = Vec::with_capacity(fields.len());
        for &(column, ty) in fields {
            if out.iter().any(|(c, _)| *c == column) {
                return Err(InsightsError::InvalidParameter(format!(
                    "column '{}' declared twice",
                    column
                )));
            }
            if column.is_categorical() == ty.is_numeric() {
                return Err(InsightsError::InvalidParameter(format!(
                    "column '{}' cannot be declared as {:?}",
                    column, ty
                )));
            }
            out.push((column, ty));
        }
        Ok(Schema { fields: out })
    }

    pub fn get(&self, column: Column) -> Option<ColumnType> {
        self.fields
            .iter()
            .find(|(c, _)| *c == column)
            .map(|(_, ty)| *ty)
    }

    pub fn contains(&self, column: Column) -> bool {
        self.get(column).is_some()
    }

    pub fn columns(&self) -> impl Iterator<Item = Column> + '_ {
        self.fields.iter().map(|(c, _)| *c)
    }

    pub fn fields(&self) -> &[(Column, ColumnType)] {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// A single coerced cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Category(String),
    Int(i64),
    Bool(bool),
}

/// One employee. Columns outside the loaded projection, and blank cells in
/// non-key columns, are `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    pub department: Option<String>,
    pub gender: Option<String>,
    pub region: Option<String>,
    pub education: Option<String>,
    pub age: Option<i64>,
    pub is_promoted: Option<bool>,
    pub avg_training_score: Option<i64>,
    pub kpis_met: Option<bool>,
    pub length_of_service: Option<i64>,
    pub awards_won: Option<bool>,
}

impl Record {
    pub fn set(&mut self, column: Column, value: Value) {
        match (column, value) {
            (Column::Department, Value::Category(v)) => self.department = Some(v),
            (Column::Gender, Value::Category(v)) => self.gender = Some(v),
            (Column::Region, Value::Category(v)) => self.region = Some(v),
            (Column::Education, Value::Category(v)) => self.education = Some(v),
            (Column::Age, Value::Int(v)) => self.age = Some(v),
            (Column::AvgTrainingScore, Value::Int(v)) => self.avg_training_score = Some(v),
            (Column::LengthOfService, Value::Int(v)) => self.length_of_service = Some(v),
            (Column::IsPromoted, Value::Bool(v)) => self.is_promoted = Some(v),
            (Column::KpisMet, Value::Bool(v)) => self.kpis_met = Some(v),
            (Column::AwardsWon, Value::Bool(v)) => self.awards_won = Some(v),
            // flags declared as integers still land in their boolean slot
            (Column::IsPromoted, Value::Int(v)) => self.is_promoted = Some(v != 0),
            (Column::KpisMet, Value::Int(v)) => self.kpis_met = Some(v != 0),
            (Column::AwardsWon, Value::Int(v)) => self.awards_won = Some(v != 0),
            (Column::Age, Value::Bool(v)) => self.age = Some(v as i64),
            (Column::AvgTrainingScore, Value::Bool(v)) => self.avg_training_score = Some(v as i64),
            (Column::LengthOfService, Value::Bool(v)) => self.length_of_service = Some(v as i64),
            _ => {}
        }
    }

    pub fn category(&self, column: Column) -> Option<&str> {
        match column {
            Column::Department => self.department.as_deref(),
            Column::Gender => self.gender.as_deref(),
            Column::Region => self.region.as_deref(),
            Column::Education => self.education.as_deref(),
            _ => None,
        }
    }

    pub fn number(&self, column: Column) -> Option<f64> {
        let flag = |b: Option<bool>| b.map(|v| if v { 1.0 } else { 0.0 });
        match column {
            Column::Age => self.age.map(|v| v as f64),
            Column::AvgTrainingScore => self.avg_training_score.map(|v| v as f64),
            Column::LengthOfService => self.length_of_service.map(|v| v as f64),
            Column::IsPromoted => flag(self.is_promoted),
            Column::KpisMet => flag(self.kpis_met),
            Column::AwardsWon => flag(self.awards_won),
            _ => None,
        }
    }

    pub fn has_value(&self, column: Column) -> bool {
        if column.is_categorical() {
            self.category(column).is_some()
        } else {
            self.number(column).is_some()
        }
    }
}

/// Immutable, ordered set of records sharing one schema.
///
/// An empty table with an empty schema is what a failed load produces.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    schema: Schema,
    records: Vec<Record>,
}

impl Table {
    pub fn new(schema: Schema, records: Vec<Record>) -> Table {
        Table { schema, records }
    }

    pub fn empty() -> Table {
        Table::default()
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Fails with `InvalidParameter` when `column` is not part of the schema.
    pub fn column_type(&self, column: Column) -> Result<ColumnType> {
        self.schema.get(column).ok_or_else(|| {
            InsightsError::InvalidParameter(format!("column '{}' is not loaded", column))
        })
    }

    pub fn require_categorical(&self, column: Column) -> Result<()> {
        match self.column_type(column)? {
            ColumnType::Category => Ok(()),
            other => Err(InsightsError::InvalidParameter(format!(
                "column '{}' is {:?}, expected a category",
                column, other
            ))),
        }
    }

    pub fn require_numeric(&self, column: Column) -> Result<ColumnType> {
        let ty = self.column_type(column)?;
        if ty.is_numeric() {
            Ok(ty)
        } else {
            Err(InsightsError::InvalidParameter(format!(
                "column '{}' is a category, expected a number",
                column
            )))
        }
    }

    /// Distinct values of a categorical column in first-encountered order.
    pub fn distinct(&self, column: Column) -> Result<Vec<String>> {
        self.require_categorical(column)?;
        let mut out: Vec<String> = Vec::new();
        for r in &self.records {
            if let Some(v) = r.category(column) {
                if !out.iter().any(|o| o == v) {
                    out.push(v.to_string());
                }
            }
        }
        Ok(out)
    }

    /// Smallest and largest value of a numeric column, if any row has one.
    pub fn numeric_range(&self, column: Column) -> Result<Option<(f64, f64)>> {
        self.require_numeric(column)?;
        let range = self
            .records
            .iter()
            .filter_map(|r| r.number(column))
            .fold(None, |acc: Option<(f64, f64)>, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            });
        Ok(range)
    }
}

/// Long-format metric row used for markdown previews and CSV export.
#[derive(Debug, Serialize, Tabled, Clone, PartialEq)]
pub struct MetricRow {
    #[serde(rename = "Group")]
    #[tabled(rename = "Group")]
    pub group: String,
    #[serde(rename = "Statistic")]
    #[tabled(rename = "Statistic")]
    pub statistic: String,
    #[serde(rename = "Value")]
    #[tabled(rename = "Value")]
    pub value: String,
}

/// Headline card: one winner per statistic.
#[derive(Debug, Serialize, Tabled, Clone, PartialEq)]
pub struct HeadlineRow {
    #[serde(rename = "Metric")]
    #[tabled(rename = "Metric")]
    pub metric: String,
    #[serde(rename = "Group")]
    #[tabled(rename = "Group")]
    pub group: String,
    #[serde(rename = "Value")]
    #[tabled(rename = "Value")]
    pub value: String,
}

/// Five-number summary row for box plots.
#[derive(Debug, Serialize, Tabled, Clone, PartialEq)]
pub struct BoxRow {
    #[serde(rename = "Group")]
    #[tabled(rename = "Group")]
    pub group: String,
    #[serde(rename = "Min")]
    #[tabled(rename = "Min")]
    pub min: String,
    #[serde(rename = "Q1")]
    #[tabled(rename = "Q1")]
    pub q1: String,
    #[serde(rename = "Median")]
    #[tabled(rename = "Median")]
    pub median: String,
    #[serde(rename = "Q3")]
    #[tabled(rename = "Q3")]
    pub q3: String,
    #[serde(rename = "Max")]
    #[tabled(rename = "Max")]
    pub max: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_headers_and_names() {
        assert_eq!(Column::from_name("KPIs_met >80%").unwrap(), Column::KpisMet);
        assert_eq!(Column::from_name("kpis_met_over_80pct").unwrap(), Column::KpisMet);
        assert_eq!(Column::from_name("awards_won?").unwrap(), Column::AwardsWon);
        assert!(matches!(
            Column::from_name("salary"),
            Err(InsightsError::InvalidParameter(_))
        ));
    }

    #[test]
    fn schema_rejects_mismatched_types() {
        assert!(Schema::new(&[(Column::Department, ColumnType::Int8)]).is_err());
        assert!(Schema::new(&[(Column::Age, ColumnType::Category)]).is_err());
        assert!(Schema::new(&[
            (Column::Age, ColumnType::Int8),
            (Column::Age, ColumnType::Int16)
        ])
        .is_err());
    }

    #[test]
    fn distinct_keeps_first_encountered_order() {
        let schema = Schema::new(&[(Column::Region, ColumnType::Category)]).unwrap();
        let rec = |r: &str| Record {
            region: Some(r.to_string()),
            ..Record::default()
        };
        let table = Table::new(schema, vec![rec("r2"), rec("r7"), rec("r2"), rec("r1")]);
        assert_eq!(table.distinct(Column::Region).unwrap(), vec!["r2", "r7", "r1"]);
        assert!(table.distinct(Column::Gender).is_err());
    }

    #[test]
    fn flags_read_as_numbers() {
        let mut r = Record::default();
        r.set(Column::IsPromoted, Value::Bool(true));
        r.set(Column::KpisMet, Value::Int(0));
        assert_eq!(r.number(Column::IsPromoted), Some(1.0));
        assert_eq!(r.number(Column::KpisMet), Some(0.0));
        assert_eq!(r.number(Column::AwardsWon), None);
    }
}
