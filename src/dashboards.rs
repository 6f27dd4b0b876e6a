//! The three dashboard variants, expressed as configuration of the shared
//! load -> aggregate -> summarize pipeline.

use crate::aggregate::{
    aggregate, correlation, crosstab, distribution, top_n, BoxSummary, CorrelationMatrix, CrossTab,
    Measure, MetricSet, NormalizeAxis,
};
use crate::error::{InsightsError, Result};
use crate::filter::RowFilter;
use crate::loader::{DatasetCache, Loaded};
use crate::reports::{per_group, summarize, text, Report, ReportTemplate};
use crate::types::{Column, ColumnType, Schema, Table};
use serde::Serialize;
use std::fmt;
use tracing::info;

/// Where the surrounding application keeps the dataset.
pub const DEFAULT_DATA_PATH: &str = "data/processed/train_atualizado.csv";

/// Default inclusive age window of the gender dashboard.
pub const DEFAULT_AGE_RANGE: (f64, f64) = (25.0, 55.0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DashboardKind {
    Department,
    Gender,
    Region,
}

impl fmt::Display for DashboardKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DashboardKind::Department => f.write_str("department"),
            DashboardKind::Gender => f.write_str("gender"),
            DashboardKind::Region => f.write_str("region"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrossTabSpec {
    pub title: String,
    pub row_dim: Column,
    pub col_dim: Column,
    pub axis: NormalizeAxis,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardSpec {
    pub kind: DashboardKind,
    pub title: String,
    pub group_by: Column,
    pub schema: Schema,
    pub measures: Vec<Measure>,
    pub crosstabs: Vec<CrossTabSpec>,
    /// Statistics correlated for the heat-map; empty means no heat-map.
    pub correlate: Vec<String>,
    /// Numeric column summarized per group for box plots.
    pub box_plot: Option<Column>,
    /// Default and allowed range of the top-N chart truncation.
    pub top_n: Option<TopN>,
    pub template: ReportTemplate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TopN {
    pub default: usize,
    pub min: usize,
    pub max: usize,
}

impl TopN {
    pub fn check(&self, n: usize) -> Result<usize> {
        if (self.min..=self.max).contains(&n) {
            Ok(n)
        } else {
            Err(InsightsError::InvalidParameter(format!(
                "top-N must be between {} and {}, got {}",
                self.min, self.max, n
            )))
        }
    }
}

impl DashboardSpec {
    pub fn for_kind(kind: DashboardKind) -> Result<DashboardSpec> {
        match kind {
            DashboardKind::Department => DashboardSpec::department(),
            DashboardKind::Gender => DashboardSpec::gender(),
            DashboardKind::Region => DashboardSpec::region(),
        }
    }

    pub fn department() -> Result<DashboardSpec> {
        let schema = Schema::new(&[
            (Column::Department, ColumnType::Category),
            (Column::IsPromoted, ColumnType::Bool),
            (Column::AvgTrainingScore, ColumnType::Int16),
            (Column::KpisMet, ColumnType::Bool),
            (Column::LengthOfService, ColumnType::Int8),
            (Column::Education, ColumnType::Category),
        ])?;
        let template = ReportTemplate::new("Key Insights")
            .section(
                "Department Distribution",
                vec![
                    text("Largest department: {top_count.group} ({top_count.count} employees)"),
                    text("Represents {top_count.share}% of the total"),
                ],
            )
            .section(
                "Performance",
                vec![
                    text("Best promotion rate: {promotion_rate.group} ({promotion_rate.value}%)"),
                    text("Best training score: {avg_score.group} ({avg_score.value} points)"),
                ],
            )
            .section(
                "Recommendations",
                vec![
                    text("Build a management development programme for {top_count.group}"),
                    text("Run technical training for departments with low scores"),
                    text("Create a retention programme for departments with the longest service"),
                ],
            );
        Ok(DashboardSpec {
            kind: DashboardKind::Department,
            title: "Department Performance Analysis".to_string(),
            group_by: Column::Department,
            schema,
            measures: vec![
                Measure::rate("promotion_rate", Column::IsPromoted).rounded(1),
                Measure::mean("avg_score", Column::AvgTrainingScore).rounded(1),
                Measure::rate("kpi_rate", Column::KpisMet).rounded(1),
                Measure::mean("avg_tenure", Column::LengthOfService).rounded(1),
            ],
            crosstabs: vec![CrossTabSpec {
                title: "Education level by department (%)".to_string(),
                row_dim: Column::Department,
                col_dim: Column::Education,
                axis: NormalizeAxis::Row,
            }],
            correlate: Vec::new(),
            box_plot: None,
            top_n: None,
            template,
        })
    }

    pub fn gender() -> Result<DashboardSpec> {
        let schema = Schema::new(&[
            (Column::Gender, ColumnType::Category),
            (Column::IsPromoted, ColumnType::Bool),
            (Column::Department, ColumnType::Category),
            (Column::Age, ColumnType::Int8),
            (Column::AvgTrainingScore, ColumnType::Int16),
            (Column::KpisMet, ColumnType::Bool),
        ])?;
        let template = ReportTemplate::new("Key Insights")
            .section(
                "Gender Distribution",
                vec![per_group("{group}: {count} employees ({share}%)")],
            )
            .section(
                "Performance by Gender",
                vec![
                    text("KPIs met: {kpi_rate.group|title} leads with {kpi_rate.value}%"),
                    text("Training score: {avg_score.group|title} with an average of {avg_score.value} points"),
                ],
            )
            .section(
                "Strategic Recommendations",
                vec![
                    text("Set up cross-mentoring programmes"),
                    text("Review promotion processes"),
                    text("Develop targeted training for each group"),
                ],
            );
        Ok(DashboardSpec {
            kind: DashboardKind::Gender,
            title: "Gender Diversity Analysis".to_string(),
            group_by: Column::Gender,
            schema,
            measures: vec![
                Measure::rate("promotion_rate", Column::IsPromoted).rounded(1),
                Measure::mean("avg_age", Column::Age).rounded(1),
                Measure::mean("avg_score", Column::AvgTrainingScore).rounded(1),
                Measure::rate("kpi_rate", Column::KpisMet).rounded(1),
            ],
            crosstabs: vec![CrossTabSpec {
                title: "Department share per gender (%)".to_string(),
                row_dim: Column::Department,
                col_dim: Column::Gender,
                axis: NormalizeAxis::Column,
            }],
            correlate: Vec::new(),
            box_plot: Some(Column::Age),
            top_n: None,
            template,
        })
    }

    pub fn region() -> Result<DashboardSpec> {
        let schema = Schema::new(&[
            (Column::Region, ColumnType::Category),
            (Column::Department, ColumnType::Category),
            (Column::IsPromoted, ColumnType::Bool),
            (Column::AvgTrainingScore, ColumnType::Int16),
            (Column::KpisMet, ColumnType::Bool),
            (Column::Age, ColumnType::Int8),
            (Column::LengthOfService, ColumnType::Int8),
            (Column::AwardsWon, ColumnType::Bool),
        ])?;
        let template = ReportTemplate::new("Regional Analysis Summary")
            .section(
                "General Statistics",
                vec![
                    text("Regions analysed: {groups}"),
                    text("Mean employees per region: {mean_per_group}"),
                    text("Median employees per region: {median_per_group}"),
                ],
            )
            .section(
                "Highlights",
                vec![
                    text("Region {top_count.group} holds about {top_count.share}% of all employees"),
                    text("Best promotion rate: {promotion_rate.group} ({promotion_rate.value}%)"),
                    text("Best training score: {avg_score.group} ({avg_score.value} points)"),
                ],
            )
            .section(
                "Further Insights",
                vec![text(
                    "Segment the analysis by department and role before planning actions",
                )],
            );
        let measures = vec![
            Measure::rate("promotion_rate", Column::IsPromoted),
            Measure::mean("avg_score", Column::AvgTrainingScore),
            Measure::rate("kpi_rate", Column::KpisMet),
            Measure::mean("avg_age", Column::Age),
            Measure::mean("avg_tenure", Column::LengthOfService),
            Measure::rate("award_rate", Column::AwardsWon),
        ];
        Ok(DashboardSpec {
            kind: DashboardKind::Region,
            title: "Employee Analysis by Region".to_string(),
            group_by: Column::Region,
            schema,
            correlate: measures.iter().map(|m| m.name.clone()).collect(),
            measures,
            crosstabs: vec![CrossTabSpec {
                title: "Department mix per region (%)".to_string(),
                row_dim: Column::Region,
                col_dim: Column::Department,
                axis: NormalizeAxis::Row,
            }],
            box_plot: None,
            top_n: Some(TopN {
                default: 10,
                min: 3,
                max: 20,
            }),
            template,
        })
    }

    /// Load the dataset for this dashboard through `cache`, dropping rows
    /// without a grouping key.
    pub fn load(&self, source: &str, cache: &DatasetCache) -> Loaded {
        cache.get_or_load(source, &self.schema, &[self.group_by])
    }

    fn resolve_top_n(&self, requested: Option<usize>) -> Result<Option<usize>> {
        match (self.top_n, requested) {
            (None, None) => Ok(None),
            (None, Some(n)) => Ok(Some(n)),
            (Some(t), None) => Ok(Some(t.default)),
            (Some(t), Some(n)) => t.check(n).map(Some),
        }
    }
}

/// User-selected inputs of one interaction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DashboardOptions {
    pub filter: RowFilter,
    pub top_n: Option<usize>,
}

/// Everything one dashboard render needs, computed in one pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardView {
    pub kind: DashboardKind,
    pub title: String,
    pub rows: usize,
    pub metrics: MetricSet,
    pub report: Report,
    pub crosstabs: Vec<(String, CrossTab)>,
    pub correlation: Option<CorrelationMatrix>,
    pub distributions: Vec<BoxSummary>,
    pub top_n: Option<usize>,
}

impl DashboardView {
    /// Chart series for a statistic, truncated to the top-N when one is set.
    pub fn chart_series(&self, statistic: &str) -> Vec<(String, f64)> {
        let Some(s) = self.metrics.statistic(statistic) else {
            return Vec::new();
        };
        match self.top_n {
            Some(n) => s.top_n(n),
            None => s.values.clone(),
        }
    }

    /// Row counts per group, largest first, truncated to the top-N.
    pub fn count_series(&self) -> Vec<(String, f64)> {
        let counts: Vec<(String, f64)> = self
            .metrics
            .value_counts()
            .into_iter()
            .map(|(g, n)| (g, n as f64))
            .collect();
        top_n(&counts, self.top_n.unwrap_or(counts.len()))
    }
}

/// Run one interaction: filter, aggregate, summarize, then the secondary
/// breakdowns. Stops with `EmptyResult` before any breakdown is computed when
/// nothing is left to show.
pub fn run(spec: &DashboardSpec, table: &Table, options: &DashboardOptions) -> Result<DashboardView> {
    let top_n = spec.resolve_top_n(options.top_n)?;
    if table.is_empty() {
        return Err(InsightsError::EmptyResult("the dataset has no rows".to_string()));
    }

    let filtered = options.filter.apply(table)?;
    let metrics = aggregate(&filtered, spec.group_by, &spec.measures, None)?;
    let report = summarize(&metrics, &spec.template)?;

    let crosstabs = spec
        .crosstabs
        .iter()
        .map(|c| -> Result<(String, CrossTab)> {
            Ok((c.title.clone(), crosstab(&filtered, c.row_dim, c.col_dim, c.axis)?))
        })
        .collect::<Result<Vec<_>>>()?;
    let correlation = if spec.correlate.is_empty() {
        None
    } else {
        let names: Vec<&str> = spec.correlate.iter().map(String::as_str).collect();
        Some(correlation(&metrics, &names)?)
    };
    let distributions = match spec.box_plot {
        Some(column) => distribution(&filtered, spec.group_by, column)?,
        None => Vec::new(),
    };

    info!(
        "{} dashboard: {} of {} rows, {} groups",
        spec.kind,
        filtered.len(),
        table.len(),
        metrics.groups.len()
    );
    Ok(DashboardView {
        kind: spec.kind,
        title: spec.title.clone(),
        rows: filtered.len(),
        metrics,
        report,
        crosstabs,
        correlation,
        distributions,
        top_n,
    })
}
