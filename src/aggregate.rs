//! Group-by aggregation shared by every dashboard.
//!
//! One parameterized entry point ([`aggregate`]) computes the named per-group
//! statistics; [`crosstab`], [`correlation`] and [`distribution`] cover the
//! categorical breakdowns, the metric heat-map and box plots.
//!
//! Group order is always the order in which GroupKeys first appear in the
//! (filtered) table. Anything that breaks ties relies on that order.

use crate::error::{InsightsError, Result};
use crate::filter::RowFilter;
use crate::types::{Column, ColumnType, MetricRow, Table};
use crate::util::{average, format_number, quantile_sorted, round_to, sort_floats};
use serde::Serialize;
use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Reduction {
    /// Arithmetic mean of the non-missing values.
    Mean,
    /// Mean of a 0/1 column times 100.
    Rate,
    /// Number of non-missing values.
    Count,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Measure {
    pub name: String,
    pub column: Column,
    pub reduction: Reduction,
    /// Round results to this many decimals.
    pub decimals: Option<u32>,
}

impl Measure {
    pub fn new(name: impl Into<String>, column: Column, reduction: Reduction) -> Measure {
        Measure {
            name: name.into(),
            column,
            reduction,
            decimals: None,
        }
    }

    pub fn mean(name: impl Into<String>, column: Column) -> Measure {
        Measure::new(name, column, Reduction::Mean)
    }

    pub fn rate(name: impl Into<String>, column: Column) -> Measure {
        Measure::new(name, column, Reduction::Rate)
    }

    pub fn count(name: impl Into<String>, column: Column) -> Measure {
        Measure::new(name, column, Reduction::Count)
    }

    pub fn rounded(mut self, decimals: u32) -> Measure {
        self.decimals = Some(decimals);
        self
    }

    fn validate(&self, table: &Table) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(InsightsError::InvalidParameter(
                "measure name must not be empty".to_string(),
            ));
        }
        let ty = table.column_type(self.column)?;
        match self.reduction {
            Reduction::Count => Ok(()),
            Reduction::Mean if ty.is_numeric() => Ok(()),
            Reduction::Rate if ty == ColumnType::Bool || self.column.is_flag() => Ok(()),
            _ => Err(InsightsError::InvalidParameter(format!(
                "{:?} cannot be applied to column '{}' ({:?})",
                self.reduction, self.column, ty
            ))),
        }
    }
}

/// One named statistic: a value per GroupKey, in group order. Groups with no
/// usable rows for the measure are absent rather than zero.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statistic {
    pub name: String,
    pub column: Column,
    pub reduction: Reduction,
    pub values: Vec<(String, f64)>,
}

impl Statistic {
    pub fn get(&self, group: &str) -> Option<f64> {
        self.values
            .iter()
            .find(|(g, _)| g == group)
            .map(|(_, v)| *v)
    }

    pub fn groups(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(|(g, _)| g.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Largest value; ties go to the group encountered first in the table.
    pub fn argmax(&self) -> Option<(&str, f64)> {
        let mut best: Option<(&str, f64)> = None;
        for (g, v) in &self.values {
            match best {
                Some((_, b)) if *v <= b => {}
                _ => best = Some((g.as_str(), *v)),
            }
        }
        best
    }

    /// Smallest value, same tie-break as [`Statistic::argmax`].
    pub fn argmin(&self) -> Option<(&str, f64)> {
        let mut best: Option<(&str, f64)> = None;
        for (g, v) in &self.values {
            match best {
                Some((_, b)) if *v >= b => {}
                _ => best = Some((g.as_str(), *v)),
            }
        }
        best
    }

    /// The `n` largest entries, stable-sorted descending.
    pub fn top_n(&self, n: usize) -> Vec<(String, f64)> {
        top_n(&self.values, n)
    }
}

/// Stable descending sort by value, truncated to `n` entries.
pub fn top_n(values: &[(String, f64)], n: usize) -> Vec<(String, f64)> {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
    sorted.truncate(n);
    sorted
}

/// Result of [`aggregate`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSet {
    pub group_by: Column,
    /// Distinct GroupKeys in first-encountered order.
    pub groups: Vec<String>,
    /// Rows per group, parallel to `groups`.
    pub group_sizes: Vec<usize>,
    /// Rows in the aggregated (filtered) table.
    pub total_rows: usize,
    pub statistics: Vec<Statistic>,
}

impl MetricSet {
    pub fn statistic(&self, name: &str) -> Option<&Statistic> {
        self.statistics.iter().find(|s| s.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn group_size(&self, group: &str) -> Option<usize> {
        self.groups
            .iter()
            .position(|g| g == group)
            .map(|i| self.group_sizes[i])
    }

    /// Groups by descending row count; equal counts keep table order.
    pub fn value_counts(&self) -> Vec<(String, usize)> {
        let mut counts: Vec<(String, usize)> = self
            .groups
            .iter()
            .cloned()
            .zip(self.group_sizes.iter().copied())
            .collect();
        counts.sort_by(|a, b| b.1.cmp(&a.1));
        counts
    }

    /// Flattened rows for previews and CSV export.
    pub fn rows(&self) -> Vec<MetricRow> {
        let mut rows = Vec::new();
        for (g, n) in self.groups.iter().zip(&self.group_sizes) {
            rows.push(MetricRow {
                group: g.clone(),
                statistic: "rows".to_string(),
                value: n.to_string(),
            });
        }
        for s in &self.statistics {
            for (g, v) in &s.values {
                rows.push(MetricRow {
                    group: g.clone(),
                    statistic: s.name.clone(),
                    value: format_number(*v, 2),
                });
            }
        }
        rows
    }
}

/// Group `table` by `group_by` and reduce every measure per group.
///
/// `filter` is applied first and yields a derived table; the source is not
/// modified. An empty (or fully filtered) table produces an empty
/// `MetricSet`, which the reporter turns into an `EmptyResult` error.
pub fn aggregate(
    table: &Table,
    group_by: Column,
    measures: &[Measure],
    filter: Option<&RowFilter>,
) -> Result<MetricSet> {
    #[derive(Default, Clone, Copy)]
    struct Acc {
        sum: f64,
        n: usize,
    }

    table.require_categorical(group_by)?;
    for (i, m) in measures.iter().enumerate() {
        m.validate(table)?;
        if measures[..i].iter().any(|o| o.name == m.name) {
            return Err(InsightsError::InvalidParameter(format!(
                "duplicate measure name '{}'",
                m.name
            )));
        }
    }

    let table: Cow<'_, Table> = match filter {
        Some(f) if !f.is_empty() => Cow::Owned(f.apply(table)?),
        _ => Cow::Borrowed(table),
    };

    let groups = table.distinct(group_by)?;
    let index: HashMap<&str, usize> = groups
        .iter()
        .enumerate()
        .map(|(i, g)| (g.as_str(), i))
        .collect();

    let mut sizes = vec![0usize; groups.len()];
    let mut accs = vec![vec![Acc::default(); groups.len()]; measures.len()];
    for r in table.records() {
        let Some(gi) = r.category(group_by).and_then(|g| index.get(g).copied()) else {
            continue;
        };
        sizes[gi] += 1;
        for (mi, m) in measures.iter().enumerate() {
            let acc = &mut accs[mi][gi];
            match m.reduction {
                Reduction::Count => {
                    if r.has_value(m.column) {
                        acc.n += 1;
                    }
                }
                Reduction::Mean | Reduction::Rate => {
                    if let Some(v) = r.number(m.column) {
                        acc.sum += v;
                        acc.n += 1;
                    }
                }
            }
        }
    }

    let statistics = measures
        .iter()
        .zip(accs)
        .map(|(m, per_group)| {
            let values = groups
                .iter()
                .zip(per_group)
                .filter(|(_, acc)| acc.n > 0)
                .map(|(g, acc)| {
                    let raw = match m.reduction {
                        Reduction::Count => acc.n as f64,
                        Reduction::Mean => acc.sum / acc.n as f64,
                        Reduction::Rate => acc.sum / acc.n as f64 * 100.0,
                    };
                    let v = m.decimals.map(|d| round_to(raw, d)).unwrap_or(raw);
                    (g.clone(), v)
                })
                .collect();
            Statistic {
                name: m.name.clone(),
                column: m.column,
                reduction: m.reduction,
                values,
            }
        })
        .collect();

    debug!(
        "Aggregated {} rows by {} into {} groups",
        table.len(),
        group_by,
        groups.len()
    );
    Ok(MetricSet {
        group_by,
        groups,
        group_sizes: sizes,
        total_rows: table.len(),
        statistics,
    })
}

/// Axis along which cross-tab percentages sum to 100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizeAxis {
    /// Each row sums to 100: distribution within a row category.
    Row,
    /// Each column sums to 100: share of a column category across rows.
    Column,
}

impl FromStr for NormalizeAxis {
    type Err = InsightsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "row" | "rows" | "index" => Ok(NormalizeAxis::Row),
            "column" | "columns" | "col" => Ok(NormalizeAxis::Column),
            other => Err(InsightsError::InvalidParameter(format!(
                "unknown normalization axis '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for NormalizeAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NormalizeAxis::Row => f.write_str("row"),
            NormalizeAxis::Column => f.write_str("column"),
        }
    }
}

/// Percentages relating two categorical dimensions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrossTab {
    pub row_dim: Column,
    pub col_dim: Column,
    pub axis: NormalizeAxis,
    pub row_keys: Vec<String>,
    pub col_keys: Vec<String>,
    /// Raw co-occurrence counts, `[row][col]`.
    pub counts: Vec<Vec<usize>>,
    /// Normalized percentages, `[row][col]`.
    pub percentages: Vec<Vec<f64>>,
}

impl CrossTab {
    pub fn get(&self, row: &str, col: &str) -> Option<f64> {
        let ri = self.row_keys.iter().position(|k| k == row)?;
        let ci = self.col_keys.iter().position(|k| k == col)?;
        Some(self.percentages[ri][ci])
    }

    pub fn is_empty(&self) -> bool {
        self.row_keys.is_empty()
    }

    /// Long-format rows for export.
    pub fn rows(&self) -> Vec<MetricRow> {
        let mut out = Vec::new();
        for (ri, r) in self.row_keys.iter().enumerate() {
            for (ci, c) in self.col_keys.iter().enumerate() {
                out.push(MetricRow {
                    group: r.clone(),
                    statistic: c.clone(),
                    value: format_number(self.percentages[ri][ci], 2),
                });
            }
        }
        out
    }
}

/// Cross-tabulate two categorical columns. Rows missing either value are
/// skipped. Keys appear in first-encountered order.
pub fn crosstab(table: &Table, row_dim: Column, col_dim: Column, axis: NormalizeAxis) -> Result<CrossTab> {
    table.require_categorical(row_dim)?;
    table.require_categorical(col_dim)?;
    if row_dim == col_dim {
        return Err(InsightsError::InvalidParameter(format!(
            "cannot cross-tabulate '{}' with itself",
            row_dim
        )));
    }

    let mut row_keys: Vec<String> = Vec::new();
    let mut col_keys: Vec<String> = Vec::new();
    let mut cells: HashMap<(usize, usize), usize> = HashMap::new();
    for r in table.records() {
        let (Some(rv), Some(cv)) = (r.category(row_dim), r.category(col_dim)) else {
            continue;
        };
        let ri = key_index(&mut row_keys, rv);
        let ci = key_index(&mut col_keys, cv);
        *cells.entry((ri, ci)).or_default() += 1;
    }

    let counts: Vec<Vec<usize>> = (0..row_keys.len())
        .map(|ri| {
            (0..col_keys.len())
                .map(|ci| cells.get(&(ri, ci)).copied().unwrap_or(0))
                .collect()
        })
        .collect();

    let row_totals: Vec<usize> = counts.iter().map(|row| row.iter().sum()).collect();
    let col_totals: Vec<usize> = (0..col_keys.len())
        .map(|ci| counts.iter().map(|row| row[ci]).sum())
        .collect();

    let percentages = counts
        .iter()
        .enumerate()
        .map(|(ri, row)| {
            row.iter()
                .enumerate()
                .map(|(ci, n)| {
                    let total = match axis {
                        NormalizeAxis::Row => row_totals[ri],
                        NormalizeAxis::Column => col_totals[ci],
                    };
                    // every key was seen at least once, so totals are non-zero
                    if total == 0 {
                        0.0
                    } else {
                        *n as f64 / total as f64 * 100.0
                    }
                })
                .collect()
        })
        .collect();

    Ok(CrossTab {
        row_dim,
        col_dim,
        axis,
        row_keys,
        col_keys,
        counts,
        percentages,
    })
}

fn key_index(keys: &mut Vec<String>, key: &str) -> usize {
    match keys.iter().position(|k| k == key) {
        Some(i) => i,
        None => {
            keys.push(key.to_string());
            keys.len() - 1
        }
    }
}

/// Pearson correlations between per-group statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationMatrix {
    pub labels: Vec<String>,
    /// `None` where fewer than two shared groups exist or a side is constant.
    pub values: Vec<Vec<Option<f64>>>,
}

/// Correlate the named statistics across groups (all of them when `names`
/// is empty). Each pair uses the groups present in both statistics.
pub fn correlation(metrics: &MetricSet, names: &[&str]) -> Result<CorrelationMatrix> {
    let selected: Vec<&Statistic> = if names.is_empty() {
        metrics.statistics.iter().collect()
    } else {
        names
            .iter()
            .map(|n| {
                metrics.statistic(n).ok_or_else(|| {
                    InsightsError::InvalidParameter(format!("unknown statistic '{}'", n))
                })
            })
            .collect::<Result<_>>()?
    };

    let values = selected
        .iter()
        .map(|a| selected.iter().map(|b| pearson(a, b)).collect())
        .collect();
    Ok(CorrelationMatrix {
        labels: selected.iter().map(|s| s.name.clone()).collect(),
        values,
    })
}

fn pearson(a: &Statistic, b: &Statistic) -> Option<f64> {
    let pairs: Vec<(f64, f64)> = a
        .values
        .iter()
        .filter_map(|(g, x)| b.get(g).map(|y| (*x, y)))
        .collect();
    if pairs.len() < 2 {
        return None;
    }
    let n = pairs.len() as f64;
    let mx = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let my = pairs.iter().map(|p| p.1).sum::<f64>() / n;
    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (x, y) in &pairs {
        sxy += (x - mx) * (y - my);
        sxx += (x - mx) * (x - mx);
        syy += (y - my) * (y - my);
    }
    if sxx <= f64::EPSILON || syy <= f64::EPSILON {
        return None;
    }
    Some((sxy / (sxx.sqrt() * syy.sqrt())).clamp(-1.0, 1.0))
}

/// Five-number summary of one numeric column within one group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoxSummary {
    pub group: String,
    pub count: usize,
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
    pub mean: f64,
}

/// Per-group distribution of `column`, for box plots. Groups without any
/// value in `column` are absent.
pub fn distribution(table: &Table, group_by: Column, column: Column) -> Result<Vec<BoxSummary>> {
    table.require_categorical(group_by)?;
    table.require_numeric(column)?;

    let groups = table.distinct(group_by)?;
    let mut values: Vec<Vec<f64>> = vec![Vec::new(); groups.len()];
    for r in table.records() {
        let (Some(g), Some(v)) = (r.category(group_by), r.number(column)) else {
            continue;
        };
        if let Some(i) = groups.iter().position(|k| k == g) {
            values[i].push(v);
        }
    }

    let mut out = Vec::new();
    for (group, mut vals) in groups.into_iter().zip(values) {
        sort_floats(&mut vals);
        let (Some(min), Some(q1), Some(median), Some(q3), Some(max), Some(mean)) = (
            vals.first().copied(),
            quantile_sorted(&vals, 0.25),
            quantile_sorted(&vals, 0.5),
            quantile_sorted(&vals, 0.75),
            vals.last().copied(),
            average(&vals),
        ) else {
            continue;
        };
        out.push(BoxSummary {
            group,
            count: vals.len(),
            min,
            q1,
            median,
            q3,
            max,
            mean,
        });
    }
    Ok(out)
}
