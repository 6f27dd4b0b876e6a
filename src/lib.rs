//! Group-level analytics over an employee records dataset.
//!
//! The pipeline is `load -> aggregate -> summarize`:
//!
//! - [`loader`] reads a declared column subset of a CSV file into a typed
//!   [`Table`], dropping rows without a grouping key, and memoizes tables in
//!   a process-scoped [`DatasetCache`].
//! - [`aggregate`] computes named per-group statistics ([`MetricSet`]),
//!   normalized cross-tabulations, correlations and box-plot summaries.
//! - [`reports`] picks the winners per statistic and fills a narrative
//!   template.
//! - [`dashboards`] wires the three dashboard variants (department, gender,
//!   region) as data on top of that pipeline; [`output`] renders them.
//!
//! ```rust,no_run
//! use employee_insights::{dashboards, DashboardOptions, DashboardSpec, DatasetCache};
//!
//! let spec = DashboardSpec::department()?;
//! let loaded = spec.load(dashboards::DEFAULT_DATA_PATH, DatasetCache::global());
//! if let Some(err) = &loaded.error {
//!     eprintln!("{}", err);
//! }
//! let view = dashboards::run(&spec, &loaded.table, &DashboardOptions::default())?;
//! println!("{}", view.report.narrative);
//! # Ok::<(), employee_insights::InsightsError>(())
//! ```

pub mod aggregate;
pub mod dashboards;
pub mod error;
pub mod filter;
pub mod loader;
pub mod output;
pub mod reports;
pub mod types;
pub mod util;

pub use aggregate::{
    aggregate, correlation, crosstab, distribution, BoxSummary, CorrelationMatrix, CrossTab, Measure,
    MetricSet, NormalizeAxis, Reduction, Statistic,
};
pub use dashboards::{DashboardKind, DashboardOptions, DashboardSpec, DashboardView};
pub use error::{InsightsError, Result};
pub use filter::{Predicate, RowFilter};
pub use loader::{load, DatasetCache, LoadReport, Loaded};
pub use reports::{summarize, Line, Report, ReportTemplate};
pub use types::{Column, ColumnType, Record, Schema, Table};
