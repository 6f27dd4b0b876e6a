//! End-to-end tests for the load -> aggregate -> summarize pipeline and the
//! three dashboard variants.

use employee_insights::dashboards::{self, DEFAULT_AGE_RANGE};
use employee_insights::loader::load_from_reader;
use employee_insights::reports::text;
use employee_insights::{
    aggregate, crosstab, output, summarize, Column, ColumnType, DashboardOptions, DashboardSpec,
    DatasetCache, InsightsError, Measure, NormalizeAxis, ReportTemplate, RowFilter, Schema,
};
use pretty_assertions::assert_eq;
use std::path::PathBuf;

// ============================================================================
// Helper Functions
// ============================================================================

fn fixture(name: &str) -> String {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
        .to_string_lossy()
        .into_owned()
}

fn count_data_rows(path: &str) -> usize {
    std::fs::read_to_string(path)
        .expect("fixture readable")
        .lines()
        .skip(1)
        .filter(|l| !l.trim().is_empty())
        .count()
}

fn insight_template() -> ReportTemplate {
    ReportTemplate::new("Insights")
        .section(
            "Distribution",
            vec![text("{top_count.group} has {top_count.count} ({top_count.share}%)")],
        )
        .section(
            "Performance",
            vec![
                text("Best rate: {rate.group} ({rate.value}%)"),
                text("Best score: {score.group} ({score.value})"),
            ],
        )
}

// ============================================================================
// Loader
// ============================================================================

#[test]
fn loaded_keys_are_never_missing() {
    let path = fixture("employees.csv");
    let cache = DatasetCache::new();
    for kind in [
        employee_insights::DashboardKind::Department,
        employee_insights::DashboardKind::Gender,
        employee_insights::DashboardKind::Region,
    ] {
        let spec = DashboardSpec::for_kind(kind).unwrap();
        let loaded = spec.load(&path, &cache);
        assert!(loaded.error.is_none(), "{:?}", loaded.error);
        assert!(loaded.table.len() <= count_data_rows(&path));
        assert_eq!(loaded.report.raw_rows, count_data_rows(&path));
        assert!(loaded
            .table
            .records()
            .iter()
            .all(|r| r.category(spec.group_by).is_some()));
    }
    assert_eq!(cache.len(), 3);
    cache.clear();
    assert!(cache.is_empty());
}

#[test]
fn failed_load_short_circuits_the_dashboard() {
    let spec = DashboardSpec::department().unwrap();
    let loaded = spec.load(&fixture("missing.csv"), &DatasetCache::new());
    assert!(loaded.table.is_empty());
    let err = loaded.error.expect("load error");
    assert_eq!(err.error_code(), "LOAD_ERROR");

    let err = dashboards::run(&spec, &loaded.table, &DashboardOptions::default()).unwrap_err();
    assert!(matches!(err, InsightsError::EmptyResult(_)));
}

// ============================================================================
// Aggregate + summarize
// ============================================================================

#[test]
fn three_row_example() {
    let csv = "department,is_promoted,avg_training_score\nA,1,80\nA,0,60\nB,1,90\n";
    let schema = Schema::new(&[
        (Column::Department, ColumnType::Category),
        (Column::IsPromoted, ColumnType::Bool),
        (Column::AvgTrainingScore, ColumnType::Int16),
    ])
    .unwrap();
    let (table, _) = load_from_reader(csv.as_bytes(), "inline", &schema, &[Column::Department]).unwrap();

    let measures = [
        Measure::rate("rate", Column::IsPromoted),
        Measure::mean("score", Column::AvgTrainingScore),
    ];
    let metrics = aggregate(&table, Column::Department, &measures, None).unwrap();
    let rate = metrics.statistic("rate").unwrap();
    let score = metrics.statistic("score").unwrap();
    assert_eq!(rate.values, vec![("A".to_string(), 50.0), ("B".to_string(), 100.0)]);
    assert_eq!(score.values, vec![("A".to_string(), 70.0), ("B".to_string(), 90.0)]);

    let report = summarize(&metrics, &insight_template()).unwrap();
    assert_eq!(report.headline("rate").unwrap().group, "B");
    assert_eq!(report.headline("score").unwrap().group, "B");
    assert_eq!(report.top_count.group, "A");
    assert_eq!(report.top_count.count, 2);
    assert!(report.narrative.contains("A has 2 (66.7%)"));
    assert!(report.narrative.contains("Best rate: B (100.0%)"));
    assert!(report.narrative.contains("Best score: B (90.0)"));
}

#[test]
fn group_keys_match_distinct_values() {
    let spec = DashboardSpec::region().unwrap();
    let loaded = spec.load(&fixture("employees.csv"), &DatasetCache::new());
    let table = &loaded.table;
    let distinct = table.distinct(Column::Region).unwrap();
    let metrics = aggregate(table, Column::Region, &spec.measures, None).unwrap();
    assert_eq!(metrics.groups, distinct);
    for s in &metrics.statistics {
        assert!(s.groups().all(|g| distinct.iter().any(|d| d == g)));
    }
}

#[test]
fn crosstab_axes_sum_to_hundred_on_fixture() {
    let spec = DashboardSpec::region().unwrap();
    let loaded = spec.load(&fixture("employees.csv"), &DatasetCache::new());

    let by_row = crosstab(&loaded.table, Column::Region, Column::Department, NormalizeAxis::Row).unwrap();
    for row in &by_row.percentages {
        assert!((row.iter().sum::<f64>() - 100.0).abs() <= 0.1);
    }

    let by_col =
        crosstab(&loaded.table, Column::Region, Column::Department, NormalizeAxis::Column).unwrap();
    for ci in 0..by_col.col_keys.len() {
        let sum: f64 = by_col.percentages.iter().map(|r| r[ci]).sum();
        assert!((sum - 100.0).abs() <= 0.1);
    }
}

#[test]
fn empty_filter_result_surfaces_empty_result() {
    let spec = DashboardSpec::gender().unwrap();
    let loaded = spec.load(&fixture("employees.csv"), &DatasetCache::new());
    let filter = RowFilter::new().between(Column::Age, 70.0, 80.0);

    let derived = filter.apply(&loaded.table).unwrap();
    assert!(derived.is_empty());
    let metrics = aggregate(&loaded.table, Column::Gender, &spec.measures, Some(&filter)).unwrap();
    assert!(metrics.is_empty());
    let err = summarize(&metrics, &spec.template).unwrap_err();
    assert_eq!(err.error_code(), "EMPTY_RESULT");
}

// ============================================================================
// Dashboards on the fixture
// ============================================================================

#[test]
fn department_dashboard() {
    let spec = DashboardSpec::department().unwrap();
    let loaded = spec.load(&fixture("employees.csv"), &DatasetCache::new());
    assert_eq!(loaded.report.dropped_missing_key, 1);

    let view = dashboards::run(&spec, &loaded.table, &DashboardOptions::default()).unwrap();
    assert_eq!(view.rows, 19);
    assert_eq!(view.report.top_count.group, "Sales & Marketing");
    assert_eq!(view.report.top_count.count, 7);
    // HR and Procurement both promote everyone; HR comes first in the file
    assert_eq!(view.report.headline("promotion_rate").unwrap().group, "HR");
    // Analytics and R&D tie on 84.0; Analytics comes first
    assert_eq!(view.report.headline("avg_score").unwrap().group, "Analytics");
    assert_eq!(
        view.metrics.statistic("promotion_rate").unwrap().get("Sales & Marketing"),
        Some(14.3)
    );
    assert!(view
        .report
        .narrative
        .contains("Largest department: Sales & Marketing (7 employees)"));
    assert!(view.report.narrative.contains("Represents 36.8% of the total"));
    assert_eq!(view.crosstabs.len(), 1);
}

#[test]
fn gender_dashboard_default_age_window() {
    let spec = DashboardSpec::gender().unwrap();
    let loaded = spec.load(&fixture("employees.csv"), &DatasetCache::new());
    let options = DashboardOptions {
        filter: RowFilter::new().between(Column::Age, DEFAULT_AGE_RANGE.0, DEFAULT_AGE_RANGE.1),
        top_n: None,
    };
    let view = dashboards::run(&spec, &loaded.table, &options).unwrap();
    assert_eq!(view.rows, 20);
    assert_eq!(view.metrics.groups, vec!["f", "m"]);
    assert!(view.report.narrative.contains("- m: 14 employees (70.0%)"));
    assert!(view.report.narrative.contains("- f: 6 employees (30.0%)"));
    assert_eq!(view.distributions.len(), 2);
}

#[test]
fn region_dashboard_top_n_and_export() {
    let spec = DashboardSpec::region().unwrap();
    let loaded = spec.load(&fixture("employees.csv"), &DatasetCache::new());
    let options = DashboardOptions {
        filter: RowFilter::new(),
        top_n: Some(3),
    };
    let view = dashboards::run(&spec, &loaded.table, &options).unwrap();
    assert_eq!(view.rows, 19);
    assert_eq!(view.report.top_count.group, "region_7");
    assert_eq!(view.count_series().len(), 3);
    assert_eq!(view.count_series()[0], ("region_7".to_string(), 4.0));
    assert!(view.report.narrative.contains("Region region_7 holds about 21.1% of all employees"));
    assert!(view.correlation.is_some());

    let rendered = output::render_view(&view);
    assert!(rendered.contains("Employee Analysis by Region"));
    assert!(rendered.contains(&view.report.narrative));

    let dir = std::env::temp_dir().join(format!("employee_insights_export_{}", std::process::id()));
    let written = output::export_view(&view, &dir).unwrap();
    assert_eq!(written.len(), 3);
    assert!(written.iter().all(|p| p.exists()));
    let json = std::fs::read_to_string(dir.join("report.json")).unwrap();
    assert!(json.contains("generated_at"));
    assert!(json.contains("region_7"));
    let _ = std::fs::remove_dir_all(&dir);
}
