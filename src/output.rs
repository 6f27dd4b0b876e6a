// Terminal rendering and file export of a computed dashboard.
//
// Charts are drawn as text bars; the numbers behind them are the same ones
// the CSV/JSON exports carry, so any charting tool can redraw them.
use crate::aggregate::{BoxSummary, CorrelationMatrix, CrossTab};
use crate::dashboards::DashboardView;
use crate::error::Result;
use crate::types::BoxRow;
use crate::util::{format_int, format_number};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tabled::{builder::Builder, settings::Style, Table, Tabled};
use tracing::info;

const BAR_WIDTH: usize = 40;

pub fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    for r in rows {
        wtr.serialize(r)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let s = serde_json::to_string_pretty(value)?;
    std::fs::write(path, s)?;
    Ok(())
}

pub fn table_rows<T>(rows: &[T], max_rows: usize) -> String
where
    T: Tabled + Clone,
{
    let slice: Vec<T> = rows.iter().cloned().take(max_rows).collect();
    if slice.is_empty() {
        return "(no rows)\n".to_string();
    }
    format!("{}\n", Table::new(slice).with(Style::markdown()))
}

/// Horizontal text bar chart scaled to the largest absolute value.
pub fn bar_chart(title: &str, series: &[(String, f64)]) -> String {
    let mut out = format!("{}\n", title);
    if series.is_empty() {
        out.push_str("(no data)\n");
        return out;
    }
    let label_width = series.iter().map(|(g, _)| g.chars().count()).max().unwrap_or(0);
    let max = series.iter().map(|(_, v)| v.abs()).fold(0.0_f64, f64::max);
    for (group, value) in series {
        let len = if max > 0.0 {
            ((value.abs() / max) * BAR_WIDTH as f64).round() as usize
        } else {
            0
        };
        let _ = writeln!(
            out,
            "{:<width$} | {} {}",
            group,
            "█".repeat(len),
            format_number(*value, 1),
            width = label_width
        );
    }
    out
}

pub fn crosstab_table(ct: &CrossTab) -> String {
    if ct.is_empty() {
        return "(no rows)\n".to_string();
    }
    let mut builder = Builder::default();
    let mut header = vec![ct.row_dim.to_string()];
    header.extend(ct.col_keys.iter().cloned());
    builder.push_record(header);
    for (ri, key) in ct.row_keys.iter().enumerate() {
        let mut row = vec![key.clone()];
        row.extend(ct.percentages[ri].iter().map(|p| format_number(*p, 1)));
        builder.push_record(row);
    }
    let mut table = builder.build();
    table.with(Style::markdown());
    format!("{}\n", table)
}

pub fn correlation_table(cm: &CorrelationMatrix) -> String {
    let mut builder = Builder::default();
    let mut header = vec![String::new()];
    header.extend(cm.labels.iter().cloned());
    builder.push_record(header);
    for (label, row) in cm.labels.iter().zip(&cm.values) {
        let mut cells = vec![label.clone()];
        cells.extend(
            row.iter()
                .map(|v| v.map(|c| format_number(c, 2)).unwrap_or_else(|| "-".to_string())),
        );
        builder.push_record(cells);
    }
    let mut table = builder.build();
    table.with(Style::markdown());
    format!("{}\n", table)
}

pub fn box_rows(summaries: &[BoxSummary]) -> Vec<BoxRow> {
    summaries
        .iter()
        .map(|b| BoxRow {
            group: b.group.clone(),
            min: format_number(b.min, 1),
            q1: format_number(b.q1, 1),
            median: format_number(b.median, 1),
            q3: format_number(b.q3, 1),
            max: format_number(b.max, 1),
        })
        .collect()
}

/// Full terminal rendering of a dashboard view.
pub fn render_view(view: &DashboardView) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# {}\n", view.title);
    let _ = writeln!(out, "{} employees in scope\n", format_int(view.rows));
    out.push_str(&table_rows(&view.report.headline_rows(), usize::MAX));
    out.push('\n');

    let suffix = match view.top_n {
        Some(n) => format!(" (top {})", n),
        None => String::new(),
    };
    out.push_str(&bar_chart(
        &format!("Employees per {}{}", view.metrics.group_by, suffix),
        &view.count_series(),
    ));
    out.push('\n');
    for s in &view.metrics.statistics {
        out.push_str(&bar_chart(
            &format!("{} by {}{}", s.name, view.metrics.group_by, suffix),
            &view.chart_series(&s.name),
        ));
        out.push('\n');
    }

    for (title, ct) in &view.crosstabs {
        let _ = writeln!(out, "{}", title);
        out.push_str(&crosstab_table(ct));
        out.push('\n');
    }
    if let Some(cm) = &view.correlation {
        let _ = writeln!(out, "Correlation between {} metrics", view.metrics.group_by);
        out.push_str(&correlation_table(cm));
        out.push('\n');
    }
    if !view.distributions.is_empty() {
        let _ = writeln!(out, "Distribution by {}", view.metrics.group_by);
        out.push_str(&table_rows(&box_rows(&view.distributions), usize::MAX));
        out.push('\n');
    }

    out.push_str(&view.report.narrative);
    out
}

#[derive(Serialize)]
struct ExportedView<'a> {
    generated_at: DateTime<Utc>,
    #[serde(flatten)]
    view: &'a DashboardView,
}

/// Write `metrics.csv`, one CSV per cross-tab and `report.json` into `dir`.
pub fn export_view(view: &DashboardView, dir: &Path) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)?;
    let mut written = Vec::new();

    let metrics_path = dir.join("metrics.csv");
    write_csv(&metrics_path, &view.metrics.rows())?;
    written.push(metrics_path);

    for (_, ct) in &view.crosstabs {
        let path = dir.join(format!("crosstab_{}_{}.csv", ct.row_dim, ct.col_dim));
        write_csv(&path, &ct.rows())?;
        written.push(path);
    }

    let report_path = dir.join("report.json");
    write_json(
        &report_path,
        &ExportedView {
            generated_at: Utc::now(),
            view,
        },
    )?;
    written.push(report_path);

    for p in &written {
        info!("Exported {}", p.display());
    }
    Ok(written)
}
