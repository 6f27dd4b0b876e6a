// Entry point and high-level CLI flow.
//
// The binary is the presentation side of the pipeline:
// - it owns the dataset location and loads it through the process cache,
// - builds the row filter from flags (or prompts, in interactive mode),
// - renders the dashboard to the terminal or as JSON, and optionally
//   exports CSV/JSON artefacts.
use anyhow::{bail, Result};
use clap::{error::ErrorKind, CommandFactory, Parser, ValueEnum};
use employee_insights::dashboards::{self, TopN, DEFAULT_AGE_RANGE, DEFAULT_DATA_PATH};
use employee_insights::{
    output, Column, DashboardKind, DashboardOptions, DashboardSpec, DatasetCache, RowFilter, Table,
};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tracing::{debug, error};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliDashboard {
    /// Promotion, score, KPI and tenure by department
    Department,
    /// Diversity metrics by gender, filterable by department and age
    Gender,
    /// Regional distribution with top-N charts and a metric heat-map
    Region,
}

impl From<CliDashboard> for DashboardKind {
    fn from(cli: CliDashboard) -> Self {
        match cli {
            CliDashboard::Department => DashboardKind::Department,
            CliDashboard::Gender => DashboardKind::Gender,
            CliDashboard::Region => DashboardKind::Region,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Employee analytics dashboards in the terminal",
    long_about = "Group-level employee analytics (department, gender, region) with a \
                  templated insight report.\n\n\
                  EXAMPLES:\n  \
                  employee-insights department\n  \
                  employee-insights gender --department Sales --age-min 30 --age-max 45\n  \
                  employee-insights region --top-n 5 --output reports/"
)]
struct Args {
    /// Dashboard to render
    #[arg(value_enum)]
    dashboard: CliDashboard,

    /// Path to the employee CSV file
    #[arg(long, default_value = DEFAULT_DATA_PATH)]
    data: String,

    /// Only include this department
    #[arg(long)]
    department: Option<String>,

    /// Lower bound of the age filter (inclusive)
    #[arg(long)]
    age_min: Option<f64>,

    /// Upper bound of the age filter (inclusive)
    #[arg(long)]
    age_max: Option<f64>,

    /// Number of groups shown in charts
    #[arg(long)]
    top_n: Option<usize>,

    /// Directory for metrics.csv, cross-tab CSVs and report.json
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print the computed dashboard as JSON instead of the text rendering
    #[arg(long)]
    json: bool,

    /// Keep prompting for new filters after each render
    #[arg(short, long)]
    interactive: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Only log warnings and errors
    #[arg(short, long)]
    quiet: bool,
}

fn init_tracing(level: &str, quiet: bool, json: bool) {
    use tracing_subscriber::EnvFilter;

    // stdout carries the JSON document; keep logs to errors only
    let effective_level = if json {
        "error"
    } else if quiet {
        "warn"
    } else {
        level
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(effective_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

/// Filter inputs, as chosen on the command line or at the prompt.
#[derive(Debug, Clone)]
struct Selection {
    department: Option<String>,
    age_range: Option<(f64, f64)>,
    top_n: Option<usize>,
}

impl Selection {
    fn from_args(args: &Args, kind: DashboardKind) -> Selection {
        let age_range = match (args.age_min, args.age_max, kind) {
            (None, None, DashboardKind::Gender) => Some(DEFAULT_AGE_RANGE),
            (None, None, _) => None,
            (min, max, _) => Some((
                min.unwrap_or(f64::NEG_INFINITY),
                max.unwrap_or(f64::INFINITY),
            )),
        };
        Selection {
            department: args.department.clone(),
            age_range,
            top_n: args.top_n,
        }
    }

    /// Reject flags the dashboard has no column or range for.
    fn check(&self, spec: &DashboardSpec) -> std::result::Result<(), String> {
        if self.age_range.is_some() && !spec.schema.contains(Column::Age) {
            return Err(format!(
                "--age-min/--age-max are not available on the {} dashboard",
                spec.kind
            ));
        }
        if self.department.is_some() && !spec.schema.contains(Column::Department) {
            return Err(format!(
                "--department is not available on the {} dashboard",
                spec.kind
            ));
        }
        if let (Some(n), Some(bounds)) = (self.top_n, spec.top_n) {
            bounds.check(n).map_err(|e| e.to_string())?;
        }
        Ok(())
    }

    fn options(&self) -> DashboardOptions {
        let mut filter = RowFilter::new();
        if let Some((min, max)) = self.age_range {
            filter = filter.between(Column::Age, min, max);
        }
        if let Some(dept) = &self.department {
            filter = filter.equals(Column::Department, dept.clone());
        }
        DashboardOptions {
            filter,
            top_n: self.top_n,
        }
    }
}

/// Read a single trimmed line after printing `prompt`; `None` on end of input.
fn read_line(input: &mut impl BufRead, prompt: &str) -> Option<String> {
    print!("{}", prompt);
    let _ = io::stdout().flush();
    let mut buf = String::new();
    match input.read_line(&mut buf) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(buf.trim().to_string()),
    }
}

/// Ask for a top-N until it is blank or within `bounds`.
fn prompt_top_n(input: &mut impl BufRead, current: Option<usize>, bounds: TopN) -> Option<usize> {
    let prompt = format!("Top N ({}-{}, blank keeps current): ", bounds.min, bounds.max);
    while let Some(line) = read_line(input, &prompt) {
        if line.is_empty() {
            break;
        }
        let parsed = line
            .parse::<usize>()
            .map_err(|_| format!("'{}' is not a number", line))
            .and_then(|n| bounds.check(n).map_err(|e| e.to_string()));
        match parsed {
            Ok(n) => return Some(n),
            Err(e) => println!("{}", e),
        }
    }
    current
}

/// Ask for new filter values; blank or end of input keeps the current one.
fn prompt_selection(
    input: &mut impl BufRead,
    current: &Selection,
    spec: &DashboardSpec,
    table: &Table,
) -> Selection {
    let mut next = current.clone();
    if spec.schema.contains(Column::Department) && spec.group_by != Column::Department {
        let departments = table.distinct(Column::Department).unwrap_or_default();
        println!("Departments: All, {}", departments.join(", "));
        match read_line(input, "Department (blank keeps current): ").as_deref() {
            None | Some("") => {}
            Some(s) if s.eq_ignore_ascii_case("all") => next.department = None,
            Some(s) => next.department = Some(s.to_string()),
        }
    }
    if spec.schema.contains(Column::Age) && spec.box_plot == Some(Column::Age) {
        if let Ok(Some((lo, hi))) = table.numeric_range(Column::Age) {
            println!("Ages in data: {}..={}", lo, hi);
        }
        let min = read_line(input, "Minimum age (blank keeps current): ").unwrap_or_default();
        let max = read_line(input, "Maximum age (blank keeps current): ").unwrap_or_default();
        let (cur_min, cur_max) = next.age_range.unwrap_or(DEFAULT_AGE_RANGE);
        next.age_range = Some((
            min.parse().unwrap_or(cur_min),
            max.parse().unwrap_or(cur_max),
        ));
    }
    if let Some(bounds) = spec.top_n {
        next.top_n = prompt_top_n(input, next.top_n, bounds);
    }
    next
}

/// Render once. An empty result is reported to the user, not treated as a failure.
fn render(args: &Args, spec: &DashboardSpec, table: &Table, selection: &Selection) -> Result<()> {
    let view = match dashboards::run(spec, table, &selection.options()) {
        Ok(v) => v,
        Err(e) if e.is_user_facing() => {
            println!("Nothing to display: {}\n", e);
            return Ok(());
        }
        Err(e) => {
            error!("{}", e);
            bail!(e);
        }
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&view)?);
    } else {
        println!("{}", output::render_view(&view));
    }
    if let Some(dir) = &args.output {
        let written = output::export_view(&view, dir)?;
        if !args.json {
            println!("(Results exported to {} files in {})\n", written.len(), dir.display());
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level, args.quiet, args.json);

    let kind = DashboardKind::from(args.dashboard);
    let spec = DashboardSpec::for_kind(kind)?;
    let cache = DatasetCache::global();
    let mut selection = Selection::from_args(&args, kind);
    if let Err(msg) = selection.check(&spec) {
        Args::command().error(ErrorKind::ArgumentConflict, msg).exit();
    }
    let stdin = io::stdin();
    let mut input = stdin.lock();

    loop {
        let loaded = spec.load(&args.data, cache);
        debug!("Dataset served from cache: {}", loaded.cached);
        if let Some(e) = &loaded.error {
            eprintln!("Error loading data: {}", e);
            return Ok(());
        }

        render(&args, &spec, &loaded.table, &selection)?;
        if !args.interactive {
            return Ok(());
        }

        println!("[1] Change filters");
        println!("[2] Reload data");
        println!("[3] Exit\n");
        match read_line(&mut input, "Enter choice: ").as_deref() {
            Some("1") => selection = prompt_selection(&mut input, &selection, &spec, &loaded.table),
            Some("2") => {
                cache.invalidate(&args.data);
            }
            Some("3") | None => {
                println!("Exiting the program.");
                return Ok(());
            }
            Some(_) => println!("Invalid choice. Please enter 1, 2 or 3.\n"),
        }
    }
}
