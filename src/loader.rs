use crate::error::{InsightsError, Result};
use crate::types::{Column, ColumnType, Record, Schema, Table, Value};
use crate::util::{is_blank, parse_flag_safe, parse_i64_safe};
use csv::{ReaderBuilder, StringRecord};
use once_cell::sync::{Lazy, OnceCell};
use std::collections::HashMap;
use std::io::Read;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub raw_rows: usize,
    pub kept_rows: usize,
    pub dropped_missing_key: usize,
}

/// Outcome of a load. A failed load still carries a (empty) table, so the
/// caller can treat it as "nothing to display"; `error` tells it why.
#[derive(Debug)]
pub struct Loaded {
    pub table: Arc<Table>,
    pub report: LoadReport,
    pub error: Option<InsightsError>,
    pub cached: bool,
}

impl Loaded {
    fn failed(error: InsightsError) -> Loaded {
        Loaded {
            table: Arc::new(Table::empty()),
            report: LoadReport::default(),
            error: Some(error),
            cached: false,
        }
    }
}

/// Load `source` restricted to the columns declared in `schema`.
///
/// Never fails: on any I/O, parse or schema error the returned table is
/// empty and `error` holds a `Load` error.
pub fn load(source: &str, schema: &Schema, key_columns: &[Column]) -> Loaded {
    match try_load(source, schema, key_columns) {
        Ok((table, report)) => Loaded {
            table: Arc::new(table),
            report,
            error: None,
            cached: false,
        },
        Err(e) => {
            warn!("Failed to load {}: {}", source, e);
            Loaded::failed(e)
        }
    }
}

pub fn try_load(source: &str, schema: &Schema, key_columns: &[Column]) -> Result<(Table, LoadReport)> {
    let file = std::fs::File::open(source).map_err(|e| InsightsError::load(source, e.to_string()))?;
    load_from_reader(file, source, schema, key_columns)
}

/// Same as [`try_load`] but over any reader; `source` only labels errors.
pub fn load_from_reader<R: Read>(
    reader: R,
    source: &str,
    schema: &Schema,
    key_columns: &[Column],
) -> Result<(Table, LoadReport)> {
    validate_load_params(schema, key_columns)?;

    let mut rdr = ReaderBuilder::new().flexible(true).from_reader(reader);
    let headers = rdr
        .headers()
        .map_err(|e| InsightsError::load(source, e.to_string()))?
        .clone();

    // Position of every declared column in the source header.
    let mut positions: Vec<(Column, ColumnType, usize)> = Vec::new();
    for &(column, ty) in schema.fields() {
        let idx = headers
            .iter()
            .position(|h| h.trim() == column.header())
            .ok_or_else(|| {
                InsightsError::load(source, format!("missing column '{}'", column.header()))
            })?;
        positions.push((column, ty, idx));
    }

    let mut raw_rows = 0usize;
    let mut dropped_missing_key = 0usize;
    let mut records: Vec<Record> = Vec::new();
    let mut row = StringRecord::new();

    loop {
        let more = rdr
            .read_record(&mut row)
            .map_err(|e| InsightsError::load(source, e.to_string()))?;
        if !more {
            break;
        }
        raw_rows += 1;

        if key_columns
            .iter()
            .any(|k| positions.iter().any(|(c, _, idx)| c == k && is_blank(row.get(*idx))))
        {
            dropped_missing_key += 1;
            continue;
        }

        let mut record = Record::default();
        for &(column, ty, idx) in &positions {
            let cell = row.get(idx);
            if is_blank(cell) {
                continue;
            }
            let value = coerce(cell, column, ty).ok_or_else(|| {
                InsightsError::load(
                    source,
                    format!(
                        "row {}: value {:?} in column '{}' is not a valid {:?}",
                        raw_rows,
                        cell.unwrap_or_default(),
                        column.header(),
                        ty
                    ),
                )
            })?;
            record.set(column, value);
        }
        records.push(record);
    }

    let report = LoadReport {
        raw_rows,
        kept_rows: records.len(),
        dropped_missing_key,
    };
    info!(
        "Loaded {}: {} rows read, {} kept, {} dropped for missing key",
        source, report.raw_rows, report.kept_rows, report.dropped_missing_key
    );
    Ok((Table::new(schema.clone(), records), report))
}

fn validate_load_params(schema: &Schema, key_columns: &[Column]) -> Result<()> {
    if schema.is_empty() {
        return Err(InsightsError::InvalidParameter(
            "schema declares no columns".to_string(),
        ));
    }
    for k in key_columns {
        if !schema.contains(*k) {
            return Err(InsightsError::InvalidParameter(format!(
                "key column '{}' is not declared in the schema",
                k
            )));
        }
    }
    Ok(())
}

fn coerce(cell: Option<&str>, column: Column, ty: ColumnType) -> Option<Value> {
    match ty {
        ColumnType::Category => cell.map(|c| Value::Category(c.trim().to_string())),
        ColumnType::Bool => parse_flag_safe(cell).map(Value::Bool),
        ColumnType::Int8 | ColumnType::Int16 => {
            let v = parse_i64_safe(cell)?;
            let (lo, hi) = ty.bounds()?;
            if v < lo || v > hi {
                debug!("{} out of range for {:?} in {}", v, ty, column);
                return None;
            }
            Some(Value::Int(v))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    source: String,
    fields: Vec<(Column, ColumnType)>,
    key_columns: Vec<Column>,
}

/// Process-scoped memo of loaded tables.
///
/// Lifecycle: populated on the first successful load of a
/// (source, projection) pair, read many times afterwards, emptied only by
/// [`DatasetCache::invalidate`], [`DatasetCache::clear`] or process exit.
/// Changes to the file on disk are not noticed. Failed loads are not
/// memoized. Concurrent first loads of the same key share one slot: one
/// caller reads the file, the others wait for its table.
#[derive(Debug, Default)]
pub struct DatasetCache {
    entries: Mutex<HashMap<CacheKey, Slot>>,
}

type Slot = Arc<OnceCell<(Arc<Table>, LoadReport)>>;

static DATASET_CACHE: Lazy<DatasetCache> = Lazy::new(DatasetCache::default);

impl DatasetCache {
    pub fn new() -> DatasetCache {
        DatasetCache::default()
    }

    /// The cache shared by the whole process.
    pub fn global() -> &'static DatasetCache {
        &DATASET_CACHE
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<CacheKey, Slot>> {
        // slots are only ever filled once, so a poisoned lock is still consistent
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get_or_load(&self, source: &str, schema: &Schema, key_columns: &[Column]) -> Loaded {
        let key = CacheKey {
            source: source.to_string(),
            fields: schema.fields().to_vec(),
            key_columns: key_columns.to_vec(),
        };
        let slot = Arc::clone(self.entries().entry(key.clone()).or_default());

        let mut loaded_here = false;
        let outcome = slot.get_or_try_init(|| {
            debug!("Cache miss for {}", source);
            loaded_here = true;
            try_load(source, schema, key_columns).map(|(table, report)| (Arc::new(table), report))
        });
        match outcome {
            Ok((table, report)) => {
                if !loaded_here {
                    debug!("Cache hit for {}", source);
                }
                Loaded {
                    table: Arc::clone(table),
                    report: report.clone(),
                    error: None,
                    cached: !loaded_here,
                }
            }
            Err(e) => {
                warn!("Failed to load {}: {}", source, e);
                let mut entries = self.entries();
                let unfilled = entries
                    .get(&key)
                    .map_or(false, |s| Arc::ptr_eq(s, &slot) && s.get().is_none());
                if unfilled {
                    entries.remove(&key);
                }
                Loaded::failed(e)
            }
        }
    }

    /// Drop every projection of `source`; returns how many entries went.
    pub fn invalidate(&self, source: &str) -> usize {
        let mut removed = 0;
        self.entries().retain(|k, slot| {
            let keep = k.source != source;
            if !keep && slot.get().is_some() {
                removed += 1;
            }
            keep
        });
        removed
    }

    pub fn clear(&self) {
        self.entries().clear();
    }

    /// Number of loaded tables; slots still loading are not counted.
    pub fn len(&self) -> usize {
        self.entries().values().filter(|s| s.get().is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const CSV: &str = "\
employee_id,department,region,education,gender,age,is_promoted,avg_training_score,KPIs_met >80%,length_of_service,awards_won?
1,Sales,region_7,Bachelor's,m,35,0,49,1,8,0
2,,region_22,Bachelor's,f,30,0,60,0,4,0
3,Operations,region_19,,m,34,1,50,0,7,0
4,Sales,region_7,Master's,f,,1,73,1,10,1
";

    fn schema() -> Schema {
        Schema::new(&[
            (Column::Department, ColumnType::Category),
            (Column::Education, ColumnType::Category),
            (Column::Age, ColumnType::Int8),
            (Column::IsPromoted, ColumnType::Bool),
            (Column::AvgTrainingScore, ColumnType::Int16),
        ])
        .unwrap()
    }

    fn fixture(name: &str) -> String {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("tests/fixtures")
            .join(name)
            .to_string_lossy()
            .into_owned()
    }

    #[test]
    fn drops_rows_missing_the_key() {
        let (table, report) =
            load_from_reader(CSV.as_bytes(), "inline", &schema(), &[Column::Department]).unwrap();
        assert_eq!(report.raw_rows, 4);
        assert_eq!(report.kept_rows, 3);
        assert_eq!(report.dropped_missing_key, 1);
        assert!(table.records().iter().all(|r| r.department.is_some()));
    }

    #[test]
    fn keeps_only_declared_columns() {
        let (table, _) =
            load_from_reader(CSV.as_bytes(), "inline", &schema(), &[Column::Department]).unwrap();
        let first = &table.records()[0];
        assert_eq!(first.department.as_deref(), Some("Sales"));
        assert_eq!(first.avg_training_score, Some(49));
        assert_eq!(first.region, None);
        assert_eq!(first.gender, None);
        // blank non-key cells stay missing
        assert_eq!(table.records()[1].education, None);
        assert_eq!(table.records()[2].age, None);
    }

    #[test]
    fn out_of_range_value_is_a_load_error() {
        let csv = "department,age\nSales,300\n";
        let schema = Schema::new(&[
            (Column::Department, ColumnType::Category),
            (Column::Age, ColumnType::Int8),
        ])
        .unwrap();
        let err = load_from_reader(csv.as_bytes(), "inline", &schema, &[Column::Department])
            .unwrap_err();
        assert_eq!(err.error_code(), "LOAD_ERROR");
    }

    #[test]
    fn missing_declared_column_is_a_load_error() {
        let csv = "department\nSales\n";
        let err = load_from_reader(csv.as_bytes(), "inline", &schema(), &[Column::Department])
            .unwrap_err();
        assert!(err.to_string().contains("missing column"));
    }

    #[test]
    fn undeclared_key_is_invalid() {
        let err = load_from_reader(CSV.as_bytes(), "inline", &schema(), &[Column::Region])
            .unwrap_err();
        assert_eq!(err.error_code(), "INVALID_PARAMETER");
    }

    #[test]
    fn missing_file_yields_empty_table_and_error() {
        let loaded = load("does/not/exist.csv", &schema(), &[Column::Department]);
        assert!(loaded.table.is_empty());
        assert!(matches!(loaded.error, Some(InsightsError::Load { .. })));
    }

    #[test]
    fn cache_populates_once_and_invalidates() {
        let cache = DatasetCache::new();
        let path = fixture("employees.csv");
        let first = cache.get_or_load(&path, &schema(), &[Column::Department]);
        assert!(first.error.is_none());
        assert!(!first.cached);
        let second = cache.get_or_load(&path, &schema(), &[Column::Department]);
        assert!(second.cached);
        assert!(Arc::ptr_eq(&first.table, &second.table));
        assert_eq!(cache.invalidate(&path), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn cache_does_not_memoize_failures() {
        let cache = DatasetCache::new();
        let loaded = cache.get_or_load("nope.csv", &schema(), &[Column::Department]);
        assert!(loaded.error.is_some());
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn concurrent_first_loads_share_one_read() {
        let cache = DatasetCache::new();
        let path = fixture("employees.csv");
        let schema = schema();
        let results: Vec<Loaded> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| s.spawn(|| cache.get_or_load(&path, &schema, &[Column::Department])))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert!(results.iter().all(|l| l.error.is_none()));
        assert_eq!(results.iter().filter(|l| !l.cached).count(), 1);
        assert!(results.iter().all(|l| Arc::ptr_eq(&l.table, &results[0].table)));
        assert_eq!(cache.len(), 1);
    }
}
