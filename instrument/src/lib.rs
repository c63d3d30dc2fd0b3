//! Column capture for pricing-run tick events.
//!
//! A `tracing_subscriber::Layer` that turns flat `info!` events into
//! per-target column tables. The schema of each table is whatever fields the
//! events carry; a field missing from a row is stored as a null.
//!
//! # Usage
//!
//! ```ignore
//! // In engine code:
//! tracing::info!(target: "price", seq, unit_id, baseline_price);
//!
//! // In a test or driver:
//! let subscriber = tracing_subscriber::registry().with(instrument::ColumnLayer::default());
//! tracing::subscriber::with_default(subscriber, || { /* run */ });
//! let tables = instrument::drain();
//! let prices = &tables.tables["price"];
//! ```

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

// === COLUMNS ===

/// A nullable column of typed values.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedColumn {
    U64(Vec<Option<u64>>),
    I64(Vec<Option<i64>>),
    F64(Vec<Option<f64>>),
    Bool(Vec<Option<bool>>),
    Str(Vec<Option<String>>),
}

impl TypedColumn {
    pub fn len(&self) -> usize {
        match self {
            TypedColumn::U64(v) => v.len(),
            TypedColumn::I64(v) => v.len(),
            TypedColumn::F64(v) => v.len(),
            TypedColumn::Bool(v) => v.len(),
            TypedColumn::Str(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn pad_to(&mut self, rows: usize) {
        let missing = rows.saturating_sub(self.len());
        if missing == 0 {
            return;
        }
        match self {
            TypedColumn::U64(v) => v.resize(rows, None),
            TypedColumn::I64(v) => v.resize(rows, None),
            TypedColumn::F64(v) => v.resize(rows, None),
            TypedColumn::Bool(v) => v.resize(rows, None),
            TypedColumn::Str(v) => v.resize(rows, None),
        }
    }

    /// Non-null values as f64, widening integer columns.
    pub fn as_f64(&self) -> Vec<f64> {
        match self {
            TypedColumn::U64(v) => v.iter().flatten().map(|x| *x as f64).collect(),
            TypedColumn::I64(v) => v.iter().flatten().map(|x| *x as f64).collect(),
            TypedColumn::F64(v) => v.iter().flatten().copied().collect(),
            TypedColumn::Bool(_) | TypedColumn::Str(_) => Vec::new(),
        }
    }
}

/// One table per event target. Every column always holds `rows` entries.
#[derive(Debug, Clone, Default)]
pub struct ColumnTable {
    pub columns: BTreeMap<String, TypedColumn>,
    pub rows: usize,
}

impl ColumnTable {
    pub fn column(&self, name: &str) -> Option<&TypedColumn> {
        self.columns.get(name)
    }

    /// Non-null values of a numeric column; empty when the column is absent.
    pub fn f64_values(&self, name: &str) -> Vec<f64> {
        self.columns.get(name).map(TypedColumn::as_f64).unwrap_or_default()
    }

    fn align(&mut self) {
        let rows = self.rows;
        for col in self.columns.values_mut() {
            col.pad_to(rows);
        }
    }
}

/// All captured tables, keyed by tracing target.
#[derive(Debug, Clone, Default)]
pub struct TickTables {
    pub tables: BTreeMap<String, ColumnTable>,
}

impl TickTables {
    pub fn get(&self, target: &str) -> Option<&ColumnTable> {
        self.tables.get(target)
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

thread_local! {
    static TABLES: RefCell<TickTables> = RefCell::default();
}

// === FIELD VISITOR ===

/// Appends one event's fields to the current row of a table.
struct RowVisitor<'a> {
    table: &'a mut ColumnTable,
}

impl RowVisitor<'_> {
    fn column(&mut self, field: &Field, empty: fn(usize) -> TypedColumn) -> &mut TypedColumn {
        let rows = self.table.rows;
        self.table
            .columns
            .entry(field.name().to_string())
            .or_insert_with(|| empty(rows))
    }
}

// A field whose type differs from its column's type is dropped; the row
// is padded with a null instead.
impl Visit for RowVisitor<'_> {
    fn record_u64(&mut self, field: &Field, value: u64) {
        if let TypedColumn::U64(v) = self.column(field, |n| TypedColumn::U64(vec![None; n])) {
            v.push(Some(value));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        if let TypedColumn::I64(v) = self.column(field, |n| TypedColumn::I64(vec![None; n])) {
            v.push(Some(value));
        }
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        if let TypedColumn::F64(v) = self.column(field, |n| TypedColumn::F64(vec![None; n])) {
            v.push(Some(value));
        }
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        if let TypedColumn::Bool(v) = self.column(field, |n| TypedColumn::Bool(vec![None; n])) {
            v.push(Some(value));
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if let TypedColumn::Str(v) = self.column(field, |n| TypedColumn::Str(vec![None; n])) {
            v.push(Some(value.to_string()));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.record_str(field, &format!("{:?}", value));
    }
}

// === LAYER ===

/// Layer that captures events at `max_level` or more severe into the
/// thread-local tables. Spans are ignored.
#[derive(Debug, Clone)]
pub struct ColumnLayer {
    max_level: Level,
    targets: Option<Vec<String>>,
}

impl Default for ColumnLayer {
    fn default() -> Self {
        Self {
            max_level: Level::INFO,
            targets: None,
        }
    }
}

impl ColumnLayer {
    /// Capture only the named targets (log lines from other targets pass through).
    pub fn for_targets<I, T>(targets: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            max_level: Level::INFO,
            targets: Some(targets.into_iter().map(Into::into).collect()),
        }
    }

    pub fn with_max_level(mut self, level: Level) -> Self {
        self.max_level = level;
        self
    }

    fn accepts(&self, target: &str, level: &Level) -> bool {
        if *level > self.max_level {
            return false;
        }
        match &self.targets {
            Some(targets) => targets.iter().any(|t| t == target),
            None => true,
        }
    }
}

impl<S: Subscriber> Layer<S> for ColumnLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if !self.accepts(metadata.target(), metadata.level()) {
            return;
        }

        TABLES.with(|t| {
            let mut tables = t.borrow_mut();
            let table = tables
                .tables
                .entry(metadata.target().to_string())
                .or_default();

            event.record(&mut RowVisitor { table: &mut *table });
            table.rows += 1;
            table.align();
        });
    }
}

/// Take all captured tables for the current thread.
pub fn drain() -> TickTables {
    TABLES.with(|t| std::mem::take(&mut *t.borrow_mut()))
}

/// Discard captured tables for the current thread.
pub fn clear() {
    TABLES.with(|t| *t.borrow_mut() = TickTables::default());
}

// === POLARS ===

use polars::prelude::*;

impl ColumnTable {
    /// Convert to a polars DataFrame; nulls are preserved.
    pub fn to_dataframe(&self) -> PolarsResult<DataFrame> {
        let columns: Vec<Column> = self
            .columns
            .iter()
            .map(|(name, col)| match col {
                TypedColumn::U64(v) => Column::new(name.into(), v),
                TypedColumn::I64(v) => Column::new(name.into(), v),
                TypedColumn::F64(v) => Column::new(name.into(), v),
                TypedColumn::Bool(v) => Column::new(name.into(), v),
                TypedColumn::Str(v) => Column::new(name.into(), v),
            })
            .collect();
        DataFrame::new(columns)
    }
}

impl TickTables {
    /// Convert every table; tables that fail to convert are skipped.
    pub fn to_dataframes(&self) -> HashMap<String, DataFrame> {
        self.tables
            .iter()
            .filter_map(|(name, table)| table.to_dataframe().ok().map(|df| (name.clone(), df)))
            .collect()
    }
}

fn io_error(error: std::io::Error) -> PolarsError {
    PolarsError::IO {
        error: error.into(),
        msg: None,
    }
}

/// Write each frame to `{dir}/{name}.parquet`.
pub fn save_parquet(dfs: &mut HashMap<String, DataFrame>, dir: &Path) -> PolarsResult<()> {
    std::fs::create_dir_all(dir).map_err(io_error)?;
    for (name, df) in dfs.iter_mut() {
        let file = std::fs::File::create(dir.join(format!("{}.parquet", name))).map_err(io_error)?;
        ParquetWriter::new(file).finish(df)?;
    }
    Ok(())
}

/// Replace non-alphanumeric chars with `_` and cap the length for directory names.
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .take(60)
        .collect()
}

/// RAII guard for one captured run.
///
/// Clears the current thread's tables on creation. On drop, whatever has not
/// been taken with [`RunCapture::frames`] is drained and written as parquet to
/// `{parent}/{name}/`, followed by a `_ready` sentinel. The layer itself must be
/// installed by the caller.
pub struct RunCapture {
    run_dir: PathBuf,
    frames: Option<HashMap<String, DataFrame>>,
}

impl RunCapture {
    pub fn new(parent: impl Into<PathBuf>, name: &str) -> Self {
        clear();
        Self {
            run_dir: parent.into().join(sanitize(name)),
            frames: None,
        }
    }

    /// Drain captured tables once and return the frames; later calls reuse them.
    pub fn frames(&mut self) -> &HashMap<String, DataFrame> {
        self.frames.get_or_insert_with(|| drain().to_dataframes())
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }
}

impl Drop for RunCapture {
    fn drop(&mut self) {
        let mut dfs = self.frames.take().unwrap_or_else(|| drain().to_dataframes());
        if dfs.is_empty() {
            return;
        }
        if let Err(e) = save_parquet(&mut dfs, &self.run_dir) {
            tracing::error!(
                run_dir = %self.run_dir.display(),
                error = %e,
                "failed to write parquet"
            );
            return;
        }
        if let Err(e) = std::fs::File::create(self.run_dir.join("_ready")) {
            tracing::error!(
                run_dir = %self.run_dir.display(),
                error = %e,
                "failed to write _ready sentinel"
            );
        } else {
            tracing::info!(
                tables = dfs.len(),
                run_dir = %self.run_dir.display(),
                "capture written"
            );
        }
    }
}
