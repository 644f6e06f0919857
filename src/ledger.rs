//! Date-keyed quote ledger persisted as CSV
//!
//! The file is read whole, merged in memory and written back whole through a
//! temporary sibling file and a rename, so a failed run leaves the previous
//! ledger intact. Concurrent runs against the same file are not supported.

use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

pub const DATE_COLUMN: &str = "Date";
const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("failed to access ledger {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed ledger {}: {source}", .path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("ledger {} has no `Date` column", .path.display())]
    MissingDateColumn { path: PathBuf },

    #[error("ledger {}, line {line}: cannot read date `{value}`", .path.display())]
    InvalidDate {
        path: PathBuf,
        line: u64,
        value: String,
    },
}

/// What a merge did to the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// First row of a ledger that had no file yet.
    Created,
    Appended,
    Updated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerRow {
    pub date: NaiveDate,
    /// Column name to cell; empty cells are not stored.
    cells: BTreeMap<String, String>,
}

impl LedgerRow {
    fn new(date: NaiveDate) -> Self {
        Self {
            date,
            cells: BTreeMap::new(),
        }
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.cells.get(column).map(String::as_str)
    }
}

/// Cells that count as "no value": blank, or `nan` as spreadsheet exports write it.
pub fn is_placeholder(value: &str) -> bool {
    let value = value.trim();
    value.is_empty() || value.eq_ignore_ascii_case("nan")
}

#[derive(Debug, Clone)]
pub struct Ledger {
    columns: Vec<String>,
    rows: BTreeMap<NaiveDate, LedgerRow>,
    existed: bool,
}

impl Ledger {
    /// An empty ledger with the given value columns (the date column is implicit).
    pub fn new(columns: &[String]) -> Self {
        Self {
            columns: columns.to_vec(),
            rows: BTreeMap::new(),
            existed: false,
        }
    }

    /// Load `path`, or start empty when it does not exist yet.
    ///
    /// Columns already in the file keep their order; any of `columns` the file
    /// lacks are appended after them.
    pub fn load(path: &Path, columns: &[String]) -> Result<Self, LedgerError> {
        if !path.exists() {
            info!("[LEDGER] {} not found, starting a new ledger", path.display());
            return Ok(Self::new(columns));
        }

        let csv_err = |source| LedgerError::Csv {
            path: path.to_path_buf(),
            source,
        };

        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(path)
            .map_err(csv_err)?;

        let headers = reader.headers().map_err(csv_err)?.clone();
        let date_idx = headers
            .iter()
            .position(|h| h == DATE_COLUMN)
            .ok_or_else(|| LedgerError::MissingDateColumn {
                path: path.to_path_buf(),
            })?;

        let mut ledger = Self {
            columns: headers
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != date_idx)
                .map(|(_, h)| h.to_string())
                .collect(),
            rows: BTreeMap::new(),
            existed: true,
        };
        for column in columns {
            if !ledger.columns.contains(column) {
                ledger.columns.push(column.clone());
            }
        }

        for record in reader.records() {
            let record = record.map_err(csv_err)?;
            let line = record.position().map(|p| p.line()).unwrap_or_default();
            let raw_date = record.get(date_idx).unwrap_or_default();
            let date = parse_date(raw_date).ok_or_else(|| LedgerError::InvalidDate {
                path: path.to_path_buf(),
                line,
                value: raw_date.to_string(),
            })?;

            if ledger.rows.contains_key(&date) {
                warn!("[LEDGER] Duplicate row for {} on line {}, merged", date, line);
            }

            let row = ledger.rows.entry(date).or_insert_with(|| LedgerRow::new(date));
            for (idx, (header, cell)) in headers.iter().zip(record.iter()).enumerate() {
                if idx == date_idx || is_placeholder(cell) {
                    continue;
                }
                row.cells.insert(header.to_string(), cell.to_string());
            }
        }

        info!("[LEDGER] Loaded {} row(s) from {}", ledger.len(), path.display());
        Ok(ledger)
    }

    /// Merge one day's values.
    ///
    /// An existing row only has the cells named in `values` overwritten, and
    /// placeholder values are skipped, so a poorer re-run never blanks a cell.
    pub fn merge<'v>(
        &mut self,
        date: NaiveDate,
        values: impl IntoIterator<Item = (&'v str, &'v str)>,
    ) -> MergeOutcome {
        let outcome = if self.rows.contains_key(&date) {
            MergeOutcome::Updated
        } else if !self.existed && self.rows.is_empty() {
            MergeOutcome::Created
        } else {
            MergeOutcome::Appended
        };

        let row = self.rows.entry(date).or_insert_with(|| LedgerRow::new(date));
        for (column, value) in values {
            if is_placeholder(value) {
                continue;
            }
            if !self.columns.iter().any(|c| c == column) {
                self.columns.push(column.to_string());
            }
            row.cells.insert(column.to_string(), value.to_string());
        }

        outcome
    }

    /// Write the whole ledger, rows ascending by date.
    pub fn save(&self, path: &Path) -> Result<(), LedgerError> {
        let io_err = |source| LedgerError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let tmp_path = tmp_path(path);
        if let Err(e) = self.write_csv(&tmp_path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }
        fs::rename(&tmp_path, path).map_err(|source| {
            let _ = fs::remove_file(&tmp_path);
            io_err(source)
        })?;

        info!("[LEDGER] Saved {} row(s) to {}", self.len(), path.display());
        Ok(())
    }

    fn write_csv(&self, path: &Path) -> Result<(), LedgerError> {
        let csv_err = |source| LedgerError::Csv {
            path: path.to_path_buf(),
            source,
        };

        let mut writer = csv::Writer::from_path(path).map_err(csv_err)?;

        let header = std::iter::once(DATE_COLUMN).chain(self.columns.iter().map(String::as_str));
        writer.write_record(header).map_err(csv_err)?;

        // BTreeMap iteration is already ascending by date
        for row in self.rows.values() {
            let date = row.date.format(DATE_FORMAT).to_string();
            let cells = self.columns.iter().map(|c| row.get(c).unwrap_or(""));
            writer
                .write_record(std::iter::once(date.as_str()).chain(cells))
                .map_err(csv_err)?;
        }

        writer.flush().map_err(|source| LedgerError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    #[cfg(test)]
    pub fn row(&self, date: NaiveDate) -> Option<&LedgerRow> {
        self.rows.get(&date)
    }

    #[cfg(test)]
    pub fn rows(&self) -> impl Iterator<Item = &LedgerRow> {
        self.rows.values()
    }

    #[cfg(test)]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Resolved/pending status of `columns` in the row for `date`.
    pub fn summary(&self, date: NaiveDate, columns: &[String]) -> Summary {
        let row = self.rows.get(&date);
        let statuses = columns
            .iter()
            .map(|column| ColumnStatus {
                column: column.clone(),
                value: row
                    .and_then(|r| r.get(column))
                    .filter(|v| !is_placeholder(v))
                    .map(str::to_string),
            })
            .collect();

        Summary { date, statuses }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnStatus {
    pub column: String,
    /// `None` while pending.
    pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    pub date: NaiveDate,
    pub statuses: Vec<ColumnStatus>,
}

impl Summary {
    pub fn collected(&self) -> usize {
        self.statuses.iter().filter(|s| s.value.is_some()).count()
    }

    pub fn total(&self) -> usize {
        self.statuses.len()
    }

    pub fn log(&self) {
        info!("[SUMMARY] Quotes for {}:", self.date);
        for status in &self.statuses {
            match &status.value {
                Some(value) => info!("[SUMMARY]   {}: {}", status.column, value),
                None => warn!("[SUMMARY]   {}: pending", status.column),
            }
        }
        info!("[SUMMARY] Status: {}/{} funds collected", self.collected(), self.total());
    }
}

/// Accepts `YYYY-MM-DD`, also with a time suffix as spreadsheet tools write it.
fn parse_date(raw: &str) -> Option<NaiveDate> {
    let day = raw.split([' ', 'T']).next().unwrap_or(raw);
    NaiveDate::parse_from_str(day, DATE_FORMAT).ok()
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("ledger"));
    name.push(".tmp");
    path.with_file_name(name)
}
