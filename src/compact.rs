//! Compaction: every staged batch, coerced to the table schema, into one Parquet file.
//!
//! Coercion is strict. Absent keys and JSON `null` read as null in any column,
//! and an empty string reads as null in an integer column. Anything else that
//! does not fit its column fails the whole compaction, naming the batch file,
//! line and field. Unknown keys are ignored.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, AsArray, Int32Array, StringArray};
use arrow::datatypes::Int32Type;
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::records::TableRow;
use crate::schema::{table_schema, Column, COLUMNS};
use crate::staging::staged_batches;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactionStats {
    pub batches: usize,
    pub rows: usize,
}

/// Reads the staging area back under the table schema and writes the consolidated table.
#[derive(Debug, Clone)]
pub struct TableCompactor {
    staging_dir: PathBuf,
    pattern: String,
}

impl TableCompactor {
    pub fn new(staging_dir: impl Into<PathBuf>, pattern: impl Into<String>) -> Self {
        TableCompactor {
            staging_dir: staging_dir.into(),
            pattern: pattern.into(),
        }
    }

    /// Overwrite `destination` with every staged row, in batch-file order.
    pub fn compact(&self, destination: &Path) -> Result<CompactionStats> {
        let batches = staged_batches(&self.staging_dir, &self.pattern)?;

        let mut rows = Vec::new();
        for path in &batches {
            let before = rows.len();
            read_batch(path, &mut rows)?;
            debug!("{}: {} rows", path.display(), rows.len() - before);
        }

        let batch = to_record_batch(&rows)?;
        write_parquet(destination, &batch)?;

        info!(
            "Compacted {} rows from {} batches into {}",
            rows.len(),
            batches.len(),
            destination.display()
        );
        Ok(CompactionStats {
            batches: batches.len(),
            rows: rows.len(),
        })
    }
}

// ── Staged JSON → rows ──

fn read_batch(path: &Path, out: &mut Vec<TableRow>) -> Result<()> {
    let text = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;

    for (i, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let at = LineRef { batch: path, line: i + 1 };
        let value: Value = serde_json::from_str(line)
            .map_err(|e| at.coercion("<record>", format!("invalid JSON: {}", e)))?;
        match value {
            Value::Object(obj) => out.push(coerce_row(&obj, &at)?),
            other => {
                return Err(at.coercion(
                    "<record>",
                    format!("expected an object, found {}", describe(&other)),
                ))
            }
        }
    }
    Ok(())
}

struct LineRef<'a> {
    batch: &'a Path,
    line: usize,
}

impl LineRef<'_> {
    fn coercion(&self, field: &str, reason: String) -> Error {
        Error::SchemaCoercion {
            batch: self.batch.to_path_buf(),
            line: self.line,
            field: field.to_string(),
            reason,
        }
    }
}

fn coerce_row(obj: &Map<String, Value>, at: &LineRef) -> Result<TableRow> {
    let text = |col: Column| string_cell(obj.get(col.name()), col, at);
    let count = |col: Column| int_cell(obj.get(col.name()), col, at);

    Ok(TableRow {
        organization_name: text(Column::OrganizationName)?,
        repository_id: text(Column::RepositoryId)?,
        repository_name: text(Column::RepositoryName)?,
        repository_owner: text(Column::RepositoryOwner)?,
        num_prs: count(Column::NumPrs)?,
        num_prs_merged: count(Column::NumPrsMerged)?,
        merged_at: text(Column::MergedAt)?,
        is_compliant: text(Column::IsCompliant)?,
    })
}

fn string_cell(value: Option<&Value>, col: Column, at: &LineRef) -> Result<Option<String>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(at.coercion(
            col.name(),
            format!("expected a string, found {}", describe(other)),
        )),
    }
}

fn int_cell(value: Option<&Value>, col: Column, at: &LineRef) -> Result<Option<i32>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.is_empty() => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .and_then(|v| i32::try_from(v).ok())
            .map(Some)
            .ok_or_else(|| at.coercion(col.name(), format!("{} is not a 32-bit integer", n))),
        Some(other) => Err(at.coercion(
            col.name(),
            format!("expected an integer, found {}", describe(other)),
        )),
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::Null => "null".into(),
        Value::Bool(b) => format!("boolean {}", b),
        Value::Number(n) => format!("number {}", n),
        Value::String(s) => format!("string {:?}", s),
        Value::Array(_) => "an array".into(),
        Value::Object(_) => "an object".into(),
    }
}

// ── Rows → Parquet ──

fn to_record_batch(rows: &[TableRow]) -> Result<RecordBatch> {
    let columns: Vec<ArrayRef> = COLUMNS.iter().map(|&col| column_array(col, rows)).collect();
    Ok(RecordBatch::try_new(table_schema(), columns)?)
}

fn column_array(col: Column, rows: &[TableRow]) -> ArrayRef {
    fn utf8(rows: &[TableRow], f: impl Fn(&TableRow) -> Option<&str>) -> ArrayRef {
        Arc::new(rows.iter().map(f).collect::<StringArray>())
    }
    fn int32(rows: &[TableRow], f: impl Fn(&TableRow) -> Option<i32>) -> ArrayRef {
        Arc::new(rows.iter().map(f).collect::<Int32Array>())
    }

    match col {
        Column::OrganizationName => utf8(rows, |r| r.organization_name.as_deref()),
        Column::RepositoryId => utf8(rows, |r| r.repository_id.as_deref()),
        Column::RepositoryName => utf8(rows, |r| r.repository_name.as_deref()),
        Column::RepositoryOwner => utf8(rows, |r| r.repository_owner.as_deref()),
        Column::NumPrs => int32(rows, |r| r.num_prs),
        Column::NumPrsMerged => int32(rows, |r| r.num_prs_merged),
        Column::MergedAt => utf8(rows, |r| r.merged_at.as_deref()),
        Column::IsCompliant => utf8(rows, |r| r.is_compliant.as_deref()),
    }
}

fn write_parquet(dest: &Path, batch: &RecordBatch) -> Result<()> {
    if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }

    let tmp = tmp_path(dest);
    let file = File::create(&tmp).map_err(|e| Error::io(&tmp, e))?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();

    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))?;
    writer.write(batch)?;
    writer.close()?;

    fs::rename(&tmp, dest).map_err(|e| Error::io(dest, e))?;
    Ok(())
}

fn tmp_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    dest.with_file_name(name)
}

// ── Read-back ──

fn read_batches(path: &Path) -> Result<Vec<RecordBatch>> {
    let file = File::open(path).map_err(|e| Error::io(path, e))?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;
    Ok(reader.collect::<std::result::Result<Vec<_>, ArrowError>>()?)
}

/// All rows of a consolidated table, in file order.
pub fn read_table(path: &Path) -> Result<Vec<TableRow>> {
    let mut rows = Vec::new();
    for batch in read_batches(path)? {
        let text = |col| string_column(&batch, col);
        let count = |col| int_column(&batch, col);

        let organization_name = text(Column::OrganizationName)?;
        let repository_id = text(Column::RepositoryId)?;
        let repository_name = text(Column::RepositoryName)?;
        let repository_owner = text(Column::RepositoryOwner)?;
        let num_prs = count(Column::NumPrs)?;
        let num_prs_merged = count(Column::NumPrsMerged)?;
        let merged_at = text(Column::MergedAt)?;
        let is_compliant = text(Column::IsCompliant)?;

        for i in 0..batch.num_rows() {
            rows.push(TableRow {
                organization_name: str_at(organization_name, i),
                repository_id: str_at(repository_id, i),
                repository_name: str_at(repository_name, i),
                repository_owner: str_at(repository_owner, i),
                num_prs: int_at(num_prs, i),
                num_prs_merged: int_at(num_prs_merged, i),
                merged_at: str_at(merged_at, i),
                is_compliant: str_at(is_compliant, i),
            });
        }
    }
    Ok(rows)
}

fn string_column(batch: &RecordBatch, col: Column) -> Result<&StringArray> {
    batch
        .column_by_name(col.name())
        .and_then(|a| a.as_string_opt::<i32>())
        .ok_or_else(|| missing_column(col))
}

fn int_column(batch: &RecordBatch, col: Column) -> Result<&Int32Array> {
    batch
        .column_by_name(col.name())
        .and_then(|a| a.as_primitive_opt::<Int32Type>())
        .ok_or_else(|| missing_column(col))
}

fn missing_column(col: Column) -> Error {
    Error::Arrow(ArrowError::SchemaError(format!(
        "column `{}` missing or not of its declared type",
        col.name()
    )))
}

fn str_at(a: &StringArray, i: usize) -> Option<String> {
    a.is_valid(i).then(|| a.value(i).to_string())
}

fn int_at(a: &Int32Array, i: usize) -> Option<i32> {
    a.is_valid(i).then(|| a.value(i))
}

/// Pretty-printed table, truncated to `limit` rows when given.
pub fn render_table(path: &Path, limit: Option<usize>) -> Result<String> {
    let mut batches = read_batches(path)?;
    if let Some(limit) = limit {
        let mut left = limit;
        batches = batches
            .into_iter()
            .filter_map(|b| {
                let take = left.min(b.num_rows());
                left -= take;
                (take > 0).then(|| b.slice(0, take))
            })
            .collect();
    }
    if batches.is_empty() {
        return Ok(format!("(empty table: {})", path.display()));
    }
    Ok(arrow::util::pretty::pretty_format_batches(&batches)?.to_string())
}
