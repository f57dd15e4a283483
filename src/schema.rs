//! Column schema of the consolidated table.
//!
//! Staged JSON is coerced to these columns on the way into Parquet, and the
//! Parquet file carries them in this order. Every column is nullable.

use std::sync::{Arc, LazyLock};

use arrow::datatypes::{DataType, Field, Schema, SchemaRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Utf8,
    Int32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    OrganizationName,
    RepositoryId,
    RepositoryName,
    RepositoryOwner,
    NumPrs,
    NumPrsMerged,
    MergedAt,
    IsCompliant,
}

pub const COLUMNS: [Column; 8] = [
    Column::OrganizationName,
    Column::RepositoryId,
    Column::RepositoryName,
    Column::RepositoryOwner,
    Column::NumPrs,
    Column::NumPrsMerged,
    Column::MergedAt,
    Column::IsCompliant,
];

impl Column {
    pub fn name(self) -> &'static str {
        match self {
            Column::OrganizationName => "organization_name",
            Column::RepositoryId => "repository_id",
            Column::RepositoryName => "repository_name",
            Column::RepositoryOwner => "repository_owner",
            Column::NumPrs => "num_prs",
            Column::NumPrsMerged => "num_prs_merged",
            Column::MergedAt => "merged_at",
            Column::IsCompliant => "is_compliant",
        }
    }

    pub fn column_type(self) -> ColumnType {
        match self {
            Column::NumPrs | Column::NumPrsMerged => ColumnType::Int32,
            _ => ColumnType::Utf8,
        }
    }

    fn field(self) -> Field {
        let data_type = match self.column_type() {
            ColumnType::Utf8 => DataType::Utf8,
            ColumnType::Int32 => DataType::Int32,
        };
        Field::new(self.name(), data_type, true)
    }
}

static SCHEMA: LazyLock<SchemaRef> =
    LazyLock::new(|| Arc::new(Schema::new(COLUMNS.map(Column::field).to_vec())));

/// The process-wide table schema.
pub fn table_schema() -> SchemaRef {
    Arc::clone(&SCHEMA)
}
