//! Parquet term batch files.
//!
//! Every file has exactly three columns: `concept_id` (Int64), `term` (Utf8)
//! and `concept_name` (Utf8).

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use arrow::array::{Array, ArrayRef, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;

use super::{TermsError, TermsResult};
use crate::models::TermRecord;

pub const CONCEPT_ID_COLUMN: &str = "concept_id";
pub const TERM_COLUMN: &str = "term";
pub const CONCEPT_NAME_COLUMN: &str = "concept_name";

static TERM_SCHEMA: LazyLock<SchemaRef> = LazyLock::new(|| {
    Arc::new(Schema::new(vec![
        Field::new(CONCEPT_ID_COLUMN, DataType::Int64, false),
        Field::new(TERM_COLUMN, DataType::Utf8, false),
        Field::new(CONCEPT_NAME_COLUMN, DataType::Utf8, false),
    ]))
});

/// Arrow schema shared by all term files.
pub fn term_schema() -> SchemaRef {
    TERM_SCHEMA.clone()
}

/// File name for a batch holding rows `first..=last` (1-based).
pub fn batch_file_name(first: usize, last: usize) -> String {
    format!("Terms_{}_{}.parquet", first, last)
}

/// Write term records to a Parquet file.
pub fn write_term_file(path: &Path, records: &[TermRecord]) -> TermsResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let concept_ids: ArrayRef = Arc::new(Int64Array::from_iter_values(
        records.iter().map(|r| r.concept_id),
    ));
    let terms: ArrayRef = Arc::new(StringArray::from_iter_values(
        records.iter().map(|r| r.term.as_str()),
    ));
    let names: ArrayRef = Arc::new(StringArray::from_iter_values(
        records.iter().map(|r| r.concept_name.as_str()),
    ));
    let batch = RecordBatch::try_new(term_schema(), vec![concept_ids, terms, names])?;

    let file = File::create(path)?;
    let mut writer = ArrowWriter::try_new(file, term_schema(), None)?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}

/// Read all term records from a Parquet file. Rows with a null cell are skipped.
pub fn read_term_file(path: &Path) -> TermsResult<Vec<TermRecord>> {
    let file = File::open(path)?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;

    let mut records = Vec::new();
    for batch in reader {
        let batch = batch?;
        let concept_ids = column::<Int64Array>(&batch, CONCEPT_ID_COLUMN, path)?;
        let terms = column::<StringArray>(&batch, TERM_COLUMN, path)?;
        let names = column::<StringArray>(&batch, CONCEPT_NAME_COLUMN, path)?;

        records.reserve(batch.num_rows());
        for row in 0..batch.num_rows() {
            if concept_ids.is_null(row) || terms.is_null(row) || names.is_null(row) {
                continue;
            }
            records.push(TermRecord::new(
                concept_ids.value(row),
                terms.value(row),
                names.value(row),
            ));
        }
    }
    Ok(records)
}

fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str, path: &Path) -> TermsResult<&'a T> {
    batch
        .column_by_name(name)
        .and_then(|col| col.as_any().downcast_ref::<T>())
        .ok_or_else(|| TermsError::Schema {
            path: path.to_path_buf(),
            column: name.to_string(),
        })
}

/// List Parquet files in a folder, sorted by name.
pub fn list_term_files(folder: &Path) -> TermsResult<Vec<PathBuf>> {
    if !folder.is_dir() {
        return Err(TermsError::MissingFolder(folder.to_path_buf()));
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(folder)? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "parquet") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
