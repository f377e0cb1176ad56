//! Bulk term files consumed by the verbatim index builder.
//!
//! A [`TermSource`] is read in chunks and written to numbered Parquet batch
//! files (`Terms_1_100000.parquet`, `Terms_100001_200000.parquet`, ...).

mod batch_file;

pub use batch_file::*;

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::db::DbError;
use crate::models::TermRecord;

/// Term file errors.
#[derive(Error, Debug)]
pub enum TermsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Terms folder not found: {}", .0.display())]
    MissingFolder(PathBuf),

    #[error("Column '{column}' missing or mistyped in {}", .path.display())]
    Schema { path: PathBuf, column: String },

    #[error("Batch size must be positive")]
    InvalidBatchSize,
}

pub type TermsResult<T> = Result<T, TermsError>;

/// A vocabulary that can be read as (concept_id, term, concept_name) rows.
pub trait TermSource {
    /// Read up to `limit` rows starting at row `offset`, in a stable order.
    fn fetch_terms(&self, offset: usize, limit: usize) -> TermsResult<Vec<TermRecord>>;
}

impl TermSource for [TermRecord] {
    fn fetch_terms(&self, offset: usize, limit: usize) -> TermsResult<Vec<TermRecord>> {
        let start = offset.min(self.len());
        let end = offset.saturating_add(limit).min(self.len());
        Ok(self[start..end].to_vec())
    }
}

/// Stream a term source into batch files of `batch_size` rows.
///
/// Returns the written file paths in order.
pub fn download_terms<S: TermSource + ?Sized>(
    source: &S,
    folder: &Path,
    batch_size: usize,
) -> TermsResult<Vec<PathBuf>> {
    if batch_size == 0 {
        return Err(TermsError::InvalidBatchSize);
    }
    std::fs::create_dir_all(folder)?;

    let mut written = Vec::new();
    let mut offset = 0;
    loop {
        let chunk = source.fetch_terms(offset, batch_size)?;
        if chunk.is_empty() {
            break;
        }

        let path = folder.join(batch_file_name(offset + 1, offset + chunk.len()));
        write_term_file(&path, &chunk)?;
        log::info!("Wrote {} terms to {}", chunk.len(), path.display());

        offset += chunk.len();
        written.push(path);
        if chunk.len() < batch_size {
            break;
        }
    }

    log::info!("Downloaded {} terms in {} files", offset, written.len());
    Ok(written)
}
