//! Hand-off of the filtered matrix to downstream analysis.

use crate::data::ExpressionMatrix;
use crate::error::Result;
use std::path::{Path, PathBuf};

/// Receives the matrix produced by a completed run.
pub trait MatrixSink {
    fn accept(&mut self, matrix: &ExpressionMatrix) -> Result<()>;
}

/// Writes the matrix as a tab-separated table for external tools.
#[derive(Debug, Clone)]
pub struct TsvSink {
    path: PathBuf,
}

impl TsvSink {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MatrixSink for TsvSink {
    fn accept(&mut self, matrix: &ExpressionMatrix) -> Result<()> {
        log::info!(
            "Writing {} genes x {} samples to {:?}",
            matrix.n_genes(),
            matrix.n_samples(),
            self.path
        );
        matrix.to_tsv(&self.path)
    }
}
