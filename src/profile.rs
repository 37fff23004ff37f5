//! Pre-filter profiling of an expression matrix.

use crate::data::ExpressionMatrix;
use crate::filter::median;
use serde::{Deserialize, Serialize};

/// Summary of the characteristics the filters act on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatrixProfile {
    /// Number of genes.
    pub n_genes: usize,
    /// Number of samples.
    pub n_samples: usize,
    /// Number of missing cells.
    pub n_missing: usize,
    /// Number of genes with at least one missing cell.
    pub n_genes_with_missing: usize,
    /// Sum per sample, missing cells counted as zero.
    pub sample_sums: Vec<f64>,
    /// Median of the sample sums.
    pub median_sum: Option<f64>,
    /// Largest |log10(sum / median)| over samples.
    ///
    /// Any order-of-magnitude threshold at or above this keeps every sample.
    /// `None` when the median is zero or a sum is not positive.
    pub max_log10_ratio: Option<f64>,
}

impl MatrixProfile {
    /// Fraction of cells that are missing.
    pub fn missing_fraction(&self) -> f64 {
        let total = self.n_genes * self.n_samples;
        if total == 0 {
            0.0
        } else {
            self.n_missing as f64 / total as f64
        }
    }
}

impl std::fmt::Display for MatrixProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Expression Matrix Profile")?;
        writeln!(f, "  Genes:   {}", self.n_genes)?;
        writeln!(f, "  Samples: {}", self.n_samples)?;
        writeln!(
            f,
            "  Missing cells: {} ({:.2}%)",
            self.n_missing,
            self.missing_fraction() * 100.0
        )?;
        writeln!(f, "  Genes with missing cells: {}", self.n_genes_with_missing)?;
        match self.median_sum {
            Some(m) => writeln!(f, "  Median sample sum: {:.3}", m)?,
            None => writeln!(f, "  Median sample sum: n/a")?,
        }
        match self.max_log10_ratio {
            Some(r) => writeln!(f, "  Max |log10 ratio to median|: {:.3}", r)?,
            None => writeln!(f, "  Max |log10 ratio to median|: undefined")?,
        }
        Ok(())
    }
}

/// Profile an expression matrix.
pub fn profile_matrix(matrix: &ExpressionMatrix) -> MatrixProfile {
    let sample_sums = matrix.col_sums();
    let median_sum = median(&sample_sums);

    let max_log10_ratio = median_sum.filter(|&m| m > 0.0).and_then(|m| {
        sample_sums.iter().try_fold(0.0f64, |acc, &sum| {
            (sum > 0.0).then(|| acc.max((sum / m).log10().abs()))
        })
    });

    MatrixProfile {
        n_genes: matrix.n_genes(),
        n_samples: matrix.n_samples(),
        n_missing: matrix.n_missing(),
        n_genes_with_missing: (0..matrix.n_genes())
            .filter(|&row| matrix.row_has_missing(row))
            .count(),
        sample_sums,
        median_sum,
        max_log10_ratio,
    }
}
