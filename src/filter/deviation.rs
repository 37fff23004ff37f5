//! Per-sample standard deviation filtering of outlier measurements.
//!
//! Cells lying outside `mean ± k·sd` of their sample are marked missing, then
//! every gene with a missing cell is dropped. Genes that were already missing
//! a value before this stage are dropped too unless
//! [`PreexistingMissing::Keep`] is selected. This happens when no upstream
//! zero-fill ran. The result counts the two removal reasons separately.

use crate::data::{ExpressionMatrix, ShapeDelta};
use crate::error::{QcError, Result};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

/// Stage name used in shape-delta reports.
pub const STAGE_NAME: &str = "Standard deviation filtering";

/// How genes carrying missing values from earlier stages are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreexistingMissing {
    /// Drop them along with the outlier genes.
    #[default]
    Drop,
    /// Keep them; only genes with a cell marked by this stage are dropped.
    Keep,
}

/// Per-sample bounds used to mark outliers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SampleBounds {
    pub mean: f64,
    pub std_dev: f64,
    pub lower: f64,
    pub upper: f64,
}

impl SampleBounds {
    /// Bounds over the present values of a sample; `None` if it has none.
    pub fn from_values(values: &[f64], num_deviations: f64) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let mean = values.iter().mean();
        let std_dev = values.iter().population_std_dev();
        Some(Self {
            mean,
            std_dev,
            lower: mean - num_deviations * std_dev,
            upper: mean + num_deviations * std_dev,
        })
    }

    /// True if `value` lies strictly outside `[lower, upper]`.
    #[inline]
    pub fn is_outlier(&self, value: f64) -> bool {
        value < self.lower || value > self.upper
    }
}

/// Result of deviation filtering with statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviationFilterResult {
    /// Deviation-count threshold applied.
    pub num_deviations: f64,
    /// Policy applied to genes with pre-existing missing values.
    pub preexisting_missing: PreexistingMissing,
    /// Number of cells marked missing by this stage.
    pub n_cells_marked: usize,
    /// Genes removed because a cell was marked by this stage.
    pub removed_for_deviation: Vec<String>,
    /// Genes removed only because they held a missing value on entry.
    pub removed_for_missing: Vec<String>,
    /// Shape change across the stage.
    pub delta: ShapeDelta,
}

impl std::fmt::Display for DeviationFilterResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{}", self.delta)?;
        writeln!(f, "  Cells marked as outliers: {}", self.n_cells_marked)?;
        writeln!(f, "  Genes removed for deviation: {}", self.removed_for_deviation.len())?;
        writeln!(
            f,
            "  Genes removed for pre-existing missing values: {}",
            self.removed_for_missing.len()
        )?;
        Ok(())
    }
}

/// Mark outlier cells as missing, then drop genes holding missing cells.
///
/// Mean and population standard deviation are computed per sample over the
/// values present at entry; missing cells are excluded rather than counted
/// as zero. A sample with no present values marks nothing.
///
/// # Arguments
/// * `matrix` - The expression matrix, filtered in place
/// * `num_deviations` - Multiplier `k` on the standard deviation (positive)
/// * `preexisting_missing` - Whether genes already missing a value are dropped
pub fn filter_deviation(
    matrix: &mut ExpressionMatrix,
    num_deviations: f64,
    preexisting_missing: PreexistingMissing,
) -> Result<DeviationFilterResult> {
    if !num_deviations.is_finite() || num_deviations <= 0.0 {
        return Err(QcError::InvalidParameter(
            "Number of deviations must be positive".to_string(),
        ));
    }

    let before = matrix.shape();
    let missing_on_entry: Vec<bool> = (0..matrix.n_genes())
        .map(|row| matrix.row_has_missing(row))
        .collect();
    let n_missing_on_entry = missing_on_entry.iter().filter(|&&m| m).count();
    if n_missing_on_entry > 0 {
        warn!(
            "{} genes hold missing values before deviation filtering",
            n_missing_on_entry
        );
    }

    // Bounds come from the unmarked matrix so marking one sample cannot
    // shift another.
    let bounds: Vec<Option<SampleBounds>> = (0..matrix.n_samples())
        .map(|col| SampleBounds::from_values(&matrix.col_present(col), num_deviations))
        .collect();

    let mut marked = vec![false; matrix.n_genes()];
    let mut n_cells_marked = 0;
    for (col, bounds) in bounds.iter().enumerate() {
        let Some(bounds) = bounds else {
            continue;
        };
        debug!(
            "Sample {}: mean {:.4} sd {:.4} bounds [{:.4}, {:.4}]",
            matrix.sample_ids()[col],
            bounds.mean,
            bounds.std_dev,
            bounds.lower,
            bounds.upper
        );
        for (row, row_marked) in marked.iter_mut().enumerate() {
            if let Some(value) = matrix.get(row, col) {
                if bounds.is_outlier(value) {
                    matrix.set_missing(row, col);
                    *row_marked = true;
                    n_cells_marked += 1;
                }
            }
        }
    }

    let mut keep_indices = Vec::with_capacity(matrix.n_genes());
    let mut removed_for_deviation = Vec::new();
    let mut removed_for_missing = Vec::new();
    for (row, gene_id) in matrix.gene_ids().iter().enumerate() {
        if marked[row] {
            removed_for_deviation.push(gene_id.clone());
        } else if missing_on_entry[row] && preexisting_missing == PreexistingMissing::Drop {
            removed_for_missing.push(gene_id.clone());
        } else {
            keep_indices.push(row);
        }
    }

    matrix.retain_genes(&keep_indices)?;

    let delta = ShapeDelta::between(STAGE_NAME, before, matrix);
    info!("{}", delta);
    if !removed_for_missing.is_empty() {
        info!(
            "\t{} genes removed for deviation, {} for pre-existing missing values",
            removed_for_deviation.len(),
            removed_for_missing.len()
        );
    }

    Ok(DeviationFilterResult {
        num_deviations,
        preexisting_missing,
        n_cells_marked,
        removed_for_deviation,
        removed_for_missing,
        delta,
    })
}
