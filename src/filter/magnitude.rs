//! Sample filtering by total signal relative to the cohort median.

use crate::data::{ExpressionMatrix, ShapeDelta};
use crate::error::{QcError, Result};
use log::{debug, error, info};
use serde::{Deserialize, Serialize};

/// Stage name used in shape-delta reports.
pub const STAGE_NAME: &str = "NA/Sum filtering";

/// Result of magnitude filtering with statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MagnitudeFilterResult {
    /// Order-of-magnitude threshold applied.
    pub threshold: f64,
    /// Number of missing cells replaced with zero.
    pub n_filled: usize,
    /// Median of the per-sample sums, taken before any removal.
    pub median_sum: f64,
    /// Sample sums, in pre-filter sample order.
    pub sample_sums: Vec<f64>,
    /// IDs of removed samples.
    pub removed_samples: Vec<String>,
    /// Shape change across the stage.
    pub delta: ShapeDelta,
}

impl std::fmt::Display for MagnitudeFilterResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{}", self.delta)?;
        writeln!(f, "  Missing cells zero-filled: {}", self.n_filled)?;
        writeln!(f, "  Median sample sum: {:.3}", self.median_sum)?;
        writeln!(
            f,
            "  Accepted ratio range: {:e} - {:e}",
            10f64.powf(self.threshold).recip(),
            10f64.powf(self.threshold)
        )?;
        if !self.removed_samples.is_empty() {
            writeln!(f, "  Removed: {:?}", self.removed_samples)?;
        }
        Ok(())
    }
}

/// Median of a slice; the mean of the two middle values for even lengths.
///
/// Returns `None` for an empty slice.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let n = sorted.len();
    Some(if n % 2 == 0 {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    } else {
        sorted[n / 2]
    })
}

/// Zero-fill missing cells, then drop samples whose sum is out of range.
///
/// A sample is removed when `sum / median > 10^threshold` or
/// `sum / median < 10^-threshold`, where `median` is the median of all
/// sample sums before removal. Both comparisons are strict.
///
/// The zero-fill is committed to `matrix` and stays in effect for later
/// stages.
///
/// # Arguments
/// * `matrix` - The expression matrix, filtered in place
/// * `threshold` - Order-of-magnitude threshold (positive)
///
/// # Errors
/// `UndefinedRatio` if the median sum is zero or any sample sum is not
/// finite. The zero-fill has already been applied by then.
pub fn filter_magnitude(
    matrix: &mut ExpressionMatrix,
    threshold: f64,
) -> Result<MagnitudeFilterResult> {
    if !threshold.is_finite() || threshold <= 0.0 {
        return Err(QcError::InvalidParameter(
            "Order of magnitude threshold must be positive".to_string(),
        ));
    }

    let before = matrix.shape();
    let n_filled = matrix.fill_missing(0.0);

    let sample_sums = matrix.col_sums();
    let median_sum = median(&sample_sums)
        .ok_or_else(|| QcError::EmptyData("No samples to filter by sum".to_string()))?;
    if let Some((sample_id, sum)) = matrix
        .sample_ids()
        .iter()
        .zip(&sample_sums)
        .find(|(_, sum)| !sum.is_finite())
    {
        error!("Sample {} has a non-finite sum ({})", sample_id, sum);
        return Err(QcError::UndefinedRatio);
    }
    if median_sum == 0.0 {
        return Err(QcError::UndefinedRatio);
    }

    let upper = 10f64.powf(threshold);
    let lower = upper.recip();

    let mut keep_indices = Vec::with_capacity(sample_sums.len());
    let mut removed_samples = Vec::new();
    for (col, (&sum, sample_id)) in sample_sums.iter().zip(matrix.sample_ids()).enumerate() {
        let ratio = sum / median_sum;
        debug!("Sample {}: sum {} ratio {}", sample_id, sum, ratio);
        if ratio > upper || ratio < lower {
            removed_samples.push(sample_id.clone());
        } else {
            keep_indices.push(col);
        }
    }

    matrix.retain_samples(&keep_indices)?;

    let delta = ShapeDelta::between(STAGE_NAME, before, matrix);
    info!("{}", delta);

    Ok(MagnitudeFilterResult {
        threshold,
        n_filled,
        median_sum,
        sample_sums,
        removed_samples,
        delta,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// One gene per sample, so each column sum is the given value.
    fn matrix_with_sums(sums: &[f64]) -> ExpressionMatrix {
        let sample_ids: Vec<String> = (1..=sums.len()).map(|i| format!("S{}", i)).collect();
        let row: Vec<Option<f64>> = sums.iter().map(|&s| Some(s)).collect();
        ExpressionMatrix::from_rows(vec!["g1".into()], sample_ids, &[row]).unwrap()
    }

    #[test]
    fn test_median() {
        assert_eq!(median(&[]), None);
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), Some(2.5));
    }

    #[test]
    fn test_upper_boundary_is_strict() {
        let mut mat = matrix_with_sums(&[100.0, 100.0, 100.0, 100.0, 10000.0]);
        let result = filter_magnitude(&mut mat, 2.0).unwrap();

        assert_eq!(result.median_sum, 100.0);
        assert_eq!(mat.n_samples(), 5);
        assert!(result.removed_samples.is_empty());
    }

    #[test]
    fn test_above_upper_boundary_dropped() {
        let mut mat = matrix_with_sums(&[100.0, 100.0, 100.0, 100.0, 10001.0]);
        let result = filter_magnitude(&mut mat, 2.0).unwrap();

        assert_eq!(mat.sample_ids(), &["S1", "S2", "S3", "S4"]);
        assert_eq!(result.removed_samples, vec!["S5"]);
    }

    #[test]
    fn test_lower_boundary() {
        let mut mat = matrix_with_sums(&[100.0, 100.0, 100.0, 1.0, 0.5]);
        filter_magnitude(&mut mat, 2.0).unwrap();

        // ratio 0.01 is kept, 0.005 is dropped
        assert_eq!(mat.sample_ids(), &["S1", "S2", "S3", "S4"]);
    }

    #[test]
    fn test_median_uses_pre_removal_sums() {
        // median of [1, 10, 100, 1000, 100000] is 100; only the last is beyond 10x
        let mut mat = matrix_with_sums(&[1.0, 10.0, 100.0, 1000.0, 100000.0]);
        let result = filter_magnitude(&mut mat, 1.0).unwrap();

        assert_eq!(result.median_sum, 100.0);
        assert_eq!(mat.sample_ids(), &["S2", "S3", "S4"]);
        assert_eq!(result.removed_samples, vec!["S1", "S5"]);
    }

    #[test]
    fn test_missing_values_zero_filled() {
        let mut mat = ExpressionMatrix::from_rows(
            vec!["g1".into(), "g2".into()],
            vec!["S1".into(), "S2".into()],
            &[vec![Some(5.0), None], vec![None, Some(5.0)]],
        )
        .unwrap();

        let result = filter_magnitude(&mut mat, 2.0).unwrap();

        assert_eq!(result.n_filled, 2);
        assert_eq!(mat.n_missing(), 0);
        assert_eq!(mat.get(0, 1), Some(0.0));
        assert_eq!(mat.get(1, 0), Some(0.0));
    }

    #[test]
    fn test_zero_median_is_error() {
        let mut mat = matrix_with_sums(&[0.0, 0.0, 5.0]);
        assert!(matches!(
            filter_magnitude(&mut mat, 2.0),
            Err(QcError::UndefinedRatio)
        ));
    }

    #[test]
    fn test_non_finite_sum_is_error() {
        let mut mat = ExpressionMatrix::from_rows(
            vec!["g1".into(), "g2".into(), "g3".into()],
            vec!["S1".into(), "S2".into(), "S3".into()],
            &[
                vec![Some(10.0), Some(f64::NAN), Some(10.0)],
                vec![Some(10.0), Some(10.0), Some(f64::INFINITY)],
                vec![Some(10.0), Some(10.0), Some(10.0)],
            ],
        )
        .unwrap();

        let result = filter_magnitude(&mut mat, 2.0);

        assert!(matches!(result, Err(QcError::UndefinedRatio)));
        assert_eq!(mat.n_samples(), 3);
    }

    #[test]
    fn test_single_infinite_sum_is_error() {
        // median stays finite, but the outlying sum is still refused
        let mut mat = matrix_with_sums(&[100.0, 100.0, 100.0, f64::INFINITY]);
        assert!(matches!(
            filter_magnitude(&mut mat, 2.0),
            Err(QcError::UndefinedRatio)
        ));
    }

    #[test]
    fn test_invalid_threshold() {
        let mut mat = matrix_with_sums(&[1.0, 2.0]);
        assert!(filter_magnitude(&mut mat, 0.0).is_err());
        assert!(filter_magnitude(&mut mat, -1.0).is_err());
        assert!(filter_magnitude(&mut mat, f64::NAN).is_err());
    }
}
