//! Sample filtering by a substring match on sample metadata.

use crate::data::{ExpressionMatrix, SampleMetadataIndex, ShapeDelta};
use crate::error::Result;
use log::{debug, info};
use serde::{Deserialize, Serialize};

/// Stage name used in shape-delta reports.
pub const STAGE_NAME: &str = "Sample information filtering";

/// Result of sample-match filtering with statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleMatchResult {
    /// Substring each retained sample's attribute contains.
    pub match_value: String,
    /// IDs of removed samples, in matrix order.
    pub removed_samples: Vec<String>,
    /// Shape change across the stage.
    pub delta: ShapeDelta,
}

impl std::fmt::Display for SampleMatchResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{}", self.delta)?;
        writeln!(f, "  Match value: {:?}", self.match_value)?;
        if !self.removed_samples.is_empty() {
            writeln!(f, "  Removed: {:?}", self.removed_samples)?;
        }
        Ok(())
    }
}

/// Drop every sample whose metadata attribute does not contain `match_value`.
///
/// Every sample is looked up and judged before any column is removed, so a
/// missing or ambiguous metadata entry fails the stage with the matrix
/// untouched.
///
/// # Arguments
/// * `matrix` - The expression matrix, filtered in place
/// * `index` - Sample id to attribute lookup
/// * `match_value` - Substring an attribute must contain for its sample to be kept
pub fn filter_sample_match(
    matrix: &mut ExpressionMatrix,
    index: &SampleMetadataIndex,
    match_value: &str,
) -> Result<SampleMatchResult> {
    let before = matrix.shape();

    let mut keep_indices = Vec::with_capacity(matrix.n_samples());
    let mut removed_samples = Vec::new();
    for (col, sample_id) in matrix.sample_ids().iter().enumerate() {
        let attribute = index.lookup(sample_id)?;
        if attribute.contains(match_value) {
            keep_indices.push(col);
        } else {
            debug!("Dropping sample {} (attribute {:?})", sample_id, attribute);
            removed_samples.push(sample_id.clone());
        }
    }

    matrix.retain_samples(&keep_indices)?;

    let delta = ShapeDelta::between(STAGE_NAME, before, matrix);
    info!("{}", delta);

    Ok(SampleMatchResult {
        match_value: match_value.to_string(),
        removed_samples,
        delta,
    })
}
