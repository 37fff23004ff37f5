//! Before/after shape records for filtering stages.

use crate::data::ExpressionMatrix;
use serde::{Deserialize, Serialize};

/// Change in column (sample) and row (gene) counts across one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShapeDelta {
    /// Display name of the stage.
    pub stage: String,
    pub columns_before: usize,
    pub rows_before: usize,
    pub columns_after: usize,
    pub rows_after: usize,
}

impl ShapeDelta {
    /// Record the change between a stored `(columns, rows)` shape and a matrix.
    pub fn between(stage: &str, before: (usize, usize), after: &ExpressionMatrix) -> Self {
        let (columns_after, rows_after) = after.shape();
        Self {
            stage: stage.to_string(),
            columns_before: before.0,
            rows_before: before.1,
            columns_after,
            rows_after,
        }
    }

    /// Number of columns removed.
    pub fn columns_removed(&self) -> usize {
        self.columns_before - self.columns_after
    }

    /// Number of rows removed.
    pub fn rows_removed(&self) -> usize {
        self.rows_before - self.rows_after
    }

    /// True if the stage left no columns or no rows.
    pub fn is_empty_after(&self) -> bool {
        self.columns_after == 0 || self.rows_after == 0
    }
}

impl std::fmt::Display for ShapeDelta {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{}:", self.stage)?;
        write!(
            f,
            "\tColumns changed from {} to {}, rows changed from {} to {}",
            self.columns_before, self.columns_after, self.rows_before, self.rows_after
        )
    }
}
