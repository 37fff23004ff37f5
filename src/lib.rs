//! Expression Quality Control Library
//!
//! Prepares a gene-expression matrix for co-expression module analysis by
//! applying an ordered sequence of quality-control filters.
//!
//! # Overview
//!
//! The library is organized into modules:
//!
//! - **data**: Core data structures (ExpressionMatrix, SampleSheet, SampleMetadataIndex)
//! - **filter**: Sample information, NA/sum and standard deviation filters
//! - **pipeline**: Fixed-order pipeline execution and hand-off to downstream tools
//! - **profile**: Pre-filter summaries for choosing thresholds
//!
//! # Example
//!
//! ```no_run
//! use expression_qc::prelude::*;
//!
//! // Load data
//! let matrix = ExpressionMatrix::from_tsv("expression.txt").unwrap();
//! let sheet = SampleSheet::from_tsv("sample info.txt").unwrap();
//!
//! // Run the QC pipeline
//! let filters = FilterConfig::disabled()
//!     .match_samples("Sample_number", "areaX")
//!     .magnitude(2.0)
//!     .deviations(2.0);
//! let outcome = QcPipeline::new(filters)
//!     .run_with_sheet(matrix, Some(&sheet))
//!     .unwrap();
//!
//! outcome.matrix.to_tsv("filtered.tsv").unwrap();
//! ```

pub mod data;
pub mod error;
pub mod filter;
pub mod pipeline;
pub mod profile;

/// Convenient re-exports for common usage.
pub mod prelude {
    pub use crate::data::{ExpressionMatrix, SampleMetadataIndex, SampleSheet, ShapeDelta};
    pub use crate::error::{QcError, Result};
    pub use crate::filter::{
        filter_deviation, filter_magnitude, filter_sample_match, DeviationFilterResult,
        MagnitudeFilterResult, PreexistingMissing, SampleMatchResult,
    };
    pub use crate::pipeline::{
        ConfigWarning, FilterConfig, MatchRule, MatrixSink, PipelineConfig, PipelineStage,
        QcOutcome, QcPipeline, QcReport, StageReport, TsvSink,
    };
    pub use crate::profile::{profile_matrix, MatrixProfile};
}
