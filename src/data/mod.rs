//! Data structures for expression quality control.

mod expression_matrix;
mod metadata;
mod shape;

pub use expression_matrix::ExpressionMatrix;
pub use metadata::{SampleMetadataIndex, SampleSheet};
pub use shape::ShapeDelta;
