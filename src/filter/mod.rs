//! Quality-control filters for expression matrices.
//!
//! - **sample_match**: drop samples whose metadata attribute lacks a substring
//! - **magnitude**: zero-fill missing cells, drop samples with outlying sums
//! - **deviation**: mark per-sample outlier cells, drop genes holding them

pub mod deviation;
pub mod magnitude;
pub mod sample_match;

pub use deviation::{filter_deviation, DeviationFilterResult, PreexistingMissing, SampleBounds};
pub use magnitude::{filter_magnitude, median, MagnitudeFilterResult};
pub use sample_match::{filter_sample_match, SampleMatchResult};
