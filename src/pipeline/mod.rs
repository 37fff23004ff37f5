//! Pipeline composition and execution for expression quality control.

mod runner;
pub mod sink;

pub use runner::{
    ConfigWarning, FilterConfig, MatchRule, PipelineConfig, PipelineStage, QcOutcome, QcPipeline,
    QcReport, StageReport,
};
pub use sink::{MatrixSink, TsvSink};
