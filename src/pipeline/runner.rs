//! Pipeline runner for the fixed sequence of quality-control stages.

use crate::data::{ExpressionMatrix, SampleMetadataIndex, SampleSheet, ShapeDelta};
use crate::error::{QcError, Result};
use crate::filter::{
    deviation, filter_deviation, filter_magnitude, filter_sample_match, magnitude, sample_match,
    DeviationFilterResult, MagnitudeFilterResult, PreexistingMissing, SampleMatchResult,
};
use crate::pipeline::sink::MatrixSink;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};

/// Substring rule for sample information filtering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRule {
    /// Name of the sample-information row holding sample identifiers.
    pub field: String,
    /// Substring an attribute must contain for its sample to be kept.
    pub value: String,
}

/// Filter settings for one run.
///
/// A `None` stage setting disables that stage. Keys missing from a YAML
/// document take their [`Default`] values, which enable every stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Sample information filtering.
    pub sample_match: Option<MatchRule>,
    /// NA/sum filtering, as an order of magnitude around the median sum.
    pub order_of_magnitude_threshold: Option<f64>,
    /// Standard deviation filtering, as a multiple of the sample sd.
    pub num_deviations_threshold: Option<f64>,
    /// Treatment of genes still missing values when deviation filtering runs.
    pub preexisting_missing: PreexistingMissing,
}

impl Default for MatchRule {
    fn default() -> Self {
        Self {
            field: "Sample_number".to_string(),
            value: "areaX".to_string(),
        }
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            sample_match: Some(MatchRule::default()),
            order_of_magnitude_threshold: Some(2.0),
            num_deviations_threshold: Some(2.0),
            preexisting_missing: PreexistingMissing::Drop,
        }
    }
}

impl FilterConfig {
    /// A configuration with every stage disabled.
    pub fn disabled() -> Self {
        Self {
            sample_match: None,
            order_of_magnitude_threshold: None,
            num_deviations_threshold: None,
            preexisting_missing: PreexistingMissing::Drop,
        }
    }

    /// Enable sample information filtering.
    pub fn match_samples(mut self, field: &str, value: &str) -> Self {
        self.sample_match = Some(MatchRule {
            field: field.to_string(),
            value: value.to_string(),
        });
        self
    }

    /// Enable NA/sum filtering.
    pub fn magnitude(mut self, threshold: f64) -> Self {
        self.order_of_magnitude_threshold = Some(threshold);
        self
    }

    /// Enable standard deviation filtering.
    pub fn deviations(mut self, threshold: f64) -> Self {
        self.num_deviations_threshold = Some(threshold);
        self
    }

    /// Set the treatment of pre-existing missing values.
    pub fn preexisting_missing(mut self, policy: PreexistingMissing) -> Self {
        self.preexisting_missing = policy;
        self
    }

    /// Check thresholds and the match rule.
    pub fn validate(&self) -> Result<()> {
        if let Some(rule) = &self.sample_match {
            if rule.field.is_empty() {
                return Err(QcError::InvalidParameter(
                    "Match field must not be empty".to_string(),
                ));
            }
        }
        for (name, value) in [
            ("order_of_magnitude_threshold", self.order_of_magnitude_threshold),
            ("num_deviations_threshold", self.num_deviations_threshold),
        ] {
            if let Some(v) = value {
                if !v.is_finite() || v <= 0.0 {
                    return Err(QcError::InvalidParameter(format!(
                        "{} must be positive, got {}",
                        name, v
                    )));
                }
            }
        }
        Ok(())
    }

    /// Settings that run but change the meaning of the output.
    pub fn warnings(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        if self.num_deviations_threshold.is_some()
            && self.order_of_magnitude_threshold.is_none()
            && self.preexisting_missing == PreexistingMissing::Drop
        {
            warnings.push(ConfigWarning::DeviationWithoutZeroFill);
        }
        warnings
    }
}

/// A configuration conflict that is reported but not fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigWarning {
    /// Deviation filtering runs without the NA/sum stage's zero-fill, so
    /// genes with unmeasured values are dropped alongside outliers.
    DeviationWithoutZeroFill,
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigWarning::DeviationWithoutZeroFill => write!(
                f,
                "Standard deviation filtering is enabled without NA/sum filtering; \
                 genes with missing values will be removed as if they were outliers"
            ),
        }
    }
}

/// Pipeline configuration for serialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Name of the pipeline.
    pub name: String,
    /// Description.
    #[serde(default)]
    pub description: Option<String>,
    /// Filter settings.
    #[serde(default)]
    pub filters: FilterConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            name: "unnamed".to_string(),
            description: None,
            filters: FilterConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load from YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(QcError::from)
    }

    /// Save to YAML string.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(QcError::from)
    }
}

/// Position of a run in the fixed stage order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PipelineStage {
    Loaded,
    MatchFiltered,
    MagnitudeFiltered,
    DeviationFiltered,
}

impl PipelineStage {
    /// The following stage; `DeviationFiltered` is terminal.
    pub fn next(self) -> Self {
        match self {
            PipelineStage::Loaded => PipelineStage::MatchFiltered,
            PipelineStage::MatchFiltered => PipelineStage::MagnitudeFiltered,
            PipelineStage::MagnitudeFiltered | PipelineStage::DeviationFiltered => {
                PipelineStage::DeviationFiltered
            }
        }
    }
}

/// Result of one executed stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum StageReport {
    SampleMatch(SampleMatchResult),
    Magnitude(MagnitudeFilterResult),
    Deviation(DeviationFilterResult),
}

impl StageReport {
    /// Shape change across the stage.
    pub fn delta(&self) -> &ShapeDelta {
        match self {
            StageReport::SampleMatch(r) => &r.delta,
            StageReport::Magnitude(r) => &r.delta,
            StageReport::Deviation(r) => &r.delta,
        }
    }
}

impl std::fmt::Display for StageReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageReport::SampleMatch(r) => std::fmt::Display::fmt(r, f),
            StageReport::Magnitude(r) => std::fmt::Display::fmt(r, f),
            StageReport::Deviation(r) => std::fmt::Display::fmt(r, f),
        }
    }
}

/// Summary of a completed run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QcReport {
    /// Name of the pipeline.
    pub name: String,
    /// Shape on entry as (columns, rows).
    pub initial_shape: (usize, usize),
    /// Shape on exit as (columns, rows).
    pub final_shape: (usize, usize),
    /// Last stage reached.
    pub final_stage: PipelineStage,
    /// Executed stages in order; disabled stages are absent.
    pub stages: Vec<StageReport>,
    /// Configuration conflicts detected before the run.
    pub warnings: Vec<ConfigWarning>,
}

impl QcReport {
    /// Shape deltas of executed stages.
    pub fn deltas(&self) -> Vec<&ShapeDelta> {
        self.stages.iter().map(StageReport::delta).collect()
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl std::fmt::Display for QcReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "QC Report: {}", self.name)?;
        writeln!(
            f,
            "  Samples: {} -> {}",
            self.initial_shape.0, self.final_shape.0
        )?;
        writeln!(f, "  Genes:   {} -> {}", self.initial_shape.1, self.final_shape.1)?;
        for warning in &self.warnings {
            writeln!(f, "  Warning: {}", warning)?;
        }
        for stage in &self.stages {
            write!(f, "{}", stage)?;
        }
        Ok(())
    }
}

/// Filtered matrix together with its report.
#[derive(Debug, Clone)]
pub struct QcOutcome {
    pub matrix: ExpressionMatrix,
    pub report: QcReport,
}

/// Runs sample information, NA/sum and standard deviation filtering, in
/// that order.
#[derive(Debug, Clone)]
pub struct QcPipeline {
    name: String,
    filters: FilterConfig,
}

impl Default for QcPipeline {
    fn default() -> Self {
        Self::new(FilterConfig::default())
    }
}

impl QcPipeline {
    /// Create a pipeline from filter settings.
    pub fn new(filters: FilterConfig) -> Self {
        Self {
            name: "unnamed".to_string(),
            filters,
        }
    }

    /// Create from a config.
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            name: config.name.clone(),
            filters: config.filters.clone(),
        }
    }

    /// Set the pipeline name.
    pub fn name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// Filter settings.
    pub fn filters(&self) -> &FilterConfig {
        &self.filters
    }

    /// Convert to config for serialization.
    pub fn to_config(&self, description: Option<&str>) -> PipelineConfig {
        PipelineConfig {
            name: self.name.clone(),
            description: description.map(String::from),
            filters: self.filters.clone(),
        }
    }

    /// Run with a raw sample-information table.
    ///
    /// The metadata index is built from the configured match field. Without
    /// a sheet the match stage is skipped.
    pub fn run_with_sheet(
        &self,
        matrix: ExpressionMatrix,
        sheet: Option<&SampleSheet>,
    ) -> Result<QcOutcome> {
        self.filters.validate()?;
        let index = match (&self.filters.sample_match, sheet) {
            (Some(rule), Some(sheet)) => Some(SampleMetadataIndex::from_sheet(sheet, &rule.field)?),
            _ => None,
        };
        self.run(matrix, index.as_ref())
    }

    /// Run the pipeline and hand the filtered matrix to `sink`.
    pub fn run_into<S: MatrixSink>(
        &self,
        matrix: ExpressionMatrix,
        metadata: Option<&SampleMetadataIndex>,
        sink: &mut S,
    ) -> Result<QcReport> {
        let outcome = self.run(matrix, metadata)?;
        sink.accept(&outcome.matrix)?;
        Ok(outcome.report)
    }

    /// Run the pipeline on a matrix it takes ownership of.
    ///
    /// Any stage error aborts the run and the partially filtered matrix is
    /// dropped. A stage that leaves no samples or no genes fails with
    /// `EmptyResult` after its shape delta has been logged.
    pub fn run(
        &self,
        mut matrix: ExpressionMatrix,
        metadata: Option<&SampleMetadataIndex>,
    ) -> Result<QcOutcome> {
        self.filters.validate()?;
        if matrix.is_empty() {
            return Err(QcError::EmptyData(
                "Expression matrix has no genes or no samples".to_string(),
            ));
        }

        let warnings = self.filters.warnings();
        for warning in &warnings {
            warn!("{}", warning);
        }

        let initial_shape = matrix.shape();
        info!(
            "Running pipeline '{}' on {} genes x {} samples",
            self.name,
            matrix.n_genes(),
            matrix.n_samples()
        );

        let mut stage = PipelineStage::Loaded;
        let mut stages = Vec::new();

        match (&self.filters.sample_match, metadata) {
            (Some(rule), Some(index)) => {
                let result = filter_sample_match(&mut matrix, index, &rule.value)
                    .inspect_err(|e| error!("{} failed: {}", sample_match::STAGE_NAME, e))?;
                ensure_not_empty(&result.delta)?;
                stages.push(StageReport::SampleMatch(result));
            }
            (Some(_), None) => {
                warn!(
                    "No sample information supplied; skipping {}",
                    sample_match::STAGE_NAME
                );
            }
            (None, _) => {}
        }
        stage = stage.next();

        if let Some(threshold) = self.filters.order_of_magnitude_threshold {
            let result = filter_magnitude(&mut matrix, threshold)
                .inspect_err(|e| error!("{} failed: {}", magnitude::STAGE_NAME, e))?;
            ensure_not_empty(&result.delta)?;
            stages.push(StageReport::Magnitude(result));
        }
        stage = stage.next();

        if let Some(threshold) = self.filters.num_deviations_threshold {
            let result =
                filter_deviation(&mut matrix, threshold, self.filters.preexisting_missing)
                    .inspect_err(|e| error!("{} failed: {}", deviation::STAGE_NAME, e))?;
            ensure_not_empty(&result.delta)?;
            stages.push(StageReport::Deviation(result));
        }
        stage = stage.next();

        let report = QcReport {
            name: self.name.clone(),
            initial_shape,
            final_shape: matrix.shape(),
            final_stage: stage,
            stages,
            warnings,
        };
        Ok(QcOutcome { matrix, report })
    }
}

fn ensure_not_empty(delta: &ShapeDelta) -> Result<()> {
    if delta.is_empty_after() {
        error!("{} left an empty matrix", delta.stage);
        return Err(QcError::EmptyResult {
            stage: delta.stage.clone(),
            n_genes: delta.rows_after,
            n_samples: delta.columns_after,
        });
    }
    Ok(())
}
