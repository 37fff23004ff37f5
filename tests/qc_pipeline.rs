//! Integration tests for the expression QC pipeline.

use expression_qc::prelude::*;
use std::io::Write;
use tempfile::NamedTempFile;

/// Expression table: 5 genes × 4 samples.
///
/// - S4 is described as "ctrl" and fails the areaX match.
/// - S3 sums to 1000 against a median of 50 and fails a 10x magnitude bound.
/// - S2 is missing g1 and has an outlier in g5 (40 > 32.6 at k = 1.5).
fn create_expression_file() -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "gene\tS1\tS2\tS3\tS4").unwrap();
    writeln!(file, "g1\t10\tNA\t200\t1").unwrap();
    writeln!(file, "g2\t10\t2\t200\t1").unwrap();
    writeln!(file, "g3\t10\t3\t200\t1").unwrap();
    writeln!(file, "g4\t10\t5\t200\t1").unwrap();
    writeln!(file, "g5\t10\t40\t200\t1").unwrap();
    file.flush().unwrap();
    file
}

/// Sample information in field-per-row layout.
fn create_sample_info_file() -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "Field\tareaX_a\tareaX_b\tareaX_c\tctrl").unwrap();
    writeln!(file, "Sample_number\tS1\tS2\tS3\tS4").unwrap();
    writeln!(file, "Tissue\tleaf\tleaf\troot\tleaf").unwrap();
    file.flush().unwrap();
    file
}

fn documented_filters() -> FilterConfig {
    FilterConfig::disabled()
        .match_samples("Sample_number", "areaX")
        .magnitude(1.0)
        .deviations(1.5)
}

fn load() -> (ExpressionMatrix, SampleSheet) {
    let expression = create_expression_file();
    let info = create_sample_info_file();
    (
        ExpressionMatrix::from_tsv(expression.path()).unwrap(),
        SampleSheet::from_tsv(info.path()).unwrap(),
    )
}

#[test]
fn test_end_to_end_from_files() {
    let (matrix, sheet) = load();

    let outcome = QcPipeline::new(documented_filters())
        .name("e2e")
        .run_with_sheet(matrix, Some(&sheet))
        .unwrap();

    assert_eq!(outcome.matrix.sample_ids(), &["S1", "S2"]);
    assert_eq!(outcome.matrix.gene_ids(), &["g1", "g2", "g3", "g4"]);
    assert_eq!(outcome.matrix.n_missing(), 0);
    assert_eq!(outcome.matrix.get(0, 1), Some(0.0));

    let deltas: Vec<String> = outcome.report.deltas().iter().map(|d| d.to_string()).collect();
    assert_eq!(
        deltas,
        vec![
            "Sample information filtering:\n\tColumns changed from 4 to 3, rows changed from 5 to 5",
            "NA/Sum filtering:\n\tColumns changed from 3 to 2, rows changed from 5 to 5",
            "Standard deviation filtering:\n\tColumns changed from 2 to 2, rows changed from 5 to 4",
        ]
    );
}

#[test]
fn test_run_into_sink_writes_filtered_table() {
    let (matrix, sheet) = load();
    let index = SampleMetadataIndex::from_sheet(&sheet, "Sample_number").unwrap();

    let output = NamedTempFile::new().unwrap();
    let mut sink = TsvSink::new(output.path());
    let report = QcPipeline::new(documented_filters())
        .run_into(matrix, Some(&index), &mut sink)
        .unwrap();

    assert_eq!(report.final_shape, (2, 4));
    let written = ExpressionMatrix::from_tsv(output.path()).unwrap();
    assert_eq!(written.sample_ids(), &["S1", "S2"]);
    assert_eq!(written.n_genes(), 4);
}

#[test]
fn test_each_stage_never_grows_matrix() {
    let (matrix, sheet) = load();
    let configs = [
        FilterConfig::disabled().match_samples("Sample_number", "areaX"),
        FilterConfig::disabled().magnitude(1.0),
        FilterConfig::disabled().deviations(1.5),
        FilterConfig::disabled().deviations(1.5).preexisting_missing(PreexistingMissing::Keep),
        documented_filters(),
    ];

    for filters in configs {
        let outcome = QcPipeline::new(filters.clone())
            .run_with_sheet(matrix.clone(), Some(&sheet))
            .unwrap();
        for delta in outcome.report.deltas() {
            assert!(delta.columns_after <= delta.columns_before, "{:?}", filters);
            assert!(delta.rows_after <= delta.rows_before, "{:?}", filters);
        }
        assert!(outcome.matrix.n_samples() <= matrix.n_samples());
        assert!(outcome.matrix.n_genes() <= matrix.n_genes());
    }
}

#[test]
fn test_disabled_stages_are_identity() {
    let (matrix, sheet) = load();

    let outcome = QcPipeline::new(FilterConfig::disabled())
        .run_with_sheet(matrix.clone(), Some(&sheet))
        .unwrap();

    assert_eq!(outcome.matrix, matrix);
    assert_eq!(outcome.matrix.n_missing(), 1);
    assert!(outcome.report.deltas().is_empty());
}

#[test]
fn test_match_stage_alone_is_idempotent() {
    let (matrix, sheet) = load();
    let pipeline = QcPipeline::new(FilterConfig::disabled().match_samples("Sample_number", "areaX"));

    let once = pipeline.run_with_sheet(matrix, Some(&sheet)).unwrap();
    let twice = pipeline
        .run_with_sheet(once.matrix.clone(), Some(&sheet))
        .unwrap();

    assert_eq!(twice.matrix, once.matrix);
    assert_eq!(twice.report.deltas()[0].columns_removed(), 0);
}

#[test]
fn test_hazard_reported_when_zero_fill_skipped() {
    let (matrix, sheet) = load();
    let filters = FilterConfig::disabled()
        .match_samples("Sample_number", "areaX")
        .deviations(1.5);

    let outcome = QcPipeline::new(filters)
        .run_with_sheet(matrix, Some(&sheet))
        .unwrap();

    assert_eq!(outcome.report.warnings, vec![ConfigWarning::DeviationWithoutZeroFill]);
    let deviation = outcome
        .report
        .stages
        .iter()
        .find_map(|s| match s {
            StageReport::Deviation(r) => Some(r),
            _ => None,
        })
        .unwrap();
    assert_eq!(deviation.removed_for_missing, vec!["g1"]);
    assert_eq!(deviation.removed_for_deviation, vec!["g5"]);
    assert_eq!(outcome.matrix.gene_ids(), &["g2", "g3", "g4"]);
}

#[test]
fn test_unknown_match_field_fails() {
    let (matrix, sheet) = load();
    let filters = FilterConfig::disabled().match_samples("Sample_id", "areaX");

    let result = QcPipeline::new(filters).run_with_sheet(matrix, Some(&sheet));
    assert!(matches!(result, Err(QcError::MissingField(f)) if f == "Sample_id"));
}

#[test]
fn test_zero_median_aborts_run() {
    let matrix = ExpressionMatrix::from_rows(
        vec!["g1".into()],
        vec!["S1".into(), "S2".into(), "S3".into()],
        &[vec![None, Some(0.0), Some(4.0)]],
    )
    .unwrap();

    let result = QcPipeline::new(FilterConfig::disabled().magnitude(2.0)).run(matrix, None);
    assert!(matches!(result, Err(QcError::UndefinedRatio)));
}

#[test]
fn test_yaml_config_drives_run() {
    let yaml = "\
name: from-yaml
filters:
  sample_match:
    field: Sample_number
    value: areaX
  order_of_magnitude_threshold: 1.0
  num_deviations_threshold: 1.5
";
    let config = PipelineConfig::from_yaml(yaml).unwrap();
    let (matrix, sheet) = load();

    let outcome = QcPipeline::from_config(&config)
        .run_with_sheet(matrix, Some(&sheet))
        .unwrap();

    assert_eq!(outcome.report.name, "from-yaml");
    assert_eq!(outcome.report.final_shape, (2, 4));
}

#[test]
fn test_profile_suggests_magnitude_threshold() {
    let (matrix, _) = load();
    let profile = profile_matrix(&matrix);

    // sums 50, 50, 1000, 5; median 50; S3 is log10(20) away
    assert_eq!(profile.median_sum, Some(50.0));
    assert!((profile.max_log10_ratio.unwrap() - 20f64.log10()).abs() < 1e-12);
}
