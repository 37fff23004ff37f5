//! EQC - Expression Quality Control CLI
//!
//! Command-line interface for filtering expression matrices ahead of
//! co-expression analysis.

use clap::{Parser, Subcommand};
use env_logger::Env;
use expression_qc::data::{ExpressionMatrix, SampleSheet};
use expression_qc::error::{QcError, Result};
use expression_qc::filter::PreexistingMissing;
use expression_qc::pipeline::{FilterConfig, MatrixSink, PipelineConfig, QcPipeline, TsvSink};
use expression_qc::profile::profile_matrix;
use log::info;
use std::path::{Path, PathBuf};

/// Expression matrix quality control
#[derive(Parser)]
#[command(name = "eqc")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the QC pipeline and write the filtered matrix
    Run {
        /// Path to expression table (genes as rows, samples as columns)
        #[arg(short, long)]
        expression: PathBuf,

        /// Field delimiter of the expression table
        #[arg(long, default_value = "\t")]
        expression_delimiter: char,

        /// Path to sample information table; omit to skip sample matching
        #[arg(short, long)]
        sample_info: Option<PathBuf>,

        /// Field delimiter of the sample information table
        #[arg(long, default_value = "\t")]
        info_delimiter: char,

        /// Pipeline configuration YAML; flags below override it
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Sample information row holding sample IDs
        #[arg(long)]
        match_field: Option<String>,

        /// Substring a sample's attribute must contain
        #[arg(long)]
        match_value: Option<String>,

        /// Disable sample information filtering
        #[arg(long, conflicts_with_all = ["match_field", "match_value"])]
        no_match: bool,

        /// Order-of-magnitude threshold for NA/sum filtering
        #[arg(long)]
        magnitude: Option<f64>,

        /// Disable NA/sum filtering
        #[arg(long, conflicts_with = "magnitude")]
        no_magnitude: bool,

        /// Number of standard deviations for outlier filtering
        #[arg(long)]
        deviations: Option<f64>,

        /// Disable standard deviation filtering
        #[arg(long, conflicts_with = "deviations")]
        no_deviations: bool,

        /// Keep genes whose only missing values predate deviation filtering
        #[arg(long)]
        keep_preexisting_missing: bool,

        /// Output path for the filtered matrix TSV
        #[arg(short, long)]
        output: PathBuf,

        /// Output path for a JSON run report
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Profile an expression matrix
    Profile {
        /// Path to expression table
        #[arg(short, long)]
        expression: PathBuf,

        /// Field delimiter of the expression table
        #[arg(long, default_value = "\t")]
        expression_delimiter: char,

        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Generate an example pipeline configuration
    Example {
        /// Output path for the example YAML
        #[arg(short, long, default_value = "pipeline.yaml")]
        output: PathBuf,
    },
}

/// Filter overrides given on the command line.
struct FilterFlags {
    match_field: Option<String>,
    match_value: Option<String>,
    no_match: bool,
    magnitude: Option<f64>,
    no_magnitude: bool,
    deviations: Option<f64>,
    no_deviations: bool,
    keep_preexisting_missing: bool,
}

impl FilterFlags {
    fn apply(self, mut filters: FilterConfig) -> FilterConfig {
        if self.no_match {
            filters.sample_match = None;
        } else if self.match_field.is_some() || self.match_value.is_some() {
            let base = filters.sample_match.take().unwrap_or_default();
            filters = filters.match_samples(
                self.match_field.as_deref().unwrap_or(&base.field),
                self.match_value.as_deref().unwrap_or(&base.value),
            );
        }

        if self.no_magnitude {
            filters.order_of_magnitude_threshold = None;
        } else if let Some(t) = self.magnitude {
            filters = filters.magnitude(t);
        }

        if self.no_deviations {
            filters.num_deviations_threshold = None;
        } else if let Some(k) = self.deviations {
            filters = filters.deviations(k);
        }

        if self.keep_preexisting_missing {
            filters = filters.preexisting_missing(PreexistingMissing::Keep);
        }
        filters
    }
}

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            expression,
            expression_delimiter,
            sample_info,
            info_delimiter,
            config,
            match_field,
            match_value,
            no_match,
            magnitude,
            no_magnitude,
            deviations,
            no_deviations,
            keep_preexisting_missing,
            output,
            report,
        } => {
            let flags = FilterFlags {
                match_field,
                match_value,
                no_match,
                magnitude,
                no_magnitude,
                deviations,
                no_deviations,
                keep_preexisting_missing,
            };
            cmd_run(
                &expression,
                expression_delimiter,
                sample_info.as_deref(),
                info_delimiter,
                config.as_deref(),
                flags,
                &output,
                report.as_deref(),
            )
        }

        Commands::Profile {
            expression,
            expression_delimiter,
            format,
        } => cmd_profile(&expression, expression_delimiter, &format),

        Commands::Example { output } => cmd_example(&output),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn delimiter_byte(c: char) -> Result<u8> {
    u8::try_from(c)
        .ok()
        .filter(u8::is_ascii)
        .ok_or_else(|| QcError::InvalidParameter(format!("Delimiter {:?} is not ASCII", c)))
}

/// Run the QC pipeline
#[allow(clippy::too_many_arguments)]
fn cmd_run(
    expression_path: &Path,
    expression_delimiter: char,
    sample_info_path: Option<&Path>,
    info_delimiter: char,
    config_path: Option<&Path>,
    flags: FilterFlags,
    output_path: &Path,
    report_path: Option<&Path>,
) -> Result<()> {
    let config = match config_path {
        Some(path) => {
            info!("Loading pipeline configuration from {:?}", path);
            PipelineConfig::from_yaml(&std::fs::read_to_string(path)?)?
        }
        None => PipelineConfig::default(),
    };
    let filters = flags.apply(config.filters.clone());

    info!("Loading expression table from {:?}", expression_path);
    let matrix =
        ExpressionMatrix::from_delimited(expression_path, delimiter_byte(expression_delimiter)?)?;
    info!(
        "Loaded {} genes x {} samples",
        matrix.n_genes(),
        matrix.n_samples()
    );

    let sheet = match sample_info_path {
        Some(path) => {
            info!("Loading sample information from {:?}", path);
            Some(SampleSheet::from_delimited(path, delimiter_byte(info_delimiter)?)?)
        }
        None => None,
    };

    let pipeline = QcPipeline::new(filters).name(&config.name);
    let outcome = pipeline.run_with_sheet(matrix, sheet.as_ref())?;

    let mut sink = TsvSink::new(output_path);
    sink.accept(&outcome.matrix)?;

    eprint!("{}", outcome.report);

    if let Some(path) = report_path {
        info!("Writing report to {:?}", path);
        std::fs::write(path, outcome.report.to_json()?)?;
    }

    Ok(())
}

/// Profile an expression matrix
fn cmd_profile(expression_path: &Path, delimiter: char, format: &str) -> Result<()> {
    let matrix = ExpressionMatrix::from_delimited(expression_path, delimiter_byte(delimiter)?)?;
    let profile = profile_matrix(&matrix);

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&profile)?),
        "text" => print!("{}", profile),
        other => {
            return Err(QcError::InvalidParameter(format!(
                "Unknown format '{}', expected text or json",
                other
            )))
        }
    }
    Ok(())
}

/// Generate an example configuration
fn cmd_example(output_path: &Path) -> Result<()> {
    let config = QcPipeline::default()
        .name("coexpression-prep")
        .to_config(Some(
            "Sample information, NA/sum and standard deviation filtering before co-expression analysis",
        ));
    std::fs::write(output_path, config.to_yaml()?)?;
    eprintln!("Wrote example configuration to {:?}", output_path);
    Ok(())
}
