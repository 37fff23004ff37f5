//! Dense gene × sample expression matrix with explicit missing values.

use crate::error::{QcError, Result};
use nalgebra::DMatrix;
use std::collections::HashSet;
use std::path::Path;

/// Tokens read as a missing measurement.
const MISSING_TOKENS: [&str; 4] = ["", "NA", "NaN", "nan"];

/// Token written for a missing measurement.
const MISSING_OUT: &str = "NA";

/// An expression matrix storing one optional value per (gene, sample).
///
/// Rows represent genes, columns represent samples. `None` marks a missing
/// measurement, either absent from the input or marked by a filter.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpressionMatrix {
    /// Dense grid (genes × samples)
    data: DMatrix<Option<f64>>,
    /// Gene identifiers (row names)
    gene_ids: Vec<String>,
    /// Sample identifiers (column names)
    sample_ids: Vec<String>,
}

impl ExpressionMatrix {
    /// Create a new ExpressionMatrix from a grid and identifiers.
    pub fn new(
        data: DMatrix<Option<f64>>,
        gene_ids: Vec<String>,
        sample_ids: Vec<String>,
    ) -> Result<Self> {
        let (nrows, ncols) = data.shape();
        if nrows != gene_ids.len() {
            return Err(QcError::DimensionMismatch {
                expected: nrows,
                actual: gene_ids.len(),
            });
        }
        if ncols != sample_ids.len() {
            return Err(QcError::DimensionMismatch {
                expected: ncols,
                actual: sample_ids.len(),
            });
        }
        check_unique("gene", &gene_ids)?;
        check_unique("sample", &sample_ids)?;
        Ok(Self {
            data,
            gene_ids,
            sample_ids,
        })
    }

    /// Build a matrix from row-major values.
    ///
    /// `rows[g][s]` is the value of gene `g` in sample `s`.
    pub fn from_rows(
        gene_ids: Vec<String>,
        sample_ids: Vec<String>,
        rows: &[Vec<Option<f64>>],
    ) -> Result<Self> {
        if rows.len() != gene_ids.len() {
            return Err(QcError::DimensionMismatch {
                expected: gene_ids.len(),
                actual: rows.len(),
            });
        }
        if let Some(bad) = rows.iter().find(|r| r.len() != sample_ids.len()) {
            return Err(QcError::DimensionMismatch {
                expected: sample_ids.len(),
                actual: bad.len(),
            });
        }
        let data = DMatrix::from_fn(gene_ids.len(), sample_ids.len(), |r, c| rows[r][c]);
        Self::new(data, gene_ids, sample_ids)
    }

    /// Load an expression table from a delimited text file.
    ///
    /// Expected format:
    /// - First row: header with sample IDs (first column is the gene ID header)
    /// - Subsequent rows: gene ID followed by one value per sample
    ///
    /// Header cells are trimmed. Empty cells, `NA` and any spelling of NaN are
    /// read as missing. Infinite values are rejected.
    pub fn from_delimited<P: AsRef<Path>>(path: P, delimiter: u8) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(true)
            .flexible(false)
            .trim(csv::Trim::Headers)
            .from_path(path)?;

        let header = reader.headers()?.clone();
        if header.len() < 2 {
            return Err(QcError::EmptyData(
                "Expression table must have at least one sample".to_string(),
            ));
        }
        let sample_ids: Vec<String> = header.iter().skip(1).map(String::from).collect();

        let mut gene_ids = Vec::new();
        let mut rows = Vec::new();
        for (row_idx, record) in reader.records().enumerate() {
            let record = record?;
            let mut fields = record.iter();
            let gene_id = fields.next().unwrap_or_default().trim().to_string();
            let values = fields
                .enumerate()
                .map(|(col_idx, raw)| parse_value(raw, row_idx, col_idx))
                .collect::<Result<Vec<_>>>()?;
            gene_ids.push(gene_id);
            rows.push(values);
        }

        if gene_ids.is_empty() {
            return Err(QcError::EmptyData("No genes in expression table".to_string()));
        }

        Self::from_rows(gene_ids, sample_ids, &rows)
    }

    /// Load a tab-separated expression table.
    pub fn from_tsv<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_delimited(path, b'\t')
    }

    /// Write the matrix as a tab-separated table, missing cells as `NA`.
    pub fn to_tsv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .from_path(path)?;

        let mut header = vec!["gene_id".to_string()];
        header.extend(self.sample_ids.iter().cloned());
        writer.write_record(&header)?;

        for (row, gene_id) in self.gene_ids.iter().enumerate() {
            let mut record = Vec::with_capacity(self.n_samples() + 1);
            record.push(gene_id.clone());
            for col in 0..self.n_samples() {
                record.push(match self.get(row, col) {
                    Some(v) => v.to_string(),
                    None => MISSING_OUT.to_string(),
                });
            }
            writer.write_record(&record)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Get the value at (row, col); `None` if missing.
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        self.data[(row, col)]
    }

    /// Mark the value at (row, col) as missing.
    #[inline]
    pub fn set_missing(&mut self, row: usize, col: usize) {
        self.data[(row, col)] = None;
    }

    /// Number of genes (rows).
    #[inline]
    pub fn n_genes(&self) -> usize {
        self.data.nrows()
    }

    /// Number of samples (columns).
    #[inline]
    pub fn n_samples(&self) -> usize {
        self.data.ncols()
    }

    /// Shape as `(samples, genes)`, i.e. (columns, rows).
    #[inline]
    pub fn shape(&self) -> (usize, usize) {
        (self.n_samples(), self.n_genes())
    }

    /// True if either axis is empty.
    pub fn is_empty(&self) -> bool {
        self.n_genes() == 0 || self.n_samples() == 0
    }

    /// Gene identifiers.
    #[inline]
    pub fn gene_ids(&self) -> &[String] {
        &self.gene_ids
    }

    /// Sample identifiers.
    #[inline]
    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    /// Column index of a sample.
    pub fn sample_index(&self, sample_id: &str) -> Option<usize> {
        self.sample_ids.iter().position(|s| s == sample_id)
    }

    /// Row index of a gene.
    pub fn gene_index(&self, gene_id: &str) -> Option<usize> {
        self.gene_ids.iter().position(|g| g == gene_id)
    }

    /// Values present in a sample column, skipping missing cells.
    pub fn col_present(&self, col: usize) -> Vec<f64> {
        self.data.column(col).iter().flatten().copied().collect()
    }

    /// Whether a gene row holds at least one missing cell.
    pub fn row_has_missing(&self, row: usize) -> bool {
        self.data.row(row).iter().any(Option::is_none)
    }

    /// Total number of missing cells.
    pub fn n_missing(&self) -> usize {
        self.data.iter().filter(|v| v.is_none()).count()
    }

    /// Compute column sums (total signal per sample), skipping missing cells.
    pub fn col_sums(&self) -> Vec<f64> {
        (0..self.n_samples())
            .map(|col| self.data.column(col).iter().flatten().sum())
            .collect()
    }

    /// Replace every missing cell with `value`, in place.
    ///
    /// Returns the number of cells filled.
    pub fn fill_missing(&mut self, value: f64) -> usize {
        let mut filled = 0;
        for cell in self.data.iter_mut() {
            if cell.is_none() {
                *cell = Some(value);
                filled += 1;
            }
        }
        filled
    }

    /// Keep only the samples at `indices` (in that order).
    pub fn retain_samples(&mut self, indices: &[usize]) -> Result<()> {
        if let Some(&bad) = indices.iter().find(|&&i| i >= self.n_samples()) {
            return Err(QcError::InvalidParameter(format!(
                "Sample index {} out of bounds",
                bad
            )));
        }
        let data = DMatrix::from_fn(self.n_genes(), indices.len(), |r, c| {
            self.data[(r, indices[c])]
        });
        self.sample_ids = indices.iter().map(|&i| self.sample_ids[i].clone()).collect();
        self.data = data;
        Ok(())
    }

    /// Keep only the genes at `indices` (in that order).
    pub fn retain_genes(&mut self, indices: &[usize]) -> Result<()> {
        if let Some(&bad) = indices.iter().find(|&&i| i >= self.n_genes()) {
            return Err(QcError::InvalidParameter(format!(
                "Gene index {} out of bounds",
                bad
            )));
        }
        let data = DMatrix::from_fn(indices.len(), self.n_samples(), |r, c| {
            self.data[(indices[r], c)]
        });
        self.gene_ids = indices.iter().map(|&i| self.gene_ids[i].clone()).collect();
        self.data = data;
        Ok(())
    }
}

fn parse_value(raw: &str, row: usize, col: usize) -> Result<Option<f64>> {
    let trimmed = raw.trim();
    if MISSING_TOKENS.contains(&trimmed) {
        return Ok(None);
    }
    let invalid = || QcError::InvalidValue {
        value: raw.to_string(),
        row,
        col,
    };
    match trimmed.parse::<f64>() {
        // any NaN spelling is a missing measurement
        Ok(v) if v.is_nan() => Ok(None),
        Ok(v) if v.is_infinite() => Err(invalid()),
        Ok(v) => Ok(Some(v)),
        Err(_) => Err(invalid()),
    }
}

fn check_unique(axis: &'static str, ids: &[String]) -> Result<()> {
    let mut seen = HashSet::with_capacity(ids.len());
    for id in ids {
        if !seen.insert(id.as_str()) {
            return Err(QcError::DuplicateId {
                axis,
                id: id.clone(),
            });
        }
    }
    Ok(())
}
