//! Sample information tables and the sample → attribute lookup.

use crate::error::{QcError, Result};
use log::warn;
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// A sample-information table.
///
/// Rows are named fields, columns are headed by a descriptive attribute
/// string (for example `areaX_high`). One field, the match field, holds the
/// sample identifier each column describes.
#[derive(Debug, Clone, Default)]
pub struct SampleSheet {
    /// Column headers (attribute strings), excluding the field-name column.
    attributes: Vec<String>,
    /// Field names in file order.
    field_names: Vec<String>,
    /// Field name -> one value per attribute column.
    fields: HashMap<String, Vec<String>>,
    /// Field names given on more than one row.
    duplicate_fields: HashSet<String>,
}

impl SampleSheet {
    /// Load a sample-information table from a delimited text file.
    ///
    /// Expected format:
    /// - First row: header with attribute strings (first cell names the field column)
    /// - Subsequent rows: field name followed by one value per attribute column
    ///
    /// A field name given on several rows is recorded as ambiguous and
    /// cannot be read with [`SampleSheet::field`].
    pub fn from_delimited<P: AsRef<Path>>(path: P, delimiter: u8) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(true)
            .flexible(false)
            .trim(csv::Trim::All)
            .from_path(path)?;

        let header = reader.headers()?.clone();
        if header.len() < 2 {
            return Err(QcError::EmptyData(
                "Sample information must have at least one attribute column".to_string(),
            ));
        }
        let attributes: Vec<String> = header.iter().skip(1).map(String::from).collect();

        let mut field_names = Vec::new();
        let mut fields = HashMap::new();
        let mut duplicate_fields = HashSet::new();
        for record in reader.records() {
            let record = record?;
            let mut cells = record.iter();
            let name = cells.next().unwrap_or_default().to_string();
            if name.is_empty() {
                continue;
            }
            if fields.contains_key(&name) {
                warn!("Field '{}' appears on more than one row of the sample information", name);
                duplicate_fields.insert(name);
                continue;
            }
            field_names.push(name.clone());
            fields.insert(name, cells.map(String::from).collect());
        }

        if field_names.is_empty() {
            return Err(QcError::EmptyData("No fields in sample information".to_string()));
        }

        Ok(Self {
            attributes,
            field_names,
            fields,
            duplicate_fields,
        })
    }

    /// Load a tab-separated sample-information table.
    pub fn from_tsv<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_delimited(path, b'\t')
    }

    /// Attribute strings (column headers).
    pub fn attributes(&self) -> &[String] {
        &self.attributes
    }

    /// Field names in file order.
    pub fn field_names(&self) -> &[String] {
        &self.field_names
    }

    /// Values of a field, one per attribute column.
    ///
    /// Fails with `DuplicateId` if the field is given on more than one row.
    pub fn field(&self, name: &str) -> Result<&[String]> {
        if self.duplicate_fields.contains(name) {
            return Err(QcError::DuplicateId {
                axis: "field",
                id: name.to_string(),
            });
        }
        self.fields
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| QcError::MissingField(name.to_string()))
    }
}

/// Lookup from sample identifier to its attribute string.
///
/// A sample mapped to more than one attribute is kept as such and reported
/// as ambiguous on lookup.
#[derive(Debug, Clone, Default)]
pub struct SampleMetadataIndex {
    entries: HashMap<String, Vec<String>>,
}

impl SampleMetadataIndex {
    /// Build from explicit `(sample_id, attribute)` pairs.
    pub fn from_pairs<I, S, A>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, A)>,
        S: Into<String>,
        A: Into<String>,
    {
        let mut entries: HashMap<String, Vec<String>> = HashMap::new();
        for (sample, attribute) in pairs {
            entries
                .entry(sample.into())
                .or_default()
                .push(attribute.into());
        }
        Self { entries }
    }

    /// Build from the match-field row of a sample sheet.
    ///
    /// Each attribute column contributes `match_field value -> column header`.
    pub fn from_sheet(sheet: &SampleSheet, match_field: &str) -> Result<Self> {
        let samples = sheet.field(match_field)?;
        Ok(Self::from_pairs(
            samples
                .iter()
                .zip(sheet.attributes())
                .map(|(sample, attribute)| (sample.clone(), attribute.clone())),
        ))
    }

    /// Attribute string for a sample.
    pub fn lookup(&self, sample_id: &str) -> Result<&str> {
        match self.entries.get(sample_id).map(Vec::as_slice) {
            None | Some([]) => Err(QcError::MissingMetadataEntry(sample_id.to_string())),
            Some([attribute]) => Ok(attribute.as_str()),
            Some(many) => Err(QcError::AmbiguousMetadataEntry {
                sample: sample_id.to_string(),
                attributes: many.to_vec(),
            }),
        }
    }

    /// Number of distinct samples indexed.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no sample is indexed.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
