use ndarray::{Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::utils::AnalysisError;

/// Cell values treated as missing, compared case-insensitively after trimming
const MISSING_TOKENS: [&str; 4] = ["", "na", "nan", "null"];

/// What to do with rows whose predictor cells are missing
///
/// Rows with a missing label are always dropped; the policy only covers
/// predictors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MissingPolicy {
    /// Drop any row with at least one missing predictor
    #[default]
    Drop,
    /// Replace a missing predictor with the mean of its column's present values
    ImputeMean,
}

/// How to read a delimited file into a [`Dataset`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadOptions {
    /// Column holding the binary label
    pub label_column: String,
    /// Label cell value that maps to 1; every other present value maps to 0
    pub positive_label: String,
    /// Columns excluded from the schema, named after renaming
    pub drop_columns: Vec<String>,
    /// `(from, to)` header renames, applied before anything else
    pub rename: Vec<(String, String)>,
    pub missing: MissingPolicy,
    pub delimiter: char,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            label_column: "FS".to_string(),
            positive_label: "1".to_string(),
            drop_columns: Vec::new(),
            rename: Vec::new(),
            missing: MissingPolicy::Drop,
            delimiter: ',',
        }
    }
}

impl LoadOptions {
    /// Options for a label column with default sentinel and policies
    pub fn new(label_column: impl Into<String>) -> Self {
        Self {
            label_column: label_column.into(),
            ..Self::default()
        }
    }

    pub fn with_positive_label(mut self, positive: impl Into<String>) -> Self {
        self.positive_label = positive.into();
        self
    }

    pub fn with_drop_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.drop_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_rename(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.rename.push((from.into(), to.into()));
        self
    }

    pub fn with_missing(mut self, missing: MissingPolicy) -> Self {
        self.missing = missing;
        self
    }

    fn delimiter_byte(&self) -> Result<u8, AnalysisError> {
        if self.delimiter.is_ascii() {
            Ok(self.delimiter as u8)
        } else {
            Err(AnalysisError::config(format!(
                "delimiter must be a single ASCII character, got {:?}",
                self.delimiter
            )))
        }
    }
}

/// One observation: predictor values in schema order plus the binary label
#[derive(Debug, Clone, Copy)]
pub struct Record<'a> {
    names: &'a [String],
    pub features: ArrayView1<'a, f64>,
    pub label: u8,
}

impl<'a> Record<'a> {
    /// Get a predictor value by column name
    pub fn get(&self, name: &str) -> Option<f64> {
        let idx = self.names.iter().position(|n| n == name)?;
        self.features.get(idx).copied()
    }
}

/// Immutable collection of records sharing one schema
#[derive(Debug, Clone)]
pub struct Dataset {
    pub name: String,
    feature_names: Vec<String>,
    features: Array2<f64>,
    labels: Vec<u8>,
    source_rows: Vec<usize>,
    fingerprint: String,
}

impl Dataset {
    /// Build a dataset from an in-memory matrix
    ///
    /// # Returns
    /// * `Err(AnalysisError::LoadError)` if shapes disagree or a label is not 0/1
    pub fn new(
        name: impl Into<String>,
        feature_names: Vec<String>,
        features: Array2<f64>,
        labels: Vec<u8>,
    ) -> Result<Self, AnalysisError> {
        if features.ncols() != feature_names.len() {
            return Err(AnalysisError::load(format!(
                "{} feature names for {} columns",
                feature_names.len(),
                features.ncols()
            )));
        }
        if features.nrows() != labels.len() {
            return Err(AnalysisError::load(format!(
                "{} rows but {} labels",
                features.nrows(),
                labels.len()
            )));
        }
        if let Some(bad) = labels.iter().find(|&&l| l > 1) {
            return Err(AnalysisError::load(format!("label must be 0 or 1, got {}", bad)));
        }

        let source_rows = (0..labels.len()).collect();
        let fingerprint = fingerprint(&feature_names, &features, &labels);
        Ok(Self {
            name: name.into(),
            feature_names,
            features,
            labels,
            source_rows,
            fingerprint,
        })
    }

    /// Load a dataset from a delimited file on disk
    pub fn from_path<P: AsRef<Path>>(path: P, options: &LoadOptions) -> Result<Self, AnalysisError> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| AnalysisError::load(format!("cannot open {}: {}", path.display(), e)))?;
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "dataset".to_string());
        Self::from_reader(name, file, options)
    }

    /// Load a dataset from CSV text
    pub fn from_csv(name: impl Into<String>, csv_data: &str, options: &LoadOptions) -> Result<Self, AnalysisError> {
        Self::from_reader(name, csv_data.as_bytes(), options)
    }

    fn from_reader<R: Read>(name: impl Into<String>, source: R, options: &LoadOptions) -> Result<Self, AnalysisError> {
        let name = name.into();
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .delimiter(options.delimiter_byte()?)
            .trim(csv::Trim::All)
            .from_reader(source);

        let mut headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        if headers.iter().all(|h| h.is_empty()) {
            return Err(AnalysisError::load("input has no header row"));
        }

        for (from, to) in &options.rename {
            let slot = headers
                .iter_mut()
                .find(|h| h.as_str() == from.as_str())
                .ok_or_else(|| AnalysisError::load(format!("cannot rename unknown column '{}'", from)))?;
            *slot = to.clone();
        }

        let mut seen: HashSet<&str> = HashSet::with_capacity(headers.len());
        if let Some(duplicate) = headers.iter().find(|h| !seen.insert(h.as_str())) {
            return Err(AnalysisError::load(format!("duplicate column name '{}'", duplicate)));
        }

        let dropped: HashSet<&str> = options.drop_columns.iter().map(String::as_str).collect();
        for column in &dropped {
            if !headers.iter().any(|h| h.as_str() == *column) {
                return Err(AnalysisError::load(format!("cannot drop unknown column '{}'", column)));
            }
        }
        if dropped.contains(options.label_column.as_str()) {
            return Err(AnalysisError::load(format!(
                "label column '{}' is listed in drop_columns",
                options.label_column
            )));
        }

        let label_idx = headers
            .iter()
            .position(|h| *h == options.label_column)
            .ok_or_else(|| AnalysisError::load(format!("label column '{}' not found", options.label_column)))?;

        let predictor_idx: Vec<usize> = (0..headers.len())
            .filter(|&i| i != label_idx && !dropped.contains(headers[i].as_str()))
            .collect();
        if predictor_idx.is_empty() {
            return Err(AnalysisError::load("no predictor columns remain after dropping"));
        }
        let feature_names: Vec<String> = predictor_idx.iter().map(|&i| headers[i].clone()).collect();

        let mut rows: Vec<Vec<Option<f64>>> = Vec::new();
        let mut labels = Vec::new();
        let mut source_rows = Vec::new();
        let mut missing_label = 0usize;

        for (row_num, result) in reader.records().enumerate() {
            let record = result?;
            let label_cell = record.get(label_idx).unwrap_or("");
            if is_missing(label_cell) {
                missing_label += 1;
                continue;
            }

            let mut values = Vec::with_capacity(predictor_idx.len());
            for &col in &predictor_idx {
                let cell = record.get(col).unwrap_or("");
                if is_missing(cell) {
                    values.push(None);
                    continue;
                }
                let value: f64 = cell.parse().map_err(|_| {
                    AnalysisError::load(format!(
                        "row {}: column '{}' has non-numeric value '{}'",
                        row_num + 1,
                        headers[col],
                        cell
                    ))
                })?;
                values.push(Some(value));
            }

            labels.push(u8::from(label_cell == options.positive_label));
            rows.push(values);
            source_rows.push(row_num);
        }

        if missing_label > 0 {
            warn!(dataset = %name, rows = missing_label, "dropped rows with missing label");
        }

        let (rows, labels, source_rows) = apply_missing_policy(options.missing, &feature_names, rows, labels, source_rows)?;

        let nrows = rows.len();
        let ncols = feature_names.len();
        let flat: Vec<f64> = rows.into_iter().flatten().collect();
        let features = Array2::from_shape_vec((nrows, ncols), flat)
            .map_err(|e| AnalysisError::load(format!("failed to build feature matrix: {}", e)))?;

        let fingerprint = fingerprint(&feature_names, &features, &labels);
        info!(
            dataset = %name,
            rows = nrows,
            features = ncols,
            positives = labels.iter().filter(|&&l| l == 1).count(),
            "loaded dataset"
        );

        Ok(Self {
            name,
            feature_names,
            features,
            labels,
            source_rows,
            fingerprint,
        })
    }

    /// Get the number of records
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Check if dataset is empty
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Predictor names in column order
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn feature_index(&self, name: &str) -> Option<usize> {
        self.feature_names.iter().position(|n| n == name)
    }

    pub fn features(&self) -> ArrayView2<'_, f64> {
        self.features.view()
    }

    pub fn labels(&self) -> &[u8] {
        &self.labels
    }

    /// Zero-based data row (header excluded) each record came from
    pub fn source_rows(&self) -> &[usize] {
        &self.source_rows
    }

    /// Content hash over schema, values and labels
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn record(&self, idx: usize) -> Option<Record<'_>> {
        let label = *self.labels.get(idx)?;
        Some(Record {
            names: &self.feature_names,
            features: self.features.row(idx),
            label,
        })
    }

    pub fn records(&self) -> impl Iterator<Item = Record<'_>> + '_ {
        (0..self.len()).filter_map(move |i| self.record(i))
    }

    /// Copy out the rows at `indices`, in the given order
    pub fn select(&self, indices: &[usize]) -> (Array2<f64>, Vec<u8>) {
        let features = self.features.select(Axis(0), indices);
        let labels = indices.iter().map(|&i| self.labels[i]).collect();
        (features, labels)
    }
}

fn is_missing(cell: &str) -> bool {
    let cell = cell.trim();
    MISSING_TOKENS.iter().any(|t| cell.eq_ignore_ascii_case(t))
}

type FilledRows = (Vec<Vec<f64>>, Vec<u8>, Vec<usize>);

fn apply_missing_policy(
    policy: MissingPolicy,
    feature_names: &[String],
    rows: Vec<Vec<Option<f64>>>,
    labels: Vec<u8>,
    source_rows: Vec<usize>,
) -> Result<FilledRows, AnalysisError> {
    match policy {
        MissingPolicy::Drop => {
            let before = rows.len();
            let mut kept_rows = Vec::with_capacity(before);
            let mut kept_labels = Vec::with_capacity(before);
            let mut kept_sources = Vec::with_capacity(before);
            for ((row, label), source) in rows.into_iter().zip(labels).zip(source_rows) {
                if let Some(values) = row.into_iter().collect::<Option<Vec<f64>>>() {
                    kept_rows.push(values);
                    kept_labels.push(label);
                    kept_sources.push(source);
                }
            }
            let dropped = before - kept_rows.len();
            if dropped > 0 {
                warn!(rows = dropped, "dropped rows with missing predictors");
            }
            Ok((kept_rows, kept_labels, kept_sources))
        }
        MissingPolicy::ImputeMean => {
            let mut means = Vec::with_capacity(feature_names.len());
            for (col, name) in feature_names.iter().enumerate() {
                let present: Vec<f64> = rows.iter().filter_map(|r| r[col]).collect();
                if present.is_empty() && !rows.is_empty() {
                    return Err(AnalysisError::load(format!(
                        "column '{}' has no values to impute from",
                        name
                    )));
                }
                let mean = present.iter().sum::<f64>() / present.len().max(1) as f64;
                let imputed = rows.len() - present.len();
                if imputed > 0 {
                    debug!(column = %name, imputed, mean, "imputed missing values");
                }
                means.push(mean);
            }
            let filled = rows
                .into_iter()
                .map(|row| {
                    row.into_iter()
                        .zip(&means)
                        .map(|(v, &mean)| v.unwrap_or(mean))
                        .collect()
                })
                .collect();
            Ok((filled, labels, source_rows))
        }
    }
}

fn fingerprint(names: &[String], features: &Array2<f64>, labels: &[u8]) -> String {
    let mut hasher = Sha256::new();
    for name in names {
        hasher.update(name.as_bytes());
        hasher.update([0u8]);
    }
    for value in features.iter() {
        hasher.update(value.to_le_bytes());
    }
    hasher.update(labels);
    to_hex(&hasher.finalize())
}

pub(crate) fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    const HOUSING_CSV: &str = "\
SERIALNO,RNTP,VALP,HICOV,FS
1,900,0,1,1
2,1500,0,1,2
3,,250000,2,2
4,700,0,1,1
";

    #[test]
    fn test_csv_loading_maps_label() {
        let options = LoadOptions::new("FS").with_drop_columns(["SERIALNO"]);
        let dataset = Dataset::from_csv("housing", HOUSING_CSV, &options).unwrap();

        assert_eq!(dataset.len(), 3);
        assert_eq!(dataset.feature_names(), &["RNTP", "VALP", "HICOV"]);
        assert_eq!(dataset.labels(), &[1, 0, 1]);
        assert_eq!(dataset.source_rows(), &[0, 1, 3]);
    }

    #[test]
    fn test_impute_mean_keeps_rows() {
        let options = LoadOptions::new("FS")
            .with_drop_columns(["SERIALNO"])
            .with_missing(MissingPolicy::ImputeMean);
        let dataset = Dataset::from_csv("housing", HOUSING_CSV, &options).unwrap();

        assert_eq!(dataset.len(), 4);
        let record = dataset.record(2).unwrap();
        assert!((record.get("RNTP").unwrap() - 1033.333).abs() < 0.01);
        assert_eq!(record.label, 0);
    }

    #[test]
    fn test_missing_label_column() {
        let options = LoadOptions::new("FOODSTAMP");
        let err = Dataset::from_csv("housing", HOUSING_CSV, &options).unwrap_err();
        assert!(matches!(err, AnalysisError::LoadError(_)));
        assert!(err.to_string().contains("FOODSTAMP"));
    }

    #[test]
    fn test_rename_then_drop() {
        let options = LoadOptions::new("foodstamp")
            .with_rename("FS", "foodstamp")
            .with_rename("RNTP", "rent")
            .with_drop_columns(["SERIALNO", "VALP"]);
        let dataset = Dataset::from_csv("housing", HOUSING_CSV, &options).unwrap();

        assert_eq!(dataset.feature_names(), &["rent", "HICOV"]);
        assert_eq!(dataset.record(0).unwrap().get("rent"), Some(900.0));
    }

    #[test]
    fn test_rename_onto_existing_column_rejected() {
        let options = LoadOptions::new("FS").with_rename("RNTP", "VALP");
        let err = Dataset::from_csv("housing", HOUSING_CSV, &options).unwrap_err();
        assert!(matches!(err, AnalysisError::LoadError(_)));
        assert!(err.to_string().contains("duplicate column name 'VALP'"));
    }

    #[test]
    fn test_duplicate_header_rejected() {
        let csv_data = "RNTP,RNTP,FS\n900,950,1\n";
        let err = Dataset::from_csv("dup", csv_data, &LoadOptions::new("FS")).unwrap_err();
        assert!(err.to_string().contains("'RNTP'"));
    }

    #[test]
    fn test_unknown_drop_column() {
        let options = LoadOptions::new("FS").with_drop_columns(["NOPE"]);
        assert!(Dataset::from_csv("housing", HOUSING_CSV, &options).is_err());
    }

    #[test]
    fn test_non_numeric_predictor() {
        let csv_data = "rent,occupation,FS\n900,clerk,1\n";
        let err = Dataset::from_csv("bad", csv_data, &LoadOptions::new("FS")).unwrap_err();
        assert!(err.to_string().contains("occupation"));
    }

    #[test]
    fn test_rows_with_missing_label_dropped() {
        let csv_data = "rent,FS\n900,1\n800,NA\n700,2\n";
        let dataset = Dataset::from_csv("labels", csv_data, &LoadOptions::new("FS")).unwrap();
        assert_eq!(dataset.labels(), &[1, 0]);
    }

    #[test]
    fn test_missing_file() {
        let err = Dataset::from_path("/definitely/not/here.csv", &LoadOptions::default()).unwrap_err();
        assert!(matches!(err, AnalysisError::LoadError(_)));
    }

    #[test]
    fn test_new_validates_shape() {
        let features = arr2(&[[1.0, 2.0], [3.0, 4.0]]);
        assert!(Dataset::new("t", vec!["a".into()], features.clone(), vec![0, 1]).is_err());
        assert!(Dataset::new("t", vec!["a".into(), "b".into()], features.clone(), vec![0]).is_err());
        assert!(Dataset::new("t", vec!["a".into(), "b".into()], features.clone(), vec![0, 2]).is_err());
        assert!(Dataset::new("t", vec!["a".into(), "b".into()], features, vec![0, 1]).is_ok());
    }

    #[test]
    fn test_fingerprint_tracks_content() {
        let names = vec!["a".to_string()];
        let a = Dataset::new("a", names.clone(), arr2(&[[1.0], [2.0]]), vec![0, 1]).unwrap();
        let b = Dataset::new("b", names.clone(), arr2(&[[1.0], [2.0]]), vec![0, 1]).unwrap();
        let c = Dataset::new("c", names, arr2(&[[1.0], [2.5]]), vec![0, 1]).unwrap();

        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);
    }

    #[test]
    fn test_select_preserves_order() {
        let dataset = Dataset::new(
            "t",
            vec!["x".into()],
            arr2(&[[10.0], [20.0], [30.0]]),
            vec![0, 1, 0],
        )
        .unwrap();
        let (features, labels) = dataset.select(&[2, 0]);
        assert_eq!(features, arr2(&[[30.0], [10.0]]));
        assert_eq!(labels, vec![0, 0]);
    }
}
