//! The data-provider surface the training session pulls samples from, plus
//! a concrete CSV-backed provider adapted from the teacher's flat-CSV
//! loading and sequential train/test split.

use std::fs::File;
use std::io::{BufRead, BufReader};

use crate::errors::{NeuroxError, NeuroxResult};
use crate::volume::{Shape, Volume};

/// What a sample's target represents.
pub enum SampleTarget {
    ClassIndex(usize),
    Vector(Volume),
}

pub struct Sample {
    pub input: Volume,
    pub target: SampleTarget,
}

/// Consumed by `Session`: yields `count()` samples of a fixed `shape()`,
/// either class-indexed or vector-targeted per `is_data_result()`.
pub trait DataProvider {
    fn count(&self) -> usize;
    fn shape(&self) -> Shape;
    fn class_count(&self) -> usize;
    /// `true` when samples carry target vectors (regression); `false` when
    /// they carry integer class labels (classification).
    fn is_data_result(&self) -> bool;
    fn sample(&self, index: usize) -> Sample;
}

/// How the trailing columns of a CSV row are interpreted.
pub enum CsvLabel {
    /// The last column is an integer class index; `class_count` classes.
    ClassColumn { class_count: usize },
    /// The last `width` columns are a target vector.
    VectorColumns { width: usize },
}

/// Loads a rectangular grid of `f32` values from a headerless CSV file —
/// one row per sample, feature columns followed by the label columns
/// `CsvLabel` describes. Parsing errors default a cell to `0.0`.
pub struct CsvDataProvider {
    rows: Vec<Vec<f32>>,
    shape: Shape,
    label: CsvLabel,
}

impl CsvDataProvider {
    pub fn from_path(path: &str, shape: Shape, label: CsvLabel) -> NeuroxResult<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let mut rows = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let values: Vec<f32> = line.split(',').map(|s| s.trim().parse::<f32>().unwrap_or(0.0)).collect();
            rows.push(values);
        }

        if rows.is_empty() {
            return Err(NeuroxError::Config(crate::errors::ConfigError::InvalidData(
                "csv file has no rows".into(),
            )));
        }

        let expected_cols = shape.len() + label.width();
        for row in &rows {
            if row.len() != expected_cols {
                return Err(NeuroxError::Config(crate::errors::ConfigError::InvalidData(format!(
                    "csv row has {} columns, expected {expected_cols}",
                    row.len()
                ))));
            }
        }

        Ok(Self { rows, shape, label })
    }

    /// Sequentially splits rows into a training and a test provider: the
    /// first `ratio` proportion of rows train, the remainder test.
    ///
    /// # Panics
    /// Panics if `ratio` is not in `(0.0, 1.0)`.
    pub fn train_test_split(self, ratio: f32) -> (Self, Self) {
        assert!(ratio > 0.0 && ratio < 1.0, "split ratio must be between 0.0 and 1.0");
        let split_at = ((self.rows.len() as f32) * ratio).round() as usize;
        let mut rows = self.rows;
        let test_rows = rows.split_off(split_at);
        let train = Self {
            rows,
            shape: self.shape,
            label: self.label.clone_label(),
        };
        let test = Self {
            rows: test_rows,
            shape: self.shape,
            label: self.label,
        };
        (train, test)
    }
}

impl CsvLabel {
    fn width(&self) -> usize {
        match self {
            CsvLabel::ClassColumn { .. } => 1,
            CsvLabel::VectorColumns { width } => *width,
        }
    }

    fn clone_label(&self) -> CsvLabel {
        match self {
            CsvLabel::ClassColumn { class_count } => CsvLabel::ClassColumn { class_count: *class_count },
            CsvLabel::VectorColumns { width } => CsvLabel::VectorColumns { width: *width },
        }
    }
}

impl DataProvider for CsvDataProvider {
    fn count(&self) -> usize {
        self.rows.len()
    }

    fn shape(&self) -> Shape {
        self.shape
    }

    fn class_count(&self) -> usize {
        match self.label {
            CsvLabel::ClassColumn { class_count } => class_count,
            CsvLabel::VectorColumns { width } => width,
        }
    }

    fn is_data_result(&self) -> bool {
        matches!(self.label, CsvLabel::VectorColumns { .. })
    }

    fn sample(&self, index: usize) -> Sample {
        let row = &self.rows[index];
        let feature_len = self.shape.len();
        let input = Volume::from_values(
            self.shape.width,
            self.shape.height,
            self.shape.depth,
            row[..feature_len].to_vec(),
        );

        let target = match self.label {
            CsvLabel::ClassColumn { .. } => SampleTarget::ClassIndex(row[feature_len] as usize),
            CsvLabel::VectorColumns { width } => {
                SampleTarget::Vector(Volume::from_values(1, 1, width, row[feature_len..feature_len + width].to_vec()))
            }
        };

        Sample { input, target }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static COUNTER: AtomicUsize = AtomicUsize::new(0);

    fn write_temp_csv(contents: &str) -> String {
        let id = COUNTER.fetch_add(1, Ordering::Relaxed);
        let path = std::env::temp_dir().join(format!("neurox_test_{}_{}.csv", std::process::id(), id));
        let mut f = File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path.to_str().unwrap().to_string()
    }

    #[test]
    fn classification_rows_split_features_from_label() {
        let path = write_temp_csv("1.0,2.0,0\n3.0,4.0,1\n");
        let provider = CsvDataProvider::from_path(&path, Shape::new(1, 1, 2), CsvLabel::ClassColumn { class_count: 2 }).unwrap();
        assert_eq!(provider.count(), 2);
        let sample = provider.sample(1);
        assert_eq!(sample.input.values, vec![3.0, 4.0]);
        assert!(matches!(sample.target, SampleTarget::ClassIndex(1)));
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn train_test_split_is_sequential() {
        let path = write_temp_csv("1.0,0\n2.0,0\n3.0,1\n4.0,1\n");
        let provider = CsvDataProvider::from_path(&path, Shape::new(1, 1, 1), CsvLabel::ClassColumn { class_count: 2 }).unwrap();
        let (train, test) = provider.train_test_split(0.5);
        assert_eq!(train.count(), 2);
        assert_eq!(test.count(), 2);
        assert_eq!(train.sample(0).input.values, vec![1.0]);
        assert_eq!(test.sample(0).input.values, vec![3.0]);
        std::fs::remove_file(path).ok();
    }
}
