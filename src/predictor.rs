//! Predictor - validation, scoring and result summary for one uploaded table

use serde::Serialize;

use crate::features::{self, parse_numeric, RawTable, ValidationError};
use crate::model::{Classifier, Label};
use crate::models::ResultCounts;

/// Optional ground-truth column used only for accuracy
pub const GROUND_TRUTH_COLUMN: &str = "Result";

#[derive(Debug, thiserror::Error)]
pub enum PredictError {
    #[error("Data Validation Failure: {0}")]
    Validation(#[from] ValidationError),

    #[error("Prediction model is not loaded. Service is unavailable.")]
    Unavailable,

    #[error("Unexpected prediction error: {0}")]
    Internal(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DetailedResult {
    #[serde(rename = "Prediction")]
    pub prediction: Label,
}

/// Response body of a successful prediction
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionSummary {
    pub status: &'static str,
    pub total_urls: usize,
    pub phishing_count: usize,
    pub legitimate_count: usize,
    pub detailed_results: Vec<DetailedResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
}

impl PredictionSummary {
    pub fn counts(&self) -> ResultCounts {
        ResultCounts {
            total_urls: self.total_urls as i64,
            phishing_count: self.phishing_count as i64,
            legitimate_count: self.legitimate_count as i64,
            accuracy: self.accuracy,
        }
    }
}

/// Holds the loaded model; shared read-only across requests
pub struct Predictor {
    model: Option<Box<dyn Classifier>>,
    model_version: String,
}

impl Predictor {
    pub fn new(model: Box<dyn Classifier>, model_version: impl Into<String>) -> Self {
        Self {
            model: Some(model),
            model_version: model_version.into(),
        }
    }

    /// Predictor with no model behind it; every call is `Unavailable`
    pub fn unloaded(model_version: impl Into<String>) -> Self {
        Self {
            model: None,
            model_version: model_version.into(),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.model.is_some()
    }

    pub fn model_version(&self) -> &str {
        &self.model_version
    }

    /// Decode an uploaded CSV and predict every row
    pub fn predict_csv(&self, data: &[u8]) -> Result<PredictionSummary, PredictError> {
        let table = RawTable::from_csv(data)
            .map_err(|e| ValidationError::Preprocessing(e.to_string()))?;
        self.predict(table)
    }

    pub fn predict(&self, mut table: RawTable) -> Result<PredictionSummary, PredictError> {
        let model = self.model.as_ref().ok_or(PredictError::Unavailable)?;

        // Split off before validation so the label column never reaches the model
        let truth_cells = table.take_column(GROUND_TRUTH_COLUMN);

        tracing::debug!(
            "Validating {} rows across {} columns",
            table.row_count(),
            table.headers().len()
        );
        let rows = features::validate(&table)?;
        let labels = model.predict(&rows);
        if labels.len() != rows.len() {
            return Err(PredictError::Internal(format!(
                "model returned {} labels for {} rows",
                labels.len(),
                rows.len()
            )));
        }

        let accuracy = match truth_cells {
            Some(cells) => {
                tracing::debug!("Ground truth '{}' column found, computing accuracy", GROUND_TRUTH_COLUMN);
                Some(accuracy(&parse_truth(&cells)?, &labels))
            }
            None => None,
        };
        if let Some(accuracy) = accuracy {
            tracing::info!("Prediction accuracy: {}%", accuracy);
        }

        let phishing_count = labels.iter().filter(|l| **l == Label::Phishing).count();

        Ok(PredictionSummary {
            status: "success",
            total_urls: labels.len(),
            phishing_count,
            legitimate_count: labels.len() - phishing_count,
            detailed_results: labels
                .into_iter()
                .map(|prediction| DetailedResult { prediction })
                .collect(),
            accuracy,
        })
    }
}

fn parse_truth(cells: &[String]) -> Result<Vec<f64>, PredictError> {
    cells
        .iter()
        .enumerate()
        .map(|(row, cell)| {
            parse_numeric(cell).ok_or_else(|| {
                PredictError::Internal(format!(
                    "ground truth value {:?} at row {} is not numeric",
                    cell, row
                ))
            })
        })
        .collect()
}

/// Percentage of matching labels, rounded to 2 decimals
fn accuracy(truth: &[f64], labels: &[Label]) -> f64 {
    if labels.is_empty() {
        return 0.0;
    }

    let correct = truth
        .iter()
        .zip(labels)
        .filter(|(t, l)| Label::from_code(**t) == Some(**l))
        .count();

    let percent = correct as f64 / labels.len() as f64 * 100.0;
    (percent * 100.0).round() / 100.0
}
