use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::PredictError;
use crate::metrics::{accuracy, classification_report, ClassificationReport};
use crate::table::{SensorTable, PREDICTED};

pub const HEALTHY_BG: &str = "#d4edda";
pub const UNHEALTHY_BG: &str = "#f8d7da";

/// Cell background for a predicted label; unknown labels stay unstyled.
pub fn highlight(label: i64) -> Option<&'static str> {
    match label {
        1 => Some(HEALTHY_BG),
        0 => Some(UNHEALTHY_BG),
        _ => None,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Evaluation {
    pub accuracy: f64,
    pub report: ClassificationReport,
}

/// Everything rendered after a successful predict.
#[derive(Debug, Clone, Serialize)]
pub struct PredictionReport {
    pub rows: usize,
    pub predictions: Vec<i64>,
    /// Count per predicted label, for the distribution chart.
    pub counts: BTreeMap<i64, usize>,
    pub evaluation: Option<Evaluation>,
    /// `predictions.csv` body: every uploaded column plus `Predicted Condition`.
    #[serde(skip)]
    pub csv: Vec<u8>,
}

impl PredictionReport {
    pub fn build(table: &SensorTable, predictions: Vec<i64>) -> Result<Self, PredictError> {
        let csv = table.to_csv_with_column(PREDICTED, &predictions)?;

        let mut counts = BTreeMap::new();
        for p in &predictions {
            *counts.entry(*p).or_insert(0) += 1;
        }

        let evaluation = match table.ground_truth()? {
            Some(y_true) => Some(Evaluation {
                accuracy: accuracy(&y_true, &predictions)?,
                report: classification_report(&y_true, &predictions)?,
            }),
            None => None,
        };

        Ok(Self {
            rows: predictions.len(),
            predictions,
            counts,
            evaluation,
            csv,
        })
    }

    pub fn csv_text(&self) -> String {
        String::from_utf8_lossy(&self.csv).into_owned()
    }
}
