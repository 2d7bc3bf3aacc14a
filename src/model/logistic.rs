use serde::Deserialize;

use super::{check_width, Classifier};
use crate::error::ModelError;
use crate::features::FeatureSchema;

#[derive(Debug, Deserialize)]
pub(crate) struct LogisticParams {
    coefficients: Vec<f64>,
    intercept: f64,
    #[serde(default = "default_threshold")]
    threshold: f64,
    /// Optional standardization applied before the linear term.
    #[serde(default)]
    mean: Option<Vec<f64>>,
    #[serde(default)]
    scale: Option<Vec<f64>>,
}

fn default_threshold() -> f64 {
    0.5
}

/// Binary logistic regression: label 1 iff sigmoid(z) >= threshold.
#[derive(Debug)]
pub struct LogisticModel {
    schema: FeatureSchema,
    coefficients: Vec<f64>,
    intercept: f64,
    threshold: f64,
    mean: Vec<f64>,
    scale: Vec<f64>,
}

impl LogisticModel {
    pub(crate) fn new(schema: FeatureSchema, p: LogisticParams) -> Result<Self, ModelError> {
        let d = schema.len();
        if p.coefficients.len() != d {
            return Err(ModelError::Invalid(format!(
                "{} coefficients for {} features",
                p.coefficients.len(),
                d
            )));
        }
        if !(0.0..=1.0).contains(&p.threshold) {
            return Err(ModelError::Invalid(format!(
                "threshold {} outside [0, 1]",
                p.threshold
            )));
        }

        let mean = p.mean.unwrap_or_else(|| vec![0.0; d]);
        let scale = p.scale.unwrap_or_else(|| vec![1.0; d]);
        if mean.len() != d || scale.len() != d {
            return Err(ModelError::Invalid("scaler length does not match schema".into()));
        }
        if scale.iter().any(|s| *s == 0.0) {
            return Err(ModelError::Invalid("scaler has a zero scale".into()));
        }

        Ok(Self {
            schema,
            coefficients: p.coefficients,
            intercept: p.intercept,
            threshold: p.threshold,
            mean,
            scale,
        })
    }

    pub fn probability(&self, x: &[f64]) -> f64 {
        let z = self.intercept
            + self
                .coefficients
                .iter()
                .zip(x)
                .zip(self.mean.iter().zip(&self.scale))
                .map(|((w, v), (m, s))| w * (v - m) / s)
                .sum::<f64>();
        1.0 / (1.0 + (-z).exp())
    }
}

impl Classifier for LogisticModel {
    fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<i64>, ModelError> {
        check_width(rows, self.schema.len())?;
        Ok(rows
            .iter()
            .map(|x| i64::from(self.probability(x) >= self.threshold))
            .collect())
    }

    fn kind(&self) -> &'static str {
        "logistic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema(n: usize) -> FeatureSchema {
        FeatureSchema {
            name: "t".into(),
            version: 1,
            features: (0..n).map(|i| format!("f{i}")).collect(),
        }
    }

    fn params(coefficients: Vec<f64>, intercept: f64) -> LogisticParams {
        LogisticParams {
            coefficients,
            intercept,
            threshold: 0.5,
            mean: None,
            scale: None,
        }
    }

    #[test]
    fn zero_input_sits_on_the_boundary() {
        let m = LogisticModel::new(schema(2), params(vec![1.0, -1.0], 0.0)).unwrap();
        assert_eq!(m.probability(&[0.0, 0.0]), 0.5);
        assert_eq!(m.predict(&[vec![0.0, 0.0], vec![-3.0, 0.0]]).unwrap(), vec![1, 0]);
    }

    #[test]
    fn scaler_is_applied() {
        let mut p = params(vec![1.0], 0.0);
        p.mean = Some(vec![10.0]);
        p.scale = Some(vec![2.0]);
        let m = LogisticModel::new(schema(1), p).unwrap();
        // (9 - 10) / 2 < 0
        assert_eq!(m.predict(&[vec![9.0], vec![11.0]]).unwrap(), vec![0, 1]);
    }

    #[test]
    fn coefficient_count_must_match_schema() {
        assert!(LogisticModel::new(schema(3), params(vec![1.0], 0.0)).is_err());
    }

    #[test]
    fn wrong_row_width_is_rejected() {
        let m = LogisticModel::new(schema(2), params(vec![1.0, 1.0], 0.0)).unwrap();
        let err = m.predict(&[vec![1.0]]).unwrap_err();
        assert!(matches!(
            err,
            ModelError::InvalidFeatureSize { expected: 2, actual: 1 }
        ));
    }
}
