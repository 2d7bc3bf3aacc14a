use std::{fs, io::ErrorKind, path::Path, sync::Arc};

use serde::Deserialize;

use crate::error::{ModelError, PredictError};
use crate::features::{derive_features, FeatureSchema};
use crate::table::SensorTable;

mod forest;
mod logistic;
#[cfg(feature = "torch")]
mod torch;

pub use forest::{DecisionTree, RandomForest};
pub use logistic::LogisticModel;

/// A loaded, read-only binary classifier.
pub trait Classifier: Send + Sync {
    /// Inputs the model was trained on, in the order `predict` expects.
    fn schema(&self) -> &FeatureSchema;

    /// One label per row, same order as `rows`.
    fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<i64>, ModelError>;

    fn kind(&self) -> &'static str;
}

#[derive(Deserialize)]
struct ModelArtifact {
    schema: FeatureSchema,
    model: ModelSpec,
}

#[derive(Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum ModelSpec {
    Logistic(logistic::LogisticParams),
    Forest(forest::ForestParams),
}

/// Loads the artifact at `path`. Called once at startup.
///
/// `*.pt` files go to the TorchScript backend (cargo feature `torch`);
/// anything else is read as a JSON artifact.
pub fn load_model(path: impl AsRef<Path>) -> Result<Arc<dyn Classifier>, ModelError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(ModelError::NotFound(path.display().to_string()));
    }

    if path.extension().and_then(|e| e.to_str()) == Some("pt") {
        return load_torch(path);
    }

    let txt = fs::read_to_string(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => ModelError::NotFound(path.display().to_string()),
        _ => ModelError::Io(e),
    })?;
    from_json(&txt)
}

/// Parses a JSON artifact already in memory.
pub fn from_json(txt: &str) -> Result<Arc<dyn Classifier>, ModelError> {
    let artifact: ModelArtifact = serde_json::from_str(txt)?;
    artifact.schema.validate()?;

    let model: Arc<dyn Classifier> = match artifact.model {
        ModelSpec::Logistic(p) => Arc::new(LogisticModel::new(artifact.schema, p)?),
        ModelSpec::Forest(p) => Arc::new(RandomForest::new(artifact.schema, p)?),
    };
    Ok(model)
}

#[cfg(feature = "torch")]
fn load_torch(path: &Path) -> Result<Arc<dyn Classifier>, ModelError> {
    Ok(Arc::new(torch::TorchClassifier::load(path)?))
}

#[cfg(not(feature = "torch"))]
fn load_torch(path: &Path) -> Result<Arc<dyn Classifier>, ModelError> {
    Err(ModelError::Unsupported(format!(
        "{} is a TorchScript file; rebuild with `--features torch`",
        path.display()
    )))
}

/// Derives features for `table`, checks them against the model's schema
/// and runs inference.
pub fn predict_table(model: &dyn Classifier, table: &SensorTable) -> Result<Vec<i64>, PredictError> {
    let frame = derive_features(table)?;
    let rows = frame.select(model.schema())?;

    if tracing::enabled!(tracing::Level::DEBUG) {
        if let Some(first) = rows.first() {
            let sample: Vec<String> = model
                .schema()
                .features
                .iter()
                .zip(first)
                .take(6)
                .map(|(name, v)| format!("{}={:.3}", name, v))
                .collect();
            tracing::debug!(
                "predict rows={} in_dim={} sample=[{}]",
                rows.len(),
                first.len(),
                sample.join(", ")
            );
        }
    }

    let labels = model.predict(&rows)?;
    if labels.len() != rows.len() {
        return Err(ModelError::OutputLength {
            expected: rows.len(),
            actual: labels.len(),
        }
        .into());
    }
    Ok(labels)
}

pub(crate) fn check_width(rows: &[Vec<f64>], expected: usize) -> Result<(), ModelError> {
    match rows.iter().find(|r| r.len() != expected) {
        Some(r) => Err(ModelError::InvalidFeatureSize {
            expected,
            actual: r.len(),
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    pub(crate) const LOGISTIC: &str = r#"{
        "schema": {
            "name": "engine-health",
            "version": 1,
            "features": ["Coolant temp", "lub oil temp", "Fuel pressure",
                         "Lub oil pressure", "Engine rpm",
                         "Temp_Diff", "Pressure_Ratio", "Load_Temp_Ratio"]
        },
        "model": {
            "kind": "logistic",
            "coefficients": [0, 0, 0, 0, 0, 1, 0, 0],
            "intercept": 0
        }
    }"#;

    #[test]
    fn missing_file_is_not_found() {
        let err = load_model("/definitely/not/here/model.json").err().unwrap();
        assert!(matches!(err, ModelError::NotFound(_)));
    }

    #[test]
    fn loads_json_artifact_from_disk() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(LOGISTIC.as_bytes()).unwrap();
        let m = load_model(f.path()).unwrap();
        assert_eq!(m.kind(), "logistic");
        assert_eq!(m.schema().version, 1);
    }

    #[test]
    fn garbage_artifact_is_json_error() {
        let err = from_json("not json").err().unwrap();
        assert!(matches!(err, ModelError::Json(_)));
    }

    #[test]
    fn predict_table_uses_derived_columns() {
        let m = from_json(LOGISTIC).unwrap();
        let t = SensorTable::from_csv_bytes(
            b"Coolant temp,lub oil temp,Fuel pressure,Lub oil pressure,Engine rpm,Engine Condition\n\
              80,75,10,3,1000,1\n\
              70,75,10,3,1000,0\n",
        )
        .unwrap();
        // Temp_Diff > 0 => healthy
        assert_eq!(predict_table(m.as_ref(), &t).unwrap(), vec![1, 0]);
    }

    #[test]
    fn schema_mismatch_surfaces_as_predict_error() {
        let m = from_json(LOGISTIC).unwrap();
        let t = SensorTable::from_csv_bytes(
            b"Coolant temp,lub oil temp,Fuel pressure,Lub oil pressure,Engine rpm,Coolant pressure\n\
              80,75,10,3,1000,2\n",
        )
        .unwrap();
        let err = predict_table(m.as_ref(), &t).unwrap_err();
        assert!(err.user_message().contains("unexpected [Coolant pressure]"));
    }

    #[cfg(not(feature = "torch"))]
    #[test]
    fn torchscript_needs_feature() {
        let f = tempfile::Builder::new().suffix(".pt").tempfile().unwrap();
        let err = load_model(f.path()).err().unwrap();
        assert!(matches!(err, ModelError::Unsupported(_)));
    }
}
