use std::{fs, path::Path};

use serde::Deserialize;
use tch::{kind::Kind, CModule, Device, Tensor};

use super::{check_width, Classifier};
use crate::error::ModelError;
use crate::features::FeatureSchema;

/// `<stem>.meta.json` next to the TorchScript file.
#[derive(Deserialize)]
struct MetaJson {
    schema: FeatureSchema,
    #[serde(default = "default_classes")]
    classes: Vec<i64>,
}

fn default_classes() -> Vec<i64> {
    vec![0, 1]
}

pub struct TorchClassifier {
    model: CModule,
    device: Device,
    schema: FeatureSchema,
    classes: Vec<i64>,
}

impl TorchClassifier {
    pub fn load(model_path: &Path) -> Result<Self, ModelError> {
        let device = Device::Cpu;

        let meta_path = model_path.with_extension("meta.json");
        let meta_txt = fs::read_to_string(&meta_path).map_err(|e| {
            ModelError::Invalid(format!("failed to read meta at {}: {}", meta_path.display(), e))
        })?;
        let meta: MetaJson = serde_json::from_str(&meta_txt)?;
        meta.schema.validate()?;

        let model = CModule::load_on_device(model_path, device)?;

        // Probe output shape with a dummy forward; expect [1, C]
        let in_dim = meta.schema.len() as i64;
        let dummy = Tensor::zeros([1, in_dim], (Kind::Float, device));
        let out = tch::no_grad(|| model.forward_ts(&[dummy]))?;
        let sz = out.size();
        if sz.len() != 2 || sz[0] != 1 || sz[1] != meta.classes.len() as i64 {
            return Err(ModelError::Invalid(format!(
                "unexpected model output size {:?} for {} classes",
                sz,
                meta.classes.len()
            )));
        }
        tracing::info!("warmup forward ok");

        Ok(Self {
            model,
            device,
            schema: meta.schema,
            classes: meta.classes,
        })
    }
}

impl Classifier for TorchClassifier {
    fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<i64>, ModelError> {
        let d = self.schema.len();
        check_width(rows, d)?;
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let flat: Vec<f32> = rows.iter().flatten().map(|v| *v as f32).collect();
        let input = Tensor::from_slice(&flat)
            .reshape([rows.len() as i64, d as i64])
            .to_device(self.device);

        // [N, C] -> argmax over classes
        let out = tch::no_grad(|| self.model.forward_ts(&[input]))?;
        let idx = out.argmax(1, false).to_device(Device::Cpu);
        let idx = Vec::<i64>::try_from(&idx)?;

        idx.into_iter()
            .map(|i| {
                self.classes
                    .get(i as usize)
                    .copied()
                    .ok_or_else(|| ModelError::Invalid(format!("class index {} out of range", i)))
            })
            .collect()
    }

    fn kind(&self) -> &'static str {
        "torchscript"
    }
}
