use serde::{Deserialize, Serialize};

use crate::error::{ModelError, TableError};
use crate::table::{parse_number, SensorTable, GROUND_TRUTH};

pub const COOLANT_TEMP: &str = "Coolant temp";
pub const LUB_OIL_TEMP: &str = "lub oil temp";
pub const FUEL_PRESSURE: &str = "Fuel pressure";
pub const LUB_OIL_PRESSURE: &str = "Lub oil pressure";
pub const ENGINE_RPM: &str = "Engine rpm";

pub const REQUIRED_COLUMNS: [&str; 5] = [
    COOLANT_TEMP,
    LUB_OIL_TEMP,
    FUEL_PRESSURE,
    LUB_OIL_PRESSURE,
    ENGINE_RPM,
];

pub const TEMP_DIFF: &str = "Temp_Diff";
pub const PRESSURE_RATIO: &str = "Pressure_Ratio";
pub const LOAD_TEMP_RATIO: &str = "Load_Temp_Ratio";

pub const DERIVED_COLUMNS: [&str; 3] = [TEMP_DIFF, PRESSURE_RATIO, LOAD_TEMP_RATIO];

/// The three derived values for one row. Denominators carry `+ 1` so a
/// sensor reading of 0 never divides by zero; this must stay identical
/// to the transformation the model was trained with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DerivedFeatures {
    pub temp_diff: f64,
    pub pressure_ratio: f64,
    pub load_temp_ratio: f64,
}

impl DerivedFeatures {
    pub fn compute(
        coolant_temp: f64,
        lub_oil_temp: f64,
        fuel_pressure: f64,
        lub_oil_pressure: f64,
        engine_rpm: f64,
    ) -> Self {
        Self {
            temp_diff: coolant_temp - lub_oil_temp,
            pressure_ratio: fuel_pressure / (lub_oil_pressure + 1.0),
            load_temp_ratio: engine_rpm / (lub_oil_temp + 1.0),
        }
    }

    fn values(&self) -> [f64; 3] {
        [self.temp_diff, self.pressure_ratio, self.load_temp_ratio]
    }
}

/// Named, versioned list of the inputs a model was trained on, in the
/// order it expects them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    pub name: String,
    pub version: u32,
    pub features: Vec<String>,
}

impl FeatureSchema {
    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        if self.features.is_empty() {
            return Err(ModelError::Invalid(format!(
                "schema '{}' lists no features",
                self.name
            )));
        }
        for (i, f) in self.features.iter().enumerate() {
            if self.features[..i].contains(f) {
                return Err(ModelError::Invalid(format!(
                    "schema '{}' lists feature '{}' twice",
                    self.name, f
                )));
            }
        }
        Ok(())
    }
}

/// Numeric view of an upload: every non-label column plus the derived
/// ones, row-major.
#[derive(Debug, Clone)]
pub struct FeatureFrame {
    columns: Vec<String>,
    rows: Vec<Vec<f64>>,
}

impl FeatureFrame {
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let idx = self.columns.iter().position(|c| c == name)?;
        Some(self.rows.iter().map(|r| r[idx]).collect())
    }

    /// Reorders columns into schema order. Columns are matched by name;
    /// any missing or extra column is a mismatch.
    pub fn select(&self, schema: &FeatureSchema) -> Result<Vec<Vec<f64>>, ModelError> {
        let missing: Vec<String> = schema
            .features
            .iter()
            .filter(|f| !self.columns.contains(f))
            .cloned()
            .collect();
        let unexpected: Vec<String> = self
            .columns
            .iter()
            .filter(|c| !schema.features.contains(c))
            .cloned()
            .collect();
        if !missing.is_empty() || !unexpected.is_empty() {
            return Err(ModelError::SchemaMismatch {
                schema: schema.name.clone(),
                version: schema.version,
                missing,
                unexpected,
            });
        }

        let order: Vec<usize> = schema
            .features
            .iter()
            .filter_map(|f| self.columns.iter().position(|c| c == f))
            .collect();

        Ok(self
            .rows
            .iter()
            .map(|row| order.iter().map(|&i| row[i]).collect())
            .collect())
    }
}

/// Builds the model input for `table`: drops the ground-truth column,
/// parses the rest as numbers and appends the derived columns.
pub fn derive_features(table: &SensorTable) -> Result<FeatureFrame, TableError> {
    let missing: Vec<String> = REQUIRED_COLUMNS
        .iter()
        .filter(|c| !table.has_column(c))
        .map(|c| c.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(TableError::MissingColumns(missing));
    }

    let kept: Vec<(usize, &String)> = table
        .headers()
        .iter()
        .enumerate()
        .filter(|(_, h)| h.as_str() != GROUND_TRUTH)
        .collect();

    let pos = |name: &str| kept.iter().position(|(_, h)| h.as_str() == name);
    // REQUIRED_COLUMNS are present and never the label column
    let [ct, lot, fp, lop, rpm] = REQUIRED_COLUMNS.map(|c| pos(c).unwrap_or_default());

    let mut columns: Vec<String> = kept.iter().map(|(_, h)| h.to_string()).collect();
    columns.extend(DERIVED_COLUMNS.iter().map(|c| c.to_string()));

    let mut rows = Vec::with_capacity(table.len());
    for (row_idx, cells) in table.rows().enumerate() {
        let mut row = Vec::with_capacity(columns.len());
        for (idx, name) in &kept {
            row.push(parse_number(name, row_idx, cells[*idx])?);
        }
        let derived = DerivedFeatures::compute(row[ct], row[lot], row[fp], row[lop], row[rpm]);
        row.extend(derived.values());
        rows.push(row);
    }

    Ok(FeatureFrame { columns, rows })
}
