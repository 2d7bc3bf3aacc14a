//! Engine health prediction service.
//!
//! An uploaded CSV of engine sensor readings gets three derived features,
//! runs through a pre-trained binary classifier and comes back annotated
//! with a `Predicted Condition` column, a label distribution and, when the
//! upload carries `Engine Condition` ground truth, accuracy metrics.

pub mod config;
pub mod error;
pub mod features;
pub mod metrics;
pub mod model;
pub mod report;
pub mod session;
pub mod table;
pub mod web;
