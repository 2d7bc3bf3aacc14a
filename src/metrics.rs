use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

use crate::error::MetricsError;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassMetrics {
    pub label: String,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub support: usize,
}

/// Per-class precision/recall/F1 plus accuracy and macro/weighted averages.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationReport {
    pub classes: Vec<ClassMetrics>,
    pub accuracy: f64,
    pub macro_avg: ClassMetrics,
    pub weighted_avg: ClassMetrics,
    pub total: usize,
}

fn check(y_true: &[i64], y_pred: &[i64]) -> Result<(), MetricsError> {
    if y_true.len() != y_pred.len() {
        return Err(MetricsError::LengthMismatch {
            expected: y_true.len(),
            actual: y_pred.len(),
        });
    }
    if y_true.is_empty() {
        return Err(MetricsError::Empty);
    }
    Ok(())
}

/// Fraction of exact label matches.
pub fn accuracy(y_true: &[i64], y_pred: &[i64]) -> Result<f64, MetricsError> {
    check(y_true, y_pred)?;
    let hits = y_true.iter().zip(y_pred).filter(|(t, p)| t == p).count();
    Ok(hits as f64 / y_true.len() as f64)
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

fn f1(precision: f64, recall: f64) -> f64 {
    if precision + recall == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / (precision + recall)
    }
}

/// Classes are the sorted union of labels seen in either vector.
/// Ill-defined ratios (zero denominator) score 0.
pub fn classification_report(y_true: &[i64], y_pred: &[i64]) -> Result<ClassificationReport, MetricsError> {
    let acc = accuracy(y_true, y_pred)?;
    let labels: BTreeSet<i64> = y_true.iter().chain(y_pred).copied().collect();
    let total = y_true.len();

    let classes: Vec<ClassMetrics> = labels
        .iter()
        .map(|&label| {
            let tp = y_true
                .iter()
                .zip(y_pred)
                .filter(|(t, p)| **t == label && **p == label)
                .count();
            let predicted = y_pred.iter().filter(|p| **p == label).count();
            let support = y_true.iter().filter(|t| **t == label).count();
            let precision = ratio(tp, predicted);
            let recall = ratio(tp, support);
            ClassMetrics {
                label: label.to_string(),
                precision,
                recall,
                f1_score: f1(precision, recall),
                support,
            }
        })
        .collect();

    let n = classes.len() as f64;
    let macro_avg = ClassMetrics {
        label: "macro avg".into(),
        precision: classes.iter().map(|c| c.precision).sum::<f64>() / n,
        recall: classes.iter().map(|c| c.recall).sum::<f64>() / n,
        f1_score: classes.iter().map(|c| c.f1_score).sum::<f64>() / n,
        support: total,
    };
    let w = |get: fn(&ClassMetrics) -> f64| {
        classes
            .iter()
            .map(|c| get(c) * c.support as f64)
            .sum::<f64>()
            / total as f64
    };
    let weighted_avg = ClassMetrics {
        label: "weighted avg".into(),
        precision: w(|c| c.precision),
        recall: w(|c| c.recall),
        f1_score: w(|c| c.f1_score),
        support: total,
    };

    Ok(ClassificationReport {
        classes,
        accuracy: acc,
        macro_avg,
        weighted_avg,
        total,
    })
}

impl fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:>14} {:>9} {:>9} {:>9} {:>9}", "", "precision", "recall", "f1-score", "support")?;
        for c in &self.classes {
            writeln!(
                f,
                "{:>14} {:>9.2} {:>9.2} {:>9.2} {:>9}",
                c.label, c.precision, c.recall, c.f1_score, c.support
            )?;
        }
        writeln!(f, "{:>14} {:>9} {:>9} {:>9.2} {:>9}", "accuracy", "", "", self.accuracy, self.total)?;
        for c in [&self.macro_avg, &self.weighted_avg] {
            writeln!(
                f,
                "{:>14} {:>9.2} {:>9.2} {:>9.2} {:>9}",
                c.label, c.precision, c.recall, c.f1_score, c.support
            )?;
        }
        Ok(())
    }
}
