//! Side-by-side comparison of evaluated variants.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use crate::evaluation::{ConfusionMatrix, EvaluationResult, ImportanceMethod};
use crate::insight_core::{ClassifierKind, FeatureImportance};

/// One evaluated variant in ranked position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportEntry {
    /// 1-based position after sorting
    pub rank: usize,
    pub variant: ClassifierKind,
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub cost: usize,
    pub confusion: ConfusionMatrix,
    pub importance_method: ImportanceMethod,
    pub importances: Vec<FeatureImportance>,
}

/// A variant's view of one predictor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantRank {
    pub variant: ClassifierKind,
    pub rank: usize,
    pub score: f64,
}

/// A predictor with every variant's rank for it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinedImportance {
    pub feature: String,
    /// Smallest rank any variant gave this predictor
    pub best_rank: usize,
    pub by_variant: Vec<VariantRank>,
}

/// Ranked comparison of every evaluated variant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub entries: Vec<ReportEntry>,
    pub combined_importance: Vec<CombinedImportance>,
}

/// Order by accuracy descending, then lower cost, then variant name
fn compare_results(a: &EvaluationResult, b: &EvaluationResult) -> Ordering {
    b.accuracy
        .partial_cmp(&a.accuracy)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.cost.cmp(&b.cost))
        .then_with(|| a.variant.as_str().cmp(b.variant.as_str()))
}

/// Build a report from per-variant evaluation results
pub fn assemble(mut results: Vec<EvaluationResult>) -> Report {
    results.sort_by(compare_results);

    let mut union: BTreeMap<String, Vec<VariantRank>> = BTreeMap::new();
    for result in &results {
        for importance in &result.importances {
            union.entry(importance.feature.clone()).or_default().push(VariantRank {
                variant: result.variant,
                rank: importance.rank,
                score: importance.score,
            });
        }
    }

    let mut combined_importance: Vec<CombinedImportance> = union
        .into_iter()
        .map(|(feature, by_variant)| CombinedImportance {
            best_rank: by_variant.iter().map(|v| v.rank).min().unwrap_or(usize::MAX),
            feature,
            by_variant,
        })
        .collect();
    // BTreeMap iteration already sorted by name, so a stable sort keeps that as the tie-break
    combined_importance.sort_by_key(|c| c.best_rank);

    let entries = results
        .into_iter()
        .enumerate()
        .map(|(pos, result)| ReportEntry {
            rank: pos + 1,
            variant: result.variant,
            accuracy: result.accuracy,
            precision: result.precision,
            recall: result.recall,
            f1: result.f1,
            cost: result.cost,
            confusion: result.confusion,
            importance_method: result.importance_method,
            importances: result.importances,
        })
        .collect();

    Report {
        entries,
        combined_importance,
    }
}

impl Report {
    /// The top-ranked variant, if any were evaluated
    pub fn best(&self) -> Option<&ReportEntry> {
        self.entries.first()
    }

    pub fn entry(&self, variant: ClassifierKind) -> Option<&ReportEntry> {
        self.entries.iter().find(|e| e.variant == variant)
    }

    /// Human-readable multi-section summary, the same text as `Display`
    pub fn render_text(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Model comparison ===")?;
        writeln!(
            f,
            "{:<5} {:<10} {:>9} {:>10} {:>8} {:>8} {:>8}",
            "rank", "variant", "accuracy", "precision", "recall", "f1", "cost"
        )?;
        for e in &self.entries {
            writeln!(
                f,
                "{:<5} {:<10} {:>9.4} {:>10.4} {:>8.4} {:>8.4} {:>8}",
                e.rank, e.variant, e.accuracy, e.precision, e.recall, e.f1, e.cost
            )?;
        }
        if let Some(best) = self.best() {
            writeln!(f, "\nBest: {} (accuracy {:.4})", best.variant, best.accuracy)?;
        }

        for e in &self.entries {
            let c = &e.confusion;
            writeln!(f, "\n=== Confusion matrix: {} ===", e.variant)?;
            writeln!(f, "{:<10} {:>8} {:>8}", "", "pred=0", "pred=1")?;
            writeln!(f, "{:<10} {:>8} {:>8}", "true=0", c.true_negative, c.false_positive)?;
            writeln!(f, "{:<10} {:>8} {:>8}", "true=1", c.false_negative, c.true_positive)?;
        }

        writeln!(f, "\n=== Feature importance ===")?;
        write!(f, "{:<24}", "feature")?;
        for e in &self.entries {
            write!(f, " {:>18}", format!("{} rank/score", e.variant))?;
        }
        writeln!(f)?;
        for row in &self.combined_importance {
            write!(f, "{:<24}", row.feature)?;
            for e in &self.entries {
                let cell = row
                    .by_variant
                    .iter()
                    .find(|v| v.variant == e.variant)
                    .map(|v| format!("{} / {:.4}", v.rank, v.score))
                    .unwrap_or_else(|| "-".to_string());
                write!(f, " {:>18}", cell)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
