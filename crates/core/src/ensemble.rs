//! Weighted vote fusion. Pure: identical `(votes, config)` always
//! produces an identical result, which the optimizer relies on for
//! repeatable measurements.

use crate::config::WeightConfig;
use crate::models::{ClassificationResult, ClassificationVote};
use std::collections::BTreeMap;

/// Fuses adapter votes into one result.
///
/// Weighted score per vote is `confidence * method_weights[method]`
/// (missing weight counts as zero). The label with the largest summed
/// weighted score wins; ties prefer the label backed by the adapter with
/// the highest individual method weight, then the lexicographically
/// smallest label. Aggregate confidence is the winning share of the total
/// weighted mass, optionally boosted by the profile's quality factor and
/// always clamped to [0, 1].
pub fn vote(votes: &[ClassificationVote], config: &WeightConfig) -> ClassificationResult {
    if votes.is_empty() {
        return ClassificationResult::unclassified();
    }

    let mut method_breakdown: BTreeMap<String, f32> = BTreeMap::new();
    let mut label_sums: BTreeMap<&str, f64> = BTreeMap::new();
    for v in votes {
        let weighted = f64::from(v.confidence) * f64::from(config.weight(&v.method));
        method_breakdown.insert(v.method.clone(), weighted as f32);
        *label_sums.entry(v.label.as_str()).or_insert(0.0) += weighted;
    }

    let total: f64 = label_sums.values().sum();

    // BTreeMap iterates labels in ascending order, so with strict
    // comparisons the alphabetically smallest label survives a full tie.
    let mut winner: Option<(&str, f64, f64)> = None;
    for (label, sum) in &label_sums {
        let backing_weight = votes
            .iter()
            .filter(|v| v.label == *label)
            .map(|v| f64::from(config.weight(&v.method)))
            .fold(0.0, f64::max);
        let replace = match winner {
            None => true,
            Some((_, best_sum, best_weight)) => {
                *sum > best_sum || (*sum == best_sum && backing_weight > best_weight)
            }
        };
        if replace {
            winner = Some((*label, *sum, backing_weight));
        }
    }

    let (final_label, winning_sum, _) = winner.expect("votes is non-empty");

    let mut aggregate = if total > 0.0 {
        (winning_sum / total).clamp(0.0, 1.0) as f32
    } else {
        0.0
    };
    if let Some(factor) = config.quality_factor {
        aggregate = (aggregate * factor).min(1.0);
    }

    ClassificationResult {
        final_label: final_label.to_string(),
        aggregate_confidence: aggregate,
        votes: votes.to_vec(),
        method_breakdown,
    }
}
