use std::collections::BTreeMap;

use crate::domain::{Indicator, NOT_APPLICABLE};

/// One row of a project's indicator configuration: the display rank and an
/// optional explicit weight.
#[derive(Debug, Clone)]
pub struct IndicatorPriority {
    pub indicator: Indicator,
    pub rank: i32,
    pub weight: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct WeightedOverall {
    /// Weighted overall score on the 0..1 scale, 0.0 when nothing countable
    /// carried weight.
    pub overall: f64,
    /// Normalized copy of the applied weights, present only when the project
    /// had a configuration at all.
    pub snapshot: Option<BTreeMap<Indicator, f64>>,
}

/// Combines per-indicator scores into one overall score.
///
/// Three modes, decided by the project configuration:
/// a configuration with at least one explicit weight is used as-is, a
/// configuration without explicit weights spreads 1/n over its indicators,
/// and no configuration at all degrades to a plain mean of the countable
/// scores. Sentinel or NaN scores never contribute, and neither do missing,
/// zero or negative weights.
pub fn weigh(
    scores: &BTreeMap<Indicator, f64>,
    priorities: &[IndicatorPriority],
) -> WeightedOverall {
    let has_config = !priorities.is_empty();
    let has_explicit_weights = priorities.iter().any(|p| p.weight.is_some());

    let mut weights: BTreeMap<Indicator, f64> = BTreeMap::new();
    if has_config {
        if has_explicit_weights {
            for priority in priorities {
                let weight = priority.weight.unwrap_or(0.0);
                weights.insert(priority.indicator, if weight.is_nan() { 0.0 } else { weight });
            }
        } else {
            let equal = 1.0 / priorities.len() as f64;
            for priority in priorities {
                weights.insert(priority.indicator, equal);
            }
        }
    }

    let mut weighted_sum = 0.0;
    let mut total_weight = 0.0;
    for (indicator, score) in scores {
        if *score == NOT_APPLICABLE || score.is_nan() {
            continue;
        }
        let weight = if has_config {
            weights.get(indicator).copied().unwrap_or(0.0)
        } else {
            1.0
        };
        if weight <= 0.0 {
            continue;
        }
        weighted_sum += score * weight;
        total_weight += weight;
    }

    let overall = if total_weight > 0.0 {
        weighted_sum / total_weight
    } else {
        0.0
    };

    let snapshot = if has_config {
        let sum: f64 = weights.values().sum();
        if sum > 0.0 {
            Some(weights.iter().map(|(k, v)| (*k, v / sum)).collect())
        } else {
            // Degenerate configuration, keep it raw rather than divide by zero.
            Some(weights)
        }
    } else {
        None
    };

    WeightedOverall { overall, snapshot }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn priority(indicator: Indicator, weight: Option<f64>) -> IndicatorPriority {
        IndicatorPriority {
            indicator,
            rank: 1,
            weight,
        }
    }

    #[test]
    fn test_no_config_takes_plain_mean() {
        let scores = BTreeMap::from([(Indicator::Safety, 0.9), (Indicator::Privacy, 0.3)]);
        let result = weigh(&scores, &[]);
        assert!((result.overall - 0.6).abs() < 1e-12);
        assert!(result.snapshot.is_none());
    }

    #[test]
    fn test_equal_weights_skip_sentinel_scores() {
        let scores = BTreeMap::from([
            (Indicator::Accuracy, 0.9),
            (Indicator::Reliability, NOT_APPLICABLE),
        ]);
        let priorities = vec![
            priority(Indicator::Accuracy, None),
            priority(Indicator::Reliability, None),
        ];
        let result = weigh(&scores, &priorities);
        // Only ACCURACY carries weight, so its score is the overall score.
        assert!((result.overall - 0.9).abs() < 1e-12);
        let snapshot = result.snapshot.unwrap();
        assert!((snapshot[&Indicator::Accuracy] - 0.5).abs() < 1e-12);
        assert!((snapshot[&Indicator::Reliability] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_explicit_weights_are_used_as_given() {
        let scores = BTreeMap::from([(Indicator::Safety, 1.0), (Indicator::Privacy, 0.5)]);
        let priorities = vec![
            priority(Indicator::Safety, Some(3.0)),
            priority(Indicator::Privacy, Some(1.0)),
        ];
        let result = weigh(&scores, &priorities);
        assert!((result.overall - 0.875).abs() < 1e-12);
    }

    #[test]
    fn test_snapshot_normalizes_and_is_idempotent() {
        let scores = BTreeMap::from([(Indicator::Safety, 0.8), (Indicator::Privacy, 0.8)]);

        let unnormalized = vec![
            priority(Indicator::Safety, Some(2.0)),
            priority(Indicator::Privacy, Some(6.0)),
        ];
        let snapshot = weigh(&scores, &unnormalized).snapshot.unwrap();
        assert!((snapshot[&Indicator::Safety] - 0.25).abs() < 1e-12);
        assert!((snapshot[&Indicator::Privacy] - 0.75).abs() < 1e-12);

        let already_normalized = vec![
            priority(Indicator::Safety, Some(0.3)),
            priority(Indicator::Privacy, Some(0.7)),
        ];
        let snapshot = weigh(&scores, &already_normalized).snapshot.unwrap();
        assert!((snapshot[&Indicator::Safety] - 0.3).abs() < 1e-12);
        assert!((snapshot[&Indicator::Privacy] - 0.7).abs() < 1e-12);
    }

    #[test]
    fn test_nonpositive_weights_contribute_nothing() {
        let scores = BTreeMap::from([(Indicator::Safety, 1.0), (Indicator::Privacy, 0.2)]);
        let priorities = vec![
            priority(Indicator::Safety, Some(0.0)),
            priority(Indicator::Privacy, Some(2.0)),
        ];
        let result = weigh(&scores, &priorities);
        assert!((result.overall - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_nothing_countable_yields_zero_overall() {
        let scores = BTreeMap::from([(Indicator::Safety, NOT_APPLICABLE)]);
        let result = weigh(&scores, &[priority(Indicator::Safety, Some(1.0))]);
        assert_eq!(result.overall, 0.0);
        assert!(result.snapshot.is_some());
    }

    #[test]
    fn test_configured_but_unscored_indicators_are_ignored() {
        // Weight on an indicator the survey never scored must not dilute.
        let scores = BTreeMap::from([(Indicator::Safety, 0.6)]);
        let priorities = vec![
            priority(Indicator::Safety, Some(1.0)),
            priority(Indicator::Transparency, Some(9.0)),
        ];
        let result = weigh(&scores, &priorities);
        assert!((result.overall - 0.6).abs() < 1e-12);
    }
}
