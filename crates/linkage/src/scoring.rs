//! Scoring: run each scheme's algorithm ensemble on a compatible pair.

use tracing::{debug, warn};

use crate::model::{AlgorithmScore, Record, Schema, SchemeScore, ScoreRecord, SkipReason, SkippedScheme};
use crate::ruleset::{AlgorithmSpec, ConfigModel, MatchingScheme};
use crate::similarity::round_score;

/// Schemes that take part in this run, in configured order, plus the ones
/// left out and why. A scheme whose key column is absent from its dataset
/// is deactivated for the whole run rather than failing it.
pub fn active_schemes<'a>(
    model: &'a ConfigModel,
    left: &Schema,
    right: &Schema,
) -> (Vec<&'a MatchingScheme>, Vec<SkippedScheme>) {
    let mut active = Vec::new();
    let mut skipped = Vec::new();

    for scheme in model.schemes() {
        let reason = if !scheme.in_use {
            debug!(scheme = %scheme.name, "scheme not in use, skipping");
            Some(SkipReason::NotInUse)
        } else if !left.contains(&scheme.left_key) {
            Some(SkipReason::MissingLeftKey {
                field: scheme.left_key.clone(),
            })
        } else if !right.contains(&scheme.right_key) {
            Some(SkipReason::MissingRightKey {
                field: scheme.right_key.clone(),
            })
        } else {
            None
        };

        match reason {
            None => active.push(scheme),
            Some(reason) => {
                if reason != SkipReason::NotInUse {
                    warn!(scheme = %scheme.name, "{reason}, skipping scheme");
                }
                skipped.push(SkippedScheme {
                    scheme: scheme.name.clone(),
                    reason,
                });
            }
        }
    }

    (active, skipped)
}

/// Score one pair against every scheme. The pair is accepted iff each
/// scheme's aggregate reaches its threshold; all schemes are scored either
/// way so rejected pairs keep their full diagnostics.
pub fn evaluate(
    row_a: &Record,
    row_b: &Record,
    schemes: &[&MatchingScheme],
    algorithms: &[AlgorithmSpec],
) -> (bool, ScoreRecord) {
    let record = ScoreRecord {
        schemes: schemes
            .iter()
            .map(|scheme| score_scheme(row_a, row_b, scheme, algorithms))
            .collect(),
    };
    (record.all_satisfied(), record)
}

fn score_scheme(
    row_a: &Record,
    row_b: &Record,
    scheme: &MatchingScheme,
    algorithms: &[AlgorithmSpec],
) -> SchemeScore {
    let key_a = row_a.get(&scheme.left_key).and_then(|v| v.key());
    let key_b = row_b.get(&scheme.right_key).and_then(|v| v.key());
    let keys = key_a.as_deref().zip(key_b.as_deref());
    if keys.is_none() {
        debug!(scheme = %scheme.name, "key value missing, scoring 0");
    }

    let mut scores = Vec::new();
    let mut sum = 0.0;
    let mut contributing = 0usize;
    for algo in algorithms.iter().filter(|a| a.compute && scheme.runs(a.kind)) {
        let score = match keys {
            Some((a, b)) => round_score(algo.kind.similarity(a, b)),
            None => 0.0,
        };
        if algo.aggregate {
            sum += score;
            contributing += 1;
        }
        scores.push(AlgorithmScore {
            algorithm: algo.kind,
            score,
        });
    }

    // ConfigModel refuses in-use schemes without contributors
    let aggregate = if contributing == 0 {
        0.0
    } else {
        sum / contributing as f64
    };

    SchemeScore {
        scheme: scheme.name.clone(),
        scores,
        aggregate,
        satisfied: aggregate >= scheme.threshold,
        key_missing: keys.is_none(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Dataset, Value};
    use crate::similarity::AlgorithmKind;

    fn cities(rows: &[Value]) -> Dataset {
        Dataset::new(
            "c",
            vec!["city".into()],
            rows.iter().map(|v| vec![v.clone()]).collect(),
        )
    }

    fn city_scheme(threshold: f64) -> MatchingScheme {
        let mut s = MatchingScheme::new("city", "city", "city", threshold);
        s.in_use = true;
        s
    }

    #[test]
    fn identical_keys_accepted() {
        let a = cities(&["NY".into()]);
        let b = cities(&["NY".into()]);
        let scheme = city_scheme(0.9);
        let (accepted, record) = evaluate(
            &a.rows()[0],
            &b.rows()[0],
            &[&scheme],
            &[AlgorithmSpec::new(AlgorithmKind::Exact)],
        );
        assert!(accepted);
        assert_eq!(record.aggregate("city"), Some(1.0));
    }

    #[test]
    fn different_keys_rejected() {
        let a = cities(&["NY".into()]);
        let b = cities(&["Boston".into()]);
        let scheme = city_scheme(0.9);
        let (accepted, record) = evaluate(
            &a.rows()[0],
            &b.rows()[0],
            &[&scheme],
            &[AlgorithmSpec::new(AlgorithmKind::Exact)],
        );
        assert!(!accepted);
        assert_eq!(record.aggregate("city"), Some(0.0));
        assert!(!record.schemes[0].satisfied);
    }

    #[test]
    fn missing_key_scores_zero_without_failing() {
        let a = cities(&["NY".into()]);
        let b = cities(&[Value::Missing]);
        let scheme = city_scheme(0.0);
        let algos = [
            AlgorithmSpec::new(AlgorithmKind::Exact),
            AlgorithmSpec::new(AlgorithmKind::JaroWinkler),
        ];
        let (accepted, record) = evaluate(&a.rows()[0], &b.rows()[0], &[&scheme], &algos);
        let s = &record.schemes[0];
        assert!(s.key_missing);
        assert!(s.scores.iter().all(|x| x.score == 0.0));
        assert_eq!(s.scores.len(), 2);
        // Threshold 0 is still met by a zero aggregate
        assert!(accepted);
    }

    #[test]
    fn aggregate_is_mean_of_contributors_only() {
        let a = cities(&["martha".into()]);
        let b = cities(&["marhta".into()]);
        let scheme = city_scheme(0.0);
        let algos = [
            AlgorithmSpec::new(AlgorithmKind::Exact),
            AlgorithmSpec::diagnostic(AlgorithmKind::Levenshtein),
            AlgorithmSpec::new(AlgorithmKind::Jaro),
            AlgorithmSpec {
                kind: AlgorithmKind::Jaccard,
                compute: false,
                aggregate: true,
            },
        ];
        let (_, record) = evaluate(&a.rows()[0], &b.rows()[0], &[&scheme], &algos);
        let jaro = record.score("city", AlgorithmKind::Jaro).unwrap();
        assert_eq!(jaro, 0.9444);
        assert!(record.score("city", AlgorithmKind::Levenshtein).is_some());
        assert!(record.score("city", AlgorithmKind::Jaccard).is_none());
        let expected = (0.0 + jaro) / 2.0;
        assert!((record.aggregate("city").unwrap() - expected).abs() < 1e-12);
    }

    #[test]
    fn every_scheme_scored_even_after_a_failure() {
        let a = Dataset::new("a", vec!["x".into(), "y".into()], vec![vec!["p".into(), "q".into()]]);
        let b = Dataset::new("b", vec!["x".into(), "y".into()], vec![vec!["z".into(), "q".into()]]);
        let mut first = MatchingScheme::new("first", "x", "x", 0.5);
        first.in_use = true;
        let mut second = MatchingScheme::new("second", "y", "y", 0.5);
        second.in_use = true;
        let (accepted, record) = evaluate(
            &a.rows()[0],
            &b.rows()[0],
            &[&first, &second],
            &[AlgorithmSpec::new(AlgorithmKind::Exact)],
        );
        assert!(!accepted);
        assert_eq!(record.schemes.len(), 2);
        assert!(record.schemes[1].satisfied);
    }

    #[test]
    fn no_schemes_accepts_vacuously() {
        let a = cities(&["NY".into()]);
        let (accepted, record) = evaluate(&a.rows()[0], &a.rows()[0], &[], &[]);
        assert!(accepted);
        assert!(record.schemes.is_empty());
    }

    #[test]
    fn active_schemes_skip_unused_and_unknown_keys() {
        let model = ConfigModel::new(
            "t",
            vec![],
            vec![
                MatchingScheme::new("city", "city", "city", 0.9),
                MatchingScheme::new("zip", "zip", "zip", 0.9),
                MatchingScheme::new("idle", "city", "city", 0.9),
            ],
            vec![AlgorithmSpec::new(AlgorithmKind::Exact)],
            &["zip", "city"],
        )
        .unwrap();
        let ds = cities(&[]);
        let (active, skipped) = active_schemes(&model, ds.schema(), ds.schema());
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].name, "city");
        assert_eq!(skipped.len(), 2);
        assert_eq!(
            skipped[0].reason,
            SkipReason::MissingLeftKey {
                field: "zip".into()
            }
        );
        assert_eq!(skipped[1].reason, SkipReason::NotInUse);
    }
}
