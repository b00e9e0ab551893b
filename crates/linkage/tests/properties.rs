use proptest::prelude::*;

use reclink_linkage::blocking::is_compatible;
use reclink_linkage::engine::{run, RunOptions};
use reclink_linkage::model::{CandidatePair, Dataset, SchemeScore, ScoreRecord, Value};
use reclink_linkage::rank::rank;
use reclink_linkage::ruleset::{
    AlgorithmSpec, CompatibilityRule, ConfigModel, EquivalenceSet, MatchingScheme, MissingPolicy,
};
use reclink_linkage::scoring::evaluate;
use reclink_linkage::AlgorithmKind;

fn one_column(name: &str, values: Vec<Value>) -> Dataset {
    Dataset::new("d", vec![name.to_string()], values.into_iter().map(|v| vec![v]).collect())
}

fn value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Missing),
        (-50i64..50).prop_map(|n| Value::Number(n as f64)),
        "[a-d]{1,3}".prop_map(Value::Text),
    ]
}

proptest! {
    #[test]
    fn equivalence_lookup_is_symmetric(x in "[a-d]{1,3}", y in "[a-d]{1,3}", p in "[a-d]{1,3}", q in "[a-d]{1,3}") {
        let eq: EquivalenceSet = [(p.as_str(), q.as_str())].into_iter().collect();
        let rules = [CompatibilityRule::categorical("v", &["v"], eq, MissingPolicy::Disallow)];
        let a = one_column("v", vec![Value::Text(x.clone()), Value::Text(y.clone())]);
        let forward = is_compatible(&a.rows()[0], &a.rows()[1], &rules);
        let backward = is_compatible(&a.rows()[1], &a.rows()[0], &rules);
        prop_assert_eq!(forward, backward);
        if (x == p && y == q) || (x == q && y == p) {
            prop_assert!(forward);
        }
    }

    #[test]
    fn disallow_range_blocks_out_of_tolerance(x in -100i64..100, y in -100i64..100, tol in 0i64..10) {
        let rules = [CompatibilityRule::range("v", &["v"], tol, MissingPolicy::Disallow)];
        let d = one_column("v", vec![Value::Number(x as f64), Value::Number(y as f64)]);
        let compatible = is_compatible(&d.rows()[0], &d.rows()[1], &rules);
        prop_assert_eq!(compatible, (x - y).abs() <= tol);
    }

    #[test]
    fn allowed_missing_never_rejects(other in value_strategy(), tol in 0i64..5) {
        let range = CompatibilityRule::range("v", &["v"], tol, MissingPolicy::Allow);
        let categorical = CompatibilityRule::categorical("c", &["v"], EquivalenceSet::new(), MissingPolicy::Allow);
        let d = one_column("v", vec![Value::Missing, other]);
        for rules in [[range.clone()], [categorical.clone()]] {
            prop_assert!(is_compatible(&d.rows()[0], &d.rows()[1], &rules));
            prop_assert!(is_compatible(&d.rows()[1], &d.rows()[0], &rules));
        }
    }

    #[test]
    fn aggregate_ignores_declaration_order(
        a in "[a-e ]{0,8}",
        b in "[a-e ]{0,8}",
        order in Just(AlgorithmKind::ALL.to_vec()).prop_shuffle(),
    ) {
        let d = one_column("k", vec![Value::Text(a), Value::Text(b)]);
        let mut scheme = MatchingScheme::new("s", "k", "k", 0.0);
        scheme.in_use = true;
        let forward: Vec<AlgorithmSpec> = AlgorithmKind::ALL.iter().map(|k| AlgorithmSpec::new(*k)).collect();
        let shuffled: Vec<AlgorithmSpec> = order.iter().map(|k| AlgorithmSpec::new(*k)).collect();

        let (_, r1) = evaluate(&d.rows()[0], &d.rows()[1], &[&scheme], &forward);
        let (_, r2) = evaluate(&d.rows()[0], &d.rows()[1], &[&scheme], &shuffled);
        let (g1, g2) = (r1.aggregate("s").unwrap(), r2.aggregate("s").unwrap());
        prop_assert!((g1 - g2).abs() < 1e-12);

        let mean = r1.schemes[0].scores.iter().map(|s| s.score).sum::<f64>() / AlgorithmKind::ALL.len() as f64;
        prop_assert!((g1 - mean).abs() < 1e-12);
    }

    #[test]
    fn raising_threshold_never_adds_pairs(
        left in prop::collection::vec("[a-c]{1,4}", 1..6),
        right in prop::collection::vec("[a-c]{1,4}", 1..6),
        low in 0.0f64..1.0,
        bump in 0.0f64..0.5,
    ) {
        let left = one_column("k", left.into_iter().map(Value::Text).collect());
        let right = one_column("k", right.into_iter().map(Value::Text).collect());
        let accepted = |threshold: f64| {
            let model = ConfigModel::new(
                "p",
                vec![],
                vec![MatchingScheme::new("s", "k", "k", threshold)],
                vec![AlgorithmSpec::new(AlgorithmKind::Levenshtein), AlgorithmSpec::new(AlgorithmKind::Jaro)],
                &["s"],
            )
            .unwrap();
            run(&model, &left, &right, RunOptions::default()).summary.accepted
        };
        prop_assert!(accepted(low + bump) <= accepted(low));
    }

    #[test]
    fn ranking_is_stable_and_descending(aggregates in prop::collection::vec(0u8..3, 0..30)) {
        let pairs: Vec<CandidatePair> = aggregates
            .iter()
            .enumerate()
            .map(|(i, a)| CandidatePair {
                left: i,
                right: 0,
                scores: ScoreRecord {
                    schemes: vec![SchemeScore {
                        scheme: "s".into(),
                        scores: vec![],
                        aggregate: f64::from(*a) / 2.0,
                        satisfied: true,
                        key_missing: false,
                    }],
                },
            })
            .collect();
        let ranked = rank(pairs, &["s".to_string()]);
        prop_assert_eq!(ranked.len(), aggregates.len());
        for w in ranked.windows(2) {
            let (x, y) = (w[0].scores.aggregate("s").unwrap(), w[1].scores.aggregate("s").unwrap());
            prop_assert!(x >= y);
            if x == y {
                prop_assert!(w[0].left < w[1].left);
            }
        }
    }
}
