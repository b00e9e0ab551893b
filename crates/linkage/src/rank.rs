use std::cmp::Reverse;

use ordered_float::OrderedFloat;

use crate::model::CandidatePair;

/// Order accepted pairs by their scheme aggregates, highest first, comparing
/// schemes in `priority` order. Stable: pairs with identical aggregates keep
/// the order they were produced in.
pub fn rank(mut pairs: Vec<CandidatePair>, priority: &[String]) -> Vec<CandidatePair> {
    pairs.sort_by_cached_key(|pair| sort_key(pair, priority));
    pairs
}

fn sort_key(pair: &CandidatePair, priority: &[String]) -> Vec<Reverse<OrderedFloat<f64>>> {
    priority
        .iter()
        .map(|scheme| {
            let aggregate = pair.scores.aggregate(scheme).unwrap_or(f64::NEG_INFINITY);
            Reverse(OrderedFloat(aggregate))
        })
        .collect()
}
