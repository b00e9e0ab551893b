use std::collections::HashSet;
use std::time::Instant;

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::blocking::{compatible_rows, unresolved_fields};
use crate::config::LinkConfig;
use crate::error::LinkError;
use crate::model::{
    CandidatePair, Dataset, LinkMeta, LinkResult, LinkSummary, Record, Timings, Value,
};
use crate::rank::rank;
use crate::ruleset::{AlgorithmSpec, CompatibilityRule, ConfigModel, MatchingScheme};
use crate::scoring::{active_schemes, evaluate};

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Evaluate rows of the left dataset on the rayon pool.
    pub parallel: bool,
    /// Keep rejected pairs in `LinkResult::rejected`.
    pub keep_rejected: bool,
}

impl From<&LinkConfig> for RunOptions {
    fn from(config: &LinkConfig) -> Self {
        Self {
            parallel: config.parallel,
            keep_rejected: config.keep_rejected,
        }
    }
}

/// Link every row of `left` against `right`: block, score, rank.
///
/// Parallel and sequential runs produce identical results: per-row outcomes
/// are concatenated in left row order before the stable ranking sort.
pub fn run(model: &ConfigModel, left: &Dataset, right: &Dataset, options: RunOptions) -> LinkResult {
    let skipped_rule_fields = unresolved_fields(model.rules(), left.schema(), right.schema());
    for f in &skipped_rule_fields {
        warn!(variable = %f.variable, field = %f.field, "rule field missing from a dataset, ignoring it");
    }

    let (schemes, skipped_schemes) = active_schemes(model, left.schema(), right.schema());
    let active: HashSet<&str> = schemes.iter().map(|s| s.name.as_str()).collect();
    let priority: Vec<String> = model
        .priority()
        .iter()
        .filter(|name| active.contains(name.as_str()))
        .cloned()
        .collect();

    info!(
        left = left.len(),
        right = right.len(),
        schemes = schemes.len(),
        parallel = options.parallel,
        "finding compatible pairs and scoring"
    );
    let started = Instant::now();

    let ctx = RowContext {
        right,
        rules: model.rules(),
        schemes: &schemes,
        algorithms: model.algorithms(),
        keep_rejected: options.keep_rejected,
    };
    let outcomes: Vec<RowOutcome> = if options.parallel {
        left.rows()
            .par_iter()
            .enumerate()
            .map(|(i, row)| ctx.link_row(i, row))
            .collect()
    } else {
        left.rows()
            .iter()
            .enumerate()
            .map(|(i, row)| ctx.link_row(i, row))
            .collect()
    };

    let mut summary = LinkSummary {
        left_rows: left.len(),
        right_rows: right.len(),
        skipped_schemes,
        skipped_rule_fields,
        ..LinkSummary::default()
    };
    let mut accepted = Vec::new();
    let mut rejected = Vec::new();
    for outcome in outcomes {
        summary.compatible_pairs += outcome.compatible;
        summary.rejected += outcome.rejected_count;
        summary.missing_key_pairs += outcome.missing_key_pairs;
        accepted.extend(outcome.accepted);
        rejected.extend(outcome.rejected);
    }
    summary.accepted = accepted.len();
    let matching_ms = started.elapsed().as_millis() as u64;
    info!(
        compatible = summary.compatible_pairs,
        accepted = summary.accepted,
        elapsed_ms = matching_ms,
        "scored compatible pairs"
    );

    let started = Instant::now();
    let candidates = rank(accepted, &priority);
    let ranking_ms = started.elapsed().as_millis() as u64;
    debug!(elapsed_ms = ranking_ms, "ranked candidates");

    LinkResult {
        meta: LinkMeta {
            config_name: model.name().to_string(),
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            run_at: chrono::Utc::now().to_rfc3339(),
            timings: Timings {
                matching_ms,
                ranking_ms,
            },
        },
        summary,
        priority,
        candidates,
        rejected,
    }
}

struct RowContext<'a> {
    right: &'a Dataset,
    rules: &'a [CompatibilityRule],
    schemes: &'a [&'a MatchingScheme],
    algorithms: &'a [AlgorithmSpec],
    keep_rejected: bool,
}

#[derive(Default)]
struct RowOutcome {
    compatible: usize,
    accepted: Vec<CandidatePair>,
    rejected: Vec<CandidatePair>,
    rejected_count: usize,
    missing_key_pairs: usize,
}

impl RowContext<'_> {
    fn link_row(&self, left_index: usize, row_a: &Record) -> RowOutcome {
        let indices = compatible_rows(row_a, self.right, self.rules);
        let mut outcome = RowOutcome {
            compatible: indices.len(),
            ..RowOutcome::default()
        };

        for right_index in indices {
            let row_b = &self.right.rows()[right_index];
            let (accepted, scores) = evaluate(row_a, row_b, self.schemes, self.algorithms);
            if scores.schemes.iter().any(|s| s.key_missing) {
                outcome.missing_key_pairs += 1;
            }
            let pair = CandidatePair {
                left: left_index,
                right: right_index,
                scores,
            };
            if accepted {
                outcome.accepted.push(pair);
            } else {
                outcome.rejected_count += 1;
                if self.keep_rejected {
                    outcome.rejected.push(pair);
                }
            }
        }
        outcome
    }
}

/// Parse a headed CSV into a dataset. Cells go through [`Value::parse`].
pub fn load_csv_dataset(name: &str, csv_data: &str) -> Result<Dataset, LinkError> {
    let csv_err = |message: String| LinkError::Csv {
        dataset: name.to_string(),
        message,
    };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(csv_data.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| csv_err(e.to_string()))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut seen = HashSet::new();
    for h in &headers {
        if !seen.insert(h.as_str()) {
            return Err(csv_err(format!("duplicate column '{h}'")));
        }
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| csv_err(e.to_string()))?;
        rows.push(record.iter().map(Value::parse).collect());
    }

    debug!(dataset = name, rows = rows.len(), columns = headers.len(), "loaded dataset");
    Ok(Dataset::new(name, headers, rows))
}
