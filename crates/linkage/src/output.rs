//! Rendering of a [`LinkResult`] against the datasets it indexes.
//!
//! CSV: one row per candidate, every left column as `left_<col>`, every right
//! column as `right_<col>`, then `<algorithm>_<scheme>` for each computed
//! score and `aggregate_<scheme>` for each evaluated scheme.
//!
//! JSON: a [`LinkReport`] whose candidates carry both records as
//! `left`/`right` objects keyed by column name.

use std::io::Write;

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::error::LinkError;
use crate::model::{
    CandidatePair, Dataset, LinkMeta, LinkResult, LinkSummary, Record, ScoreRecord, Value,
};
use crate::similarity::round_score;

pub fn write_csv<W: Write>(
    result: &LinkResult,
    left: &Dataset,
    right: &Dataset,
    writer: W,
) -> Result<(), LinkError> {
    write_pairs(&result.candidates, left, right, writer)
}

/// Same layout as [`write_csv`] for an arbitrary pair list, e.g. `rejected`.
pub fn write_pairs<W: Write>(
    pairs: &[CandidatePair],
    left: &Dataset,
    right: &Dataset,
    writer: W,
) -> Result<(), LinkError> {
    let io = |e: csv::Error| LinkError::Io(e.to_string());
    let mut out = csv::Writer::from_writer(writer);

    // Every pair of a run carries the same schemes and algorithms
    let layout = pairs.first().map(|p| &p.scores.schemes[..]).unwrap_or(&[]);

    let mut header: Vec<String> = Vec::new();
    header.extend(left.schema().columns().iter().map(|c| format!("left_{c}")));
    header.extend(right.schema().columns().iter().map(|c| format!("right_{c}")));
    for scheme in layout {
        header.extend(
            scheme
                .scores
                .iter()
                .map(|s| format!("{}_{}", s.algorithm, scheme.scheme)),
        );
        header.push(format!("aggregate_{}", scheme.scheme));
    }
    out.write_record(&header).map_err(io)?;

    for pair in pairs {
        let mut row: Vec<String> = Vec::with_capacity(header.len());
        row.extend(left.rows()[pair.left].values().iter().map(cell));
        row.extend(right.rows()[pair.right].values().iter().map(cell));
        for scheme in &pair.scores.schemes {
            row.extend(scheme.scores.iter().map(|s| s.score.to_string()));
            row.push(round_score(scheme.aggregate).to_string());
        }
        out.write_record(&row).map_err(io)?;
    }

    out.flush().map_err(|e| LinkError::Io(e.to_string()))?;
    Ok(())
}

fn cell(value: &Value) -> String {
    value.key().map(|k| k.into_owned()).unwrap_or_default()
}

// ---------------------------------------------------------------------------
// JSON report
// ---------------------------------------------------------------------------

/// One record as a JSON object, columns in schema order. Missing cells are `null`.
#[derive(Debug, Clone, Copy)]
pub struct RowView<'a>(&'a Record);

impl<'a> RowView<'a> {
    pub fn get(&self, field: &str) -> Option<&'a Value> {
        self.0.get(field)
    }
}

impl Serialize for RowView<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let columns = self.0.schema().columns();
        let mut map = serializer.serialize_map(Some(columns.len()))?;
        for (column, value) in columns.iter().zip(self.0.values()) {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

/// A candidate with both of its records resolved.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PairView<'a> {
    pub left_row: usize,
    pub right_row: usize,
    pub left: RowView<'a>,
    pub right: RowView<'a>,
    pub scores: &'a ScoreRecord,
}

impl<'a> PairView<'a> {
    pub fn new(pair: &'a CandidatePair, left: &'a Dataset, right: &'a Dataset) -> Self {
        Self {
            left_row: pair.left,
            right_row: pair.right,
            left: RowView(&left.rows()[pair.left]),
            right: RowView(&right.rows()[pair.right]),
            scores: &pair.scores,
        }
    }
}

/// JSON shape of a run: [`LinkResult`] with each pair's records inlined.
#[derive(Debug, Clone, serde::Serialize)]
pub struct LinkReport<'a> {
    pub meta: &'a LinkMeta,
    pub summary: &'a LinkSummary,
    pub priority: &'a [String],
    pub candidates: Vec<PairView<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rejected: Vec<PairView<'a>>,
}

pub fn report<'a>(result: &'a LinkResult, left: &'a Dataset, right: &'a Dataset) -> LinkReport<'a> {
    let view = |pairs: &'a [CandidatePair]| -> Vec<PairView<'a>> {
        pairs.iter().map(|p| PairView::new(p, left, right)).collect()
    };
    LinkReport {
        meta: &result.meta,
        summary: &result.summary,
        priority: &result.priority,
        candidates: view(&result.candidates),
        rejected: view(&result.rejected),
    }
}

/// Pretty-printed [`LinkReport`].
pub fn write_json<W: Write>(
    result: &LinkResult,
    left: &Dataset,
    right: &Dataset,
    writer: W,
) -> Result<(), LinkError> {
    serde_json::to_writer_pretty(writer, &report(result, left, right))
        .map_err(|e| LinkError::Io(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{load_csv_dataset, run, RunOptions};
    use crate::ruleset::{AlgorithmSpec, ConfigModel, MatchingScheme};
    use crate::similarity::AlgorithmKind;

    #[test]
    fn flattens_left_right_and_scores() {
        let left = load_csv_dataset("a", "id,city\n1,NY\n2,\n").unwrap();
        let right = load_csv_dataset("b", "ref,town\nx,NY\n").unwrap();
        let model = ConfigModel::new(
            "t",
            vec![],
            vec![MatchingScheme::new("city", "city", "town", 0.0)],
            vec![
                AlgorithmSpec::new(AlgorithmKind::Exact),
                AlgorithmSpec::diagnostic(AlgorithmKind::Jaro),
            ],
            &["city"],
        )
        .unwrap();
        let result = run(&model, &left, &right, RunOptions::default());

        let mut buf = Vec::new();
        write_csv(&result, &left, &right, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines[0],
            "left_id,left_city,right_ref,right_town,exact_city,jaro_city,aggregate_city"
        );
        assert_eq!(lines[1], "1,NY,x,NY,1,1,1");
        assert_eq!(lines[2], "2,,x,NY,0,0,0");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn empty_result_writes_header_only() {
        let left = load_csv_dataset("a", "id\n1\n").unwrap();
        let right = load_csv_dataset("b", "id\n2\n").unwrap();
        let mut buf = Vec::new();
        write_pairs(&[], &left, &right, &mut buf).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "left_id,right_id\n");
    }

    #[test]
    fn aggregate_cell_is_rounded() {
        let left = load_csv_dataset("a", "id\n1\n").unwrap();
        let right = load_csv_dataset("b", "id\n2\n").unwrap();
        let pair = CandidatePair {
            left: 0,
            right: 0,
            scores: ScoreRecord {
                schemes: vec![crate::model::SchemeScore {
                    scheme: "name".into(),
                    scores: vec![],
                    aggregate: 0.47220000000000006,
                    satisfied: true,
                    key_missing: false,
                }],
            },
        };

        let mut buf = Vec::new();
        write_pairs(&[pair], &left, &right, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text.lines().nth(1), Some("1,2,0.4722"));
    }

    #[test]
    fn report_inlines_both_records() {
        let left = load_csv_dataset("a", "id,city\n1,NY\n2,\n").unwrap();
        let right = load_csv_dataset("b", "ref,town\nx,NY\n").unwrap();
        let model = ConfigModel::new(
            "t",
            vec![],
            vec![MatchingScheme::new("city", "city", "town", 0.0)],
            vec![AlgorithmSpec::new(AlgorithmKind::Exact)],
            &["city"],
        )
        .unwrap();
        let result = run(&model, &left, &right, RunOptions::default());

        let mut buf = Vec::new();
        write_json(&result, &left, &right, &mut buf).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        let first = &json["candidates"][0];
        assert_eq!(first["left"]["city"], "NY");
        assert_eq!(first["right"]["town"], "NY");
        assert_eq!(first["right_row"], 0);
        assert_eq!(json["candidates"][1]["left"]["city"], serde_json::Value::Null);
        assert_eq!(json["priority"][0], "city");

        // Keys follow the schema, not alphabetical order
        let text = String::from_utf8(buf).unwrap();
        assert!(text.find("\"ref\"").unwrap() < text.find("\"town\"").unwrap());
    }
}
