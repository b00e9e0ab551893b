use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use crate::similarity::AlgorithmKind;

// ---------------------------------------------------------------------------
// Values
// ---------------------------------------------------------------------------

/// A single cell. `Missing` is the only representation of absent data.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Number(f64),
    Text(String),
    Missing,
}

/// Cell spellings that load as `Missing`.
const MISSING_MARKERS: &[&str] = &["", "na", "n/a", "nan", "null"];

impl Value {
    /// Parse a raw CSV cell: missing markers, then numbers, then text.
    pub fn parse(cell: &str) -> Self {
        let trimmed = cell.trim();
        let lower = trimmed.to_ascii_lowercase();
        if MISSING_MARKERS.contains(&lower.as_str()) {
            return Self::Missing;
        }
        match trimmed.parse::<f64>() {
            Ok(n) if n.is_finite() => Self::Number(n),
            _ => Self::Text(cell.to_string()),
        }
    }

    pub fn is_missing(&self) -> bool {
        match self {
            Self::Missing => true,
            Self::Number(n) => n.is_nan(),
            Self::Text(_) => false,
        }
    }

    /// Canonical text form used for equality, equivalences and similarity.
    /// `None` for missing values.
    pub fn key(&self) -> Option<Cow<'_, str>> {
        match self {
            Self::Missing => None,
            Self::Number(n) if n.is_nan() => None,
            Self::Number(n) => Some(Cow::Owned(format_number(*n))),
            Self::Text(s) => Some(Cow::Borrowed(s.as_str())),
        }
    }

    /// Integer view for range comparisons (truncates toward zero).
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Number(n) if n.is_finite() => Some(n.trunc() as i64),
            Self::Text(s) => s
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|n| n.is_finite())
                .map(|n| n.trunc() as i64),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Number(n as f64)
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Ordered column names of one dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    columns: Vec<String>,
    index: HashMap<String, usize>,
}

impl Schema {
    pub fn new(columns: Vec<String>) -> Self {
        let index = columns
            .iter()
            .enumerate()
            .map(|(i, c)| (c.clone(), i))
            .collect();
        Self { columns, index }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn position(&self, field: &str) -> Option<usize> {
        self.index.get(field).copied()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.index.contains_key(field)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// One row. Read-only once built.
#[derive(Debug, Clone)]
pub struct Record {
    schema: Arc<Schema>,
    values: Vec<Value>,
}

impl Record {
    /// Short rows are padded with `Missing`, long rows truncated.
    pub fn new(schema: Arc<Schema>, mut values: Vec<Value>) -> Self {
        values.resize(schema.len(), Value::Missing);
        Self { schema, values }
    }

    /// `None` when the field is not part of the schema at all.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.schema.position(field).map(|i| &self.values[i])
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }
}

/// A named, ordered sequence of records sharing one schema.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub name: String,
    schema: Arc<Schema>,
    rows: Vec<Record>,
}

impl Dataset {
    pub fn new(name: impl Into<String>, columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        let schema = Arc::new(Schema::new(columns));
        let rows = rows
            .into_iter()
            .map(|values| Record::new(Arc::clone(&schema), values))
            .collect();
        Self {
            name: name.into(),
            schema,
            rows,
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn rows(&self) -> &[Record] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Scores
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlgorithmScore {
    pub algorithm: AlgorithmKind,
    pub score: f64,
}

/// Everything computed for one scheme on one pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemeScore {
    pub scheme: String,
    pub scores: Vec<AlgorithmScore>,
    pub aggregate: f64,
    pub satisfied: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub key_missing: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScoreRecord {
    pub schemes: Vec<SchemeScore>,
}

impl ScoreRecord {
    pub fn scheme(&self, name: &str) -> Option<&SchemeScore> {
        self.schemes.iter().find(|s| s.scheme == name)
    }

    pub fn aggregate(&self, scheme: &str) -> Option<f64> {
        self.scheme(scheme).map(|s| s.aggregate)
    }

    pub fn score(&self, scheme: &str, algorithm: AlgorithmKind) -> Option<f64> {
        self.scheme(scheme)?
            .scores
            .iter()
            .find(|s| s.algorithm == algorithm)
            .map(|s| s.score)
    }

    /// Vacuously true when no scheme was evaluated.
    pub fn all_satisfied(&self) -> bool {
        self.schemes.iter().all(|s| s.satisfied)
    }
}

/// A compatible pair of rows, by index into the left and right datasets.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidatePair {
    pub left: usize,
    pub right: usize,
    pub scores: ScoreRecord,
}

// ---------------------------------------------------------------------------
// Summary + Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    /// Not listed in `use_schemes`.
    NotInUse,
    /// Left key column absent from the left dataset.
    MissingLeftKey { field: String },
    /// Right key column absent from the right dataset.
    MissingRightKey { field: String },
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotInUse => write!(f, "not in use_schemes"),
            Self::MissingLeftKey { field } => write!(f, "left key '{field}' not in left dataset"),
            Self::MissingRightKey { field } => {
                write!(f, "right key '{field}' not in right dataset")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedScheme {
    pub scheme: String,
    #[serde(flatten)]
    pub reason: SkipReason,
}

/// A blocking rule field ignored because one side lacks the column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedField {
    pub variable: String,
    pub field: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LinkSummary {
    pub left_rows: usize,
    pub right_rows: usize,
    pub compatible_pairs: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub missing_key_pairs: usize,
    pub skipped_schemes: Vec<SkippedScheme>,
    pub skipped_rule_fields: Vec<SkippedField>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Timings {
    /// Blocking and scoring, all rows.
    pub matching_ms: u64,
    pub ranking_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LinkMeta {
    pub config_name: String,
    pub engine_version: String,
    pub run_at: String,
    pub timings: Timings,
}

#[derive(Debug, Clone, Serialize)]
pub struct LinkResult {
    pub meta: LinkMeta,
    pub summary: LinkSummary,
    /// Scheme names whose aggregates order `candidates`, highest priority first.
    pub priority: Vec<String>,
    pub candidates: Vec<CandidatePair>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rejected: Vec<CandidatePair>,
}

impl LinkResult {
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_cells() {
        assert_eq!(Value::parse(""), Value::Missing);
        assert_eq!(Value::parse("  NaN "), Value::Missing);
        assert_eq!(Value::parse("NA"), Value::Missing);
        assert_eq!(Value::parse("42"), Value::Number(42.0));
        assert_eq!(Value::parse("-1.5"), Value::Number(-1.5));
        assert_eq!(Value::parse("Boston"), Value::Text("Boston".into()));
    }

    #[test]
    fn number_keys_drop_integral_fraction() {
        assert_eq!(Value::Number(3.0).key().as_deref(), Some("3"));
        assert_eq!(Value::Number(2.5).key().as_deref(), Some("2.5"));
        assert_eq!(Value::Missing.key(), None);
        assert_eq!(Value::Number(f64::NAN).key(), None);
    }

    #[test]
    fn integer_view_truncates() {
        assert_eq!(Value::Number(30.9).as_integer(), Some(30));
        assert_eq!(Value::Number(-2.7).as_integer(), Some(-2));
        assert_eq!(Value::Text(" 17 ".into()).as_integer(), Some(17));
        assert_eq!(Value::Text("abc".into()).as_integer(), None);
        assert_eq!(Value::Missing.as_integer(), None);
    }

    #[test]
    fn record_lookup_distinguishes_absent_and_missing() {
        let ds = Dataset::new(
            "a",
            vec!["name".into(), "age".into()],
            vec![vec![Value::from("Ann")]],
        );
        let row = &ds.rows()[0];
        assert_eq!(row.get("name"), Some(&Value::Text("Ann".into())));
        assert_eq!(row.get("age"), Some(&Value::Missing));
        assert_eq!(row.get("city"), None);
    }
}
