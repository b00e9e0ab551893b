//! The compiled, read-only configuration model.
//!
//! A [`ConfigModel`] is built once per run from a validated [`LinkConfig`]
//! (or assembled directly) and then shared by reference with the blocking and
//! scoring engines. Nothing mutates it afterwards.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::config::{LinkConfig, RuleKindName};
use crate::error::LinkError;
use crate::model::Value;
use crate::similarity::AlgorithmKind;

// ---------------------------------------------------------------------------
// Compatibility rules
// ---------------------------------------------------------------------------

/// What a rule does when either side of a field is missing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingPolicy {
    /// Missing values never block.
    #[default]
    Allow,
    /// Missing values block the pair.
    Disallow,
}

/// Unordered value pairs treated as equal by a categorical rule.
///
/// Pairs are stored with the smaller canonical key first, so lookups are
/// symmetric no matter how the table was written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EquivalenceSet {
    pairs: HashSet<(String, String)>,
}

impl EquivalenceSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, a: &str, b: &str) {
        self.pairs.insert(ordered(a, b));
    }

    pub fn contains(&self, a: &str, b: &str) -> bool {
        !self.pairs.is_empty() && self.pairs.contains(&ordered(a, b))
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Parse a two-column CSV (header row first). Cells are canonicalised the
    /// same way dataset cells are, so `1.0` in the table matches `1` in data.
    pub fn from_csv(data: &str) -> Result<Self, String> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(data.as_bytes());

        let mut set = Self::new();
        for (i, record) in reader.records().enumerate() {
            let record = record.map_err(|e| e.to_string())?;
            let line = i + 2;
            let (Some(a), Some(b)) = (record.get(0), record.get(1)) else {
                return Err(format!("line {line}: expected two columns"));
            };
            let (Some(a), Some(b)) = (canonical(a), canonical(b)) else {
                return Err(format!("line {line}: empty value"));
            };
            set.insert(&a, &b);
        }
        Ok(set)
    }
}

impl<A: AsRef<str>, B: AsRef<str>> FromIterator<(A, B)> for EquivalenceSet {
    fn from_iter<I: IntoIterator<Item = (A, B)>>(iter: I) -> Self {
        let mut set = Self::new();
        for (a, b) in iter {
            set.insert(a.as_ref(), b.as_ref());
        }
        set
    }
}

fn ordered(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

fn canonical(cell: &str) -> Option<String> {
    Value::parse(cell).key().map(|k| k.into_owned())
}

#[derive(Debug, Clone, PartialEq)]
pub enum RuleKind {
    /// Integer distance at most `tolerance`.
    Range { tolerance: i64 },
    /// Equal, or listed as equivalent.
    Categorical { equivalences: EquivalenceSet },
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompatibilityRule {
    pub variable: String,
    pub enabled: bool,
    pub kind: RuleKind,
    pub fields: Vec<String>,
    pub missing: MissingPolicy,
}

impl CompatibilityRule {
    pub fn range(variable: &str, fields: &[&str], tolerance: i64, missing: MissingPolicy) -> Self {
        Self {
            variable: variable.to_string(),
            enabled: true,
            kind: RuleKind::Range { tolerance },
            fields: fields.iter().map(|f| f.to_string()).collect(),
            missing,
        }
    }

    pub fn categorical(
        variable: &str,
        fields: &[&str],
        equivalences: EquivalenceSet,
        missing: MissingPolicy,
    ) -> Self {
        Self {
            variable: variable.to_string(),
            enabled: true,
            kind: RuleKind::Categorical { equivalences },
            fields: fields.iter().map(|f| f.to_string()).collect(),
            missing,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

// ---------------------------------------------------------------------------
// Schemes + Algorithms
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlgorithmSpec {
    pub kind: AlgorithmKind,
    pub compute: bool,
    pub aggregate: bool,
}

impl AlgorithmSpec {
    pub fn new(kind: AlgorithmKind) -> Self {
        Self {
            kind,
            compute: true,
            aggregate: true,
        }
    }

    /// Computed for diagnostics but left out of the aggregate.
    pub fn diagnostic(kind: AlgorithmKind) -> Self {
        Self {
            kind,
            compute: true,
            aggregate: false,
        }
    }

    pub fn contributes(&self) -> bool {
        self.compute && self.aggregate
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchingScheme {
    pub name: String,
    pub left_key: String,
    pub right_key: String,
    pub threshold: f64,
    /// Subset of the registry this scheme runs; `None` runs all of it.
    pub algorithms: Option<Vec<AlgorithmKind>>,
    /// Listed in the allow-list.
    pub in_use: bool,
}

impl MatchingScheme {
    pub fn new(name: &str, left_key: &str, right_key: &str, threshold: f64) -> Self {
        Self {
            name: name.to_string(),
            left_key: left_key.to_string(),
            right_key: right_key.to_string(),
            threshold,
            algorithms: None,
            in_use: false,
        }
    }

    pub fn runs(&self, kind: AlgorithmKind) -> bool {
        self.algorithms.as_ref().map_or(true, |only| only.contains(&kind))
    }
}

// ---------------------------------------------------------------------------
// Model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ConfigModel {
    name: String,
    rules: Vec<CompatibilityRule>,
    schemes: Vec<MatchingScheme>,
    priority: Vec<String>,
    algorithms: Vec<AlgorithmSpec>,
}

impl ConfigModel {
    /// Assemble a model. `use_schemes` is the allow-list, in ranking priority
    /// order; every scheme it names must exist and have at least one
    /// contributing algorithm.
    pub fn new(
        name: impl Into<String>,
        rules: Vec<CompatibilityRule>,
        mut schemes: Vec<MatchingScheme>,
        algorithms: Vec<AlgorithmSpec>,
        use_schemes: &[&str],
    ) -> Result<Self, LinkError> {
        let mut priority = Vec::with_capacity(use_schemes.len());
        for name in use_schemes {
            let scheme = schemes
                .iter_mut()
                .find(|s| s.name == *name)
                .ok_or_else(|| {
                    LinkError::ConfigValidation(format!("use_schemes: unknown scheme '{name}'"))
                })?;
            scheme.in_use = true;
            priority.push(scheme.name.clone());
        }

        let model = Self {
            name: name.into(),
            rules,
            schemes,
            priority,
            algorithms,
        };
        for scheme in model.schemes.iter().filter(|s| s.in_use) {
            if model.contributing(scheme).next().is_none() {
                return Err(LinkError::NoContributingAlgorithm {
                    scheme: scheme.name.clone(),
                });
            }
        }
        Ok(model)
    }

    /// Compile a parsed config. `read_equivalences` returns the contents of a
    /// rule's `equivalences_file`; it is the only IO the model needs.
    pub fn from_config<F>(config: &LinkConfig, mut read_equivalences: F) -> Result<Self, LinkError>
    where
        F: FnMut(&str) -> Result<String, String>,
    {
        let mut rules = Vec::with_capacity(config.rules.len());
        for rule in &config.rules {
            let kind = match rule.kind {
                RuleKindName::Range => RuleKind::Range {
                    tolerance: rule.tolerance.unwrap_or(0),
                },
                RuleKindName::Categorical => {
                    let mut equivalences = EquivalenceSet::new();
                    if let Some(ref file) = rule.equivalences_file {
                        let data = read_equivalences(file).map_err(|message| {
                            LinkError::Equivalences {
                                rule: rule.variable.clone(),
                                message,
                            }
                        })?;
                        equivalences = EquivalenceSet::from_csv(&data).map_err(|message| {
                            LinkError::Equivalences {
                                rule: rule.variable.clone(),
                                message: format!("{file}: {message}"),
                            }
                        })?;
                    }
                    for [a, b] in &rule.equivalences {
                        match (canonical(a), canonical(b)) {
                            (Some(a), Some(b)) => equivalences.insert(&a, &b),
                            _ => {
                                return Err(LinkError::Equivalences {
                                    rule: rule.variable.clone(),
                                    message: "empty value in inline equivalences".into(),
                                })
                            }
                        }
                    }
                    RuleKind::Categorical { equivalences }
                }
            };
            rules.push(CompatibilityRule {
                variable: rule.variable.clone(),
                enabled: rule.enabled,
                kind,
                fields: rule.fields.clone(),
                missing: rule.missing,
            });
        }

        let schemes = config
            .schemes
            .iter()
            .map(|s| MatchingScheme {
                name: s.name.clone(),
                left_key: s.left_key.clone(),
                right_key: s.right_key.clone(),
                threshold: s.threshold,
                algorithms: s.algorithms.clone(),
                in_use: false,
            })
            .collect();

        let algorithms = config
            .algorithms
            .iter()
            .map(|a| AlgorithmSpec {
                kind: a.kind,
                compute: a.compute,
                aggregate: a.aggregate,
            })
            .collect();

        let use_schemes: Vec<&str> = config.use_schemes.iter().map(String::as_str).collect();
        Self::new(config.name.clone(), rules, schemes, algorithms, &use_schemes)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rules(&self) -> &[CompatibilityRule] {
        &self.rules
    }

    /// All schemes, in configured order.
    pub fn schemes(&self) -> &[MatchingScheme] {
        &self.schemes
    }

    /// Allow-listed scheme names, highest ranking priority first.
    pub fn priority(&self) -> &[String] {
        &self.priority
    }

    pub fn algorithms(&self) -> &[AlgorithmSpec] {
        &self.algorithms
    }

    /// Computed algorithms for a scheme, in registry order.
    pub fn computed<'a>(
        &'a self,
        scheme: &'a MatchingScheme,
    ) -> impl Iterator<Item = &'a AlgorithmSpec> + 'a {
        self.algorithms
            .iter()
            .filter(move |a| a.compute && scheme.runs(a.kind))
    }

    /// Algorithms whose scores are averaged into a scheme's aggregate.
    pub fn contributing<'a>(
        &'a self,
        scheme: &'a MatchingScheme,
    ) -> impl Iterator<Item = &'a AlgorithmSpec> + 'a {
        self.computed(scheme).filter(|a| a.aggregate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equivalences_are_symmetric() {
        let set: EquivalenceSet = [("NY", "New York")].into_iter().collect();
        assert!(set.contains("NY", "New York"));
        assert!(set.contains("New York", "NY"));
        assert!(!set.contains("NY", "Boston"));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn directed_duplicates_collapse() {
        let set: EquivalenceSet = [("a", "b"), ("b", "a")].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn equivalences_from_csv() {
        let set = EquivalenceSet::from_csv("from,to\nM,male\nF,female\n1.0,2\n").unwrap();
        assert_eq!(set.len(), 3);
        assert!(set.contains("male", "M"));
        assert!(set.contains("2", "1"));
    }

    #[test]
    fn equivalences_csv_rejects_single_column() {
        let err = EquivalenceSet::from_csv("from,to\nM\n").unwrap_err();
        assert!(err.contains("line 2"));
    }

    #[test]
    fn model_marks_allow_listed_schemes() {
        let model = ConfigModel::new(
            "t",
            vec![],
            vec![
                MatchingScheme::new("name", "n", "n", 0.8),
                MatchingScheme::new("city", "c", "c", 0.9),
            ],
            vec![AlgorithmSpec::new(AlgorithmKind::Jaro)],
            &["city"],
        )
        .unwrap();
        assert!(!model.schemes()[0].in_use);
        assert!(model.schemes()[1].in_use);
        assert_eq!(model.priority(), &["city".to_string()]);
    }

    #[test]
    fn model_rejects_scheme_with_only_diagnostic_algorithms() {
        let err = ConfigModel::new(
            "t",
            vec![],
            vec![MatchingScheme::new("name", "n", "n", 0.8)],
            vec![AlgorithmSpec::diagnostic(AlgorithmKind::Jaro)],
            &["name"],
        )
        .unwrap_err();
        assert!(matches!(err, LinkError::NoContributingAlgorithm { .. }));
    }

    #[test]
    fn scheme_subset_limits_algorithms() {
        let mut scheme = MatchingScheme::new("name", "n", "n", 0.8);
        scheme.algorithms = Some(vec![AlgorithmKind::Exact]);
        let model = ConfigModel::new(
            "t",
            vec![],
            vec![scheme],
            vec![
                AlgorithmSpec::new(AlgorithmKind::Jaro),
                AlgorithmSpec::new(AlgorithmKind::Exact),
            ],
            &["name"],
        )
        .unwrap();
        let kinds: Vec<_> = model.computed(&model.schemes()[0]).map(|a| a.kind).collect();
        assert_eq!(kinds, vec![AlgorithmKind::Exact]);
    }

    #[test]
    fn from_config_reads_equivalence_files() {
        let config = LinkConfig::from_toml(
            r#"
name = "t"
use_schemes = ["name"]

[datasets]
left = "a.csv"
right = "b.csv"

[[rules]]
variable = "sex"
kind = "categorical"
fields = ["sex"]
equivalences = [["X", "other"]]
equivalences_file = "sex.csv"

[[schemes]]
name = "name"
left_key = "name"
right_key = "name"
threshold = 0.5

[[algorithms]]
kind = "jaro"
"#,
        )
        .unwrap();

        let model = ConfigModel::from_config(&config, |file| {
            assert_eq!(file, "sex.csv");
            Ok("a,b\nM,male\n".to_string())
        })
        .unwrap();

        let RuleKind::Categorical { ref equivalences } = model.rules()[0].kind else {
            panic!("expected categorical rule");
        };
        assert!(equivalences.contains("male", "M"));
        assert!(equivalences.contains("other", "X"));
    }

    #[test]
    fn from_config_reports_unreadable_equivalences() {
        let config = LinkConfig::from_toml(
            r#"
name = "t"

[datasets]
left = "a.csv"
right = "b.csv"

[[rules]]
variable = "sex"
kind = "categorical"
fields = ["sex"]
equivalences_file = "missing.csv"
"#,
        )
        .unwrap();

        let err = ConfigModel::from_config(&config, |_| Err("no such file".into())).unwrap_err();
        assert!(err.to_string().contains("rule 'sex'"));
        assert!(err.is_config());
    }
}
