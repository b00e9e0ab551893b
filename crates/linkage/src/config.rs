use std::collections::HashSet;

use serde::Deserialize;

use crate::error::LinkError;
use crate::ruleset::MissingPolicy;
use crate::similarity::AlgorithmKind;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct LinkConfig {
    pub name: String,
    pub datasets: DatasetsConfig,
    /// Schemes to evaluate, in ranking priority order.
    #[serde(default)]
    pub use_schemes: Vec<String>,
    /// Evaluate rows of the left dataset on the rayon pool.
    #[serde(default)]
    pub parallel: bool,
    /// Keep rejected pairs (with their scores) in the result.
    #[serde(default)]
    pub keep_rejected: bool,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
    #[serde(default)]
    pub schemes: Vec<SchemeConfig>,
    #[serde(default)]
    pub algorithms: Vec<AlgorithmConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatasetsConfig {
    pub left: String,
    pub right: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub csv: Option<String>,
    #[serde(default)]
    pub json: Option<String>,
}

// ---------------------------------------------------------------------------
// Compatibility rules
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct RuleConfig {
    pub variable: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub kind: RuleKindName,
    pub fields: Vec<String>,
    #[serde(default)]
    pub missing: MissingPolicy,
    /// Range rules only: maximum integer distance.
    #[serde(default)]
    pub tolerance: Option<i64>,
    /// Categorical rules only: inline pairs treated as equal.
    #[serde(default)]
    pub equivalences: Vec<[String; 2]>,
    /// Categorical rules only: two-column CSV of pairs treated as equal.
    #[serde(default)]
    pub equivalences_file: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKindName {
    Range,
    Categorical,
}

// ---------------------------------------------------------------------------
// Schemes + Algorithms
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct SchemeConfig {
    pub name: String,
    pub left_key: String,
    pub right_key: String,
    pub threshold: f64,
    /// Restrict the scheme to these registry entries. Defaults to all.
    #[serde(default)]
    pub algorithms: Option<Vec<AlgorithmKind>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlgorithmConfig {
    pub kind: AlgorithmKind,
    #[serde(default = "default_true")]
    pub compute: bool,
    /// Counts towards the scheme aggregate.
    #[serde(default = "default_true")]
    pub aggregate: bool,
}

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl LinkConfig {
    pub fn from_toml(input: &str) -> Result<Self, LinkError> {
        let config: LinkConfig =
            toml::from_str(input).map_err(|e| LinkError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), LinkError> {
        // Rules
        let mut variables = HashSet::new();
        for rule in &self.rules {
            if !variables.insert(rule.variable.as_str()) {
                return Err(invalid(format!("duplicate rule variable '{}'", rule.variable)));
            }
            if rule.fields.is_empty() {
                return Err(invalid(format!("rule '{}': fields must not be empty", rule.variable)));
            }
            match rule.kind {
                RuleKindName::Range => {
                    match rule.tolerance {
                        Some(t) if t >= 0 => {}
                        Some(t) => {
                            return Err(invalid(format!(
                                "rule '{}': tolerance must be >= 0, got {t}",
                                rule.variable
                            )))
                        }
                        None => {
                            return Err(invalid(format!(
                                "rule '{}': range rules require a tolerance",
                                rule.variable
                            )))
                        }
                    }
                    if !rule.equivalences.is_empty() || rule.equivalences_file.is_some() {
                        return Err(invalid(format!(
                            "rule '{}': equivalences only apply to categorical rules",
                            rule.variable
                        )));
                    }
                }
                RuleKindName::Categorical => {
                    if rule.tolerance.is_some() {
                        return Err(invalid(format!(
                            "rule '{}': tolerance only applies to range rules",
                            rule.variable
                        )));
                    }
                }
            }
        }

        // Algorithms
        let mut kinds = HashSet::new();
        for algo in &self.algorithms {
            if !kinds.insert(algo.kind) {
                return Err(invalid(format!("duplicate algorithm '{}'", algo.kind)));
            }
        }

        // Schemes
        let mut names = HashSet::new();
        for scheme in &self.schemes {
            if !names.insert(scheme.name.as_str()) {
                return Err(invalid(format!("duplicate scheme '{}'", scheme.name)));
            }
            if !scheme.threshold.is_finite() {
                return Err(invalid(format!("scheme '{}': threshold must be finite", scheme.name)));
            }
            for kind in scheme.algorithms.iter().flatten() {
                if !kinds.contains(kind) {
                    return Err(invalid(format!(
                        "scheme '{}': algorithm '{kind}' is not configured in [[algorithms]]",
                        scheme.name
                    )));
                }
            }
        }

        // Allow-list
        let mut used = HashSet::new();
        for name in &self.use_schemes {
            if !names.contains(name.as_str()) {
                return Err(invalid(format!("use_schemes: unknown scheme '{name}'")));
            }
            if !used.insert(name.as_str()) {
                return Err(invalid(format!("use_schemes: '{name}' listed twice")));
            }
        }

        // Every scheme in use needs something to average
        for scheme in self.schemes.iter().filter(|s| used.contains(s.name.as_str())) {
            let contributing = self
                .algorithms
                .iter()
                .filter(|a| a.compute && a.aggregate)
                .filter(|a| scheme.algorithms.as_ref().map_or(true, |only| only.contains(&a.kind)))
                .count();
            if contributing == 0 {
                return Err(LinkError::NoContributingAlgorithm {
                    scheme: scheme.name.clone(),
                });
            }
        }

        Ok(())
    }
}

fn invalid(msg: String) -> LinkError {
    LinkError::ConfigValidation(msg)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
