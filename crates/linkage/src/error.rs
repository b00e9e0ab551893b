use thiserror::Error;

#[derive(Debug, Error)]
pub enum LinkError {
    /// TOML parse / deserialization error.
    #[error("config parse error: {0}")]
    ConfigParse(String),
    /// Config validation error (unknown scheme, duplicate name, etc.).
    #[error("config validation error: {0}")]
    ConfigValidation(String),
    /// A scheme selected for use has nothing to average.
    #[error("scheme '{scheme}': no computed algorithm contributes to the aggregate")]
    NoContributingAlgorithm { scheme: String },
    /// Equivalence table could not be read or parsed.
    #[error("rule '{rule}': cannot load equivalences: {message}")]
    Equivalences { rule: String, message: String },
    /// Dataset CSV could not be parsed.
    #[error("dataset '{dataset}': {message}")]
    Csv { dataset: String, message: String },
    /// IO error (file read/write, etc.).
    #[error("IO error: {0}")]
    Io(String),
}

impl LinkError {
    /// Fatal configuration problems, as opposed to data or IO failures.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Self::ConfigParse(_)
                | Self::ConfigValidation(_)
                | Self::NoContributingAlgorithm { .. }
                | Self::Equivalences { .. }
        )
    }
}
