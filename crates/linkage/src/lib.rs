//! `reclink-linkage`: record linkage engine.
//!
//! Pure engine crate: receives pre-loaded datasets and a compiled
//! configuration model, returns ranked candidate pairs. File access is left
//! to the caller (see `reclink-cli`).

pub mod blocking;
pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod output;
pub mod rank;
pub mod ruleset;
pub mod scoring;
pub mod similarity;

pub use config::LinkConfig;
pub use engine::{load_csv_dataset, run, RunOptions};
pub use error::LinkError;
pub use model::{CandidatePair, Dataset, LinkResult, Record, Value};
pub use ruleset::ConfigModel;
pub use similarity::AlgorithmKind;
