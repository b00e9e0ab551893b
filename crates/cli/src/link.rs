//! `reclink run` and `reclink validate`: config-driven record linkage.

use std::path::{Path, PathBuf};

use clap::Subcommand;
use reclink_linkage::output::{report, write_csv};
use reclink_linkage::{load_csv_dataset, ConfigModel, Dataset, LinkConfig, LinkError, RunOptions};

use crate::exit_codes::{EXIT_LINK_INVALID_CONFIG, EXIT_LINK_RUNTIME};
use crate::CliError;

#[derive(Subcommand)]
pub enum LinkCommands {
    /// Find, score and rank candidate pairs from a TOML config file
    #[command(after_help = "\
Examples:
  reclink run people.link.toml
  reclink run people.link.toml --output-csv candidates.csv
  reclink run people.link.toml --json
  reclink run people.link.toml --output result.json --parallel")]
    Run {
        /// Path to the .link.toml config file
        config: PathBuf,

        /// Write the flat candidate table to this CSV file
        /// (overrides `[output] csv`)
        #[arg(long)]
        output_csv: Option<PathBuf>,

        /// Output JSON to stdout
        #[arg(long)]
        json: bool,

        /// Write JSON output to file (overrides `[output] json`)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Score rows on all cores (same output as a sequential run)
        #[arg(long)]
        parallel: bool,
    },

    /// Validate a link config and its equivalence tables without running
    #[command(after_help = "\
Examples:
  reclink validate people.link.toml")]
    Validate {
        /// Path to the .link.toml config file
        config: PathBuf,
    },
}

pub fn cmd_link(cmd: LinkCommands) -> Result<(), CliError> {
    match cmd {
        LinkCommands::Run { config, output_csv, json, output, parallel } => {
            cmd_link_run(config, output_csv, json, output, parallel)
        }
        LinkCommands::Validate { config } => cmd_link_validate(config),
    }
}

fn link_err(err: LinkError) -> CliError {
    let code = if err.is_config() { EXIT_LINK_INVALID_CONFIG } else { EXIT_LINK_RUNTIME };
    CliError::new(code, err.to_string())
}

fn runtime_err(msg: impl Into<String>) -> CliError {
    CliError::new(EXIT_LINK_RUNTIME, msg)
}

/// Read, parse and compile a config. Equivalence tables resolve relative to
/// the config file's directory.
fn load_config(config_path: &Path) -> Result<(LinkConfig, ConfigModel), CliError> {
    let config_str = std::fs::read_to_string(config_path)
        .map_err(|e| runtime_err(format!("cannot read config: {e}")))?;

    let config = LinkConfig::from_toml(&config_str).map_err(|e| match e {
        LinkError::NoContributingAlgorithm { .. } => link_err(e)
            .with_hint("add an algorithm with compute = true and aggregate = true to the scheme"),
        e => link_err(e),
    })?;

    let base_dir = base_dir(config_path);
    let model = ConfigModel::from_config(&config, |file| {
        let path = base_dir.join(file);
        std::fs::read_to_string(&path).map_err(|e| format!("cannot read {}: {e}", path.display()))
    })
    .map_err(link_err)?;

    Ok((config, model))
}

fn base_dir(config_path: &Path) -> &Path {
    config_path.parent().unwrap_or_else(|| Path::new("."))
}

fn load_dataset(name: &str, path: &Path) -> Result<Dataset, CliError> {
    let csv_data = std::fs::read_to_string(path)
        .map_err(|e| runtime_err(format!("cannot read {}: {e}", path.display())))?;
    load_csv_dataset(name, &csv_data).map_err(link_err)
}

fn cmd_link_run(
    config_path: PathBuf,
    output_csv: Option<PathBuf>,
    json_output: bool,
    output_file: Option<PathBuf>,
    parallel: bool,
) -> Result<(), CliError> {
    let (config, model) = load_config(&config_path)?;

    // Resolve file paths relative to config file's directory
    let base_dir = base_dir(&config_path);
    let left = load_dataset("left", &base_dir.join(&config.datasets.left))?;
    let right = load_dataset("right", &base_dir.join(&config.datasets.right))?;

    let mut options = RunOptions::from(&config);
    options.parallel |= parallel;
    let result = reclink_linkage::run(&model, &left, &right, options);

    // Output
    let csv_path = output_csv.or_else(|| config.output.csv.as_ref().map(|p| base_dir.join(p)));
    if let Some(ref path) = csv_path {
        let file = std::fs::File::create(path)
            .map_err(|e| runtime_err(format!("cannot write {}: {e}", path.display())))?;
        write_csv(&result, &left, &right, file).map_err(link_err)?;
        eprintln!("wrote {}", path.display());
    }

    let json_path = output_file.or_else(|| config.output.json.as_ref().map(|p| base_dir.join(p)));
    if json_output || json_path.is_some() {
        let json_str = serde_json::to_string_pretty(&report(&result, &left, &right))
            .map_err(|e| runtime_err(format!("JSON serialization error: {e}")))?;

        if let Some(ref path) = json_path {
            std::fs::write(path, &json_str)
                .map_err(|e| runtime_err(format!("cannot write output: {e}")))?;
            eprintln!("wrote {}", path.display());
        }

        if json_output {
            println!("{json_str}");
        }
    }

    // Human summary to stderr
    let s = &result.summary;
    eprintln!(
        "linkage '{}': {} x {} rows, {} compatible pairs, {} accepted, {} rejected",
        result.meta.config_name, s.left_rows, s.right_rows, s.compatible_pairs, s.accepted, s.rejected,
    );
    for skipped in &s.skipped_schemes {
        eprintln!("  skipped scheme '{}': {}", skipped.scheme, skipped.reason);
    }
    for field in &s.skipped_rule_fields {
        eprintln!("  ignored field '{}' of rule '{}'", field.field, field.variable);
    }
    if s.missing_key_pairs > 0 {
        eprintln!("  {} pair(s) scored 0 on a missing key", s.missing_key_pairs);
    }
    if !result.priority.is_empty() {
        eprintln!("ranked by: {}", result.priority.join(", "));
    }
    eprintln!(
        "timings: matching {}ms, ranking {}ms",
        result.meta.timings.matching_ms, result.meta.timings.ranking_ms,
    );

    if result.is_empty() {
        eprintln!("no candidates found");
    }

    Ok(())
}

fn cmd_link_validate(config_path: PathBuf) -> Result<(), CliError> {
    let (config, model) = load_config(&config_path)?;
    eprintln!(
        "valid: linkage '{}' with {} rule(s), {} scheme(s) ({} in use), {} algorithm(s)",
        config.name,
        model.rules().len(),
        model.schemes().len(),
        model.priority().len(),
        model.algorithms().len(),
    );
    Ok(())
}
