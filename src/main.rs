//! # Leakscope CLI Entry Point
//!
//! Feeds front-end-produced method batches into the analysis core and
//! presents the resulting report.

use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use leakscope::{analyze_batch, Batch, CallPolicy, Cli, Policy, Report, SourceSpec};
use std::path::PathBuf;

/// Banner displayed at startup.
const BANNER: &str = r#"
 _            _
| | ___  __ _| | _____  ___ ___  _ __   ___
| |/ _ \/ _` | |/ / __|/ __/ _ \| '_ \ / _ \
| |  __/ (_| |   <\__ \ (_| (_) | |_) |  __/
|_|\___|\__,_|_|\_\___/\___\___/| .__/ \___|
                                |_|
        Information-Flow Leak Analyzer
"#;

/// Application entry point.
///
/// Initializes logging, parses command-line arguments, and dispatches to the
/// appropriate command handler.
fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        leakscope::cli::Commands::Analyze {
            path,
            format,
            policy,
            source_params,
            source_types,
            sinks,
            source_this,
            call_policy,
            max_iterations,
        } => {
            let policy = build_policy(
                policy,
                source_params,
                source_types,
                sinks,
                source_this,
                call_policy,
                max_iterations,
            )?;
            run_analyze(path, format, policy)?;
        }
        leakscope::cli::Commands::Policy => {
            println!("{}", serde_json::to_string_pretty(&Policy::default())?);
        }
        leakscope::cli::Commands::Version => {
            println!(
                "{} {}",
                "leakscope version:".green(),
                env!("CARGO_PKG_VERSION").yellow()
            );
        }
    }

    Ok(())
}

/// Assembles the effective policy from an optional policy file plus flag
/// overrides.
fn build_policy(
    policy_file: Option<PathBuf>,
    source_params: Vec<usize>,
    source_types: Vec<String>,
    sinks: Vec<String>,
    source_this: bool,
    call_policy: Option<String>,
    max_iterations: Option<usize>,
) -> Result<Policy> {
    let mut policy = match policy_file {
        Some(path) => {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("reading policy file {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("parsing policy file {}", path.display()))?
        }
        None => Policy::default(),
    };

    if !source_params.is_empty() {
        policy.sources = SourceSpec::Positions(source_params);
    } else if !source_types.is_empty() {
        policy.sources = SourceSpec::Types(source_types);
    }

    if !sinks.is_empty() {
        let wanted: Vec<String> = sinks.iter().map(|s| s.to_lowercase()).collect();
        policy.report_external_output = wanted.iter().any(|s| s == "external");
        policy.report_shared_state = wanted.iter().any(|s| s == "shared");
        policy.report_annotated = wanted.iter().any(|s| s == "annotated");
    }

    if source_this {
        policy.this_is_source = true;
    }

    if let Some(spec) = call_policy {
        policy.call_policy = CallPolicy::from_str(&spec);
    }

    if let Some(cap) = max_iterations {
        policy.max_iterations = cap;
    }

    Ok(policy)
}

/// Executes the analysis over one batch file or a directory of them.
fn run_analyze(path: PathBuf, format: String, policy: Policy) -> Result<()> {
    use indicatif::{ProgressBar, ProgressStyle};

    let quiet = format == "json";
    if !quiet {
        println!("{}", BANNER.cyan().bold());
        println!(
            "{} {}",
            "[*] Analyzing:".green().bold(),
            path.display().to_string().yellow()
        );
    }

    let files = collect_batch_files(&path)?;
    if files.is_empty() {
        anyhow::bail!("no batch files found under {}", path.display());
    }

    let pb = if quiet {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new(files.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap()
                .progress_chars("=>-"),
        );
        pb
    };

    let mut master = Report::new();
    for file in &files {
        pb.set_message(format!(
            "Analyzing {}",
            file.file_name().unwrap_or_default().to_string_lossy()
        ));

        let text = std::fs::read_to_string(file)
            .with_context(|| format!("reading batch file {}", file.display()))?;
        let batch: Batch = serde_json::from_str(&text)
            .with_context(|| format!("parsing batch file {}", file.display()))?;

        let mut report = analyze_batch(&batch.methods, &policy);
        for finding in report.drain() {
            master.append(finding);
        }

        pb.inc(1);
    }
    pb.finish_and_clear();

    match format.as_str() {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&master.document())?);
        }
        _ => {
            master.print_terminal();
            println!("\n{}", "=".repeat(60).cyan());
            master.print_summary();
        }
    }

    Ok(())
}

/// Collects JSON batch files from a file or directory path.
fn collect_batch_files(path: &PathBuf) -> Result<Vec<PathBuf>> {
    use walkdir::WalkDir;

    if path.is_file() {
        return Ok(vec![path.clone()]);
    }

    let mut files: Vec<PathBuf> = WalkDir::new(path)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().map_or(false, |ext| ext == "json"))
        .map(|e| e.path().to_path_buf())
        .collect();
    files.sort();

    Ok(files)
}
