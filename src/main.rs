//! ChurnForge: e-commerce churn scoring CLI
//!
//! Orchestrates training, batch scoring of active customers and single-customer
//! simulation on top of the library.

use anyhow::{Context, Result};
use churnforge::cli::{Command, ScoreArgs, SimulateArgs, TrainArgs};
use churnforge::data::CategoricalAttribute;
use churnforge::profile::DataProfile;
use churnforge::{load_customers, run_training, viz, AppConfig, AppContext, Args, CandidateKind, TrainingReport};
use clap::Parser;
use colored::Colorize;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => AppConfig::load_from_path(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => AppConfig::default(),
    };

    let level = if args.verbose { "debug" } else { config.logging.level.as_str() };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_target(false)
        .init();

    match &args.command {
        Command::Train(train) => run_train(&config, train),
        Command::Score(score) => run_score(&config, score),
        Command::Simulate(simulate) => run_simulate(&config, simulate),
    }
}

/// Train both candidates, print their metrics and persist the chosen one
fn run_train(config: &AppConfig, args: &TrainArgs) -> Result<()> {
    println!("=== Churn Model Training ===\n");
    let start_time = Instant::now();

    let input = args.input.as_ref().unwrap_or(&config.paths.dataset);
    let artifact_path = args.artifact.as_ref().unwrap_or(&config.paths.artifact);

    let records = load_customers(input).with_context(|| format!("Failed to load {}", input.display()))?;
    println!("✓ Data loaded: {} customers", records.len());

    let report = run_training(records, &config.training).context("Training failed")?;
    print_training_report(&report, args.persist);

    if let Some(chart_path) = &args.roc_chart {
        if let Some(candidate) = report.candidate(args.persist) {
            let title = format!("ROC curves: {}", candidate.kind);
            viz::create_roc_chart(&candidate.evaluation, chart_path, &title)
                .with_context(|| format!("Failed to render {}", chart_path.display()))?;
            println!("ROC chart saved to: {}", chart_path.display());
        }
    }

    let artifact = report.into_artifact(args.persist)?;
    artifact
        .save(artifact_path)
        .with_context(|| format!("Failed to save artifact to {}", artifact_path.display()))?;

    println!("\n=== Training Complete ===");
    println!("Persisted candidate: {}", args.persist);
    println!("Artifact saved to: {}", artifact_path.display());
    println!("Total processing time: {:.2}s", start_time.elapsed().as_secs_f64());
    Ok(())
}

fn print_training_report(report: &TrainingReport, persisted: CandidateKind) {
    println!("\n=== Partitions ===");
    println!("Out-of-time cutoff: tenure <= {:.2}", report.oot_cutoff);
    for summary in &report.summaries {
        println!(
            "  {:5}: {:6} customers, churn rate {:.1}%",
            summary.partition.to_string(),
            summary.customers,
            summary.churn_rate * 100.0
        );
    }

    print_data_profile(&report.profile);

    println!("\n=== Selected Features ({}) ===", report.template.len());
    for importance in report.ranking.iter().take(report.template.len()) {
        println!(
            "  {:40} {:.4} (cumulative {:.4})",
            importance.feature, importance.importance, importance.cumulative
        );
    }

    for candidate in &report.candidates {
        let marker = if candidate.kind == persisted { " [persisted]" } else { "" };
        println!("\n=== {}{} ===", candidate.kind, marker);
        println!("Best parameters: {}", candidate.search.best);
        println!("Cross-validated ROC-AUC: {:.4}", candidate.search.best_score);
        println!("  Partition | Accuracy | ROC-AUC");
        println!("  ----------|----------|--------");
        for metrics in &candidate.evaluation.partitions {
            println!(
                "  {:9} | {:8.4} | {:7.4}",
                metrics.partition.to_string(),
                metrics.accuracy,
                metrics.roc_auc
            );
        }

        println!("  Discretised features:");
        for bins in candidate.pipeline.discretiser().bins() {
            println!(
                "    {:40} depth {} ({} bins)",
                bins.feature,
                bins.depth,
                bins.thresholds.len() + 1
            );
        }

        if let Some(coefficients) = candidate.pipeline.coefficients() {
            println!("  Largest coefficients:");
            for (name, weight) in coefficients.iter().take(10) {
                println!("    {:40} {:+.4}", name, weight);
            }
        }
        if let Some(importances) = candidate.pipeline.importances() {
            println!("  Most important columns:");
            for (name, importance) in importances.iter().take(10) {
                println!("    {:40} {:.4}", name, importance);
            }
        }
    }
}

/// Missing values, class statistics and category churn shares of the train partition
fn print_data_profile(profile: &DataProfile) {
    println!("\n=== Missing Values (train, {} rows) ===", profile.rows);
    if profile.missing.is_empty() {
        println!("  none");
    }
    for missing in &profile.missing {
        println!("  {:30} {:6} ({:.2}%)", missing.column, missing.count, missing.percent);
    }

    println!("\n=== Numeric Features by Class ===");
    println!("  {:30} | {:6} | {:>10} | {:>10} | diff_rel", "Feature", "Stat", "Retained", "Churned");
    for summary in &profile.numeric {
        println!(
            "  {:30} | {:6} | {:10.2} | {:10.2} | {:.2}",
            summary.column,
            summary.statistic.to_string(),
            summary.retained,
            summary.churned,
            summary.diff_rel
        );
    }

    for attribute in CategoricalAttribute::ALL {
        println!("\n=== {} ===", attribute.column_name());
        println!("  {:25} | {:>9} | {:>9} | diff_rel", "Category", "%Churn", "%Retained");
        for share in profile.categories_of(attribute) {
            println!(
                "  {:25} | {:9.2} | {:9.2} | {:.2}",
                share.category, share.churned_percent, share.retained_percent, share.diff_rel
            );
        }
    }
}

/// Print the scored table of active customers
fn run_score(config: &AppConfig, args: &ScoreArgs) -> Result<()> {
    let artifact_path = args.artifact.as_ref().unwrap_or(&config.paths.artifact);
    let dataset = args.input.as_ref().unwrap_or(&config.paths.dataset);

    let context = AppContext::load(artifact_path, dataset)
        .with_context(|| format!("Failed to load model artifact {}", artifact_path.display()))?;
    let scored = context.score_active_customers().context("Scoring failed")?;

    println!("=== Active Customers: churn probability and recommended action ===\n");
    println!("  {:>10} | {:>11} | Action", "CustomerID", "Churn (%)");
    println!("  -----------|-------------|------------------------");
    let limit = args.limit.unwrap_or(scored.len());
    for customer in scored.iter().take(limit) {
        println!(
            "  {:>10} | {:>11} | {}",
            customer.customer_id, customer.churn_probability, customer.action
        );
    }
    if limit < scored.len() {
        println!("  ... {} more", scored.len() - limit);
    }
    println!("\nScored {} active customers", scored.len());
    Ok(())
}

/// Score one customer and print the coloured risk readout
fn run_simulate(config: &AppConfig, args: &SimulateArgs) -> Result<()> {
    let artifact_path = args.artifact.as_ref().unwrap_or(&config.paths.artifact);
    let context = AppContext::load(artifact_path, &config.paths.dataset)
        .with_context(|| format!("Failed to load model artifact {}", artifact_path.display()))?;

    let profile = args.to_profile()?;
    let result = context.simulate(&profile).context("Simulation failed")?;

    let (r, g, b) = result.risk.color();
    let readout = format!(
        "{}: {:.1}% probability of churn",
        result.risk.label(),
        result.probability * 100.0
    );
    println!("=== Churn Simulation ===\n");
    println!("{}", readout.truecolor(r, g, b).bold());
    Ok(())
}
