//! cx-runner: headless batch runner for the customer-health pipeline.
//!
//! Usage:
//!   cx-runner --db health.db --seed 42 --users 500
//!   cx-runner --db health.db --as-of "2024-03-01 00:00:00"
//!   cx-runner --db health.db --export run.json

use anyhow::{Context, Result};
use chrono::{NaiveDateTime, Utc};
use cxhealth_core::{
    cohort::CohortCell,
    forest::ForestConfig,
    master::MasterRecord,
    ml_model::ModelReport,
    pipeline::{Pipeline, PipelineRun},
    store::PipelineStore,
    summary::RunSummary,
    synthetic::generate_population,
};
use std::{env, fs};

/// Everything a downstream dashboard needs from one run.
#[derive(serde::Serialize)]
struct RunExport<'a> {
    run_id: &'a str,
    as_of: String,
    summary: &'a RunSummary,
    model: &'a ModelReport,
    master: &'a [MasterRecord],
    cohorts: &'a [CohortCell],
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let seed = parse_arg(&args, "--seed", 42u64);
    let users = parse_arg(&args, "--users", 500usize);
    let db = args
        .windows(2)
        .find(|w| w[0] == "--db")
        .map(|w| w[1].as_str())
        .unwrap_or(":memory:");
    let as_of = match args.windows(2).find(|w| w[0] == "--as-of").map(|w| w[1].as_str()) {
        Some(raw) => NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
            .with_context(|| format!("unparseable --as-of '{raw}', want YYYY-MM-DD HH:MM:SS"))?,
        None => Utc::now().naive_utc(),
    };

    println!("cx-runner — customer health pipeline");
    println!("  seed:   {seed}");
    println!("  users:  {users}");
    println!("  db:     {db}");
    println!("  as_of:  {}", as_of.format("%Y-%m-%d %H:%M:%S"));
    println!();

    let mut store = PipelineStore::open(db)?;
    store.migrate()?;

    if store.account_count()? == 0 {
        log::info!("account table is empty, seeding {users} synthetic users");
        let (accounts, events) = generate_population(users, seed, as_of);
        store.insert_accounts(&accounts)?;
        store.insert_events(&events)?;
    }

    let accounts = store.load_accounts()?;
    let events = store.load_events()?;
    println!("loaded {} accounts, {} events", accounts.len(), events.len());

    let config = ForestConfig {
        seed,
        ..ForestConfig::default()
    };
    let mut pipeline = Pipeline::new(config);
    let run = pipeline.run(&accounts, &events, as_of)?;

    store.record_run(&run, env!("CARGO_PKG_VERSION"))?;
    store.replace_master(&run.run_id, &run.master)?;
    store.insert_model_report(&run.run_id, &run.model_report)?;

    if let Some(path) = args.windows(2).find(|w| w[0] == "--export").map(|w| w[1].as_str()) {
        export_run(&run, path)?;
    }

    print_summary(&run);
    Ok(())
}

fn export_run(run: &PipelineRun, path: &str) -> Result<()> {
    let export = RunExport {
        run_id: &run.run_id,
        as_of: run.as_of.format("%Y-%m-%d %H:%M:%S").to_string(),
        summary: &run.summary,
        model: &run.model_report,
        master: &run.master,
        cohorts: &run.cohorts,
    };
    let json = serde_json::to_string_pretty(&export)?;
    fs::write(path, json).with_context(|| format!("writing export to {path}"))?;
    log::info!("exported run {} to {path}", run.run_id);
    Ok(())
}

fn print_summary(run: &PipelineRun) {
    let summary = &run.summary;
    let eval = &run.model_report.evaluation;

    println!();
    println!("=== RUN SUMMARY ===");
    println!("  run_id:          {}", run.run_id);
    println!("  users scored:    {}", summary.total_users);
    println!("  active:          {}", summary.active_users);
    println!("  churned:         {}", summary.inactive_users);
    println!("  total ARR:       ${:.0}", summary.total_arr);
    println!("  avg ARR:         ${:.0}", summary.avg_arr);
    println!("  avg NPS:         {:.1}", summary.avg_nps);
    println!("  avg health:      {:.1}", summary.avg_health_score);
    println!(
        "  health tiers:    {} red / {} yellow / {} green",
        summary.health_tiers.red, summary.health_tiers.yellow, summary.health_tiers.green
    );
    println!("  high churn risk: {}", summary.high_risk_users);
    println!("  renewal risk:    {}", summary.renewal_risk_users);
    println!("  GRR:             {:.1}%", summary.gross_revenue_retention);
    println!("  NRR:             {:.1}%", summary.net_revenue_retention);

    println!();
    println!("=== CHURN MODEL ===");
    println!("  model_id:   {}", run.model_report.model_id);
    println!("  train/test: {} / {}", eval.train_rows, eval.test_rows);
    println!("  ROC-AUC:    {:.4}", eval.roc_auc);
    println!("  accuracy:   {:.4}", eval.accuracy);
    println!("  precision:  {:.4}", eval.precision);
    println!("  recall:     {:.4}", eval.recall);
    println!("  F1:         {:.4}", eval.f1);
    println!();
    println!("  Top features by importance:");
    for entry in eval.feature_importance.iter().take(5) {
        println!("    {:<28} {:.4}", entry.feature, entry.importance);
    }

    println!();
    println!("=== COHORT RETENTION (latest offset per cohort) ===");
    let latest = latest_per_cohort(&run.cohorts);
    if latest.is_empty() {
        println!("  (no cohorts)");
    } else {
        let recent: Vec<_> = latest.iter().rev().take(6).collect();
        for cell in recent.iter().rev() {
            println!(
                "  {} | size {:>4} | +{:>2}mo | retention {:>5.1}%",
                cell.cohort_month, cell.cohort_size, cell.months_since_signup, cell.retention_rate
            );
        }
    }
}

/// Cells arrive sorted by (cohort, offset); keep each cohort's last.
fn latest_per_cohort(cells: &[CohortCell]) -> Vec<&CohortCell> {
    let mut latest: Vec<&CohortCell> = Vec::new();
    for cell in cells {
        match latest.last_mut() {
            Some(prev) if prev.cohort_month == cell.cohort_month => *prev = cell,
            _ => latest.push(cell),
        }
    }
    latest
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}
