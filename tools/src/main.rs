//! score-runner: headless batch scorer for the churn and fraud tables.
//!
//! Usage:
//!   score-runner                                  # run every pipeline on its schedule
//!   score-runner --pipeline fraud --once          # score pending fraud rows now
//!   score-runner --db scoring.db --prepare        # add prediction columns
//!   score-runner --db scoring.db --summary        # print prediction totals
//!
//! The database defaults to SCORING_DB (or SQL_SERVER/SQL_DATABASE); the
//! stream sink comes from SCORING_SINK and SCORING_SINK_TOKEN.

use anyhow::Result;
use scoring_core::{
    config::{ConnectionSettings, PipelineConfig, RunnerConfig, SinkSettings},
    engine::Scheduler,
    job::{RunOutcome, ScoringJob},
    sink,
    store::ScoringStore,
};
use std::env;
use std::path::Path;

enum Mode {
    Schedule,
    Once,
    Prepare,
    DropColumns,
    Summary,
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let config_path = parse_arg(&args, "--config");
    let models_dir = parse_arg(&args, "--models").unwrap_or("./models");
    let pipeline = parse_arg(&args, "--pipeline");
    let mode = if has_flag(&args, "--once") {
        Mode::Once
    } else if has_flag(&args, "--prepare") {
        Mode::Prepare
    } else if has_flag(&args, "--drop-columns") {
        Mode::DropColumns
    } else if has_flag(&args, "--summary") {
        Mode::Summary
    } else {
        Mode::Schedule
    };

    let db = match parse_arg(&args, "--db") {
        Some(path) => ConnectionSettings::new(path),
        None => ConnectionSettings::from_env()?,
    };

    let config = match config_path {
        Some(path) => RunnerConfig::load(path)?,
        None => RunnerConfig::builtin(),
    };
    let pipelines: Vec<PipelineConfig> = match pipeline {
        Some(name) => vec![config.pipeline(name)?.clone()],
        None => config.pipelines.clone(),
    };

    println!("score-runner");
    println!("  db:        {}", db.connection_string);
    println!("  models:    {models_dir}");
    println!(
        "  pipelines: {}",
        pipelines.iter().map(|p| p.name.as_str()).collect::<Vec<_>>().join(", ")
    );
    println!();

    match mode {
        Mode::Prepare => {
            let store = open_store(&db)?;
            for p in &pipelines {
                let added = store.ensure_output_columns(p)?;
                println!("  {:<8} {} added {:?}", p.name, p.table, added);
            }
        }
        Mode::DropColumns => {
            let store = open_store(&db)?;
            for p in &pipelines {
                let dropped = store.drop_output_columns(p)?;
                println!("  {:<8} {} dropped {:?}", p.name, p.table, dropped);
            }
        }
        Mode::Summary => {
            let store = open_store(&db)?;
            print_summary(&store, &pipelines)?;
        }
        Mode::Once | Mode::Schedule => {
            let sink = SinkSettings::from_env()
                .map(|s| sink::from_settings(&s))
                .transpose()?;
            if sink.is_none() {
                log::info!("SCORING_SINK not set, scored records will not be forwarded");
            }

            let mut scheduler = Scheduler::new(db, sink);
            let now = chrono::Utc::now();
            for p in pipelines {
                let job = ScoringJob::load(p, Path::new(models_dir))?;
                scheduler.register(job, now)?;
            }

            if matches!(mode, Mode::Once) {
                let outcomes = scheduler.run_all_now();
                print_outcomes(&outcomes);
                if outcomes.iter().any(|(_, o)| matches!(o, RunOutcome::Failed(_))) {
                    anyhow::bail!("one or more pipelines failed");
                }
            } else {
                scheduler.run_forever()?;
            }
        }
    }

    Ok(())
}

fn open_store(db: &ConnectionSettings) -> Result<ScoringStore> {
    let store = ScoringStore::open(&db.connection_string)?;
    store.migrate()?;
    Ok(store)
}

fn print_outcomes(outcomes: &[(String, RunOutcome)]) {
    println!("=== RUN SUMMARY ===");
    for (name, outcome) in outcomes {
        match outcome {
            RunOutcome::NothingPending => println!("  {name:<8} nothing pending"),
            RunOutcome::Scored(s) => println!(
                "  {name:<8} scored {} | positive {} ({:.2}%) | threshold {} | updated {} | published {}",
                s.rows_scored, s.positives, s.positive_rate, s.threshold, s.rows_updated, s.published
            ),
            RunOutcome::Failed(reason) => println!("  {name:<8} FAILED: {reason}"),
        }
        if let RunOutcome::Scored(s) = outcome {
            if s.ambiguous_keys > 0 {
                println!("  {name:<8} {} keys matched more than one row", s.ambiguous_keys);
            }
        }
    }
}

fn print_summary(store: &ScoringStore, pipelines: &[PipelineConfig]) -> Result<()> {
    println!("=== PREDICTION SUMMARY ===");
    for p in pipelines {
        let s = store.prediction_summary(p)?;
        println!(
            "  {:<8} rows {} | processed {} | pending {} | positive {} ({:.2}%)",
            s.pipeline, s.total_rows, s.processed_rows, s.pending_rows, s.predicted_positive, s.positive_rate
        );
    }

    println!();
    println!("=== RECENT RUNS ===");
    for p in pipelines {
        let runs = store.recent_runs(&p.name, 5)?;
        if runs.is_empty() {
            println!("  {:<8} (no runs yet)", p.name);
        }
        for r in runs {
            println!(
                "  {:<8} {} | scored {} | positive {} | threshold {}{}",
                r.pipeline,
                r.finished_at,
                r.rows_scored,
                r.positives,
                r.threshold,
                if r.past_due { " | past due" } else { "" }
            );
        }
    }
    Ok(())
}

fn parse_arg<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2).find(|w| w[0] == flag).map(|w| w[1].as_str())
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}
