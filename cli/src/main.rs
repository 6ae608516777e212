//! A simple CLI for running the cheese contest from a terminal.

#![warn(clippy::all, clippy::pedantic)]

extern crate cheese_common;
use cheese_common::export::{ranked_to_csv, submissions_to_csv, write_snapshot};
use cheese_common::{FileCoordinator, RankedRecord, SubmissionRecord};

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand, ValueEnum};
use std::io::Write;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Directory holding the session and submission files
    #[arg(long, default_value = "data", env = "CHEESE_DATA_DIR")]
    data_dir: PathBuf,

    /// Show additional output
    #[arg(short, long, env = "CHEESE_VERBOSE")]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the stopwatch for a team
    Start { team: String },

    /// Show whether a team is running and for how long
    Status { team: String },

    /// Submit a team's estimate and stop its stopwatch
    Submit {
        team: String,
        #[arg(allow_negative_numbers = true)]
        estimate: f64,
        /// The team's own guess at its absolute error
        #[arg(short, long, default_value_t = 0.0)]
        error_estimate: f64,
    },

    /// List every submission so far
    Submissions {
        #[arg(value_enum, short, long, default_value = "table")]
        output: OutputFormat,
    },

    /// Score and rank every submission
    Rank {
        #[arg(value_enum, short, long, default_value = "table")]
        output: OutputFormat,
    },

    /// Save a timestamped copy of the submissions
    Snapshot {
        #[arg(long, default_value = "snapshots", env = "CHEESE_SNAPSHOT_DIR")]
        dir: PathBuf,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Table,
    Csv,
    Json,
}

/// Results table as the organizers see it, four decimal places throughout.
fn format_ranking(ranked: &[RankedRecord]) -> String {
    let team_width = ranked
        .iter()
        .map(|r| r.record.team.chars().count())
        .max()
        .unwrap_or(0)
        .max(4);
    let mut out = format!(
        "{:>4}  {:<team_width$}  {:>10}  {:>10}  {:>10}  {:>8}  {:>8}  {:>8}  {:>8}  {:>8}  {:>11}\n",
        "rank",
        "team",
        "time",
        "estimate",
        "error",
        "s_n",
        "t_n",
        "score",
        "z",
        "bonus",
        "final_score"
    );
    for r in ranked {
        out.push_str(&format!(
            "{:>4}  {:<team_width$}  {:>10.4}  {:>10.4}  {:>10.4}  {:>8.4}  {:>8.4}  {:>8.4}  {:>8.4}  {:>8.4}  {:>11.4}\n",
            r.rank,
            r.record.team,
            r.record.time,
            r.record.estimate,
            r.record.error,
            r.s_n,
            r.t_n,
            r.score,
            r.z_statistic,
            r.error_bonus,
            r.final_score
        ));
    }
    out
}

fn format_submissions(records: &[SubmissionRecord]) -> String {
    let team_width = records
        .iter()
        .map(|r| r.team.chars().count())
        .max()
        .unwrap_or(0)
        .max(4);
    let mut out = format!(
        "{:<team_width$}  {:>10}  {:>10}  {:>10}  {:>14}  timestamp\n",
        "team", "time", "estimate", "error", "error_estimate"
    );
    for r in records {
        out.push_str(&format!(
            "{:<team_width$}  {:>10.4}  {:>10.4}  {:>10.4}  {:>14.4}  {}\n",
            r.team,
            r.time,
            r.estimate,
            r.error,
            r.error_estimate,
            r.timestamp.to_rfc3339()
        ));
    }
    out
}

/// Run one subcommand against the files in `cli.data_dir`, writing its output to `out`.
fn run(cli: &Cli, out: &mut impl Write) -> Result<()> {
    let coordinator = FileCoordinator::open(&cli.data_dir);

    match &cli.command {
        Command::Start { team } => {
            let session = coordinator
                .start_session(team)
                .with_context(|| format!("Could not start team '{team}'"))?;
            writeln!(
                out,
                "Team {} started at {}",
                session.team,
                session.start_time.with_timezone(&Local).format("%H:%M:%S")
            )?;
        }
        Command::Status { team } => match coordinator.elapsed_secs(team)? {
            Some(elapsed) => writeln!(out, "Team {team} running for {elapsed:.1}s")?,
            None => writeln!(out, "Team {team} has no running session")?,
        },
        Command::Submit {
            team,
            estimate,
            error_estimate,
        } => {
            let record = coordinator
                .submit_solution(team, *estimate, *error_estimate)
                .with_context(|| format!("Could not record submission for team '{team}'"))?;
            writeln!(
                out,
                "Team {} submitted {} after {:.1}s (error {:.4})",
                record.team, record.estimate, record.time, record.error
            )?;
            if cli.verbose {
                writeln!(out, "{}", serde_json::to_string_pretty(&record)?)?;
            }
        }
        Command::Submissions { output } => {
            let records = coordinator
                .submissions()
                .context("Could not read submissions")?;
            match output {
                OutputFormat::Table => out.write_all(format_submissions(&records).as_bytes())?,
                OutputFormat::Csv => out.write_all(&submissions_to_csv(&records)?)?,
                OutputFormat::Json => {
                    writeln!(out, "{}", serde_json::to_string_pretty(&records)?)?;
                }
            }
        }
        Command::Rank { output } => {
            let ranked = coordinator.ranking().context("Could not read submissions")?;
            log::debug!("Ranked {} submissions", ranked.len());
            match output {
                OutputFormat::Table => out.write_all(format_ranking(&ranked).as_bytes())?,
                OutputFormat::Csv => out.write_all(&ranked_to_csv(&ranked)?)?,
                OutputFormat::Json => {
                    writeln!(out, "{}", serde_json::to_string_pretty(&ranked)?)?;
                }
            }
        }
        Command::Snapshot { dir } => {
            let records = coordinator
                .submissions()
                .context("Could not read submissions")?;
            let path = write_snapshot(dir, &records, &Local::now())
                .with_context(|| format!("Could not write snapshot to {}", dir.display()))?;
            writeln!(out, "Snapshot saved as {}", path.display())?;
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Start the logger
    env_logger::init();

    run(&cli, &mut std::io::stdout().lock())
}
