//! An api for collecting and ranking cheese integration results.

#![warn(clippy::all, clippy::pedantic)]

#[macro_use]
extern crate rocket;

mod helpers;
use helpers::{
    ApiError, ApiResult, CorsFairing, Organizer, OrganizerPassphrase, RequestTimingFairing,
    bad_request_error, coordinator_error, not_found_error, persist_error, unauthorized_error,
    unprocessable_entity_error,
};

use cheese_common::export::{ranked_to_csv, submissions_to_csv, write_snapshot};
use cheese_common::{
    CLIENT_VERSION, Clock, FileCoordinator, RankedRecord, StoreError, SubmissionRecord,
    SystemClock, TeamSession,
};
use chrono::Local;
use clap::Parser;
use rocket::State;
use rocket::http::Header;
use rocket::serde::json::Json;
use rocket::serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Directory holding the session and submission files
    #[arg(long, default_value = "data", env = "CHEESE_DATA_DIR")]
    data_dir: PathBuf,

    /// Shared passphrase for the organizer routes, which stay locked when unset
    #[arg(long, env = "CHEESE_ORGANIZER_PASSPHRASE", hide_env_values = true)]
    organizer_passphrase: Option<String>,

    /// Write a timestamped copy of all submissions here after every submission
    #[arg(long, env = "CHEESE_SNAPSHOT_DIR")]
    snapshot_dir: Option<PathBuf>,
}

type SharedClock = Arc<dyn Clock + Send + Sync>;

struct AppState {
    coordinator: FileCoordinator<SharedClock>,
    snapshot_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
#[serde(crate = "rocket::serde")]
struct StartRequest {
    team: String,
}

#[derive(Debug, Serialize)]
#[serde(crate = "rocket::serde")]
struct StartResponse {
    ok: bool,
    message: String,
    session: TeamSession,
}

#[derive(Debug, Serialize)]
#[serde(crate = "rocket::serde")]
struct SessionStatus {
    session: Option<TeamSession>,
    elapsed_secs: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(crate = "rocket::serde")]
struct SubmitRequest {
    team: String,
    estimate: f64,
    #[serde(default)]
    error_estimate: f64,
}

#[derive(Debug, Serialize)]
#[serde(crate = "rocket::serde")]
struct SubmitResponse {
    ok: bool,
    message: String,
    record: SubmissionRecord,
}

#[derive(Responder)]
#[response(content_type = "text/csv")]
struct CsvDownload {
    body: Vec<u8>,
    disposition: Header<'static>,
}

impl CsvDownload {
    fn new(body: Vec<u8>, file_name: &str) -> Self {
        Self {
            body,
            disposition: Header::new(
                "Content-Disposition",
                format!("attachment; filename=\"{file_name}\""),
            ),
        }
    }
}

fn store_error(err: &StoreError) -> ApiError {
    tracing::error!(error = %err, "Failed to access the data directory");
    persist_error(err.to_string())
}

#[post("/session/start", data = "<request>")]
fn start_session(state: &State<AppState>, request: Json<StartRequest>) -> ApiResult<StartResponse> {
    let session = state
        .coordinator
        .start_session(&request.team)
        .map_err(coordinator_error)?;
    Ok(Json(StartResponse {
        ok: true,
        message: format!("Stopwatch started for team '{}'", session.team),
        session,
    }))
}

#[get("/session/<team>")]
fn session_status(state: &State<AppState>, team: &str) -> ApiResult<SessionStatus> {
    let status = state
        .coordinator
        .session_status(team)
        .map_err(coordinator_error)?;
    let (session, elapsed_secs) = status.unzip();
    Ok(Json(SessionStatus {
        session,
        elapsed_secs,
    }))
}

#[post("/submit", data = "<request>")]
fn submit(state: &State<AppState>, request: Json<SubmitRequest>) -> ApiResult<SubmitResponse> {
    let record = state
        .coordinator
        .submit_solution(&request.team, request.estimate, request.error_estimate)
        .map_err(coordinator_error)?;

    // the submission is already stored, a failed snapshot only gets logged
    if let Some(dir) = &state.snapshot_dir {
        let snapshot = state
            .coordinator
            .submissions()
            .and_then(|records| write_snapshot(dir, &records, &Local::now()));
        if let Err(e) = snapshot {
            tracing::warn!(error = %e, "Failed to write submission snapshot");
        }
    }

    Ok(Json(SubmitResponse {
        ok: true,
        message: format!("Team '{}' added (time: {:.1}s)", record.team, record.time),
        record,
    }))
}

#[get("/organizer/submissions")]
fn organizer_submissions(
    _organizer: Organizer,
    state: &State<AppState>,
) -> ApiResult<Vec<SubmissionRecord>> {
    let records = state
        .coordinator
        .submissions()
        .map_err(|e| store_error(&e))?;
    Ok(Json(records))
}

#[get("/organizer/ranking")]
fn organizer_ranking(
    _organizer: Organizer,
    state: &State<AppState>,
) -> ApiResult<Vec<RankedRecord>> {
    let ranking = state.coordinator.ranking().map_err(|e| store_error(&e))?;
    Ok(Json(ranking))
}

#[get("/organizer/ranking.csv")]
fn organizer_ranking_csv(
    _organizer: Organizer,
    state: &State<AppState>,
) -> Result<CsvDownload, ApiError> {
    let ranking = state.coordinator.ranking().map_err(|e| store_error(&e))?;
    let body = ranked_to_csv(&ranking).map_err(|e| store_error(&e))?;
    Ok(CsvDownload::new(body, "team_scores.csv"))
}

#[get("/organizer/submissions.csv")]
fn organizer_submissions_csv(
    _organizer: Organizer,
    state: &State<AppState>,
) -> Result<CsvDownload, ApiError> {
    let records = state
        .coordinator
        .submissions()
        .map_err(|e| store_error(&e))?;
    let body = submissions_to_csv(&records).map_err(|e| store_error(&e))?;
    Ok(CsvDownload::new(body, "team_data.csv"))
}

#[catch(400)]
fn bad_request() -> ApiError {
    bad_request_error("The request could not be understood.")
}

#[catch(401)]
fn unauthorized() -> ApiError {
    unauthorized_error("A valid organizer passphrase is required.")
}

#[catch(404)]
fn not_found() -> ApiError {
    not_found_error("The requested resource could not be found.")
}

#[catch(422)]
fn unprocessable() -> ApiError {
    unprocessable_entity_error("The request body is not valid JSON for this route.")
}

fn build_rocket(cli: Cli, clock: SharedClock) -> rocket::Rocket<rocket::Build> {
    if cli.organizer_passphrase.is_none() {
        tracing::warn!("No organizer passphrase configured, organizer routes are locked");
    }
    tracing::info!(
        data_dir = %cli.data_dir.display(),
        version = CLIENT_VERSION,
        "Starting cheese api"
    );

    rocket::build()
        .manage(AppState {
            coordinator: FileCoordinator::<SharedClock>::open_with_clock(&cli.data_dir, clock),
            snapshot_dir: cli.snapshot_dir,
        })
        .manage(OrganizerPassphrase(cli.organizer_passphrase))
        .mount(
            "/",
            routes![
                start_session,
                session_status,
                submit,
                organizer_submissions,
                organizer_ranking,
                organizer_ranking_csv,
                organizer_submissions_csv,
            ],
        )
        .register("/", catchers![bad_request, unauthorized, not_found, unprocessable])
        .attach(RequestTimingFairing)
        .attach(CorsFairing)
}

#[launch]
fn rocket() -> _ {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    build_rocket(Cli::parse(), Arc::new(SystemClock))
}
