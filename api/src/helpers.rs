//! Some helper functions for the API.

use cheese_common::CoordinatorError;
use rocket::fairing::{Fairing, Info, Kind};
use rocket::http::Header;
use rocket::http::Status;
use rocket::request::{self, FromRequest, Request};
use rocket::response::Response;
use rocket::response::status as rocket_status;
use rocket::serde::json::Json;
use rocket::serde::{Deserialize, Serialize};
use std::time::Instant;

/// Header the organizer view must send.
pub const ORGANIZER_HEADER: &str = "X-Organizer-Passphrase";

#[derive(Clone, Copy)]
pub struct RequestTimingFairing;

#[rocket::async_trait]
impl Fairing for RequestTimingFairing {
    fn info(&self) -> Info {
        Info {
            name: "Request timing",
            kind: Kind::Request | Kind::Response,
        }
    }

    async fn on_request(&self, request: &mut Request<'_>, _data: &mut rocket::Data<'_>) {
        request.local_cache(Instant::now);
    }

    async fn on_response<'r>(&self, request: &'r Request<'_>, response: &mut Response<'r>) {
        let started_at = request.local_cache(Instant::now);
        let elapsed = started_at.elapsed();
        let status = response.status().code;

        tracing::info!(
            method = %request.method(),
            path = %request.uri(),
            status = status,
            elapsed_ms = elapsed.as_millis(),
            "Request Completed"
        );
    }
}

/// Team forms are served from elsewhere, so let browsers call us directly.
#[derive(Clone, Copy)]
pub struct CorsFairing;

#[rocket::async_trait]
impl Fairing for CorsFairing {
    fn info(&self) -> Info {
        Info {
            name: "CORS",
            kind: Kind::Response,
        }
    }

    async fn on_response<'r>(&self, _request: &'r Request<'_>, response: &mut Response<'r>) {
        response.set_header(Header::new("Access-Control-Allow-Origin", "*"));
        response.set_header(Header::new(
            "Access-Control-Allow-Methods",
            "GET, POST, OPTIONS",
        ));
        response.set_header(Header::new(
            "Access-Control-Allow-Headers",
            format!("Content-Type, {ORGANIZER_HEADER}"),
        ));
        response.set_header(Header::new("Access-Control-Max-Age", "86400"));
    }
}

/// The shared passphrase gating the organizer routes. `None` locks them entirely.
pub struct OrganizerPassphrase(pub Option<String>);

/// Request guard proving the caller knows the organizer passphrase.
pub struct Organizer;

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Organizer {
    type Error = &'static str;

    async fn from_request(request: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let expected = request
            .rocket()
            .state::<OrganizerPassphrase>()
            .and_then(|p| p.0.as_deref());
        let Some(expected) = expected else {
            tracing::warn!("Organizer route requested but no passphrase is configured");
            return request::Outcome::Error((Status::Unauthorized, "organizer view disabled"));
        };
        match request.headers().get_one(ORGANIZER_HEADER) {
            Some(given) if given == expected => request::Outcome::Success(Organizer),
            Some(_) => {
                tracing::warn!(path = %request.uri(), "Wrong organizer passphrase");
                request::Outcome::Error((Status::Unauthorized, "wrong passphrase"))
            }
            None => request::Outcome::Error((Status::Unauthorized, "missing passphrase")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(crate = "rocket::serde")]
#[serde(rename_all = "snake_case")]
pub enum ApiErrorKind {
    NotFound,
    BadRequest,
    Unauthorized,
    AlreadyActive,
    NoActiveSession,
    InvalidInput,
    PersistFailure,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(crate = "rocket::serde")]
pub struct ApiErrorBody {
    pub ok: bool,
    pub error: ApiErrorKind,
    pub message: String,
}

impl ApiErrorBody {
    fn new(error: ApiErrorKind, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            error,
            message: message.into(),
        }
    }
}

pub type ApiError = rocket_status::Custom<Json<ApiErrorBody>>;
pub type ApiResult<T> = Result<Json<T>, ApiError>;

fn api_error(status: Status, kind: ApiErrorKind, message: impl Into<String>) -> ApiError {
    rocket_status::Custom(status, Json(ApiErrorBody::new(kind, message)))
}

pub fn not_found_error(message: impl Into<String>) -> ApiError {
    api_error(Status::NotFound, ApiErrorKind::NotFound, message)
}

pub fn bad_request_error(message: impl Into<String>) -> ApiError {
    api_error(Status::BadRequest, ApiErrorKind::BadRequest, message)
}

/// Well-formed JSON that does not fit the route's request body.
pub fn unprocessable_entity_error(message: impl Into<String>) -> ApiError {
    api_error(
        Status::UnprocessableEntity,
        ApiErrorKind::BadRequest,
        message,
    )
}

pub fn unauthorized_error(message: impl Into<String>) -> ApiError {
    api_error(Status::Unauthorized, ApiErrorKind::Unauthorized, message)
}

pub fn persist_error(message: impl Into<String>) -> ApiError {
    api_error(
        Status::InternalServerError,
        ApiErrorKind::PersistFailure,
        message,
    )
}

/// Map a coordinator failure onto a status code and error body.
pub fn coordinator_error(err: CoordinatorError) -> ApiError {
    let message = err.to_string();
    match err {
        CoordinatorError::AlreadyActive { .. } => {
            api_error(Status::Conflict, ApiErrorKind::AlreadyActive, message)
        }
        CoordinatorError::NoActiveSession { .. } => {
            api_error(Status::Conflict, ApiErrorKind::NoActiveSession, message)
        }
        CoordinatorError::InvalidTeam | CoordinatorError::InvalidInput(_) => api_error(
            Status::UnprocessableEntity,
            ApiErrorKind::InvalidInput,
            message,
        ),
        CoordinatorError::PersistFailure(e) => {
            tracing::error!(error = %e, "Failed to persist");
            persist_error(message)
        }
    }
}
