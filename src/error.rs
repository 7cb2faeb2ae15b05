use axum::extract::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::env;
use std::fmt::{self, Debug, Display};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Invalid,
    Unauthorized,
    Conflict,
    NotFound,
    Unavailable,
    Internal,
}

/// Codes `1..=99` are internal failures and are never shown to callers.
#[derive(Debug)]
pub struct Error {
    pub kind: ErrorKind,
    pub code: i32,
    pub message: String,
}

impl Error {
    fn new(kind: ErrorKind, code: i32, message: impl Into<String>) -> Self {
        Self {
            kind,
            code,
            message: message.into(),
        }
    }

    pub fn is_not_found_error(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }

    pub fn is_conflict_error(&self) -> bool {
        self.kind == ErrorKind::Conflict
    }

    fn status(&self) -> StatusCode {
        match self.kind {
            ErrorKind::Invalid => StatusCode::BAD_REQUEST,
            ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Unavailable => StatusCode::BAD_GATEWAY,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ({}): {}", self.kind, self.code, self.message)
    }
}

impl std::error::Error for Error {}

impl From<env::VarError> for Error {
    fn from(err: env::VarError) -> Self {
        env_var_error(err)
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        database_error(err)
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        reqwest_error(err)
    }
}

impl From<oso::OsoError> for Error {
    fn from(err: oso::OsoError) -> Self {
        authorizor_error(err)
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_message = match self.code {
            1..=99 => "Internal Server Error",
            _ => self.message.as_str(),
        };

        let body = Json(json!({
            "code": self.code,
            "kind": self.kind,
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

pub fn invalid_input_error(message: impl Into<String>) -> Error {
    Error::new(ErrorKind::Invalid, 101, message)
}

pub fn unauthorized_error() -> Error {
    Error::new(ErrorKind::Unauthorized, 102, "unauthorized")
}

pub fn conflict_error(message: impl Into<String>) -> Error {
    Error::new(ErrorKind::Conflict, 103, message)
}

pub fn not_found_error(message: impl Into<String>) -> Error {
    Error::new(ErrorKind::NotFound, 104, message)
}

pub fn invalid_invocation_error() -> Error {
    Error::new(ErrorKind::Conflict, 100, "invalid state")
}

pub fn env_var_error(err: env::VarError) -> Error {
    tracing::error!("environment variable error: {}", err);
    Error::new(ErrorKind::Internal, 1, "environment variable error")
}

pub fn database_error<T: Debug>(err: T) -> Error {
    tracing::error!("database error: {:?}", err);
    Error::new(ErrorKind::Internal, 2, "database error")
}

pub fn reqwest_error(err: reqwest::Error) -> Error {
    tracing::error!("reqwest error: {}", err);
    Error::new(ErrorKind::Unavailable, 3, "reqwest error")
}

pub fn upstream_error() -> Error {
    Error::new(ErrorKind::Unavailable, 4, "upstream error")
}

pub fn unexpected_error() -> Error {
    Error::new(ErrorKind::Internal, 5, "unexpected error")
}

pub fn authorizor_error(err: oso::OsoError) -> Error {
    tracing::error!("authorizor error: {}", err);
    Error::new(ErrorKind::Internal, 6, "authorizor error")
}

#[test]
fn internal_messages_are_masked() {
    let response = database_error("connection reset").into_response();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let response = upstream_error().into_response();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}

#[test]
fn caller_facing_errors_map_to_status() {
    let cases = vec![
        (invalid_input_error("seats"), StatusCode::BAD_REQUEST),
        (unauthorized_error(), StatusCode::UNAUTHORIZED),
        (conflict_error("ride already exists"), StatusCode::CONFLICT),
        (not_found_error("ride not found"), StatusCode::NOT_FOUND),
        (invalid_invocation_error(), StatusCode::CONFLICT),
    ];

    for (err, status) in cases {
        assert_eq!(err.into_response().status(), status);
    }
}

#[test]
fn kind_predicates() {
    assert!(not_found_error("request not found").is_not_found_error());
    assert!(invalid_invocation_error().is_conflict_error());
    assert!(!unexpected_error().is_conflict_error());
}
