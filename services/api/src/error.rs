use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use semaforo::catalog::CatalogError;
use semaforo::config::ConfigError;
use semaforo::defense::DefenseError;
use semaforo::ledger::{LedgerError, RepositoryError};
use semaforo::learning::LearningError;
use semaforo::telemetry::TelemetryError;
use serde_json::json;
use std::fmt;

#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Telemetry(TelemetryError),
    Io(std::io::Error),
    Server(axum::Error),
    Catalog(CatalogError),
    Ledger(LedgerError),
    Learning(LearningError),
    Defense(DefenseError),
    Repository(RepositoryError),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "configuration error: {}", err),
            AppError::Telemetry(err) => write!(f, "telemetry error: {}", err),
            AppError::Io(err) => write!(f, "io error: {}", err),
            AppError::Server(err) => write!(f, "server error: {}", err),
            AppError::Catalog(err) => write!(f, "catalog error: {}", err),
            AppError::Ledger(err) => write!(f, "ledger error: {}", err),
            AppError::Learning(err) => write!(f, "learning error: {}", err),
            AppError::Defense(err) => write!(f, "defense error: {}", err),
            AppError::Repository(err) => write!(f, "repository error: {}", err),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(err) => Some(err),
            AppError::Telemetry(err) => Some(err),
            AppError::Io(err) => Some(err),
            AppError::Server(err) => Some(err),
            AppError::Catalog(err) => Some(err),
            AppError::Ledger(err) => Some(err),
            AppError::Learning(err) => Some(err),
            AppError::Defense(err) => Some(err),
            AppError::Repository(err) => Some(err),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Catalog(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Ledger(err) => match err {
                LedgerError::CaseNotFound { .. } => StatusCode::NOT_FOUND,
                LedgerError::CaseClosed { .. }
                | LedgerError::IncompleteCriticalQuestions { .. } => StatusCode::CONFLICT,
                LedgerError::UnknownQuestion { .. }
                | LedgerError::QuestionNotApplicable { .. }
                | LedgerError::Shape(_) => StatusCode::UNPROCESSABLE_ENTITY,
                LedgerError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            AppError::Learning(err) => match err {
                LearningError::CaseNotFound { .. }
                | LearningError::UnknownSegment { .. }
                | LearningError::UnknownCandidate { .. } => StatusCode::NOT_FOUND,
                LearningError::CaseStillOpen { .. }
                | LearningError::InsufficientObservations { .. } => StatusCode::CONFLICT,
                LearningError::Contention { .. } => StatusCode::SERVICE_UNAVAILABLE,
                LearningError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            AppError::Defense(err) => match err {
                DefenseError::IllegalTransition { .. } => StatusCode::CONFLICT,
                DefenseError::UnknownDocument { .. } => StatusCode::NOT_FOUND,
            },
            AppError::Repository(RepositoryError::NotFound) => StatusCode::NOT_FOUND,
            AppError::Repository(RepositoryError::Conflict) => StatusCode::CONFLICT,
            AppError::Config(_)
            | AppError::Telemetry(_)
            | AppError::Io(_)
            | AppError::Server(_)
            | AppError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<TelemetryError> for AppError {
    fn from(value: TelemetryError) -> Self {
        Self::Telemetry(value)
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<axum::Error> for AppError {
    fn from(value: axum::Error) -> Self {
        Self::Server(value)
    }
}

impl From<CatalogError> for AppError {
    fn from(value: CatalogError) -> Self {
        Self::Catalog(value)
    }
}

impl From<LedgerError> for AppError {
    fn from(value: LedgerError) -> Self {
        Self::Ledger(value)
    }
}

impl From<LearningError> for AppError {
    fn from(value: LearningError) -> Self {
        Self::Learning(value)
    }
}

impl From<DefenseError> for AppError {
    fn from(value: DefenseError) -> Self {
        Self::Defense(value)
    }
}

impl From<RepositoryError> for AppError {
    fn from(value: RepositoryError) -> Self {
        Self::Repository(value)
    }
}
