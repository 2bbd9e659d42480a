use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// Core error taxonomy.
///
/// Design: thiserror for ergonomic context, one variant per row of the
/// error-handling table. Each variant carries exactly the context the
/// caller needs to decide how a job should react.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("provider disabled: {0}")]
    ProviderDisabled(String),

    #[error("provider error ({status}): {body}")]
    ProviderError { status: u16, body: String },

    #[error("insufficient credits")]
    InsufficientCredits,

    #[error("cancellation requested")]
    CancellationRequested,

    #[error("malformed LLM response: {0}")]
    MalformedLLMResponse(String),

    #[error("normalization failure: {0}")]
    NormalizationFailure(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CoreError {
    pub fn provider_error(status: u16, body: impl Into<String>) -> Self {
        Self::ProviderError { status, body: body.into() }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }
}

#[derive(Debug, Serialize)]
pub struct ApiErrorResponse {
    pub error: String,
    pub message: String,
}

impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::ProviderDisabled(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::ProviderError { .. } => StatusCode::BAD_GATEWAY,
            Self::InsufficientCredits => StatusCode::PAYMENT_REQUIRED,
            Self::CancellationRequested => StatusCode::CONFLICT,
            Self::MalformedLLMResponse(_) => StatusCode::BAD_GATEWAY,
            Self::NormalizationFailure(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = ApiErrorResponse { error: variant_name(&self).to_string(), message: self.to_string() };
        (status, Json(body)).into_response()
    }
}

fn variant_name(err: &CoreError) -> &'static str {
    match err {
        CoreError::ProviderDisabled(_) => "provider_disabled",
        CoreError::ProviderError { .. } => "provider_error",
        CoreError::InsufficientCredits => "insufficient_credits",
        CoreError::CancellationRequested => "cancellation_requested",
        CoreError::MalformedLLMResponse(_) => "malformed_llm_response",
        CoreError::NormalizationFailure(_) => "normalization_failure",
        CoreError::NotFound(_) => "not_found",
        CoreError::InvalidInput(_) => "invalid_input",
        CoreError::Database(_) => "database_error",
        CoreError::Other(_) => "internal_error",
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
