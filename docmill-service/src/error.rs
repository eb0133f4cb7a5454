use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// Main service error type
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Document not found: {document_id}")]
    DocumentNotFound { document_id: String },

    #[error("Work item not found: {work_item_id}")]
    WorkItemNotFound { work_item_id: String },

    #[error("{0}")]
    Inference(#[from] InferenceError),

    #[error("Database error")]
    Database(#[from] DatabaseError),

    #[error("Storage error")]
    Storage(#[from] StorageError),

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Errors from the LLM inference endpoint.
///
/// Only `Throttled` and `Unavailable` are retry-eligible; everything else
/// maps immediately to an error-carrying result on the calling operation.
#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("Inference endpoint throttled the request")]
    Throttled,

    #[error("Inference endpoint temporarily unavailable (status {status})")]
    Unavailable { status: u16 },

    #[error("Invalid or unknown model: {model}")]
    InvalidModel { model: String },

    #[error("Access denied by inference endpoint")]
    AccessDenied,

    #[error("Inference request failed: {message}")]
    Request { message: String },

    #[error("Connection failed to inference endpoint at {url}")]
    Connection {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Invalid response from inference endpoint")]
    InvalidResponse {
        #[source]
        source: serde_json::Error,
    },

    #[error("Retries exhausted after {attempts} attempts")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<InferenceError>,
    },
}

impl InferenceError {
    /// Whether this error is worth retrying with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            InferenceError::Throttled
                | InferenceError::Unavailable { .. }
                | InferenceError::Connection { .. }
        )
    }

    /// Remediation guidance embedded in error-carrying inference results.
    pub fn guidance(&self) -> &'static str {
        match self {
            InferenceError::Throttled | InferenceError::Unavailable { .. } => {
                "The inference endpoint is overloaded; the call was retried and gave up. Try resubmitting later."
            }
            InferenceError::InvalidModel { .. } => {
                "The configured model id was rejected. Check the inference.model setting."
            }
            InferenceError::AccessDenied => {
                "The inference endpoint rejected our credentials. Check API access configuration."
            }
            InferenceError::Connection { .. } => {
                "Could not reach the inference endpoint. Check inference.base_url and network access."
            }
            InferenceError::InvalidResponse { .. } => {
                "The inference endpoint returned a response that could not be parsed."
            }
            InferenceError::Request { .. } | InferenceError::RetriesExhausted { .. } => {
                "The inference call failed. See the error details on the document record."
            }
        }
    }
}

/// Database errors
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Database connection failed")]
    Connection(#[source] rusqlite::Error),

    #[error("Query failed")]
    Query(#[source] rusqlite::Error),

    #[error("Migration failed: {message}")]
    Migration { message: String },

    #[error("Serialization failed")]
    Serialization(#[source] serde_json::Error),
}

/// Storage backend errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Object not found in storage: {locator}")]
    NotFound { locator: String },

    #[error("Storage IO error")]
    Io(#[source] std::io::Error),
}

/// API error response body
#[derive(Serialize)]
pub struct ErrorResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ServiceError {
    fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::DocumentNotFound { .. } | ServiceError::WorkItemNotFound { .. } => {
                StatusCode::NOT_FOUND
            }
            ServiceError::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
            ServiceError::Inference(InferenceError::Throttled) => StatusCode::TOO_MANY_REQUESTS,
            ServiceError::Storage(StorageError::NotFound { .. }) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            ServiceError::DocumentNotFound { .. } => "document_not_found",
            ServiceError::WorkItemNotFound { .. } => "work_item_not_found",
            ServiceError::Inference(InferenceError::Throttled) => "inference_throttled",
            ServiceError::Inference(InferenceError::Unavailable { .. }) => "inference_unavailable",
            ServiceError::Inference(InferenceError::InvalidModel { .. }) => "invalid_model",
            ServiceError::Inference(InferenceError::AccessDenied) => "inference_access_denied",
            ServiceError::Inference(_) => "inference_error",
            ServiceError::Database(_) => "database_error",
            ServiceError::Storage(StorageError::NotFound { .. }) => "storage_not_found",
            ServiceError::Storage(_) => "storage_error",
            ServiceError::InvalidRequest { .. } => "invalid_request",
            ServiceError::Config { .. } => "config_error",
            ServiceError::Internal { .. } => "internal_error",
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code().to_string();

        let response = ErrorResponse {
            message: self.to_string(),
            code: Some(code),
        };

        (status, Json(response)).into_response()
    }
}

/// Result type alias for service operations
pub type ServiceResult<T> = Result<T, ServiceError>;
