use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use resale_engine::{traits::LedgerError, LedgerApiError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An error occurred on the backend of the server. {0}")]
    BackendError(String),
    #[error("Payload deserialization error. {0}")]
    CouldNotDeserializePayload(String),
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
    #[error("Authentication Error. {0}")]
    AuthenticationError(#[from] AuthError),
    #[error("The data was not found. {0}")]
    NoRecordFound(String),
    #[error("No order reference could be found in the notification.")]
    NoOrderReference,
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::CouldNotDeserializePayload(_) => StatusCode::BAD_REQUEST,
            Self::NoOrderReference => StatusCode::BAD_REQUEST,
            Self::AuthenticationError(_) => StatusCode::FORBIDDEN,
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BackendError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ConfigurationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unspecified(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NoRecordFound(_) => StatusCode::NOT_FOUND,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .body(serde_json::json!({ "error": self.to_string() }).to_string())
    }
}

#[derive(Debug, Clone, Error)]
pub enum AuthError {
    #[error("No signature or API key was provided.")]
    MissingCredentials,
    #[error("The request signature is invalid.")]
    InvalidSignature,
    #[error("The API key is invalid.")]
    InvalidApiKey,
}

impl From<LedgerApiError> for ServerError {
    fn from(e: LedgerApiError) -> Self {
        if e.is_not_found() {
            return Self::NoRecordFound(e.to_string());
        }
        match e {
            LedgerApiError::NoOrderReference => Self::NoOrderReference,
            LedgerApiError::InvalidRequest(msg) => Self::InvalidRequestBody(msg),
            LedgerApiError::Transactional(e) => Self::BackendError(format!("Ledger error: {e}")),
            LedgerApiError::Pricing(e) => Self::BackendError(format!("Pricing error: {e}")),
            LedgerApiError::Renewal { .. } => Self::BackendError(e.to_string()),
        }
    }
}
