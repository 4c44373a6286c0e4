use axum::{
    Json,
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use mmae_core::{AcquisitionError, EncodeError, FetchFailureKind, RenderError};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

/// Nginx's "client closed request"; used when the caller disconnected.
const CLIENT_CLOSED_REQUEST: u16 = 499;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error("invalid multipart body: {0}")]
    Multipart(#[from] MultipartError),
    #[error("{0}")]
    Internal(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str) {
        match self {
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::Multipart(_) => (StatusCode::BAD_REQUEST, "BAD_MULTIPART"),
            Self::Acquisition(error) => match error {
                AcquisitionError::Fetch { kind, .. } => match kind {
                    FetchFailureKind::Unreachable => (StatusCode::BAD_REQUEST, "FETCH_UNREACHABLE"),
                    FetchFailureKind::NoAudio => (StatusCode::BAD_REQUEST, "FETCH_NO_AUDIO"),
                    FetchFailureKind::Restricted => (StatusCode::BAD_REQUEST, "FETCH_RESTRICTED"),
                    FetchFailureKind::Tool => (StatusCode::BAD_REQUEST, "FETCH_FAILED"),
                    FetchFailureKind::Cancelled => (client_closed(), "CANCELLED"),
                },
                AcquisitionError::UnsupportedFormat(_) => {
                    (StatusCode::BAD_REQUEST, "UNSUPPORTED_FORMAT")
                }
                AcquisitionError::Decode { .. } => (StatusCode::BAD_REQUEST, "DECODE_FAILED"),
                AcquisitionError::EmptyUpload(_)
                | AcquisitionError::NoFiles
                | AcquisitionError::TooManyFiles { .. } => {
                    (StatusCode::BAD_REQUEST, "INVALID_UPLOAD")
                }
                AcquisitionError::Cancelled => (client_closed(), "CANCELLED"),
            },
            Self::Render(RenderError::InvalidConfig(_)) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "INVALID_RENDER_CONFIG")
            }
            Self::Render(RenderError::Encoding(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "RENDER_FAILED")
            }
            Self::Encode(EncodeError::Cancelled) => (client_closed(), "CANCELLED"),
            Self::Encode(_) => (StatusCode::INTERNAL_SERVER_ERROR, "ENCODE_FAILED"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

fn client_closed() -> StatusCode {
    StatusCode::from_u16(CLIENT_CLOSED_REQUEST).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.parts();
        let message = self.to_string();
        if status.is_server_error() {
            error!(%status, code, %message, "request failed");
        } else {
            warn!(%status, code, %message, "request rejected");
        }

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message,
            }
        }));
        (status, body).into_response()
    }
}
