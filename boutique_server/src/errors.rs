use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use boutique_engine::{
    traits::{CouponError, LedgerError, PackageError, ReturnError},
    PackageFlowError,
    ReturnFlowError,
};
use thiserror::Error;

/// The server-level error taxonomy. Engine errors are folded into four caller-facing categories — conflict,
/// invalid state, not found, validation — plus the usual auth and backend buckets, and each category maps onto
/// one HTTP status.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An error occurred on the backend of the server. {0}")]
    BackendError(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    InvalidState(String),
    #[error("The data was not found. {0}")]
    NoRecordFound(String),
    #[error("{0}")]
    ValidationError(String),
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("Authentication Error. {0}")]
    AuthenticationError(String),
    #[error("Insufficient Permissions. {0}")]
    InsufficientPermissions(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::InvalidState(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::NoRecordFound(_) => StatusCode::NOT_FOUND,
            Self::ValidationError(_) => StatusCode::BAD_REQUEST,
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::AuthenticationError(_) => StatusCode::UNAUTHORIZED,
            Self::InsufficientPermissions(_) => StatusCode::FORBIDDEN,
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BackendError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .body(serde_json::json!({ "error": self.to_string() }).to_string())
    }
}

impl From<PackageError> for ServerError {
    fn from(e: PackageError) -> Self {
        match e {
            PackageError::ActivePackageExists(_) | PackageError::OrderAlreadyPackaged(_) => {
                Self::Conflict(e.to_string())
            },
            PackageError::PackageNotFound(_)
            | PackageError::PackageOrderNotFound(_)
            | PackageError::OrderNotFound(_) => Self::NoRecordFound(e.to_string()),
            PackageError::PackageNotActive { .. } | PackageError::PackageNotClosed { .. } => {
                Self::InvalidState(e.to_string())
            },
            PackageError::ValidationError(_) => Self::ValidationError(e.to_string()),
            PackageError::DatabaseError(_) => Self::BackendError(e.to_string()),
        }
    }
}

impl From<LedgerError> for ServerError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::DuplicatePosting { .. } => Self::Conflict(e.to_string()),
            LedgerError::InsufficientBalance { .. } => Self::InvalidState(e.to_string()),
            LedgerError::ValidationError(_) => Self::ValidationError(e.to_string()),
            LedgerError::DatabaseError(_) => Self::BackendError(e.to_string()),
        }
    }
}

impl From<ReturnError> for ServerError {
    fn from(e: ReturnError) -> Self {
        match e {
            ReturnError::ReturnNotFound(_) | ReturnError::OrderNotFound(_) => Self::NoRecordFound(e.to_string()),
            ReturnError::NotDelivered(_) | ReturnError::WindowExpired { .. } | ReturnError::InvalidTransition { .. } => {
                Self::InvalidState(e.to_string())
            },
            ReturnError::ValidationError(_) => Self::ValidationError(e.to_string()),
            ReturnError::DatabaseError(_) => Self::BackendError(e.to_string()),
            ReturnError::LedgerError(inner) => inner.into(),
        }
    }
}

impl From<CouponError> for ServerError {
    fn from(e: CouponError) -> Self {
        match e {
            CouponError::DuplicateIssue { .. } | CouponError::AlreadyUsed(_) => Self::Conflict(e.to_string()),
            CouponError::Expired(_) => Self::InvalidState(e.to_string()),
            CouponError::CouponTypeNotFound(_) | CouponError::CouponNotFound(_) => Self::NoRecordFound(e.to_string()),
            CouponError::ValidationError(_) => Self::ValidationError(e.to_string()),
            CouponError::DatabaseError(_) => Self::BackendError(e.to_string()),
        }
    }
}

impl From<PackageFlowError> for ServerError {
    fn from(e: PackageFlowError) -> Self {
        match e {
            PackageFlowError::PackageError(inner) => inner.into(),
            PackageFlowError::LedgerError(inner) => inner.into(),
        }
    }
}

impl From<ReturnFlowError> for ServerError {
    fn from(e: ReturnFlowError) -> Self {
        match e {
            ReturnFlowError::ReturnError(inner) => inner.into(),
            ReturnFlowError::PackageError(inner) => inner.into(),
            ReturnFlowError::LedgerError(inner) => inner.into(),
        }
    }
}
