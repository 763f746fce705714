use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Main error type for the ridepay service
#[derive(Debug)]
pub enum RidepayError {
    // HTTP and API errors
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    InternalServer(String),

    // Trip store errors
    StoreConnection(String),
    StoreQuery(String),
    StoreSerialization(String),

    // Completion webhook and HTTP client errors
    WebhookDelivery(String),
    NetworkTimeout,
    NetworkConnection(String),
    HttpClient(String),

    // Serialization and parsing errors
    JsonParsing(String),
    JsonSerialization(String),
    InvalidFormat(String),

    // Business logic errors
    NoActiveTrip(String),
    TripNotFound(String),
    TripAlreadyCompleted,

    // Validation errors
    ValidationFailed(Vec<ValidationError>),
    MissingRequiredField(String),
    InvalidFieldValue { field: String, value: String, reason: String },

    // Configuration and setup errors
    ConfigurationError(String),
    MissingEnvironmentVariable(String),
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl fmt::Display for RidepayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RidepayError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            RidepayError::NotFound(msg) => write!(f, "Not found: {}", msg),
            RidepayError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            RidepayError::InternalServer(msg) => write!(f, "Internal server error: {}", msg),

            RidepayError::StoreConnection(msg) => write!(f, "Trip store connection error: {}", msg),
            RidepayError::StoreQuery(msg) => write!(f, "Trip store query error: {}", msg),
            RidepayError::StoreSerialization(msg) => {
                write!(f, "Trip store serialization error: {}", msg)
            }

            RidepayError::WebhookDelivery(msg) => write!(f, "Webhook delivery error: {}", msg),
            RidepayError::NetworkTimeout => write!(f, "Network request timed out"),
            RidepayError::NetworkConnection(msg) => write!(f, "Network connection error: {}", msg),
            RidepayError::HttpClient(msg) => write!(f, "HTTP client error: {}", msg),

            RidepayError::JsonParsing(msg) => write!(f, "JSON parsing error: {}", msg),
            RidepayError::JsonSerialization(msg) => write!(f, "JSON serialization error: {}", msg),
            RidepayError::InvalidFormat(msg) => write!(f, "Invalid format: {}", msg),

            RidepayError::NoActiveTrip(user_id) => {
                write!(f, "No active trip for user: {}", user_id)
            }
            RidepayError::TripNotFound(id) => write!(f, "Trip not found: {}", id),
            RidepayError::TripAlreadyCompleted => write!(f, "Trip is already completed"),

            RidepayError::ValidationFailed(errors) => {
                write!(f, "Validation failed: {} errors", errors.len())
            }
            RidepayError::MissingRequiredField(field) => {
                write!(f, "Missing required field: {}", field)
            }
            RidepayError::InvalidFieldValue { field, value, reason } => {
                write!(f, "Invalid value '{}' for field '{}': {}", value, field, reason)
            }

            RidepayError::ConfigurationError(msg) => write!(f, "Configuration error: {}", msg),
            RidepayError::MissingEnvironmentVariable(var) => {
                write!(f, "Missing environment variable: {}", var)
            }
        }
    }
}

impl std::error::Error for RidepayError {}

impl IntoResponse for RidepayError {
    fn into_response(self) -> Response {
        let (status, error_type, message, details) = match self {
            RidepayError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg, None),
            RidepayError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg, None),
            RidepayError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg, None),

            RidepayError::ValidationFailed(errors) => {
                let details = serde_json::to_value(&errors).ok();
                (
                    StatusCode::BAD_REQUEST,
                    "validation_failed",
                    "Validation errors occurred".to_string(),
                    details,
                )
            }
            RidepayError::MissingRequiredField(field) => (
                StatusCode::BAD_REQUEST,
                "missing_field",
                format!("Missing required field: {}", field),
                None,
            ),
            RidepayError::InvalidFieldValue { field, reason, .. } => (
                StatusCode::BAD_REQUEST,
                "invalid_field",
                format!("Invalid value for {}: {}", field, reason),
                None,
            ),
            RidepayError::InvalidFormat(msg) => {
                (StatusCode::BAD_REQUEST, "invalid_format", msg, None)
            }

            RidepayError::NoActiveTrip(user_id) => (
                StatusCode::NOT_FOUND,
                "no_active_trip",
                format!("No active trip for user: {}", user_id),
                None,
            ),
            RidepayError::TripNotFound(id) => (
                StatusCode::NOT_FOUND,
                "trip_not_found",
                format!("Trip not found: {}", id),
                None,
            ),
            RidepayError::TripAlreadyCompleted => (
                StatusCode::CONFLICT,
                "trip_already_completed",
                "Trip is already completed".to_string(),
                None,
            ),

            RidepayError::StoreConnection(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "store_unavailable",
                format!("Trip store unavailable: {}", msg),
                None,
            ),

            // All other errors are treated as internal server errors
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", self.to_string(), None),
        };

        let error_response = ErrorResponse {
            error: error_type.to_string(),
            message,
            details,
        };

        (status, axum::Json(error_response)).into_response()
    }
}

// Convenience type alias for Results
pub type RidepayResult<T> = Result<T, RidepayError>;

// Conversion implementations for common error types
impl From<redis::RedisError> for RidepayError {
    fn from(err: redis::RedisError) -> Self {
        match err.kind() {
            redis::ErrorKind::IoError => RidepayError::StoreConnection(err.to_string()),
            redis::ErrorKind::ResponseError => RidepayError::StoreQuery(err.to_string()),
            redis::ErrorKind::AuthenticationFailed => {
                RidepayError::StoreConnection("Authentication failed".to_string())
            }
            _ => RidepayError::StoreQuery(err.to_string()),
        }
    }
}

impl From<reqwest::Error> for RidepayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RidepayError::NetworkTimeout
        } else if err.is_connect() {
            RidepayError::NetworkConnection(err.to_string())
        } else {
            RidepayError::HttpClient(err.to_string())
        }
    }
}

impl From<serde_json::Error> for RidepayError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_syntax() {
            RidepayError::JsonParsing(err.to_string())
        } else {
            RidepayError::JsonSerialization(err.to_string())
        }
    }
}

impl From<chrono::ParseError> for RidepayError {
    fn from(err: chrono::ParseError) -> Self {
        RidepayError::InvalidFormat(format!("Invalid date/time format: {}", err))
    }
}

// Helper functions for creating common errors
impl RidepayError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        RidepayError::BadRequest(msg.into())
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        RidepayError::NotFound(resource.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        RidepayError::Conflict(msg.into())
    }

    pub fn internal_error(msg: impl Into<String>) -> Self {
        RidepayError::InternalServer(msg.into())
    }

    pub fn validation_error(field: impl Into<String>, message: impl Into<String>) -> Self {
        RidepayError::ValidationFailed(vec![ValidationError {
            field: field.into(),
            message: message.into(),
        }])
    }

    pub fn no_active_trip(user_id: impl Into<String>) -> Self {
        RidepayError::NoActiveTrip(user_id.into())
    }

    pub fn trip_not_found(trip_id: impl Into<String>) -> Self {
        RidepayError::TripNotFound(trip_id.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = RidepayError::NoActiveTrip("usr-123".to_string());
        assert_eq!(error.to_string(), "No active trip for user: usr-123");
    }

    #[test]
    fn test_validation_error() {
        let error = RidepayError::validation_error("pickup_location", "Pickup location is required");
        match error {
            RidepayError::ValidationFailed(errors) => {
                assert_eq!(errors.len(), 1);
                assert_eq!(errors[0].field, "pickup_location");
                assert_eq!(errors[0].message, "Pickup location is required");
            }
            _ => panic!("Expected ValidationFailed error"),
        }
    }

    #[test]
    fn test_helper_functions() {
        assert!(matches!(RidepayError::bad_request("test"), RidepayError::BadRequest(_)));
        assert!(matches!(RidepayError::not_found("test"), RidepayError::NotFound(_)));
        assert!(matches!(RidepayError::conflict("test"), RidepayError::Conflict(_)));
        assert!(matches!(RidepayError::internal_error("test"), RidepayError::InternalServer(_)));
    }
}
