//! Error handler for the accounts service.

use std::fmt;

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use sqlx::Error as SQLxError;
use thiserror::Error;
use validator::ValidationErrors;

pub type Result<T> = std::result::Result<T, ServerError>;

/// Kind of record a lookup failed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Customer,
    Account,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Entity::Customer => write!(f, "Customer"),
            Entity::Account => write!(f, "Account"),
        }
    }
}

/// Enum representing server-side errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("validation error occurred")]
    Validation(#[from] ValidationErrors),

    #[error(transparent)]
    Json(#[from] JsonRejection),

    #[error(transparent)]
    Query(#[from] QueryRejection),

    #[error(transparent)]
    Path(#[from] PathRejection),

    #[error("Customer already exists with mobile number {mobile_number}")]
    DuplicateCustomer { mobile_number: String },

    #[error("{entity} not found with the given input data {field} : '{value}'")]
    NotFound {
        entity: Entity,
        field: &'static str,
        value: String,
    },

    #[error("SQL request failed: {0}")]
    Sql(#[from] SQLxError),

    #[error("broker request failed: {0}")]
    Messaging(#[from] lapin::Error),

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid token: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    #[error("invalid 'Authorization' header")]
    Unauthorized,

    #[error("missing required role")]
    Forbidden,

    #[error("internal server error, {details}")]
    Internal {
        details: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl ServerError {
    /// Shorthand for a failed lookup.
    pub fn not_found(
        entity: Entity,
        field: &'static str,
        value: impl ToString,
    ) -> Self {
        ServerError::NotFound {
            entity,
            field,
            value: value.to_string(),
        }
    }

    /// Stable machine-readable discriminator.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerError::Validation(_)
            | ServerError::Json(_)
            | ServerError::Query(_)
            | ServerError::Path(_) => "validation",
            ServerError::DuplicateCustomer { .. } => "duplicate_customer",
            ServerError::NotFound { .. } => "not_found",
            ServerError::Unauthorized | ServerError::Token(_) => "unauthorized",
            ServerError::Forbidden => "forbidden",
            _ => "internal",
        }
    }
}

/// Structure for detailed error responses.
#[derive(Debug, Serialize)]
pub struct ResponseError {
    r#type: Option<String>,
    title: String,
    status: u16,
    detail: String,
    time: String,
    errors: Option<Vec<FieldError>>,
}

impl ResponseError {
    /// Update error status code.
    pub fn status(mut self, code: StatusCode) -> Self {
        self.status = code.as_u16();
        self
    }

    /// Update `type` field.
    pub fn kind(mut self, kind: &str) -> Self {
        self.r#type = Some(kind.into());
        self
    }

    /// Update `title` field.
    pub fn title(mut self, title: &str) -> Self {
        self.title = title.into();
        self
    }

    /// Add detailed error.
    pub fn details(mut self, description: &str) -> Self {
        self.detail = description.into();
        self
    }

    /// Automatically add errors field.
    pub fn errors(mut self, errors: &ValidationErrors) -> Self {
        self.errors = Some(parse_validation_errors(errors));
        self
    }

    /// Transform [`ResponseError`] into axum [`Response`].
    pub fn into_response(self) -> std::result::Result<Response, axum::http::Error> {
        if let Ok(body) = serde_json::to_string(&self) {
            Response::builder()
                .status(self.status)
                .header(header::CONTENT_TYPE, "application/json")
                .body(body.into())
        } else {
            Ok(internal_server_error())
        }
    }
}

impl Default for ResponseError {
    fn default() -> Self {
        Self {
            r#type: Some("internal".to_owned()),
            title: "Internal server error.".to_owned(),
            status: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
            detail: String::default(),
            time: chrono::Utc::now().to_rfc3339(),
            errors: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct FieldError {
    field: String,
    message: String,
}

fn parse_validation_errors(errors: &ValidationErrors) -> Vec<FieldError> {
    errors
        .field_errors()
        .iter()
        .flat_map(|(field, issues)| {
            issues.iter().map(move |issue| FieldError {
                field: field.to_string(),
                message: issue
                    .message
                    .as_ref()
                    .map(|message| message.to_string())
                    .unwrap_or_else(|| issue.code.to_string()),
            })
        })
        .collect()
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let response = ResponseError::default()
            .kind(self.kind())
            .title("There were validation errors with your request.")
            .details(&self.to_string())
            .status(StatusCode::BAD_REQUEST);

        let response = match &self {
            ServerError::Validation(validation_errors) => response.errors(validation_errors),

            ServerError::Json(_) | ServerError::Query(_) | ServerError::Path(_) => response,

            ServerError::DuplicateCustomer { .. } => {
                response.title("Customer already exists.")
            },

            ServerError::NotFound { .. } => response
                .title("Resource not found.")
                .status(StatusCode::NOT_FOUND),

            ServerError::Unauthorized | ServerError::Token(_) => response
                .title("Missing or invalid 'Authorization' header.")
                .status(StatusCode::UNAUTHORIZED),

            ServerError::Forbidden => response
                .title("Insufficient realm roles.")
                .status(StatusCode::FORBIDDEN),

            ServerError::Internal { details, source } => {
                tracing::error!(err = ?source, %details, "server returned 500 status");
                ResponseError::default()
            },

            err => {
                tracing::error!(error = %err, "server returned 500 status");
                ResponseError::default()
            },
        };

        response
            .into_response()
            .unwrap_or_else(|_| internal_server_error())
    }
}

fn internal_server_error() -> Response {
    Response::builder()
        .status(StatusCode::INTERNAL_SERVER_ERROR)
        .header(header::CONTENT_TYPE, "application/json")
        .body(
            serde_json::json!({
                "type": "internal",
                "title": "Internal server error.",
                "status": StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
                "detail": null,
                "time": null,
                "errors": null,
            })
            .to_string()
            .into(),
        )
        .unwrap_or_else(|_| Response::new("Internal server error".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message() {
        let err = ServerError::not_found(Entity::Customer, "mobileNumber", "0123456789");
        assert_eq!(
            err.to_string(),
            "Customer not found with the given input data mobileNumber : '0123456789'"
        );
        assert_eq!(err.kind(), "not_found");
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_duplicate_customer_is_bad_request() {
        let err = ServerError::DuplicateCustomer {
            mobile_number: "0123456789".into(),
        };
        assert_eq!(
            err.to_string(),
            "Customer already exists with mobile number 0123456789"
        );
        assert_eq!(err.kind(), "duplicate_customer");
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_internal_details_are_hidden() {
        let err = ServerError::Internal {
            details: "pool exhausted".into(),
            source: None,
        };
        assert_eq!(err.kind(), "internal");
        assert_eq!(
            err.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_auth_statuses() {
        assert_eq!(
            ServerError::Unauthorized.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ServerError::Forbidden.into_response().status(),
            StatusCode::FORBIDDEN
        );
    }
}
