use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ShopError {
    #[error("Authentication required")]
    AuthenticationRequired,

    #[error("Method not allowed")]
    MethodNotAllowed,

    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Persistence failure: {0}")]
    Persistence(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ShopError {
    pub fn validation(message: impl Into<String>) -> Self {
        ShopError::Validation(message.into())
    }
}

impl From<mongodb::error::Error> for ShopError {
    fn from(err: mongodb::error::Error) -> Self {
        ShopError::Persistence(err.to_string())
    }
}

impl ResponseError for ShopError {
    fn status_code(&self) -> StatusCode {
        match self {
            ShopError::AuthenticationRequired | ShopError::InvalidCredentials => {
                StatusCode::UNAUTHORIZED
            }
            ShopError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ShopError::Validation(_) | ShopError::Persistence(_) => StatusCode::BAD_REQUEST,
            ShopError::NotFound(_) => StatusCode::NOT_FOUND,
            ShopError::Config(_) | ShopError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            log::error!("Responding with {}: {}", status, self);
        } else {
            log::warn!("Responding with {}: {}", status, self);
        }

        HttpResponse::build(status).json(json!({
            "success": false,
            "message": self.to_string(),
        }))
    }
}

pub type Result<T, E = ShopError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persistence_failures_are_client_errors() {
        let err = ShopError::Persistence("write conflict".into());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_string(), "Persistence failure: write conflict");
    }

    #[test]
    fn not_found_names_the_entity() {
        assert_eq!(ShopError::NotFound("Product").to_string(), "Product not found");
        assert_eq!(
            ShopError::NotFound("Product").status_code(),
            StatusCode::NOT_FOUND
        );
    }
}
