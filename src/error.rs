//! Error handler for mediahub.
//!
//! Every failure leaving a handler becomes a problem-details JSON body.
//! Internal causes are logged and never rendered.

use axum::extract::rejection::JsonRejection;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;
use validator::ValidationErrors;

use crate::session::AuthError;

pub type Result<T> = std::result::Result<T, ServerError>;

/// Enum representing server-side errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("validation error occurred")]
    Validation(#[from] ValidationErrors),

    #[error(transparent)]
    Axum(#[from] JsonRejection),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("missing or invalid access token")]
    Unauthorized,
}

/// Structure for detailed error responses.
#[derive(Debug, Serialize)]
pub struct ResponseError {
    r#type: Option<String>,
    title: String,
    status: u16,
    detail: String,
    instance: Option<String>,
    errors: Option<Vec<FieldError>>,
}

impl ResponseError {
    /// Update error status code.
    pub fn status(mut self, code: StatusCode) -> Self {
        self.status = code.as_u16();
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
    pub fn into_response(
        self,
    ) -> std::result::Result<Response, axum::http::Error> {
        if let Ok(body) = serde_json::to_string(&self) {
            Response::builder()
                .status(self.status)
                .header(header::CONTENT_TYPE, "application/problem+json")
                .body(body.into())
        } else {
            Ok(internal_server_error())
        }
    }
}

impl Default for ResponseError {
    fn default() -> Self {
        Self {
            r#type: None,
            title: "Internal server error.".to_owned(),
            status: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
            detail: String::default(),
            instance: None,
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
    let mut fields = errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, issues)| {
            issues.iter().map(move |issue| FieldError {
                field: field.to_string(),
                message: issue
                    .message
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_else(|| issue.code.to_string()),
            })
        })
        .collect::<Vec<_>>();
    fields.sort_by(|a, b| a.field.cmp(&b.field));
    fields
}

/// Status code and title for an [`AuthError`].
fn auth_status(err: &AuthError) -> (StatusCode, &'static str) {
    match err {
        AuthError::MissingCredential | AuthError::MissingToken => {
            (StatusCode::BAD_REQUEST, "Missing required field.")
        },
        AuthError::NotFound => (StatusCode::NOT_FOUND, "Not found."),
        AuthError::InvalidCredential
        | AuthError::InvalidToken
        | AuthError::ExpiredToken
        | AuthError::StaleToken => (StatusCode::UNAUTHORIZED, "Unauthorized."),
        AuthError::DuplicateIdentity { .. } => {
            (StatusCode::CONFLICT, "Conflict.")
        },
        AuthError::TokenIssuanceFailure(_)
        | AuthError::PersistenceFailure(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error.")
        },
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let response = ResponseError::default()
            .title("There were validation errors with your request.")
            .details(&self.to_string())
            .status(StatusCode::BAD_REQUEST);

        let response = match &self {
            ServerError::Validation(validation_errors) => {
                response.errors(validation_errors)
            },

            ServerError::Axum(rejection) => response
                .title("Malformed request body.")
                .details(&rejection.body_text())
                .status(rejection.status()),

            ServerError::Auth(
                err @ (AuthError::TokenIssuanceFailure(_)
                | AuthError::PersistenceFailure(_)),
            ) => {
                tracing::error!(error = ?err, "server returned 500 status");
                ResponseError::default()
            },

            ServerError::Auth(err) => {
                let (status, title) = auth_status(err);
                response.title(title).status(status)
            },

            ServerError::Unauthorized => response
                .title("Missing or invalid access token.")
                .status(StatusCode::UNAUTHORIZED),
        };

        response
            .into_response()
            .unwrap_or_else(|_| internal_server_error())
    }
}

fn internal_server_error() -> Response {
    Response::builder()
        .status(StatusCode::INTERNAL_SERVER_ERROR)
        .header(header::CONTENT_TYPE, "application/problem+json")
        .body(
            serde_json::json!({
                "type": null,
                "title": "Internal server error.",
                "status": StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
                "detail": null,
                "instance": null,
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
    use http_body_util::BodyExt;

    async fn render(err: ServerError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();

        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_auth_status_mapping() {
        let cases = [
            (AuthError::MissingCredential, StatusCode::BAD_REQUEST),
            (AuthError::MissingToken, StatusCode::BAD_REQUEST),
            (AuthError::NotFound, StatusCode::NOT_FOUND),
            (AuthError::InvalidCredential, StatusCode::UNAUTHORIZED),
            (AuthError::InvalidToken, StatusCode::UNAUTHORIZED),
            (AuthError::ExpiredToken, StatusCode::UNAUTHORIZED),
            (AuthError::StaleToken, StatusCode::UNAUTHORIZED),
            (
                AuthError::DuplicateIdentity { field: "email" },
                StatusCode::CONFLICT,
            ),
        ];

        for (err, expected) in cases {
            let message = err.to_string();
            let (status, body) = render(err.into()).await;

            assert_eq!(status, expected);
            assert_eq!(body["status"], expected.as_u16());
            assert_eq!(body["detail"], message);
        }
    }

    #[tokio::test]
    async fn test_internal_cause_is_hidden() {
        let err = AuthError::persistence(std::io::Error::other(
            "connection refused to 10.0.0.3",
        ));
        let (status, body) = render(err.into()).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!body.to_string().contains("10.0.0.3"));
    }
}
