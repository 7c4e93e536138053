use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::Deserialize;
use validator::Validate;

use crate::AppState;
use crate::error::Result;
use crate::router::Valid;
use crate::session::AuthError;
use crate::user::{Registration, SanitizedUser};

#[derive(Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Body {
    #[serde(default)]
    #[validate(
        custom(
            function = "crate::router::validate_not_blank",
            message = "Full name is required."
        ),
        length(max = 255)
    )]
    full_name: String,
    #[serde(default)]
    #[validate(email(message = "Email must be formatted."))]
    email: String,
    #[serde(default)]
    #[validate(
        custom(
            function = "crate::router::validate_not_blank",
            message = "Username is required."
        ),
        length(max = 64)
    )]
    username: String,
    #[serde(default)]
    #[validate(
        custom(
            function = "crate::router::validate_not_blank",
            message = "Password is required."
        ),
        length(max = 255)
    )]
    password: String,
    #[serde(default)]
    #[validate(url(message = "Avatar must be a URL."))]
    avatar: String,
    #[serde(default)]
    #[validate(custom(
        function = "crate::router::validate_optional_url",
        message = "Cover image must be a URL."
    ))]
    cover_image: String,
}

/// Handler to create user.
pub async fn handler(
    State(state): State<AppState>,
    Valid(body): Valid<Body>,
) -> Result<(StatusCode, Json<SanitizedUser>)> {
    let user = state
        .store
        .create(Registration {
            full_name: body.full_name,
            email: body.email,
            username: body.username,
            password: body.password,
            avatar: body.avatar,
            cover_image: Some(body.cover_image),
        })
        .await
        .map_err(AuthError::from)?;

    Ok((StatusCode::CREATED, Json(user.sanitize())))
}
