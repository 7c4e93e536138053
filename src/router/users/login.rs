use axum::Json;
use axum::extract::State;
use serde::Deserialize;
use validator::Validate;

use super::{SetCookies, session_cookies};
use crate::AppState;
use crate::error::Result;
use crate::router::Valid;
use crate::session::{LoginRequest, LoginResponse};
use crate::user::Identifier;

#[derive(Deserialize, Validate)]
pub struct Body {
    #[validate(length(max = 255))]
    username: Option<String>,
    #[validate(length(max = 255))]
    email: Option<String>,
    #[serde(default)]
    #[validate(length(max = 255))]
    password: String,
}

/// Handler to log a user in with username or email.
pub async fn handler(
    State(state): State<AppState>,
    Valid(body): Valid<Body>,
) -> Result<(SetCookies, Json<LoginResponse>)> {
    let response = state
        .sessions
        .login(LoginRequest {
            identifier: Identifier {
                username: body.username,
                email: body.email,
            },
            password: body.password,
        })
        .await?;

    let cookies = session_cookies(
        &state.config.cookie,
        state.sessions.tokens(),
        &response.access_token,
        &response.refresh_token,
    );

    Ok((cookies, Json(response)))
}
