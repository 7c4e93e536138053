//! Get a new token pair with a refresh token.

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use serde::Deserialize;

use super::{REFRESH_TOKEN_COOKIE, SetCookies, read_cookie, session_cookies};
use crate::AppState;
use crate::error::Result;
use crate::session::TokenPair;

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Body {
    refresh_token: Option<String>,
}

/// Handler to rotate the refresh token.
///
/// The token is read from the `refreshToken` cookie first, then from the
/// JSON body. The body is optional.
pub async fn handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(SetCookies, Json<TokenPair>)> {
    let presented = read_cookie(&headers, REFRESH_TOKEN_COOKIE).or_else(|| {
        serde_json::from_slice::<Body>(&body)
            .ok()
            .and_then(|body| body.refresh_token)
    });

    let pair = state.sessions.refresh(presented.as_deref()).await?;
    let cookies = session_cookies(
        &state.config.cookie,
        state.sessions.tokens(),
        &pair.access_token,
        &pair.refresh_token,
    );

    Ok((cookies, Json(pair)))
}
