use axum::extract::State;
use axum::{Extension, Json};
use serde_json::{Value, json};

use super::{SetCookies, clear_cookies};
use crate::AppState;
use crate::error::Result;
use crate::token::Claims;

/// Handler to revoke the refresh token of the authenticated user.
pub async fn handler(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<(SetCookies, Json<Value>)> {
    state.sessions.logout(&claims.sub).await?;

    Ok((clear_cookies(&state.config.cookie), Json(json!({}))))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode, header};
    use serde_json::json;

    use crate::router::users::tests::*;
    use crate::{app, make_request, test_state};

    #[tokio::test]
    async fn test_logout_handler() {
        let app = app(test_state());
        let (access, refresh) = login_ann(&app).await;

        let response = make_request(
            app.clone(),
            Method::POST,
            LOGOUT,
            String::new(),
            &[(header::AUTHORIZATION, format!("Bearer {access}"))],
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let cookies = set_cookies(&response);
        assert_eq!(cookies.len(), 2);
        assert!(cookies.iter().all(|cookie| cookie.value().is_empty()));
        assert_eq!(json_body(response).await, json!({}));

        // Old refresh token no longer works.
        let response = make_request(
            app,
            Method::POST,
            REFRESH,
            json!({ "refreshToken": refresh }).to_string(),
            &[],
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_logout_with_cookie() {
        let app = app(test_state());
        let (access, _) = login_ann(&app).await;

        let response = make_request(
            app,
            Method::POST,
            LOGOUT,
            String::new(),
            &[(header::COOKIE, format!("accessToken={access}"))],
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_logout_requires_access_token() {
        let app = app(test_state());
        let (_, refresh) = login_ann(&app).await;

        let response = make_request(
            app.clone(),
            Method::POST,
            LOGOUT,
            String::new(),
            &[],
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        // A refresh token is not an access token.
        let response = make_request(
            app,
            Method::POST,
            LOGOUT,
            String::new(),
            &[(header::AUTHORIZATION, format!("Bearer {refresh}"))],
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
