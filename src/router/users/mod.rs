//! Users-related HTTP API.
mod login;
mod logout;
mod refresh_token;
mod register;

use axum::extract::{Request, State};
use axum::http::{HeaderMap, HeaderName, header};
use axum::response::{AppendHeaders, Response};
use axum::routing::post;
use axum::{Router, middleware};
use cookie::time::Duration;
use cookie::{Cookie, SameSite};

use crate::config::Cookie as CookieConfig;
use crate::token::{TokenKind, TokenService};
use crate::{AppState, ServerError};

const BEARER: &str = "Bearer ";
pub const ACCESS_TOKEN_COOKIE: &str = "accessToken";
pub const REFRESH_TOKEN_COOKIE: &str = "refreshToken";

/// `Set-Cookie` headers attached to a response.
pub type SetCookies = AppendHeaders<[(HeaderName, String); 2]>;

/// Custom middleware for authentification.
///
/// Reads the access token from the `accessToken` cookie, then from the
/// `Authorization` header, and exposes its claims to the handler.
async fn auth(
    State(state): State<AppState>,
    mut req: Request,
    next: middleware::Next,
) -> Result<Response, ServerError> {
    let token = read_cookie(req.headers(), ACCESS_TOKEN_COOKIE)
        .or_else(|| {
            req.headers()
                .get(header::AUTHORIZATION)
                .and_then(|header| header.to_str().ok())
                .and_then(|header| header.strip_prefix(BEARER))
                .map(|token| token.trim().to_owned())
        })
        .filter(|token| !token.is_empty())
        .ok_or(ServerError::Unauthorized)?;

    let claims = state
        .sessions
        .tokens()
        .verify(&token, TokenKind::Access)
        .map_err(|err| {
            tracing::debug!(error = %err, "access token rejected");
            ServerError::Unauthorized
        })?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

/// Value of cookie `name`, if the request carries it non-empty.
pub(crate) fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| Cookie::split_parse(value))
        .filter_map(Result::ok)
        .find(|cookie| {
            cookie.name() == name && !cookie.value().trim().is_empty()
        })
        .map(|cookie| cookie.value().to_owned())
}

fn build_cookie(
    name: &'static str,
    value: String,
    config: &CookieConfig,
) -> Cookie<'static> {
    Cookie::build((name, value))
        .http_only(true)
        .secure(config.secure)
        .same_site(SameSite::Strict)
        .path("/")
        .build()
}

/// Cookies carrying a freshly issued token pair.
pub(crate) fn session_cookies(
    config: &CookieConfig,
    tokens: &TokenService,
    access_token: &str,
    refresh_token: &str,
) -> SetCookies {
    let max_age = |kind| {
        Duration::seconds(i64::try_from(tokens.lifetime(kind)).unwrap_or(i64::MAX))
    };

    let mut access = build_cookie(ACCESS_TOKEN_COOKIE, access_token.into(), config);
    access.set_max_age(max_age(TokenKind::Access));
    let mut refresh =
        build_cookie(REFRESH_TOKEN_COOKIE, refresh_token.into(), config);
    refresh.set_max_age(max_age(TokenKind::Refresh));

    AppendHeaders([
        (header::SET_COOKIE, access.to_string()),
        (header::SET_COOKIE, refresh.to_string()),
    ])
}

/// Cookies instructing the client to drop both tokens.
pub(crate) fn clear_cookies(config: &CookieConfig) -> SetCookies {
    let mut access = build_cookie(ACCESS_TOKEN_COOKIE, String::new(), config);
    access.make_removal();
    let mut refresh = build_cookie(REFRESH_TOKEN_COOKIE, String::new(), config);
    refresh.make_removal();

    AppendHeaders([
        (header::SET_COOKIE, access.to_string()),
        (header::SET_COOKIE, refresh.to_string()),
    ])
}

pub fn router(state: AppState) -> Router<AppState> {
    let protected = Router::new()
        // `POST /logout` goes to `logout`. Authorization required.
        .route("/logout", post(logout::handler))
        .route_layer(middleware::from_fn_with_state(state, auth));

    Router::new()
        // `POST /register` goes to `register`.
        .route("/register", post(register::handler))
        // `POST /login` goes to `login`.
        .route("/login", post(login::handler))
        // `POST /refresh-token` goes to `refresh_token`.
        .route("/refresh-token", post(refresh_token::handler))
        .merge(protected)
}
