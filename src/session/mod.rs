//! Session manager: login, logout and refresh-token rotation.
//!
//! A user holds at most one valid refresh token. Issuing a new pair
//! overwrites the stored token, so every previously issued refresh token
//! stops working; a refresh token is therefore redeemable exactly once.
mod error;

pub use error::*;

use serde::Serialize;
use tracing::{info, instrument, warn};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::token::{Subject, TokenKind, TokenService};
use crate::user::{CredentialStore, Identifier, SanitizedUser, User};

/// Credentials presented on login.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct LoginRequest {
    #[zeroize(skip)]
    pub identifier: Identifier,
    pub password: String,
}

impl std::fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginRequest")
            .field("identifier", &self.identifier)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Freshly issued access and refresh tokens.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Result of a successful login.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub user: SanitizedUser,
}

/// Orchestrates [`CredentialStore`] and [`TokenService`].
#[derive(Clone, Debug)]
pub struct SessionManager {
    store: CredentialStore,
    tokens: TokenService,
}

impl SessionManager {
    /// Create a new [`SessionManager`].
    pub fn new(store: CredentialStore, tokens: TokenService) -> Self {
        Self { store, tokens }
    }

    /// Token service used to sign and verify tokens.
    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    /// Verify credentials then open a session.
    #[instrument(skip_all)]
    pub async fn login(&self, request: LoginRequest) -> Result<LoginResponse> {
        let identifier = request.identifier.clone().normalize();
        if identifier.is_empty() || request.password.is_empty() {
            warn!(reason = "missing_credential", "authentication failed");
            return Err(AuthError::MissingCredential);
        }

        let Some(user) =
            self.store.find_by_username_or_email(&identifier).await?
        else {
            warn!(reason = "unknown_user", "authentication failed");
            return Err(AuthError::NotFound);
        };

        if !self.store.verify_password(&user, &request.password).await? {
            warn!(
                user_id = %user.id,
                reason = "invalid_password",
                "authentication failed"
            );
            return Err(AuthError::InvalidCredential);
        }

        let (pair, user) = self.issue_token_pair(&user.id, None).await?;
        info!(user_id = %user.id, "authentication successful");

        Ok(LoginResponse {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            user: user.sanitize(),
        })
    }

    /// Revoke the stored refresh token of `user_id`.
    #[instrument(skip(self))]
    pub async fn logout(&self, user_id: &str) -> Result<()> {
        self.store
            .set_refresh_token(user_id, None)
            .await?
            .ok_or(AuthError::NotFound)?;

        info!("user logged out");
        Ok(())
    }

    /// Redeem a refresh token for a new pair.
    ///
    /// The presented token must be the one currently stored on the user
    /// record; it is replaced atomically by the new one.
    #[instrument(skip_all)]
    pub async fn refresh(&self, presented: Option<&str>) -> Result<TokenPair> {
        let presented = presented
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or(AuthError::MissingToken)?;

        let claims = self
            .tokens
            .verify(presented, TokenKind::Refresh)
            .inspect_err(|err| warn!(error = %err, "refresh token rejected"))?;

        let user = self
            .store
            .find_by_id(&claims.sub)
            .await?
            .ok_or(AuthError::NotFound)?;

        if user.refresh_token() != Some(presented) {
            warn!(user_id = %user.id, "stale refresh token presented");
            return Err(AuthError::StaleToken);
        }

        let (pair, user) =
            self.issue_token_pair(&user.id, Some(presented)).await?;
        info!(user_id = %user.id, "refresh token rotated");

        Ok(pair)
    }

    /// Sign a new pair for `user_id` and persist its refresh token.
    ///
    /// With `rotating`, the write only happens if the stored token still
    /// equals it. Tokens are returned only once the write succeeded.
    async fn issue_token_pair(
        &self,
        user_id: &str,
        rotating: Option<&str>,
    ) -> Result<(TokenPair, User)> {
        let user = self
            .store
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::NotFound)?;

        let access_token = self
            .tokens
            .issue_access_token(Subject {
                id: &user.id,
                username: &user.username,
                email: &user.email,
            })
            .map_err(AuthError::TokenIssuanceFailure)?;
        let refresh_token = self
            .tokens
            .issue_refresh_token(&user.id)
            .map_err(AuthError::TokenIssuanceFailure)?;

        let user = match rotating {
            Some(current) => self
                .store
                .rotate_refresh_token(&user.id, current, &refresh_token)
                .await?
                .ok_or(AuthError::StaleToken)?,
            None => self
                .store
                .set_refresh_token(&user.id, Some(&refresh_token))
                .await?
                .ok_or(AuthError::NotFound)?,
        };

        Ok((
            TokenPair {
                access_token,
                refresh_token,
            },
            user,
        ))
    }
}
