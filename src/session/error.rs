//! Errors surfaced by account and session operations.

use crate::token::TokenError;
use crate::user::StoreError;

pub type Result<T> = std::result::Result<T, AuthError>;

/// Errors that can occur while registering, logging in, refreshing or
/// logging out.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("username or email is required")]
    MissingCredential,
    #[error("refresh token is required")]
    MissingToken,
    #[error("user not found")]
    NotFound,
    #[error("invalid user credentials")]
    InvalidCredential,
    #[error("invalid token")]
    InvalidToken,
    #[error("token has expired")]
    ExpiredToken,
    #[error("refresh token is expired or used")]
    StaleToken,
    #[error("user with this {field} already exists")]
    DuplicateIdentity { field: &'static str },
    #[error("failed to issue tokens")]
    TokenIssuanceFailure(#[source] TokenError),
    #[error("internal server error")]
    PersistenceFailure(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl AuthError {
    pub fn persistence<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::PersistenceFailure(Box::new(err))
    }
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate { field } => Self::DuplicateIdentity { field },
            err => Self::persistence(err),
        }
    }
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Invalid => Self::InvalidToken,
            TokenError::Expired => Self::ExpiredToken,
            err => Self::TokenIssuanceFailure(err),
        }
    }
}
