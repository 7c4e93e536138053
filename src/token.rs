//! Manage json web tokens.
//!
//! Two kinds of tokens are signed with HS256, each with its own secret and
//! lifetime. Access tokens are self-contained; refresh tokens are also
//! compared against the value stored on the user record by the session
//! manager.

use std::sync::Arc;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode,
};
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::config::Token as TokenConfig;

const JTI_LENGTH: usize = 12;

type Result<T> = std::result::Result<T, TokenError>;

/// Errors raised while signing or verifying a token.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("missing signing secret for {0} tokens")]
    MissingSecret(TokenKind),
    #[error("token is invalid")]
    Invalid,
    #[error("token has expired")]
    Expired,
    #[error("failed to sign token")]
    Signing(#[source] jsonwebtoken::errors::Error),
    #[error("token expiry overflows the timestamp range")]
    Overflow,
}

/// Kind of token, selecting secret and lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenKind::Access => write!(f, "access"),
            TokenKind::Refresh => write!(f, "refresh"),
        }
    }
}

/// Pieces of information asserted on a JWT.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// User ID.
    pub sub: String,
    /// Identifies the instance that issued the JWT.
    pub iss: String,
    /// Identifies the time at which the JWT was issued.
    pub iat: u64,
    /// Expiration time, in seconds since Unix epoch.
    pub exp: u64,
    /// Random nonce, makes every issued token unique.
    pub jti: String,
    /// Kind of token, checked on verification.
    #[serde(default)]
    pub typ: Option<TokenKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Identity embedded on an access token.
#[derive(Debug, Clone, Copy)]
pub struct Subject<'a> {
    pub id: &'a str,
    pub username: &'a str,
    pub email: &'a str,
}

#[derive(Clone)]
struct Keys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    lifetime: u64,
}

impl Keys {
    fn new(kind: TokenKind, secret: &str, lifetime: u64) -> Result<Self> {
        if secret.trim().is_empty() {
            return Err(TokenError::MissingSecret(kind));
        }

        Ok(Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            lifetime,
        })
    }
}

/// Stateless token issuer and verifier.
#[derive(Clone)]
pub struct TokenService {
    algorithm: Algorithm,
    issuer: String,
    access: Keys,
    refresh: Keys,
    clock: Arc<dyn Clock>,
}

impl TokenService {
    /// Create a new [`TokenService`].
    pub fn new(
        issuer: &str,
        config: &TokenConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        Ok(Self {
            algorithm: Algorithm::HS256,
            issuer: issuer.to_owned(),
            access: Keys::new(
                TokenKind::Access,
                &config.access_secret,
                config.access_lifetime.as_secs(),
            )?,
            refresh: Keys::new(
                TokenKind::Refresh,
                &config.refresh_secret,
                config.refresh_lifetime.as_secs(),
            )?,
            clock,
        })
    }

    fn keys(&self, kind: TokenKind) -> &Keys {
        match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
        }
    }

    /// Lifetime of `kind` tokens, in seconds.
    pub fn lifetime(&self, kind: TokenKind) -> u64 {
        self.keys(kind).lifetime
    }

    fn sign(&self, kind: TokenKind, mut claims: Claims) -> Result<String> {
        let keys = self.keys(kind);
        let now = self.clock.now();

        let mut nonce = [0u8; JTI_LENGTH];
        OsRng.fill_bytes(&mut nonce);

        claims.iss = self.issuer.clone();
        claims.iat = now;
        claims.exp = now
            .checked_add(keys.lifetime)
            .ok_or(TokenError::Overflow)?;
        claims.jti = hex::encode(nonce);
        claims.typ = Some(kind);

        encode(&Header::new(self.algorithm), &claims, &keys.encoding)
            .map_err(TokenError::Signing)
    }

    /// Create a new access token carrying the user identity.
    pub fn issue_access_token(&self, subject: Subject<'_>) -> Result<String> {
        self.sign(
            TokenKind::Access,
            Claims {
                sub: subject.id.to_owned(),
                username: Some(subject.username.to_owned()),
                email: Some(subject.email.to_owned()),
                ..Default::default()
            },
        )
    }

    /// Create a new refresh token. Only the user ID is asserted.
    pub fn issue_refresh_token(&self, user_id: &str) -> Result<String> {
        self.sign(
            TokenKind::Refresh,
            Claims {
                sub: user_id.to_owned(),
                ..Default::default()
            },
        )
    }

    /// Decode and check a token against the secret of `kind`.
    ///
    /// The `typ` claim must match `kind`, even when both kinds share a
    /// secret.
    pub fn verify(&self, token: &str, kind: TokenKind) -> Result<Claims> {
        let mut validation = Validation::new(self.algorithm);
        validation.leeway = 0;
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["exp", "sub", "iss"]);

        let claims =
            decode::<Claims>(token, &self.keys(kind).decoding, &validation)
                .map(|data| data.claims)
                .map_err(|err| match err.kind() {
                    ErrorKind::ExpiredSignature => TokenError::Expired,
                    _ => TokenError::Invalid,
                })?;

        if claims.typ != Some(kind) {
            return Err(TokenError::Invalid);
        }
        Ok(claims)
    }
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("algorithm", &self.algorithm)
            .field("issuer", &self.issuer)
            .field("access_lifetime", &self.access.lifetime)
            .field("refresh_lifetime", &self.refresh.lifetime)
            .finish()
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> TokenConfig {
    use crate::config::Lifetime;

    TokenConfig {
        access_secret: "access-secret".into(),
        access_lifetime: Lifetime::from_secs(15 * 60),
        refresh_secret: "refresh-secret".into(),
        refresh_lifetime: Lifetime::from_secs(10 * 24 * 60 * 60),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{FixedClock, SystemClock};

    const ISSUER: &str = "mediahub";

    fn service() -> TokenService {
        TokenService::new(ISSUER, &test_config(), Arc::new(SystemClock))
            .unwrap()
    }

    fn subject() -> Subject<'static> {
        Subject {
            id: "65f1c2a9b7e4d3c2a1f0e9d8",
            username: "ann",
            email: "a@x.com",
        }
    }

    #[test]
    fn test_access_token() {
        let tokens = service();
        let token = tokens.issue_access_token(subject()).unwrap();

        let claims = tokens.verify(&token, TokenKind::Access).unwrap();
        assert_eq!(claims.sub, subject().id);
        assert_eq!(claims.username.as_deref(), Some("ann"));
        assert_eq!(claims.email.as_deref(), Some("a@x.com"));
        assert_eq!(claims.iss, ISSUER);
        assert_eq!(claims.typ, Some(TokenKind::Access));
        assert_eq!(claims.exp - claims.iat, 15 * 60);
    }

    #[test]
    fn test_refresh_token_carries_only_id() {
        let tokens = service();
        let token = tokens.issue_refresh_token("user").unwrap();

        let claims = tokens.verify(&token, TokenKind::Refresh).unwrap();
        assert_eq!(claims.sub, "user");
        assert!(claims.username.is_none());
        assert!(claims.email.is_none());
        assert_eq!(claims.exp - claims.iat, 10 * 24 * 60 * 60);
    }

    #[test]
    fn test_tokens_are_unique() {
        let tokens = service();
        let first = tokens.issue_refresh_token("user").unwrap();
        let second = tokens.issue_refresh_token("user").unwrap();

        assert_ne!(first, second);
    }

    #[test]
    fn test_wrong_secret() {
        let tokens = service();
        let access = tokens.issue_access_token(subject()).unwrap();
        let refresh = tokens.issue_refresh_token("user").unwrap();

        assert!(matches!(
            tokens.verify(&access, TokenKind::Refresh),
            Err(TokenError::Invalid)
        ));
        assert!(matches!(
            tokens.verify(&refresh, TokenKind::Access),
            Err(TokenError::Invalid)
        ));
    }

    #[test]
    fn test_expired() {
        // Issued in 1970, long expired.
        let past =
            TokenService::new(ISSUER, &test_config(), Arc::new(FixedClock::new(1_000)))
                .unwrap();
        let token = past.issue_refresh_token("user").unwrap();

        assert!(matches!(
            service().verify(&token, TokenKind::Refresh),
            Err(TokenError::Expired)
        ));
    }

    #[test]
    fn test_corrupted() {
        let tokens = service();
        assert!(matches!(
            tokens.verify("invalid.token.here", TokenKind::Access),
            Err(TokenError::Invalid)
        ));

        let mut token = tokens.issue_access_token(subject()).unwrap();
        token.push('x');
        assert!(matches!(
            tokens.verify(&token, TokenKind::Access),
            Err(TokenError::Invalid)
        ));
    }

    #[test]
    fn test_foreign_issuer() {
        let other =
            TokenService::new("elsewhere", &test_config(), Arc::new(SystemClock))
                .unwrap();
        let token = other.issue_refresh_token("user").unwrap();

        assert!(matches!(
            service().verify(&token, TokenKind::Refresh),
            Err(TokenError::Invalid)
        ));
    }

    #[test]
    fn test_kind_checked_with_shared_secret() {
        let mut config = test_config();
        config.refresh_secret = config.access_secret.clone();
        let tokens =
            TokenService::new(ISSUER, &config, Arc::new(SystemClock)).unwrap();

        let access = tokens.issue_access_token(subject()).unwrap();
        let refresh = tokens.issue_refresh_token("user").unwrap();

        assert!(tokens.verify(&access, TokenKind::Access).is_ok());
        assert!(tokens.verify(&refresh, TokenKind::Refresh).is_ok());
        assert!(matches!(
            tokens.verify(&access, TokenKind::Refresh),
            Err(TokenError::Invalid)
        ));
        assert!(matches!(
            tokens.verify(&refresh, TokenKind::Access),
            Err(TokenError::Invalid)
        ));
    }

    #[test]
    fn test_untyped_token_rejected() {
        let claims = Claims {
            sub: "user".into(),
            iss: ISSUER.into(),
            exp: SystemClock.now() + 60,
            ..Default::default()
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"access-secret"),
        )
        .unwrap();

        assert!(matches!(
            service().verify(&token, TokenKind::Access),
            Err(TokenError::Invalid)
        ));
    }

    #[test]
    fn test_expiry_overflow() {
        let tokens = TokenService::new(
            ISSUER,
            &test_config(),
            Arc::new(FixedClock::new(u64::MAX - 10)),
        )
        .unwrap();

        assert!(matches!(
            tokens.issue_refresh_token("user"),
            Err(TokenError::Overflow)
        ));
        assert!(matches!(
            tokens.issue_access_token(subject()),
            Err(TokenError::Overflow)
        ));
    }

    #[test]
    fn test_missing_secret() {
        let mut config = test_config();
        config.refresh_secret = " ".into();

        assert!(matches!(
            TokenService::new(ISSUER, &config, Arc::new(SystemClock)),
            Err(TokenError::MissingSecret(TokenKind::Refresh))
        ));
    }
}
