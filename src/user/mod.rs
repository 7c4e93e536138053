//! Credential store: user records, lookup and persistence.
mod memory;
mod repository;
mod service;

pub use memory::*;
pub use repository::*;
pub use service::*;

use chrono::{DateTime, Utc};
use rand::RngCore;
use rand::rngs::OsRng;
use serde::Serialize;

const ID_LENGTH: usize = 12;

/// Errors raised by a [`UserRepository`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{field} is already taken")]
    Duplicate { field: &'static str },

    #[error("failed to hash password")]
    Hashing(#[from] crate::crypto::CryptoError),

    #[error("SQL request failed: {0}")]
    Sql(#[from] sqlx::Error),

    #[error("background task failed")]
    Task(#[from] tokio::task::JoinError),
}

/// User as saved on database.
///
/// Never serialized: use [`SanitizedUser`] to expose it.
#[derive(Clone, PartialEq, sqlx::FromRow)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub avatar: String,
    pub cover_image: Option<String>,
    pub(crate) password: String,
    pub(crate) refresh_token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Current refresh token, if the user is logged in.
    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }

    /// Public projection of this user.
    pub fn sanitize(&self) -> SanitizedUser {
        SanitizedUser::from(self)
    }
}

impl std::fmt::Debug for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("email", &self.email)
            .field("full_name", &self.full_name)
            .field("avatar", &self.avatar)
            .field("cover_image", &self.cover_image)
            .field("password", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

/// User without security-sensitive fields.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SanitizedUser {
    pub id: String,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub avatar: String,
    pub cover_image: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&User> for SanitizedUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            username: user.username.clone(),
            email: user.email.clone(),
            full_name: user.full_name.clone(),
            avatar: user.avatar.clone(),
            cover_image: user.cover_image.clone(),
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

/// Fields required to create a new account.
#[derive(Clone, Default)]
pub struct Registration {
    pub full_name: String,
    pub email: String,
    pub username: String,
    pub password: String,
    pub avatar: String,
    pub cover_image: Option<String>,
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("full_name", &self.full_name)
            .field("email", &self.email)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("avatar", &self.avatar)
            .field("cover_image", &self.cover_image)
            .finish()
    }
}

/// Username and/or email used to find an account.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identifier {
    pub username: Option<String>,
    pub email: Option<String>,
}

impl Identifier {
    /// Trims both fields, lowercases the username and drops blank values.
    pub fn normalize(self) -> Self {
        let clean = |value: Option<String>| {
            value
                .map(|v| v.trim().to_owned())
                .filter(|v| !v.is_empty())
        };

        Self {
            username: clean(self.username).map(|u| u.to_lowercase()),
            email: clean(self.email),
        }
    }

    /// Whether neither a username nor an email is set.
    pub fn is_empty(&self) -> bool {
        self.username.is_none() && self.email.is_none()
    }
}

/// Generate a new random user ID, 24 hexadecimal characters.
pub fn generate_id() -> String {
    let mut bytes = [0u8; ID_LENGTH];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        let now = Utc::now();
        User {
            id: generate_id(),
            username: "ann".into(),
            email: "a@x.com".into(),
            full_name: "Ann".into(),
            avatar: "https://cdn.example.com/ann.png".into(),
            cover_image: None,
            password: "$argon2id$v=19$m=1024,t=1,p=1$c2FsdA$aGFzaA".into(),
            refresh_token: Some("refresh.token.value".into()),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_sanitized_json_has_no_secrets() {
        let user = user();
        let json = serde_json::to_value(user.sanitize()).unwrap();
        let object = json.as_object().unwrap();

        assert!(!object.contains_key("password"));
        assert!(!object.contains_key("refreshToken"));
        assert!(!json.to_string().contains("argon2id"));
        assert!(!json.to_string().contains("refresh.token.value"));
        assert_eq!(object["fullName"], "Ann");
        assert_eq!(object["coverImage"], serde_json::Value::Null);
    }

    #[test]
    fn test_debug_is_redacted() {
        let debug = format!("{:?}", user());
        assert!(!debug.contains("argon2id"));
        assert!(!debug.contains("refresh.token.value"));
    }

    #[test]
    fn test_identifier_normalize() {
        let identifier = Identifier {
            username: Some("  Ann ".into()),
            email: Some("   ".into()),
        }
        .normalize();

        assert_eq!(identifier.username.as_deref(), Some("ann"));
        assert!(identifier.email.is_none());
        assert!(!identifier.is_empty());
        assert!(Identifier::default().normalize().is_empty());
    }

    #[test]
    fn test_generate_id() {
        let id = generate_id();
        assert_eq!(id.len(), ID_LENGTH * 2);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(id, generate_id());
    }
}
