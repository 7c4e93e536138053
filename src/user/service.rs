use std::sync::Arc;

use chrono::Utc;

use crate::crypto::PasswordManager;
use crate::user::{
    Identifier, Registration, StoreError, User, UserRepository, generate_id,
};

type Result<T> = std::result::Result<T, StoreError>;

/// Credential store: user persistence plus password hashing.
#[derive(Clone)]
pub struct CredentialStore {
    repo: Arc<dyn UserRepository>,
    pwd: Arc<PasswordManager>,
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore")
            .field("pwd", &self.pwd)
            .finish_non_exhaustive()
    }
}

impl CredentialStore {
    /// Create a new [`CredentialStore`].
    pub fn new(repo: Arc<dyn UserRepository>, pwd: Arc<PasswordManager>) -> Self {
        Self { repo, pwd }
    }

    /// Find a user by username or email. The identifier is normalized first.
    pub async fn find_by_username_or_email(
        &self,
        identifier: &Identifier,
    ) -> Result<Option<User>> {
        let identifier = identifier.clone().normalize();
        if identifier.is_empty() {
            return Ok(None);
        }

        self.repo
            .find_by_username_or_email(
                identifier.username.as_deref(),
                identifier.email.as_deref(),
            )
            .await
    }

    /// Find a user by ID.
    pub async fn find_by_id(&self, id: &str) -> Result<Option<User>> {
        self.repo.find_by_id(id).await
    }

    /// Create a new user.
    ///
    /// Hash password and lowercase username. Uniqueness is left to the
    /// repository, which rejects duplicates atomically.
    pub async fn create(&self, registration: Registration) -> Result<User> {
        let Registration {
            full_name,
            email,
            username,
            password,
            avatar,
            cover_image,
        } = registration;

        let pwd = Arc::clone(&self.pwd);
        let plaintext = zeroize::Zeroizing::new(password);
        let password = tokio::task::spawn_blocking(move || {
            pwd.hash_password(plaintext.as_bytes())
        })
        .await??;

        let now = Utc::now();
        let user = User {
            id: generate_id(),
            username: username.trim().to_lowercase(),
            email: email.trim().to_owned(),
            full_name: full_name.trim().to_owned(),
            avatar,
            cover_image: cover_image.filter(|uri| !uri.trim().is_empty()),
            password,
            refresh_token: None,
            created_at: now,
            updated_at: now,
        };

        self.repo.insert(&user).await?;

        tracing::info!(user_id = %user.id, username = %user.username, "user created");
        Ok(user)
    }

    /// Check `plaintext` against the stored hash of `user`.
    pub async fn verify_password(
        &self,
        user: &User,
        plaintext: &str,
    ) -> Result<bool> {
        let pwd = Arc::clone(&self.pwd);
        let hash = user.password.clone();
        let plaintext = zeroize::Zeroizing::new(plaintext.to_owned());

        Ok(tokio::task::spawn_blocking(move || {
            pwd.verify_password(plaintext.as_bytes(), &hash)
        })
        .await?)
    }

    /// Overwrite the stored refresh token; `None` logs the user out.
    pub async fn set_refresh_token(
        &self,
        user_id: &str,
        token: Option<&str>,
    ) -> Result<Option<User>> {
        self.repo.set_refresh_token(user_id, token).await
    }

    /// Replace the stored refresh token only if it is still `current`.
    pub async fn rotate_refresh_token(
        &self,
        user_id: &str,
        current: &str,
        next: &str,
    ) -> Result<Option<User>> {
        self.repo.swap_refresh_token(user_id, current, next).await
    }
}
