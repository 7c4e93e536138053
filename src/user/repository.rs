//! Handle database requests.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Pool, Postgres};

use crate::user::{StoreError, User};

type Result<T> = std::result::Result<T, StoreError>;

const USER_COLUMNS: &str = "id, username, email, full_name, avatar, \
    cover_image, password, refresh_token, created_at, updated_at";

/// Port for user persistence.
///
/// Implementations must make each write atomic per record and enforce
/// username and email uniqueness themselves.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Find a user matching either `username` or `email`.
    async fn find_by_username_or_email(
        &self,
        username: Option<&str>,
        email: Option<&str>,
    ) -> Result<Option<User>>;

    /// Find a user using `id` field.
    async fn find_by_id(&self, id: &str) -> Result<Option<User>>;

    /// Insert [`User`]. Fails with [`StoreError::Duplicate`] when username
    /// or email is already used.
    async fn insert(&self, user: &User) -> Result<()>;

    /// Overwrite the refresh token. Returns the updated user, or `None` if
    /// it does not exist.
    async fn set_refresh_token(
        &self,
        id: &str,
        token: Option<&str>,
    ) -> Result<Option<User>>;

    /// Replace the refresh token only if it still equals `current`.
    async fn swap_refresh_token(
        &self,
        id: &str,
        current: &str,
        next: &str,
    ) -> Result<Option<User>>;
}

/// PostgreSQL user repository.
#[derive(Clone)]
pub struct PgUserRepository {
    pool: Pool<Postgres>,
}

impl PgUserRepository {
    /// Create a new [`PgUserRepository`].
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

/// Map unique constraint violations to [`StoreError::Duplicate`].
fn unique_violation(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            let field = match db_err.constraint() {
                Some(constraint) if constraint.contains("email") => "email",
                Some(constraint) if constraint.contains("username") => {
                    "username"
                },
                _ => "identity",
            };
            return StoreError::Duplicate { field };
        }
    }

    StoreError::Sql(err)
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn find_by_username_or_email(
        &self,
        username: Option<&str>,
        email: Option<&str>,
    ) -> Result<Option<User>> {
        let query = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1 OR email = $2 LIMIT 1"
        );

        Ok(sqlx::query_as::<_, User>(&query)
            .bind(username)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");

        Ok(sqlx::query_as::<_, User>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn insert(&self, user: &User) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO users (id, username, email, full_name, avatar, cover_image, password, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"#,
        )
        .bind(&user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.full_name)
        .bind(&user.avatar)
        .bind(&user.cover_image)
        .bind(&user.password)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await
        .map_err(unique_violation)?;

        Ok(())
    }

    async fn set_refresh_token(
        &self,
        id: &str,
        token: Option<&str>,
    ) -> Result<Option<User>> {
        let query = format!(
            "UPDATE users SET refresh_token = $2, updated_at = $3 WHERE id = $1 RETURNING {USER_COLUMNS}"
        );

        Ok(sqlx::query_as::<_, User>(&query)
            .bind(id)
            .bind(token)
            .bind(Utc::now())
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn swap_refresh_token(
        &self,
        id: &str,
        current: &str,
        next: &str,
    ) -> Result<Option<User>> {
        let query = format!(
            "UPDATE users SET refresh_token = $3, updated_at = $4 WHERE id = $1 AND refresh_token = $2 RETURNING {USER_COLUMNS}"
        );

        Ok(sqlx::query_as::<_, User>(&query)
            .bind(id)
            .bind(current)
            .bind(next)
            .bind(Utc::now())
            .fetch_optional(&self.pool)
            .await?)
    }
}
