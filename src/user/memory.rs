//! In-memory implementation of [`UserRepository`].
//!
//! Used when no PostgreSQL instance is configured and by tests. Data is
//! lost when the process stops.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use crate::user::{StoreError, User, UserRepository};

type Result<T> = std::result::Result<T, StoreError>;

/// Users indexed by ID behind a single lock, so uniqueness checks and
/// inserts happen atomically.
#[derive(Default)]
pub struct MemoryUserRepository {
    users: RwLock<HashMap<String, User>>,
}

impl MemoryUserRepository {
    /// Creates a new empty in-memory repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current number of users.
    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn find_by_username_or_email(
        &self,
        username: Option<&str>,
        email: Option<&str>,
    ) -> Result<Option<User>> {
        let users = self.users.read().await;

        Ok(users
            .values()
            .find(|user| {
                username == Some(user.username.as_str())
                    || email == Some(user.email.as_str())
            })
            .cloned())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<User>> {
        Ok(self.users.read().await.get(id).cloned())
    }

    #[instrument(skip_all, fields(user_id = %user.id))]
    async fn insert(&self, user: &User) -> Result<()> {
        let mut users = self.users.write().await;

        for existing in users.values() {
            if existing.username == user.username {
                return Err(StoreError::Duplicate { field: "username" });
            }
            if existing.email == user.email {
                return Err(StoreError::Duplicate { field: "email" });
            }
        }
        if users.contains_key(&user.id) {
            return Err(StoreError::Duplicate { field: "id" });
        }

        users.insert(user.id.clone(), user.clone());
        debug!("user inserted in memory");
        Ok(())
    }

    async fn set_refresh_token(
        &self,
        id: &str,
        token: Option<&str>,
    ) -> Result<Option<User>> {
        let mut users = self.users.write().await;

        Ok(users.get_mut(id).map(|user| {
            user.refresh_token = token.map(str::to_owned);
            user.updated_at = Utc::now();
            user.clone()
        }))
    }

    async fn swap_refresh_token(
        &self,
        id: &str,
        current: &str,
        next: &str,
    ) -> Result<Option<User>> {
        let mut users = self.users.write().await;

        Ok(users
            .get_mut(id)
            .filter(|user| user.refresh_token.as_deref() == Some(current))
            .map(|user| {
                user.refresh_token = Some(next.to_owned());
                user.updated_at = Utc::now();
                user.clone()
            }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::user::generate_id;

    fn user(username: &str, email: &str) -> User {
        let now = Utc::now();
        User {
            id: generate_id(),
            username: username.into(),
            email: email.into(),
            full_name: "Test".into(),
            avatar: "https://cdn.example.com/a.png".into(),
            cover_image: None,
            password: String::new(),
            refresh_token: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let repo = MemoryUserRepository::new();
        let ann = user("ann", "a@x.com");
        repo.insert(&ann).await.unwrap();

        assert_eq!(repo.find_by_id(&ann.id).await.unwrap(), Some(ann.clone()));
        assert_eq!(
            repo.find_by_username_or_email(Some("ann"), None)
                .await
                .unwrap()
                .map(|u| u.id),
            Some(ann.id.clone())
        );
        assert_eq!(
            repo.find_by_username_or_email(None, Some("a@x.com"))
                .await
                .unwrap()
                .map(|u| u.id),
            Some(ann.id)
        );
        assert!(
            repo.find_by_username_or_email(None, Some("A@x.com"))
                .await
                .unwrap()
                .is_none()
        );
        assert!(
            repo.find_by_username_or_email(None, None)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_duplicates() {
        let repo = MemoryUserRepository::new();
        repo.insert(&user("ann", "a@x.com")).await.unwrap();

        assert!(matches!(
            repo.insert(&user("ann", "b@x.com")).await,
            Err(StoreError::Duplicate { field: "username" })
        ));
        assert!(matches!(
            repo.insert(&user("bob", "a@x.com")).await,
            Err(StoreError::Duplicate { field: "email" })
        ));
        assert_eq!(repo.len().await, 1);
    }

    #[tokio::test]
    async fn test_refresh_token_writes() {
        let repo = MemoryUserRepository::new();
        let ann = user("ann", "a@x.com");
        repo.insert(&ann).await.unwrap();

        let updated = repo
            .set_refresh_token(&ann.id, Some("first"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.refresh_token(), Some("first"));
        assert!(updated.updated_at >= ann.updated_at);

        assert!(
            repo.swap_refresh_token(&ann.id, "stale", "second")
                .await
                .unwrap()
                .is_none()
        );
        let swapped = repo
            .swap_refresh_token(&ann.id, "first", "second")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(swapped.refresh_token(), Some("second"));

        let cleared =
            repo.set_refresh_token(&ann.id, None).await.unwrap().unwrap();
        assert_eq!(cleared.refresh_token(), None);

        assert!(
            repo.set_refresh_token("missing", Some("x"))
                .await
                .unwrap()
                .is_none()
        );
    }
}
