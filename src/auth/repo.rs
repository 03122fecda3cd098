use std::collections::HashMap;

use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::auth::repo_types::{NewUser, User, UserPatch, UserRow};

#[derive(Debug, thiserror::Error)]
pub enum CreateUserError {
    #[error("email already registered")]
    EmailTaken,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Persistent collection of user accounts.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>>;
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>>;
    /// Inserts a user. Fails with [`CreateUserError::EmailTaken`] if the email exists.
    async fn create(&self, new: NewUser) -> Result<User, CreateUserError>;
    /// Applies `patch` and returns the updated user, or `None` if no such user exists.
    async fn update_by_id(&self, id: Uuid, patch: UserPatch) -> anyhow::Result<Option<User>>;
}

const USER_COLUMNS: &str =
    "id, email, password_hash, subscription, token, avatar_url, profile, created_at";

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn into_user(row: UserRow) -> anyhow::Result<User> {
    User::try_from(row).context("decode users row")
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await
        .context("find user by email")?;
        row.map(into_user).transpose()
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("find user by id")?;
        row.map(into_user).transpose()
    }

    async fn create(&self, new: NewUser) -> Result<User, CreateUserError> {
        let res = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            INSERT INTO users (id, email, password_hash, subscription, avatar_url, profile)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&new.email)
        .bind(&new.password_hash)
        .bind(new.subscription.as_str())
        .bind(&new.avatar_url)
        .bind(&new.profile)
        .fetch_one(&self.db)
        .await;

        match res {
            Ok(row) => Ok(into_user(row)?),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(CreateUserError::EmailTaken)
            }
            Err(e) => Err(anyhow::Error::new(e).context("insert user").into()),
        }
    }

    async fn update_by_id(&self, id: Uuid, patch: UserPatch) -> anyhow::Result<Option<User>> {
        let (set_token, token) = match patch.token {
            Some(t) => (true, t),
            None => (false, None),
        };
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            UPDATE users SET
                token        = CASE WHEN $2 THEN $3 ELSE token END,
                avatar_url   = COALESCE($4, avatar_url),
                subscription = COALESCE($5, subscription)
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(set_token)
        .bind(token)
        .bind(patch.avatar_url)
        .bind(patch.subscription.map(|s| s.as_str()))
        .fetch_optional(&self.db)
        .await
        .context("update user")?;
        row.map(into_user).transpose()
    }
}

/// In-process store used when no database is configured, and by the tests.
#[derive(Default)]
pub struct MemoryUserStore {
    users: RwLock<HashMap<Uuid, User>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub async fn delete_by_id(&self, id: Uuid) -> Option<User> {
        self.users.write().await.remove(&id)
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let users = self.users.read().await;
        Ok(users.values().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn create(&self, new: NewUser) -> Result<User, CreateUserError> {
        let mut users = self.users.write().await;
        if users.values().any(|u| u.email == new.email) {
            return Err(CreateUserError::EmailTaken);
        }
        let user = User {
            id: Uuid::new_v4(),
            email: new.email,
            password_hash: new.password_hash,
            subscription: new.subscription,
            token: None,
            avatar_url: new.avatar_url,
            profile: new.profile,
            created_at: OffsetDateTime::now_utc(),
        };
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn update_by_id(&self, id: Uuid, patch: UserPatch) -> anyhow::Result<Option<User>> {
        let mut users = self.users.write().await;
        Ok(users.get_mut(&id).map(|user| {
            patch.apply(user);
            user.clone()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::repo_types::Subscription;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            email: email.into(),
            password_hash: "hash".into(),
            subscription: Subscription::default(),
            avatar_url: "https://www.gravatar.com/avatar/x".into(),
            profile: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn memory_store_rejects_duplicate_email() {
        let store = MemoryUserStore::new();
        store.create(new_user("a@x.com")).await.unwrap();
        let err = store.create(new_user("a@x.com")).await.unwrap_err();
        assert!(matches!(err, CreateUserError::EmailTaken));
    }

    #[tokio::test]
    async fn memory_store_finds_and_updates() {
        let store = MemoryUserStore::new();
        let user = store.create(new_user("b@x.com")).await.unwrap();

        let found = store.find_by_email("b@x.com").await.unwrap().unwrap();
        assert_eq!(found.id, user.id);

        let updated = store
            .update_by_id(user.id, UserPatch::token(Some("tok".into())))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.token.as_deref(), Some("tok"));
        assert_eq!(
            store.find_by_id(user.id).await.unwrap().unwrap().token.as_deref(),
            Some("tok")
        );
    }

    #[tokio::test]
    async fn memory_store_update_of_missing_user_is_none() {
        let store = MemoryUserStore::new();
        let res = store
            .update_by_id(Uuid::new_v4(), UserPatch::avatar_url("avatars/a.png"))
            .await
            .unwrap();
        assert!(res.is_none());
    }
}
