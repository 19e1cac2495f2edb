use std::{collections::HashMap, sync::Mutex};

use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;

use crate::{
    auth::repo_types::{NewUser, User, UserChanges},
    error::StoreError,
};

/// Persistence for user accounts and their verification state.
///
/// Every write is a single statement against the stored row, so concurrent
/// writers never overwrite each other with stale copies.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Fails with `StoreError::Conflict` when the email or username is taken.
    async fn create_user(&self, new: NewUser) -> Result<User, StoreError>;
    async fn find_by_id(&self, id: i64) -> Result<Option<User>, StoreError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    /// Marks the holder of `token` verified and clears the token. `None` when
    /// no account holds it, including when it was already consumed.
    async fn consume_verification_token(&self, token: &str) -> Result<Option<User>, StoreError>;
    /// Writes only the columns set in `changes`. `None` for an unknown id.
    async fn update(&self, id: i64, changes: UserChanges) -> Result<Option<User>, StoreError>;
}

const USER_COLUMNS: &str =
    "id, username, email, password_hash, is_artisan, is_verified, verification_token, created_at";

pub struct PgCredentialStore {
    db: PgPool,
}

impl PgCredentialStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn create_user(&self, new: NewUser) -> Result<User, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (username, email, password_hash, is_artisan, verification_token)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&new.username)
        .bind(&new.email)
        .bind(&new.password_hash)
        .bind(new.is_artisan)
        .bind(&new.verification_token)
        .fetch_one(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn consume_verification_token(&self, token: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
               SET is_verified = TRUE,
                   verification_token = NULL
             WHERE verification_token = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(token)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn update(&self, id: i64, changes: UserChanges) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
               SET username = COALESCE($2, username),
                   is_artisan = COALESCE($3, is_artisan)
             WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&changes.username)
        .bind(changes.is_artisan)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }
}

/// Mutex-guarded map; each call holds the lock for its whole read-check-write.
#[derive(Default)]
pub struct InMemoryCredentialStore {
    inner: Mutex<UserTable>,
}

#[derive(Default)]
struct UserTable {
    next_id: i64,
    rows: HashMap<i64, User>,
}

impl UserTable {
    /// Errors when another row already holds one of the given values.
    fn check_unique(
        &self,
        id: Option<i64>,
        username: Option<&str>,
        email: Option<&str>,
        token: Option<&str>,
    ) -> Result<(), StoreError> {
        for other in self.rows.values().filter(|u| Some(u.id) != id) {
            if email == Some(other.email.as_str()) {
                return Err(StoreError::Conflict("Email already registered".into()));
            }
            if username == Some(other.username.as_str()) {
                return Err(StoreError::Conflict("Username already taken".into()));
            }
            if token.is_some() && other.verification_token.as_deref() == token {
                return Err(StoreError::Conflict("Duplicate value".into()));
            }
        }
        Ok(())
    }
}

fn poisoned() -> StoreError {
    StoreError::Backend(anyhow::anyhow!("user table lock poisoned"))
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn create_user(&self, new: NewUser) -> Result<User, StoreError> {
        let mut table = self.inner.lock().map_err(|_| poisoned())?;
        table.check_unique(
            None,
            Some(new.username.as_str()),
            Some(new.email.as_str()),
            new.verification_token.as_deref(),
        )?;
        table.next_id += 1;
        let user = User {
            id: table.next_id,
            username: new.username,
            email: new.email,
            password_hash: new.password_hash,
            is_artisan: new.is_artisan,
            is_verified: false,
            verification_token: new.verification_token,
            created_at: OffsetDateTime::now_utc(),
        };
        table.rows.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<User>, StoreError> {
        let table = self.inner.lock().map_err(|_| poisoned())?;
        Ok(table.rows.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let table = self.inner.lock().map_err(|_| poisoned())?;
        Ok(table.rows.values().find(|u| u.email == email).cloned())
    }

    async fn consume_verification_token(&self, token: &str) -> Result<Option<User>, StoreError> {
        let mut table = self.inner.lock().map_err(|_| poisoned())?;
        let Some(row) = table
            .rows
            .values_mut()
            .find(|u| u.verification_token.as_deref() == Some(token))
        else {
            return Ok(None);
        };
        row.is_verified = true;
        row.verification_token = None;
        Ok(Some(row.clone()))
    }

    async fn update(&self, id: i64, changes: UserChanges) -> Result<Option<User>, StoreError> {
        let mut table = self.inner.lock().map_err(|_| poisoned())?;
        table.check_unique(Some(id), changes.username.as_deref(), None, None)?;
        let Some(row) = table.rows.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(username) = changes.username {
            row.username = username;
        }
        if let Some(is_artisan) = changes.is_artisan {
            row.is_artisan = is_artisan;
        }
        Ok(Some(row.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(username: &str, email: &str, token: Option<&str>) -> NewUser {
        NewUser {
            username: username.into(),
            email: email.into(),
            password_hash: "$argon2id$stub".into(),
            is_artisan: true,
            verification_token: token.map(Into::into),
        }
    }

    #[tokio::test]
    async fn create_assigns_increasing_ids_and_starts_unverified() {
        let store = InMemoryCredentialStore::default();
        let a = store.create_user(new_user("alice", "alice@x.com", Some("t1"))).await.unwrap();
        let b = store.create_user(new_user("bob", "bob@x.com", Some("t2"))).await.unwrap();
        assert!(b.id > a.id);
        assert!(!a.is_verified);
        assert_eq!(a.verification_token.as_deref(), Some("t1"));
    }

    #[tokio::test]
    async fn duplicate_email_is_conflict_and_leaves_state_unchanged() {
        let store = InMemoryCredentialStore::default();
        store.create_user(new_user("alice", "alice@x.com", None)).await.unwrap();
        let err = store
            .create_user(new_user("alice2", "alice@x.com", None))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert!(store.find_by_email("alice@x.com").await.unwrap().is_some());
        assert_eq!(store.inner.lock().unwrap().rows.len(), 1);
    }

    #[tokio::test]
    async fn duplicate_username_is_conflict() {
        let store = InMemoryCredentialStore::default();
        store.create_user(new_user("alice", "a@x.com", None)).await.unwrap();
        let err = store.create_user(new_user("alice", "b@x.com", None)).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn consuming_a_token_verifies_once() {
        let store = InMemoryCredentialStore::default();
        store.create_user(new_user("alice", "a@x.com", Some("tok"))).await.unwrap();

        let user = store.consume_verification_token("tok").await.unwrap().unwrap();
        assert!(user.is_verified);
        assert!(user.verification_token.is_none());
        assert!(store.consume_verification_token("tok").await.unwrap().is_none());
        assert!(store.find_by_id(user.id).await.unwrap().unwrap().is_verified);
    }

    #[tokio::test]
    async fn update_touches_only_given_columns() {
        let store = InMemoryCredentialStore::default();
        let alice = store.create_user(new_user("alice", "a@x.com", Some("tok"))).await.unwrap();
        store.consume_verification_token("tok").await.unwrap();

        let changes = UserChanges {
            is_artisan: Some(false),
            ..Default::default()
        };
        let updated = store.update(alice.id, changes).await.unwrap().unwrap();
        assert!(!updated.is_artisan);
        assert!(updated.is_verified);
        assert_eq!(updated.username, "alice");
        assert_eq!(updated.password_hash, alice.password_hash);
        assert!(store.update(999, UserChanges::default()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_rejects_taken_username() {
        let store = InMemoryCredentialStore::default();
        store.create_user(new_user("alice", "a@x.com", None)).await.unwrap();
        let bob = store.create_user(new_user("bob", "b@x.com", None)).await.unwrap();
        let changes = UserChanges {
            username: Some("alice".into()),
            ..Default::default()
        };
        assert!(matches!(store.update(bob.id, changes).await, Err(StoreError::Conflict(_))));
        let reloaded = store.find_by_id(bob.id).await.unwrap().unwrap();
        assert_eq!(reloaded.username, "bob");
    }

    #[tokio::test]
    async fn keeping_own_username_is_not_a_conflict() {
        let store = InMemoryCredentialStore::default();
        let alice = store.create_user(new_user("alice", "a@x.com", None)).await.unwrap();
        let changes = UserChanges {
            username: Some("alice".into()),
            ..Default::default()
        };
        assert!(store.update(alice.id, changes).await.unwrap().is_some());
    }
}
