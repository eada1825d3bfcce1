use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter, Set,
    SqlErr, TransactionTrait,
};

use super::super::StoreError;
use crate::entities::users;

/// Account data returned from the repository (without the password hash)
#[derive(Debug, Clone)]
pub struct User {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub is_active: bool,
    pub is_admin: bool,
    pub created_at: String,
    pub last_login: Option<String>,
}

impl From<users::Model> for User {
    fn from(model: users::Model) -> Self {
        Self {
            id: model.id,
            username: model.username,
            email: model.email,
            is_active: model.is_active,
            is_admin: model.is_admin,
            created_at: model.created_at,
            last_login: model.last_login,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
}

pub struct UserRepository {
    conn: DatabaseConnection,
}

impl UserRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Create an account. Username and email are each globally unique.
    ///
    /// The pre-check reads both fields in one query inside the insert
    /// transaction; the unique constraints on the table close the window
    /// two concurrent registrations could still slip through.
    pub async fn create(&self, new_user: NewUser) -> Result<User, StoreError> {
        let txn = self.conn.begin().await?;

        let existing = users::Entity::find()
            .filter(
                Condition::any()
                    .add(users::Column::Username.eq(new_user.username.as_str()))
                    .add(users::Column::Email.eq(new_user.email.as_str())),
            )
            .one(&txn)
            .await?;

        if existing.is_some() {
            txn.rollback().await.ok();
            return Err(StoreError::Conflict);
        }

        let now = chrono::Utc::now().to_rfc3339();

        let model = users::ActiveModel {
            username: Set(new_user.username),
            email: Set(new_user.email),
            password_hash: Set(new_user.password_hash),
            is_active: Set(true),
            is_admin: Set(false),
            created_at: Set(now),
            last_login: Set(None),
            ..Default::default()
        };

        let inserted = match model.insert(&txn).await {
            Ok(model) => model,
            Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                txn.rollback().await.ok();
                return Err(StoreError::Conflict);
            }
            Err(e) => return Err(e.into()),
        };

        txn.commit().await?;

        Ok(inserted.into())
    }

    pub async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let user = users::Entity::find()
            .filter(users::Column::Username.eq(username))
            .one(&self.conn)
            .await?;

        Ok(user.map(User::from))
    }

    /// Variant for login: also returns the stored password hash.
    pub async fn find_with_password(
        &self,
        username: &str,
    ) -> Result<Option<(User, String)>, StoreError> {
        let user = users::Entity::find()
            .filter(users::Column::Username.eq(username))
            .one(&self.conn)
            .await?;

        Ok(user.map(|u| {
            let password_hash = u.password_hash.clone();
            (User::from(u), password_hash)
        }))
    }

    /// Update `last_login`. Callers run this before issuing a token so a
    /// storage fault aborts the login instead of silently degrading it.
    pub async fn record_login(&self, username: &str, timestamp: &str) -> Result<(), StoreError> {
        let user = users::Entity::find()
            .filter(users::Column::Username.eq(username))
            .one(&self.conn)
            .await?
            .ok_or(StoreError::NotFound)?;

        let mut active: users::ActiveModel = user.into();
        active.last_login = Set(Some(timestamp.to_string()));
        active.update(&self.conn).await?;

        Ok(())
    }

    /// External deactivation hook. The core never calls this on its own.
    pub async fn set_active(&self, username: &str, is_active: bool) -> Result<(), StoreError> {
        let user = users::Entity::find()
            .filter(users::Column::Username.eq(username))
            .one(&self.conn)
            .await?
            .ok_or(StoreError::NotFound)?;

        let mut active: users::ActiveModel = user.into();
        active.is_active = Set(is_active);
        active.update(&self.conn).await?;

        Ok(())
    }
}
