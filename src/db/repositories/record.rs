use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionTrait,
};

use super::super::StoreError;
use crate::entities::records;

#[derive(Debug, Clone)]
pub struct Record {
    pub id: i32,
    pub title: String,
    pub record_type: String,
    pub description: Option<String>,
    pub created_by: String,
    pub created_at: String,
    pub updated_at: String,
    pub is_active: bool,
}

impl From<records::Model> for Record {
    fn from(model: records::Model) -> Self {
        Self {
            id: model.id,
            title: model.title,
            record_type: model.record_type,
            description: model.description,
            created_by: model.created_by,
            created_at: model.created_at,
            updated_at: model.updated_at,
            is_active: model.is_active,
        }
    }
}

/// Partial update payload. `None` means "leave unchanged"; clearing a
/// field is not an operation this service offers.
#[derive(Debug, Clone, Default)]
pub struct RecordPatch {
    pub title: Option<String>,
    pub description: Option<String>,
}

pub struct RecordRepository {
    conn: DatabaseConnection,
}

impl RecordRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn create(
        &self,
        created_by: &str,
        record_type: &str,
        title: &str,
        description: Option<String>,
    ) -> Result<Record, StoreError> {
        let now = chrono::Utc::now().to_rfc3339();

        let model = records::ActiveModel {
            title: Set(title.to_string()),
            record_type: Set(record_type.to_string()),
            description: Set(description),
            created_by: Set(created_by.to_string()),
            created_at: Set(now.clone()),
            updated_at: Set(now),
            is_active: Set(true),
            ..Default::default()
        };

        let inserted = model.insert(&self.conn).await?;

        Ok(inserted.into())
    }

    /// Partial update of an active record. All requested fields are written
    /// in one statement inside a transaction, so the update either applies
    /// fully or not at all. `updated_at` is always refreshed.
    pub async fn update(&self, id: i32, patch: RecordPatch) -> Result<Record, StoreError> {
        let txn = self.conn.begin().await?;

        let record = records::Entity::find_by_id(id)
            .filter(records::Column::IsActive.eq(true))
            .one(&txn)
            .await?
            .ok_or(StoreError::NotFound)?;

        let mut active: records::ActiveModel = record.into();
        if let Some(title) = patch.title {
            active.title = Set(title);
        }
        if let Some(description) = patch.description {
            active.description = Set(Some(description));
        }
        active.updated_at = Set(chrono::Utc::now().to_rfc3339());

        let updated = active.update(&txn).await?;
        txn.commit().await?;

        Ok(updated.into())
    }

    /// Mark a record inactive. The check-then-write runs in a transaction,
    /// so a second concurrent delete of the same id observes `NotFound`
    /// once the first commits.
    pub async fn soft_delete(&self, id: i32) -> Result<Record, StoreError> {
        let txn = self.conn.begin().await?;

        let record = records::Entity::find_by_id(id)
            .filter(records::Column::IsActive.eq(true))
            .one(&txn)
            .await?
            .ok_or(StoreError::NotFound)?;

        let mut active: records::ActiveModel = record.into();
        active.is_active = Set(false);
        active.updated_at = Set(chrono::Utc::now().to_rfc3339());

        let deleted = active.update(&txn).await?;
        txn.commit().await?;

        Ok(deleted.into())
    }

    /// Active records only, optionally filtered by type, capped at `limit`.
    /// Ordered by id ascending so repeated identical calls are stable.
    pub async fn list(
        &self,
        record_type: Option<&str>,
        limit: u64,
    ) -> Result<Vec<Record>, StoreError> {
        let mut query = records::Entity::find().filter(records::Column::IsActive.eq(true));

        if let Some(record_type) = record_type {
            query = query.filter(records::Column::RecordType.eq(record_type));
        }

        let rows = query
            .order_by_asc(records::Column::Id)
            .limit(limit)
            .all(&self.conn)
            .await?;

        Ok(rows.into_iter().map(Record::from).collect())
    }
}
