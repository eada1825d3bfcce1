use anyhow::Result;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement};
use std::path::Path;
use std::time::Duration;
use tracing::info;

pub mod migrator;
pub mod repositories;

pub use repositories::record::{Record, RecordPatch};
pub use repositories::user::{NewUser, User};

/// Storage-layer error taxonomy. `Conflict` and `NotFound` are stable
/// business outcomes; `Db` is infrastructure trouble and must never be
/// mapped onto them.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("username or email already registered")]
    Conflict,

    #[error("record not found")]
    NotFound,

    #[error("database error: {0}")]
    Db(#[from] sea_orm::DbErr),
}

#[derive(Clone)]
pub struct Store {
    pub conn: DatabaseConnection,
}

impl Store {
    pub async fn new(db_url: &str) -> Result<Self> {
        Self::with_pool_options(db_url, 5, 1).await
    }

    pub async fn with_pool_options(
        db_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self> {
        use sea_orm_migration::MigratorTrait;

        let is_memory = db_url.contains(":memory:");

        if db_url.starts_with("sqlite:") && !is_memory {
            let path_str = db_url.trim_start_matches("sqlite:");
            if let Some(parent) = Path::new(path_str).parent() {
                tokio::fs::create_dir_all(parent).await.ok();
            }
            if !Path::new(path_str).exists() {
                std::fs::File::create(path_str)?;
            }
        }

        // Pooled in-memory SQLite gives each connection its own database
        let max_connections = if is_memory { 1 } else { max_connections };
        let min_connections = min_connections.min(max_connections);

        let mut opt = ConnectOptions::new(db_url.to_string());
        opt.max_connections(max_connections)
            .min_connections(min_connections)
            .connect_timeout(Duration::from_secs(10))
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(300))
            .max_lifetime(Duration::from_secs(600))
            .sqlx_logging(false);

        let conn = Database::connect(opt).await?;

        migrator::Migrator::up(&conn, None).await?;

        info!(
            "Database connected & migrations applied (pool: {}-{})",
            min_connections, max_connections
        );

        Ok(Self { conn })
    }

    pub async fn ping(&self) -> Result<()> {
        let backend = self.conn.get_database_backend();
        self.conn
            .query_one(Statement::from_string(backend, "SELECT 1".to_string()))
            .await?;
        Ok(())
    }

    fn user_repo(&self) -> repositories::user::UserRepository {
        repositories::user::UserRepository::new(self.conn.clone())
    }

    fn record_repo(&self) -> repositories::record::RecordRepository {
        repositories::record::RecordRepository::new(self.conn.clone())
    }

    pub async fn create_user(&self, new_user: NewUser) -> Result<User, StoreError> {
        metrics::counter!("db_queries_total").increment(1);
        self.user_repo().create(new_user).await
    }

    pub async fn find_user(&self, username: &str) -> Result<Option<User>, StoreError> {
        metrics::counter!("db_queries_total").increment(1);
        self.user_repo().find_by_username(username).await
    }

    pub async fn find_user_with_password(
        &self,
        username: &str,
    ) -> Result<Option<(User, String)>, StoreError> {
        metrics::counter!("db_queries_total").increment(1);
        self.user_repo().find_with_password(username).await
    }

    pub async fn record_login(&self, username: &str, timestamp: &str) -> Result<(), StoreError> {
        metrics::counter!("db_queries_total").increment(1);
        self.user_repo().record_login(username, timestamp).await
    }

    pub async fn set_user_active(&self, username: &str, active: bool) -> Result<(), StoreError> {
        metrics::counter!("db_queries_total").increment(1);
        self.user_repo().set_active(username, active).await
    }

    pub async fn create_record(
        &self,
        created_by: &str,
        record_type: &str,
        title: &str,
        description: Option<String>,
    ) -> Result<Record, StoreError> {
        metrics::counter!("db_queries_total").increment(1);
        self.record_repo()
            .create(created_by, record_type, title, description)
            .await
    }

    pub async fn update_record(&self, id: i32, patch: RecordPatch) -> Result<Record, StoreError> {
        metrics::counter!("db_queries_total").increment(1);
        self.record_repo().update(id, patch).await
    }

    pub async fn soft_delete_record(&self, id: i32) -> Result<Record, StoreError> {
        metrics::counter!("db_queries_total").increment(1);
        self.record_repo().soft_delete(id).await
    }

    pub async fn list_records(
        &self,
        record_type: Option<&str>,
        limit: u64,
    ) -> Result<Vec<Record>, StoreError> {
        metrics::counter!("db_queries_total").increment(1);
        self.record_repo().list(record_type, limit).await
    }
}
