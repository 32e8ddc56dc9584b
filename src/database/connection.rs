use sqlx::{postgres::PgPoolOptions, sqlite::SqlitePoolOptions, Pool, Postgres, Sqlite};
use std::sync::Arc;
use tracing::info;

use super::{DatabaseConfig, DatabaseError, DatabaseResult, DatabaseType};

/// Backend-specific connection pool
pub enum DatabasePool {
    Postgres(Pool<Postgres>),
    Sqlite(Pool<Sqlite>),
}

impl DatabasePool {
    pub fn as_postgres(&self) -> Option<&Pool<Postgres>> {
        match self {
            DatabasePool::Postgres(pool) => Some(pool),
            _ => None,
        }
    }

    pub fn as_sqlite(&self) -> Option<&Pool<Sqlite>> {
        match self {
            DatabasePool::Sqlite(pool) => Some(pool),
            _ => None,
        }
    }

    pub async fn close(&self) {
        match self {
            DatabasePool::Postgres(pool) => pool.close().await,
            DatabasePool::Sqlite(pool) => pool.close().await,
        }
    }
}

/// Catalog handle. Cheap to clone; every component that touches the
/// catalog receives one explicitly.
pub struct Database {
    pool: Arc<DatabasePool>,
    config: DatabaseConfig,
}

impl Database {
    pub async fn new(config: DatabaseConfig) -> DatabaseResult<Self> {
        info!("Connecting to catalog: {:?}", config.database_type);

        let in_memory = config.url.contains(":memory:");
        // An in-memory SQLite database dies with its last connection.
        let idle_timeout = if in_memory { None } else { Some(config.idle_timeout()) };
        let max_lifetime = if in_memory { None } else { config.max_lifetime() };

        let pool = match config.database_type {
            DatabaseType::Postgres => {
                let pool = PgPoolOptions::new()
                    .max_connections(config.pool.max_connections)
                    .min_connections(config.pool.min_connections)
                    .acquire_timeout(config.connect_timeout())
                    .idle_timeout(idle_timeout)
                    .max_lifetime(max_lifetime)
                    .connect(&config.url)
                    .await
                    .map_err(|e| DatabaseError::Connection(format!("PostgreSQL connect failed: {}", e)))?;

                info!("Connected to PostgreSQL catalog");
                DatabasePool::Postgres(pool)
            }
            DatabaseType::Sqlite => {
                if !in_memory {
                    if let Some(path) = config.url.strip_prefix("sqlite:") {
                        let path = path.trim_start_matches("//");
                        if let Some(parent) = std::path::Path::new(path).parent() {
                            std::fs::create_dir_all(parent).map_err(|e| {
                                DatabaseError::Connection(format!("Failed to create catalog directory: {}", e))
                            })?;
                        }
                    }
                }

                let url = if in_memory || config.url.contains("mode=") {
                    config.url.clone()
                } else {
                    format!("{}?mode=rwc", config.url)
                };

                let pool = SqlitePoolOptions::new()
                    .max_connections(config.pool.max_connections)
                    .min_connections(config.pool.min_connections)
                    .acquire_timeout(config.connect_timeout())
                    .idle_timeout(idle_timeout)
                    .max_lifetime(max_lifetime)
                    .connect(&url)
                    .await
                    .map_err(|e| DatabaseError::Connection(format!("SQLite connect failed: {}", e)))?;

                sqlx::query("PRAGMA foreign_keys = ON")
                    .execute(&pool)
                    .await
                    .map_err(|e| DatabaseError::Connection(format!("Failed to enable foreign keys: {}", e)))?;

                info!("Connected to SQLite catalog");
                DatabasePool::Sqlite(pool)
            }
        };

        let db = Self {
            pool: Arc::new(pool),
            config: config.clone(),
        };

        if config.run_migrations {
            db.run_migrations().await?;
        }

        Ok(db)
    }

    pub fn pool(&self) -> Arc<DatabasePool> {
        self.pool.clone()
    }

    pub fn database_type(&self) -> &DatabaseType {
        &self.config.database_type
    }

    pub async fn run_migrations(&self) -> DatabaseResult<()> {
        info!("Running catalog migrations...");

        match &*self.pool {
            DatabasePool::Postgres(pool) => {
                sqlx::migrate!("./migrations/postgres")
                    .run(pool)
                    .await
                    .map_err(|e| DatabaseError::Migration(format!("PostgreSQL migration failed: {}", e)))?;
            }
            DatabasePool::Sqlite(pool) => {
                sqlx::migrate!("./migrations/sqlite")
                    .run(pool)
                    .await
                    .map_err(|e| DatabaseError::Migration(format!("SQLite migration failed: {}", e)))?;
            }
        }

        info!("Catalog migrations complete");
        Ok(())
    }

    pub async fn health_check(&self) -> DatabaseResult<()> {
        match &*self.pool {
            DatabasePool::Postgres(pool) => {
                sqlx::query("SELECT 1")
                    .execute(pool)
                    .await
                    .map_err(|e| DatabaseError::Connection(format!("PostgreSQL health check failed: {}", e)))?;
            }
            DatabasePool::Sqlite(pool) => {
                sqlx::query("SELECT 1")
                    .execute(pool)
                    .await
                    .map_err(|e| DatabaseError::Connection(format!("SQLite health check failed: {}", e)))?;
            }
        }
        Ok(())
    }

    pub async fn begin_transaction(&self) -> DatabaseResult<Transaction> {
        match &*self.pool {
            DatabasePool::Postgres(pool) => {
                let tx = pool
                    .begin()
                    .await
                    .map_err(|e| DatabaseError::Transaction(format!("Failed to begin PostgreSQL transaction: {}", e)))?;
                Ok(Transaction::Postgres(tx))
            }
            DatabasePool::Sqlite(pool) => {
                let tx = pool
                    .begin()
                    .await
                    .map_err(|e| DatabaseError::Transaction(format!("Failed to begin SQLite transaction: {}", e)))?;
                Ok(Transaction::Sqlite(tx))
            }
        }
    }
}

/// Open catalog transaction. Dropping it without `commit` rolls back.
pub enum Transaction {
    Postgres(sqlx::Transaction<'static, Postgres>),
    Sqlite(sqlx::Transaction<'static, Sqlite>),
}

impl Transaction {
    pub async fn commit(self) -> DatabaseResult<()> {
        match self {
            Transaction::Postgres(tx) => tx
                .commit()
                .await
                .map_err(|e| DatabaseError::Transaction(format!("Failed to commit PostgreSQL transaction: {}", e)))?,
            Transaction::Sqlite(tx) => tx
                .commit()
                .await
                .map_err(|e| DatabaseError::Transaction(format!("Failed to commit SQLite transaction: {}", e)))?,
        }
        Ok(())
    }

    pub async fn rollback(self) -> DatabaseResult<()> {
        match self {
            Transaction::Postgres(tx) => tx
                .rollback()
                .await
                .map_err(|e| DatabaseError::Transaction(format!("Failed to roll back PostgreSQL transaction: {}", e)))?,
            Transaction::Sqlite(tx) => tx
                .rollback()
                .await
                .map_err(|e| DatabaseError::Transaction(format!("Failed to roll back SQLite transaction: {}", e)))?,
        }
        Ok(())
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            config: self.config.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sqlite_memory_connection() {
        let db = Database::new(DatabaseConfig::in_memory()).await;
        assert!(db.is_ok());

        let db = db.unwrap();
        assert!(db.health_check().await.is_ok());
        assert_eq!(db.database_type(), &DatabaseType::Sqlite);
    }

    #[tokio::test]
    async fn test_uncommitted_transaction_rolls_back() {
        let db = Database::new(DatabaseConfig::in_memory()).await.unwrap();
        let pool = db.pool();
        let sqlite = pool.as_sqlite().unwrap();

        let mut tx = match db.begin_transaction().await.unwrap() {
            Transaction::Sqlite(tx) => tx,
            Transaction::Postgres(_) => unreachable!(),
        };
        sqlx::query("INSERT INTO port_pool (port, available) VALUES (15000, 1)")
            .execute(&mut *tx)
            .await
            .unwrap();
        Transaction::Sqlite(tx).rollback().await.unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM port_pool")
            .fetch_one(sqlite)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }
}
