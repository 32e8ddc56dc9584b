use chrono::Utc;
use tracing::info;

use crate::database::{models::DbService, Database, DatabasePool, DatabaseResult};

/// Service template catalog
pub struct ServiceRepository<'a> {
    db: &'a Database,
}

impl<'a> ServiceRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Insert or refresh a template's catalog entry; `created_at` is kept.
    pub async fn upsert(&self, service: &DbService) -> DatabaseResult<()> {
        let now = Utc::now();
        match &*self.db.pool() {
            DatabasePool::Postgres(pool) => {
                sqlx::query(
                    r#"
                    INSERT INTO services (
                        name, description, version, default_port, default_cpu, default_memory,
                        created_at, updated_at
                    ) VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
                    ON CONFLICT (name) DO UPDATE SET
                        description = EXCLUDED.description,
                        version = EXCLUDED.version,
                        default_port = EXCLUDED.default_port,
                        default_cpu = EXCLUDED.default_cpu,
                        default_memory = EXCLUDED.default_memory,
                        updated_at = EXCLUDED.updated_at
                    "#,
                )
                .bind(&service.name)
                .bind(&service.description)
                .bind(&service.version)
                .bind(service.default_port)
                .bind(&service.default_cpu)
                .bind(&service.default_memory)
                .bind(now)
                .execute(pool)
                .await?;
            }
            DatabasePool::Sqlite(pool) => {
                sqlx::query(
                    r#"
                    INSERT INTO services (
                        name, description, version, default_port, default_cpu, default_memory,
                        created_at, updated_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
                    ON CONFLICT (name) DO UPDATE SET
                        description = excluded.description,
                        version = excluded.version,
                        default_port = excluded.default_port,
                        default_cpu = excluded.default_cpu,
                        default_memory = excluded.default_memory,
                        updated_at = excluded.updated_at
                    "#,
                )
                .bind(&service.name)
                .bind(&service.description)
                .bind(&service.version)
                .bind(service.default_port)
                .bind(&service.default_cpu)
                .bind(&service.default_memory)
                .bind(now)
                .execute(pool)
                .await?;
            }
        }

        info!("Registered service template: {} ({})", service.name, service.version);
        Ok(())
    }

    pub async fn find_by_name(&self, name: &str) -> DatabaseResult<Option<DbService>> {
        let service = match &*self.db.pool() {
            DatabasePool::Postgres(pool) => {
                sqlx::query_as::<_, DbService>("SELECT * FROM services WHERE name = $1")
                    .bind(name)
                    .fetch_optional(pool)
                    .await?
            }
            DatabasePool::Sqlite(pool) => {
                sqlx::query_as::<_, DbService>("SELECT * FROM services WHERE name = ?1")
                    .bind(name)
                    .fetch_optional(pool)
                    .await?
            }
        };

        Ok(service)
    }

    pub async fn list(&self) -> DatabaseResult<Vec<DbService>> {
        let services = match &*self.db.pool() {
            DatabasePool::Postgres(pool) => {
                sqlx::query_as::<_, DbService>("SELECT * FROM services ORDER BY name")
                    .fetch_all(pool)
                    .await?
            }
            DatabasePool::Sqlite(pool) => {
                sqlx::query_as::<_, DbService>("SELECT * FROM services ORDER BY name")
                    .fetch_all(pool)
                    .await?
            }
        };

        Ok(services)
    }
}
