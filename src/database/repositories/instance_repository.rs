use chrono::Utc;
use sqlx::QueryBuilder;

use crate::database::{
    models::{DbInstance, InstanceFilter, InstanceStatus, NewInstance},
    Database, DatabaseError, DatabasePool, DatabaseResult, Transaction,
};

/// Instance rows. Only rows whose status is not `deleted` are "live".
pub struct InstanceRepository<'a> {
    db: &'a Database,
}

impl<'a> InstanceRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Insert a row inside `tx`. Uniqueness of identifier, subdomain and
    /// port among live rows is enforced by partial indexes.
    pub async fn insert_in(tx: &mut Transaction, instance: &NewInstance) -> DatabaseResult<()> {
        let now = Utc::now();
        match tx {
            Transaction::Postgres(tx) => {
                sqlx::query(
                    r#"
                    INSERT INTO instances (
                        identifier, name, template, subdomain, port, status,
                        cpu_limit, memory_limit, data_path, container_id, proxy_site_id,
                        created_at, updated_at
                    ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $12)
                    "#,
                )
                .bind(&instance.identifier)
                .bind(&instance.name)
                .bind(&instance.template)
                .bind(&instance.subdomain)
                .bind(i32::from(instance.port))
                .bind(instance.status.as_str())
                .bind(&instance.cpu_limit)
                .bind(&instance.memory_limit)
                .bind(&instance.data_path)
                .bind(&instance.container_id)
                .bind(&instance.proxy_site_id)
                .bind(now)
                .execute(&mut **tx)
                .await?;
            }
            Transaction::Sqlite(tx) => {
                sqlx::query(
                    r#"
                    INSERT INTO instances (
                        identifier, name, template, subdomain, port, status,
                        cpu_limit, memory_limit, data_path, container_id, proxy_site_id,
                        created_at, updated_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)
                    "#,
                )
                .bind(&instance.identifier)
                .bind(&instance.name)
                .bind(&instance.template)
                .bind(&instance.subdomain)
                .bind(i32::from(instance.port))
                .bind(instance.status.as_str())
                .bind(&instance.cpu_limit)
                .bind(&instance.memory_limit)
                .bind(&instance.data_path)
                .bind(&instance.container_id)
                .bind(&instance.proxy_site_id)
                .bind(now)
                .execute(&mut **tx)
                .await?;
            }
        }
        Ok(())
    }

    pub async fn find_live(&self, identifier: &str) -> DatabaseResult<Option<DbInstance>> {
        let instance = match &*self.db.pool() {
            DatabasePool::Postgres(pool) => {
                sqlx::query_as::<_, DbInstance>(
                    "SELECT * FROM instances WHERE identifier = $1 AND status <> 'deleted'",
                )
                .bind(identifier)
                .fetch_optional(pool)
                .await?
            }
            DatabasePool::Sqlite(pool) => {
                sqlx::query_as::<_, DbInstance>(
                    "SELECT * FROM instances WHERE identifier = ?1 AND status <> 'deleted'",
                )
                .bind(identifier)
                .fetch_optional(pool)
                .await?
            }
        };
        Ok(instance)
    }

    /// Live rows matching `filter`, newest first.
    pub async fn list_live(&self, filter: &InstanceFilter) -> DatabaseResult<Vec<DbInstance>> {
        let instances = match &*self.db.pool() {
            DatabasePool::Postgres(pool) => {
                let mut query = QueryBuilder::<sqlx::Postgres>::new(
                    "SELECT * FROM instances WHERE status <> 'deleted'",
                );
                if let Some(name) = &filter.instance_name {
                    query.push(" AND name = ").push_bind(name);
                }
                if let Some(template) = &filter.template_name {
                    query.push(" AND template = ").push_bind(template);
                }
                if let Some(status) = filter.status {
                    query.push(" AND status = ").push_bind(status.as_str());
                }
                query.push(" ORDER BY created_at DESC, id DESC");
                query.build_query_as::<DbInstance>().fetch_all(pool).await?
            }
            DatabasePool::Sqlite(pool) => {
                let mut query = QueryBuilder::<sqlx::Sqlite>::new(
                    "SELECT * FROM instances WHERE status <> 'deleted'",
                );
                if let Some(name) = &filter.instance_name {
                    query.push(" AND name = ").push_bind(name);
                }
                if let Some(template) = &filter.template_name {
                    query.push(" AND template = ").push_bind(template);
                }
                if let Some(status) = filter.status {
                    query.push(" AND status = ").push_bind(status.as_str());
                }
                query.push(" ORDER BY created_at DESC, id DESC");
                query.build_query_as::<DbInstance>().fetch_all(pool).await?
            }
        };
        Ok(instances)
    }

    /// Set the status of a live row. A `container_id` of `None` keeps the
    /// stored one.
    pub async fn update_status(
        &self,
        identifier: &str,
        status: InstanceStatus,
        container_id: Option<&str>,
    ) -> DatabaseResult<()> {
        let now = Utc::now();
        let affected = match &*self.db.pool() {
            DatabasePool::Postgres(pool) => {
                sqlx::query(
                    r#"
                    UPDATE instances
                    SET status = $1, container_id = COALESCE($2, container_id), updated_at = $3
                    WHERE identifier = $4 AND status <> 'deleted'
                    "#,
                )
                .bind(status.as_str())
                .bind(container_id)
                .bind(now)
                .bind(identifier)
                .execute(pool)
                .await?
                .rows_affected()
            }
            DatabasePool::Sqlite(pool) => {
                sqlx::query(
                    r#"
                    UPDATE instances
                    SET status = ?1, container_id = COALESCE(?2, container_id), updated_at = ?3
                    WHERE identifier = ?4 AND status <> 'deleted'
                    "#,
                )
                .bind(status.as_str())
                .bind(container_id)
                .bind(now)
                .bind(identifier)
                .execute(pool)
                .await?
                .rows_affected()
            }
        };

        if affected == 0 {
            return Err(DatabaseError::NotFound);
        }
        Ok(())
    }

    pub async fn update_proxy_site(&self, identifier: &str, site_id: &str) -> DatabaseResult<()> {
        let now = Utc::now();
        let affected = match &*self.db.pool() {
            DatabasePool::Postgres(pool) => {
                sqlx::query(
                    "UPDATE instances SET proxy_site_id = $1, updated_at = $2 WHERE identifier = $3 AND status <> 'deleted'",
                )
                .bind(site_id)
                .bind(now)
                .bind(identifier)
                .execute(pool)
                .await?
                .rows_affected()
            }
            DatabasePool::Sqlite(pool) => {
                sqlx::query(
                    "UPDATE instances SET proxy_site_id = ?1, updated_at = ?2 WHERE identifier = ?3 AND status <> 'deleted'",
                )
                .bind(site_id)
                .bind(now)
                .bind(identifier)
                .execute(pool)
                .await?
                .rows_affected()
            }
        };

        if affected == 0 {
            return Err(DatabaseError::NotFound);
        }
        Ok(())
    }

    /// Soft-delete the live row for `identifier` inside `tx`.
    pub async fn mark_deleted_in(tx: &mut Transaction, identifier: &str) -> DatabaseResult<()> {
        let now = Utc::now();
        let affected = match tx {
            Transaction::Postgres(tx) => {
                sqlx::query(
                    "UPDATE instances SET status = 'deleted', updated_at = $1 WHERE identifier = $2 AND status <> 'deleted'",
                )
                .bind(now)
                .bind(identifier)
                .execute(&mut **tx)
                .await?
                .rows_affected()
            }
            Transaction::Sqlite(tx) => {
                sqlx::query(
                    "UPDATE instances SET status = 'deleted', updated_at = ?1 WHERE identifier = ?2 AND status <> 'deleted'",
                )
                .bind(now)
                .bind(identifier)
                .execute(&mut **tx)
                .await?
                .rows_affected()
            }
        };

        if affected == 0 {
            return Err(DatabaseError::NotFound);
        }
        Ok(())
    }
}
