use tracing::debug;

use crate::database::{
    models::DbPortEntry, Database, DatabaseError, DatabasePool, DatabaseResult, Transaction,
};

/// Port pool rows
pub struct PortRepository<'a> {
    db: &'a Database,
}

impl<'a> PortRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Insert a row for every port in `start..=end` that is not present yet.
    /// Returns how many rows were added.
    pub async fn seed(&self, start: u16, end: u16) -> DatabaseResult<u64> {
        let mut inserted = 0;
        match self.db.begin_transaction().await? {
            Transaction::Postgres(mut tx) => {
                for port in start..=end {
                    inserted += sqlx::query(
                        "INSERT INTO port_pool (port, available) VALUES ($1, TRUE) ON CONFLICT (port) DO NOTHING",
                    )
                    .bind(i32::from(port))
                    .execute(&mut *tx)
                    .await?
                    .rows_affected();
                }
                Transaction::Postgres(tx).commit().await?;
            }
            Transaction::Sqlite(mut tx) => {
                for port in start..=end {
                    inserted += sqlx::query("INSERT OR IGNORE INTO port_pool (port, available) VALUES (?1, 1)")
                        .bind(i32::from(port))
                        .execute(&mut *tx)
                        .await?
                        .rows_affected();
                }
                Transaction::Sqlite(tx).commit().await?;
            }
        }
        Ok(inserted)
    }

    /// Atomically take the lowest available port for `owner`.
    ///
    /// Selection and the availability flip are a single conditional update,
    /// so concurrent callers (in this process or another) never receive the
    /// same port. `None` means the pool is exhausted.
    pub async fn claim_lowest(&self, owner: &str) -> DatabaseResult<Option<u16>> {
        let port: Option<i32> = match &*self.db.pool() {
            DatabasePool::Postgres(pool) => {
                sqlx::query_scalar(
                    r#"
                    UPDATE port_pool SET available = FALSE, instance_id = $1
                    WHERE port = (
                        SELECT port FROM port_pool
                        WHERE available = TRUE
                        ORDER BY port
                        LIMIT 1
                        FOR UPDATE SKIP LOCKED
                    )
                    RETURNING port
                    "#,
                )
                .bind(owner)
                .fetch_optional(pool)
                .await?
            }
            DatabasePool::Sqlite(pool) => {
                sqlx::query_scalar(
                    r#"
                    UPDATE port_pool SET available = 0, instance_id = ?1
                    WHERE available = 1 AND port = (
                        SELECT port FROM port_pool
                        WHERE available = 1
                        ORDER BY port
                        LIMIT 1
                    )
                    RETURNING port
                    "#,
                )
                .bind(owner)
                .fetch_optional(pool)
                .await?
            }
        };

        port.map(to_port).transpose()
    }

    /// Mark a port free and clear its owner. Releasing a free port, or a
    /// port outside the pool, is a no-op.
    pub async fn release(&self, port: u16) -> DatabaseResult<bool> {
        let affected = match &*self.db.pool() {
            DatabasePool::Postgres(pool) => {
                sqlx::query(
                    "UPDATE port_pool SET available = TRUE, instance_id = NULL WHERE port = $1 AND available = FALSE",
                )
                .bind(i32::from(port))
                .execute(pool)
                .await?
                .rows_affected()
            }
            DatabasePool::Sqlite(pool) => {
                sqlx::query(
                    "UPDATE port_pool SET available = 1, instance_id = NULL WHERE port = ?1 AND available = 0",
                )
                .bind(i32::from(port))
                .execute(pool)
                .await?
                .rows_affected()
            }
        };

        if affected == 0 {
            debug!("Port {} was already free", port);
        }
        Ok(affected > 0)
    }

    /// Transactional variant of [`release`](Self::release).
    pub async fn release_in(tx: &mut Transaction, port: u16) -> DatabaseResult<()> {
        match tx {
            Transaction::Postgres(tx) => {
                sqlx::query("UPDATE port_pool SET available = TRUE, instance_id = NULL WHERE port = $1")
                    .bind(i32::from(port))
                    .execute(&mut **tx)
                    .await?;
            }
            Transaction::Sqlite(tx) => {
                sqlx::query("UPDATE port_pool SET available = 1, instance_id = NULL WHERE port = ?1")
                    .bind(i32::from(port))
                    .execute(&mut **tx)
                    .await?;
            }
        }
        Ok(())
    }

    /// Mark `port` unavailable and owned by `owner` inside `tx`. A port with
    /// no pool row is a query failure, not a missing record.
    pub async fn bind_owner_in(tx: &mut Transaction, port: u16, owner: &str) -> DatabaseResult<()> {
        let affected = match tx {
            Transaction::Postgres(tx) => {
                sqlx::query("UPDATE port_pool SET available = FALSE, instance_id = $1 WHERE port = $2")
                    .bind(owner)
                    .bind(i32::from(port))
                    .execute(&mut **tx)
                    .await?
                    .rows_affected()
            }
            Transaction::Sqlite(tx) => {
                sqlx::query("UPDATE port_pool SET available = 0, instance_id = ?1 WHERE port = ?2")
                    .bind(owner)
                    .bind(i32::from(port))
                    .execute(&mut **tx)
                    .await?
                    .rows_affected()
            }
        };

        if affected == 0 {
            return Err(DatabaseError::Query(format!("port {} is not part of the pool", port)));
        }
        Ok(())
    }

    pub async fn find(&self, port: u16) -> DatabaseResult<Option<DbPortEntry>> {
        let entry = match &*self.db.pool() {
            DatabasePool::Postgres(pool) => {
                sqlx::query_as::<_, DbPortEntry>("SELECT * FROM port_pool WHERE port = $1")
                    .bind(i32::from(port))
                    .fetch_optional(pool)
                    .await?
            }
            DatabasePool::Sqlite(pool) => {
                sqlx::query_as::<_, DbPortEntry>("SELECT * FROM port_pool WHERE port = ?1")
                    .bind(i32::from(port))
                    .fetch_optional(pool)
                    .await?
            }
        };
        Ok(entry)
    }

    /// Free ports in ascending order
    pub async fn list_available(&self) -> DatabaseResult<Vec<u16>> {
        let ports: Vec<i32> = match &*self.db.pool() {
            DatabasePool::Postgres(pool) => {
                sqlx::query_scalar("SELECT port FROM port_pool WHERE available = TRUE ORDER BY port")
                    .fetch_all(pool)
                    .await?
            }
            DatabasePool::Sqlite(pool) => {
                sqlx::query_scalar("SELECT port FROM port_pool WHERE available = 1 ORDER BY port")
                    .fetch_all(pool)
                    .await?
            }
        };

        ports.into_iter().map(to_port).collect()
    }

    pub async fn count(&self) -> DatabaseResult<i64> {
        let total = match &*self.db.pool() {
            DatabasePool::Postgres(pool) => {
                sqlx::query_scalar("SELECT COUNT(*) FROM port_pool").fetch_one(pool).await?
            }
            DatabasePool::Sqlite(pool) => {
                sqlx::query_scalar("SELECT COUNT(*) FROM port_pool").fetch_one(pool).await?
            }
        };
        Ok(total)
    }
}

fn to_port(value: i32) -> DatabaseResult<u16> {
    u16::try_from(value).map_err(|_| DatabaseError::Decode(format!("port {} out of range", value)))
}
