//! Catalog: the durable record of templates, instances and the port pool.

pub mod config;
pub mod connection;
pub mod models;
pub mod repositories;

pub use config::{DatabaseConfig, DatabaseType, PoolConfig};
pub use connection::{Database, DatabasePool, Transaction};
pub use repositories::*;

#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Database connection error: {0}")]
    Connection(String),

    #[error("Query execution error: {0}")]
    Query(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Record not found")]
    NotFound,

    #[error("Duplicate record")]
    Duplicate,

    #[error("Invalid stored value: {0}")]
    Decode(String),

    #[error("Database error: {0}")]
    Other(String),
}

impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DatabaseError::NotFound,
            sqlx::Error::Database(db_err) => {
                let message = db_err.message();
                if message.contains("UNIQUE") || message.contains("duplicate") {
                    DatabaseError::Duplicate
                } else {
                    DatabaseError::Query(message.to_string())
                }
            }
            _ => DatabaseError::Other(err.to_string()),
        }
    }
}

pub type DatabaseResult<T> = Result<T, DatabaseError>;
