use thiserror::Error;

/// Errors that can occur when interacting with the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A uniqueness rule could not be satisfied inside the transaction.
    #[error("Conflicting write: {0}")]
    Conflict(String),

    /// A stored value could not be represented in the domain model.
    #[error("Decode error: {0}")]
    Decode(String),

    /// A failure injected into the in-memory store.
    #[error("Injected failure at {0}")]
    InjectedFault(&'static str),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
