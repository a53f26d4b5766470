use thiserror::Error;

/// Crate-wide error type. Every failure a request can surface falls into one
/// of these buckets; the HTTP layer maps them onto status codes.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("{operation} failed: {cause}")]
    Catalog {
        operation: &'static str,
        #[source]
        cause: sqlx::Error,
    },

    #[error("{0}")]
    Validation(String),

    #[error("statement failed: {0}")]
    Statement(#[from] sqlx::Error),

    #[error("maintenance aborted during {stage} on {object}: {cause}")]
    Planning {
        stage: &'static str,
        object: String,
        #[source]
        cause: sqlx::Error,
    },
}

impl DbError {
    pub fn catalog(operation: &'static str) -> impl FnOnce(sqlx::Error) -> DbError {
        move |cause| DbError::Catalog { operation, cause }
    }

    pub fn validation(message: impl Into<String>) -> DbError {
        DbError::Validation(message.into())
    }
}
