use thiserror::Error;

/// Error taxonomy shared by every domain service.
///
/// `InsufficientStock` is an aggregate: it carries one line per failing
/// item so the caller can correct the whole submission at once.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Not enough stock for the following medicines")]
    InsufficientStock(Vec<String>),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

pub type DomainResult<T> = Result<T, DomainError>;

impl DomainError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_stock_message_is_stable() {
        let err = DomainError::InsufficientStock(vec!["M1 (Available: 2, Requested: 5)".to_string()]);
        assert_eq!(err.to_string(), "Not enough stock for the following medicines");
    }

    #[test]
    fn test_storage_error_wraps_sqlx() {
        let err: DomainError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, DomainError::Storage(_)));
    }
}
