//! Daily queue tokens, numbered per gender and restarting each day.

use crate::db::DbConnection;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::TokenSlip;
use chrono::Local;
use sqlx::Row;
use tracing::info;

#[derive(Clone)]
pub struct TokenService {
    db: DbConnection,
}

impl TokenService {
    pub fn new(db: DbConnection) -> Self {
        Self { db }
    }

    /// Issue today's queue token for a patient. Re-requesting on the
    /// same day returns the original slip instead of a new number.
    pub async fn issue(&self, book_no: i64, gender: &str) -> DomainResult<TokenSlip> {
        if book_no <= 0 {
            return Err(DomainError::validation("Invalid book number"));
        }
        let gender = gender.trim();
        if gender.is_empty() {
            return Err(DomainError::validation("bookNumber and gender are required"));
        }

        let today = Local::now().date_naive().to_string();

        // Existence check, counter read, and insert share one
        // transaction so concurrent requests serialize the numbering.
        let mut tx = self.db.pool().begin().await?;

        let existing = sqlx::query(
            "SELECT token_number, gender FROM daily_tokens WHERE token_date = ? AND book_no = ?",
        )
        .bind(&today)
        .bind(book_no)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(row) = existing {
            tx.commit().await?;
            return Ok(TokenSlip {
                token_number: row.get("token_number"),
                book_no,
                gender: row.get("gender"),
                already_exists: true,
            });
        }

        let row = sqlx::query(
            "SELECT COALESCE(MAX(token_number), 0) AS last FROM daily_tokens \
             WHERE token_date = ? AND gender = ?",
        )
        .bind(&today)
        .bind(gender)
        .fetch_one(&mut *tx)
        .await?;
        let token_number: i64 = row.get::<i64, _>("last") + 1;

        sqlx::query(
            "INSERT INTO daily_tokens (token_date, gender, token_number, book_no) VALUES (?, ?, ?, ?)",
        )
        .bind(&today)
        .bind(gender)
        .bind(token_number)
        .bind(book_no)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        info!("Issued token {} ({}) for book number {}", token_number, gender, book_no);
        Ok(TokenSlip {
            token_number,
            book_no,
            gender: gender.to_string(),
            already_exists: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_db;

    #[tokio::test]
    async fn test_tokens_number_sequentially_per_gender() {
        let db = test_db().await;
        let service = TokenService::new(db);

        let first = service.issue(1, "female").await.unwrap();
        let second = service.issue(2, "female").await.unwrap();
        let other_queue = service.issue(3, "male").await.unwrap();

        assert_eq!(first.token_number, 1);
        assert_eq!(second.token_number, 2);
        // Each gender runs its own counter.
        assert_eq!(other_queue.token_number, 1);
    }

    #[tokio::test]
    async fn test_same_day_reissue_returns_existing_token() {
        let db = test_db().await;
        let service = TokenService::new(db);

        let first = service.issue(1, "female").await.unwrap();
        assert!(!first.already_exists);

        let again = service.issue(1, "female").await.unwrap();
        assert!(again.already_exists);
        assert_eq!(again.token_number, first.token_number);

        // No extra number was consumed.
        let next = service.issue(2, "female").await.unwrap();
        assert_eq!(next.token_number, 2);
    }

    #[tokio::test]
    async fn test_issue_validates_input() {
        let db = test_db().await;
        let service = TokenService::new(db);

        assert!(matches!(
            service.issue(0, "female").await.unwrap_err(),
            DomainError::Validation(_)
        ));
        assert!(matches!(
            service.issue(1, "  ").await.unwrap_err(),
            DomainError::Validation(_)
        ));
    }
}
