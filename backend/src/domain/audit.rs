//! Audit sink for user actions.

use crate::db::DbConnection;
use chrono::Utc;
use tracing::error;

/// Fire-and-forget audit log. Writes never block the request that
/// triggered them, and a failed write is traced but never surfaces.
#[derive(Clone)]
pub struct AuditLog {
    db: DbConnection,
}

impl AuditLog {
    pub fn new(db: DbConnection) -> Self {
        Self { db }
    }

    /// Record an action for an authenticated user. A missing user id
    /// means an unauthenticated context: the entry is skipped.
    pub fn log_user_action(&self, user_id: Option<&str>, message: impl Into<String>) {
        let Some(user_id) = user_id else {
            return;
        };
        let db = self.db.clone();
        let user_id = user_id.to_string();
        let message = message.into();

        tokio::spawn(async move {
            let result = sqlx::query(
                "INSERT INTO user_actions (user_id, message, created_at) VALUES (?, ?, ?)",
            )
            .bind(&user_id)
            .bind(&message)
            .bind(Utc::now().to_rfc3339())
            .execute(db.pool())
            .await;

            if let Err(e) = result {
                error!("Failed to record user action for {}: {}", user_id, e);
            }
        });
    }
}
