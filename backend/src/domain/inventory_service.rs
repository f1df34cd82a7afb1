//! Inventory ledger: per-medicine stock partitioned into expiry batches.

use crate::db::DbConnection;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Batch, InventoryItem};
use crate::domain::month::parse_expiry_date;
use chrono::NaiveDate;
use sqlx::{Row, Sqlite, Transaction};
use tracing::info;

/// Before/after stock totals for one decrement.
#[derive(Debug, Clone, PartialEq)]
pub struct StockMovement {
    pub before_total: i64,
    pub after_total: i64,
}

#[derive(Clone)]
pub struct InventoryService {
    db: DbConnection,
}

impl InventoryService {
    pub fn new(db: DbConnection) -> Self {
        Self { db }
    }

    /// Read one medicine's stock record with its batches.
    pub async fn get_item(&self, medicine_id: &str) -> DomainResult<InventoryItem> {
        let row = sqlx::query(
            "SELECT medicine_formulation, total_quantity FROM inventory WHERE medicine_id = ?",
        )
        .bind(medicine_id)
        .fetch_optional(self.db.pool())
        .await?
        .ok_or_else(|| DomainError::not_found("Medicine not found"))?;

        let batches = sqlx::query(
            "SELECT expiry_date, quantity FROM inventory_batches WHERE medicine_id = ? ORDER BY expiry_date",
        )
        .bind(medicine_id)
        .fetch_all(self.db.pool())
        .await?
        .into_iter()
        .map(|r| Batch {
            expiry_date: r.get("expiry_date"),
            quantity: r.get("quantity"),
        })
        .collect();

        let item = InventoryItem {
            medicine_id: medicine_id.to_string(),
            medicine_formulation: row.get("medicine_formulation"),
            total_quantity: row.get("total_quantity"),
            batches,
        };
        debug_assert!(item.totals_consistent(), "stock totals out of sync for {}", medicine_id);
        Ok(item)
    }

    /// Current batches for one medicine.
    pub async fn get_batches(&self, medicine_id: &str) -> DomainResult<Vec<Batch>> {
        Ok(self.get_item(medicine_id).await?.batches)
    }

    /// Decrement one batch, located by calendar-date equality on its
    /// expiry. The `quantity >= amount` check is enforced at the moment
    /// of write; batch quantity and the item total move together in one
    /// transaction.
    pub async fn decrement_batch(
        &self,
        medicine_id: &str,
        expiry_date: NaiveDate,
        amount: i64,
    ) -> DomainResult<StockMovement> {
        let mut tx = self.db.pool().begin().await?;
        let movement = Self::decrement_batch_in_tx(&mut tx, medicine_id, expiry_date, amount).await?;
        tx.commit().await?;
        info!(
            "Decremented {} of {} ({} -> {})",
            amount, medicine_id, movement.before_total, movement.after_total
        );
        Ok(movement)
    }

    /// Transaction-scoped decrement, shared with the dispensing processor
    /// so a multi-line pickup applies atomically as a whole.
    pub(crate) async fn decrement_batch_in_tx(
        tx: &mut Transaction<'_, Sqlite>,
        medicine_id: &str,
        expiry_date: NaiveDate,
        amount: i64,
    ) -> DomainResult<StockMovement> {
        if amount <= 0 {
            return Err(DomainError::validation(format!(
                "Invalid quantity {} for medicine {}",
                amount, medicine_id
            )));
        }

        let before_total: i64 = sqlx::query("SELECT total_quantity FROM inventory WHERE medicine_id = ?")
            .bind(medicine_id)
            .fetch_optional(&mut **tx)
            .await?
            .ok_or_else(|| DomainError::not_found("Medicine not found"))?
            .get("total_quantity");

        let stored = Self::resolve_batch_in_tx(tx, medicine_id, expiry_date).await?
            .ok_or_else(|| {
                DomainError::not_found(format!(
                    "No batch of {} expiring on {}",
                    medicine_id, expiry_date
                ))
            })?;

        // Conditional update: re-checks availability at write time so a
        // concurrent pickup cannot over-decrement the batch.
        let updated = sqlx::query(
            "UPDATE inventory_batches SET quantity = quantity - ?3 \
             WHERE medicine_id = ?1 AND expiry_date = ?2 AND quantity >= ?3",
        )
        .bind(medicine_id)
        .bind(&stored.expiry_date)
        .bind(amount)
        .execute(&mut **tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(DomainError::InsufficientStock(vec![format!(
                "{} (Available: {}, Requested: {})",
                medicine_id, stored.quantity, amount
            )]));
        }

        sqlx::query("UPDATE inventory SET total_quantity = total_quantity - ?2 WHERE medicine_id = ?1")
            .bind(medicine_id)
            .bind(amount)
            .execute(&mut **tx)
            .await?;

        Ok(StockMovement {
            before_total,
            after_total: before_total - amount,
        })
    }

    /// Find the stored batch whose expiry falls on the given calendar
    /// date, regardless of the time-of-day in the stored value.
    pub(crate) async fn resolve_batch_in_tx(
        tx: &mut Transaction<'_, Sqlite>,
        medicine_id: &str,
        expiry_date: NaiveDate,
    ) -> DomainResult<Option<Batch>> {
        let rows = sqlx::query(
            "SELECT expiry_date, quantity FROM inventory_batches WHERE medicine_id = ? ORDER BY expiry_date",
        )
        .bind(medicine_id)
        .fetch_all(&mut **tx)
        .await?;

        for row in rows {
            let stored: String = row.get("expiry_date");
            if parse_expiry_date(&stored).map(|d| d == expiry_date).unwrap_or(false) {
                return Ok(Some(Batch {
                    expiry_date: stored,
                    quantity: row.get("quantity"),
                }));
            }
        }
        Ok(None)
    }
}
