//! Medicine pickup: the reconciliation worksheet and the dispensing
//! transaction processor.

use crate::db::DbConnection;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::inventory_service::InventoryService;
use crate::domain::models::{Batch, GivenLine, PrescribedLine};
use crate::domain::month::{parse_expiry_date, MonthKey};
use crate::domain::visit_service::VisitService;
use chrono::NaiveDate;
use std::collections::HashMap;
use tracing::info;

/// One worksheet line: a still-unpicked prescribed medicine joined with
/// its available inventory batches.
#[derive(Debug, Clone, PartialEq)]
pub struct WorksheetEntry {
    pub line: PrescribedLine,
    pub medicine_formulation: String,
    pub batches: Vec<Batch>,
}

/// One line item of a dispensing submission.
#[derive(Debug, Clone, PartialEq)]
pub struct DispenseLine {
    pub medicine_id: String,
    pub expiry_date: String,
    pub quantity: i64,
}

/// Stock movement confirmation for one dispensed line.
#[derive(Debug, Clone, PartialEq)]
pub struct DispensedQuantity {
    pub medicine_id: String,
    pub before_quantity: i64,
    pub after_quantity: i64,
    pub picked_up_quantity: i64,
}

/// Quantity still owed for one prescribed entry given what has already
/// been handed out.
///
/// The worksheet itself excludes a medicine as soon as *any* amount was
/// given; this function is the swap point if that policy ever changes to
/// partial-fulfillment tracking.
pub fn remaining_quantity(prescribed: &PrescribedLine, given: &[GivenLine]) -> i64 {
    let taken: i64 = given
        .iter()
        .filter(|g| g.medicine_id == prescribed.medicine_id)
        .map(|g| g.quantity)
        .sum();
    (prescribed.quantity - taken).max(0)
}

#[derive(Clone)]
pub struct PickupService {
    db: DbConnection,
    inventory: InventoryService,
    visits: VisitService,
}

impl PickupService {
    pub fn new(db: DbConnection, inventory: InventoryService, visits: VisitService) -> Self {
        Self { db, inventory, visits }
    }

    /// Build the pickup worksheet for the current month.
    ///
    /// A medicine is excluded once any given-entry exists for it. A month
    /// with no visit or no prescriptions yields an empty worksheet; only
    /// an unknown patient is an error. No mutation is performed.
    pub async fn pickup_worksheet(&self, book_no: i64) -> DomainResult<Vec<WorksheetEntry>> {
        self.require_patient(book_no).await?;

        let month = MonthKey::current();
        if self.visits.get_visit(book_no, month).await?.is_none() {
            return Ok(Vec::new());
        }

        let prescribed = self.visits.list_prescribed(book_no, month).await?;
        if prescribed.is_empty() {
            return Ok(Vec::new());
        }
        let given = self.visits.list_given(book_no, month).await?;

        let mut worksheet = Vec::new();
        for mut line in prescribed {
            let picked = given.iter().any(|g| g.medicine_id == line.medicine_id);
            if picked {
                continue;
            }
            // For an unpicked medicine nothing has been given yet, so the
            // outstanding amount equals the prescribed one; routing it
            // through remaining_quantity keeps the policy swappable.
            line.quantity = remaining_quantity(&line, &given);
            let entry = match self.inventory.get_item(&line.medicine_id).await {
                Ok(item) => WorksheetEntry {
                    line,
                    medicine_formulation: item.medicine_formulation,
                    batches: item.batches,
                },
                Err(DomainError::NotFound(_)) => WorksheetEntry {
                    line,
                    medicine_formulation: "N/A".to_string(),
                    batches: Vec::new(),
                },
                Err(other) => return Err(other),
            };
            worksheet.push(entry);
        }

        info!(
            "Worksheet for book number {}: {} unpicked medicine(s)",
            book_no,
            worksheet.len()
        );
        Ok(worksheet)
    }

    /// Dispense medicines against the current-month visit.
    ///
    /// Two phases: validate everything against a running-deduction
    /// snapshot (collecting every failing line), then apply all inventory
    /// decrements and the given-record append in one database
    /// transaction. Either every line lands or none do.
    pub async fn dispense(
        &self,
        book_no: i64,
        lines: &[DispenseLine],
    ) -> DomainResult<Vec<DispensedQuantity>> {
        let parsed = self.validate_lines(lines)?;

        let month = MonthKey::current();
        self.visits.require_visit(book_no, month).await?;

        self.check_stock(&parsed).await?;

        // Apply phase: one transaction for every decrement plus the
        // given-record append. The conditional update inside
        // decrement_batch_in_tx re-checks availability at write time, so
        // a concurrent pickup rolls this whole transaction back instead
        // of over-decrementing.
        let mut tx = self.db.pool().begin().await?;
        let mut confirmations = Vec::with_capacity(lines.len());
        for (line, expiry) in &parsed {
            let movement =
                InventoryService::decrement_batch_in_tx(&mut tx, &line.medicine_id, *expiry, line.quantity)
                    .await?;
            confirmations.push(DispensedQuantity {
                medicine_id: line.medicine_id.clone(),
                before_quantity: movement.before_total,
                after_quantity: movement.after_total,
                picked_up_quantity: line.quantity,
            });
        }

        let given: Vec<GivenLine> = parsed
            .iter()
            .map(|(line, _)| GivenLine {
                medicine_id: line.medicine_id.clone(),
                quantity: line.quantity,
            })
            .collect();
        VisitService::append_given_in_tx(&mut tx, book_no, month, &given).await?;
        tx.commit().await?;

        info!(
            "Dispensed {} line(s) for book number {} in {}",
            confirmations.len(),
            book_no,
            month
        );
        Ok(confirmations)
    }

    /// Structural validation: non-empty submission, positive quantities,
    /// parseable expiry dates. Runs before anything is read or written.
    fn validate_lines(&self, lines: &[DispenseLine]) -> DomainResult<Vec<(DispenseLine, NaiveDate)>> {
        if lines.is_empty() {
            return Err(DomainError::validation("No medicines given"));
        }
        let mut parsed = Vec::with_capacity(lines.len());
        for line in lines {
            if line.medicine_id.trim().is_empty() {
                return Err(DomainError::validation("Medicine ID is required"));
            }
            if line.quantity <= 0 {
                return Err(DomainError::validation(format!(
                    "Invalid quantity {} for medicine {}",
                    line.quantity, line.medicine_id
                )));
            }
            let expiry = parse_expiry_date(&line.expiry_date)?;
            parsed.push((line.clone(), expiry));
        }
        Ok(parsed)
    }

    /// Stock validation against a snapshot with running deduction, so
    /// duplicate lines against the same batch are checked cumulatively.
    /// Collects every failure before reporting.
    async fn check_stock(&self, lines: &[(DispenseLine, NaiveDate)]) -> DomainResult<()> {
        let mut items = HashMap::new();
        let mut missing = Vec::new();
        for (line, _) in lines {
            if items.contains_key(&line.medicine_id) || missing.contains(&line.medicine_id) {
                continue;
            }
            match self.inventory.get_item(&line.medicine_id).await {
                Ok(item) => {
                    items.insert(line.medicine_id.clone(), item);
                }
                Err(DomainError::NotFound(_)) => missing.push(line.medicine_id.clone()),
                Err(other) => return Err(other),
            }
        }

        // Snapshot of available quantity per (medicine, expiry date).
        // First batch per calendar date wins, mirroring how the apply
        // phase resolves a batch.
        let mut available: HashMap<(String, NaiveDate), i64> = HashMap::new();
        for item in items.values() {
            for batch in &item.batches {
                if let Ok(date) = parse_expiry_date(&batch.expiry_date) {
                    available
                        .entry((item.medicine_id.clone(), date))
                        .or_insert(batch.quantity);
                }
            }
        }

        let mut failures = Vec::new();
        for (line, expiry) in lines {
            let Some(item) = items.get(&line.medicine_id) else {
                failures.push(format!("Medicine ID: {}", line.medicine_id));
                continue;
            };
            let key = (line.medicine_id.clone(), *expiry);
            let Some(remaining) = available.get_mut(&key) else {
                failures.push(format!("Medicine ID: {} (Batch not found)", line.medicine_id));
                continue;
            };
            if *remaining < line.quantity {
                failures.push(format!(
                    "{} (Available: {}, Requested: {})",
                    item.medicine_formulation, *remaining, line.quantity
                ));
                continue;
            }
            *remaining -= line.quantity;
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(DomainError::InsufficientStock(failures))
        }
    }

    async fn require_patient(&self, book_no: i64) -> DomainResult<()> {
        let exists = sqlx::query("SELECT book_no FROM patients WHERE book_no = ?")
            .bind(book_no)
            .fetch_optional(self.db.pool())
            .await?;
        if exists.is_none() {
            return Err(DomainError::not_found("Patient not found"));
        }
        Ok(())
    }

    /// Invariant check used by tests: every inventory total equals the
    /// sum of its batch quantities.
    #[cfg(test)]
    pub(crate) async fn assert_inventory_consistent(&self) {
        use sqlx::Row;

        let rows = sqlx::query("SELECT medicine_id FROM inventory")
            .fetch_all(self.db.pool())
            .await
            .expect("Failed to list inventory");
        for row in rows {
            let medicine_id: String = row.get("medicine_id");
            let item = self
                .inventory
                .get_item(&medicine_id)
                .await
                .expect("Failed to read inventory item");
            assert!(
                item.totals_consistent(),
                "total_quantity out of sync for {}",
                medicine_id
            );
        }
    }
}
