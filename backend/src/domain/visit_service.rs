//! Visit record store: per-patient, per-calendar-month visit entries
//! with their prescribed and given medicine lists.

use crate::db::DbConnection;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{GivenLine, PrescribedLine, VisitRecord, VisitStatus};
use crate::domain::month::MonthKey;
use sqlx::Row;
use tracing::info;

#[derive(Clone)]
pub struct VisitService {
    db: DbConnection,
}

impl VisitService {
    pub fn new(db: DbConnection) -> Self {
        Self { db }
    }

    /// Look up one visit by its composite key.
    pub async fn get_visit(&self, book_no: i64, month: MonthKey) -> DomainResult<Option<VisitRecord>> {
        let row = sqlx::query(
            "SELECT doctor_id, counselling, status FROM visits WHERE book_no = ? AND month = ?",
        )
        .bind(book_no)
        .bind(month.to_string())
        .fetch_optional(self.db.pool())
        .await?;

        Ok(row.map(|r| {
            let status: String = r.get("status");
            VisitRecord {
                book_no,
                month,
                doctor_id: r.get("doctor_id"),
                counselling: r.get::<i64, _>("counselling") != 0,
                status: VisitStatus::parse(&status).unwrap_or(VisitStatus::Old),
            }
        }))
    }

    /// Resolve the visit for the given month or fail with `NotFound`.
    pub async fn require_visit(&self, book_no: i64, month: MonthKey) -> DomainResult<VisitRecord> {
        self.get_visit(book_no, month).await?.ok_or_else(|| {
            DomainError::not_found(format!(
                "No visit recorded for book number {} in {}",
                book_no, month
            ))
        })
    }

    /// Open the current-month visit with an assigned doctor. The status
    /// is "new" only for a patient's first-ever visit.
    pub async fn add_visit(&self, book_no: i64, doctor_id: &str) -> DomainResult<VisitRecord> {
        if doctor_id.trim().is_empty() {
            return Err(DomainError::validation("Doctor ID is required"));
        }
        self.require_patient(book_no).await?;

        let month = MonthKey::current();
        if self.get_visit(book_no, month).await?.is_some() {
            return Err(DomainError::validation(format!(
                "A visit for {} already exists this month",
                book_no
            )));
        }

        let status = self.next_visit_status(book_no).await?;
        sqlx::query("INSERT INTO visits (book_no, month, doctor_id, counselling, status) VALUES (?, ?, ?, 0, ?)")
            .bind(book_no)
            .bind(month.to_string())
            .bind(doctor_id)
            .bind(status.as_str())
            .execute(self.db.pool())
            .await?;

        let record = VisitRecord {
            book_no,
            month,
            doctor_id: Some(doctor_id.to_string()),
            counselling: false,
            status,
        };
        info!(
            "Opened {} visit for book number {} in {}",
            record.status.as_str(),
            record.book_no,
            record.month
        );
        Ok(record)
    }

    /// Record the current-month visit if it is missing, without assigning
    /// a doctor. Used by patient registration. Returns true when a new
    /// visit row was created.
    pub async fn ensure_current_visit(&self, book_no: i64) -> DomainResult<bool> {
        let month = MonthKey::current();
        if self.get_visit(book_no, month).await?.is_some() {
            return Ok(false);
        }
        let status = self.next_visit_status(book_no).await?;
        sqlx::query("INSERT INTO visits (book_no, month, counselling, status) VALUES (?, ?, 0, ?)")
            .bind(book_no)
            .bind(month.to_string())
            .bind(status.as_str())
            .execute(self.db.pool())
            .await?;
        Ok(true)
    }

    /// Mark counselling done on the current-month visit.
    pub async fn set_counselling(&self, book_no: i64) -> DomainResult<()> {
        let month = MonthKey::current();
        let updated = sqlx::query("UPDATE visits SET counselling = 1 WHERE book_no = ? AND month = ?")
            .bind(book_no)
            .bind(month.to_string())
            .execute(self.db.pool())
            .await?;
        if updated.rows_affected() == 0 {
            return Err(DomainError::not_found(
                "Patient history or current month visit not found for this book number",
            ));
        }
        Ok(())
    }

    /// Append prescription entries to the current-month visit. The visit
    /// must exist and have a doctor assigned.
    pub async fn append_prescriptions(
        &self,
        book_no: i64,
        entries: &[(String, i64)],
    ) -> DomainResult<Vec<PrescribedLine>> {
        if entries.is_empty() {
            return Err(DomainError::validation("No prescriptions provided"));
        }
        for (medicine_id, quantity) in entries {
            if medicine_id.trim().is_empty() {
                return Err(DomainError::validation("Medicine ID is required"));
            }
            if *quantity <= 0 {
                return Err(DomainError::validation(format!(
                    "Invalid quantity {} for medicine {}",
                    quantity, medicine_id
                )));
            }
        }

        let month = MonthKey::current();
        let visit = self.require_visit(book_no, month).await?;
        if visit.doctor_id.is_none() {
            return Err(DomainError::validation("Doctor not assigned"));
        }

        let mut stored = Vec::with_capacity(entries.len());
        let mut tx = self.db.pool().begin().await?;
        for (medicine_id, quantity) in entries {
            let line = PrescribedLine {
                id: PrescribedLine::generate_id(),
                medicine_id: medicine_id.clone(),
                quantity: *quantity,
            };
            sqlx::query(
                "INSERT INTO prescribed_medicines (id, book_no, month, medicine_id, quantity) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&line.id)
            .bind(book_no)
            .bind(month.to_string())
            .bind(&line.medicine_id)
            .bind(line.quantity)
            .execute(&mut *tx)
            .await?;
            stored.push(line);
        }
        tx.commit().await?;

        info!("Added {} prescription(s) for book number {}", stored.len(), book_no);
        Ok(stored)
    }

    /// Prescribed entries for one visit, in insertion order.
    pub async fn list_prescribed(&self, book_no: i64, month: MonthKey) -> DomainResult<Vec<PrescribedLine>> {
        let rows = sqlx::query(
            "SELECT id, medicine_id, quantity FROM prescribed_medicines \
             WHERE book_no = ? AND month = ? ORDER BY rowid",
        )
        .bind(book_no)
        .bind(month.to_string())
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| PrescribedLine {
                id: r.get("id"),
                medicine_id: r.get("medicine_id"),
                quantity: r.get("quantity"),
            })
            .collect())
    }

    /// Given entries for one visit, in dispensing order.
    pub async fn list_given(&self, book_no: i64, month: MonthKey) -> DomainResult<Vec<GivenLine>> {
        let rows = sqlx::query(
            "SELECT medicine_id, quantity FROM given_medicines \
             WHERE book_no = ? AND month = ? ORDER BY seq",
        )
        .bind(book_no)
        .bind(month.to_string())
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| GivenLine {
                medicine_id: r.get("medicine_id"),
                quantity: r.get("quantity"),
            })
            .collect())
    }

    /// Update a single prescription entry's quantity in place.
    pub async fn update_prescribed_quantity(
        &self,
        book_no: i64,
        entry_id: &str,
        new_quantity: i64,
    ) -> DomainResult<()> {
        if new_quantity < 0 {
            return Err(DomainError::validation("Invalid quantity provided"));
        }
        let month = MonthKey::current();
        let updated = sqlx::query(
            "UPDATE prescribed_medicines SET quantity = ?4 \
             WHERE id = ?1 AND book_no = ?2 AND month = ?3",
        )
        .bind(entry_id)
        .bind(book_no)
        .bind(month.to_string())
        .bind(new_quantity)
        .execute(self.db.pool())
        .await?;

        if updated.rows_affected() == 0 {
            return Err(DomainError::not_found("Patient history, visit, or medicine not found"));
        }
        Ok(())
    }

    /// Remove a prescription entry from the current month's visit.
    pub async fn delete_prescribed(&self, book_no: i64, entry_id: &str) -> DomainResult<()> {
        let month = MonthKey::current();
        let deleted = sqlx::query(
            "DELETE FROM prescribed_medicines WHERE id = ?1 AND book_no = ?2 AND month = ?3",
        )
        .bind(entry_id)
        .bind(book_no)
        .bind(month.to_string())
        .execute(self.db.pool())
        .await?;

        if deleted.rows_affected() == 0 {
            return Err(DomainError::not_found("Patient history, visit, or medicine not found"));
        }
        Ok(())
    }

    /// Append given rows inside an existing transaction; used by the
    /// dispensing processor so the visit update and inventory decrements
    /// commit together.
    pub(crate) async fn append_given_in_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        book_no: i64,
        month: MonthKey,
        lines: &[GivenLine],
    ) -> DomainResult<()> {
        for line in lines {
            sqlx::query(
                "INSERT INTO given_medicines (book_no, month, medicine_id, quantity) VALUES (?, ?, ?, ?)",
            )
            .bind(book_no)
            .bind(month.to_string())
            .bind(&line.medicine_id)
            .bind(line.quantity)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
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

    async fn next_visit_status(&self, book_no: i64) -> DomainResult<VisitStatus> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM visits WHERE book_no = ?")
            .bind(book_no)
            .fetch_one(self.db.pool())
            .await?;
        let n: i64 = row.get("n");
        Ok(if n == 0 { VisitStatus::New } else { VisitStatus::Old })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{seed_patient, seed_visit, test_db};

    #[tokio::test]
    async fn test_add_visit_requires_patient() {
        let db = test_db().await;
        let service = VisitService::new(db);

        let err = service.add_visit(1, "D1").await.unwrap_err();
        assert!(matches!(err, DomainError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_first_visit_is_new_then_old() {
        let db = test_db().await;
        seed_patient(&db, 1, "Asha").await;
        let service = VisitService::new(db.clone());

        let visit = service.add_visit(1, "D1").await.unwrap();
        assert_eq!(visit.status, VisitStatus::New);

        // A past-month visit makes the next one "old".
        seed_patient(&db, 2, "Ravi").await;
        seed_visit(&db, 2, "2020-01", Some("D1")).await;
        let visit = service.add_visit(2, "D1").await.unwrap();
        assert_eq!(visit.status, VisitStatus::Old);
    }

    #[tokio::test]
    async fn test_duplicate_current_month_visit_rejected() {
        let db = test_db().await;
        seed_patient(&db, 1, "Asha").await;
        let service = VisitService::new(db);

        service.add_visit(1, "D1").await.unwrap();
        let err = service.add_visit(1, "D1").await.unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[tokio::test]
    async fn test_append_prescriptions_requires_doctor() {
        let db = test_db().await;
        seed_patient(&db, 1, "Asha").await;
        seed_visit(&db, 1, &MonthKey::current().to_string(), None).await;
        let service = VisitService::new(db);

        let err = service
            .append_prescriptions(1, &[("M1".to_string(), 5)])
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(ref m) if m == "Doctor not assigned"));
    }

    #[tokio::test]
    async fn test_append_and_list_prescriptions() {
        let db = test_db().await;
        seed_patient(&db, 1, "Asha").await;
        seed_visit(&db, 1, &MonthKey::current().to_string(), Some("D1")).await;
        let service = VisitService::new(db);

        service
            .append_prescriptions(1, &[("M1".to_string(), 5), ("M2".to_string(), 3)])
            .await
            .unwrap();

        let listed = service.list_prescribed(1, MonthKey::current()).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].medicine_id, "M1");
        assert_eq!(listed[1].medicine_id, "M2");
        assert_ne!(listed[0].id, listed[1].id);
    }

    #[tokio::test]
    async fn test_append_prescriptions_rejects_bad_quantity() {
        let db = test_db().await;
        seed_patient(&db, 1, "Asha").await;
        seed_visit(&db, 1, &MonthKey::current().to_string(), Some("D1")).await;
        let service = VisitService::new(db);

        let err = service
            .append_prescriptions(1, &[("M1".to_string(), 0)])
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[tokio::test]
    async fn test_update_prescribed_quantity_in_place() {
        let db = test_db().await;
        seed_patient(&db, 1, "Asha").await;
        seed_visit(&db, 1, &MonthKey::current().to_string(), Some("D1")).await;
        let service = VisitService::new(db);

        let stored = service
            .append_prescriptions(1, &[("M1".to_string(), 5)])
            .await
            .unwrap();

        service
            .update_prescribed_quantity(1, &stored[0].id, 2)
            .await
            .unwrap();

        let listed = service.list_prescribed(1, MonthKey::current()).await.unwrap();
        assert_eq!(listed[0].quantity, 2);

        // Editing prescriptions never touches the given list.
        let given = service.list_given(1, MonthKey::current()).await.unwrap();
        assert!(given.is_empty());
    }

    #[tokio::test]
    async fn test_update_unknown_entry_is_not_found() {
        let db = test_db().await;
        seed_patient(&db, 1, "Asha").await;
        seed_visit(&db, 1, &MonthKey::current().to_string(), Some("D1")).await;
        let service = VisitService::new(db);

        let err = service
            .update_prescribed_quantity(1, "missing-entry", 2)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_update_rejects_negative_quantity() {
        let db = test_db().await;
        let service = VisitService::new(db);

        let err = service
            .update_prescribed_quantity(1, "any", -1)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[tokio::test]
    async fn test_delete_prescribed_entry() {
        let db = test_db().await;
        seed_patient(&db, 1, "Asha").await;
        seed_visit(&db, 1, &MonthKey::current().to_string(), Some("D1")).await;
        let service = VisitService::new(db);

        let stored = service
            .append_prescriptions(1, &[("M1".to_string(), 5), ("M2".to_string(), 3)])
            .await
            .unwrap();

        service.delete_prescribed(1, &stored[0].id).await.unwrap();

        let listed = service.list_prescribed(1, MonthKey::current()).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].medicine_id, "M2");

        let err = service.delete_prescribed(1, &stored[0].id).await.unwrap_err();
        assert!(matches!(err, DomainError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_set_counselling_flags_current_visit() {
        let db = test_db().await;
        seed_patient(&db, 1, "Asha").await;
        seed_visit(&db, 1, &MonthKey::current().to_string(), Some("D1")).await;
        let service = VisitService::new(db);

        service.set_counselling(1).await.unwrap();
        let visit = service.require_visit(1, MonthKey::current()).await.unwrap();
        assert!(visit.counselling);

        let err = service.set_counselling(99).await.unwrap_err();
        assert!(matches!(err, DomainError::NotFound(_)));
    }
}
