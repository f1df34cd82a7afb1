//! Patient registry: registration/update, lookup, area autocomplete,
//! and the per-month workflow status summary.

use crate::db::DbConnection;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::Patient;
use crate::domain::month::MonthKey;
use crate::domain::visit_service::VisitService;
use sqlx::Row;
use tracing::info;

/// Outcome of a registration call, for the response message.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistrationOutcome {
    pub created: bool,
    pub new_visit: bool,
}

/// Current-month workflow flags for one patient.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StatusFlags {
    pub doctor_assigned: bool,
    pub medicines_prescribed: bool,
    pub medicines_given: bool,
    pub counselling_done: bool,
}

/// Fields accepted by registration; on update, `None` leaves the stored
/// value untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct RegisterPatient {
    pub book_no: i64,
    pub patient_name: Option<String>,
    pub patient_age: Option<i64>,
    pub patient_sex: Option<String>,
    pub patient_phone_no: Option<String>,
    pub patient_area: Option<String>,
}

#[derive(Clone)]
pub struct PatientService {
    db: DbConnection,
    visits: VisitService,
}

impl PatientService {
    pub fn new(db: DbConnection, visits: VisitService) -> Self {
        Self { db, visits }
    }

    /// Fetch one patient by book number.
    pub async fn get(&self, book_no: i64) -> DomainResult<Patient> {
        let row = sqlx::query(
            "SELECT patient_name, patient_age, patient_sex, patient_phone_no, patient_area \
             FROM patients WHERE book_no = ?",
        )
        .bind(book_no)
        .fetch_optional(self.db.pool())
        .await?
        .ok_or_else(|| DomainError::not_found("Patient not found"))?;

        Ok(Patient {
            book_no,
            patient_name: row.get("patient_name"),
            patient_age: row.get("patient_age"),
            patient_sex: row.get("patient_sex"),
            patient_phone_no: row.get("patient_phone_no"),
            patient_area: row.get("patient_area"),
        })
    }

    /// Register a new patient or update an existing one, recording the
    /// current-month visit either way.
    pub async fn register(&self, input: RegisterPatient) -> DomainResult<RegistrationOutcome> {
        if input.book_no <= 0 {
            return Err(DomainError::validation("Invalid book number"));
        }

        let existing = sqlx::query("SELECT book_no FROM patients WHERE book_no = ?")
            .bind(input.book_no)
            .fetch_optional(self.db.pool())
            .await?;

        let created = existing.is_none();
        if created {
            let name = input
                .patient_name
                .as_deref()
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .ok_or_else(|| DomainError::validation("Patient name is required"))?;

            sqlx::query(
                "INSERT INTO patients (book_no, patient_name, patient_age, patient_sex, patient_phone_no, patient_area) \
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(input.book_no)
            .bind(name)
            .bind(input.patient_age)
            .bind(&input.patient_sex)
            .bind(&input.patient_phone_no)
            .bind(&input.patient_area)
            .execute(self.db.pool())
            .await?;
            info!("Registered new patient with book number {}", input.book_no);
        } else {
            // Only provided fields overwrite the stored record.
            sqlx::query(
                "UPDATE patients SET \
                 patient_name = COALESCE(?2, patient_name), \
                 patient_age = COALESCE(?3, patient_age), \
                 patient_sex = COALESCE(?4, patient_sex), \
                 patient_phone_no = COALESCE(?5, patient_phone_no), \
                 patient_area = COALESCE(?6, patient_area) \
                 WHERE book_no = ?1",
            )
            .bind(input.book_no)
            .bind(&input.patient_name)
            .bind(input.patient_age)
            .bind(&input.patient_sex)
            .bind(&input.patient_phone_no)
            .bind(&input.patient_area)
            .execute(self.db.pool())
            .await?;
            info!("Updated patient with book number {}", input.book_no);
        }

        let new_visit = self.visits.ensure_current_visit(input.book_no).await?;
        Ok(RegistrationOutcome { created, new_visit })
    }

    /// Distinct patient areas matching a case-insensitive substring.
    /// Queries shorter than three characters return nothing; results are
    /// alphabetical and capped at ten.
    pub async fn areas(&self, query: &str) -> DomainResult<Vec<String>> {
        let query = query.trim();
        if query.len() < 3 {
            return Ok(Vec::new());
        }

        let pattern = format!("%{}%", query);
        let rows = sqlx::query(
            "SELECT DISTINCT patient_area FROM patients \
             WHERE patient_area IS NOT NULL AND patient_area != '' \
             AND patient_area LIKE ?1 COLLATE NOCASE \
             ORDER BY patient_area LIMIT 10",
        )
        .bind(pattern)
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows.into_iter().map(|r| r.get("patient_area")).collect())
    }

    /// Workflow flags for the current month. A patient without a visit
    /// this month reports all flags false rather than an error.
    pub async fn status(&self, book_no: i64) -> DomainResult<StatusFlags> {
        let month = MonthKey::current();
        let Some(visit) = self.visits.get_visit(book_no, month).await? else {
            return Ok(StatusFlags::default());
        };

        let prescribed = self.visits.list_prescribed(book_no, month).await?;
        let given = self.visits.list_given(book_no, month).await?;

        Ok(StatusFlags {
            doctor_assigned: visit.doctor_id.is_some(),
            medicines_prescribed: !prescribed.is_empty(),
            medicines_given: !given.is_empty(),
            counselling_done: visit.counselling,
        })
    }
}
