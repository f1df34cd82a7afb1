//! Domain models for clinic records and stock.

use crate::domain::month::MonthKey;
use serde::{Deserialize, Serialize};

/// A quantity of one medicine sharing a single expiry date.
///
/// The expiry is kept in its stored string form; matching is done on the
/// parsed calendar date. A batch that reaches zero stays in the list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    pub expiry_date: String,
    pub quantity: i64,
}

/// Stock record for one medicine, partitioned into expiry batches.
///
/// Invariant: `total_quantity` equals the sum of all batch quantities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub medicine_id: String,
    pub medicine_formulation: String,
    pub total_quantity: i64,
    pub batches: Vec<Batch>,
}

impl InventoryItem {
    /// Check the stock invariant; every mutation must preserve this.
    pub fn totals_consistent(&self) -> bool {
        self.total_quantity == self.batches.iter().map(|b| b.quantity).sum::<i64>()
    }
}

/// Whether a visit is the patient's first ever.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VisitStatus {
    New,
    Old,
}

impl VisitStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VisitStatus::New => "new",
            VisitStatus::Old => "old",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "new" => Some(VisitStatus::New),
            "old" => Some(VisitStatus::Old),
            _ => None,
        }
    }
}

/// One patient interaction record scoped to a calendar month.
#[derive(Debug, Clone, PartialEq)]
pub struct VisitRecord {
    pub book_no: i64,
    pub month: MonthKey,
    pub doctor_id: Option<String>,
    pub counselling: bool,
    pub status: VisitStatus,
}

/// One prescription entry on a visit; `id` supports targeted edit/delete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrescribedLine {
    pub id: String,
    pub medicine_id: String,
    pub quantity: i64,
}

impl PrescribedLine {
    /// Generate a fresh entry id.
    pub fn generate_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

/// One dispensed line as recorded on the visit. The quantity is what was
/// handed out in a single pickup, not a running total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GivenLine {
    pub medicine_id: String,
    pub quantity: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Patient {
    pub book_no: i64,
    pub patient_name: String,
    pub patient_age: Option<i64>,
    pub patient_sex: Option<String>,
    pub patient_phone_no: Option<String>,
    pub patient_area: Option<String>,
}

/// A daily queue token.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenSlip {
    pub token_number: i64,
    pub book_no: i64,
    pub gender: String,
    pub already_exists: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_totals_consistent() {
        let item = InventoryItem {
            medicine_id: "M1".to_string(),
            medicine_formulation: "Tablet".to_string(),
            total_quantity: 9,
            batches: vec![
                Batch { expiry_date: "2024-12-01".to_string(), quantity: 6 },
                Batch { expiry_date: "2025-03-01".to_string(), quantity: 3 },
            ],
        };
        assert!(item.totals_consistent());

        let broken = InventoryItem { total_quantity: 10, ..item };
        assert!(!broken.totals_consistent());
    }

    #[test]
    fn test_visit_status_round_trip() {
        assert_eq!(VisitStatus::parse("new"), Some(VisitStatus::New));
        assert_eq!(VisitStatus::parse("old"), Some(VisitStatus::Old));
        assert_eq!(VisitStatus::parse("other"), None);
        assert_eq!(VisitStatus::New.as_str(), "new");
    }

    #[test]
    fn test_generated_prescription_ids_are_unique() {
        let a = PrescribedLine::generate_id();
        let b = PrescribedLine::generate_id();
        assert_ne!(a, b);
    }
}
