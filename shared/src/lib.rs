use serde::{Deserialize, Serialize};

/// A patient as returned by the patient lookup endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientView {
    pub book_no: i64,
    pub patient_name: String,
    pub patient_age: Option<i64>,
    pub patient_sex: Option<String>,
    pub patient_phone_no: Option<String>,
    pub patient_area: Option<String>,
}

/// Request for patient registration or update, keyed by book number.
/// On update, only the provided fields overwrite the stored record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterPatientRequest {
    pub book_no: i64,
    pub patient_name: Option<String>,
    pub patient_age: Option<i64>,
    pub patient_sex: Option<String>,
    pub patient_phone_no: Option<String>,
    pub patient_area: Option<String>,
}

/// Response after registering or updating a patient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterPatientResponse {
    pub message: String,
    pub redirect: bool,
}

/// Per-month workflow flags for one patient.
///
/// Field names are camelCase on the wire; the reception dashboard reads
/// them directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientStatusFlags {
    pub doctor_assigned: bool,
    pub medicines_prescribed: bool,
    pub medicines_given: bool,
    pub counselling_done: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientStatusResponse {
    pub book_no: i64,
    pub status: PatientStatusFlags,
}

/// One prescription entry as stored on the current-month visit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrescribedMedicineView {
    pub id: String,
    pub medicine_id: String,
    pub quantity: i64,
}

/// One dispensed line item. Quantity is the amount handed out in a single
/// pickup, not a running total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GivenMedicineView {
    pub medicine_id: String,
    pub quantity: i64,
}

/// Request to append prescriptions to the current-month visit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoctorPrescriptionRequest {
    pub book_no: i64,
    pub prescriptions: Vec<PrescriptionEntryRequest>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrescriptionEntryRequest {
    pub medicine_id: String,
    pub quantity: i64,
}

/// Request to change the quantity of one prescription entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdatePrescriptionRequest {
    pub new_quantity: i64,
}

/// Request to open the current-month visit for a patient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddVisitRequest {
    pub doctor_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddVisitResponse {
    pub message: String,
    pub status: String,
}

/// Request to mark counselling as done for the current-month visit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CounsellingRequest {
    pub book_no: i64,
}

/// One batch row on the pickup worksheet. `quantity_taken` is a
/// suggestion the pharmacist edits before submitting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorksheetBatch {
    pub expiry_date: String,
    pub available_quantity: i64,
    pub quantity_taken: i64,
}

/// One still-unpicked prescribed medicine joined with its available
/// inventory batches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorksheetRow {
    pub id: String,
    pub medicine_id: String,
    pub quantity: i64,
    pub medicine_formulation: String,
    pub batches: Vec<WorksheetBatch>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PickupWorksheetResponse {
    pub medicines_prescribed: Vec<WorksheetRow>,
}

/// One line item of a dispensing submission: a quantity taken from the
/// batch of `medicine_id` expiring on `expiry_date`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GivenMedicineItem {
    pub medicine_id: String,
    pub expiry_date: String,
    pub quantity: i64,
}

/// Dispensing submission for one patient's current-month visit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedicinePickupRequest {
    pub book_no: i64,
    #[serde(rename = "medicinesGiven")]
    pub medicines_given: Vec<GivenMedicineItem>,
}

/// Before/after stock totals for one dispensed medicine, echoed back for
/// the confirmation screen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdatedQuantity {
    pub medicine_id: String,
    pub before_quantity: i64,
    pub after_quantity: i64,
    pub picked_up_quantity: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedicinePickupResponse {
    pub message: String,
    pub updated_quantities: Vec<UpdatedQuantity>,
}

/// Raw prescribed/given lists for the current month, used by the
/// verification screen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedicineVerificationResponse {
    pub medicines_prescribed: Vec<PrescribedMedicineView>,
    pub medicines_given: Vec<GivenMedicineView>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryBatchView {
    pub expiry_date: String,
    pub quantity: i64,
}

/// Stock view for one medicine: formulation, overall total, and the
/// per-expiry batch breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryItemResponse {
    pub medicine_formulation: String,
    pub total_quantity: i64,
    pub details: Vec<InventoryBatchView>,
}

/// Request for a daily queue token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRequest {
    pub book_number: i64,
    pub gender: String,
}

/// Issued queue token. `already_exists` is true when the patient already
/// drew a token today and the original one is returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub token_number: i64,
    pub book_number: i64,
    pub gender: String,
    #[serde(default)]
    pub already_exists: bool,
}

/// Plain message envelope for mutation acknowledgements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Generic error envelope returned by every route on failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub message: String,
}

/// Error envelope for failed dispensing validation, listing every
/// failing line item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsufficientStockResponse {
    pub message: String,
    #[serde(rename = "insufficientStock")]
    pub insufficient_stock: Vec<String>,
}

impl WorksheetRow {
    /// Total quantity currently available across this row's batches.
    pub fn total_available(&self) -> i64 {
        self.batches.iter().map(|b| b.available_quantity).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pickup_request_wire_format() {
        // The pharmacy frontend sends medicinesGiven, not medicines_given.
        let json = r#"{
            "book_no": 42,
            "medicinesGiven": [
                {"medicine_id": "M1", "expiry_date": "2024-12-01", "quantity": 4}
            ]
        }"#;

        let request: MedicinePickupRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.book_no, 42);
        assert_eq!(request.medicines_given.len(), 1);
        assert_eq!(request.medicines_given[0].medicine_id, "M1");

        let serialized = serde_json::to_value(&request).unwrap();
        assert!(serialized.get("medicinesGiven").is_some());
        assert!(serialized.get("medicines_given").is_none());
    }

    #[test]
    fn test_token_wire_format_is_camel_case() {
        let request: TokenRequest =
            serde_json::from_str(r#"{"bookNumber": 7, "gender": "female"}"#).unwrap();
        assert_eq!(request.book_number, 7);

        let response = TokenResponse {
            token_number: 3,
            book_number: 7,
            gender: "female".to_string(),
            already_exists: false,
        };
        let serialized = serde_json::to_value(&response).unwrap();
        assert_eq!(serialized["tokenNumber"], 3);
        assert_eq!(serialized["alreadyExists"], false);
    }

    #[test]
    fn test_status_flags_wire_format_is_camel_case() {
        let flags = PatientStatusFlags {
            doctor_assigned: true,
            medicines_prescribed: false,
            medicines_given: false,
            counselling_done: true,
        };
        let serialized = serde_json::to_value(&flags).unwrap();
        assert_eq!(serialized["doctorAssigned"], true);
        assert_eq!(serialized["counsellingDone"], true);
        assert!(serialized.get("doctor_assigned").is_none());
    }

    #[test]
    fn test_insufficient_stock_envelope() {
        let response = InsufficientStockResponse {
            message: "Not enough stock for the following medicines".to_string(),
            insufficient_stock: vec!["M1 (Available: 2, Requested: 5)".to_string()],
        };
        let serialized = serde_json::to_value(&response).unwrap();
        assert_eq!(serialized["insufficientStock"][0], "M1 (Available: 2, Requested: 5)");
    }

    #[test]
    fn test_worksheet_row_total_available() {
        let row = WorksheetRow {
            id: "p1".to_string(),
            medicine_id: "M1".to_string(),
            quantity: 10,
            medicine_formulation: "Tablet 500mg".to_string(),
            batches: vec![
                WorksheetBatch {
                    expiry_date: "2024-12-01".to_string(),
                    available_quantity: 6,
                    quantity_taken: 0,
                },
                WorksheetBatch {
                    expiry_date: "2025-03-01".to_string(),
                    available_quantity: 3,
                    quantity_taken: 0,
                },
            ],
        };
        assert_eq!(row.total_available(), 9);
    }
}
