//! HTTP layer: application state, handlers, and the API router.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use shared::{
    AddVisitRequest, AddVisitResponse, CounsellingRequest, DoctorPrescriptionRequest, ErrorResponse,
    GivenMedicineView, InsufficientStockResponse, InventoryBatchView, InventoryItemResponse,
    MedicinePickupRequest, MedicinePickupResponse, MedicineVerificationResponse, MessageResponse,
    PatientStatusFlags, PatientStatusResponse, PatientView, PickupWorksheetResponse, PrescribedMedicineView,
    RegisterPatientRequest, RegisterPatientResponse, TokenRequest, TokenResponse, UpdatePrescriptionRequest,
    UpdatedQuantity, WorksheetBatch, WorksheetRow,
};
use tracing::{error, info};

use crate::db::DbConnection;
use crate::domain::patient_service::RegisterPatient;
use crate::domain::pickup_service::DispenseLine;
use crate::domain::{
    AuditLog, DomainError, InventoryService, MonthKey, PatientService, PickupService, TokenService,
    VisitService,
};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub patients: PatientService,
    pub visits: VisitService,
    pub inventory: InventoryService,
    pub pickup: PickupService,
    pub tokens: TokenService,
    pub audit: AuditLog,
}

impl AppState {
    /// Wire up every service against one database connection.
    pub fn new(db: DbConnection) -> Self {
        let visits = VisitService::new(db.clone());
        let inventory = InventoryService::new(db.clone());
        let pickup = PickupService::new(db.clone(), inventory.clone(), visits.clone());
        let patients = PatientService::new(db.clone(), visits.clone());
        let tokens = TokenService::new(db.clone());
        let audit = AuditLog::new(db);
        Self {
            patients,
            visits,
            inventory,
            pickup,
            tokens,
            audit,
        }
    }
}

/// Build the API router. Mounted under `/api` by main.
pub fn api_router(state: AppState) -> Router {
    let patient_history = Router::new()
        .route("/doctor-prescription", post(add_doctor_prescription))
        .route("/medicine-pickup/:book_no", get(get_pickup_worksheet))
        .route("/medicine-pickup", post(confirm_medicine_pickup))
        .route("/medicine-verification/:book_no", get(get_medicine_verification))
        .route(
            "/:book_no/prescription/:entry_id",
            put(update_prescribed_quantity).delete(delete_prescribed_medicine),
        )
        .route("/:book_no/add-visit", post(add_visit))
        .route("/counselling", post(mark_counselling));

    let patient = Router::new()
        .route("/patient-areas", get(patient_areas))
        .route("/:book_no", get(get_patient))
        .route("/", post(register_patient));

    Router::new()
        .nest("/patient-history", patient_history)
        .nest("/patient", patient)
        .route("/patient-status/:book_no", get(get_patient_status))
        .route("/inventory/:medicine_id", get(get_inventory_item))
        .route("/token", post(issue_token))
        .with_state(state)
}

/// Authenticated-user context: optional header, absence means "skip
/// audit logging", never an error.
fn user_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .map(String::from)
}

/// Map a domain error onto the wire contract.
fn error_response(err: DomainError) -> Response {
    match err {
        DomainError::Validation(message) => {
            (StatusCode::BAD_REQUEST, Json(ErrorResponse { message })).into_response()
        }
        DomainError::NotFound(message) => {
            (StatusCode::NOT_FOUND, Json(ErrorResponse { message })).into_response()
        }
        DomainError::InsufficientStock(insufficient_stock) => (
            StatusCode::BAD_REQUEST,
            Json(InsufficientStockResponse {
                message: "Not enough stock for the following medicines".to_string(),
                insufficient_stock,
            }),
        )
            .into_response(),
        DomainError::Storage(e) => {
            error!("Storage error: {:?}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse { message: "Server error".to_string() }),
            )
                .into_response()
        }
    }
}

/// Axum handler for GET /api/patient-history/medicine-pickup/:book_no
async fn get_pickup_worksheet(
    State(state): State<AppState>,
    Path(book_no): Path<i64>,
    headers: HeaderMap,
) -> Response {
    info!("GET /api/patient-history/medicine-pickup/{}", book_no);

    match state.pickup.pickup_worksheet(book_no).await {
        Ok(worksheet) => {
            state.audit.log_user_action(
                user_id(&headers).as_deref(),
                format!(
                    "Retrieved medicine pickup information for patient (Book #{}) - {} unpicked medicine(s)",
                    book_no,
                    worksheet.len()
                ),
            );
            let medicines_prescribed = worksheet
                .into_iter()
                .map(|entry| WorksheetRow {
                    id: entry.line.id,
                    medicine_id: entry.line.medicine_id,
                    quantity: entry.line.quantity,
                    medicine_formulation: entry.medicine_formulation,
                    batches: entry
                        .batches
                        .into_iter()
                        .map(|b| WorksheetBatch {
                            expiry_date: b.expiry_date,
                            available_quantity: b.quantity,
                            quantity_taken: 0,
                        })
                        .collect(),
                })
                .collect();
            (StatusCode::OK, Json(PickupWorksheetResponse { medicines_prescribed })).into_response()
        }
        Err(e) => error_response(e),
    }
}

/// Axum handler for POST /api/patient-history/medicine-pickup
async fn confirm_medicine_pickup(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<MedicinePickupRequest>,
) -> Response {
    info!(
        "POST /api/patient-history/medicine-pickup - book_no: {}, {} line(s)",
        request.book_no,
        request.medicines_given.len()
    );

    let lines: Vec<DispenseLine> = request
        .medicines_given
        .iter()
        .map(|item| DispenseLine {
            medicine_id: item.medicine_id.clone(),
            expiry_date: item.expiry_date.clone(),
            quantity: item.quantity,
        })
        .collect();

    match state.pickup.dispense(request.book_no, &lines).await {
        Ok(confirmations) => {
            let summary = lines
                .iter()
                .map(|l| format!("(ID: {}, Qty: {}, Exp: {})", l.medicine_id, l.quantity, l.expiry_date))
                .collect::<Vec<_>>()
                .join(", ");
            state.audit.log_user_action(
                user_id(&headers).as_deref(),
                format!(
                    "Dispensed medicines to patient (Book #{}) - {} medicine(s): {}",
                    request.book_no,
                    lines.len(),
                    summary
                ),
            );
            let updated_quantities = confirmations
                .into_iter()
                .map(|c| UpdatedQuantity {
                    medicine_id: c.medicine_id,
                    before_quantity: c.before_quantity,
                    after_quantity: c.after_quantity,
                    picked_up_quantity: c.picked_up_quantity,
                })
                .collect();
            (
                StatusCode::OK,
                Json(MedicinePickupResponse {
                    message: "Medicine pickup confirmed, inventory updated, and patient history preserved!"
                        .to_string(),
                    updated_quantities,
                }),
            )
                .into_response()
        }
        Err(e) => error_response(e),
    }
}

/// Axum handler for GET /api/patient-history/medicine-verification/:book_no
async fn get_medicine_verification(
    State(state): State<AppState>,
    Path(book_no): Path<i64>,
    headers: HeaderMap,
) -> Response {
    info!("GET /api/patient-history/medicine-verification/{}", book_no);

    let month = MonthKey::current();
    if let Err(e) = state.visits.require_visit(book_no, month).await {
        return error_response(e);
    }

    let prescribed = match state.visits.list_prescribed(book_no, month).await {
        Ok(p) => p,
        Err(e) => return error_response(e),
    };
    let given = match state.visits.list_given(book_no, month).await {
        Ok(g) => g,
        Err(e) => return error_response(e),
    };

    state.audit.log_user_action(
        user_id(&headers).as_deref(),
        format!(
            "Verified medicine dispensing for patient (Book #{}) - {} prescribed, {} dispensed",
            book_no,
            prescribed.len(),
            given.len()
        ),
    );

    let response = MedicineVerificationResponse {
        medicines_prescribed: prescribed
            .into_iter()
            .map(|p| PrescribedMedicineView {
                id: p.id,
                medicine_id: p.medicine_id,
                quantity: p.quantity,
            })
            .collect(),
        medicines_given: given
            .into_iter()
            .map(|g| GivenMedicineView {
                medicine_id: g.medicine_id,
                quantity: g.quantity,
            })
            .collect(),
    };
    (StatusCode::OK, Json(response)).into_response()
}

/// Axum handler for POST /api/patient-history/doctor-prescription
async fn add_doctor_prescription(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<DoctorPrescriptionRequest>,
) -> Response {
    info!(
        "POST /api/patient-history/doctor-prescription - book_no: {}",
        request.book_no
    );

    let entries: Vec<(String, i64)> = request
        .prescriptions
        .iter()
        .map(|p| (p.medicine_id.clone(), p.quantity))
        .collect();

    match state.visits.append_prescriptions(request.book_no, &entries).await {
        Ok(stored) => {
            let summary = stored
                .iter()
                .map(|line| format!("{} (Qty: {})", line.medicine_id, line.quantity))
                .collect::<Vec<_>>()
                .join(", ");
            state.audit.log_user_action(
                user_id(&headers).as_deref(),
                format!(
                    "Added prescription for patient (Book #{}) - Medicines: {}",
                    request.book_no, summary
                ),
            );
            (
                StatusCode::OK,
                Json(MessageResponse { message: "Prescription added successfully!".to_string() }),
            )
                .into_response()
        }
        Err(e) => error_response(e),
    }
}

/// Axum handler for PUT /api/patient-history/:book_no/prescription/:entry_id
async fn update_prescribed_quantity(
    State(state): State<AppState>,
    Path((book_no, entry_id)): Path<(i64, String)>,
    headers: HeaderMap,
    Json(request): Json<UpdatePrescriptionRequest>,
) -> Response {
    info!("PUT /api/patient-history/{}/prescription/{}", book_no, entry_id);

    match state
        .visits
        .update_prescribed_quantity(book_no, &entry_id, request.new_quantity)
        .await
    {
        Ok(()) => {
            state.audit.log_user_action(
                user_id(&headers).as_deref(),
                format!(
                    "Updated prescribed quantity for medicine (ID: {}) to {} for patient (Book #{})",
                    entry_id, request.new_quantity, book_no
                ),
            );
            (
                StatusCode::OK,
                Json(MessageResponse { message: "Prescribed quantity updated successfully!".to_string() }),
            )
                .into_response()
        }
        Err(e) => error_response(e),
    }
}

/// Axum handler for DELETE /api/patient-history/:book_no/prescription/:entry_id
async fn delete_prescribed_medicine(
    State(state): State<AppState>,
    Path((book_no, entry_id)): Path<(i64, String)>,
    headers: HeaderMap,
) -> Response {
    info!("DELETE /api/patient-history/{}/prescription/{}", book_no, entry_id);

    match state.visits.delete_prescribed(book_no, &entry_id).await {
        Ok(()) => {
            state.audit.log_user_action(
                user_id(&headers).as_deref(),
                format!(
                    "Deleted prescribed medicine (ID: {}) for patient (Book #{})",
                    entry_id, book_no
                ),
            );
            (
                StatusCode::OK,
                Json(MessageResponse { message: "Prescribed medicine deleted successfully!".to_string() }),
            )
                .into_response()
        }
        Err(e) => error_response(e),
    }
}

/// Axum handler for POST /api/patient-history/:book_no/add-visit
async fn add_visit(
    State(state): State<AppState>,
    Path(book_no): Path<i64>,
    headers: HeaderMap,
    Json(request): Json<AddVisitRequest>,
) -> Response {
    info!("POST /api/patient-history/{}/add-visit", book_no);

    match state.visits.add_visit(book_no, &request.doctor_id).await {
        Ok(visit) => {
            state.audit.log_user_action(
                user_id(&headers).as_deref(),
                format!(
                    "Created a new visit for patient (Book #{}) - Status: {}",
                    book_no,
                    visit.status.as_str()
                ),
            );
            (
                StatusCode::CREATED,
                Json(AddVisitResponse {
                    message: "Visit added successfully".to_string(),
                    status: visit.status.as_str().to_string(),
                }),
            )
                .into_response()
        }
        Err(e) => error_response(e),
    }
}

/// Axum handler for POST /api/patient-history/counselling
async fn mark_counselling(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CounsellingRequest>,
) -> Response {
    info!("POST /api/patient-history/counselling - book_no: {}", request.book_no);

    match state.visits.set_counselling(request.book_no).await {
        Ok(()) => {
            state.audit.log_user_action(
                user_id(&headers).as_deref(),
                format!(
                    "Counselling status updated to true for patient (Book #{}) for current month visit",
                    request.book_no
                ),
            );
            (
                StatusCode::OK,
                Json(MessageResponse { message: "Counselling status updated successfully!".to_string() }),
            )
                .into_response()
        }
        Err(e) => error_response(e),
    }
}

/// Axum handler for POST /api/patient
async fn register_patient(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<RegisterPatientRequest>,
) -> Response {
    info!("POST /api/patient - book_no: {}", request.book_no);

    let input = RegisterPatient {
        book_no: request.book_no,
        patient_name: request.patient_name,
        patient_age: request.patient_age,
        patient_sex: request.patient_sex,
        patient_phone_no: request.patient_phone_no,
        patient_area: request.patient_area,
    };

    match state.patients.register(input).await {
        Ok(outcome) => {
            let action = if outcome.created { "Registered new" } else { "Updated existing" };
            state.audit.log_user_action(
                user_id(&headers).as_deref(),
                format!("{} patient: Book #{}", action, request.book_no),
            );
            let (status, message) = if outcome.created {
                (
                    StatusCode::CREATED,
                    "New patient registered successfully and visit recorded",
                )
            } else {
                (
                    StatusCode::OK,
                    "Patient data updated successfully and visit recorded",
                )
            };
            (
                status,
                Json(RegisterPatientResponse { message: message.to_string(), redirect: true }),
            )
                .into_response()
        }
        Err(e) => error_response(e),
    }
}

/// Axum handler for GET /api/patient/:book_no
async fn get_patient(
    State(state): State<AppState>,
    Path(book_no): Path<i64>,
    headers: HeaderMap,
) -> Response {
    info!("GET /api/patient/{}", book_no);

    if book_no <= 0 {
        return error_response(DomainError::validation("Invalid book number"));
    }

    match state.patients.get(book_no).await {
        Ok(patient) => {
            state.audit.log_user_action(
                user_id(&headers).as_deref(),
                format!(
                    "Retrieved patient details for Book #{} ({})",
                    book_no, patient.patient_name
                ),
            );
            (
                StatusCode::OK,
                Json(PatientView {
                    book_no: patient.book_no,
                    patient_name: patient.patient_name,
                    patient_age: patient.patient_age,
                    patient_sex: patient.patient_sex,
                    patient_phone_no: patient.patient_phone_no,
                    patient_area: patient.patient_area,
                }),
            )
                .into_response()
        }
        Err(e) => error_response(e),
    }
}

/// Query parameters for the area autocomplete endpoint
#[derive(Deserialize, Debug)]
struct AreaQuery {
    q: Option<String>,
}

/// Axum handler for GET /api/patient/patient-areas
async fn patient_areas(State(state): State<AppState>, Query(query): Query<AreaQuery>) -> Response {
    let q = query.q.unwrap_or_default();
    info!("GET /api/patient/patient-areas - q: {:?}", q);

    match state.patients.areas(&q).await {
        Ok(areas) => (StatusCode::OK, Json(areas)).into_response(),
        Err(e) => error_response(e),
    }
}

/// Axum handler for GET /api/patient-status/:book_no
async fn get_patient_status(
    State(state): State<AppState>,
    Path(book_no): Path<i64>,
    headers: HeaderMap,
) -> Response {
    info!("GET /api/patient-status/{}", book_no);

    match state.patients.status(book_no).await {
        Ok(flags) => {
            state.audit.log_user_action(
                user_id(&headers).as_deref(),
                format!(
                    "Retrieved status for patient (Book #{}) for {}",
                    book_no,
                    MonthKey::current()
                ),
            );
            (
                StatusCode::OK,
                Json(PatientStatusResponse {
                    book_no,
                    status: PatientStatusFlags {
                        doctor_assigned: flags.doctor_assigned,
                        medicines_prescribed: flags.medicines_prescribed,
                        medicines_given: flags.medicines_given,
                        counselling_done: flags.counselling_done,
                    },
                }),
            )
                .into_response()
        }
        Err(e) => error_response(e),
    }
}

/// Axum handler for GET /api/inventory/:medicine_id
async fn get_inventory_item(
    State(state): State<AppState>,
    Path(medicine_id): Path<String>,
) -> Response {
    info!("GET /api/inventory/{}", medicine_id);

    match state.inventory.get_item(&medicine_id).await {
        Ok(item) => (
            StatusCode::OK,
            Json(InventoryItemResponse {
                medicine_formulation: item.medicine_formulation,
                total_quantity: item.total_quantity,
                details: item
                    .batches
                    .into_iter()
                    .map(|b| InventoryBatchView { expiry_date: b.expiry_date, quantity: b.quantity })
                    .collect(),
            }),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

/// Axum handler for POST /api/token
async fn issue_token(State(state): State<AppState>, Json(request): Json<TokenRequest>) -> Response {
    info!("POST /api/token - book_number: {}", request.book_number);

    match state.tokens.issue(request.book_number, &request.gender).await {
        Ok(slip) => (
            StatusCode::OK,
            Json(TokenResponse {
                token_number: slip.token_number,
                book_number: slip.book_no,
                gender: slip.gender,
                already_exists: slip.already_exists,
            }),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}
