//! Shared helpers for service and handler tests.

use crate::db::DbConnection;
use crate::domain::month::MonthKey;
use crate::domain::models::PrescribedLine;

pub async fn test_db() -> DbConnection {
    DbConnection::init_test().await.expect("Failed to create test database")
}

pub fn current_month() -> String {
    MonthKey::current().to_string()
}

pub async fn seed_patient(db: &DbConnection, book_no: i64, name: &str) {
    sqlx::query("INSERT INTO patients (book_no, patient_name) VALUES (?, ?)")
        .bind(book_no)
        .bind(name)
        .execute(db.pool())
        .await
        .expect("Failed to seed patient");
}

pub async fn seed_visit(db: &DbConnection, book_no: i64, month: &str, doctor_id: Option<&str>) {
    sqlx::query("INSERT INTO visits (book_no, month, doctor_id, counselling, status) VALUES (?, ?, ?, 0, 'new')")
        .bind(book_no)
        .bind(month)
        .bind(doctor_id)
        .execute(db.pool())
        .await
        .expect("Failed to seed visit");
}

pub async fn seed_medicine(
    db: &DbConnection,
    medicine_id: &str,
    formulation: &str,
    batches: &[(&str, i64)],
) {
    let total: i64 = batches.iter().map(|(_, q)| q).sum();
    sqlx::query("INSERT INTO inventory (medicine_id, medicine_formulation, total_quantity) VALUES (?, ?, ?)")
        .bind(medicine_id)
        .bind(formulation)
        .bind(total)
        .execute(db.pool())
        .await
        .expect("Failed to seed inventory item");

    for (expiry_date, quantity) in batches {
        sqlx::query("INSERT INTO inventory_batches (medicine_id, expiry_date, quantity) VALUES (?, ?, ?)")
            .bind(medicine_id)
            .bind(expiry_date)
            .bind(quantity)
            .execute(db.pool())
            .await
            .expect("Failed to seed inventory batch");
    }
}

pub async fn seed_prescription(db: &DbConnection, book_no: i64, month: &str, medicine_id: &str, quantity: i64) {
    sqlx::query("INSERT INTO prescribed_medicines (id, book_no, month, medicine_id, quantity) VALUES (?, ?, ?, ?, ?)")
        .bind(PrescribedLine::generate_id())
        .bind(book_no)
        .bind(month)
        .bind(medicine_id)
        .bind(quantity)
        .execute(db.pool())
        .await
        .expect("Failed to seed prescription");
}

pub async fn seed_given(db: &DbConnection, book_no: i64, month: &str, medicine_id: &str, quantity: i64) {
    sqlx::query("INSERT INTO given_medicines (book_no, month, medicine_id, quantity) VALUES (?, ?, ?, ?)")
        .bind(book_no)
        .bind(month)
        .bind(medicine_id)
        .bind(quantity)
        .execute(db.pool())
        .await
        .expect("Failed to seed given medicine");
}
