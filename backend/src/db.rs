use anyhow::Result;
use sqlx::{migrate::MigrateDatabase, Sqlite, SqlitePool};
use std::sync::Arc;

// The database URL for the production database
const DATABASE_URL: &str = "sqlite:clinic.db";

/// DbConnection manages database operations
#[derive(Clone)]
pub struct DbConnection {
    pool: Arc<SqlitePool>,
}

impl DbConnection {
    /// Create a new database connection
    pub async fn new(url: &str) -> Result<Self> {
        // Create database if it doesn't exist
        if !Sqlite::database_exists(url).await.unwrap_or(false) {
            Sqlite::create_database(url).await?
        }

        // Connect to the database
        let pool = SqlitePool::connect(url).await?;

        // Setup database schema
        Self::setup_schema(&pool).await?;

        Ok(Self { pool: Arc::new(pool) })
    }

    /// Initialize the standard database
    pub async fn init() -> Result<Self> {
        Self::new(DATABASE_URL).await
    }

    /// Initialize a test database with a unique name
    #[cfg(test)]
    pub async fn init_test() -> Result<Self> {
        // Generate a unique database name for tests
        let test_id = uuid::Uuid::new_v4().to_string();
        let db_url = format!("file:memdb_{}?mode=memory&cache=shared", test_id);

        Self::new(&db_url).await
    }

    /// Set up the required database schema
    async fn setup_schema(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS patients (
                book_no INTEGER PRIMARY KEY,
                patient_name TEXT NOT NULL,
                patient_age INTEGER,
                patient_sex TEXT,
                patient_phone_no TEXT,
                patient_area TEXT
            );
            "#,
        )
        .execute(pool)
        .await?;

        // One visit per patient per calendar month; month is "YYYY-MM"
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS visits (
                book_no INTEGER NOT NULL,
                month TEXT NOT NULL,
                doctor_id TEXT,
                counselling INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL,
                PRIMARY KEY (book_no, month)
            );
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS prescribed_medicines (
                id TEXT PRIMARY KEY,
                book_no INTEGER NOT NULL,
                month TEXT NOT NULL,
                medicine_id TEXT NOT NULL,
                quantity INTEGER NOT NULL
            );
            "#,
        )
        .execute(pool)
        .await?;

        // Append-only; one row per line item per pickup
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS given_medicines (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                book_no INTEGER NOT NULL,
                month TEXT NOT NULL,
                medicine_id TEXT NOT NULL,
                quantity INTEGER NOT NULL
            );
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS inventory (
                medicine_id TEXT PRIMARY KEY,
                medicine_formulation TEXT NOT NULL,
                total_quantity INTEGER NOT NULL
            );
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS inventory_batches (
                medicine_id TEXT NOT NULL,
                expiry_date TEXT NOT NULL,
                quantity INTEGER NOT NULL,
                PRIMARY KEY (medicine_id, expiry_date)
            );
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS daily_tokens (
                token_date TEXT NOT NULL,
                gender TEXT NOT NULL,
                token_number INTEGER NOT NULL,
                book_no INTEGER NOT NULL,
                PRIMARY KEY (token_date, book_no)
            );
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS user_actions (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                message TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            "#,
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Get the underlying SQLite pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
