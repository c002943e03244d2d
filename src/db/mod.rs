//! Database module for SQLite persistence.
//!
//! SQLite is the source of truth for users, staff and issues.

mod repository;

pub use repository::*;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Initialize the database connection pool and run migrations.
pub async fn init_database(
    db_path: &Path,
    max_connections: u32,
) -> Result<SqlitePool, sqlx::Error> {
    // Ensure the parent directory exists
    if let Some(parent) = db_path.parent() {
        tokio::fs::create_dir_all(parent).await.ok();
    }

    let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

    let options = SqliteConnectOptions::from_str(&db_url)?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
        .busy_timeout(Duration::from_secs(30));

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .acquire_timeout(Duration::from_secs(10))
        .connect_with(options)
        .await?;

    run_migrations(&pool).await?;

    Ok(pool)
}

/// Run database migrations.
async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            name TEXT,
            photo_url TEXT,
            role TEXT NOT NULL DEFAULT 'user'
                CHECK (role IN ('user', 'staff', 'admin')),
            membership TEXT NOT NULL DEFAULT 'free'
                CHECK (membership IN ('free', 'standard', 'premium')),
            post_count INTEGER NOT NULL DEFAULT 0 CHECK (post_count >= 0),
            created_at TEXT NOT NULL,
            last_logged_in TEXT NOT NULL,
            updated_at TEXT
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS staff (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            phone TEXT,
            photo_url TEXT,
            district TEXT,
            status TEXT NOT NULL DEFAULT 'pending'
                CHECK (status IN ('pending', 'approved')),
            availability TEXT NOT NULL DEFAULT 'available'
                CHECK (availability IN ('available', 'not_available', 'busy')),
            applied_at TEXT NOT NULL,
            approved_at TEXT,
            updated_at TEXT
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS issues (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL,
            issue_name TEXT NOT NULL,
            description TEXT NOT NULL,
            category TEXT NOT NULL,
            priority TEXT,
            division TEXT,
            district TEXT,
            upazila TEXT,
            address TEXT,
            issue_image_url TEXT,
            phone_number TEXT,
            status TEXT NOT NULL DEFAULT 'pending'
                CHECK (status IN ('pending', 'approved', 'rejected')),
            workflow TEXT NOT NULL DEFAULT 'in queue'
                CHECK (workflow IN ('in queue', 'in-progress', 'Working', 'resolved', 'rejected')),
            assign_state TEXT NOT NULL DEFAULT 'waiting'
                CHECK (assign_state IN ('waiting', 'assigned')),
            tracking_id TEXT UNIQUE,
            upvotes INTEGER NOT NULL DEFAULT 0 CHECK (upvotes >= 0),
            assigned_staff TEXT,
            assigned_staff_email TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT,
            approved_at TEXT,
            rejected_at TEXT,
            accept_at TEXT,
            resolved_at TEXT
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS issue_upvotes (
            issue_id TEXT NOT NULL,
            email TEXT NOT NULL,
            created_at TEXT NOT NULL,
            PRIMARY KEY (issue_id, email)
        );
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes for common queries
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_issues_email ON issues(email);
        CREATE INDEX IF NOT EXISTS idx_issues_status ON issues(status, workflow);
        CREATE INDEX IF NOT EXISTS idx_issues_created_at ON issues(created_at);
        CREATE INDEX IF NOT EXISTS idx_issues_assigned_staff ON issues(assigned_staff_email);
        CREATE INDEX IF NOT EXISTS idx_staff_status ON staff(status);
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
