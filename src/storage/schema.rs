//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Sumi-Glean database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- One row per crawl invocation
CREATE TABLE IF NOT EXISTS jobs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    target_url TEXT NOT NULL,
    max_pages INTEGER NOT NULL,
    timeout_ms INTEGER NOT NULL,
    include_css_backgrounds INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL,
    progress INTEGER NOT NULL DEFAULT 0,
    pages_processed INTEGER NOT NULL DEFAULT 0,
    total_pages_found INTEGER NOT NULL DEFAULT 0,
    images_found INTEGER NOT NULL DEFAULT 0,
    current_page TEXT,
    error TEXT,
    created_at TEXT NOT NULL,
    completed_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status);

-- One row per image occurrence on a page
CREATE TABLE IF NOT EXISTS images (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    job_id INTEGER NOT NULL REFERENCES jobs(id),
    page_url TEXT NOT NULL,
    image_url TEXT NOT NULL,
    alt_text TEXT,
    raw_markup TEXT NOT NULL,
    image_type TEXT,
    filename TEXT,
    dimensions TEXT,
    created_at TEXT NOT NULL,
    UNIQUE(job_id, page_url, image_url)
);

CREATE INDEX IF NOT EXISTS idx_images_job ON images(job_id);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
