//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the `JobStore` and
//! `ImageStore` traits.

use crate::state::JobStatus;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{ImageStore, JobStore, StorageError, StorageResult};
use crate::storage::{CrawlJob, CrawlRequest, ImageRecord, JobUpdate, NewImageRecord};
use crate::GleanError;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

const JOB_COLUMNS: &str = "id, target_url, max_pages, timeout_ms, include_css_backgrounds, status,
     progress, pages_processed, total_pages_found, images_found, current_page, error,
     created_at, completed_at";

const IMAGE_COLUMNS: &str = "id, job_id, page_url, image_url, alt_text, raw_markup, image_type,
     filename, dimensions, created_at";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(GleanError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, GleanError> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> Result<Self, GleanError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    fn write_job(&self, job: &CrawlJob) -> StorageResult<()> {
        self.conn.execute(
            "UPDATE jobs SET status = ?1, progress = ?2, pages_processed = ?3,
             total_pages_found = ?4, images_found = ?5, current_page = ?6, error = ?7,
             completed_at = ?8 WHERE id = ?9",
            params![
                job.status.to_db_string(),
                job.progress as i64,
                job.pages_processed as i64,
                job.total_pages_found as i64,
                job.images_found as i64,
                job.current_page,
                job.error,
                job.completed_at.map(|t| t.to_rfc3339()),
                job.id,
            ],
        )?;
        Ok(())
    }
}

fn parse_timestamp(idx: usize, value: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn job_from_row(row: &Row<'_>) -> rusqlite::Result<CrawlJob> {
    let completed_at = match row.get::<_, Option<String>>(13)? {
        Some(value) => Some(parse_timestamp(13, value)?),
        None => None,
    };

    Ok(CrawlJob {
        id: row.get(0)?,
        target_url: row.get(1)?,
        max_pages: row.get::<_, i64>(2)? as u32,
        timeout_ms: row.get::<_, i64>(3)? as u64,
        include_css_backgrounds: row.get(4)?,
        status: JobStatus::from_db_string(&row.get::<_, String>(5)?)
            .unwrap_or(JobStatus::Failed),
        progress: row.get::<_, i64>(6)? as u8,
        pages_processed: row.get::<_, i64>(7)? as u32,
        total_pages_found: row.get::<_, i64>(8)? as u32,
        images_found: row.get::<_, i64>(9)? as u32,
        current_page: row.get(10)?,
        error: row.get(11)?,
        created_at: parse_timestamp(12, row.get(12)?)?,
        completed_at,
    })
}

fn image_from_row(row: &Row<'_>) -> rusqlite::Result<ImageRecord> {
    Ok(ImageRecord {
        id: row.get(0)?,
        job_id: row.get(1)?,
        page_url: row.get(2)?,
        image_url: row.get(3)?,
        alt_text: row.get(4)?,
        raw_markup: row.get(5)?,
        image_type: row.get(6)?,
        filename: row.get(7)?,
        dimensions: row.get(8)?,
        created_at: parse_timestamp(9, row.get(9)?)?,
    })
}

impl JobStore for SqliteStorage {
    fn create_job(&mut self, request: &CrawlRequest) -> StorageResult<CrawlJob> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO jobs (target_url, max_pages, timeout_ms, include_css_backgrounds,
             status, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                request.target_url,
                request.max_pages as i64,
                request.timeout_ms as i64,
                request.include_css_backgrounds,
                JobStatus::Pending.to_db_string(),
                now,
            ],
        )?;

        let id = self.conn.last_insert_rowid();
        let job = self.get_job(id)?;
        job.ok_or(StorageError::JobNotFound(id))
    }

    fn get_job(&self, job_id: i64) -> StorageResult<Option<CrawlJob>> {
        let sql = format!("SELECT {} FROM jobs WHERE id = ?1", JOB_COLUMNS);
        let job = self
            .conn
            .query_row(&sql, params![job_id], job_from_row)
            .optional()?;
        Ok(job)
    }

    fn update_job(&mut self, job_id: i64, update: &JobUpdate) -> StorageResult<Option<CrawlJob>> {
        let mut job = match self.get_job(job_id)? {
            Some(job) => job,
            None => return Ok(None),
        };

        job.apply(update);
        self.write_job(&job)?;
        Ok(Some(job))
    }

    fn list_jobs(&self) -> StorageResult<Vec<CrawlJob>> {
        let sql = format!("SELECT {} FROM jobs ORDER BY id DESC", JOB_COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;
        let jobs = stmt
            .query_map([], job_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(jobs)
    }
}

impl ImageStore for SqliteStorage {
    fn create_image(&mut self, record: &NewImageRecord) -> StorageResult<ImageRecord> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO images (job_id, page_url, image_url, alt_text, raw_markup, image_type,
             filename, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(job_id, page_url, image_url) DO NOTHING",
            params![
                record.job_id,
                record.page_url,
                record.image_url,
                record.alt_text,
                record.raw_markup,
                record.image_type,
                record.filename,
                now,
            ],
        )?;

        let sql = format!(
            "SELECT {} FROM images WHERE job_id = ?1 AND page_url = ?2 AND image_url = ?3",
            IMAGE_COLUMNS
        );
        let image = self.conn.query_row(
            &sql,
            params![record.job_id, record.page_url, record.image_url],
            image_from_row,
        )?;
        Ok(image)
    }

    fn list_images_by_job(&self, job_id: i64) -> StorageResult<Vec<ImageRecord>> {
        let sql = format!(
            "SELECT {} FROM images WHERE job_id = ?1 ORDER BY id",
            IMAGE_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let images = stmt
            .query_map(params![job_id], image_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(images)
    }

    fn list_all_images(&self) -> StorageResult<Vec<ImageRecord>> {
        let sql = format!("SELECT {} FROM images ORDER BY id", IMAGE_COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;
        let images = stmt
            .query_map([], image_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(images)
    }

    fn count_images_by_job(&self, job_id: i64) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM images WHERE job_id = ?1",
            params![job_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn delete_images_by_job(&mut self, job_id: i64) -> StorageResult<()> {
        self.conn
            .execute("DELETE FROM images WHERE job_id = ?1", params![job_id])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> CrawlRequest {
        CrawlRequest {
            target_url: "https://example.com/".to_string(),
            max_pages: 5,
            timeout_ms: 10_000,
            include_css_backgrounds: true,
        }
    }

    fn image(job_id: i64, page: &str, url: &str) -> NewImageRecord {
        NewImageRecord {
            job_id,
            page_url: page.to_string(),
            image_url: url.to_string(),
            alt_text: Some("alt".to_string()),
            raw_markup: format!("<img src=\"{}\">", url),
            image_type: Some("png".to_string()),
            filename: Some("a.png".to_string()),
        }
    }

    #[test]
    fn test_create_in_memory() {
        let storage = SqliteStorage::new_in_memory();
        assert!(storage.is_ok());
    }

    #[test]
    fn test_create_job_is_pending() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let job = storage.create_job(&request()).unwrap();

        assert!(job.id > 0);
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.progress, 0);
        assert_eq!(job.max_pages, 5);
        assert!(job.include_css_backgrounds);
        assert_eq!(job.completed_at, None);
        assert_eq!(job.request(), request());
    }

    #[test]
    fn test_get_missing_job() {
        let storage = SqliteStorage::new_in_memory().unwrap();
        assert_eq!(storage.get_job(42).unwrap(), None);
    }

    #[test]
    fn test_update_job_partial_fields() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let job = storage.create_job(&request()).unwrap();

        let updated = storage
            .update_job(
                job.id,
                &JobUpdate {
                    status: Some(JobStatus::Running),
                    pages_processed: Some(2),
                    current_page: Some(Some("https://example.com/a".to_string())),
                    ..Default::default()
                },
            )
            .unwrap()
            .unwrap();

        assert_eq!(updated.status, JobStatus::Running);
        assert_eq!(updated.pages_processed, 2);

        let reloaded = storage.get_job(job.id).unwrap().unwrap();
        assert_eq!(reloaded, updated);
        assert_eq!(reloaded.current_page.as_deref(), Some("https://example.com/a"));
    }

    #[test]
    fn test_update_job_clears_and_stamps() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let job = storage.create_job(&request()).unwrap();
        let now = Utc::now();

        storage
            .update_job(
                job.id,
                &JobUpdate {
                    current_page: Some(Some("https://example.com/".to_string())),
                    ..Default::default()
                },
            )
            .unwrap();
        let done = storage
            .update_job(
                job.id,
                &JobUpdate {
                    status: Some(JobStatus::Completed),
                    current_page: Some(None),
                    completed_at: Some(Some(now)),
                    ..Default::default()
                },
            )
            .unwrap()
            .unwrap();

        assert_eq!(done.current_page, None);
        let stamped = storage.get_job(job.id).unwrap().unwrap().completed_at.unwrap();
        assert_eq!(stamped.timestamp(), now.timestamp());
    }

    #[test]
    fn test_update_missing_job() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let result = storage.update_job(99, &JobUpdate::default()).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_list_jobs_newest_first() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let first = storage.create_job(&request()).unwrap();
        let second = storage.create_job(&request()).unwrap();

        let jobs = storage.list_jobs().unwrap();
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].id, second.id);
        assert_eq!(jobs[1].id, first.id);
    }

    #[test]
    fn test_create_image_dedupes_per_page() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let job = storage.create_job(&request()).unwrap();

        let a = storage
            .create_image(&image(job.id, "https://example.com/", "https://example.com/a.png"))
            .unwrap();
        let again = storage
            .create_image(&image(job.id, "https://example.com/", "https://example.com/a.png"))
            .unwrap();
        let other_page = storage
            .create_image(&image(job.id, "https://example.com/p2", "https://example.com/a.png"))
            .unwrap();

        assert_eq!(a.id, again.id);
        assert_ne!(a.id, other_page.id);
        assert_eq!(storage.count_images_by_job(job.id).unwrap(), 2);
    }

    #[test]
    fn test_list_and_delete_images_by_job() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let job1 = storage.create_job(&request()).unwrap();
        let job2 = storage.create_job(&request()).unwrap();

        storage
            .create_image(&image(job1.id, "https://example.com/", "https://example.com/1.png"))
            .unwrap();
        storage
            .create_image(&image(job1.id, "https://example.com/", "https://example.com/2.png"))
            .unwrap();
        storage
            .create_image(&image(job2.id, "https://example.com/", "https://example.com/3.png"))
            .unwrap();

        let images = storage.list_images_by_job(job1.id).unwrap();
        assert_eq!(images.len(), 2);
        assert_eq!(images[0].image_url, "https://example.com/1.png");
        assert_eq!(images[0].dimensions, None);
        assert_eq!(storage.list_all_images().unwrap().len(), 3);

        storage.delete_images_by_job(job1.id).unwrap();
        assert_eq!(storage.count_images_by_job(job1.id).unwrap(), 0);
        assert_eq!(storage.count_images_by_job(job2.id).unwrap(), 1);
    }

    #[test]
    fn test_file_backed_storage_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("glean.db");

        let id = {
            let mut storage = SqliteStorage::new(&path).unwrap();
            storage.create_job(&request()).unwrap().id
        };

        let storage = SqliteStorage::new(&path).unwrap();
        assert!(storage.get_job(id).unwrap().is_some());
    }
}
