//! Processed-image capture repository
//!
//! Each processed image persists as one row holding the raw payload and both
//! heatmaps. Payloads are immutable once written.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::DbPool;
use crate::{Error, Result};

/// A processed image and its heatmaps
#[derive(Debug, Clone)]
pub struct Capture {
    pub id: String,
    pub phone_number: String,
    pub raw_image: Vec<u8>,
    pub heatmap_gen: Vec<u8>,
    pub heatmap_dis: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

/// Capture repository
#[derive(Clone)]
pub struct CaptureRepo {
    pool: DbPool,
}

impl CaptureRepo {
    /// Create a new capture repository
    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Persist one processed image with both heatmaps
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn insert(
        &self,
        phone_number: &str,
        raw_image: &[u8],
        heatmap_gen: &[u8],
        heatmap_dis: &[u8],
    ) -> Result<Capture> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        conn.execute(
            "INSERT INTO captures (id, phone_number, raw_image, heatmap_gen, heatmap_dis, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![id, phone_number, raw_image, heatmap_gen, heatmap_dis, now],
        )?;

        Ok(Capture {
            id,
            phone_number: phone_number.to_string(),
            raw_image: raw_image.to_vec(),
            heatmap_gen: heatmap_gen.to_vec(),
            heatmap_dis: heatmap_dis.to_vec(),
            created_at: Utc::now(),
        })
    }

    /// Count captures stored for a sender
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn count_for_sender(&self, phone_number: &str) -> Result<i64> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        let count = conn.query_row(
            "SELECT COUNT(*) FROM captures WHERE phone_number = ?1",
            [phone_number],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Fetch the most recent capture for a sender
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn latest_for_sender(&self, phone_number: &str) -> Result<Option<Capture>> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        let capture = conn
            .query_row(
                "SELECT id, phone_number, raw_image, heatmap_gen, heatmap_dis, created_at
                 FROM captures WHERE phone_number = ?1
                 ORDER BY created_at DESC, id DESC LIMIT 1",
                [phone_number],
                |row| {
                    Ok(Capture {
                        id: row.get(0)?,
                        phone_number: row.get(1)?,
                        raw_image: row.get(2)?,
                        heatmap_gen: row.get(3)?,
                        heatmap_dis: row.get(4)?,
                        created_at: parse_datetime(&row.get::<_, String>(5)?),
                    })
                },
            )
            .ok();

        Ok(capture)
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}
