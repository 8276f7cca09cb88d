//! Sender identity repository

use chrono::{DateTime, Utc};

use super::DbPool;
use crate::{Error, Result};

/// A registered sender
#[derive(Debug, Clone)]
pub struct Identity {
    pub phone_number: String,
    pub created_at: DateTime<Utc>,
}

/// Sender identity repository
#[derive(Clone)]
pub struct UserRepo {
    pool: DbPool,
}

impl UserRepo {
    /// Create a new identity repository
    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Find a sender by phone number (returns None if not registered)
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn find(&self, phone_number: &str) -> Result<Option<Identity>> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        let identity = conn
            .query_row(
                "SELECT phone_number, created_at FROM users WHERE phone_number = ?1",
                [phone_number],
                |row| {
                    Ok(Identity {
                        phone_number: row.get(0)?,
                        created_at: parse_datetime(&row.get::<_, String>(1)?),
                    })
                },
            )
            .ok();

        Ok(identity)
    }

    /// Register a new sender
    ///
    /// The insert relies on the primary-key constraint: two racing
    /// registrations cannot both succeed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyRegistered`] when the sender exists, or a
    /// database error for any other failure
    pub fn register(&self, phone_number: &str) -> Result<Identity> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        let now = Utc::now().to_rfc3339();

        match conn.execute(
            "INSERT INTO users (phone_number, created_at) VALUES (?1, ?2)",
            [phone_number, &now],
        ) {
            Ok(_) => Ok(Identity {
                phone_number: phone_number.to_string(),
                created_at: Utc::now(),
            }),
            Err(e) if is_unique_violation(&e) => {
                Err(Error::AlreadyRegistered(phone_number.to_string()))
            }
            Err(e) => Err(Error::Sqlite(e)),
        }
    }

    /// Count registered senders
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn count(&self) -> Result<i64> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        let count = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
        Ok(count)
    }
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}
