//! SQLite parcel archive

use crate::archive::schema::create_archive;
use crate::archive::ParcelArchive;
use crate::error::{ArchiveError, ArchiveResult};
use crate::task::{Parcel, ParcelStatus};

use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use std::path::Path;

/// Summary row read back from the archive
#[derive(Debug, Clone, PartialEq)]
pub struct ArchivedParcel {
    pub key: String,
    pub status: String,
    pub outcome: Option<String>,
    pub parcel: Parcel,
}

/// Archive backed by a single SQLite file
pub struct SqliteArchive {
    conn: Mutex<Connection>,
}

impl SqliteArchive {
    /// Open (creating if needed) an archive file
    pub fn open(path: &Path) -> ArchiveResult<Self> {
        let conn = Connection::open(path)?;
        create_archive(&conn)?;
        tracing::debug!(path = %path.display(), "Opened parcel archive");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory archive, mainly for tests
    pub fn open_in_memory() -> ArchiveResult<Self> {
        let conn = Connection::open_in_memory()?;
        create_archive(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Read an archived parcel back
    pub fn get(&self, key: &str) -> ArchiveResult<Option<ArchivedParcel>> {
        let conn = self.conn.lock();
        let result = conn.query_row(
            "SELECT status, outcome, body FROM parcels WHERE parcel_key = ?1",
            [key],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, String>(2)?,
                ))
            },
        );

        let (status, outcome, body) = match result {
            Ok(row) => row,
            Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let parcel = Parcel::from_json(key, &body)
            .map_err(|e| ArchiveError::Serialization(e.to_string()))?;
        Ok(Some(ArchivedParcel {
            key: key.to_string(),
            status,
            outcome,
            parcel,
        }))
    }

    /// Number of archived parcels with a given status
    pub fn count_with_status(&self, status: ParcelStatus) -> ArchiveResult<u64> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM parcels WHERE status = ?1",
            [status.to_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

#[async_trait::async_trait]
impl ParcelArchive for SqliteArchive {
    async fn archive(&self, parcel: &Parcel) -> ArchiveResult<()> {
        let body = parcel
            .to_json()
            .map_err(|e| ArchiveError::Serialization(e.to_string()))?;
        let outcome = parcel.uow.outcome.map(|o| o.to_string());

        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO parcels
                (parcel_key, status, outcome, supporting_function, body, archived_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                parcel.key(),
                parcel.status.to_string(),
                outcome,
                parcel.registration.supporting_function.render(),
                body,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Identifier;
    use crate::task::{ProcessingOutcome, UnitOfWork};
    use tempfile::TempDir;

    fn parcel() -> Parcel {
        let id = |s: &str| Identifier::parse(s).unwrap();
        Parcel::register(
            id("wup=wup-1"),
            id("function=ingest"),
            UnitOfWork::new(id("function=ingest.hash=abc123"), id("function=ingest")),
            None,
            Utc::now(),
            chrono::Duration::seconds(1),
        )
    }

    #[tokio::test]
    async fn test_archive_replaces_by_key() {
        let archive = SqliteArchive::open_in_memory().unwrap();
        let mut parcel = parcel();

        archive.archive(&parcel).await.unwrap();
        assert_eq!(archive.count_with_status(ParcelStatus::Registered).unwrap(), 1);

        let finished = parcel
            .uow
            .clone()
            .complete(vec![], ProcessingOutcome::Success);
        parcel.mark_finished(finished, ProcessingOutcome::Success, Utc::now());
        parcel.mark_finalised();
        archive.archive(&parcel).await.unwrap();

        assert_eq!(archive.count_with_status(ParcelStatus::Registered).unwrap(), 0);
        let row = archive.get(&parcel.key()).unwrap().unwrap();
        assert_eq!(row.status, "finalised");
        assert_eq!(row.outcome.as_deref(), Some("success"));
        assert_eq!(row.parcel, parcel);
    }

    #[tokio::test]
    async fn test_archive_file_persists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("archive.db");
        let parcel = parcel();

        {
            let archive = SqliteArchive::open(&path).unwrap();
            archive.archive(&parcel).await.unwrap();
        }

        let reopened = SqliteArchive::open(&path).unwrap();
        assert!(reopened.get(&parcel.key()).unwrap().is_some());
        assert!(reopened.get("function=missing.parcel=primary").unwrap().is_none());
    }
}
