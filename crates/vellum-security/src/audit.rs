// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Audit trail — append-only SQLite log of every signing-relevant operation.
//
// Schema:
//   audit_log(
//     id            INTEGER PRIMARY KEY AUTOINCREMENT,
//     timestamp     TEXT    NOT NULL,   -- RFC 3339, microsecond precision
//     user_id       TEXT    NOT NULL,   -- acting user
//     action        TEXT    NOT NULL,   -- e.g. "sign", "verify", "stamp"
//     document_hash TEXT    NOT NULL,   -- SHA-256 hex digest
//     success       INTEGER NOT NULL,   -- 0 = failure, 1 = success
//     details       TEXT                -- optional free-form context
//   )

use std::path::Path;

use chrono::{SecondsFormat, Utc};
use rusqlite::{Connection, Row, params};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use vellum_core::error::VellumError;

const CREATE_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS audit_log (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp     TEXT    NOT NULL,
    user_id       TEXT    NOT NULL,
    action        TEXT    NOT NULL,
    document_hash TEXT    NOT NULL,
    success       INTEGER NOT NULL,
    details       TEXT
);
CREATE INDEX IF NOT EXISTS audit_log_hash ON audit_log (document_hash);";

const SELECT_COLUMNS: &str = "SELECT id, timestamp, user_id, action, document_hash, success, details FROM audit_log";

/// Convert a `rusqlite::Error` into a `VellumError::Database`.
fn db_err(e: rusqlite::Error) -> VellumError {
    VellumError::Database(e.to_string())
}

/// A single entry in the audit log, used for queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: i64,
    pub timestamp: String,
    pub user_id: String,
    pub action: String,
    pub document_hash: String,
    pub success: bool,
    pub details: Option<String>,
}

impl AuditEntry {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            timestamp: row.get(1)?,
            user_id: row.get(2)?,
            action: row.get(3)?,
            document_hash: row.get(4)?,
            success: row.get::<_, i32>(5)? != 0,
            details: row.get(6)?,
        })
    }
}

/// Append-only audit log backed by a SQLite database.
pub struct AuditLog {
    conn: Connection,
}

impl AuditLog {
    /// Open (or create) the audit database at `path` with WAL enabled.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self, VellumError> {
        let conn = Connection::open(path).map_err(db_err)?;
        conn.pragma_update(None, "journal_mode", "WAL").map_err(db_err)?;
        conn.execute_batch(CREATE_TABLE_SQL).map_err(db_err)?;

        debug!("audit log opened");
        Ok(Self { conn })
    }

    /// Open an in-memory audit database (useful for tests).
    pub fn open_in_memory() -> Result<Self, VellumError> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        conn.execute_batch(CREATE_TABLE_SQL).map_err(db_err)?;

        debug!("in-memory audit log opened");
        Ok(Self { conn })
    }

    /// Record a new audit entry.
    #[instrument(skip(self, details), fields(%user_id, %action, %document_hash, success))]
    pub fn record(
        &self,
        user_id: &str,
        action: &str,
        document_hash: &str,
        success: bool,
        details: Option<&str>,
    ) -> Result<(), VellumError> {
        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);

        self.conn
            .execute(
                "INSERT INTO audit_log (timestamp, user_id, action, document_hash, success, details)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![timestamp, user_id, action, document_hash, success as i32, details],
            )
            .map_err(db_err)?;

        debug!("audit entry recorded");
        Ok(())
    }

    /// All entries for a document hash, oldest first.
    pub fn entries_for_hash(&self, document_hash: &str) -> Result<Vec<AuditEntry>, VellumError> {
        self.query(
            &format!("{SELECT_COLUMNS} WHERE document_hash = ?1 ORDER BY id ASC"),
            params![document_hash],
        )
    }

    /// All entries recorded for one user, oldest first.
    pub fn entries_for_user(&self, user_id: &str) -> Result<Vec<AuditEntry>, VellumError> {
        self.query(
            &format!("{SELECT_COLUMNS} WHERE user_id = ?1 ORDER BY id ASC"),
            params![user_id],
        )
    }

    /// The most recent `limit` entries, newest first.
    pub fn recent_entries(&self, limit: u32) -> Result<Vec<AuditEntry>, VellumError> {
        self.query(
            &format!("{SELECT_COLUMNS} ORDER BY id DESC LIMIT ?1"),
            params![limit],
        )
    }

    /// Total number of entries in the audit log.
    pub fn count(&self) -> Result<u64, VellumError> {
        self.conn
            .query_row("SELECT COUNT(*) FROM audit_log", [], |row| row.get(0))
            .map_err(db_err)
    }

    fn query(&self, sql: &str, params: &[&dyn rusqlite::ToSql]) -> Result<Vec<AuditEntry>, VellumError> {
        let mut stmt = self.conn.prepare(sql).map_err(db_err)?;
        let rows = stmt.query_map(params, AuditEntry::from_row).map_err(db_err)?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row.map_err(db_err)?);
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_log() -> AuditLog {
        AuditLog::open_in_memory().expect("open in-memory audit log")
    }

    #[test]
    fn record_and_count() {
        let log = make_log();
        assert_eq!(log.count().unwrap(), 0);

        log.record("alice", "sign", "abc123", true, None).unwrap();
        log.record("alice", "verify", "abc123", true, Some("1 of 1 verified"))
            .unwrap();

        assert_eq!(log.count().unwrap(), 2);
    }

    #[test]
    fn entries_for_hash() {
        let log = make_log();
        log.record("alice", "sign", "aaa", true, None).unwrap();
        log.record("bob", "stamp", "bbb", true, None).unwrap();
        log.record("bob", "sign_rejected", "aaa", false, Some("certificate revoked"))
            .unwrap();

        let entries = log.entries_for_hash("aaa").unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].action, "sign");
        assert!(entries[0].success);
        assert_eq!(entries[1].action, "sign_rejected");
        assert!(!entries[1].success);
        assert_eq!(entries[1].details.as_deref(), Some("certificate revoked"));
    }

    #[test]
    fn entries_for_user() {
        let log = make_log();
        log.record("alice", "sign", "h1", true, None).unwrap();
        log.record("bob", "sign", "h1", true, None).unwrap();
        log.record("alice", "stamp", "h2", true, None).unwrap();

        let alice = log.entries_for_user("alice").unwrap();
        assert_eq!(alice.len(), 2);
        assert!(alice.iter().all(|e| e.user_id == "alice"));
    }

    #[test]
    fn recent_entries_ordering() {
        let log = make_log();
        for i in 0..5 {
            log.record("op", "sign", &format!("hash_{i}"), true, None).unwrap();
        }

        let recent = log.recent_entries(3).unwrap();
        assert_eq!(recent.len(), 3);
        assert!(recent[0].id > recent[1].id);
        assert!(recent[1].id > recent[2].id);
    }

    #[test]
    fn file_backed_log_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.db");
        {
            let log = AuditLog::open(&path).unwrap();
            log.record("alice", "sign", "h", true, None).unwrap();
        }
        assert_eq!(AuditLog::open(&path).unwrap().count().unwrap(), 1);
    }
}
