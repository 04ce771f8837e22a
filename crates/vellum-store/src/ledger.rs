// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// SQLite metadata ledger — documents, their version history, certificates,
// and signatures in one database.
//
// Timestamps are stored as RFC 3339 text at microsecond precision with a `Z`
// suffix, so lexical order is chronological order and range checks run in
// SQL. Callers should truncate timestamps to microseconds before storing them
// if they need exact round trips.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::{debug, info, instrument};

use vellum_core::error::{Result, VellumError};
use vellum_core::types::{
    Certificate, CertificateId, ContentDigest, Document, DocumentId, DocumentStatus,
    DocumentVersion, SignatureId, SignatureRecord, UserId, VersionId,
};

use crate::repository::{
    CertificateDirectory, DocumentRepository, SignatureRepository, VersionRepository,
};

const SCHEMA_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS documents (
        id                TEXT PRIMARY KEY,
        storage_key       TEXT NOT NULL UNIQUE,
        original_filename TEXT NOT NULL,
        content_type      TEXT NOT NULL,
        owner             TEXT NOT NULL,
        status            TEXT NOT NULL,
        current_version   TEXT,
        created_at        TEXT NOT NULL,
        deleted_at        TEXT
    );

    CREATE TABLE IF NOT EXISTS document_versions (
        seq          INTEGER PRIMARY KEY AUTOINCREMENT,
        document_id  TEXT NOT NULL REFERENCES documents (id),
        version_id   TEXT NOT NULL,
        content_hash TEXT NOT NULL,
        size_bytes   INTEGER NOT NULL,
        created_at   TEXT NOT NULL,
        note         TEXT,
        purged_at    TEXT,
        UNIQUE (document_id, version_id)
    );

    CREATE TABLE IF NOT EXISTS certificates (
        id                 TEXT PRIMARY KEY,
        serial_number      TEXT NOT NULL UNIQUE,
        owner              TEXT NOT NULL,
        subject_name       TEXT NOT NULL,
        public_key_pem     TEXT NOT NULL,
        sealed_private_key BLOB,
        issued_at          TEXT NOT NULL,
        expires_at         TEXT NOT NULL,
        is_revoked         INTEGER NOT NULL DEFAULT 0
    );
    CREATE INDEX IF NOT EXISTS certificates_owner ON certificates (owner, issued_at);

    CREATE TABLE IF NOT EXISTS signatures (
        id             TEXT PRIMARY KEY,
        document_id    TEXT NOT NULL,
        version_id     TEXT NOT NULL,
        certificate_id TEXT REFERENCES certificates (id) ON DELETE SET NULL,
        signer         TEXT NOT NULL,
        signer_name    TEXT NOT NULL,
        signature      BLOB NOT NULL,
        content_hash   TEXT NOT NULL,
        signed_at      TEXT NOT NULL,
        note           TEXT,
        FOREIGN KEY (document_id, version_id)
            REFERENCES document_versions (document_id, version_id)
    );
    CREATE INDEX IF NOT EXISTS signatures_version ON signatures (document_id, version_id, signed_at);
"#;

const DOCUMENT_COLUMNS: &str = "SELECT id, storage_key, original_filename, content_type, owner, \
     status, current_version, created_at, deleted_at FROM documents";

const VERSION_COLUMNS: &str = "SELECT document_id, version_id, seq, content_hash, size_bytes, \
     created_at, note, purged_at FROM document_versions";

const CERTIFICATE_COLUMNS: &str = "SELECT id, serial_number, owner, subject_name, public_key_pem, \
     sealed_private_key, issued_at, expires_at, is_revoked FROM certificates";

const SIGNATURE_COLUMNS: &str = "SELECT id, document_id, version_id, certificate_id, signer, \
     signer_name, signature, content_hash, signed_at, note FROM signatures";

fn db_err(e: rusqlite::Error) -> VellumError {
    VellumError::Database(e.to_string())
}

fn ts(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

// -- Row decoding -------------------------------------------------------------

fn conversion<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn timestamp_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| conversion(idx, e))
}

fn optional_timestamp_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<String>>(idx)? {
        None => Ok(None),
        Some(raw) => DateTime::parse_from_rfc3339(&raw)
            .map(|t| Some(t.with_timezone(&Utc)))
            .map_err(|e| conversion(idx, e)),
    }
}

fn digest_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<ContentDigest> {
    let raw: String = row.get(idx)?;
    ContentDigest::from_hex(&raw).map_err(|e| conversion(idx, e))
}

/// Decode a UUID-backed id column with the id type's own parser.
fn id_at<T>(row: &Row<'_>, idx: usize, parse: fn(&str) -> Result<T>) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    parse(&raw).map_err(|e| conversion(idx, e))
}

fn document_from_row(row: &Row<'_>) -> rusqlite::Result<Document> {
    let status: String = row.get(5)?;
    Ok(Document {
        id: id_at(row, 0, DocumentId::parse)?,
        storage_key: row.get(1)?,
        original_filename: row.get(2)?,
        content_type: row.get(3)?,
        owner: UserId::new(row.get::<_, String>(4)?),
        status: DocumentStatus::parse(&status).ok_or_else(|| {
            conversion(5, VellumError::Database(format!("unknown status {status:?}")))
        })?,
        current_version: row.get::<_, Option<String>>(6)?.map(VersionId::new),
        created_at: timestamp_at(row, 7)?,
        deleted_at: optional_timestamp_at(row, 8)?,
    })
}

fn version_from_row(row: &Row<'_>) -> rusqlite::Result<DocumentVersion> {
    Ok(DocumentVersion {
        document_id: id_at(row, 0, DocumentId::parse)?,
        version_id: VersionId::new(row.get::<_, String>(1)?),
        seq: row.get(2)?,
        content_hash: digest_at(row, 3)?,
        size_bytes: row.get::<_, i64>(4)? as u64,
        created_at: timestamp_at(row, 5)?,
        note: row.get(6)?,
        purged_at: optional_timestamp_at(row, 7)?,
    })
}

fn certificate_from_row(row: &Row<'_>) -> rusqlite::Result<Certificate> {
    Ok(Certificate {
        id: id_at(row, 0, CertificateId::parse)?,
        serial_number: row.get(1)?,
        owner: UserId::new(row.get::<_, String>(2)?),
        subject_name: row.get(3)?,
        public_key_pem: row.get(4)?,
        sealed_private_key: row.get(5)?,
        issued_at: timestamp_at(row, 6)?,
        expires_at: timestamp_at(row, 7)?,
        is_revoked: row.get::<_, i32>(8)? != 0,
    })
}

fn signature_from_row(row: &Row<'_>) -> rusqlite::Result<SignatureRecord> {
    let certificate_id = match row.get::<_, Option<String>>(3)? {
        Some(raw) => Some(CertificateId::parse(&raw).map_err(|e| conversion(3, e))?),
        None => None,
    };
    Ok(SignatureRecord {
        id: id_at(row, 0, SignatureId::parse)?,
        document_id: id_at(row, 1, DocumentId::parse)?,
        version_id: VersionId::new(row.get::<_, String>(2)?),
        certificate_id,
        signer: UserId::new(row.get::<_, String>(4)?),
        signer_name: row.get(5)?,
        signature: row.get(6)?,
        content_hash: digest_at(row, 7)?,
        signed_at: timestamp_at(row, 8)?,
        note: row.get(9)?,
    })
}

// -- Ledger -------------------------------------------------------------------

/// SQLite-backed implementation of every metadata repository.
///
/// The connection sits behind a `Mutex`, so one ledger can be shared across
/// threads through an `Arc`.
pub struct SqliteLedger {
    conn: Mutex<Connection>,
}

impl SqliteLedger {
    /// Open (or create) the ledger database at `path` with WAL enabled.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref()).map_err(db_err)?;
        conn.pragma_update(None, "journal_mode", "WAL").map_err(db_err)?;
        let ledger = Self::init(conn)?;
        info!("metadata ledger opened");
        Ok(ledger)
    }

    /// Open an in-memory ledger (useful for tests).
    pub fn open_in_memory() -> Result<Self> {
        let ledger = Self::init(Connection::open_in_memory().map_err(db_err)?)?;
        debug!("in-memory metadata ledger opened");
        Ok(ledger)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;").map_err(db_err)?;
        conn.execute_batch(SCHEMA_SQL).map_err(db_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| VellumError::Database("ledger connection lock poisoned".into()))
    }

    fn query_all<T>(
        &self,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
        map: fn(&Row<'_>) -> rusqlite::Result<T>,
    ) -> Result<Vec<T>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql).map_err(db_err)?;
        let rows = stmt.query_map(params, map).map_err(db_err)?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(db_err)?);
        }
        Ok(out)
    }

    fn query_one<T>(
        &self,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
        map: fn(&Row<'_>) -> rusqlite::Result<T>,
    ) -> Result<Option<T>> {
        self.conn()?
            .query_row(sql, params, map)
            .optional()
            .map_err(db_err)
    }

    fn execute(&self, sql: &str, params: &[&dyn rusqlite::ToSql]) -> Result<usize> {
        self.conn()?.execute(sql, params).map_err(db_err)
    }
}

impl DocumentRepository for SqliteLedger {
    #[instrument(skip(self, document), fields(document_id = %document.id))]
    fn insert_document(&self, document: &Document) -> Result<()> {
        self.execute(
            "INSERT INTO documents (id, storage_key, original_filename, content_type, owner,
             status, current_version, created_at, deleted_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                document.id.to_string(),
                document.storage_key,
                document.original_filename,
                document.content_type,
                document.owner.as_str(),
                document.status.as_str(),
                document.current_version.as_ref().map(VersionId::as_str),
                ts(&document.created_at),
                document.deleted_at.as_ref().map(ts),
            ],
        )?;
        debug!("document inserted");
        Ok(())
    }

    fn document(&self, id: &DocumentId) -> Result<Option<Document>> {
        self.query_one(
            &format!("{DOCUMENT_COLUMNS} WHERE id = ?1"),
            params![id.to_string()],
            document_from_row,
        )
    }

    fn set_status(&self, id: &DocumentId, status: DocumentStatus) -> Result<bool> {
        let rows = self.execute(
            "UPDATE documents SET status = ?1 WHERE id = ?2",
            params![status.as_str(), id.to_string()],
        )?;
        Ok(rows > 0)
    }

    fn retire(&self, id: &DocumentId, at: DateTime<Utc>) -> Result<bool> {
        let rows = self.execute(
            "UPDATE documents SET deleted_at = COALESCE(deleted_at, ?1) WHERE id = ?2",
            params![ts(&at), id.to_string()],
        )?;
        Ok(rows > 0)
    }

    fn discard_document(&self, id: &DocumentId) -> Result<bool> {
        let rows = self.execute(
            "DELETE FROM documents
             WHERE id = ?1
               AND current_version IS NULL
               AND NOT EXISTS (SELECT 1 FROM document_versions WHERE document_id = ?1)",
            params![id.to_string()],
        )?;
        if rows > 0 {
            debug!("empty document discarded");
        }
        Ok(rows > 0)
    }
}

impl VersionRepository for SqliteLedger {
    #[instrument(skip(self, version), fields(document_id = %version.document_id, version_id = %version.version_id))]
    fn append_version(&self, version: &DocumentVersion) -> Result<DocumentVersion> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(db_err)?;

        tx.execute(
            "INSERT INTO document_versions (document_id, version_id, content_hash, size_bytes,
             created_at, note, purged_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL)",
            params![
                version.document_id.to_string(),
                version.version_id.as_str(),
                version.content_hash.to_hex(),
                version.size_bytes as i64,
                ts(&version.created_at),
                version.note,
            ],
        )
        .map_err(db_err)?;
        let seq = tx.last_insert_rowid();

        let moved = tx
            .execute(
                "UPDATE documents SET current_version = ?1 WHERE id = ?2",
                params![version.version_id.as_str(), version.document_id.to_string()],
            )
            .map_err(db_err)?;
        if moved == 0 {
            return Err(VellumError::DocumentNotFound(version.document_id.to_string()));
        }
        tx.commit().map_err(db_err)?;

        debug!(seq, "version appended");
        Ok(DocumentVersion {
            seq,
            purged_at: None,
            ..version.clone()
        })
    }

    fn version(
        &self,
        document: &DocumentId,
        version: &VersionId,
    ) -> Result<Option<DocumentVersion>> {
        self.query_one(
            &format!("{VERSION_COLUMNS} WHERE document_id = ?1 AND version_id = ?2"),
            params![document.to_string(), version.as_str()],
            version_from_row,
        )
    }

    fn versions(&self, document: &DocumentId) -> Result<Vec<DocumentVersion>> {
        self.query_all(
            &format!("{VERSION_COLUMNS} WHERE document_id = ?1 ORDER BY seq ASC"),
            params![document.to_string()],
            version_from_row,
        )
    }

    fn mark_purged(
        &self,
        document: &DocumentId,
        version: &VersionId,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let rows = self.execute(
            "UPDATE document_versions SET purged_at = COALESCE(purged_at, ?1)
             WHERE document_id = ?2 AND version_id = ?3",
            params![ts(&at), document.to_string(), version.as_str()],
        )?;
        Ok(rows > 0)
    }
}

impl CertificateDirectory for SqliteLedger {
    #[instrument(skip(self, certificate), fields(owner = %certificate.owner, serial = %certificate.serial_number))]
    fn insert_certificate(&self, certificate: &Certificate) -> Result<()> {
        self.execute(
            "INSERT INTO certificates (id, serial_number, owner, subject_name, public_key_pem,
             sealed_private_key, issued_at, expires_at, is_revoked)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                certificate.id.to_string(),
                certificate.serial_number,
                certificate.owner.as_str(),
                certificate.subject_name,
                certificate.public_key_pem,
                certificate.sealed_private_key,
                ts(&certificate.issued_at),
                ts(&certificate.expires_at),
                certificate.is_revoked as i32,
            ],
        )?;
        info!("certificate stored");
        Ok(())
    }

    fn certificate(&self, id: &CertificateId) -> Result<Option<Certificate>> {
        self.query_one(
            &format!("{CERTIFICATE_COLUMNS} WHERE id = ?1"),
            params![id.to_string()],
            certificate_from_row,
        )
    }

    fn active_certificate(
        &self,
        user: &UserId,
        at: DateTime<Utc>,
    ) -> Result<Option<Certificate>> {
        let at = ts(&at);
        self.query_one(
            &format!(
                "{CERTIFICATE_COLUMNS}
                 WHERE owner = ?1 AND is_revoked = 0 AND issued_at <= ?2 AND expires_at > ?2
                 ORDER BY issued_at DESC, rowid DESC LIMIT 1"
            ),
            params![user.as_str(), at],
            certificate_from_row,
        )
    }

    fn certificates_for(&self, user: &UserId) -> Result<Vec<Certificate>> {
        self.query_all(
            &format!("{CERTIFICATE_COLUMNS} WHERE owner = ?1 ORDER BY issued_at DESC, rowid DESC"),
            params![user.as_str()],
            certificate_from_row,
        )
    }

    fn revoke(&self, id: &CertificateId) -> Result<bool> {
        let rows = self.execute(
            "UPDATE certificates SET is_revoked = 1 WHERE id = ?1",
            params![id.to_string()],
        )?;
        if rows > 0 {
            info!(certificate_id = %id, "certificate revoked");
        }
        Ok(rows > 0)
    }

    fn delete_certificate(&self, id: &CertificateId) -> Result<bool> {
        let rows = self.execute(
            "DELETE FROM certificates WHERE id = ?1",
            params![id.to_string()],
        )?;
        Ok(rows > 0)
    }
}

impl SignatureRepository for SqliteLedger {
    #[instrument(skip(self, record), fields(signature_id = %record.id, signer = %record.signer))]
    fn insert_signature(&self, record: &SignatureRecord) -> Result<()> {
        self.execute(
            "INSERT INTO signatures (id, document_id, version_id, certificate_id, signer,
             signer_name, signature, content_hash, signed_at, note)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                record.id.to_string(),
                record.document_id.to_string(),
                record.version_id.as_str(),
                record.certificate_id.map(|id| id.to_string()),
                record.signer.as_str(),
                record.signer_name,
                record.signature,
                record.content_hash.to_hex(),
                ts(&record.signed_at),
                record.note,
            ],
        )?;
        debug!("signature stored");
        Ok(())
    }

    fn signatures_for(
        &self,
        document: &DocumentId,
        version: &VersionId,
    ) -> Result<Vec<SignatureRecord>> {
        self.query_all(
            &format!(
                "{SIGNATURE_COLUMNS} WHERE document_id = ?1 AND version_id = ?2
                 ORDER BY signed_at ASC, rowid ASC"
            ),
            params![document.to_string(), version.as_str()],
            signature_from_row,
        )
    }

    fn signature_by(
        &self,
        document: &DocumentId,
        version: &VersionId,
        signer: &UserId,
    ) -> Result<Option<SignatureRecord>> {
        self.query_one(
            &format!(
                "{SIGNATURE_COLUMNS} WHERE document_id = ?1 AND version_id = ?2 AND signer = ?3
                 ORDER BY signed_at ASC, rowid ASC LIMIT 1"
            ),
            params![document.to_string(), version.as_str(), signer.as_str()],
            signature_from_row,
        )
    }

    fn count_signatures(&self, document: &DocumentId, version: &VersionId) -> Result<usize> {
        let count: i64 = self
            .conn()?
            .query_row(
                "SELECT COUNT(*) FROM signatures WHERE document_id = ?1 AND version_id = ?2",
                params![document.to_string(), version.as_str()],
                |row| row.get(0),
            )
            .map_err(db_err)?;
        Ok(count as usize)
    }
}
