// secure-attend: PKI-backed access control and attendance core.
// Copyright 2026 The SecureAttend Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Tamper-evident attendance records.
//!
//! Each record carries the SHA-256 of its canonical bytes and a backend
//! signature over that hash, so integrity is checkable offline with the
//! backend public key alone. The database uniqueness constraint on
//! `(student_id, room_id, timestamp)` backstops duplicate prevention.

use crate::challenge::format_timestamp;
use crate::rsa;
use crate::signature::{self, SignatureError};
use crate::store::{self, Deadline, StoreError};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::{Arc, Mutex};
use tracing::info;

/// A persisted attendance record. Never mutated after insertion.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub student_id: String,
    pub room_id: String,
    pub door_id: String,
    /// Canonical wire timestamp (ISO-8601 UTC, microseconds, `Z`).
    pub timestamp: String,
    /// Lowercase hex SHA-256 of the canonical record bytes.
    pub record_hash: String,
    /// Hex signature by the backend key over the ASCII hex digest.
    pub backend_signature: String,
}

/// Recording failures.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("attendance was already recorded for this student, room and time")]
    DuplicateRecord,
    #[error("failed to persist attendance record: {0}")]
    PersistFailed(String),
    #[error("record hash or signature does not verify")]
    IntegrityViolation,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Query filter for [`AttendanceLog::query`].
#[derive(Clone, Debug, Default)]
pub struct AttendanceQuery {
    pub student_id: Option<String>,
    pub room_id: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

const DEFAULT_QUERY_LIMIT: usize = 100;

/// Builds the canonical record serialization: compact JSON with keys in
/// lexicographic order. Written out explicitly; the byte sequence is a
/// frozen contract shared with offline verifiers.
pub fn canonical_record_bytes(
    student_id: &str,
    room_id: &str,
    door_id: &str,
    timestamp: &str,
) -> Vec<u8> {
    let mut out = String::with_capacity(160);
    out.push('{');
    for (i, (key, value)) in [
        ("door_id", door_id),
        ("room_id", room_id),
        ("student_id", student_id),
        ("timestamp", timestamp),
    ]
    .into_iter()
    .enumerate()
    {
        if i > 0 {
            out.push(',');
        }
        out.push('"');
        out.push_str(key);
        out.push_str("\":");
        out.push_str(&serde_json::to_string(value).expect("string escaping cannot fail"));
    }
    out.push('}');
    out.into_bytes()
}

fn record_hash(canonical: &[u8]) -> String {
    hex::encode(Sha256::digest(canonical))
}

/// Attendance store: hash-and-sign on insert, filtered queries, offline
/// re-verification.
pub struct AttendanceLog {
    conn: Arc<Mutex<Connection>>,
    signer: rsa::SecretKey,
}

impl AttendanceLog {
    /// Wraps a shared connection and the backend signing key.
    pub fn new(conn: Arc<Mutex<Connection>>, signer: rsa::SecretKey) -> Result<Self, StoreError> {
        {
            let guard = store::lock(&conn, Deadline::none())?;
            guard.execute(
                "CREATE TABLE IF NOT EXISTS attendance_records (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    student_id TEXT NOT NULL,
                    room_id TEXT NOT NULL,
                    door_id TEXT NOT NULL,
                    timestamp TEXT NOT NULL,
                    record_hash TEXT NOT NULL,
                    backend_signature TEXT NOT NULL,
                    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                    UNIQUE(student_id, room_id, timestamp)
                )",
                [],
            )?;
        }
        Ok(Self { conn, signer })
    }

    /// Hashes, signs and inserts one attendance record.
    pub fn record(
        &self,
        student_id: &str,
        room_id: &str,
        door_id: &str,
        timestamp: DateTime<Utc>,
        deadline: Deadline,
    ) -> Result<AttendanceRecord, RecordError> {
        let timestamp = format_timestamp(timestamp);
        let canonical = canonical_record_bytes(student_id, room_id, door_id, &timestamp);
        let hash = record_hash(&canonical);
        let backend_signature = self.signer.sign(hash.as_bytes()).to_hex();

        let record = AttendanceRecord {
            student_id: student_id.to_string(),
            room_id: room_id.to_string(),
            door_id: door_id.to_string(),
            timestamp,
            record_hash: hash,
            backend_signature,
        };

        let conn = store::lock(&self.conn, deadline)?;
        conn.execute(
            "INSERT INTO attendance_records
             (student_id, room_id, door_id, timestamp, record_hash, backend_signature)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.student_id,
                record.room_id,
                record.door_id,
                record.timestamp,
                record.record_hash,
                record.backend_signature
            ],
        )
        .map_err(|e| match e {
            rusqlite::Error::SqliteFailure(inner, _)
                if inner.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                RecordError::DuplicateRecord
            }
            other => RecordError::PersistFailed(other.to_string()),
        })?;

        info!(
            student_id = %record.student_id,
            room_id = %record.room_id,
            door_id = %record.door_id,
            "attendance recorded"
        );
        Ok(record)
    }

    /// Returns matching records ordered by timestamp descending.
    pub fn query(
        &self,
        filter: &AttendanceQuery,
        deadline: Deadline,
    ) -> Result<Vec<AttendanceRecord>, RecordError> {
        let conn = store::lock(&self.conn, deadline)?;

        let mut sql = String::from(
            "SELECT student_id, room_id, door_id, timestamp, record_hash, backend_signature
             FROM attendance_records WHERE 1=1",
        );
        let mut args: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        if let Some(student_id) = &filter.student_id {
            sql.push_str(" AND student_id = ?");
            args.push(Box::new(student_id.clone()));
        }
        if let Some(room_id) = &filter.room_id {
            sql.push_str(" AND room_id = ?");
            args.push(Box::new(room_id.clone()));
        }
        if let Some(from) = &filter.from {
            sql.push_str(" AND timestamp >= ?");
            args.push(Box::new(format_timestamp(*from)));
        }
        if let Some(to) = &filter.to {
            sql.push_str(" AND timestamp <= ?");
            args.push(Box::new(format_timestamp(*to)));
        }
        sql.push_str(" ORDER BY timestamp DESC LIMIT ?");
        args.push(Box::new(
            filter.limit.unwrap_or(DEFAULT_QUERY_LIMIT) as i64
        ));

        let mut stmt = conn.prepare(&sql).map_err(StoreError::from)?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(args.iter()), |row| {
                Ok(AttendanceRecord {
                    student_id: row.get(0)?,
                    room_id: row.get(1)?,
                    door_id: row.get(2)?,
                    timestamp: row.get(3)?,
                    record_hash: row.get(4)?,
                    backend_signature: row.get(5)?,
                })
            })
            .map_err(StoreError::from)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row.map_err(StoreError::from)?);
        }
        Ok(records)
    }

    /// Offline integrity check: recomputes the canonical hash and
    /// verifies the backend signature with the given public key.
    pub fn verify_record(
        public_key: &rsa::PublicKey,
        record: &AttendanceRecord,
    ) -> Result<(), RecordError> {
        let canonical = canonical_record_bytes(
            &record.student_id,
            &record.room_id,
            &record.door_id,
            &record.timestamp,
        );
        if record_hash(&canonical) != record.record_hash {
            return Err(RecordError::IntegrityViolation);
        }
        signature::verify_bytes(
            public_key,
            record.record_hash.as_bytes(),
            &record.backend_signature,
        )
        .map_err(|_: SignatureError| RecordError::IntegrityViolation)
    }
}
