// secure-attend: PKI-backed access control and attendance core.
// Copyright 2026 The SecureAttend Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Student/room authorization store.
//!
//! Authorizations grant a student access to a room, optionally limited
//! to a daily wall-clock window. Enrollments materialize into an
//! authorization on insert, so the access decision only ever consults
//! one table.

use crate::store::{self, Deadline, StoreError};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Authorization failures; both map to a denial.
#[derive(Debug, thiserror::Error)]
pub enum AuthzError {
    #[error("student is not authorized for this room")]
    NotAuthorizedForRoom,
    #[error("access is outside the authorized time window")]
    OutsideAccessWindow,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Room permissions backed by SQLite.
#[derive(Debug)]
pub struct AuthorizationStore {
    conn: Arc<Mutex<Connection>>,
}

impl AuthorizationStore {
    /// Wraps a shared connection and ensures the schema exists.
    pub fn new(conn: Arc<Mutex<Connection>>) -> Result<Self, StoreError> {
        {
            let guard = store::lock(&conn, Deadline::none())?;
            Self::init_schema(&guard)?;
        }
        Ok(Self { conn })
    }

    fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS room_authorizations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                student_id TEXT NOT NULL,
                room_id TEXT NOT NULL,
                course_id TEXT,
                start_time TEXT,
                end_time TEXT,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                UNIQUE(student_id, room_id)
            )",
            [],
        )?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS student_enrollments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                student_id TEXT NOT NULL,
                course_id TEXT NOT NULL,
                room_id TEXT NOT NULL,
                schedule_start TEXT,
                schedule_end TEXT,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                UNIQUE(student_id, course_id)
            )",
            [],
        )?;
        Ok(())
    }

    /// Grants `student_id` access to `room_id`, optionally inside a
    /// daily `HH:MM` window. Duplicate grants collapse onto one row.
    pub fn add_authorization(
        &self,
        student_id: &str,
        room_id: &str,
        course_id: Option<&str>,
        window: Option<(&str, &str)>,
        deadline: Deadline,
    ) -> Result<(), StoreError> {
        let conn = store::lock(&self.conn, deadline)?;
        let (start_time, end_time) = match window {
            Some((start, end)) => (Some(start), Some(end)),
            None => (None, None),
        };
        conn.execute(
            "INSERT OR REPLACE INTO room_authorizations
             (student_id, room_id, course_id, start_time, end_time)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![student_id, room_id, course_id, start_time, end_time],
        )?;
        debug!(student_id, room_id, "room authorization added");
        Ok(())
    }

    /// Records an enrollment and materializes the matching room
    /// authorization in the same transaction.
    pub fn add_enrollment(
        &self,
        student_id: &str,
        course_id: &str,
        room_id: &str,
        schedule: Option<(&str, &str)>,
        deadline: Deadline,
    ) -> Result<(), StoreError> {
        let mut conn = store::lock(&self.conn, deadline)?;
        let (start, end) = match schedule {
            Some((start, end)) => (Some(start), Some(end)),
            None => (None, None),
        };
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT OR REPLACE INTO student_enrollments
             (student_id, course_id, room_id, schedule_start, schedule_end)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![student_id, course_id, room_id, start, end],
        )?;
        tx.execute(
            "INSERT OR REPLACE INTO room_authorizations
             (student_id, room_id, course_id, start_time, end_time)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![student_id, room_id, course_id, start, end],
        )?;
        tx.commit()?;
        debug!(student_id, course_id, room_id, "enrollment added");
        Ok(())
    }

    /// Checks whether `student_id` may enter `room_id` at `now`. A
    /// time-bounded authorization compares the `HH:MM` of `now` against
    /// the stored window.
    pub fn is_authorized(
        &self,
        student_id: &str,
        room_id: &str,
        now: DateTime<Utc>,
        deadline: Deadline,
    ) -> Result<(), AuthzError> {
        let conn = store::lock(&self.conn, deadline)?;
        let window: Option<(Option<String>, Option<String>)> = conn
            .query_row(
                "SELECT start_time, end_time FROM room_authorizations
                 WHERE student_id = ?1 AND room_id = ?2",
                params![student_id, room_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(StoreError::from)?;

        let Some((start, end)) = window else {
            return Err(AuthzError::NotAuthorizedForRoom);
        };
        if let (Some(start), Some(end)) = (start, end) {
            let time_of_day = now.format("%H:%M").to_string();
            if time_of_day < start || time_of_day > end {
                return Err(AuthzError::OutsideAccessWindow);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn store() -> AuthorizationStore {
        let conn = Connection::open_in_memory().unwrap();
        AuthorizationStore::new(Arc::new(Mutex::new(conn))).unwrap()
    }

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 1, hour, minute, 0).unwrap()
    }

    #[test]
    fn test_unauthorized_student() {
        let store = store();
        assert!(matches!(
            store.is_authorized("s1", "CS101", at(10, 0), Deadline::none()),
            Err(AuthzError::NotAuthorizedForRoom)
        ));
    }

    #[test]
    fn test_authorization_without_window() {
        let store = store();
        store
            .add_authorization("s1", "CS101", None, None, Deadline::none())
            .unwrap();
        store
            .is_authorized("s1", "CS101", at(3, 0), Deadline::none())
            .unwrap();
    }

    #[test]
    fn test_time_window_is_inclusive() {
        let store = store();
        store
            .add_authorization("s1", "CS101", None, Some(("09:00", "11:00")), Deadline::none())
            .unwrap();

        store
            .is_authorized("s1", "CS101", at(9, 0), Deadline::none())
            .unwrap();
        store
            .is_authorized("s1", "CS101", at(11, 0), Deadline::none())
            .unwrap();
        assert!(matches!(
            store.is_authorized("s1", "CS101", at(8, 59), Deadline::none()),
            Err(AuthzError::OutsideAccessWindow)
        ));
        assert!(matches!(
            store.is_authorized("s1", "CS101", at(11, 1), Deadline::none()),
            Err(AuthzError::OutsideAccessWindow)
        ));
    }

    #[test]
    fn test_duplicate_authorizations_collapse() {
        let store = store();
        store
            .add_authorization("s1", "CS101", None, None, Deadline::none())
            .unwrap();
        store
            .add_authorization("s1", "CS101", None, Some(("09:00", "11:00")), Deadline::none())
            .unwrap();

        // The replacement carries the window.
        assert!(matches!(
            store.is_authorized("s1", "CS101", at(12, 0), Deadline::none()),
            Err(AuthzError::OutsideAccessWindow)
        ));
    }

    #[test]
    fn test_enrollment_materializes_authorization() {
        let store = store();
        store
            .add_enrollment("s1", "CS101-A", "CS101", Some(("09:00", "11:00")), Deadline::none())
            .unwrap();
        store
            .is_authorized("s1", "CS101", at(10, 0), Deadline::none())
            .unwrap();
    }
}
