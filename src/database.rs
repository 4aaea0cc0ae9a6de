use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::{Connection, OptionalExtension};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::i18n::Language;
use crate::models::{
    Appointment, AppointmentStatus, ChecklistItem, Client, NotificationKind, NotificationRecord,
    NotificationState, PhotoRef, UserSettings,
};
use crate::utils::{format_timestamp, parse_timestamp, timestamp_now};

/// How long a call waits on a locked database before giving up
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    SqliteError(#[from] rusqlite::Error),
    #[error("Failed to create database directory: {0}")]
    DirectoryError(String),
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },
}

impl DatabaseError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, DatabaseError::NotFound { .. })
    }
}

pub struct Database {
    conn: Connection,
}

const APPOINTMENT_COLUMNS: &str =
    "id, client_id, client_name, date, time, service, status, notes, created_at, updated_at";

const NOTIFICATION_COLUMNS: &str = "id, appointment_id, kind, title, message, scheduled_for, \
     state, attempts, claimed_at, last_error, created_at";

fn conversion_error(
    idx: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(err))
}

#[derive(Debug, Error)]
#[error("unrecognised stored value '{0}'")]
struct UnknownValue(String);

impl Database {
    /// Create a new database connection and initialize the schema
    pub fn new(path: &str) -> Result<Self, DatabaseError> {
        Self::with_timeout(path, DEFAULT_STORE_TIMEOUT)
    }

    /// Like [`Database::new`], with an explicit lock wait. A call that cannot get
    /// the lock within `timeout` fails with `SQLITE_BUSY` instead of hanging.
    pub fn with_timeout(path: &str, timeout: Duration) -> Result<Self, DatabaseError> {
        let db_path = PathBuf::from(path);

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| DatabaseError::DirectoryError(e.to_string()))?;
            }
        }

        let conn = Connection::open(&db_path)?;
        conn.busy_timeout(timeout)?;

        let db = Database { conn };
        db.initialize_schema()?;
        Ok(db)
    }

    /// Private in-memory database, used by tests and dry runs
    pub fn in_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.initialize_schema()?;
        Ok(db)
    }

    fn initialize_schema(&self) -> Result<(), DatabaseError> {
        self.conn.execute_batch(
            "PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS clients (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                name            TEXT NOT NULL,
                phone           TEXT,
                email           TEXT,
                country_code    TEXT,
                is_quick_client INTEGER DEFAULT 0,
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS appointments (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                client_id       INTEGER REFERENCES clients(id) ON DELETE SET NULL,
                client_name     TEXT NOT NULL,
                date            TEXT NOT NULL,
                time            TEXT NOT NULL,
                service         TEXT NOT NULL,
                status          TEXT NOT NULL DEFAULT 'pending',
                notes           TEXT,
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS checklist_items (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                appointment_id  INTEGER NOT NULL REFERENCES appointments(id) ON DELETE CASCADE,
                text            TEXT NOT NULL,
                completed       INTEGER DEFAULT 0,
                position        INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS appointment_photos (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                appointment_id  INTEGER NOT NULL REFERENCES appointments(id) ON DELETE CASCADE,
                reference       TEXT NOT NULL,
                position        INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS notifications (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                appointment_id  INTEGER NOT NULL,
                kind            TEXT NOT NULL,
                title           TEXT NOT NULL,
                message         TEXT NOT NULL,
                scheduled_for   TEXT NOT NULL,
                state           TEXT NOT NULL DEFAULT 'scheduled',
                attempts        INTEGER NOT NULL DEFAULT 0,
                claimed_at      TEXT,
                sent_at         TEXT,
                last_error      TEXT,
                created_at      TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS user_settings (
                user_id         TEXT PRIMARY KEY,
                language        TEXT NOT NULL,
                updated_at      TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_clients_name ON clients(name);
            CREATE INDEX IF NOT EXISTS idx_appointments_date ON appointments(date, time);
            CREATE INDEX IF NOT EXISTS idx_checklist_appointment ON checklist_items(appointment_id);
            CREATE INDEX IF NOT EXISTS idx_photos_appointment ON appointment_photos(appointment_id);
            CREATE INDEX IF NOT EXISTS idx_notifications_due ON notifications(state, scheduled_for);
            CREATE INDEX IF NOT EXISTS idx_notifications_appointment ON notifications(appointment_id);",
        )?;
        Ok(())
    }

    /// Run `f` so that everything it writes is committed together or not at all.
    ///
    /// Backed by a savepoint, so calls nest: a workflow can wrap several store
    /// methods that are atomic on their own.
    pub fn atomically<T, E>(&self, f: impl FnOnce() -> Result<T, E>) -> Result<T, E>
    where
        E: From<DatabaseError>,
    {
        self.conn
            .execute_batch("SAVEPOINT salonbook_write")
            .map_err(|e| E::from(DatabaseError::from(e)))?;
        let result = f().and_then(|value| {
            self.conn
                .execute_batch("RELEASE salonbook_write")
                .map(|()| value)
                .map_err(|e| E::from(DatabaseError::from(e)))
        });
        if result.is_err() {
            if let Err(e) = self
                .conn
                .execute_batch("ROLLBACK TO salonbook_write; RELEASE salonbook_write")
            {
                tracing::warn!(error = %e, "Failed to roll back savepoint");
            }
        }
        result
    }

    /// Insert a client into the database and return its ID
    pub fn insert_client(&self, client: &Client) -> Result<i64, DatabaseError> {
        self.conn.execute(
            "INSERT INTO clients (name, phone, email, country_code, is_quick_client, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                client.name,
                client.phone,
                client.email,
                client.country_code,
                if client.is_quick_client { 1 } else { 0 },
                client.created_at,
                client.updated_at
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn row_to_client(row: &rusqlite::Row) -> Result<Client, rusqlite::Error> {
        Ok(Client {
            id: Some(row.get(0)?),
            name: row.get(1)?,
            phone: row.get(2)?,
            email: row.get(3)?,
            country_code: row.get(4)?,
            is_quick_client: row.get::<_, i64>(5)? != 0,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }

    /// Get a single client by ID
    pub fn get_client(&self, id: i64) -> Result<Client, DatabaseError> {
        self.conn
            .query_row(
                "SELECT id, name, phone, email, country_code, is_quick_client, created_at, updated_at
                 FROM clients WHERE id = ?1",
                rusqlite::params![id],
                Self::row_to_client,
            )
            .optional()?
            .ok_or(DatabaseError::NotFound { entity: "client", id })
    }

    /// Get all clients ordered by name
    pub fn get_all_clients(&self) -> Result<Vec<Client>, DatabaseError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, phone, email, country_code, is_quick_client, created_at, updated_at
             FROM clients ORDER BY name COLLATE NOCASE ASC, id ASC",
        )?;
        let clients = stmt
            .query_map([], Self::row_to_client)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(clients)
    }

    /// Insert an appointment (without checklist or photos) and return its ID
    pub fn insert_appointment(&self, appointment: &Appointment) -> Result<i64, DatabaseError> {
        self.conn.execute(
            "INSERT INTO appointments (client_id, client_name, date, time, service, status, notes, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            rusqlite::params![
                appointment.client_id,
                appointment.client_name,
                appointment.date.format("%Y-%m-%d").to_string(),
                appointment.time.format("%H:%M:%S").to_string(),
                appointment.service,
                appointment.status.as_str(),
                appointment.notes,
                appointment.created_at,
                appointment.updated_at
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Map a row to an Appointment with empty checklist and photos
    fn row_to_appointment(row: &rusqlite::Row) -> Result<Appointment, rusqlite::Error> {
        let date: String = row.get(3)?;
        let time: String = row.get(4)?;
        let status: String = row.get(6)?;
        Ok(Appointment {
            id: Some(row.get(0)?),
            client_id: row.get(1)?,
            client_name: row.get(2)?,
            date: NaiveDate::parse_from_str(&date, "%Y-%m-%d").map_err(|e| conversion_error(3, e))?,
            time: NaiveTime::parse_from_str(&time, "%H:%M:%S").map_err(|e| conversion_error(4, e))?,
            service: row.get(5)?,
            status: status.parse::<AppointmentStatus>().map_err(|e| conversion_error(6, e))?,
            notes: row.get(7)?,
            checklist: Vec::new(),
            photos: Vec::new(),
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }

    fn load_children(&self, appointment: &mut Appointment) -> Result<(), DatabaseError> {
        if let Some(id) = appointment.id {
            appointment.checklist = self.get_checklist(id)?;
            appointment.photos = self.get_photos(id)?;
        }
        Ok(())
    }

    /// Get a single appointment by ID, checklist and photos included
    pub fn get_appointment(&self, id: i64) -> Result<Appointment, DatabaseError> {
        let mut appointment = self
            .conn
            .query_row(
                &format!("SELECT {APPOINTMENT_COLUMNS} FROM appointments WHERE id = ?1"),
                rusqlite::params![id],
                Self::row_to_appointment,
            )
            .optional()?
            .ok_or(DatabaseError::NotFound { entity: "appointment", id })?;
        self.load_children(&mut appointment)?;
        Ok(appointment)
    }

    /// Get all appointments ordered by date then time, checklist and photos included
    pub fn get_all_appointments(&self) -> Result<Vec<Appointment>, DatabaseError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {APPOINTMENT_COLUMNS} FROM appointments ORDER BY date ASC, time ASC, id ASC"
        ))?;
        let mut appointments = stmt
            .query_map([], Self::row_to_appointment)?
            .collect::<Result<Vec<_>, _>>()?;
        for appointment in &mut appointments {
            self.load_children(appointment)?;
        }
        Ok(appointments)
    }

    fn touch_appointment(&self, id: i64, sql: &str, params: &[&dyn rusqlite::ToSql]) -> Result<(), DatabaseError> {
        let changed = self.conn.execute(sql, params)?;
        if changed == 0 {
            return Err(DatabaseError::NotFound { entity: "appointment", id });
        }
        Ok(())
    }

    pub fn update_appointment_status(&self, id: i64, status: AppointmentStatus) -> Result<(), DatabaseError> {
        self.touch_appointment(
            id,
            "UPDATE appointments SET status = ?1, updated_at = ?2 WHERE id = ?3",
            rusqlite::params![status.as_str(), timestamp_now(), id],
        )
    }

    pub fn update_appointment_schedule(&self, id: i64, date: NaiveDate, time: NaiveTime) -> Result<(), DatabaseError> {
        self.touch_appointment(
            id,
            "UPDATE appointments SET date = ?1, time = ?2, updated_at = ?3 WHERE id = ?4",
            rusqlite::params![
                date.format("%Y-%m-%d").to_string(),
                time.format("%H:%M:%S").to_string(),
                timestamp_now(),
                id
            ],
        )
    }

    pub fn update_appointment_notes(&self, id: i64, notes: Option<&str>) -> Result<(), DatabaseError> {
        self.touch_appointment(
            id,
            "UPDATE appointments SET notes = ?1, updated_at = ?2 WHERE id = ?3",
            rusqlite::params![notes, timestamp_now(), id],
        )
    }

    /// Delete an appointment together with its checklist and photos
    pub fn delete_appointment(&self, id: i64) -> Result<(), DatabaseError> {
        self.atomically(|| -> Result<(), DatabaseError> {
            self.conn
                .execute("DELETE FROM checklist_items WHERE appointment_id = ?1", rusqlite::params![id])?;
            self.conn
                .execute("DELETE FROM appointment_photos WHERE appointment_id = ?1", rusqlite::params![id])?;
            let changed = self
                .conn
                .execute("DELETE FROM appointments WHERE id = ?1", rusqlite::params![id])?;
            if changed == 0 {
                return Err(DatabaseError::NotFound { entity: "appointment", id });
            }
            Ok(())
        })
    }

    fn row_to_checklist_item(row: &rusqlite::Row) -> Result<ChecklistItem, rusqlite::Error> {
        Ok(ChecklistItem {
            id: Some(row.get(0)?),
            appointment_id: row.get(1)?,
            text: row.get(2)?,
            completed: row.get::<_, i64>(3)? != 0,
            position: row.get(4)?,
        })
    }

    pub fn get_checklist(&self, appointment_id: i64) -> Result<Vec<ChecklistItem>, DatabaseError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, appointment_id, text, completed, position
             FROM checklist_items WHERE appointment_id = ?1 ORDER BY position ASC, id ASC",
        )?;
        let items = stmt
            .query_map(rusqlite::params![appointment_id], Self::row_to_checklist_item)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(items)
    }

    /// Append a checklist item at the end of the appointment's list
    pub fn insert_checklist_item(&self, appointment_id: i64, text: &str) -> Result<ChecklistItem, DatabaseError> {
        let (id, position) = self.atomically(|| -> Result<(i64, i64), DatabaseError> {
            let position: i64 = self.conn.query_row(
                "SELECT COALESCE(MAX(position), -1) + 1 FROM checklist_items WHERE appointment_id = ?1",
                rusqlite::params![appointment_id],
                |row| row.get(0),
            )?;
            self.conn.execute(
                "INSERT INTO checklist_items (appointment_id, text, completed, position) VALUES (?1, ?2, 0, ?3)",
                rusqlite::params![appointment_id, text, position],
            )?;
            Ok((self.conn.last_insert_rowid(), position))
        })?;
        Ok(ChecklistItem {
            id: Some(id),
            appointment_id,
            text: text.to_string(),
            completed: false,
            position,
        })
    }

    /// Flip an item's completed flag and return the updated item
    pub fn toggle_checklist_item(&self, item_id: i64) -> Result<ChecklistItem, DatabaseError> {
        let changed = self.conn.execute(
            "UPDATE checklist_items SET completed = 1 - completed WHERE id = ?1",
            rusqlite::params![item_id],
        )?;
        if changed == 0 {
            return Err(DatabaseError::NotFound { entity: "checklist item", id: item_id });
        }
        let item = self.conn.query_row(
            "SELECT id, appointment_id, text, completed, position FROM checklist_items WHERE id = ?1",
            rusqlite::params![item_id],
            Self::row_to_checklist_item,
        )?;
        Ok(item)
    }

    pub fn delete_checklist_item(&self, item_id: i64) -> Result<(), DatabaseError> {
        let changed = self
            .conn
            .execute("DELETE FROM checklist_items WHERE id = ?1", rusqlite::params![item_id])?;
        if changed == 0 {
            return Err(DatabaseError::NotFound { entity: "checklist item", id: item_id });
        }
        Ok(())
    }

    pub fn get_photos(&self, appointment_id: i64) -> Result<Vec<PhotoRef>, DatabaseError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, appointment_id, reference, position
             FROM appointment_photos WHERE appointment_id = ?1 ORDER BY position ASC, id ASC",
        )?;
        let photos = stmt
            .query_map(rusqlite::params![appointment_id], |row| {
                Ok(PhotoRef {
                    id: Some(row.get(0)?),
                    appointment_id: row.get(1)?,
                    reference: row.get(2)?,
                    position: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(photos)
    }

    pub fn insert_photo(&self, appointment_id: i64, reference: &str) -> Result<PhotoRef, DatabaseError> {
        let (id, position) = self.atomically(|| -> Result<(i64, i64), DatabaseError> {
            let position: i64 = self.conn.query_row(
                "SELECT COALESCE(MAX(position), -1) + 1 FROM appointment_photos WHERE appointment_id = ?1",
                rusqlite::params![appointment_id],
                |row| row.get(0),
            )?;
            self.conn.execute(
                "INSERT INTO appointment_photos (appointment_id, reference, position) VALUES (?1, ?2, ?3)",
                rusqlite::params![appointment_id, reference, position],
            )?;
            Ok((self.conn.last_insert_rowid(), position))
        })?;
        Ok(PhotoRef {
            id: Some(id),
            appointment_id,
            reference: reference.to_string(),
            position,
        })
    }

    pub fn delete_photo(&self, photo_id: i64) -> Result<(), DatabaseError> {
        let changed = self
            .conn
            .execute("DELETE FROM appointment_photos WHERE id = ?1", rusqlite::params![photo_id])?;
        if changed == 0 {
            return Err(DatabaseError::NotFound { entity: "photo", id: photo_id });
        }
        Ok(())
    }

    fn row_to_notification(row: &rusqlite::Row) -> Result<NotificationRecord, rusqlite::Error> {
        let kind: String = row.get(2)?;
        let scheduled_for: String = row.get(5)?;
        let state: String = row.get(6)?;
        let claimed_at: Option<String> = row.get(8)?;
        Ok(NotificationRecord {
            id: Some(row.get(0)?),
            appointment_id: row.get(1)?,
            kind: NotificationKind::parse(&kind).ok_or_else(|| conversion_error(2, UnknownValue(kind.clone())))?,
            title: row.get(3)?,
            message: row.get(4)?,
            scheduled_for: parse_timestamp(&scheduled_for).map_err(|e| conversion_error(5, e))?,
            state: NotificationState::parse(&state).ok_or_else(|| conversion_error(6, UnknownValue(state.clone())))?,
            attempts: row.get::<_, i64>(7)?.max(0) as u32,
            claimed_at: claimed_at
                .as_deref()
                .map(parse_timestamp)
                .transpose()
                .map_err(|e| conversion_error(8, e))?,
            last_error: row.get(9)?,
            created_at: row.get(10)?,
        })
    }

    /// Insert all records in one transaction and return their IDs in order.
    /// Either every record is stored or none is.
    pub fn insert_notifications(&self, records: &[NotificationRecord]) -> Result<Vec<i64>, DatabaseError> {
        self.atomically(|| -> Result<Vec<i64>, DatabaseError> {
            let mut ids = Vec::with_capacity(records.len());
            for record in records {
                self.conn.execute(
                    "INSERT INTO notifications (appointment_id, kind, title, message, scheduled_for, state, attempts, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    rusqlite::params![
                        record.appointment_id,
                        record.kind.as_str(),
                        record.title,
                        record.message,
                        format_timestamp(&record.scheduled_for),
                        record.state.as_str(),
                        i64::from(record.attempts),
                        record.created_at
                    ],
                )?;
                ids.push(self.conn.last_insert_rowid());
            }
            Ok(ids)
        })
    }

    /// Unread records due at `now`, earliest first. Claims older than
    /// `stale_before` are treated as abandoned and come back as due.
    pub fn get_due_notifications(
        &self,
        now: NaiveDateTime,
        stale_before: NaiveDateTime,
    ) -> Result<Vec<NotificationRecord>, DatabaseError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications
             WHERE scheduled_for <= ?1
               AND (state = 'scheduled' OR (state = 'sending' AND claimed_at <= ?2))
             ORDER BY scheduled_for ASC, id ASC"
        ))?;
        let records = stmt
            .query_map(
                rusqlite::params![format_timestamp(&now), format_timestamp(&stale_before)],
                Self::row_to_notification,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    pub fn get_notifications_for_appointment(&self, appointment_id: i64) -> Result<Vec<NotificationRecord>, DatabaseError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications
             WHERE appointment_id = ?1 ORDER BY scheduled_for ASC, id ASC"
        ))?;
        let records = stmt
            .query_map(rusqlite::params![appointment_id], Self::row_to_notification)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    pub fn get_notification(&self, id: i64) -> Result<NotificationRecord, DatabaseError> {
        self.conn
            .query_row(
                &format!("SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE id = ?1"),
                rusqlite::params![id],
                Self::row_to_notification,
            )
            .optional()?
            .ok_or(DatabaseError::NotFound { entity: "notification", id })
    }

    /// Atomically take ownership of a due record for delivery.
    ///
    /// Succeeds for exactly one caller: the update only matches a record that
    /// is still `scheduled` (or whose claim went stale). Returns the attempt
    /// number now in progress, or `None` when someone else holds the record.
    pub fn claim_notification(
        &self,
        id: i64,
        now: NaiveDateTime,
        stale_before: NaiveDateTime,
    ) -> Result<Option<u32>, DatabaseError> {
        let attempts: Option<i64> = self
            .conn
            .query_row(
                "UPDATE notifications
                 SET state = 'sending', claimed_at = ?2, attempts = attempts + 1
                 WHERE id = ?1
                   AND scheduled_for <= ?2
                   AND (state = 'scheduled' OR (state = 'sending' AND claimed_at <= ?3))
                 RETURNING attempts",
                rusqlite::params![id, format_timestamp(&now), format_timestamp(&stale_before)],
                |row| row.get(0),
            )
            .optional()?;
        Ok(attempts.map(|n| n.max(0) as u32))
    }

    /// Commit a confirmed delivery. Returns false when the claim was lost in the meantime.
    pub fn mark_notification_sent(&self, id: i64, now: NaiveDateTime) -> Result<bool, DatabaseError> {
        let changed = self.conn.execute(
            "UPDATE notifications
             SET state = 'sent', sent_at = ?2, claimed_at = NULL, last_error = NULL
             WHERE id = ?1 AND state = 'sending'",
            rusqlite::params![id, format_timestamp(&now)],
        )?;
        Ok(changed == 1)
    }

    /// Give a claimed record back after a failed delivery, either for another
    /// attempt (`Scheduled`) or as a dead letter (`Failed`).
    pub fn release_notification(
        &self,
        id: i64,
        next: NotificationState,
        error: &str,
    ) -> Result<(), DatabaseError> {
        self.conn.execute(
            "UPDATE notifications
             SET state = ?2, claimed_at = NULL, last_error = ?3
             WHERE id = ?1 AND state = 'sending'",
            rusqlite::params![id, next.as_str(), error],
        )?;
        Ok(())
    }

    /// Delete every record of the appointment that was not delivered yet
    pub fn delete_unread_notifications(&self, appointment_id: i64) -> Result<usize, DatabaseError> {
        let deleted = self.conn.execute(
            "DELETE FROM notifications WHERE appointment_id = ?1 AND state <> 'sent'",
            rusqlite::params![appointment_id],
        )?;
        Ok(deleted)
    }

    /// Number of records [`Database::get_due_notifications`] would return
    pub fn count_due_notifications(
        &self,
        now: NaiveDateTime,
        stale_before: NaiveDateTime,
    ) -> Result<usize, DatabaseError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM notifications
             WHERE scheduled_for <= ?1
               AND (state = 'scheduled' OR (state = 'sending' AND claimed_at <= ?2))",
            rusqlite::params![format_timestamp(&now), format_timestamp(&stale_before)],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as usize)
    }

    pub fn get_user_settings(&self, user_id: &str) -> Result<Option<UserSettings>, DatabaseError> {
        let row: Option<(String, String, String)> = self
            .conn
            .query_row(
                "SELECT user_id, language, updated_at FROM user_settings WHERE user_id = ?1",
                rusqlite::params![user_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        row.map(|(user_id, language, updated_at)| {
            let language = language
                .parse::<Language>()
                .map_err(|e| DatabaseError::SqliteError(conversion_error(1, e)))?;
            Ok::<_, DatabaseError>(UserSettings { user_id, language, updated_at })
        })
        .transpose()
    }

    /// Insert or replace the settings row keyed by `user_id`
    pub fn upsert_user_settings(&self, settings: &UserSettings) -> Result<(), DatabaseError> {
        self.conn.execute(
            "INSERT INTO user_settings (user_id, language, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id) DO UPDATE SET language = excluded.language, updated_at = excluded.updated_at",
            rusqlite::params![settings.user_id, settings.language.code(), settings.updated_at],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_appointment(db: &Database) -> i64 {
        let apt = Appointment::new(
            "Ana".to_string(),
            NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            NaiveTime::from_hms_opt(14, 30, 0).unwrap(),
            "Corte".to_string(),
        );
        db.insert_appointment(&apt).unwrap()
    }

    #[test]
    fn appointment_round_trips_with_children() {
        let db = Database::in_memory().unwrap();
        let id = sample_appointment(&db);
        db.insert_checklist_item(id, "Lavar").unwrap();
        db.insert_checklist_item(id, "Secar").unwrap();
        db.insert_photo(id, "photos/antes.jpg").unwrap();

        let apt = db.get_appointment(id).unwrap();
        assert_eq!(apt.client_name, "Ana");
        assert_eq!(apt.status, AppointmentStatus::Pending);
        let texts: Vec<_> = apt.checklist.iter().map(|i| i.text.as_str()).collect();
        assert_eq!(texts, vec!["Lavar", "Secar"]);
        assert_eq!(apt.checklist[1].position, 1);
        assert_eq!(apt.photos[0].reference, "photos/antes.jpg");
    }

    #[test]
    fn updates_on_missing_rows_report_not_found() {
        let db = Database::in_memory().unwrap();
        let err = db.update_appointment_status(42, AppointmentStatus::Confirmed).unwrap_err();
        assert!(err.is_not_found());
        assert!(db.toggle_checklist_item(7).unwrap_err().is_not_found());
        assert!(db.get_client(3).unwrap_err().is_not_found());
    }

    #[test]
    fn toggle_flips_completed_flag() {
        let db = Database::in_memory().unwrap();
        let id = sample_appointment(&db);
        let item = db.insert_checklist_item(id, "Hidratar").unwrap();
        let item_id = item.id.unwrap();
        assert!(db.toggle_checklist_item(item_id).unwrap().completed);
        assert!(!db.toggle_checklist_item(item_id).unwrap().completed);
    }

    #[test]
    fn delete_appointment_removes_children() {
        let db = Database::in_memory().unwrap();
        let id = sample_appointment(&db);
        db.insert_checklist_item(id, "Lavar").unwrap();
        db.insert_photo(id, "a.jpg").unwrap();
        db.delete_appointment(id).unwrap();
        assert!(db.get_appointment(id).unwrap_err().is_not_found());
        assert!(db.get_checklist(id).unwrap().is_empty());
        assert!(db.get_photos(id).unwrap().is_empty());
    }

    #[test]
    fn atomically_discards_every_write_on_error() {
        let db = Database::in_memory().unwrap();
        let id = sample_appointment(&db);
        let result = db.atomically(|| -> Result<(), DatabaseError> {
            db.insert_checklist_item(id, "Lavar")?;
            db.update_appointment_status(id, AppointmentStatus::Confirmed)?;
            db.update_appointment_status(99, AppointmentStatus::Confirmed)
        });
        assert!(result.unwrap_err().is_not_found());
        let apt = db.get_appointment(id).unwrap();
        assert_eq!(apt.status, AppointmentStatus::Pending);
        assert!(apt.checklist.is_empty());

        db.atomically(|| -> Result<(), DatabaseError> {
            db.insert_photo(id, "a.jpg")?;
            db.insert_photo(id, "b.jpg")?;
            Ok(())
        })
        .unwrap();
        assert_eq!(db.get_photos(id).unwrap().len(), 2);
    }

    #[test]
    fn due_count_matches_due_list_including_stale_claims() {
        let db = Database::in_memory().unwrap();
        let id = sample_appointment(&db);
        let at = |s: &str| parse_timestamp(s).unwrap();
        let record = NotificationRecord::new(
            id,
            NotificationKind::TenMinutesBefore,
            at("2024-06-01T14:20:00"),
            "Lembrete".into(),
            "Corte".into(),
        );
        let ids = db.insert_notifications(&[record]).unwrap();
        db.claim_notification(ids[0], at("2024-06-01T14:20:00"), at("2024-06-01T14:15:00"))
            .unwrap();

        let (now, stale_before) = (at("2024-06-01T14:21:00"), at("2024-06-01T14:16:00"));
        assert_eq!(db.count_due_notifications(now, stale_before).unwrap(), 0);
        assert!(db.get_due_notifications(now, stale_before).unwrap().is_empty());

        let (now, stale_before) = (at("2024-06-01T14:30:00"), at("2024-06-01T14:25:00"));
        assert_eq!(db.count_due_notifications(now, stale_before).unwrap(), 1);
        assert_eq!(db.get_due_notifications(now, stale_before).unwrap().len(), 1);
    }

    #[test]
    fn user_settings_upsert_replaces_language() {
        let db = Database::in_memory().unwrap();
        assert_eq!(db.get_user_settings("local").unwrap(), None);
        db.upsert_user_settings(&UserSettings::new("local".into(), Language::En)).unwrap();
        db.upsert_user_settings(&UserSettings::new("local".into(), Language::Fr)).unwrap();
        let settings = db.get_user_settings("local").unwrap().unwrap();
        assert_eq!(settings.language, Language::Fr);
    }

    #[test]
    fn clients_sorted_by_name() {
        let db = Database::in_memory().unwrap();
        for name in ["carla", "Ana", "bruno"] {
            db.insert_client(&Client::new(name.to_string())).unwrap();
        }
        let names: Vec<_> = db.get_all_clients().unwrap().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["Ana", "bruno", "carla"]);
    }
}
