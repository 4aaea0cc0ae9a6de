//! Reminder scheduling and delivery.
//!
//! Every appointment gets a reminder ten minutes before it starts, and one a
//! day ahead when the client left a phone number or email. A poller picks up
//! due reminders, claims each one so concurrent pollers never deliver the same
//! record twice, hands it to a [`DeliveryChannel`] and only marks it read once
//! the channel confirmed delivery.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;
use thiserror::Error;

use crate::database::{Database, DatabaseError};
use crate::delivery::DeliveryChannel;
use crate::error::ValidationError;
use crate::models::{NotificationKind, NotificationRecord, NotificationState};
use crate::utils::{self, parse_date, parse_time};

pub const REMINDER_TITLE: &str = "Appointment reminder";
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_CLAIM_TTL: Duration = Duration::minutes(5);

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
    #[error("Storage error: {0}")]
    Storage(#[from] DatabaseError),
    #[error("Notification has no id, it was never stored")]
    Unsaved,
}

/// Storage primitives the scheduler relies on
pub trait NotificationStore {
    fn insert_notifications(&self, records: &[NotificationRecord]) -> Result<Vec<i64>, DatabaseError>;
    fn due_notifications(
        &self,
        now: NaiveDateTime,
        stale_before: NaiveDateTime,
    ) -> Result<Vec<NotificationRecord>, DatabaseError>;
    fn claim_notification(
        &self,
        id: i64,
        now: NaiveDateTime,
        stale_before: NaiveDateTime,
    ) -> Result<Option<u32>, DatabaseError>;
    fn mark_notification_sent(&self, id: i64, now: NaiveDateTime) -> Result<bool, DatabaseError>;
    fn release_notification(&self, id: i64, next: NotificationState, error: &str) -> Result<(), DatabaseError>;
    fn delete_unread_notifications(&self, appointment_id: i64) -> Result<usize, DatabaseError>;
    fn count_due_notifications(&self, now: NaiveDateTime, stale_before: NaiveDateTime) -> Result<usize, DatabaseError>;
}

impl NotificationStore for Database {
    fn insert_notifications(&self, records: &[NotificationRecord]) -> Result<Vec<i64>, DatabaseError> {
        Database::insert_notifications(self, records)
    }

    fn due_notifications(
        &self,
        now: NaiveDateTime,
        stale_before: NaiveDateTime,
    ) -> Result<Vec<NotificationRecord>, DatabaseError> {
        self.get_due_notifications(now, stale_before)
    }

    fn claim_notification(
        &self,
        id: i64,
        now: NaiveDateTime,
        stale_before: NaiveDateTime,
    ) -> Result<Option<u32>, DatabaseError> {
        Database::claim_notification(self, id, now, stale_before)
    }

    fn mark_notification_sent(&self, id: i64, now: NaiveDateTime) -> Result<bool, DatabaseError> {
        Database::mark_notification_sent(self, id, now)
    }

    fn release_notification(&self, id: i64, next: NotificationState, error: &str) -> Result<(), DatabaseError> {
        Database::release_notification(self, id, next, error)
    }

    fn delete_unread_notifications(&self, appointment_id: i64) -> Result<usize, DatabaseError> {
        Database::delete_unread_notifications(self, appointment_id)
    }

    fn count_due_notifications(&self, now: NaiveDateTime, stale_before: NaiveDateTime) -> Result<usize, DatabaseError> {
        Database::count_due_notifications(self, now, stale_before)
    }
}

impl<T: NotificationStore + ?Sized> NotificationStore for &T {
    fn insert_notifications(&self, records: &[NotificationRecord]) -> Result<Vec<i64>, DatabaseError> {
        (**self).insert_notifications(records)
    }

    fn due_notifications(
        &self,
        now: NaiveDateTime,
        stale_before: NaiveDateTime,
    ) -> Result<Vec<NotificationRecord>, DatabaseError> {
        (**self).due_notifications(now, stale_before)
    }

    fn claim_notification(
        &self,
        id: i64,
        now: NaiveDateTime,
        stale_before: NaiveDateTime,
    ) -> Result<Option<u32>, DatabaseError> {
        (**self).claim_notification(id, now, stale_before)
    }

    fn mark_notification_sent(&self, id: i64, now: NaiveDateTime) -> Result<bool, DatabaseError> {
        (**self).mark_notification_sent(id, now)
    }

    fn release_notification(&self, id: i64, next: NotificationState, error: &str) -> Result<(), DatabaseError> {
        (**self).release_notification(id, next, error)
    }

    fn delete_unread_notifications(&self, appointment_id: i64) -> Result<usize, DatabaseError> {
        (**self).delete_unread_notifications(appointment_id)
    }

    fn count_due_notifications(&self, now: NaiveDateTime, stale_before: NaiveDateTime) -> Result<usize, DatabaseError> {
        (**self).count_due_notifications(now, stale_before)
    }
}

/// What the scheduler needs to know about an appointment
#[derive(Debug, Clone, PartialEq)]
pub struct ReminderRequest {
    pub appointment_id: i64,
    pub client_name: String,
    pub client_phone: Option<String>,
    pub client_email: Option<String>,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub service: String,
}

impl ReminderRequest {
    /// Build a request from raw date (YYYY-MM-DD) and time (HH:MM) text
    pub fn from_parts(
        appointment_id: i64,
        client_name: &str,
        client_phone: Option<&str>,
        client_email: Option<&str>,
        date: &str,
        time: &str,
        service: &str,
    ) -> Result<Self, ValidationError> {
        Ok(Self {
            appointment_id,
            client_name: client_name.to_string(),
            client_phone: client_phone.map(str::to_string),
            client_email: client_email.map(str::to_string),
            date: parse_date(date)?,
            time: parse_time(time)?,
            service: service.to_string(),
        })
    }

    pub fn starts_at(&self) -> NaiveDateTime {
        utils::combine(self.date, self.time)
    }

    pub fn has_contact(&self) -> bool {
        has_text(&self.client_phone) || has_text(&self.client_email)
    }
}

fn has_text(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

/// Reminder records for `request`, not yet stored.
///
/// The ten-minute reminder always comes first; the day-ahead one is only
/// added when the client can be contacted.
pub fn build_reminders(request: &ReminderRequest) -> Result<Vec<NotificationRecord>, ValidationError> {
    let starts_at = request.starts_at();
    let mut kinds = vec![NotificationKind::TenMinutesBefore];
    if request.has_contact() {
        kinds.push(NotificationKind::OneDayBefore);
    }

    kinds
        .into_iter()
        .map(|kind| {
            let scheduled_for = starts_at
                .checked_sub_signed(kind.offset())
                .ok_or_else(|| ValidationError::InvalidDate(request.date.to_string()))?;
            let message = match kind {
                NotificationKind::TenMinutesBefore => format!(
                    "Reminder: {} with {} in 10 minutes",
                    request.service, request.client_name
                ),
                NotificationKind::OneDayBefore => format!(
                    "Reminder: you have {} scheduled for tomorrow at {}",
                    request.service,
                    request.time.format("%H:%M")
                ),
            };
            Ok(NotificationRecord::new(
                request.appointment_id,
                kind,
                scheduled_for,
                REMINDER_TITLE.to_string(),
                message,
            ))
        })
        .collect()
}

#[derive(Debug, Clone, Copy)]
pub struct SchedulerSettings {
    /// Delivery attempts before a reminder is parked as `failed`
    pub max_attempts: u32,
    /// A claim older than this is considered abandoned by a crashed poller
    pub claim_ttl: Duration,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            claim_ttl: DEFAULT_CLAIM_TTL,
        }
    }
}

/// Result of one delivery attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    /// Another poller holds the record; nothing was dispatched
    AlreadyClaimed,
    /// Delivery failed, the record is due again on the next poll
    Retrying { attempt: u32, error: String },
    /// Delivery failed for the last allowed time
    DeadLettered { attempts: u32, error: String },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProcessReport {
    /// Due records fetched in this run
    pub processed: usize,
    pub sent: usize,
    pub retrying: usize,
    pub dead_lettered: usize,
    pub skipped: usize,
    pub errors: usize,
}

pub struct NotificationScheduler<S, C> {
    store: S,
    channel: C,
    settings: SchedulerSettings,
}

impl<S: NotificationStore, C: DeliveryChannel> NotificationScheduler<S, C> {
    pub fn new(store: S, channel: C, settings: SchedulerSettings) -> Self {
        Self { store, channel, settings }
    }

    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    /// Compute and store the reminders for an appointment.
    /// All records are inserted together; on a storage error none are.
    pub fn schedule_notifications(&self, request: &ReminderRequest) -> Result<Vec<NotificationRecord>, SchedulerError> {
        let mut records = build_reminders(request)?;
        let ids = self.store.insert_notifications(&records)?;
        for (record, id) in records.iter_mut().zip(ids) {
            record.id = Some(id);
        }
        tracing::info!(
            appointment_id = request.appointment_id,
            count = records.len(),
            "Scheduled reminders"
        );
        Ok(records)
    }

    /// Due, unread reminders, earliest first. Read failures yield an empty list.
    pub fn get_pending_notifications(&self) -> Vec<NotificationRecord> {
        self.get_pending_notifications_at(utils::now_local())
    }

    pub fn get_pending_notifications_at(&self, now: NaiveDateTime) -> Vec<NotificationRecord> {
        match self.store.due_notifications(now, self.stale_before(now)) {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to fetch pending notifications");
                Vec::new()
            }
        }
    }

    pub fn unread_count(&self) -> usize {
        self.unread_count_at(utils::now_local())
    }

    /// Number of due reminders waiting for delivery, 0 when the store is unreachable
    pub fn unread_count_at(&self, now: NaiveDateTime) -> usize {
        self.store
            .count_due_notifications(now, self.stale_before(now))
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Failed to count pending notifications");
                0
            })
    }

    pub fn send_notification(&self, record: &NotificationRecord) -> Result<SendOutcome, SchedulerError> {
        self.send_notification_at(record, utils::now_local())
    }

    /// Claim, deliver, then commit. A failed delivery is never marked read.
    pub fn send_notification_at(
        &self,
        record: &NotificationRecord,
        now: NaiveDateTime,
    ) -> Result<SendOutcome, SchedulerError> {
        let id = record.id.ok_or(SchedulerError::Unsaved)?;

        let Some(attempt) = self.store.claim_notification(id, now, self.stale_before(now))? else {
            tracing::debug!(notification_id = id, "Notification claimed elsewhere, skipping");
            return Ok(SendOutcome::AlreadyClaimed);
        };

        match self.channel.deliver(record) {
            Ok(()) => {
                if !self.store.mark_notification_sent(id, now)? {
                    tracing::warn!(notification_id = id, "Claim expired before delivery was committed");
                }
                tracing::info!(notification_id = id, appointment_id = record.appointment_id, "Notification sent");
                Ok(SendOutcome::Sent)
            }
            Err(e) => {
                let error = e.to_string();
                if attempt >= self.settings.max_attempts {
                    self.store.release_notification(id, NotificationState::Failed, &error)?;
                    tracing::warn!(notification_id = id, attempts = attempt, error = %error, "Notification dead-lettered");
                    Ok(SendOutcome::DeadLettered { attempts: attempt, error })
                } else {
                    self.store.release_notification(id, NotificationState::Scheduled, &error)?;
                    tracing::warn!(notification_id = id, attempt, error = %error, "Notification delivery failed, will retry");
                    Ok(SendOutcome::Retrying { attempt, error })
                }
            }
        }
    }

    pub fn process_notifications(&self) -> ProcessReport {
        self.process_notifications_at(utils::now_local())
    }

    /// Deliver every due reminder. Failures on one record do not stop the run.
    pub fn process_notifications_at(&self, now: NaiveDateTime) -> ProcessReport {
        let pending = self.get_pending_notifications_at(now);
        let mut report = ProcessReport {
            processed: pending.len(),
            ..ProcessReport::default()
        };

        for record in &pending {
            match self.send_notification_at(record, now) {
                Ok(SendOutcome::Sent) => report.sent += 1,
                Ok(SendOutcome::AlreadyClaimed) => report.skipped += 1,
                Ok(SendOutcome::Retrying { .. }) => report.retrying += 1,
                Ok(SendOutcome::DeadLettered { .. }) => report.dead_lettered += 1,
                Err(e) => {
                    report.errors += 1;
                    tracing::warn!(notification_id = ?record.id, error = %e, "Failed to send notification");
                }
            }
        }

        if report.processed > 0 {
            tracing::info!(
                processed = report.processed,
                sent = report.sent,
                retrying = report.retrying,
                dead_lettered = report.dead_lettered,
                "Processed notifications"
            );
        }
        report
    }

    /// Drop every undelivered reminder of an appointment. Delivered ones stay.
    pub fn cancel_notifications(&self, appointment_id: i64) -> Result<usize, SchedulerError> {
        let removed = self.store.delete_unread_notifications(appointment_id)?;
        tracing::info!(appointment_id, removed, "Cancelled reminders");
        Ok(removed)
    }

    /// Recompute reminders after the appointment moved
    pub fn reschedule_notifications(&self, request: &ReminderRequest) -> Result<Vec<NotificationRecord>, SchedulerError> {
        self.cancel_notifications(request.appointment_id)?;
        self.schedule_notifications(request)
    }

    /// Run `process_notifications` every `interval`, `cycles` times or forever
    pub fn poll(&self, interval: std::time::Duration, cycles: Option<u64>) -> ProcessReport {
        let mut total = ProcessReport::default();
        let mut run = 0u64;
        loop {
            let report = self.process_notifications();
            total.processed += report.processed;
            total.sent += report.sent;
            total.retrying += report.retrying;
            total.dead_lettered += report.dead_lettered;
            total.skipped += report.skipped;
            total.errors += report.errors;

            run += 1;
            if cycles.is_some_and(|limit| run >= limit) {
                return total;
            }
            std::thread::sleep(interval);
        }
    }

    fn stale_before(&self, now: NaiveDateTime) -> NaiveDateTime {
        now.checked_sub_signed(self.settings.claim_ttl).unwrap_or(now)
    }
}
