use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;
use crate::i18n::Language;
use crate::utils::timestamp_now;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Client {
    pub id: Option<i64>,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub country_code: Option<String>, // e.g. "+55"
    pub is_quick_client: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl Client {
    pub fn new(name: String) -> Self {
        let now = timestamp_now();
        Self {
            id: None,
            name,
            phone: None,
            email: None,
            country_code: None,
            is_quick_client: false,
            created_at: now.clone(),
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
}

impl AppointmentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, AppointmentStatus::Completed | AppointmentStatus::Cancelled)
    }

    /// Whether moving from `self` to `next` is allowed.
    /// Re-applying the current status is not a transition.
    pub fn can_transition_to(self, next: AppointmentStatus) -> bool {
        use AppointmentStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed)
                | (Pending, Completed)
                | (Confirmed, Completed)
                | (Pending, Cancelled)
                | (Confirmed, Cancelled)
        )
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppointmentStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(AppointmentStatus::Pending),
            "confirmed" => Ok(AppointmentStatus::Confirmed),
            "completed" => Ok(AppointmentStatus::Completed),
            "cancelled" | "canceled" => Ok(AppointmentStatus::Cancelled),
            other => Err(ValidationError::UnknownStatus(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistItem {
    pub id: Option<i64>,
    pub appointment_id: i64,
    pub text: String,
    pub completed: bool,
    pub position: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhotoRef {
    pub id: Option<i64>,
    pub appointment_id: i64,
    pub reference: String, // file path or URI
    pub position: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Option<i64>,
    pub client_id: Option<i64>,
    pub client_name: String, // denormalized, also covers walk-ins without a client row
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub service: String,
    pub status: AppointmentStatus,
    pub notes: Option<String>,
    pub checklist: Vec<ChecklistItem>,
    pub photos: Vec<PhotoRef>,
    pub created_at: String,
    pub updated_at: String,
}

impl Appointment {
    pub fn new(client_name: String, date: NaiveDate, time: NaiveTime, service: String) -> Self {
        let now = timestamp_now();
        Self {
            id: None,
            client_id: None,
            client_name,
            date,
            time,
            service,
            status: AppointmentStatus::Pending,
            notes: None,
            checklist: Vec::new(),
            photos: Vec::new(),
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// (completed, total, percent) for the checklist
    pub fn checklist_progress(&self) -> (usize, usize, u8) {
        let total = self.checklist.len();
        let done = self.checklist.iter().filter(|item| item.completed).count();
        let percent = if total == 0 { 0 } else { (done * 100 / total) as u8 };
        (done, total, percent)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationKind {
    #[serde(rename = "reminder_10min")]
    TenMinutesBefore,
    #[serde(rename = "reminder_1day")]
    OneDayBefore,
}

impl NotificationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationKind::TenMinutesBefore => "reminder_10min",
            NotificationKind::OneDayBefore => "reminder_1day",
        }
    }

    /// How far ahead of the appointment the reminder fires
    pub fn offset(self) -> Duration {
        match self {
            NotificationKind::TenMinutesBefore => Duration::minutes(10),
            NotificationKind::OneDayBefore => Duration::hours(24),
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "reminder_10min" => Some(NotificationKind::TenMinutesBefore),
            "reminder_1day" => Some(NotificationKind::OneDayBefore),
            _ => None,
        }
    }
}

/// Delivery lifecycle of a reminder.
///
/// `Scheduled` → `Sending` (claimed by one poller) → `Sent`.
/// A failed delivery puts the record back to `Scheduled`, or into `Failed`
/// once it ran out of attempts. Cancelling deletes unread records outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationState {
    Scheduled,
    Sending,
    Sent,
    Failed,
}

impl NotificationState {
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationState::Scheduled => "scheduled",
            NotificationState::Sending => "sending",
            NotificationState::Sent => "sent",
            NotificationState::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "scheduled" => Some(NotificationState::Scheduled),
            "sending" => Some(NotificationState::Sending),
            "sent" => Some(NotificationState::Sent),
            "failed" => Some(NotificationState::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: Option<i64>,
    pub appointment_id: i64,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub scheduled_for: NaiveDateTime,
    pub state: NotificationState,
    pub attempts: u32,
    pub claimed_at: Option<NaiveDateTime>,
    pub last_error: Option<String>,
    pub created_at: String,
}

impl NotificationRecord {
    pub fn new(
        appointment_id: i64,
        kind: NotificationKind,
        scheduled_for: NaiveDateTime,
        title: String,
        message: String,
    ) -> Self {
        Self {
            id: None,
            appointment_id,
            kind,
            title,
            message,
            scheduled_for,
            state: NotificationState::Scheduled,
            attempts: 0,
            claimed_at: None,
            last_error: None,
            created_at: timestamp_now(),
        }
    }

    /// A reminder counts as read once it has been delivered
    pub fn is_read(&self) -> bool {
        self.state == NotificationState::Sent
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSettings {
    pub user_id: String,
    pub language: Language,
    pub updated_at: String,
}

impl UserSettings {
    pub fn new(user_id: String, language: Language) -> Self {
        Self {
            user_id,
            language,
            updated_at: timestamp_now(),
        }
    }
}
