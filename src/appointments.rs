use chrono::NaiveDate;
use thiserror::Error;

use crate::database::{Database, DatabaseError};
use crate::dates::{self, ViewMode};
use crate::delivery::DeliveryChannel;
use crate::error::ValidationError;
use crate::i18n::Language;
use crate::models::{
    Appointment, AppointmentStatus, ChecklistItem, Client, NotificationRecord, PhotoRef, UserSettings,
};
use crate::notifications::{
    NotificationScheduler, ReminderRequest, SchedulerError, SchedulerSettings,
};
use crate::phone::{format_phone_number, validate_email};
use crate::utils::{parse_date, parse_time};

#[derive(Debug, Error)]
pub enum AgendaError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Storage error: {0}")]
    Storage(#[from] DatabaseError),
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
    #[error("Cannot change appointment status from {from} to {to}")]
    InvalidTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },
    #[error("Appointment {id} is {status} and can no longer be changed")]
    Terminal { id: i64, status: AppointmentStatus },
}

#[derive(Debug, Clone)]
pub struct AgendaOptions {
    pub user_id: String,
    pub default_language: Language,
    pub default_country_code: String,
    pub scheduler: SchedulerSettings,
}

impl Default for AgendaOptions {
    fn default() -> Self {
        Self {
            user_id: "local".to_string(),
            default_language: Language::default(),
            default_country_code: "+55".to_string(),
            scheduler: SchedulerSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewClient {
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub country_code: Option<String>,
    pub is_quick_client: bool,
}

/// Raw appointment input. Either `client_id` or `client_name` (walk-in) is required.
#[derive(Debug, Clone, Default)]
pub struct NewAppointment {
    pub client_id: Option<i64>,
    pub client_name: Option<String>,
    pub date: String,
    pub time: String,
    pub service: String,
    pub notes: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required(value: &str, field: &'static str) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField(field));
    }
    Ok(trimmed.to_string())
}

/// Client, appointment and reminder workflows over one database.
///
/// Write paths return their errors; only reminder polling and preference
/// reads fall back to defaults.
pub struct Agenda<'a, C: DeliveryChannel> {
    db: &'a Database,
    scheduler: NotificationScheduler<&'a Database, C>,
    options: AgendaOptions,
}

impl<'a, C: DeliveryChannel> Agenda<'a, C> {
    pub fn new(db: &'a Database, channel: C, options: AgendaOptions) -> Self {
        let scheduler = NotificationScheduler::new(db, channel, options.scheduler);
        Self { db, scheduler, options }
    }

    pub fn scheduler(&self) -> &NotificationScheduler<&'a Database, C> {
        &self.scheduler
    }

    pub fn create_client(&self, input: NewClient) -> Result<Client, AgendaError> {
        let name = required(&input.name, "client name")?;
        let email = non_blank(input.email);
        if let Some(email) = &email {
            validate_email(email)?;
        }
        let country_code = non_blank(input.country_code)
            .unwrap_or_else(|| self.options.default_country_code.clone());
        let phone = non_blank(input.phone).map(|p| format_phone_number(&p, &country_code));

        let mut client = Client::new(name);
        client.phone = phone;
        client.email = email;
        client.country_code = Some(country_code);
        client.is_quick_client = input.is_quick_client;

        let id = self.db.insert_client(&client)?;
        client.id = Some(id);
        tracing::info!(client_id = id, quick = client.is_quick_client, "Client created");
        Ok(client)
    }

    pub fn list_clients(&self) -> Result<Vec<Client>, AgendaError> {
        Ok(self.db.get_all_clients()?)
    }

    /// Store a new pending appointment and schedule its reminders.
    /// The appointment is only kept if its reminders are stored too.
    pub fn create_appointment(&self, input: NewAppointment) -> Result<Appointment, AgendaError> {
        let date = parse_date(&input.date)?;
        let time = parse_time(&input.time)?;
        let service = required(&input.service, "service")?;

        let client = match input.client_id {
            Some(client_id) => Some(self.db.get_client(client_id)?),
            None => None,
        };
        let client_name = match &client {
            Some(c) => c.name.clone(),
            None => required(input.client_name.as_deref().unwrap_or(""), "client name")?,
        };

        let mut appointment = Appointment::new(client_name, date, time, service);
        appointment.client_id = input.client_id;
        appointment.notes = non_blank(input.notes);

        let id = self.db.atomically(|| -> Result<i64, AgendaError> {
            let id = self.db.insert_appointment(&appointment)?;
            let request = reminder_request(id, &appointment, client.as_ref());
            self.scheduler.schedule_notifications(&request)?;
            Ok(id)
        })?;
        appointment.id = Some(id);

        tracing::info!(appointment_id = id, date = %date, time = %time, "Appointment created");
        Ok(appointment)
    }

    pub fn get_appointment(&self, id: i64) -> Result<Appointment, AgendaError> {
        Ok(self.db.get_appointment(id)?)
    }

    /// All appointments, by date then time
    pub fn list_appointments(&self) -> Result<Vec<Appointment>, AgendaError> {
        Ok(self.db.get_all_appointments()?)
    }

    pub fn appointments_in_view(
        &self,
        view: ViewMode,
        date: NaiveDate,
        search: &str,
    ) -> Result<Vec<Appointment>, AgendaError> {
        let all = self.db.get_all_appointments()?;
        Ok(dates::filter_appointments(&all, view, date, search)
            .into_iter()
            .cloned()
            .collect())
    }

    /// Move an appointment along its lifecycle. Re-applying the current
    /// status is a no-op; cancelling drops its pending reminders.
    pub fn update_status(&self, id: i64, status: AppointmentStatus) -> Result<Appointment, AgendaError> {
        let mut appointment = self.db.get_appointment(id)?;
        if appointment.status == status {
            return Ok(appointment);
        }
        if !appointment.status.can_transition_to(status) {
            return Err(AgendaError::InvalidTransition {
                from: appointment.status,
                to: status,
            });
        }

        self.db.atomically(|| -> Result<(), AgendaError> {
            self.db.update_appointment_status(id, status)?;
            if status == AppointmentStatus::Cancelled {
                self.scheduler.cancel_notifications(id)?;
            }
            Ok(())
        })?;
        tracing::info!(appointment_id = id, from = %appointment.status, to = %status, "Status changed");
        appointment.status = status;
        Ok(appointment)
    }

    /// Change date and time; undelivered reminders are recomputed for the new slot
    pub fn reschedule_appointment(&self, id: i64, date: &str, time: &str) -> Result<Appointment, AgendaError> {
        let date = parse_date(date)?;
        let time = parse_time(time)?;
        let mut appointment = self.db.get_appointment(id)?;
        if appointment.status.is_terminal() {
            return Err(AgendaError::Terminal {
                id,
                status: appointment.status,
            });
        }

        appointment.date = date;
        appointment.time = time;

        let client = match appointment.client_id {
            Some(client_id) => match self.db.get_client(client_id) {
                Ok(client) => Some(client),
                Err(e) if e.is_not_found() => None,
                Err(e) => return Err(e.into()),
            },
            None => None,
        };
        let request = reminder_request(id, &appointment, client.as_ref());
        self.db.atomically(|| -> Result<(), AgendaError> {
            self.db.update_appointment_schedule(id, date, time)?;
            self.scheduler.reschedule_notifications(&request)?;
            Ok(())
        })?;
        tracing::info!(appointment_id = id, date = %date, time = %time, "Appointment rescheduled");
        Ok(appointment)
    }

    pub fn delete_appointment(&self, id: i64) -> Result<(), AgendaError> {
        self.db.atomically(|| -> Result<(), AgendaError> {
            self.scheduler.cancel_notifications(id)?;
            self.db.delete_appointment(id)?;
            Ok(())
        })?;
        tracing::info!(appointment_id = id, "Appointment deleted");
        Ok(())
    }

    /// Replace the notes; blank text clears them
    pub fn update_notes(&self, id: i64, notes: Option<&str>) -> Result<(), AgendaError> {
        let notes = notes.map(str::trim).filter(|n| !n.is_empty());
        self.db.update_appointment_notes(id, notes)?;
        Ok(())
    }

    pub fn add_checklist_item(&self, appointment_id: i64, text: &str) -> Result<ChecklistItem, AgendaError> {
        let text = required(text, "checklist item")?;
        self.db.get_appointment(appointment_id)?;
        Ok(self.db.insert_checklist_item(appointment_id, &text)?)
    }

    pub fn toggle_checklist_item(&self, item_id: i64) -> Result<ChecklistItem, AgendaError> {
        Ok(self.db.toggle_checklist_item(item_id)?)
    }

    pub fn remove_checklist_item(&self, item_id: i64) -> Result<(), AgendaError> {
        Ok(self.db.delete_checklist_item(item_id)?)
    }

    pub fn add_photo(&self, appointment_id: i64, reference: &str) -> Result<PhotoRef, AgendaError> {
        let reference = required(reference, "photo reference")?;
        self.db.get_appointment(appointment_id)?;
        Ok(self.db.insert_photo(appointment_id, &reference)?)
    }

    pub fn remove_photo(&self, photo_id: i64) -> Result<(), AgendaError> {
        Ok(self.db.delete_photo(photo_id)?)
    }

    /// Stored language preference, or the configured default
    pub fn language(&self) -> Language {
        match self.db.get_user_settings(&self.options.user_id) {
            Ok(Some(settings)) => settings.language,
            Ok(None) => self.options.default_language,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load language preference");
                self.options.default_language
            }
        }
    }

    pub fn set_language(&self, language: Language) -> Result<(), AgendaError> {
        let settings = UserSettings::new(self.options.user_id.clone(), language);
        self.db.upsert_user_settings(&settings)?;
        Ok(())
    }

    /// Every reminder of an appointment, delivered or not
    pub fn reminders_for(&self, appointment_id: i64) -> Result<Vec<NotificationRecord>, AgendaError> {
        Ok(self.db.get_notifications_for_appointment(appointment_id)?)
    }

    /// Badge count of reminders due and not yet delivered
    pub fn pending_count(&self) -> usize {
        self.scheduler.unread_count()
    }
}

fn reminder_request(id: i64, appointment: &Appointment, client: Option<&Client>) -> ReminderRequest {
    ReminderRequest {
        appointment_id: id,
        client_name: appointment.client_name.clone(),
        client_phone: client.and_then(|c| c.phone.clone()),
        client_email: client.and_then(|c| c.email.clone()),
        date: appointment.date,
        time: appointment.time,
        service: appointment.service.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::LogChannel;
    use crate::models::NotificationKind;
    use pretty_assertions::assert_eq;

    fn walk_in(date: &str, time: &str) -> NewAppointment {
        NewAppointment {
            client_name: Some("Walk-in".to_string()),
            date: date.to_string(),
            time: time.to_string(),
            service: "Corte".to_string(),
            ..NewAppointment::default()
        }
    }

    #[test]
    fn create_client_masks_phone_and_checks_email() {
        let db = Database::in_memory().unwrap();
        let agenda = Agenda::new(&db, LogChannel, AgendaOptions::default());
        let client = agenda
            .create_client(NewClient {
                name: " Ana ".into(),
                phone: Some("11987654321".into()),
                email: Some("ana@example.com".into()),
                ..NewClient::default()
            })
            .unwrap();
        assert_eq!(client.name, "Ana");
        assert_eq!(client.phone.as_deref(), Some("(11) 98765-4321"));
        assert_eq!(client.country_code.as_deref(), Some("+55"));

        let err = agenda
            .create_client(NewClient {
                name: "Bia".into(),
                email: Some("bia@nowhere".into()),
                ..NewClient::default()
            })
            .unwrap_err();
        assert!(matches!(err, AgendaError::Validation(ValidationError::InvalidEmail(_))));
        assert_eq!(agenda.list_clients().unwrap().len(), 1);
    }

    #[test]
    fn walk_in_gets_single_reminder_and_client_with_phone_two() {
        let db = Database::in_memory().unwrap();
        let agenda = Agenda::new(&db, LogChannel, AgendaOptions::default());

        let walk = agenda.create_appointment(walk_in("2024-06-01", "14:30")).unwrap();
        assert_eq!(walk.status, AppointmentStatus::Pending);
        let reminders = db.get_notifications_for_appointment(walk.id.unwrap()).unwrap();
        assert_eq!(reminders.len(), 1);

        let client = agenda
            .create_client(NewClient {
                name: "Ana".into(),
                phone: Some("1133334444".into()),
                ..NewClient::default()
            })
            .unwrap();
        let booked = agenda
            .create_appointment(NewAppointment {
                client_id: client.id,
                ..walk_in("2024-06-01", "14:30")
            })
            .unwrap();
        assert_eq!(booked.client_name, "Ana");
        let kinds: Vec<_> = db
            .get_notifications_for_appointment(booked.id.unwrap())
            .unwrap()
            .into_iter()
            .map(|r| r.kind)
            .collect();
        assert_eq!(kinds, vec![NotificationKind::OneDayBefore, NotificationKind::TenMinutesBefore]);
    }

    #[test]
    fn invalid_input_creates_nothing() {
        let db = Database::in_memory().unwrap();
        let agenda = Agenda::new(&db, LogChannel, AgendaOptions::default());
        assert!(matches!(
            agenda.create_appointment(walk_in("2024-06-31", "14:30")),
            Err(AgendaError::Validation(ValidationError::InvalidDate(_)))
        ));
        assert!(matches!(
            agenda.create_appointment(NewAppointment { client_name: None, ..walk_in("2024-06-01", "14:30") }),
            Err(AgendaError::Validation(ValidationError::EmptyField("client name")))
        ));
        assert!(agenda.list_appointments().unwrap().is_empty());
    }

    #[test]
    fn completed_appointment_cannot_be_cancelled() {
        let db = Database::in_memory().unwrap();
        let agenda = Agenda::new(&db, LogChannel, AgendaOptions::default());
        let id = agenda.create_appointment(walk_in("2024-06-01", "14:30")).unwrap().id.unwrap();

        agenda.update_status(id, AppointmentStatus::Confirmed).unwrap();
        agenda.update_status(id, AppointmentStatus::Completed).unwrap();
        let err = agenda.update_status(id, AppointmentStatus::Cancelled).unwrap_err();
        assert!(matches!(
            err,
            AgendaError::InvalidTransition {
                from: AppointmentStatus::Completed,
                to: AppointmentStatus::Cancelled
            }
        ));
        assert_eq!(agenda.get_appointment(id).unwrap().status, AppointmentStatus::Completed);
    }

    #[test]
    fn cancelling_drops_pending_reminders() {
        let db = Database::in_memory().unwrap();
        let agenda = Agenda::new(&db, LogChannel, AgendaOptions::default());
        let id = agenda.create_appointment(walk_in("2030-06-01", "14:30")).unwrap().id.unwrap();
        agenda.update_status(id, AppointmentStatus::Cancelled).unwrap();
        assert!(db.get_notifications_for_appointment(id).unwrap().is_empty());
    }

    #[test]
    fn reschedule_moves_reminders_and_rejects_terminal() {
        let db = Database::in_memory().unwrap();
        let agenda = Agenda::new(&db, LogChannel, AgendaOptions::default());
        let id = agenda.create_appointment(walk_in("2024-06-01", "14:30")).unwrap().id.unwrap();

        let moved = agenda.reschedule_appointment(id, "2024-06-02", "10:00").unwrap();
        assert_eq!(moved.date, NaiveDate::from_ymd_opt(2024, 6, 2).unwrap());
        let reminders = db.get_notifications_for_appointment(id).unwrap();
        assert_eq!(reminders.len(), 1);
        assert_eq!(reminders[0].scheduled_for, crate::utils::parse_timestamp("2024-06-02T09:50:00").unwrap());

        agenda.update_status(id, AppointmentStatus::Completed).unwrap();
        assert!(matches!(
            agenda.reschedule_appointment(id, "2024-06-03", "10:00"),
            Err(AgendaError::Terminal { .. })
        ));
    }

    #[test]
    fn checklist_photos_and_notes() {
        let db = Database::in_memory().unwrap();
        let agenda = Agenda::new(&db, LogChannel, AgendaOptions::default());
        let id = agenda.create_appointment(walk_in("2024-06-01", "14:30")).unwrap().id.unwrap();

        let wash = agenda.add_checklist_item(id, "Lavar").unwrap();
        agenda.add_checklist_item(id, "Secar").unwrap();
        agenda.toggle_checklist_item(wash.id.unwrap()).unwrap();
        agenda.add_photo(id, "fotos/depois.jpg").unwrap();
        agenda.update_notes(id, Some("Prefere água morna")).unwrap();
        assert!(matches!(
            agenda.add_checklist_item(id, "   "),
            Err(AgendaError::Validation(ValidationError::EmptyField(_)))
        ));

        let apt = agenda.get_appointment(id).unwrap();
        assert_eq!(apt.checklist_progress(), (1, 2, 50));
        assert_eq!(apt.photos.len(), 1);
        assert_eq!(apt.notes.as_deref(), Some("Prefere água morna"));

        agenda.remove_checklist_item(wash.id.unwrap()).unwrap();
        agenda.update_notes(id, Some("  ")).unwrap();
        let apt = agenda.get_appointment(id).unwrap();
        assert_eq!(apt.checklist.len(), 1);
        assert_eq!(apt.notes, None);
    }

    #[test]
    fn delete_cancels_reminders_and_children() {
        let db = Database::in_memory().unwrap();
        let agenda = Agenda::new(&db, LogChannel, AgendaOptions::default());
        let id = agenda.create_appointment(walk_in("2030-06-01", "14:30")).unwrap().id.unwrap();
        agenda.add_checklist_item(id, "Lavar").unwrap();
        agenda.delete_appointment(id).unwrap();
        assert!(db.get_notifications_for_appointment(id).unwrap().is_empty());
        assert!(matches!(agenda.get_appointment(id), Err(AgendaError::Storage(e)) if e.is_not_found()));
        assert!(matches!(agenda.delete_appointment(id), Err(AgendaError::Storage(_))));
    }

    #[test]
    fn language_falls_back_to_default_until_saved() {
        let db = Database::in_memory().unwrap();
        let options = AgendaOptions { default_language: Language::Es, ..AgendaOptions::default() };
        let agenda = Agenda::new(&db, LogChannel, options);
        assert_eq!(agenda.language(), Language::Es);
        agenda.set_language(Language::Fr).unwrap();
        assert_eq!(agenda.language(), Language::Fr);
    }
}
