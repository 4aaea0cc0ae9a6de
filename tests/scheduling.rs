use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use pretty_assertions::assert_eq;
use salonbook::appointments::{NewAppointment, NewClient};
use salonbook::delivery::LogChannel;
use salonbook::models::{NotificationKind, NotificationState};
use salonbook::{Agenda, AgendaError, AgendaOptions, AppointmentStatus, Database};
use std::time::{Duration, Instant};

fn at(date: &str, time: &str) -> NaiveDateTime {
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .unwrap()
        .and_time(NaiveTime::parse_from_str(time, "%H:%M").unwrap())
}

/// Install a trigger from a second connection that makes `event` on `table` fail
fn make_writes_fail(path: &str, event: &str, table: &str) {
    let conn = rusqlite::Connection::open(path).unwrap();
    conn.execute_batch(&format!(
        "CREATE TRIGGER fail_{event}_{table} BEFORE {event} ON {table}
         BEGIN SELECT RAISE(ABORT, 'write refused'); END;"
    ))
    .unwrap();
}

fn allow_writes(path: &str, event: &str, table: &str) {
    let conn = rusqlite::Connection::open(path).unwrap();
    conn.execute_batch(&format!("DROP TRIGGER fail_{event}_{table};")).unwrap();
}

fn walk_in(date: &str, time: &str) -> NewAppointment {
    NewAppointment {
        client_name: Some("Walk-in".into()),
        date: date.into(),
        time: time.into(),
        service: "Corte".into(),
        ..NewAppointment::default()
    }
}

fn db_file() -> (tempfile::TempDir, String) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data").join("salonbook.db");
    (dir, path.to_string_lossy().to_string())
}

#[test]
fn only_one_connection_wins_a_claim() {
    let (_dir, path) = db_file();
    let first = Database::new(&path).unwrap();
    let second = Database::new(&path).unwrap();

    let agenda = Agenda::new(&first, LogChannel, AgendaOptions::default());
    let appt = agenda
        .create_appointment(NewAppointment {
            client_name: Some("Walk-in".into()),
            date: "2024-06-01".into(),
            time: "14:30".into(),
            service: "Corte".into(),
            ..NewAppointment::default()
        })
        .unwrap();
    let reminder = &first.get_notifications_for_appointment(appt.id.unwrap()).unwrap()[0];
    let id = reminder.id.unwrap();

    let now = at("2024-06-01", "14:25");
    let stale_before = at("2024-06-01", "14:20");
    let a = first.claim_notification(id, now, stale_before).unwrap();
    let b = second.claim_notification(id, now, stale_before).unwrap();

    assert_eq!(a, Some(1));
    assert_eq!(b, None);
    assert_eq!(second.get_notification(id).unwrap().state, NotificationState::Sending);
}

#[test]
fn book_deliver_then_cancel() {
    let (_dir, path) = db_file();
    let db = Database::new(&path).unwrap();
    let agenda = Agenda::new(&db, LogChannel, AgendaOptions::default());

    let client = agenda
        .create_client(NewClient {
            name: "Ana".into(),
            phone: Some("11987654321".into()),
            ..NewClient::default()
        })
        .unwrap();
    let appt = agenda
        .create_appointment(NewAppointment {
            client_id: client.id,
            date: "2024-06-02".into(),
            time: "10:00".into(),
            service: "Manicure".into(),
            ..NewAppointment::default()
        })
        .unwrap();
    let appt_id = appt.id.unwrap();

    // Only the day-ahead reminder is due the evening before
    let scheduler = agenda.scheduler();
    let report = scheduler.process_notifications_at(at("2024-06-01", "18:00"));
    assert_eq!((report.processed, report.sent), (1, 1));
    assert_eq!(scheduler.unread_count_at(at("2024-06-01", "18:00")), 0);

    agenda.update_status(appt_id, AppointmentStatus::Cancelled).unwrap();

    let left = agenda.reminders_for(appt_id).unwrap();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].kind, NotificationKind::OneDayBefore);
    assert!(left[0].is_read());

    let report = scheduler.process_notifications_at(at("2024-06-02", "09:55"));
    assert_eq!(report.processed, 0);
}

#[test]
fn reminders_survive_reopening_the_file() {
    let (_dir, path) = db_file();
    let appt_id = {
        let db = Database::new(&path).unwrap();
        let agenda = Agenda::new(&db, LogChannel, AgendaOptions::default());
        agenda
            .create_appointment(NewAppointment {
                client_name: Some("Bia".into()),
                date: "2024-06-01".into(),
                time: "09:00".into(),
                service: "Escova".into(),
                ..NewAppointment::default()
            })
            .unwrap()
            .id
            .unwrap()
    };

    let db = Database::new(&path).unwrap();
    let agenda = Agenda::new(&db, LogChannel, AgendaOptions::default());
    let pending = agenda
        .scheduler()
        .get_pending_notifications_at(at("2024-06-01", "08:50"));
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].appointment_id, appt_id);
    assert_eq!(pending[0].scheduled_for, at("2024-06-01", "08:50"));
}

#[test]
fn failed_reminder_insert_leaves_reschedule_undone() {
    let (_dir, path) = db_file();
    let db = Database::new(&path).unwrap();
    let agenda = Agenda::new(&db, LogChannel, AgendaOptions::default());
    let id = agenda.create_appointment(walk_in("2030-06-01", "14:30")).unwrap().id.unwrap();

    make_writes_fail(&path, "INSERT", "notifications");
    let result = agenda.reschedule_appointment(id, "2030-07-01", "10:00");
    assert!(matches!(result, Err(AgendaError::Scheduler(_))));

    let stored = agenda.get_appointment(id).unwrap();
    assert_eq!(stored.date, NaiveDate::from_ymd_opt(2030, 6, 1).unwrap());
    let reminders = agenda.reminders_for(id).unwrap();
    assert_eq!(reminders.len(), 1);
    assert_eq!(reminders[0].scheduled_for, at("2030-06-01", "14:20"));
}

#[test]
fn failed_reminder_cancel_keeps_status_and_can_be_retried() {
    let (_dir, path) = db_file();
    let db = Database::new(&path).unwrap();
    let agenda = Agenda::new(&db, LogChannel, AgendaOptions::default());
    let id = agenda.create_appointment(walk_in("2030-06-01", "14:30")).unwrap().id.unwrap();

    make_writes_fail(&path, "DELETE", "notifications");
    assert!(agenda.update_status(id, AppointmentStatus::Cancelled).is_err());
    assert_eq!(agenda.get_appointment(id).unwrap().status, AppointmentStatus::Pending);
    assert_eq!(agenda.reminders_for(id).unwrap().len(), 1);

    allow_writes(&path, "DELETE", "notifications");
    agenda.update_status(id, AppointmentStatus::Cancelled).unwrap();
    assert_eq!(agenda.get_appointment(id).unwrap().status, AppointmentStatus::Cancelled);
    assert!(agenda.reminders_for(id).unwrap().is_empty());
}

#[test]
fn failed_delete_keeps_appointment_reminders() {
    let (_dir, path) = db_file();
    let db = Database::new(&path).unwrap();
    let agenda = Agenda::new(&db, LogChannel, AgendaOptions::default());
    let id = agenda.create_appointment(walk_in("2030-06-01", "14:30")).unwrap().id.unwrap();

    make_writes_fail(&path, "DELETE", "appointments");
    assert!(agenda.delete_appointment(id).is_err());
    assert!(agenda.get_appointment(id).is_ok());
    assert_eq!(agenda.reminders_for(id).unwrap().len(), 1);
}

#[test]
fn failed_reminder_insert_drops_new_appointment() {
    let (_dir, path) = db_file();
    let db = Database::new(&path).unwrap();
    let agenda = Agenda::new(&db, LogChannel, AgendaOptions::default());

    make_writes_fail(&path, "INSERT", "notifications");
    assert!(agenda.create_appointment(walk_in("2030-06-01", "14:30")).is_err());
    assert!(agenda.list_appointments().unwrap().is_empty());
}

#[test]
fn locked_store_fails_within_timeout() {
    let (_dir, path) = db_file();
    let db = Database::with_timeout(&path, Duration::from_millis(200)).unwrap();

    let holder = rusqlite::Connection::open(&path).unwrap();
    holder.execute_batch("BEGIN EXCLUSIVE;").unwrap();

    let started = Instant::now();
    let result = db.insert_client(&salonbook::Client::new("Ana".into()));
    assert!(result.is_err());
    assert!(started.elapsed() < Duration::from_secs(5));

    holder.execute_batch("ROLLBACK;").unwrap();
    assert!(db.insert_client(&salonbook::Client::new("Ana".into())).is_ok());
}
