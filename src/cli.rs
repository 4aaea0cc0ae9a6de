use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde::Serialize;
use thiserror::Error;

use crate::appointments::{Agenda, AgendaError, NewAppointment, NewClient};
use crate::config::Config;
use crate::dates::{self, ViewMode};
use crate::delivery::DeliveryChannel;
use crate::error::ValidationError;
use crate::i18n::Language;
use crate::models::{Appointment, AppointmentStatus, Client, NotificationRecord};
use crate::phone::{self, format_phone_number};
use crate::utils::{get_current_date_string, parse_date};

#[derive(Parser)]
#[command(name = "salonbook")]
#[command(about = "Appointment book with reminders for salons and clinics")]
#[command(version)]
pub struct Cli {
    /// Custom config file path
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Use development mode (uses separate dev config/database)
    #[arg(long, global = true)]
    pub dev: bool,

    /// Print list output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Today's appointments and pending reminder count (default if no subcommand)
    Today,
    /// Manage clients
    Client {
        #[command(subcommand)]
        action: ClientCommand,
    },
    /// Manage appointments
    Appt {
        #[command(subcommand)]
        action: ApptCommand,
    },
    /// Edit an appointment's checklist
    Checklist {
        #[command(subcommand)]
        action: ChecklistCommand,
    },
    /// Attach or detach photo references
    Photo {
        #[command(subcommand)]
        action: PhotoCommand,
    },
    /// Reminder queue
    Notify {
        #[command(subcommand)]
        action: NotifyCommand,
    },
    /// Interface language preference
    Lang {
        #[command(subcommand)]
        action: LangCommand,
    },
    /// Phone number helpers
    Phone {
        #[command(subcommand)]
        action: PhoneCommand,
    },
}

#[derive(Subcommand)]
pub enum ClientCommand {
    /// Register a client
    Add {
        name: String,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        email: Option<String>,
        /// Dialing prefix such as +55 (defaults to the configured one)
        #[arg(long)]
        country: Option<String>,
        /// Quick registration without full profile details
        #[arg(long)]
        quick: bool,
    },
    /// List clients by name
    List,
}

#[derive(Subcommand)]
pub enum ApptCommand {
    /// Book an appointment for a client (--client) or a walk-in (--name)
    Add {
        #[arg(long, conflicts_with = "name")]
        client: Option<i64>,
        #[arg(long)]
        name: Option<String>,
        /// Date (YYYY-MM-DD)
        #[arg(long)]
        date: String,
        /// Time (HH:MM)
        #[arg(long)]
        time: String,
        #[arg(long)]
        service: String,
        #[arg(long)]
        notes: Option<String>,
    },
    /// List appointments in a daily, weekly or monthly view
    List {
        #[arg(long, default_value = "daily")]
        view: String,
        /// Selected date (YYYY-MM-DD), defaults to today
        #[arg(long)]
        date: Option<String>,
        /// Filter by client name or service
        #[arg(long, default_value = "")]
        search: String,
        /// Ignore the view and list everything
        #[arg(long)]
        all: bool,
    },
    /// Show one appointment with checklist, photos and reminders
    Show { id: i64 },
    /// Change status: pending, confirmed, completed or cancelled
    Status { id: i64, status: String },
    /// Move to a new date and time
    Reschedule {
        id: i64,
        #[arg(long)]
        date: String,
        #[arg(long)]
        time: String,
    },
    /// Delete an appointment and its pending reminders
    Delete { id: i64 },
    /// Replace notes (omit the text to clear them)
    Notes { id: i64, text: Option<String> },
}

#[derive(Subcommand)]
pub enum ChecklistCommand {
    Add { appointment_id: i64, text: String },
    Toggle { item_id: i64 },
    Remove { item_id: i64 },
}

#[derive(Subcommand)]
pub enum PhotoCommand {
    /// Attach a photo by path or URI
    Add { appointment_id: i64, reference: String },
    Remove { photo_id: i64 },
}

#[derive(Subcommand)]
pub enum NotifyCommand {
    /// Reminders that are due and not delivered yet
    Pending,
    /// Deliver due reminders once
    Process,
    /// Deliver due reminders periodically
    Poll {
        /// Seconds between runs (defaults to the configured interval)
        #[arg(long)]
        interval: Option<u64>,
        /// Stop after this many runs
        #[arg(long)]
        cycles: Option<u64>,
    },
    /// Drop undelivered reminders of an appointment
    Cancel { appointment_id: i64 },
}

#[derive(Subcommand)]
pub enum LangCommand {
    Get,
    /// pt, en, es or fr
    Set { language: String },
}

#[derive(Subcommand)]
pub enum PhoneCommand {
    /// Apply the display mask for a country
    Format {
        number: String,
        #[arg(long)]
        country: Option<String>,
    },
    /// List supported dialing prefixes
    Codes,
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Agenda(#[from] AgendaError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Failed to encode output: {0}")]
    Json(#[from] serde_json::Error),
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_appointment_line(apt: &Appointment, lang: Language) {
    let (done, total, _) = apt.checklist_progress();
    let checklist = if total > 0 { format!(" [{done}/{total}]") } else { String::new() };
    let photos = if apt.photos.is_empty() { String::new() } else { format!(" ({} photos)", apt.photos.len()) };
    println!(
        "#{:<4} {} {}  {:<20} {:<20} {}{}{}",
        apt.id.unwrap_or_default(),
        apt.date.format("%Y-%m-%d"),
        apt.time.format("%H:%M"),
        apt.client_name,
        apt.service,
        lang.status_label(apt.status),
        checklist,
        photos
    );
}

fn print_client_line(client: &Client) {
    println!(
        "#{:<4} {:<24} {:<18} {}{}",
        client.id.unwrap_or_default(),
        client.name,
        client.phone.as_deref().unwrap_or("-"),
        client.email.as_deref().unwrap_or("-"),
        if client.is_quick_client { "  (quick)" } else { "" }
    );
}

fn print_notification_line(n: &NotificationRecord) {
    println!(
        "#{:<4} {}  appt #{:<4} {:<15} {:<9} {}",
        n.id.unwrap_or_default(),
        n.scheduled_for.format("%Y-%m-%d %H:%M"),
        n.appointment_id,
        n.kind.as_str(),
        n.state.as_str(),
        n.message
    );
}

fn selected_date(date: Option<String>) -> Result<NaiveDate, ValidationError> {
    parse_date(&date.unwrap_or_else(get_current_date_string))
}

/// Run one command against the agenda
pub fn dispatch<C: DeliveryChannel>(
    command: Commands,
    agenda: &Agenda<'_, C>,
    config: &Config,
    json: bool,
) -> Result<(), CliError> {
    match command {
        Commands::Today => handle_list(agenda, ViewMode::Daily, None, "", false, json),
        Commands::Client { action } => handle_client(action, agenda, json),
        Commands::Appt { action } => handle_appt(action, agenda, json),
        Commands::Checklist { action } => handle_checklist(action, agenda),
        Commands::Photo { action } => handle_photo(action, agenda),
        Commands::Notify { action } => handle_notify(action, agenda, config, json),
        Commands::Lang { action } => handle_lang(action, agenda),
        Commands::Phone { action } => handle_phone(action, config),
    }
}

fn handle_client<C: DeliveryChannel>(action: ClientCommand, agenda: &Agenda<'_, C>, json: bool) -> Result<(), CliError> {
    match action {
        ClientCommand::Add { name, phone, email, country, quick } => {
            let client = agenda.create_client(NewClient {
                name,
                phone,
                email,
                country_code: country,
                is_quick_client: quick,
            })?;
            println!("Client created successfully (ID: {})", client.id.unwrap_or_default());
        }
        ClientCommand::List => {
            let clients = agenda.list_clients()?;
            if json {
                return print_json(&clients);
            }
            for client in &clients {
                print_client_line(client);
            }
        }
    }
    Ok(())
}

fn handle_list<C: DeliveryChannel>(
    agenda: &Agenda<'_, C>,
    view: ViewMode,
    date: Option<String>,
    search: &str,
    all: bool,
    json: bool,
) -> Result<(), CliError> {
    let lang = agenda.language();
    let appointments = if all {
        agenda.list_appointments()?
    } else {
        let date = selected_date(date)?;
        if !json {
            println!("{}", dates::range_label(view, date, lang));
        }
        agenda.appointments_in_view(view, date, search)?
    };

    if json {
        return print_json(&appointments);
    }
    if appointments.is_empty() {
        println!("No appointments");
    }
    for apt in &appointments {
        print_appointment_line(apt, lang);
    }
    let pending = agenda.pending_count();
    if pending > 0 {
        println!("{pending} reminder(s) due");
    }
    Ok(())
}

fn handle_appt<C: DeliveryChannel>(action: ApptCommand, agenda: &Agenda<'_, C>, json: bool) -> Result<(), CliError> {
    match action {
        ApptCommand::Add { client, name, date, time, service, notes } => {
            let apt = agenda.create_appointment(NewAppointment {
                client_id: client,
                client_name: name,
                date,
                time,
                service,
                notes,
            })?;
            println!("Appointment created successfully (ID: {})", apt.id.unwrap_or_default());
        }
        ApptCommand::List { view, date, search, all } => {
            let view: ViewMode = view.parse()?;
            return handle_list(agenda, view, date, &search, all, json);
        }
        ApptCommand::Show { id } => {
            let apt = agenda.get_appointment(id)?;
            let reminders = agenda.reminders_for(id)?;
            if json {
                #[derive(Serialize)]
                struct Detail<'a> {
                    appointment: &'a Appointment,
                    reminders: &'a [NotificationRecord],
                }
                return print_json(&Detail { appointment: &apt, reminders: &reminders });
            }
            let lang = agenda.language();
            print_appointment_line(&apt, lang);
            if let Some(notes) = &apt.notes {
                println!("Notes: {notes}");
            }
            for item in &apt.checklist {
                println!("  [{}] #{} {}", if item.completed { "x" } else { " " }, item.id.unwrap_or_default(), item.text);
            }
            for photo in &apt.photos {
                println!("  photo #{} {}", photo.id.unwrap_or_default(), photo.reference);
            }
            for reminder in &reminders {
                print_notification_line(reminder);
            }
        }
        ApptCommand::Status { id, status } => {
            let status: AppointmentStatus = status.parse()?;
            let apt = agenda.update_status(id, status)?;
            println!("Appointment {} is now {}", id, agenda.language().status_label(apt.status));
        }
        ApptCommand::Reschedule { id, date, time } => {
            let apt = agenda.reschedule_appointment(id, &date, &time)?;
            println!(
                "Appointment {} moved to {} {}",
                id,
                apt.date.format("%Y-%m-%d"),
                apt.time.format("%H:%M")
            );
        }
        ApptCommand::Delete { id } => {
            agenda.delete_appointment(id)?;
            println!("Appointment {id} deleted");
        }
        ApptCommand::Notes { id, text } => {
            agenda.update_notes(id, text.as_deref())?;
            println!("Notes saved");
        }
    }
    Ok(())
}

fn handle_checklist<C: DeliveryChannel>(action: ChecklistCommand, agenda: &Agenda<'_, C>) -> Result<(), CliError> {
    match action {
        ChecklistCommand::Add { appointment_id, text } => {
            let item = agenda.add_checklist_item(appointment_id, &text)?;
            println!("Checklist item added (ID: {})", item.id.unwrap_or_default());
        }
        ChecklistCommand::Toggle { item_id } => {
            let item = agenda.toggle_checklist_item(item_id)?;
            println!("[{}] {}", if item.completed { "x" } else { " " }, item.text);
        }
        ChecklistCommand::Remove { item_id } => {
            agenda.remove_checklist_item(item_id)?;
            println!("Checklist item {item_id} removed");
        }
    }
    Ok(())
}

fn handle_photo<C: DeliveryChannel>(action: PhotoCommand, agenda: &Agenda<'_, C>) -> Result<(), CliError> {
    match action {
        PhotoCommand::Add { appointment_id, reference } => {
            let photo = agenda.add_photo(appointment_id, &reference)?;
            println!("Photo attached (ID: {})", photo.id.unwrap_or_default());
        }
        PhotoCommand::Remove { photo_id } => {
            agenda.remove_photo(photo_id)?;
            println!("Photo {photo_id} removed");
        }
    }
    Ok(())
}

fn handle_notify<C: DeliveryChannel>(
    action: NotifyCommand,
    agenda: &Agenda<'_, C>,
    config: &Config,
    json: bool,
) -> Result<(), CliError> {
    let scheduler = agenda.scheduler();
    match action {
        NotifyCommand::Pending => {
            let pending = scheduler.get_pending_notifications();
            if json {
                return print_json(&pending);
            }
            if pending.is_empty() {
                println!("No reminders due");
            }
            for n in &pending {
                print_notification_line(n);
            }
        }
        NotifyCommand::Process => {
            let report = scheduler.process_notifications();
            if json {
                return print_json(&report);
            }
            println!(
                "Processed {} reminder(s): {} sent, {} retrying, {} failed, {} skipped",
                report.processed, report.sent, report.retrying, report.dead_lettered, report.skipped
            );
        }
        NotifyCommand::Poll { interval, cycles } => {
            let interval = interval
                .map(std::time::Duration::from_secs)
                .unwrap_or_else(|| config.poll_interval());
            tracing::info!(interval_secs = interval.as_secs(), ?cycles, "Starting reminder poller");
            let report = scheduler.poll(interval, cycles);
            println!("Poller stopped after sending {} reminder(s)", report.sent);
        }
        NotifyCommand::Cancel { appointment_id } => {
            let removed = scheduler.cancel_notifications(appointment_id).map_err(AgendaError::from)?;
            println!("Cancelled {removed} reminder(s)");
        }
    }
    Ok(())
}

fn handle_lang<C: DeliveryChannel>(action: LangCommand, agenda: &Agenda<'_, C>) -> Result<(), CliError> {
    match action {
        LangCommand::Get => {
            let lang = agenda.language();
            println!("{} ({})", lang.code(), lang.display_name());
        }
        LangCommand::Set { language } => {
            let lang: Language = language.parse()?;
            agenda.set_language(lang)?;
            println!("Language set to {}", lang.display_name());
        }
    }
    Ok(())
}

fn handle_phone(action: PhoneCommand, config: &Config) -> Result<(), CliError> {
    match action {
        PhoneCommand::Format { number, country } => {
            let country = country.unwrap_or_else(|| config.default_country_code.clone());
            println!("{} {}", country, format_phone_number(&number, &country));
        }
        PhoneCommand::Codes => {
            for (code, name) in phone::COUNTRY_CODES {
                println!("{code:<5} {name}");
            }
        }
    }
    Ok(())
}
