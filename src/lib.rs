pub mod appointments;
pub mod cli;
pub mod config;
pub mod database;
pub mod dates;
pub mod delivery;
pub mod error;
pub mod i18n;
pub mod models;
pub mod notifications;
pub mod phone;
pub mod utils;

pub use appointments::{Agenda, AgendaError, AgendaOptions};
pub use config::Config;
pub use database::Database;
pub use models::{Appointment, AppointmentStatus, ChecklistItem, Client, NotificationRecord};
pub use notifications::NotificationScheduler;
pub use utils::Profile;
