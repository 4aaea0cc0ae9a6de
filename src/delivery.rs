use thiserror::Error;

use crate::models::NotificationRecord;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("Delivery channel unavailable: {0}")]
    Unavailable(String),
    #[error("Delivery rejected: {0}")]
    Rejected(String),
}

/// Outbound path for reminders (SMS, email, push...).
///
/// `deliver` returns `Ok` only once the message has been handed over; the
/// scheduler marks the record read on `Ok` and nothing else.
pub trait DeliveryChannel {
    fn deliver(&self, notification: &NotificationRecord) -> Result<(), DeliveryError>;
}

impl<T: DeliveryChannel + ?Sized> DeliveryChannel for &T {
    fn deliver(&self, notification: &NotificationRecord) -> Result<(), DeliveryError> {
        (**self).deliver(notification)
    }
}

/// Stand-in channel: writes the reminder to the log and reports success
#[derive(Debug, Clone, Copy, Default)]
pub struct LogChannel;

impl DeliveryChannel for LogChannel {
    fn deliver(&self, notification: &NotificationRecord) -> Result<(), DeliveryError> {
        tracing::info!(
            notification_id = ?notification.id,
            appointment_id = notification.appointment_id,
            kind = notification.kind.as_str(),
            scheduled_for = %notification.scheduled_for,
            "{}",
            notification.message
        );
        Ok(())
    }
}
