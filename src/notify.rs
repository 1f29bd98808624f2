// src/notify.rs

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    PaymentApproved,
    PaymentRejected,
    AccessGranted,
    PaymentFailed,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::PaymentApproved => "payment_approved",
            NotificationKind::PaymentRejected => "payment_rejected",
            NotificationKind::AccessGranted => "access_granted",
            NotificationKind::PaymentFailed => "payment_failed",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NotificationEvent {
    pub student_id: i32,
    pub kind: NotificationKind,
    pub message: String,
}

/// Delivery is the platform's problem; the engine only emits the event.
/// Events fire after the surrounding transaction committed, never inside it.
pub trait Notifier: Send + Sync {
    fn notify(&self, event: NotificationEvent);
}

/// Default sink: structured log line per event.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, event: NotificationEvent) {
        log::info!(
            "notification student_id={} kind={} message={}",
            event.student_id,
            event.kind.as_str(),
            event.message
        );
    }
}
