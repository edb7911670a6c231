use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboxKind {
    Notification,
    Reminder,
}

impl OutboxKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxKind::Notification => "notification",
            OutboxKind::Reminder => "reminder",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "reminder" => OutboxKind::Reminder,
            _ => OutboxKind::Notification,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboxStatus {
    Pending,
    InFlight,
    Delivered,
    Failed,
    /// A reminder made obsolete by a reschedule or cancel.
    Superseded,
}

impl OutboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxStatus::Pending => "pending",
            OutboxStatus::InFlight => "in_flight",
            OutboxStatus::Delivered => "delivered",
            OutboxStatus::Failed => "failed",
            OutboxStatus::Superseded => "superseded",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "in_flight" => OutboxStatus::InFlight,
            "delivered" => OutboxStatus::Delivered,
            "failed" => OutboxStatus::Failed,
            "superseded" => OutboxStatus::Superseded,
            _ => OutboxStatus::Pending,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OutboxMessage {
    pub id: i64,
    pub kind: OutboxKind,
    pub appointment_id: String,
    pub recipient_id: String,
    pub message: String,
    pub status: OutboxStatus,
    pub attempts: i64,
    pub available_at: DateTime<Utc>,
    pub last_error: Option<String>,
}

/// A side effect to enqueue alongside a booking write.
#[derive(Debug, Clone)]
pub struct NewOutboxMessage {
    pub kind: OutboxKind,
    pub appointment_id: String,
    pub recipient_id: String,
    pub message: String,
    pub available_at: DateTime<Utc>,
}
