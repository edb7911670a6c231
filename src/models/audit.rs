use chrono::{DateTime, Utc};
use serde::Serialize;

use super::timestamp;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum AuditAction {
    AppointmentCreated,
    AppointmentRescheduled,
    AppointmentCancelled,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::AppointmentCreated => "appointment_created",
            AuditAction::AppointmentRescheduled => "appointment_rescheduled",
            AuditAction::AppointmentCancelled => "appointment_cancelled",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: i64,
    pub actor_id: String,
    pub action: String,
    pub appointment_id: String,
    pub meta: serde_json::Value,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}
