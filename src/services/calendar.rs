use chrono::Duration;

use crate::models::{Appointment, AppointmentStatus};
use crate::services::slot::SLOT_MINUTES;

pub fn generate_ics(appt: &Appointment) -> String {
    let dtstart = appt.date.format("%Y%m%dT%H%M%SZ").to_string();
    let dtend = (appt.date + Duration::minutes(SLOT_MINUTES as i64))
        .format("%Y%m%dT%H%M%SZ")
        .to_string();
    let dtstamp = appt.updated_at.format("%Y%m%dT%H%M%SZ").to_string();
    let uid = format!("{}@hospital-appointments", appt.id);
    let status = match appt.status {
        AppointmentStatus::Cancelled => "CANCELLED",
        _ => "CONFIRMED",
    };
    let description = appt
        .notes
        .as_deref()
        .map(escape_text)
        .unwrap_or_else(|| "No additional notes".to_string());

    format!(
        "BEGIN:VCALENDAR\r\n\
         VERSION:2.0\r\n\
         PRODID:-//Hospital//Appointments//EN\r\n\
         BEGIN:VEVENT\r\n\
         UID:{uid}\r\n\
         DTSTAMP:{dtstamp}\r\n\
         DTSTART:{dtstart}\r\n\
         DTEND:{dtend}\r\n\
         STATUS:{status}\r\n\
         SUMMARY:Medical appointment\r\n\
         DESCRIPTION:{description}\r\n\
         END:VEVENT\r\n\
         END:VCALENDAR\r\n"
    )
}

// RFC 5545 §3.3.11
fn escape_text(s: &str) -> String {
    s.replace("\r\n", "\n")
        .replace('\r', "\n")
        .replace('\\', "\\\\")
        .replace(';', "\\;")
        .replace(',', "\\,")
        .replace('\n', "\\n")
}
