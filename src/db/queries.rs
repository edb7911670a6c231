use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::models::{
    timestamp, Appointment, AppointmentStatus, AppointmentView, AuditAction, AuditEntry,
    NewOutboxMessage, OutboxKind, OutboxMessage, OutboxStatus, PartySummary, User,
};

// ── Appointments ──

const APPOINTMENT_COLUMNS: &str =
    "id, patient_id, doctor_id, date, status, notes, created_at, updated_at";

pub fn insert_appointment(conn: &Connection, appt: &Appointment) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO appointments (id, patient_id, doctor_id, date, status, notes, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            appt.id,
            appt.patient_id,
            appt.doctor_id,
            timestamp::format(&appt.date),
            appt.status.as_str(),
            appt.notes,
            timestamp::format(&appt.created_at),
            timestamp::format(&appt.updated_at),
        ],
    )?;
    Ok(())
}

pub fn get_appointment_by_id(conn: &Connection, id: &str) -> anyhow::Result<Option<Appointment>> {
    let result = conn
        .query_row(
            &format!("SELECT {APPOINTMENT_COLUMNS} FROM appointments WHERE id = ?1"),
            params![id],
            |row| Ok(parse_appointment_row(row)),
        )
        .optional()?;

    result.transpose()
}

/// Writes the mutable part of an appointment (slot, status, updated_at).
pub fn update_appointment(conn: &Connection, appt: &Appointment) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE appointments SET date = ?1, status = ?2, updated_at = ?3 WHERE id = ?4",
        params![
            timestamp::format(&appt.date),
            appt.status.as_str(),
            timestamp::format(&appt.updated_at),
            appt.id,
        ],
    )?;
    Ok(count > 0)
}

/// Whether a live appointment holds `doctor_id` at `slot`, ignoring `exclude_id`.
pub fn doctor_has_appointment_at(
    conn: &Connection,
    doctor_id: &str,
    slot: &DateTime<Utc>,
    exclude_id: Option<&str>,
) -> anyhow::Result<bool> {
    party_has_appointment_at(conn, "doctor_id", doctor_id, slot, exclude_id)
}

/// Whether a live appointment holds `patient_id` at `slot`, ignoring `exclude_id`.
pub fn patient_has_appointment_at(
    conn: &Connection,
    patient_id: &str,
    slot: &DateTime<Utc>,
    exclude_id: Option<&str>,
) -> anyhow::Result<bool> {
    party_has_appointment_at(conn, "patient_id", patient_id, slot, exclude_id)
}

fn party_has_appointment_at(
    conn: &Connection,
    column: &str,
    party_id: &str,
    slot: &DateTime<Utc>,
    exclude_id: Option<&str>,
) -> anyhow::Result<bool> {
    let exists: bool = conn.query_row(
        &format!(
            "SELECT EXISTS(
                SELECT 1 FROM appointments
                WHERE {column} = ?1 AND date = ?2 AND status != 'cancelled'
                  AND (?3 IS NULL OR id != ?3)
             )"
        ),
        params![party_id, timestamp::format(slot), exclude_id],
        |row| row.get(0),
    )?;
    Ok(exists)
}

/// Slot starts held by live appointments of a doctor within `[start, end]`.
pub fn get_booked_slots_for_doctor(
    conn: &Connection,
    doctor_id: &str,
    start: &DateTime<Utc>,
    end: &DateTime<Utc>,
) -> anyhow::Result<Vec<DateTime<Utc>>> {
    let mut stmt = conn.prepare(
        "SELECT date FROM appointments
         WHERE doctor_id = ?1 AND date >= ?2 AND date <= ?3 AND status != 'cancelled'
         ORDER BY date ASC",
    )?;

    let rows = stmt.query_map(
        params![doctor_id, timestamp::format(start), timestamp::format(end)],
        |row| row.get::<_, String>(0),
    )?;

    let mut slots = vec![];
    for row in rows {
        slots.push(timestamp::parse(&row?)?);
    }
    Ok(slots)
}

/// Which side of the appointment a listing is keyed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Party {
    Doctor,
    Patient,
}

pub fn list_appointment_views(
    conn: &Connection,
    party: Party,
    party_id: &str,
) -> anyhow::Result<Vec<AppointmentView>> {
    let column = match party {
        Party::Doctor => "a.doctor_id",
        Party::Patient => "a.patient_id",
    };

    let mut stmt = conn.prepare(&format!(
        "SELECT a.id, a.patient_id, a.doctor_id, a.date, a.status, a.notes, a.created_at, a.updated_at,
                d.name, d.specialty, p.name
         FROM appointments a
         LEFT JOIN users d ON d.id = a.doctor_id
         LEFT JOIN users p ON p.id = a.patient_id
         WHERE {column} = ?1
         ORDER BY a.date ASC"
    ))?;

    let rows = stmt.query_map(params![party_id], |row| {
        let doctor_name: Option<String> = row.get(8)?;
        let doctor_specialty: Option<String> = row.get(9)?;
        let patient_name: Option<String> = row.get(10)?;
        Ok(parse_appointment_row(row).map(|appointment| AppointmentView {
            doctor: PartySummary {
                id: appointment.doctor_id.clone(),
                name: doctor_name,
                specialty: doctor_specialty,
            },
            patient: PartySummary {
                id: appointment.patient_id.clone(),
                name: patient_name,
                specialty: None,
            },
            appointment,
        }))
    })?;

    let mut views = vec![];
    for row in rows {
        views.push(row??);
    }
    Ok(views)
}

fn parse_appointment_row(row: &rusqlite::Row) -> anyhow::Result<Appointment> {
    let date: String = row.get(3)?;
    let status: String = row.get(4)?;
    let created_at: String = row.get(6)?;
    let updated_at: String = row.get(7)?;

    Ok(Appointment {
        id: row.get(0)?,
        patient_id: row.get(1)?,
        doctor_id: row.get(2)?,
        date: timestamp::parse(&date)?,
        status: AppointmentStatus::parse(&status),
        notes: row.get(5)?,
        created_at: timestamp::parse(&created_at)?,
        updated_at: timestamp::parse(&updated_at)?,
    })
}

// ── Users ──

pub fn save_user(conn: &Connection, user: &User) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO users (id, name, role, specialty) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(id) DO UPDATE SET
           name = excluded.name,
           role = excluded.role,
           specialty = excluded.specialty",
        params![user.id, user.name, user.role.as_str(), user.specialty],
    )?;
    Ok(())
}

// ── Audit Log ──

pub fn insert_audit_entry(
    conn: &Connection,
    actor_id: &str,
    action: AuditAction,
    appointment_id: &str,
    meta: &serde_json::Value,
) -> anyhow::Result<i64> {
    conn.execute(
        "INSERT INTO audit_logs (actor_id, action, appointment_id, meta) VALUES (?1, ?2, ?3, ?4)",
        params![actor_id, action.as_str(), appointment_id, meta.to_string()],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_audit_entries(conn: &Connection, appointment_id: &str) -> anyhow::Result<Vec<AuditEntry>> {
    let mut stmt = conn.prepare(
        "SELECT id, actor_id, action, appointment_id, meta, created_at
         FROM audit_logs WHERE appointment_id = ?1 ORDER BY id ASC",
    )?;

    let rows = stmt.query_map(params![appointment_id], |row| {
        let meta: String = row.get(4)?;
        let created_at: String = row.get(5)?;
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            meta,
            created_at,
        ))
    })?;

    let mut entries = vec![];
    for row in rows {
        let (id, actor_id, action, appointment_id, meta, created_at) = row?;
        entries.push(AuditEntry {
            id,
            actor_id,
            action,
            appointment_id,
            meta: serde_json::from_str(&meta)?,
            created_at: timestamp::parse(&created_at)?,
        });
    }
    Ok(entries)
}

// ── Outbox ──

const OUTBOX_COLUMNS: &str =
    "id, kind, appointment_id, recipient_id, message, status, attempts, available_at, last_error";

pub fn enqueue_outbox(conn: &Connection, msg: &NewOutboxMessage) -> anyhow::Result<i64> {
    conn.execute(
        "INSERT INTO outbox (kind, appointment_id, recipient_id, message, available_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            msg.kind.as_str(),
            msg.appointment_id,
            msg.recipient_id,
            msg.message,
            timestamp::format(&msg.available_at),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Marks reminders of an appointment that have not been sent yet as superseded.
pub fn supersede_pending_reminders(conn: &Connection, appointment_id: &str) -> anyhow::Result<usize> {
    let count = conn.execute(
        "UPDATE outbox SET status = ?1
         WHERE appointment_id = ?2 AND kind = ?3 AND status = ?4",
        params![
            OutboxStatus::Superseded.as_str(),
            appointment_id,
            OutboxKind::Reminder.as_str(),
            OutboxStatus::Pending.as_str(),
        ],
    )?;
    Ok(count)
}

/// Claims up to `limit` due messages, oldest first. Messages whose lease
/// expired while in flight are claimed again.
pub fn claim_due_outbox(
    conn: &Connection,
    now: &DateTime<Utc>,
    lease_until: &DateTime<Utc>,
    limit: i64,
) -> anyhow::Result<Vec<OutboxMessage>> {
    let now_str = timestamp::format(now);
    let candidates = {
        let mut stmt = conn.prepare(&format!(
            "SELECT {OUTBOX_COLUMNS} FROM outbox
             WHERE (status = 'pending' AND available_at <= ?1)
                OR (status = 'in_flight' AND locked_until <= ?1)
             ORDER BY id ASC LIMIT ?2"
        ))?;
        let rows = stmt.query_map(params![now_str, limit], |row| Ok(parse_outbox_row(row)))?;

        let mut messages = vec![];
        for row in rows {
            messages.push(row??);
        }
        messages
    };

    let mut claimed = Vec::with_capacity(candidates.len());
    for mut msg in candidates {
        // Another dispatcher may have taken it between the select and here.
        let count = conn.execute(
            "UPDATE outbox SET status = 'in_flight', locked_until = ?1
             WHERE id = ?2
               AND ((status = 'pending' AND available_at <= ?3)
                 OR (status = 'in_flight' AND locked_until <= ?3))",
            params![timestamp::format(lease_until), msg.id, now_str],
        )?;
        if count == 1 {
            msg.status = OutboxStatus::InFlight;
            claimed.push(msg);
        }
    }
    Ok(claimed)
}

pub fn mark_outbox_delivered(conn: &Connection, id: i64, now: &DateTime<Utc>) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE outbox SET status = 'delivered', attempts = attempts + 1, locked_until = NULL,
                           last_error = NULL, delivered_at = ?1
         WHERE id = ?2",
        params![timestamp::format(now), id],
    )?;
    Ok(())
}

/// Records a failed delivery. `retry_at` of `None` gives up on the message.
pub fn record_outbox_failure(
    conn: &Connection,
    id: i64,
    error: &str,
    retry_at: Option<&DateTime<Utc>>,
) -> anyhow::Result<()> {
    match retry_at {
        Some(at) => conn.execute(
            "UPDATE outbox SET status = 'pending', attempts = attempts + 1, locked_until = NULL,
                               last_error = ?1, available_at = ?2
             WHERE id = ?3",
            params![error, timestamp::format(at), id],
        )?,
        None => conn.execute(
            "UPDATE outbox SET status = 'failed', attempts = attempts + 1, locked_until = NULL,
                               last_error = ?1
             WHERE id = ?2",
            params![error, id],
        )?,
    };
    Ok(())
}

pub fn get_outbox_for_appointment(
    conn: &Connection,
    appointment_id: &str,
) -> anyhow::Result<Vec<OutboxMessage>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {OUTBOX_COLUMNS} FROM outbox WHERE appointment_id = ?1 ORDER BY id ASC"
    ))?;
    let rows = stmt.query_map(params![appointment_id], |row| Ok(parse_outbox_row(row)))?;

    let mut messages = vec![];
    for row in rows {
        messages.push(row??);
    }
    Ok(messages)
}

fn parse_outbox_row(row: &rusqlite::Row) -> anyhow::Result<OutboxMessage> {
    let kind: String = row.get(1)?;
    let status: String = row.get(5)?;
    let available_at: String = row.get(7)?;

    Ok(OutboxMessage {
        id: row.get(0)?,
        kind: OutboxKind::parse(&kind),
        appointment_id: row.get(2)?,
        recipient_id: row.get(3)?,
        message: row.get(4)?,
        status: OutboxStatus::parse(&status),
        attempts: row.get(6)?,
        available_at: timestamp::parse(&available_at)?,
        last_error: row.get(8)?,
    })
}
