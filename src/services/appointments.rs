use std::sync::Arc;

use chrono::{DateTime, NaiveDate, SubsecRound, Utc};
use rusqlite::Connection;
use serde::Deserialize;

use crate::db::{self, lock, queries};
use crate::errors::AppError;
use crate::models::{
    timestamp, Appointment, AppointmentStatus, AppointmentView, AuditAction, Requester, Role,
};
use crate::services::availability::{check_slot, free_slots};
use crate::services::outbox::{queue_notification, queue_reminder_24h};
use crate::services::slot::parse_slot;
use crate::state::AppState;

const SLOT_TAKEN: &str = "This slot has just been taken, please choose another time";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAppointmentRequest {
    pub patient_id: Option<String>,
    pub doctor_id: Option<String>,
    pub date: Option<String>,
    pub notes: Option<String>,
}

pub async fn create_appointment(
    state: &Arc<AppState>,
    actor: &Requester,
    req: CreateAppointmentRequest,
) -> Result<Appointment, AppError> {
    let patient_id = non_empty(req.patient_id.as_deref());
    let doctor_id = non_empty(req.doctor_id.as_deref());
    let raw_date = non_empty(req.date.as_deref());

    let (Some(patient_id), Some(doctor_id), Some(raw_date)) = (patient_id, doctor_id, raw_date) else {
        let missing: Vec<&str> = [
            ("patientId", patient_id.is_none()),
            ("doctorId", doctor_id.is_none()),
            ("date", raw_date.is_none()),
        ]
        .into_iter()
        .filter_map(|(field, absent)| absent.then_some(field))
        .collect();
        return Err(AppError::Validation(format!(
            "missing required fields: {}",
            missing.join(", ")
        )));
    };

    let slot = parse_date_field("date", raw_date)?;

    let clash = check_slot(&state.db, doctor_id, patient_id, slot, None).await?;
    if !clash.is_free() {
        tracing::info!(doctor_id, patient_id, slot = %timestamp::format(&slot), "slot unavailable");
        return Err(AppError::Conflict(clash.describe().to_string()));
    }

    let now = now_millis();
    let appointment = Appointment {
        id: uuid::Uuid::new_v4().to_string(),
        patient_id: patient_id.to_string(),
        doctor_id: doctor_id.to_string(),
        date: slot,
        status: AppointmentStatus::Confirmed,
        notes: req.notes.filter(|n| !n.trim().is_empty()),
        created_at: now,
        updated_at: now,
    };

    write_change(state, |conn| {
        queries::insert_appointment(conn, &appointment)?;
        let when = timestamp::format(&appointment.date);
        queue_notification(
            conn,
            &appointment.id,
            &appointment.patient_id,
            &format!("Your appointment on {when} is confirmed"),
            now,
        )?;
        queue_notification(
            conn,
            &appointment.id,
            &appointment.doctor_id,
            &format!("New appointment booked for {when}"),
            now,
        )?;
        queue_reminder_24h(conn, &appointment.id, &appointment.patient_id, appointment.date, now)?;
        queries::insert_audit_entry(
            conn,
            &actor.id,
            AuditAction::AppointmentCreated,
            &appointment.id,
            &serde_json::json!({
                "patientId": appointment.patient_id,
                "doctorId": appointment.doctor_id,
                "slot": when,
            }),
        )?;
        Ok(())
    })?;

    tracing::info!(
        appointment_id = %appointment.id,
        doctor_id = %appointment.doctor_id,
        slot = %timestamp::format(&appointment.date),
        "appointment created"
    );
    Ok(appointment)
}

pub async fn reschedule_appointment(
    state: &Arc<AppState>,
    actor: &Requester,
    appointment_id: &str,
    raw_new_date: Option<&str>,
) -> Result<Appointment, AppError> {
    let raw_new_date = non_empty(raw_new_date)
        .ok_or_else(|| AppError::Validation("missing required fields: newDate".to_string()))?;
    let slot = parse_date_field("newDate", raw_new_date)?;

    let current = {
        let db = lock(&state.db)?;
        queries::get_appointment_by_id(&db, appointment_id)?
    }
    .ok_or_else(|| appointment_not_found(appointment_id))?;
    ensure_transition(&current, AppointmentStatus::Rescheduled)?;

    // The appointment's own slot never counts as a clash.
    let clash = check_slot(
        &state.db,
        &current.doctor_id,
        &current.patient_id,
        slot,
        Some(&current.id),
    )
    .await?;
    if !clash.is_free() {
        return Err(AppError::Conflict(clash.describe().to_string()));
    }

    let now = now_millis();
    let updated = write_change(state, |conn| {
        // Re-read under the write lock; a cancel may have landed meanwhile.
        let mut appt = queries::get_appointment_by_id(conn, appointment_id)?
            .ok_or_else(|| appointment_not_found(appointment_id))?;
        ensure_transition(&appt, AppointmentStatus::Rescheduled)?;

        let previous = appt.date;
        appt.date = slot;
        appt.status = AppointmentStatus::Rescheduled;
        appt.updated_at = now;
        queries::update_appointment(conn, &appt)?;

        queries::supersede_pending_reminders(conn, &appt.id)?;
        let when = timestamp::format(&appt.date);
        let message = format!("Your appointment has been moved to {when}");
        queue_notification(conn, &appt.id, &appt.patient_id, &message, now)?;
        queue_notification(conn, &appt.id, &appt.doctor_id, &message, now)?;
        queue_reminder_24h(conn, &appt.id, &appt.patient_id, appt.date, now)?;
        queries::insert_audit_entry(
            conn,
            &actor.id,
            AuditAction::AppointmentRescheduled,
            &appt.id,
            &serde_json::json!({
                "previousSlot": timestamp::format(&previous),
                "slot": when,
            }),
        )?;
        Ok(appt)
    })?;

    tracing::info!(
        appointment_id = %updated.id,
        slot = %timestamp::format(&updated.date),
        "appointment rescheduled"
    );
    Ok(updated)
}

pub async fn cancel_appointment(
    state: &Arc<AppState>,
    actor: &Requester,
    appointment_id: &str,
) -> Result<Appointment, AppError> {
    let now = now_millis();
    let cancelled = write_change(state, |conn| {
        let mut appt = queries::get_appointment_by_id(conn, appointment_id)?
            .ok_or_else(|| appointment_not_found(appointment_id))?;
        ensure_transition(&appt, AppointmentStatus::Cancelled)?;

        appt.status = AppointmentStatus::Cancelled;
        appt.updated_at = now;
        queries::update_appointment(conn, &appt)?;

        queries::supersede_pending_reminders(conn, &appt.id)?;
        let message = format!(
            "Your appointment on {} has been cancelled",
            timestamp::format(&appt.date)
        );
        queue_notification(conn, &appt.id, &appt.patient_id, &message, now)?;
        queue_notification(conn, &appt.id, &appt.doctor_id, &message, now)?;
        queries::insert_audit_entry(
            conn,
            &actor.id,
            AuditAction::AppointmentCancelled,
            &appt.id,
            &serde_json::json!({ "slot": timestamp::format(&appt.date) }),
        )?;
        Ok(appt)
    })?;

    tracing::info!(appointment_id = %cancelled.id, "appointment cancelled");
    Ok(cancelled)
}

/// Doctors see the appointments they hold; everyone else sees their own
/// appointments as a patient.
pub fn list_appointments(
    state: &Arc<AppState>,
    requester: &Requester,
) -> Result<Vec<AppointmentView>, AppError> {
    let party = match requester.role {
        Role::Doctor => queries::Party::Doctor,
        _ => queries::Party::Patient,
    };
    let db = lock(&state.db)?;
    Ok(queries::list_appointment_views(&db, party, &requester.id)?)
}

pub fn get_appointment(state: &Arc<AppState>, appointment_id: &str) -> Result<Appointment, AppError> {
    let db = lock(&state.db)?;
    queries::get_appointment_by_id(&db, appointment_id)?
        .ok_or_else(|| appointment_not_found(appointment_id))
}

/// Like [`get_appointment`], limited to what `requester` may see: admins and
/// staff see every appointment, others only those they take part in.
pub fn get_appointment_for(
    state: &Arc<AppState>,
    requester: &Requester,
    appointment_id: &str,
) -> Result<Appointment, AppError> {
    let appointment = get_appointment(state, appointment_id)?;
    let allowed = matches!(requester.role, Role::Admin | Role::Staff)
        || requester.id == appointment.doctor_id
        || requester.id == appointment.patient_id;
    if !allowed {
        return Err(AppError::Forbidden(
            "You are not a party to this appointment".to_string(),
        ));
    }
    Ok(appointment)
}

/// Free slots of a doctor on a `YYYY-MM-DD` day, as ISO timestamps.
pub fn available_slots(
    state: &Arc<AppState>,
    doctor_id: Option<&str>,
    date: Option<&str>,
) -> Result<Vec<String>, AppError> {
    let (Some(doctor_id), Some(date)) = (non_empty(doctor_id), non_empty(date)) else {
        return Err(AppError::Validation(
            "doctorId and date query parameters are required".to_string(),
        ));
    };
    let day = NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map_err(|_| AppError::Validation(format!("invalid date: {date}, expected YYYY-MM-DD")))?;

    let db = lock(&state.db)?;
    let slots = free_slots(
        &db,
        doctor_id,
        day,
        state.config.day_start_hour,
        state.config.day_end_hour,
    )?;
    Ok(slots.iter().map(timestamp::format).collect())
}

/// Runs `change` in one transaction. A unique index violation means another
/// request took the slot after our availability check.
fn write_change<T>(
    state: &AppState,
    change: impl FnOnce(&Connection) -> Result<T, AppError>,
) -> Result<T, AppError> {
    let mut conn = lock(&state.db)?;
    let tx = conn.transaction()?;
    match change(&tx) {
        Ok(value) => {
            tx.commit()?;
            Ok(value)
        }
        Err(AppError::System(e)) if db::is_unique_violation(&e) => {
            tracing::info!("slot taken by a concurrent booking");
            Err(AppError::Conflict(SLOT_TAKEN.to_string()))
        }
        Err(e) => Err(e),
    }
}

fn ensure_transition(appt: &Appointment, next: AppointmentStatus) -> Result<(), AppError> {
    if appt.status.can_transition_to(next) {
        return Ok(());
    }
    let message = match appt.status {
        AppointmentStatus::Cancelled if next == AppointmentStatus::Cancelled => {
            "Appointment is already cancelled".to_string()
        }
        AppointmentStatus::Cancelled => "A cancelled appointment cannot be rescheduled".to_string(),
        current => format!("Cannot change appointment from {current:?} to {next:?}"),
    };
    Err(AppError::Conflict(message))
}

fn appointment_not_found(id: &str) -> AppError {
    AppError::NotFound(format!("appointment {id} not found"))
}

fn parse_date_field(field: &str, raw: &str) -> Result<DateTime<Utc>, AppError> {
    parse_slot(raw).map_err(|_| AppError::Validation(format!("invalid {field}: {raw}")))
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn now_millis() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}
