use std::sync::{Arc, Mutex};

use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::Connection;

use crate::db::{lock, queries};
use crate::services::slot::{day_slots, normalize_to_slot};

/// Which parties already hold `slot`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SlotClash {
    pub doctor: bool,
    pub patient: bool,
}

impl SlotClash {
    pub fn is_free(&self) -> bool {
        !self.doctor && !self.patient
    }

    pub fn describe(&self) -> &'static str {
        match (self.doctor, self.patient) {
            (true, true) => "Both the doctor and the patient already have an appointment in this slot",
            (true, false) => "The doctor already has an appointment in this slot",
            (false, true) => "The patient already has an appointment in this slot",
            (false, false) => "Slot is available",
        }
    }
}

/// Looks up live appointments of the doctor and of the patient at `slot`.
/// The two lookups run as independent blocking tasks. The answer is a
/// snapshot only; the unique indexes decide at write time.
pub async fn check_slot(
    db: &Arc<Mutex<Connection>>,
    doctor_id: &str,
    patient_id: &str,
    slot: DateTime<Utc>,
    exclude_id: Option<&str>,
) -> anyhow::Result<SlotClash> {
    let slot = normalize_to_slot(slot);
    let exclude = exclude_id.map(str::to_string);

    let doctor_task = {
        let db = Arc::clone(db);
        let doctor_id = doctor_id.to_string();
        let exclude = exclude.clone();
        tokio::task::spawn_blocking(move || -> anyhow::Result<bool> {
            let conn = lock(&db)?;
            queries::doctor_has_appointment_at(&conn, &doctor_id, &slot, exclude.as_deref())
        })
    };

    let patient_task = {
        let db = Arc::clone(db);
        let patient_id = patient_id.to_string();
        tokio::task::spawn_blocking(move || -> anyhow::Result<bool> {
            let conn = lock(&db)?;
            queries::patient_has_appointment_at(&conn, &patient_id, &slot, exclude.as_deref())
        })
    };

    let (doctor, patient) = tokio::try_join!(doctor_task, patient_task)
        .context("availability lookup task failed")?;

    Ok(SlotClash {
        doctor: doctor?,
        patient: patient?,
    })
}

pub async fn is_slot_available(
    db: &Arc<Mutex<Connection>>,
    doctor_id: &str,
    patient_id: &str,
    slot: DateTime<Utc>,
) -> anyhow::Result<bool> {
    Ok(check_slot(db, doctor_id, patient_id, slot, None).await?.is_free())
}

/// Free slot starts of a doctor on `day`, ascending.
pub fn free_slots(
    conn: &Connection,
    doctor_id: &str,
    day: NaiveDate,
    start_hour: u32,
    end_hour: u32,
) -> anyhow::Result<Vec<DateTime<Utc>>> {
    let slots = day_slots(day, start_hour, end_hour);
    let (Some(first), Some(last)) = (slots.first(), slots.last()) else {
        return Ok(vec![]);
    };

    let booked = queries::get_booked_slots_for_doctor(conn, doctor_id, first, last)?;

    Ok(slots.into_iter().filter(|s| !booked.contains(s)).collect())
}
