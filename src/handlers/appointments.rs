use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use super::AppJson;
use crate::errors::AppError;
use crate::models::{Appointment, AppointmentView, Requester};
use crate::services::appointments::{self, CreateAppointmentRequest};
use crate::state::AppState;

#[derive(Serialize)]
pub struct AppointmentResponse {
    message: &'static str,
    appointment: Appointment,
}

// POST /appointments/create-appointment
pub async fn create_appointment(
    State(state): State<Arc<AppState>>,
    requester: Requester,
    AppJson(body): AppJson<CreateAppointmentRequest>,
) -> Result<(StatusCode, Json<AppointmentResponse>), AppError> {
    let appointment = appointments::create_appointment(&state, &requester, body).await?;

    Ok((
        StatusCode::CREATED,
        Json(AppointmentResponse {
            message: "Appointment created successfully",
            appointment,
        }),
    ))
}

// PUT /appointments/:id/reschedule
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RescheduleRequest {
    pub new_date: Option<String>,
}

pub async fn reschedule_appointment(
    State(state): State<Arc<AppState>>,
    requester: Requester,
    Path(id): Path<String>,
    AppJson(body): AppJson<RescheduleRequest>,
) -> Result<Json<AppointmentResponse>, AppError> {
    let appointment =
        appointments::reschedule_appointment(&state, &requester, &id, body.new_date.as_deref())
            .await?;

    Ok(Json(AppointmentResponse {
        message: "Appointment rescheduled successfully",
        appointment,
    }))
}

// PUT /appointments/:id/cancel
pub async fn cancel_appointment(
    State(state): State<Arc<AppState>>,
    requester: Requester,
    Path(id): Path<String>,
) -> Result<Json<AppointmentResponse>, AppError> {
    let appointment = appointments::cancel_appointment(&state, &requester, &id).await?;

    Ok(Json(AppointmentResponse {
        message: "Appointment cancelled successfully",
        appointment,
    }))
}

// GET /appointments/get-appointment
pub async fn get_appointments(
    State(state): State<Arc<AppState>>,
    requester: Requester,
) -> Result<Json<Vec<AppointmentView>>, AppError> {
    Ok(Json(appointments::list_appointments(&state, &requester)?))
}

// GET /appointments/availability?doctorId=&date=YYYY-MM-DD
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityQuery {
    pub doctor_id: Option<String>,
    pub date: Option<String>,
}

pub async fn get_availability(
    State(state): State<Arc<AppState>>,
    _requester: Requester,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<Vec<String>>, AppError> {
    let slots = appointments::available_slots(
        &state,
        query.doctor_id.as_deref(),
        query.date.as_deref(),
    )?;
    Ok(Json(slots))
}
