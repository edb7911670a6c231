use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};

use crate::errors::AppError;
use crate::models::Requester;
use crate::services::appointments;
use crate::services::calendar::generate_ics;
use crate::state::AppState;

// GET /appointments/:id/calendar.ics
pub async fn download_ics(
    State(state): State<Arc<AppState>>,
    requester: Requester,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let appointment = appointments::get_appointment_for(&state, &requester, &id)?;

    let ics = generate_ics(&appointment);
    let filename = format!("appointment-{}.ics", appointment.id);

    Ok((
        [
            (header::CONTENT_TYPE, "text/calendar; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        ics,
    )
        .into_response())
}
