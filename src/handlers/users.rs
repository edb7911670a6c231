use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;

use super::AppJson;
use crate::db::{lock, queries};
use crate::errors::AppError;
use crate::models::{Requester, Role, User};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct SaveUserRequest {
    pub name: Option<String>,
    pub role: Option<String>,
    pub specialty: Option<String>,
}

// PUT /users/:id
// Maintains the directory that decorates appointment listings.
pub async fn save_user(
    State(state): State<Arc<AppState>>,
    requester: Requester,
    Path(id): Path<String>,
    AppJson(body): AppJson<SaveUserRequest>,
) -> Result<Json<User>, AppError> {
    if !matches!(requester.role, Role::Admin | Role::Staff) {
        return Err(AppError::Forbidden(
            "Only admins and staff can edit the user directory".to_string(),
        ));
    }

    let name = body
        .name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| AppError::Validation("missing required fields: name".to_string()))?;

    let user = User {
        id,
        name,
        role: body.role.as_deref().map(Role::parse).unwrap_or(Role::Patient),
        specialty: body.specialty.filter(|s| !s.trim().is_empty()),
    };

    {
        let db = lock(&state.db)?;
        queries::save_user(&db, &user)?;
    }

    tracing::info!(user_id = %user.id, role = user.role.as_str(), "user directory updated");
    Ok(Json(user))
}
