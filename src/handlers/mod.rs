pub mod appointments;
pub mod calendar;
pub mod health;
pub mod users;

use axum::extract::FromRequest;

use crate::errors::AppError;

/// `Json` whose rejections come back as 400 `{"error": ...}`.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct AppJson<T>(pub T);
