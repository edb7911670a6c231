pub mod appointments;
pub mod availability;
pub mod calendar;
pub mod notify;
pub mod outbox;
pub mod slot;
