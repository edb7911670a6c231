pub mod appointment;
pub mod audit;
pub mod outbox;
pub mod timestamp;
pub mod user;

pub use appointment::{Appointment, AppointmentStatus, AppointmentView, PartySummary};
pub use audit::{AuditAction, AuditEntry};
pub use outbox::{NewOutboxMessage, OutboxKind, OutboxMessage, OutboxStatus};
pub use user::{Requester, Role, User};
