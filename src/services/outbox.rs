//! Deferred side effects of booking changes.
//!
//! Rows are written in the same transaction as the appointment change and
//! delivered afterwards by [`run_dispatcher`].

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rusqlite::Connection;

use crate::db::{lock, queries};
use crate::models::{timestamp, NewOutboxMessage, OutboxKind};
use crate::state::AppState;

pub const REMINDER_LEAD_HOURS: i64 = 24;
const CLAIM_BATCH: i64 = 50;
const CLAIM_LEASE_SECS: i64 = 120;

pub fn queue_notification(
    conn: &Connection,
    appointment_id: &str,
    recipient_id: &str,
    message: &str,
    now: DateTime<Utc>,
) -> anyhow::Result<i64> {
    queries::enqueue_outbox(
        conn,
        &NewOutboxMessage {
            kind: OutboxKind::Notification,
            appointment_id: appointment_id.to_string(),
            recipient_id: recipient_id.to_string(),
            message: message.to_string(),
            available_at: now,
        },
    )
}

/// Schedules a reminder 24h ahead of `slot`, or right away when that moment
/// has already passed.
pub fn queue_reminder_24h(
    conn: &Connection,
    appointment_id: &str,
    recipient_id: &str,
    slot: DateTime<Utc>,
    now: DateTime<Utc>,
) -> anyhow::Result<i64> {
    let due = (slot - Duration::hours(REMINDER_LEAD_HOURS)).max(now);
    queries::enqueue_outbox(
        conn,
        &NewOutboxMessage {
            kind: OutboxKind::Reminder,
            appointment_id: appointment_id.to_string(),
            recipient_id: recipient_id.to_string(),
            message: format!(
                "Reminder: you have an appointment at {}",
                timestamp::format(&slot)
            ),
            available_at: due,
        },
    )
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub retried: usize,
    pub failed: usize,
}

/// Delivers every message due at `now`, in enqueue order.
pub async fn dispatch_due(state: &Arc<AppState>, now: DateTime<Utc>) -> anyhow::Result<DispatchReport> {
    let lease_until = now + Duration::seconds(CLAIM_LEASE_SECS);
    let claimed = {
        let db = lock(&state.db)?;
        queries::claim_due_outbox(&db, &now, &lease_until, CLAIM_BATCH)?
    };

    let mut report = DispatchReport::default();
    for msg in claimed {
        let result = state
            .notifier
            .send_notification(&msg.recipient_id, &msg.message)
            .await;

        let db = lock(&state.db)?;
        match result {
            Ok(()) => {
                queries::mark_outbox_delivered(&db, msg.id, &now)?;
                report.delivered += 1;
            }
            Err(e) => {
                let attempts = msg.attempts + 1;
                let error = format!("{e:#}");
                if attempts >= state.config.outbox_max_attempts {
                    tracing::error!(
                        outbox_id = msg.id,
                        appointment_id = %msg.appointment_id,
                        kind = msg.kind.as_str(),
                        attempts,
                        error = %error,
                        "giving up on outbox message"
                    );
                    queries::record_outbox_failure(&db, msg.id, &error, None)?;
                    report.failed += 1;
                } else {
                    let retry_at = now + Duration::seconds(state.config.outbox_retry_secs * attempts);
                    tracing::warn!(
                        outbox_id = msg.id,
                        attempts,
                        retry_at = %timestamp::format(&retry_at),
                        error = %error,
                        "outbox delivery failed, will retry"
                    );
                    queries::record_outbox_failure(&db, msg.id, &error, Some(&retry_at))?;
                    report.retried += 1;
                }
            }
        }
    }

    Ok(report)
}

/// Polls the outbox until the process exits.
pub async fn run_dispatcher(state: Arc<AppState>) {
    let mut interval =
        tokio::time::interval(std::time::Duration::from_secs(state.config.outbox_poll_secs.max(1)));

    loop {
        interval.tick().await;
        match dispatch_due(&state, Utc::now()).await {
            Ok(report) if report != DispatchReport::default() => {
                tracing::info!(
                    delivered = report.delivered,
                    retried = report.retried,
                    failed = report.failed,
                    "outbox dispatch"
                );
            }
            Ok(_) => {}
            Err(e) => tracing::error!(error = %e, "outbox dispatch failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::TimeZone;

    use crate::config::AppConfig;
    use crate::db;
    use crate::models::OutboxStatus;
    use crate::services::notify::NotificationProvider;

    struct Recorder {
        sent: Arc<Mutex<Vec<(String, String)>>>,
        failures_left: AtomicUsize,
    }

    #[async_trait]
    impl NotificationProvider for Recorder {
        async fn send_notification(&self, recipient_id: &str, message: &str) -> anyhow::Result<()> {
            if self.failures_left.load(Ordering::SeqCst) > 0 {
                self.failures_left.fetch_sub(1, Ordering::SeqCst);
                anyhow::bail!("channel down");
            }
            self.sent
                .lock()
                .unwrap()
                .push((recipient_id.to_string(), message.to_string()));
            Ok(())
        }
    }

    fn test_state(failures: usize) -> (Arc<AppState>, Arc<Mutex<Vec<(String, String)>>>) {
        let sent = Arc::new(Mutex::new(vec![]));
        let mut config = AppConfig::from_env();
        config.outbox_max_attempts = 3;
        config.outbox_retry_secs = 10;
        let state = Arc::new(AppState {
            db: Arc::new(Mutex::new(db::init_db(":memory:").unwrap())),
            config,
            notifier: Box::new(Recorder {
                sent: Arc::clone(&sent),
                failures_left: AtomicUsize::new(failures),
            }),
        });
        (state, sent)
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 8, 0, 0).unwrap()
    }

    #[test]
    fn test_reminder_due_a_day_before_slot() {
        let conn = db::init_db(":memory:").unwrap();
        let slot = Utc.with_ymd_and_hms(2025, 1, 3, 10, 0, 0).unwrap();
        queue_reminder_24h(&conn, "a-1", "pat-1", slot, now()).unwrap();

        let rows = queries::get_outbox_for_appointment(&conn, "a-1").unwrap();
        assert_eq!(rows[0].kind, OutboxKind::Reminder);
        assert_eq!(rows[0].available_at, Utc.with_ymd_and_hms(2025, 1, 2, 10, 0, 0).unwrap());
    }

    #[test]
    fn test_reminder_for_imminent_slot_is_due_now() {
        let conn = db::init_db(":memory:").unwrap();
        let slot = now() + Duration::hours(2);
        queue_reminder_24h(&conn, "a-1", "pat-1", slot, now()).unwrap();

        let rows = queries::get_outbox_for_appointment(&conn, "a-1").unwrap();
        assert_eq!(rows[0].available_at, now());
    }

    #[tokio::test]
    async fn test_dispatch_delivers_in_order_and_skips_future() {
        let (state, sent) = test_state(0);
        {
            let conn = state.db.lock().unwrap();
            queue_notification(&conn, "a-1", "pat-1", "first", now()).unwrap();
            queue_notification(&conn, "a-1", "doc-1", "second", now()).unwrap();
            queue_reminder_24h(&conn, "a-1", "pat-1", now() + Duration::days(3), now()).unwrap();
        }

        let report = dispatch_due(&state, now()).await.unwrap();
        assert_eq!(report.delivered, 2);

        let sent = sent.lock().unwrap().clone();
        assert_eq!(sent[0], ("pat-1".to_string(), "first".to_string()));
        assert_eq!(sent[1], ("doc-1".to_string(), "second".to_string()));

        let conn = state.db.lock().unwrap();
        let rows = queries::get_outbox_for_appointment(&conn, "a-1").unwrap();
        assert_eq!(rows[0].status, OutboxStatus::Delivered);
        assert_eq!(rows[2].status, OutboxStatus::Pending);
    }

    #[tokio::test]
    async fn test_failed_delivery_is_retried_with_backoff() {
        let (state, sent) = test_state(1);
        {
            let conn = state.db.lock().unwrap();
            queue_notification(&conn, "a-1", "pat-1", "hello", now()).unwrap();
        }

        let report = dispatch_due(&state, now()).await.unwrap();
        assert_eq!(report.retried, 1);
        {
            let conn = state.db.lock().unwrap();
            let row = &queries::get_outbox_for_appointment(&conn, "a-1").unwrap()[0];
            assert_eq!(row.status, OutboxStatus::Pending);
            assert_eq!(row.attempts, 1);
            assert_eq!(row.available_at, now() + Duration::seconds(10));
            assert_eq!(row.last_error.as_deref(), Some("channel down"));
        }

        // Not due yet.
        assert_eq!(dispatch_due(&state, now()).await.unwrap(), DispatchReport::default());

        let report = dispatch_due(&state, now() + Duration::seconds(10)).await.unwrap();
        assert_eq!(report.delivered, 1);
        assert_eq!(sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let (state, sent) = test_state(usize::MAX);
        {
            let conn = state.db.lock().unwrap();
            queue_notification(&conn, "a-1", "pat-1", "hello", now()).unwrap();
        }

        let mut at = now();
        for _ in 0..3 {
            dispatch_due(&state, at).await.unwrap();
            at += Duration::hours(1);
        }

        let conn = state.db.lock().unwrap();
        let row = &queries::get_outbox_for_appointment(&conn, "a-1").unwrap()[0];
        assert_eq!(row.status, OutboxStatus::Failed);
        assert_eq!(row.attempts, 3);
        assert!(sent.lock().unwrap().is_empty());
    }
}
