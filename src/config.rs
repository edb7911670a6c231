use std::env;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    pub jwt_secret: String,
    pub notify_webhook_url: String,
    /// First bookable hour of the day (UTC).
    pub day_start_hour: u32,
    /// Hour at which the last slot of the day ends (UTC).
    pub day_end_hour: u32,
    pub outbox_poll_secs: u64,
    pub outbox_max_attempts: i64,
    pub outbox_retry_secs: i64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            port: parse_var("PORT", 3000),
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "appointments.db".to_string()),
            jwt_secret: env::var("JWT_SECRET").unwrap_or_default(),
            notify_webhook_url: env::var("NOTIFY_WEBHOOK_URL").unwrap_or_default(),
            day_start_hour: parse_var("DAY_START_HOUR", 9),
            day_end_hour: parse_var("DAY_END_HOUR", 17),
            outbox_poll_secs: parse_var("OUTBOX_POLL_SECS", 5),
            outbox_max_attempts: parse_var("OUTBOX_MAX_ATTEMPTS", 5),
            outbox_retry_secs: parse_var("OUTBOX_RETRY_SECS", 30),
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
