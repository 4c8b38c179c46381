use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    pub host: String,
    pub port: u16,
    pub frontend_url: String,

    /// Webhook endpoint of the notification/activity-feed service.
    /// Empty disables outbound dispatch (notifications become log lines).
    pub notification_webhook_url: String,

    /// How wide the reminder due-window is, in minutes.
    pub reminder_window_minutes: i64,
    /// How often the in-process reminder worker wakes up, in seconds.
    /// 0 disables the worker (external cron hits /internal/reminders/run).
    pub reminder_interval_secs: u64,

    /// Streak-milestone social notifications (1/7/30/100 day streaks).
    pub milestone_notifications_enabled: bool,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            database_url: env::var("DATABASE_URL").expect("DATABASE_URL must be set"),
            database_max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "20".into())
                .parse()
                .expect("DATABASE_MAX_CONNECTIONS must be a number"),
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".into())
                .parse()
                .expect("PORT must be a number"),
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:3000".into()),

            notification_webhook_url: env::var("NOTIFICATION_WEBHOOK_URL")
                .unwrap_or_else(|_| String::new()),

            reminder_window_minutes: env::var("REMINDER_WINDOW_MINUTES")
                .unwrap_or_else(|_| "15".into())
                .parse()
                .expect("REMINDER_WINDOW_MINUTES must be a number"),
            reminder_interval_secs: env::var("REMINDER_INTERVAL_SECS")
                .unwrap_or_else(|_| "300".into())
                .parse()
                .expect("REMINDER_INTERVAL_SECS must be a number"),

            milestone_notifications_enabled: env::var("MILESTONE_NOTIFICATIONS_ENABLED")
                .unwrap_or_else(|_| "false".into())
                .parse()
                .unwrap_or(false),
        }
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
