use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub db_host: String,
    pub db_port: u16,
    pub db_user: String,
    pub db_password: String,
    pub db_name: String,
    pub port: u16,
    pub rust_log: String,

    pub broker_host: String,
    pub broker_port: u16,
    pub broker_user: String,
    pub broker_password: String,
    pub broker_worker_queue_name: String,
    pub broker_response_queue_name: String,

    pub status_probe_interval_secs: u64,
}

impl Config {
    pub fn load() -> Self {
        let config = Self {
            db_host: env::var("DB_HOST").unwrap_or_else(|_| "localhost".to_string()),
            db_port: env::var("DB_PORT")
                .unwrap_or_else(|_| "3306".to_string())
                .parse()
                .unwrap_or(3306),
            db_user: env::var("DB_USER").unwrap_or_else(|_| "judge".to_string()),
            db_password: env::var("DB_PASSWORD").unwrap_or_else(|_| "secret_app".to_string()),
            db_name: env::var("DB_NAME").unwrap_or_else(|_| "judge".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
            rust_log: env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),

            broker_host: env::var("BROKER_HOST")
                .expect("BROKER_HOST environment variable is required"),
            broker_port: env::var("BROKER_PORT")
                .expect("BROKER_PORT environment variable is required")
                .parse()
                .expect("BROKER_PORT must be a valid port number"),
            broker_user: env::var("BROKER_USER")
                .expect("BROKER_USER environment variable is required"),
            broker_password: env::var("BROKER_PASSWORD")
                .expect("BROKER_PASSWORD environment variable is required"),
            broker_worker_queue_name: env::var("BROKER_WORKER_QUEUE_NAME")
                .expect("BROKER_WORKER_QUEUE_NAME environment variable is required"),
            broker_response_queue_name: env::var("BROKER_RESPONSE_QUEUE_NAME")
                .expect("BROKER_RESPONSE_QUEUE_NAME environment variable is required"),

            status_probe_interval_secs: env::var("STATUS_PROBE_INTERVAL_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .unwrap_or(30),
        };

        if config.db_host.is_empty() {
            panic!("DB_HOST environment variable is required");
        }
        if config.db_user.is_empty() {
            panic!("DB_USER environment variable is required");
        }
        if config.db_password.is_empty() {
            panic!("DB_PASSWORD environment variable is required");
        }
        if config.db_name.is_empty() {
            panic!("DB_NAME environment variable is required");
        }
        if config.port == 0 {
            panic!("PORT environment variable must be a valid port number");
        }

        config
    }

    pub fn database_url(&self) -> String {
        format!(
            "mysql://{}:{}@{}:{}/{}?parseTime=true&charset=utf8mb4&collation=utf8mb4_unicode_ci",
            self.db_user, self.db_password, self.db_host, self.db_port, self.db_name
        )
    }

    pub fn broker_url(&self) -> String {
        format!(
            "amqp://{}:{}@{}:{}",
            self.broker_user, self.broker_password, self.broker_host, self.broker_port
        )
    }
}
