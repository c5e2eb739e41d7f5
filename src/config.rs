use std::time::Duration;

// ============================================================================
// Configuration - environment variables with deployment defaults
// ============================================================================

#[derive(Debug, Clone)]
pub struct Config {
    /// AMQP broker URL (`RABBITMQ_URL`).
    pub amqp_url: String,
    /// Port this process serves HTTP on (`HTTP_PORT`).
    pub http_port: u16,
    /// CMS document endpoint (`CMS_API_URL`).
    pub cms_endpoint: String,
    /// ROS REST endpoint (`ROS_API_URL`).
    pub ros_endpoint: String,
    /// WMS TCP address (`WMS_TCP_ADDR`).
    pub wms_addr: String,
    /// Bounded timeout for every backend call (`BACKEND_TIMEOUT_MS`).
    pub backend_timeout: Duration,
    /// Broker redelivery ceiling per order (`MAX_REDELIVERIES`).
    pub max_redeliveries: u32,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            amqp_url: env_or("RABBITMQ_URL", "amqp://127.0.0.1:5672/%2f"),
            http_port: env_parsed("HTTP_PORT", 8080),
            cms_endpoint: env_or("CMS_API_URL", "http://127.0.0.1:3001/cms"),
            ros_endpoint: env_or("ROS_API_URL", "http://127.0.0.1:3003/api/routes"),
            wms_addr: env_or("WMS_TCP_ADDR", "127.0.0.1:4002"),
            backend_timeout: Duration::from_millis(env_parsed("BACKEND_TIMEOUT_MS", 5000)),
            max_redeliveries: env_parsed("MAX_REDELIVERIES", 5),
        }
    }
}
