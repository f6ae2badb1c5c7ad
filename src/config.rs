// src/config.rs
use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub environment: String,
    pub api_base_url: String,
    pub http_timeout_ms: u64,
    pub http_max_retries: u32,
    pub realtime: RealtimeServer,
    pub session_file: String,
    pub poll_interval_secs: u64,
}

#[derive(Debug, Clone)]
pub struct RealtimeServer {
    pub host: String,
    pub port: u16,
    pub tls: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        dotenv::dotenv().ok();

        let realtime = Self::parse_realtime_server(
            &env::var("REALTIME_GATEWAY").unwrap_or_else(|_| "127.0.0.1:9700".to_string()),
        )?;

        Ok(Config {
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "production".to_string()),
            api_base_url: env::var("API_BASE_URL")?,
            http_timeout_ms: env::var("HTTP_TIMEOUT_MS")
                .unwrap_or_else(|_| "10000".to_string())
                .parse()?,
            http_max_retries: env::var("HTTP_MAX_RETRIES")
                .unwrap_or_else(|_| "3".to_string())
                .parse()?,
            realtime,
            session_file: env::var("SESSION_FILE")
                .unwrap_or_else(|_| ".driver-session.json".to_string()),
            poll_interval_secs: env::var("POLL_INTERVAL_SECS")
                .unwrap_or_else(|_| "15".to_string())
                .parse()?,
        })
    }

    // Format: "host:port" or "host:port:tls"
    fn parse_realtime_server(server_str: &str) -> Result<RealtimeServer, Box<dyn std::error::Error>> {
        let parts: Vec<&str> = server_str.trim().split(':').collect();

        if parts.len() < 2 {
            return Err(format!("Invalid REALTIME_GATEWAY: {}", server_str).into());
        }

        Ok(RealtimeServer {
            host: parts[0].to_string(),
            port: parts[1].parse()?,
            tls: parts.get(2).map_or(false, |p| *p == "tls"),
        })
    }
}
