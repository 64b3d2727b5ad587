//! Hub configuration parsed from environment variables.

pub const DEFAULT_PORT: u16 = 4000;
pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8000";
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_BACKEND_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_BACKEND_CONNECT_TIMEOUT_SECS: u64 = 5;

#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Listen port for the websocket + `/emit` endpoint.
    pub port: u16,
    /// Allowed CORS origins. Empty means allow any (development default).
    pub socket_origins: Vec<String>,
    /// HR backend base URL used by the sweeper and the chat bridge.
    pub backend_url: String,
    /// Attendance sweeper period.
    pub sweep_interval_secs: u64,
    /// Request timeout for outbound HR backend calls.
    pub backend_timeout_secs: u64,
    /// Connect timeout for outbound HR backend calls.
    pub backend_connect_timeout_secs: u64,
}

impl HubConfig {
    /// Build typed hub config from environment variables.
    ///
    /// Optional:
    /// - `PORT`: default 4000
    /// - `SOCKET_ORIGINS`: comma-separated CORS origins; any origin if unset
    /// - `BACKEND_URL`: default `http://localhost:8000`
    /// - `SWEEP_INTERVAL_SECS`: default 60
    /// - `BACKEND_TIMEOUT_SECS`: default 5
    /// - `BACKEND_CONNECT_TIMEOUT_SECS`: default 5
    #[must_use]
    pub fn from_env() -> Self {
        let socket_origins = std::env::var("SOCKET_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let backend_url = std::env::var("BACKEND_URL")
            .unwrap_or_else(|_| DEFAULT_BACKEND_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        Self {
            port: env_parse("PORT", DEFAULT_PORT),
            socket_origins,
            backend_url,
            sweep_interval_secs: env_parse("SWEEP_INTERVAL_SECS", DEFAULT_SWEEP_INTERVAL_SECS),
            backend_timeout_secs: env_parse("BACKEND_TIMEOUT_SECS", DEFAULT_BACKEND_TIMEOUT_SECS),
            backend_connect_timeout_secs: env_parse(
                "BACKEND_CONNECT_TIMEOUT_SECS",
                DEFAULT_BACKEND_CONNECT_TIMEOUT_SECS,
            ),
        }
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            socket_origins: Vec::new(),
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
            backend_timeout_secs: DEFAULT_BACKEND_TIMEOUT_SECS,
            backend_connect_timeout_secs: DEFAULT_BACKEND_CONNECT_TIMEOUT_SECS,
        }
    }
}

pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}
