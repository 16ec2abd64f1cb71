/// Notification hub configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// HS256 secret used to validate bearer tokens.
    pub jwt_secret: String,
    /// Expected `iss` claim. Unchecked when unset.
    pub jwt_issuer: Option<String>,
    /// Port the HTTP server binds to.
    pub port: u16,
    /// Heartbeat interval announced to clients in READY (ms).
    pub heartbeat_interval_ms: u64,
}

pub const DEFAULT_PORT: u16 = 5080;
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 15_000;

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Panics with a descriptive message if a required variable is missing.
    pub fn from_env() -> Self {
        Self {
            jwt_secret: required_var("JWT_SECRET"),
            jwt_issuer: std::env::var("JWT_ISSUER").ok().filter(|s| !s.is_empty()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_PORT),
            heartbeat_interval_ms: std::env::var("HEARTBEAT_INTERVAL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|ms| *ms > 0)
                .unwrap_or(DEFAULT_HEARTBEAT_INTERVAL_MS),
        }
    }

    /// Config with defaults and the given secret; used by tests and tooling.
    pub fn with_secret(secret: impl Into<String>) -> Self {
        Self {
            jwt_secret: secret.into(),
            jwt_issuer: None,
            port: DEFAULT_PORT,
            heartbeat_interval_ms: DEFAULT_HEARTBEAT_INTERVAL_MS,
        }
    }
}

fn required_var(name: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| panic!("{name} env var is required"))
}
