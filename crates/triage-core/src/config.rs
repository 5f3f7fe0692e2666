use std::time::Duration;

// ---------------------------------------------------------------------------
// Env helpers
// ---------------------------------------------------------------------------

/// Read an environment variable as u64, falling back to `default` when the
/// variable is missing or unparseable.
fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_f64(name: &str, default: f64) -> f64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ---------------------------------------------------------------------------
// ConnectorConfig
// ---------------------------------------------------------------------------

/// Stability policy for external-collaborator calls: per-attempt timeout,
/// retry budget with exponential backoff, and circuit breaker thresholds.
/// One instance configures the single shared breaker protecting all external
/// dependencies.
#[derive(Debug, Clone)]
pub struct ConnectorConfig {
    pub timeout: Duration,
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub breaker_fail_max: u32,
    pub breaker_reset_timeout: Duration,
}

fn default_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_initial_backoff() -> Duration {
    Duration::from_millis(200)
}

fn default_max_backoff() -> Duration {
    Duration::from_secs(2)
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            max_attempts: 3,
            initial_backoff: default_initial_backoff(),
            max_backoff: default_max_backoff(),
            breaker_fail_max: 5,
            breaker_reset_timeout: Duration::from_secs(30),
        }
    }
}

impl ConnectorConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            timeout: Duration::from_secs_f64(env_f64(
                "TRIAGE_CONNECTOR_TIMEOUT_SECONDS",
                defaults.timeout.as_secs_f64(),
            )),
            max_attempts: env_u64("TRIAGE_CONNECTOR_MAX_ATTEMPTS", 3) as u32,
            initial_backoff: Duration::from_secs_f64(env_f64(
                "TRIAGE_CONNECTOR_INITIAL_BACKOFF",
                defaults.initial_backoff.as_secs_f64(),
            )),
            max_backoff: Duration::from_secs_f64(env_f64(
                "TRIAGE_CONNECTOR_MAX_BACKOFF",
                defaults.max_backoff.as_secs_f64(),
            )),
            breaker_fail_max: env_u64("TRIAGE_CONNECTOR_BREAKER_FAIL_MAX", 5) as u32,
            breaker_reset_timeout: Duration::from_secs(env_u64(
                "TRIAGE_CONNECTOR_BREAKER_RESET_TIMEOUT",
                30,
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Process-wide configuration, constructed once at startup and passed by
/// handle to consumers.
#[derive(Debug, Clone)]
pub struct Config {
    /// Delay between webhook admission and the first workflow action.
    pub admission_delay: Duration,
    /// TTL of an idempotency lock entry.
    pub idempotency_ttl: Duration,
    pub connector: ConnectorConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            admission_delay: Duration::from_secs(20),
            idempotency_ttl: Duration::from_secs(300),
            connector: ConnectorConfig::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            admission_delay: Duration::from_secs(env_u64("TRIAGE_ADMISSION_DELAY_SECONDS", 20)),
            idempotency_ttl: Duration::from_secs(env_u64("TRIAGE_IDEMPOTENCY_TTL_SECONDS", 300)),
            connector: ConnectorConfig::from_env(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
