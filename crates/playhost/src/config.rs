use std::env;
use std::time::Duration;

use tracing::warn;

pub const FRAME_SETTLE_ENV_VAR: &str = "PLAYHOST_FRAME_SETTLE_MS";
pub const RELOAD_DELAY_ENV_VAR: &str = "PLAYHOST_RELOAD_DELAY_MS";

const DEFAULT_FRAME_SETTLE_MS: u64 = 1_500;
const DEFAULT_RELOAD_DELAY_MS: u64 = 100;
const DEFAULT_MAX_PENDING_NOTICES: usize = 32;

#[derive(Debug, Clone)]
pub struct HostConfig {
    /// A frame gives no readiness signal, so it counts as loaded once this
    /// delay has passed.
    pub frame_settle_delay: Duration,
    pub reload_delay: Duration,
    pub max_pending_notices: usize,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            frame_settle_delay: Duration::from_millis(DEFAULT_FRAME_SETTLE_MS),
            reload_delay: Duration::from_millis(DEFAULT_RELOAD_DELAY_MS),
            max_pending_notices: DEFAULT_MAX_PENDING_NOTICES,
        }
    }
}

impl HostConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            frame_settle_delay: resolve_millis_env(
                FRAME_SETTLE_ENV_VAR,
                defaults.frame_settle_delay,
            ),
            reload_delay: resolve_millis_env(RELOAD_DELAY_ENV_VAR, defaults.reload_delay),
            ..defaults
        }
    }
}

fn resolve_millis_env(env_var: &'static str, fallback: Duration) -> Duration {
    match env::var(env_var) {
        Ok(value) => parse_millis(&value).unwrap_or_else(|| {
            warn!(
                env_var,
                value = value.as_str(),
                fallback_ms = fallback.as_millis() as u64,
                "invalid duration env var value; falling back to default"
            );
            fallback
        }),
        Err(env::VarError::NotPresent) => fallback,
        Err(err) => {
            warn!(
                env_var,
                error = %err,
                "unable to read duration env var; falling back to default"
            );
            fallback
        }
    }
}

fn parse_millis(raw: &str) -> Option<Duration> {
    raw.trim().parse::<u64>().ok().map(Duration::from_millis)
}
