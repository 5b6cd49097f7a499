//! loginbot
//!
//! Automates a single login run against a web form: launches a controlled
//! browser, clears a bot-verification widget when one appears, enters
//! credentials with human-like pacing and classifies the outcome. Failures
//! leave a screenshot behind and can be relayed to a chat channel.

pub mod browser;
pub mod flow;
pub mod humanize;
pub mod login;
pub mod notify;
pub mod outcome;
pub mod verify;

use std::path::PathBuf;

use browser::BrowserSessionConfig;
use flow::RunError;
use humanize::DelayRange;
use login::{FieldSelectors, FormPacing};
use outcome::SuccessPolicy;
use verify::{ChallengePolicy, ResolverConfig, ResolverMode, StrategyConfig};

/// Pacing for the run as a whole, plus the form-level pacing.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunPacing {
    /// Wait after a page load before acting on it
    pub page_settle: DelayRange,
    /// Linger after a successful login before closing the browser
    pub post_success: DelayRange,
    pub form: FormPacing,
}

impl Default for RunPacing {
    fn default() -> Self {
        Self {
            page_settle: DelayRange::new(1500, 3000),
            post_success: DelayRange::new(5000, 5000),
            form: FormPacing::default(),
        }
    }
}

/// Configuration for one login run. No ambient state: everything the flow
/// touches is in here or in [`login::Credentials`].
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunConfig {
    /// Login page URL
    pub target_url: String,
    pub browser: BrowserSessionConfig,
    pub resolver: ResolverConfig,
    pub challenge_policy: ChallengePolicy,
    pub strategies: StrategyConfig,
    pub success_policy: SuccessPolicy,
    pub field_selectors: FieldSelectors,
    pub pacing: RunPacing,
    /// Directory for failure screenshots, created on demand
    pub screenshot_dir: PathBuf,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            target_url: String::new(),
            browser: BrowserSessionConfig::default(),
            resolver: ResolverConfig::default(),
            challenge_policy: ChallengePolicy::default(),
            strategies: StrategyConfig::default(),
            success_policy: SuccessPolicy::default(),
            field_selectors: FieldSelectors::default(),
            pacing: RunPacing::default(),
            screenshot_dir: PathBuf::from("screenshots"),
        }
    }
}

impl RunConfig {
    /// Build a config from environment variables over the defaults.
    ///
    /// - `LOGIN_URL` (required) - target login page
    /// - `LOGIN_HEADLESS` - run the browser headless
    /// - `LOGIN_INTERACTIVE` - wait for a manual challenge solve
    /// - `LOGIN_MAX_ATTEMPTS` - unattended resolver attempts
    pub fn from_env() -> Result<Self, RunError> {
        let mut config = Self::default();

        let target = std::env::var("LOGIN_URL").map_err(|_| RunError::MissingEnv("LOGIN_URL"))?;
        url::Url::parse(&target)
            .map_err(|e| RunError::InvalidConfig(format!("LOGIN_URL: {}", e)))?;
        config.target_url = target;

        if let Some(headless) = env_bool("LOGIN_HEADLESS") {
            config.browser.headless = headless;
        }
        if env_bool("LOGIN_INTERACTIVE") == Some(true) {
            config.resolver.mode = ResolverMode::Interactive;
        }
        if let Ok(attempts) = std::env::var("LOGIN_MAX_ATTEMPTS") {
            match attempts.parse::<u32>() {
                Ok(n) if n > 0 => config.resolver.max_attempts = n,
                _ => {
                    return Err(RunError::InvalidConfig(format!(
                        "LOGIN_MAX_ATTEMPTS: not a positive integer: {}",
                        attempts
                    )))
                }
            }
        }

        Ok(config)
    }
}

fn env_bool(name: &str) -> Option<bool> {
    std::env::var(name).ok().and_then(|v| parse_bool(&v))
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Get log directory path
pub fn log_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("loginbot").join("logs"))
}

/// Initialize tracing with console output and, when a config directory is
/// available, a daily-rolling log file. Returns a guard that must be held
/// for the lifetime of the program.
pub fn init_logging() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::INFO.into());

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false);

    if let Some(log_dir) = log_dir() {
        let _ = std::fs::create_dir_all(&log_dir);
        let file_appender = tracing_appender::rolling::daily(&log_dir, "loginbot.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(true)
            .with_writer(non_blocking);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .with(file_layer)
            .init();

        Some(guard)
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .init();

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_bool_accepts_common_forms() {
        assert_eq!(parse_bool("1"), Some(true));
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool(" yes "), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn default_config_round_trips_through_json() {
        let config = RunConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: RunConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.target_url, config.target_url);
        assert_eq!(back.resolver.max_attempts, config.resolver.max_attempts);
        assert_eq!(back.screenshot_dir, config.screenshot_dir);
    }
}
