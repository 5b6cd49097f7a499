//! Single-run login flow
//!
//! Orchestrates one complete run: launch, navigate, clear any verification
//! challenge, submit credentials, classify the result. Every failure path
//! captures a screenshot and relays a notification before propagating; the
//! browser is closed unconditionally.

use std::path::{Path, PathBuf};

use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::browser::{BrowserError, BrowserSession};
use crate::login::{self, Credentials};
use crate::notify::Notifier;
use crate::outcome::{LoginReport, Outcome};
use crate::verify::{default_strategies, ChallengeResolver, ResolveError};
use crate::RunConfig;

/// Everything that can end a run early.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Browser(#[from] BrowserError),

    #[error("verification challenge unresolved after {attempts} attempts")]
    VerificationExhausted { attempts: u32 },

    #[error("login rejected at {url} (title: {title})")]
    LoginFailed { url: String, title: String },

    #[error("missing required environment variable {0}")]
    MissingEnv(&'static str),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<ResolveError> for RunError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::Exhausted { attempts } => RunError::VerificationExhausted { attempts },
            ResolveError::Browser(e) => RunError::Browser(e),
        }
    }
}

/// Run the full login flow once. The browser is closed on every exit path.
pub async fn run(config: &RunConfig, credentials: &Credentials) -> Result<LoginReport, RunError> {
    let notifier = Notifier::from_env();
    let session = BrowserSession::new(&config.browser).await?;

    let result = run_inner(&session, config, credentials).await;

    match &result {
        Ok(report) => {
            info!("Login succeeded");
            info!("time: {}", report.finished_at.to_rfc3339());
            info!("url: {}", report.final_url);
            info!("title: {}", report.title);

            if let Some(notifier) = &notifier {
                notifier.notify_success(report).await;
            }

            // Linger briefly so an attached operator can see the result
            config.pacing.post_success.wait().await;
        }
        Err(err) => {
            error!("Login run failed: {}", err);

            if session.is_alive() {
                let path = failure_screenshot_path(&config.screenshot_dir);
                match session.capture_screenshot(&path).await {
                    Ok(()) => info!("Failure screenshot: {}", path.display()),
                    Err(e) => warn!("Could not capture failure screenshot: {}", e),
                }
            } else {
                warn!("Browser already gone; skipping failure screenshot");
            }

            if let Some(notifier) = &notifier {
                notifier
                    .notify_failure(&format!("target: {}\nerror: {}", config.target_url, err))
                    .await;
            }
        }
    }

    debug!("Clicks issued this run: {}", session.click_count());
    if let Err(e) = session.close().await {
        warn!("Error closing browser session: {}", e);
    }

    result
}

async fn run_inner(
    session: &BrowserSession,
    config: &RunConfig,
    credentials: &Credentials,
) -> Result<LoginReport, RunError> {
    info!("Opening {}", config.target_url);
    session.navigate(&config.target_url).await?;
    if let Err(e) = session.wait_for_navigation(config.browser.timeout_secs).await {
        debug!("Initial navigation wait: {}", e);
    }
    config.pacing.page_settle.wait().await;

    idle_scroll(session).await;

    let resolver = ChallengeResolver::new(
        config.resolver.clone(),
        config.challenge_policy.clone(),
        default_strategies(&config.strategies),
    );
    resolver.resolve(session).await?;

    login::submit_credentials(session, &config.field_selectors, credentials, &config.pacing.form)
        .await?;

    // SPA logins may settle without a full navigation; classification below
    // decides either way
    if let Err(e) = session.wait_for_navigation(config.browser.timeout_secs).await {
        debug!("Post-submit navigation wait: {}", e);
    }
    config.pacing.page_settle.wait().await;

    let state = session.page_state().await?;
    match config.success_policy.classify(&state) {
        Outcome::Success => Ok(LoginReport {
            final_url: state.url,
            title: state.title,
            finished_at: Utc::now(),
        }),
        Outcome::Failure { reason } => {
            warn!("Classified as failure: {}", reason);
            Err(RunError::LoginFailed {
                url: state.url,
                title: state.title,
            })
        }
    }
}

/// Half the time, drift down the page and back up before touching the form.
async fn idle_scroll(session: &BrowserSession) {
    let mut rng = StdRng::from_entropy();
    if rng.gen_bool(0.5) {
        let delta = rng.gen_range(100..300);
        if session.scroll_wheel(delta).await.is_ok() {
            tokio::time::sleep(std::time::Duration::from_millis(rng.gen_range(500..1000))).await;
            let _ = session.scroll_wheel(-delta).await;
        }
    }
}

fn failure_screenshot_path(dir: &Path) -> PathBuf {
    dir.join(format!(
        "login-failure-{}.png",
        Utc::now().format("%Y%m%dT%H%M%SZ")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn screenshot_path_is_timestamped_png() {
        let path = failure_screenshot_path(&PathBuf::from("screenshots"));
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("login-failure-"));
        assert!(name.ends_with(".png"));
        assert!(path.starts_with("screenshots"));
    }

    #[test]
    fn resolve_error_maps_to_run_error() {
        let err: RunError = ResolveError::Exhausted { attempts: 3 }.into();
        assert!(matches!(
            err,
            RunError::VerificationExhausted { attempts: 3 }
        ));
    }
}
