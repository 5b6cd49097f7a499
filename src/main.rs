//! loginbot - single-run login automation
//!
//! Environment variables:
//! - `LOGIN_URL` - login page URL (required)
//! - `LOGIN_USERNAME` / `LOGIN_PASSWORD` - credentials (required)
//! - `LOGIN_HEADLESS` - run the browser headless
//! - `LOGIN_INTERACTIVE` - wait for a manual challenge solve instead of guessing
//! - `LOGIN_MAX_ATTEMPTS` - unattended challenge attempts (default: 3)
//! - `NOTIFY_BOT_TOKEN` / `NOTIFY_CHAT_ID` - optional chat notification

use tracing::info;

use loginbot::login::Credentials;
use loginbot::RunConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _guard = loginbot::init_logging();

    info!("Starting loginbot");
    if let Some(dir) = loginbot::log_dir() {
        info!("Log files saved to: {}", dir.display());
    }

    let config = RunConfig::from_env()?;
    let credentials = Credentials::from_env()?;
    info!("Target: {} (headless: {})", config.target_url, config.browser.headless);

    let report = loginbot::flow::run(&config, &credentials).await?;

    info!(
        "Run complete: {} ({})",
        report.final_url, report.title
    );
    Ok(())
}
