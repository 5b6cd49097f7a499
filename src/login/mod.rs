//! Credential entry and form submission
//!
//! Locates the username/password fields and the submit control from ordered
//! selector-candidate lists, types with human pacing, and submits once. A
//! field or control missing after the whole list is a terminal error.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::browser::{BoundingBox, BrowserError, BrowserSession};
use crate::flow::RunError;
use crate::humanize::DelayRange;

/// Account credentials, read from the environment and used exactly once.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    /// Read `LOGIN_USERNAME` / `LOGIN_PASSWORD`.
    pub fn from_env() -> Result<Self, RunError> {
        let username =
            std::env::var("LOGIN_USERNAME").map_err(|_| RunError::MissingEnv("LOGIN_USERNAME"))?;
        let password =
            std::env::var("LOGIN_PASSWORD").map_err(|_| RunError::MissingEnv("LOGIN_PASSWORD"))?;
        Ok(Self { username, password })
    }
}

// Keep secrets out of logs
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Ordered selector candidates for the login form.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSelectors {
    pub username: Vec<String>,
    pub password: Vec<String>,
    pub submit: Vec<String>,
}

impl Default for FieldSelectors {
    fn default() -> Self {
        Self {
            username: vec![
                "#email".to_string(),
                "input[type='email']".to_string(),
                "input[name='email']".to_string(),
                "input[name='username']".to_string(),
                "#username".to_string(),
            ],
            password: vec![
                "#password".to_string(),
                "input[type='password']".to_string(),
                "input[name='password']".to_string(),
            ],
            submit: vec![
                "button[type='submit']".to_string(),
                "input[type='submit']".to_string(),
                "form button".to_string(),
            ],
        }
    }
}

/// Pacing between form interactions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormPacing {
    /// Wait after focusing a field before typing
    pub focus: DelayRange,
    /// Wait between the two fields
    pub between_fields: DelayRange,
    /// Wait before clicking submit
    pub pre_submit: DelayRange,
}

impl Default for FormPacing {
    fn default() -> Self {
        Self {
            focus: DelayRange::new(300, 600),
            between_fields: DelayRange::new(800, 1500),
            pre_submit: DelayRange::new(1000, 2000),
        }
    }
}

/// First candidate that matches a visible element.
async fn first_match(
    session: &BrowserSession,
    candidates: &[String],
    what: &str,
) -> Result<(String, BoundingBox), BrowserError> {
    for selector in candidates {
        if let Some(bbox) = session.selector_box(selector).await? {
            debug!("{} field matched selector: {}", what, selector);
            return Ok((selector.clone(), bbox));
        }
    }
    Err(BrowserError::ElementNotFound(format!(
        "{} (tried: {})",
        what,
        candidates.join(", ")
    )))
}

/// Fill a field: human mouse move, click to focus, short pause, paced typing.
async fn fill_field(
    session: &BrowserSession,
    selectors: &[String],
    what: &str,
    value: &str,
    pacing: &FormPacing,
) -> Result<(), BrowserError> {
    let (_, bbox) = first_match(session, selectors, what).await?;
    session.click_human_at(bbox.center()).await?;
    pacing.focus.wait().await;
    session.type_text_human(value).await?;
    Ok(())
}

/// Enter the credentials and submit the form. Single attempt; no retries.
pub async fn submit_credentials(
    session: &BrowserSession,
    selectors: &FieldSelectors,
    credentials: &Credentials,
    pacing: &FormPacing,
) -> Result<(), BrowserError> {
    info!("Entering credentials");

    fill_field(
        session,
        &selectors.username,
        "username",
        &credentials.username,
        pacing,
    )
    .await?;
    pacing.between_fields.wait().await;

    fill_field(
        session,
        &selectors.password,
        "password",
        &credentials.password,
        pacing,
    )
    .await?;
    pacing.pre_submit.wait().await;

    let (selector, bbox) = first_match(session, &selectors.submit, "submit control").await?;
    info!("Submitting via {}", selector);
    session.click_human_at(bbox.center()).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_debug_hides_password() {
        let creds = Credentials {
            username: "user@example.com".to_string(),
            password: "hunter2".to_string(),
        };
        let printed = format!("{:?}", creds);
        assert!(printed.contains("user@example.com"));
        assert!(!printed.contains("hunter2"));
    }

    #[test]
    fn default_selectors_cover_all_controls() {
        let selectors = FieldSelectors::default();
        assert!(!selectors.username.is_empty());
        assert!(!selectors.password.is_empty());
        assert!(!selectors.submit.is_empty());
    }
}
