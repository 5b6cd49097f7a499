//! Outcome classification
//!
//! Heuristic string matching over the post-submit page: any login-page
//! marker in the final url or title means the login did not go through,
//! regardless of anything else on the page.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::browser::PageState;

/// Markers that separate a login page from an authenticated area.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuccessPolicy {
    /// URL fragments that mean we are still on the login page
    pub login_url_markers: Vec<String>,
    /// Title markers for the login page
    pub login_title_markers: Vec<String>,
    /// When non-empty, at least one must appear in the body text
    pub content_markers: Vec<String>,
}

impl Default for SuccessPolicy {
    fn default() -> Self {
        Self {
            login_url_markers: vec!["/login".to_string(), "/signin".to_string()],
            login_title_markers: vec!["Login".to_string(), "Sign in".to_string()],
            content_markers: vec![],
        }
    }
}

/// Classification result for a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure { reason: String },
}

fn contains_any(haystack: &str, needles: &[String]) -> Option<String> {
    let haystack = haystack.to_lowercase();
    needles
        .iter()
        .find(|n| !n.is_empty() && haystack.contains(&n.to_lowercase()))
        .cloned()
}

impl SuccessPolicy {
    pub fn classify(&self, state: &PageState) -> Outcome {
        if let Some(marker) = contains_any(&state.url, &self.login_url_markers) {
            return Outcome::Failure {
                reason: format!("final url still contains login marker \"{}\"", marker),
            };
        }
        if let Some(marker) = contains_any(&state.title, &self.login_title_markers) {
            return Outcome::Failure {
                reason: format!("page title still contains login marker \"{}\"", marker),
            };
        }
        if !self.content_markers.is_empty()
            && contains_any(&state.body_text, &self.content_markers).is_none()
        {
            return Outcome::Failure {
                reason: "no authenticated-area marker found in page content".to_string(),
            };
        }
        Outcome::Success
    }
}

/// Transient record of a successful run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginReport {
    pub final_url: String,
    pub title: String,
    pub finished_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(url: &str, title: &str, body: &str) -> PageState {
        PageState {
            url: url.to_string(),
            title: title.to_string(),
            body_text: body.to_string(),
        }
    }

    #[test]
    fn login_marker_in_url_always_fails() {
        let policy = SuccessPolicy::default();
        // Even with convincing authenticated content
        let outcome = policy.classify(&state(
            "https://example.com/login?error=1",
            "Dashboard",
            "Welcome back, your account overview",
        ));
        assert!(matches!(outcome, Outcome::Failure { .. }));
    }

    #[test]
    fn login_marker_in_title_always_fails() {
        let policy = SuccessPolicy::default();
        let outcome = policy.classify(&state(
            "https://example.com/home",
            "Login - Example",
            "anything",
        ));
        assert!(matches!(outcome, Outcome::Failure { .. }));
    }

    #[test]
    fn title_match_is_case_insensitive() {
        let policy = SuccessPolicy::default();
        let outcome = policy.classify(&state("https://example.com/home", "LOGIN", ""));
        assert!(matches!(outcome, Outcome::Failure { .. }));
    }

    #[test]
    fn clean_page_succeeds() {
        let policy = SuccessPolicy::default();
        let outcome = policy.classify(&state(
            "https://example.com/dashboard",
            "Dashboard - Example",
            "Welcome back",
        ));
        assert_eq!(outcome, Outcome::Success);
    }

    #[test]
    fn content_markers_are_required_when_configured() {
        let policy = SuccessPolicy {
            content_markers: vec!["Sign out".to_string()],
            ..SuccessPolicy::default()
        };

        let missing = policy.classify(&state("https://example.com/home", "Home", "plain page"));
        assert!(matches!(missing, Outcome::Failure { .. }));

        let present = policy.classify(&state(
            "https://example.com/home",
            "Home",
            "Account menu - Sign out",
        ));
        assert_eq!(present, Outcome::Success);
    }
}
