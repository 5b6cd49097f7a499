//! Page-state predicate for challenge detection
//!
//! String-containment heuristics over url, title and body text. These are
//! site-specific by nature, so they live in configuration rather than code.

use serde::{Deserialize, Serialize};

use crate::browser::PageState;

/// Markers that identify a verification/challenge page.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengePolicy {
    /// URL fragments, e.g. "/challenge"
    pub url_fragments: Vec<String>,
    /// Title phrases, e.g. "Just a moment"
    pub title_phrases: Vec<String>,
    /// Body text phrases
    pub body_phrases: Vec<String>,
}

impl Default for ChallengePolicy {
    fn default() -> Self {
        Self {
            url_fragments: vec![
                "/challenge".to_string(),
                "cdn-cgi/challenge-platform".to_string(),
                "/captcha".to_string(),
            ],
            title_phrases: vec![
                "Just a moment".to_string(),
                "Attention Required".to_string(),
                "Security check".to_string(),
                "Verify you are human".to_string(),
            ],
            body_phrases: vec![
                "Verify you are human".to_string(),
                "needs to review the security of your connection".to_string(),
                "unusual traffic".to_string(),
            ],
        }
    }
}

fn contains_any(haystack: &str, needles: &[String]) -> bool {
    let haystack = haystack.to_lowercase();
    needles
        .iter()
        .any(|n| !n.is_empty() && haystack.contains(&n.to_lowercase()))
}

impl ChallengePolicy {
    /// Is the browser still showing the challenge page?
    pub fn is_challenge(&self, state: &PageState) -> bool {
        contains_any(&state.url, &self.url_fragments)
            || contains_any(&state.title, &self.title_phrases)
            || contains_any(&state.body_text, &self.body_phrases)
    }
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
    fn matches_url_fragment() {
        let policy = ChallengePolicy::default();
        assert!(policy.is_challenge(&state(
            "https://example.com/cdn-cgi/challenge-platform/h/b",
            "",
            ""
        )));
    }

    #[test]
    fn matches_title_case_insensitive() {
        let policy = ChallengePolicy::default();
        assert!(policy.is_challenge(&state("https://example.com/", "just a MOMENT...", "")));
    }

    #[test]
    fn matches_body_phrase() {
        let policy = ChallengePolicy::default();
        assert!(policy.is_challenge(&state(
            "https://example.com/login",
            "Login",
            "Please verify you are human before continuing"
        )));
    }

    #[test]
    fn clean_page_is_not_a_challenge() {
        let policy = ChallengePolicy::default();
        assert!(!policy.is_challenge(&state(
            "https://example.com/login",
            "Login",
            "Email and password please"
        )));
    }

    #[test]
    fn empty_markers_never_match() {
        let policy = ChallengePolicy {
            url_fragments: vec![String::new()],
            title_phrases: vec![],
            body_phrases: vec![],
        };
        assert!(!policy.is_challenge(&state("https://example.com/", "anything", "anything")));
    }
}
