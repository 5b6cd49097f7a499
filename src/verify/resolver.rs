//! Challenge resolver
//!
//! Outer retry loop around the strategy list: run every strategy in order,
//! reload between attempts, give up after a bounded number of rounds. In
//! interactive mode the resolver never guesses; it polls until the operator
//! has cleared the widget by hand.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::browser::{BoundingBox, BrowserError, BrowserSession, PageState};
use crate::humanize::{DelayRange, Point};

use super::policy::ChallengePolicy;
use super::strategies::ChallengeStrategy;

/// Resolver failure modes.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("verification challenge unresolved after {attempts} attempts")]
    Exhausted { attempts: u32 },

    #[error(transparent)]
    Browser(#[from] BrowserError),
}

/// How the resolver deals with a detected challenge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResolverMode {
    /// Bounded strategy loop, no human present.
    Unattended,
    /// Wait for an operator to complete the widget by hand.
    Interactive,
}

/// Resolver tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolverConfig {
    pub mode: ResolverMode,
    /// Maximum outer attempts before giving up (unattended mode)
    pub max_attempts: u32,
    /// Settle time after a reload between attempts
    pub settle: DelayRange,
    /// Poll interval while waiting for a manual solve (interactive mode)
    pub poll_interval_ms: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            mode: ResolverMode::Unattended,
            max_attempts: 3,
            settle: DelayRange::new(2000, 5000),
            poll_interval_ms: 2000,
        }
    }
}

/// The slice of page capabilities the resolver consumes. Implemented by
/// [`BrowserSession`]; mocked in tests.
#[async_trait]
pub trait ChallengePage: Send + Sync {
    async fn state(&self) -> Result<PageState, BrowserError>;
    async fn reload(&self) -> Result<(), BrowserError>;
    async fn selector_box(&self, selector: &str) -> Result<Option<BoundingBox>, BrowserError>;
    async fn click_at(&self, point: Point) -> Result<(), BrowserError>;
    /// Give the page a beat to react to the last click.
    async fn settle(&self);
}

#[async_trait]
impl ChallengePage for BrowserSession {
    async fn state(&self) -> Result<PageState, BrowserError> {
        self.page_state().await
    }

    async fn reload(&self) -> Result<(), BrowserError> {
        BrowserSession::reload(self).await
    }

    async fn selector_box(&self, selector: &str) -> Result<Option<BoundingBox>, BrowserError> {
        BrowserSession::selector_box(self, selector).await
    }

    async fn click_at(&self, point: Point) -> Result<(), BrowserError> {
        self.click_human_at(point).await
    }

    async fn settle(&self) {
        DelayRange::new(800, 1600).wait().await;
    }
}

/// Ordered-fallback challenge resolver.
pub struct ChallengeResolver {
    config: ResolverConfig,
    policy: ChallengePolicy,
    strategies: Vec<Box<dyn ChallengeStrategy>>,
}

impl ChallengeResolver {
    pub fn new(
        config: ResolverConfig,
        policy: ChallengePolicy,
        strategies: Vec<Box<dyn ChallengeStrategy>>,
    ) -> Self {
        Self {
            config,
            policy,
            strategies,
        }
    }

    /// Clear any verification widget standing between us and the login form.
    /// Returns immediately when the page is not a challenge page.
    pub async fn resolve(&self, page: &dyn ChallengePage) -> Result<(), ResolveError> {
        if !self.policy.is_challenge(&page.state().await?) {
            debug!("No verification challenge present");
            return Ok(());
        }

        match self.config.mode {
            ResolverMode::Interactive => self.wait_for_manual(page).await,
            ResolverMode::Unattended => self.resolve_unattended(page).await,
        }
    }

    /// Poll until the operator completes the widget. Deliberately unbounded:
    /// this mode is operator-supervised.
    async fn wait_for_manual(&self, page: &dyn ChallengePage) -> Result<(), ResolveError> {
        info!("Verification challenge detected; waiting for manual completion");
        loop {
            tokio::time::sleep(Duration::from_millis(self.config.poll_interval_ms)).await;
            if !self.policy.is_challenge(&page.state().await?) {
                info!("Challenge cleared by operator");
                return Ok(());
            }
        }
    }

    async fn resolve_unattended(&self, page: &dyn ChallengePage) -> Result<(), ResolveError> {
        for attempt in 1..=self.config.max_attempts {
            info!(
                "Challenge attempt {}/{}",
                attempt, self.config.max_attempts
            );

            for strategy in &self.strategies {
                match strategy.attempt(page, &self.policy).await {
                    Ok(true) => {
                        info!("Challenge cleared via {} strategy", strategy.name());
                        return Ok(());
                    }
                    Ok(false) => {
                        debug!("Strategy {} exhausted", strategy.name());
                    }
                    Err(e) => {
                        // A failing strategy advances to the next candidate
                        warn!("Strategy {} errored: {}", strategy.name(), e);
                    }
                }
            }

            if attempt < self.config.max_attempts {
                page.reload().await?;
                self.config.settle.wait().await;
                if !self.policy.is_challenge(&page.state().await?) {
                    info!("Challenge cleared after reload");
                    return Ok(());
                }
            }
        }

        Err(ResolveError::Exhausted {
            attempts: self.config.max_attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verify::strategies::FixedCoordinates;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Mock page that stops reporting a challenge after a set number of
    /// clicks (u32::MAX = never).
    struct MockPage {
        clicks_needed: u32,
        clicks: AtomicU32,
        reloads: AtomicU32,
    }

    impl MockPage {
        fn new(clicks_needed: u32) -> Self {
            Self {
                clicks_needed,
                clicks: AtomicU32::new(0),
                reloads: AtomicU32::new(0),
            }
        }

        fn solved(&self) -> bool {
            self.clicks.load(Ordering::SeqCst) >= self.clicks_needed
        }
    }

    #[async_trait]
    impl ChallengePage for MockPage {
        async fn state(&self) -> Result<PageState, BrowserError> {
            Ok(PageState {
                url: if self.solved() {
                    "https://example.com/login".to_string()
                } else {
                    "https://example.com/challenge".to_string()
                },
                title: String::new(),
                body_text: String::new(),
            })
        }

        async fn reload(&self) -> Result<(), BrowserError> {
            self.reloads.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn selector_box(&self, _: &str) -> Result<Option<BoundingBox>, BrowserError> {
            Ok(None)
        }

        async fn click_at(&self, _: Point) -> Result<(), BrowserError> {
            self.clicks.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn settle(&self) {}
    }

    fn resolver(max_attempts: u32, points: usize) -> ChallengeResolver {
        let config = ResolverConfig {
            max_attempts,
            // keep reload settles short in tests
            settle: DelayRange::new(300, 300),
            poll_interval_ms: 50,
            ..ResolverConfig::default()
        };
        let strategies: Vec<Box<dyn ChallengeStrategy>> = vec![Box::new(FixedCoordinates {
            points: (0..points).map(|i| Point::new(i as f64, 0.0)).collect(),
        })];
        ChallengeResolver::new(config, ChallengePolicy::default(), strategies)
    }

    #[tokio::test]
    async fn returns_immediately_when_not_a_challenge() {
        let page = MockPage::new(0);
        resolver(3, 4).resolve(&page).await.unwrap();
        assert_eq!(page.clicks.load(Ordering::SeqCst), 0);
        assert_eq!(page.reloads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn stops_mid_sweep_once_predicate_clears() {
        // Solved after the second click; the remaining points are skipped
        let page = MockPage::new(2);
        resolver(3, 10).resolve(&page).await.unwrap();
        assert_eq!(page.clicks.load(Ordering::SeqCst), 2);
        assert_eq!(page.reloads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn performs_at_most_max_attempts() {
        let page = MockPage::new(u32::MAX);
        let err = resolver(3, 2).resolve(&page).await.unwrap_err();
        match err {
            ResolveError::Exhausted { attempts } => assert_eq!(attempts, 3),
            other => panic!("unexpected error: {other}"),
        }
        // 3 rounds x 2 clicks, reload between rounds only
        assert_eq!(page.clicks.load(Ordering::SeqCst), 6);
        assert_eq!(page.reloads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn interactive_mode_waits_for_operator() {
        struct CountdownPage {
            polls_left: AtomicU32,
        }

        #[async_trait]
        impl ChallengePage for CountdownPage {
            async fn state(&self) -> Result<PageState, BrowserError> {
                let left = self.polls_left.load(Ordering::SeqCst);
                let url = if left == 0 {
                    "https://example.com/home"
                } else {
                    self.polls_left.fetch_sub(1, Ordering::SeqCst);
                    "https://example.com/challenge"
                };
                Ok(PageState {
                    url: url.to_string(),
                    title: String::new(),
                    body_text: String::new(),
                })
            }

            async fn reload(&self) -> Result<(), BrowserError> {
                Ok(())
            }

            async fn selector_box(&self, _: &str) -> Result<Option<BoundingBox>, BrowserError> {
                Ok(None)
            }

            async fn click_at(&self, _: Point) -> Result<(), BrowserError> {
                panic!("interactive mode must not click");
            }

            async fn settle(&self) {}
        }

        let page = CountdownPage {
            polls_left: AtomicU32::new(3),
        };
        let config = ResolverConfig {
            mode: ResolverMode::Interactive,
            poll_interval_ms: 10,
            ..ResolverConfig::default()
        };
        ChallengeResolver::new(config, ChallengePolicy::default(), vec![])
            .resolve(&page)
            .await
            .unwrap();
    }
}
