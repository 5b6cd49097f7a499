//! Fallback strategies for dismissing the verification widget
//!
//! Each strategy shares one interface: attempt(page, policy) -> bool, where
//! true means the page-state predicate stopped reporting a challenge. They
//! are tried in order of preference: DOM selector match, container-relative
//! click, fixed coordinates, then a dense grid sweep.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::browser::BrowserError;
use crate::humanize::Point;

use super::policy::ChallengePolicy;
use super::resolver::ChallengePage;

/// A single fallback approach for clearing the widget.
#[async_trait]
pub trait ChallengeStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Attempt to clear the widget. Ok(true) means the predicate no longer
    /// reports a challenge; Ok(false) means this strategy is exhausted.
    async fn attempt(
        &self,
        page: &dyn ChallengePage,
        policy: &ChallengePolicy,
    ) -> Result<bool, BrowserError>;
}

/// Click, let the page settle, then re-check the predicate.
async fn click_and_check(
    page: &dyn ChallengePage,
    policy: &ChallengePolicy,
    point: Point,
) -> Result<bool, BrowserError> {
    page.click_at(point).await?;
    page.settle().await;
    Ok(!policy.is_challenge(&page.state().await?))
}

/// Region swept by [`GridSweep`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridRegion {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub step: f64,
}

/// Tunables for the built-in strategy list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyConfig {
    /// Selectors known to match the widget or its checkbox
    pub widget_selectors: Vec<String>,
    /// Ancestor containers the widget renders inside
    pub container_selectors: Vec<String>,
    /// Click position inside the container, as width/height fractions
    pub container_rel_x: f64,
    pub container_rel_y: f64,
    /// Commonly-observed absolute click positions
    pub fixed_points: Vec<Point>,
    /// Suspected bounding region for the grid sweep
    pub grid: GridRegion,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            widget_selectors: vec![
                "iframe[src*='challenges.cloudflare.com']".to_string(),
                "#cf-turnstile".to_string(),
                ".cf-turnstile".to_string(),
                "input[type='checkbox']".to_string(),
                ".g-recaptcha".to_string(),
                "#recaptcha-anchor".to_string(),
                ".recaptcha-checkbox".to_string(),
            ],
            container_selectors: vec![
                "#challenge-stage".to_string(),
                ".challenge-form".to_string(),
                "#challenge-form".to_string(),
            ],
            // Checkbox sits near the left edge, vertically centered
            container_rel_x: 0.08,
            container_rel_y: 0.5,
            fixed_points: vec![
                Point::new(210.0, 290.0),
                Point::new(170.0, 330.0),
                Point::new(260.0, 290.0),
            ],
            grid: GridRegion {
                x: 130.0,
                y: 250.0,
                width: 240.0,
                height: 120.0,
                step: 40.0,
            },
        }
    }
}

/// Strategy 1: known widget selectors, clicked at their bounding-box centre.
pub struct SelectorClick {
    pub selectors: Vec<String>,
}

#[async_trait]
impl ChallengeStrategy for SelectorClick {
    fn name(&self) -> &'static str {
        "selector"
    }

    async fn attempt(
        &self,
        page: &dyn ChallengePage,
        policy: &ChallengePolicy,
    ) -> Result<bool, BrowserError> {
        for selector in &self.selectors {
            let bbox = match page.selector_box(selector).await {
                Ok(Some(b)) => b,
                Ok(None) => continue,
                Err(e) => {
                    // A failing candidate just advances to the next one
                    debug!("Selector {} lookup failed: {}", selector, e);
                    continue;
                }
            };

            debug!("Widget selector matched: {}", selector);
            if click_and_check(page, policy, bbox.center()).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// Strategy 2: position relative to a known ancestor container.
pub struct ContainerRelativeClick {
    pub containers: Vec<String>,
    pub rel_x: f64,
    pub rel_y: f64,
}

#[async_trait]
impl ChallengeStrategy for ContainerRelativeClick {
    fn name(&self) -> &'static str {
        "container-relative"
    }

    async fn attempt(
        &self,
        page: &dyn ChallengePage,
        policy: &ChallengePolicy,
    ) -> Result<bool, BrowserError> {
        for selector in &self.containers {
            let bbox = match page.selector_box(selector).await {
                Ok(Some(b)) => b,
                _ => continue,
            };

            let point = Point::new(
                bbox.x + bbox.width * self.rel_x,
                bbox.y + bbox.height * self.rel_y,
            );
            debug!("Container {} found, clicking at relative offset", selector);
            if click_and_check(page, policy, point).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// Strategy 3: short static list of commonly-observed coordinates.
pub struct FixedCoordinates {
    pub points: Vec<Point>,
}

#[async_trait]
impl ChallengeStrategy for FixedCoordinates {
    fn name(&self) -> &'static str {
        "fixed-coordinates"
    }

    async fn attempt(
        &self,
        page: &dyn ChallengePage,
        policy: &ChallengePolicy,
    ) -> Result<bool, BrowserError> {
        for point in &self.points {
            if click_and_check(page, policy, *point).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// Strategy 4: dense grid sweep over the suspected bounding region.
pub struct GridSweep {
    pub region: GridRegion,
}

#[async_trait]
impl ChallengeStrategy for GridSweep {
    fn name(&self) -> &'static str {
        "grid-sweep"
    }

    async fn attempt(
        &self,
        page: &dyn ChallengePage,
        policy: &ChallengePolicy,
    ) -> Result<bool, BrowserError> {
        let step = self.region.step.max(1.0);
        let mut y = self.region.y;
        while y <= self.region.y + self.region.height {
            let mut x = self.region.x;
            while x <= self.region.x + self.region.width {
                if click_and_check(page, policy, Point::new(x, y)).await? {
                    return Ok(true);
                }
                x += step;
            }
            y += step;
        }
        Ok(false)
    }
}

/// The built-in strategy ordering.
pub fn default_strategies(config: &StrategyConfig) -> Vec<Box<dyn ChallengeStrategy>> {
    vec![
        Box::new(SelectorClick {
            selectors: config.widget_selectors.clone(),
        }),
        Box::new(ContainerRelativeClick {
            containers: config.container_selectors.clone(),
            rel_x: config.container_rel_x,
            rel_y: config.container_rel_y,
        }),
        Box::new(FixedCoordinates {
            points: config.fixed_points.clone(),
        }),
        Box::new(GridSweep { region: config.grid }),
    ]
}
