//! Verification-challenge handling
//!
//! Detects a bot-verification widget via a pluggable page-state predicate
//! and attempts to dismiss it with an ordered list of fallback strategies,
//! re-checking page state after every click. An interactive mode waits for
//! an operator to clear the widget by hand instead of guessing.

mod policy;
mod resolver;
mod strategies;

pub use policy::ChallengePolicy;
pub use resolver::{ChallengePage, ChallengeResolver, ResolveError, ResolverConfig, ResolverMode};
pub use strategies::{
    default_strategies, ChallengeStrategy, ContainerRelativeClick, FixedCoordinates, GridRegion,
    GridSweep, SelectorClick, StrategyConfig,
};
