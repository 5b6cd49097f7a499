//! Browser automation module
//!
//! Handles launching and controlling the single Chrome/Chromium instance
//! used for a login run.

mod errors;
mod session;

pub use errors::BrowserError;
pub use session::{BoundingBox, BrowserSession, BrowserSessionConfig, PageState};
