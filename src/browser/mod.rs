//! Headless browser backend.
//!
//! A single Node process drives Playwright for the life of an export; see
//! [`session`] for the wire protocol.

pub mod host;
pub(crate) mod playwright;
pub mod session;

pub use host::{LaunchOptions, PlaywrightHost};
pub use session::HelperSession;
