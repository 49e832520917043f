//! # reel-browser
//!
//! Optional headless Chrome pointed at the recording client page:
//! - Chrome discovery (`--chrome-path`, install locations, `PATH`)
//! - Auto-start URL with session parameters
//! - Process supervision, killed on shutdown

pub mod chrome;
pub mod error;
pub mod launcher;

pub use chrome::find_chrome;
pub use error::BrowserError;
pub use launcher::{AutoStart, Browser, BrowserConfig};
