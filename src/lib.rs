//! Local browsing time tracker. The browser extension reports tab, window and presence changes to
//! a native messaging host, which turns them into per-domain time and visit statistics stored on
//! the user's device. The cli reads those statistics back.
//!

pub mod cli;
pub mod daemon;
pub mod domain;
pub mod fs;
pub mod utils;
