//! Utilities Module
//!
//! Common utilities used across the crate.

pub mod encoding;
pub mod logging;
pub mod units;
