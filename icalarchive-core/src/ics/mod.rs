//! ICS feed parsing and generation.
//!
//! This module handles reading source feeds and writing output feeds according to RFC 5545.

mod generate;
mod parse;

pub use generate::{PRODID, generate_feed};
pub use parse::parse_feed;
