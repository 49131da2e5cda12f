//! Report output formats.
//!
//! # Submodules
//!
//! - [`json`]: serializes a [`ResearchReport`](crate::models::ResearchReport)
//!   to pretty JSON and writes it to disk
//! - [`markdown`]: renders the same report for reading
//!
//! Neither format is ever read back; the core keeps no state between runs.

pub mod json;
pub mod markdown;
