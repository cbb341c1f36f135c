//! Utility functions.
//!
//! - [`app_data`] - Application data directory management (XDG-compliant)

pub mod app_data;

pub use app_data::*;
