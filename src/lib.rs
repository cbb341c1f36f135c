//! # wikiquery - wiki search query compiler and executor
//!
//! Turns a free-text search string, which may embed a small keyword
//! language (`insource:/regex/`, `intitle:`, `incategory:`,
//! `hastemplate:`, `linksto:`, `inlanguage:`, `prefix:`,
//! `prefer-recent:`, `local:`, `boost-templates:`, quoted phrases,
//! wildcards and fuzzy markers), into a structured request against a
//! document search backend, layers relevance boosts on top, and runs it
//! under admission control.
//!
//! ## Architecture
//!
//! - [`query`] - Keyword extraction, escaping, field weighting, boosts and
//!   request finalization
//! - [`searcher`] - Public entry points: full-text, near-match, prefix,
//!   more-like-these and get
//! - [`admission`] - Bounded pools per operation class plus a per-user throttle
//! - [`backend`] - Backend trait and the Unix-socket gateway client
//! - [`results`] - Typed result sets
//! - [`output`] - Terminal rendering
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use wikiquery::backend::SocketBackend;
//! use wikiquery::config::SearchConfig;
//! use wikiquery::content::NullContentStore;
//! use wikiquery::searcher::{SearchOptions, Searcher};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let searcher = Searcher::new(
//!     Arc::new(SearchConfig::load()?),
//!     Arc::new(NullContentStore),
//!     SocketBackend::default(),
//! );
//! let results = searcher
//!     .compile_and_execute("insource:/foo.*bar/i catapult", &SearchOptions::default())
//!     .await?;
//! for hit in &results.hits {
//!     println!("{}", hit.full_title());
//! }
//! # Ok(())
//! # }
//! ```

pub mod admission;
pub mod backend;
pub mod config;
pub mod content;
pub mod error;
pub mod namespace;
pub mod output;
pub mod query;
pub mod results;
pub mod searcher;
pub mod utils;
