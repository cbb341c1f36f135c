//! Query compilation
//!
//! Raw term → keyword extraction ([`scanner`], [`features`]) → text query
//! assembly ([`text`], [`escaper`], [`fields`]) → boosts ([`rescore`]) →
//! finalized request ([`request`]).

pub mod context;
pub mod dsl;
pub mod escaper;
pub mod features;
pub mod fields;
pub mod request;
pub mod rescore;
pub mod scanner;
pub mod text;

pub use context::{SearchContext, SearchKind};
pub use request::{SearchRequest, SearchRequestBuilder, Sort};
