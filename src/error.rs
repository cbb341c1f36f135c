//! Error and warning types shared by the compiler and the executor.

use crate::admission::{AdmissionError, AdmissionFailure, AdmissionScope, PoolKind};
use crate::backend::BackendError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Warning key emitted when a keyword carries more values than it accepts.
pub const TOO_MANY_CONDITIONS: &str = "cirrussearch-feature-too-many-conditions";
/// Warning key emitted when the backend returned partial results.
pub const TIMED_OUT: &str = "cirrussearch-timed-out";

/// Result alias for search operations
pub type SearchResult<T> = Result<T, SearchError>;

/// User-facing failure of a search call.
///
/// Every variant maps to a stable message key through [`SearchError::message_key`]
/// so callers can localize the message without matching on variants.
#[derive(Debug, Error)]
pub enum SearchError {
    /// The global pool for plain or prefix searches is full
    #[error("too many searches are running, try again later")]
    TooBusy,

    /// The regex pool is full
    #[error("too many regex searches are running, try again later")]
    RegexTooBusy,

    /// The per-user throttle rejected the call
    #[error("too many searches from this client (logged in: {logged_in})")]
    TooBusyForUser { logged_in: bool },

    /// The pool accepted the call but could not hand out a slot in time
    #[error("could not acquire a {pool} slot: {reason}")]
    PoolFailure { pool: PoolKind, reason: String },

    /// The backend reported a timeout and returned nothing
    #[error("search timed out before any result was found")]
    TimedOutWithoutResults,

    /// The backend failed (including a parse failure of the degraded query)
    #[error("backend failure: {0}")]
    Backend(#[from] BackendError),

    /// Title searches are limited in length
    #[error("search request was longer than the maximum allowed length ({length} > {max})")]
    RequestTooLong { length: usize, max: usize },
}

impl SearchError {
    /// Stable message key for this failure
    pub fn message_key(&self) -> String {
        match self {
            SearchError::TooBusy => "cirrussearch-too-busy-error".to_string(),
            SearchError::RegexTooBusy => "cirrussearch-regex-too-busy-error".to_string(),
            SearchError::TooBusyForUser { logged_in } => format!(
                "cirrussearch-too-busy-for-you-{}-error",
                if *logged_in { "logged-in" } else { "anonymous" }
            ),
            SearchError::PoolFailure { .. }
            | SearchError::TimedOutWithoutResults
            | SearchError::Backend(_) => "cirrussearch-backend-error".to_string(),
            SearchError::RequestTooLong { .. } => "cirrussearch-request-too-long".to_string(),
        }
    }

    /// Whether this is one of the "try again later" outcomes
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            SearchError::TooBusy | SearchError::RegexTooBusy | SearchError::TooBusyForUser { .. }
        )
    }
}

impl From<AdmissionError> for SearchError {
    fn from(e: AdmissionError) -> Self {
        match (e.failure, e.scope) {
            (AdmissionFailure::QueueFull, AdmissionScope::PerUser { logged_in }) => {
                SearchError::TooBusyForUser { logged_in }
            }
            (AdmissionFailure::QueueFull, AdmissionScope::Global) => match e.pool {
                PoolKind::Regex => SearchError::RegexTooBusy,
                _ => SearchError::TooBusy,
            },
            (failure, _) => SearchError::PoolFailure {
                pool: e.pool,
                reason: failure.to_string(),
            },
        }
    }
}

/// A user-facing advisory collected while compiling or running a search
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warning {
    pub key: String,
    #[serde(default)]
    pub params: Vec<String>,
}

impl Warning {
    pub fn new(key: &str, params: &[&str]) -> Self {
        Self {
            key: key.to_string(),
            params: params.iter().map(|p| p.to_string()).collect(),
        }
    }
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.params.is_empty() {
            write!(f, "{}", self.key)
        } else {
            write!(f, "{} ({})", self.key, self.params.join(", "))
        }
    }
}

/// Sink for warnings that must not abort compilation
pub trait WarningCollector {
    fn add_warning(&mut self, key: &str, params: &[&str]);
}

impl WarningCollector for Vec<Warning> {
    fn add_warning(&mut self, key: &str, params: &[&str]) {
        self.push(Warning::new(key, params));
    }
}
