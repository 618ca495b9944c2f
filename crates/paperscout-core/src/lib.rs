//! Core domain logic for progressive paper recommendations.
//!
//! The recommendation service pushes an ordered sequence of loosely-structured
//! progress events over a long-lived stream, ending in exactly one terminal
//! payload. This crate owns everything between the transport and the UI:
//! query settings with change detection ([`settings`]), free-text progress
//! mining ([`stats`]), the per-request session state machine ([`session`]),
//! and the controller that guarantees at most one live session
//! ([`controller`]). No HTTP lives here; the transport is a trait seam
//! implemented by `paperscout-api`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod controller;
pub mod mock;
pub mod session;
pub mod settings;
pub mod stats;

// Re-export for convenience
pub use controller::{Applied, ControllerUpdate, SessionController};
pub use session::{
    EventStream, RecommendationSession, RecommendationTransport, SessionEvent, SessionId,
    SessionState, Snapshot,
};
pub use settings::{DateRange, QuerySettings, ARXIV_CATEGORIES, DEFAULT_CATEGORIES};
pub use stats::StatsAccumulator;

/// A paper saved in the user's reference library.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paper {
    pub key: String,
    pub title: String,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default, rename = "abstract")]
    pub abstract_text: Option<String>,
    #[serde(default)]
    pub date: String,
    #[serde(default, rename = "dateAdded")]
    pub date_added: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub collections: Vec<String>,
}

/// A candidate paper scored and ranked by the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendedPaper {
    pub title: String,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default, rename = "abstract")]
    pub abstract_text: Option<String>,
    #[serde(default)]
    pub arxiv_id: String,
    #[serde(default)]
    pub pdf_url: Option<String>,
    #[serde(default)]
    pub code_url: Option<String>,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub date: Option<String>,
}

/// One event delivered by the recommendation stream.
///
/// The transport yields an arbitrary number of `Progress` events followed by
/// exactly one `Terminal`; a stream that errors or ends early is treated as an
/// implicit terminal failure by the session.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    Progress {
        /// Server-reported completion percentage; absent on some messages.
        percent: Option<f64>,
        message: String,
    },
    Terminal(TerminalPayload),
}

/// The single payload that ends a stream.
#[derive(Debug, Clone, Default)]
pub struct TerminalPayload {
    pub ok: bool,
    pub papers: Vec<RecommendedPaper>,
    /// How many library items the server used as scoring references.
    pub reference_count: Option<usize>,
    /// Whether the server served a memoized result.
    pub cached: bool,
    pub message: Option<String>,
    pub error: Option<String>,
}

/// Failures at the transport boundary.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("connection error: {0}")]
    Connect(String),
    #[error("stream ended before a terminal event")]
    EndedEarly,
}

/// Errors a session can end with (or refuse to start with).
#[derive(Debug, Clone, Error)]
pub enum SessionError {
    /// No category selected. Caught before any transport work happens.
    #[error("请至少选择一个 ArXiv 类别")]
    NoCategories,
    /// Terminal event with `ok=false`; carries the server's error text.
    #[error("{0}")]
    Server(String),
    /// Connection refused or aborted mid-stream.
    #[error("连接中断: {0}")]
    Transport(String),
}

/// How a successfully completed session ended.
#[derive(Debug, Clone)]
pub enum SessionOutcome {
    /// A non-empty ranked recommendation list.
    Ranked {
        papers: Vec<RecommendedPaper>,
        reference_count: Option<usize>,
        cached: bool,
    },
    /// Success with zero items. The server's message text explains why and is
    /// shown verbatim; this is a distinct outcome, not an error.
    Empty { message: String },
}
