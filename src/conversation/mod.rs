//! Multi-turn conversation state and rate-limit tracking.
//!
//! A [`Conversation`] is an ordered, append-only sequence of [`Turn`]s. The
//! [`ConversationStore`](store::ConversationStore) partitions conversations by
//! id so that concurrent pipeline calls against different conversations never
//! contend, while turns within one conversation are strictly ordered.

pub mod store;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use store::ConversationStore;

/// What kind of exchange a conversation represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationKind {
    /// A human talking to the model.
    HumanAi,
    /// Two automated agents exchanging turns.
    BotToBot,
    /// One agent delegating to another.
    AgentToAgent,
    /// Two humans, with the engine mediating (e.g. moderated chat).
    HumanToHuman,
}

/// A single prompt–response exchange, recorded only after it completes (or
/// blocked at input, in which case `response` is empty and `blocked` is set).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    /// Monotonic, gap-free sequence number within the owning conversation.
    pub sequence: u64,
    /// Who produced the prompt.
    pub speaker: String,
    /// Who the prompt was addressed to.
    pub listener: String,
    /// The user-supplied (or upstream agent's) prompt text.
    pub prompt: String,
    /// The model's response, empty if the turn was blocked at input.
    pub response: String,
    /// Wall-clock time the turn was appended.
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Set when this turn was blocked (at input or output) rather than completed.
    pub blocked: bool,
}

/// Errors raised by conversation and rate-limit operations.
#[derive(Debug, Error)]
pub enum ConversationError {
    /// No conversation exists with the given id.
    #[error("no conversation with id '{id}'")]
    NotFound {
        /// The id that was looked up.
        id: String,
    },
    /// `restore` was given a document that does not describe a valid conversation.
    #[error("invalid conversation snapshot: {message}")]
    InvalidSnapshot {
        /// What was wrong with the snapshot.
        message: String,
    },
    /// The rate limiter denied the request.
    #[error("rate limited: {reason}")]
    RateLimited {
        /// Human-readable reason (window that was exceeded).
        reason: String,
    },
}

/// Window-selection strategy for [`ConversationStore::history`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryStrategy {
    /// The most recent `window` turns, chronological.
    Recent(usize),
    /// Every turn that was recorded with a block or warning decision.
    Suspicious,
    /// The recent window plus any suspicious turn outside it, deduplicated
    /// and chronological.
    Mixed(usize),
}

/// Outcome of a [`ConversationStore::rate_check`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateCheckOutcome {
    /// The request is within both the per-minute and per-hour budgets.
    Ok,
    /// The request would exceed a budget; carries the reason for audit logging.
    Throttled(String),
}
