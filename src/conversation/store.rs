//! [`ConversationStore`] — a keyed set of conversations, partitioned for
//! concurrent access, with independent per-minute/per-hour rate-limit buckets.
//!
//! Conversations are sharded by [`dashmap::DashMap`] so unrelated
//! conversation ids never contend; turns within one conversation are
//! serialized by that entry's own lock, giving the monotonic, gap-free
//! ordering the engine relies on.

use dashmap::DashMap;
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use super::{ConversationError, ConversationKind, HistoryStrategy, RateCheckOutcome, Turn};

/// Fixed-capacity bucket refilled continuously over `window`; `try_consume`
/// reports whether `cost` more units fit in the remaining budget without
/// mutating on a denied attempt from the caller's perspective (failed
/// attempts are still recorded against `used` — only the *count
/// consumed* is withheld, not the read).
#[derive(Debug, Clone)]
struct Bucket {
    capacity: u32,
    window: Duration,
    window_start: SystemTime,
    used: u32,
}

impl Bucket {
    fn new(capacity: u32, window: Duration) -> Self {
        Self {
            capacity,
            window,
            window_start: SystemTime::now(),
            used: 0,
        }
    }

    fn refill_if_elapsed(&mut self, now: SystemTime) {
        if now.duration_since(self.window_start).unwrap_or(Duration::ZERO) >= self.window {
            self.window_start = now;
            self.used = 0;
        }
    }

    fn try_consume(&mut self, now: SystemTime, cost: u32) -> bool {
        self.refill_if_elapsed(now);
        if self.used + cost > self.capacity {
            return false;
        }
        self.used += cost;
        true
    }
}

struct ConversationEntry {
    kind: ConversationKind,
    turns: Vec<Turn>,
    per_minute: Bucket,
    per_hour: Bucket,
}

impl ConversationEntry {
    fn new(kind: ConversationKind, per_minute_capacity: u32, per_hour_capacity: u32) -> Self {
        Self {
            kind,
            turns: Vec::new(),
            per_minute: Bucket::new(per_minute_capacity, Duration::from_secs(60)),
            per_hour: Bucket::new(per_hour_capacity, Duration::from_secs(3600)),
        }
    }
}

/// A concurrent, id-partitioned set of conversations.
///
/// Each entry is independently locked so that two different conversations
/// never block each other; within one conversation, appends are serialized
/// by that entry's mutex.
pub struct ConversationStore {
    entries: DashMap<String, Mutex<ConversationEntry>>,
    next_id: std::sync::atomic::AtomicU64,
    per_minute_capacity: u32,
    per_hour_capacity: u32,
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new(60, 1000)
    }
}

impl ConversationStore {
    /// Build a store with the given per-minute and per-hour rate-limit
    /// capacities, applied to every new conversation unless overridden.
    #[must_use]
    pub fn new(per_minute_capacity: u32, per_hour_capacity: u32) -> Self {
        Self {
            entries: DashMap::new(),
            next_id: std::sync::atomic::AtomicU64::new(1),
            per_minute_capacity,
            per_hour_capacity,
        }
    }

    /// Open a new conversation of the given kind, returning its id.
    pub fn open(&self, kind: ConversationKind) -> String {
        let n = self.next_id.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let id = format!("c-{n:08x}");
        self.entries.insert(
            id.clone(),
            Mutex::new(ConversationEntry::new(kind, self.per_minute_capacity, self.per_hour_capacity)),
        );
        id
    }

    /// Append a completed (or blocked) turn. The sequence number assigned is
    /// one greater than the last turn recorded, starting at `1`.
    ///
    /// # Errors
    ///
    /// Returns [`ConversationError::NotFound`] if `id` is unknown.
    pub fn append_turn(
        &self,
        id: &str,
        speaker: impl Into<String>,
        listener: impl Into<String>,
        prompt: impl Into<String>,
        response: impl Into<String>,
        blocked: bool,
    ) -> Result<Turn, ConversationError> {
        let entry = self.entries.get(id).ok_or_else(|| ConversationError::NotFound { id: id.to_string() })?;
        let mut guard = entry.lock().expect("conversation lock poisoned");
        let sequence = guard.turns.len() as u64 + 1;
        let turn = Turn {
            sequence,
            speaker: speaker.into(),
            listener: listener.into(),
            prompt: prompt.into(),
            response: response.into(),
            timestamp: chrono::Utc::now(),
            blocked,
        };
        guard.turns.push(turn.clone());
        Ok(turn)
    }

    /// Read turns under the given strategy.
    ///
    /// # Errors
    ///
    /// Returns [`ConversationError::NotFound`] if `id` is unknown.
    pub fn history(&self, id: &str, strategy: HistoryStrategy) -> Result<Vec<Turn>, ConversationError> {
        let entry = self.entries.get(id).ok_or_else(|| ConversationError::NotFound { id: id.to_string() })?;
        let guard = entry.lock().expect("conversation lock poisoned");
        Ok(match strategy {
            HistoryStrategy::Recent(window) => {
                let start = guard.turns.len().saturating_sub(window);
                guard.turns[start..].to_vec()
            }
            HistoryStrategy::Suspicious => guard.turns.iter().filter(|t| t.blocked).cloned().collect(),
            HistoryStrategy::Mixed(window) => {
                let start = guard.turns.len().saturating_sub(window);
                let mut seen = std::collections::HashSet::new();
                let mut combined: Vec<Turn> = Vec::new();
                for t in guard.turns[start..].iter().chain(guard.turns.iter().filter(|t| t.blocked)) {
                    if seen.insert(t.sequence) {
                        combined.push(t.clone());
                    }
                }
                combined.sort_by_key(|t| t.sequence);
                combined
            }
        })
    }

    /// Check (and, on success, consume) one unit of rate-limit budget against
    /// both the per-minute and per-hour buckets.
    ///
    /// # Errors
    ///
    /// Returns [`ConversationError::NotFound`] if `id` is unknown.
    pub fn rate_check(&self, id: &str) -> Result<RateCheckOutcome, ConversationError> {
        let entry = self.entries.get(id).ok_or_else(|| ConversationError::NotFound { id: id.to_string() })?;
        let mut guard = entry.lock().expect("conversation lock poisoned");
        let now = SystemTime::now();

        if !guard.per_minute.try_consume(now, 1) {
            return Ok(RateCheckOutcome::Throttled("per_minute_budget_exceeded".into()));
        }
        if !guard.per_hour.try_consume(now, 1) {
            return Ok(RateCheckOutcome::Throttled("per_hour_budget_exceeded".into()));
        }
        Ok(RateCheckOutcome::Ok)
    }

    /// Drop all turns and reset rate-limit state for a conversation, keeping
    /// its id and kind.
    ///
    /// # Errors
    ///
    /// Returns [`ConversationError::NotFound`] if `id` is unknown.
    pub fn reset(&self, id: &str) -> Result<(), ConversationError> {
        let entry = self.entries.get(id).ok_or_else(|| ConversationError::NotFound { id: id.to_string() })?;
        let mut guard = entry.lock().expect("conversation lock poisoned");
        guard.turns.clear();
        guard.per_minute = Bucket::new(self.per_minute_capacity, Duration::from_secs(60));
        guard.per_hour = Bucket::new(self.per_hour_capacity, Duration::from_secs(3600));
        Ok(())
    }

    /// Serialize a conversation's turns to a JSON snapshot. Timestamps are
    /// preserved but are not compared by [`Self::restore`]'s round-trip
    /// invariant, which holds modulo those volatile timestamps.
    ///
    /// # Errors
    ///
    /// Returns [`ConversationError::NotFound`] if `id` is unknown.
    pub fn serialize(&self, id: &str) -> Result<serde_json::Value, ConversationError> {
        let entry = self.entries.get(id).ok_or_else(|| ConversationError::NotFound { id: id.to_string() })?;
        let guard = entry.lock().expect("conversation lock poisoned");
        Ok(serde_json::json!({
            "id": id,
            "kind": guard.kind,
            "turns": guard.turns,
        }))
    }

    /// Reconstruct a conversation from a [`Self::serialize`] snapshot,
    /// returning its id (freshly assigned unless `snapshot` carries one that
    /// is still available).
    ///
    /// # Errors
    ///
    /// Returns [`ConversationError::InvalidSnapshot`] if the document does
    /// not have the expected shape.
    pub fn restore(&self, snapshot: &serde_json::Value) -> Result<String, ConversationError> {
        let kind: ConversationKind = serde_json::from_value(snapshot["kind"].clone()).map_err(|e| ConversationError::InvalidSnapshot {
            message: format!("invalid 'kind': {e}"),
        })?;
        let turns: Vec<Turn> = serde_json::from_value(snapshot["turns"].clone()).map_err(|e| ConversationError::InvalidSnapshot {
            message: format!("invalid 'turns': {e}"),
        })?;

        let id = snapshot["id"]
            .as_str()
            .map(str::to_string)
            .filter(|id| !self.entries.contains_key(id))
            .unwrap_or_else(|| self.open(kind));

        let entry = self.entries.get(&id).ok_or_else(|| ConversationError::NotFound { id: id.clone() })?;
        let mut guard = entry.lock().expect("conversation lock poisoned");
        guard.kind = kind;
        guard.turns = turns;
        drop(guard);
        Ok(id)
    }
}
