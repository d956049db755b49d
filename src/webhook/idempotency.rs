//! Event Idempotency Tracking
//!
//! Providers deliver webhooks at-least-once: network timeouts and slow
//! responses trigger automatic redelivery of the same event, and processing
//! it twice would double-book donations or oversell stock. Every delivery is
//! claimed here by its provider event ID before any record is written.
//!
//! # State transitions
//!
//! ```text
//!  (absent) --claim--> Processing --mark_completed--> Completed
//!                          |                              |
//!                          +------mark_failed--> Failed   | (terminal)
//!                                                  |
//!                            claim (redelivery) ---+--> Processing
//! ```
//!
//! `Failed` is retryable on purpose: the handler returns a 500 for processing
//! failures, the provider redelivers, and the redelivery gets a fresh claim.
//! `Processing` and `Completed` deliveries are acknowledged without side
//! effects.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tracing::debug;

use crate::error::WebhookResult;

/// Default retention for processed-event records.
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Default cap on tracked events before the oldest are evicted.
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

/// Result of attempting to claim an event for processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// First sighting (or a retryable failure); caller must process the
    /// event and record the outcome.
    Claimed,
    /// The event was already claimed; carries the state it was found in.
    Duplicate(ProcessingState),
}

/// Processing state of a tracked event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessingState {
    /// Claimed, outcome not yet recorded
    Processing,
    /// Fully reconciled
    Completed,
    /// Processing failed; the next delivery may claim again
    Failed {
        /// Why the last attempt failed
        error: String,
    },
}

/// Tracks which provider events have been processed.
#[async_trait::async_trait]
pub trait IdempotencyStore: Send + Sync + 'static {
    /// Attempt to claim an event ID for processing.
    async fn claim(&self, event_id: &str) -> WebhookResult<ClaimOutcome>;

    /// Record that a claimed event was fully reconciled.
    ///
    /// Upserts: marking an unknown ID records it as completed, so a store
    /// that evicted the claim under memory pressure still converges.
    async fn mark_completed(&self, event_id: &str) -> WebhookResult<()>;

    /// Record that processing a claimed event failed.
    async fn mark_failed(&self, event_id: &str, error: &str) -> WebhookResult<()>;
}

/// In-memory implementation of [`IdempotencyStore`].
///
/// Entries expire after a TTL and the map is capped; when full, the oldest
/// entry is evicted. Suitable for a single-process deployment; a multi-node
/// deployment would back this trait with a shared store.
pub struct InMemoryIdempotencyStore {
    entries: RwLock<HashMap<String, EventRecord>>,
    ttl: Duration,
    max_entries: usize,
}

#[derive(Debug, Clone)]
struct EventRecord {
    state: ProcessingState,
    /// When the event was first claimed, for TTL and eviction order
    claimed_at: Instant,
}

impl InMemoryIdempotencyStore {
    /// Create a store with explicit retention settings.
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
            max_entries: max_entries.max(1),
        }
    }

    /// Number of tracked events.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether no events are tracked.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Current state of an event, if tracked.
    pub fn state_of(&self, event_id: &str) -> Option<ProcessingState> {
        self.entries.read().get(event_id).map(|r| r.state.clone())
    }

    /// Drop expired entries; on overflow, drop the oldest entry.
    ///
    /// Called under the write lock from `claim`, so eviction and insertion
    /// are atomic with respect to concurrent claims.
    fn make_room(&self, entries: &mut HashMap<String, EventRecord>, now: Instant) {
        entries.retain(|_, record| now.duration_since(record.claimed_at) < self.ttl);

        while entries.len() >= self.max_entries {
            let oldest = entries
                .iter()
                .min_by_key(|(_, record)| record.claimed_at)
                .map(|(id, _)| id.clone());
            match oldest {
                Some(id) => {
                    debug!(event_id = %id, "Evicting oldest idempotency record");
                    entries.remove(&id);
                }
                None => break,
            }
        }
    }
}

impl Default for InMemoryIdempotencyStore {
    fn default() -> Self {
        Self::new(DEFAULT_TTL, DEFAULT_MAX_ENTRIES)
    }
}

#[async_trait::async_trait]
impl IdempotencyStore for InMemoryIdempotencyStore {
    async fn claim(&self, event_id: &str) -> WebhookResult<ClaimOutcome> {
        let now = Instant::now();
        let mut entries = self.entries.write();

        if let Some(record) = entries.get(event_id) {
            let expired = now.duration_since(record.claimed_at) >= self.ttl;
            let retryable = matches!(record.state, ProcessingState::Failed { .. });
            if !expired && !retryable {
                return Ok(ClaimOutcome::Duplicate(record.state.clone()));
            }
        }

        self.make_room(&mut entries, now);
        entries.insert(
            event_id.to_string(),
            EventRecord {
                state: ProcessingState::Processing,
                claimed_at: now,
            },
        );
        Ok(ClaimOutcome::Claimed)
    }

    async fn mark_completed(&self, event_id: &str) -> WebhookResult<()> {
        let mut entries = self.entries.write();
        let claimed_at = entries
            .get(event_id)
            .map(|r| r.claimed_at)
            .unwrap_or_else(Instant::now);
        entries.insert(
            event_id.to_string(),
            EventRecord {
                state: ProcessingState::Completed,
                claimed_at,
            },
        );
        Ok(())
    }

    async fn mark_failed(&self, event_id: &str, error: &str) -> WebhookResult<()> {
        let mut entries = self.entries.write();
        let claimed_at = entries
            .get(event_id)
            .map(|r| r.claimed_at)
            .unwrap_or_else(Instant::now);
        entries.insert(
            event_id.to_string(),
            EventRecord {
                state: ProcessingState::Failed {
                    error: error.to_string(),
                },
                claimed_at,
            },
        );
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
