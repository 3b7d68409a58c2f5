//! Interview Session State
//!
//! Per-session state of the interview state machine and the store that owns
//! it. The store hands out one async mutex per session identifier: a turn
//! holds its session's lock from start to finish, so turns for the same
//! session run strictly one after another while unrelated sessions never wait
//! on each other. The map itself is only locked for lookup and insertion.
//!
//! Sessions are bounded by a resident capacity with least-recently-used
//! eviction, and by an idle expiry. A session with a turn in flight is never
//! evicted, and an evicted session stays locked until its owner releases it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

/// Where a session is in the interview.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    New,
    AwaitingBackground,
    Looping,
    Finished,
}

/// State of one interview. Only the interviewer mutates it, while holding the
/// session lock.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub(crate) stage: Stage,
    pub(crate) outline: Vec<String>,
    pub(crate) outline_index: usize,
    pub(crate) used_question_ids: HashSet<String>,
    pub(crate) last_expected_answer: String,
    pub(crate) last_question: String,
    pub(crate) outline_keywords_handled: usize,
    created_at: DateTime<Utc>,
    last_active: DateTime<Utc>,
}

impl Default for SessionState {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            stage: Stage::New,
            outline: Vec::new(),
            outline_index: 0,
            used_question_ids: HashSet::new(),
            last_expected_answer: String::new(),
            last_question: String::new(),
            outline_keywords_handled: 0,
            created_at: now,
            last_active: now,
        }
    }
}

impl SessionState {
    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn is_finished(&self) -> bool {
        self.stage == Stage::Finished
    }

    /// The outline entry currently being worked on, if any remain.
    pub(crate) fn current_outline_entry(&self) -> Option<&str> {
        self.outline.get(self.outline_index).map(String::as_str)
    }

    /// Moves to the next outline entry, never past the end.
    pub(crate) fn advance_outline(&mut self) {
        if self.outline_index < self.outline.len() {
            self.outline_index += 1;
        }
    }

    /// Fixes the outline and enters the question loop.
    pub(crate) fn begin_loop(&mut self, outline: Vec<String>) {
        self.outline = outline;
        self.outline_index = 0;
        self.stage = Stage::Looping;
    }

    pub(crate) fn touch(&mut self) {
        self.last_active = Utc::now();
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let mut used_question_ids: Vec<String> = self.used_question_ids.iter().cloned().collect();
        used_question_ids.sort();
        SessionSnapshot {
            stage: self.stage,
            outline: self.outline.clone(),
            outline_index: self.outline_index,
            used_question_ids,
            outline_keywords_handled: self.outline_keywords_handled,
            last_question: self.last_question.clone(),
            created_at: self.created_at,
            last_active: self.last_active,
        }
    }
}

/// Read-only view of a session, for inspection endpoints and tests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub stage: Stage,
    pub outline: Vec<String>,
    pub outline_index: usize,
    pub used_question_ids: Vec<String>,
    pub outline_keywords_handled: usize,
    pub last_question: String,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}

/// Shared handle to one session's state.
pub type SessionHandle = Arc<Mutex<SessionState>>;

struct Slot {
    state: SessionHandle,
    last_used: Instant,
}

/// A session dropped from the store, still locked.
///
/// Until it is handed back through [`SessionStore::release`], a new turn for
/// the same identifier receives this same handle and waits on its lock, so
/// cleanup of the old session finishes before the new one starts.
pub struct Eviction {
    id: String,
    guard: OwnedMutexGuard<SessionState>,
}

impl Eviction {
    pub fn id(&self) -> &str {
        &self.id
    }
}

/// The result of [`SessionStore::checkout`].
pub struct Checkout {
    pub session: SessionHandle,
    /// Sessions dropped to make room or because they idled out. Each must be
    /// released once its external state is cleaned up.
    pub evicted: Vec<Eviction>,
}

#[derive(Default)]
struct Slots {
    live: HashMap<String, Slot>,
    /// Evicted sessions awaiting release, keyed by identifier.
    retiring: HashMap<String, SessionHandle>,
}

impl Slots {
    fn retire(&mut self, id: String, state: SessionHandle, evicted: &mut Vec<Eviction>) {
        // Callers only retire handles nobody else holds, so the lock is free.
        if let Ok(guard) = state.clone().try_lock_owned() {
            self.retiring.insert(id.clone(), state);
            evicted.push(Eviction { id, guard });
        }
    }
}

/// Process-wide owner of all session states.
pub struct SessionStore {
    slots: std::sync::Mutex<Slots>,
    capacity: usize,
    idle_ttl: Duration,
}

impl SessionStore {
    pub fn new(capacity: usize, idle_ttl: Duration) -> Self {
        Self {
            slots: std::sync::Mutex::new(Slots::default()),
            capacity: capacity.max(1),
            idle_ttl,
        }
    }

    /// Returns the session for `id`, creating it on first reference.
    pub fn checkout(&self, id: &str) -> Checkout {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let mut evicted = Vec::new();

        // A retiring session with no guard was abandoned mid-cleanup; hand it out again.
        for (key, state) in &slots.retiring {
            if Arc::strong_count(state) == 1 {
                if let Ok(guard) = state.clone().try_lock_owned() {
                    evicted.push(Eviction {
                        id: key.clone(),
                        guard,
                    });
                }
            }
        }

        // An Arc held elsewhere means a turn is running on that session.
        let expired: Vec<String> = slots
            .live
            .iter()
            .filter(|(_, slot)| {
                slot.last_used.elapsed() >= self.idle_ttl && Arc::strong_count(&slot.state) == 1
            })
            .map(|(key, _)| key.clone())
            .collect();
        for key in expired {
            if let Some(slot) = slots.live.remove(&key) {
                slots.retire(key, slot.state, &mut evicted);
            }
        }

        let mut revived = None;
        if !slots.live.contains_key(id) {
            if slots.live.len() >= self.capacity {
                let victim = slots
                    .live
                    .iter()
                    .filter(|(_, slot)| Arc::strong_count(&slot.state) == 1)
                    .min_by_key(|(_, slot)| slot.last_used)
                    .map(|(key, _)| key.clone());
                match victim.and_then(|key| slots.live.remove(&key).map(|slot| (key, slot))) {
                    Some((key, slot)) => slots.retire(key, slot.state, &mut evicted),
                    None => warn!(
                        capacity = self.capacity,
                        "Session store is full of active sessions; exceeding capacity"
                    ),
                }
            }
            revived = slots.retiring.remove(id);
        }

        let slot = slots.live.entry(id.to_string()).or_insert_with(|| {
            let state = match revived {
                Some(state) => {
                    debug!(session_id = id, "Reviving a session that is being evicted");
                    state
                }
                None => {
                    debug!(session_id = id, "Creating new interview session");
                    Arc::new(Mutex::new(SessionState::default()))
                }
            };
            Slot {
                state,
                last_used: Instant::now(),
            }
        });
        slot.last_used = Instant::now();

        Checkout {
            session: slot.state.clone(),
            evicted,
        }
    }

    /// Resets an evicted session and unlocks it. A turn waiting on the same
    /// identifier then starts from a fresh state.
    pub fn release(&self, eviction: Eviction) {
        let Eviction { id, mut guard } = eviction;
        *guard = SessionState::default();
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let still_retiring = slots
            .retiring
            .get(&id)
            .is_some_and(|state| Arc::ptr_eq(state, OwnedMutexGuard::mutex(&guard)));
        if still_retiring {
            slots.retiring.remove(&id);
        }
    }

    /// Looks up an existing session without creating or refreshing it.
    pub fn get(&self, id: &str) -> Option<SessionHandle> {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .live
            .get(id)
            .map(|slot| slot.state.clone())
    }

    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .live
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(checkout: &Checkout) -> Vec<&str> {
        let mut ids: Vec<&str> = checkout.evicted.iter().map(Eviction::id).collect();
        ids.sort();
        ids
    }

    #[test]
    fn test_new_session_defaults() {
        let state = SessionState::default();
        assert_eq!(state.stage(), Stage::New);
        assert!(state.outline.is_empty());
        assert_eq!(state.outline_index, 0);
        assert!(state.used_question_ids.is_empty());
        assert!(state.last_expected_answer.is_empty());
        assert!(!state.is_finished());
    }

    #[test]
    fn test_advance_outline_is_bounded() {
        let mut state = SessionState::default();
        state.begin_loop(vec!["JVM".to_string()]);
        assert_eq!(state.stage(), Stage::Looping);
        assert_eq!(state.current_outline_entry(), Some("JVM"));
        state.advance_outline();
        state.advance_outline();
        assert_eq!(state.outline_index, 1);
        assert_eq!(state.current_outline_entry(), None);
    }

    #[test]
    fn test_stage_serialization() {
        assert_eq!(
            serde_json::to_string(&Stage::AwaitingBackground).unwrap(),
            "\"awaiting_background\""
        );
        let stage: Stage = serde_json::from_str("\"finished\"").unwrap();
        assert_eq!(stage, Stage::Finished);
    }

    #[test]
    fn test_snapshot_sorts_used_ids() {
        let mut state = SessionState::default();
        state.used_question_ids.insert("b".to_string());
        state.used_question_ids.insert("a".to_string());
        assert_eq!(state.snapshot().used_question_ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_checkout_returns_same_session() {
        let store = SessionStore::new(8, Duration::from_secs(60));
        {
            let first = store.checkout("s1").session;
            first.lock().await.stage = Stage::Looping;
        }
        let again = store.checkout("s1").session;
        assert_eq!(again.lock().await.stage(), Stage::Looping);
        assert_eq!(store.len(), 1);
        assert!(store.get("s2").is_none());
    }

    #[test]
    fn test_lru_eviction_at_capacity() {
        let store = SessionStore::new(2, Duration::from_secs(3600));
        drop(store.checkout("a"));
        std::thread::sleep(Duration::from_millis(2));
        drop(store.checkout("b"));
        std::thread::sleep(Duration::from_millis(2));
        drop(store.checkout("a"));
        std::thread::sleep(Duration::from_millis(2));

        let checkout = store.checkout("c");
        assert_eq!(ids(&checkout), vec!["b"]);
        assert!(store.get("a").is_some());
        assert!(store.get("b").is_none());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_in_flight_sessions_are_not_evicted() {
        let store = SessionStore::new(1, Duration::from_secs(3600));
        let busy = store.checkout("a").session;
        let checkout = store.checkout("b");
        assert!(checkout.evicted.is_empty());
        assert_eq!(store.len(), 2);
        drop(busy);
    }

    #[test]
    fn test_idle_expiry() {
        let store = SessionStore::new(16, Duration::ZERO);
        drop(store.checkout("old"));
        let checkout = store.checkout("new");
        assert_eq!(ids(&checkout), vec!["old"]);
        assert!(store.get("old").is_none());
    }

    #[tokio::test]
    async fn test_distinct_sessions_do_not_contend() {
        let store = SessionStore::new(8, Duration::from_secs(60));
        let a = store.checkout("a").session;
        let b = store.checkout("b").session;
        let _guard_a = a.lock().await;
        assert!(b.try_lock().is_ok());
        assert!(a.try_lock().is_err());
    }

    #[tokio::test]
    async fn test_evicted_session_is_locked_until_released() {
        let store = SessionStore::new(1, Duration::from_secs(3600));
        {
            let session = store.checkout("a").session;
            session.lock().await.stage = Stage::Looping;
        }
        let mut first = store.checkout("b");
        assert_eq!(ids(&first), vec!["a"]);

        // A new turn for "a" gets the evicted handle and waits for its release.
        let revived = store.checkout("a");
        assert!(revived.evicted.is_empty());
        assert!(revived.session.try_lock().is_err());

        store.release(first.evicted.remove(0));
        let state = revived.session.try_lock().expect("released session is unlocked");
        assert_eq!(state.stage(), Stage::New);
        assert!(store.slots.lock().unwrap().retiring.is_empty());
    }

    #[test]
    fn test_abandoned_eviction_is_handed_out_again() {
        let store = SessionStore::new(1, Duration::from_secs(3600));
        drop(store.checkout("a"));
        // Evicts "a" and drops the eviction without releasing it.
        drop(store.checkout("b"));

        let checkout = store.checkout("c");
        assert_eq!(ids(&checkout), vec!["a", "b"]);
        for eviction in checkout.evicted {
            store.release(eviction);
        }
        assert!(store.slots.lock().unwrap().retiring.is_empty());
        assert_eq!(store.len(), 1);
    }
}
