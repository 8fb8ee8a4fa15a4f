//! In-process conversation memory
//!
//! A bounded, TTL-aware map from conversation id to its most recent turns.
//! All bookkeeping for a conversation lives in a single record behind one
//! lock, so turns and recency can never disagree.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::memory::{Clock, Role, SystemClock, Turn};

/// Capacity and expiry settings for a [`ConversationStore`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreLimits {
    /// Turns retained per conversation (minimum 1)
    pub max_turns: usize,
    /// Idle lifetime in seconds; 0 disables expiry
    pub ttl_seconds: u64,
    /// Distinct conversations retained (minimum 1)
    pub max_conversations: usize,
}

impl Default for StoreLimits {
    fn default() -> Self {
        Self {
            max_turns: 8,
            ttl_seconds: 3600,
            max_conversations: 500,
        }
    }
}

impl StoreLimits {
    pub fn new(max_turns: usize, ttl_seconds: u64, max_conversations: usize) -> Self {
        Self {
            max_turns,
            ttl_seconds,
            max_conversations,
        }
        .clamped()
    }

    /// Raise the per-conversation and global caps to at least 1
    pub fn clamped(self) -> Self {
        Self {
            max_turns: self.max_turns.max(1),
            ttl_seconds: self.ttl_seconds,
            max_conversations: self.max_conversations.max(1),
        }
    }

    fn ttl(&self) -> Option<Duration> {
        (self.ttl_seconds > 0).then(|| Duration::from_secs(self.ttl_seconds))
    }
}

#[derive(Debug)]
struct Conversation {
    turns: VecDeque<Turn>,
    last_touched: Duration,
    /// Tie-breaker for equal `last_touched` readings; lower is older
    touch_seq: u64,
}

#[derive(Debug, Default)]
struct Inner {
    conversations: HashMap<String, Conversation>,
    next_seq: u64,
}

impl Inner {
    fn touch(&mut self, id: &str, now: Duration) {
        let seq = self.next_seq;
        if let Some(convo) = self.conversations.get_mut(id) {
            convo.last_touched = now;
            convo.touch_seq = seq;
            self.next_seq += 1;
        }
    }

    fn expire_if_stale(&mut self, id: &str, now: Duration, ttl: Option<Duration>) {
        let Some(ttl) = ttl else { return };
        let stale = self
            .conversations
            .get(id)
            .is_some_and(|c| now.saturating_sub(c.last_touched) > ttl);
        if stale {
            self.conversations.remove(id);
            debug!("Expired idle conversation: {}", id);
        }
    }

    fn least_recently_touched(&self) -> Option<String> {
        self.conversations
            .iter()
            .min_by_key(|(_, c)| (c.last_touched, c.touch_seq))
            .map(|(id, _)| id.clone())
    }
}

/// Bounded short-term conversation memory shared across request handlers
pub struct ConversationStore {
    inner: Mutex<Inner>,
    limits: StoreLimits,
    clock: Arc<dyn Clock>,
}

impl ConversationStore {
    /// Create a store driven by the system clock
    pub fn new(limits: StoreLimits) -> Self {
        Self::with_clock(limits, Arc::new(SystemClock::new()))
    }

    /// Create a store with an explicit time source
    pub fn with_clock(limits: StoreLimits, clock: Arc<dyn Clock>) -> Self {
        let limits = limits.clamped();
        info!(
            "ConversationStore initialized: max_turns={}, ttl={}s, max_conversations={}",
            limits.max_turns, limits.ttl_seconds, limits.max_conversations
        );
        Self {
            inner: Mutex::new(Inner::default()),
            limits,
            clock,
        }
    }

    pub fn limits(&self) -> StoreLimits {
        self.limits
    }

    /// Recent turns for a conversation, oldest first.
    ///
    /// Unknown and expired ids both yield an empty list. A non-empty result
    /// counts as activity and resets the idle clock.
    pub async fn get(&self, conversation_id: &str) -> Vec<Turn> {
        let now = self.clock.monotonic();
        let mut inner = self.inner.lock().await;
        inner.expire_if_stale(conversation_id, now, self.limits.ttl());

        let turns: Vec<Turn> = match inner.conversations.get(conversation_id) {
            Some(convo) => convo.turns.iter().cloned().collect(),
            None => return Vec::new(),
        };
        if !turns.is_empty() {
            inner.touch(conversation_id, now);
        }
        turns
    }

    /// Record one turn. Empty content is ignored.
    pub async fn append(&self, conversation_id: &str, role: &str, content: &str) {
        if content.is_empty() {
            return;
        }
        let role = Role::normalize(role);
        let now = self.clock.monotonic();
        let turn = Turn::new(role, content, self.clock.wall());

        let mut inner = self.inner.lock().await;
        inner.expire_if_stale(conversation_id, now, self.limits.ttl());

        let convo = inner
            .conversations
            .entry(conversation_id.to_string())
            .or_insert_with(|| Conversation {
                turns: VecDeque::with_capacity(self.limits.max_turns),
                last_touched: now,
                touch_seq: 0,
            });
        convo.turns.push_back(turn);
        while convo.turns.len() > self.limits.max_turns {
            convo.turns.pop_front();
        }
        inner.touch(conversation_id, now);

        while inner.conversations.len() > self.limits.max_conversations {
            let Some(victim) = inner.least_recently_touched() else { break };
            inner.conversations.remove(&victim);
            debug!("Evicted least recently used conversation: {}", victim);
        }
    }

    /// Remove every expired conversation, returning how many were dropped
    pub async fn prune_expired(&self) -> usize {
        let Some(ttl) = self.limits.ttl() else { return 0 };
        let now = self.clock.monotonic();
        let mut inner = self.inner.lock().await;
        let before = inner.conversations.len();
        inner
            .conversations
            .retain(|_, c| now.saturating_sub(c.last_touched) <= ttl);
        before - inner.conversations.len()
    }

    /// Number of live conversations (including ones not yet lazily expired)
    pub async fn len(&self) -> usize {
        self.inner.lock().await.conversations.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Periodically prune expired conversations in the background
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = store.prune_expired().await;
                if removed > 0 {
                    debug!("Sweeper removed {} expired conversations", removed);
                }
            }
        })
    }
}
