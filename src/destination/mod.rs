//! Destination matching and subscription management
//!
//! Destinations are hierarchical strings split on `.` and `/`. Subscription
//! patterns may use `*` (exactly one segment) and `**` (this and every
//! remaining segment, including none). The registry is a flat,
//! insertion-ordered collection; fan-out works off a snapshot so no lock is
//! held across transport writes.

use std::sync::Arc;

use parking_lot::RwLock;
use smallvec::SmallVec;

/// Tokenized destination segments. Leading separators yield an empty first
/// segment, so `/foo` and `foo` remain distinct patterns.
pub type Tokens = SmallVec<[String; 8]>;

/// Split a destination into path segments on `.` and `/`.
pub fn tokenize(destination: &str) -> Tokens {
    destination
        .split(['.', '/'])
        .map(str::to_string)
        .collect()
}

/// Positional pattern match of a subscription against a publish destination.
///
/// `*` matches one segment; `**` matches the entire remaining tail and stops.
/// A pattern longer or shorter than the destination fails unless the pattern
/// reaches `**`.
pub fn matches(pattern: &[String], destination: &[String]) -> bool {
    let mut i = 0;
    loop {
        match (pattern.get(i), destination.get(i)) {
            (Some(p), _) if p == "**" => return true,
            (Some(p), Some(d)) if p == "*" || p == d => i += 1,
            (None, None) => return true,
            _ => return false,
        }
    }
}

/// A subscription entry
#[derive(Debug, Clone)]
pub struct Subscription {
    /// Subscription id, unique per session
    pub id: Arc<str>,
    /// Owning session
    pub session_id: Arc<str>,
    /// Pattern as supplied by the subscriber
    pub destination: Arc<str>,
    /// Tokenized pattern, shared across snapshots
    pub tokens: Arc<Tokens>,
}

impl Subscription {
    pub fn new(id: impl Into<Arc<str>>, session_id: Arc<str>, destination: &str) -> Self {
        Self {
            id: id.into(),
            session_id,
            destination: Arc::from(destination),
            tokens: Arc::new(tokenize(destination)),
        }
    }
}

/// Thread-safe subscription registry
///
/// A flat ordered list: publish fan-out is O(N) over active subscriptions
/// and every bookkeeping operation is a linear scan, which is the right
/// trade-off for an embeddable broker with modest subscription counts.
pub struct SubscriptionStore {
    subs: RwLock<Vec<Subscription>>,
}

impl SubscriptionStore {
    pub fn new() -> Self {
        Self {
            subs: RwLock::new(Vec::new()),
        }
    }

    /// Append a subscription.
    pub fn add(&self, subscription: Subscription) {
        self.subs.write().push(subscription);
    }

    /// Remove the first subscription matching `(session_id, id)`, returning
    /// it if one was removed.
    pub fn take(&self, session_id: &str, id: &str) -> Option<Subscription> {
        let mut subs = self.subs.write();
        let idx = subs
            .iter()
            .position(|s| s.session_id.as_ref() == session_id && s.id.as_ref() == id)?;
        Some(subs.remove(idx))
    }

    /// Remove the first subscription matching `(session_id, id)`.
    pub fn remove(&self, session_id: &str, id: &str) -> bool {
        self.take(session_id, id).is_some()
    }

    /// Drop every subscription owned by `session_id`, returning how many
    /// were removed.
    pub fn remove_session(&self, session_id: &str) -> usize {
        let mut subs = self.subs.write();
        let before = subs.len();
        subs.retain(|s| s.session_id.as_ref() != session_id);
        before - subs.len()
    }

    pub fn contains(&self, session_id: &str, id: &str) -> bool {
        self.subs
            .read()
            .iter()
            .any(|s| s.session_id.as_ref() == session_id && s.id.as_ref() == id)
    }

    /// Stable snapshot of the registry in insertion order.
    pub fn snapshot(&self) -> Vec<Subscription> {
        self.subs.read().clone()
    }

    /// All subscriptions matching a publish destination, in insertion order.
    pub fn matching(&self, destination: &str) -> SmallVec<[Subscription; 16]> {
        let tokens = tokenize(destination);
        self.subs
            .read()
            .iter()
            .filter(|s| matches(&s.tokens, &tokens))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.subs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.subs.read().is_empty()
    }
}

impl Default for SubscriptionStore {
    fn default() -> Self {
        Self::new()
    }
}
