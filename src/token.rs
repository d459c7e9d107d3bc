use std::sync::{Arc, Mutex, Weak};
use tracing::debug;

/// Notification broadcast when the session tokens change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenEvent {
    /// Tokens were set on login.
    Set { access_token: String },
    /// Tokens were cleared on logout or unrecoverable refresh failure.
    Cleared,
    /// A refresh succeeded and produced a new access token.
    Refreshed { access_token: String },
}

impl TokenEvent {
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Set { .. } => "set",
            Self::Cleared => "clear",
            Self::Refreshed { .. } => "refresh",
        }
    }
}

type Listener = Arc<dyn Fn(&TokenEvent) + Send + Sync>;

struct Inner {
    access_token: Option<String>,
    refresh_token: Option<String>,
    listeners: Vec<(u64, Listener)>,
    next_id: u64,
}

struct Shared {
    inner: Mutex<Inner>,
    // Serializes event delivery so subscribers observe events in the order
    // the triggering operations completed.
    delivery: Mutex<()>,
}

/// Process-wide owner of the session token pair, with a subscriber list.
///
/// Tokens live in memory only; nothing here touches durable storage. The
/// request client and the refresh coordinator are the only writers. UI code
/// observes changes through [`TokenStore::subscribe`].
///
/// Listeners are invoked synchronously while the delivery lock is held; they
/// must not call back into `set_tokens`/`clear_tokens`.
#[derive(Clone)]
pub struct TokenStore {
    shared: Arc<Shared>,
}

impl Default for TokenStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenStore {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    access_token: None,
                    refresh_token: None,
                    listeners: Vec::new(),
                    next_id: 0,
                }),
                delivery: Mutex::new(()),
            }),
        }
    }

    pub fn access_token(&self) -> Option<String> {
        self.lock_inner().access_token.clone()
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.lock_inner().refresh_token.clone()
    }

    /// Store a fresh token pair (login) and notify subscribers.
    pub fn set_tokens(&self, access_token: &str, refresh_token: &str) {
        debug!("auth tokens set");
        self.mutate_and_emit(
            |inner| {
                inner.access_token = Some(access_token.to_string());
                inner.refresh_token = Some(refresh_token.to_string());
            },
            TokenEvent::Set {
                access_token: access_token.to_string(),
            },
        );
    }

    /// Drop the held tokens (logout, unrecoverable refresh failure) and
    /// notify subscribers.
    pub fn clear_tokens(&self) {
        debug!("auth tokens cleared");
        self.mutate_and_emit(
            |inner| {
                inner.access_token = None;
                inner.refresh_token = None;
            },
            TokenEvent::Cleared,
        );
    }

    /// Store the pair produced by a successful refresh.
    pub(crate) fn store_refreshed(&self, access_token: &str, refresh_token: &str) {
        debug!("auth tokens refreshed");
        self.mutate_and_emit(
            |inner| {
                inner.access_token = Some(access_token.to_string());
                inner.refresh_token = Some(refresh_token.to_string());
            },
            TokenEvent::Refreshed {
                access_token: access_token.to_string(),
            },
        );
    }

    /// Register a listener for token events. The returned guard
    /// unsubscribes on drop; [`Subscription::unsubscribe`] is idempotent.
    ///
    /// A listener never observes events emitted before it subscribed.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&TokenEvent) + Send + Sync + 'static,
    {
        let mut inner = self.lock_inner();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.listeners.push((id, Arc::new(listener)));
        Subscription {
            shared: Arc::downgrade(&self.shared),
            id,
        }
    }

    fn lock_inner(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.shared.inner.lock().expect("token store lock poisoned")
    }

    fn mutate_and_emit(&self, mutate: impl FnOnce(&mut Inner), event: TokenEvent) {
        let mut inner = self.shared.inner.lock().expect("token store lock poisoned");
        mutate(&mut inner);
        // Snapshot under the state lock so a racing unsubscribe cannot
        // observe this emit, then hold only the delivery lock while calling
        // out so subscribe/unsubscribe stay reentrant.
        let snapshot: Vec<Listener> = inner.listeners.iter().map(|(_, l)| Arc::clone(l)).collect();
        let delivery = self.shared.delivery.lock().expect("token delivery lock poisoned");
        drop(inner);
        for listener in &snapshot {
            listener(&event);
        }
        drop(delivery);
    }
}

/// Handle returned by [`TokenStore::subscribe`]; dropping it unsubscribes.
pub struct Subscription {
    shared: Weak<Shared>,
    id: u64,
}

impl Subscription {
    /// Remove the listener. Safe to call more than once.
    pub fn unsubscribe(&self) {
        if let Some(shared) = self.shared.upgrade() {
            let mut inner = shared.inner.lock().expect("token store lock poisoned");
            inner.listeners.retain(|(id, _)| *id != self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recording_store() -> (TokenStore, Arc<Mutex<Vec<String>>>, Subscription) {
        let store = TokenStore::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let sub = store.subscribe(move |event| {
            seen_clone.lock().unwrap().push(event.reason().to_string());
        });
        (store, seen, sub)
    }

    #[test]
    fn test_tokens_start_empty() {
        let store = TokenStore::new();
        assert_eq!(store.access_token(), None);
        assert_eq!(store.refresh_token(), None);
    }

    #[test]
    fn test_set_then_clear_orders_events() {
        let (store, seen, _sub) = recording_store();

        store.set_tokens("access-1", "refresh-1");
        store.clear_tokens();

        assert_eq!(*seen.lock().unwrap(), vec!["set", "clear"]);
        assert_eq!(store.access_token(), None);
    }

    #[test]
    fn test_set_event_carries_token() {
        let store = TokenStore::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let _sub = store.subscribe(move |event| {
            seen_clone.lock().unwrap().push(event.clone());
        });

        store.set_tokens("access-1", "refresh-1");

        assert_eq!(
            *seen.lock().unwrap(),
            vec![TokenEvent::Set {
                access_token: "access-1".to_string()
            }]
        );
    }

    #[test]
    fn test_refreshed_updates_both_tokens() {
        let (store, seen, _sub) = recording_store();
        store.set_tokens("a1", "r1");
        store.store_refreshed("a2", "r2");

        assert_eq!(store.access_token(), Some("a2".to_string()));
        assert_eq!(store.refresh_token(), Some("r2".to_string()));
        assert_eq!(*seen.lock().unwrap(), vec!["set", "refresh"]);
    }

    #[test]
    fn test_late_subscriber_misses_earlier_events() {
        let store = TokenStore::new();
        store.set_tokens("a1", "r1");

        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let _sub = store.subscribe(move |event| {
            seen_clone.lock().unwrap().push(event.reason().to_string());
        });

        store.clear_tokens();
        assert_eq!(*seen.lock().unwrap(), vec!["clear"]);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let (store, seen, sub) = recording_store();
        store.set_tokens("a1", "r1");
        sub.unsubscribe();
        store.clear_tokens();

        assert_eq!(*seen.lock().unwrap(), vec!["set"]);
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let (store, seen, sub) = recording_store();
        sub.unsubscribe();
        sub.unsubscribe();
        drop(sub);

        store.set_tokens("a1", "r1");
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_drop_unsubscribes() {
        let (store, seen, sub) = recording_store();
        drop(sub);
        store.set_tokens("a1", "r1");
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_multiple_subscribers_all_notified() {
        let store = TokenStore::new();
        let seen_a = Arc::new(Mutex::new(Vec::new()));
        let seen_b = Arc::new(Mutex::new(Vec::new()));

        let a = seen_a.clone();
        let _sub_a = store.subscribe(move |e| a.lock().unwrap().push(e.reason().to_string()));
        let b = seen_b.clone();
        let _sub_b = store.subscribe(move |e| b.lock().unwrap().push(e.reason().to_string()));

        store.set_tokens("a1", "r1");

        assert_eq!(*seen_a.lock().unwrap(), vec!["set"]);
        assert_eq!(*seen_b.lock().unwrap(), vec!["set"]);
    }

    #[test]
    fn test_subscription_outliving_store_is_safe() {
        let (store, _seen, sub) = recording_store();
        drop(store);
        // Weak upgrade fails; unsubscribe is a no-op.
        sub.unsubscribe();
    }
}
