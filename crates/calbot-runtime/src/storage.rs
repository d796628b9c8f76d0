//! Calendar event storage and its retry wrapper.
//!
//! Writes to the store are idempotent by event id, so a write that failed
//! on a dropped connection can simply be sent again. Reads are not retried.

use async_trait::async_trait;
use calbot_core::{RetryError, RetryPolicy, Transient};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

const MAX_TITLE_LEN: usize = 200;

/// A calendar entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,

    /// Chat room the event belongs to
    pub room: String,

    pub title: String,

    pub starts_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Errors from an event store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Store connection failed: {0}")]
    Connection(String),

    #[error("Event '{0}' not found")]
    NotFound(String),

    #[error("Query rejected: {0}")]
    Query(String),

    /// A retried write failed on every attempt.
    #[error("Gave up after {attempts} attempts: {last}")]
    RetryExhausted {
        attempts: u32,
        last: Box<StoreError>,
    },
}

impl Transient for StoreError {
    fn is_transient(&self) -> bool {
        matches!(self, StoreError::Connection(_))
    }
}

#[async_trait]
pub trait EventStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Event, StoreError>;

    /// Insert or replace the event with `event.id`.
    async fn upsert(&self, event: &Event) -> Result<(), StoreError>;

    /// Remove an event. Removing a missing event succeeds.
    async fn delete(&self, id: &str) -> Result<(), StoreError>;
}

/// Process-local store, used in tests and single-node setups.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    events: RwLock<BTreeMap<String, Event>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Events in `room`, earliest first.
    pub fn in_room(&self, room: &str) -> Vec<Event> {
        let mut events: Vec<_> = self
            .events
            .read()
            .values()
            .filter(|e| e.room == room)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.starts_at);
        events
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn get(&self, id: &str) -> Result<Event, StoreError> {
        self.events
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn upsert(&self, event: &Event) -> Result<(), StoreError> {
        let title_len = event.title.trim().chars().count();
        if title_len == 0 || title_len > MAX_TITLE_LEN {
            return Err(StoreError::Query(format!(
                "title must be 1-{} characters",
                MAX_TITLE_LEN
            )));
        }
        self.events.write().insert(event.id.clone(), event.clone());
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.events.write().remove(id);
        Ok(())
    }
}

/// Wraps a store so that writes survive brief connection failures.
#[derive(Debug)]
pub struct RetryingEventStore<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S: EventStore> RetryingEventStore<S> {
    pub fn new(inner: S, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

#[async_trait]
impl<S: EventStore> EventStore for RetryingEventStore<S> {
    async fn get(&self, id: &str) -> Result<Event, StoreError> {
        self.inner.get(id).await
    }

    async fn upsert(&self, event: &Event) -> Result<(), StoreError> {
        self.policy
            .run("event_store.upsert", || self.inner.upsert(event))
            .await
            .map_err(from_retry)
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.policy
            .run("event_store.delete", || self.inner.delete(id))
            .await
            .map_err(from_retry)
    }
}

fn from_retry(err: RetryError<StoreError>) -> StoreError {
    match err {
        RetryError::Exhausted {
            attempts,
            last_error,
            ..
        } => StoreError::RetryExhausted {
            attempts,
            last: Box::new(last_error),
        },
        RetryError::Permanent(e) => e,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn event(id: &str, title: &str) -> Event {
        Event {
            id: id.to_string(),
            room: "team".to_string(),
            title: title.to_string(),
            starts_at: Utc.with_ymd_and_hms(2026, 11, 2, 10, 0, 0).unwrap(),
            description: None,
        }
    }

    /// Fails the first `failures` writes with a connection error.
    struct Flaky {
        inner: InMemoryEventStore,
        failures: u32,
        calls: AtomicU32,
    }

    impl Flaky {
        fn new(failures: u32) -> Self {
            Self {
                inner: InMemoryEventStore::new(),
                failures,
                calls: AtomicU32::new(0),
            }
        }

        fn trip(&self) -> Result<(), StoreError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.failures {
                return Err(StoreError::Connection(format!("reset on call {}", call)));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl EventStore for Flaky {
        async fn get(&self, id: &str) -> Result<Event, StoreError> {
            self.trip()?;
            self.inner.get(id).await
        }

        async fn upsert(&self, event: &Event) -> Result<(), StoreError> {
            self.trip()?;
            self.inner.upsert(event).await
        }

        async fn delete(&self, id: &str) -> Result<(), StoreError> {
            self.trip()?;
            self.inner.delete(id).await
        }
    }

    fn retrying(failures: u32) -> RetryingEventStore<Flaky> {
        RetryingEventStore::new(Flaky::new(failures), RetryPolicy::new(3, Duration::from_secs(1)))
    }

    #[tokio::test]
    async fn test_in_memory_store() {
        let store = InMemoryEventStore::new();
        store.upsert(&event("1", "Standup")).await.unwrap();
        store.upsert(&event("1", "Standup (moved)")).await.unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.get("1").await.unwrap().title, "Standup (moved)");
        assert_eq!(store.in_room("team").len(), 1);

        store.delete("1").await.unwrap();
        store.delete("1").await.unwrap();
        assert!(matches!(store.get("1").await, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_rejects_blank_title() {
        let store = InMemoryEventStore::new();
        let err = store.upsert(&event("1", "  ")).await.unwrap_err();
        assert!(matches!(err, StoreError::Query(_)));
        assert!(!err.is_transient());
    }

    #[tokio::test(start_paused = true)]
    async fn test_upsert_survives_transient_failures() {
        let store = retrying(2);
        store.upsert(&event("1", "Dentist")).await.unwrap();

        assert_eq!(store.inner().calls.load(Ordering::SeqCst), 3);
        assert_eq!(store.inner().inner.get("1").await.unwrap().title, "Dentist");
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_gives_up_after_policy_attempts() {
        let store = retrying(10);
        let err = store.delete("1").await.unwrap_err();

        match err {
            StoreError::RetryExhausted { attempts, ref last } => {
                assert_eq!(attempts, 3);
                assert!(matches!(**last, StoreError::Connection(ref msg) if msg.contains("call 3")));
            }
            ref other => panic!("expected exhausted retries, got {:?}", other),
        }
        assert!(!err.is_transient());
        assert!(err.to_string().starts_with("Gave up after 3 attempts"));
        assert_eq!(store.inner().calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_query_errors_not_retried() {
        let store = retrying(0);
        let err = store.upsert(&event("1", "")).await.unwrap_err();

        assert!(matches!(err, StoreError::Query(_)));
        assert_eq!(store.inner().calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_is_not_retried() {
        let store = retrying(1);
        assert!(matches!(store.get("1").await, Err(StoreError::Connection(_))));
        assert_eq!(store.inner().calls.load(Ordering::SeqCst), 1);
    }
}
