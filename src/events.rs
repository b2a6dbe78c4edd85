use crate::types::SecretReference;
use serde::Serialize;
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;
use uuid::Uuid;

/// Tag identifying one concrete lifecycle event type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A refresh attempt is about to run.
    RefreshRequested,
    /// A refresh succeeded and updated the cache.
    Refreshed,
    /// An active/inactive rotation was detected.
    RolloverDetected,
}

/// Emitted before a refresh attempt.
#[derive(Debug, Clone, Serialize)]
pub struct SecretRefreshRequested {
    event_id: Uuid,
    timestamp: SystemTime,
    reference: SecretReference,
    reason: String,
}

impl SecretRefreshRequested {
    /// Construct the event, stamping id and timestamp.
    pub fn new(reference: SecretReference, reason: impl Into<String>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            timestamp: SystemTime::now(),
            reference,
            reason: reason.into(),
        }
    }

    /// Reference whose refresh was requested.
    pub fn reference(&self) -> &SecretReference {
        &self.reference
    }

    /// Why the refresh was requested.
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

/// Emitted after a successful refresh that updated the cache.
#[derive(Debug, Clone, Serialize)]
pub struct SecretRefreshed {
    event_id: Uuid,
    timestamp: SystemTime,
    reference: SecretReference,
    version: String,
    value_changed: bool,
}

impl SecretRefreshed {
    /// Construct the event, stamping id and timestamp.
    pub fn new(
        reference: SecretReference,
        version: impl Into<String>,
        value_changed: bool,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            timestamp: SystemTime::now(),
            reference,
            version: version.into(),
            value_changed,
        }
    }

    /// Reference that was refreshed.
    pub fn reference(&self) -> &SecretReference {
        &self.reference
    }

    /// Version of the freshly fetched secret.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// True when the secret bytes differ from the previous retrieval.
    pub fn value_changed(&self) -> bool {
        self.value_changed
    }
}

/// Emitted when an active-version secret rotated while its inactive
/// counterpart is cached.
#[derive(Debug, Clone, Serialize)]
pub struct SecretRolloverDetected {
    event_id: Uuid,
    timestamp: SystemTime,
    active_reference: SecretReference,
    inactive_reference: SecretReference,
    new_active_version: String,
}

impl SecretRolloverDetected {
    /// Construct the event, stamping id and timestamp.
    pub fn new(
        active_reference: SecretReference,
        inactive_reference: SecretReference,
        new_active_version: impl Into<String>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            timestamp: SystemTime::now(),
            active_reference,
            inactive_reference,
            new_active_version: new_active_version.into(),
        }
    }

    /// Reference of the now-active secret.
    pub fn active_reference(&self) -> &SecretReference {
        &self.active_reference
    }

    /// Reference of the now-inactive counterpart.
    pub fn inactive_reference(&self) -> &SecretReference {
        &self.inactive_reference
    }

    /// Version of the new active secret.
    pub fn new_active_version(&self) -> &str {
        &self.new_active_version
    }
}

/// Lifecycle events published by the core.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SecretEvent {
    RefreshRequested(SecretRefreshRequested),
    Refreshed(SecretRefreshed),
    RolloverDetected(SecretRolloverDetected),
}

impl SecretEvent {
    /// Concrete type tag of this event.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::RefreshRequested(_) => EventKind::RefreshRequested,
            Self::Refreshed(_) => EventKind::Refreshed,
            Self::RolloverDetected(_) => EventKind::RolloverDetected,
        }
    }

    /// Unique id assigned at construction.
    pub fn event_id(&self) -> Uuid {
        match self {
            Self::RefreshRequested(e) => e.event_id,
            Self::Refreshed(e) => e.event_id,
            Self::RolloverDetected(e) => e.event_id,
        }
    }

    /// Creation timestamp assigned at construction.
    pub fn timestamp(&self) -> SystemTime {
        match self {
            Self::RefreshRequested(e) => e.timestamp,
            Self::Refreshed(e) => e.timestamp,
            Self::RolloverDetected(e) => e.timestamp,
        }
    }

    /// The primary reference this event concerns.
    pub fn reference(&self) -> &SecretReference {
        match self {
            Self::RefreshRequested(e) => &e.reference,
            Self::Refreshed(e) => &e.reference,
            Self::RolloverDetected(e) => &e.active_reference,
        }
    }
}

impl From<SecretRefreshRequested> for SecretEvent {
    fn from(event: SecretRefreshRequested) -> Self {
        Self::RefreshRequested(event)
    }
}

impl From<SecretRefreshed> for SecretEvent {
    fn from(event: SecretRefreshed) -> Self {
        Self::Refreshed(event)
    }
}

impl From<SecretRolloverDetected> for SecretEvent {
    fn from(event: SecretRolloverDetected) -> Self {
        Self::RolloverDetected(event)
    }
}

type Handler = Arc<dyn Fn(&SecretEvent) + Send + Sync>;

/// Synchronous fan-out of lifecycle events to subscribers.
///
/// Handlers can subscribe to one [`EventKind`] or to every event. Delivery
/// runs on the publishing thread; a panicking handler is isolated and does
/// not prevent later handlers from running.
#[derive(Default)]
pub struct EventBus {
    by_kind: Mutex<HashMap<EventKind, Vec<Handler>>>,
    any: Mutex<Vec<Handler>>,
    history: Mutex<Vec<SecretEvent>>,
}

impl EventBus {
    /// Construct a bus with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish an event to every matching subscriber.
    pub fn publish(&self, event: impl Into<SecretEvent>) {
        let event = event.into();
        self.history.lock().unwrap().push(event.clone());

        let mut handlers: Vec<Handler> = self
            .by_kind
            .lock()
            .unwrap()
            .get(&event.kind())
            .cloned()
            .unwrap_or_default();
        handlers.extend(self.any.lock().unwrap().iter().cloned());

        for handler in handlers {
            if catch_unwind(AssertUnwindSafe(|| handler(&event))).is_err() {
                tracing::warn!(kind = ?event.kind(), "event handler panicked; continuing");
            }
        }
    }

    /// Subscribe a handler to one event kind.
    pub fn subscribe<F>(&self, kind: EventKind, handler: F)
    where
        F: Fn(&SecretEvent) + Send + Sync + 'static,
    {
        self.by_kind
            .lock()
            .unwrap()
            .entry(kind)
            .or_default()
            .push(Arc::new(handler));
    }

    /// Subscribe a handler to every event kind.
    pub fn subscribe_all<F>(&self, handler: F)
    where
        F: Fn(&SecretEvent) + Send + Sync + 'static,
    {
        self.any.lock().unwrap().push(Arc::new(handler));
    }

    /// Drop every handler registered for the given kind.
    pub fn unsubscribe_all(&self, kind: EventKind) {
        self.by_kind.lock().unwrap().remove(&kind);
    }

    /// Snapshot of every event published so far, in publication order.
    pub fn history(&self) -> Vec<SecretEvent> {
        self.history.lock().unwrap().clone()
    }

    /// Forget the publication history.
    pub fn clear_history(&self) {
        self.history.lock().unwrap().clear();
    }
}
