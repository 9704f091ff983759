//! Change notification for controller subscribers
//!
//! Subscribers register a callback and receive the kind of change
//! ([`ControllerTriggerType`]). Notifications are produced while the
//! controller state lock is held but only delivered after it is released,
//! so a subscriber may read the controller from inside its callback.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{error, trace};

use super::types::ControllerTriggerType;
use crate::error::ControllerError;

type ChangeFn = Arc<dyn Fn(ControllerTriggerType) + Send + Sync>;

/// A registered observer
#[derive(Clone)]
pub struct ControllerUpdateCallback {
    on_change: ChangeFn,
    /// Only receives updates of the live report, never configuration previews
    pub is_npad_service: bool,
}

impl ControllerUpdateCallback {
    /// Observer that also receives configuration previews (e.g. a mapping UI)
    pub fn new<F>(on_change: F) -> Self
    where
        F: Fn(ControllerTriggerType) + Send + Sync + 'static,
    {
        Self {
            on_change: Arc::new(on_change),
            is_npad_service: false,
        }
    }

    /// Observer that only cares about the live report
    pub fn npad_service<F>(on_change: F) -> Self
    where
        F: Fn(ControllerTriggerType) + Send + Sync + 'static,
    {
        Self {
            on_change: Arc::new(on_change),
            is_npad_service: true,
        }
    }
}

/// One pending delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Notification {
    pub kind: ControllerTriggerType,
    /// The live report changed (as opposed to a configuration preview)
    pub is_service_update: bool,
}

impl Notification {
    pub fn service(kind: ControllerTriggerType) -> Self {
        Self {
            kind,
            is_service_update: true,
        }
    }

    pub fn preview(kind: ControllerTriggerType) -> Self {
        Self {
            kind,
            is_service_update: false,
        }
    }
}

#[derive(Default)]
struct Registry {
    next_key: usize,
    callbacks: Vec<(usize, ControllerUpdateCallback)>,
}

/// Ordered subscriber registry
#[derive(Default)]
pub struct NotificationBus {
    registry: RwLock<Registry>,
}

impl NotificationBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subscriber and return its key
    ///
    /// Keys are never reused.
    pub fn register(&self, callback: ControllerUpdateCallback) -> usize {
        let mut registry = self.registry.write();
        let key = registry.next_key;
        registry.next_key += 1;
        registry.callbacks.push((key, callback));
        trace!("Registered controller subscriber {}", key);
        key
    }

    /// Remove a subscriber
    pub fn unregister(&self, key: usize) -> Result<(), ControllerError> {
        let mut registry = self.registry.write();
        match registry.callbacks.iter().position(|(k, _)| *k == key) {
            Some(position) => {
                registry.callbacks.remove(position);
                Ok(())
            }
            None => {
                error!("Tried to delete non-existent callback {}", key);
                Err(ControllerError::UnknownCallback(key))
            }
        }
    }

    pub fn len(&self) -> usize {
        self.registry.read().callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver one notification in registration order
    ///
    /// Service subscribers skip configuration previews. The registry lock is
    /// not held while callbacks run, so callbacks may (un)register.
    pub fn notify(&self, notification: Notification) {
        let targets: Vec<ChangeFn> = self
            .registry
            .read()
            .callbacks
            .iter()
            .filter(|(_, cb)| notification.is_service_update || !cb.is_npad_service)
            .map(|(_, cb)| cb.on_change.clone())
            .collect();

        for on_change in targets {
            on_change(notification.kind);
        }
    }

    /// Deliver a batch collected under the state lock
    pub fn dispatch(&self, pending: Vec<Notification>) {
        for notification in pending {
            self.notify(notification);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_service_subscribers_skip_previews() {
        let bus = NotificationBus::new();
        let service_hits = Arc::new(AtomicUsize::new(0));
        let ui_hits = Arc::new(AtomicUsize::new(0));

        let counter = service_hits.clone();
        bus.register(ControllerUpdateCallback::npad_service(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        let counter = ui_hits.clone();
        bus.register(ControllerUpdateCallback::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        bus.notify(Notification::preview(ControllerTriggerType::Button));
        bus.notify(Notification::service(ControllerTriggerType::Button));

        assert_eq!(service_hits.load(Ordering::SeqCst), 1);
        assert_eq!(ui_hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_registration_order() {
        let bus = NotificationBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for id in 0..3 {
            let order = order.clone();
            bus.register(ControllerUpdateCallback::new(move |_| order.lock().push(id)));
        }
        bus.notify(Notification::service(ControllerTriggerType::Stick));
        assert_eq!(*order.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn test_unregister() {
        let bus = NotificationBus::new();
        let first = bus.register(ControllerUpdateCallback::new(|_| {}));
        let second = bus.register(ControllerUpdateCallback::new(|_| {}));
        assert_ne!(first, second);

        assert!(bus.unregister(first).is_ok());
        assert_eq!(
            bus.unregister(first),
            Err(ControllerError::UnknownCallback(first))
        );
        assert_eq!(bus.len(), 1);

        // Keys keep increasing after removal
        let third = bus.register(ControllerUpdateCallback::new(|_| {}));
        assert!(third > second);
    }
}
