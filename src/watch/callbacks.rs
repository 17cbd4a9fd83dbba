//! Typed callbacks fired by a configuration watcher.

use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// Which class of watcher event a callback listens for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallbackType {
    /// The watched directory reported a created entry.
    Create,
    /// The configuration was reloaded with new content.
    Update,
    /// The watched directory reported a removed entry.
    Remove,
}

impl fmt::Display for CallbackType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Remove => "remove",
        };
        f.write_str(name)
    }
}

/// Identifier returned by [`CallbackRegistry::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackId(usize);

type Callback = Arc<dyn Fn() + Send + Sync>;

struct CallbackRegistryInner {
    create: Vec<(usize, Callback)>,
    update: Vec<(usize, Callback)>,
    remove: Vec<(usize, Callback)>,
    next_id: usize,
}

impl CallbackRegistryInner {
    fn list(&self, cb_type: CallbackType) -> &Vec<(usize, Callback)> {
        match cb_type {
            CallbackType::Create => &self.create,
            CallbackType::Update => &self.update,
            CallbackType::Remove => &self.remove,
        }
    }

    fn list_mut(&mut self, cb_type: CallbackType) -> &mut Vec<(usize, Callback)> {
        match cb_type {
            CallbackType::Create => &mut self.create,
            CallbackType::Update => &mut self.update,
            CallbackType::Remove => &mut self.remove,
        }
    }
}

/// Per-type callback lists, invoked in registration order.
///
/// Callbacks run synchronously on the task that dispatches them. The lists are
/// snapshotted before dispatch, so a callback may register further callbacks
/// without deadlocking; those only fire on the next dispatch.
pub struct CallbackRegistry {
    inner: RwLock<CallbackRegistryInner>,
}

impl CallbackRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(CallbackRegistryInner {
                create: Vec::new(),
                update: Vec::new(),
                remove: Vec::new(),
                next_id: 0,
            }),
        }
    }

    /// Register `callback` for events of `cb_type`.
    pub fn subscribe<F>(&self, cb_type: CallbackType, callback: F) -> CallbackId
    where
        F: Fn() + Send + Sync + 'static,
    {
        let mut inner = self.inner.write();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.list_mut(cb_type).push((id, Arc::new(callback)));
        CallbackId(id)
    }

    /// Remove a callback. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: CallbackId) -> bool {
        let mut inner = self.inner.write();
        for cb_type in [CallbackType::Create, CallbackType::Update, CallbackType::Remove] {
            let list = inner.list_mut(cb_type);
            if let Some(pos) = list.iter().position(|(cb_id, _)| *cb_id == id.0) {
                list.remove(pos);
                return true;
            }
        }
        false
    }

    /// Number of callbacks registered for `cb_type`.
    pub fn count(&self, cb_type: CallbackType) -> usize {
        self.inner.read().list(cb_type).len()
    }

    /// Invoke every callback of `cb_type`. Returns how many ran.
    pub fn dispatch(&self, cb_type: CallbackType) -> usize {
        let callbacks: Vec<Callback> = self
            .inner
            .read()
            .list(cb_type)
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();

        for callback in &callbacks {
            callback();
        }
        callbacks.len()
    }
}

impl Default for CallbackRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_subscribe_and_dispatch() {
        let registry = CallbackRegistry::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let counter_clone = Arc::clone(&counter);
        registry.subscribe(CallbackType::Update, move || {
            counter_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(registry.dispatch(CallbackType::Update), 1);
        assert_eq!(registry.dispatch(CallbackType::Update), 1);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_types_are_isolated() {
        let registry = CallbackRegistry::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let counter_clone = Arc::clone(&counter);
        registry.subscribe(CallbackType::Remove, move || {
            counter_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(registry.dispatch(CallbackType::Create), 0);
        assert_eq!(registry.dispatch(CallbackType::Update), 0);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(registry.count(CallbackType::Remove), 1);
    }

    #[test]
    fn test_registration_order() {
        let registry = CallbackRegistry::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for n in 0..3 {
            let order = Arc::clone(&order);
            registry.subscribe(CallbackType::Update, move || order.lock().push(n));
        }

        registry.dispatch(CallbackType::Update);
        assert_eq!(*order.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn test_unsubscribe() {
        let registry = CallbackRegistry::new();
        let id = registry.subscribe(CallbackType::Create, || {});
        assert_eq!(registry.count(CallbackType::Create), 1);

        assert!(registry.unsubscribe(id));
        assert!(!registry.unsubscribe(id));
        assert_eq!(registry.count(CallbackType::Create), 0);
    }

    #[test]
    fn test_callback_may_subscribe_during_dispatch() {
        let registry = Arc::new(CallbackRegistry::new());
        let inner = Arc::clone(&registry);
        registry.subscribe(CallbackType::Update, move || {
            inner.subscribe(CallbackType::Update, || {});
        });

        assert_eq!(registry.dispatch(CallbackType::Update), 1);
        assert_eq!(registry.count(CallbackType::Update), 2);
    }
}
