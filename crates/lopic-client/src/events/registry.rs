//! Per-tag observer registry.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use super::message::{ChannelEvent, EventTag};

/// Observer callback.
pub type Listener = Arc<dyn Fn(&ChannelEvent) + Send + Sync>;

/// Handle returned by [`ListenerRegistry::add`], used for removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Tag to ordered observer list.
///
/// Registration order is invocation order. Dispatch works on a snapshot, so
/// observers may add or remove listeners (including themselves) from inside a
/// callback without affecting the pass in progress.
#[derive(Default)]
pub struct ListenerRegistry {
    next_id: AtomicU64,
    listeners: RwLock<HashMap<EventTag, Vec<(ListenerId, Listener)>>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` for `tag`, after every listener already registered.
    pub fn add(&self, tag: EventTag, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .entry(tag)
            .or_default()
            .push((id, listener));
        id
    }

    /// Remove a listener. Returns `false` if it was not registered for `tag`.
    pub fn remove(&self, tag: EventTag, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let Some(list) = listeners.get_mut(&tag) else {
            return false;
        };
        let before = list.len();
        list.retain(|(existing, _)| *existing != id);
        let removed = list.len() != before;
        if list.is_empty() {
            listeners.remove(&tag);
        }
        removed
    }

    pub fn count(&self, tag: EventTag) -> usize {
        self.listeners.read().get(&tag).map_or(0, Vec::len)
    }

    /// Listeners currently registered for `tag`, in order.
    pub fn snapshot(&self, tag: EventTag) -> Vec<Listener> {
        self.listeners
            .read()
            .get(&tag)
            .map(|list| list.iter().map(|(_, l)| l.clone()).collect())
            .unwrap_or_default()
    }

    /// Invoke every listener for the event's tag. Returns how many ran.
    ///
    /// No lock is held while callbacks run.
    pub fn dispatch(&self, event: &ChannelEvent) -> usize {
        let listeners = self.snapshot(event.tag());
        for listener in &listeners {
            listener(event);
        }
        listeners.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::message::{EventMessage, UploadComplete, UploadProgress};
    use parking_lot::Mutex;

    fn progress() -> ChannelEvent {
        ChannelEvent::Message(EventMessage::UploadProgress(UploadProgress::default()))
    }

    fn complete() -> ChannelEvent {
        ChannelEvent::Message(EventMessage::UploadComplete(UploadComplete::default()))
    }

    fn recorder(log: &Arc<Mutex<Vec<&'static str>>>, name: &'static str) -> Listener {
        let log = log.clone();
        Arc::new(move |_: &ChannelEvent| log.lock().push(name))
    }

    #[test]
    fn test_dispatch_in_registration_order() {
        let registry = ListenerRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        registry.add(EventTag::UploadProgress, recorder(&log, "first"));
        registry.add(EventTag::UploadProgress, recorder(&log, "second"));
        registry.add(EventTag::UploadProgress, recorder(&log, "third"));

        assert_eq!(registry.dispatch(&progress()), 3);
        assert_eq!(*log.lock(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_listener_isolation() {
        let registry = ListenerRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        registry.add(EventTag::UploadComplete, recorder(&log, "complete"));

        assert_eq!(registry.dispatch(&progress()), 0);
        assert!(log.lock().is_empty());

        registry.dispatch(&complete());
        assert_eq!(*log.lock(), vec!["complete"]);
    }

    #[test]
    fn test_remove_inside_callback_affects_only_later_frames() {
        let registry = Arc::new(ListenerRegistry::new());
        let log = Arc::new(Mutex::new(Vec::new()));
        let victim = Arc::new(Mutex::new(None::<ListenerId>));

        let remover: Listener = {
            let registry = registry.clone();
            let victim = victim.clone();
            let log = log.clone();
            Arc::new(move |_: &ChannelEvent| {
                log.lock().push("remover");
                if let Some(id) = victim.lock().take() {
                    assert!(registry.remove(EventTag::UploadProgress, id));
                }
            })
        };
        registry.add(EventTag::UploadProgress, remover);
        let id = registry.add(EventTag::UploadProgress, recorder(&log, "victim"));
        *victim.lock() = Some(id);

        // The pass in flight still reaches the victim.
        registry.dispatch(&progress());
        assert_eq!(*log.lock(), vec!["remover", "victim"]);

        log.lock().clear();
        registry.dispatch(&progress());
        assert_eq!(*log.lock(), vec!["remover"]);
        assert_eq!(registry.count(EventTag::UploadProgress), 1);
    }

    #[test]
    fn test_add_inside_callback_waits_for_next_frame() {
        let registry = Arc::new(ListenerRegistry::new());
        let log = Arc::new(Mutex::new(Vec::new()));

        let adder: Listener = {
            let registry = registry.clone();
            let log = log.clone();
            let added = Arc::new(Mutex::new(false));
            Arc::new(move |_: &ChannelEvent| {
                let mut added = added.lock();
                if !*added {
                    *added = true;
                    registry.add(EventTag::UploadProgress, recorder(&log, "late"));
                }
            })
        };
        registry.add(EventTag::UploadProgress, adder);

        assert_eq!(registry.dispatch(&progress()), 1);
        assert!(log.lock().is_empty());
        assert_eq!(registry.dispatch(&progress()), 2);
        assert_eq!(*log.lock(), vec!["late"]);
    }

    #[test]
    fn test_remove_unknown_listener() {
        let registry = ListenerRegistry::new();
        let id = registry.add(EventTag::Open, Arc::new(|_: &ChannelEvent| {}));
        assert!(!registry.remove(EventTag::Close, id));
        assert!(registry.remove(EventTag::Open, id));
        assert!(!registry.remove(EventTag::Open, id));
        assert_eq!(registry.count(EventTag::Open), 0);
    }
}
