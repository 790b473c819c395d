//! Event dispatch for request objects
//!
//! Each event type maps to one ordered list of listeners. The `on<event>`
//! handler property is the entry at index 0 of that list and is replaced,
//! never appended, when reassigned. Listeners added with
//! [`EventDispatcher::add_listener`] are appended in registration order and a
//! duplicate (listener, capture) pair is ignored.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Byte counts carried by progress events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Progress {
    pub loaded: u64,
    /// Expected total, 0 unless `length_computable`
    pub total: u64,
    pub length_computable: bool,
}

impl Progress {
    /// Progress with a known total only when `total` is `Some`
    pub fn new(loaded: u64, total: Option<u64>) -> Self {
        Self {
            loaded,
            total: total.unwrap_or(0),
            length_computable: total.is_some(),
        }
    }
}

/// An event delivered to listeners
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub event_type: String,
    /// Set for `ProgressEvent`s (loadstart, progress, load, loadend, ...)
    pub progress: Option<Progress>,
}

impl Event {
    /// Create a plain event
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            progress: None,
        }
    }

    /// Create a progress event
    pub fn progress(event_type: impl Into<String>, progress: Progress) -> Self {
        Self {
            event_type: event_type.into(),
            progress: Some(progress),
        }
    }

    /// Whether this is a `ProgressEvent`
    pub fn is_progress_event(&self) -> bool {
        self.progress.is_some()
    }
}

/// Callback registered on an event target of type `T`
///
/// Identity is by allocation: clones of one listener compare equal, two
/// listeners built from identical closures do not.
pub struct EventListener<T>(Rc<dyn Fn(&T, &Event)>);

impl<T> EventListener<T> {
    /// Wrap a closure
    pub fn new(callback: impl Fn(&T, &Event) + 'static) -> Self {
        Self(Rc::new(callback))
    }

    /// Invoke the callback
    pub fn call(&self, target: &T, event: &Event) {
        (self.0)(target, event)
    }

    fn id(&self) -> *const () {
        Rc::as_ptr(&self.0).cast::<()>()
    }
}

impl<T> Clone for EventListener<T> {
    fn clone(&self) -> Self {
        Self(Rc::clone(&self.0))
    }
}

impl<T> PartialEq for EventListener<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl<T> Eq for EventListener<T> {}

impl<T> fmt::Debug for EventListener<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventListener({:p})", self.id())
    }
}

struct ListenerEntry<T> {
    listener: EventListener<T>,
    capture: bool,
    /// Entry owned by the `on<event>` property
    handler: bool,
}

/// Ordered listener registry for one event target
pub struct EventDispatcher<T> {
    listeners: HashMap<String, Vec<ListenerEntry<T>>>,
}

impl<T> EventDispatcher<T> {
    /// Create an empty dispatcher
    pub fn new() -> Self {
        Self {
            listeners: HashMap::new(),
        }
    }

    /// Assign or clear the `on<event>` handler
    pub fn set_handler(&mut self, event_type: &str, handler: Option<EventListener<T>>) {
        let entries = self.listeners.entry(event_type.to_string()).or_default();
        let existing = entries.iter().position(|e| e.handler);
        match (existing, handler) {
            (Some(idx), Some(listener)) => entries[idx].listener = listener,
            (Some(idx), None) => {
                entries.remove(idx);
            }
            (None, Some(listener)) => entries.insert(
                0,
                ListenerEntry {
                    listener,
                    capture: false,
                    handler: true,
                },
            ),
            (None, None) => {}
        }
    }

    /// Current `on<event>` handler
    pub fn handler(&self, event_type: &str) -> Option<EventListener<T>> {
        self.listeners
            .get(event_type)?
            .iter()
            .find(|e| e.handler)
            .map(|e| e.listener.clone())
    }

    /// Append a listener unless the same (listener, capture) pair is present
    pub fn add_listener(&mut self, event_type: &str, listener: EventListener<T>, capture: bool) {
        let entries = self.listeners.entry(event_type.to_string()).or_default();
        let duplicate = entries
            .iter()
            .any(|e| !e.handler && e.capture == capture && e.listener == listener);
        if duplicate {
            return;
        }
        entries.push(ListenerEntry {
            listener,
            capture,
            handler: false,
        });
    }

    /// Remove a listener registered with the same capture flag
    pub fn remove_listener(&mut self, event_type: &str, listener: &EventListener<T>, capture: bool) {
        if let Some(entries) = self.listeners.get_mut(event_type) {
            entries.retain(|e| e.handler || e.capture != capture || e.listener != *listener);
        }
    }

    /// Snapshot of the listeners for `event_type`, in dispatch order
    ///
    /// Callers holding the dispatcher behind a `RefCell` take the snapshot,
    /// release the borrow, then invoke.
    pub fn listeners(&self, event_type: &str) -> Vec<EventListener<T>> {
        self.listeners
            .get(event_type)
            .map(|entries| entries.iter().map(|e| e.listener.clone()).collect())
            .unwrap_or_default()
    }

    /// Invoke a snapshot from [`EventDispatcher::listeners`], in order
    ///
    /// Works on the snapshot rather than `&self` so no borrow of the
    /// dispatcher is held while listeners run.
    pub fn dispatch(listeners: Vec<EventListener<T>>, target: &T, event: &Event) {
        for listener in listeners {
            listener.call(target, event);
        }
    }

    /// Number of listeners (handler included) for an event type
    pub fn listener_count(&self, event_type: &str) -> usize {
        self.listeners.get(event_type).map(|l| l.len()).unwrap_or(0)
    }
}

impl<T> Default for EventDispatcher<T> {
    fn default() -> Self {
        Self::new()
    }
}
