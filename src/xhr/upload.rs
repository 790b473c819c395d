//! `XMLHttpRequestUpload` event target

use std::cell::RefCell;
use std::rc::Rc;

use super::events::{Event, EventDispatcher, EventListener, Progress};

/// Upload progress target exposed as `xhr.upload`
///
/// Only fires when the request carries a non-empty body.
#[derive(Clone, Default)]
pub struct XmlHttpRequestUpload {
    dispatcher: Rc<RefCell<EventDispatcher<XmlHttpRequestUpload>>>,
}

impl XmlHttpRequestUpload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_event_listener(
        &self,
        event_type: &str,
        listener: EventListener<Self>,
        use_capture: bool,
    ) {
        self.dispatcher
            .borrow_mut()
            .add_listener(event_type, listener, use_capture);
    }

    pub fn remove_event_listener(
        &self,
        event_type: &str,
        listener: &EventListener<Self>,
        use_capture: bool,
    ) {
        self.dispatcher
            .borrow_mut()
            .remove_listener(event_type, listener, use_capture);
    }

    /// Assign an `on<event>` handler, e.g. `set_event_handler("progress", ..)`
    pub fn set_event_handler(&self, event_type: &str, handler: Option<EventListener<Self>>) {
        self.dispatcher.borrow_mut().set_handler(event_type, handler);
    }

    pub fn event_handler(&self, event_type: &str) -> Option<EventListener<Self>> {
        self.dispatcher.borrow().handler(event_type)
    }

    pub(crate) fn fire(&self, event_type: &str, progress: Progress) {
        let event = Event::progress(event_type, progress);
        let listeners = self.dispatcher.borrow().listeners(event_type);
        EventDispatcher::dispatch(listeners, self, &event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fire_reaches_handler_and_listeners() {
        let upload = XmlHttpRequestUpload::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        let handler_log = Rc::clone(&log);
        upload.set_event_handler(
            "progress",
            Some(EventListener::new(move |_, e: &Event| {
                handler_log.borrow_mut().push(format!("on:{}", e.progress.unwrap().loaded))
            })),
        );
        let listener_log = Rc::clone(&log);
        upload.add_event_listener(
            "progress",
            EventListener::new(move |_, e: &Event| {
                listener_log.borrow_mut().push(format!("listener:{}", e.event_type))
            }),
            false,
        );

        upload.fire("progress", Progress::new(3, Some(3)));
        assert_eq!(*log.borrow(), vec!["on:3", "listener:progress"]);
    }

    #[test]
    fn test_listener_may_remove_itself() {
        let upload = XmlHttpRequestUpload::new();
        let count = Rc::new(RefCell::new(0));
        let slot: Rc<RefCell<Option<EventListener<XmlHttpRequestUpload>>>> = Rc::default();

        let counter = Rc::clone(&count);
        let own = Rc::clone(&slot);
        let listener = EventListener::new(move |target: &XmlHttpRequestUpload, _: &Event| {
            *counter.borrow_mut() += 1;
            if let Some(me) = own.borrow().as_ref() {
                target.remove_event_listener("load", me, false);
            }
        });
        *slot.borrow_mut() = Some(listener.clone());
        upload.add_event_listener("load", listener, false);

        upload.fire("load", Progress::default());
        upload.fire("load", Progress::default());
        assert_eq!(*count.borrow(), 1);
    }
}
