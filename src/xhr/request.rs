//! The `XMLHttpRequest` object
//!
//! One request object runs a sequence of cycles (open → send → completion).
//! Asynchronous cycles are registered with the owning [`EventLoop`] and their
//! network events are processed as loop jobs; synchronous cycles run the
//! executor inline and replay the buffered events through the same
//! [`XmlHttpRequest::process_network_event`] path, so both modes fire the
//! same events in the same order.
//!
//! Listener callbacks receive a handle to the request and may call back into
//! it (abort, open, ...). No internal borrow is held while a listener runs,
//! and every step re-checks that its cycle is still current before firing
//! the next event.
//!
//! [`EventLoop`]: crate::engine::EventLoop

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use url::Url;

use super::events::{Event, EventDispatcher, EventListener, Progress};
use super::mime::MimeType;
use super::response::{ResponseInterpreter, ResponseType, ResponseValue};
use super::state::ReadyState;
use super::upload::XmlHttpRequestUpload;
use crate::engine::{CycleId, ScriptContext, TimerId, WeakScriptContext};
use crate::network::{
    BufferedSink, CancelFlag, HeaderList, NetworkEvent, NetworkRequest, ResponseHead,
};
use crate::renderer::Document;
use crate::security::HeaderPolicy;
use crate::utils::{NetworkError, Result, XhrError};

/// Body passed to [`XmlHttpRequest::send`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestBody {
    /// Sent as UTF-8 with a default `text/plain;charset=UTF-8` type
    Text(String),
    Bytes(Vec<u8>),
}

impl RequestBody {
    fn into_bytes(self) -> Vec<u8> {
        match self {
            Self::Text(text) => text.into_bytes(),
            Self::Bytes(bytes) => bytes,
        }
    }
}

impl From<&str> for RequestBody {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for RequestBody {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Vec<u8>> for RequestBody {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

/// Put `user`/`password` into the URL's userinfo
///
/// URLs without a host (`data:`, `about:`) and `file:` URLs carry no
/// userinfo; the credentials are ignored for them.
fn apply_credentials(url: &mut Url, user: Option<&str>, password: Option<&str>) {
    if !url.has_host() || url.scheme() == "file" {
        log::debug!("Ignoring credentials for {}: URL has no userinfo", url);
        return;
    }
    if let Some(user) = user {
        if url.set_username(user).is_err() {
            log::debug!("Could not set username on {}", url);
        }
    }
    if let Some(password) = password {
        if url.set_password(Some(password)).is_err() {
            log::debug!("Could not set password on {}", url);
        }
    }
}

struct XhrState {
    ready_state: ReadyState,
    method: String,
    url: Option<Url>,
    asynchronous: bool,
    request_headers: HeaderList,
    override_mime: Option<MimeType>,
    response_type: ResponseType,
    /// Milliseconds, 0 for none
    timeout: u32,
    with_credentials: bool,
    send_flag: bool,
    /// Bumped on every open(); steps of an older cycle stop firing
    generation: u64,
    cycle: Option<CycleId>,
    timer: Option<TimerId>,
    upload_complete: bool,
    upload_events: bool,
    upload_length: u64,
    response: Option<ResponseHead>,
    body: Vec<u8>,
    text_cache: Option<String>,
    document_cache: Option<Option<Document>>,
    dispatcher: EventDispatcher<XmlHttpRequest>,
}

impl XhrState {
    fn new() -> Self {
        Self {
            ready_state: ReadyState::Unsent,
            method: String::new(),
            url: None,
            asynchronous: true,
            request_headers: HeaderList::new(),
            override_mime: None,
            response_type: ResponseType::Default,
            timeout: 0,
            with_credentials: false,
            send_flag: false,
            generation: 0,
            cycle: None,
            timer: None,
            upload_complete: false,
            upload_events: false,
            upload_length: 0,
            response: None,
            body: Vec::new(),
            text_cache: None,
            document_cache: None,
            dispatcher: EventDispatcher::new(),
        }
    }

    fn clear_response(&mut self) {
        self.response = None;
        self.body.clear();
        self.text_cache = None;
        self.document_cache = None;
    }

    fn interpreter(&self) -> ResponseInterpreter {
        let content_type = self
            .response
            .as_ref()
            .and_then(|r| r.headers.get("content-type"));
        ResponseInterpreter::new(
            self.override_mime.clone(),
            content_type.as_deref(),
            self.response_type,
        )
    }

    fn progress(&self) -> Progress {
        let total = self.response.as_ref().and_then(|r| r.content_length());
        Progress::new(self.body.len() as u64, total)
    }
}

/// Request handle stored in the event loop for an in-flight cycle
///
/// The loop lives inside the context, so the context is held weakly.
struct CycleTarget {
    inner: Rc<RefCell<XhrState>>,
    upload: XmlHttpRequestUpload,
    context: WeakScriptContext,
}

impl CycleTarget {
    fn new(xhr: &XmlHttpRequest) -> Self {
        Self {
            inner: Rc::clone(&xhr.inner),
            upload: xhr.upload.clone(),
            context: xhr.context.downgrade(),
        }
    }

    fn upgrade(&self) -> Option<XmlHttpRequest> {
        let context = self.context.upgrade()?;
        Some(XmlHttpRequest {
            inner: Rc::clone(&self.inner),
            upload: self.upload.clone(),
            context,
        })
    }
}

/// Script-facing request object
///
/// Cloning yields another handle to the same request.
#[derive(Clone)]
pub struct XmlHttpRequest {
    inner: Rc<RefCell<XhrState>>,
    upload: XmlHttpRequestUpload,
    context: ScriptContext,
}

impl XmlHttpRequest {
    pub const UNSENT: u16 = 0;
    pub const OPENED: u16 = 1;
    pub const HEADERS_RECEIVED: u16 = 2;
    pub const LOADING: u16 = 3;
    pub const DONE: u16 = 4;

    /// Create a request bound to a script context
    pub fn new(context: &ScriptContext) -> Self {
        Self {
            inner: Rc::new(RefCell::new(XhrState::new())),
            upload: XmlHttpRequestUpload::new(),
            context: context.clone(),
        }
    }

    pub fn ready_state(&self) -> ReadyState {
        self.inner.borrow().ready_state
    }

    /// HTTP status, 0 before headers arrive or after a network failure
    pub fn status(&self) -> u16 {
        self.inner.borrow().response.as_ref().map_or(0, |r| r.status)
    }

    pub fn status_text(&self) -> String {
        self.inner
            .borrow()
            .response
            .as_ref()
            .map(|r| r.status_text.clone())
            .unwrap_or_default()
    }

    /// Final URL of the response, empty before headers arrive
    pub fn response_url(&self) -> String {
        let state = self.inner.borrow();
        let Some(response) = state.response.as_ref() else {
            return String::new();
        };
        let mut url = match response.url.as_ref().or(state.url.as_ref()) {
            Some(url) => url.clone(),
            None => return String::new(),
        };
        url.set_fragment(None);
        url.to_string()
    }

    pub fn upload(&self) -> XmlHttpRequestUpload {
        self.upload.clone()
    }

    pub fn response_type(&self) -> ResponseType {
        self.inner.borrow().response_type
    }

    /// Set `responseType`; unknown values are ignored
    pub fn set_response_type(&self, value: &str) -> Result<()> {
        let mut state = self.inner.borrow_mut();
        if state.ready_state >= ReadyState::Loading {
            return Err(XhrError::InvalidState(
                "responseType cannot be changed once loading has started",
            ));
        }
        if state.ready_state == ReadyState::Opened && !state.asynchronous {
            return Err(XhrError::InvalidAccess(
                "responseType cannot be set for synchronous requests",
            ));
        }
        match ResponseType::parse(value) {
            Some(response_type) => state.response_type = response_type,
            None => log::debug!("Ignoring unknown responseType '{}'", value),
        }
        Ok(())
    }

    /// Timeout in milliseconds, 0 for none
    pub fn timeout(&self) -> u32 {
        self.inner.borrow().timeout
    }

    pub fn set_timeout(&self, millis: u32) -> Result<()> {
        let mut state = self.inner.borrow_mut();
        if state.ready_state != ReadyState::Unsent && !state.asynchronous {
            return Err(XhrError::InvalidAccess(
                "timeout cannot be set for synchronous requests",
            ));
        }
        state.timeout = millis;
        Ok(())
    }

    pub fn with_credentials(&self) -> bool {
        self.inner.borrow().with_credentials
    }

    pub fn set_with_credentials(&self, value: bool) -> Result<()> {
        let mut state = self.inner.borrow_mut();
        if state.ready_state > ReadyState::Opened || state.send_flag {
            return Err(XhrError::InvalidState(
                "withCredentials can only be set before send()",
            ));
        }
        state.with_credentials = value;
        Ok(())
    }

    /// `open(method, url)`: asynchronous, no credentials
    pub fn open(&self, method: &str, url: &str) -> Result<()> {
        self.open_with(method, url, true, None, None)
    }

    /// `open(method, url, async, user, password)`
    pub fn open_with(
        &self,
        method: &str,
        url: &str,
        asynchronous: bool,
        user: Option<&str>,
        password: Option<&str>,
    ) -> Result<()> {
        if !HeaderPolicy::is_valid_token(method) {
            return Err(XhrError::Syntax(format!("'{}' is not a valid method", method)));
        }
        if HeaderPolicy::is_forbidden_method(method) {
            log::warn!("Ignoring open() with forbidden method {}", method);
            return Ok(());
        }
        let method = HeaderPolicy::normalize_method(method);
        let mut url = self.resolve_url(url)?;
        if user.is_some() || password.is_some() {
            apply_credentials(&mut url, user, password);
        }

        {
            let state = self.inner.borrow();
            if !asynchronous && (state.timeout != 0 || state.response_type != ResponseType::Default)
            {
                return Err(XhrError::InvalidAccess(
                    "synchronous requests cannot have a timeout or responseType",
                ));
            }
        }

        // An in-flight cycle ends with abort + loadend before the new one opens
        let previous = self.inner.borrow().cycle;
        if let Some(cycle) = previous {
            log::debug!("open() terminates in-flight cycle {}", cycle);
            self.terminate_cycle(cycle, None, "abort");
        }

        {
            let mut state = self.inner.borrow_mut();
            state.generation += 1;
            state.method = method;
            state.url = Some(url);
            state.asynchronous = asynchronous;
            state.request_headers.clear();
            state.send_flag = false;
            state.upload_complete = false;
            state.upload_events = false;
            state.upload_length = 0;
            state.clear_response();
        }
        self.change_state(ReadyState::Opened);
        Ok(())
    }

    /// Add a request header; repeated names are combined with `", "`
    pub fn set_request_header(&self, name: &str, value: &str) -> Result<()> {
        let mut state = self.inner.borrow_mut();
        if state.ready_state != ReadyState::Opened || state.send_flag {
            return Err(XhrError::InvalidState(
                "setRequestHeader() requires OPENED and no pending send()",
            ));
        }
        let value = HeaderPolicy::normalize_header_value(value);
        if !HeaderPolicy::is_valid_token(name) {
            return Err(XhrError::Syntax(format!("'{}' is not a valid header name", name)));
        }
        if !HeaderPolicy::is_valid_header_value(value) {
            return Err(XhrError::Syntax(format!("invalid value for header '{}'", name)));
        }
        if !HeaderPolicy::is_authorized_header(name) {
            log::debug!("Dropping forbidden request header {}", name);
            return Ok(());
        }
        state.request_headers.combine(name, value);
        Ok(())
    }

    /// Override the response MIME type; unparsable values become
    /// `application/octet-stream`
    pub fn override_mime_type(&self, mime: &str) -> Result<()> {
        let mut state = self.inner.borrow_mut();
        if state.ready_state >= ReadyState::Loading {
            return Err(XhrError::InvalidState(
                "overrideMimeType() cannot be called once loading has started",
            ));
        }
        let parsed = MimeType::parse(mime).or_else(|| MimeType::parse("application/octet-stream"));
        state.override_mime = parsed;
        Ok(())
    }

    /// Start the cycle opened by `open()`
    pub fn send(&self, body: Option<RequestBody>) -> Result<()> {
        let (request, generation) = {
            let mut state = self.inner.borrow_mut();
            if state.ready_state != ReadyState::Opened || state.send_flag {
                return Err(XhrError::InvalidState(
                    "send() requires OPENED and no pending send()",
                ));
            }
            let Some(url) = state.url.clone() else {
                return Err(XhrError::InvalidState("send() called before open()"));
            };

            let body = if state.method == "GET" || state.method == "HEAD" {
                None
            } else {
                body
            };
            let mut headers = state.request_headers.clone();
            if matches!(body, Some(RequestBody::Text(_))) && !headers.contains("content-type") {
                headers.append("Content-Type", "text/plain;charset=UTF-8");
            }
            let body = body.map(RequestBody::into_bytes);

            state.upload_length = body.as_ref().map_or(0, |b| b.len() as u64);
            state.upload_events = state.upload_length > 0;
            state.upload_complete = state.upload_length == 0;
            state.send_flag = true;
            state.clear_response();

            let request = NetworkRequest {
                method: state.method.clone(),
                url,
                headers,
                body,
                asynchronous: state.asynchronous,
                timeout: (state.timeout > 0).then(|| Duration::from_millis(state.timeout.into())),
                with_credentials: state.with_credentials,
            };
            (request, state.generation)
        };

        log::debug!(
            "send() {} {} ({})",
            request.method,
            request.url,
            if request.asynchronous { "async" } else { "sync" }
        );

        let cycle = CycleId::next();
        self.inner.borrow_mut().cycle = Some(cycle);

        self.fire_progress("loadstart", Progress::new(0, None));
        let upload_events = self.inner.borrow().upload_events;
        if upload_events {
            let length = self.inner.borrow().upload_length;
            self.upload.fire("loadstart", Progress::new(0, Some(length)));
        }
        if !self.is_current(cycle, generation) {
            return Ok(());
        }

        if request.asynchronous {
            self.dispatch_async(cycle, request);
        } else {
            self.dispatch_sync(cycle, request);
        }
        Ok(())
    }

    /// Cancel the in-flight cycle, if any
    pub fn abort(&self) {
        let (cycle, ready_state) = {
            let state = self.inner.borrow();
            (state.cycle, state.ready_state)
        };
        let Some(cycle) = cycle else {
            return;
        };
        let target = if ready_state < ReadyState::HeadersReceived {
            ReadyState::Unsent
        } else {
            ReadyState::Done
        };
        log::debug!("abort() cycle {}", cycle);
        self.terminate_cycle(cycle, Some(target), "abort");
    }

    /// A response header, `None` before headers arrive
    pub fn get_response_header(&self, name: &str) -> Option<String> {
        if !HeaderPolicy::is_exposed_response_header(name) {
            return None;
        }
        self.inner
            .borrow()
            .response
            .as_ref()
            .and_then(|r| r.headers.get(name))
    }

    /// All exposed response headers as `name: value\r\n` lines sorted by name
    pub fn get_all_response_headers(&self) -> String {
        let state = self.inner.borrow();
        let Some(response) = state.response.as_ref() else {
            return String::new();
        };
        response
            .headers
            .sorted_combined()
            .into_iter()
            .filter(|(name, _)| HeaderPolicy::is_exposed_response_header(name))
            .map(|(name, value)| format!("{}: {}\r\n", name, value))
            .collect()
    }

    /// Decoded body; empty before LOADING
    pub fn response_text(&self) -> Result<String> {
        let mut state = self.inner.borrow_mut();
        if !state.response_type.allows_text() {
            return Err(XhrError::InvalidState(
                "responseText requires responseType '' or 'text'",
            ));
        }
        if state.ready_state < ReadyState::Loading {
            return Ok(String::new());
        }
        if let Some(text) = &state.text_cache {
            return Ok(text.clone());
        }
        let text = state.interpreter().text(&state.body);
        if state.ready_state == ReadyState::Done {
            state.text_cache = Some(text.clone());
        }
        Ok(text)
    }

    /// Parsed document; `None` until DONE or when the body is not one
    pub fn response_xml(&self) -> Result<Option<Document>> {
        let mut state = self.inner.borrow_mut();
        if !state.response_type.allows_document() {
            return Err(XhrError::InvalidState(
                "responseXML requires responseType '' or 'document'",
            ));
        }
        if state.ready_state != ReadyState::Done || state.response.is_none() {
            return Ok(None);
        }
        if let Some(cached) = &state.document_cache {
            return Ok(cached.clone());
        }
        let document = state.interpreter().document(&state.body, self.context.parser());
        state.document_cache = Some(document.clone());
        Ok(document)
    }

    /// The `response` property for the current `responseType`
    pub fn response(&self) -> Option<ResponseValue> {
        let response_type = self.response_type();
        if response_type.allows_text() {
            return self.response_text().ok().map(ResponseValue::Text);
        }
        if response_type == ResponseType::Document {
            return self.response_xml().ok().flatten().map(ResponseValue::Document);
        }
        let state = self.inner.borrow();
        if state.ready_state != ReadyState::Done || state.response.is_none() {
            return None;
        }
        state.interpreter().value(&state.body, self.context.parser())
    }

    pub fn add_event_listener(
        &self,
        event_type: &str,
        listener: EventListener<Self>,
        use_capture: bool,
    ) {
        self.inner
            .borrow_mut()
            .dispatcher
            .add_listener(event_type, listener, use_capture);
    }

    pub fn remove_event_listener(
        &self,
        event_type: &str,
        listener: &EventListener<Self>,
        use_capture: bool,
    ) {
        self.inner
            .borrow_mut()
            .dispatcher
            .remove_listener(event_type, listener, use_capture);
    }

    /// Assign an `on<event>` handler by event type
    pub fn set_event_handler(&self, event_type: &str, handler: Option<EventListener<Self>>) {
        self.inner
            .borrow_mut()
            .dispatcher
            .set_handler(event_type, handler);
    }

    pub fn event_handler(&self, event_type: &str) -> Option<EventListener<Self>> {
        self.inner.borrow().dispatcher.handler(event_type)
    }

    pub fn set_onreadystatechange(&self, handler: Option<EventListener<Self>>) {
        self.set_event_handler("readystatechange", handler);
    }

    pub fn set_onloadstart(&self, handler: Option<EventListener<Self>>) {
        self.set_event_handler("loadstart", handler);
    }

    pub fn set_onprogress(&self, handler: Option<EventListener<Self>>) {
        self.set_event_handler("progress", handler);
    }

    pub fn set_onload(&self, handler: Option<EventListener<Self>>) {
        self.set_event_handler("load", handler);
    }

    pub fn set_onerror(&self, handler: Option<EventListener<Self>>) {
        self.set_event_handler("error", handler);
    }

    pub fn set_onabort(&self, handler: Option<EventListener<Self>>) {
        self.set_event_handler("abort", handler);
    }

    pub fn set_ontimeout(&self, handler: Option<EventListener<Self>>) {
        self.set_event_handler("timeout", handler);
    }

    pub fn set_onloadend(&self, handler: Option<EventListener<Self>>) {
        self.set_event_handler("loadend", handler);
    }

    /// Apply one network event to the cycle it belongs to
    ///
    /// Events for a cycle that is no longer current are dropped.
    pub fn process_network_event(&self, cycle: CycleId, event: NetworkEvent) {
        let generation = {
            let state = self.inner.borrow();
            if state.cycle != Some(cycle) {
                log::trace!("Ignoring event for stale cycle {}", cycle);
                return;
            }
            state.generation
        };
        match event {
            NetworkEvent::Head(head) => self.handle_head(cycle, generation, head),
            NetworkEvent::Chunk(bytes) => self.handle_chunk(cycle, generation, bytes),
            NetworkEvent::Complete => self.handle_complete(cycle, generation),
            NetworkEvent::Failed(error) => self.handle_failure(cycle, error),
        }
    }

    fn resolve_url(&self, url: &str) -> Result<Url> {
        let base = Url::parse(&self.context.config().base_url).ok();
        Url::options()
            .base_url(base.as_ref())
            .parse(url)
            .map_err(|e| XhrError::Syntax(format!("invalid URL '{}': {}", url, e)))
    }

    fn dispatch_async(&self, cycle: CycleId, request: NetworkRequest) {
        let event_loop = self.context.event_loop();
        let cancel = CancelFlag::new();

        let target = CycleTarget::new(self);
        event_loop.register_cycle(
            cycle,
            cancel.clone(),
            Rc::new(move |event: NetworkEvent| match target.upgrade() {
                Some(xhr) => xhr.process_network_event(cycle, event),
                None => log::trace!("Context gone, dropping event for cycle {}", cycle),
            }),
        );

        let timeout = request.timeout;
        event_loop.spawn_network(cycle, self.context.executor(), request, cancel);

        if let Some(timeout) = timeout {
            let target = CycleTarget::new(self);
            let timer = event_loop.set_timeout(timeout, move || {
                if let Some(xhr) = target.upgrade() {
                    xhr.handle_timeout(cycle);
                }
            });
            self.inner.borrow_mut().timer = Some(timer);
        }
    }

    fn dispatch_sync(&self, cycle: CycleId, request: NetworkRequest) {
        let mut sink = BufferedSink::new();
        self.context.executor().execute(&request, &mut sink);
        for event in sink.into_events() {
            self.process_network_event(cycle, event);
        }
    }

    fn handle_timeout(&self, cycle: CycleId) {
        if self.inner.borrow().cycle != Some(cycle) {
            return;
        }
        self.inner.borrow_mut().timer = None;
        log::debug!("Cycle {} timed out", cycle);
        self.handle_failure(cycle, NetworkError::Timeout);
    }

    fn handle_head(&self, cycle: CycleId, generation: u64, head: ResponseHead) {
        {
            let mut state = self.inner.borrow_mut();
            if state.response.is_some() {
                drop(state);
                self.handle_failure(
                    cycle,
                    NetworkError::Protocol("response head delivered twice".to_string()),
                );
                return;
            }
            log::debug!("Cycle {} received {} {}", cycle, head.status, head.status_text);
            state.response = Some(head);
        }

        self.complete_upload();
        if !self.is_current(cycle, generation) {
            return;
        }
        self.change_state(ReadyState::HeadersReceived);
    }

    fn handle_chunk(&self, cycle: CycleId, generation: u64, bytes: Vec<u8>) {
        let first = {
            let state = self.inner.borrow();
            if state.response.is_none() {
                drop(state);
                self.handle_failure(
                    cycle,
                    NetworkError::Protocol("body data before response head".to_string()),
                );
                return;
            }
            state.ready_state == ReadyState::HeadersReceived
        };
        log::trace!("Cycle {} received {} bytes", cycle, bytes.len());

        {
            let mut state = self.inner.borrow_mut();
            state.body.extend_from_slice(&bytes);
            state.text_cache = None;
        }
        if first {
            self.change_state(ReadyState::Loading);
            if !self.is_current(cycle, generation) {
                return;
            }
        }
        let progress = self.inner.borrow().progress();
        self.fire_progress("progress", progress);
    }

    fn handle_complete(&self, cycle: CycleId, generation: u64) {
        let ready_state = {
            let state = self.inner.borrow();
            if state.response.is_none() {
                drop(state);
                self.handle_failure(
                    cycle,
                    NetworkError::Protocol("response completed without a head".to_string()),
                );
                return;
            }
            state.ready_state
        };

        // LOADING is observable even for an empty body
        if ready_state == ReadyState::HeadersReceived {
            self.change_state(ReadyState::Loading);
            if !self.is_current(cycle, generation) {
                return;
            }
        }

        self.finish_cycle(cycle);
        let progress = self.inner.borrow().progress();
        log::debug!("Cycle {} done, {} bytes", cycle, progress.loaded);

        self.change_state(ReadyState::Done);
        if self.inner.borrow().generation != generation {
            return;
        }
        self.fire_progress("load", progress);
        if self.inner.borrow().generation != generation {
            return;
        }
        self.fire_progress("loadend", progress);
    }

    fn handle_failure(&self, cycle: CycleId, error: NetworkError) {
        let event_type = if error.is_timeout() { "timeout" } else { "error" };
        log::warn!("Cycle {} failed: {}", cycle, error);
        self.terminate_cycle(cycle, Some(ReadyState::Done), event_type);
    }

    /// Tear down a cycle: move to `target` with a `readystatechange` (or
    /// stay put when `None`), then fire `event_type` and `loadend` on the
    /// upload and on the request
    fn terminate_cycle(&self, cycle: CycleId, target: Option<ReadyState>, event_type: &str) {
        let generation = {
            let mut state = self.inner.borrow_mut();
            state.clear_response();
            state.generation
        };
        self.finish_cycle(cycle);

        if let Some(target) = target {
            self.change_state(target);
            if self.inner.borrow().generation != generation {
                return;
            }
        }

        let pending_upload = {
            let mut state = self.inner.borrow_mut();
            let pending = !state.upload_complete && state.upload_events;
            state.upload_complete = true;
            pending
        };
        if pending_upload {
            self.upload.fire(event_type, Progress::new(0, None));
            self.upload.fire("loadend", Progress::new(0, None));
        }

        self.fire_progress(event_type, Progress::new(0, None));
        if self.inner.borrow().generation != generation {
            return;
        }
        self.fire_progress("loadend", Progress::new(0, None));
    }

    /// Forget the cycle: unregister it, cancel its timer, clear the send flag
    fn finish_cycle(&self, cycle: CycleId) {
        let timer = {
            let mut state = self.inner.borrow_mut();
            if state.cycle == Some(cycle) {
                state.cycle = None;
            }
            state.send_flag = false;
            state.timer.take()
        };
        let event_loop = self.context.event_loop();
        event_loop.unregister_cycle(cycle);
        if let Some(timer) = timer {
            event_loop.clear_timeout(timer);
        }
    }

    fn complete_upload(&self) {
        let pending = {
            let mut state = self.inner.borrow_mut();
            let pending = !state.upload_complete && state.upload_events;
            state.upload_complete = true;
            pending.then_some(state.upload_length)
        };
        if let Some(length) = pending {
            let progress = Progress::new(length, Some(length));
            self.upload.fire("progress", progress);
            self.upload.fire("load", progress);
            self.upload.fire("loadend", progress);
        }
    }

    fn is_current(&self, cycle: CycleId, generation: u64) -> bool {
        let state = self.inner.borrow();
        state.cycle == Some(cycle) && state.generation == generation
    }

    fn change_state(&self, ready_state: ReadyState) {
        self.inner.borrow_mut().ready_state = ready_state;
        log::debug!("readyState -> {}", ready_state);
        self.fire(&Event::new("readystatechange"));
    }

    fn fire_progress(&self, event_type: &str, progress: Progress) {
        self.fire(&Event::progress(event_type, progress));
    }

    fn fire(&self, event: &Event) {
        let listeners = self.inner.borrow().dispatcher.listeners(&event.event_type);
        EventDispatcher::dispatch(listeners, self, event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{MockNetwork, MockResponse, NetworkExecutor, ResponseSink};
    use std::sync::Arc;

    fn setup() -> (Arc<MockNetwork>, ScriptContext) {
        let network = Arc::new(MockNetwork::new());
        let context = ScriptContext::with_executor(network.clone()).unwrap();
        (network, context)
    }

    fn trace(xhr: &XmlHttpRequest) -> Rc<RefCell<Vec<String>>> {
        let log = Rc::new(RefCell::new(Vec::new()));
        for event_type in [
            "readystatechange",
            "loadstart",
            "progress",
            "load",
            "error",
            "abort",
            "timeout",
            "loadend",
        ] {
            let log = Rc::clone(&log);
            xhr.add_event_listener(
                event_type,
                EventListener::new(move |xhr: &XmlHttpRequest, e: &Event| {
                    log.borrow_mut()
                        .push(format!("{}:{}", e.event_type, xhr.ready_state().as_u16()))
                }),
                false,
            );
        }
        log
    }

    #[test]
    fn test_constants() {
        assert_eq!(XmlHttpRequest::UNSENT, ReadyState::Unsent.as_u16());
        assert_eq!(XmlHttpRequest::OPENED, 1);
        assert_eq!(XmlHttpRequest::HEADERS_RECEIVED, 2);
        assert_eq!(XmlHttpRequest::LOADING, 3);
        assert_eq!(XmlHttpRequest::DONE, 4);
    }

    #[test]
    fn test_sync_event_sequence() {
        let (network, context) = setup();
        network.set_default_response(MockResponse::new("<a>b</a>", "text/xml"));
        let xhr = XmlHttpRequest::new(&context);
        let log = trace(&xhr);

        xhr.open_with("GET", "/foo.xml", false, None, None).unwrap();
        xhr.send(None).unwrap();

        assert_eq!(
            *log.borrow(),
            vec![
                "readystatechange:1",
                "loadstart:1",
                "readystatechange:2",
                "readystatechange:3",
                "progress:3",
                "readystatechange:4",
                "load:4",
                "loadend:4",
            ]
        );
        assert_eq!(xhr.status(), 200);
        assert_eq!(xhr.response_text().unwrap(), "<a>b</a>");
    }

    #[test]
    fn test_state_errors() {
        let (_network, context) = setup();
        let xhr = XmlHttpRequest::new(&context);
        assert!(matches!(
            xhr.set_request_header("X-Foo", "bar"),
            Err(XhrError::InvalidState(_))
        ));
        assert!(matches!(xhr.send(None), Err(XhrError::InvalidState(_))));
        assert!(matches!(xhr.open("GE T", "/"), Err(XhrError::Syntax(_))));
        assert!(matches!(xhr.open("GET", "http://[::1"), Err(XhrError::Syntax(_))));
    }

    #[test]
    fn test_method_normalization_and_forbidden_methods() {
        let (network, context) = setup();
        network.set_default_response(MockResponse::new("ok", "text/plain"));
        let xhr = XmlHttpRequest::new(&context);

        xhr.open("TRACE", "/foo").unwrap();
        assert_eq!(xhr.ready_state(), ReadyState::Unsent);

        xhr.open_with("post", "/foo", false, None, None).unwrap();
        xhr.send(Some("x=1".into())).unwrap();
        let request = network.last_request().unwrap();
        assert_eq!(request.method, "POST");
        assert_eq!(request.url.as_str(), "http://localhost/foo");
        assert_eq!(
            request.headers.get("content-type").as_deref(),
            Some("text/plain;charset=UTF-8")
        );
        assert_eq!(request.body.as_deref(), Some(&b"x=1"[..]));
    }

    #[test]
    fn test_headers_combined_and_forbidden_dropped() {
        let (network, context) = setup();
        network.set_default_response(MockResponse::new("ok", "text/plain"));
        let xhr = XmlHttpRequest::new(&context);
        xhr.open_with("GET", "/foo", false, None, None).unwrap();
        xhr.set_request_header("X-Test", "a").unwrap();
        xhr.set_request_header("x-test", " b ").unwrap();
        xhr.set_request_header("Cookie", "c=1").unwrap();
        xhr.set_request_header("Sec-Fetch-Mode", "cors").unwrap();
        assert!(matches!(
            xhr.set_request_header("Bad Name", "v"),
            Err(XhrError::Syntax(_))
        ));
        xhr.send(Some("dropped".into())).unwrap();

        let request = network.last_request().unwrap();
        assert_eq!(request.headers.get("X-Test").as_deref(), Some("a, b"));
        assert!(!request.headers.contains("cookie"));
        assert!(!request.headers.contains("sec-fetch-mode"));
        assert!(request.body.is_none());
    }

    #[test]
    fn test_sync_restrictions() {
        let (_network, context) = setup();
        let xhr = XmlHttpRequest::new(&context);
        xhr.set_timeout(100).unwrap();
        assert!(matches!(
            xhr.open_with("GET", "/", false, None, None),
            Err(XhrError::InvalidAccess(_))
        ));

        let xhr = XmlHttpRequest::new(&context);
        xhr.open_with("GET", "/", false, None, None).unwrap();
        assert!(matches!(xhr.set_timeout(5), Err(XhrError::InvalidAccess(_))));
        assert!(matches!(
            xhr.set_response_type("json"),
            Err(XhrError::InvalidAccess(_))
        ));
    }

    #[test]
    fn test_credentials_in_url() {
        let (network, context) = setup();
        network.set_default_response(MockResponse::new("", "text/plain"));
        let xhr = XmlHttpRequest::new(&context);
        xhr.open_with("GET", "/private", false, Some("user"), Some("secret"))
            .unwrap();
        xhr.send(None).unwrap();
        let request = network.last_request().unwrap();
        assert_eq!(request.url.username(), "user");
        assert_eq!(request.url.password(), Some("secret"));
    }

    #[test]
    fn test_timeout_and_credentials_reach_executor() {
        let (network, context) = setup();
        network.set_default_response(MockResponse::new("ok", "text/plain"));
        let xhr = XmlHttpRequest::new(&context);
        xhr.open("GET", "/data").unwrap();
        xhr.set_timeout(250).unwrap();
        xhr.set_with_credentials(true).unwrap();
        xhr.send(None).unwrap();
        context.run_until_idle();

        let request = network.last_request().unwrap();
        assert_eq!(request.timeout, Some(Duration::from_millis(250)));
        assert!(request.with_credentials);

        xhr.set_timeout(0).unwrap();
        xhr.open_with("GET", "/data", false, None, None).unwrap();
        assert!(matches!(xhr.set_timeout(10), Err(XhrError::InvalidAccess(_))));
    }

    #[test]
    fn test_credentials_ignored_without_host() {
        let (network, context) = setup();
        network.set_default_response(MockResponse::new("hi", "text/plain"));
        let xhr = XmlHttpRequest::new(&context);
        xhr.open_with("GET", "data:text/plain,hi", false, Some("user"), Some("secret"))
            .unwrap();
        xhr.send(None).unwrap();
        let request = network.last_request().unwrap();
        assert_eq!(request.url.as_str(), "data:text/plain,hi");
        assert_eq!(request.url.username(), "");
        assert_eq!(request.url.password(), None);

        let mut url = Url::parse("file:///tmp/data.xml").unwrap();
        apply_credentials(&mut url, Some("user"), None);
        assert_eq!(url.as_str(), "file:///tmp/data.xml");
    }

    #[test]
    fn test_response_headers() {
        let (network, context) = setup();
        network.set_default_response(
            MockResponse::new("ok", "text/plain")
                .header("X-Multi", "1")
                .header("x-multi", "2")
                .header("Set-Cookie", "id=1"),
        );
        let xhr = XmlHttpRequest::new(&context);
        assert_eq!(xhr.get_response_header("content-type"), None);
        xhr.open_with("GET", "/h", false, None, None).unwrap();
        assert_eq!(xhr.get_response_header("content-type"), None);
        xhr.send(None).unwrap();

        assert_eq!(xhr.get_response_header("X-MULTI").as_deref(), Some("1, 2"));
        assert_eq!(xhr.get_response_header("set-cookie"), None);
        assert_eq!(
            xhr.get_all_response_headers(),
            "content-type: text/plain\r\nx-multi: 1, 2\r\n"
        );
    }

    #[test]
    fn test_network_failure_sync() {
        let (network, context) = setup();
        network.set_default_response(MockResponse::failure(NetworkError::DnsResolution(
            "this.doesnt.exist".into(),
        )));
        let xhr = XmlHttpRequest::new(&context);
        let log = trace(&xhr);
        xhr.open_with("GET", "http://this.doesnt.exist/foo.xml", false, None, None)
            .unwrap();
        assert!(xhr.send(Some("".into())).is_ok());

        assert_eq!(xhr.ready_state(), ReadyState::Done);
        assert_eq!(xhr.status(), 0);
        assert_eq!(xhr.response_xml().unwrap(), None);
        assert_eq!(
            log.borrow()[2..],
            ["readystatechange:4", "error:4", "loadend:4"]
        );
    }

    #[test]
    fn test_response_type_gates_accessors() {
        let (network, context) = setup();
        network.set_default_response(MockResponse::new(r#"{"a":1}"#, "application/json"));
        let xhr = XmlHttpRequest::new(&context);
        xhr.open("GET", "/data.json").unwrap();
        xhr.set_response_type("json").unwrap();
        xhr.set_response_type("bogus").unwrap();
        assert_eq!(xhr.response_type(), ResponseType::Json);
        xhr.send(None).unwrap();
        context.run_until_idle();

        assert!(matches!(xhr.response_text(), Err(XhrError::InvalidState(_))));
        assert!(matches!(xhr.response_xml(), Err(XhrError::InvalidState(_))));
        assert_eq!(
            xhr.response(),
            Some(ResponseValue::Json(serde_json::json!({"a": 1})))
        );
        assert!(matches!(
            xhr.set_response_type("text"),
            Err(XhrError::InvalidState(_))
        ));
    }

    /// Sleeps, then reports whether the sink still accepted the head
    struct SlowExecutor {
        delay: Duration,
        accepted: std::sync::Mutex<std::sync::mpsc::Sender<bool>>,
    }

    impl NetworkExecutor for SlowExecutor {
        fn execute(&self, _request: &NetworkRequest, sink: &mut dyn ResponseSink) {
            std::thread::sleep(self.delay);
            let accepted = sink.deliver(NetworkEvent::Head(ResponseHead::new(200, HeaderList::new())));
            if let Ok(sender) = self.accepted.lock() {
                let _ = sender.send(accepted);
            }
        }
    }

    #[test]
    fn test_dropping_context_cancels_in_flight_cycle() {
        let (sender, receiver) = std::sync::mpsc::channel();
        let executor = Arc::new(SlowExecutor {
            delay: Duration::from_millis(100),
            accepted: std::sync::Mutex::new(sender),
        });
        let context = ScriptContext::with_executor(executor).unwrap();
        let weak = context.downgrade();
        let xhr = XmlHttpRequest::new(&context);
        xhr.open("GET", "/slow").unwrap();
        xhr.set_timeout(5_000).unwrap();
        xhr.send(None).unwrap();

        drop(xhr);
        drop(context);
        assert!(weak.upgrade().is_none());

        let accepted = receiver.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(!accepted);
    }
}
