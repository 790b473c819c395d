//! Response text decoding: charset precedence and overrideMimeType

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use binix_xhr::{
    Event, EventListener, MockNetwork, MockResponse, ReadyState, ScriptContext, XhrError,
    XmlHttpRequest,
};
use encoding_rs::{GBK, UTF_8, WINDOWS_1252};
use pretty_assertions::assert_eq;

fn fetch_text(response: MockResponse, override_mime: Option<&str>) -> String {
    let network = Arc::new(MockNetwork::new());
    network.set_default_response(response);
    let context = ScriptContext::with_executor(network).unwrap();
    let xhr = XmlHttpRequest::new(&context);

    xhr.open_with("GET", "/text", false, None, None).unwrap();
    if let Some(mime) = override_mime {
        xhr.override_mime_type(mime).unwrap();
    }
    xhr.send(None).unwrap();
    xhr.response_text().unwrap()
}

fn utf16_units(text: &str) -> Vec<u16> {
    text.encode_utf16().collect()
}

fn yellow_as_utf8() -> MockResponse {
    MockResponse::with_charset("\u{9EC4}", "text/plain", UTF_8)
}

#[test]
fn test_override_charset_gbk() {
    let text = fetch_text(yellow_as_utf8(), Some("text/plain; charset=GBK"));
    assert_eq!(utf16_units(&text)[0], 27035);
}

#[test]
fn test_override_charset_name_case_insensitive() {
    let text = fetch_text(yellow_as_utf8(), Some("text/plain; chaRSet=GBK"));
    assert_eq!(utf16_units(&text)[0], 27035);

    let text = fetch_text(yellow_as_utf8(), Some("text/plain; charset=gbk"));
    assert_eq!(utf16_units(&text)[0], 27035);
}

#[test]
fn test_override_empty_charset_falls_through() {
    let text = fetch_text(yellow_as_utf8(), Some("text/plain; charset="));
    assert_eq!(utf16_units(&text)[0], 40644);
}

#[test]
fn test_override_unknown_charset_falls_through() {
    let network = Arc::new(MockNetwork::new());
    network.set_default_response(yellow_as_utf8());
    let context = ScriptContext::with_executor(network).unwrap();
    let xhr = XmlHttpRequest::new(&context);
    let events: Rc<RefCell<Vec<String>>> = Rc::default();
    for event_type in ["load", "error", "loadend"] {
        let events = Rc::clone(&events);
        xhr.add_event_listener(
            event_type,
            EventListener::new(move |_: &XmlHttpRequest, e: &Event| {
                events.borrow_mut().push(e.event_type.clone())
            }),
            false,
        );
    }

    xhr.open("GET", "/text").unwrap();
    xhr.override_mime_type("text/plain; charset=abcdefg").unwrap();
    xhr.send(None).unwrap();
    context.run_until_idle();

    assert_eq!(xhr.ready_state(), ReadyState::Done);
    assert_eq!(*events.borrow(), vec!["load", "loadend"]);
    assert_eq!(utf16_units(&xhr.response_text().unwrap())[0], 40644);
}

#[test]
fn test_override_without_charset_keeps_content_type_charset() {
    let text = fetch_text(yellow_as_utf8(), Some("text/plain"));
    assert_eq!(text, "\u{9EC4}");
}

#[test]
fn test_malformed_gbk_sequence_replaced() {
    let response = MockResponse::with_charset("'\u{9EC4}'", "text/plain", UTF_8);
    let text = fetch_text(response, Some("text/plain; charset=GBK"));
    assert_eq!(utf16_units(&text), vec![39, 27035, 65533, 39]);
}

#[test]
fn test_default_encoding_is_utf8() {
    let response = MockResponse::new("ol\u{e9}".as_bytes(), "text/plain");
    assert_eq!(fetch_text(response, None), "ol\u{e9}");
}

#[test]
fn test_content_type_charset_used() {
    let response = MockResponse::with_charset("\u{9EC4}\u{6CB3}", "text/plain", GBK);
    assert_eq!(fetch_text(response, None), "\u{9EC4}\u{6CB3}");

    let response = MockResponse::with_charset("caf\u{e9}", "text/plain", WINDOWS_1252);
    assert_eq!(fetch_text(response, None), "caf\u{e9}");
}

#[test]
fn test_unknown_content_type_charset_defaults_to_utf8() {
    let response = MockResponse::new("ol\u{e9}".as_bytes(), "text/plain; charset=no-such-thing");
    assert_eq!(fetch_text(response, None), "ol\u{e9}");
}

#[test]
fn test_override_beats_content_type() {
    let response = MockResponse::with_charset("\u{9EC4}", "text/plain", GBK);
    let text = fetch_text(response, Some("text/plain; charset=windows-1252"));
    assert_eq!(text.chars().count(), 2);
    assert_ne!(text, "\u{9EC4}");
}

#[test]
fn test_override_mime_type_after_send_throws() {
    let network = Arc::new(MockNetwork::new());
    network.set_default_response(MockResponse::new("<a/>", "text/plain"));
    let context = ScriptContext::with_executor(network).unwrap();
    let xhr = XmlHttpRequest::new(&context);

    xhr.open_with("GET", "/text", false, None, None).unwrap();
    xhr.send(None).unwrap();
    assert!(matches!(
        xhr.override_mime_type("text/xml"),
        Err(XhrError::InvalidState(_))
    ));
}

#[test]
fn test_override_persists_across_open() {
    let network = Arc::new(MockNetwork::new());
    network.set_default_response(yellow_as_utf8());
    let context = ScriptContext::with_executor(network).unwrap();
    let xhr = XmlHttpRequest::new(&context);

    xhr.override_mime_type("text/plain; charset=GBK").unwrap();
    xhr.open_with("GET", "/text", false, None, None).unwrap();
    xhr.send(None).unwrap();
    assert_eq!(utf16_units(&xhr.response_text().unwrap())[0], 27035);
}
