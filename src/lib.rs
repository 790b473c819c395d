//! # Binix XHR - XMLHttpRequest engine
//!
//! A WHATWG-compatible `XMLHttpRequest` for browser-emulation environments,
//! written in Rust.
//!
//! ## Architecture
//!
//! The crate is organized into the following modules:
//!
//! - **xhr**: request state machine, response interpretation, events
//! - **engine**: single-threaded script context with its event loop
//! - **network**: pluggable executors (real HTTP via reqwest, scripted mock)
//! - **renderer**: XML and HTML document parsing for `responseXML`
//! - **security**: forbidden header and method policy
//! - **utils**: shared error types
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use binix_xhr::{MockNetwork, MockResponse, ScriptContext, XmlHttpRequest};
//!
//! let network = Arc::new(MockNetwork::new());
//! network.set_default_response(MockResponse::new("<a>b</a>", "text/xml"));
//! let context = ScriptContext::with_executor(network).unwrap();
//!
//! let xhr = XmlHttpRequest::new(&context);
//! xhr.open("GET", "/foo.xml").unwrap();
//! xhr.send(None).unwrap();
//! context.run_until_idle();
//! assert_eq!(xhr.status(), 200);
//! ```

pub mod engine;
pub mod network;
pub mod renderer;
pub mod security;
pub mod utils;
pub mod xhr;

// Re-export main types for convenience
pub use engine::{EngineConfig, ScriptContext};
pub use network::{HttpExecutor, MockNetwork, MockResponse, NetworkExecutor};
pub use utils::error::{EngineError, NetworkError, ParseError, Result, XhrError};
pub use xhr::{Event, EventListener, ReadyState, RequestBody, ResponseType, XmlHttpRequest};

/// Crate version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = "Binix XHR";
