//! XMLHttpRequest implementation
//!
//! - [`XmlHttpRequest`]: the request state machine exposed to script
//! - [`ResponseInterpreter`]: text / document / JSON views of the body
//! - [`CharsetResolver`]: override > `Content-Type` > UTF-8 charset choice
//! - [`EventDispatcher`]: handler slots plus ordered listener lists

pub mod charset;
pub mod events;
pub mod mime;
mod request;
pub mod response;
mod state;
mod upload;

pub use charset::{Charset, CharsetResolver, CharsetSource};
pub use events::{Event, EventDispatcher, EventListener, Progress};
pub use mime::MimeType;
pub use request::{RequestBody, XmlHttpRequest};
pub use response::{ResponseInterpreter, ResponseType, ResponseValue};
pub use state::ReadyState;
pub use upload::XmlHttpRequestUpload;
