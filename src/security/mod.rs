//! Security policy for script-issued requests
//!
//! Forbidden request headers, forbidden methods and response headers that
//! must stay hidden from script.

mod headers;

pub use headers::HeaderPolicy;
