//! Network layer for XMLHttpRequest cycles
//!
//! The state machine only sees the [`NetworkExecutor`] trait. Two executors
//! ship with the crate:
//! - [`HttpExecutor`]: real HTTP over `reqwest`
//! - [`MockNetwork`]: scripted responses for tests and offline pages

mod client;
mod executor;
mod headers;
pub mod mock;

pub use client::{HttpExecutor, HttpExecutorConfig};
pub use executor::{
    BufferedSink, CancelFlag, NetworkEvent, NetworkExecutor, NetworkRequest, ResponseHead,
    ResponseSink, reason_phrase,
};
pub use headers::HeaderList;
pub use mock::{MockNetwork, MockResponse};
