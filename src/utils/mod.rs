//! Shared utilities and error types

pub mod error;

pub use error::{EngineError, NetworkError, ParseError, Result, XhrError};
