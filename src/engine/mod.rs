//! Script execution context for request objects
//!
//! A [`ScriptContext`] plays the part of a page's scripting environment:
//! - an [`EventLoop`] on which every callback runs
//! - the [`NetworkExecutor`] requests are issued through
//! - the [`DocumentParser`] used for `responseXML`
//! - the [`EngineConfig`] (base URL, worker pool size, ...)

mod config;
mod event_loop;

pub use config::EngineConfig;
pub use event_loop::{CycleHandler, CycleId, EventLoop, Task, TimerId};

use std::rc::{Rc, Weak};
use std::sync::Arc;

use crate::network::{HttpExecutor, NetworkExecutor};
use crate::renderer::{DefaultDocumentParser, DocumentParser};
use crate::utils::EngineError;

struct ContextInner {
    config: EngineConfig,
    executor: Arc<dyn NetworkExecutor>,
    parser: Box<dyn DocumentParser>,
    event_loop: EventLoop,
}

/// Shared handle to one single-threaded scripting environment
#[derive(Clone)]
pub struct ScriptContext {
    inner: Rc<ContextInner>,
}

impl ScriptContext {
    /// Create a context from its parts
    pub fn new(
        config: EngineConfig,
        executor: Arc<dyn NetworkExecutor>,
        parser: Box<dyn DocumentParser>,
    ) -> Result<Self, EngineError> {
        let event_loop = EventLoop::new(&config)?;
        Ok(Self {
            inner: Rc::new(ContextInner {
                config,
                executor,
                parser,
                event_loop,
            }),
        })
    }

    /// Default config and parsers around a custom executor
    pub fn with_executor(executor: Arc<dyn NetworkExecutor>) -> Result<Self, EngineError> {
        Self::new(
            EngineConfig::default(),
            executor,
            Box::new(DefaultDocumentParser::new()),
        )
    }

    /// Context issuing real HTTP requests
    pub fn http(config: EngineConfig) -> Result<Self, EngineError> {
        let executor = HttpExecutor::new((&config).into())?;
        Self::new(config, Arc::new(executor), Box::new(DefaultDocumentParser::new()))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn executor(&self) -> Arc<dyn NetworkExecutor> {
        Arc::clone(&self.inner.executor)
    }

    pub fn parser(&self) -> &dyn DocumentParser {
        self.inner.parser.as_ref()
    }

    pub fn event_loop(&self) -> &EventLoop {
        &self.inner.event_loop
    }

    /// Drive the event loop until all work has settled
    pub fn run_until_idle(&self) {
        self.inner.event_loop.run_until_idle();
    }

    /// Non-owning handle, for callbacks stored inside the event loop itself
    pub fn downgrade(&self) -> WeakScriptContext {
        WeakScriptContext {
            inner: Rc::downgrade(&self.inner),
        }
    }
}

/// Weak counterpart of [`ScriptContext`]
#[derive(Clone)]
pub struct WeakScriptContext {
    inner: Weak<ContextInner>,
}

impl WeakScriptContext {
    /// The context, if it is still alive
    pub fn upgrade(&self) -> Option<ScriptContext> {
        self.inner.upgrade().map(|inner| ScriptContext { inner })
    }
}
