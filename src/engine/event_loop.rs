//! Single-threaded event loop owning script execution
//!
//! Script-visible callbacks only ever run inside [`EventLoop::run_once`] or
//! [`EventLoop::run_until_idle`] on the thread that owns the loop. Network
//! work for asynchronous requests runs on the tokio blocking pool; every
//! [`NetworkEvent`] it produces is sent back over a channel and queued as a
//! job in arrival order, so deliveries and scheduled tasks share one FIFO.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{Receiver, Sender, channel};
use std::time::{Duration, Instant};

use tokio::runtime::{Builder, Runtime};

use super::config::EngineConfig;
use crate::network::{CancelFlag, NetworkEvent, NetworkExecutor, NetworkRequest, ResponseSink};
use crate::utils::{EngineError, NetworkError};

/// Zero-argument task run on the loop thread
pub type Task = Box<dyn FnOnce()>;

/// Receives the network events of one registered cycle
pub type CycleHandler = Rc<dyn Fn(NetworkEvent)>;

/// Process-wide unique id of one open/send cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CycleId(u64);

impl CycleId {
    /// Allocate the next id
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for CycleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Handle for cancelling a timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

struct Delivery {
    cycle: CycleId,
    event: NetworkEvent,
}

enum Job {
    Task(Task),
    Delivery(Delivery),
}

struct Timer {
    id: TimerId,
    deadline: Instant,
    task: Task,
}

struct CycleEntry {
    cancel: CancelFlag,
    handler: CycleHandler,
}

/// Sink used on worker threads; forwards events to the owning loop
struct ChannelSink {
    cycle: CycleId,
    sender: Sender<Delivery>,
    cancel: CancelFlag,
    finished: bool,
}

impl ResponseSink for ChannelSink {
    fn deliver(&mut self, event: NetworkEvent) -> bool {
        if self.finished || self.cancel.is_cancelled() {
            return false;
        }
        self.finished = event.is_terminal();
        let delivery = Delivery {
            cycle: self.cycle,
            event,
        };
        if self.sender.send(delivery).is_err() {
            // Loop is gone; nobody is listening
            self.finished = true;
            return false;
        }
        !self.finished
    }
}

impl Drop for ChannelSink {
    fn drop(&mut self) {
        if self.finished || self.cancel.is_cancelled() {
            return;
        }
        log::warn!("Executor for cycle {} returned without a terminal event", self.cycle);
        let _ = self.sender.send(Delivery {
            cycle: self.cycle,
            event: NetworkEvent::Failed(NetworkError::Transport(
                "executor finished without completing the response".to_string(),
            )),
        });
    }
}

/// Task queue, timers and in-flight cycle registry for one script context
pub struct EventLoop {
    jobs: RefCell<VecDeque<Job>>,
    timers: RefCell<Vec<Timer>>,
    next_timer: Cell<u64>,
    cycles: RefCell<HashMap<CycleId, CycleEntry>>,
    sender: Sender<Delivery>,
    receiver: Receiver<Delivery>,
    runtime: Option<Runtime>,
}

impl EventLoop {
    /// Create a loop with a worker pool sized from the config
    pub fn new(config: &EngineConfig) -> Result<Self, EngineError> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(config.worker_threads.max(1))
            .thread_name("binix-xhr-worker")
            .enable_all()
            .build()?;
        let (sender, receiver) = channel();

        Ok(Self {
            jobs: RefCell::new(VecDeque::new()),
            timers: RefCell::new(Vec::new()),
            next_timer: Cell::new(1),
            cycles: RefCell::new(HashMap::new()),
            sender,
            receiver,
            runtime: Some(runtime),
        })
    }

    /// Queue a task behind everything already queued
    pub fn schedule(&self, task: impl FnOnce() + 'static) {
        self.jobs.borrow_mut().push_back(Job::Task(Box::new(task)));
    }

    /// Run `task` once `delay` has elapsed
    pub fn set_timeout(&self, delay: Duration, task: impl FnOnce() + 'static) -> TimerId {
        let id = TimerId(self.next_timer.get());
        self.next_timer.set(id.0 + 1);
        self.timers.borrow_mut().push(Timer {
            id,
            deadline: Instant::now() + delay,
            task: Box::new(task),
        });
        id
    }

    /// Cancel a pending timer; unknown ids are ignored
    pub fn clear_timeout(&self, id: TimerId) {
        self.timers.borrow_mut().retain(|t| t.id != id);
    }

    /// Register an in-flight cycle; its deliveries are routed to `handler`
    pub fn register_cycle(&self, cycle: CycleId, cancel: CancelFlag, handler: CycleHandler) {
        log::trace!("Registering cycle {}", cycle);
        self.cycles
            .borrow_mut()
            .insert(cycle, CycleEntry { cancel, handler });
    }

    /// Cancel and forget a cycle; queued deliveries for it become inert
    pub fn unregister_cycle(&self, cycle: CycleId) {
        if let Some(entry) = self.cycles.borrow_mut().remove(&cycle) {
            log::trace!("Unregistering cycle {}", cycle);
            entry.cancel.cancel();
        }
    }

    /// Whether a cycle is still registered
    pub fn is_in_flight(&self, cycle: CycleId) -> bool {
        self.cycles.borrow().contains_key(&cycle)
    }

    /// Number of registered cycles
    pub fn in_flight(&self) -> usize {
        self.cycles.borrow().len()
    }

    /// Run `request` on the worker pool, delivering events for `cycle`
    pub fn spawn_network(
        &self,
        cycle: CycleId,
        executor: Arc<dyn NetworkExecutor>,
        request: NetworkRequest,
        cancel: CancelFlag,
    ) {
        let mut sink = ChannelSink {
            cycle,
            sender: self.sender.clone(),
            cancel,
            finished: false,
        };
        match &self.runtime {
            Some(runtime) => {
                runtime.spawn_blocking(move || executor.execute(&request, &mut sink));
            }
            None => {
                sink.deliver(NetworkEvent::Failed(NetworkError::Transport(
                    "worker runtime is shut down".to_string(),
                )));
            }
        }
    }

    /// Run at most one queued job; returns whether one ran
    pub fn run_once(&self) -> bool {
        self.drain_deliveries();
        let job = self.jobs.borrow_mut().pop_front();
        match job {
            Some(Job::Task(task)) => task(),
            Some(Job::Delivery(delivery)) => self.route(delivery),
            None => return false,
        }
        true
    }

    /// Run tasks, deliveries and timers until nothing is queued, no timer is
    /// pending and no cycle is in flight
    pub fn run_until_idle(&self) {
        loop {
            if self.run_once() || self.fire_due_timer() {
                continue;
            }

            let deadline = self.next_deadline();
            if deadline.is_none() && self.in_flight() == 0 {
                break;
            }

            let received = match deadline {
                Some(deadline) => {
                    let wait = deadline.saturating_duration_since(Instant::now());
                    self.receiver.recv_timeout(wait).ok()
                }
                None => self.receiver.recv().ok(),
            };
            if let Some(delivery) = received {
                self.jobs.borrow_mut().push_back(Job::Delivery(delivery));
            }
        }
    }

    fn drain_deliveries(&self) {
        while let Ok(delivery) = self.receiver.try_recv() {
            self.jobs.borrow_mut().push_back(Job::Delivery(delivery));
        }
    }

    fn route(&self, delivery: Delivery) {
        let Delivery { cycle, event } = delivery;
        let handler = {
            let mut cycles = self.cycles.borrow_mut();
            if event.is_terminal() {
                cycles.remove(&cycle).map(|entry| entry.handler)
            } else {
                cycles.get(&cycle).map(|entry| Rc::clone(&entry.handler))
            }
        };
        match handler {
            Some(handler) => handler(event),
            None => log::trace!("Dropping stale delivery for cycle {}", cycle),
        }
    }

    fn fire_due_timer(&self) -> bool {
        let now = Instant::now();
        let due = {
            let mut timers = self.timers.borrow_mut();
            let idx = timers
                .iter()
                .enumerate()
                .filter(|(_, t)| t.deadline <= now)
                .min_by_key(|(_, t)| t.deadline)
                .map(|(idx, _)| idx);
            idx.map(|idx| timers.remove(idx))
        };
        match due {
            Some(timer) => {
                (timer.task)();
                true
            }
            None => false,
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.timers.borrow().iter().map(|t| t.deadline).min()
    }
}

impl Drop for EventLoop {
    fn drop(&mut self) {
        for entry in self.cycles.get_mut().values() {
            entry.cancel.cancel();
        }
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}
