//! # Limit Switch Module
//!
//! End-of-travel switches that stop the flap asynchronously.
//!
//! Each switch edge is delivered as an "interrupt": a pending flag is
//! raised and the registered handler runs in the edge source's context,
//! concurrently with the control loop. Both switches share one handler,
//! parameterized by [`LimitSwitch`]; it clears the pending flag and forces
//! the actuator to rest. Forcing rest is an unconditional write, so the
//! two switches commute and need no locking against each other.
//!
//! The edge source runs on its own thread via [`spawn_edge_source`]. If it
//! ever stops, the flap is parked and the returned receiver fires so the
//! control loop can shut down instead of driving without limits.

pub mod gpio_keys;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use tokio::sync::oneshot;
use tracing::{error, warn};

use crate::actuator::pwm::PwmOutput;
use crate::actuator::Actuator;
use crate::error::Result;

/// Name of the edge source thread
pub const EDGE_THREAD_NAME: &str = "limit-switches";

/// Which end of travel a switch guards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LimitSwitch {
    Open,
    Close,
}

impl LimitSwitch {
    pub const ALL: [LimitSwitch; 2] = [LimitSwitch::Open, LimitSwitch::Close];

    fn index(self) -> usize {
        match self {
            LimitSwitch::Open => 0,
            LimitSwitch::Close => 1,
        }
    }
}

impl fmt::Display for LimitSwitch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LimitSwitch::Open => write!(f, "open"),
            LimitSwitch::Close => write!(f, "close"),
        }
    }
}

/// Callback run when a switch edge fires
pub type EdgeHandler = Box<dyn Fn(LimitSwitch) + Send + Sync>;

/// Edge-interrupt registration, as offered by an interrupt controller
pub trait InterruptController {
    /// Bind `handler` to edges from `switch`, replacing any previous handler
    fn register_handler(&mut self, switch: LimitSwitch, handler: EdgeHandler);

    /// Acknowledge a pending edge. Safe to call when nothing is pending.
    fn clear_pending(&self, switch: LimitSwitch);
}

/// Interrupt-pending flags, one per switch
#[derive(Debug, Default)]
pub struct PendingFlags {
    flags: [AtomicBool; 2],
}

impl PendingFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self, switch: LimitSwitch) {
        self.flags[switch.index()].store(true, Ordering::Release);
    }

    pub fn clear(&self, switch: LimitSwitch) {
        self.flags[switch.index()].store(false, Ordering::Release);
    }

    pub fn is_pending(&self, switch: LimitSwitch) -> bool {
        self.flags[switch.index()].load(Ordering::Acquire)
    }
}

/// Software interrupt controller: latches edges and dispatches handlers
pub struct EdgeDispatcher {
    pending: Arc<PendingFlags>,
    handlers: [Option<EdgeHandler>; 2],
}

impl fmt::Debug for EdgeDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EdgeDispatcher")
            .field("pending", &self.pending)
            .field("open_handler", &self.handlers[0].is_some())
            .field("close_handler", &self.handlers[1].is_some())
            .finish()
    }
}

impl EdgeDispatcher {
    pub fn new(pending: Arc<PendingFlags>) -> Self {
        Self {
            pending,
            handlers: [None, None],
        }
    }

    /// Latch an edge from `switch` and run its handler, if one is registered
    ///
    /// Without a handler the flag stays pending.
    pub fn trigger(&self, switch: LimitSwitch) {
        self.pending.raise(switch);
        if let Some(handler) = &self.handlers[switch.index()] {
            handler(switch);
        }
    }

    pub fn pending(&self) -> &Arc<PendingFlags> {
        &self.pending
    }
}

impl InterruptController for EdgeDispatcher {
    fn register_handler(&mut self, switch: LimitSwitch, handler: EdgeHandler) {
        self.handlers[switch.index()] = Some(handler);
    }

    fn clear_pending(&self, switch: LimitSwitch) {
        self.pending.clear(switch);
    }
}

/// The limit-stop handler shared by both switches
pub struct LimitSwitchHandler<P: PwmOutput> {
    actuator: Arc<Actuator<P>>,
    pending: Arc<PendingFlags>,
}

impl<P: PwmOutput> Clone for LimitSwitchHandler<P> {
    fn clone(&self) -> Self {
        Self {
            actuator: Arc::clone(&self.actuator),
            pending: Arc::clone(&self.pending),
        }
    }
}

impl<P: PwmOutput + 'static> LimitSwitchHandler<P> {
    pub fn new(actuator: Arc<Actuator<P>>, pending: Arc<PendingFlags>) -> Self {
        Self { actuator, pending }
    }

    /// Acknowledge the edge and stop the flap
    ///
    /// Never reads the current duty; the write is unconditional.
    pub fn on_falling_edge(&self, switch: LimitSwitch) -> u16 {
        self.pending.clear(switch);
        let duty = self.actuator.rest();
        warn!("Limit switch '{}' reached, flap stopped", switch);
        duty
    }

    /// Boxed callback for [`InterruptController::register_handler`]
    pub fn edge_handler(&self) -> EdgeHandler {
        let handler = self.clone();
        Box::new(move |switch| {
            handler.on_falling_edge(switch);
        })
    }

    /// Register this handler for both switches
    pub fn attach<C: InterruptController>(&self, controller: &mut C) {
        for switch in LimitSwitch::ALL {
            controller.register_handler(switch, self.edge_handler());
        }
    }
}

/// Run a blocking edge source on a dedicated thread
///
/// When `run` returns, for any reason, the flap is forced to rest and the
/// returned receiver resolves. Pass it to the control loop as (part of) its
/// shutdown signal.
///
/// # Errors
///
/// Returns the I/O error if the thread cannot be spawned
pub fn spawn_edge_source<P, F>(actuator: Arc<Actuator<P>>, run: F) -> std::io::Result<oneshot::Receiver<()>>
where
    P: PwmOutput + 'static,
    F: FnOnce() -> Result<()> + Send + 'static,
{
    let (stopped_tx, stopped_rx) = oneshot::channel();

    thread::Builder::new()
        .name(EDGE_THREAD_NAME.to_string())
        .spawn(move || {
            match run() {
                Ok(()) => warn!("Limit switch input ended"),
                Err(e) => error!("Limit switch input stopped: {}", e),
            }
            let duty = actuator.rest();
            warn!("Flap parked at duty {} without limit protection", duty);
            // The loop may already be gone
            let _ = stopped_tx.send(());
        })?;

    Ok(stopped_rx)
}
