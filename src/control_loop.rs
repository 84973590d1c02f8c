//! # Control Loop
//!
//! One iteration: poll the receiver, interpret any packet, act on it.
//! The loop never blocks on the link; limit-switch edges are handled on
//! their own thread and only ever force the actuator to rest.
//!
//! Link read failures are logged once when the link goes down and once
//! when it recovers, not on every tick.

use std::future::Future;
use std::sync::Arc;

use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{info, warn};

use crate::actuator::pwm::PwmOutput;
use crate::actuator::Actuator;
use crate::command::{interpret, Action, CommandInterpreter};
use crate::link::receiver::{PacketReceiver, ReceiverStats};
use crate::transport::Transport;

/// Main-loop state: the link, its receiver and the command interpreter
pub struct ControlLoop<T: Transport, P: PwmOutput> {
    transport: T,
    receiver: PacketReceiver,
    interpreter: CommandInterpreter<P>,
    link_healthy: bool,
}

impl<T: Transport, P: PwmOutput> ControlLoop<T, P> {
    pub fn new(transport: T, actuator: Arc<Actuator<P>>) -> Self {
        Self {
            transport,
            receiver: PacketReceiver::new(),
            interpreter: CommandInterpreter::new(actuator),
            link_healthy: true,
        }
    }

    /// Run a single loop iteration
    ///
    /// Returns the action taken, if a packet was ready. Link errors are
    /// logged and swallowed so the loop keeps running. A failed reply still
    /// reports the action, since the actuator has already moved.
    pub fn poll_once(&mut self) -> Option<Action> {
        let packet = match self.receiver.poll(&mut self.transport) {
            Ok(packet) => {
                if !self.link_healthy {
                    info!("Link read recovered");
                    self.link_healthy = true;
                }
                packet?
            }
            Err(e) => {
                if self.link_healthy {
                    warn!("Link read failed: {}", e);
                    self.link_healthy = false;
                }
                return None;
            }
        };

        let action = interpret(&packet);
        if let Err(e) = self.interpreter.execute(&action, &mut self.transport) {
            warn!("Failed to reply to {:?}: {}", packet, e);
        }
        Some(action)
    }

    /// Whether the last link read succeeded
    pub fn link_healthy(&self) -> bool {
        self.link_healthy
    }

    /// Poll every `period` until `shutdown` resolves, then park the flap
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use flap_bridge::control_loop::ControlLoop;
    /// # async fn demo(control: ControlLoop<flap_bridge::transport::SerialTransport, flap_bridge::actuator::pwm::SysfsPwm>) {
    /// control
    ///     .run(std::time::Duration::from_millis(1), async {
    ///         let _ = tokio::signal::ctrl_c().await;
    ///     })
    ///     .await;
    /// # }
    /// ```
    pub async fn run<F>(mut self, period: Duration, shutdown: F) -> ReceiverStats
    where
        F: Future<Output = ()>,
    {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        info!("Control loop running (poll every {:?})", period);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.poll_once();
                }

                _ = &mut shutdown => {
                    info!("Shutdown requested, stopping flap");
                    break;
                }
            }
        }

        self.interpreter.actuator().rest();

        let stats = self.receiver.stats();
        info!(
            "Frames received: {}, dropped: {}",
            stats.frames_received, stats.frames_dropped
        );
        stats
    }

}
