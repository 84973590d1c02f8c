//! # gpio-keys Edge Source
//!
//! Reads limit-switch edges from a Linux `gpio-keys` input device.
//!
//! The switches are wired active-low with pull-ups, so closing a switch is
//! a falling edge, which gpio-keys reports as a key press (value 1).
//! Releases and autorepeat are ignored.

use evdev::{Device, EventType, InputEvent};
use tracing::{debug, info};

use super::{EdgeDispatcher, LimitSwitch};
use crate::config::LimitsConfig;
use crate::error::{FlapError, Result};

/// Key press value reported by evdev
const KEY_PRESSED: i32 = 1;

/// Key codes assigned to each switch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyMap {
    pub open_key: u16,
    pub close_key: u16,
}

impl KeyMap {
    pub fn from_config(config: &LimitsConfig) -> Self {
        Self {
            open_key: config.open_key,
            close_key: config.close_key,
        }
    }

    /// Switch whose falling edge this event represents, if any
    pub fn edge_for(&self, event: &InputEvent) -> Option<LimitSwitch> {
        if event.event_type() != EventType::KEY || event.value() != KEY_PRESSED {
            return None;
        }

        match event.code() {
            code if code == self.open_key => Some(LimitSwitch::Open),
            code if code == self.close_key => Some(LimitSwitch::Close),
            _ => None,
        }
    }
}

/// Routes input events to the limit interrupt they represent
#[derive(Debug)]
pub struct EdgeRouter {
    keymap: KeyMap,
    dispatcher: EdgeDispatcher,
}

impl EdgeRouter {
    pub fn new(keymap: KeyMap, dispatcher: EdgeDispatcher) -> Self {
        Self { keymap, dispatcher }
    }

    /// Trigger the dispatcher for every switch press in `events`
    ///
    /// Returns the number of edges dispatched.
    pub fn dispatch(&self, events: impl IntoIterator<Item = InputEvent>) -> usize {
        let mut edges = 0;
        for event in events {
            if let Some(switch) = self.keymap.edge_for(&event) {
                debug!("Edge on {} limit (key {})", switch, event.code());
                self.dispatcher.trigger(switch);
                edges += 1;
            }
        }
        edges
    }
}

/// Blocking reader that turns gpio-keys presses into limit interrupts
pub struct GpioKeysEdgeSource {
    device: Device,
    device_path: String,
    router: EdgeRouter,
}

impl GpioKeysEdgeSource {
    /// Open the configured input device
    ///
    /// # Errors
    ///
    /// Returns `LimitSwitch` error if the device cannot be opened
    pub fn open(config: &LimitsConfig, dispatcher: EdgeDispatcher) -> Result<Self> {
        let device = Device::open(&config.device_path).map_err(|e| {
            FlapError::LimitSwitch(format!("Failed to open {}: {}", config.device_path, e))
        })?;

        info!(
            "Limit switches on {} ({})",
            config.device_path,
            device.name().unwrap_or("unnamed device")
        );

        Ok(Self {
            device,
            device_path: config.device_path.clone(),
            router: EdgeRouter::new(KeyMap::from_config(config), dispatcher),
        })
    }

    /// Dispatch edges until the device goes away
    ///
    /// Blocks the calling thread; run it through
    /// [`spawn_edge_source`](super::spawn_edge_source).
    ///
    /// # Errors
    ///
    /// Returns `LimitSwitch` error when reading from the device fails
    pub fn run(mut self) -> Result<()> {
        loop {
            let events = self.device.fetch_events().map_err(|e| {
                FlapError::LimitSwitch(format!("Failed to read {}: {}", self.device_path, e))
            })?;
            self.router.dispatch(events);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::pwm::mocks::SimulatedPwm;
    use crate::actuator::{Actuator, ServoLimits, SERVO_REST};
    use crate::limits::{LimitSwitchHandler, PendingFlags};
    use std::sync::Arc;

    fn keymap() -> KeyMap {
        KeyMap::from_config(&LimitsConfig::default())
    }

    fn key(code: u16, value: i32) -> InputEvent {
        InputEvent::new(EventType::KEY, code, value)
    }

    #[test]
    fn test_press_maps_to_switch() {
        let keymap = keymap();
        assert_eq!(keymap.edge_for(&key(59, 1)), Some(LimitSwitch::Open));
        assert_eq!(keymap.edge_for(&key(60, 1)), Some(LimitSwitch::Close));
    }

    #[test]
    fn test_release_and_repeat_ignored() {
        let keymap = keymap();
        assert_eq!(keymap.edge_for(&key(59, 0)), None);
        assert_eq!(keymap.edge_for(&key(59, 2)), None);
    }

    #[test]
    fn test_other_keys_and_events_ignored() {
        let keymap = keymap();
        assert_eq!(keymap.edge_for(&key(30, 1)), None);
        assert_eq!(keymap.edge_for(&InputEvent::new(EventType::SYNCHRONIZATION, 0, 0)), None);
        assert_eq!(keymap.edge_for(&InputEvent::new(EventType::SWITCH, 59, 1)), None);
    }

    fn router() -> (EdgeRouter, Arc<Actuator<SimulatedPwm>>, Arc<PendingFlags>) {
        let actuator = Arc::new(Actuator::new(SimulatedPwm::new(), ServoLimits::default()).unwrap());
        let pending = Arc::new(PendingFlags::new());
        let mut dispatcher = EdgeDispatcher::new(Arc::clone(&pending));
        LimitSwitchHandler::new(Arc::clone(&actuator), Arc::clone(&pending)).attach(&mut dispatcher);
        (EdgeRouter::new(keymap(), dispatcher), actuator, pending)
    }

    #[test]
    fn test_event_stream_stops_flap() {
        let (router, actuator, _pending) = router();

        actuator.drive_close();
        let noise = [key(30, 1), key(60, 0), InputEvent::new(EventType::SYNCHRONIZATION, 0, 0)];
        assert_eq!(router.dispatch(noise), 0);
        assert_eq!(actuator.duty(), 3650);

        assert_eq!(router.dispatch([key(60, 1)]), 1);
        assert_eq!(actuator.duty(), SERVO_REST);
    }

    #[test]
    fn test_dispatch_counts_each_press() {
        let (router, actuator, pending) = router();

        actuator.drive_open();
        let batch = [
            key(59, 1),
            InputEvent::new(EventType::SYNCHRONIZATION, 0, 0),
            key(59, 0),
            key(60, 1),
        ];
        assert_eq!(router.dispatch(batch), 2);
        assert_eq!(actuator.duty(), SERVO_REST);
        assert!(!pending.is_pending(LimitSwitch::Open));
        assert!(!pending.is_pending(LimitSwitch::Close));
    }

    #[test]
    fn test_open_missing_device() {
        let config = LimitsConfig {
            device_path: "/dev/input/nonexistent-gpio-keys".to_string(),
            ..LimitsConfig::default()
        };
        let dispatcher = EdgeDispatcher::new(Arc::new(PendingFlags::new()));

        let result = GpioKeysEdgeSource::open(&config, dispatcher);
        assert!(matches!(result, Err(FlapError::LimitSwitch(_))));
    }

    #[test]
    #[ignore] // Needs the gpio-keys device: cargo test -- --ignored
    fn test_open_real_gpio_keys() {
        let dispatcher = EdgeDispatcher::new(Arc::new(PendingFlags::new()));
        match GpioKeysEdgeSource::open(&LimitsConfig::default(), dispatcher) {
            Ok(_) => println!("Opened {}", LimitsConfig::default().device_path),
            Err(e) => println!("No gpio-keys device: {}", e),
        }
    }
}
