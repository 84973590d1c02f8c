//! # Actuator Module
//!
//! Servo flap control through a single clamped duty value.
//!
//! The flap servo is driven as a velocity command: `REST` holds still,
//! `REST + RUN_OFFSET` runs it open, `REST - RUN_OFFSET` runs it closed.
//! Motion continues until a new command arrives or a limit switch forces
//! rest; there is no internal timer.
//!
//! The duty value is an atomic so the limit-switch handlers can force rest
//! while the control loop is mid-command, without locking.

pub mod pwm;

use std::sync::atomic::{AtomicU16, Ordering};

use tracing::debug;

use crate::error::Result;
use pwm::PwmOutput;

/// PWM period in ticks (20 ms at 400 ns per tick)
pub const SERVO_PERIOD: u16 = 50000;

/// Lowest allowed duty (1000 us pulse)
pub const SERVO_MIN: u16 = 2000;

/// Neutral duty, servo stopped (1500 us pulse)
pub const SERVO_REST: u16 = 3750;

/// Highest allowed duty (2000 us pulse)
pub const SERVO_MAX: u16 = 5000;

/// Offset from rest used for open/close runs
pub const SERVO_RUN_OFFSET: u16 = 100;

/// Duty-cycle bounds for the servo, in PWM ticks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServoLimits {
    pub period: u16,
    pub min: u16,
    pub rest: u16,
    pub max: u16,
    pub run_offset: u16,
}

impl Default for ServoLimits {
    fn default() -> Self {
        Self {
            period: SERVO_PERIOD,
            min: SERVO_MIN,
            rest: SERVO_REST,
            max: SERVO_MAX,
            run_offset: SERVO_RUN_OFFSET,
        }
    }
}

impl ServoLimits {
    /// Clamp any requested duty into `[min, max]`
    pub fn clamp(&self, duty: i32) -> u16 {
        duty.clamp(self.min as i32, self.max as i32) as u16
    }

    pub fn open_duty(&self) -> i32 {
        self.rest as i32 + self.run_offset as i32
    }

    pub fn close_duty(&self) -> i32 {
        self.rest as i32 - self.run_offset as i32
    }
}

/// Flap actuator owning the PWM channel and its duty value
#[derive(Debug)]
pub struct Actuator<P: PwmOutput> {
    pwm: P,
    limits: ServoLimits,
    duty: AtomicU16,
}

impl<P: PwmOutput> Actuator<P> {
    /// Configure the PWM period and park the servo at rest
    ///
    /// # Errors
    ///
    /// Returns error if the PWM period cannot be programmed
    pub fn new(mut pwm: P, limits: ServoLimits) -> Result<Self> {
        pwm.configure(limits.period)?;

        let actuator = Self {
            pwm,
            limits,
            duty: AtomicU16::new(limits.rest),
        };
        actuator.rest();

        Ok(actuator)
    }

    /// Clamp `duty` into the safe range and write it to the peripheral
    ///
    /// This is the only path to the duty register. Returns the value applied,
    /// e.g. `set_target(1000)` applies 2000 with the default limits.
    pub fn set_target(&self, duty: i32) -> u16 {
        let applied = self.limits.clamp(duty);
        self.duty.store(applied, Ordering::Release);
        self.pwm.set_duty(applied);

        // A limit stop can land between the store and the register write;
        // the newer value wins.
        let latest = self.duty.load(Ordering::Acquire);
        if latest != applied {
            self.pwm.set_duty(latest);
        }

        debug!("Duty set to {} (requested {})", applied, duty);
        applied
    }

    /// Run the flap towards open
    pub fn drive_open(&self) -> u16 {
        self.set_target(self.limits.open_duty())
    }

    /// Run the flap towards closed
    pub fn drive_close(&self) -> u16 {
        self.set_target(self.limits.close_duty())
    }

    /// Stop the flap
    pub fn rest(&self) -> u16 {
        self.set_target(self.limits.rest as i32)
    }

    /// Last duty value written
    pub fn duty(&self) -> u16 {
        self.duty.load(Ordering::Acquire)
    }

    pub fn pwm(&self) -> &P {
        &self.pwm
    }
}

#[cfg(test)]
mod tests {
    use super::pwm::mocks::SimulatedPwm;
    use super::pwm::MockPwmOutput;
    use super::*;
    use crate::error::FlapError;
    use mockall::predicate::eq;

    fn actuator() -> Actuator<SimulatedPwm> {
        Actuator::new(SimulatedPwm::new(), ServoLimits::default()).unwrap()
    }

    #[test]
    fn test_servo_constants() {
        assert_eq!(SERVO_PERIOD, 50000);
        assert_eq!(SERVO_MIN, 2000);
        assert_eq!(SERVO_REST, 3750);
        assert_eq!(SERVO_MAX, 5000);
        assert!(SERVO_MIN < SERVO_REST && SERVO_REST < SERVO_MAX);
    }

    #[test]
    fn test_new_configures_period_and_rests() {
        let actuator = actuator();
        assert_eq!(actuator.pwm().period, Some(SERVO_PERIOD));
        assert_eq!(actuator.pwm().writes(), vec![SERVO_REST]);
        assert_eq!(actuator.duty(), SERVO_REST);
    }

    #[test]
    fn test_set_target_clamps() {
        let actuator = actuator();

        assert_eq!(actuator.set_target(1000), 2000);
        assert_eq!(actuator.pwm().register(), 2000);

        assert_eq!(actuator.set_target(6000), 5000);
        assert_eq!(actuator.pwm().register(), 5000);

        assert_eq!(actuator.set_target(3750), 3750);
        assert_eq!(actuator.pwm().register(), 3750);
    }

    #[test]
    fn test_set_target_extremes() {
        let actuator = actuator();

        assert_eq!(actuator.set_target(i32::MIN), SERVO_MIN);
        assert_eq!(actuator.set_target(i32::MAX), SERVO_MAX);
        assert_eq!(actuator.set_target(-1), SERVO_MIN);
        assert_eq!(actuator.set_target(2000), 2000);
        assert_eq!(actuator.set_target(5000), 5000);
    }

    #[test]
    fn test_register_always_within_range() {
        let actuator = actuator();

        for duty in (-10_000..70_000).step_by(997) {
            actuator.set_target(duty);
            let register = actuator.pwm().register();
            assert!((SERVO_MIN..=SERVO_MAX).contains(&register), "{} escaped for {}", register, duty);
        }
    }

    #[test]
    fn test_drive_open_and_close() {
        let actuator = actuator();

        assert_eq!(actuator.drive_open(), 3850);
        assert_eq!(actuator.duty(), 3850);

        assert_eq!(actuator.drive_close(), 3650);
        assert_eq!(actuator.duty(), 3650);
    }

    #[test]
    fn test_rest_is_idempotent() {
        let actuator = actuator();
        actuator.drive_open();

        let once = actuator.rest();
        let twice = actuator.rest();
        assert_eq!(once, twice);
        assert_eq!(actuator.pwm().register(), SERVO_REST);
    }

    #[test]
    fn test_set_duty_called_once_per_command() {
        let mut pwm = MockPwmOutput::new();
        pwm.expect_configure().with(eq(SERVO_PERIOD)).times(1).returning(|_| Ok(()));
        pwm.expect_set_duty().with(eq(SERVO_REST)).times(1).return_const(());
        pwm.expect_set_duty().with(eq(SERVO_MIN)).times(1).return_const(());

        let actuator = Actuator::new(pwm, ServoLimits::default()).unwrap();
        actuator.set_target(0);
    }

    #[test]
    fn test_configure_failure_propagates() {
        let mut pwm = MockPwmOutput::new();
        pwm.expect_configure()
            .returning(|_| Err(FlapError::Pwm("no such chip".to_string())));
        pwm.expect_set_duty().never();

        let result = Actuator::new(pwm, ServoLimits::default());
        assert!(matches!(result, Err(FlapError::Pwm(_))));
    }

    #[test]
    fn test_custom_limits() {
        let limits = ServoLimits {
            period: 40000,
            min: 1000,
            rest: 3000,
            max: 4000,
            run_offset: 500,
        };
        let actuator = Actuator::new(SimulatedPwm::new(), limits).unwrap();

        assert_eq!(actuator.duty(), 3000);
        assert_eq!(actuator.drive_open(), 3500);
        assert_eq!(actuator.drive_close(), 2500);
        assert_eq!(actuator.set_target(9000), 4000);
    }
}
