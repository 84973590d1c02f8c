//! # PWM Output
//!
//! The peripheral side of the actuator: a PWM channel that can be given a
//! period and a duty value, both in timer ticks.
//!
//! On Linux boards the channel is driven through the sysfs PWM class
//! (`/sys/class/pwm/pwmchipN/pwmM`), which works in nanoseconds; ticks are
//! converted with a fixed tick length.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::config::PwmConfig;
use crate::error::{FlapError, Result};

/// PWM peripheral primitives
///
/// `set_duty` takes `&self` so it can be called from the limit-switch
/// context while the control loop holds its own reference.
#[cfg_attr(test, mockall::automock)]
pub trait PwmOutput: Send + Sync {
    /// Program the period (in ticks) and enable the output
    fn configure(&mut self, period: u16) -> Result<()>;

    /// Write the duty value (in ticks). Callers pass already-clamped values.
    fn set_duty(&self, duty: u16);
}

/// PWM channel exposed through Linux sysfs
#[derive(Debug)]
pub struct SysfsPwm {
    channel_dir: PathBuf,
    tick_ns: u64,
}

impl SysfsPwm {
    /// Open (exporting if needed) a sysfs PWM channel
    ///
    /// # Errors
    ///
    /// Returns `Pwm` error if the chip does not exist or the channel cannot be exported
    pub fn open(config: &PwmConfig) -> Result<Self> {
        Self::open_at(Path::new(&config.chip), config.channel, config.tick_ns)
    }

    pub fn open_at(chip: &Path, channel: u32, tick_ns: u64) -> Result<Self> {
        if !chip.is_dir() {
            return Err(FlapError::Pwm(format!("PWM chip {} not found", chip.display())));
        }

        let channel_dir = chip.join(format!("pwm{}", channel));
        if !channel_dir.is_dir() {
            debug!("Exporting PWM channel {} on {}", channel, chip.display());
            fs::write(chip.join("export"), channel.to_string()).map_err(|e| {
                FlapError::Pwm(format!("Failed to export channel {}: {}", channel, e))
            })?;
        }

        info!("Using PWM channel at {}", channel_dir.display());
        Ok(Self { channel_dir, tick_ns })
    }

    fn ticks_to_ns(&self, ticks: u16) -> u64 {
        ticks as u64 * self.tick_ns
    }

    fn write_attr(&self, name: &str, value: u64) -> io::Result<()> {
        fs::write(self.channel_dir.join(name), value.to_string())
    }
}

impl PwmOutput for SysfsPwm {
    fn configure(&mut self, period: u16) -> Result<()> {
        let period_ns = self.ticks_to_ns(period);

        // The kernel rejects a period shorter than the current duty cycle
        self.write_attr("duty_cycle", 0)
            .and_then(|_| self.write_attr("period", period_ns))
            .and_then(|_| self.write_attr("enable", 1))
            .map_err(|e| FlapError::Pwm(format!("Failed to configure period: {}", e)))?;

        info!("PWM period set to {} ticks ({} ns)", period, period_ns);
        Ok(())
    }

    fn set_duty(&self, duty: u16) {
        if let Err(e) = self.write_attr("duty_cycle", self.ticks_to_ns(duty)) {
            warn!("Failed to write duty {}: {}", duty, e);
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn read_attr(dir: &Path, name: &str) -> String {
        fs::read_to_string(dir.join(name)).unwrap()
    }

    #[test]
    fn test_open_missing_chip() {
        let result = SysfsPwm::open_at(Path::new("/nonexistent/pwmchip9"), 0, 400);
        assert!(matches!(result, Err(FlapError::Pwm(_))));
    }

    #[test]
    fn test_open_exports_channel() {
        let chip = tempdir().unwrap();
        // A plain directory accepts the export write but never creates pwm1
        let pwm = SysfsPwm::open_at(chip.path(), 1, 400).unwrap();

        assert_eq!(read_attr(chip.path(), "export"), "1");
        assert_eq!(pwm.channel_dir, chip.path().join("pwm1"));
    }

    #[test]
    fn test_configure_and_set_duty_in_nanoseconds() {
        let chip = tempdir().unwrap();
        let channel = chip.path().join("pwm0");
        fs::create_dir(&channel).unwrap();

        let mut pwm = SysfsPwm::open_at(chip.path(), 0, 400).unwrap();
        pwm.configure(50000).unwrap();

        // 50000 ticks * 400 ns = 20 ms
        assert_eq!(read_attr(&channel, "period"), "20000000");
        assert_eq!(read_attr(&channel, "enable"), "1");

        pwm.set_duty(3750);
        // 1.5 ms pulse
        assert_eq!(read_attr(&channel, "duty_cycle"), "1500000");
    }

    #[test]
    fn test_set_duty_failure_is_not_fatal() {
        let pwm = SysfsPwm {
            channel_dir: PathBuf::from("/nonexistent/pwm0"),
            tick_ns: 400,
        };
        pwm.set_duty(2000);
    }
}
