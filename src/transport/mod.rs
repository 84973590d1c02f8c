//! # Transport Module
//!
//! Byte-stream shim over the USB CDC serial device.
//!
//! The transport knows nothing about framing: it reports how many bytes
//! are waiting, reads them without blocking, and writes replies back.

use std::io::{Read, Write};
use std::time::Duration;

use tokio_serial::SerialPort;
use tracing::{debug, info, warn};

use crate::config::SerialConfig;
use crate::error::{FlapError, Result};

/// Pollable byte transport used by the control loop
pub trait Transport: Send {
    /// Number of bytes that can be read right now without blocking
    fn bytes_available(&mut self) -> Result<usize>;

    /// Read up to `buf.len()` bytes. Only called for bytes already available.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Write all of `data` to the link
    fn write(&mut self, data: &[u8]) -> Result<()>;
}

/// Fallback device paths (USB CDC first, then USB-serial adapters)
const DEFAULT_DEVICE_PATHS: &[&str] = &["/dev/ttyACM0", "/dev/ttyUSB0"];

/// Serial transport over a USB CDC (virtual COM) device
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
    device_path: String,
}

impl std::fmt::Debug for SerialTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialTransport")
            .field("device_path", &self.device_path)
            .finish_non_exhaustive()
    }
}

impl SerialTransport {
    /// Open the configured port, falling back to the default device paths
    ///
    /// # Errors
    ///
    /// Returns `SerialPortNotFound` if none of the candidate paths can be opened
    pub fn open(config: &SerialConfig) -> Result<Self> {
        let mut paths: Vec<&str> = vec![config.port.as_str()];
        paths.extend(DEFAULT_DEVICE_PATHS.iter().filter(|p| **p != config.port));

        Self::open_with_paths(&paths, config.baud_rate, Duration::from_millis(config.timeout_ms))
    }

    /// Try each path in order and keep the first one that opens
    pub fn open_with_paths(paths: &[&str], baud_rate: u32, timeout: Duration) -> Result<Self> {
        for path in paths {
            debug!("Trying to open serial port: {}", path);

            match Self::open_port(path, baud_rate, timeout) {
                Ok(port) => {
                    info!("Opened flap link at {} ({} baud)", path, baud_rate);
                    return Ok(Self {
                        port,
                        device_path: path.to_string(),
                    });
                }
                Err(e) => {
                    warn!("Failed to open {}: {}", path, e);
                }
            }
        }

        Err(FlapError::SerialPortNotFound(paths.join(", ")))
    }

    fn open_port(path: &str, baud_rate: u32, timeout: Duration) -> Result<Box<dyn SerialPort>> {
        tokio_serial::new(path, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .timeout(timeout)
            .open()
            .map_err(|e| FlapError::Serial(format!("Failed to open {}: {}", path, e)))
    }

    pub fn device_path(&self) -> &str {
        &self.device_path
    }
}

impl Transport for SerialTransport {
    fn bytes_available(&mut self) -> Result<usize> {
        self.port
            .bytes_to_read()
            .map(|n| n as usize)
            .map_err(|e| FlapError::Serial(format!("Failed to query input queue: {}", e)))
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self.port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(FlapError::Serial(format!("Failed to read: {}", e))),
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<()> {
        self.port
            .write_all(data)
            .map_err(|e| FlapError::Serial(format!("Failed to write: {}", e)))?;
        self.port
            .flush()
            .map_err(|e| FlapError::Serial(format!("Failed to flush: {}", e)))?;

        debug!("Wrote {} bytes to link", data.len());
        Ok(())
    }
}

#[cfg(test)]
pub mod mocks {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// In-memory transport. Clones share the same buffers, so a test can
    /// keep a handle while the control loop owns another.
    #[derive(Clone, Default)]
    pub struct MockTransport {
        pub rx: Arc<Mutex<VecDeque<u8>>>,
        pub tx: Arc<Mutex<Vec<u8>>>,
        pub read_error: Arc<Mutex<bool>>,
        pub write_error: Arc<Mutex<bool>>,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self::default()
        }

        /// Queue bytes as if they had arrived from the host
        pub fn feed(&self, data: &[u8]) {
            self.rx.lock().unwrap().extend(data.iter().copied());
        }

        pub fn written(&self) -> Vec<u8> {
            self.tx.lock().unwrap().clone()
        }

        pub fn written_str(&self) -> String {
            String::from_utf8_lossy(&self.written()).into_owned()
        }

        pub fn pending_rx(&self) -> usize {
            self.rx.lock().unwrap().len()
        }

        pub fn set_read_error(&self, fail: bool) {
            *self.read_error.lock().unwrap() = fail;
        }

        pub fn set_write_error(&self, fail: bool) {
            *self.write_error.lock().unwrap() = fail;
        }
    }

    impl Transport for MockTransport {
        fn bytes_available(&mut self) -> Result<usize> {
            if *self.read_error.lock().unwrap() {
                return Err(FlapError::Serial("Mock read error".to_string()));
            }
            Ok(self.rx.lock().unwrap().len())
        }

        fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
            let mut rx = self.rx.lock().unwrap();
            let n = buf.len().min(rx.len());
            for (slot, byte) in buf.iter_mut().zip(rx.drain(..n)) {
                *slot = byte;
            }
            Ok(n)
        }

        fn write(&mut self, data: &[u8]) -> Result<()> {
            if *self.write_error.lock().unwrap() {
                return Err(FlapError::Serial("Mock write error".to_string()));
            }
            self.tx.lock().unwrap().extend_from_slice(data);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mocks::MockTransport;
    use super::*;

    #[test]
    fn test_default_device_paths() {
        assert_eq!(DEFAULT_DEVICE_PATHS, &["/dev/ttyACM0", "/dev/ttyUSB0"]);
    }

    #[test]
    fn test_open_with_invalid_paths_returns_error() {
        let paths = &["/dev/nonexistent0", "/dev/nonexistent1"];
        let result = SerialTransport::open_with_paths(paths, 9600, Duration::from_millis(10));

        match result {
            Err(FlapError::SerialPortNotFound(msg)) => {
                assert!(msg.contains("/dev/nonexistent0"));
                assert!(msg.contains("/dev/nonexistent1"));
            }
            other => panic!("Expected SerialPortNotFound, got: {:?}", other),
        }
    }

    #[test]
    fn test_open_with_empty_paths_returns_error() {
        let result = SerialTransport::open_with_paths(&[], 9600, Duration::from_millis(10));
        assert!(matches!(result, Err(FlapError::SerialPortNotFound(_))));
    }

    #[test]
    fn test_mock_transport_reads_only_available() {
        let mut transport = MockTransport::new();
        transport.feed(b"abcdef");

        let mut buf = [0u8; 4];
        assert_eq!(transport.bytes_available().unwrap(), 6);
        assert_eq!(transport.read(&mut buf).unwrap(), 4);
        assert_eq!(&buf, b"abcd");
        assert_eq!(transport.bytes_available().unwrap(), 2);
    }

    #[test]
    #[ignore] // Needs the flap board attached: cargo test -- --ignored
    fn test_open_with_real_hardware() {
        match SerialTransport::open(&SerialConfig::default()) {
            Ok(transport) => println!("Opened flap link at {}", transport.device_path()),
            Err(e) => println!("No flap board detected: {}", e),
        }
    }
}
