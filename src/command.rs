//! # Command Interpreter
//!
//! Maps received packets onto flap commands.
//!
//! | Payload | Action | Reply |
//! |---------|--------|-------|
//! | `"O"` | run open | `[FLAP] open!` |
//! | `"C"` | run closed | `[FLAP] close!` |
//! | anything else | none | `<source>, <destination>, <payload>` |
//!
//! Tokens are matched with C `strncmp(payload, token, 5) == 0` semantics:
//! the payload is read as a NUL-terminated string and only its first five
//! bytes take part. Deployed hosts pad commands with NULs (`"O\0\0\0\0"`),
//! and that padding must keep matching.

use std::borrow::Cow;
use std::sync::Arc;

use tracing::{debug, info};

use crate::actuator::pwm::PwmOutput;
use crate::actuator::Actuator;
use crate::error::Result;
use crate::link::protocol::Packet;
use crate::transport::Transport;

/// Open command token
pub const CMD_OPEN: &[u8] = b"O";

/// Close command token
pub const CMD_CLOSE: &[u8] = b"C";

/// Number of leading bytes compared against a token
pub const CMD_PREFIX_LEN: usize = 5;

/// Reply written after an open command
pub const ACK_OPEN: &str = "[FLAP] open!\n";

/// Reply written after a close command
pub const ACK_CLOSE: &str = "[FLAP] close!\n";

/// Outcome of interpreting a packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    DriveOpen,
    DriveClose,
    /// Diagnostic line for an unrecognized payload
    Echo(String),
}

/// Bytes up to the first NUL, as a C string reader would see them
fn c_str(bytes: &[u8]) -> &[u8] {
    match bytes.iter().position(|&b| b == 0) {
        Some(end) => &bytes[..end],
        None => bytes,
    }
}

/// `strncmp(payload, token, CMD_PREFIX_LEN) == 0`
pub fn matches_token(payload: &[u8], token: &[u8]) -> bool {
    let window = |bytes: &[u8]| -> Vec<u8> {
        c_str(bytes).iter().take(CMD_PREFIX_LEN).copied().collect()
    };
    window(payload) == window(token)
}

/// Diagnostic line for a packet that carries no known command
pub fn echo_line(packet: &Packet) -> String {
    let payload: Cow<'_, str> = String::from_utf8_lossy(c_str(packet.payload()));
    format!(
        "{}, {}, {}\n",
        packet.source as char, packet.destination as char, payload
    )
}

/// Decide what a packet asks for. Pure: no side effects.
///
/// # Examples
///
/// ```
/// use flap_bridge::command::{interpret, Action};
/// use flap_bridge::link::protocol::Packet;
///
/// let open = Packet::new(b'N', b'F', b"O\0\0\0\0")?;
/// assert_eq!(interpret(&open), Action::DriveOpen);
///
/// let other = Packet::new(b'A', b'B', b"XYZ")?;
/// assert_eq!(interpret(&other), Action::Echo("A, B, XYZ\n".to_string()));
/// # Ok::<(), flap_bridge::error::FlapError>(())
/// ```
pub fn interpret(packet: &Packet) -> Action {
    let payload = packet.payload();

    if matches_token(payload, CMD_OPEN) {
        Action::DriveOpen
    } else if matches_token(payload, CMD_CLOSE) {
        Action::DriveClose
    } else {
        Action::Echo(echo_line(packet))
    }
}

/// Executes interpreted commands against the actuator
pub struct CommandInterpreter<P: PwmOutput> {
    actuator: Arc<Actuator<P>>,
}

impl<P: PwmOutput> CommandInterpreter<P> {
    pub fn new(actuator: Arc<Actuator<P>>) -> Self {
        Self { actuator }
    }

    /// Interpret `packet` and carry out the resulting action
    pub fn handle<T: Transport + ?Sized>(&self, packet: &Packet, transport: &mut T) -> Result<Action> {
        let action = interpret(packet);
        self.execute(&action, transport)?;
        Ok(action)
    }

    /// Apply an action: move the flap and acknowledge, or echo the diagnostic
    ///
    /// The actuator is commanded before the reply is written, so a failed
    /// write never loses a command.
    pub fn execute<T: Transport + ?Sized>(&self, action: &Action, transport: &mut T) -> Result<()> {
        match action {
            Action::DriveOpen => {
                let duty = self.actuator.drive_open();
                info!("Open command, duty {}", duty);
                transport.write(ACK_OPEN.as_bytes())
            }
            Action::DriveClose => {
                let duty = self.actuator.drive_close();
                info!("Close command, duty {}", duty);
                transport.write(ACK_CLOSE.as_bytes())
            }
            Action::Echo(line) => {
                debug!("Unrecognized payload, echoing: {}", line.trim_end());
                transport.write(line.as_bytes())
            }
        }
    }

    pub fn actuator(&self) -> &Arc<Actuator<P>> {
        &self.actuator
    }
}
