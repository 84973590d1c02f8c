//! # Flap Bridge Library
//!
//! Drive a servo-actuated flap from framed commands on a USB serial link.
//!
//! Packets arrive through the [`transport`], are reassembled and validated by
//! the [`link`] receiver, and are turned into motion by the [`command`]
//! interpreter. The [`actuator`] clamps every duty value to the servo's safe
//! range, and the [`limits`] handlers force it to rest when the flap hits
//! an end stop.

pub mod actuator;
pub mod command;
pub mod config;
pub mod control_loop;
pub mod error;
pub mod limits;
pub mod link;
pub mod transport;
