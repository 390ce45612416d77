//! Core terminal control components.
//!
//! This module contains the device-level logic:
//!
//! - **controller**: discipline get/set, scoped raw/cooked/no-echo, getch, getpass
//! - **mode**: portable discipline descriptor over the native snapshot
//! - **poller**: readiness waits and unread byte counts
//! - **platform**: termios and Windows console strategies
//! - **stream**: byte stream with a user-space unread buffer
//!
//! # Architecture
//!
//! ```text
//! TerminalController
//! ├── BufferedStream<File> (device handle + unread bytes)
//! └── Discipline (Termios | Console | Detached, probed once)
//!     └── NativeMode <-> ModeDescriptor
//! ```

pub mod controller;
pub mod error;
pub mod mode;
pub mod platform;
pub mod poller;
pub mod stream;
