//! # ttyctl
//!
//! Terminal discipline control and stream readiness polling.
//!
//! ## Features
//!
//! - Raw, cooked and no-echo modes with guaranteed restore
//! - Single-key reads (`getch`) and silent password prompts (`getpass`)
//! - Readiness waits with timeouts and signal-interruption policies
//! - Unread byte counts including user-space buffered input
//! - Cursor, erase and scroll control sequences
//! - Window size query with environment fallback
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────┐
//! │  TerminalController                        │
//! │  ├── ModeDescriptor (abstract + native)    │
//! │  ├── Discipline (termios | console)        │
//! │  └── BufferedStream (unread bytes)         │
//! ├────────────────────────────────────────────┤
//! │  ReadinessPoller (any Pollable stream)     │
//! ├────────────────────────────────────────────┤
//! │  ScreenOps        SizeProbe                │
//! └────────────────────────────────────────────┘
//! ```
//!
//! ## Platform Support
//!
//! POSIX systems use termios, `poll(2)` and `ioctl(2)`. Windows uses console
//! modes and wait functions; priority events and resizing are unsupported
//! there.

pub mod config;
pub mod core;
pub mod logging;
pub mod ui;

pub use crate::config::{Config, ConfigError};
pub use crate::core::controller::{ModeGuard, TerminalController};
pub use crate::core::error::{Result, TermError};
pub use crate::core::mode::{ModeDescriptor, RawOptions};
pub use crate::core::platform::AsDevice;
pub use crate::core::poller::{
    timeout_from_secs, Interest, InterruptPolicy, Pollable, Readiness, ReadinessPoller,
};
pub use crate::core::stream::BufferedStream;
pub use crate::ui::{LineErase, ScreenErase, ScreenOps, SizeProbe, WindowSize};
