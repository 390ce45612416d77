//! Screen-facing utilities.
//!
//! - **cursor**: cursor movement, erase and scroll sequences
//! - **size**: window size query/set with environment fallback
//!
//! Both are independent of [`TerminalController`](crate::TerminalController);
//! they accept any writer or device handle.

pub mod cursor;
pub mod size;

pub use cursor::{LineErase, ScreenErase, ScreenOps};
pub use size::{SizeProbe, WindowSize};
