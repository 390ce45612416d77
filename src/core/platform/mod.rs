//! Platform discipline strategy.
//!
//! A device's strategy is probed once, when a controller adopts the handle:
//!
//! - **Termios**: POSIX terminals (`tcgetattr`/`tcsetattr`)
//! - **Console**: Windows console input handles (`GetConsoleMode`)
//! - **Detached**: anything else; every discipline call fails with
//!   `DeviceUnavailable`

#[cfg(unix)]
pub(crate) mod unix;
#[cfg(unix)]
pub(crate) use self::unix as sys;

#[cfg(windows)]
pub(crate) mod windows;
#[cfg(windows)]
pub(crate) use self::windows as sys;

#[cfg(windows)]
use std::cell::Cell;
use std::time::Duration;

use tracing::debug;

use super::error::{Result, TermError};
use super::poller::Interest;

pub use sys::{FlushQueue, NativeMode, RawDevice};

/// Anything that exposes a raw OS handle the platform layer can operate on.
pub trait AsDevice {
    fn as_device(&self) -> RawDevice;
}

#[cfg(unix)]
impl<T: std::os::unix::io::AsRawFd> AsDevice for T {
    fn as_device(&self) -> RawDevice {
        self.as_raw_fd()
    }
}

#[cfg(windows)]
impl<T: std::os::windows::io::AsRawHandle> AsDevice for T {
    fn as_device(&self) -> RawDevice {
        self.as_raw_handle()
    }
}

/// Outcome of a single OS readiness query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PollEvent {
    Ready(Interest),
    Nothing,
    HungUp,
    Invalid,
    /// Error condition pending on the device
    #[cfg_attr(windows, allow(dead_code))]
    Failed,
}

/// How a device's discipline is read and written.
pub(crate) enum Discipline {
    #[cfg(unix)]
    Termios,
    /// VMIN/VTIME of the last applied mode.
    #[cfg(windows)]
    Console(Cell<(u8, u8)>),
    Detached,
}

impl Discipline {
    pub(crate) fn probe(device: RawDevice) -> Self {
        let discipline = if sys::is_terminal(device) {
            Self::native()
        } else {
            Discipline::Detached
        };
        debug!("Discipline strategy for device: {}", discipline.name());
        discipline
    }

    #[cfg(unix)]
    fn native() -> Self {
        Discipline::Termios
    }

    #[cfg(windows)]
    fn native() -> Self {
        Discipline::Console(Cell::new((1, 0)))
    }

    pub(crate) fn name(&self) -> &'static str {
        match self {
            #[cfg(unix)]
            Discipline::Termios => "termios",
            #[cfg(windows)]
            Discipline::Console(_) => "console",
            Discipline::Detached => "detached",
        }
    }

    pub(crate) fn is_terminal(&self) -> bool {
        !matches!(self, Discipline::Detached)
    }

    pub(crate) fn read(&self, device: RawDevice) -> Result<NativeMode> {
        match self {
            #[cfg(unix)]
            Discipline::Termios => {
                sys::get_mode(device).map_err(|e| TermError::from_discipline("tcgetattr", e))
            }
            #[cfg(windows)]
            Discipline::Console(slots) => sys::get_mode(device, slots.get())
                .map_err(|e| TermError::from_discipline("GetConsoleMode", e)),
            Discipline::Detached => Err(Self::detached()),
        }
    }

    pub(crate) fn apply(&self, device: RawDevice, mode: &NativeMode) -> Result<()> {
        match self {
            #[cfg(unix)]
            Discipline::Termios => {
                sys::set_mode(device, mode).map_err(|e| TermError::from_discipline("tcsetattr", e))
            }
            #[cfg(windows)]
            Discipline::Console(slots) => {
                sys::set_mode(device, mode)
                    .map_err(|e| TermError::from_discipline("SetConsoleMode", e))?;
                slots.set((mode.min_bytes(), mode.timeout_tenths()));
                Ok(())
            }
            Discipline::Detached => Err(Self::detached()),
        }
    }

    /// How long a read may wait for its first byte when the device cannot
    /// enforce VMIN/VTIME itself. `None` when the device handles it.
    pub(crate) fn emulated_read_timeout(&self) -> Option<Duration> {
        match self {
            #[cfg(windows)]
            Discipline::Console(slots) => {
                let (vmin, vtime) = slots.get();
                (vmin == 0).then(|| Duration::from_millis(u64::from(vtime) * 100))
            }
            _ => None,
        }
    }

    pub(crate) fn flush(&self, device: RawDevice, queue: FlushQueue) -> Result<()> {
        if !self.is_terminal() {
            return Err(Self::detached());
        }
        sys::flush(device, queue).map_err(|e| TermError::from_discipline("flush", e))
    }

    fn detached() -> TermError {
        TermError::DeviceUnavailable("handle is not a terminal".to_string())
    }
}
