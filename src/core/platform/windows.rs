//! Windows console backend.
//!
//! Console input modes stand in for termios. The console has no VMIN/VTIME
//! slots, so those two values travel alongside the mode word and are held by
//! the discipline strategy.

use std::fmt;
use std::io;
use std::os::windows::io::RawHandle;
use std::thread;
use std::time::{Duration, Instant};

use windows::Win32::Foundation::{E_INVALIDARG, HANDLE, WAIT_OBJECT_0, WAIT_TIMEOUT};
use windows::Win32::Storage::FileSystem::{GetFileType, FILE_TYPE_CHAR, FILE_TYPE_PIPE};
use windows::Win32::System::Console::{
    FlushConsoleInputBuffer, GetConsoleMode, GetConsoleScreenBufferInfo,
    GetNumberOfConsoleInputEvents, SetConsoleMode, CONSOLE_MODE, CONSOLE_SCREEN_BUFFER_INFO,
    ENABLE_ECHO_INPUT, ENABLE_LINE_INPUT, ENABLE_PROCESSED_INPUT,
};
use windows::Win32::System::Pipes::PeekNamedPipe;
use windows::Win32::System::Threading::WaitForSingleObject;

use super::PollEvent;
use crate::core::poller::Interest;

/// Raw handle type used by the platform layer.
pub type RawDevice = RawHandle;

const INFINITE: u32 = u32::MAX;
const PIPE_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Console input mode plus the emulated VMIN/VTIME slots.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct NativeMode {
    mode: u32,
    vmin: u8,
    vtime: u8,
}

impl NativeMode {
    fn flag(&self, bit: CONSOLE_MODE) -> bool {
        self.mode & bit.0 != 0
    }

    fn set_flag(&mut self, bit: CONSOLE_MODE, on: bool) {
        if on {
            self.mode |= bit.0;
        } else {
            self.mode &= !bit.0;
        }
    }

    pub(crate) fn echo(&self) -> bool {
        self.flag(ENABLE_ECHO_INPUT)
    }

    pub(crate) fn set_echo(&mut self, on: bool) {
        self.set_flag(ENABLE_ECHO_INPUT, on)
    }

    pub(crate) fn canonical(&self) -> bool {
        self.flag(ENABLE_LINE_INPUT)
    }

    pub(crate) fn set_canonical(&mut self, on: bool) {
        self.set_flag(ENABLE_LINE_INPUT, on)
    }

    pub(crate) fn interrupt_chars(&self) -> bool {
        self.flag(ENABLE_PROCESSED_INPUT)
    }

    pub(crate) fn set_interrupt_chars(&mut self, on: bool) {
        self.set_flag(ENABLE_PROCESSED_INPUT, on)
    }

    pub(crate) fn min_bytes(&self) -> u8 {
        self.vmin
    }

    pub(crate) fn set_min_bytes(&mut self, value: u8) {
        self.vmin = value;
    }

    pub(crate) fn timeout_tenths(&self) -> u8 {
        self.vtime
    }

    pub(crate) fn set_timeout_tenths(&mut self, value: u8) {
        self.vtime = value;
    }

    pub(crate) fn make_raw(&mut self, interrupt_chars: bool) {
        self.set_flag(ENABLE_LINE_INPUT, false);
        self.set_flag(ENABLE_ECHO_INPUT, false);
        self.set_flag(ENABLE_PROCESSED_INPUT, interrupt_chars);
    }

    pub(crate) fn make_cooked(&mut self) {
        self.set_flag(ENABLE_LINE_INPUT, true);
        self.set_flag(ENABLE_ECHO_INPUT, true);
        self.set_flag(ENABLE_PROCESSED_INPUT, true);
    }

    pub(crate) fn clear_echo(&mut self) {
        self.set_flag(ENABLE_ECHO_INPUT, false);
    }

    pub(crate) fn same_discipline(&self, other: &NativeMode) -> bool {
        self == other
    }
}

impl fmt::Debug for NativeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsoleMode")
            .field("mode", &format_args!("0x{:08X}", self.mode))
            .field("vmin", &self.vmin)
            .field("vtime", &self.vtime)
            .finish()
    }
}

fn win_err(e: windows::core::Error) -> io::Error {
    if e.code() == E_INVALIDARG {
        io::Error::new(io::ErrorKind::InvalidInput, e)
    } else {
        io::Error::new(io::ErrorKind::Other, e)
    }
}

fn handle(raw: RawDevice) -> HANDLE {
    HANDLE(raw as *mut _)
}

pub fn is_terminal(raw: RawDevice) -> bool {
    let mut mode = CONSOLE_MODE(0);
    unsafe { GetConsoleMode(handle(raw), &mut mode).is_ok() }
}

/// Reads the console mode; VMIN/VTIME come from `slots`, which the strategy
/// keeps in step with the last applied mode.
pub fn get_mode(raw: RawDevice, slots: (u8, u8)) -> io::Result<NativeMode> {
    let mut mode = CONSOLE_MODE(0);
    unsafe {
        GetConsoleMode(handle(raw), &mut mode).map_err(win_err)?;
    }
    Ok(NativeMode {
        mode: mode.0,
        vmin: slots.0,
        vtime: slots.1,
    })
}

pub fn set_mode(raw: RawDevice, mode: &NativeMode) -> io::Result<()> {
    unsafe {
        SetConsoleMode(handle(raw), CONSOLE_MODE(mode.mode)).map_err(win_err)?;
    }
    Ok(())
}

/// Which device queue to discard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushQueue {
    Input,
    Output,
    Both,
}

pub fn flush(raw: RawDevice, queue: FlushQueue) -> io::Result<()> {
    match queue {
        FlushQueue::Input | FlushQueue::Both => unsafe {
            FlushConsoleInputBuffer(handle(raw)).map_err(win_err)
        },
        // Console output is unbuffered.
        FlushQueue::Output => Ok(()),
    }
}

/// Pipes report unread bytes; consoles report pending input records.
pub fn bytes_available(raw: RawDevice) -> io::Result<usize> {
    let h = handle(raw);
    unsafe {
        let kind = GetFileType(h);
        if kind == FILE_TYPE_PIPE {
            let mut available: u32 = 0;
            PeekNamedPipe(h, None, 0, None, Some(&mut available), None).map_err(win_err)?;
            Ok(available as usize)
        } else if kind == FILE_TYPE_CHAR {
            let mut events: u32 = 0;
            GetNumberOfConsoleInputEvents(h, &mut events).map_err(win_err)?;
            Ok(events as usize)
        } else {
            Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "byte count not available for this handle type",
            ))
        }
    }
}

fn wait_millis(timeout: Option<Duration>) -> u32 {
    match timeout {
        None => INFINITE,
        Some(t) => {
            let mut ms = t.as_millis();
            if Duration::from_millis(ms as u64) < t {
                ms += 1;
            }
            ms.min((INFINITE - 1) as u128) as u32
        }
    }
}

pub(crate) fn poll_device(raw: RawDevice, interest: Interest, timeout: Option<Duration>) -> io::Result<PollEvent> {
    if interest.contains(Interest::PRIORITY) {
        return Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "priority events are not available on Windows handles",
        ));
    }

    // Console and pipe writes never report back-pressure through a wait
    // primitive, so writability is immediate.
    if interest.contains(Interest::WRITABLE) {
        let mut ready = Interest::WRITABLE;
        if interest.contains(Interest::READABLE) && bytes_available(raw).unwrap_or(0) > 0 {
            ready |= Interest::READABLE;
        }
        return Ok(PollEvent::Ready(ready));
    }

    let h = handle(raw);
    let kind = unsafe { GetFileType(h) };
    if kind == FILE_TYPE_CHAR {
        let result = unsafe { WaitForSingleObject(h, wait_millis(timeout)) };
        if result == WAIT_OBJECT_0 {
            Ok(PollEvent::Ready(Interest::READABLE))
        } else if result == WAIT_TIMEOUT {
            Ok(PollEvent::Nothing)
        } else {
            Ok(PollEvent::Invalid)
        }
    } else if kind == FILE_TYPE_PIPE {
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            match bytes_available(raw) {
                Ok(0) => {}
                Ok(_) => return Ok(PollEvent::Ready(Interest::READABLE)),
                Err(_) => return Ok(PollEvent::HungUp),
            }
            let now = Instant::now();
            match deadline {
                Some(d) if now >= d => return Ok(PollEvent::Nothing),
                Some(d) => thread::sleep(PIPE_POLL_INTERVAL.min(d - now)),
                None => thread::sleep(PIPE_POLL_INTERVAL),
            }
        }
    } else {
        // Disk files never block.
        Ok(PollEvent::Ready(Interest::READABLE))
    }
}

/// Visible window of the console screen buffer; pixel sizes are not exposed.
pub fn window_size(raw: RawDevice) -> io::Result<(u16, u16, u16, u16)> {
    let mut info = CONSOLE_SCREEN_BUFFER_INFO::default();
    unsafe {
        GetConsoleScreenBufferInfo(handle(raw), &mut info).map_err(win_err)?;
    }
    let rows = (info.srWindow.Bottom - info.srWindow.Top + 1).max(0) as u16;
    let cols = (info.srWindow.Right - info.srWindow.Left + 1).max(0) as u16;
    Ok((rows, cols, 0, 0))
}

pub fn set_window_size(_raw: RawDevice, _rows: u16, _cols: u16, _xpixel: u16, _ypixel: u16) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "resizing the console window is not supported",
    ))
}

/// Path of the process console input.
pub const CONTROLLING_TERMINAL: &str = "CONIN$";
