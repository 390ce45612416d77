//! POSIX termios backend.
//!
//! Thin wrappers around `tcgetattr`/`tcsetattr`, `poll(2)` and the tty
//! ioctls. Everything here returns `io::Result`; classification into
//! `TermError` happens one level up.

use std::fmt;
use std::io;
use std::mem;
use std::os::unix::io::RawFd;
use std::time::Duration;

use super::PollEvent;
use crate::core::poller::Interest;

/// Raw handle type used by the platform layer.
pub type RawDevice = RawFd;

/// Opaque snapshot of the kernel `termios` structure.
#[derive(Clone, Copy)]
pub struct NativeMode(libc::termios);

impl NativeMode {
    pub(crate) fn echo(&self) -> bool {
        self.0.c_lflag & libc::ECHO != 0
    }

    pub(crate) fn set_echo(&mut self, on: bool) {
        if on {
            self.0.c_lflag |= libc::ECHO;
        } else {
            self.0.c_lflag &= !libc::ECHO;
        }
    }

    pub(crate) fn canonical(&self) -> bool {
        self.0.c_lflag & libc::ICANON != 0
    }

    pub(crate) fn set_canonical(&mut self, on: bool) {
        if on {
            self.0.c_lflag |= libc::ICANON;
        } else {
            self.0.c_lflag &= !libc::ICANON;
        }
    }

    pub(crate) fn interrupt_chars(&self) -> bool {
        self.0.c_lflag & libc::ISIG != 0
    }

    pub(crate) fn set_interrupt_chars(&mut self, on: bool) {
        if on {
            self.0.c_lflag |= libc::ISIG;
        } else {
            self.0.c_lflag &= !libc::ISIG;
        }
    }

    pub(crate) fn min_bytes(&self) -> u8 {
        self.0.c_cc[libc::VMIN]
    }

    pub(crate) fn set_min_bytes(&mut self, value: u8) {
        self.0.c_cc[libc::VMIN] = value;
    }

    pub(crate) fn timeout_tenths(&self) -> u8 {
        self.0.c_cc[libc::VTIME]
    }

    pub(crate) fn set_timeout_tenths(&mut self, value: u8) {
        self.0.c_cc[libc::VTIME] = value;
    }

    /// The `cfmakeraw` flag set, optionally keeping signal characters.
    pub(crate) fn make_raw(&mut self, interrupt_chars: bool) {
        let t = &mut self.0;
        t.c_iflag &= !(libc::IGNBRK
            | libc::BRKINT
            | libc::PARMRK
            | libc::ISTRIP
            | libc::INLCR
            | libc::IGNCR
            | libc::ICRNL
            | libc::IXON);
        t.c_oflag &= !libc::OPOST;
        t.c_lflag &= !(libc::ECHO | libc::ECHONL | libc::ICANON | libc::ISIG | libc::IEXTEN);
        t.c_cflag &= !(libc::CSIZE | libc::PARENB);
        t.c_cflag |= libc::CS8;
        if interrupt_chars {
            t.c_iflag |= libc::BRKINT;
            t.c_lflag |= libc::ISIG;
        }
    }

    /// Line editing, echo, signal characters and output post-processing.
    pub(crate) fn make_cooked(&mut self) {
        let t = &mut self.0;
        t.c_iflag |= libc::BRKINT | libc::ICRNL | libc::IXON;
        t.c_oflag |= libc::OPOST;
        t.c_lflag |= libc::ECHO | libc::ECHOE | libc::ECHOK | libc::ICANON | libc::ISIG | libc::IEXTEN;
    }

    pub(crate) fn clear_echo(&mut self) {
        self.0.c_lflag &= !(libc::ECHO | libc::ECHOE | libc::ECHOK | libc::ECHONL);
    }

    /// Compare everything except the hardware control group, which pty
    /// drivers rewrite on every `tcsetattr`.
    pub(crate) fn same_discipline(&self, other: &NativeMode) -> bool {
        self.0.c_iflag == other.0.c_iflag
            && self.0.c_oflag == other.0.c_oflag
            && self.0.c_lflag == other.0.c_lflag
            && self.0.c_cc == other.0.c_cc
    }
}

impl fmt::Debug for NativeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Termios")
            .field("iflag", &format_args!("{:#x}", self.0.c_iflag))
            .field("oflag", &format_args!("{:#x}", self.0.c_oflag))
            .field("cflag", &format_args!("{:#x}", self.0.c_cflag))
            .field("lflag", &format_args!("{:#x}", self.0.c_lflag))
            .field("vmin", &self.min_bytes())
            .field("vtime", &self.timeout_tenths())
            .finish()
    }
}

fn cvt(ret: libc::c_int) -> io::Result<libc::c_int> {
    if ret == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(ret)
    }
}

pub fn is_terminal(fd: RawDevice) -> bool {
    unsafe { libc::isatty(fd) == 1 }
}

pub fn get_mode(fd: RawDevice) -> io::Result<NativeMode> {
    unsafe {
        let mut termios: libc::termios = mem::zeroed();
        cvt(libc::tcgetattr(fd, &mut termios))?;
        Ok(NativeMode(termios))
    }
}

pub fn set_mode(fd: RawDevice, mode: &NativeMode) -> io::Result<()> {
    unsafe {
        cvt(libc::tcsetattr(fd, libc::TCSANOW, &mode.0))?;
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

pub fn flush(fd: RawDevice, queue: FlushQueue) -> io::Result<()> {
    let which = match queue {
        FlushQueue::Input => libc::TCIFLUSH,
        FlushQueue::Output => libc::TCOFLUSH,
        FlushQueue::Both => libc::TCIOFLUSH,
    };
    unsafe {
        cvt(libc::tcflush(fd, which))?;
    }
    Ok(())
}

/// Bytes the kernel holds for this descriptor that a read would return
/// without blocking.
pub fn bytes_available(fd: RawDevice) -> io::Result<usize> {
    let mut count: libc::c_int = 0;
    unsafe {
        cvt(libc::ioctl(fd, libc::FIONREAD, &mut count))?;
    }
    Ok(count.max(0) as usize)
}

fn interest_to_events(interest: Interest) -> libc::c_short {
    let mut events = 0;
    if interest.contains(Interest::READABLE) {
        events |= libc::POLLIN;
    }
    if interest.contains(Interest::WRITABLE) {
        events |= libc::POLLOUT;
    }
    if interest.contains(Interest::PRIORITY) {
        events |= libc::POLLPRI;
    }
    events
}

fn timeout_millis(timeout: Option<Duration>) -> libc::c_int {
    match timeout {
        None => -1,
        Some(t) => {
            // Round up so poll never wakes before the requested instant.
            let mut ms = t.as_millis();
            if Duration::from_millis(ms as u64) < t {
                ms += 1;
            }
            ms.min(libc::c_int::MAX as u128) as libc::c_int
        }
    }
}

/// One `poll(2)` call. Interruption is returned as an
/// `ErrorKind::Interrupted` error for the caller's retry policy.
pub(crate) fn poll_device(fd: RawDevice, interest: Interest, timeout: Option<Duration>) -> io::Result<PollEvent> {
    let mut pfd = libc::pollfd {
        fd,
        events: interest_to_events(interest),
        revents: 0,
    };
    let n = unsafe { cvt(libc::poll(&mut pfd, 1, timeout_millis(timeout)))? };
    if n == 0 {
        return Ok(PollEvent::Nothing);
    }

    let revents = pfd.revents;
    if revents & libc::POLLNVAL != 0 {
        return Ok(PollEvent::Invalid);
    }

    let mut ready = Interest::empty();
    if revents & libc::POLLIN != 0 {
        ready |= Interest::READABLE;
    }
    if revents & libc::POLLOUT != 0 {
        ready |= Interest::WRITABLE;
    }
    if revents & libc::POLLPRI != 0 {
        ready |= Interest::PRIORITY;
    }
    if revents & libc::POLLERR != 0 {
        ready |= interest & (Interest::READABLE | Interest::WRITABLE);
    }
    if revents & libc::POLLHUP != 0 {
        // The pending read returns end-of-file.
        ready |= interest & Interest::READABLE;
    }

    let ready = ready & interest;
    if ready.is_empty() {
        if revents & libc::POLLHUP != 0 {
            return Ok(PollEvent::HungUp);
        }
        // POLLERR stays set until the error is consumed; polling again would
        // return immediately.
        if revents & libc::POLLERR != 0 {
            return Ok(PollEvent::Failed);
        }
        return Ok(PollEvent::Nothing);
    }
    Ok(PollEvent::Ready(ready))
}

/// Window dimensions as reported by `TIOCGWINSZ`.
pub fn window_size(fd: RawDevice) -> io::Result<(u16, u16, u16, u16)> {
    unsafe {
        let mut ws: libc::winsize = mem::zeroed();
        cvt(libc::ioctl(fd, libc::TIOCGWINSZ, &mut ws))?;
        Ok((ws.ws_row, ws.ws_col, ws.ws_xpixel, ws.ws_ypixel))
    }
}

pub fn set_window_size(fd: RawDevice, rows: u16, cols: u16, xpixel: u16, ypixel: u16) -> io::Result<()> {
    let ws = libc::winsize {
        ws_row: rows,
        ws_col: cols,
        ws_xpixel: xpixel,
        ws_ypixel: ypixel,
    };
    unsafe {
        cvt(libc::ioctl(fd, libc::TIOCSWINSZ, &ws))?;
    }
    Ok(())
}

/// Path of the controlling terminal.
pub const CONTROLLING_TERMINAL: &str = "/dev/tty";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_rounds_up() {
        assert_eq!(timeout_millis(None), -1);
        assert_eq!(timeout_millis(Some(Duration::ZERO)), 0);
        assert_eq!(timeout_millis(Some(Duration::from_micros(100))), 1);
        assert_eq!(timeout_millis(Some(Duration::from_millis(100))), 100);
        assert_eq!(timeout_millis(Some(Duration::from_secs(u64::MAX / 2))), libc::c_int::MAX);
    }

    #[test]
    fn test_interest_mapping() {
        let events = interest_to_events(Interest::READABLE | Interest::PRIORITY);
        assert_eq!(events, libc::POLLIN | libc::POLLPRI);
        assert_eq!(interest_to_events(Interest::WRITABLE), libc::POLLOUT);
    }
}
