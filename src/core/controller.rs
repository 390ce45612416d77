//! Terminal controller
//!
//! Owns one device handle and switches its discipline. Scoped changes
//! remember the mode observed on entry and put it back on every exit path:
//! normal return, error, or panic unwind.
//!
//! ```no_run
//! use ttyctl::{RawOptions, TerminalController};
//!
//! let mut tty = TerminalController::open()?;
//! let key = tty.getch(RawOptions::default())?;
//! let secret = tty.getpass("Password: ")?;
//! # Ok::<(), ttyctl::TermError>(())
//! ```

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::ops::{Deref, DerefMut};

use tracing::{debug, warn};

use super::error::{Result, TermError};
use super::mode::{ModeDescriptor, RawOptions};
use super::platform::{sys, AsDevice, Discipline, FlushQueue, RawDevice};
use super::poller::{Pollable, ReadinessPoller};
use super::stream::BufferedStream;
use crate::ui::size::{SizeProbe, WindowSize};

/// Device status report request; the reply is `CSI row ; col R`.
const CURSOR_POSITION_REQUEST: &[u8] = b"\x1b[6n";
/// Longest reply accepted before giving up on the report.
const CURSOR_REPLY_LIMIT: usize = 32;

/// Owns a terminal device and its discipline strategy.
pub struct TerminalController {
    stream: BufferedStream<File>,
    discipline: Discipline,
}

impl TerminalController {
    /// Open the controlling terminal of this process.
    pub fn open() -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(sys::CONTROLLING_TERMINAL)
            .map_err(|e| {
                TermError::DeviceUnavailable(format!("open {}: {}", sys::CONTROLLING_TERMINAL, e))
            })?;
        Ok(Self::from_file(file))
    }

    /// Adopt an open handle. The discipline strategy is chosen here, once.
    pub fn from_file(file: File) -> Self {
        let discipline = Discipline::probe(file.as_device());
        Self {
            stream: BufferedStream::new(file),
            discipline,
        }
    }

    /// Whether the handle is a controllable terminal.
    pub fn is_terminal(&self) -> bool {
        self.discipline.is_terminal()
    }

    /// Name of the discipline strategy in use.
    pub fn strategy(&self) -> &'static str {
        self.discipline.name()
    }

    pub fn get_ref(&self) -> Option<&File> {
        self.stream.get_ref()
    }

    /// Close the device handle. Device discipline is left as it is.
    pub fn close(&mut self) -> Option<File> {
        self.stream.close()
    }

    fn raw_device(&self) -> Result<RawDevice> {
        self.stream
            .get_ref()
            .map(|f| f.as_device())
            .ok_or(TermError::Closed)
    }

    pub fn get_mode(&self) -> Result<ModeDescriptor> {
        let device = self.raw_device()?;
        let native = self.discipline.read(device)?;
        Ok(ModeDescriptor::from_native(native))
    }

    /// Apply `mode` and return the mode that was in effect before.
    ///
    /// Either every field takes effect or none does: fields are validated
    /// before the device is touched, and if the device reports a different
    /// discipline afterwards the previous one is put back.
    pub fn set_mode(&mut self, mode: &ModeDescriptor) -> Result<ModeDescriptor> {
        let native = mode.to_native()?;
        let device = self.raw_device()?;
        let previous = self.discipline.read(device)?;

        self.discipline.apply(device, &native)?;

        let observed = ModeDescriptor::from_native(self.discipline.read(device)?);
        if !Self::abstract_eq(&observed, mode) {
            if let Err(e) = self.discipline.apply(device, &previous) {
                warn!("Failed to roll back rejected mode change: {}", e);
            }
            return Err(TermError::DeviceUnavailable(format!(
                "device did not accept mode {:?}",
                mode
            )));
        }

        debug!(
            "Mode set: echo={} canonical={} min={} time={} intr={}",
            mode.echo_enabled,
            mode.canonical_mode,
            mode.min_bytes,
            mode.timeout_tenths,
            mode.interrupt_chars_enabled
        );
        Ok(ModeDescriptor::from_native(previous))
    }

    fn abstract_eq(a: &ModeDescriptor, b: &ModeDescriptor) -> bool {
        a.echo_enabled == b.echo_enabled
            && a.canonical_mode == b.canonical_mode
            && a.min_bytes == b.min_bytes
            && a.timeout_tenths == b.timeout_tenths
            && a.interrupt_chars_enabled == b.interrupt_chars_enabled
    }


    /// Apply `mode` until the returned guard is dropped or restored.
    pub fn enter(&mut self, mode: ModeDescriptor) -> Result<ModeGuard<'_>> {
        let saved = self.set_mode(&mode)?;
        Ok(ModeGuard {
            controller: self,
            saved,
            armed: true,
        })
    }

    pub fn enter_raw(&mut self, options: RawOptions) -> Result<ModeGuard<'_>> {
        let mode = self.get_mode()?.raw(options);
        self.enter(mode)
    }

    pub fn enter_cooked(&mut self) -> Result<ModeGuard<'_>> {
        let mode = self.get_mode()?.cooked();
        self.enter(mode)
    }

    pub fn enter_no_echo(&mut self) -> Result<ModeGuard<'_>> {
        let mode = self.get_mode()?.no_echo();
        self.enter(mode)
    }

    /// Run `body` under `mode`, restoring the entry mode afterwards.
    ///
    /// If the mode cannot be applied, `body` never runs. A failed restore is
    /// returned when `body` succeeded and only logged when `body` failed, so
    /// the body's error always wins.
    pub fn with_mode<R, F>(&mut self, mode: ModeDescriptor, body: F) -> Result<R>
    where
        F: FnOnce(&mut Self) -> Result<R>,
    {
        let mut guard = self.enter(mode)?;
        match body(&mut *guard) {
            Ok(value) => {
                guard.restore()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(restore_err) = guard.restore() {
                    warn!("Failed to restore terminal mode: {}", restore_err);
                }
                Err(err)
            }
        }
    }

    pub fn with_raw<R, F>(&mut self, options: RawOptions, body: F) -> Result<R>
    where
        F: FnOnce(&mut Self) -> Result<R>,
    {
        let mode = self.get_mode()?.raw(options);
        self.with_mode(mode, body)
    }

    pub fn with_cooked<R, F>(&mut self, body: F) -> Result<R>
    where
        F: FnOnce(&mut Self) -> Result<R>,
    {
        let mode = self.get_mode()?.cooked();
        self.with_mode(mode, body)
    }

    pub fn with_no_echo<R, F>(&mut self, body: F) -> Result<R>
    where
        F: FnOnce(&mut Self) -> Result<R>,
    {
        let mode = self.get_mode()?.no_echo();
        self.with_mode(mode, body)
    }


    pub fn make_raw(&mut self, options: RawOptions) -> Result<ModeDescriptor> {
        let mode = self.get_mode()?.raw(options);
        self.set_mode(&mode)
    }

    pub fn make_cooked(&mut self) -> Result<ModeDescriptor> {
        let mode = self.get_mode()?.cooked();
        self.set_mode(&mode)
    }

    pub fn echo_enabled(&self) -> Result<bool> {
        Ok(self.get_mode()?.echo_enabled)
    }

    pub fn set_echo(&mut self, enabled: bool) -> Result<()> {
        let mut mode = self.get_mode()?;
        mode.echo_enabled = enabled;
        self.set_mode(&mode)?;
        Ok(())
    }


    /// Read one character in raw mode.
    ///
    /// Multi-byte UTF-8 input is read until the character is complete. A
    /// malformed sequence yields U+FFFD. `None` means end-of-file, or that a
    /// `min_bytes == 0` read expired with nothing typed.
    pub fn getch(&mut self, options: RawOptions) -> Result<Option<char>> {
        self.with_raw(options, |tty| tty.read_char())
    }

    /// Prompt on stderr and read a line with echo off.
    pub fn getpass(&mut self, prompt: &str) -> Result<Option<String>> {
        self.getpass_to(prompt, &mut io::stderr())
    }

    /// Like [`getpass`](Self::getpass), writing the prompt to `diag`.
    ///
    /// Only the prompt is written; exactly one trailing line terminator is
    /// stripped from the answer. `None` at end-of-file before any input.
    pub fn getpass_to<W: Write + ?Sized>(&mut self, prompt: &str, diag: &mut W) -> Result<Option<String>> {
        self.with_no_echo(|tty| {
            diag.write_all(prompt.as_bytes())?;
            diag.flush()?;
            tty.read_line()
        })
    }

    /// Next byte, honouring an emulated inter-byte timeout.
    fn timed_byte(&mut self) -> Result<Option<u8>> {
        if self.stream.buffered() == 0 {
            if let Some(timeout) = self.discipline.emulated_read_timeout() {
                if !self.poller().wait_readable(Some(timeout))?.is_ready() {
                    return Ok(None);
                }
            }
        }
        Ok(self.stream.read_byte()?)
    }

    fn read_char(&mut self) -> Result<Option<char>> {
        let Some(lead) = self.timed_byte()? else {
            return Ok(None);
        };
        let width = utf8_width(lead);
        let mut bytes = [lead, 0, 0, 0];
        let mut len = 1;
        while len < width {
            match self.timed_byte()? {
                Some(b) if b & 0xC0 == 0x80 => {
                    bytes[len] = b;
                    len += 1;
                }
                Some(b) => {
                    self.stream.unread(&[b]);
                    break;
                }
                None => break,
            }
        }
        match std::str::from_utf8(&bytes[..len]) {
            Ok(s) => Ok(s.chars().next()),
            Err(_) => {
                debug!("Undecodable input {:02x?}", &bytes[..len]);
                Ok(Some(char::REPLACEMENT_CHARACTER))
            }
        }
    }

    fn read_line(&mut self) -> Result<Option<String>> {
        let mut line = Vec::new();
        loop {
            match self.stream.read_byte()? {
                Some(b'\n') => {
                    line.push(b'\n');
                    break;
                }
                Some(b) => line.push(b),
                None if line.is_empty() => return Ok(None),
                None => break,
            }
        }
        chomp(&mut line);
        Ok(Some(String::from_utf8_lossy(&line).into_owned()))
    }

    /// Ask the terminal where the cursor is. Returns 0-based `(row, column)`,
    /// or `None` if no report arrives within `timeout_tenths`.
    pub fn cursor_position(&mut self, timeout_tenths: u32) -> Result<Option<(u16, u16)>> {
        self.with_raw(RawOptions::timeout(timeout_tenths), |tty| {
            tty.write_all(CURSOR_POSITION_REQUEST)?;
            tty.flush()?;
            let mut reply = Vec::new();
            loop {
                match tty.timed_byte()? {
                    Some(b'R') => break,
                    Some(b) => {
                        reply.push(b);
                        if reply.len() > CURSOR_REPLY_LIMIT {
                            return Ok(None);
                        }
                    }
                    None => return Ok(None),
                }
            }
            Ok(parse_position_reply(&reply))
        })
    }


    pub fn flush_input(&mut self) -> Result<()> {
        self.flush_queue(FlushQueue::Input)
    }

    pub fn flush_output(&mut self) -> Result<()> {
        self.flush_queue(FlushQueue::Output)
    }

    pub fn flush_both(&mut self) -> Result<()> {
        self.flush_queue(FlushQueue::Both)
    }

    fn flush_queue(&mut self, queue: FlushQueue) -> Result<()> {
        let device = self.raw_device()?;
        self.discipline.flush(device, queue)?;
        if queue != FlushQueue::Output {
            while self.stream.buffered() > 0 {
                self.stream.read_byte()?;
            }
        }
        Ok(())
    }


    pub fn winsize(&self) -> Result<WindowSize> {
        SizeProbe::size_of(self.raw_device()?)
    }

    pub fn set_winsize(&mut self, rows: u16, columns: u16) -> Result<()> {
        SizeProbe::set_size_of(self.raw_device()?, rows, columns)
    }

    pub fn poller(&self) -> ReadinessPoller<'_, Self> {
        ReadinessPoller::new(self)
    }

    pub fn nread(&self) -> usize {
        self.poller().nread()
    }
}

impl Pollable for TerminalController {
    fn device(&self) -> Option<RawDevice> {
        self.stream.get_ref().map(|f| f.as_device())
    }

    fn buffered_len(&self) -> usize {
        self.stream.buffered()
    }
}

impl Read for TerminalController {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }
}

impl Write for TerminalController {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}

/// Restores the entry mode when dropped.
pub struct ModeGuard<'a> {
    controller: &'a mut TerminalController,
    saved: ModeDescriptor,
    armed: bool,
}

impl ModeGuard<'_> {
    /// Mode observed immediately before the guard was created.
    pub fn saved(&self) -> &ModeDescriptor {
        &self.saved
    }

    /// Restore now and report failure instead of logging it.
    pub fn restore(mut self) -> Result<()> {
        self.armed = false;
        self.controller.set_mode(&self.saved).map(|_| ())
    }
}

impl Deref for ModeGuard<'_> {
    type Target = TerminalController;

    fn deref(&self) -> &TerminalController {
        self.controller
    }
}

impl DerefMut for ModeGuard<'_> {
    fn deref_mut(&mut self) -> &mut TerminalController {
        self.controller
    }
}

impl Drop for ModeGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Err(e) = self.controller.set_mode(&self.saved) {
            warn!("Failed to restore terminal mode on drop: {}", e);
        }
    }
}

fn utf8_width(lead: u8) -> usize {
    match lead {
        0xC2..=0xDF => 2,
        0xE0..=0xEF => 3,
        0xF0..=0xF4 => 4,
        _ => 1,
    }
}

/// Strip one `\r\n`, `\n` or `\r`.
fn chomp(line: &mut Vec<u8>) {
    if line.ends_with(b"\r\n") {
        line.truncate(line.len() - 2);
    } else if line.ends_with(b"\n") || line.ends_with(b"\r") {
        line.pop();
    }
}

/// Parse the body of a cursor position report (everything before the final
/// `R`). Noise typed before the report is skipped.
fn parse_position_reply(reply: &[u8]) -> Option<(u16, u16)> {
    let start = reply.windows(2).rposition(|w| w == b"\x1b[")?;
    let body = std::str::from_utf8(&reply[start + 2..]).ok()?;
    let (row, col) = body.split_once(';')?;
    let row: u16 = row.parse().ok()?;
    let col: u16 = col.parse().ok()?;
    Some((row.saturating_sub(1), col.saturating_sub(1)))
}
