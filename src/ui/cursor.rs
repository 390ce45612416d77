//! Cursor movement, erase and scroll output.
//!
//! Every operation writes one CSI sequence (ECMA-48) through crossterm and
//! flushes. On Windows consoles without VT support crossterm routes the same
//! commands to the console API instead.
//!
//! | operation            | sequence              |
//! |----------------------|-----------------------|
//! | `move_up(n)`         | `CSI n A`             |
//! | `move_down(n)`       | `CSI n B`             |
//! | `move_right(n)`      | `CSI n C`             |
//! | `move_left(n)`       | `CSI n D`             |
//! | `goto(r, c)`         | `CSI r+1 ; c+1 H`     |
//! | `goto_column(c)`     | `CSI c+1 G`           |
//! | `erase_line(0/1/2)`  | `CSI K`, `1K`, `2K`   |
//! | `erase_screen(0..3)` | `CSI J`, `1J`, `2J`, `3J` |
//! | `scroll_forward(n)`  | `CSI n S`             |
//! | `scroll_backward(n)` | `CSI n T`             |

use std::fmt;
use std::io::Write;
#[cfg(windows)]
use std::io;

use crossterm::cursor::{MoveDown, MoveLeft, MoveRight, MoveTo, MoveToColumn, MoveUp};
use crossterm::style::Print;
use crossterm::terminal::{Clear, ClearType, ScrollDown, ScrollUp};
use crossterm::{Command, ExecutableCommand};

use crate::core::error::{Result, TermError};

/// Line erase extent, relative to the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineErase {
    ToEnd = 0,
    ToStart = 1,
    Whole = 2,
}

impl TryFrom<u8> for LineErase {
    type Error = TermError;

    fn try_from(mode: u8) -> Result<Self> {
        match mode {
            0 => Ok(LineErase::ToEnd),
            1 => Ok(LineErase::ToStart),
            2 => Ok(LineErase::Whole),
            _ => Err(TermError::InvalidArgument(format!("erase line mode {} not in 0..=2", mode))),
        }
    }
}

/// Screen erase extent, relative to the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenErase {
    Below = 0,
    Above = 1,
    All = 2,
    Scrollback = 3,
}

impl TryFrom<u8> for ScreenErase {
    type Error = TermError;

    fn try_from(mode: u8) -> Result<Self> {
        match mode {
            0 => Ok(ScreenErase::Below),
            1 => Ok(ScreenErase::Above),
            2 => Ok(ScreenErase::All),
            3 => Ok(ScreenErase::Scrollback),
            _ => Err(TermError::InvalidArgument(format!("erase screen mode {} not in 0..=3", mode))),
        }
    }
}

impl From<ScreenErase> for ClearType {
    fn from(mode: ScreenErase) -> Self {
        match mode {
            ScreenErase::Below => ClearType::FromCursorDown,
            ScreenErase::Above => ClearType::FromCursorUp,
            ScreenErase::All => ClearType::All,
            ScreenErase::Scrollback => ClearType::Purge,
        }
    }
}

/// `CSI 1 K`. crossterm has no clear type for it and the console API has no
/// equivalent.
struct EraseLineToCursor;

impl Command for EraseLineToCursor {
    fn write_ansi(&self, f: &mut impl fmt::Write) -> fmt::Result {
        f.write_str("\x1b[1K")
    }

    #[cfg(windows)]
    fn execute_winapi(&self) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "erase to start of line has no console equivalent",
        ))
    }
}

/// Stateless cursor and screen operations over any writer.
///
/// Commands the host cannot perform fail with `PlatformUnsupported`.
pub struct ScreenOps;

impl ScreenOps {
    fn emit<W: Write>(out: &mut W, command: impl Command) -> Result<()> {
        out.execute(command)?;
        Ok(())
    }

    pub fn move_up<W: Write>(out: &mut W, n: u16) -> Result<()> {
        if n == 0 {
            return Ok(());
        }
        Self::emit(out, MoveUp(n))
    }

    pub fn move_down<W: Write>(out: &mut W, n: u16) -> Result<()> {
        if n == 0 {
            return Ok(());
        }
        Self::emit(out, MoveDown(n))
    }

    pub fn move_right<W: Write>(out: &mut W, n: u16) -> Result<()> {
        if n == 0 {
            return Ok(());
        }
        Self::emit(out, MoveRight(n))
    }

    pub fn move_left<W: Write>(out: &mut W, n: u16) -> Result<()> {
        if n == 0 {
            return Ok(());
        }
        Self::emit(out, MoveLeft(n))
    }

    /// Move to 0-based `(row, col)`.
    pub fn goto<W: Write>(out: &mut W, row: u16, col: u16) -> Result<()> {
        Self::emit(out, MoveTo(col, row))
    }

    /// Move to 0-based `col` on the current row.
    pub fn goto_column<W: Write>(out: &mut W, col: u16) -> Result<()> {
        Self::emit(out, MoveToColumn(col))
    }

    /// `mode`: 0 cursor to end, 1 start to cursor, 2 whole line.
    pub fn erase_line<W: Write>(out: &mut W, mode: u8) -> Result<()> {
        match LineErase::try_from(mode)? {
            LineErase::ToEnd => Self::emit(out, Clear(ClearType::UntilNewLine)),
            LineErase::ToStart => Self::emit(out, EraseLineToCursor),
            LineErase::Whole => Self::emit(out, Clear(ClearType::CurrentLine)),
        }
    }

    /// `mode`: 0 below, 1 above, 2 whole screen, 3 scrollback.
    pub fn erase_screen<W: Write>(out: &mut W, mode: u8) -> Result<()> {
        let mode = ScreenErase::try_from(mode)?;
        Self::emit(out, Clear(mode.into()))
    }

    /// Scroll content up by `n` lines.
    pub fn scroll_forward<W: Write>(out: &mut W, n: u16) -> Result<()> {
        if n == 0 {
            return Ok(());
        }
        Self::emit(out, ScrollUp(n))
    }

    /// Scroll content down by `n` lines.
    pub fn scroll_backward<W: Write>(out: &mut W, n: u16) -> Result<()> {
        if n == 0 {
            return Ok(());
        }
        Self::emit(out, ScrollDown(n))
    }

    pub fn clear_screen<W: Write>(out: &mut W) -> Result<()> {
        Self::emit(out, Clear(ClearType::All))?;
        Self::goto(out, 0, 0)
    }

    pub fn beep<W: Write>(out: &mut W) -> Result<()> {
        Self::emit(out, Print('\x07'))
    }
}
