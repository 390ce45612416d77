//! Console window dimensions.

use std::env;

use tracing::debug;

use crate::config::SizeConfig;
use crate::core::error::{Result, TermError};
use crate::core::platform::{sys, AsDevice, RawDevice};

/// Window dimensions as reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WindowSize {
    pub rows: u16,
    pub columns: u16,
    /// 0 when the device does not report pixels
    pub pixel_width: u16,
    pub pixel_height: u16,
}

/// Queries and sets window size, with an environment-based fallback.
#[derive(Debug, Clone, Copy)]
pub struct SizeProbe {
    fallback: (u16, u16),
}

impl Default for SizeProbe {
    fn default() -> Self {
        Self { fallback: (24, 80) }
    }
}

impl SizeProbe {
    pub fn with_fallback(rows: u16, columns: u16) -> Self {
        Self {
            fallback: (rows.max(1), columns.max(1)),
        }
    }

    pub fn from_config(config: &SizeConfig) -> Self {
        Self::with_fallback(config.fallback_rows, config.fallback_columns)
    }

    /// Size of the terminal behind `device`. `DeviceUnavailable` when it is
    /// not a terminal.
    pub fn size<D: AsDevice + ?Sized>(device: &D) -> Result<WindowSize> {
        Self::size_of(device.as_device())
    }

    pub(crate) fn size_of(device: RawDevice) -> Result<WindowSize> {
        let (rows, columns, pixel_width, pixel_height) =
            sys::window_size(device).map_err(|e| TermError::from_discipline("window size", e))?;
        Ok(WindowSize {
            rows,
            columns,
            pixel_width,
            pixel_height,
        })
    }

    /// Set the size the device reports. Pixel dimensions are kept.
    pub fn set_size<D: AsDevice + ?Sized>(device: &D, rows: u16, columns: u16) -> Result<()> {
        Self::set_size_of(device.as_device(), rows, columns)
    }

    pub(crate) fn set_size_of(device: RawDevice, rows: u16, columns: u16) -> Result<()> {
        let (xpixel, ypixel) = match sys::window_size(device) {
            Ok((_, _, x, y)) => (x, y),
            Err(_) => (0, 0),
        };
        sys::set_window_size(device, rows, columns, xpixel, ypixel)
            .map_err(|e| TermError::from_discipline("set window size", e))
    }

    /// `(rows, columns)` of the stdout terminal, else `LINES`/`COLUMNS`,
    /// else the fallback. Never fails.
    pub fn default_size(&self) -> (u16, u16) {
        let terminal = crossterm::terminal::size()
            .ok()
            .map(|(columns, rows)| (rows, columns));
        let lines = env::var("LINES").ok();
        let columns = env::var("COLUMNS").ok();
        let size = resolve(terminal, lines.as_deref(), columns.as_deref(), self.fallback);
        debug!("Default size {}x{}", size.0, size.1);
        size
    }
}

fn parse_dimension(value: Option<&str>) -> Option<u16> {
    value
        .and_then(|v| v.trim().parse::<u16>().ok())
        .filter(|&n| n > 0)
}

/// Pick a size from the available hints. Each environment dimension falls
/// back on its own.
fn resolve(
    terminal: Option<(u16, u16)>,
    lines: Option<&str>,
    columns: Option<&str>,
    fallback: (u16, u16),
) -> (u16, u16) {
    if let Some((rows, cols)) = terminal {
        if rows > 0 && cols > 0 {
            return (rows, cols);
        }
    }
    (
        parse_dimension(lines).unwrap_or(fallback.0),
        parse_dimension(columns).unwrap_or(fallback.1),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_prefers_terminal() {
        assert_eq!(resolve(Some((50, 132)), Some("10"), Some("20"), (24, 80)), (50, 132));
    }

    #[test]
    fn test_resolve_environment() {
        assert_eq!(resolve(None, Some("40"), Some("100"), (24, 80)), (40, 100));
        assert_eq!(resolve(Some((0, 0)), Some("40"), None, (24, 80)), (40, 80));
        assert_eq!(resolve(None, None, Some(" 90 "), (24, 80)), (24, 90));
    }

    #[test]
    fn test_resolve_ignores_garbage() {
        assert_eq!(resolve(None, Some("tall"), Some("-5"), (24, 80)), (24, 80));
        assert_eq!(resolve(None, Some("0"), Some("70000"), (24, 80)), (24, 80));
        assert_eq!(resolve(None, None, None, (30, 120)), (30, 120));
    }

    #[test]
    fn test_fallback_configuration() {
        let probe = SizeProbe::from_config(&SizeConfig {
            fallback_rows: 0,
            fallback_columns: 132,
        });
        assert_eq!(probe.fallback, (1, 132));
        assert_eq!(SizeProbe::default().fallback, (24, 80));

        let (rows, cols) = probe.default_size();
        assert!(rows > 0 && cols > 0);
    }

    #[test]
    fn test_non_terminal_size_unavailable() {
        let file = tempfile::tempfile().unwrap();
        assert!(matches!(
            SizeProbe::size(&file),
            Err(TermError::DeviceUnavailable(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_set_and_query_pty_size() {
        let (_master, slave) = crate::core::testutil::pty_pair();
        SizeProbe::set_size(&slave, 42, 120).unwrap();
        let size = SizeProbe::size(&slave).unwrap();
        assert_eq!(size.rows, 42);
        assert_eq!(size.columns, 120);
        assert_eq!(size.pixel_width, 0);
    }
}
