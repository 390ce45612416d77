//! Terminal discipline descriptor.
//!
//! A [`ModeDescriptor`] is a portable view of the handful of discipline
//! settings callers usually care about, plus the opaque native snapshot it
//! was read from. Applying a descriptor overlays the abstract fields onto the
//! snapshot, so everything not represented abstractly round-trips untouched.
//!
//! # Conversion table
//!
//! | field                     | termios         | Windows console           |
//! |---------------------------|-----------------|---------------------------|
//! | `echo_enabled`            | `ECHO`          | `ENABLE_ECHO_INPUT`       |
//! | `canonical_mode`          | `ICANON`        | `ENABLE_LINE_INPUT`       |
//! | `interrupt_chars_enabled` | `ISIG`          | `ENABLE_PROCESSED_INPUT`  |
//! | `min_bytes`               | `c_cc[VMIN]`    | strategy slot             |
//! | `timeout_tenths`          | `c_cc[VTIME]`   | strategy slot             |

use serde::{Deserialize, Serialize};

use super::error::{Result, TermError};
use super::platform::NativeMode;

/// Largest value a native control-character slot can hold.
pub const MAX_CONTROL_SLOT: u32 = u8::MAX as u32;

/// Options for raw discipline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawOptions {
    /// Minimum bytes a read waits for (VMIN)
    pub min_bytes: u32,
    /// Inter-byte timeout in tenths of a second (VTIME)
    pub timeout_tenths: u32,
    /// Keep signal-generating characters (Ctrl+C, Ctrl+Z) active
    pub interrupt_chars_enabled: bool,
}

impl Default for RawOptions {
    fn default() -> Self {
        Self {
            min_bytes: 1,
            timeout_tenths: 0,
            interrupt_chars_enabled: false,
        }
    }
}

impl RawOptions {
    /// Reads that wait at most `tenths` for any input.
    pub fn timeout(tenths: u32) -> Self {
        Self {
            min_bytes: 0,
            timeout_tenths: tenths,
            ..Self::default()
        }
    }

    pub fn with_interrupts(mut self, enabled: bool) -> Self {
        self.interrupt_chars_enabled = enabled;
        self
    }
}

/// Terminal discipline state.
#[derive(Clone, Copy, Debug)]
pub struct ModeDescriptor {
    pub echo_enabled: bool,
    /// `false` means raw
    pub canonical_mode: bool,
    pub min_bytes: u32,
    /// 0.1 s units
    pub timeout_tenths: u32,
    pub interrupt_chars_enabled: bool,
    native: NativeMode,
}

impl ModeDescriptor {
    pub(crate) fn from_native(native: NativeMode) -> Self {
        Self {
            echo_enabled: native.echo(),
            canonical_mode: native.canonical(),
            min_bytes: native.min_bytes() as u32,
            timeout_tenths: native.timeout_tenths() as u32,
            interrupt_chars_enabled: native.interrupt_chars(),
            native,
        }
    }

    /// Reject fields the native structure cannot represent.
    pub fn validate(&self) -> Result<()> {
        if self.min_bytes > MAX_CONTROL_SLOT {
            return Err(TermError::InvalidArgument(format!(
                "min_bytes {} exceeds {}",
                self.min_bytes, MAX_CONTROL_SLOT
            )));
        }
        if self.timeout_tenths > MAX_CONTROL_SLOT {
            return Err(TermError::InvalidArgument(format!(
                "timeout_tenths {} exceeds {}",
                self.timeout_tenths, MAX_CONTROL_SLOT
            )));
        }
        Ok(())
    }

    /// The native structure with the abstract fields applied.
    pub(crate) fn to_native(&self) -> Result<NativeMode> {
        self.validate()?;
        Ok(self.overlay())
    }

    fn overlay(&self) -> NativeMode {
        let mut native = self.native;
        native.set_echo(self.echo_enabled);
        native.set_canonical(self.canonical_mode);
        native.set_interrupt_chars(self.interrupt_chars_enabled);
        native.set_min_bytes(self.min_bytes.min(MAX_CONTROL_SLOT) as u8);
        native.set_timeout_tenths(self.timeout_tenths.min(MAX_CONTROL_SLOT) as u8);
        native
    }

    /// Raw discipline derived from this one.
    pub fn raw(&self, options: RawOptions) -> Self {
        let mut native = self.overlay();
        native.make_raw(options.interrupt_chars_enabled);
        let mut mode = Self::from_native(native);
        mode.min_bytes = options.min_bytes;
        mode.timeout_tenths = options.timeout_tenths;
        mode
    }

    /// Line-buffered discipline with echo derived from this one.
    pub fn cooked(&self) -> Self {
        let mut native = self.overlay();
        native.make_cooked();
        Self::from_native(native)
    }

    /// This discipline with echo suppressed; canonical processing untouched.
    pub fn no_echo(&self) -> Self {
        let mut native = self.overlay();
        native.clear_echo();
        Self::from_native(native)
    }

    pub fn is_raw(&self) -> bool {
        !self.canonical_mode
    }

    /// Whether a read returns immediately with whatever is available.
    pub fn is_nonblocking_read(&self) -> bool {
        !self.canonical_mode && self.min_bytes == 0 && self.timeout_tenths == 0
    }
}

impl PartialEq for ModeDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.echo_enabled == other.echo_enabled
            && self.canonical_mode == other.canonical_mode
            && self.min_bytes == other.min_bytes
            && self.timeout_tenths == other.timeout_tenths
            && self.interrupt_chars_enabled == other.interrupt_chars_enabled
            && self.overlay().same_discipline(&other.overlay())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::core::platform::sys;
    use crate::core::testutil::pty_pair;
    use std::os::unix::io::AsRawFd;

    fn current(file: &std::fs::File) -> ModeDescriptor {
        ModeDescriptor::from_native(sys::get_mode(file.as_raw_fd()).unwrap())
    }

    #[test]
    fn test_raw_options_default() {
        let opts = RawOptions::default();
        assert_eq!(opts.min_bytes, 1);
        assert_eq!(opts.timeout_tenths, 0);
        assert!(!opts.interrupt_chars_enabled);

        let opts = RawOptions::timeout(5).with_interrupts(true);
        assert_eq!(opts.min_bytes, 0);
        assert_eq!(opts.timeout_tenths, 5);
        assert!(opts.interrupt_chars_enabled);
    }

    #[test]
    fn test_raw_clears_echo_and_canonical() {
        let (_master, slave) = pty_pair();
        let cooked = current(&slave);
        assert!(cooked.canonical_mode);
        assert!(cooked.echo_enabled);

        let raw = cooked.raw(RawOptions::default());
        assert!(raw.is_raw());
        assert!(!raw.echo_enabled);
        assert!(!raw.interrupt_chars_enabled);
        assert_eq!(raw.min_bytes, 1);
        assert_eq!(raw.timeout_tenths, 0);

        let raw = cooked.raw(RawOptions::default().with_interrupts(true));
        assert!(raw.interrupt_chars_enabled);
    }

    #[test]
    fn test_no_echo_keeps_canonical_bit() {
        let (_master, slave) = pty_pair();
        let cooked = current(&slave);
        let quiet = cooked.no_echo();
        assert!(!quiet.echo_enabled);
        assert!(quiet.canonical_mode);

        let raw_quiet = cooked.raw(RawOptions::default()).no_echo();
        assert!(raw_quiet.is_raw());
    }

    #[test]
    fn test_cooked_restores_line_discipline() {
        let (_master, slave) = pty_pair();
        let raw = current(&slave).raw(RawOptions::timeout(3));
        let cooked = raw.cooked();
        assert!(cooked.canonical_mode);
        assert!(cooked.echo_enabled);
        assert!(cooked.interrupt_chars_enabled);
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let (_master, slave) = pty_pair();
        let mut mode = current(&slave);
        mode.min_bytes = 256;
        assert!(matches!(mode.validate(), Err(TermError::InvalidArgument(_))));

        mode.min_bytes = 0;
        mode.timeout_tenths = 1000;
        assert!(matches!(mode.to_native(), Err(TermError::InvalidArgument(_))));

        mode.timeout_tenths = 255;
        assert!(mode.validate().is_ok());
    }

    #[test]
    fn test_equality_tracks_abstract_fields() {
        let (_master, slave) = pty_pair();
        let a = current(&slave);
        let mut b = a;
        assert_eq!(a, b);
        b.echo_enabled = !b.echo_enabled;
        assert_ne!(a, b);
        assert!(!a.raw(RawOptions::default()).is_nonblocking_read());
        assert!(a.raw(RawOptions { min_bytes: 0, timeout_tenths: 0, interrupt_chars_enabled: false }).is_nonblocking_read());
    }
}
