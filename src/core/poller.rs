//! Stream readiness polling.
//!
//! [`ReadinessPoller::wait`] blocks until a stream is ready for the requested
//! events or the timeout elapses:
//!
//! ```text
//! Idle -> Waiting -> Ready(mask) | TimedOut | Interrupted | Closed
//! ```
//!
//! Readability short-circuits when the stream already holds unread bytes in
//! user space; no OS poll is issued in that case.

use std::fs::File;
use std::io;
#[cfg(unix)]
use std::net::{TcpStream, UdpSocket};
use std::process::{ChildStderr, ChildStdin, ChildStdout};
use std::time::{Duration, Instant};

use bitflags::bitflags;
use tracing::{debug, trace};

use super::error::{Result, TermError};
use super::platform::{sys, AsDevice, PollEvent, RawDevice};
use super::stream::BufferedStream;

bitflags! {
    /// Readiness events
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct Interest: u8 {
        const READABLE = 0b001;
        const WRITABLE = 0b010;
        const PRIORITY = 0b100;
    }
}

impl Interest {
    /// Validate a caller-supplied mask.
    pub fn from_raw(bits: u8) -> Result<Self> {
        if bits == 0 {
            return Err(TermError::InvalidArgument("empty event mask".to_string()));
        }
        Self::from_bits(bits)
            .ok_or_else(|| TermError::InvalidArgument(format!("unknown event bits in mask {:#x}", bits)))
    }
}

/// Result of a readiness wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// Subset of the requested events that fired
    Ready(Interest),
    TimedOut,
    /// The stream cannot be polled (closed or not pollable). Only the
    /// single-event helpers return this; `wait` raises instead.
    Unsupported,
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        matches!(self, Readiness::Ready(_))
    }
}

/// What to do when a signal interrupts the wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InterruptPolicy {
    /// Re-poll for the time remaining until the deadline
    #[default]
    Retry,
    /// Re-poll at most this many times, then surface `Interrupted`
    RetryUpTo(u32),
    /// Surface `Interrupted` immediately
    Surface,
}

/// Convert a caller timeout in seconds. Negative or non-finite values are
/// rejected.
pub fn timeout_from_secs(secs: f64) -> Result<Duration> {
    if !secs.is_finite() || secs < 0.0 {
        return Err(TermError::InvalidArgument(format!("invalid timeout: {}", secs)));
    }
    Duration::try_from_secs_f64(secs)
        .map_err(|e| TermError::InvalidArgument(format!("invalid timeout {}: {}", secs, e)))
}

/// A stream the poller can observe.
pub trait Pollable {
    /// OS handle to poll, or `None` once the stream is closed.
    fn device(&self) -> Option<RawDevice>;

    /// Bytes already read from the OS but not yet consumed.
    fn buffered_len(&self) -> usize {
        0
    }
}

impl<S: AsDevice> Pollable for BufferedStream<S> {
    fn device(&self) -> Option<RawDevice> {
        self.get_ref().map(|s| s.as_device())
    }

    fn buffered_len(&self) -> usize {
        self.buffered()
    }
}

macro_rules! impl_pollable {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Pollable for $ty {
                fn device(&self) -> Option<RawDevice> {
                    Some(self.as_device())
                }
            }
        )*
    };
}

impl_pollable!(File, io::Stdin, ChildStdin, ChildStdout, ChildStderr);

#[cfg(unix)]
impl_pollable!(TcpStream, UdpSocket, std::os::unix::net::UnixStream);

/// Waits for readiness on a borrowed stream.
pub struct ReadinessPoller<'a, P: Pollable + ?Sized> {
    stream: &'a P,
    policy: InterruptPolicy,
}

impl<'a, P: Pollable + ?Sized> ReadinessPoller<'a, P> {
    pub fn new(stream: &'a P) -> Self {
        Self {
            stream,
            policy: InterruptPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: InterruptPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> InterruptPolicy {
        self.policy
    }

    /// Block until one of `interest` fires or `timeout` elapses.
    ///
    /// `None` waits indefinitely, `Some(Duration::ZERO)` polls once. The
    /// deadline is fixed at entry; retries after a signal only get the time
    /// that remains.
    pub fn wait(&self, interest: Interest, timeout: Option<Duration>) -> Result<Readiness> {
        if interest.is_empty() {
            return Err(TermError::InvalidArgument("empty event mask".to_string()));
        }
        let start = Instant::now();
        let deadline = timeout.and_then(|t| start.checked_add(t));

        if interest.contains(Interest::READABLE) && self.stream.buffered_len() > 0 {
            trace!("Buffered bytes pending, skipping poll");
            return Ok(Readiness::Ready(Interest::READABLE));
        }

        let device = self.stream.device().ok_or(TermError::Closed)?;
        let mut interrupts: u32 = 0;

        loop {
            let remaining = deadline.map(|d| d.saturating_duration_since(Instant::now()));
            trace!("poll {:?} remaining={:?}", interest, remaining);

            match sys::poll_device(device, interest, remaining) {
                Ok(PollEvent::Ready(ready)) => return Ok(Readiness::Ready(ready)),
                Ok(PollEvent::Nothing) => {
                    if Self::expired(deadline) {
                        return Ok(Readiness::TimedOut);
                    }
                }
                Ok(PollEvent::HungUp) | Ok(PollEvent::Invalid) => return Err(TermError::Closed),
                Ok(PollEvent::Failed) => {
                    return Err(TermError::Io(io::Error::new(
                        io::ErrorKind::Other,
                        "error condition pending on device",
                    )))
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                    interrupts += 1;
                    match self.policy {
                        InterruptPolicy::Surface => return Err(TermError::Interrupted),
                        InterruptPolicy::RetryUpTo(max) if interrupts > max => {
                            debug!("Poll interrupted {} times, giving up", interrupts);
                            return Err(TermError::Interrupted);
                        }
                        _ => trace!("Poll interrupted, retrying"),
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn expired(deadline: Option<Instant>) -> bool {
        match deadline {
            Some(d) => Instant::now() >= d,
            None => false,
        }
    }

    fn wait_single(&self, interest: Interest, timeout: Option<Duration>) -> Result<Readiness> {
        match self.wait(interest, timeout) {
            Err(e) if e.is_unsupported() => Ok(Readiness::Unsupported),
            other => other,
        }
    }

    pub fn wait_readable(&self, timeout: Option<Duration>) -> Result<Readiness> {
        self.wait_single(Interest::READABLE, timeout)
    }

    pub fn wait_writable(&self, timeout: Option<Duration>) -> Result<Readiness> {
        self.wait_single(Interest::WRITABLE, timeout)
    }

    pub fn wait_priority(&self, timeout: Option<Duration>) -> Result<Readiness> {
        self.wait_single(Interest::PRIORITY, timeout)
    }

    /// Unread bytes: the user-space buffer plus whatever the OS holds.
    /// Never blocks and never consumes.
    pub fn nread(&self) -> usize {
        let buffered = self.stream.buffered_len();
        let Some(device) = self.stream.device() else {
            return buffered;
        };
        match sys::bytes_available(device) {
            Ok(n) => buffered + n,
            Err(e) => {
                trace!("Byte count unavailable: {}", e);
                buffered
            }
        }
    }

    pub fn ready(&self) -> bool {
        self.nread() > 0
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::os::unix::net::UnixStream;

    struct Detached {
        buffered: usize,
    }

    impl Pollable for Detached {
        fn device(&self) -> Option<RawDevice> {
            None
        }

        fn buffered_len(&self) -> usize {
            self.buffered
        }
    }

    #[test]
    fn test_interest_from_raw() {
        assert_eq!(Interest::from_raw(1).unwrap(), Interest::READABLE);
        assert_eq!(
            Interest::from_raw(3).unwrap(),
            Interest::READABLE | Interest::WRITABLE
        );
        assert!(matches!(Interest::from_raw(0), Err(TermError::InvalidArgument(_))));
        assert!(matches!(Interest::from_raw(8), Err(TermError::InvalidArgument(_))));
    }

    #[test]
    fn test_timeout_from_secs() {
        assert_eq!(timeout_from_secs(0.25).unwrap(), Duration::from_millis(250));
        assert_eq!(timeout_from_secs(0.0).unwrap(), Duration::ZERO);
        assert!(matches!(timeout_from_secs(-0.1), Err(TermError::InvalidArgument(_))));
        assert!(timeout_from_secs(f64::NAN).is_err());
        assert!(timeout_from_secs(f64::INFINITY).is_err());
    }

    #[test]
    fn test_empty_mask_rejected() {
        let (a, _b) = UnixStream::pair().unwrap();
        let poller = ReadinessPoller::new(&a);
        let result = poller.wait(Interest::empty(), Some(Duration::ZERO));
        assert!(matches!(result, Err(TermError::InvalidArgument(_))));
    }

    #[test]
    fn test_buffered_fast_path_skips_poll() {
        // No device at all: only the fast path can answer.
        let stream = Detached { buffered: 3 };
        let poller = ReadinessPoller::new(&stream);
        assert_eq!(
            poller.wait(Interest::READABLE, None).unwrap(),
            Readiness::Ready(Interest::READABLE)
        );
        assert_eq!(poller.nread(), 3);
        assert!(poller.ready());

        assert!(matches!(
            poller.wait(Interest::WRITABLE, Some(Duration::ZERO)),
            Err(TermError::Closed)
        ));
        assert_eq!(
            poller.wait_writable(Some(Duration::ZERO)).unwrap(),
            Readiness::Unsupported
        );
    }

    #[test]
    fn test_zero_timeout_returns_immediately() {
        let (a, _b) = UnixStream::pair().unwrap();
        let poller = ReadinessPoller::new(&a);
        let start = Instant::now();
        assert_eq!(
            poller.wait(Interest::READABLE, Some(Duration::ZERO)).unwrap(),
            Readiness::TimedOut
        );
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[test]
    fn test_timeout_bound() {
        let (a, _b) = UnixStream::pair().unwrap();
        let poller = ReadinessPoller::new(&a);
        let start = Instant::now();
        let result = poller.wait(Interest::READABLE | Interest::PRIORITY, Some(Duration::from_millis(100)));
        let elapsed = start.elapsed();
        assert_eq!(result.unwrap(), Readiness::TimedOut);
        assert!(elapsed >= Duration::from_millis(100), "returned early: {:?}", elapsed);
        assert!(elapsed < Duration::from_millis(400), "returned late: {:?}", elapsed);
    }

    #[test]
    fn test_ready_subset() {
        let (a, mut b) = UnixStream::pair().unwrap();
        let poller = ReadinessPoller::new(&a);

        assert_eq!(
            poller.wait_writable(Some(Duration::ZERO)).unwrap(),
            Readiness::Ready(Interest::WRITABLE)
        );

        b.write_all(b"ping").unwrap();
        let result = poller
            .wait(Interest::READABLE | Interest::PRIORITY, Some(Duration::from_secs(1)))
            .unwrap();
        assert_eq!(result, Readiness::Ready(Interest::READABLE));
    }

    #[test]
    fn test_nread_accounting() {
        let (a, mut b) = UnixStream::pair().unwrap();
        let mut stream = BufferedStream::new(a);
        assert_eq!(ReadinessPoller::new(&stream).nread(), 0);

        b.write_all(b"hello").unwrap();
        assert!(ReadinessPoller::new(&stream)
            .wait_readable(Some(Duration::from_secs(1)))
            .unwrap()
            .is_ready());
        assert_eq!(ReadinessPoller::new(&stream).nread(), 5);
        assert_eq!(ReadinessPoller::new(&stream).nread(), 5);

        let mut two = [0u8; 2];
        stream.read_exact(&mut two).unwrap();
        assert_eq!(&two, b"he");
        assert_eq!(ReadinessPoller::new(&stream).nread(), 3);

        // Moving bytes into user space does not change the count.
        stream.fill().unwrap();
        assert_eq!(stream.buffered(), 3);
        assert_eq!(ReadinessPoller::new(&stream).nread(), 3);

        stream.read_byte().unwrap();
        assert_eq!(ReadinessPoller::new(&stream).nread(), 2);
    }

    #[test]
    fn test_hangup_reports_readable() {
        let (a, b) = UnixStream::pair().unwrap();
        drop(b);
        let poller = ReadinessPoller::new(&a);
        assert_eq!(
            poller.wait(Interest::READABLE, Some(Duration::from_secs(1))).unwrap(),
            Readiness::Ready(Interest::READABLE)
        );
    }

    #[test]
    fn test_closed_stream() {
        let (a, _b) = UnixStream::pair().unwrap();
        let mut stream = BufferedStream::new(a);
        stream.close();
        let poller = ReadinessPoller::new(&stream);
        assert!(matches!(
            poller.wait(Interest::READABLE, Some(Duration::ZERO)),
            Err(TermError::Closed)
        ));
        assert_eq!(
            poller.wait_readable(Some(Duration::ZERO)).unwrap(),
            Readiness::Unsupported
        );
        assert_eq!(poller.nread(), 0);
        assert!(!poller.ready());
    }

    struct Stale(RawDevice);

    impl Pollable for Stale {
        fn device(&self) -> Option<RawDevice> {
            Some(self.0)
        }
    }

    #[test]
    fn test_invalid_descriptor_is_closed() {
        // Far above any descriptor the test process opens.
        let stream = Stale(1_000_000);
        let poller = ReadinessPoller::new(&stream);
        assert!(matches!(
            poller.wait(Interest::READABLE, Some(Duration::from_millis(100))),
            Err(TermError::Closed)
        ));
        assert_eq!(
            poller.wait_readable(Some(Duration::ZERO)).unwrap(),
            Readiness::Unsupported
        );
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_pending_error_does_not_spin() {
        use std::net::UdpSocket;

        let closed_port = {
            let s = UdpSocket::bind("127.0.0.1:0").unwrap();
            s.local_addr().unwrap()
        };
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        socket.connect(closed_port).unwrap();
        socket.send(b"x").unwrap();

        let poller = ReadinessPoller::new(&socket);
        let start = Instant::now();
        let result = poller.wait(Interest::PRIORITY, Some(Duration::from_secs(2)));
        assert!(matches!(result, Err(TermError::Io(_))), "got {:?}", result);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[cfg(target_os = "linux")]
    mod interrupts {
        use super::*;
        use std::{mem, ptr, thread};

        extern "C" fn ignore(_: libc::c_int) {}

        /// Deliver SIGUSR1 to the calling thread after `delay`.
        fn signal_self_after(delay: Duration) -> thread::JoinHandle<()> {
            signal_self_at(&[delay])
        }

        /// Deliver SIGUSR1 to the calling thread once per entry, each delay
        /// measured from the previous signal.
        fn signal_self_at(delays: &[Duration]) -> thread::JoinHandle<()> {
            let delays = delays.to_vec();
            unsafe {
                let mut action: libc::sigaction = mem::zeroed();
                action.sa_sigaction = ignore as extern "C" fn(libc::c_int) as usize;
                libc::sigemptyset(&mut action.sa_mask);
                action.sa_flags = 0;
                libc::sigaction(libc::SIGUSR1, &action, ptr::null_mut());
            }
            let target = unsafe { libc::pthread_self() };
            thread::spawn(move || {
                for delay in delays {
                    thread::sleep(delay);
                    unsafe {
                        libc::pthread_kill(target, libc::SIGUSR1);
                    }
                }
            })
        }

        #[test]
        fn test_surface_policy_reports_interrupt() {
            let (a, _b) = UnixStream::pair().unwrap();
            let poller = ReadinessPoller::new(&a).with_policy(InterruptPolicy::Surface);
            let sender = signal_self_after(Duration::from_millis(50));
            let result = poller.wait(Interest::READABLE, Some(Duration::from_secs(5)));
            sender.join().unwrap();
            assert!(matches!(result, Err(TermError::Interrupted)));
        }

        #[test]
        fn test_retry_up_to_gives_up() {
            let (a, _b) = UnixStream::pair().unwrap();
            let poller = ReadinessPoller::new(&a).with_policy(InterruptPolicy::RetryUpTo(1));
            let sender = signal_self_at(&[Duration::from_millis(50), Duration::from_millis(100)]);
            let start = Instant::now();
            let result = poller.wait(Interest::READABLE, Some(Duration::from_secs(5)));
            let elapsed = start.elapsed();
            sender.join().unwrap();
            assert!(matches!(result, Err(TermError::Interrupted)));
            assert!(elapsed < Duration::from_secs(2));
        }

        #[test]
        fn test_retry_up_to_absorbs_fewer_signals() {
            let (a, _b) = UnixStream::pair().unwrap();
            let poller = ReadinessPoller::new(&a).with_policy(InterruptPolicy::RetryUpTo(1));
            let sender = signal_self_after(Duration::from_millis(50));
            let start = Instant::now();
            let result = poller.wait(Interest::READABLE, Some(Duration::from_millis(300)));
            let elapsed = start.elapsed();
            sender.join().unwrap();
            assert_eq!(result.unwrap(), Readiness::TimedOut);
            assert!(elapsed >= Duration::from_millis(300));
        }

        #[test]
        fn test_retry_policy_keeps_deadline() {
            let (a, _b) = UnixStream::pair().unwrap();
            let poller = ReadinessPoller::new(&a);
            assert_eq!(poller.policy(), InterruptPolicy::Retry);
            let sender = signal_self_after(Duration::from_millis(50));
            let start = Instant::now();
            let result = poller.wait(Interest::READABLE, Some(Duration::from_millis(300)));
            let elapsed = start.elapsed();
            sender.join().unwrap();
            assert_eq!(result.unwrap(), Readiness::TimedOut);
            assert!(elapsed >= Duration::from_millis(300));
            assert!(elapsed < Duration::from_millis(800));
        }
    }
}
