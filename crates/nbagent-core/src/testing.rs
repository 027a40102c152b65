//! Host-side fakes for unit tests
//!
//! Everything time-related runs on a virtual clock that only moves when a
//! [`FakeDelay`] is awaited, so sequencing tests are exact and instant.

extern crate std;

use core::convert::Infallible;
use core::net::{IpAddr, Ipv4Addr};
use std::string::String;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::vec::Vec;

use embedded_hal::digital::{ErrorType as PinErrorType, InputPin, OutputPin};
use embedded_hal_async::delay::DelayNs;
use embedded_io_async::{ErrorKind, ErrorType as IoErrorType, Write};

use crate::platform::{AnalogInput, ManagementClient, NetworkInterface, Storage};
use crate::resources::{Methods, ResourceDescriptor, ResourceValue};

/// Shared virtual clock in nanoseconds
#[derive(Clone, Default)]
pub struct FakeClock {
    now_ns: Arc<AtomicU64>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now_ms(&self) -> u64 {
        self.now_ns.load(Ordering::SeqCst) / 1_000_000
    }

    pub fn delay(&self) -> FakeDelay {
        FakeDelay {
            clock: self.clone(),
        }
    }

    fn advance_ns(&self, ns: u64) {
        self.now_ns.fetch_add(ns, Ordering::SeqCst);
    }
}

/// Delay that advances the shared clock instead of sleeping
pub struct FakeDelay {
    clock: FakeClock,
}

impl DelayNs for FakeDelay {
    async fn delay_ns(&mut self, ns: u32) {
        self.clock.advance_ns(ns as u64);
    }

    async fn delay_ms(&mut self, ms: u32) {
        self.clock.advance_ns(ms as u64 * 1_000_000);
    }
}

/// One line captured by [`FakeSerial`]
#[derive(Debug, Clone)]
pub struct CapturedLine {
    pub text: String,
    /// Clock time of the line's first byte
    pub at_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FakeIoError;

impl core::fmt::Display for FakeIoError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("serial write failed")
    }
}

impl core::error::Error for FakeIoError {}

impl embedded_io_async::Error for FakeIoError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

/// Serial sink that splits written bytes into timestamped lines
pub struct FakeSerial {
    clock: FakeClock,
    partial: Vec<u8>,
    partial_at_ms: u64,
    lines: Vec<CapturedLine>,
    fail_writes: bool,
}

impl FakeSerial {
    pub fn new(clock: FakeClock) -> Self {
        Self {
            clock,
            partial: Vec::new(),
            partial_at_ms: 0,
            lines: Vec::new(),
            fail_writes: false,
        }
    }

    pub fn fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }

    pub fn lines(&self) -> Vec<CapturedLine> {
        self.lines.clone()
    }
}

impl IoErrorType for FakeSerial {
    type Error = FakeIoError;
}

impl Write for FakeSerial {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, FakeIoError> {
        if self.fail_writes {
            return Err(FakeIoError);
        }
        for &byte in buf {
            if self.partial.is_empty() {
                self.partial_at_ms = self.clock.now_ms();
            }
            self.partial.push(byte);
            if self.partial.ends_with(b"\r\n") {
                let text = String::from_utf8_lossy(&self.partial[..self.partial.len() - 2]);
                self.lines.push(CapturedLine {
                    text: text.into_owned(),
                    at_ms: self.partial_at_ms,
                });
                self.partial.clear();
            }
        }
        Ok(buf.len())
    }

    async fn flush(&mut self) -> Result<(), FakeIoError> {
        Ok(())
    }
}

struct PinState {
    level: bool,
    transitions: Vec<(u64, bool)>,
}

/// Digital pin recording every level it is driven to
///
/// Clones share the same line, so a test can keep one while the code under
/// test owns another.
#[derive(Clone)]
pub struct FakePin {
    clock: FakeClock,
    state: Arc<Mutex<PinState>>,
}

impl FakePin {
    pub fn new(clock: FakeClock) -> Self {
        Self {
            clock,
            state: Arc::new(Mutex::new(PinState {
                level: false,
                transitions: Vec::new(),
            })),
        }
    }

    /// Input pin held at `level`
    pub fn held(level: bool) -> Self {
        let pin = Self::new(FakeClock::new());
        pin.state.lock().unwrap().level = level;
        pin
    }

    pub fn level(&self) -> bool {
        self.state.lock().unwrap().level
    }

    pub fn transitions(&self) -> Vec<(u64, bool)> {
        self.state.lock().unwrap().transitions.clone()
    }

    fn drive(&self, level: bool) {
        let mut state = self.state.lock().unwrap();
        state.level = level;
        state.transitions.push((self.clock.now_ms(), level));
    }
}

impl PinErrorType for FakePin {
    type Error = Infallible;
}

impl OutputPin for FakePin {
    fn set_low(&mut self) -> Result<(), Infallible> {
        self.drive(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        self.drive(true);
        Ok(())
    }
}

impl InputPin for FakePin {
    fn is_high(&mut self) -> Result<bool, Infallible> {
        Ok(self.level())
    }

    fn is_low(&mut self) -> Result<bool, Infallible> {
        Ok(!self.level())
    }
}

/// Analog input with a fixed reading; clones share the read counter
#[derive(Clone)]
pub struct FakeAnalog {
    value: f32,
    reads: Arc<AtomicUsize>,
}

impl FakeAnalog {
    pub fn constant(value: f32) -> Self {
        Self {
            value,
            reads: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl AnalogInput for FakeAnalog {
    fn read(&mut self) -> f32 {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.value
    }
}

#[derive(Default)]
pub struct FakeStorage {
    pub mount_fails: bool,
    pub format_fails: bool,
    pub mounts: usize,
    pub formats: usize,
}

impl Storage for FakeStorage {
    type Error = &'static str;

    fn mount(&mut self) -> Result<(), &'static str> {
        self.mounts += 1;
        if self.mount_fails {
            Err("no filesystem")
        } else {
            Ok(())
        }
    }

    fn format(&mut self) -> Result<(), &'static str> {
        self.formats += 1;
        if self.format_fails {
            Err("format failed")
        } else {
            Ok(())
        }
    }
}

/// Network that fails a scripted number of attempts before connecting
#[derive(Default)]
pub struct FakeNetwork {
    pub failures_before_success: u32,
    pub attempts: u32,
    connected: bool,
}

impl FakeNetwork {
    pub fn failing(failures_before_success: u32) -> Self {
        Self {
            failures_before_success,
            ..Self::default()
        }
    }
}

impl NetworkInterface for FakeNetwork {
    type Error = &'static str;

    async fn connect(&mut self) -> Result<(), &'static str> {
        self.attempts += 1;
        if self.attempts <= self.failures_before_success {
            Err("no carrier")
        } else {
            self.connected = true;
            Ok(())
        }
    }

    fn ip_address(&self) -> Option<IpAddr> {
        self.connected
            .then_some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)))
    }
}

/// A resource as the client saw it at creation time
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedResource {
    pub path: String,
    pub display_name: String,
    pub methods: Methods,
    pub observable: bool,
    pub value: ResourceValue,
}

#[derive(Default)]
pub struct FakeClient {
    pub init_fails: bool,
    pub register_fails: bool,
    pub notify_fails: bool,
    /// Report registered once this many `is_registered` polls have happened
    pub registers_after_polls: Option<u32>,
    pub register_calls: usize,
    pub created: Vec<PublishedResource>,
    pub notified: Vec<(String, ResourceValue)>,
    /// `is_registered` calls so far
    pub polls: core::cell::Cell<u32>,
}

impl ManagementClient for FakeClient {
    type Error = &'static str;

    async fn init(&mut self) -> Result<(), &'static str> {
        if self.init_fails {
            Err("init refused")
        } else {
            Ok(())
        }
    }

    fn create_resource(&mut self, resource: &ResourceDescriptor<'_>) -> Result<(), &'static str> {
        self.created.push(PublishedResource {
            path: resource.path.into(),
            display_name: resource.display_name.into(),
            methods: resource.methods,
            observable: resource.observable,
            value: resource.value.clone(),
        });
        Ok(())
    }

    fn register(&mut self) -> Result<(), &'static str> {
        self.register_calls += 1;
        if self.register_fails {
            Err("registration refused")
        } else {
            Ok(())
        }
    }

    fn is_registered(&self) -> bool {
        let polls = self.polls.get() + 1;
        self.polls.set(polls);
        self.registers_after_polls.is_some_and(|after| polls >= after)
    }

    fn notify(&mut self, path: &str, value: &ResourceValue) -> Result<(), &'static str> {
        if self.notify_fails {
            return Err("link down");
        }
        self.notified.push((path.into(), value.clone()));
        Ok(())
    }
}
