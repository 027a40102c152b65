//! Host stand-ins for the board peripherals and remote collaborators
//!
//! Every peripheral logs what the agent does to it, so a simulator run reads
//! like a device console.

use std::convert::Infallible;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use embassy_time::{Duration, Timer};
use embedded_hal::digital::{ErrorType as PinErrorType, InputPin, OutputPin};
use embedded_hal_async::digital::Wait;
use embedded_io_async::{ErrorType as IoErrorType, Write};
use log::{debug, info, warn};

use nbagent_core::events::{AgentEvent, AgentProducer, EndpointName};
use nbagent_core::platform::{AnalogInput, ManagementClient, NetworkInterface, Storage};
use nbagent_core::resources::{DeliveryStatus, ResourceDescriptor, ResourcePath, ResourceValue};

/// Modem UART; logs each complete line the agent writes
#[derive(Default)]
pub struct SimSerial {
    line: Vec<u8>,
}

impl IoErrorType for SimSerial {
    type Error = Infallible;
}

impl Write for SimSerial {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Infallible> {
        for &byte in buf {
            if byte == b'\n' {
                let text = String::from_utf8_lossy(&self.line);
                info!("modem <- {}", text.trim_end_matches('\r'));
                self.line.clear();
            } else {
                self.line.push(byte);
            }
        }
        Ok(buf.len())
    }

    async fn flush(&mut self) -> Result<(), Infallible> {
        Ok(())
    }
}

/// A GPIO line with a fixed input level that logs every output change
pub struct SimPin {
    name: &'static str,
    level: bool,
}

impl SimPin {
    pub fn output(name: &'static str) -> Self {
        Self { name, level: false }
    }

    pub fn input(name: &'static str, level: bool) -> Self {
        Self { name, level }
    }
}

impl PinErrorType for SimPin {
    type Error = Infallible;
}

impl OutputPin for SimPin {
    fn set_low(&mut self) -> Result<(), Infallible> {
        self.level = false;
        info!("{} -> low", self.name);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        self.level = true;
        info!("{} -> high", self.name);
        Ok(())
    }
}

impl InputPin for SimPin {
    fn is_high(&mut self) -> Result<bool, Infallible> {
        Ok(self.level)
    }

    fn is_low(&mut self) -> Result<bool, Infallible> {
        Ok(!self.level)
    }
}

/// User button pressed by a "user" at a fixed period
pub struct SimButton {
    period: Duration,
}

impl SimButton {
    pub fn new(period: Duration) -> Self {
        Self { period }
    }

    async fn press(&mut self) -> Result<(), Infallible> {
        Timer::after(self.period).await;
        debug!("button edge");
        Ok(())
    }
}

impl PinErrorType for SimButton {
    type Error = Infallible;
}

impl Wait for SimButton {
    async fn wait_for_high(&mut self) -> Result<(), Infallible> {
        self.press().await
    }

    async fn wait_for_low(&mut self) -> Result<(), Infallible> {
        self.press().await
    }

    async fn wait_for_rising_edge(&mut self) -> Result<(), Infallible> {
        self.press().await
    }

    async fn wait_for_falling_edge(&mut self) -> Result<(), Infallible> {
        self.press().await
    }

    async fn wait_for_any_edge(&mut self) -> Result<(), Infallible> {
        self.press().await
    }
}

/// Normalized sine wave sampled from wall-clock time
pub struct SineWave {
    start: Instant,
    period_secs: f32,
    offset: f32,
    amplitude: f32,
}

impl SineWave {
    pub fn new(period_secs: f32, offset: f32, amplitude: f32) -> Self {
        Self {
            start: Instant::now(),
            period_secs,
            offset,
            amplitude,
        }
    }
}

impl AnalogInput for SineWave {
    fn read(&mut self) -> f32 {
        let t = self.start.elapsed().as_secs_f32();
        let phase = t / self.period_secs * std::f32::consts::TAU;
        (self.offset + self.amplitude * phase.sin()).clamp(0.0, 1.0)
    }
}

#[derive(Default)]
pub struct SimStorage {
    pub mount_fails: bool,
}

impl Storage for SimStorage {
    type Error = &'static str;

    fn mount(&mut self) -> Result<(), &'static str> {
        if self.mount_fails {
            return Err("no filesystem found");
        }
        info!("storage mounted");
        Ok(())
    }

    fn format(&mut self) -> Result<(), &'static str> {
        info!("storage formatted");
        self.mount_fails = false;
        Ok(())
    }
}

/// Cellular link that needs a few tries before it attaches
pub struct SimNetwork {
    failures_left: u32,
    connected: bool,
}

impl SimNetwork {
    pub fn new(failures: u32) -> Self {
        Self {
            failures_left: failures,
            connected: false,
        }
    }
}

impl NetworkInterface for SimNetwork {
    type Error = &'static str;

    async fn connect(&mut self) -> Result<(), &'static str> {
        Timer::after(Duration::from_millis(500)).await;
        if self.failures_left > 0 {
            self.failures_left -= 1;
            return Err("attach rejected");
        }
        self.connected = true;
        Ok(())
    }

    fn ip_address(&self) -> Option<IpAddr> {
        self.connected
            .then_some(IpAddr::V4(Ipv4Addr::new(10, 64, 0, 17)))
    }
}

/// Management client that "registers" from a background thread
///
/// Like a real protocol stack it reports back through the event queue:
/// `Registered` once the registration delay elapses, and a `DeliveryStatus`
/// for every pushed value.
pub struct SimClient {
    producer: AgentProducer<'static>,
    registration_delay: std::time::Duration,
    registered: Arc<AtomicBool>,
}

impl SimClient {
    pub fn new(producer: AgentProducer<'static>, registration_delay: std::time::Duration) -> Self {
        Self {
            producer,
            registration_delay,
            registered: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl ManagementClient for SimClient {
    type Error = &'static str;

    async fn init(&mut self) -> Result<(), &'static str> {
        Timer::after(Duration::from_millis(200)).await;
        Ok(())
    }

    fn create_resource(&mut self, resource: &ResourceDescriptor<'_>) -> Result<(), &'static str> {
        info!(
            "client: resource {} \"{}\" {:?} observable={} value={}",
            resource.path,
            resource.display_name,
            resource.methods,
            resource.observable,
            resource.value
        );
        Ok(())
    }

    fn register(&mut self) -> Result<(), &'static str> {
        let producer = self.producer;
        let registered = Arc::clone(&self.registered);
        let delay = self.registration_delay;

        std::thread::spawn(move || {
            std::thread::sleep(delay);
            registered.store(true, Ordering::SeqCst);
            let endpoint = EndpointName::try_from("nbagent-sim-0001").unwrap_or_default();
            if producer.post(AgentEvent::Registered(endpoint)).is_err() {
                warn!("client: registration callback dropped");
            }
        });
        Ok(())
    }

    fn is_registered(&self) -> bool {
        self.registered.load(Ordering::SeqCst)
    }

    fn notify(&mut self, path: &str, value: &ResourceValue) -> Result<(), &'static str> {
        if !self.is_registered() {
            return Err("not registered");
        }
        info!("client: notify {} = {}", path, value);

        let path = ResourcePath::try_from(path).map_err(|_| "path too long")?;
        let _ = self.producer.post(AgentEvent::DeliveryStatus {
            path,
            status: DeliveryStatus::Delivered,
        });
        Ok(())
    }
}
