//! Collaborators the agent drives but does not implement
//!
//! Board crates (and the simulator) provide these. The agent only needs a
//! yes/no outcome from each of them plus an error it can log.

use core::fmt::Debug;
use core::future::Future;
use core::net::IpAddr;

use crate::resources::{ResourceDescriptor, ResourceValue};

/// Block storage backing the management client's identity and state
pub trait Storage {
    type Error: Debug;

    fn mount(&mut self) -> Result<(), Self::Error>;

    /// Wipe and recreate the filesystem
    fn format(&mut self) -> Result<(), Self::Error>;
}

/// Network link brought up after the modem is configured
pub trait NetworkInterface {
    type Error: Debug;

    /// One attach attempt (DHCP, PDP context, ...)
    fn connect(&mut self) -> impl Future<Output = Result<(), Self::Error>>;

    fn ip_address(&self) -> Option<IpAddr>;
}

/// Device-management protocol client
///
/// Implementations deliver asynchronous outcomes by posting
/// [`AgentEvent`](crate::events::AgentEvent)s: `Registered` exactly once
/// when registration succeeds, `DeliveryStatus` for every `notify`, and
/// `RemotePut`/`RemotePost` for server-initiated writes.
pub trait ManagementClient {
    type Error: Debug;

    fn init(&mut self) -> impl Future<Output = Result<(), Self::Error>>;

    /// Publish a resource so the server can see it once registered
    fn create_resource(&mut self, resource: &ResourceDescriptor<'_>) -> Result<(), Self::Error>;

    /// Start registration; completion is reported through the event queue
    fn register(&mut self) -> Result<(), Self::Error>;

    fn is_registered(&self) -> bool;

    /// Push the current value of an observable resource
    fn notify(&mut self, path: &str, value: &ResourceValue) -> Result<(), Self::Error>;
}

/// Analog input returning a reading normalized to `0.0..=1.0`
pub trait AnalogInput {
    fn read(&mut self) -> f32;
}
