//! Application-wide state and error types for the agent

use core::fmt::{Debug, Write};

use log::{debug, warn};
use thiserror_no_std::Error;

use crate::resources::ResourceError;

/// Registration progress of the agent
///
/// The lifecycle only ever moves forward. Network attach may retry while in
/// `AwaitingNetwork`, and a registration callback that arrives after the wait
/// timed out still promotes `RegistrationTimedOut` to `Registered`. A client
/// that cannot even start registering ends in `ClientInitFailed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationState {
    NotStarted,
    AwaitingModem,
    AwaitingNetwork,
    ClientInitFailed,
    Registering,
    Registered,
    RegistrationTimedOut,
}

impl RegistrationState {
    /// Whether `next` is a legal successor of `self`
    pub const fn can_advance_to(self, next: RegistrationState) -> bool {
        use RegistrationState::*;
        matches!(
            (self, next),
            (NotStarted, AwaitingModem)
                | (AwaitingModem, AwaitingNetwork)
                | (AwaitingNetwork, AwaitingNetwork)
                | (AwaitingNetwork, ClientInitFailed)
                | (AwaitingNetwork, Registering)
                | (Registering, ClientInitFailed)
                | (Registering, Registered)
                | (Registering, RegistrationTimedOut)
                | (RegistrationTimedOut, Registered)
                | (Registered, Registered)
        )
    }

    /// Whether resource activity (sampling, button counting) may reach the table
    pub const fn is_registered(self) -> bool {
        matches!(self, RegistrationState::Registered)
    }

    /// Whether startup ended in a state the agent cannot continue from
    pub const fn is_fatal(self) -> bool {
        matches!(self, RegistrationState::ClientInitFailed)
    }
}

/// Shared holder for the registration state with logged transitions
#[derive(Debug)]
pub struct AgentState {
    registration: RegistrationState,
}

impl Default for AgentState {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentState {
    pub const fn new() -> Self {
        Self {
            registration: RegistrationState::NotStarted,
        }
    }

    pub fn registration(&self) -> RegistrationState {
        self.registration
    }

    /// Move to `next`, refusing transitions that would go backwards
    ///
    /// Returns `false` (and leaves the state untouched) for illegal moves.
    pub fn advance(&mut self, next: RegistrationState) -> bool {
        if !self.registration.can_advance_to(next) {
            warn!(
                "Ignoring registration transition {:?} -> {:?}",
                self.registration, next
            );
            return false;
        }
        if self.registration != next {
            debug!("Registration state {:?} -> {:?}", self.registration, next);
        }
        self.registration = next;
        true
    }
}

/// Fixed-size text attached to faults so they can be logged without allocating
pub type FaultDetail = heapless::String<64>;

/// Render any debuggable collaborator error into a [`FaultDetail`], truncated to fit
pub fn fault_detail<E: Debug + ?Sized>(error: &E) -> FaultDetail {
    struct Truncating(FaultDetail);

    impl Write for Truncating {
        fn write_str(&mut self, s: &str) -> core::fmt::Result {
            for c in s.chars() {
                if self.0.push(c).is_err() {
                    break;
                }
            }
            Ok(())
        }
    }

    let mut out = Truncating(FaultDetail::new());
    let _ = write!(out, "{:?}", error);
    out.0
}

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Storage fault: {0}")]
    Storage(FaultDetail),
    #[error("Network attach failed after {attempts} attempts: {detail}")]
    NetworkAttach { attempts: u8, detail: FaultDetail },
    #[error("Client initialization failed: {0}")]
    ClientInit(FaultDetail),
    #[error("Resource contract violated: {0}")]
    Resource(ResourceError),
    #[error("Notification delivery failed for {0}")]
    NotificationDelivery(FaultDetail),
    #[error("Lifecycle step out of order: {from:?} -> {to:?}")]
    Transition {
        from: RegistrationState,
        to: RegistrationState,
    },
}

impl From<ResourceError> for AgentError {
    fn from(value: ResourceError) -> Self {
        AgentError::Resource(value)
    }
}
