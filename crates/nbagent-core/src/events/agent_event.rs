use crate::resources::{DeliveryStatus, PostPayload, ResourcePath, ResourceValue};

/// Maximum length of the endpoint name reported on registration
pub const MAX_ENDPOINT_NAME_LEN: usize = 64;

/// Endpoint identity assigned by the management server
pub type EndpointName = heapless::String<MAX_ENDPOINT_NAME_LEN>;

/// Deferred work for the agent's worker loop
///
/// Each variant names the work to do and carries whatever the posting
/// context captured for it.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    /// Falling edge on the user button
    ButtonPressed,
    /// Sensor ticker expired
    SensorTick,
    /// Registration completed; carries the endpoint name
    Registered(EndpointName),
    /// Server wrote a new value
    RemotePut {
        path: ResourcePath,
        value: ResourceValue,
    },
    /// Server executed a resource with a body
    RemotePost {
        path: ResourcePath,
        payload: PostPayload,
    },
    /// Outcome of a push-notification
    DeliveryStatus {
        path: ResourcePath,
        status: DeliveryStatus,
    },
}
