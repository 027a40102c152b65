//! The worker-thread event handler
//!
//! After startup the [`Agent`] owns the resource table, the management
//! client and the sensor sampler. Every dequeued [`AgentEvent`] is applied
//! here, then any notifications it scheduled are pushed to the client.

use log::{debug, error, info, warn};

use crate::app_state::{AgentError, AgentState, RegistrationState, fault_detail};
use crate::events::{AgentEvent, EndpointName, EventHandler};
use crate::lifecycle::AgentResources;
use crate::platform::ManagementClient;
use crate::resources::{Access, DeliveryStatus, ResourceTable, ResourceValue};
use crate::sensors::{Sensor, SensorSampler};

pub struct Agent<C, S> {
    state: AgentState,
    table: ResourceTable,
    client: C,
    resources: AgentResources,
    sampler: SensorSampler<S, 2>,
    endpoint: Option<EndpointName>,
}

impl<C, S> Agent<C, S>
where
    C: ManagementClient,
    S: Sensor<2>,
{
    /// Take over everything startup produced
    ///
    /// Without sensor resources the sensor is still read and logged on every
    /// tick, but nothing is published.
    pub fn new(
        state: AgentState,
        table: ResourceTable,
        client: C,
        resources: AgentResources,
        sensor: S,
    ) -> Self {
        let sampler = match resources.sensors {
            Some(bindings) => SensorSampler::new(sensor, bindings),
            None => SensorSampler::log_only(sensor),
        };

        Self {
            state,
            table,
            client,
            resources,
            sampler,
            endpoint: None,
        }
    }

    pub fn registration(&self) -> RegistrationState {
        self.state.registration()
    }

    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    pub fn table(&self) -> &ResourceTable {
        &self.table
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    fn on_button_pressed(&mut self) {
        let handle = self.resources.button_count;
        let count = self.table.get_value(handle).as_int().unwrap_or(0) + 1;
        info!("Button clicked {} times", count);
        // Local writes are never refused
        let _ = self
            .table
            .set_value(handle, Access::Local, ResourceValue::Int(count));
    }

    async fn on_sensor_tick(&mut self) {
        let state = self.state.registration();
        if let Err(e) = self.sampler.on_tick(&mut self.table, state).await {
            warn!("Sensor read failed: {}", e);
        }
    }

    fn on_registered(&mut self, endpoint: EndpointName) {
        if let Some(existing) = &self.endpoint {
            warn!(
                "Duplicate registration callback for {} (already {})",
                endpoint, existing
            );
            return;
        }
        info!("Registered to the management server. Endpoint: {}", endpoint);
        self.endpoint = Some(endpoint);
        self.state.advance(RegistrationState::Registered);
    }

    fn on_delivery_status(&mut self, path: &str, status: DeliveryStatus) {
        match self.table.find(path) {
            Some(handle) => self.table.report_delivery(handle, status),
            None => warn!("Delivery status {} for unknown resource {}", status.label(), path),
        }
    }

    /// Push every scheduled notification to the client
    ///
    /// A refused push is reported to the resource as not delivered; it is not
    /// retried.
    fn flush_notifications(&mut self) {
        while let Some(handle) = self.table.next_notification() {
            let resource = self.table.resource(handle);
            match self.client.notify(resource.path(), resource.value()) {
                Ok(()) => debug!("Notified {} = {}", resource.path(), resource.value()),
                Err(e) => {
                    let fault = AgentError::NotificationDelivery(fault_detail(&e));
                    error!("{} ({})", fault, resource.path());
                    self.table
                        .report_delivery(handle, DeliveryStatus::NotDelivered);
                }
            }
        }
    }
}

impl<C, S> EventHandler<AgentEvent> for Agent<C, S>
where
    C: ManagementClient,
    S: Sensor<2>,
{
    async fn handle(&mut self, event: AgentEvent) {
        match event {
            AgentEvent::ButtonPressed => self.on_button_pressed(),
            AgentEvent::SensorTick => self.on_sensor_tick().await,
            AgentEvent::Registered(endpoint) => self.on_registered(endpoint),
            AgentEvent::RemotePut { path, value } => {
                if let Err(e) = self.table.remote_put(&path, value) {
                    warn!("{}", AgentError::from(e));
                }
            }
            AgentEvent::RemotePost { path, payload } => {
                if let Err(e) = self.table.remote_post(&path, &payload) {
                    warn!("{}", AgentError::from(e));
                }
            }
            AgentEvent::DeliveryStatus { path, status } => self.on_delivery_status(&path, status),
        }

        self.flush_notifications();
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use alloc::boxed::Box;
    use alloc::string::String;
    use alloc::sync::Arc;
    use alloc::vec::Vec;
    use std::sync::Mutex;

    use crate::config::AgentConfig;
    use crate::events::AgentEventQueue;
    use crate::lifecycle::{BUTTON_COUNT_PATH, LED_STATE_PATH, RegistrationController};
    use crate::resources::ResourcePath;
    use crate::sensors::OnChipAdc;
    use crate::testing::{FakeAnalog, FakeClient, FakeClock, FakePin};
    use embassy_futures::block_on;

    type TestAgent = Agent<FakeClient, OnChipAdc<FakeAnalog, FakeAnalog>>;

    fn agent_in(state: RegistrationState, client: FakeClient) -> (TestAgent, FakePin) {
        let adc = OnChipAdc::new(FakeAnalog::constant(0.25), FakeAnalog::constant(0.5));
        agent_with(AgentConfig::default(), state, client, adc)
    }

    fn agent_with(
        config: AgentConfig,
        state: RegistrationState,
        client: FakeClient,
        adc: OnChipAdc<FakeAnalog, FakeAnalog>,
    ) -> (TestAgent, FakePin) {
        let controller = RegistrationController::new(config);
        let mut table = ResourceTable::new();
        let mut client = client;
        let led = FakePin::new(FakeClock::new());
        let resources = controller
            .create_resources(&mut table, &mut client, led.clone())
            .unwrap();

        let mut agent_state = AgentState::new();
        for step in [
            RegistrationState::AwaitingModem,
            RegistrationState::AwaitingNetwork,
            RegistrationState::Registering,
            state,
        ] {
            agent_state.advance(step);
        }

        (Agent::new(agent_state, table, client, resources, adc), led)
    }

    fn endpoint(name: &str) -> EndpointName {
        EndpointName::try_from(name).unwrap()
    }

    fn path(p: &str) -> ResourcePath {
        ResourcePath::try_from(p).unwrap()
    }

    #[test]
    fn test_five_button_edges_count_five() {
        let queue = AgentEventQueue::new();
        let (mut agent, _) = agent_in(RegistrationState::Registered, FakeClient::default());
        let producer = queue.producer();

        for _ in 0..5 {
            producer.post(AgentEvent::ButtonPressed).unwrap();
        }
        // Nothing happens until the worker runs
        assert_eq!(
            *agent.table().get_value(agent.resources.button_count),
            ResourceValue::Int(0)
        );

        block_on(queue.dispatch_next(&mut agent));
        assert_eq!(block_on(queue.dispatch_pending(&mut agent)), 4);

        assert_eq!(
            *agent.table().get_value(agent.resources.button_count),
            ResourceValue::Int(5)
        );
        let last = agent.client().notified.last().unwrap();
        assert_eq!(
            last,
            &(String::from(BUTTON_COUNT_PATH), ResourceValue::Int(5))
        );
    }

    #[test]
    fn test_ticks_only_sample_once_registered() {
        let queue = AgentEventQueue::new();
        let (mut agent, _) =
            agent_in(RegistrationState::RegistrationTimedOut, FakeClient::default());
        let producer = queue.producer();
        let sensors = agent.resources.sensors.unwrap();

        producer.post(AgentEvent::SensorTick).unwrap();
        block_on(queue.dispatch_pending(&mut agent));
        assert_eq!(*agent.table().get_value(sensors[0]), ResourceValue::Int(0));
        assert!(agent.client().notified.is_empty());

        // A late registration callback still promotes the agent
        producer
            .post(AgentEvent::Registered(endpoint("node-1")))
            .unwrap();
        producer.post(AgentEvent::SensorTick).unwrap();
        block_on(queue.dispatch_pending(&mut agent));

        assert_eq!(agent.registration(), RegistrationState::Registered);
        assert_eq!(*agent.table().get_value(sensors[0]), ResourceValue::Float(25.0));
        assert_eq!(*agent.table().get_value(sensors[1]), ResourceValue::Float(0.5));
        assert_eq!(agent.client().notified.len(), 2);
    }

    #[test]
    fn test_duplicate_registration_keeps_first_endpoint() {
        let (mut agent, _) = agent_in(RegistrationState::Registering, FakeClient::default());

        block_on(agent.handle(AgentEvent::Registered(endpoint("first"))));
        block_on(agent.handle(AgentEvent::Registered(endpoint("second"))));

        assert_eq!(agent.endpoint(), Some("first"));
        assert_eq!(agent.registration(), RegistrationState::Registered);
    }

    #[test]
    fn test_remote_put_drives_led_and_rejections_are_not_fatal() {
        let (mut agent, led) = agent_in(RegistrationState::Registered, FakeClient::default());

        block_on(agent.handle(AgentEvent::RemotePut {
            path: path(LED_STATE_PATH),
            value: ResourceValue::Int(1),
        }));
        assert!(led.level());

        // GET-only resource: refused, value untouched
        block_on(agent.handle(AgentEvent::RemotePut {
            path: path(BUTTON_COUNT_PATH),
            value: ResourceValue::Int(99),
        }));
        block_on(agent.handle(AgentEvent::RemotePut {
            path: path("9999/0/1"),
            value: ResourceValue::Int(1),
        }));

        assert_eq!(
            *agent.table().get_value(agent.resources.button_count),
            ResourceValue::Int(0)
        );
    }

    #[test]
    fn test_failed_push_is_reported_not_delivered() {
        let client = FakeClient {
            notify_fails: true,
            ..FakeClient::default()
        };
        let (mut agent, _) = agent_in(RegistrationState::Registered, client);

        let statuses: Arc<Mutex<Vec<DeliveryStatus>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&statuses);
        agent
            .table
            .resource_mut(agent.resources.button_count)
            .attach_notification_callback(Box::new(move |_: &str, status: DeliveryStatus| {
                sink.lock().unwrap().push(status);
            }));

        block_on(agent.handle(AgentEvent::ButtonPressed));

        assert!(agent.client().notified.is_empty());
        assert_eq!(*statuses.lock().unwrap(), [DeliveryStatus::NotDelivered]);
        assert_eq!(
            *agent.table().get_value(agent.resources.button_count),
            ResourceValue::Int(1)
        );

        // Later outcomes from the client still reach the same callback
        block_on(agent.handle(AgentEvent::DeliveryStatus {
            path: path(BUTTON_COUNT_PATH),
            status: DeliveryStatus::Delivered,
        }));
        assert_eq!(
            *statuses.lock().unwrap(),
            [DeliveryStatus::NotDelivered, DeliveryStatus::Delivered]
        );
    }

    #[test]
    fn test_ticks_without_sensor_resources_still_read() {
        let config = AgentConfig {
            send_all_sensors: false,
            ..AgentConfig::default()
        };
        let temperature = FakeAnalog::constant(0.25);
        let adc = OnChipAdc::new(temperature.clone(), FakeAnalog::constant(0.5));
        let (mut agent, _) =
            agent_with(config, RegistrationState::Registered, FakeClient::default(), adc);

        block_on(agent.handle(AgentEvent::SensorTick));
        block_on(agent.handle(AgentEvent::SensorTick));

        assert_eq!(temperature.reads(), 2);
        assert_eq!(agent.table().len(), 2);
        assert!(agent.client().notified.is_empty());
    }
}
