//! Startup sequence from power-on to a registered device
//!
//! The [`RegistrationController`] runs each step once, in order, on the main
//! thread before the event loop starts:
//!
//! 1. storage mount (and optional format on request)
//! 2. modem bring-up over serial
//! 3. network attach with bounded retries
//! 4. management client init
//! 5. resource creation, mirrored into the client
//! 6. registration, waiting a bounded time for the server
//!
//! Storage problems are logged and startup carries on degraded. A failed
//! network attach, client init or registration start is fatal and ends in
//! [`RegistrationState::ClientInitFailed`]. Calling a step out of order is an
//! [`AgentError::Transition`] and leaves the state untouched.

use alloc::boxed::Box;

use embedded_hal::digital::{InputPin, OutputPin};
use embedded_hal_async::delay::DelayNs;
use embedded_io_async::Write;
use log::{debug, error, info, warn};

use crate::app_state::{AgentError, AgentState, RegistrationState, fault_detail};
use crate::config::AgentConfig;
use crate::modem::{ModemSequenceStep, ModemSequencer, SequenceReport};
use crate::platform::{ManagementClient, NetworkInterface, Storage};
use crate::resources::{
    DeliveryStatus, Methods, PutCallback, ResourceHandle, ResourceTable, ResourceValue,
};

pub const BUTTON_COUNT_PATH: &str = "3200/0/5501";
pub const LED_STATE_PATH: &str = "3201/0/5853";
pub const TEMPERATURE_PATH: &str = "3303/2/5700";
pub const VOLTAGE_PATH: &str = "3316/0/5700";

/// Handles of the resources created at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentResources {
    pub button_count: ResourceHandle,
    pub led_state: ResourceHandle,
    /// Temperature and voltage, in sampler order; `None` unless sensors are enabled
    pub sensors: Option<[ResourceHandle; 2]>,
}

/// Result of the storage step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageOutcome {
    Mounted,
    Formatted,
}

pub struct RegistrationController {
    config: AgentConfig,
    state: AgentState,
}

impl RegistrationController {
    pub fn new(config: AgentConfig) -> Self {
        Self {
            config,
            state: AgentState::new(),
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn registration(&self) -> RegistrationState {
        self.state.registration()
    }

    /// Hand the state over to the worker once startup is done
    pub fn into_state(self) -> AgentState {
        self.state
    }

    /// Mount storage, formatting it if the mount failed or the user asked
    ///
    /// The format request is the button held through the format window; it
    /// is sampled exactly once. At most one format is attempted.
    pub async fn prepare_storage<S, B, D>(
        &mut self,
        storage: &mut S,
        format_button: &mut B,
        delay: &mut D,
    ) -> Result<StorageOutcome, AgentError>
    where
        S: Storage,
        B: InputPin,
        D: DelayNs,
    {
        delay.delay_ms(self.config.boot_delay_ms).await;

        let mount = storage.mount();
        if let Err(e) = &mount {
            warn!("Storage mount failed: {:?}", e);
        }

        info!("Hold the button to format the storage");
        delay.delay_ms(self.config.format_window_ms).await;

        let format_requested = match self.button_pressed(format_button) {
            Ok(pressed) => pressed,
            Err(e) => {
                warn!("Could not read the format button: {:?}", e);
                false
            }
        };

        if format_requested {
            info!("Button held at boot, formatting storage");
        } else if mount.is_ok() {
            return Ok(StorageOutcome::Mounted);
        }

        match storage.format() {
            Ok(()) => {
                info!("Storage formatted");
                Ok(StorageOutcome::Formatted)
            }
            Err(e) => {
                error!("Storage format failed: {:?}", e);
                Err(AgentError::Storage(fault_detail(&e)))
            }
        }
    }

    /// Configure the modem; the sequencer and its serial link are consumed
    pub async fn bring_up_modem<S, R, D>(
        &mut self,
        sequencer: ModemSequencer<S, R>,
        delay: &mut D,
        plan: &[ModemSequenceStep],
    ) -> Result<SequenceReport, AgentError>
    where
        S: Write,
        R: OutputPin,
        D: DelayNs,
    {
        self.step(RegistrationState::AwaitingModem)?;
        let report = sequencer.run(delay, plan).await;
        self.step(RegistrationState::AwaitingNetwork)?;
        Ok(report)
    }

    /// Attach to the network, trying at most `network_attach_attempts` times
    pub async fn attach_network<N: NetworkInterface>(
        &mut self,
        network: &mut N,
    ) -> Result<(), AgentError> {
        let attempts = self.config.network_attach_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            self.step(RegistrationState::AwaitingNetwork)?;
            match network.connect().await {
                Ok(()) => {
                    match network.ip_address() {
                        Some(ip) => info!("Connected to the network, IP {}", ip),
                        None => info!("Connected to the network"),
                    }
                    return Ok(());
                }
                Err(e) => {
                    warn!(
                        "Network attach attempt {}/{} failed: {:?}",
                        attempt, attempts, e
                    );
                    last_error = Some(fault_detail(&e));
                }
            }
        }

        error!("Connecting to the network failed after {} attempts", attempts);
        self.step(RegistrationState::ClientInitFailed)?;
        Err(AgentError::NetworkAttach {
            attempts,
            detail: last_error.unwrap_or_default(),
        })
    }

    /// Initialize the management client once; failure is not retried
    pub async fn init_client<C: ManagementClient>(
        &mut self,
        client: &mut C,
    ) -> Result<(), AgentError> {
        self.expect_state(RegistrationState::AwaitingNetwork, RegistrationState::Registering)?;
        if let Err(e) = client.init().await {
            error!("Management client initialization failed: {:?}", e);
            self.step(RegistrationState::ClientInitFailed)?;
            return Err(AgentError::ClientInit(fault_detail(&e)));
        }
        info!("Management client initialized");
        self.step(RegistrationState::Registering)
    }

    /// Create the agent's resources and publish them to the client
    ///
    /// PUTs on the LED resource drive `led`: zero switches it off, anything
    /// else on.
    pub fn create_resources<C, L>(
        &self,
        table: &mut ResourceTable,
        client: &mut C,
        led: L,
    ) -> Result<AgentResources, AgentError>
    where
        C: ManagementClient,
        L: OutputPin + Send + 'static,
    {
        let button_count = table.create(BUTTON_COUNT_PATH, "Button Count")?;
        table
            .resource_mut(button_count)
            .initial_value(ResourceValue::Int(0))
            .methods(Methods::GET)
            .observable(true)
            .attach_notification_callback(Box::new(|path: &str, status: DeliveryStatus| {
                info!("Button notification on {}: {}", path, status.label());
            }));

        // The LED starts lit, matching the resource's initial value
        let mut led = led;
        if let Err(e) = led.set_high() {
            warn!("Failed to switch the LED on: {:?}", e);
        }
        let led_state = table.create(LED_STATE_PATH, "LED State")?;
        table
            .resource_mut(led_state)
            .initial_value(ResourceValue::Int(1))
            .methods(Methods::GET | Methods::PUT)
            .attach_put_callback(led_driver(led));

        let sensors = if self.config.send_all_sensors {
            let temperature = table.create(TEMPERATURE_PATH, "Temperature ADC (C)")?;
            let voltage = table.create(VOLTAGE_PATH, "Voltage")?;
            for handle in [temperature, voltage] {
                table
                    .resource_mut(handle)
                    .methods(Methods::GET)
                    .observable(true);
            }
            Some([temperature, voltage])
        } else {
            None
        };

        for handle in table.handles() {
            let descriptor = table.descriptor(handle);
            client.create_resource(&descriptor).map_err(|e| {
                error!("Client refused resource {}: {:?}", descriptor.path, e);
                AgentError::ClientInit(fault_detail(&e))
            })?;
        }
        info!("Created {} resources", table.len());

        Ok(AgentResources {
            button_count,
            led_state,
            sensors,
        })
    }

    /// Start registration and wait a bounded time for it to complete
    ///
    /// Registered and timed out both let the agent continue; a registration
    /// reported later through the event queue still promotes a timed out
    /// agent. A client that refuses to start registering is fatal.
    pub async fn register<C, D>(
        &mut self,
        client: &mut C,
        delay: &mut D,
    ) -> Result<RegistrationState, AgentError>
    where
        C: ManagementClient,
        D: DelayNs,
    {
        self.expect_state(RegistrationState::Registering, RegistrationState::Registered)?;

        info!("Registering with the management server");
        if let Err(e) = client.register() {
            error!("Registration could not be started: {:?}", e);
            self.step(RegistrationState::ClientInitFailed)?;
            return Err(AgentError::ClientInit(fault_detail(&e)));
        }

        let polls = self.config.registration_polls();
        for poll in 0..polls {
            if client.is_registered() {
                debug!("Registered after {} polls", poll);
                self.step(RegistrationState::Registered)?;
                return Ok(self.state.registration());
            }
            delay.delay_ms(self.config.registration_poll_ms).await;
        }

        if client.is_registered() {
            self.step(RegistrationState::Registered)?;
        } else {
            warn!(
                "Not registered after {} ms, continuing without",
                self.config.registration_timeout_ms
            );
            self.step(RegistrationState::RegistrationTimedOut)?;
        }
        Ok(self.state.registration())
    }

    fn step(&mut self, next: RegistrationState) -> Result<(), AgentError> {
        let from = self.state.registration();
        if self.state.advance(next) {
            Ok(())
        } else {
            Err(AgentError::Transition { from, to: next })
        }
    }

    /// Refuse to run a step unless the previous one left us in `required`
    fn expect_state(
        &self,
        required: RegistrationState,
        next: RegistrationState,
    ) -> Result<(), AgentError> {
        let from = self.state.registration();
        if from == required {
            Ok(())
        } else {
            warn!("{:?} step needs {:?}, but state is {:?}", next, required, from);
            Err(AgentError::Transition { from, to: next })
        }
    }

    fn button_pressed<B: InputPin>(&self, button: &mut B) -> Result<bool, B::Error> {
        if self.config.button_active_low {
            button.is_low()
        } else {
            button.is_high()
        }
    }
}

fn led_driver<L>(mut led: L) -> PutCallback
where
    L: OutputPin + Send + 'static,
{
    Box::new(move |path: &str, value: &ResourceValue| {
        let on = value.as_int().is_some_and(|v| v != 0);
        let result = if on { led.set_high() } else { led.set_low() };
        match result {
            Ok(()) => info!("PUT on {}: LED {}", path, if on { "on" } else { "off" }),
            Err(e) => warn!("PUT on {}: failed to drive LED: {:?}", path, e),
        }
    })
}
