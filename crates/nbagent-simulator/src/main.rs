//! Desktop simulator for the nbagent NB-IoT device-management agent.
//!
//! Runs the real startup lifecycle and event loop from `nbagent-core`
//! against simulated peripherals: a logging modem UART, a flaky network,
//! a management client that registers from a background thread and a user
//! who presses the button now and then.
//!
//! # Environment
//!
//! Read from the process environment or a `.env` file.
//!
//! | Variable                              | Default |
//! |---------------------------------------|---------|
//! | `NBAGENT_BOOT_DELAY_MS`               | 1000    |
//! | `NBAGENT_FORMAT_WINDOW_MS`            | 3000    |
//! | `NBAGENT_NETWORK_ATTACH_ATTEMPTS`     | 3       |
//! | `NBAGENT_REGISTRATION_TIMEOUT_MS`     | 60000   |
//! | `NBAGENT_SENSOR_POLL_INTERVAL_MS`     | 3000    |
//! | `NBAGENT_SEND_ALL_SENSORS`            | true    |
//! | `NBAGENT_SIM_NETWORK_FAILURES`        | 1       |
//! | `NBAGENT_SIM_REGISTRATION_DELAY_MS`   | 4000    |
//! | `NBAGENT_SIM_BUTTON_PERIOD_MS`        | 7000    |
//! | `NBAGENT_SIM_REMOTE_PUT_PERIOD_MS`    | 11000   |
//! | `NBAGENT_SIM_FORMAT_STORAGE`          | false   |

mod peripherals;

use std::str::FromStr;

use embassy_executor::Spawner;
use embassy_time::{Delay, Duration, Ticker};
use log::{error, info, warn};

use nbagent_core::agent::Agent;
use nbagent_core::config::AgentConfig;
use nbagent_core::events::{
    AgentEvent, AgentEventQueue, AgentProducer, run_sensor_ticker, watch_button,
};
use nbagent_core::lifecycle::{LED_STATE_PATH, RegistrationController};
use nbagent_core::modem::{ModemSequencer, bc95};
use nbagent_core::resources::{ResourcePath, ResourceTable, ResourceValue};
use nbagent_core::sensors::OnChipAdc;

use peripherals::{SimButton, SimClient, SimNetwork, SimPin, SimSerial, SimStorage, SineWave};

static EVENTS: AgentEventQueue = AgentEventQueue::new();

/// Knobs for the simulated world, as opposed to the agent itself
struct SimSettings {
    network_failures: u32,
    registration_delay_ms: u64,
    button_period_ms: u64,
    remote_put_period_ms: u64,
    format_storage: bool,
}

/// Parse `key` from the environment, falling back to `default`
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("Ignoring unparsable {}={:?}", key, raw);
            default
        }),
        Err(_) => default,
    }
}

fn load_config() -> AgentConfig {
    let defaults = AgentConfig::default();
    AgentConfig {
        boot_delay_ms: env_or("NBAGENT_BOOT_DELAY_MS", defaults.boot_delay_ms),
        format_window_ms: env_or("NBAGENT_FORMAT_WINDOW_MS", defaults.format_window_ms),
        network_attach_attempts: env_or(
            "NBAGENT_NETWORK_ATTACH_ATTEMPTS",
            defaults.network_attach_attempts,
        ),
        registration_timeout_ms: env_or(
            "NBAGENT_REGISTRATION_TIMEOUT_MS",
            defaults.registration_timeout_ms,
        ),
        sensor_poll_interval_ms: env_or(
            "NBAGENT_SENSOR_POLL_INTERVAL_MS",
            defaults.sensor_poll_interval_ms,
        ),
        send_all_sensors: env_or("NBAGENT_SEND_ALL_SENSORS", defaults.send_all_sensors),
        ..defaults
    }
}

fn load_sim_settings() -> SimSettings {
    SimSettings {
        network_failures: env_or("NBAGENT_SIM_NETWORK_FAILURES", 1),
        registration_delay_ms: env_or("NBAGENT_SIM_REGISTRATION_DELAY_MS", 4000),
        button_period_ms: env_or("NBAGENT_SIM_BUTTON_PERIOD_MS", 7000),
        remote_put_period_ms: env_or("NBAGENT_SIM_REMOTE_PUT_PERIOD_MS", 11000),
        format_storage: env_or("NBAGENT_SIM_FORMAT_STORAGE", false),
    }
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

#[embassy_executor::task]
async fn sensor_ticker(producer: AgentProducer<'static>, period: Duration) {
    run_sensor_ticker(producer, period).await
}

#[embassy_executor::task]
async fn button(button: SimButton, active_low: bool, producer: AgentProducer<'static>) {
    watch_button(button, active_low, producer).await
}

/// The server toggling the LED resource now and then
#[embassy_executor::task]
async fn remote_server(producer: AgentProducer<'static>, period: Duration) {
    let mut ticker = Ticker::every(period);
    let mut on = false;
    loop {
        ticker.next().await;
        let Ok(path) = ResourcePath::try_from(LED_STATE_PATH) else {
            return;
        };
        info!("server: PUT {} = {}", path, on as i64);
        let _ = producer.post(AgentEvent::RemotePut {
            path,
            value: ResourceValue::Int(on as i64),
        });
        on = !on;
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    let dotenv = dotenvy::dotenv();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Ok(path) = dotenv {
        info!("Loaded overrides from {}", path.display());
    }

    let config = load_config();
    let sim = load_sim_settings();
    info!("Starting nbagent simulator");
    info!("{:?}", config);

    let mut delay = Delay;
    let mut controller = RegistrationController::new(config.clone());

    // Storage problems only degrade the device
    let mut storage = SimStorage::default();
    // The button reads low while held
    let mut format_button = SimPin::input("format button", !sim.format_storage);
    if let Err(e) = controller
        .prepare_storage(&mut storage, &mut format_button, &mut delay)
        .await
    {
        warn!("{}; continuing without storage", e);
    }

    let sequencer = ModemSequencer::new(SimSerial::default(), SimPin::output("modem reset"));
    match controller
        .bring_up_modem(sequencer, &mut delay, bc95::BRING_UP)
        .await
    {
        Ok(report) => info!("{:?}", report),
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    }

    let mut network = SimNetwork::new(sim.network_failures);
    if let Err(e) = controller.attach_network(&mut network).await {
        error!("{}", e);
        std::process::exit(1);
    }

    let mut client = SimClient::new(
        EVENTS.producer(),
        std::time::Duration::from_millis(sim.registration_delay_ms),
    );
    if let Err(e) = controller.init_client(&mut client).await {
        error!("{}", e);
        std::process::exit(1);
    }

    let mut table = ResourceTable::new();
    let resources = match controller.create_resources(&mut table, &mut client, SimPin::output("LED"))
    {
        Ok(resources) => resources,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    match controller.register(&mut client, &mut delay).await {
        Ok(state) => info!("Registration wait finished: {:?}", state),
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    }

    // Event sources only start once the registration wait is over
    if let Err(e) = spawner.spawn(sensor_ticker(
        EVENTS.producer(),
        config.sensor_poll_interval(),
    )) {
        error!("Could not start the sensor ticker: {:?}", e);
    }
    let sim_button = SimButton::new(Duration::from_millis(sim.button_period_ms));
    if let Err(e) = spawner.spawn(button(
        sim_button,
        config.button_active_low,
        EVENTS.producer(),
    )) {
        error!("Could not start the button watcher: {:?}", e);
    }
    if let Err(e) = spawner.spawn(remote_server(
        EVENTS.producer(),
        Duration::from_millis(sim.remote_put_period_ms),
    )) {
        error!("Could not start the remote server: {:?}", e);
    }

    let adc = OnChipAdc::new(SineWave::new(60.0, 0.24, 0.03), SineWave::new(45.0, 0.5, 0.2));
    let mut agent = Agent::new(controller.into_state(), table, client, resources, adc);

    info!("Entering event loop");
    EVENTS.dispatch_forever(&mut agent).await
}
