//! Producers that turn hardware timing sources into queued events

use embassy_time::{Duration, Ticker};
use embedded_hal_async::digital::Wait;
use log::{debug, info, warn};

use super::{AgentEvent, AgentProducer};

/// Post a [`AgentEvent::SensorTick`] every `period`
///
/// A full queue only costs the tick; the drop is counted by the queue.
pub async fn run_sensor_ticker(producer: AgentProducer<'_>, period: Duration) -> ! {
    info!("Sensor ticker every {} ms", period.as_millis());
    let mut ticker = Ticker::every(period);
    loop {
        ticker.next().await;
        if producer.post(AgentEvent::SensorTick).is_err() {
            debug!("Sensor tick dropped");
        }
    }
}

/// Post a [`AgentEvent::ButtonPressed`] on every press edge of `button`
///
/// `active_low` buttons are pressed on the falling edge.
pub async fn watch_button<B: Wait>(mut button: B, active_low: bool, producer: AgentProducer<'_>) -> ! {
    loop {
        let edge = if active_low {
            button.wait_for_falling_edge().await
        } else {
            button.wait_for_rising_edge().await
        };

        match edge {
            Ok(()) => {
                if producer.post(AgentEvent::ButtonPressed).is_err() {
                    debug!("Button press dropped");
                }
            }
            Err(e) => warn!("Button edge wait failed: {:?}", e),
        }
    }
}
