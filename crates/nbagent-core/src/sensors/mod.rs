//! Sensor trait definitions and the periodic sampler
//!
//! Sensors produce typed readings with a compile-time value count. The
//! [`SensorSampler`] reads and logs them on every ticker event and, when its
//! values are bound to resources, writes them into the resource table.
//! Readings taken before the device is registered are logged and discarded.

mod adc;

pub use adc::*;

use core::future::Future;

use log::{debug, info};
use thiserror_no_std::Error;

use crate::app_state::RegistrationState;
use crate::resources::{Access, ResourceHandle, ResourceTable, ResourceValue};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SensorError {
    #[error("{sensor}: normalized reading {value} outside 0..=1")]
    OutOfRange { sensor: &'static str, value: f32 },
}

/// Trait for sensor reading data structures.
/// Provides compile-time guarantees about the number of values and their conversion to arrays.
pub trait SensorReadings<const COUNT: usize> {
    /// Convert the readings into a fixed-size array.
    fn to_array(self) -> [f32; COUNT];
}

/// Trait for sensors that produce typed readings.
pub trait Sensor<const COUNT: usize> {
    /// The type of readings this sensor produces.
    type Readings: SensorReadings<COUNT>;

    /// Short name used in log lines
    fn name(&self) -> &'static str;

    /// Read the sensor and return typed readings.
    fn read(&mut self) -> impl Future<Output = Result<Self::Readings, SensorError>>;
}

/// Reads a sensor on every tick and pushes its values into bound resources
pub struct SensorSampler<S, const COUNT: usize> {
    sensor: S,
    bindings: Option<[ResourceHandle; COUNT]>,
}

impl<S, const COUNT: usize> SensorSampler<S, COUNT>
where
    S: Sensor<COUNT>,
{
    /// `bindings[i]` receives value `i` of every reading
    pub fn new(sensor: S, bindings: [ResourceHandle; COUNT]) -> Self {
        Self {
            sensor,
            bindings: Some(bindings),
        }
    }

    /// Sample and log only; nothing is published
    pub fn log_only(sensor: S) -> Self {
        Self {
            sensor,
            bindings: None,
        }
    }

    /// Handle one ticker event on the worker thread
    ///
    /// Returns how many resource values were written: one per binding once
    /// registered, zero before or without bindings.
    pub async fn on_tick(
        &mut self,
        table: &mut ResourceTable,
        state: RegistrationState,
    ) -> Result<usize, SensorError> {
        let values = self.sensor.read().await?.to_array();
        info!("{}: {:?}", self.sensor.name(), values);

        let Some(bindings) = self.bindings.as_ref() else {
            return Ok(0);
        };
        if !state.is_registered() {
            debug!("Not registered ({:?}), discarding sample", state);
            return Ok(0);
        }

        let mut written = 0;
        for (handle, value) in bindings.iter().zip(values) {
            // Local writes cannot be refused
            if table
                .set_value(*handle, Access::Local, ResourceValue::Float(value))
                .is_ok()
            {
                written += 1;
            }
        }
        Ok(written)
    }
}
