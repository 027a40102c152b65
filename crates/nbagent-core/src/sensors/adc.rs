use crate::platform::AnalogInput;

use super::{Sensor, SensorError, SensorReadings};

/// Scale applied to the internal temperature channel to get degrees Celsius
pub const TEMPERATURE_SCALE: f32 = 100.0;

/// Typed readings from the microcontroller's internal ADC channels.
pub struct AdcReadings {
    pub temperature_c: f32,
    pub vref_v: f32,
}

impl SensorReadings<2> for AdcReadings {
    fn to_array(self) -> [f32; 2] {
        [self.temperature_c, self.vref_v]
    }
}

/// Internal temperature and voltage-reference channels of the MCU ADC
pub struct OnChipAdc<T, V> {
    temperature: T,
    vref: V,
}

impl<T: AnalogInput, V: AnalogInput> OnChipAdc<T, V> {
    pub fn new(temperature: T, vref: V) -> Self {
        Self { temperature, vref }
    }
}

fn normalized(sensor: &'static str, value: f32) -> Result<f32, SensorError> {
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(SensorError::OutOfRange { sensor, value })
    }
}

impl<T: AnalogInput, V: AnalogInput> Sensor<2> for OnChipAdc<T, V> {
    type Readings = AdcReadings;

    fn name(&self) -> &'static str {
        "ADC"
    }

    async fn read(&mut self) -> Result<AdcReadings, SensorError> {
        let temperature = normalized("ADC temp", self.temperature.read())?;
        let vref = normalized("ADC vref", self.vref.read())?;

        Ok(AdcReadings {
            temperature_c: temperature * TEMPERATURE_SCALE,
            vref_v: vref,
        })
    }
}
