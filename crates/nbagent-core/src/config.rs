//! Agent configuration
//!
//! Defaults mirror the timings the device was tuned with in the field.

use embassy_time::Duration;

/// Runtime configuration for the agent lifecycle and event sources
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConfig {
    /// Settling time after power-on before storage is touched
    pub boot_delay_ms: u32,
    /// How long the user has to hold the button to request a storage format
    pub format_window_ms: u32,
    /// `true` when the button reads low while pressed
    pub button_active_low: bool,
    /// Maximum number of network attach attempts before startup aborts
    pub network_attach_attempts: u8,
    /// Upper bound on the wait for the registration callback
    pub registration_timeout_ms: u32,
    /// Poll interval while waiting for registration
    pub registration_poll_ms: u32,
    /// Period of the sensor ticker
    pub sensor_poll_interval_ms: u32,
    /// Create and sample the on-chip ADC resources
    pub send_all_sensors: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            boot_delay_ms: 1000,
            format_window_ms: 3000,
            button_active_low: true,
            network_attach_attempts: 3,
            registration_timeout_ms: 60_000,
            registration_poll_ms: 100,
            sensor_poll_interval_ms: 3000,
            send_all_sensors: true,
        }
    }
}

impl AgentConfig {
    /// Sensor ticker period as an embassy duration
    pub fn sensor_poll_interval(&self) -> Duration {
        Duration::from_millis(self.sensor_poll_interval_ms as u64)
    }

    /// Number of registration polls that fit in the timeout (at least one)
    pub fn registration_polls(&self) -> u32 {
        if self.registration_poll_ms == 0 {
            return 1;
        }
        (self.registration_timeout_ms / self.registration_poll_ms).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registration_polls() {
        let config = AgentConfig::default();
        assert_eq!(config.registration_polls(), 600);
    }

    #[test]
    fn test_zero_poll_interval_still_polls_once() {
        let config = AgentConfig {
            registration_poll_ms: 0,
            ..AgentConfig::default()
        };
        assert_eq!(config.registration_polls(), 1);
    }

    #[test]
    fn test_sensor_interval_conversion() {
        let config = AgentConfig::default();
        assert_eq!(config.sensor_poll_interval(), Duration::from_millis(3000));
    }
}
