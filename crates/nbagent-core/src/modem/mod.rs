//! Modem bring-up over a half-duplex serial link
//!
//! The modem is configured fire-and-forget: every command is written as a
//! line, followed by a fixed settle delay before the next one may go out.
//! Responses are never read, so the only outcome of a run is that the
//! sequence completed. Network problems surface later, at network attach.

pub mod bc95;

use embassy_time::Duration;
use embedded_hal::digital::OutputPin;
use embedded_hal_async::delay::DelayNs;
use embedded_io_async::Write;
use log::{debug, info, warn};

/// Line terminator appended to every command
pub const LINE_TERMINATOR: &[u8] = b"\r\n";

/// How long the reset line is held asserted
pub const RESET_HOLD: Duration = Duration::from_millis(1000);

/// Boot time after the reset line is released, before the first command
pub const BOOT_WAIT: Duration = Duration::from_millis(7000);

/// Milliseconds for `DelayNs::delay_ms`, saturating instead of wrapping
fn delay_ms(duration: Duration) -> u32 {
    u32::try_from(duration.as_millis()).unwrap_or(u32::MAX)
}

/// One command of a bring-up plan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModemSequenceStep {
    /// Command text, without line terminator
    pub command: &'static str,
    /// Minimum time before the next step may be issued
    pub settle: Duration,
}

impl ModemSequenceStep {
    pub const fn new(command: &'static str, settle_ms: u64) -> Self {
        Self {
            command,
            settle: Duration::from_millis(settle_ms),
        }
    }
}

/// What a completed bring-up run did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SequenceReport {
    /// Steps written to the serial channel
    pub steps_issued: usize,
    /// Writes that returned an error (they are not retried)
    pub write_faults: usize,
    /// Reset line changes that returned an error
    pub reset_faults: usize,
}

/// Drives a serial peer through a fixed, ordered command sequence
///
/// The sequencer takes ownership of the serial channel and the reset line;
/// [`ModemSequencer::run`] consumes it, so nothing can write to the channel
/// while the sequence is in progress or reclaim it afterwards.
pub struct ModemSequencer<S, R> {
    serial: S,
    reset: R,
}

impl<S, R> ModemSequencer<S, R>
where
    S: Write,
    R: OutputPin,
{
    pub fn new(serial: S, reset: R) -> Self {
        Self { serial, reset }
    }

    /// Pulse reset, then issue every step in order with its settle delay
    pub async fn run<D: DelayNs>(
        mut self,
        delay: &mut D,
        sequence: &[ModemSequenceStep],
    ) -> SequenceReport {
        info!("Modem bring-up: {} steps", sequence.len());
        let mut report = SequenceReport::default();

        self.reset_pulse(delay, &mut report).await;

        for (index, step) in sequence.iter().enumerate() {
            debug!("Modem step {}: {}", index, step.command);
            if let Err(e) = self.write_line(step.command).await {
                warn!("Modem write of {:?} failed: {:?}", step.command, e);
                report.write_faults += 1;
            }
            report.steps_issued += 1;
            delay.delay_ms(delay_ms(step.settle)).await;
        }

        info!(
            "Modem bring-up done ({} steps, {} write faults)",
            report.steps_issued, report.write_faults
        );
        report
    }

    async fn reset_pulse<D: DelayNs>(&mut self, delay: &mut D, report: &mut SequenceReport) {
        if let Err(e) = self.reset.set_high() {
            warn!("Failed to assert modem reset: {:?}", e);
            report.reset_faults += 1;
        }
        delay.delay_ms(delay_ms(RESET_HOLD)).await;

        if let Err(e) = self.reset.set_low() {
            warn!("Failed to release modem reset: {:?}", e);
            report.reset_faults += 1;
        }
        delay.delay_ms(delay_ms(BOOT_WAIT)).await;
    }

    async fn write_line(&mut self, command: &str) -> Result<(), S::Error> {
        self.serial.write_all(command.as_bytes()).await?;
        self.serial.write_all(LINE_TERMINATOR).await?;
        self.serial.flush().await
    }
}
